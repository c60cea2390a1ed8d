//! An RSQL-like filter and query-parameter builder shared by every resource
//! client: comparisons, pattern matches, sets, null checks, boolean
//! combinators, pagination, ordering, and aggregation parameters.

pub mod filter;
pub mod params;
pub mod value;

pub use filter::Filter;
pub use params::{Aggregate, QueryParams, SortDirection};
pub use value::FilterValue;
