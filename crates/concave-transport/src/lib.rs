//! Request/response transport over HTTP with headers, params, and timeouts,
//! plus the SSE channel factory for the subscription stream.

pub mod client;
pub mod error;
pub mod request;
pub mod retry;
pub mod sse;

pub use client::{Transport, TransportConfig};
pub use error::{TransportError, CONFLICT_CODE};
pub use request::{HttpMethod, Page, TransportRequest, TransportResponse};
pub use retry::{network_retry, retry, RetryConfig};
pub use sse::{parse_frame, EventMeta, SseFrame, SubscriptionEvent};
