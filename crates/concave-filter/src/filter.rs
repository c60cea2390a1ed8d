//! An RSQL-like filter micro-language: comparisons, pattern matches, sets,
//! null checks, and boolean combinators. `A;B` (and) binds tighter than
//! `A,B` (or); multi-term groups are parenthesised when nested.

use std::fmt;

use crate::value::FilterValue;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, FilterValue),
    Ne(String, FilterValue),
    Gt(String, FilterValue),
    Gte(String, FilterValue),
    Lt(String, FilterValue),
    Lte(String, FilterValue),
    Like(String, FilterValue),
    NotLike(String, FilterValue),
    In(String, Vec<FilterValue>),
    Out(String, Vec<FilterValue>),
    IsNull(String, bool),
    And(Box<Filter>, Box<Filter>),
    Or(Box<Filter>, Box<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Filter::Eq(field.into(), value.into())
    }

    pub fn ne(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Filter::Ne(field.into(), value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Filter::Gt(field.into(), value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Filter::Gte(field.into(), value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Filter::Lt(field.into(), value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Filter::Lte(field.into(), value.into())
    }

    pub fn like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Filter::Like(field.into(), FilterValue::str(pattern))
    }

    pub fn not_like(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Filter::NotLike(field.into(), FilterValue::str(pattern))
    }

    pub fn starts_with(field: impl Into<String>, prefix: impl AsRef<str>) -> Self {
        Filter::like(field, format!("{}%", prefix.as_ref()))
    }

    pub fn ends_with(field: impl Into<String>, suffix: impl AsRef<str>) -> Self {
        Filter::like(field, format!("%{}", suffix.as_ref()))
    }

    pub fn contains(field: impl Into<String>, needle: impl AsRef<str>) -> Self {
        Filter::like(field, format!("%{}%", needle.as_ref()))
    }

    pub fn is_in(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<FilterValue>>) -> Self {
        Filter::In(field.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn is_out(field: impl Into<String>, values: impl IntoIterator<Item = impl Into<FilterValue>>) -> Self {
        Filter::Out(field.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn is_null(field: impl Into<String>, is_null: bool) -> Self {
        Filter::IsNull(field.into(), is_null)
    }

    pub fn and(self, other: Filter) -> Self {
        Filter::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Filter) -> Self {
        Filter::Or(Box::new(self), Box::new(other))
    }

    pub fn negate(self) -> Self {
        Filter::Not(Box::new(self))
    }
}

fn group(filter: &Filter) -> String {
    match filter {
        Filter::And(..) | Filter::Or(..) => format!("({filter})"),
        other => other.to_string(),
    }
}

fn join_values(values: &[FilterValue]) -> String {
    values.iter().map(ToString::to_string).collect::<Vec<_>>().join(",")
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Eq(field, v) => write!(f, "{field}=={v}"),
            Filter::Ne(field, v) => write!(f, "{field}!={v}"),
            Filter::Gt(field, v) => write!(f, "{field}>{v}"),
            Filter::Gte(field, v) => write!(f, "{field}>={v}"),
            Filter::Lt(field, v) => write!(f, "{field}<{v}"),
            Filter::Lte(field, v) => write!(f, "{field}<={v}"),
            Filter::Like(field, v) => write!(f, "{field}=like={v}"),
            Filter::NotLike(field, v) => write!(f, "{field}=notlike={v}"),
            Filter::In(field, values) => write!(f, "{field}=in=({})", join_values(values)),
            Filter::Out(field, values) => write!(f, "{field}=out=({})", join_values(values)),
            Filter::IsNull(field, is_null) => write!(f, "{field}=isnull={is_null}"),
            Filter::And(a, b) => write!(f, "{};{}", group(a), group(b)),
            Filter::Or(a, b) => write!(f, "{},{}", group(a), group(b)),
            Filter::Not(inner) => write!(f, "!not=({inner})"),
        }
    }
}
