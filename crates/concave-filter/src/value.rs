use std::fmt;

use chrono::{DateTime, Utc};

/// A value embeddable in a filter term. Strings are quoted with internal
/// `"` and `\` escaped; dates serialise as ISO-8601; numbers and booleans
/// are stringified; `null` is the literal `null`.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    Str(String),
    Num(f64),
    Bool(bool),
    Null,
    Date(DateTime<Utc>),
}

impl FilterValue {
    pub fn str(s: impl Into<String>) -> Self {
        FilterValue::Str(s.into())
    }
}

impl From<&str> for FilterValue {
    fn from(s: &str) -> Self {
        FilterValue::Str(s.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(s: String) -> Self {
        FilterValue::Str(s)
    }
}

impl From<f64> for FilterValue {
    fn from(n: f64) -> Self {
        FilterValue::Num(n)
    }
}

impl From<i64> for FilterValue {
    fn from(n: i64) -> Self {
        FilterValue::Num(n as f64)
    }
}

impl From<bool> for FilterValue {
    fn from(b: bool) -> Self {
        FilterValue::Bool(b)
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(d: DateTime<Utc>) -> Self {
        FilterValue::Date(d)
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            other => out.push(other),
        }
    }
    out
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Str(s) => write!(f, "\"{}\"", escape(s)),
            FilterValue::Num(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{n}")
                }
            }
            FilterValue::Bool(b) => write!(f, "{b}"),
            FilterValue::Null => write!(f, "null"),
            FilterValue::Date(d) => write!(f, "\"{}\"", d.to_rfc3339()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_are_quoted_and_escaped() {
        let value = FilterValue::str(r#"a "quoted" \ value"#);
        assert_eq!(value.to_string(), r#""a \"quoted\" \\ value""#);
    }

    #[test]
    fn integral_numbers_render_without_a_decimal_point() {
        assert_eq!(FilterValue::from(3.0).to_string(), "3");
        assert_eq!(FilterValue::from(3.5).to_string(), "3.5");
    }

    #[test]
    fn null_is_the_literal_null() {
        assert_eq!(FilterValue::Null.to_string(), "null");
    }
}
