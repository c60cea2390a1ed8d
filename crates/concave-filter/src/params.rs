//! Builds the query-parameter list a resource request sends over the wire:
//! filtering, field selection, pagination, ordering, and aggregations.
//! Aggregations produce query parameters only — they never execute locally.

use crate::filter::Filter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl Aggregate {
    fn as_str(self) -> &'static str {
        match self {
            Aggregate::Count => "count",
            Aggregate::Sum => "sum",
            Aggregate::Avg => "avg",
            Aggregate::Min => "min",
            Aggregate::Max => "max",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryParams {
    filter: Option<Filter>,
    select: Vec<String>,
    include: Vec<String>,
    cursor: Option<String>,
    limit: Option<u32>,
    order_by: Vec<(String, SortDirection)>,
    group_by: Vec<String>,
    aggregates: Vec<(Aggregate, Option<String>)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn select(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.select = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn include(mut self, relations: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.include = relations.into_iter().map(Into::into).collect();
        self
    }

    pub fn cursor(mut self, cursor: impl Into<String>) -> Self {
        self.cursor = Some(cursor.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by.push((field.into(), direction));
        self
    }

    pub fn group_by(mut self, fields: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.group_by = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn count(mut self) -> Self {
        self.aggregates.push((Aggregate::Count, None));
        self
    }

    pub fn sum(mut self, field: impl Into<String>) -> Self {
        self.aggregates.push((Aggregate::Sum, Some(field.into())));
        self
    }

    pub fn avg(mut self, field: impl Into<String>) -> Self {
        self.aggregates.push((Aggregate::Avg, Some(field.into())));
        self
    }

    pub fn min(mut self, field: impl Into<String>) -> Self {
        self.aggregates.push((Aggregate::Min, Some(field.into())));
        self
    }

    pub fn max(mut self, field: impl Into<String>) -> Self {
        self.aggregates.push((Aggregate::Max, Some(field.into())));
        self
    }

    /// Flattens the builder into the `(key, value)` pairs sent as query
    /// parameters. Order follows construction order for deterministic URLs.
    pub fn into_pairs(self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();

        if let Some(filter) = self.filter {
            pairs.push(("filter".to_string(), filter.to_string()));
        }
        if !self.select.is_empty() {
            pairs.push(("select".to_string(), self.select.join(",")));
        }
        if !self.include.is_empty() {
            pairs.push(("include".to_string(), self.include.join(",")));
        }
        if let Some(cursor) = self.cursor {
            pairs.push(("cursor".to_string(), cursor));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        if !self.order_by.is_empty() {
            let rendered = self
                .order_by
                .iter()
                .map(|(field, dir)| format!("{field}:{}", dir.as_str()))
                .collect::<Vec<_>>()
                .join(",");
            pairs.push(("orderBy".to_string(), rendered));
        }
        if !self.group_by.is_empty() {
            pairs.push(("groupBy".to_string(), self.group_by.join(",")));
        }
        for (aggregate, field) in self.aggregates {
            match field {
                Some(field) => pairs.push((aggregate.as_str().to_string(), field)),
                None => pairs.push((aggregate.as_str().to_string(), "true".to_string())),
            }
        }

        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_builder_produces_no_params() {
        assert!(QueryParams::new().into_pairs().is_empty());
    }

    #[test]
    fn filter_select_and_pagination_render_expected_keys() {
        let pairs = QueryParams::new()
            .filter(Filter::eq("status", "open"))
            .select(["id", "title"])
            .cursor("abc")
            .limit(20)
            .order_by("createdAt", SortDirection::Desc)
            .into_pairs();

        assert_eq!(pairs[0], ("filter".to_string(), r#"status=="open""#.to_string()));
        assert_eq!(pairs[1], ("select".to_string(), "id,title".to_string()));
        assert_eq!(pairs[2], ("cursor".to_string(), "abc".to_string()));
        assert_eq!(pairs[3], ("limit".to_string(), "20".to_string()));
        assert_eq!(pairs[4], ("orderBy".to_string(), "createdAt:desc".to_string()));
    }

    #[test]
    fn aggregations_render_as_plain_query_params() {
        let pairs = QueryParams::new().group_by(["status"]).count().sum("amount").into_pairs();

        assert_eq!(pairs[0], ("groupBy".to_string(), "status".to_string()));
        assert_eq!(pairs[1], ("count".to_string(), "true".to_string()));
        assert_eq!(pairs[2], ("sum".to_string(), "amount".to_string()));
    }
}
