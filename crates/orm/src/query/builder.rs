use crate::error::Result;
use crate::query::{Condition, Query, Sort};

/// Fluent construction of a [Query].
#[derive(Clone, Debug, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn sort_ascending(mut self, field: impl Into<String>) -> Self {
        self.query.add_sort(Sort::new(field, true));
        self
    }

    pub fn sort_descending(mut self, field: impl Into<String>) -> Self {
        self.query.add_sort(Sort::new(field, false));
        self
    }

    pub fn filter_with_condition(mut self, condition: Condition) -> Self {
        self.query.add_condition(condition);
        self
    }

    pub fn limit(mut self, limit: u64) -> Result<Self> {
        self.query.set_limit(limit)?;
        Ok(self)
    }

    pub fn skip(mut self, skip: u64) -> Result<Self> {
        self.query.set_skip(skip)?;
        Ok(self)
    }

    pub fn build(self) -> Query {
        self.query
    }
}
