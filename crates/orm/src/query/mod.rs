//! Queries: filters, sorts, limit and offset, compiled to a single `SELECT`.
mod builder;
mod condition;

pub use builder::*;
pub use condition::*;

use std::fmt::Write;

use crate::config::DatabaseKind;
use crate::error::{Error, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sort {
    field: String,
    ascending: bool,
}

impl Sort {
    pub fn new(field: impl Into<String>, ascending: bool) -> Self {
        Self {
            field: field.into(),
            ascending,
        }
    }

    pub fn get_field(&self) -> &str {
        &self.field
    }

    pub fn is_ascending(&self) -> bool {
        self.ascending
    }
}

/// A filtered, sorted and paged select over one table.  Conditions are combined with `AND`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query {
    conditions: Vec<Condition>,
    sorts: Vec<Sort>,
    limit: Option<u64>,
    skip: Option<u64>,
}

impl Query {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }

    pub fn add_condition(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn add_sort(&mut self, sort: Sort) {
        self.sorts.push(sort);
    }

    /// Must be positive.
    pub fn set_limit(&mut self, limit: u64) -> Result<()> {
        if limit == 0 {
            return Err(Error::InvalidQuery("Limit must be greater than 0".into()));
        }
        self.limit = Some(limit);
        Ok(())
    }

    /// Must be positive.
    pub fn set_skip(&mut self, skip: u64) -> Result<()> {
        if skip == 0 {
            return Err(Error::InvalidQuery("Skip must be greater than 0".into()));
        }
        self.skip = Some(skip);
        Ok(())
    }

    pub fn get_conditions(&self) -> &[Condition] {
        &self.conditions[..]
    }

    pub fn get_sorts(&self) -> &[Sort] {
        &self.sorts[..]
    }

    pub fn get_limit(&self) -> Option<u64> {
        self.limit
    }

    pub fn get_skip(&self) -> Option<u64> {
        self.skip
    }

    /// Every field referenced by a condition or sort, in order of appearance, with repeats.
    pub fn field_names(&self) -> Vec<&str> {
        self.conditions
            .iter()
            .flat_map(|c| c.field_names())
            .chain(self.sorts.iter().map(|s| s.get_field()))
            .collect()
    }

    /// Compile against `table` in the dialect of `kind`.  Field names are written as given;
    /// [crate::Table::query] checks them first.
    pub fn to_sql(&self, table: &str, kind: DatabaseKind) -> String {
        let mut out = format!("SELECT * FROM {}", table);

        for (i, c) in self.conditions.iter().enumerate() {
            out.push_str(if i == 0 { " WHERE (" } else { " AND (" });
            c.write_sql(&mut out, kind);
            out.push(')');
        }

        for (i, s) in self.sorts.iter().enumerate() {
            out.push_str(if i == 0 { " ORDER BY " } else { ", " });
            out.push_str(&s.field);
            out.push_str(if s.ascending { " ASC" } else { " DESC" });
        }

        // Writing to a String can't fail.
        if let Some(l) = self.limit {
            let _ = write!(out, " LIMIT {}", l);
        }
        if let Some(s) = self.skip {
            let _ = write!(out, " OFFSET {}", s);
        }

        out.push(';');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_customers_example() {
        let query = QueryBuilder::new()
            .filter_with_condition(Condition::range("age", None, Some(18)).unwrap())
            .sort_ascending("age")
            .skip(5)
            .unwrap()
            .limit(10)
            .unwrap()
            .build();
        assert_eq!(
            query.to_sql("customers", DatabaseKind::Sqlite),
            "SELECT * FROM customers WHERE (age < 18) ORDER BY age ASC LIMIT 10 OFFSET 5;"
        );
    }

    #[test]
    fn test_bare() {
        assert_eq!(Query::new().to_sql("t", DatabaseKind::Sqlite), "SELECT * FROM t;");
    }

    #[test]
    fn test_several() {
        let query = QueryBuilder::new()
            .filter_with_condition(Condition::match_true("active"))
            .filter_with_condition(Condition::starts_with("name", "J"))
            .sort_descending("age")
            .sort_ascending("name")
            .build();
        assert_eq!(
            query.to_sql("t", DatabaseKind::Sqlite),
            "SELECT * FROM t WHERE (active = 1) AND (name LIKE 'J%' ESCAPE '!') ORDER BY age DESC, name ASC;"
        );
        assert_eq!(query.field_names(), vec!["active", "name", "age", "name"]);
    }

    #[test]
    fn test_mysql_dialect() {
        let query = QueryBuilder::new()
            .filter_with_condition(Condition::ends_with("path", r"\bin"))
            .filter_with_condition(Condition::match_text_exact("owner", r"it\'s"))
            .limit(3)
            .unwrap()
            .build();
        assert_eq!(
            query.to_sql("files", DatabaseKind::MySql),
            r"SELECT * FROM files WHERE (path LIKE '%\\bin' ESCAPE '!') AND (owner = 'it\\''s') LIMIT 3;"
        );
    }

    #[test]
    fn test_non_positive_paging() {
        assert!(QueryBuilder::new().limit(0).is_err());
        assert!(QueryBuilder::new().skip(0).is_err());
        let mut q = Query::new();
        assert!(q.set_limit(0).is_err());
        assert_eq!(q.get_limit(), None);
    }

    fn arb_condition() -> impl Strategy<Value = Condition> {
        let leaf = prop_oneof![
            ("[a-z]{1,8}", ".*").prop_map(|(f, v)| Condition::match_text_exact(f, v)),
            ("[a-z]{1,8}", any::<i64>()).prop_map(|(f, n)| Condition::less_than(f, n)),
            ("[a-z]{1,8}", any::<i64>(), any::<i64>()).prop_map(|(f, a, b)| {
                Condition::range(f, Some(a.min(b)), Some(a.max(b))).unwrap()
            }),
            ("[a-z]{1,8}", any::<bool>()).prop_map(|(f, b)| Condition::match_bool(f, b)),
            ("[a-z]{1,8}", ".*").prop_map(|(f, v)| Condition::contains(f, v)),
            ("[a-z]{1,8}", proptest::collection::vec(".*", 0..4))
                .prop_map(|(f, v)| Condition::one_of(f, v)),
        ];
        leaf.prop_recursive(3, 16, 4, |inner| {
            proptest::collection::vec(inner, 0..4).prop_map(Condition::any_of)
        })
    }

    proptest! {
        #[test]
        fn test_compiling_is_deterministic(
            conditions in proptest::collection::vec(arb_condition(), 0..4),
            sorts in proptest::collection::vec(("[a-z]{1,8}", any::<bool>()), 0..3),
            limit in proptest::option::of(1..1000u64),
            skip in proptest::option::of(1..1000u64),
        ) {
            let mut builder = QueryBuilder::new();
            for c in conditions {
                builder = builder.filter_with_condition(c);
            }
            for (f, asc) in sorts {
                builder = if asc { builder.sort_ascending(f) } else { builder.sort_descending(f) };
            }
            if let Some(l) = limit {
                builder = builder.limit(l).unwrap();
            }
            if let Some(s) = skip {
                builder = builder.skip(s).unwrap();
            }
            let query = builder.build();
            let first = query.to_sql("t", DatabaseKind::Sqlite);
            prop_assert_eq!(&first, &query.clone().to_sql("t", DatabaseKind::Sqlite));
            prop_assert!(first.ends_with(';'));
        }
    }
}
