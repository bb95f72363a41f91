use std::fmt::Write;

use crate::config::DatabaseKind;
use crate::error::{Error, Result};

/// A bounded or half-bounded integer range.  At least one bound is present, and `start <= end` when
/// both are.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NumberRange {
    start: Option<i64>,
    end: Option<i64>,
}

impl NumberRange {
    pub fn new(start: Option<i64>, end: Option<i64>) -> Result<Self> {
        match (start, end) {
            (None, None) => Err(Error::InvalidQuery(
                "A range needs at least one bound".into(),
            )),
            (Some(s), Some(e)) if s > e => Err(Error::InvalidQuery(format!(
                "Range start {} is after its end {}",
                s, e
            ))),
            _ => Ok(Self { start, end }),
        }
    }

    pub fn get_start(&self) -> Option<i64> {
        self.start
    }

    pub fn get_end(&self) -> Option<i64> {
        self.end
    }
}

/// One filter of a query.
///
/// Text is always written out as a quoted literal with quotes doubled, and with backslashes doubled
/// for MySQL, which treats them as escapes.  The `LIKE` forms also escape the wildcard characters
/// in the text with `!`, so `contains("name", "50%")` matches a literal percent sign.
#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Match { field: String, value: String },
    /// `start == end` compiles to `=`; both bounds to `BETWEEN`; only a start to `>`; only an end
    /// to `<`.
    Range { field: String, range: NumberRange },
    Bool { field: String, value: bool },
    StartsWith { field: String, prefix: String },
    EndsWith { field: String, suffix: String },
    Contains { field: String, needle: String },
    Regex { field: String, pattern: String },
    /// An empty list never matches.
    OneOf { field: String, values: Vec<String> },
    /// Disjunction.  An empty list never matches.
    AnyOf(Vec<Condition>),
}

const LIKE_ESCAPE: char = '!';

fn quote(out: &mut String, text: &str, kind: DatabaseKind) {
    out.push('\'');
    for c in text.chars() {
        match c {
            '\'' => out.push('\''),
            '\\' if kind == DatabaseKind::MySql => out.push('\\'),
            _ => {}
        }
        out.push(c);
    }
    out.push('\'');
}

fn escape_like(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, LIKE_ESCAPE | '%' | '_') {
            out.push(LIKE_ESCAPE);
        }
        out.push(c);
    }
    out
}

fn like(out: &mut String, field: &str, pattern: &str, kind: DatabaseKind) {
    out.push_str(field);
    out.push_str(" LIKE ");
    quote(out, pattern, kind);
    // Writing to a String can't fail.
    let _ = write!(out, " ESCAPE '{}'", LIKE_ESCAPE);
}

impl Condition {
    pub fn match_text_exact(field: impl Into<String>, value: impl Into<String>) -> Self {
        Condition::Match {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn range(field: impl Into<String>, start: Option<i64>, end: Option<i64>) -> Result<Self> {
        Ok(Condition::Range {
            field: field.into(),
            range: NumberRange::new(start, end)?,
        })
    }

    pub fn exact_number(field: impl Into<String>, value: i64) -> Self {
        Condition::Range {
            field: field.into(),
            range: NumberRange {
                start: Some(value),
                end: Some(value),
            },
        }
    }

    pub fn less_than(field: impl Into<String>, value: i64) -> Self {
        Condition::Range {
            field: field.into(),
            range: NumberRange {
                start: None,
                end: Some(value),
            },
        }
    }

    pub fn greater_than(field: impl Into<String>, value: i64) -> Self {
        Condition::Range {
            field: field.into(),
            range: NumberRange {
                start: Some(value),
                end: None,
            },
        }
    }

    pub fn match_bool(field: impl Into<String>, value: bool) -> Self {
        Condition::Bool {
            field: field.into(),
            value,
        }
    }

    pub fn match_true(field: impl Into<String>) -> Self {
        Self::match_bool(field, true)
    }

    pub fn match_false(field: impl Into<String>) -> Self {
        Self::match_bool(field, false)
    }

    pub fn starts_with(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Condition::StartsWith {
            field: field.into(),
            prefix: prefix.into(),
        }
    }

    pub fn ends_with(field: impl Into<String>, suffix: impl Into<String>) -> Self {
        Condition::EndsWith {
            field: field.into(),
            suffix: suffix.into(),
        }
    }

    pub fn contains(field: impl Into<String>, needle: impl Into<String>) -> Self {
        Condition::Contains {
            field: field.into(),
            needle: needle.into(),
        }
    }

    pub fn regex(field: impl Into<String>, pattern: impl Into<String>) -> Self {
        Condition::Regex {
            field: field.into(),
            pattern: pattern.into(),
        }
    }

    pub fn one_of<I, S>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Condition::OneOf {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn any_of(conditions: impl IntoIterator<Item = Condition>) -> Self {
        Condition::AnyOf(conditions.into_iter().collect())
    }

    /// Every field this condition mentions, in order of appearance.
    pub fn field_names(&self) -> Vec<&str> {
        let mut out = vec![];
        self.collect_fields(&mut out);
        out
    }

    fn collect_fields<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Condition::Match { field, .. }
            | Condition::Range { field, .. }
            | Condition::Bool { field, .. }
            | Condition::StartsWith { field, .. }
            | Condition::EndsWith { field, .. }
            | Condition::Contains { field, .. }
            | Condition::Regex { field, .. }
            | Condition::OneOf { field, .. } => out.push(field),
            Condition::AnyOf(conditions) => {
                for c in conditions {
                    c.collect_fields(out);
                }
            }
        }
    }

    pub fn to_sql(&self, kind: DatabaseKind) -> String {
        let mut out = String::new();
        self.write_sql(&mut out, kind);
        out
    }

    pub(crate) fn write_sql(&self, out: &mut String, kind: DatabaseKind) {
        match self {
            Condition::Match { field, value } => {
                out.push_str(field);
                out.push_str(" = ");
                quote(out, value, kind);
            }
            Condition::Range { field, range } => {
                out.push_str(field);
                // Writing to a String can't fail.
                let _ = match (range.start, range.end) {
                    (Some(s), Some(e)) if s == e => write!(out, " = {}", s),
                    (Some(s), Some(e)) => write!(out, " BETWEEN {} AND {}", s, e),
                    (Some(s), None) => write!(out, " > {}", s),
                    (None, Some(e)) => write!(out, " < {}", e),
                    (None, None) => Ok(()),
                };
            }
            Condition::Bool { field, value } => {
                out.push_str(field);
                out.push_str(if *value { " = 1" } else { " = 0" });
            }
            Condition::StartsWith { field, prefix } => {
                like(out, field, &format!("{}%", escape_like(prefix)), kind)
            }
            Condition::EndsWith { field, suffix } => {
                like(out, field, &format!("%{}", escape_like(suffix)), kind)
            }
            Condition::Contains { field, needle } => {
                like(out, field, &format!("%{}%", escape_like(needle)), kind)
            }
            Condition::Regex { field, pattern } => {
                out.push_str(field);
                out.push_str(" REGEXP ");
                quote(out, pattern, kind);
            }
            Condition::OneOf { values, .. } if values.is_empty() => out.push('0'),
            Condition::OneOf { field, values } => {
                out.push_str(field);
                out.push_str(" IN (");
                for (i, v) in values.iter().enumerate() {
                    if i != 0 {
                        out.push(',');
                    }
                    quote(out, v, kind);
                }
                out.push(')');
            }
            Condition::AnyOf(conditions) if conditions.is_empty() => out.push('0'),
            Condition::AnyOf(conditions) => {
                out.push('(');
                for (i, c) in conditions.iter().enumerate() {
                    if i != 0 {
                        out.push_str(" OR ");
                    }
                    c.write_sql(out, kind);
                }
                out.push(')');
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_forms() {
        let cases = vec![
            (Condition::match_text_exact("name", "John"), "name = 'John'"),
            (Condition::exact_number("age", 5), "age = 5"),
            (Condition::range("age", Some(1), Some(9)).unwrap(), "age BETWEEN 1 AND 9"),
            (Condition::greater_than("age", 3), "age > 3"),
            (Condition::less_than("age", 18), "age < 18"),
            (Condition::match_true("active"), "active = 1"),
            (Condition::match_false("active"), "active = 0"),
            (Condition::starts_with("name", "Jo"), "name LIKE 'Jo%' ESCAPE '!'"),
            (Condition::ends_with("name", "hn"), "name LIKE '%hn' ESCAPE '!'"),
            (Condition::contains("name", "oh"), "name LIKE '%oh%' ESCAPE '!'"),
            (Condition::regex("name", "^J.*n$"), "name REGEXP '^J.*n$'"),
            (Condition::one_of("name", ["a", "b"]), "name IN ('a','b')"),
            (
                Condition::any_of([
                    Condition::less_than("age", 3),
                    Condition::greater_than("age", 60),
                ]),
                "(age < 3 OR age > 60)",
            ),
        ];

        for (cond, expected) in cases {
            assert_eq!(cond.to_sql(DatabaseKind::Sqlite), expected);
        }
    }

    #[test]
    fn test_escaping() {
        assert_eq!(
            Condition::match_text_exact("name", "O'Brien").to_sql(DatabaseKind::Sqlite),
            "name = 'O''Brien'"
        );
        assert_eq!(
            Condition::contains("note", r"50%_off!\").to_sql(DatabaseKind::Sqlite),
            r"note LIKE '%50!%!_off!!\%' ESCAPE '!'"
        );
        assert_eq!(
            Condition::one_of("name", ["it's"]).to_sql(DatabaseKind::Sqlite),
            "name IN ('it''s')"
        );
    }

    #[test]
    fn test_mysql_backslashes() {
        let sneaky = r"\' OR 1=1 -- ";
        assert_eq!(
            Condition::match_text_exact("name", sneaky).to_sql(DatabaseKind::MySql),
            r"name = '\\'' OR 1=1 -- '"
        );
        assert_eq!(
            Condition::match_text_exact("name", sneaky).to_sql(DatabaseKind::Sqlite),
            r"name = '\'' OR 1=1 -- '"
        );
        assert_eq!(
            Condition::contains("path", r"C:\tmp").to_sql(DatabaseKind::MySql),
            r"path LIKE '%C:\\tmp%' ESCAPE '!'"
        );
        assert_eq!(
            Condition::regex("code", r"^\d+$").to_sql(DatabaseKind::MySql),
            r"code REGEXP '^\\d+$'"
        );
        assert_eq!(
            Condition::one_of("name", [r"a\", "b'"]).to_sql(DatabaseKind::MySql),
            r"name IN ('a\\','b''')"
        );
    }

    #[test]
    fn test_empty_disjunctions() {
        let none = Vec::<String>::new();
        assert_eq!(Condition::one_of("name", none).to_sql(DatabaseKind::Sqlite), "0");
        assert_eq!(Condition::any_of(vec![]).to_sql(DatabaseKind::Sqlite), "0");
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(Condition::range("f", None, None).is_err());
        assert!(Condition::range("f", Some(5), Some(2)).is_err());
        assert!(Condition::range("f", Some(2), Some(2)).is_ok());
    }

    #[test]
    fn test_field_names() {
        let cond = Condition::any_of([
            Condition::match_true("a"),
            Condition::any_of([Condition::less_than("b", 1), Condition::regex("c", ".")]),
        ]);
        assert_eq!(cond.field_names(), vec!["a", "b", "c"]);
    }

    /// Read a MySQL string literal the way the server does by default, returning `None` unless it
    /// spans all of `sql`.
    fn read_mysql_literal(sql: &str) -> Option<String> {
        let mut chars = sql.strip_prefix('\'')?.chars();
        let mut out = String::new();
        while let Some(c) = chars.next() {
            match c {
                '\\' => out.push(chars.next()?),
                '\'' => match chars.next() {
                    Some('\'') => out.push('\''),
                    None => return Some(out),
                    Some(_) => return None,
                },
                c => out.push(c),
            }
        }
        None
    }

    proptest! {
        #[test]
        fn test_equal_bounds_use_equals(n in any::<i64>()) {
            let sql = Condition::range("f", Some(n), Some(n)).unwrap().to_sql(DatabaseKind::Sqlite);
            prop_assert_eq!(sql, format!("f = {}", n));
        }

        #[test]
        fn test_quoted_text_balances(text in ".*") {
            let sql = Condition::match_text_exact("f", text).to_sql(DatabaseKind::Sqlite);
            prop_assert_eq!(sql.matches('\'').count() % 2, 0);
        }

        #[test]
        fn test_mysql_literal_reads_back(text in ".*") {
            let sql = Condition::match_text_exact("f", text.clone()).to_sql(DatabaseKind::MySql);
            prop_assert_eq!(read_mysql_literal(&sql["f = ".len()..]), Some(text));
        }
    }
}
