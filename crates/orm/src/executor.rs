//! Running SQL against a connection.
//!
//! The engine only ever needs two things from a connection: run a statement and get the number of
//! affected rows, or run a query and get every row back.  [SqliteExecutor] is the built-in
//! implementation; other servers plug in by implementing [Executor] and handing it to
//! [crate::Database::with_executor].
use std::path::Path;

use log::*;

use crate::codec::{Params, ResultRow};
use crate::error::Result;
use crate::value::Wire;

pub trait Executor: Send + 'static {
    /// Run a statement, returning how many rows it touched.
    fn execute(&mut self, sql: &str, params: &Params) -> Result<usize>;

    /// Run a query and drain the whole result set.
    fn query(&mut self, sql: &str, params: &Params) -> Result<Vec<ResultRow>>;
}

impl<T: Executor + ?Sized> Executor for Box<T> {
    fn execute(&mut self, sql: &str, params: &Params) -> Result<usize> {
        (**self).execute(sql, params)
    }

    fn query(&mut self, sql: &str, params: &Params) -> Result<Vec<ResultRow>> {
        (**self).query(sql, params)
    }
}

/// SQL that we run as part of opening any connection.
///
/// - Enables the busy timeout.
/// - Enables foreign key enforcement (though we don't expect foreign keys to be used).
/// - Raises the default cache size, which is tuned for phones.
const INITIAL_SQL: &str = r#"
PRAGMA busy_timeout = 1000;
PRAGMA cache_size = -100000;
PRAGMA foreign_keys = 1;
"#;

/// Only meaningful for databases on disk.  Truncating on open keeps the WAL file from growing
/// without bound.
const FILE_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA wal_autocheckpoint = 10000;
PRAGMA wal_checkpoint(full);
"#;

/// Implements SQLite's `X REGEXP Y` operator, which calls `regexp(Y, X)`.  NULL never matches.
fn register_regexp(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    use rusqlite::functions::FunctionFlags;

    conn.create_scalar_function(
        "regexp",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let pattern = ctx.get::<String>(0)?;
            let text = match ctx.get::<Option<String>>(1)? {
                Some(t) => t,
                None => return Ok(false),
            };
            let re = regex::Regex::new(&pattern)
                .map_err(|e| rusqlite::Error::UserFunctionError(Box::new(e)))?;
            Ok(re.is_match(&text))
        },
    )
}

pub struct SqliteExecutor {
    conn: rusqlite::Connection,
}

impl SqliteExecutor {
    pub fn open(path: &Path) -> Result<Self> {
        info!("Opening SQLite database at {}", path.display());
        let conn = rusqlite::Connection::open(path)?;
        conn.execute_batch(FILE_SQL)?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        info!("Opening in-memory SQLite database");
        Self::with_connection(rusqlite::Connection::open_in_memory()?)
    }

    /// Build an executor from an already-existing connection.
    pub fn with_connection(conn: rusqlite::Connection) -> Result<Self> {
        conn.execute_batch(INITIAL_SQL)?;
        register_regexp(&conn)?;
        Ok(Self { conn })
    }
}

impl Executor for SqliteExecutor {
    fn execute(&mut self, sql: &str, params: &Params) -> Result<usize> {
        let mut statement = self.conn.prepare_cached(sql)?;
        Ok(statement.execute(rusqlite::params_from_iter(params.as_slice().iter()))?)
    }

    fn query(&mut self, sql: &str, params: &Params) -> Result<Vec<ResultRow>> {
        let mut statement = self.conn.prepare_cached(sql)?;
        let names = statement
            .column_names()
            .into_iter()
            .map(String::from)
            .collect::<Vec<_>>();

        let mut out = vec![];
        let mut rows = statement.query(rusqlite::params_from_iter(params.as_slice().iter()))?;
        while let Some(r) = rows.next()? {
            let mut columns = Vec::with_capacity(names.len());
            for (i, name) in names.iter().enumerate() {
                columns.push((name.clone(), Wire::from_value_ref(r.get_ref(i)?)));
            }
            out.push(ResultRow::new(columns));
        }

        Ok(out)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    use std::sync::{Arc, Mutex};

    /// Wraps an in-memory SQLite executor, remembering every statement passed to `execute`.
    pub(crate) struct RecordingExecutor {
        inner: SqliteExecutor,
        pub(crate) executed: Arc<Mutex<Vec<(String, Params)>>>,
    }

    impl RecordingExecutor {
        pub(crate) fn new() -> Self {
            Self {
                inner: SqliteExecutor::open_in_memory().unwrap(),
                executed: Default::default(),
            }
        }
    }

    impl Executor for RecordingExecutor {
        fn execute(&mut self, sql: &str, params: &Params) -> Result<usize> {
            self.executed
                .lock()
                .unwrap()
                .push((sql.to_string(), params.clone()));
            self.inner.execute(sql, params)
        }

        fn query(&mut self, sql: &str, params: &Params) -> Result<Vec<ResultRow>> {
            self.inner.query(sql, params)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    #[test]
    fn test_round_trip_wires() {
        let mut exec = SqliteExecutor::open_in_memory().unwrap();
        exec.execute("CREATE TABLE t (a INT, b REAL, c TEXT)", &Params::new())
            .unwrap();

        let mut params = Params::new();
        params.bind(1, Wire::Integer(1 << 40));
        params.bind(2, Wire::Real(0.5));
        params.bind(3, Wire::Null);
        assert_eq!(
            exec.execute("INSERT INTO t (a, b, c) VALUES (?, ?, ?)", &params)
                .unwrap(),
            1
        );

        let rows = exec.query("SELECT * FROM t", &Params::new()).unwrap();
        assert_eq!(
            rows,
            vec![ResultRow::new(vec![
                ("a".to_string(), Wire::Integer(1 << 40)),
                ("b".to_string(), Wire::Real(0.5)),
                ("c".to_string(), Wire::Null),
            ])]
        );
    }

    #[test]
    fn test_regexp() {
        let mut exec = SqliteExecutor::open_in_memory().unwrap();
        exec.execute("CREATE TABLE t (name TEXT)", &Params::new())
            .unwrap();
        for name in ["alice", "bob", "carol"] {
            let mut params = Params::new();
            params.bind(1, Wire::Text(name.into()));
            exec.execute("INSERT INTO t (name) VALUES (?)", &params)
                .unwrap();
        }

        let rows = exec
            .query(
                "SELECT * FROM t WHERE name REGEXP '^[ab]' ORDER BY name ASC",
                &Params::new(),
            )
            .unwrap();
        let names = rows
            .iter()
            .map(|r| r.get("name").cloned().unwrap())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec![Wire::Text("alice".into()), Wire::Text("bob".into())]
        );
    }

    #[test]
    fn test_file_database() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("test.sqlite");
        {
            let mut exec = SqliteExecutor::open(&path).unwrap();
            exec.execute("CREATE TABLE t (a INT)", &Params::new()).unwrap();
        }
        let mut exec = SqliteExecutor::open(&path).unwrap();
        assert!(exec.query("SELECT * FROM t", &Params::new()).unwrap().is_empty());
    }
}
