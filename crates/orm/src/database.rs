//! The database: one connection, one writer thread, and the tables registered against them.
use std::sync::Arc;

use itertools::Itertools;
use log::*;

use crate::codec::{Codec, CodecRegistry, Params};
use crate::config::{DatabaseConfig, DatabaseKind};
use crate::descriptor::Entity;
use crate::error::{Error, Result};
use crate::executor::{Executor, SqliteExecutor};
use crate::table::Table;
use crate::writer::Writer;

/// Table and schema names end up in statement text, so they are restricted to plain identifiers.
fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!(
            "{:?} is not a valid table name",
            name
        )))
    }
}

pub struct Database {
    kind: DatabaseKind,
    writer: Arc<Writer>,
    tables: Vec<String>,
}

impl Database {
    /// Open the database described by `config`.
    ///
    /// Only SQLite is built in; anything else needs an executor passed to
    /// [Database::with_executor].
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        config.validate()?;
        match config.get_kind()? {
            DatabaseKind::Sqlite => {
                let executor = match config.sqlite_path() {
                    Some(p) => SqliteExecutor::open(&p)?,
                    None => SqliteExecutor::open_in_memory()?,
                };
                Self::with_executor(config, executor)
            }
            k @ DatabaseKind::MySql => Err(Error::UnsupportedBackend(k.get_name())),
        }
    }

    /// Build a database around an already-open connection.
    ///
    /// For servers holding several databases, creates and selects `config`'s database before
    /// returning.
    pub fn with_executor(config: &DatabaseConfig, executor: impl Executor) -> Result<Self> {
        config.validate()?;
        let kind = config.get_kind()?;
        let writer = Writer::spawn(config.get_database_name(), Box::new(executor))?;

        if kind.should_create_schema() {
            let name = config.get_database_name();
            info!("Using schema {}", name);
            writer
                .submit(format!("CREATE SCHEMA IF NOT EXISTS {};", name), Params::new())
                .wait()?;
            writer
                .submit(format!("USE {};", name), Params::new())
                .wait()?;
        }

        Ok(Database {
            kind,
            writer: Arc::new(writer),
            tables: vec![],
        })
    }

    pub fn get_kind(&self) -> DatabaseKind {
        self.kind
    }

    /// Describe `E` and create a table for it called `name`, unless one exists already.
    ///
    /// `codecs` supply serialization for attribute types which aren't built in.
    pub fn register_table<E: Entity>(
        &mut self,
        name: &str,
        codecs: impl IntoIterator<Item = Arc<dyn Codec>>,
    ) -> Result<Table<E>> {
        validate_identifier(name)?;
        if self.tables.iter().any(|t| t == name) {
            return Err(Error::TableAlreadyRegistered(name.to_string()));
        }

        let mut registry = CodecRegistry::new();
        for c in codecs {
            registry.register(c);
        }

        let table = Table::new(name, &registry, self.kind, self.writer.clone())?;
        self.tables.push(name.to_string());
        debug!("Tables are now: {}", self.tables.iter().join(", "));
        Ok(table)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(|t| t.as_str())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("kind", &self.kind)
            .field("tables", &self.tables)
            .finish()
    }
}
