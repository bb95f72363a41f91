//! Configuration for opening a database.
use std::path::PathBuf;

use crate::error::{Error, Result};

/// The SQL dialects we generate statements for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    Sqlite,
    MySql,
}

impl DatabaseKind {
    /// Work out the kind of database from a connection URL, e.g. `sqlite:data.db` or
    /// `mysql://host/db`.
    pub fn from_url(url: &str) -> Option<DatabaseKind> {
        if url.starts_with("sqlite:") {
            Some(DatabaseKind::Sqlite)
        } else if url.starts_with("mysql:") {
            Some(DatabaseKind::MySql)
        } else {
            None
        }
    }

    pub fn get_name(&self) -> &'static str {
        match self {
            DatabaseKind::Sqlite => "sqlite",
            DatabaseKind::MySql => "mysql",
        }
    }

    /// Whether this kind of server holds several databases, one of which we must create and select.
    pub fn should_create_schema(&self) -> bool {
        matches!(self, DatabaseKind::MySql)
    }
}

fn default_database_name() -> String {
    "ammo_orm".into()
}

/// Where the database lives and how to log into it.
#[derive(Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct DatabaseConfig {
    url: String,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
    /// Only used by servers which hold several databases.
    #[serde(default = "default_database_name")]
    database_name: String,
}

/// The password is deliberately left out.
impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("database_name", &self.database_name)
            .finish()
    }
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            database_name: default_database_name(),
        }
    }

    /// An in-memory SQLite database.  Mostly useful for tests.
    pub fn in_memory() -> Self {
        Self::new("sqlite::memory:")
    }

    pub fn sqlite_file(path: impl Into<PathBuf>) -> Self {
        Self::new(format!("sqlite:{}", path.into().display()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: DatabaseConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_database_name(mut self, name: impl Into<String>) -> Self {
        self.database_name = name.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.get_kind()?;
        if self.database_name.is_empty()
            || !self
                .database_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(Error::InvalidConfig(format!(
                "{:?} is not a valid database name",
                self.database_name
            )));
        }
        Ok(())
    }

    pub fn get_url(&self) -> &str {
        &self.url
    }

    pub fn get_username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn get_password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn get_database_name(&self) -> &str {
        &self.database_name
    }

    pub fn get_kind(&self) -> Result<DatabaseKind> {
        DatabaseKind::from_url(&self.url)
            .ok_or_else(|| Error::InvalidConfig(format!("Unrecognized database url {}", self.url)))
    }

    /// For SQLite urls, where the database lives.  `None` means in memory.
    pub(crate) fn sqlite_path(&self) -> Option<PathBuf> {
        let rest = self.url.strip_prefix("sqlite:")?;
        if rest == ":memory:" || rest.is_empty() {
            None
        } else {
            Some(PathBuf::from(rest))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(DatabaseKind::from_url("sqlite:test.db"), Some(DatabaseKind::Sqlite));
        assert_eq!(DatabaseKind::from_url("mysql://localhost/x"), Some(DatabaseKind::MySql));
        assert_eq!(DatabaseKind::from_url("postgres://x"), None);
        assert!(DatabaseKind::MySql.should_create_schema());
        assert!(!DatabaseKind::Sqlite.should_create_schema());
    }

    #[test]
    fn test_json() {
        let config = DatabaseConfig::from_json(
            r#"{"url": "mysql://localhost:3306", "username": "root", "password": "hunter2"}"#,
        )
        .unwrap();
        assert_eq!(config.get_kind().unwrap(), DatabaseKind::MySql);
        assert_eq!(config.get_database_name(), "ammo_orm");
        assert_eq!(config.get_username(), Some("root"));
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_invalid() {
        assert!(DatabaseConfig::from_json(r#"{"url": "oracle:x"}"#).is_err());
        let injected = r#"{"url": "mysql://x", "database_name": "a; DROP"}"#;
        assert!(DatabaseConfig::from_json(injected).is_err());
    }

    #[test]
    fn test_sqlite_paths() {
        assert_eq!(DatabaseConfig::in_memory().sqlite_path(), None);
        assert_eq!(
            DatabaseConfig::new("sqlite:data/test.db").sqlite_path(),
            Some(PathBuf::from("data/test.db"))
        );
    }
}
