//! Registered tables.
use std::marker::PhantomData;
use std::sync::Arc;

use log::*;

use crate::codec::{CodecRegistry, Params};
use crate::config::DatabaseKind;
use crate::descriptor::{Entity, EntityDescriptor};
use crate::error::{Error, Result};
use crate::query::Query;
use crate::row::Row;
use crate::statements::{self, TableStatements};
use crate::value::Column;
use crate::writer::Writer;

/// Everything rows of one table share.
pub(crate) struct TableShared {
    descriptor: EntityDescriptor,
    statements: TableStatements,
    kind: DatabaseKind,
    writer: Arc<Writer>,
}

impl TableShared {
    pub(crate) fn get_descriptor(&self) -> &EntityDescriptor {
        &self.descriptor
    }

    pub(crate) fn get_statements(&self) -> &TableStatements {
        &self.statements
    }

    pub(crate) fn get_writer(&self) -> &Writer {
        &self.writer
    }
}

/// Handle to a table holding entities of type `E`.  Cheap to clone.
pub struct Table<E: Entity> {
    shared: Arc<TableShared>,
    _phantom: PhantomData<fn() -> E>,
}

impl<E: Entity> Clone for Table<E> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            _phantom: PhantomData,
        }
    }
}

impl<E: Entity> Table<E> {
    /// Describe `E`, then create its table if needed.  Blocks until the table exists.
    pub(crate) fn new(
        name: &str,
        registry: &CodecRegistry,
        kind: DatabaseKind,
        writer: Arc<Writer>,
    ) -> Result<Self> {
        let descriptor = EntityDescriptor::new::<E>(name, registry)?;
        let statements = TableStatements::new(&descriptor, kind)?;
        writer
            .submit(statements.get_create(), Params::new())
            .wait()?;

        info!("Registered table {} for {}", name, E::ENTITY_NAME);
        Ok(Self {
            shared: Arc::new(TableShared {
                descriptor,
                statements,
                kind,
                writer,
            }),
            _phantom: PhantomData,
        })
    }

    pub fn get_name(&self) -> &str {
        self.shared.descriptor.get_table_name()
    }

    pub fn get_descriptor(&self) -> &EntityDescriptor {
        &self.shared.descriptor
    }

    pub fn create_sql(&self) -> &str {
        self.shared.statements.get_create()
    }

    pub fn insert_sql(&self) -> &str {
        self.shared.statements.get_insert()
    }

    /// The statement which writes `attribute`, or `None` if there's no such attribute.
    pub fn update_sql(&self, attribute: &str) -> Option<&str> {
        self.shared
            .descriptor
            .index_of(attribute)
            .map(|i| self.shared.statements.get_update(i))
    }

    pub fn delete_sql(&self) -> &str {
        self.shared.statements.get_delete()
    }

    fn rehydrate(&self, row: &crate::codec::ResultRow) -> Result<Row<E>> {
        let entity = self.shared.descriptor.read_entity::<E>(row)?;
        Row::new(entity, self.shared.clone())
    }

    /// Insert a new row, built by running `initializer` against `E::default()`.  Blocks until the
    /// insert is done.
    ///
    /// If the primary key is generated by the database, the returned row holds the generated key.
    pub fn insert_row(&self, initializer: impl FnOnce(&mut E)) -> Result<Row<E>> {
        let mut entity = E::default();
        initializer(&mut entity);
        let params = statements::insert_params(&self.shared.descriptor, &entity)?;

        let mut row = Row::new(entity, self.shared.clone())?;
        row.mark_all_dirty()?;
        row.clean_without_update();

        self.shared
            .writer
            .submit(self.shared.statements.get_insert(), params)
            .wait()?;

        if let Some(sql) = self.shared.statements.get_select_inserted() {
            let stored = self.shared.writer.query(sql, Params::new())?;
            let first = stored.first().ok_or_else(|| {
                Error::Execution(format!(
                    "Could not read back the row inserted into {}",
                    self.get_name()
                ))
            })?;
            row = self.rehydrate(first)?;
        }

        Ok(row)
    }

    /// Look a row up by primary key.  The key must be of the primary key's declared type.
    pub fn get_row<K: Column>(&self, key: K) -> Result<Option<Row<E>>> {
        let primary = self.shared.descriptor.get_primary();
        let found = K::value_type();
        if found != primary.get_value_type() {
            return Err(Error::TypeMismatch {
                expected: primary.get_value_type(),
                found,
            });
        }

        let mut params = Params::new();
        primary.bind(&mut params, 1, &key.to_value())?;
        let rows = self
            .shared
            .writer
            .query(self.shared.statements.get_select_by_primary(), params)?;

        rows.first().map(|r| self.rehydrate(r)).transpose()
    }

    /// Run a query, returning every matching row.
    pub fn query(&self, query: &Query) -> Result<Vec<Row<E>>> {
        for field in query.field_names() {
            if self.shared.descriptor.index_of(field).is_none() {
                return Err(Error::UnknownAttribute {
                    table: self.get_name().to_string(),
                    attribute: field.to_string(),
                });
            }
        }

        let sql = query.to_sql(self.get_name(), self.shared.kind);
        self.shared
            .writer
            .query(sql, Params::new())?
            .iter()
            .map(|r| self.rehydrate(r))
            .collect()
    }
}

impl<E: Entity> std::fmt::Debug for Table<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.get_name())
            .field("entity", &E::ENTITY_NAME)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    use crate::executor::SqliteExecutor;
    use crate::query::{Condition, QueryBuilder};

    #[derive(Clone, Debug, Default, PartialEq, crate::Entity)]
    struct Counter {
        #[ammo_orm(primary, auto_increment)]
        id: i64,
        #[ammo_orm(unique)]
        label: String,
        hits: i32,
    }

    fn counters() -> Table<Counter> {
        let writer = Arc::new(
            Writer::spawn(
                "test",
                Box::new(SqliteExecutor::open_in_memory().unwrap()),
            )
            .unwrap(),
        );
        Table::new("counters", &Default::default(), DatabaseKind::Sqlite, writer).unwrap()
    }

    #[test]
    fn test_generated_keys() {
        let table = counters();
        let a = table.insert_row(|c| c.label = "a".into()).unwrap();
        let b = table.insert_row(|c| c.label = "b".into()).unwrap();
        assert_eq!(a.id, 1);
        assert_eq!(b.id, 2);
        assert_eq!(table.get_row(2i64).unwrap().unwrap().label, "b");
    }

    #[test]
    fn test_unique_violation_surfaces() {
        let table = counters();
        table.insert_row(|c| c.label = "a".into()).unwrap();
        assert!(matches!(
            table.insert_row(|c| c.label = "a".into()),
            Err(Error::Sqlite(_))
        ));
    }

    #[test]
    fn test_key_type_checked() {
        let table = counters();
        assert!(matches!(
            table.get_row("1".to_string()),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            table.get_row(1i32),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_query() {
        let table = counters();
        for (label, hits) in [("a", 5), ("b", 1), ("c", 3), ("d", 9)] {
            table
                .insert_row(|c| {
                    c.label = label.into();
                    c.hits = hits;
                })
                .unwrap();
        }

        let query = QueryBuilder::new()
            .filter_with_condition(Condition::greater_than("hits", 2))
            .sort_descending("hits")
            .limit(2)
            .unwrap()
            .build();
        let labels = table
            .query(&query)
            .unwrap()
            .into_iter()
            .map(|r| r.into_inner().label)
            .collect::<Vec<_>>();
        assert_eq!(labels, vec!["d", "a"]);

        let bad = QueryBuilder::new().sort_ascending("missing").build();
        assert!(matches!(
            table.query(&bad),
            Err(Error::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn test_statements() {
        let table = counters();
        assert_eq!(table.insert_sql(), "INSERT INTO counters (label, hits) VALUES (?, ?)");
        assert_eq!(
            table.update_sql("hits"),
            Some("UPDATE counters SET hits = ? WHERE id = ?")
        );
        assert_eq!(table.update_sql("nope"), None);
        assert_eq!(table.delete_sql(), "DELETE FROM counters WHERE id = ?");
        assert!(table.create_sql().starts_with("CREATE TABLE IF NOT EXISTS counters ("));
    }
}
