//! Statement generation for a registered table.
//!
//! All statement text depends only on the descriptor and dialect, so it is rendered once at
//! registration; only the parameters are built per row.
use log::*;

use crate::codec::Params;
use crate::config::DatabaseKind;
use crate::descriptor::{Entity, EntityDescriptor};
use crate::error::Result;
use crate::value::Value;

const CREATE_TEMPLATE: &str = r#"CREATE TABLE IF NOT EXISTS {{ table }} ({% for c in columns %}{{ c.name }} {{ c.column_type }}{{ c.constraints }}{% if not loop.last %}, {% endif %}{% endfor %})"#;

const INSERT_TEMPLATE: &str = r#"INSERT INTO {{ table }} ({{ columns | join(sep=", ") }}) VALUES ({% for c in columns %}?{% if not loop.last %}, {% endif %}{% endfor %})"#;

#[derive(serde::Serialize)]
struct ColumnContext<'a> {
    name: &'a str,
    column_type: &'a str,
    /// Each constraint with a leading space, or empty.
    constraints: String,
}

fn build_create(descriptor: &EntityDescriptor, kind: DatabaseKind) -> Result<String> {
    let mut columns = vec![];

    for attr in descriptor.iter_attributes() {
        let mut constraints: Vec<&'static str> = vec![];
        let mut column_type = attr.get_column_type();

        match kind {
            DatabaseKind::MySql => {
                if attr.is_primary() {
                    constraints.push("PRIMARY KEY");
                }
                if attr.is_unique() {
                    constraints.push("UNIQUE");
                }
                if attr.is_auto_increment() {
                    constraints.push("AUTO_INCREMENT");
                }
            }
            DatabaseKind::Sqlite => {
                // SQLite only allows AUTOINCREMENT directly after the primary key of an INTEGER
                // column.
                if attr.is_primary() {
                    constraints.push("PRIMARY KEY");
                    // Descriptors only allow auto-increment on integers.
                    if attr.is_auto_increment() {
                        constraints.push("AUTOINCREMENT");
                        column_type = "INTEGER";
                    }
                } else if attr.is_auto_increment() {
                    warn!(
                        "{}.{}: SQLite only supports AUTOINCREMENT on the primary key; ignoring it",
                        descriptor.get_table_name(),
                        attr.get_name()
                    );
                }
                if attr.is_unique() {
                    constraints.push("UNIQUE");
                }
            }
        }

        columns.push(ColumnContext {
            name: attr.get_name(),
            column_type,
            constraints: constraints.iter().map(|c| format!(" {}", c)).collect(),
        });
    }

    let mut context = tera::Context::new();
    context.insert("table", descriptor.get_table_name());
    context.insert("columns", &columns);
    Ok(tera::Tera::one_off(CREATE_TEMPLATE, &context, false)?)
}

fn build_insert(descriptor: &EntityDescriptor) -> Result<String> {
    let mut context = tera::Context::new();
    context.insert("table", descriptor.get_table_name());
    context.insert(
        "columns",
        &descriptor
            .iter_attributes()
            .filter(|a| !a.is_auto_increment())
            .map(|a| a.get_name())
            .collect::<Vec<_>>(),
    );
    Ok(tera::Tera::one_off(INSERT_TEMPLATE, &context, false)?)
}

/// The statements of one table.
#[derive(Clone, Debug)]
pub struct TableStatements {
    create: String,
    insert: String,
    select_by_primary: String,
    delete: String,
    /// One per attribute, in descriptor order.
    updates: Vec<String>,
    /// Reads back the row just inserted, for tables whose primary key is generated.
    select_inserted: Option<String>,
}

impl TableStatements {
    pub fn new(descriptor: &EntityDescriptor, kind: DatabaseKind) -> Result<Self> {
        let table = descriptor.get_table_name();
        let primary = descriptor.get_primary().get_name();

        let select_inserted = if descriptor.get_primary().is_auto_increment() {
            let last_id = match kind {
                DatabaseKind::Sqlite => "last_insert_rowid()",
                DatabaseKind::MySql => "LAST_INSERT_ID()",
            };
            Some(format!("SELECT * FROM {} WHERE {} = {};", table, primary, last_id))
        } else {
            None
        };

        let statements = Self {
            create: build_create(descriptor, kind)?,
            insert: build_insert(descriptor)?,
            select_by_primary: format!("SELECT * FROM {} WHERE {} = ?;", table, primary),
            delete: format!("DELETE FROM {} WHERE {} = ?", table, primary),
            updates: descriptor
                .iter_attributes()
                .map(|a| format!("UPDATE {} SET {} = ? WHERE {} = ?", table, a.get_name(), primary))
                .collect(),
            select_inserted,
        };

        debug!("Create statement for {}: {}", table, statements.create);
        debug!("Insert statement for {}: {}", table, statements.insert);
        Ok(statements)
    }

    pub fn get_create(&self) -> &str {
        &self.create
    }

    pub fn get_insert(&self) -> &str {
        &self.insert
    }

    pub fn get_select_by_primary(&self) -> &str {
        &self.select_by_primary
    }

    pub fn get_delete(&self) -> &str {
        &self.delete
    }

    /// The update statement for the attribute at `index`.
    pub fn get_update(&self, index: usize) -> &str {
        &self.updates[index]
    }

    pub fn get_select_inserted(&self) -> Option<&str> {
        self.select_inserted.as_deref()
    }
}

/// Parameters for the insert statement: every non-auto-increment attribute, in order.
pub(crate) fn insert_params<E: Entity>(
    descriptor: &EntityDescriptor,
    entity: &E,
) -> Result<Params> {
    let mut params = Params::new();
    let mut index = 1;

    for attr in descriptor.iter_attributes().filter(|a| !a.is_auto_increment()) {
        let value = descriptor.value_of(entity, attr)?;
        attr.bind(&mut params, index, &value)?;
        index += 1;
    }

    Ok(params)
}

/// Parameters for the update statement of the attribute at `index`: its value, then the primary key
/// as last stored.
pub(crate) fn update_params<E: Entity>(
    descriptor: &EntityDescriptor,
    entity: &E,
    index: usize,
    key: &Value,
) -> Result<Params> {
    let mut params = Params::new();
    let attr = descriptor.attribute_at(index);
    attr.bind(&mut params, 1, &descriptor.value_of(entity, attr)?)?;
    descriptor.get_primary().bind(&mut params, 2, key)?;
    Ok(params)
}

/// Parameters for statements keyed by nothing but the primary key.
pub(crate) fn primary_params(descriptor: &EntityDescriptor, key: &Value) -> Result<Params> {
    let mut params = Params::new();
    descriptor.get_primary().bind(&mut params, 1, key)?;
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    use crate::codec::CodecRegistry;
    use crate::descriptor::AttributeDecl;
    use crate::value::ValueType;

    fn customers() -> EntityDescriptor {
        EntityDescriptor::from_declarations(
            "Customer",
            "customers",
            vec![
                AttributeDecl::new("id", ValueType::Uuid).primary(),
                AttributeDecl::new("name", ValueType::Text),
                AttributeDecl::new("age", ValueType::Int),
            ],
            &CodecRegistry::new(),
        )
        .unwrap()
    }

    fn counters() -> EntityDescriptor {
        EntityDescriptor::from_declarations(
            "Counter",
            "counters",
            vec![
                AttributeDecl::new("id", ValueType::Long).primary().auto_increment(),
                AttributeDecl::new("label", ValueType::Text).unique(),
            ],
            &CodecRegistry::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_create() {
        let s = TableStatements::new(&customers(), DatabaseKind::Sqlite).unwrap();
        assert_eq!(
            s.get_create(),
            "CREATE TABLE IF NOT EXISTS customers (id VARCHAR(36) PRIMARY KEY UNIQUE, name TEXT, age INT)"
        );
    }

    #[test]
    fn test_create_auto_increment_per_dialect() {
        let s = TableStatements::new(&counters(), DatabaseKind::MySql).unwrap();
        assert_eq!(
            s.get_create(),
            "CREATE TABLE IF NOT EXISTS counters (id INT PRIMARY KEY UNIQUE AUTO_INCREMENT, label TEXT UNIQUE)"
        );

        let s = TableStatements::new(&counters(), DatabaseKind::Sqlite).unwrap();
        assert_eq!(
            s.get_create(),
            "CREATE TABLE IF NOT EXISTS counters (id INTEGER PRIMARY KEY AUTOINCREMENT UNIQUE, label TEXT UNIQUE)"
        );
    }

    #[test]
    fn test_insert_skips_auto_increment() {
        let s = TableStatements::new(&customers(), DatabaseKind::Sqlite).unwrap();
        assert_eq!(
            s.get_insert(),
            "INSERT INTO customers (id, name, age) VALUES (?, ?, ?)"
        );

        let s = TableStatements::new(&counters(), DatabaseKind::Sqlite).unwrap();
        assert_eq!(s.get_insert(), "INSERT INTO counters (label) VALUES (?)");
    }

    #[test]
    fn test_keyed_statements() {
        let s = TableStatements::new(&customers(), DatabaseKind::Sqlite).unwrap();
        assert_eq!(s.get_update(1), "UPDATE customers SET name = ? WHERE id = ?");
        assert_eq!(s.get_delete(), "DELETE FROM customers WHERE id = ?");
        assert_eq!(s.get_select_by_primary(), "SELECT * FROM customers WHERE id = ?;");
        assert_eq!(s.get_select_inserted(), None);
    }

    #[test]
    fn test_select_inserted() {
        let s = TableStatements::new(&counters(), DatabaseKind::Sqlite).unwrap();
        assert_eq!(
            s.get_select_inserted(),
            Some("SELECT * FROM counters WHERE id = last_insert_rowid();")
        );
        let s = TableStatements::new(&counters(), DatabaseKind::MySql).unwrap();
        assert_eq!(
            s.get_select_inserted(),
            Some("SELECT * FROM counters WHERE id = LAST_INSERT_ID();")
        );
    }
}
