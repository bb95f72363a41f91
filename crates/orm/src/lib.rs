//! A small object-relational mapper.
//!
//! Structs deriving [Entity] map onto tables, one attribute per column.  [Database::register_table]
//! describes the struct and creates the table; the returned [Table] inserts, looks up and queries
//! [Row]s.  A row remembers which attributes were changed and [Row::clean] writes exactly those,
//! one `UPDATE` each.
//!
//! All statements for a database run in order on a single writer thread.  Writes hand back tickets
//! instead of blocking, and reads wait behind every write submitted before them.
//!
//! Attribute types are primitives, `String`, `Uuid`, `Option` of those, enumerations
//! (`#[derive(Enumeration)]`), adapters (`#[derive(Adapted)]`, including [AdaptedList]), or
//! anything with a [Codec] passed at registration.

// Lets the derives refer to `::ammo_orm` from inside this crate's own tests.
extern crate self as ammo_orm;

mod adapted;
mod codec;
mod config;
mod database;
mod descriptor;
mod error;
mod executor;
pub mod query;
mod row;
mod statements;
mod table;
mod value;
mod writer;

pub use adapted::*;
pub use codec::*;
pub use config::*;
pub use database::*;
pub use descriptor::*;
pub use error::*;
pub use executor::{Executor, SqliteExecutor};
pub use query::{Condition, Query, QueryBuilder, Sort};
pub use row::*;
pub use statements::TableStatements;
pub use table::Table;
pub use value::*;
pub use writer::{PendingWrites, WriteTicket};

pub use ammo_orm_derive::{Adapted, Entity, Enumeration};
