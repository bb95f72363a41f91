use crate::value::ValueType;

/// Failures converting between [crate::Value], [crate::Wire] and Rust types.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum DecodeError {
    #[error("Expected a value of type {expected} but got {found}")]
    WrongType { expected: String, found: String },

    #[error("Expected a stored {expected} but the column holds {found}")]
    WrongWire {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Integer {value} does not fit in {target}")]
    OutOfRange { value: i64, target: &'static str },

    #[error("Could not parse {input:?} as a UUID")]
    InvalidUuid { input: String },

    #[error("{variant:?} is not a variant of {enumeration}")]
    UnknownVariant {
        enumeration: &'static str,
        variant: String,
    },

    #[error("No element codec is registered under the id {0:?}")]
    UnknownElementCodec(String),

    #[error("Malformed adapted collection: {0}")]
    MalformedCollection(String),

    #[error("Could not read {type_name}: {message}")]
    Adapter {
        type_name: &'static str,
        message: String,
    },
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("{entity} has no attribute marked as the primary key")]
    NoPrimaryKey { entity: &'static str },

    #[error("{entity} marks both {first} and {second} as the primary key")]
    AmbiguousPrimaryKey {
        entity: &'static str,
        first: &'static str,
        second: &'static str,
    },

    #[error("Could not determine a column type for attribute {attribute} of type {value_type}")]
    UnknownColumnType {
        attribute: &'static str,
        value_type: ValueType,
    },

    #[error("{entity}.{attribute} is auto-incremented, but it is {value_type} rather than an integer")]
    NonIntegralAutoIncrement {
        entity: &'static str,
        attribute: &'static str,
        value_type: ValueType,
    },

    #[error("{entity} declares the attribute {attribute} more than once")]
    DuplicateAttribute {
        entity: &'static str,
        attribute: &'static str,
    },

    #[error("A table with the name {0:?} is already registered")]
    TableAlreadyRegistered(String),

    #[error("Invalid database configuration: {0}")]
    InvalidConfig(String),

    #[error("No built-in executor exists for {0}; supply one with Database::with_executor")]
    UnsupportedBackend(&'static str),

    #[error("No codec found for attribute {attribute}; use primitives, String, Uuid, enumerations, adapters, or register a codec for {value_type}")]
    NoCodec {
        attribute: String,
        value_type: ValueType,
    },

    #[error("Could not read attribute {attribute} from the result row")]
    NoGetter { attribute: String },

    #[error("Primary key is {expected}, not {found}")]
    TypeMismatch {
        expected: ValueType,
        found: ValueType,
    },

    #[error("Table {table} has no attribute named {attribute}")]
    UnknownAttribute { table: String, attribute: String },

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("This row is already deleted")]
    AlreadyDeleted,

    #[error("Decoding error: {0}")]
    Decode(#[from] DecodeError),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Statement failed: {0}")]
    Execution(String),

    #[error("The writer thread has stopped")]
    WriterStopped,

    #[error("Could not start the writer thread: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not render statement template: {0}")]
    Template(#[from] tera::Error),

    #[error("Could not parse configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
