//! Values of attributes.
//!
//! There are three layers:
//!
//! - Rust types, which implement [Column];
//! - [Value], the runtime-typed form every attribute passes through, tagged by a [ValueType];
//! - [Wire], the form that is actually bound to a statement or read out of a result row.
//!
//! Codecs translate between the last two; [Column] translates between the first two.
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::error::DecodeError;

/// The type tag of a value.  Codecs are looked up by this.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Text,
    Uuid,
    /// A unit-only enumeration, stored by variant name.
    Enum(&'static str),
    /// A type which can describe itself as a string; see [crate::Adapt].
    Adapted(&'static str),
    /// Anything else.  Needs a user-registered codec.
    Custom(&'static str),
}

impl ValueType {
    /// Integer-like types, which are stored as `INT`.
    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            ValueType::Bool | ValueType::Byte | ValueType::Short | ValueType::Int | ValueType::Long
        )
    }

    pub fn is_floating(&self) -> bool {
        matches!(self, ValueType::Float | ValueType::Double)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Bool => f.write_str("bool"),
            ValueType::Byte => f.write_str("i8"),
            ValueType::Short => f.write_str("i16"),
            ValueType::Int => f.write_str("i32"),
            ValueType::Long => f.write_str("i64"),
            ValueType::Float => f.write_str("f32"),
            ValueType::Double => f.write_str("f64"),
            ValueType::Text => f.write_str("String"),
            ValueType::Uuid => f.write_str("Uuid"),
            ValueType::Enum(n) | ValueType::Adapted(n) | ValueType::Custom(n) => f.write_str(n),
        }
    }
}

/// A value of a type the engine knows nothing about, handled by a user codec.
#[derive(Clone)]
pub struct CustomValue {
    type_name: &'static str,
    payload: Arc<dyn Any + Send + Sync>,
}

impl CustomValue {
    pub fn new<T: Any + Send + Sync>(type_name: &'static str, payload: T) -> Self {
        Self {
            type_name,
            payload: Arc::new(payload),
        }
    }

    pub fn get_type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref()
    }
}

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CustomValue({})", self.type_name)
    }
}

/// An attribute value, tagged with its runtime type.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Text(String),
    Uuid(Uuid),
    Enum {
        enumeration: &'static str,
        variant: String,
    },
    Adapted {
        type_name: &'static str,
        text: String,
    },
    Custom(CustomValue),
}

impl Value {
    /// The runtime type of this value, or `None` for null.
    pub fn value_type(&self) -> Option<ValueType> {
        Some(match self {
            Value::Null => return None,
            Value::Bool(_) => ValueType::Bool,
            Value::Byte(_) => ValueType::Byte,
            Value::Short(_) => ValueType::Short,
            Value::Int(_) => ValueType::Int,
            Value::Long(_) => ValueType::Long,
            Value::Float(_) => ValueType::Float,
            Value::Double(_) => ValueType::Double,
            Value::Text(_) => ValueType::Text,
            Value::Uuid(_) => ValueType::Uuid,
            Value::Enum { enumeration, .. } => ValueType::Enum(*enumeration),
            Value::Adapted { type_name, .. } => ValueType::Adapted(*type_name),
            Value::Custom(c) => ValueType::Custom(c.type_name),
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    fn describe(&self) -> String {
        match self.value_type() {
            Some(t) => t.to_string(),
            None => "NULL".to_string(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Short(a), Value::Short(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Uuid(a), Value::Uuid(b)) => a == b,
            (
                Value::Enum {
                    enumeration: e1,
                    variant: v1,
                },
                Value::Enum {
                    enumeration: e2,
                    variant: v2,
                },
            ) => e1 == e2 && v1 == v2,
            (
                Value::Adapted {
                    type_name: t1,
                    text: x1,
                },
                Value::Adapted {
                    type_name: t2,
                    text: x2,
                },
            ) => t1 == t2 && x1 == x2,
            // We can't look inside custom payloads, so only the same allocation is equal.
            (Value::Custom(a), Value::Custom(b)) => {
                a.type_name == b.type_name && Arc::ptr_eq(&a.payload, &b.payload)
            }
            _ => false,
        }
    }
}

/// The stored form of a value, as bound to statements and read from result rows.
#[derive(Clone, Debug, PartialEq)]
pub enum Wire {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Wire {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Wire::Null => "NULL",
            Wire::Integer(_) => "INTEGER",
            Wire::Real(_) => "REAL",
            Wire::Text(_) => "TEXT",
        }
    }

    pub fn as_integer(&self) -> Result<i64, DecodeError> {
        match self {
            Wire::Integer(i) => Ok(*i),
            other => Err(DecodeError::WrongWire {
                expected: "INTEGER",
                found: other.kind_name(),
            }),
        }
    }

    /// Reals also accept integers, since SQLite will happily store `1.0` in a REAL column as `1`.
    pub fn as_real(&self) -> Result<f64, DecodeError> {
        match self {
            Wire::Real(r) => Ok(*r),
            Wire::Integer(i) => Ok(*i as f64),
            other => Err(DecodeError::WrongWire {
                expected: "REAL",
                found: other.kind_name(),
            }),
        }
    }

    pub fn into_text(self) -> Result<String, DecodeError> {
        match self {
            Wire::Text(s) => Ok(s),
            other => Err(DecodeError::WrongWire {
                expected: "TEXT",
                found: other.kind_name(),
            }),
        }
    }

    pub(crate) fn from_value_ref(value: rusqlite::types::ValueRef<'_>) -> Wire {
        use rusqlite::types::ValueRef;

        match value {
            ValueRef::Null => Wire::Null,
            ValueRef::Integer(i) => Wire::Integer(i),
            ValueRef::Real(r) => Wire::Real(r),
            ValueRef::Text(t) | ValueRef::Blob(t) => {
                Wire::Text(String::from_utf8_lossy(t).into_owned())
            }
        }
    }
}

impl rusqlite::ToSql for Wire {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        use rusqlite::types::{ToSqlOutput, ValueRef};

        Ok(match self {
            Wire::Null => ToSqlOutput::Borrowed(ValueRef::Null),
            Wire::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Wire::Real(r) => ToSqlOutput::Borrowed(ValueRef::Real(*r)),
            Wire::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

impl DecodeError {
    pub(crate) fn wrong_type(expected: ValueType, found: &Value) -> Self {
        DecodeError::WrongType {
            expected: expected.to_string(),
            found: found.describe(),
        }
    }
}

/// A Rust type which can be the type of a mapped attribute.
///
/// Implemented here for the primitives, `String`, `Uuid` and `Option<T>`.  Enumerations and
/// adapters get theirs from `#[derive(Enumeration)]` and `#[derive(Adapted)]`.  Anything else can
/// implement it by hand, usually producing [Value::Custom] and shipping a codec for it at table
/// registration.
pub trait Column: Sized {
    fn value_type() -> ValueType;

    fn to_value(&self) -> Value;

    fn from_value(value: Value) -> Result<Self, DecodeError>;
}

macro_rules! builtin_column {
    ($ty:ty, $variant:ident) => {
        impl Column for $ty {
            fn value_type() -> ValueType {
                ValueType::$variant
            }

            fn to_value(&self) -> Value {
                Value::$variant(self.clone())
            }

            fn from_value(value: Value) -> Result<Self, DecodeError> {
                match value {
                    Value::$variant(v) => Ok(v),
                    other => Err(DecodeError::wrong_type(ValueType::$variant, &other)),
                }
            }
        }
    };
}

builtin_column!(bool, Bool);
builtin_column!(i8, Byte);
builtin_column!(i16, Short);
builtin_column!(i32, Int);
builtin_column!(i64, Long);
builtin_column!(f32, Float);
builtin_column!(f64, Double);
builtin_column!(String, Text);
builtin_column!(Uuid, Uuid);

/// Nullable attributes.  Same column type as `T`.
impl<T: Column> Column for Option<T> {
    fn value_type() -> ValueType {
        T::value_type()
    }

    fn to_value(&self) -> Value {
        match self {
            Some(v) => v.to_value(),
            None => Value::Null,
        }
    }

    fn from_value(value: Value) -> Result<Self, DecodeError> {
        match value {
            Value::Null => Ok(None),
            v => Ok(Some(T::from_value(v)?)),
        }
    }
}

/// A unit-only enum stored by variant name.  Derive it with `#[derive(Enumeration)]`.
pub trait Enumeration: Sized + 'static {
    const NAME: &'static str;

    fn variant_name(&self) -> &'static str;

    fn from_variant_name(name: &str) -> Option<Self>;
}

/// Used by the `Enumeration` derive to implement [Column].
#[doc(hidden)]
pub fn enumeration_to_value<E: Enumeration>(e: &E) -> Value {
    Value::Enum {
        enumeration: E::NAME,
        variant: e.variant_name().to_string(),
    }
}

#[doc(hidden)]
pub fn enumeration_from_value<E: Enumeration>(value: Value) -> Result<E, DecodeError> {
    match value {
        Value::Enum { variant, .. } | Value::Text(variant) => {
            E::from_variant_name(&variant).ok_or(DecodeError::UnknownVariant {
                enumeration: E::NAME,
                variant,
            })
        }
        other => Err(DecodeError::wrong_type(ValueType::Enum(E::NAME), &other)),
    }
}
