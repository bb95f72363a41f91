//! Codecs: how a [Value] of some [ValueType] becomes a [Wire] and back.
//!
//! The registry resolves built-in codecs first, in a fixed order (text, UUID, the numeric families,
//! adapters, enumerations), and only then looks at codecs registered for a table.  Null never
//! reaches a codec: callers should go through [encode] and [decode], which pass nulls straight
//! through.
use std::collections::HashMap;
use std::sync::Arc;

use lazy_static::lazy_static;
use uuid::Uuid;

use crate::error::DecodeError;
use crate::value::{Value, ValueType, Wire};

/// Positional statement parameters, 1-based like SQL placeholders.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params {
    values: Vec<Wire>,
}

impl Params {
    pub fn new() -> Self {
        Default::default()
    }

    /// Bind `wire` to the 1-based `index`, filling any gap with nulls.
    pub fn bind(&mut self, index: usize, wire: Wire) {
        debug_assert!(index > 0, "Parameters are 1-based");
        let slot = index.saturating_sub(1);
        if self.values.len() <= slot {
            self.values.resize(slot + 1, Wire::Null);
        }
        self.values[slot] = wire;
    }

    pub fn as_slice(&self) -> &[Wire] {
        &self.values[..]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A fully-read row of a result set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultRow {
    columns: Vec<(String, Wire)>,
}

impl ResultRow {
    pub fn new(columns: Vec<(String, Wire)>) -> Self {
        Self { columns }
    }

    /// Get a column by name.  Exact matches win; otherwise falls back to an ASCII case-insensitive
    /// match, since some servers fold identifiers.
    pub fn get(&self, column: &str) -> Option<&Wire> {
        self.columns
            .iter()
            .find(|(n, _)| n == column)
            .or_else(|| {
                self.columns
                    .iter()
                    .find(|(n, _)| n.eq_ignore_ascii_case(column))
            })
            .map(|(_, w)| w)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Wire)> {
        self.columns.iter().map(|(n, w)| (n.as_str(), w))
    }
}

/// Serializes one type of value.
pub trait Codec: Send + Sync {
    /// The type of values this codec handles.  Registration is keyed by this.
    fn value_type(&self) -> ValueType;

    /// Column type for attributes of this type, when nothing more specific applies.
    fn column_type(&self) -> &str;

    fn serialize(&self, value: &Value) -> Result<Wire, DecodeError>;

    fn deserialize(&self, wire: Wire) -> Result<Value, DecodeError>;

    /// Put an already-serialized value into a statement.
    fn bind(&self, params: &mut Params, index: usize, wire: Wire) {
        params.bind(index, wire);
    }

    /// Pull the serialized value for `column` out of a row, or `None` if this codec can't find it.
    fn read(&self, row: &ResultRow, column: &str) -> Option<Wire> {
        row.get(column).cloned()
    }
}

/// Serialize through `codec`, letting nulls through untouched.
pub fn encode(codec: &dyn Codec, value: &Value) -> Result<Wire, DecodeError> {
    match value {
        Value::Null => Ok(Wire::Null),
        v => codec.serialize(v),
    }
}

/// Deserialize through `codec`, letting nulls through untouched.
pub fn decode(codec: &dyn Codec, wire: Wire) -> Result<Value, DecodeError> {
    match wire {
        Wire::Null => Ok(Value::Null),
        w => codec.deserialize(w),
    }
}

fn expect_type(expected: ValueType, value: &Value) -> Result<(), DecodeError> {
    match value.value_type() {
        Some(t) if t == expected => Ok(()),
        _ => Err(DecodeError::wrong_type(expected, value)),
    }
}

struct TextCodec;

impl Codec for TextCodec {
    fn value_type(&self) -> ValueType {
        ValueType::Text
    }

    fn column_type(&self) -> &str {
        "TEXT"
    }

    fn serialize(&self, value: &Value) -> Result<Wire, DecodeError> {
        match value {
            Value::Text(s) => Ok(Wire::Text(s.clone())),
            other => Err(DecodeError::wrong_type(ValueType::Text, other)),
        }
    }

    fn deserialize(&self, wire: Wire) -> Result<Value, DecodeError> {
        Ok(Value::Text(wire.into_text()?))
    }
}

struct UuidCodec;

impl Codec for UuidCodec {
    fn value_type(&self) -> ValueType {
        ValueType::Uuid
    }

    fn column_type(&self) -> &str {
        "VARCHAR(36)"
    }

    fn serialize(&self, value: &Value) -> Result<Wire, DecodeError> {
        match value {
            Value::Uuid(u) => Ok(Wire::Text(u.to_hyphenated().to_string())),
            other => Err(DecodeError::wrong_type(ValueType::Uuid, other)),
        }
    }

    fn deserialize(&self, wire: Wire) -> Result<Value, DecodeError> {
        let text = wire.into_text()?;
        let uuid = Uuid::parse_str(&text).map_err(|_| DecodeError::InvalidUuid { input: text })?;
        Ok(Value::Uuid(uuid))
    }
}

/// Every integer-like type, bools included, goes to an `INT` column.
struct IntegerCodec(ValueType);

impl Codec for IntegerCodec {
    fn value_type(&self) -> ValueType {
        self.0
    }

    fn column_type(&self) -> &str {
        "INT"
    }

    fn serialize(&self, value: &Value) -> Result<Wire, DecodeError> {
        expect_type(self.0, value)?;
        let i = match value {
            Value::Bool(b) => i64::from(*b),
            Value::Byte(b) => i64::from(*b),
            Value::Short(s) => i64::from(*s),
            Value::Int(i) => i64::from(*i),
            Value::Long(l) => *l,
            other => return Err(DecodeError::wrong_type(self.0, other)),
        };
        Ok(Wire::Integer(i))
    }

    fn deserialize(&self, wire: Wire) -> Result<Value, DecodeError> {
        use std::convert::TryFrom;

        let i = wire.as_integer()?;
        let out_of_range = |target| DecodeError::OutOfRange { value: i, target };
        Ok(match self.0 {
            ValueType::Bool => Value::Bool(i != 0),
            ValueType::Byte => Value::Byte(i8::try_from(i).map_err(|_| out_of_range("i8"))?),
            ValueType::Short => Value::Short(i16::try_from(i).map_err(|_| out_of_range("i16"))?),
            ValueType::Int => Value::Int(i32::try_from(i).map_err(|_| out_of_range("i32"))?),
            _ => Value::Long(i),
        })
    }
}

struct RealCodec(ValueType);

impl Codec for RealCodec {
    fn value_type(&self) -> ValueType {
        self.0
    }

    fn column_type(&self) -> &str {
        "REAL"
    }

    fn serialize(&self, value: &Value) -> Result<Wire, DecodeError> {
        match value {
            Value::Float(f) if self.0 == ValueType::Float => Ok(Wire::Real(f64::from(*f))),
            Value::Double(d) if self.0 == ValueType::Double => Ok(Wire::Real(*d)),
            other => Err(DecodeError::wrong_type(self.0, other)),
        }
    }

    fn deserialize(&self, wire: Wire) -> Result<Value, DecodeError> {
        let r = wire.as_real()?;
        Ok(match self.0 {
            ValueType::Float => Value::Float(r as f32),
            _ => Value::Double(r),
        })
    }
}

/// Adapters already know how to turn themselves into text; this just carries that text.
struct AdaptedCodec(&'static str);

impl Codec for AdaptedCodec {
    fn value_type(&self) -> ValueType {
        ValueType::Adapted(self.0)
    }

    fn column_type(&self) -> &str {
        "TEXT"
    }

    fn serialize(&self, value: &Value) -> Result<Wire, DecodeError> {
        match value {
            Value::Adapted { type_name, text } if *type_name == self.0 => {
                Ok(Wire::Text(text.clone()))
            }
            other => Err(DecodeError::wrong_type(self.value_type(), other)),
        }
    }

    fn deserialize(&self, wire: Wire) -> Result<Value, DecodeError> {
        Ok(Value::Adapted {
            type_name: self.0,
            text: wire.into_text()?,
        })
    }
}

/// Enumerations are stored by variant name.
struct EnumCodec(&'static str);

impl Codec for EnumCodec {
    fn value_type(&self) -> ValueType {
        ValueType::Enum(self.0)
    }

    fn column_type(&self) -> &str {
        "TEXT"
    }

    fn serialize(&self, value: &Value) -> Result<Wire, DecodeError> {
        match value {
            Value::Enum {
                enumeration,
                variant,
            } if *enumeration == self.0 => Ok(Wire::Text(variant.clone())),
            other => Err(DecodeError::wrong_type(self.value_type(), other)),
        }
    }

    fn deserialize(&self, wire: Wire) -> Result<Value, DecodeError> {
        Ok(Value::Enum {
            enumeration: self.0,
            variant: wire.into_text()?,
        })
    }
}

lazy_static! {
    static ref TEXT: Arc<dyn Codec> = Arc::new(TextCodec);
    static ref UUID: Arc<dyn Codec> = Arc::new(UuidCodec);
    static ref BOOL: Arc<dyn Codec> = Arc::new(IntegerCodec(ValueType::Bool));
    static ref INT: Arc<dyn Codec> = Arc::new(IntegerCodec(ValueType::Int));
    static ref DOUBLE: Arc<dyn Codec> = Arc::new(RealCodec(ValueType::Double));
    static ref FLOAT: Arc<dyn Codec> = Arc::new(RealCodec(ValueType::Float));
    static ref SHORT: Arc<dyn Codec> = Arc::new(IntegerCodec(ValueType::Short));
    static ref BYTE: Arc<dyn Codec> = Arc::new(IntegerCodec(ValueType::Byte));
    static ref LONG: Arc<dyn Codec> = Arc::new(IntegerCodec(ValueType::Long));
}

/// Maps value types to codecs.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    registered: HashMap<ValueType, Arc<dyn Codec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    /// Register a codec for its [Codec::value_type].  Replaces any codec previously registered for
    /// that type.
    ///
    /// Built-in types always resolve to their built-in codec, so registering one for e.g.
    /// [ValueType::Text] has no effect on lookups.
    pub fn register(&mut self, codec: Arc<dyn Codec>) {
        let value_type = codec.value_type();
        if Self::find_builtin(value_type).is_some() {
            log::warn!(
                "Registered a codec for {}, which is shadowed by the built-in codec",
                value_type
            );
        }
        self.registered.insert(value_type, codec);
    }

    fn find_builtin(value_type: ValueType) -> Option<Arc<dyn Codec>> {
        let found = match value_type {
            ValueType::Text => TEXT.clone(),
            ValueType::Uuid => UUID.clone(),
            ValueType::Int => INT.clone(),
            ValueType::Double => DOUBLE.clone(),
            ValueType::Float => FLOAT.clone(),
            ValueType::Short => SHORT.clone(),
            ValueType::Byte => BYTE.clone(),
            ValueType::Long => LONG.clone(),
            ValueType::Bool => BOOL.clone(),
            ValueType::Adapted(name) => Arc::new(AdaptedCodec(name)),
            ValueType::Enum(name) => Arc::new(EnumCodec(name)),
            ValueType::Custom(_) => return None,
        };
        Some(found)
    }

    /// Find the codec for a type: built-ins first, then registered codecs.
    pub fn find(&self, value_type: ValueType) -> Option<Arc<dyn Codec>> {
        Self::find_builtin(value_type).or_else(|| self.registered.get(&value_type).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct PointCodec;

    impl Codec for PointCodec {
        fn value_type(&self) -> ValueType {
            ValueType::Custom("Point")
        }

        fn column_type(&self) -> &str {
            "VARCHAR(64)"
        }

        fn serialize(&self, value: &Value) -> Result<Wire, DecodeError> {
            match value {
                Value::Custom(c) => {
                    let (x, y) = c.downcast_ref::<(i32, i32)>().ok_or_else(|| DecodeError::Adapter {
                        type_name: "Point",
                        message: "payload isn't a point".into(),
                    })?;
                    Ok(Wire::Text(format!("{}:{}", x, y)))
                }
                other => Err(DecodeError::wrong_type(self.value_type(), other)),
            }
        }

        fn deserialize(&self, wire: Wire) -> Result<Value, DecodeError> {
            let text = wire.into_text()?;
            let mut parts = text.split(':').map(|p| p.parse::<i32>());
            match (parts.next(), parts.next()) {
                (Some(Ok(x)), Some(Ok(y))) => {
                    Ok(Value::Custom(crate::value::CustomValue::new("Point", (x, y))))
                }
                _ => Err(DecodeError::Adapter {
                    type_name: "Point",
                    message: format!("bad point {:?}", text),
                }),
            }
        }
    }

    #[test]
    fn test_builtins_resolve() {
        let registry = CodecRegistry::new();
        for (t, col) in [
            (ValueType::Text, "TEXT"),
            (ValueType::Uuid, "VARCHAR(36)"),
            (ValueType::Int, "INT"),
            (ValueType::Long, "INT"),
            (ValueType::Bool, "INT"),
            (ValueType::Double, "REAL"),
            (ValueType::Enum("Gender"), "TEXT"),
            (ValueType::Adapted("Money"), "TEXT"),
        ] {
            let codec = registry.find(t).expect("Built-in codec should be found");
            assert_eq!(codec.column_type(), col);
            assert_eq!(codec.value_type(), t);
        }
        assert!(registry.find(ValueType::Custom("Point")).is_none());
    }

    #[test]
    fn test_registered_codec() {
        let mut registry = CodecRegistry::new();
        registry.register(Arc::new(PointCodec));
        let codec = registry.find(ValueType::Custom("Point")).unwrap();

        let point = Value::Custom(crate::value::CustomValue::new("Point", (3, -4)));
        let wire = encode(&*codec, &point).unwrap();
        assert_eq!(wire, Wire::Text("3:-4".into()));
        match decode(&*codec, wire).unwrap() {
            Value::Custom(c) => assert_eq!(c.downcast_ref::<(i32, i32)>(), Some(&(3, -4))),
            other => panic!("Unexpected {:?}", other),
        }
    }

    #[test]
    fn test_long_binds_as_integer() {
        let codec = CodecRegistry::new().find(ValueType::Long).unwrap();
        let wire = codec.serialize(&Value::Long(1 << 40)).unwrap();
        assert_eq!(wire, Wire::Integer(1 << 40));
        assert_eq!(codec.deserialize(wire).unwrap(), Value::Long(1 << 40));
    }

    #[test]
    fn test_narrow_integers_check_range() {
        let codec = CodecRegistry::new().find(ValueType::Byte).unwrap();
        assert!(matches!(
            codec.deserialize(Wire::Integer(300)),
            Err(DecodeError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_nulls_pass_through() {
        let codec = CodecRegistry::new().find(ValueType::Uuid).unwrap();
        assert_eq!(encode(&*codec, &Value::Null).unwrap(), Wire::Null);
        assert_eq!(decode(&*codec, Wire::Null).unwrap(), Value::Null);
    }

    #[test]
    fn test_params_are_one_based() {
        let mut params = Params::new();
        params.bind(2, Wire::Integer(5));
        params.bind(1, Wire::Text("a".into()));
        assert_eq!(
            params.as_slice(),
            &[Wire::Text("a".into()), Wire::Integer(5)][..]
        );
    }
}
