//! Adapters and adapted collections.
//!
//! An adapter is a type which can write itself to a string and read itself back, stored in a `TEXT`
//! column.  [AdaptedList] is the one adapter this crate ships: an ordered collection which embeds
//! the id of its element codec, so a stored list can be decoded without knowing anything beyond
//! that id.
//!
//! The encoding is `<codec
//! id><IMPLEMENTOR_SEPARATOR><ARRAY_START>e1<ARRAY_SEPARATOR>e2...<ARRAY_END>`.  The four
//! delimiters are private-use code points.  They are unlikely to show up in data, but nothing stops
//! them from doing so: an element whose encoded form contains one will not survive a round trip.
//! Empty elements are also dropped on decode.
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use itertools::Itertools;
use lazy_static::lazy_static;
use uuid::Uuid;

use crate::error::DecodeError;
use crate::value::{Column, Value, ValueType};

pub const ARRAY_SEPARATOR: char = '\u{E492}';
pub const IMPLEMENTOR_SEPARATOR: char = '\u{E302}';
pub const ARRAY_START: char = '\u{E305}';
pub const ARRAY_END: char = '\u{E306}';

const RESERVED: [char; 4] = [ARRAY_SEPARATOR, IMPLEMENTOR_SEPARATOR, ARRAY_START, ARRAY_END];

/// A type which can describe itself as text.  Derive [Column] for it with `#[derive(Adapted)]`.
pub trait Adapt: Sized {
    fn adapt(&self) -> String;

    fn read_adapted(input: &str) -> Result<Self, DecodeError>;
}

/// Used by the `Adapted` derive.
#[doc(hidden)]
pub fn adapted_to_value<T: Adapt>(type_name: &'static str, value: &T) -> Value {
    Value::Adapted {
        type_name,
        text: value.adapt(),
    }
}

#[doc(hidden)]
pub fn adapted_from_value<T: Adapt>(
    type_name: &'static str,
    value: Value,
) -> Result<T, DecodeError> {
    match value {
        Value::Adapted { text, .. } | Value::Text(text) => T::read_adapted(&text),
        other => Err(DecodeError::wrong_type(ValueType::Adapted(type_name), &other)),
    }
}

/// Writes and reads the elements of an [AdaptedList].
///
/// The id is what ends up in the database, so it must never change once data has been written with
/// it.
pub trait ElementCodec<T>: Send + Sync {
    fn id(&self) -> &'static str;

    fn write(&self, value: &T) -> String;

    fn read(&self, text: &str) -> Result<T, DecodeError>;
}

/// Ids of the built-in element codecs.
pub mod elements {
    pub const STRING: &str = "ammo_orm.string.v1";
    pub const INT: &str = "ammo_orm.int.v1";
    pub const LONG: &str = "ammo_orm.long.v1";
    pub const SHORT: &str = "ammo_orm.short.v1";
    pub const BYTE: &str = "ammo_orm.byte.v1";
    pub const DOUBLE: &str = "ammo_orm.double.v1";
    pub const FLOAT: &str = "ammo_orm.float.v1";
    pub const BOOL: &str = "ammo_orm.bool.v1";
    pub const UUID: &str = "ammo_orm.uuid.v1";
}

/// Built-in element codec for anything that round-trips through `Display`/`FromStr`.
struct ParsedElements {
    id: &'static str,
}

impl<T> ElementCodec<T> for ParsedElements
where
    T: fmt::Display + std::str::FromStr,
{
    fn id(&self) -> &'static str {
        self.id
    }

    fn write(&self, value: &T) -> String {
        value.to_string()
    }

    fn read(&self, text: &str) -> Result<T, DecodeError> {
        text.parse().map_err(|_| DecodeError::Adapter {
            type_name: std::any::type_name::<T>(),
            message: format!("{:?} is not valid for element codec {}", text, self.id),
        })
    }
}

/// Bools are written as `1b`/`0b`.
struct BoolElements;

impl ElementCodec<bool> for BoolElements {
    fn id(&self) -> &'static str {
        elements::BOOL
    }

    fn write(&self, value: &bool) -> String {
        let text = if *value { "1b" } else { "0b" };
        text.to_string()
    }

    fn read(&self, text: &str) -> Result<bool, DecodeError> {
        match text {
            "1b" => Ok(true),
            "0b" => Ok(false),
            _ => Err(DecodeError::Adapter {
                type_name: "bool",
                message: format!("{:?} is neither 1b nor 0b", text),
            }),
        }
    }
}

struct UuidElements;

impl ElementCodec<Uuid> for UuidElements {
    fn id(&self) -> &'static str {
        elements::UUID
    }

    fn write(&self, value: &Uuid) -> String {
        value.to_hyphenated().to_string()
    }

    fn read(&self, text: &str) -> Result<Uuid, DecodeError> {
        Uuid::parse_str(text).map_err(|_| DecodeError::InvalidUuid {
            input: text.to_string(),
        })
    }
}

/// Type-erased `Arc<dyn ElementCodec<T>>`, keyed by id.
type ErasedCodec = Arc<dyn Any + Send + Sync>;

fn erase<T: 'static>(codec: Arc<dyn ElementCodec<T>>) -> ErasedCodec {
    Arc::new(codec)
}

fn parsed<T>(id: &'static str) -> Arc<dyn ElementCodec<T>>
where
    T: fmt::Display + std::str::FromStr + 'static,
{
    Arc::new(ParsedElements { id })
}

lazy_static! {
    static ref ELEMENT_CODECS: RwLock<HashMap<&'static str, ErasedCodec>> = {
        let mut m: HashMap<&'static str, ErasedCodec> = HashMap::new();
        m.insert(elements::STRING, erase(String::default_element_codec()));
        m.insert(elements::INT, erase(i32::default_element_codec()));
        m.insert(elements::LONG, erase(i64::default_element_codec()));
        m.insert(elements::SHORT, erase(i16::default_element_codec()));
        m.insert(elements::BYTE, erase(i8::default_element_codec()));
        m.insert(elements::DOUBLE, erase(f64::default_element_codec()));
        m.insert(elements::FLOAT, erase(f32::default_element_codec()));
        m.insert(elements::BOOL, erase(bool::default_element_codec()));
        m.insert(elements::UUID, erase(Uuid::default_element_codec()));
        RwLock::new(m)
    };
}

/// Register an element codec under its id, so that lists written with it can be read back.
///
/// Replaces any codec already registered under the same id.
pub fn register_element_codec<T: 'static>(codec: Arc<dyn ElementCodec<T>>) {
    let id = codec.id();
    let mut codecs = ELEMENT_CODECS.write().unwrap_or_else(|e| e.into_inner());
    if codecs.insert(id, erase(codec)).is_some() {
        log::warn!("Replaced the element codec registered as {}", id);
    }
}

/// Find the element codec registered under `id`, which must produce `T`s.
pub fn find_element_codec<T: 'static>(id: &str) -> Result<Arc<dyn ElementCodec<T>>, DecodeError> {
    let codecs = ELEMENT_CODECS.read().unwrap_or_else(|e| e.into_inner());
    let erased = codecs
        .get(id)
        .ok_or_else(|| DecodeError::UnknownElementCodec(id.to_string()))?;
    erased
        .downcast_ref::<Arc<dyn ElementCodec<T>>>()
        .cloned()
        .ok_or_else(|| DecodeError::WrongType {
            expected: std::any::type_name::<T>().to_string(),
            found: format!("elements of codec {}", id),
        })
}

/// Types with a built-in element codec, which lists of them use unless told otherwise.
pub trait DefaultElementCodec: Sized + 'static {
    fn default_element_codec() -> Arc<dyn ElementCodec<Self>>;
}

macro_rules! parsed_default {
    ($ty:ty, $id:expr) => {
        impl DefaultElementCodec for $ty {
            fn default_element_codec() -> Arc<dyn ElementCodec<Self>> {
                parsed::<$ty>($id)
            }
        }
    };
}

parsed_default!(String, elements::STRING);
parsed_default!(i32, elements::INT);
parsed_default!(i64, elements::LONG);
parsed_default!(i16, elements::SHORT);
parsed_default!(i8, elements::BYTE);
parsed_default!(f64, elements::DOUBLE);
parsed_default!(f32, elements::FLOAT);

impl DefaultElementCodec for bool {
    fn default_element_codec() -> Arc<dyn ElementCodec<Self>> {
        Arc::new(BoolElements)
    }
}

impl DefaultElementCodec for Uuid {
    fn default_element_codec() -> Arc<dyn ElementCodec<Self>> {
        Arc::new(UuidElements)
    }
}

/// An ordered collection which can be stored in a single `TEXT` column.
#[derive(Clone)]
pub struct AdaptedList<T> {
    items: Vec<T>,
    codec: Arc<dyn ElementCodec<T>>,
}

impl<T: DefaultElementCodec> AdaptedList<T> {
    pub fn new() -> Self {
        Self::with_codec(T::default_element_codec())
    }
}

impl<T: DefaultElementCodec> Default for AdaptedList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DefaultElementCodec> From<Vec<T>> for AdaptedList<T> {
    fn from(items: Vec<T>) -> Self {
        Self::from_vec(items, T::default_element_codec())
    }
}

impl<T: 'static> AdaptedList<T> {
    pub fn with_codec(codec: Arc<dyn ElementCodec<T>>) -> Self {
        Self::from_vec(vec![], codec)
    }

    pub fn from_vec(items: Vec<T>, codec: Arc<dyn ElementCodec<T>>) -> Self {
        Self { items, codec }
    }

    /// Build a list using the codec registered under `id`.
    pub fn with_codec_id(items: Vec<T>, id: &str) -> Result<Self, DecodeError> {
        Ok(Self::from_vec(items, find_element_codec(id)?))
    }

    pub fn codec_id(&self) -> &'static str {
        self.codec.id()
    }

    pub fn encode(&self) -> String {
        let body = self
            .items
            .iter()
            .map(|i| {
                let written = self.codec.write(i);
                if written.contains(&RESERVED[..]) {
                    log::warn!(
                        "Element written by {} contains a reserved delimiter and will not decode correctly",
                        self.codec.id()
                    );
                }
                written
            })
            .join(&ARRAY_SEPARATOR.to_string());
        format!(
            "{}{}{}{}{}",
            self.codec.id(),
            IMPLEMENTOR_SEPARATOR,
            ARRAY_START,
            body,
            ARRAY_END
        )
    }

    /// Decode a list, resolving its element codec from the id embedded in `input`.
    pub fn decode(input: &str) -> Result<Self, DecodeError> {
        let (id, rest) = input.split_once(IMPLEMENTOR_SEPARATOR).ok_or_else(|| {
            DecodeError::MalformedCollection("missing the codec id separator".into())
        })?;
        if id.is_empty() {
            return Err(DecodeError::MalformedCollection("empty codec id".into()));
        }
        let codec = find_element_codec::<T>(id)?;

        let body = rest
            .strip_prefix(ARRAY_START)
            .and_then(|r| r.strip_suffix(ARRAY_END))
            .ok_or_else(|| DecodeError::MalformedCollection("missing array delimiters".into()))?;
        let items = body
            .split(ARRAY_SEPARATOR)
            .filter(|s| !s.is_empty())
            .map(|s| codec.read(s))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { items, codec })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.items.get_mut(index)
    }

    pub fn push(&mut self, value: T) {
        self.items.push(value);
    }

    pub fn insert(&mut self, index: usize, value: T) {
        self.items.insert(index, value);
    }

    pub fn remove(&mut self, index: usize) -> T {
        self.items.remove(index)
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn retain(&mut self, f: impl FnMut(&T) -> bool) {
        self.items.retain(f);
    }

    pub fn sort_by(&mut self, compare: impl FnMut(&T, &T) -> std::cmp::Ordering) {
        self.items.sort_by(compare);
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items[..]
    }

    pub fn into_vec(self) -> Vec<T> {
        self.items
    }
}

impl<T: PartialEq + 'static> AdaptedList<T> {
    pub fn contains(&self, value: &T) -> bool {
        self.items.contains(value)
    }
}

impl<T> Extend<T> for AdaptedList<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}

impl<'a, T> IntoIterator for &'a AdaptedList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Lists compare by their items only.
impl<T: PartialEq> PartialEq for AdaptedList<T> {
    fn eq(&self, other: &Self) -> bool {
        self.items == other.items
    }
}

impl<T: fmt::Debug> fmt::Debug for AdaptedList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdaptedList")
            .field("codec", &self.codec.id())
            .field("items", &self.items)
            .finish()
    }
}

impl<T: 'static> Adapt for AdaptedList<T> {
    fn adapt(&self) -> String {
        self.encode()
    }

    fn read_adapted(input: &str) -> Result<Self, DecodeError> {
        Self::decode(input)
    }
}

impl<T: 'static> Column for AdaptedList<T> {
    fn value_type() -> ValueType {
        ValueType::Adapted("AdaptedList")
    }

    fn to_value(&self) -> Value {
        adapted_to_value("AdaptedList", self)
    }

    fn from_value(value: Value) -> Result<Self, DecodeError> {
        adapted_from_value("AdaptedList", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    /// Writes strings upper-cased, so we can tell it apart from the built-in string codec.
    struct ShoutingElements;

    impl ElementCodec<String> for ShoutingElements {
        fn id(&self) -> &'static str {
            "tests.shouting.v1"
        }

        fn write(&self, value: &String) -> String {
            value.to_uppercase()
        }

        fn read(&self, text: &str) -> Result<String, DecodeError> {
            Ok(text.to_lowercase())
        }
    }

    #[test]
    fn test_empty_round_trip() {
        let list = AdaptedList::<String>::new();
        let encoded = list.encode();
        assert_eq!(
            encoded,
            format!(
                "{}{}{}{}",
                elements::STRING,
                IMPLEMENTOR_SEPARATOR,
                ARRAY_START,
                ARRAY_END
            )
        );

        let decoded = AdaptedList::<String>::decode(&encoded).unwrap();
        assert!(decoded.is_empty());
        assert_eq!(decoded.codec_id(), elements::STRING);
    }

    #[test]
    fn test_strings_round_trip_in_order() {
        let list = AdaptedList::from(vec!["a".to_string(), "b".to_string()]);
        let decoded = AdaptedList::<String>::decode(&list.encode()).unwrap();
        assert_eq!(decoded.as_slice(), &["a".to_string(), "b".to_string()][..]);
    }

    #[test]
    fn test_codec_recovered_by_id() {
        register_element_codec::<String>(Arc::new(ShoutingElements));
        let list =
            AdaptedList::with_codec_id(vec!["quiet".to_string()], "tests.shouting.v1").unwrap();
        let encoded = list.encode();
        assert!(encoded.contains("QUIET"));

        let decoded = AdaptedList::<String>::decode(&encoded).unwrap();
        assert_eq!(decoded.codec_id(), "tests.shouting.v1");
        assert_eq!(decoded.as_slice(), &["quiet".to_string()][..]);
    }

    #[test]
    fn test_unknown_codec_id() {
        let input = format!("nope.v1{}{}x{}", IMPLEMENTOR_SEPARATOR, ARRAY_START, ARRAY_END);
        assert!(matches!(
            AdaptedList::<String>::decode(&input),
            Err(DecodeError::UnknownElementCodec(id)) if id == "nope.v1"
        ));
    }

    #[test]
    fn test_wrong_element_type() {
        let list = AdaptedList::from(vec![1i32, 2]);
        assert!(matches!(
            AdaptedList::<String>::decode(&list.encode()),
            Err(DecodeError::WrongType { .. })
        ));
    }

    #[test]
    fn test_malformed() {
        assert!(AdaptedList::<String>::decode("no separator").is_err());
        let missing_end = format!("{}{}{}a", elements::STRING, IMPLEMENTOR_SEPARATOR, ARRAY_START);
        assert!(matches!(
            AdaptedList::<String>::decode(&missing_end),
            Err(DecodeError::MalformedCollection(_))
        ));
    }

    #[test]
    fn test_bools() {
        let list = AdaptedList::from(vec![true, false, true]);
        assert!(list.encode().contains("1b"));
        let decoded = AdaptedList::<bool>::decode(&list.encode()).unwrap();
        assert_eq!(decoded.into_vec(), vec![true, false, true]);
    }

    #[test]
    fn test_bools_reject_other_text() {
        for bad in ["true", "1", "1B"] {
            let encoded = format!(
                "{}{}{}1b{}{}{}",
                elements::BOOL,
                IMPLEMENTOR_SEPARATOR,
                ARRAY_START,
                ARRAY_SEPARATOR,
                bad,
                ARRAY_END
            );
            assert!(matches!(
                AdaptedList::<bool>::decode(&encoded),
                Err(DecodeError::Adapter { type_name: "bool", .. })
            ));
        }
    }

    proptest! {
        #[test]
        fn test_ints_round_trip(items in proptest::collection::vec(any::<i64>(), 0..20)) {
            let list = AdaptedList::from(items.clone());
            let decoded = AdaptedList::<i64>::decode(&list.encode()).unwrap();
            prop_assert_eq!(decoded.into_vec(), items);
        }

        #[test]
        fn test_plain_strings_round_trip(
            items in proptest::collection::vec("[a-zA-Z0-9 ,.]{1,12}", 0..10),
        ) {
            let list = AdaptedList::from(items.clone());
            let decoded = AdaptedList::<String>::decode(&list.encode()).unwrap();
            prop_assert_eq!(decoded.into_vec(), items);
        }
    }
}
