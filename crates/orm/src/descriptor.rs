//! Entities and their descriptors.
//!
//! An entity is a plain struct whose attributes map one-to-one onto the columns of a table.  It
//! declares those attributes once, through [Entity::attributes] (usually generated by
//! `#[derive(Entity)]`), and the declarations are validated and resolved against a codec registry
//! into an [EntityDescriptor] when the table is registered.
//!
//! Declaration order is column order for creation, insertion and reads alike.
use std::marker::PhantomData;
use std::sync::Arc;

use crate::codec::{self, Codec, CodecRegistry, Params, ResultRow};
use crate::error::{Error, Result};
use crate::value::{Value, ValueType, Wire};

/// One declared attribute of an entity.
#[derive(Clone, Debug, PartialEq)]
pub struct AttributeDecl {
    name: &'static str,
    value_type: ValueType,
    primary: bool,
    unique: bool,
    auto_increment: bool,
    column_type: Option<&'static str>,
}

impl AttributeDecl {
    pub fn new(name: &'static str, value_type: ValueType) -> Self {
        Self {
            name,
            value_type,
            primary: false,
            unique: false,
            auto_increment: false,
            column_type: None,
        }
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Override the column type, bypassing type-based resolution.
    pub fn column_type(mut self, column_type: &'static str) -> Self {
        self.column_type = Some(column_type);
        self
    }
}

/// A struct which maps onto a table.
///
/// `get_value` and `set_value` are the dynamic accessors the engine uses to move attributes to and
/// from storage; they must agree with `attributes` on names and types.
pub trait Entity: Default + Send + 'static {
    /// Name of the Rust type, for diagnostics.
    const ENTITY_NAME: &'static str;

    fn attributes() -> Vec<AttributeDecl>;

    fn get_value(&self, attribute: &str) -> Option<Value>;

    /// Assign an attribute.  Returns `Ok(false)` if there is no attribute by that name.
    fn set_value(&mut self, attribute: &str, value: Value) -> Result<bool, crate::DecodeError>;
}

/// A typed handle on one attribute of `E`, used to set it through a [crate::Row] so that it gets
/// marked dirty.
///
/// `#[derive(Entity)]` generates one of these per attribute as an associated constant named after
/// the attribute in upper case.
pub struct Field<E, T> {
    name: &'static str,
    get: fn(&E) -> &T,
    set: fn(&mut E, T),
    _phantom: PhantomData<fn(E, T)>,
}

impl<E, T> Field<E, T> {
    pub const fn new(name: &'static str, get: fn(&E) -> &T, set: fn(&mut E, T)) -> Self {
        Self {
            name,
            get,
            set,
            _phantom: PhantomData,
        }
    }

    pub fn get_name(&self) -> &'static str {
        self.name
    }

    pub fn get<'a>(&self, entity: &'a E) -> &'a T {
        (self.get)(entity)
    }

    pub(crate) fn assign(&self, entity: &mut E, value: T) {
        (self.set)(entity, value)
    }
}

impl<E, T> Clone for Field<E, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E, T> Copy for Field<E, T> {}

/// A resolved attribute: its declaration plus the column type and codec chosen for it.
#[derive(Clone)]
pub struct AttributeDescriptor {
    decl: AttributeDecl,
    column_type: String,
    codec: Arc<dyn Codec>,
}

impl std::fmt::Debug for AttributeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AttributeDescriptor")
            .field("decl", &self.decl)
            .field("column_type", &self.column_type)
            .finish()
    }
}

impl AttributeDescriptor {
    pub fn get_name(&self) -> &'static str {
        self.decl.name
    }

    pub fn get_value_type(&self) -> ValueType {
        self.decl.value_type
    }

    pub fn get_column_type(&self) -> &str {
        &self.column_type
    }

    pub fn is_primary(&self) -> bool {
        self.decl.primary
    }

    /// Primary keys are always unique.
    pub fn is_unique(&self) -> bool {
        self.decl.primary || self.decl.unique
    }

    pub fn is_auto_increment(&self) -> bool {
        self.decl.auto_increment
    }

    pub fn get_codec(&self) -> &Arc<dyn Codec> {
        &self.codec
    }

    /// Serialize `value` and bind it at `index`.
    pub(crate) fn bind(&self, params: &mut Params, index: usize, value: &Value) -> Result<()> {
        let wire = codec::encode(&*self.codec, value)?;
        self.codec.bind(params, index, wire);
        Ok(())
    }

    /// Read this attribute out of a result row.
    pub(crate) fn read(&self, row: &ResultRow) -> Result<Value> {
        let wire: Wire = self
            .codec
            .read(row, self.decl.name)
            .ok_or_else(|| Error::NoGetter {
                attribute: self.decl.name.to_string(),
            })?;
        Ok(codec::decode(&*self.codec, wire)?)
    }
}

/// Resolve the column type of a declaration.  `codec` is only consulted for types the built-in
/// rules don't cover.
fn resolve_column_type(decl: &AttributeDecl, codec: Option<&Arc<dyn Codec>>) -> Result<String> {
    if let Some(t) = decl.column_type {
        return Ok(t.to_string());
    }

    let vt = decl.value_type;
    let found = if vt.is_integral() {
        "INT"
    } else if vt.is_floating() {
        "REAL"
    } else if vt == ValueType::Uuid {
        "VARCHAR(36)"
    } else if matches!(
        vt,
        ValueType::Text | ValueType::Adapted(_) | ValueType::Enum(_)
    ) {
        "TEXT"
    } else if let Some(c) = codec {
        c.column_type()
    } else {
        return Err(Error::UnknownColumnType {
            attribute: decl.name,
            value_type: vt,
        });
    };

    Ok(found.to_string())
}

/// Description of the table behind an entity.
#[derive(Clone, Debug)]
pub struct EntityDescriptor {
    entity: &'static str,
    table: String,
    attributes: Vec<AttributeDescriptor>,
    primary: usize,
}

impl EntityDescriptor {
    pub fn new<E: Entity>(table: &str, registry: &CodecRegistry) -> Result<Self> {
        Self::from_declarations(E::ENTITY_NAME, table, E::attributes(), registry)
    }

    pub fn from_declarations(
        entity: &'static str,
        table: &str,
        declarations: Vec<AttributeDecl>,
        registry: &CodecRegistry,
    ) -> Result<Self> {
        let mut primary: Option<usize> = None;
        let mut attributes: Vec<AttributeDescriptor> = Vec::with_capacity(declarations.len());

        for decl in declarations {
            if attributes.iter().any(|a| a.get_name() == decl.name) {
                return Err(Error::DuplicateAttribute {
                    entity,
                    attribute: decl.name,
                });
            }

            if decl.auto_increment && !decl.value_type.is_integral() {
                return Err(Error::NonIntegralAutoIncrement {
                    entity,
                    attribute: decl.name,
                    value_type: decl.value_type,
                });
            }

            if decl.primary {
                if let Some(p) = primary {
                    return Err(Error::AmbiguousPrimaryKey {
                        entity,
                        first: attributes[p].get_name(),
                        second: decl.name,
                    });
                }
                primary = Some(attributes.len());
            }

            let codec = registry.find(decl.value_type);
            let column_type = resolve_column_type(&decl, codec.as_ref())?;
            let codec = codec.ok_or_else(|| Error::NoCodec {
                attribute: decl.name.to_string(),
                value_type: decl.value_type,
            })?;

            attributes.push(AttributeDescriptor {
                decl,
                column_type,
                codec,
            });
        }

        let primary = primary.ok_or(Error::NoPrimaryKey { entity })?;

        Ok(Self {
            entity,
            table: table.to_string(),
            attributes,
            primary,
        })
    }

    pub fn get_entity_name(&self) -> &'static str {
        self.entity
    }

    pub fn get_table_name(&self) -> &str {
        &self.table
    }

    pub fn iter_attributes(&self) -> impl Iterator<Item = &AttributeDescriptor> {
        self.attributes.iter()
    }

    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    pub fn get_attribute(&self, name: &str) -> Option<&AttributeDescriptor> {
        self.attributes.iter().find(|a| a.get_name() == name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.attributes.iter().position(|a| a.get_name() == name)
    }

    pub(crate) fn attribute_at(&self, index: usize) -> &AttributeDescriptor {
        &self.attributes[index]
    }

    pub fn get_primary(&self) -> &AttributeDescriptor {
        &self.attributes[self.primary]
    }

    pub(crate) fn get_primary_index(&self) -> usize {
        self.primary
    }

    /// Build an entity from a result row, reading every attribute in order.
    pub(crate) fn read_entity<E: Entity>(&self, row: &ResultRow) -> Result<E> {
        let mut entity = E::default();
        for attr in self.iter_attributes() {
            let value = attr.read(row)?;
            if !entity.set_value(attr.get_name(), value)? {
                return Err(Error::NoGetter {
                    attribute: attr.get_name().to_string(),
                });
            }
        }
        Ok(entity)
    }

    /// Get the current value of an attribute of `entity`.
    pub(crate) fn value_of<E: Entity>(
        &self,
        entity: &E,
        attr: &AttributeDescriptor,
    ) -> Result<Value> {
        entity.get_value(attr.get_name()).ok_or_else(|| Error::NoCodec {
            attribute: attr.get_name().to_string(),
            value_type: attr.get_value_type(),
        })
    }
}
