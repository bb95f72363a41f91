//! Live rows and their dirty tracking.
use std::sync::Arc;

use smallvec::SmallVec;

use crate::codec;
use crate::descriptor::{AttributeDescriptor, Entity, Field};
use crate::error::{Error, Result};
use crate::statements;
use crate::table::TableShared;
use crate::value::{Value, Wire};
use crate::writer::{PendingWrites, WriteTicket};

/// One record of a table, plus which of its attributes changed since it was last written.
///
/// Reads go through `Deref`.  Writes go through [Row::set] or [Row::modify] so that the row knows
/// what to send on [Row::clean]; mutating the entity any other way needs a matching
/// [Row::mark_dirty].
pub struct Row<E: Entity> {
    entity: E,
    table: Arc<TableShared>,
    /// Indexed like the descriptor's attributes.
    dirty: SmallVec<[bool; 16]>,
    /// The primary key as storage knows it, which is what updates and deletes are keyed by.
    key: Value,
    deleted: bool,
}

/// What would be written for `attr` right now, if anything can be.
fn stored_form<E: Entity>(entity: &E, attr: &AttributeDescriptor) -> Option<Wire> {
    let value = entity.get_value(attr.get_name())?;
    codec::encode(&**attr.get_codec(), &value).ok()
}

impl<E: Entity> Row<E> {
    pub(crate) fn new(entity: E, table: Arc<TableShared>) -> Result<Self> {
        let descriptor = table.get_descriptor();
        let key = descriptor.value_of(&entity, descriptor.get_primary())?;
        let dirty = SmallVec::from_elem(false, descriptor.attribute_count());
        Ok(Self {
            entity,
            table,
            dirty,
            key,
            deleted: false,
        })
    }

    fn check_live(&self) -> Result<()> {
        if self.deleted {
            Err(Error::AlreadyDeleted)
        } else {
            Ok(())
        }
    }

    fn index_of(&self, attribute: &str) -> Result<usize> {
        let descriptor = self.table.get_descriptor();
        descriptor
            .index_of(attribute)
            .ok_or_else(|| Error::UnknownAttribute {
                table: descriptor.get_table_name().to_string(),
                attribute: attribute.to_string(),
            })
    }

    pub fn get_table_name(&self) -> &str {
        self.table.get_descriptor().get_table_name()
    }

    /// Set one attribute and mark it dirty.
    pub fn set<T>(&mut self, field: Field<E, T>, value: T) -> Result<()> {
        self.check_live()?;
        let index = self.index_of(field.get_name())?;
        field.assign(&mut self.entity, value);
        self.dirty[index] = true;
        Ok(())
    }

    /// Run `f` against the entity, then mark every attribute whose stored form changed.
    ///
    /// Attributes which can't be serialized are always marked, so that [Row::clean] reports the
    /// problem.
    pub fn modify<R>(&mut self, f: impl FnOnce(&mut E) -> R) -> Result<R> {
        self.check_live()?;
        let descriptor = self.table.get_descriptor();
        let before = descriptor
            .iter_attributes()
            .map(|a| stored_form(&self.entity, a))
            .collect::<Vec<_>>();

        let ret = f(&mut self.entity);

        for (i, (attr, old)) in descriptor.iter_attributes().zip(before).enumerate() {
            let new = stored_form(&self.entity, attr);
            if new.is_none() || new != old {
                self.dirty[i] = true;
            }
        }
        Ok(ret)
    }

    pub fn mark_dirty(&mut self, attribute: &str) -> Result<()> {
        self.check_live()?;
        let index = self.index_of(attribute)?;
        self.dirty[index] = true;
        Ok(())
    }

    pub fn mark_all_dirty(&mut self) -> Result<()> {
        self.check_live()?;
        self.dirty.iter_mut().for_each(|d| *d = true);
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.iter().any(|d| *d)
    }

    /// False for attributes the entity doesn't have.
    pub fn is_attribute_dirty(&self, attribute: &str) -> bool {
        self.table
            .get_descriptor()
            .index_of(attribute)
            .map(|i| self.dirty[i])
            .unwrap_or(false)
    }

    /// Names of the dirty attributes, in declaration order.
    pub fn dirty_attributes(&self) -> Vec<&'static str> {
        self.table
            .get_descriptor()
            .iter_attributes()
            .zip(self.dirty.iter())
            .filter(|(_, d)| **d)
            .map(|(a, _)| a.get_name())
            .collect()
    }

    /// Write every dirty attribute, one update each, then forget they were dirty.
    ///
    /// Nothing is submitted unless every attribute could be serialized.  The updates run in
    /// declaration order, ahead of anything submitted to the same database afterwards, except that
    /// a changed primary key is written last: every update is keyed by the stored key, which stops
    /// matching once the key moves.
    pub fn clean(&mut self) -> Result<PendingWrites> {
        self.check_live()?;
        let descriptor = self.table.get_descriptor();
        let statements = self.table.get_statements();
        let primary = descriptor.get_primary_index();

        let order = (0..self.dirty.len())
            .filter(|i| *i != primary)
            .chain(std::iter::once(primary));

        let mut work = vec![];
        for i in order {
            if self.dirty[i] {
                let params = statements::update_params(descriptor, &self.entity, i, &self.key)?;
                work.push((statements.get_update(i), params));
            }
        }
        let new_key = descriptor.value_of(&self.entity, descriptor.get_primary())?;

        let mut pending = PendingWrites::default();
        for (sql, params) in work {
            pending.push(self.table.get_writer().submit(sql, params));
        }

        self.key = new_key;
        self.clean_without_update();
        Ok(pending)
    }

    /// Forget which attributes are dirty without writing anything.
    pub fn clean_without_update(&mut self) {
        self.dirty.iter_mut().for_each(|d| *d = false);
    }

    /// Delete the record.  A row can only be deleted once.
    pub fn delete(&mut self) -> Result<WriteTicket> {
        self.check_live()?;
        let params = statements::primary_params(self.table.get_descriptor(), &self.key)?;
        self.deleted = true;
        Ok(self
            .table
            .get_writer()
            .submit(self.table.get_statements().get_delete(), params))
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Drop the tracking, keeping the entity.  Pending dirty attributes are not written.
    pub fn into_inner(self) -> E {
        self.entity
    }
}

impl<E: Entity> std::ops::Deref for Row<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.entity
    }
}

impl<E: Entity + std::fmt::Debug> std::fmt::Debug for Row<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Row")
            .field("table", &self.get_table_name())
            .field("entity", &self.entity)
            .field("dirty", &self.dirty_attributes())
            .field("deleted", &self.deleted)
            .finish()
    }
}
