use crate::error::EvalError;
use crate::value::Value;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// Record-system seam. Stored fields and relations come from `field`;
/// declared properties are layered on top by the registry.
pub trait Record: Send + Sync + fmt::Debug {
    fn model(&self) -> &str;
    fn pk(&self) -> Value;
    /// Stored field or relation. To-one relations yield `Value::Record` (or
    /// `Null`), to-many relations yield a `Value::List` of records.
    fn field(&self, name: &str) -> Option<Value>;
    /// Every record of this record's model.
    fn objects(&self) -> Result<Vec<RecordRef>, EvalError>;
    fn cache(&self) -> &PropertyCache;
}

pub type RecordRef = Arc<dyn Record>;

#[derive(Debug, Clone, Default)]
pub enum CacheSlot {
    #[default]
    Unset,
    Set(Value),
}

/// Per-record storage for declared property values, indexed by the slot a
/// property received for the record's concrete model.
#[derive(Debug, Default)]
pub struct PropertyCache {
    slots: Mutex<Vec<CacheSlot>>,
}

impl PropertyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slot: usize) -> Option<Value> {
        match self.slots.lock().get(slot) {
            Some(CacheSlot::Set(v)) => Some(v.clone()),
            _ => None,
        }
    }

    pub fn set(&self, slot: usize, value: Value) {
        let mut slots = self.slots.lock();
        if slots.len() <= slot {
            slots.resize(slot + 1, CacheSlot::Unset);
        }
        slots[slot] = CacheSlot::Set(value);
    }

    pub fn reset(&self, slot: usize) {
        if let Some(s) = self.slots.lock().get_mut(slot) {
            *s = CacheSlot::Unset;
        }
    }

    pub fn clear(&self) {
        self.slots.lock().clear();
    }

    pub fn is_set(&self, slot: usize) -> bool {
        matches!(self.slots.lock().get(slot), Some(CacheSlot::Set(_)))
    }
}
