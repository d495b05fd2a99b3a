use crate::error::{EvalError, StoreError};
use crate::record::{PropertyCache, Record, RecordRef};
use crate::schema::{Cardinality, Schema, PK};
use crate::value::Value;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::{Arc, Weak};

struct StoreInner {
    schema: Schema,
    tables: RwLock<IndexMap<String, Vec<Arc<MemoryRecord>>>>,
    next_pk: Mutex<i64>,
}

/// Record store keeping every model in memory. Cloning shares the store.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<StoreInner>,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tables = self.inner.tables.read();
        f.debug_map()
            .entries(tables.iter().map(|(model, rows)| (model, rows.len())))
            .finish()
    }
}

pub struct MemoryRecord {
    model: String,
    pk: i64,
    /// Stored fields; to-one relations hold the target pk.
    fields: RwLock<IndexMap<String, Value>>,
    cache: PropertyCache,
    store: Weak<StoreInner>,
}

impl fmt::Debug for MemoryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryRecord")
            .field("model", &self.model)
            .field("pk", &self.pk)
            .field("fields", &*self.fields.read())
            .finish()
    }
}

impl MemoryStore {
    pub fn new(schema: Schema) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                schema,
                tables: RwLock::new(IndexMap::new()),
                next_pk: Mutex::new(1),
            }),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    /// Inserts a record. Values of to-one relations may be a record, a pk or
    /// null; a `pk` entry pins the primary key.
    pub fn insert<'k, I>(&self, model: &str, values: I) -> Result<RecordRef, StoreError>
    where
        I: IntoIterator<Item = (&'k str, Value)>,
    {
        let schema = &self.inner.schema;
        let def = schema.model(model).ok_or_else(|| StoreError::UnknownModel {
            model: model.to_string(),
        })?;
        if def.is_abstract {
            return Err(StoreError::AbstractModel {
                model: model.to_string(),
            });
        }
        let mut pk = None;
        let mut fields: IndexMap<String, Value> = schema
            .all_fields(model)
            .into_iter()
            .map(|f| (f.to_string(), Value::Null))
            .collect();
        for (name, value) in values {
            if name == PK {
                pk = value.as_i64();
                continue;
            }
            let stored = self.stored_value(model, name, value)?;
            fields.insert(name.to_string(), stored);
        }
        let pk = {
            let mut next = self.inner.next_pk.lock();
            let pk = pk.unwrap_or(*next);
            *next = (*next).max(pk + 1);
            pk
        };
        let record = Arc::new(MemoryRecord {
            model: model.to_string(),
            pk,
            fields: RwLock::new(fields),
            cache: PropertyCache::new(),
            store: Arc::downgrade(&self.inner),
        });
        self.inner
            .tables
            .write()
            .entry(model.to_string())
            .or_default()
            .push(record.clone());
        Ok(record)
    }

    /// Inserts from a JSON object (fixture form).
    pub fn insert_json(
        &self,
        model: &str,
        json: &serde_json::Value,
    ) -> Result<RecordRef, StoreError> {
        let serde_json::Value::Object(map) = json else {
            return Err(StoreError::UnknownField {
                model: model.to_string(),
                field: json.to_string(),
            });
        };
        self.insert(model, map.iter().map(|(k, v)| (k.as_str(), Value::from_json(v))))
    }

    pub fn update(
        &self,
        model: &str,
        pk: i64,
        field: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        let record = self.find(model, pk).ok_or_else(|| StoreError::UnknownRecord {
            model: model.to_string(),
            pk,
        })?;
        let stored = self.stored_value(model, field, value)?;
        record.fields.write().insert(field.to_string(), stored);
        Ok(())
    }

    fn stored_value(&self, model: &str, name: &str, value: Value) -> Result<Value, StoreError> {
        let schema = &self.inner.schema;
        match schema.relation(model, name) {
            Some(rel) if rel.cardinality == Cardinality::ToOne => {
                let pk = match value {
                    Value::Null => return Ok(Value::Null),
                    Value::Record(r) => r.pk().as_i64(),
                    other => other.as_i64(),
                };
                let pk = pk.ok_or_else(|| StoreError::UnknownField {
                    model: model.to_string(),
                    field: name.to_string(),
                })?;
                if find_in(&self.inner, &rel.target, pk).is_none() {
                    return Err(StoreError::DanglingReference {
                        model: model.to_string(),
                        relation: name.to_string(),
                        target: rel.target.clone(),
                        pk,
                    });
                }
                Ok(Value::Int(pk))
            }
            Some(_) => Err(StoreError::UnknownField {
                model: model.to_string(),
                field: name.to_string(),
            }),
            None if schema.has_field(model, name) => Ok(value),
            None => Err(StoreError::UnknownField {
                model: model.to_string(),
                field: name.to_string(),
            }),
        }
    }

    fn find(&self, model: &str, pk: i64) -> Option<Arc<MemoryRecord>> {
        find_in(&self.inner, model, pk)
    }

    pub fn get(&self, model: &str, pk: i64) -> Option<RecordRef> {
        self.find(model, pk).map(|r| r as RecordRef)
    }

    /// Records of exactly `model`, in insertion order.
    pub fn all(&self, model: &str) -> Vec<RecordRef> {
        rows_of(&self.inner, model)
    }

    /// Records of `model` and every model extending it.
    pub fn all_under(&self, model: &str) -> Vec<RecordRef> {
        rows_under(&self.inner, model)
    }

    pub fn len(&self) -> usize {
        self.inner.tables.read().values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn rows_of(inner: &StoreInner, model: &str) -> Vec<RecordRef> {
    inner
        .tables
        .read()
        .get(model)
        .map(|rows| rows.iter().map(|r| r.clone() as RecordRef).collect())
        .unwrap_or_default()
}

fn rows_under(inner: &StoreInner, model: &str) -> Vec<RecordRef> {
    inner
        .schema
        .concrete_models_under(model)
        .into_iter()
        .flat_map(|m| rows_of(inner, m))
        .collect()
}

fn find_in(inner: &StoreInner, model: &str, pk: i64) -> Option<Arc<MemoryRecord>> {
    let tables = inner.tables.read();
    inner
        .schema
        .concrete_models_under(model)
        .into_iter()
        .find_map(|m| tables.get(m)?.iter().find(|r| r.pk == pk).cloned())
}

impl Record for MemoryRecord {
    fn model(&self) -> &str {
        &self.model
    }

    fn pk(&self) -> Value {
        Value::Int(self.pk)
    }

    fn field(&self, name: &str) -> Option<Value> {
        if name == PK {
            return Some(self.pk());
        }
        let Some(inner) = self.store.upgrade() else {
            return self.fields.read().get(name).cloned();
        };
        match inner.schema.relation(&self.model, name) {
            Some(rel) => Some(match rel.cardinality {
                Cardinality::ToOne => match self.fields.read().get(name) {
                    Some(Value::Int(pk)) => find_in(&inner, &rel.target, *pk)
                        .map(|r| Value::Record(r as RecordRef))
                        .unwrap_or(Value::Null),
                    _ => Value::Null,
                },
                Cardinality::ToMany => {
                    let remote = rel.remote_field.as_deref().unwrap_or(&self.model);
                    let own = Value::Int(self.pk);
                    let related = rows_under(&inner, &rel.target)
                        .into_iter()
                        .filter(|r| r.field(remote).map(|v| v.pk_of() == own).unwrap_or(false))
                        .map(Value::Record)
                        .collect();
                    Value::List(related)
                }
            }),
            None if inner.schema.has_field(&self.model, name) => {
                Some(self.fields.read().get(name).cloned().unwrap_or(Value::Null))
            }
            None => None,
        }
    }

    fn objects(&self) -> Result<Vec<RecordRef>, EvalError> {
        let inner = self.store.upgrade().ok_or(StoreError::Detached)?;
        Ok(rows_of(&inner, &self.model))
    }

    fn cache(&self) -> &PropertyCache {
        &self.cache
    }
}

trait PkOf {
    fn pk_of(self) -> Value;
}

impl PkOf for Value {
    /// Foreign-key comparison key: records compare by pk.
    fn pk_of(self) -> Value {
        match self {
            Value::Record(r) => r.pk(),
            other => other,
        }
    }
}
