//! Per-concrete-model registry of declared properties.

use crate::compile::{compile_procedure, CompileContext, ScalarFallback};
use crate::config::Settings;
use crate::error::{DeclarationError, EvalError};
use crate::expr::split_path;
use crate::property::{ambient_depth, DeclaredProperty, Evaluator, PropertyTemplate};
use crate::record::RecordRef;
use crate::schema::Schema;
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub struct RegistryBuilder {
    schema: Schema,
    settings: Settings,
    fallback: Option<Arc<dyn ScalarFallback>>,
    templates: Vec<PropertyTemplate>,
}

impl RegistryBuilder {
    pub fn new(schema: Schema) -> Self {
        Self {
            schema,
            settings: Settings::default(),
            fallback: None,
            templates: Vec::new(),
        }
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn fallback(mut self, fallback: Arc<dyn ScalarFallback>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn declare(mut self, template: PropertyTemplate) -> Self {
        self.templates.push(template);
        self
    }

    /// Validates, compiles every template once and binds it to each
    /// concrete model at or under its declaring model.
    pub fn assemble(self) -> Result<Registry, DeclarationError> {
        let Self {
            schema,
            settings,
            fallback,
            templates,
        } = self;
        let mut properties: Vec<Arc<DeclaredProperty>> = Vec::new();
        let mut by_model: HashMap<String, IndexMap<String, usize>> = HashMap::new();

        for template in templates {
            let PropertyTemplate {
                name,
                model,
                expression,
                state,
                override_fn,
            } = template;
            if !schema.contains(&model) {
                return Err(DeclarationError::UnknownModel { model, name });
            }
            if state.skip_codegen && override_fn.is_none() {
                return Err(DeclarationError::MissingOverride { model, name });
            }
            let unknown_join = state
                .joins
                .iter()
                .find(|j| !walks_relations(&schema, &model, j));
            if let Some(relation) = unknown_join {
                return Err(DeclarationError::UnknownJoin {
                    relation: relation.clone(),
                    model,
                    name,
                });
            }

            let (evaluator, report) = match override_fn {
                Some(f) => (Evaluator::Overridden(f), None),
                None => {
                    let mut ctx = CompileContext::new(&model, &schema)
                        .with_use_tz(state.use_tz.unwrap_or(settings.use_tz));
                    if let Some(fallback) = &fallback {
                        ctx = ctx.with_fallback(fallback.clone());
                    }
                    let (procedure, report) = compile_procedure(&name, &expression, &ctx)
                        .map_err(|source| DeclarationError::Compile {
                            model: model.clone(),
                            name: name.clone(),
                            source,
                        })?;
                    (Evaluator::Compiled(Arc::new(procedure)), Some(Arc::new(report)))
                }
            };
            let expression = Arc::new(expression);

            for concrete in schema.concrete_models_under(&model) {
                if schema.has_field(concrete, &name) || schema.relation(concrete, &name).is_some() {
                    return Err(DeclarationError::ShadowsField {
                        model: concrete.to_string(),
                        name,
                    });
                }
                let slots = by_model.entry(concrete.to_string()).or_default();
                if slots.contains_key(&name) {
                    return Err(DeclarationError::Duplicate {
                        model: concrete.to_string(),
                        name,
                    });
                }
                let slot = slots.len();
                slots.insert(name.clone(), properties.len());
                debug!(
                    model = concrete,
                    property = name.as_str(),
                    declared_on = model.as_str(),
                    slot,
                    overridden = report.is_none(),
                    "bound declared property"
                );
                properties.push(Arc::new(DeclaredProperty {
                    name: name.clone(),
                    model: concrete.to_string(),
                    declared_on: model.clone(),
                    expression: expression.clone(),
                    evaluator: evaluator.clone(),
                    state: state.clone(),
                    slot,
                    report: report.clone(),
                }));
            }
        }

        info!(
            properties = properties.len(),
            models = by_model.len(),
            "assembled property registry"
        );
        Ok(Registry {
            schema,
            settings,
            properties,
            by_model,
        })
    }
}

fn walks_relations(schema: &Schema, model: &str, path: &str) -> bool {
    let segments = split_path(path);
    if segments.is_empty() {
        return false;
    }
    let mut current = model.to_string();
    for segment in &segments {
        match schema.relation(&current, segment) {
            Some(rel) => current = rel.target.clone(),
            None => return false,
        }
    }
    true
}

#[derive(Debug)]
pub struct Registry {
    schema: Schema,
    settings: Settings,
    properties: Vec<Arc<DeclaredProperty>>,
    by_model: HashMap<String, IndexMap<String, usize>>,
}

impl Registry {
    pub fn builder(schema: Schema) -> RegistryBuilder {
        RegistryBuilder::new(schema)
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn property(&self, model: &str, name: &str) -> Option<&DeclaredProperty> {
        let idx = *self.by_model.get(model)?.get(name)?;
        self.properties.get(idx).map(Arc::as_ref)
    }

    pub fn properties_of(&self, model: &str) -> Vec<&DeclaredProperty> {
        self.by_model
            .get(model)
            .map(|slots| {
                slots
                    .values()
                    .filter_map(|idx| self.properties.get(*idx).map(Arc::as_ref))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn visible_properties(&self, model: &str) -> Vec<&DeclaredProperty> {
        self.properties_of(model)
            .into_iter()
            .filter(|p| !p.is_hidden())
            .collect()
    }

    fn require(&self, record: &RecordRef, name: &str) -> Result<&DeclaredProperty, EvalError> {
        self.property(record.model(), name)
            .ok_or_else(|| EvalError::UnknownProperty {
                model: record.model().to_string(),
                name: name.to_string(),
            })
    }

    /// Cached value if present, otherwise evaluates and fills the slot.
    pub fn get(&self, record: &RecordRef, name: &str) -> Result<Value, EvalError> {
        self.read_property(record, name, ambient_depth())?
            .ok_or_else(|| EvalError::UnknownProperty {
                model: record.model().to_string(),
                name: name.to_string(),
            })
    }

    /// Injects a value into the record's slot.
    pub fn set(&self, record: &RecordRef, name: &str, value: Value) -> Result<(), EvalError> {
        let prop = self.require(record, name)?;
        record.cache().set(prop.slot(), value);
        Ok(())
    }

    pub fn reset(&self, record: &RecordRef, name: &str) -> Result<(), EvalError> {
        let prop = self.require(record, name)?;
        record.cache().reset(prop.slot());
        Ok(())
    }

    pub fn is_cached(&self, record: &RecordRef, name: &str) -> bool {
        self.property(record.model(), name)
            .is_some_and(|p| record.cache().is_set(p.slot()))
    }

    /// Clears every slot of the record.
    pub fn refresh(&self, record: &RecordRef) {
        record.cache().clear();
    }

    /// `None` when `name` is not a declared property of the record's model.
    pub(crate) fn read_property(
        &self,
        record: &RecordRef,
        name: &str,
        depth: usize,
    ) -> Result<Option<Value>, EvalError> {
        let Some(prop) = self.property(record.model(), name) else {
            return Ok(None);
        };
        if let Some(v) = record.cache().get(prop.slot()) {
            return Ok(Some(v));
        }
        if depth > self.settings.max_depth {
            return Err(EvalError::RecursionLimit {
                depth: self.settings.max_depth,
            });
        }
        let value = prop.evaluate_at(record, self, depth)?;
        record.cache().set(prop.slot(), value.clone());
        Ok(Some(value))
    }
}
