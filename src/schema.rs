use indexmap::IndexMap;

/// Name every model answers to for its primary key.
pub const PK: &str = "pk";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cardinality {
    /// Foreign key stored on this model under the relation name.
    ToOne,
    /// Reverse of a foreign key `remote_field` declared on the target model.
    ToMany,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDef {
    pub name: String,
    pub target: String,
    pub cardinality: Cardinality,
    /// For `ToMany`, the foreign key on the target that points back here.
    pub remote_field: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelSchema {
    pub name: String,
    pub fields: Vec<String>,
    pub relations: Vec<RelationDef>,
    pub is_abstract: bool,
    pub parent: Option<String>,
}

impl ModelSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(name.into());
        self
    }

    pub fn fields<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn to_one(mut self, name: impl Into<String>, target: impl Into<String>) -> Self {
        self.relations.push(RelationDef {
            name: name.into(),
            target: target.into(),
            cardinality: Cardinality::ToOne,
            remote_field: None,
        });
        self
    }

    pub fn to_many(
        mut self,
        name: impl Into<String>,
        target: impl Into<String>,
        remote_field: impl Into<String>,
    ) -> Self {
        self.relations.push(RelationDef {
            name: name.into(),
            target: target.into(),
            cardinality: Cardinality::ToMany,
            remote_field: Some(remote_field.into()),
        });
        self
    }

    pub fn abstract_model(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// Catalogue of models with single inheritance.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    models: IndexMap<String, ModelSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, model: ModelSchema) -> Self {
        self.add(model);
        self
    }

    pub fn add(&mut self, model: ModelSchema) {
        self.models.insert(model.name.clone(), model);
    }

    pub fn model(&self, name: &str) -> Option<&ModelSchema> {
        self.models.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelSchema> {
        self.models.values()
    }

    /// `name` followed by its ancestors, nearest first.
    pub fn lineage(&self, name: &str) -> Vec<&ModelSchema> {
        let mut out = Vec::new();
        let mut cursor = self.models.get(name);
        while let Some(model) = cursor {
            if out.iter().any(|m: &&ModelSchema| m.name == model.name) {
                break;
            }
            out.push(model);
            cursor = model.parent.as_deref().and_then(|p| self.models.get(p));
        }
        out
    }

    pub fn is_subtype(&self, model: &str, ancestor: &str) -> bool {
        self.lineage(model).iter().any(|m| m.name == ancestor)
    }

    pub fn has_field(&self, model: &str, field: &str) -> bool {
        field == PK
            || self
                .lineage(model)
                .iter()
                .any(|m| m.fields.iter().any(|f| f == field))
    }

    pub fn relation(&self, model: &str, name: &str) -> Option<&RelationDef> {
        self.lineage(model)
            .into_iter()
            .find_map(|m| m.relations.iter().find(|r| r.name == name))
    }

    pub fn all_fields(&self, model: &str) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for m in self.lineage(model).into_iter().rev() {
            out.extend(m.fields.iter().map(String::as_str));
        }
        out
    }

    /// Concrete models that are `model` or inherit from it, in declaration order.
    pub fn concrete_models_under(&self, model: &str) -> Vec<&str> {
        self.models
            .values()
            .filter(|m| !m.is_abstract && self.is_subtype(&m.name, model))
            .map(|m| m.name.as_str())
            .collect()
    }
}
