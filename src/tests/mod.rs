use crate::expr::{
    aggregate, case, concat, field, lit, property, transform, AggregateKind, Expression,
    TransformKind,
};
use crate::memory::{MemoryEngine, MemoryFallback, MemoryStore, VendorTable};
use crate::property::PropertyTemplate;
use crate::record::RecordRef;
use crate::registry::Registry;
use crate::schema::{ModelSchema, Schema};
use crate::value::Value;
use std::sync::Arc;

mod compile;
mod ops;
mod procedure;
mod property;
mod resolve;
mod rewrite;

/// `Example` owns many `Thing`s and may point at a parent `Example`.
/// `Base` is abstract with two concrete children.
fn example_schema() -> Schema {
    Schema::new()
        .with(
            ModelSchema::new("Example")
                .fields(["first_name", "last_name", "age", "number", "ts"])
                .to_one("parent", "Example")
                .to_many("things", "Thing", "example"),
        )
        .with(
            ModelSchema::new("Thing")
                .fields(["label", "number"])
                .to_one("example", "Example"),
        )
        .with(
            ModelSchema::new("Base")
                .abstract_model()
                .field("name")
                .to_one("owner", "Example"),
        )
        .with(ModelSchema::new("Left").extends("Base").field("left_only"))
        .with(ModelSchema::new("Right").extends("Base").field("right_only"))
}

fn full_name() -> Expression {
    concat([field("first_name"), lit(" "), field("last_name")])
}

fn age_group() -> Expression {
    case(
        vec![
            (field("age").lt(13), lit("child")),
            (field("age").lt(20), lit("teen")),
        ],
        lit("adult"),
    )
}

fn standard_properties() -> Vec<PropertyTemplate> {
    vec![
        PropertyTemplate::new("Example", "full_name", full_name()),
        PropertyTemplate::new("Example", "age_group", age_group()),
        PropertyTemplate::new(
            "Example",
            "thing_total",
            aggregate(AggregateKind::Sum, "things.number").or_default(0),
        ),
        PropertyTemplate::new(
            "Example",
            "small_total",
            aggregate(AggregateKind::Sum, "things.number").filtered(field("things.number").lt(3)),
        ),
        PropertyTemplate::new("Thing", "shout", transform(TransformKind::Upper, [field("label")])),
        PropertyTemplate::new("Thing", "owner_name", property("example.full_name")),
    ]
}

struct Fixture {
    store: MemoryStore,
    registry: Arc<Registry>,
    engine: MemoryEngine,
}

impl Fixture {
    fn new(templates: Vec<PropertyTemplate>) -> Self {
        Self::with_vendors(templates, VendorTable::default())
    }

    fn with_vendors(templates: Vec<PropertyTemplate>, vendors: VendorTable) -> Self {
        let schema = example_schema();
        let store = MemoryStore::new(schema.clone());
        let fallback = MemoryFallback::new(store.clone()).with_vendors(vendors.clone());
        let registry = templates
            .into_iter()
            .fold(Registry::builder(schema).fallback(Arc::new(fallback)), |b, t| b.declare(t))
            .assemble()
            .expect("registry should assemble");
        let registry = Arc::new(registry);
        let engine = MemoryEngine::new(store.clone(), registry.clone()).with_vendors(vendors);
        Self {
            store,
            registry,
            engine,
        }
    }

    fn insert(&self, model: &str, fields: &[(&str, Value)]) -> RecordRef {
        self.store
            .insert(model, fields.iter().cloned())
            .expect("insert should succeed")
    }

    fn example(&self, first: &str, last: &str, age: i64) -> RecordRef {
        self.insert(
            "Example",
            &[
                ("first_name", Value::from(first)),
                ("last_name", Value::from(last)),
                ("age", Value::Int(age)),
            ],
        )
    }

    fn thing(&self, owner: &RecordRef, label: &str, number: i64) -> RecordRef {
        self.insert(
            "Thing",
            &[
                ("label", Value::from(label)),
                ("number", Value::Int(number)),
                ("example", Value::Record(owner.clone())),
            ],
        )
    }

    fn get(&self, record: &RecordRef, name: &str) -> Value {
        self.registry.get(record, name).expect("property should evaluate")
    }
}

fn pks(records: &[RecordRef]) -> Vec<Value> {
    records.iter().map(|r| r.pk()).collect()
}
