#![allow(dead_code)]

use lookup_property::expr::{aggregate, case, concat, field, lit, property, transform};
use lookup_property::{
    AggregateKind, Expression, MemoryEngine, MemoryFallback, MemoryStore, ModelSchema,
    PropertyTemplate, RecordRef, Registry, Schema, TransformKind, Value,
};
use serde::Deserialize;
use std::sync::{Arc, Once};

pub const CONCRETE_MODELS: [&str; 4] = ["Example", "Thing", "Left", "Right"];

#[derive(Debug, Deserialize)]
struct FixtureFile {
    tables: Vec<FixtureTable>,
}

#[derive(Debug, Deserialize)]
struct FixtureTable {
    model: String,
    rows: Vec<serde_json::Value>,
}

pub struct World {
    pub store: MemoryStore,
    pub registry: Arc<Registry>,
    pub engine: MemoryEngine,
}

impl World {
    pub fn record(&self, model: &str, pk: i64) -> RecordRef {
        self.store
            .get(model, pk)
            .unwrap_or_else(|| panic!("{model} {pk} should exist"))
    }

    pub fn get(&self, model: &str, pk: i64, name: &str) -> Value {
        let record = self.record(model, pk);
        self.registry
            .get(&record, name)
            .unwrap_or_else(|e| panic!("{model}.{name} for pk {pk} should evaluate: {e}"))
    }
}

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn schema() -> Schema {
    Schema::new()
        .with(
            ModelSchema::new("Example")
                .fields(["first_name", "last_name", "age", "number"])
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

/// Properties exercising every resolution shape the engine supports:
/// stored fields, conditionals, aggregates, nested properties through
/// to-one and to-many relations, and abstract declarations.
pub fn properties() -> Vec<PropertyTemplate> {
    vec![
        PropertyTemplate::new("Example", "full_name", full_name()),
        PropertyTemplate::new(
            "Example",
            "age_group",
            case(
                vec![
                    (field("age").lt(13), lit("child")),
                    (field("age").lt(20), lit("teen")),
                ],
                lit("adult"),
            ),
        ),
        PropertyTemplate::new(
            "Example",
            "initials",
            concat([
                transform(TransformKind::Left, [field("first_name"), lit(1)]),
                transform(TransformKind::Left, [field("last_name"), lit(1)]),
            ]),
        ),
        PropertyTemplate::new(
            "Example",
            "thing_total",
            aggregate(AggregateKind::Sum, "things.number").or_default(0),
        ),
        PropertyTemplate::new(
            "Example",
            "big_things",
            aggregate(AggregateKind::Count, "things").filtered(field("things.number").gte(3)),
        ),
        PropertyTemplate::new(
            "Example",
            "weighted",
            field("number") * property("thing_total") + field("age"),
        ),
        PropertyTemplate::new("Thing", "shout", transform(TransformKind::Upper, [field("label")])),
        PropertyTemplate::new("Thing", "owner_name", property("example.full_name")),
        PropertyTemplate::new("Thing", "owner_group", property("example.age_group")),
        PropertyTemplate::new(
            "Thing",
            "share",
            field("number")
                / transform(TransformKind::NullIf, [property("example.thing_total"), lit(0)]),
        ),
        PropertyTemplate::new(
            "Base",
            "tag",
            concat([field("name"), lit("@"), property("owner.initials")]),
        ),
    ]
}

pub fn load(fixture: &str) -> World {
    load_with(fixture, properties())
}

pub fn load_with(fixture: &str, templates: Vec<PropertyTemplate>) -> World {
    init_tracing();
    let schema = schema();
    let store = MemoryStore::new(schema.clone());
    let path = format!("{}/tests/fixtures/{fixture}", env!("CARGO_MANIFEST_DIR"));
    let raw = std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("read {path}: {e}"));
    let file: FixtureFile = serde_json::from_str(&raw).expect("fixture should parse");
    for table in &file.tables {
        for row in &table.rows {
            store
                .insert_json(&table.model, row)
                .unwrap_or_else(|e| panic!("insert into {}: {e}", table.model));
        }
    }
    let fallback = MemoryFallback::new(store.clone());
    let registry = templates
        .into_iter()
        .fold(Registry::builder(schema).fallback(Arc::new(fallback)), |b, t| b.declare(t))
        .assemble()
        .expect("registry should assemble");
    let registry = Arc::new(registry);
    let engine = MemoryEngine::new(store.clone(), registry.clone());
    World {
        store,
        registry,
        engine,
    }
}

pub fn pks(records: &[RecordRef]) -> Vec<i64> {
    records.iter().filter_map(|r| r.pk().as_i64()).collect()
}
