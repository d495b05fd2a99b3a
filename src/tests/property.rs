use super::*;
use crate::error::{DeclarationError, EvalError};
use crate::property::Evaluator;

fn assemble(templates: Vec<PropertyTemplate>) -> Result<Registry, DeclarationError> {
    templates
        .into_iter()
        .fold(Registry::builder(example_schema()), |b, t| b.declare(t))
        .assemble()
}

#[test]
fn abstract_declaration_binds_every_concrete_model() {
    let registry = assemble(vec![PropertyTemplate::new(
        "Base",
        "shout",
        transform(TransformKind::Upper, [field("name")]),
    )])
    .expect("registry should assemble");

    let left = registry.property("Left", "shout").expect("Left should get the property");
    let right = registry.property("Right", "shout").expect("Right should get the property");
    assert!(registry.property("Base", "shout").is_none());
    assert_eq!(left.declared_on(), "Base");
    assert_eq!(right.model(), "Right");
    let (Some(a), Some(b)) = (left.procedure(), right.procedure()) else {
        panic!("both bindings should be compiled");
    };
    assert!(Arc::ptr_eq(a, b), "one compilation is shared by every binding");
}

#[test]
fn slots_are_indexed_per_model() {
    let registry = assemble(standard_properties()).expect("registry should assemble");
    let slots: Vec<usize> = registry
        .properties_of("Example")
        .iter()
        .map(|p| p.slot())
        .collect();
    assert_eq!(slots, vec![0, 1, 2, 3]);
    assert_eq!(registry.property("Thing", "shout").map(|p| p.slot()), Some(0));
    assert_eq!(registry.property("Thing", "owner_name").map(|p| p.slot()), Some(1));
}

#[test]
fn declaration_errors_are_reported() {
    let shadow = assemble(vec![PropertyTemplate::new("Example", "age", lit(1))]);
    assert!(matches!(shadow, Err(DeclarationError::ShadowsField { .. })));

    let relation_shadow = assemble(vec![PropertyTemplate::new("Example", "things", lit(1))]);
    assert!(matches!(relation_shadow, Err(DeclarationError::ShadowsField { .. })));

    let duplicate = assemble(vec![
        PropertyTemplate::new("Example", "twice", lit(1)),
        PropertyTemplate::new("Example", "twice", lit(2)),
    ]);
    assert!(matches!(duplicate, Err(DeclarationError::Duplicate { .. })));

    let unknown = assemble(vec![PropertyTemplate::new("Nope", "x", lit(1))]);
    assert!(matches!(unknown, Err(DeclarationError::UnknownModel { .. })));

    let bad_join = assemble(vec![PropertyTemplate::new("Example", "x", lit(1)).joins(["nowhere"])]);
    assert!(matches!(bad_join, Err(DeclarationError::UnknownJoin { .. })));

    let bad_body = assemble(vec![PropertyTemplate::new(
        "Example",
        "x",
        transform(TransformKind::Upper, []),
    )]);
    assert!(matches!(bad_body, Err(DeclarationError::Compile { .. })));
}

#[test]
fn skipped_codegen_requires_an_override() {
    let missing = assemble(vec![PropertyTemplate::new("Example", "manual", lit(1)).skip_codegen()]);
    assert!(matches!(missing, Err(DeclarationError::MissingOverride { .. })));

    let fx = Fixture::new(vec![PropertyTemplate::new("Example", "manual", full_name())
        .skip_codegen()
        .with_override(|record, _| Ok(Value::from(format!("#{}", record.pk()))))]);
    let prop = fx
        .registry
        .property("Example", "manual")
        .expect("manual should be declared");
    assert!(prop.is_overridden());
    assert!(matches!(prop.evaluator(), Evaluator::Overridden(_)));
    assert!(prop.report().is_none());
    let record = fx.example("foo", "bar", 1);
    assert_eq!(fx.get(&record, "manual"), Value::from(format!("#{}", record.pk())));
}

#[test]
fn cycles_through_overrides_hit_the_depth_limit() {
    let fx = Fixture::new(vec![
        PropertyTemplate::new("Example", "ping", lit(0))
            .skip_codegen()
            .with_override(|record, registry| registry.get(record, "pong")),
        PropertyTemplate::new("Example", "pong", property("ping")),
        PropertyTemplate::new("Example", "echo", lit(0))
            .skip_codegen()
            .with_override(|record, registry| registry.get(record, "echo")),
        PropertyTemplate::new("Example", "greeting", lit(0))
            .skip_codegen()
            .with_override(|record, registry| registry.get(record, "full_name")),
        PropertyTemplate::new("Example", "full_name", full_name()),
    ]);
    let record = fx.example("foo", "bar", 1);
    let mixed = fx.registry.get(&record, "ping").expect_err("cycle should fail");
    assert!(matches!(mixed, EvalError::RecursionLimit { .. }), "{mixed}");
    let direct = fx.registry.get(&record, "echo").expect_err("cycle should fail");
    assert!(matches!(direct, EvalError::RecursionLimit { .. }), "{direct}");

    assert_eq!(fx.get(&record, "greeting"), Value::from("foo bar"));
    assert_eq!(crate::property::ambient_depth(), 0);
}

#[test]
fn cache_holds_until_reset_or_refresh() {
    let fx = Fixture::new(standard_properties());
    let record = fx.example("foo", "bar", 30);
    assert!(!fx.registry.is_cached(&record, "full_name"));
    assert_eq!(fx.get(&record, "full_name"), Value::from("foo bar"));
    assert!(fx.registry.is_cached(&record, "full_name"));

    let pk = record.pk().as_i64().expect("memory pks are integers");
    fx.store
        .update("Example", pk, "first_name", Value::from("baz"))
        .expect("update should succeed");
    assert_eq!(fx.get(&record, "full_name"), Value::from("foo bar"));

    fx.registry.reset(&record, "full_name").expect("reset should succeed");
    assert_eq!(fx.get(&record, "full_name"), Value::from("baz bar"));

    fx.registry
        .set(&record, "full_name", Value::from("injected"))
        .expect("set should succeed");
    assert_eq!(fx.get(&record, "full_name"), Value::from("injected"));

    fx.registry.refresh(&record);
    assert!(!fx.registry.is_cached(&record, "full_name"));
    assert_eq!(fx.get(&record, "full_name"), Value::from("baz bar"));
}

#[test]
fn uncached_evaluation_bypasses_the_slot() {
    let fx = Fixture::new(standard_properties());
    let record = fx.example("foo", "bar", 30);
    fx.registry
        .set(&record, "full_name", Value::from("stale"))
        .expect("set should succeed");
    let prop = fx.registry.property("Example", "full_name").expect("declared");
    let fresh = prop.evaluate(&record, &fx.registry).expect("evaluate should succeed");
    assert_eq!(fresh, Value::from("foo bar"));
    assert_eq!(fx.get(&record, "full_name"), Value::from("stale"));
}

#[test]
fn unknown_property_access_fails() {
    let fx = Fixture::new(standard_properties());
    let record = fx.example("foo", "bar", 30);
    let err = fx.registry.get(&record, "nope").expect_err("unknown property should fail");
    assert!(matches!(err, EvalError::UnknownProperty { .. }));
    assert!(fx.registry.set(&record, "nope", Value::Null).is_err());
}

#[test]
fn hidden_properties_are_not_listed_as_visible() {
    let registry = assemble(vec![
        PropertyTemplate::new("Example", "shown", lit(1)),
        PropertyTemplate::new("Example", "secret", lit(2)).hidden(),
    ])
    .expect("registry should assemble");
    let visible: Vec<&str> = registry
        .visible_properties("Example")
        .iter()
        .map(|p| p.name())
        .collect();
    assert_eq!(visible, vec!["shown"]);
    assert_eq!(registry.properties_of("Example").len(), 2);
}

#[test]
fn per_property_timezone_overrides_settings() {
    let registry = assemble(vec![
        PropertyTemplate::new("Example", "stamp", transform(TransformKind::Now, [])),
        PropertyTemplate::new("Example", "local_stamp", transform(TransformKind::Now, []))
            .use_tz(false),
    ])
    .expect("registry should assemble");
    let source = |name: &str| {
        registry
            .property("Example", name)
            .and_then(|p| p.procedure())
            .map(|proc| proc.source())
            .unwrap_or_default()
    };
    assert!(source("stamp").contains("now_utc()"));
    assert!(source("local_stamp").contains("now_local()"));
}
