use super::*;
use crate::capture::{Producer, Thunk};
use crate::error::EvalError;
use crate::expr::{coalesce, opaque, outer, Subquery, SubqueryKind};

fn with_extra(extra: Vec<PropertyTemplate>) -> Fixture {
    let mut templates = standard_properties();
    templates.extend(extra);
    Fixture::new(templates)
}

#[test]
fn full_name_joins_stored_fields() {
    let fx = Fixture::new(standard_properties());
    let foo = fx.example("foo", "bar", 30);
    assert_eq!(fx.get(&foo, "full_name"), Value::from("foo bar"));

    let nameless = fx.insert("Example", &[("last_name", Value::from("bar"))]);
    assert_eq!(fx.get(&nameless, "full_name"), Value::from(" bar"));
}

#[test]
fn conditional_takes_first_matching_branch() {
    let fx = Fixture::new(standard_properties());
    let cases = [(Value::Int(10), "child"), (Value::Int(15), "teen"), (Value::Int(40), "adult")];
    for (age, expected) in cases {
        let record = fx.insert("Example", &[("age", age)]);
        assert_eq!(fx.get(&record, "age_group"), Value::from(expected));
    }
    let unknown_age = fx.insert("Example", &[]);
    assert_eq!(fx.get(&unknown_age, "age_group"), Value::from("adult"));
}

#[test]
fn coalesce_and_greatest_skip_nulls() {
    let fx = with_extra(vec![
        PropertyTemplate::new(
            "Example",
            "display",
            coalesce([field("first_name"), field("last_name"), lit("anonymous")]),
        ),
        PropertyTemplate::new(
            "Example",
            "biggest",
            transform(TransformKind::Greatest, [field("age"), field("number")]),
        ),
    ]);
    let only_last = fx.insert(
        "Example",
        &[("last_name", Value::from("bar")), ("age", Value::Int(4))],
    );
    let empty = fx.insert("Example", &[]);
    assert_eq!(fx.get(&only_last, "display"), Value::from("bar"));
    assert_eq!(fx.get(&empty, "display"), Value::from("anonymous"));
    assert_eq!(fx.get(&only_last, "biggest"), Value::Int(4));
    assert_eq!(fx.get(&empty, "biggest"), Value::Null);
}

#[test]
fn range_excludes_both_bounds() {
    let fx = with_extra(vec![PropertyTemplate::new(
        "Example",
        "mid",
        field("number").range(1, 5),
    )]);
    for (number, expected) in [(1, false), (3, true), (5, false)] {
        let record = fx.insert("Example", &[("number", Value::Int(number))]);
        assert_eq!(fx.get(&record, "mid"), Value::Bool(expected), "number={number}");
    }
}

#[test]
fn aggregates_follow_live_relations() {
    let fx = with_extra(vec![
        PropertyTemplate::new("Example", "thing_count", aggregate(AggregateKind::Count, "things")),
        PropertyTemplate::new("Example", "population", aggregate(AggregateKind::Count, "pk")),
    ]);
    let owner = fx.example("foo", "bar", 30);
    let lonely = fx.example("solo", "", 5);
    fx.thing(&owner, "a", 1);
    fx.thing(&owner, "b", 4);

    assert_eq!(fx.get(&owner, "thing_total"), Value::Int(5));
    assert_eq!(fx.get(&owner, "small_total"), Value::Int(1));
    assert_eq!(fx.get(&owner, "thing_count"), Value::Int(2));
    assert_eq!(fx.get(&lonely, "thing_total"), Value::Int(0));
    assert_eq!(fx.get(&lonely, "small_total"), Value::Null);
    assert_eq!(fx.get(&lonely, "population"), Value::Int(2));
}

#[test]
fn nested_property_reads_go_through_relations() {
    let fx = with_extra(vec![PropertyTemplate::new(
        "Example",
        "shouted_name",
        transform(TransformKind::Upper, [property("full_name")]),
    )]);
    let owner = fx.example("foo", "bar", 30);
    let thing = fx.thing(&owner, "a", 1);
    assert_eq!(fx.get(&owner, "shouted_name"), Value::from("FOO BAR"));
    assert_eq!(fx.get(&thing, "owner_name"), Value::from("foo bar"));

    let orphan = fx.insert("Thing", &[("label", Value::from("x"))]);
    assert_eq!(fx.get(&orphan, "owner_name"), Value::Null);
}

#[test]
fn opaque_values_are_called_and_can_be_rebound() {
    let fx = with_extra(vec![PropertyTemplate::new(
        "Example",
        "lucky",
        field("number") + opaque(Thunk::new("seven", || Ok(Value::Int(7)))),
    )]);
    let record = fx.insert("Example", &[("number", Value::Int(3))]);
    assert_eq!(fx.get(&record, "lucky"), Value::Int(10));

    let proc = fx
        .registry
        .property("Example", "lucky")
        .and_then(|p| p.procedure().cloned())
        .expect("lucky should be compiled");
    let hundred: Producer = Arc::new(|_, _| Ok(Value::Int(100)));
    let rebound = proc
        .call_with(&record, &fx.registry, &[("arg0", hundred.clone())])
        .expect("call should succeed");
    assert_eq!(rebound, Value::Int(103));

    let err = proc
        .call_with(&record, &fx.registry, &[("arg9", hundred)])
        .expect_err("unknown parameter should fail");
    assert!(matches!(err, EvalError::UnknownCapture { ref param } if param == "arg9"));
}

#[test]
fn subqueries_run_through_the_fallback() {
    let first_label = Subquery::new("Thing", field("label"), SubqueryKind::Scalar)
        .filter(field("example.pk").equals(outer("pk")));
    let has_big = Subquery::new("Thing", field("pk"), SubqueryKind::Exists)
        .filter(and_big(outer("pk")));
    let fx = with_extra(vec![
        PropertyTemplate::new("Example", "first_label", first_label),
        PropertyTemplate::new("Example", "has_big", has_big),
    ]);
    let owner = fx.example("foo", "bar", 30);
    let lonely = fx.example("solo", "", 5);
    fx.thing(&owner, "a", 1);
    fx.thing(&owner, "b", 40);

    assert_eq!(fx.get(&owner, "first_label"), Value::from("a"));
    assert_eq!(fx.get(&lonely, "first_label"), Value::Null);
    assert_eq!(fx.get(&owner, "has_big"), Value::Bool(true));
    assert_eq!(fx.get(&lonely, "has_big"), Value::Bool(false));
    let report = fx
        .registry
        .property("Example", "has_big")
        .and_then(|p| p.report())
        .expect("has_big should have a compile report");
    assert_eq!(report.fallback_count, 1);
}

fn and_big(owner: Expression) -> Expression {
    crate::expr::and([field("example.pk").equals(owner), field("number").gt(10)])
}

#[test]
fn vendor_functions_resolve_through_the_table() {
    let vendors = VendorTable::new().with("double", |args: &[Value]| {
        crate::ops::binary(crate::expr::BinaryOperator::Mul, &args[0], &Value::Int(2))
    });
    let mut templates = standard_properties();
    templates.push(PropertyTemplate::new(
        "Example",
        "doubled",
        transform(TransformKind::Vendor("double".to_string()), [field("number")]),
    ));
    let fx = Fixture::with_vendors(templates, vendors);
    let record = fx.insert("Example", &[("number", Value::Int(21))]);
    assert_eq!(fx.get(&record, "doubled"), Value::Int(42));
}

#[test]
fn self_referencing_properties_hit_the_depth_limit() {
    let fx = with_extra(vec![
        PropertyTemplate::new("Example", "ping", property("pong")),
        PropertyTemplate::new("Example", "pong", property("ping")),
    ]);
    let record = fx.example("foo", "bar", 1);
    let err = fx.registry.get(&record, "ping").expect_err("cycle should fail");
    assert!(matches!(err, EvalError::RecursionLimit { .. }), "{err}");
}

#[test]
fn division_by_zero_surfaces_as_error() {
    let fx = with_extra(vec![PropertyTemplate::new(
        "Example",
        "ratio",
        field("age") / field("number"),
    )]);
    let record = fx.insert("Example", &[("age", Value::Int(3)), ("number", Value::Int(0))]);
    let err = fx.registry.get(&record, "ratio").expect_err("division by zero should fail");
    assert!(matches!(err, EvalError::DivisionByZero));
    let other = fx.insert("Example", &[("age", Value::Int(3)), ("number", Value::Int(2))]);
    assert_eq!(fx.get(&other, "ratio"), Value::Float(1.5));
}
