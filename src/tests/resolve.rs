use super::*;
use crate::error::ResolveError;
use crate::resolve::{Lookup, QueryContext};

fn people(fx: &Fixture) -> (RecordRef, RecordRef, RecordRef) {
    let foo = fx.example("foo", "bar", 30);
    let kid = fx.example("kid", "bar", 8);
    let solo = fx.example("solo", "baz", 16);
    fx.thing(&foo, "a", 1);
    fx.thing(&foo, "b", 4);
    fx.thing(&kid, "c", 2);
    (foo, kid, solo)
}

#[test]
fn filters_on_a_declared_property() {
    let fx = Fixture::new(standard_properties());
    let (foo, ..) = people(&fx);
    let hits = fx
        .engine
        .filter("Example", &Lookup::new("full_name").exact("foo bar").into())
        .expect("filter should succeed");
    assert_eq!(pks(&hits), vec![foo.pk()]);

    let teens = fx
        .engine
        .filter("Example", &Lookup::new("age_group").iexact("TEEN").into())
        .expect("filter should succeed");
    assert_eq!(teens.len(), 1);
}

#[test]
fn relation_hops_register_joins_once() {
    let fx = Fixture::new(standard_properties());
    let mut ctx = QueryContext::new("Thing");
    let native = fx
        .engine
        .resolver()
        .lookup(&Lookup::new("example.full_name").exact("foo bar"), &mut ctx)
        .expect("lookup should resolve");
    assert_eq!(ctx.alias("example"), Some("t1"));
    assert_eq!(native.joins, vec![("example".to_string(), "t1".to_string())]);
    assert!(!native.grouped);

    fx.engine
        .resolver()
        .lookup(&Lookup::new("example.parent.full_name").exact("x"), &mut ctx)
        .expect("lookup should resolve");
    assert_eq!(ctx.alias("example"), Some("t1"));
    assert_eq!(ctx.alias("example.parent"), Some("t2"));
    assert_eq!(ctx.joins().len(), 2);
}

#[test]
fn join_hints_follow_the_property_through_relations() {
    let mut templates = standard_properties();
    templates.push(
        PropertyTemplate::new("Example", "hinted", field("first_name")).joins(["things"]),
    );
    let fx = Fixture::new(templates);
    let mut ctx = QueryContext::new("Thing");
    fx.engine
        .resolver()
        .lookup(&Lookup::new("example.hinted"), &mut ctx)
        .expect("lookup should resolve");
    let joined: Vec<&str> = ctx.joins().keys().map(String::as_str).collect();
    assert_eq!(joined, vec!["example", "example.things"]);
}

#[test]
fn aggregate_properties_promote_grouping() {
    let fx = Fixture::new(standard_properties());
    let mut ctx = QueryContext::new("Thing");
    let native = fx
        .engine
        .resolver()
        .lookup(&Lookup::new("example.thing_total").gt(2), &mut ctx)
        .expect("lookup should resolve");
    assert!(native.grouped);
    assert!(ctx.requires_grouping());
}

#[test]
fn filters_through_relations_match_the_related_property() {
    let fx = Fixture::new(standard_properties());
    let (foo, kid, _) = people(&fx);
    let things = fx
        .engine
        .filter("Thing", &Lookup::new("example.full_name").exact("foo bar").into())
        .expect("filter should succeed");
    assert_eq!(things.len(), 2);
    let busy = fx
        .engine
        .filter("Thing", &Lookup::new("example.thing_total").gte(5).into())
        .expect("filter should succeed");
    assert_eq!(busy.len(), 2);
    assert!(busy.iter().all(|t| {
        t.field("example")
            .and_then(|e| e.as_record().map(|r| r.pk()))
            .is_some_and(|pk| pk == foo.pk())
    }));
    let small = fx
        .engine
        .filter("Example", &Lookup::new("small_total").exact(2).into())
        .expect("filter should succeed");
    assert_eq!(pks(&small), vec![kid.pk()]);
}

#[test]
fn to_many_lookups_behave_like_left_joins() {
    let fx = Fixture::new(standard_properties());
    let (foo, kid, solo) = people(&fx);
    let with_a = fx
        .engine
        .filter("Example", &Lookup::new("things.shout").exact("A").into())
        .expect("filter should succeed");
    assert_eq!(pks(&with_a), vec![foo.pk()]);

    let without = fx
        .engine
        .filter("Example", &Lookup::new("things.shout").isnull(true).into())
        .expect("filter should succeed");
    assert_eq!(pks(&without), vec![solo.pk()]);

    let labels = crate::expr::list([lit("B"), lit("C")]);
    let any = fx
        .engine
        .filter("Example", &Lookup::new("things.shout").is_in(labels).into())
        .expect("filter should succeed");
    assert_eq!(pks(&any), vec![foo.pk(), kid.pk()]);
}

#[test]
fn property_lookups_combine_with_plain_predicates() {
    let fx = Fixture::new(standard_properties());
    let (_, kid, _) = people(&fx);
    let predicate =
        Expression::from(Lookup::new("full_name").endswith("bar")).and(field("age").lt(18));
    let hits = fx.engine.filter("Example", &predicate).expect("filter should succeed");
    assert_eq!(pks(&hits), vec![kid.pk()]);
}

#[test]
fn ordering_by_a_property() {
    let fx = Fixture::new(standard_properties());
    let (foo, kid, solo) = people(&fx);
    let nameless = fx.insert("Example", &[]);
    let ordered = fx
        .engine
        .order_by("Example", &[Lookup::new("age_group").asc(), Lookup::new("full_name").desc()])
        .expect("order should succeed");
    // a missing age falls through to "adult" and its name concatenates to " "
    assert_eq!(
        pks(&ordered),
        vec![foo.pk(), nameless.pk(), kid.pk(), solo.pk()]
    );

    let by_total = fx
        .engine
        .order_by("Example", &[Lookup::new("small_total").desc().nulls_first()])
        .expect("order should succeed");
    assert_eq!(
        pks(&by_total),
        vec![solo.pk(), nameless.pk(), kid.pk(), foo.pk()]
    );
}

#[test]
fn annotate_fills_property_caches() {
    let fx = Fixture::new(standard_properties());
    let (foo, ..) = people(&fx);
    let rows = fx.engine.annotate("Example", "thing_total").expect("annotate should succeed");
    assert_eq!(rows.len(), 3);
    assert!(fx.registry.is_cached(&foo, "thing_total"));
    assert_eq!(fx.get(&foo, "thing_total"), Value::Int(5));
}

#[test]
fn lookup_errors_name_the_problem() {
    let fx = Fixture::new(standard_properties());
    let filter = |model: &str, lookup: Lookup| fx.engine.filter(model, &lookup.into());

    assert!(matches!(
        filter("Example", Lookup::new("nope")),
        Err(ResolveError::UnknownPath { .. })
    ));
    assert!(matches!(
        filter("Example", Lookup::new("things")),
        Err(ResolveError::NotAProperty { .. })
    ));
    assert!(matches!(
        filter("Example", Lookup::new("full_name.length")),
        Err(ResolveError::TrailingPath { .. })
    ));
    assert!(matches!(
        filter("Missing", Lookup::new("full_name")),
        Err(ResolveError::UnknownModel { .. })
    ));
    assert!(matches!(
        fx.engine.filter("Example", &field("nope").equals(1)),
        Err(ResolveError::UnknownPath { .. })
    ));
}

#[test]
fn cyclic_properties_stop_expanding() {
    let mut templates = standard_properties();
    templates.push(PropertyTemplate::new("Example", "ping", property("pong")));
    templates.push(PropertyTemplate::new("Example", "pong", property("ping")));
    let fx = Fixture::new(templates);
    let err = fx
        .engine
        .filter("Example", &Lookup::new("ping").exact(1).into())
        .expect_err("cycle should fail");
    assert!(matches!(err, ResolveError::RecursionLimit { .. }), "{err}");
}

#[test]
fn abstract_relation_targets_resolve_through_concrete_bindings() {
    let mut templates = standard_properties();
    templates.push(PropertyTemplate::new(
        "Base",
        "tag",
        concat([field("name"), lit("@"), property("owner.full_name")]),
    ));
    let fx = Fixture::new(templates);
    let foo = fx.example("foo", "bar", 30);
    let left = fx.insert(
        "Left",
        &[("name", Value::from("l")), ("owner", Value::Record(foo.clone()))],
    );
    fx.insert("Right", &[("name", Value::from("r"))]);

    assert_eq!(fx.get(&left, "tag"), Value::from("l@foo bar"));
    let hits = fx
        .engine
        .filter("Base", &Lookup::new("tag").startswith("l@").into())
        .expect("filter should succeed");
    assert_eq!(pks(&hits), vec![left.pk()]);
}

#[test]
fn xor_chains_agree_on_records_and_queries() {
    let parity = crate::expr::xor([field("age").gt(5), field("age").gt(10), field("age").gt(20)]);
    let mut templates = standard_properties();
    templates.push(PropertyTemplate::new("Example", "odd", parity.clone()));
    let fx = Fixture::new(templates);
    let (foo, kid, solo) = people(&fx);

    let source = fx
        .registry
        .property("Example", "odd")
        .and_then(|p| p.procedure())
        .expect("odd should be compiled")
        .source();
    assert!(
        source.contains("(self.age > 5) xor ((self.age > 10) xor (self.age > 20))"),
        "{source}"
    );

    assert_eq!(fx.get(&foo, "odd"), Value::Bool(true));
    assert_eq!(fx.get(&kid, "odd"), Value::Bool(true));
    assert_eq!(fx.get(&solo, "odd"), Value::Bool(false));

    let hits = fx.engine.filter("Example", &parity).expect("filter should succeed");
    assert_eq!(pks(&hits), vec![foo.pk(), kid.pk()]);
    let by_lookup = fx
        .engine
        .filter("Example", &Lookup::new("odd").exact(true).into())
        .expect("filter should succeed");
    assert_eq!(pks(&by_lookup), vec![foo.pk(), kid.pk()]);
}
