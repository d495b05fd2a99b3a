use super::*;
use crate::capture::Thunk;
use crate::expr::{opaque, outer, Subquery, SubqueryKind};
use crate::rewrite::{rewrite, rewrite_path};

#[test]
fn field_paths_gain_the_relation_prefix() {
    let rewritten = rewrite(&full_name(), "example");
    assert_eq!(
        rewritten,
        concat([field("example.first_name"), lit(" "), field("example.last_name")])
    );
}

#[test]
fn rewriting_twice_equals_rewriting_the_chain() {
    let expr = age_group().and(field("things.number").gt(1));
    let stepwise = rewrite(&rewrite(&expr, "parent"), "example");
    assert_eq!(stepwise, rewrite_path(&expr, &["example", "parent"]));
    assert_eq!(rewrite_path(&expr, &[] as &[&str]), expr);
}

#[test]
fn aggregate_sources_and_filters_move_together() {
    let expr =
        aggregate(AggregateKind::Sum, "things.number").filtered(field("things.number").lt(3));
    let expected = aggregate(AggregateKind::Sum, "example.things.number")
        .filtered(field("example.things.number").lt(3));
    assert_eq!(rewrite(&expr, "example"), expected);
}

#[test]
fn subqueries_only_rewrite_their_outer_references() {
    let query = Subquery::new("Thing", field("label"), SubqueryKind::Scalar)
        .filter(field("example.pk").equals(outer("pk")));
    let expected = Subquery::new("Thing", field("label"), SubqueryKind::Scalar)
        .filter(field("example.pk").equals(outer("parent.pk")));
    assert_eq!(
        rewrite(&Expression::from(query), "parent"),
        Expression::from(expected)
    );
}

#[test]
fn opaque_nodes_are_wrapped_in_relation_access() {
    let thunk = Thunk::new("seven", || Ok(Value::Int(7)));
    let rewritten = rewrite_path(&opaque(thunk.clone()), &["example", "parent"]);
    let expected = Expression::RelationAccess {
        via: "example".to_string(),
        rest: Expression::RelationAccess {
            via: "parent".to_string(),
            rest: opaque(thunk).boxed(),
        }
        .boxed(),
    };
    assert_eq!(rewritten, expected);
}

#[test]
fn property_references_and_literals() {
    let expr = property("full_name").equals(lit(Value::Null));
    assert_eq!(
        rewrite(&expr, "example"),
        property("example.full_name").equals(lit(Value::Null))
    );
    assert_eq!(rewrite(&lit(3), "example"), lit(3));
}
