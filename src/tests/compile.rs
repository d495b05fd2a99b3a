use super::*;
use crate::capture::Thunk;
use crate::compile::{compile_procedure, CompileContext, ProcedureCompiler, TreeCompiler};
use crate::error::CompileError;
use crate::expr::{and, not, opaque, outer, xor, Subquery, SubqueryKind};
use crate::ops::Capability;

fn compile(expr: &Expression) -> Result<crate::procedure::Procedure, CompileError> {
    let schema = example_schema();
    let ctx = CompileContext::new("Example", &schema);
    compile_procedure("prop", expr, &ctx).map(|(proc, _)| proc)
}

#[test]
fn same_expression_compiles_to_identical_source() {
    let first = compile(&age_group()).expect("compile should succeed");
    let second = compile(&age_group()).expect("compile should succeed");
    assert_eq!(first.source(), second.source());
    assert_eq!(first.node_count(), second.node_count());
}

#[test]
fn top_level_conditional_becomes_statement_chain() {
    let proc = compile(&age_group()).expect("compile should succeed");
    let source = proc.source();
    assert!(source.starts_with("fn prop(self) {"), "{source}");
    assert!(source.contains("if self.age < 13 {"), "{source}");
    assert!(source.contains("} else if self.age < 20 {"), "{source}");
    assert!(source.contains("} else {"), "{source}");
    assert!(source.contains("return \"adult\";"), "{source}");
    assert_eq!(proc.statement_count(), 5);
}

#[test]
fn concat_lowers_to_right_nested_pairs() {
    let proc = compile(&full_name()).expect("compile should succeed");
    assert_eq!(
        proc.source(),
        "fn prop(self) {\n    return concat(self.first_name, concat(\" \", self.last_name));\n}"
    );
}

#[test]
fn regex_lookup_imports_capability() {
    let proc = compile(&field("first_name").regex("^f")).expect("compile should succeed");
    assert!(proc.requires(Capability::Regex));
    assert!(proc.source().contains("    use regex;\n"));
    let plain = compile(&field("first_name").equals("foo")).expect("compile should succeed");
    assert_eq!(plain.capabilities().count(), 0);
}

#[test]
fn insensitive_lookups_casefold_both_sides() {
    let proc = compile(&field("first_name").iexact("FOO")).expect("compile should succeed");
    assert!(proc
        .source()
        .contains("self.first_name.casefold() == \"FOO\".casefold()"));
}

#[test]
fn exact_null_is_a_null_test() {
    let proc = compile(&field("age").equals(Value::Null)).expect("compile should succeed");
    assert!(proc.source().contains("self.age is null"));
    let not_null = compile(&field("age").isnull(false)).expect("compile should succeed");
    assert!(not_null.source().contains("self.age is not null"));
}

#[test]
fn range_renders_strict_bounds() {
    let proc = compile(&field("number").range(1, 5)).expect("compile should succeed");
    assert!(proc.source().contains("1 < self.number < 5"), "{}", proc.source());
}

#[test]
fn related_aggregate_binds_item() {
    let expr = aggregate(AggregateKind::Sum, "things.number")
        .filtered(field("things.number").lt(3))
        .or_default(0);
    let proc = compile(&expr).expect("compile should succeed");
    let expected =
        "self.things.filter(|item| item.number < 3).map(|item| item.number).sum(default = 0)";
    assert!(proc.source().contains(expected), "{}", proc.source());
}

#[test]
fn own_model_aggregate_lists_objects() {
    let proc = compile(&aggregate(AggregateKind::Max, "age")).expect("compile should succeed");
    assert!(proc.source().contains("self.objects().map(|row| row.age).max()"), "{}", proc.source());
}

#[test]
fn aggregate_over_relation_needs_projection_unless_counting() {
    let err = compile(&aggregate(AggregateKind::Sum, "things"))
        .expect_err("sum of a relation should fail");
    assert!(matches!(err, CompileError::InvalidArgument { .. }), "{err}");
    compile(&aggregate(AggregateKind::Count, "things"))
        .expect("count of a relation should compile");
}

#[test]
fn opaque_values_become_trailing_params() {
    let expr = opaque(Thunk::new("seven", || Ok(Value::Int(7))))
        + opaque(Thunk::new("eight", || Ok(Value::Int(8))));
    let proc = compile(&expr).expect("compile should succeed");
    assert_eq!(proc.params(), vec!["self", "arg0", "arg1"]);
    assert_eq!(proc.captures()[0].label, "seven");
    assert_ne!(proc.captures()[0].id, proc.captures()[1].id);
    assert!(proc.source().starts_with("fn prop(self, arg0, arg1) {"));
}

#[test]
fn subquery_without_fallback_is_unsupported() {
    let query = Subquery::new("Thing", field("label"), SubqueryKind::Scalar)
        .filter(field("example.pk").equals(outer("pk")));
    let err = compile(&Expression::from(query)).expect_err("subquery needs a fallback");
    assert!(matches!(err, CompileError::UnsupportedKind { .. }), "{err}");
}

#[test]
fn vendor_transform_without_fallback_is_unsupported() {
    let expr = transform(TransformKind::Vendor("soundex".to_string()), [field("first_name")]);
    let err = compile(&expr).expect_err("vendor call needs a fallback");
    assert!(matches!(err, CompileError::UnsupportedKind { ref kind } if kind == "vendor soundex"));
}

#[test]
fn rejects_malformed_trees() {
    let cases: Vec<(Expression, &str)> = vec![
        (transform(TransformKind::Upper, []), "arity"),
        (field("age").compare(crate::expr::CompareKind::IsNull, field("number")), "isnull"),
        (outer("pk"), "stray outer"),
        (xor([]), "empty xor"),
        (
            Expression::BoolTree {
                op: crate::expr::BoolOp::Not,
                children: vec![lit(true), lit(false)],
            },
            "binary not",
        ),
        (field("number").range(1, 2).and(field("").equals(1)), "empty path"),
    ];
    for (expr, label) in cases {
        assert!(compile(&expr).is_err(), "{label} should be rejected");
    }
}

#[test]
fn empty_bool_trees_are_true_and_single_xor_is_truthiness() {
    let proc = compile(&and([])).expect("compile should succeed");
    assert!(proc.source().contains("return true;"));
    let single = compile(&xor([field("age")])).expect("compile should succeed");
    assert!(single.source().contains("bool(self.age)"), "{}", single.source());
    let negated = compile(&not(field("age").gt(3))).expect("compile should succeed");
    assert!(negated.source().contains("!(self.age > 3)"));
}

#[test]
fn unknown_model_is_rejected() {
    let schema = example_schema();
    let ctx = CompileContext::new("Missing", &schema);
    let err = TreeCompiler
        .compile(&full_name(), &ctx)
        .expect_err("unknown model should fail");
    assert!(matches!(err, CompileError::UnknownModel { .. }));
}

#[test]
fn report_counts_nodes_and_captures() {
    let schema = example_schema();
    let ctx = CompileContext::new("Example", &schema);
    let expr = field("number") + opaque(Thunk::new("one", || Ok(Value::Int(1))));
    let (_, report) = compile_procedure("plus_one", &expr, &ctx).expect("compile should succeed");
    assert_eq!(report.expr_nodes, 3);
    assert_eq!(report.capture_count, 1);
    assert_eq!(report.fallback_count, 0);
    assert!(report.summary_line().starts_with("model=Example property=plus_one "));
}

#[test]
fn now_follows_timezone_setting() {
    let schema = example_schema();
    let expr = transform(TransformKind::Now, []);
    let (utc, _) = compile_procedure("stamp", &expr, &CompileContext::new("Example", &schema))
        .expect("compile should succeed");
    let (local, _) = compile_procedure(
        "stamp",
        &expr,
        &CompileContext::new("Example", &schema).with_use_tz(false),
    )
    .expect("compile should succeed");
    assert!(utc.source().contains("now_utc()"));
    assert!(local.source().contains("now_local()"));
}
