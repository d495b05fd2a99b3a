use crate::error::EvalError;
use crate::expr::{
    AggregateKind, BinaryOperator, CastTarget, CompareKind, DatePart, DateUnit, TransformKind,
};
use crate::ops::{self, apply_transform, catalog::TransformCatalog, compare};
use crate::value::Value;
use chrono::NaiveDate;

fn run(kind: TransformKind, args: &[Value]) -> Value {
    apply_transform(&kind, args, true).expect("transform should succeed")
}

fn s(text: &str) -> Value {
    Value::from(text)
}

#[test]
fn string_kernels() {
    assert_eq!(run(TransformKind::Concat, &[s("a"), Value::Null, s("b")]), s("ab"));
    assert_eq!(run(TransformKind::Substr, &[s("hello"), Value::Int(2), Value::Int(3)]), s("ell"));
    assert_eq!(run(TransformKind::Substr, &[s("hello"), Value::Int(2)]), s("ello"));
    assert_eq!(run(TransformKind::StrIndex, &[s("hello"), s("l")]), Value::Int(3));
    assert_eq!(run(TransformKind::StrIndex, &[s("hello"), s("z")]), Value::Int(0));
    assert_eq!(run(TransformKind::LPad, &[s("7"), Value::Int(3), s("0")]), s("007"));
    assert_eq!(run(TransformKind::RPad, &[s("ab"), Value::Int(4)]), s("ab  "));
    assert_eq!(run(TransformKind::LPad, &[s("abcdef"), Value::Int(3)]), s("abc"));
    assert_eq!(run(TransformKind::Replace, &[s("banana"), s("a")]), s("bnn"));
    assert_eq!(run(TransformKind::Right, &[s("lovelace"), Value::Int(4)]), s("lace"));
    assert_eq!(run(TransformKind::Ord, &[s("A")]), Value::Int(65));
    assert_eq!(run(TransformKind::Chr, &[Value::Int(97)]), s("a"));
    assert_eq!(run(TransformKind::Upper, &[Value::Null]), Value::Null);
}

#[test]
fn substr_bounds_that_overflow_are_errors() {
    let too_long = apply_transform(
        &TransformKind::Substr,
        &[s("abc"), Value::Int(2), Value::Int(i64::MAX)],
        true,
    );
    assert!(matches!(too_long, Err(EvalError::TypeMismatch { .. })), "{too_long:?}");
    let too_early =
        apply_transform(&TransformKind::Substr, &[s("abc"), Value::Int(i64::MIN)], true);
    assert!(matches!(too_early, Err(EvalError::TypeMismatch { .. })), "{too_early:?}");
    assert_eq!(
        run(TransformKind::Substr, &[s("abc"), Value::Int(2), Value::Int(i64::MAX - 1)]),
        s("bc")
    );
}

#[test]
fn digests_are_lower_hex() {
    assert_eq!(run(TransformKind::Md5, &[s("")]), s("d41d8cd98f00b204e9800998ecf8427e"));
    assert_eq!(
        run(TransformKind::Sha1, &[s("abc")]),
        s("a9993e364706816aba3e25717850c26c9cd0d89d")
    );
    assert_eq!(
        run(TransformKind::Sha256, &[s("abc")]),
        s("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
    );
    assert_eq!(run(TransformKind::Sha512, &[Value::Null]), Value::Null);
}

#[test]
fn null_handling_of_conditional_helpers() {
    assert_eq!(run(TransformKind::Greatest, &[Value::Null, Value::Int(4)]), Value::Int(4));
    assert_eq!(run(TransformKind::Least, &[Value::Int(2), Value::Float(1.5)]), Value::Float(1.5));
    assert_eq!(run(TransformKind::Greatest, &[Value::Null, Value::Null]), Value::Null);
    assert_eq!(run(TransformKind::NullIf, &[Value::Int(0), Value::Int(0)]), Value::Null);
    assert_eq!(run(TransformKind::NullIf, &[Value::Int(3), Value::Int(0)]), Value::Int(3));
    assert_eq!(run(TransformKind::Coalesce, &[Value::Null, s("x"), s("y")]), s("x"));
}

#[test]
fn arithmetic_promotes_and_guards_division() {
    let add = |a: Value, b: Value| {
        ops::binary(BinaryOperator::Add, &a, &b).expect("add should succeed")
    };
    assert_eq!(add(Value::Int(2), Value::Int(3)), Value::Int(5));
    assert_eq!(add(Value::Int(2), Value::Float(0.5)), Value::Float(2.5));
    assert_eq!(add(Value::Null, Value::Int(1)), Value::Null);
    assert_eq!(add(s("ab"), s("cd")), s("abcd"));
    assert_eq!(
        ops::binary(BinaryOperator::Div, &Value::Int(7), &Value::Int(2))
            .expect("div should succeed"),
        Value::Float(3.5)
    );
    assert!(matches!(
        ops::binary(BinaryOperator::Mod, &Value::Int(7), &Value::Int(0)),
        Err(EvalError::DivisionByZero)
    ));
    assert!(matches!(
        ops::binary(BinaryOperator::Mod, &Value::Int(i64::MIN), &Value::Int(-1)),
        Err(EvalError::TypeMismatch { .. })
    ));
    assert_eq!(
        ops::binary(BinaryOperator::Mod, &Value::Int(-7), &Value::Int(3))
            .expect("mod should succeed"),
        Value::Int(-1)
    );
    assert!(matches!(
        ops::binary(BinaryOperator::Sub, &s("a"), &Value::Int(1)),
        Err(EvalError::TypeMismatch { .. })
    ));
}

#[test]
fn math_domains_are_checked() {
    assert_eq!(run(TransformKind::Round, &[Value::Float(2.345), Value::Int(1)]), Value::Float(2.3));
    assert_eq!(run(TransformKind::Round, &[Value::Float(-2.5)]), Value::Float(-3.0));
    assert_eq!(run(TransformKind::Sign, &[Value::Float(-0.1)]), Value::Int(-1));
    assert_eq!(run(TransformKind::Abs, &[Value::Int(-4)]), Value::Int(4));
    assert_eq!(run(TransformKind::Floor, &[Value::Int(4)]), Value::Int(4));
    let log = run(TransformKind::Log, &[Value::Int(2), Value::Int(8)])
        .as_f64()
        .expect("log is numeric");
    assert!((log - 3.0).abs() < 1e-12);
    assert_eq!(run(TransformKind::Power, &[Value::Int(2), Value::Int(10)]), Value::Int(1024));
    assert!(matches!(
        apply_transform(&TransformKind::Sqrt, &[Value::Int(-1)], true),
        Err(EvalError::Domain { op: "sqrt" })
    ));
    assert!(matches!(
        apply_transform(&TransformKind::Log, &[Value::Int(1), Value::Int(8)], true),
        Err(EvalError::Domain { .. })
    ));
}

#[test]
fn date_truncation_and_extraction() {
    let day = Value::Date(NaiveDate::from_ymd_opt(2024, 5, 15).expect("valid date"));
    let date = |y, m, d| Value::Date(NaiveDate::from_ymd_opt(y, m, d).expect("valid date"));
    assert_eq!(run(TransformKind::Trunc(DateUnit::Week), &[day.clone()]), date(2024, 5, 13));
    assert_eq!(run(TransformKind::Trunc(DateUnit::Quarter), &[day.clone()]), date(2024, 4, 1));
    assert_eq!(run(TransformKind::Trunc(DateUnit::Year), &[day.clone()]), date(2024, 1, 1));
    assert_eq!(run(TransformKind::Extract(DatePart::WeekDay), &[day.clone()]), Value::Int(4));
    assert_eq!(run(TransformKind::Extract(DatePart::IsoWeekDay), &[day.clone()]), Value::Int(3));
    assert_eq!(run(TransformKind::Extract(DatePart::Quarter), &[day.clone()]), Value::Int(2));
    assert!(apply_transform(&TransformKind::Extract(DatePart::Hour), &[day], true).is_err());
    assert!(matches!(run(TransformKind::Now, &[]), Value::DateTime(_)));
}

#[test]
fn casts() {
    assert_eq!(run(TransformKind::Cast(CastTarget::Int), &[s(" 42 ")]), Value::Int(42));
    assert_eq!(run(TransformKind::Cast(CastTarget::Int), &[Value::Float(3.9)]), Value::Int(3));
    assert_eq!(run(TransformKind::Cast(CastTarget::Bool), &[s("no")]), Value::Bool(false));
    assert_eq!(run(TransformKind::Cast(CastTarget::Str), &[Value::Null]), Value::Null);
    assert!(matches!(
        run(TransformKind::Cast(CastTarget::Uuid), &[s("67e55044-10b1-426f-9247-bb680e5fe0c8")]),
        Value::Uuid(_)
    ));
    assert!(matches!(
        apply_transform(&TransformKind::Cast(CastTarget::Int), &[s("four")], true),
        Err(EvalError::InvalidCast { .. })
    ));
}

#[test]
fn aggregates_skip_nulls() {
    let values = vec![Value::Int(1), Value::Null, Value::Int(3)];
    let agg = |kind, default| {
        ops::aggregate(kind, values.clone(), default).expect("aggregate should succeed")
    };
    assert_eq!(agg(AggregateKind::Count, None), Value::Int(2));
    assert_eq!(agg(AggregateKind::Sum, None), Value::Int(4));
    assert_eq!(agg(AggregateKind::Max, None), Value::Int(3));
    assert_eq!(agg(AggregateKind::Avg, None), Value::Float(2.0));
    assert_eq!(agg(AggregateKind::Variance, None), Value::Float(1.0));
    assert_eq!(
        ops::aggregate(AggregateKind::Sum, vec![Value::Null], Some(Value::Int(0)))
            .expect("sum should succeed"),
        Value::Int(0)
    );
    assert_eq!(
        ops::aggregate(AggregateKind::Count, Vec::new(), Some(Value::Int(9)))
            .expect("count should succeed"),
        Value::Int(0)
    );
}

#[test]
fn lookup_kinds() {
    let yes = |kind, l: Value, r: Value| {
        compare::lookup(kind, &l, &r).expect("lookup should succeed")
    };
    assert!(yes(CompareKind::IContains, s("Lovelace"), s("LACE")));
    assert!(yes(CompareKind::IStartsWith, s("Lovelace"), s("love")));
    assert!(!yes(CompareKind::Exact, Value::Null, Value::Int(1)));
    assert!(yes(CompareKind::Exact, Value::Null, Value::Null));
    assert!(yes(CompareKind::In, Value::Int(2), Value::List(vec![Value::Int(1), Value::Int(2)])));
    assert!(yes(CompareKind::Regex, s("ada99"), s("[0-9]+")));
    assert!(!yes(CompareKind::Regex, s("ada"), s("^d")));
    assert!(yes(CompareKind::IRegex, s("ADA"), s("^a")));
    let range = Value::Tuple(vec![Value::Int(1), Value::Int(5)]);
    assert!(yes(CompareKind::Range, Value::Int(3), range.clone()));
    assert!(!yes(CompareKind::Range, Value::Int(5), range));
    assert!(!yes(CompareKind::Lt, Value::Null, Value::Int(3)));
    assert!(matches!(
        compare::lookup(CompareKind::Regex, &s("x"), &s("(")),
        Err(EvalError::InvalidRegex { .. })
    ));
}

#[test]
fn catalog_arity_and_capabilities() {
    let meta = TransformCatalog::meta(&TransformKind::Substr);
    assert_eq!(meta.min_args, 2);
    assert_eq!(meta.max_args, Some(3));
    assert_eq!(
        TransformCatalog::meta(&TransformKind::Sha256).capability,
        Some(ops::Capability::Hashing)
    );
    assert_eq!(TransformCatalog::meta(&TransformKind::Concat).max_args, None);
}
