use crate::error::CompileError;
use crate::expr::{CastTarget, DatePart, DateUnit, TransformKind};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Runtime support a procedure asks the materializer to provision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Capability {
    DateTime,
    Decimal,
    Hashing,
    Json,
    Math,
    Random,
    Regex,
    Uuid,
}

impl Capability {
    pub fn name(self) -> &'static str {
        match self {
            Self::DateTime => "datetime",
            Self::Decimal => "decimal",
            Self::Hashing => "hashing",
            Self::Json => "json",
            Self::Math => "math",
            Self::Random => "random",
            Self::Regex => "regex",
            Self::Uuid => "uuid",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformMeta {
    pub name: Cow<'static, str>,
    pub min_args: usize,
    /// `None` for variadic transforms.
    pub max_args: Option<usize>,
    pub capability: Option<Capability>,
}

impl TransformMeta {
    const fn fixed(name: &'static str, args: usize, capability: Option<Capability>) -> Self {
        Self {
            name: Cow::Borrowed(name),
            min_args: args,
            max_args: Some(args),
            capability,
        }
    }

    const fn between(
        name: &'static str,
        min: usize,
        max: usize,
        capability: Option<Capability>,
    ) -> Self {
        Self {
            name: Cow::Borrowed(name),
            min_args: min,
            max_args: Some(max),
            capability,
        }
    }

    const fn variadic(name: &'static str, min: usize, capability: Option<Capability>) -> Self {
        Self {
            name: Cow::Borrowed(name),
            min_args: min,
            max_args: None,
            capability,
        }
    }

    pub fn check_arity(&self, actual: usize) -> Result<(), CompileError> {
        let ok = actual >= self.min_args && self.max_args.map_or(true, |max| actual <= max);
        if ok {
            return Ok(());
        }
        let expected = match self.max_args {
            Some(max) if max == self.min_args => max.to_string(),
            Some(max) => format!("{}..={}", self.min_args, max),
            None => format!("at least {}", self.min_args),
        };
        Err(CompileError::InvalidArity {
            name: self.name.to_string(),
            expected,
            actual,
        })
    }
}

impl DateUnit {
    pub fn name(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Quarter => "quarter",
            Self::Month => "month",
            Self::Week => "week",
            Self::Day => "day",
            Self::Hour => "hour",
            Self::Minute => "minute",
            Self::Second => "second",
            Self::Date => "date",
            Self::Time => "time",
        }
    }
}

impl DatePart {
    pub fn name(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::IsoYear => "iso_year",
            Self::Quarter => "quarter",
            Self::Month => "month",
            Self::Week => "week",
            Self::Day => "day",
            Self::WeekDay => "week_day",
            Self::IsoWeekDay => "iso_week_day",
            Self::Hour => "hour",
            Self::Minute => "minute",
            Self::Second => "second",
        }
    }
}

const DATE_UNITS: [DateUnit; 10] = [
    DateUnit::Year,
    DateUnit::Quarter,
    DateUnit::Month,
    DateUnit::Week,
    DateUnit::Day,
    DateUnit::Hour,
    DateUnit::Minute,
    DateUnit::Second,
    DateUnit::Date,
    DateUnit::Time,
];

const DATE_PARTS: [DatePart; 11] = [
    DatePart::Year,
    DatePart::IsoYear,
    DatePart::Quarter,
    DatePart::Month,
    DatePart::Week,
    DatePart::Day,
    DatePart::WeekDay,
    DatePart::IsoWeekDay,
    DatePart::Hour,
    DatePart::Minute,
    DatePart::Second,
];

const CAST_TARGETS: [CastTarget; 7] = [
    CastTarget::Str,
    CastTarget::Int,
    CastTarget::Float,
    CastTarget::Decimal,
    CastTarget::Bool,
    CastTarget::Uuid,
    CastTarget::Json,
];

const SIMPLE_KINDS: [TransformKind; 52] = [
    TransformKind::Coalesce,
    TransformKind::Greatest,
    TransformKind::Least,
    TransformKind::NullIf,
    TransformKind::Concat,
    TransformKind::Upper,
    TransformKind::Lower,
    TransformKind::Length,
    TransformKind::LPad,
    TransformKind::RPad,
    TransformKind::LTrim,
    TransformKind::RTrim,
    TransformKind::Trim,
    TransformKind::Left,
    TransformKind::Right,
    TransformKind::Repeat,
    TransformKind::Replace,
    TransformKind::Reverse,
    TransformKind::StrIndex,
    TransformKind::Substr,
    TransformKind::Ord,
    TransformKind::Chr,
    TransformKind::Md5,
    TransformKind::Sha1,
    TransformKind::Sha224,
    TransformKind::Sha256,
    TransformKind::Sha384,
    TransformKind::Sha512,
    TransformKind::JsonObject,
    TransformKind::Abs,
    TransformKind::ACos,
    TransformKind::ASin,
    TransformKind::ATan,
    TransformKind::ATan2,
    TransformKind::Ceil,
    TransformKind::Cos,
    TransformKind::Cot,
    TransformKind::Degrees,
    TransformKind::Exp,
    TransformKind::Floor,
    TransformKind::Ln,
    TransformKind::Log,
    TransformKind::Mod,
    TransformKind::Pi,
    TransformKind::Power,
    TransformKind::Radians,
    TransformKind::Random,
    TransformKind::Round,
    TransformKind::Sign,
    TransformKind::Sin,
    TransformKind::Sqrt,
    TransformKind::Tan,
];

pub struct TransformCatalog;

impl TransformCatalog {
    pub fn meta(kind: &TransformKind) -> TransformMeta {
        use Capability as C;
        use TransformKind as T;
        let math = Some(C::Math);
        match kind {
            T::Coalesce => TransformMeta::variadic("coalesce", 2, None),
            T::Greatest => TransformMeta::variadic("greatest", 2, None),
            T::Least => TransformMeta::variadic("least", 2, None),
            T::NullIf => TransformMeta::fixed("nullif", 2, None),
            T::Concat => TransformMeta::variadic("concat", 2, None),
            T::Upper => TransformMeta::fixed("upper", 1, None),
            T::Lower => TransformMeta::fixed("lower", 1, None),
            T::Length => TransformMeta::fixed("length", 1, None),
            T::LPad => TransformMeta::between("lpad", 2, 3, None),
            T::RPad => TransformMeta::between("rpad", 2, 3, None),
            T::LTrim => TransformMeta::fixed("ltrim", 1, None),
            T::RTrim => TransformMeta::fixed("rtrim", 1, None),
            T::Trim => TransformMeta::fixed("trim", 1, None),
            T::Left => TransformMeta::fixed("left", 2, None),
            T::Right => TransformMeta::fixed("right", 2, None),
            T::Repeat => TransformMeta::fixed("repeat", 2, None),
            T::Replace => TransformMeta::between("replace", 2, 3, None),
            T::Reverse => TransformMeta::fixed("reverse", 1, None),
            T::StrIndex => TransformMeta::fixed("strindex", 2, None),
            T::Substr => TransformMeta::between("substr", 2, 3, None),
            T::Ord => TransformMeta::fixed("ord", 1, None),
            T::Chr => TransformMeta::fixed("chr", 1, None),
            T::Md5 => TransformMeta::fixed("md5", 1, Some(C::Hashing)),
            T::Sha1 => TransformMeta::fixed("sha1", 1, Some(C::Hashing)),
            T::Sha224 => TransformMeta::fixed("sha224", 1, Some(C::Hashing)),
            T::Sha256 => TransformMeta::fixed("sha256", 1, Some(C::Hashing)),
            T::Sha384 => TransformMeta::fixed("sha384", 1, Some(C::Hashing)),
            T::Sha512 => TransformMeta::fixed("sha512", 1, Some(C::Hashing)),
            T::JsonObject => TransformMeta::variadic("json_object", 0, Some(C::Json)),
            T::Cast(target) => TransformMeta {
                name: Cow::Owned(format!("cast_{}", target.name())),
                min_args: 1,
                max_args: Some(1),
                capability: match target {
                    CastTarget::Decimal => Some(C::Decimal),
                    CastTarget::Uuid => Some(C::Uuid),
                    CastTarget::Json => Some(C::Json),
                    _ => None,
                },
            },
            T::Abs => TransformMeta::fixed("abs", 1, math),
            T::ACos => TransformMeta::fixed("acos", 1, math),
            T::ASin => TransformMeta::fixed("asin", 1, math),
            T::ATan => TransformMeta::fixed("atan", 1, math),
            T::ATan2 => TransformMeta::fixed("atan2", 2, math),
            T::Ceil => TransformMeta::fixed("ceil", 1, math),
            T::Cos => TransformMeta::fixed("cos", 1, math),
            T::Cot => TransformMeta::fixed("cot", 1, math),
            T::Degrees => TransformMeta::fixed("degrees", 1, math),
            T::Exp => TransformMeta::fixed("exp", 1, math),
            T::Floor => TransformMeta::fixed("floor", 1, math),
            T::Ln => TransformMeta::fixed("ln", 1, math),
            T::Log => TransformMeta::fixed("log", 2, math),
            T::Mod => TransformMeta::fixed("mod", 2, math),
            T::Pi => TransformMeta::fixed("pi", 0, math),
            T::Power => TransformMeta::fixed("power", 2, math),
            T::Radians => TransformMeta::fixed("radians", 1, math),
            T::Random => TransformMeta::fixed("random", 0, Some(C::Random)),
            T::Round => TransformMeta::between("round", 1, 2, math),
            T::Sign => TransformMeta::fixed("sign", 1, math),
            T::Sin => TransformMeta::fixed("sin", 1, math),
            T::Sqrt => TransformMeta::fixed("sqrt", 1, math),
            T::Tan => TransformMeta::fixed("tan", 1, math),
            T::Now => TransformMeta::fixed("now", 0, Some(C::DateTime)),
            T::Trunc(unit) => TransformMeta {
                name: Cow::Owned(format!("trunc_{}", unit.name())),
                min_args: 1,
                max_args: Some(1),
                capability: Some(C::DateTime),
            },
            T::Extract(part) => TransformMeta {
                name: Cow::Owned(format!("extract_{}", part.name())),
                min_args: 1,
                max_args: Some(1),
                capability: Some(C::DateTime),
            },
            T::Vendor(name) => TransformMeta {
                name: Cow::Owned(format!("vendor_{name}")),
                min_args: 0,
                max_args: None,
                capability: None,
            },
        }
    }

    /// Looks a transform up by its catalogue name (`upper`, `trunc_month`,
    /// `cast_int`, ...). Vendor functions are not listed.
    pub fn by_name(name: &str) -> Option<TransformKind> {
        static BY_NAME: OnceLock<HashMap<String, TransformKind>> = OnceLock::new();
        BY_NAME
            .get_or_init(|| {
                Self::all()
                    .into_iter()
                    .map(|kind| (Self::meta(&kind).name.into_owned(), kind))
                    .collect()
            })
            .get(name)
            .cloned()
    }

    pub fn all() -> Vec<TransformKind> {
        let mut out: Vec<TransformKind> = SIMPLE_KINDS.to_vec();
        out.extend(CAST_TARGETS.iter().map(|t| TransformKind::Cast(*t)));
        out.push(TransformKind::Now);
        out.extend(DATE_UNITS.iter().map(|u| TransformKind::Trunc(*u)));
        out.extend(DATE_PARTS.iter().map(|p| TransformKind::Extract(*p)));
        out
    }
}
