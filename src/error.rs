use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("unsupported expression kind `{kind}` and no opaque fallback is configured")]
    UnsupportedKind { kind: String },
    #[error("transform `{name}` requires {expected} args, got {actual}")]
    InvalidArity {
        name: String,
        expected: String,
        actual: usize,
    },
    #[error("invalid argument for `{kind}`: {reason}")]
    InvalidArgument { kind: String, reason: String },
    #[error("unknown model `{model}`")]
    UnknownModel { model: String },
    #[error("outer reference `{path}` used outside of a subquery")]
    StrayOuterRef { path: String },
    #[error("invalid expression: {reason}")]
    InvalidExpression { reason: String },
}

#[derive(Debug, Error)]
pub enum DeclarationError {
    #[error("property `{name}` declared on unknown model `{model}`")]
    UnknownModel { model: String, name: String },
    #[error("property `{model}.{name}` is declared twice")]
    Duplicate { model: String, name: String },
    #[error("property `{model}.{name}` shadows a stored field")]
    ShadowsField { model: String, name: String },
    #[error("property `{model}.{name}` skips codegen but has no override installed")]
    MissingOverride { model: String, name: String },
    #[error("join hint `{relation}` of property `{model}.{name}` is not a relation")]
    UnknownJoin {
        model: String,
        name: String,
        relation: String,
    },
    #[error("failed to compile property `{model}.{name}`: {source}")]
    Compile {
        model: String,
        name: String,
        #[source]
        source: CompileError,
    },
}

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unknown model `{model}`")]
    UnknownModel { model: String },
    #[error("`{segment}` is neither a relation nor a property of `{model}`")]
    UnknownPath { model: String, segment: String },
    #[error("lookup `{path}` does not end at a declared property")]
    NotAProperty { path: String },
    #[error("lookup continues past property `{property}` with `{rest}`")]
    TrailingPath { property: String, rest: String },
    #[error("unknown relation `{relation}` on `{model}`")]
    UnknownRelation { model: String, relation: String },
    #[error("property expansion exceeded depth {depth}")]
    RecursionLimit { depth: usize },
    #[error("native resolution failed: {reason}")]
    Native { reason: String },
    #[error(transparent)]
    Eval(#[from] EvalError),
}

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("`{model}` has no attribute `{name}`")]
    UnknownAttribute { model: String, name: String },
    #[error("`{op}` is not defined for {detail}")]
    TypeMismatch { op: String, detail: String },
    #[error("division by zero")]
    DivisionByZero,
    #[error("invalid regex `{pattern}`: {reason}")]
    InvalidRegex { pattern: String, reason: String },
    #[error("cannot cast {value} to {target}")]
    InvalidCast { target: &'static str, value: String },
    #[error("math domain error in `{op}`")]
    Domain { op: &'static str },
    #[error("no capture parameter `{param}`")]
    UnknownCapture { param: String },
    #[error("property evaluation exceeded depth {depth}")]
    RecursionLimit { depth: usize },
    #[error("no declared property `{model}.{name}`")]
    UnknownProperty { model: String, name: String },
    #[error("fallback evaluation failed: {reason}")]
    Fallback { reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unknown model `{model}`")]
    UnknownModel { model: String },
    #[error("model `{model}` is abstract")]
    AbstractModel { model: String },
    #[error("`{model}` has no field `{field}`")]
    UnknownField { model: String, field: String },
    #[error("`{model}.{relation}` points at missing `{target}` pk={pk}")]
    DanglingReference {
        model: String,
        relation: String,
        target: String,
        pk: i64,
    },
    #[error("no `{model}` record with pk={pk}")]
    UnknownRecord { model: String, pk: i64 },
    #[error("record store has been dropped")]
    Detached,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Declaration(#[from] DeclarationError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
