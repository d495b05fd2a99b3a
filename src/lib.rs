pub mod capture;
pub mod compile;
pub mod config;
pub mod error;
pub mod expr;
pub mod memory;
pub mod ops;
pub mod procedure;
pub mod property;
pub mod record;
pub mod registry;
pub mod resolve;
pub mod rewrite;
pub mod schema;
pub mod value;

pub use capture::{CaptureId, CaptureRegistry, CapturedEntry, Producer, Thunk};
pub use compile::{
    compile_procedure, CompileContext, CompileReport, CompiledBody, ProcedureCompiler,
    ScalarFallback, TreeCompiler,
};
pub use config::Settings;
pub use error::{CompileError, DeclarationError, Error, EvalError, ResolveError, StoreError};
pub use expr::{
    AggregateKind, BinaryOperator, BoolOp, CollectionKind, CompareKind, Expression, Subquery,
    SubqueryKind, TransformKind,
};
pub use memory::{MemoryEngine, MemoryFallback, MemoryStore, NativePredicate, VendorTable};
pub use procedure::{materialize, Procedure};
pub use property::{DeclaredProperty, PropertyTemplate};
pub use record::{PropertyCache, Record, RecordRef};
pub use registry::{Registry, RegistryBuilder};
pub use resolve::{Lookup, OrderBy, QueryContext, QueryEngine, Resolver};
pub use rewrite::{rewrite, rewrite_path};
pub use schema::{ModelSchema, Schema};
pub use value::Value;

#[cfg(test)]
mod tests;
