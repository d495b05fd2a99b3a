//! In-memory record store and query engine.
//!
//! The engine resolves lookups by evaluating the expanded expression tree
//! row by row, which makes it the reference the compiled procedures are
//! checked against.

mod engine;
mod eval;
mod fallback;
mod store;

pub use engine::{MemoryEngine, NativePredicate};
pub use fallback::{MemoryFallback, VendorFn, VendorTable};
pub use store::{MemoryRecord, MemoryStore};
