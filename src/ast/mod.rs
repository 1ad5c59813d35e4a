/// Relational AST compilation.
///
/// ```text
/// Query builder / JSON document (adapter.rs)
///       ↓
/// Relational AST                  (types.rs)
///       ↓
/// Compiler + dialect overrides    (compiler.rs, dialect/)
///       ↓
/// SQL text + ordered binds        (collector.rs)
///       ↓
/// Optional syntax check           (check.rs)
/// ```
///
/// Column values are serialized through the casters in `crate::cast`.
pub mod adapter;
pub mod check;
pub mod collector;
pub mod compiler;
pub mod dialect;
pub mod types;

pub use adapter::JsonAdapter;
pub use check::{check_expr, check_sql};
pub use collector::{Bind, BindCollector, BoundValue, Collector, CompiledQuery, SubstituteBinds};
pub use compiler::{Compiler, Visitor};
pub use dialect::{Dialect, DialectKind, GenericDialect, PostgresDialect};
pub use types::*;
