//! Generic SQL dialect.

use super::Dialect;

/// ANSI rendering with no node overrides.
#[derive(Debug, Default, Clone, Copy)]
pub struct GenericDialect;

impl Dialect for GenericDialect {
    fn name(&self) -> &'static str {
        "generic"
    }
}
