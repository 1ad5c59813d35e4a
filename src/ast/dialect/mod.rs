//! SQL dialect support.
//!
//! A dialect supplies the syntax details the base rules leave open
//! (placeholders, identifier and literal quoting) and may override the
//! rendering of individual node kinds. Anything it does not override falls
//! through to [`Visitor::visit_default`].
use serde::{Deserialize, Serialize};

use super::compiler::Visitor;
use super::types::Node;
use crate::cast::{encode_array, Value};
use crate::error::Result;

mod generic;
mod postgres;

pub use generic::GenericDialect;
pub use postgres::PostgresDialect;

/// Dialect-specific behavior for the compiler.
pub trait Dialect: Send + Sync {
    /// Returns the name of the dialect.
    fn name(&self) -> &'static str;

    /// Placeholder for the bind at 1-based position `index`.
    fn bind_placeholder(&self, index: usize) -> String {
        let _ = index;
        "?".to_string()
    }

    /// Returns the identifier quote character.
    fn identifier_quote(&self) -> char {
        '"'
    }

    /// Quotes an identifier, doubling embedded quote characters.
    fn quote_identifier(&self, name: &str) -> String {
        let quote = self.identifier_quote();
        let mut out = String::with_capacity(name.len() + 2);
        out.push(quote);
        for c in name.chars() {
            if c == quote {
                out.push(quote);
            }
            out.push(c);
        }
        out.push(quote);
        out
    }

    fn quote_table_name(&self, name: &str) -> String {
        self.quote_identifier(name)
    }

    fn quote_column_name(&self, name: &str) -> String {
        self.quote_identifier(name)
    }

    /// Renders an already-serialized value as an inline SQL literal.
    fn quote(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(true) => "TRUE".to_string(),
            Value::Bool(false) => "FALSE".to_string(),
            Value::Integer(n) => n.to_string(),
            Value::Float(f) if f.is_finite() => f.to_string(),
            Value::Array(items) => quote_string(&encode_array(items, ',')),
            other => quote_string(&other.to_text().unwrap_or_default()),
        }
    }

    /// Renders `node`. Dialects match the kinds they override and hand
    /// everything else to the base rules.
    fn visit(&self, visitor: &mut Visitor<'_>, node: &Node) -> Result<()> {
        visitor.visit_default(node)
    }
}

/// Single-quoted string literal with embedded quotes doubled.
pub fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Dialect selection, made once when a compiler is constructed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    /// ANSI rendering with `?` placeholders.
    Generic,
    /// PostgreSQL with `$n` placeholders.
    #[default]
    #[serde(alias = "postgresql")]
    #[value(alias = "postgresql")]
    Postgres,
}

impl DialectKind {
    pub fn dialect(self) -> Box<dyn Dialect> {
        match self {
            DialectKind::Generic => Box::new(GenericDialect),
            DialectKind::Postgres => Box::new(PostgresDialect),
        }
    }
}
