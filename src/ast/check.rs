//! Round-trip syntax check of compiled SQL through `sqlparser`.
//!
//! Placeholders are part of the grammar in both dialects (`$1` for
//! PostgreSQL, `?` for the generic one), so compiled text can be checked
//! without substituting binds.
use anyhow::{anyhow, Result};
use sqlparser::dialect::{Dialect as ParserDialect, GenericDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;

use super::dialect::DialectKind;

fn parser_dialect(kind: DialectKind) -> Box<dyn ParserDialect> {
    match kind {
        DialectKind::Generic => Box::new(GenericDialect {}),
        DialectKind::Postgres => Box::new(PostgreSqlDialect {}),
    }
}

/// Parse `sql` as one or more statements.
pub fn check_sql(sql: &str, kind: DialectKind) -> Result<()> {
    let dialect = parser_dialect(kind);
    let statements = Parser::parse_sql(dialect.as_ref(), sql)
        .map_err(|e| anyhow!("SQL parse error: {}", e))?;
    if statements.is_empty() {
        return Err(anyhow!("SQL parse error: no statement found"));
    }
    Ok(())
}

/// Parse `sql` as a single expression, e.g. a compiled predicate.
pub fn check_expr(sql: &str, kind: DialectKind) -> Result<()> {
    let dialect = parser_dialect(kind);
    let mut parser = Parser::new(dialect.as_ref())
        .try_with_sql(sql)
        .map_err(|e| anyhow!("SQL parse error: {}", e))?;
    parser
        .parse_expr()
        .map_err(|e| anyhow!("SQL parse error: {}", e))?;
    parser
        .expect_token(&Token::EOF)
        .map_err(|e| anyhow!("SQL parse error: {}", e))?;
    Ok(())
}
