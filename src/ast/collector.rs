//! Output accumulators threaded through one compile pass.
//!
//! A collector owns the SQL text buffer and, for [`BindCollector`], the
//! ordered bind list. Placeholder numbers are taken from the bind list length
//! at the moment of emission, so text and binds cannot drift apart.
use std::sync::Arc;

use serde::Serialize;

use super::dialect::Dialect;
use crate::cast::{CastError, SharedCaster, Value};
use crate::error::Result;

/// Default buffer capacity for compiled statements
const DEFAULT_BUFFER_CAPACITY: usize = 1024;

/// A value sent out of band, paired with the caster that serializes it.
#[derive(Debug, Clone)]
pub struct Bind {
    pub name: String,
    pub value: Value,
    pub caster: SharedCaster,
}

impl PartialEq for Bind {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.value == other.value
            && self.caster.sql_type() == other.caster.sql_type()
    }
}

impl Bind {
    pub fn new(name: impl Into<String>, value: Value, caster: SharedCaster) -> Self {
        Self {
            name: name.into(),
            value,
            caster,
        }
    }

    pub fn with_caster<C: crate::cast::TypeCaster + 'static>(
        name: impl Into<String>,
        value: Value,
        caster: C,
    ) -> Self {
        Self::new(name, value, Arc::new(caster))
    }

    /// The value as it will be sent to the database.
    pub fn value_for_database(&self) -> Result<Value, CastError> {
        self.caster.serialize(&self.value)
    }
}

/// Sink for compiled SQL text and binds.
pub trait Collector {
    fn push_str(&mut self, sql: &str);

    /// Register `bind` and emit its placeholder (or inline literal).
    fn add_bind(&mut self, bind: Bind, dialect: &dyn Dialect) -> Result<()>;

    /// Register several binds, emitting `, `-separated placeholders.
    fn add_binds(&mut self, binds: Vec<Bind>, dialect: &dyn Dialect) -> Result<()> {
        for (i, bind) in binds.into_iter().enumerate() {
            if i > 0 {
                self.push_str(", ");
            }
            self.add_bind(bind, dialect)?;
        }
        Ok(())
    }

    fn bind_count(&self) -> usize;

    /// Cleared when the statement shape depends on the data (e.g. one
    /// placeholder per list element), so it is not worth preparing.
    fn set_preparable(&mut self, preparable: bool);
}

/// Collects SQL with placeholders plus the ordered bind list.
#[derive(Debug)]
pub struct BindCollector {
    sql: String,
    binds: Vec<Bind>,
    preparable: bool,
}

impl BindCollector {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sql: String::with_capacity(capacity),
            binds: Vec::new(),
            preparable: true,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn binds(&self) -> &[Bind] {
        &self.binds
    }

    pub fn into_compiled(self) -> CompiledQuery {
        CompiledQuery {
            sql: self.sql,
            binds: self.binds,
            preparable: self.preparable,
        }
    }
}

impl Default for BindCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl Collector for BindCollector {
    fn push_str(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    fn add_bind(&mut self, bind: Bind, dialect: &dyn Dialect) -> Result<()> {
        self.binds.push(bind);
        let placeholder = dialect.bind_placeholder(self.binds.len());
        self.sql.push_str(&placeholder);
        Ok(())
    }

    fn bind_count(&self) -> usize {
        self.binds.len()
    }

    fn set_preparable(&mut self, preparable: bool) {
        self.preparable = preparable;
    }
}

/// Inlines every bind as a quoted literal. Meant for logs and EXPLAIN output,
/// never for execution.
#[derive(Debug, Default)]
pub struct SubstituteBinds {
    sql: String,
    binds: usize,
}

impl SubstituteBinds {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_sql(self) -> String {
        self.sql
    }
}

impl Collector for SubstituteBinds {
    fn push_str(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    fn add_bind(&mut self, bind: Bind, dialect: &dyn Dialect) -> Result<()> {
        let value = bind.value_for_database()?;
        self.sql.push_str(&dialect.quote(&value));
        self.binds += 1;
        Ok(())
    }

    fn bind_count(&self) -> usize {
        self.binds
    }

    fn set_preparable(&mut self, _preparable: bool) {}
}

/// Result of a compile: SQL text and the binds for its placeholders, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub binds: Vec<Bind>,
    pub preparable: bool,
}

/// One bind as reported to callers and the CLI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BoundValue {
    pub index: usize,
    pub name: String,
    pub sql_type: String,
    pub value: Value,
}

impl CompiledQuery {
    /// Database values for every bind, in placeholder order.
    pub fn values(&self) -> Result<Vec<Value>, CastError> {
        self.binds.iter().map(Bind::value_for_database).collect()
    }

    pub fn bound_values(&self) -> Result<Vec<BoundValue>, CastError> {
        self.binds
            .iter()
            .enumerate()
            .map(|(i, bind)| {
                Ok(BoundValue {
                    index: i + 1,
                    name: bind.name.clone(),
                    sql_type: bind.caster.sql_type().to_string(),
                    value: bind.value_for_database()?,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::dialect::{GenericDialect, PostgresDialect};
    use crate::cast::{IntegerCaster, TextCaster};

    fn int_bind(n: i64) -> Bind {
        Bind::with_caster("id", Value::Integer(n), IntegerCaster::new(4))
    }

    #[test]
    fn test_placeholders_follow_bind_count() {
        let mut collector = BindCollector::new();
        collector.push_str("a = ");
        collector.add_bind(int_bind(1), &PostgresDialect).unwrap();
        collector.push_str(" AND b IN (");
        collector
            .add_binds(vec![int_bind(2), int_bind(3)], &PostgresDialect)
            .unwrap();
        collector.push_str(")");
        assert_eq!(collector.sql(), "a = $1 AND b IN ($2, $3)");
        assert_eq!(collector.bind_count(), 3);
        let compiled = collector.into_compiled();
        assert!(compiled.preparable);
        assert_eq!(
            compiled.values().unwrap(),
            vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]
        );
    }

    #[test]
    fn test_generic_placeholders() {
        let mut collector = BindCollector::new();
        collector
            .add_binds(vec![int_bind(1), int_bind(2)], &GenericDialect)
            .unwrap();
        assert_eq!(collector.sql(), "?, ?");
    }

    #[test]
    fn test_substitute_binds_quotes_values() {
        let mut collector = SubstituteBinds::new();
        collector.push_str("name = ");
        collector
            .add_bind(
                Bind::with_caster("name", Value::Text("O'Brien".into()), TextCaster),
                &PostgresDialect,
            )
            .unwrap();
        assert_eq!(collector.bind_count(), 1);
        assert_eq!(collector.into_sql(), "name = 'O''Brien'");
    }

    #[test]
    fn test_substitute_binds_surfaces_cast_errors() {
        let mut collector = SubstituteBinds::new();
        let err = collector
            .add_bind(int_bind(1 << 40), &PostgresDialect)
            .unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }

    #[test]
    fn test_bound_values_report() {
        let mut collector = BindCollector::new();
        collector.add_bind(int_bind(7), &PostgresDialect).unwrap();
        let report = collector.into_compiled().bound_values().unwrap();
        assert_eq!(
            report,
            vec![BoundValue {
                index: 1,
                name: "id".into(),
                sql_type: "integer".into(),
                value: Value::Integer(7),
            }]
        );
        let json = serde_json::to_string(&report).unwrap();
        assert_eq!(
            json,
            r#"[{"index":1,"name":"id","sql_type":"integer","value":7}]"#
        );
    }
}
