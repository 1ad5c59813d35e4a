/// Relational AST → SQL compiler.
///
/// [`Compiler`] owns the selected dialect and is reusable across threads.
/// Each compile call creates its own collector and threads it through a
/// [`Visitor`], which dispatches every node to the dialect first. Dialects
/// override a handful of node kinds and delegate the rest to the base rules
/// in this module.
use std::sync::Arc;

use tracing::debug;

use super::collector::{Bind, BindCollector, Collector, CompiledQuery, SubstituteBinds};
use super::dialect::{Dialect, DialectKind};
use super::types::*;
use crate::cast::Value;
use crate::error::{CompileError, Result};

/// Compiles AST nodes with one fixed dialect.
pub struct Compiler {
    dialect: Box<dyn Dialect>,
}

impl Compiler {
    pub fn new(dialect: Box<dyn Dialect>) -> Self {
        Self { dialect }
    }

    pub fn for_kind(kind: DialectKind) -> Self {
        Self::new(kind.dialect())
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.dialect.as_ref()
    }

    /// Compile `node` into SQL with placeholders and the matching bind list.
    pub fn compile(&self, node: &Node) -> Result<CompiledQuery> {
        debug!(dialect = self.dialect.name(), node = node.kind(), "compiling");
        let compiled = self.compile_with(node, BindCollector::new())?.into_compiled();
        debug!(
            dialect = self.dialect.name(),
            binds = compiled.binds.len(),
            preparable = compiled.preparable,
            "compiled"
        );
        Ok(compiled)
    }

    /// Compile into a caller-supplied collector and hand it back.
    pub fn compile_with<C: Collector>(&self, node: &Node, mut collector: C) -> Result<C> {
        Visitor::new(self.dialect.as_ref(), &mut collector).visit(node)?;
        Ok(collector)
    }

    /// SQL with every bind inlined as a literal. For display only.
    pub fn to_sql_substituted(&self, node: &Node) -> Result<String> {
        Ok(self.compile_with(node, SubstituteBinds::new())?.into_sql())
    }
}

/// State of one compile pass: the dialect and the exclusively borrowed
/// collector.
pub struct Visitor<'a> {
    dialect: &'a dyn Dialect,
    collector: &'a mut dyn Collector,
}

impl<'a> Visitor<'a> {
    pub fn new(dialect: &'a dyn Dialect, collector: &'a mut dyn Collector) -> Self {
        Self { dialect, collector }
    }

    pub fn dialect(&self) -> &'a dyn Dialect {
        self.dialect
    }

    /// Render `node`, giving the dialect the first chance.
    pub fn visit(&mut self, node: &Node) -> Result<()> {
        let dialect = self.dialect;
        dialect.visit(self, node)
    }

    /// Render `node` with the base rules, skipping dialect overrides for this
    /// node only. Children still dispatch through [`Visitor::visit`].
    pub fn visit_default(&mut self, node: &Node) -> Result<()> {
        visit_base(self, node)
    }

    pub fn push(&mut self, sql: &str) {
        self.collector.push_str(sql);
    }

    pub fn add_bind(&mut self, bind: Bind) -> Result<()> {
        self.collector.add_bind(bind, self.dialect)
    }

    pub fn add_binds(&mut self, binds: Vec<Bind>) -> Result<()> {
        self.collector.add_binds(binds, self.dialect)
    }

    pub fn set_preparable(&mut self, preparable: bool) {
        self.collector.set_preparable(preparable);
    }

    /// `left op right`, with `op` carrying its own surrounding spaces.
    pub fn visit_infix(&mut self, left: &Node, op: &str, right: &Node) -> Result<()> {
        self.visit(left)?;
        self.push(op);
        self.visit(right)
    }

    /// Pattern match with an optional `ESCAPE` clause.
    pub fn visit_pattern(&mut self, node: &Matches, op: &str) -> Result<()> {
        self.visit_infix(&node.left, op, &node.right)?;
        if let Some(escape) = &node.escape {
            self.push(" ESCAPE ");
            self.visit(escape)?;
        }
        Ok(())
    }

    pub fn visit_joined(&mut self, nodes: &[Node], separator: &str) -> Result<()> {
        for (i, node) in nodes.iter().enumerate() {
            if i > 0 {
                self.push(separator);
            }
            self.visit(node)?;
        }
        Ok(())
    }

    pub fn unsupported(&self, node: &Node) -> CompileError {
        CompileError::Unsupported {
            node: node.kind(),
            dialect: self.dialect.name(),
        }
    }

    fn push_quoted(&mut self, value: &Value) {
        let literal = self.dialect.quote(value);
        self.push(&literal);
    }

    fn push_table_name(&mut self, name: &str) {
        let quoted = self.dialect.quote_table_name(name);
        self.push(&quoted);
    }

    fn push_column_name(&mut self, name: &str) {
        let quoted = self.dialect.quote_column_name(name);
        self.push(&quoted);
    }
}

fn visit_base(v: &mut Visitor<'_>, node: &Node) -> Result<()> {
    match node {
        Node::SqlLiteral(sql) => v.push(sql),
        Node::Star => v.push("*"),
        Node::Attribute(attr) => {
            if let Some(table) = &attr.table {
                v.push_table_name(table);
                v.push(".");
            }
            v.push_column_name(&attr.name);
        }
        Node::Table(table) => {
            v.push_table_name(&table.name);
            if let Some(alias) = &table.alias {
                v.push(" ");
                v.push_table_name(alias);
            }
        }
        Node::Quoted(value) => v.push_quoted(value),
        Node::Casted { value, attribute } => {
            let cast = attribute.caster.serialize(value)?;
            v.push_quoted(&cast);
        }
        Node::BindParam(bind) => v.add_bind(bind.clone())?,
        Node::List(items) => v.visit_joined(items, ", ")?,
        Node::Grouping(expr) => visit_parenthesized(v, expr)?,
        Node::Not(expr) => {
            v.push("NOT ");
            visit_parenthesized(v, expr)?;
        }
        Node::TableAlias { relation, name } => {
            v.visit(relation)?;
            v.push(" ");
            v.push_table_name(name);
        }
        Node::Equality(b) => visit_null_aware(v, b, " = ", " IS NULL")?,
        Node::NotEqual(b) => visit_null_aware(v, b, " != ", " IS NOT NULL")?,
        Node::GreaterThan(b) => v.visit_infix(&b.left, " > ", &b.right)?,
        Node::GreaterThanOrEqual(b) => v.visit_infix(&b.left, " >= ", &b.right)?,
        Node::LessThan(b) => v.visit_infix(&b.left, " < ", &b.right)?,
        Node::LessThanOrEqual(b) => v.visit_infix(&b.left, " <= ", &b.right)?,
        Node::IsDistinctFrom(b) => {
            if b.right.is_null() {
                v.visit(&b.left)?;
                v.push(" IS NOT NULL");
            } else {
                visit_distinct_case(v, b)?;
                v.push(" = 1");
            }
        }
        Node::IsNotDistinctFrom(b) => {
            if b.right.is_null() {
                v.visit(&b.left)?;
                v.push(" IS NULL");
            } else {
                visit_distinct_case(v, b)?;
                v.push(" = 0");
            }
        }
        Node::As(b) => v.visit_infix(&b.left, " AS ", &b.right)?,
        Node::Or(b) => v.visit_infix(&b.left, " OR ", &b.right)?,
        Node::In(b) => visit_in(v, b, " IN (", "1=0")?,
        Node::NotIn(b) => visit_in(v, b, " NOT IN (", "1=1")?,
        Node::And(children) => v.visit_joined(children, " AND ")?,
        Node::Between { expr, low, high } => {
            v.visit(expr)?;
            v.push(" BETWEEN ");
            v.visit_infix(low, " AND ", high)?;
        }
        // The base dialect has no case-insensitive LIKE; the flag is ignored.
        Node::Matches(m) => v.visit_pattern(m, " LIKE ")?,
        Node::DoesNotMatch(m) => v.visit_pattern(m, " NOT LIKE ")?,
        Node::Ascending(expr) => visit_suffixed(v, expr, " ASC")?,
        Node::Descending(expr) => visit_suffixed(v, expr, " DESC")?,
        Node::NullsFirst(expr) => visit_suffixed(v, expr, " NULLS FIRST")?,
        Node::NullsLast(expr) => visit_suffixed(v, expr, " NULLS LAST")?,
        Node::Distinct => v.push("DISTINCT"),
        Node::NamedFunction(function) => visit_function(v, function)?,
        Node::HomogeneousIn(node) => visit_homogeneous_in(v, node)?,
        Node::SelectStatement(statement) => visit_select(v, statement)?,
        Node::Regexp(_)
        | Node::NotRegexp(_)
        | Node::DistinctOn(_)
        | Node::GroupingElement(_)
        | Node::Cube(_)
        | Node::RollUp(_)
        | Node::GroupingSet(_)
        | Node::Lateral(_) => return Err(v.unsupported(node)),
    }
    Ok(())
}

/// `(expr)`, unless `expr` is a grouping that brings its own parentheses.
fn visit_parenthesized(v: &mut Visitor<'_>, expr: &Node) -> Result<()> {
    if let Node::Grouping(_) = expr {
        v.visit(expr)
    } else {
        v.push("(");
        v.visit(expr)?;
        v.push(")");
        Ok(())
    }
}

fn visit_suffixed(v: &mut Visitor<'_>, expr: &Node, suffix: &str) -> Result<()> {
    v.visit(expr)?;
    v.push(suffix);
    Ok(())
}

fn visit_null_aware(v: &mut Visitor<'_>, b: &Binary, op: &str, null_suffix: &str) -> Result<()> {
    if b.right.is_null() {
        v.visit(&b.left)?;
        v.push(null_suffix);
        Ok(())
    } else {
        v.visit_infix(&b.left, op, &b.right)
    }
}

/// Portable `IS [NOT] DISTINCT FROM`: evaluates to 0 when the operands are
/// equal or both NULL, 1 otherwise.
fn visit_distinct_case(v: &mut Visitor<'_>, b: &Binary) -> Result<()> {
    v.push("CASE WHEN ");
    v.visit_infix(&b.left, " = ", &b.right)?;
    v.push(" OR (");
    v.visit(&b.left)?;
    v.push(" IS NULL AND ");
    v.visit(&b.right)?;
    v.push(" IS NULL) THEN 0 ELSE 1 END");
    Ok(())
}

fn visit_in(v: &mut Visitor<'_>, b: &Binary, op: &str, when_empty: &str) -> Result<()> {
    if let Node::List(items) = b.right.as_ref() {
        if items.is_empty() {
            v.push(when_empty);
            return Ok(());
        }
        v.set_preparable(false);
    }
    v.visit(&b.left)?;
    v.push(op);
    v.visit(&b.right)?;
    v.push(")");
    Ok(())
}

/// One placeholder per candidate value.
fn visit_homogeneous_in(v: &mut Visitor<'_>, node: &HomogeneousIn) -> Result<()> {
    v.set_preparable(false);
    v.visit(&node.attribute.node())?;
    v.push(match node.polarity {
        Polarity::In => " IN (",
        Polarity::NotIn => " NOT IN (",
    });
    let values = node.candidates()?;
    if values.is_empty() {
        v.push_quoted(&Value::Null);
    } else {
        let binds = values
            .into_iter()
            .map(|value| {
                Bind::new(
                    node.attribute.name.clone(),
                    value,
                    Arc::clone(&node.attribute.caster),
                )
            })
            .collect();
        v.add_binds(binds)?;
    }
    v.push(")");
    Ok(())
}

fn visit_function(v: &mut Visitor<'_>, function: &NamedFunction) -> Result<()> {
    v.push(&function.name);
    v.push("(");
    if function.distinct {
        v.push("DISTINCT ");
    }
    v.visit_joined(&function.args, ", ")?;
    v.push(")");
    if let Some(alias) = &function.alias {
        v.push(" AS ");
        v.push_column_name(alias);
    }
    Ok(())
}

fn visit_select(v: &mut Visitor<'_>, select: &SelectStatement) -> Result<()> {
    v.push("SELECT");

    if let Some(distinct) = &select.distinct {
        v.push(" ");
        v.visit(distinct)?;
    }

    if !select.projections.is_empty() {
        v.push(" ");
        v.visit_joined(&select.projections, ", ")?;
    }

    if let Some(source) = &select.source {
        v.push(" FROM ");
        v.visit(source)?;
    }

    for join in &select.joins {
        v.push(match join.kind {
            JoinKind::Inner => " INNER JOIN ",
            JoinKind::LeftOuter => " LEFT OUTER JOIN ",
            JoinKind::Cross => " CROSS JOIN ",
        });
        v.visit(&join.relation)?;
        if let Some(on) = &join.on {
            v.push(" ON ");
            v.visit(on)?;
        }
    }

    if !select.wheres.is_empty() {
        v.push(" WHERE ");
        v.visit_joined(&select.wheres, " AND ")?;
    }

    if !select.groups.is_empty() {
        v.push(" GROUP BY ");
        v.visit_joined(&select.groups, ", ")?;
    }

    if !select.havings.is_empty() {
        v.push(" HAVING ");
        v.visit_joined(&select.havings, " AND ")?;
    }

    if !select.orders.is_empty() {
        v.push(" ORDER BY ");
        v.visit_joined(&select.orders, ", ")?;
    }

    if let Some(limit) = &select.limit {
        v.push(" LIMIT ");
        v.visit(limit)?;
    }

    if let Some(offset) = &select.offset {
        v.push(" OFFSET ");
        v.visit(offset)?;
    }

    Ok(())
}
