//! Relational AST types for pgrel.
//!
//! This module defines the closed set of node kinds the compiler understands.
//! Trees are built upstream (query builders, the JSON adapter) and are only
//! borrowed during compilation; the compiler never mutates them.
//!
//! The enumeration is deliberately flat: every node kind is one variant, so
//! both the base rules and dialect overrides are plain exhaustive matches.
use std::sync::Arc;

use super::collector::Bind;
use crate::cast::{CastError, SharedCaster, Value};

/// A column together with the caster for its type.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub table: Option<String>,
    pub name: String,
    pub caster: SharedCaster,
}

impl PartialEq for Attribute {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table
            && self.name == other.name
            && self.caster.sql_type() == other.caster.sql_type()
    }
}

impl Attribute {
    pub fn new(name: impl Into<String>, caster: SharedCaster) -> Self {
        Self {
            table: None,
            name: name.into(),
            caster,
        }
    }

    pub fn qualified(table: impl Into<String>, name: impl Into<String>, caster: SharedCaster) -> Self {
        Self {
            table: Some(table.into()),
            name: name.into(),
            caster,
        }
    }

    pub fn node(&self) -> Node {
        Node::Attribute(self.clone())
    }

    /// A bind of `value` typed by this attribute's caster.
    pub fn bind(&self, value: impl Into<Value>) -> Node {
        Node::BindParam(Bind::new(
            self.name.clone(),
            value.into(),
            Arc::clone(&self.caster),
        ))
    }

    pub fn equals(&self, value: impl Into<Value>) -> Node {
        Node::Equality(Binary::new(self.node(), self.bind(value)))
    }

    pub fn matches(&self, pattern: impl Into<Value>, case_sensitive: bool) -> Node {
        Node::Matches(Matches::new(self.node(), self.bind(pattern), case_sensitive))
    }

    pub fn in_values(&self, values: Vec<Value>) -> Node {
        Node::HomogeneousIn(HomogeneousIn::new(self.clone(), values, Polarity::In))
    }

    pub fn not_in_values(&self, values: Vec<Value>) -> Node {
        Node::HomogeneousIn(HomogeneousIn::new(self.clone(), values, Polarity::NotIn))
    }

    pub fn asc(&self) -> Node {
        Node::Ascending(Box::new(self.node()))
    }

    pub fn desc(&self) -> Node {
        Node::Descending(Box::new(self.node()))
    }
}

/// Table reference in a FROM clause: `"name" "alias"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub alias: Option<String>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
        }
    }
}

/// Left and right operands of an infix node.
#[derive(Debug, Clone, PartialEq)]
pub struct Binary {
    pub left: Box<Node>,
    pub right: Box<Node>,
}

impl Binary {
    pub fn new(left: Node, right: Node) -> Self {
        Self {
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

/// `LIKE`-style pattern match.
#[derive(Debug, Clone, PartialEq)]
pub struct Matches {
    pub left: Box<Node>,
    pub right: Box<Node>,
    pub escape: Option<Box<Node>>,
    pub case_sensitive: bool,
}

impl Matches {
    pub fn new(left: Node, right: Node, case_sensitive: bool) -> Self {
        Self {
            left: Box::new(left),
            right: Box::new(right),
            escape: None,
            case_sensitive,
        }
    }

    pub fn with_escape(mut self, escape: Node) -> Self {
        self.escape = Some(Box::new(escape));
        self
    }
}

/// POSIX regular expression match.
#[derive(Debug, Clone, PartialEq)]
pub struct Regexp {
    pub left: Box<Node>,
    pub right: Box<Node>,
    pub case_sensitive: bool,
}

impl Regexp {
    pub fn new(left: Node, right: Node, case_sensitive: bool) -> Self {
        Self {
            left: Box::new(left),
            right: Box::new(right),
            case_sensitive,
        }
    }
}

/// Function call: `name(DISTINCT args) AS alias`.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedFunction {
    pub name: String,
    pub args: Vec<Node>,
    pub distinct: bool,
    pub alias: Option<String>,
}

impl NamedFunction {
    pub fn new(name: impl Into<String>, args: Vec<Node>) -> Self {
        Self {
            name: name.into(),
            args,
            distinct: false,
            alias: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Polarity {
    In,
    NotIn,
}

/// Membership test where every candidate shares the attribute's type.
#[derive(Debug, Clone, PartialEq)]
pub struct HomogeneousIn {
    pub attribute: Attribute,
    pub values: Vec<Value>,
    pub polarity: Polarity,
}

impl HomogeneousIn {
    pub fn new(attribute: Attribute, values: Vec<Value>, polarity: Polarity) -> Self {
        Self {
            attribute,
            values,
            polarity,
        }
    }

    /// Candidates that can match a stored value, as given.
    ///
    /// `NULL`s and values outside the type's range are dropped: neither can
    /// ever be equal to a stored value. Values the caster rejects outright
    /// are an error. The survivors are not serialized, so binds built from
    /// them go through their caster exactly once.
    pub fn candidates(&self) -> Result<Vec<Value>, CastError> {
        let caster = &self.attribute.caster;
        let mut kept = Vec::with_capacity(self.values.len());
        for raw in &self.values {
            if raw.is_null() || !caster.is_serializable(raw) {
                continue;
            }
            if !caster.serialize(raw)?.is_null() {
                kept.push(raw.clone());
            }
        }
        Ok(kept)
    }

    /// [`HomogeneousIn::candidates`] serialized by the attribute's caster.
    pub fn casted_values(&self) -> Result<Vec<Value>, CastError> {
        let caster = &self.attribute.caster;
        self.candidates()?
            .iter()
            .map(|value| caster.serialize(value))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
    Cross,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub relation: Node,
    pub on: Option<Node>,
}

/// A SELECT statement with the clauses the compiler renders.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectStatement {
    /// `Distinct` or `DistinctOn`.
    pub distinct: Option<Node>,
    pub projections: Vec<Node>,
    pub source: Option<Node>,
    pub joins: Vec<Join>,
    pub wheres: Vec<Node>,
    pub groups: Vec<Node>,
    pub havings: Vec<Node>,
    pub orders: Vec<Node>,
    pub limit: Option<Node>,
    pub offset: Option<Node>,
}

/// Every node kind the compiler can visit.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    // Leaves
    /// Raw SQL emitted verbatim.
    SqlLiteral(String),
    Star,
    Attribute(Attribute),
    Table(Table),
    /// Value quoted inline as a literal.
    Quoted(Value),
    /// Value serialized by an attribute's caster, then quoted inline.
    Casted { value: Value, attribute: Attribute },
    /// Value sent out of band behind a placeholder.
    BindParam(Bind),

    // Lists and wrappers
    List(Vec<Node>),
    Grouping(Box<Node>),
    Not(Box<Node>),
    TableAlias { relation: Box<Node>, name: String },

    // Infix
    Equality(Binary),
    NotEqual(Binary),
    GreaterThan(Binary),
    GreaterThanOrEqual(Binary),
    LessThan(Binary),
    LessThanOrEqual(Binary),
    IsDistinctFrom(Binary),
    IsNotDistinctFrom(Binary),
    As(Binary),
    Or(Binary),
    In(Binary),
    NotIn(Binary),
    And(Vec<Node>),
    Between {
        expr: Box<Node>,
        low: Box<Node>,
        high: Box<Node>,
    },

    // Pattern predicates
    Matches(Matches),
    DoesNotMatch(Matches),
    Regexp(Regexp),
    NotRegexp(Regexp),

    // Ordering
    Ascending(Box<Node>),
    Descending(Box<Node>),
    NullsFirst(Box<Node>),
    NullsLast(Box<Node>),

    // Grouping and aggregation
    Distinct,
    DistinctOn(Box<Node>),
    GroupingElement(Box<Node>),
    Cube(Box<Node>),
    RollUp(Box<Node>),
    GroupingSet(Box<Node>),
    Lateral(Box<Node>),

    NamedFunction(NamedFunction),
    HomogeneousIn(HomogeneousIn),
    SelectStatement(Box<SelectStatement>),
}

impl Node {
    /// Stable name of the node kind, used in errors and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Node::SqlLiteral(_) => "SqlLiteral",
            Node::Star => "Star",
            Node::Attribute(_) => "Attribute",
            Node::Table(_) => "Table",
            Node::Quoted(_) => "Quoted",
            Node::Casted { .. } => "Casted",
            Node::BindParam(_) => "BindParam",
            Node::List(_) => "List",
            Node::Grouping(_) => "Grouping",
            Node::Not(_) => "Not",
            Node::TableAlias { .. } => "TableAlias",
            Node::Equality(_) => "Equality",
            Node::NotEqual(_) => "NotEqual",
            Node::GreaterThan(_) => "GreaterThan",
            Node::GreaterThanOrEqual(_) => "GreaterThanOrEqual",
            Node::LessThan(_) => "LessThan",
            Node::LessThanOrEqual(_) => "LessThanOrEqual",
            Node::IsDistinctFrom(_) => "IsDistinctFrom",
            Node::IsNotDistinctFrom(_) => "IsNotDistinctFrom",
            Node::As(_) => "As",
            Node::Or(_) => "Or",
            Node::In(_) => "In",
            Node::NotIn(_) => "NotIn",
            Node::And(_) => "And",
            Node::Between { .. } => "Between",
            Node::Matches(_) => "Matches",
            Node::DoesNotMatch(_) => "DoesNotMatch",
            Node::Regexp(_) => "Regexp",
            Node::NotRegexp(_) => "NotRegexp",
            Node::Ascending(_) => "Ascending",
            Node::Descending(_) => "Descending",
            Node::NullsFirst(_) => "NullsFirst",
            Node::NullsLast(_) => "NullsLast",
            Node::Distinct => "Distinct",
            Node::DistinctOn(_) => "DistinctOn",
            Node::GroupingElement(_) => "GroupingElement",
            Node::Cube(_) => "Cube",
            Node::RollUp(_) => "RollUp",
            Node::GroupingSet(_) => "GroupingSet",
            Node::Lateral(_) => "Lateral",
            Node::NamedFunction(_) => "NamedFunction",
            Node::HomogeneousIn(_) => "HomogeneousIn",
            Node::SelectStatement(_) => "SelectStatement",
        }
    }

    /// True for literal `NULL` operands, which turn `=` into `IS NULL`.
    pub fn is_null(&self) -> bool {
        match self {
            Node::Quoted(value) | Node::Casted { value, .. } => value.is_null(),
            _ => false,
        }
    }

    pub fn sql(sql: impl Into<String>) -> Self {
        Node::SqlLiteral(sql.into())
    }

    pub fn grouping(self) -> Self {
        Node::Grouping(Box::new(self))
    }

    pub fn nulls_first(self) -> Self {
        Node::NullsFirst(Box::new(self))
    }

    pub fn nulls_last(self) -> Self {
        Node::NullsLast(Box::new(self))
    }

    pub fn select(statement: SelectStatement) -> Self {
        Node::SelectStatement(Box::new(statement))
    }
}
