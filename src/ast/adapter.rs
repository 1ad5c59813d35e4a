/// JSON query documents → relational AST.
///
/// Trees normally come from a query builder linked into the same process.
/// For the command-line tool and for tests they can also be written as JSON,
/// one object per node with a `"node"` tag:
///
/// ```json
/// {
///   "node": "select",
///   "projections": [{ "node": "star" }],
///   "from": { "node": "table", "name": "users" },
///   "wheres": [{
///     "node": "homogeneous_in",
///     "attribute": { "table": "users", "name": "id", "type": "integer" },
///     "values": [1, 2, 3]
///   }]
/// }
/// ```
///
/// Column types are resolved through a [`TypeMap`], once per distinct type
/// name in a document.
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;

use super::types::*;
use crate::cast::{json_to_value, SharedCaster, TypeKind, TypeMap, Value};

#[derive(Debug, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
enum NodeDoc {
    Sql {
        sql: String,
    },
    Star,
    Attribute(AttributeDoc),
    Table {
        name: String,
        #[serde(default)]
        alias: Option<String>,
    },
    Quoted {
        value: serde_json::Value,
    },
    Casted {
        attribute: AttributeDoc,
        value: serde_json::Value,
    },
    Bind {
        attribute: AttributeDoc,
        value: serde_json::Value,
    },
    List {
        items: Vec<NodeDoc>,
    },
    Grouping {
        expr: Box<NodeDoc>,
    },
    Not {
        expr: Box<NodeDoc>,
    },
    TableAlias {
        relation: Box<NodeDoc>,
        name: String,
    },
    Equality(BinaryDoc),
    NotEqual(BinaryDoc),
    GreaterThan(BinaryDoc),
    GreaterThanOrEqual(BinaryDoc),
    LessThan(BinaryDoc),
    LessThanOrEqual(BinaryDoc),
    IsDistinctFrom(BinaryDoc),
    IsNotDistinctFrom(BinaryDoc),
    As(BinaryDoc),
    Or(BinaryDoc),
    In(BinaryDoc),
    NotIn(BinaryDoc),
    And {
        children: Vec<NodeDoc>,
    },
    Between {
        expr: Box<NodeDoc>,
        low: Box<NodeDoc>,
        high: Box<NodeDoc>,
    },
    Matches(MatchesDoc),
    DoesNotMatch(MatchesDoc),
    Regexp(RegexpDoc),
    NotRegexp(RegexpDoc),
    Ascending(UnaryDoc),
    Descending(UnaryDoc),
    NullsFirst(UnaryDoc),
    NullsLast(UnaryDoc),
    Distinct,
    DistinctOn(UnaryDoc),
    GroupingElement(UnaryDoc),
    Cube(UnaryDoc),
    RollUp(UnaryDoc),
    GroupingSet(UnaryDoc),
    Lateral(UnaryDoc),
    NamedFunction {
        name: String,
        #[serde(default)]
        args: Vec<NodeDoc>,
        #[serde(default)]
        distinct: bool,
        #[serde(default)]
        alias: Option<String>,
    },
    HomogeneousIn {
        attribute: AttributeDoc,
        values: Vec<serde_json::Value>,
        #[serde(default)]
        negated: bool,
    },
    Select(Box<SelectDoc>),
}

#[derive(Debug, Deserialize)]
struct AttributeDoc {
    #[serde(default)]
    table: Option<String>,
    name: String,
    #[serde(rename = "type")]
    sql_type: String,
}

#[derive(Debug, Deserialize)]
struct BinaryDoc {
    left: Box<NodeDoc>,
    right: Box<NodeDoc>,
}

#[derive(Debug, Deserialize)]
struct UnaryDoc {
    expr: Box<NodeDoc>,
}

fn default_case_sensitive() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct MatchesDoc {
    left: Box<NodeDoc>,
    right: Box<NodeDoc>,
    #[serde(default)]
    escape: Option<Box<NodeDoc>>,
    #[serde(default = "default_case_sensitive")]
    case_sensitive: bool,
}

#[derive(Debug, Deserialize)]
struct RegexpDoc {
    left: Box<NodeDoc>,
    right: Box<NodeDoc>,
    #[serde(default = "default_case_sensitive")]
    case_sensitive: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
enum JoinKindDoc {
    #[default]
    Inner,
    LeftOuter,
    Cross,
}

#[derive(Debug, Deserialize)]
struct JoinDoc {
    #[serde(default)]
    kind: JoinKindDoc,
    relation: NodeDoc,
    #[serde(default)]
    on: Option<NodeDoc>,
}

#[derive(Debug, Deserialize)]
struct SelectDoc {
    #[serde(default)]
    distinct: Option<NodeDoc>,
    #[serde(default)]
    projections: Vec<NodeDoc>,
    #[serde(default)]
    from: Option<NodeDoc>,
    #[serde(default)]
    joins: Vec<JoinDoc>,
    #[serde(default)]
    wheres: Vec<NodeDoc>,
    #[serde(default)]
    groups: Vec<NodeDoc>,
    #[serde(default)]
    havings: Vec<NodeDoc>,
    #[serde(default)]
    orders: Vec<NodeDoc>,
    #[serde(default)]
    limit: Option<NodeDoc>,
    #[serde(default)]
    offset: Option<NodeDoc>,
}

/// Reads JSON query documents into [`Node`] trees.
pub struct JsonAdapter {
    types: TypeMap,
}

impl Default for JsonAdapter {
    fn default() -> Self {
        Self::new(TypeMap::postgres())
    }
}

impl JsonAdapter {
    pub fn new(types: TypeMap) -> Self {
        Self { types }
    }

    pub fn parse(&self, input: &str) -> Result<Node> {
        let doc: NodeDoc = serde_json::from_str(input).context("Invalid query document")?;
        let mut resolver = Resolver {
            types: &self.types,
            cache: HashMap::new(),
        };
        resolver.node(doc)
    }
}

struct Resolver<'a> {
    types: &'a TypeMap,
    cache: HashMap<String, SharedCaster>,
}

impl Resolver<'_> {
    fn caster(&mut self, sql_type: &str) -> Result<SharedCaster> {
        if let Some(caster) = self.cache.get(sql_type) {
            return Ok(Arc::clone(caster));
        }
        let caster = self
            .types
            .lookup(sql_type)
            .with_context(|| format!("Cannot resolve column type {:?}", sql_type))?;
        self.cache.insert(sql_type.to_string(), Arc::clone(&caster));
        Ok(caster)
    }

    fn attribute(&mut self, doc: AttributeDoc) -> Result<Attribute> {
        let caster = self
            .caster(&doc.sql_type)
            .with_context(|| format!("In attribute {:?}", doc.name))?;
        Ok(Attribute {
            table: doc.table,
            name: doc.name,
            caster,
        })
    }

    fn boxed(&mut self, doc: NodeDoc) -> Result<Box<Node>> {
        self.node(doc).map(Box::new)
    }

    fn nodes(&mut self, docs: Vec<NodeDoc>) -> Result<Vec<Node>> {
        docs.into_iter().map(|doc| self.node(doc)).collect()
    }

    fn optional(&mut self, doc: Option<NodeDoc>) -> Result<Option<Node>> {
        doc.map(|doc| self.node(doc)).transpose()
    }

    fn binary(&mut self, doc: BinaryDoc) -> Result<Binary> {
        Ok(Binary {
            left: self.boxed(*doc.left)?,
            right: self.boxed(*doc.right)?,
        })
    }

    fn unary(&mut self, doc: UnaryDoc) -> Result<Box<Node>> {
        self.boxed(*doc.expr)
    }

    fn matches(&mut self, doc: MatchesDoc) -> Result<Matches> {
        Ok(Matches {
            left: self.boxed(*doc.left)?,
            right: self.boxed(*doc.right)?,
            escape: doc.escape.map(|e| self.boxed(*e)).transpose()?,
            case_sensitive: doc.case_sensitive,
        })
    }

    fn regexp(&mut self, doc: RegexpDoc) -> Result<Regexp> {
        Ok(Regexp {
            left: self.boxed(*doc.left)?,
            right: self.boxed(*doc.right)?,
            case_sensitive: doc.case_sensitive,
        })
    }

    fn node(&mut self, doc: NodeDoc) -> Result<Node> {
        let node = match doc {
            NodeDoc::Sql { sql } => Node::SqlLiteral(sql),
            NodeDoc::Star => Node::Star,
            NodeDoc::Attribute(attr) => Node::Attribute(self.attribute(attr)?),
            NodeDoc::Table { name, alias } => Node::Table(Table { name, alias }),
            NodeDoc::Quoted { value } => Node::Quoted(json_to_value(&value)),
            NodeDoc::Casted { attribute, value } => {
                let attribute = self.attribute(attribute)?;
                let value = column_value(&attribute, &value);
                Node::Casted { value, attribute }
            }
            NodeDoc::Bind { attribute, value } => {
                let attribute = self.attribute(attribute)?;
                let value = column_value(&attribute, &value);
                attribute.bind(value)
            }
            NodeDoc::List { items } => Node::List(self.nodes(items)?),
            NodeDoc::Grouping { expr } => Node::Grouping(self.boxed(*expr)?),
            NodeDoc::Not { expr } => Node::Not(self.boxed(*expr)?),
            NodeDoc::TableAlias { relation, name } => Node::TableAlias {
                relation: self.boxed(*relation)?,
                name,
            },
            NodeDoc::Equality(b) => Node::Equality(self.binary(b)?),
            NodeDoc::NotEqual(b) => Node::NotEqual(self.binary(b)?),
            NodeDoc::GreaterThan(b) => Node::GreaterThan(self.binary(b)?),
            NodeDoc::GreaterThanOrEqual(b) => Node::GreaterThanOrEqual(self.binary(b)?),
            NodeDoc::LessThan(b) => Node::LessThan(self.binary(b)?),
            NodeDoc::LessThanOrEqual(b) => Node::LessThanOrEqual(self.binary(b)?),
            NodeDoc::IsDistinctFrom(b) => Node::IsDistinctFrom(self.binary(b)?),
            NodeDoc::IsNotDistinctFrom(b) => Node::IsNotDistinctFrom(self.binary(b)?),
            NodeDoc::As(b) => Node::As(self.binary(b)?),
            NodeDoc::Or(b) => Node::Or(self.binary(b)?),
            NodeDoc::In(b) => Node::In(self.binary(b)?),
            NodeDoc::NotIn(b) => Node::NotIn(self.binary(b)?),
            NodeDoc::And { children } => Node::And(self.nodes(children)?),
            NodeDoc::Between { expr, low, high } => Node::Between {
                expr: self.boxed(*expr)?,
                low: self.boxed(*low)?,
                high: self.boxed(*high)?,
            },
            NodeDoc::Matches(m) => Node::Matches(self.matches(m)?),
            NodeDoc::DoesNotMatch(m) => Node::DoesNotMatch(self.matches(m)?),
            NodeDoc::Regexp(r) => Node::Regexp(self.regexp(r)?),
            NodeDoc::NotRegexp(r) => Node::NotRegexp(self.regexp(r)?),
            NodeDoc::Ascending(u) => Node::Ascending(self.unary(u)?),
            NodeDoc::Descending(u) => Node::Descending(self.unary(u)?),
            NodeDoc::NullsFirst(u) => Node::NullsFirst(self.unary(u)?),
            NodeDoc::NullsLast(u) => Node::NullsLast(self.unary(u)?),
            NodeDoc::Distinct => Node::Distinct,
            NodeDoc::DistinctOn(u) => Node::DistinctOn(self.unary(u)?),
            NodeDoc::GroupingElement(u) => Node::GroupingElement(self.unary(u)?),
            NodeDoc::Cube(u) => Node::Cube(self.unary(u)?),
            NodeDoc::RollUp(u) => Node::RollUp(self.unary(u)?),
            NodeDoc::GroupingSet(u) => Node::GroupingSet(self.unary(u)?),
            NodeDoc::Lateral(u) => Node::Lateral(self.unary(u)?),
            NodeDoc::NamedFunction {
                name,
                args,
                distinct,
                alias,
            } => Node::NamedFunction(NamedFunction {
                name,
                args: self.nodes(args)?,
                distinct,
                alias,
            }),
            NodeDoc::HomogeneousIn {
                attribute,
                values,
                negated,
            } => {
                let attribute = self.attribute(attribute)?;
                let values = values.iter().map(|v| column_value(&attribute, v)).collect();
                let polarity = if negated {
                    Polarity::NotIn
                } else {
                    Polarity::In
                };
                Node::HomogeneousIn(HomogeneousIn::new(attribute, values, polarity))
            }
            NodeDoc::Select(select) => Node::select(self.select(*select)?),
        };
        Ok(node)
    }

    fn select(&mut self, doc: SelectDoc) -> Result<SelectStatement> {
        let joins = doc
            .joins
            .into_iter()
            .map(|join| {
                Ok(Join {
                    kind: match join.kind {
                        JoinKindDoc::Inner => JoinKind::Inner,
                        JoinKindDoc::LeftOuter => JoinKind::LeftOuter,
                        JoinKindDoc::Cross => JoinKind::Cross,
                    },
                    relation: self.node(join.relation)?,
                    on: self.optional(join.on)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(SelectStatement {
            distinct: self.optional(doc.distinct)?,
            projections: self.nodes(doc.projections)?,
            source: self.optional(doc.from)?,
            joins,
            wheres: self.nodes(doc.wheres)?,
            groups: self.nodes(doc.groups)?,
            havings: self.nodes(doc.havings)?,
            orders: self.nodes(doc.orders)?,
            limit: self.optional(doc.limit)?,
            offset: self.optional(doc.offset)?,
        })
    }
}

/// JSON values for `json`/`jsonb` columns stay documents; everything else
/// maps to the closest scalar.
fn column_value(attribute: &Attribute, value: &serde_json::Value) -> Value {
    if attribute.caster.kind() == TypeKind::Json && !value.is_null() {
        Value::Json(value.clone())
    } else {
        json_to_value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::compiler::Compiler;
    use crate::ast::dialect::{GenericDialect, PostgresDialect};

    fn parse(input: &str) -> Node {
        JsonAdapter::default().parse(input).unwrap()
    }

    fn pg_sql(node: &Node) -> String {
        Compiler::new(Box::new(PostgresDialect)).compile(node).unwrap().sql
    }

    #[test]
    fn test_parse_select_document() {
        let node = parse(
            r#"{
                "node": "select",
                "projections": [{ "node": "star" }],
                "from": { "node": "table", "name": "users" },
                "wheres": [{
                    "node": "homogeneous_in",
                    "attribute": { "table": "users", "name": "id", "type": "integer" },
                    "values": [1, 2, 3]
                }],
                "orders": [{
                    "node": "nulls_last",
                    "expr": {
                        "node": "descending",
                        "expr": { "node": "attribute", "name": "created_at", "type": "timestamp" }
                    }
                }],
                "limit": { "node": "quoted", "value": 10 }
            }"#,
        );
        assert_eq!(
            pg_sql(&node),
            "SELECT * FROM \"users\" WHERE \"users\".\"id\" = any($1) \
             ORDER BY \"created_at\" DESC NULLS LAST LIMIT 10"
        );
    }

    #[test]
    fn test_parse_matches_defaults_case_sensitive() {
        let node = parse(
            r#"{
                "node": "matches",
                "left": { "node": "attribute", "name": "name", "type": "text" },
                "right": { "node": "quoted", "value": "a%" }
            }"#,
        );
        assert_eq!(pg_sql(&node), "\"name\" LIKE 'a%'");
    }

    #[test]
    fn test_parse_case_insensitive_with_escape() {
        let node = parse(
            r#"{
                "node": "does_not_match",
                "left": { "node": "attribute", "name": "name", "type": "text" },
                "right": { "node": "bind", "attribute": { "name": "name", "type": "text" }, "value": "a!%" },
                "escape": { "node": "quoted", "value": "!" },
                "case_sensitive": false
            }"#,
        );
        assert_eq!(pg_sql(&node), "\"name\" NOT ILIKE $1 ESCAPE '!'");
    }

    #[test]
    fn test_parse_grouping_sets() {
        let node = parse(
            r#"{
                "node": "cube",
                "expr": { "node": "list", "items": [
                    { "node": "sql", "sql": "a" },
                    { "node": "sql", "sql": "b" }
                ]}
            }"#,
        );
        assert_eq!(pg_sql(&node), "CUBE( a, b )");
    }

    #[test]
    fn test_parse_join() {
        let node = parse(
            r#"{
                "node": "select",
                "projections": [{ "node": "star" }],
                "from": { "node": "table", "name": "users", "alias": "u" },
                "joins": [{
                    "kind": "left_outer",
                    "relation": { "node": "table", "name": "posts" },
                    "on": {
                        "node": "equality",
                        "left": { "node": "sql", "sql": "posts.user_id" },
                        "right": { "node": "sql", "sql": "u.id" }
                    }
                }]
            }"#,
        );
        assert_eq!(
            pg_sql(&node),
            "SELECT * FROM \"users\" \"u\" LEFT OUTER JOIN \"posts\" ON posts.user_id = u.id"
        );
    }

    #[test]
    fn test_parse_jsonb_values_stay_documents() {
        let node = parse(
            r#"{
                "node": "homogeneous_in",
                "attribute": { "name": "doc", "type": "jsonb" },
                "values": [[1, 2], {"a": 1}]
            }"#,
        );
        match &node {
            Node::HomogeneousIn(h) => {
                assert_eq!(h.values[0], Value::Json(serde_json::json!([1, 2])));
                assert_eq!(h.values[1], Value::Json(serde_json::json!({"a": 1})));
            }
            other => panic!("unexpected node {:?}", other),
        }
        assert_eq!(pg_sql(&node), "\"doc\" IN ($1, $2)");
    }

    #[test]
    fn test_parse_negated_homogeneous_in_generic() {
        let node = parse(
            r#"{
                "node": "homogeneous_in",
                "attribute": { "name": "id", "type": "bigint" },
                "values": [1, 2],
                "negated": true
            }"#,
        );
        let compiled = Compiler::new(Box::new(GenericDialect)).compile(&node).unwrap();
        assert_eq!(compiled.sql, "\"id\" NOT IN (?, ?)");
    }

    #[test]
    fn test_parse_array_column_type() {
        let node = parse(
            r#"{
                "node": "bind",
                "attribute": { "name": "tags", "type": "text[]" },
                "value": ["a", "b"]
            }"#,
        );
        let compiled = Compiler::new(Box::new(PostgresDialect)).compile(&node).unwrap();
        assert_eq!(compiled.sql, "$1");
        assert_eq!(compiled.values().unwrap(), vec![Value::Text("{a,b}".into())]);
    }

    #[test]
    fn test_unknown_type_is_reported() {
        let err = JsonAdapter::default()
            .parse(r#"{ "node": "attribute", "name": "x", "type": "geometry" }"#)
            .unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("geometry"));
        assert!(message.contains("\"x\""));
    }

    #[test]
    fn test_malformed_document_is_reported() {
        assert!(JsonAdapter::default().parse("{ \"node\": \"nope\" }").is_err());
        assert!(JsonAdapter::default().parse("not json").is_err());
    }
}
