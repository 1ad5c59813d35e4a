//! PostgreSQL dialect.
//!
//! Adds the PostgreSQL-only syntax on top of the base rules: `ILIKE`, POSIX
//! regex operators, `DISTINCT ON`, grouping sets, `LATERAL` and native
//! `IS [NOT] DISTINCT FROM`. Membership tests over a homogeneous list compile
//! to a single typed-array bind so the statement text does not depend on the
//! number of candidates.
use std::sync::Arc;

use tracing::trace;

use super::Dialect;
use crate::ast::collector::Bind;
use crate::ast::compiler::Visitor;
use crate::ast::types::{HomogeneousIn, Node, Polarity};
use crate::cast::{ArrayCaster, TypeKind, Value};
use crate::error::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgresql"
    }

    fn bind_placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    fn visit(&self, v: &mut Visitor<'_>, node: &Node) -> Result<()> {
        match node {
            Node::Matches(m) => {
                let op = if m.case_sensitive { " LIKE " } else { " ILIKE " };
                v.visit_pattern(m, op)
            }
            Node::DoesNotMatch(m) => {
                let op = if m.case_sensitive {
                    " NOT LIKE "
                } else {
                    " NOT ILIKE "
                };
                v.visit_pattern(m, op)
            }
            Node::Regexp(r) => {
                let op = if r.case_sensitive { " ~ " } else { " ~* " };
                v.visit_infix(&r.left, op, &r.right)
            }
            Node::NotRegexp(r) => {
                let op = if r.case_sensitive { " !~ " } else { " !~* " };
                v.visit_infix(&r.left, op, &r.right)
            }
            Node::DistinctOn(expr) => {
                v.push("DISTINCT ON ( ");
                v.visit(expr)?;
                v.push(" )");
                Ok(())
            }
            Node::GroupingElement(expr) => {
                v.push("( ");
                v.visit(expr)?;
                v.push(" )");
                Ok(())
            }
            Node::Cube(expr) => {
                v.push("CUBE");
                grouping_array_or_grouping_element(v, expr)
            }
            Node::RollUp(expr) => {
                v.push("ROLLUP");
                grouping_array_or_grouping_element(v, expr)
            }
            Node::GroupingSet(expr) => {
                v.push("GROUPING SETS");
                grouping_array_or_grouping_element(v, expr)
            }
            Node::Lateral(expr) => {
                v.push("LATERAL ");
                grouping_parentheses(v, expr)
            }
            Node::IsDistinctFrom(b) => v.visit_infix(&b.left, " IS DISTINCT FROM ", &b.right),
            Node::IsNotDistinctFrom(b) => {
                v.visit_infix(&b.left, " IS NOT DISTINCT FROM ", &b.right)
            }
            Node::NullsFirst(expr) => {
                v.visit(expr)?;
                v.push(" NULLS FIRST");
                Ok(())
            }
            Node::NullsLast(expr) => {
                v.visit(expr)?;
                v.push(" NULLS LAST");
                Ok(())
            }
            Node::HomogeneousIn(node) => visit_homogeneous_in(v, node),
            _ => v.visit_default(node),
        }
    }
}

/// Subqueries get wrapped in parentheses; anything else renders as is.
fn grouping_parentheses(v: &mut Visitor<'_>, expr: &Node) -> Result<()> {
    if let Node::SelectStatement(_) = expr {
        v.push("(");
        v.visit(expr)?;
        v.push(")");
        Ok(())
    } else {
        v.visit(expr)
    }
}

/// A list becomes `( a, b )`; a single expression follows the keyword
/// directly and is expected to supply its own parentheses.
fn grouping_array_or_grouping_element(v: &mut Visitor<'_>, expr: &Node) -> Result<()> {
    if let Node::List(_) = expr {
        v.push("( ");
        v.visit(expr)?;
        v.push(" )");
        Ok(())
    } else {
        v.visit(expr)
    }
}

/// `attr = any($n)` / `attr != all($n)` with one array bind.
///
/// Binary and JSON columns have no usable array literal form here and keep
/// the per-value rendering.
fn visit_homogeneous_in(v: &mut Visitor<'_>, node: &HomogeneousIn) -> Result<()> {
    let caster = &node.attribute.caster;
    if matches!(caster.kind(), TypeKind::Binary | TypeKind::Json) {
        trace!(
            column = %node.attribute.name,
            sql_type = caster.sql_type(),
            "per-value IN list"
        );
        return v.visit_default(&Node::HomogeneousIn(node.clone()));
    }

    v.visit(&node.attribute.node())?;
    v.push(match node.polarity {
        Polarity::In => " = any(",
        Polarity::NotIn => " != all(",
    });

    // The bind carries the raw candidates; its caster serializes and encodes
    // them once, when the value is handed to the database.
    let array = ArrayCaster::new(Arc::clone(caster), ',');
    let candidates = Value::Array(node.candidates()?);
    v.add_bind(Bind::new(
        node.attribute.name.clone(),
        candidates,
        Arc::new(array),
    ))?;
    v.push(")");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::compiler::Compiler;
    use crate::ast::types::*;
    use crate::cast::{ByteaCaster, IntegerCaster, JsonbCaster, TextCaster, TimestampCaster};
    use crate::error::CompileError;
    use chrono::NaiveDate;

    fn pg() -> Compiler {
        Compiler::new(Box::new(PostgresDialect))
    }

    fn id() -> Attribute {
        Attribute::new("id", Arc::new(IntegerCaster::new(4)))
    }

    fn name() -> Attribute {
        Attribute::new("name", Arc::new(TextCaster))
    }

    fn sql(node: &Node) -> String {
        pg().compile(node).unwrap().sql
    }

    fn pattern(case_sensitive: bool) -> Matches {
        Matches::new(name().node(), Node::Quoted("a%".into()), case_sensitive)
    }

    #[test]
    fn test_placeholders_are_numbered() {
        assert_eq!(PostgresDialect.bind_placeholder(1), "$1");
        assert_eq!(PostgresDialect.bind_placeholder(12), "$12");
        let node = Node::And(vec![id().equals(1), name().equals("x"), id().equals(2)]);
        let compiled = pg().compile(&node).unwrap();
        assert_eq!(compiled.sql, "\"id\" = $1 AND \"name\" = $2 AND \"id\" = $3");
        assert_eq!(
            compiled.values().unwrap(),
            vec![Value::Integer(1), Value::Text("x".into()), Value::Integer(2)]
        );
    }

    #[test]
    fn test_matches_operators() {
        assert_eq!(sql(&Node::Matches(pattern(true))), "\"name\" LIKE 'a%'");
        assert_eq!(sql(&Node::Matches(pattern(false))), "\"name\" ILIKE 'a%'");
        assert_eq!(
            sql(&Node::DoesNotMatch(pattern(true))),
            "\"name\" NOT LIKE 'a%'"
        );
        assert_eq!(
            sql(&Node::DoesNotMatch(pattern(false))),
            "\"name\" NOT ILIKE 'a%'"
        );
    }

    #[test]
    fn test_matches_escape() {
        let node = Node::Matches(pattern(false).with_escape(Node::Quoted("\\".into())));
        assert_eq!(sql(&node), "\"name\" ILIKE 'a%' ESCAPE '\\'");
        let node = Node::DoesNotMatch(pattern(true).with_escape(Node::Quoted("!".into())));
        assert_eq!(sql(&node), "\"name\" NOT LIKE 'a%' ESCAPE '!'");
    }

    #[test]
    fn test_matches_with_bind() {
        let compiled = pg().compile(&name().matches("%bob%", false)).unwrap();
        assert_eq!(compiled.sql, "\"name\" ILIKE $1");
        assert_eq!(compiled.binds.len(), 1);
    }

    #[test]
    fn test_regexp_operators() {
        let re = |cs| Regexp::new(name().node(), Node::Quoted("^a".into()), cs);
        assert_eq!(sql(&Node::Regexp(re(true))), "\"name\" ~ '^a'");
        assert_eq!(sql(&Node::Regexp(re(false))), "\"name\" ~* '^a'");
        assert_eq!(sql(&Node::NotRegexp(re(true))), "\"name\" !~ '^a'");
        assert_eq!(sql(&Node::NotRegexp(re(false))), "\"name\" !~* '^a'");
    }

    #[test]
    fn test_distinct_on() {
        let node = Node::DistinctOn(Box::new(name().node()));
        assert_eq!(sql(&node), "DISTINCT ON ( \"name\" )");

        let select = SelectStatement {
            distinct: Some(node),
            projections: vec![Node::Star],
            source: Some(Node::Table(Table::new("users"))),
            ..Default::default()
        };
        assert_eq!(
            sql(&Node::select(select)),
            "SELECT DISTINCT ON ( \"name\" ) * FROM \"users\""
        );
    }

    #[test]
    fn test_grouping_element() {
        let node = Node::GroupingElement(Box::new(Node::List(vec![id().node(), name().node()])));
        assert_eq!(sql(&node), "( \"id\", \"name\" )");
    }

    #[test]
    fn test_cube_rollup_grouping_sets_with_list() {
        let list = || Box::new(Node::List(vec![id().node(), name().node()]));
        assert_eq!(sql(&Node::Cube(list())), "CUBE( \"id\", \"name\" )");
        assert_eq!(sql(&Node::RollUp(list())), "ROLLUP( \"id\", \"name\" )");
        assert_eq!(
            sql(&Node::GroupingSet(list())),
            "GROUPING SETS( \"id\", \"name\" )"
        );
    }

    #[test]
    fn test_cube_with_single_expression() {
        let node = Node::Cube(Box::new(Node::GroupingElement(Box::new(id().node()))));
        assert_eq!(sql(&node), "CUBE( \"id\" )");
        let node = Node::RollUp(Box::new(Node::sql("(a)")));
        assert_eq!(sql(&node), "ROLLUP(a)");
    }

    #[test]
    fn test_grouping_sets_of_elements() {
        let node = Node::GroupingSet(Box::new(Node::List(vec![
            Node::GroupingElement(Box::new(id().node())),
            Node::GroupingElement(Box::new(name().node())),
        ])));
        assert_eq!(
            sql(&node),
            "GROUPING SETS( ( \"id\" ), ( \"name\" ) )"
        );
    }

    #[test]
    fn test_lateral() {
        let sub = SelectStatement {
            projections: vec![Node::Star],
            source: Some(Node::Table(Table::new("posts"))),
            ..Default::default()
        };
        assert_eq!(
            sql(&Node::Lateral(Box::new(Node::select(sub)))),
            "LATERAL (SELECT * FROM \"posts\")"
        );
        let function = NamedFunction::new("generate_series", vec![Node::sql("1"), Node::sql("3")]);
        assert_eq!(
            sql(&Node::Lateral(Box::new(Node::NamedFunction(function)))),
            "LATERAL generate_series(1, 3)"
        );
    }

    #[test]
    fn test_native_distinct_from() {
        let node = Node::IsDistinctFrom(Binary::new(name().node(), Node::Quoted(Value::Null)));
        assert_eq!(sql(&node), "\"name\" IS DISTINCT FROM NULL");
        let node = Node::IsNotDistinctFrom(Binary::new(name().node(), name().bind("x")));
        assert_eq!(sql(&node), "\"name\" IS NOT DISTINCT FROM $1");
    }

    #[test]
    fn test_nulls_ordering() {
        assert_eq!(sql(&id().desc().nulls_first()), "\"id\" DESC NULLS FIRST");
        assert_eq!(sql(&id().asc().nulls_last()), "\"id\" ASC NULLS LAST");
    }

    #[test]
    fn test_homogeneous_in_uses_any() {
        let node = id().in_values(vec![1.into(), 2.into(), 3.into()]);
        let compiled = pg().compile(&node).unwrap();
        assert_eq!(compiled.sql, "\"id\" = any($1)");
        assert_eq!(compiled.binds.len(), 1);
        assert_eq!(compiled.binds[0].name, "id");
        assert_eq!(compiled.binds[0].caster.sql_type(), "integer[]");
        assert_eq!(compiled.values().unwrap(), vec![Value::Text("{1,2,3}".into())]);
        assert!(compiled.preparable);
    }

    #[test]
    fn test_homogeneous_not_in_uses_all() {
        let node = id().not_in_values(vec![4.into(), 5.into()]);
        let compiled = pg().compile(&node).unwrap();
        assert_eq!(compiled.sql, "\"id\" != all($1)");
        assert_eq!(compiled.values().unwrap(), vec![Value::Text("{4,5}".into())]);
    }

    #[test]
    fn test_homogeneous_in_statement_shape_is_stable() {
        let one = pg().compile(&id().in_values(vec![1.into()])).unwrap();
        let many = pg()
            .compile(&id().in_values((1..50).map(Value::from).collect()))
            .unwrap();
        assert_eq!(one.sql, many.sql);
    }

    #[test]
    fn test_homogeneous_in_empty_and_nulls() {
        let compiled = pg().compile(&id().in_values(vec![])).unwrap();
        assert_eq!(compiled.sql, "\"id\" = any($1)");
        assert_eq!(compiled.values().unwrap(), vec![Value::Text("{}".into())]);

        let compiled = pg()
            .compile(&id().in_values(vec![Value::Null, 7.into()]))
            .unwrap();
        assert_eq!(compiled.values().unwrap(), vec![Value::Text("{7}".into())]);
    }

    #[test]
    fn test_homogeneous_in_drops_out_of_range() {
        let small = Attribute::new("n", Arc::new(IntegerCaster::new(2)));
        let compiled = pg()
            .compile(&small.in_values(vec![1.into(), Value::Integer(1 << 40)]))
            .unwrap();
        assert_eq!(compiled.values().unwrap(), vec![Value::Text("{1}".into())]);
    }

    #[test]
    fn test_homogeneous_in_text_quoting() {
        let compiled = pg()
            .compile(&name().in_values(vec!["a b".into(), "c".into()]))
            .unwrap();
        assert_eq!(compiled.values().unwrap(), vec![Value::Text("{\"a b\",c}".into())]);
    }

    #[test]
    fn test_homogeneous_in_timestamps() {
        let at = Attribute::new("created_at", Arc::new(TimestampCaster));
        let ts = NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(3, 4, 5)
            .unwrap();
        let compiled = pg().compile(&at.in_values(vec![ts.into()])).unwrap();
        assert_eq!(compiled.sql, "\"created_at\" = any($1)");
        assert_eq!(
            compiled.values().unwrap(),
            vec![Value::Text("{\"2024-01-02 03:04:05\"}".into())]
        );
    }

    #[test]
    fn test_homogeneous_in_invalid_value_errors() {
        let err = pg()
            .compile(&id().in_values(vec!["nope".into()]))
            .unwrap_err();
        assert!(matches!(err, CompileError::Cast(_)));
    }

    #[test]
    fn test_homogeneous_in_bind_numbering_follows_earlier_binds() {
        let node = Node::And(vec![
            name().equals("x"),
            id().in_values(vec![1.into(), 2.into()]),
            name().equals("y"),
        ]);
        assert_eq!(
            sql(&node),
            "\"name\" = $1 AND \"id\" = any($2) AND \"name\" = $3"
        );
    }

    #[test]
    fn test_bytea_and_jsonb_keep_per_value_binds() {
        let cases: Vec<(Attribute, Vec<Value>)> = vec![
            (
                Attribute::new("data", Arc::new(ByteaCaster)),
                vec![vec![1u8].into(), vec![2u8].into()],
            ),
            (
                Attribute::new("doc", Arc::new(JsonbCaster::jsonb())),
                vec![
                    Value::Json(serde_json::json!({"a": 1})),
                    Value::Json(serde_json::json!([2])),
                ],
            ),
        ];
        for (attr, values) in cases {
            let compiled = pg().compile(&attr.in_values(values.clone())).unwrap();
            let expected = format!("\"{}\" IN ($1, $2)", attr.name);
            assert_eq!(compiled.sql, expected);
            assert_eq!(compiled.binds.len(), 2);
            assert!(!compiled.preparable);

            let explicit = Node::In(Binary::new(
                attr.node(),
                Node::List(values.into_iter().map(|v| attr.bind(v)).collect()),
            ));
            let explicit = pg().compile(&explicit).unwrap();
            assert_eq!(explicit.sql, expected);
            assert_eq!(compiled.values().unwrap(), explicit.values().unwrap());
        }
    }

    #[test]
    fn test_jsonb_membership_binds_documents() {
        let doc = Attribute::new("doc", Arc::new(JsonbCaster::jsonb()));
        let node = doc.in_values(vec![Value::Json(serde_json::json!({"a": 1}))]);
        let compiled = pg().compile(&node).unwrap();
        assert_eq!(compiled.values().unwrap(), vec![Value::Text("{\"a\":1}".into())]);
        assert_eq!(
            pg().to_sql_substituted(&node).unwrap(),
            "\"doc\" IN ('{\"a\":1}')"
        );
    }

    #[test]
    fn test_typed_array_bind_serializes_once() {
        let node = id().in_values(vec!["1".into(), 2.into()]);
        let compiled = pg().compile(&node).unwrap();
        assert_eq!(
            compiled.binds[0].value,
            Value::Array(vec![Value::Text("1".into()), Value::Integer(2)])
        );
        assert_eq!(compiled.values().unwrap(), vec![Value::Text("{1,2}".into())]);
    }

    #[test]
    fn test_substituted_any() {
        let node = id().in_values(vec![1.into(), 2.into()]);
        assert_eq!(
            pg().to_sql_substituted(&node).unwrap(),
            "\"id\" = any('{1,2}')"
        );
    }

    #[test]
    fn test_unoverridden_nodes_match_base_rules() {
        let node = Node::And(vec![
            Node::Not(Box::new(id().equals(1).grouping())),
            Node::In(Binary::new(id().node(), Node::List(vec![]))),
        ]);
        assert_eq!(sql(&node), "NOT (\"id\" = $1) AND 1=0");
    }

    #[test]
    fn test_every_flag_combination() {
        for case_sensitive in [true, false] {
            for escape in [None, Some("!")] {
                let mut m = pattern(case_sensitive);
                if let Some(e) = escape {
                    m = m.with_escape(Node::Quoted(e.into()));
                }
                let like = sql(&Node::Matches(m.clone()));
                let not_like = sql(&Node::DoesNotMatch(m));
                let op = if case_sensitive { "LIKE" } else { "ILIKE" };
                assert!(like.contains(&format!(" {} ", op)));
                assert!(not_like.contains(&format!(" NOT {} ", op)));
                assert_eq!(like.contains(" ESCAPE "), escape.is_some());
                assert_eq!(not_like.contains(" ESCAPE "), escape.is_some());
            }
        }
    }

    #[test]
    fn test_output_is_deterministic() {
        let node = Node::And(vec![
            name().matches("a%", false),
            id().in_values(vec![1.into(), 2.into()]),
        ]);
        let compiler = pg();
        let first = compiler.compile(&node).unwrap();
        for _ in 0..5 {
            assert_eq!(compiler.compile(&node).unwrap(), first);
        }
    }
}
