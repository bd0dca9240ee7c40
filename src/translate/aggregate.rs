//! Aggregations: `moviesAggregate` at the root and `actorsAggregate` on a
//! node.

use serde_json::Value as Json;

use super::auth::{auth_allow, auth_where};
use super::read::match_source;
use super::where_clause::node_where;
use super::{Context, ResolveTree, as_object};
use crate::cypher::functions::{avg, collect, count, head, iso_datetime, last, max, min, size, sum};
use crate::cypher::{
    ApocMode, ApocRun, Call, Clause, Expr, Match, NodePattern, NodeRef, Order, Pattern, Projection, RelPattern,
    RelationshipRef, Variable, and, concat,
};
use crate::model::{AuthOperation, Field, FieldKind, Node, RelationField, ScalarType, TemporalType};
use crate::{Error, Result};

/// Statement tail aggregating `subject`, plus the map it returns.
///
/// Strings aggregate by length, numbers by value, everything else by
/// ordering only.
fn aggregate_template(field: &Field, subject: Expr) -> Result<(Vec<Clause>, Expr)> {
    let map = match &field.kind {
        FieldKind::Primitive { scalar: ScalarType::String | ScalarType::Id } => {
            let value = Variable::new();
            let list = Variable::new();
            let average = Variable::new();
            let clauses = vec![
                Clause::with(Projection::new().alias(subject, &value).order_by(size(Expr::from(&value)), Order::Desc)),
                Clause::with(
                    Projection::new().alias(collect(&value), &list).alias(avg(size(Expr::from(&value))), &average),
                ),
            ];
            let map = Expr::map([
                ("longest", head(Expr::from(&list))),
                ("shortest", last(Expr::from(&list))),
                ("averageLength", Expr::from(&average)),
            ]);
            return Ok((clauses, map));
        }
        FieldKind::Primitive { scalar } if scalar.is_numeric() => Expr::map([
            ("min", min(subject.clone())),
            ("max", max(subject.clone())),
            ("average", avg(subject.clone())),
            ("sum", sum(subject)),
        ]),
        FieldKind::Temporal { temporal: TemporalType::DateTime } => bounds(subject, iso_datetime),
        FieldKind::Primitive { .. } | FieldKind::Temporal { .. } => bounds(subject, |e| e),
        _ => return Err(Error::InvalidArgument(format!("{} cannot be aggregated", field.name))),
    };
    Ok((Vec::new(), map))
}

fn bounds(subject: Expr, format: fn(Expr) -> Expr) -> Expr {
    Expr::map([("min", format(min(subject.clone()))), ("max", format(max(subject)))])
}

/// One fresh `(parent)-[r:TYPE]->(child:Label)` traversal with its filter.
struct Traversal {
    pattern: Pattern,
    predicate: Option<Expr>,
    child: NodeRef,
    relationship: RelationshipRef,
}

fn traversal(
    ctx: &Context<'_>,
    parent: &Variable,
    rel: &RelationField,
    target: &Node,
    filter: Option<&Json>,
) -> Result<Traversal> {
    let child = NodeRef::new(target.labels());
    let relationship = RelationshipRef::new(rel.rel_type.as_str());
    let pattern = Pattern::new(NodePattern::var(parent)).related(
        RelPattern::new(&relationship, super::pattern_direction(rel.direction)),
        NodePattern::new(&child),
    );
    let filter = match filter {
        Some(filter) => node_where(ctx, target, &child.var, as_object(filter, "where")?)?,
        None => None,
    };
    let predicate = and([
        filter,
        auth_where(ctx, target, &child.var, AuthOperation::Read)?,
        auth_allow(ctx, target, &child.var, AuthOperation::Read)?,
    ]);
    Ok(Traversal { pattern, predicate, child, relationship })
}

/// `{ count, node: { ... }, edge: { ... } }` for a `<rel>Aggregate`
/// selection on the node bound to `parent`.
///
/// The count is an inline pattern comprehension; every per-property
/// aggregate runs its own statement through APOC.
pub(crate) fn field_aggregate(
    ctx: &Context<'_>,
    parent: &Variable,
    rel: &RelationField,
    tree: &ResolveTree,
) -> Result<Expr> {
    let target = ctx.schema.node(&rel.target)?;
    let props = rel.properties.as_deref().and_then(|p| ctx.schema.relationship(p));
    let filter = tree.arg("where");

    let mut entries = Vec::new();
    for selection in tree.children() {
        match selection.name.as_str() {
            "count" => {
                let t = traversal(ctx, parent, rel, target, filter)?;
                let counted = Expr::pattern_comprehension(t.pattern, t.predicate, Expr::from(&t.child));
                entries.push((selection.alias().to_string(), size(counted)));
            }
            side @ ("node" | "edge") => {
                let mut aggregates = Vec::new();
                for property in selection.children() {
                    if property.name == "__typename" {
                        continue;
                    }
                    let t = traversal(ctx, parent, rel, target, filter)?;
                    let (field, subject) = if side == "node" {
                        let field = target.field(&property.name);
                        (field, field.map(|f| t.child.property(f.db_name())))
                    } else {
                        let field = props.and_then(|p| p.field(&property.name));
                        (field, field.map(|f| t.relationship.property(f.db_name())))
                    };
                    let (Some(field), Some(subject)) = (field, subject) else {
                        return Err(Error::UnknownField { node: rel.target.clone(), field: property.name.clone() });
                    };

                    let (tail, map) = aggregate_template(field, subject)?;
                    let statement = concat(
                        std::iter::once(Some(Clause::from(Match::new(t.pattern).and_where(t.predicate))))
                            .chain(tail.into_iter().map(Some))
                            .chain([Some(Clause::ret(Projection::of([map])))]),
                    );
                    let run = ApocRun::new(ApocMode::Many, statement).import(parent);
                    aggregates.push((property.alias().to_string(), head(Expr::apoc(run))));
                }
                entries.push((selection.alias().to_string(), Expr::map(aggregates)));
            }
            "__typename" => {}
            other => {
                return Err(Error::UnknownField { node: format!("{}Aggregate", rel.target), field: other.to_string() });
            }
        }
    }
    Ok(Expr::map(entries))
}

/// ```text
/// CALL {
///   MATCH (this:Movie)
///   RETURN count(this) AS var0
/// }
/// CALL {
///   MATCH (this:Movie)
///   RETURN { min: min(this.year), ... } AS var1
/// }
/// RETURN { count: var0, year: var1 } AS this
/// ```
///
/// Every selection aggregates in its own subquery over the same filtered
/// match; the match is shared, so its parameters are bound once.
pub fn translate_root_aggregate(ctx: &Context<'_>, node: &Node, tree: &ResolveTree) -> Result<Clause> {
    let this = NodeRef::named("this", node.labels());
    let source = match_source(ctx, node, &this, tree, AuthOperation::Read)?;

    let mut calls = Vec::new();
    let mut entries = Vec::new();
    for selection in tree.children() {
        let alias = selection.alias().to_string();
        let result = Variable::new();
        let (tail, value) = match selection.name.as_str() {
            "__typename" => {
                entries.push((alias, Expr::string(format!("{}AggregateSelection", node.name))));
                continue;
            }
            "count" => (Vec::new(), count(&this.var)),
            name => {
                let field = node
                    .field(name)
                    .ok_or_else(|| Error::UnknownField { node: node.name.clone(), field: name.to_string() })?;
                aggregate_template(field, this.property(field.db_name()))?
            }
        };
        let body = concat(
            std::iter::once(Some(source.clone()))
                .chain(tail.into_iter().map(Some))
                .chain([Some(Clause::ret(Projection::new().alias(value, &result)))]),
        );
        calls.push(Some(Clause::from(Call::new(body))));
        entries.push((alias, Expr::from(&result)));
    }

    Ok(concat(calls.into_iter().chain([Some(Clause::ret(Projection::new().alias(Expr::map(entries), &this.var)))])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::model::{AuthContext, Direction, RelationshipProperties, Schema};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new()
            .with_node(Node::new("Movie").with_fields([
                Field::scalar("title", ScalarType::String),
                Field::scalar("year", ScalarType::Int),
                Field::temporal("released", TemporalType::DateTime),
                Field::relation(
                    "actors",
                    RelationField::new("ACTED_IN", Direction::Incoming, "Actor").with_properties("ActedIn"),
                ),
            ]))
            .with_node(Node::new("Actor").with_fields([Field::scalar("name", ScalarType::String)]))
            .with_relationship(RelationshipProperties::new(
                "ActedIn",
                vec![Field::scalar("screenTime", ScalarType::Int)],
            ))
    }

    fn render(tree: &ResolveTree) -> Result<crate::cypher::CypherResult> {
        let schema = schema();
        let auth = AuthContext::anonymous();
        let config = Config::default();
        super::super::translate(&Context::new(&schema, &auth, &config), tree)
    }

    #[test]
    fn test_root_count_and_string_aggregate() {
        let tree = ResolveTree::new("moviesAggregate")
            .with_fields("MovieAggregateSelection", [ResolveTree::new("count"), ResolveTree::new("title")]);
        assert_eq!(
            render(&tree).unwrap().cypher,
            "CALL {\n  MATCH (this:Movie)\n  RETURN count(this) AS var0\n}\nCALL {\n  MATCH (this:Movie)\n  WITH this.title AS var1\n  ORDER BY size(var1) DESC\n  WITH collect(var1) AS var2, avg(size(var1)) AS var3\n  RETURN { longest: head(var2), shortest: last(var2), averageLength: var3 } AS var4\n}\nRETURN { count: var0, title: var4 } AS this"
        );
    }

    #[test]
    fn test_root_aggregate_shares_filter_params() {
        let tree = ResolveTree::new("moviesAggregate")
            .with_arg("where", json!({ "year_GT": 2000 }))
            .with_fields(
                "MovieAggregateSelection",
                [ResolveTree::new("count"), ResolveTree::new("year"), ResolveTree::new("released")],
            );
        let result = render(&tree).unwrap();
        assert_eq!(result.cypher.matches("WHERE this.year > $param0").count(), 3);
        assert_eq!(result.params.len(), 1);
        assert!(result.cypher.contains("RETURN { min: min(this.year), max: max(this.year), average: avg(this.year), sum: sum(this.year) } AS var1"));
        assert!(result.cypher.contains("min: apoc.date.convertFormat(toString(min(this.released))"));
    }

    #[test]
    fn test_field_count_is_inline() {
        let tree = ResolveTree::new("movies").with_fields(
            "Movie",
            [ResolveTree::new("actorsAggregate")
                .with_arg("where", json!({ "name_STARTS_WITH": "K" }))
                .with_fields("MovieActorActorsAggregationSelection", [ResolveTree::new("count")])],
        );
        assert_eq!(
            render(&tree).unwrap().cypher,
            "MATCH (this:Movie)\nRETURN this { actorsAggregate: { count: size([(this)<-[this0:ACTED_IN]-(this1:Actor) WHERE this1.name STARTS WITH $param0 | this1]) } } AS this"
        );
    }

    #[test]
    fn test_field_node_and_edge_aggregates_run_through_apoc() {
        let tree = ResolveTree::new("movies").with_fields(
            "Movie",
            [ResolveTree::new("actorsAggregate").with_fields(
                "MovieActorActorsAggregationSelection",
                [
                    ResolveTree::new("node")
                        .with_fields("MovieActorActorsNodeAggregateSelection", [ResolveTree::new("name")]),
                    ResolveTree::new("edge")
                        .with_fields("MovieActorActorsEdgeAggregateSelection", [ResolveTree::new("screenTime")]),
                ],
            )],
        );
        let cypher = render(&tree).unwrap().cypher;
        assert!(cypher.contains("node: { name: head(apoc.cypher.runFirstColumnMany(\"MATCH (this)<-[this0:ACTED_IN]-(this1:Actor)\nWITH this1.name AS var2"));
        assert!(cypher.contains("RETURN { min: min(this5.screenTime), max: max(this5.screenTime), average: avg(this5.screenTime), sum: sum(this5.screenTime) }\", { this: this }))"));
    }

    #[test]
    fn test_unknown_aggregate_field() {
        let tree = ResolveTree::new("moviesAggregate").with_fields("MovieAggregateSelection", [ResolveTree::new("rating")]);
        assert!(matches!(render(&tree), Err(Error::UnknownField { .. })));
    }
}
