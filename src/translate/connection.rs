//! Relay-style connections: `moviesConnection` at the root and
//! `actorsConnection` on a node.
//!
//! Edges are collected and counted before any sorting or slicing, so
//! `totalCount` always reflects the full filtered set.

use serde_json::Value as Json;

use super::auth::{auth_allow, auth_where};
use super::projection::{project_node, stored_value};
use super::read::match_source;
use super::where_clause::{connection_where, member_filters};
use super::{Context, ResolveTree, as_list, as_object, node_property, parse_sort};
use crate::cypher::functions::{collect, size};
use crate::cypher::{
    Call, Clause, Expr, MapEntry, Match, NodePattern, NodeRef, Order, Param, Pattern, Projection, RelPattern,
    RelationshipRef, Unwind, Variable, and, concat,
};
use crate::model::{AuthOperation, Field, FieldKind, Node, RelationField, RelationshipProperties, Value};
use crate::{Error, Result};

/// Sort key of a relationship connection.
#[derive(Debug, Clone, PartialEq)]
enum SortKey {
    Node(String),
    Edge(String),
}

/// `first` as a LIMIT parameter; cursors are not supported.
fn first(tree: &ResolveTree) -> Result<Option<Expr>> {
    for cursor in ["after", "before"] {
        if tree.arg(cursor).is_some() {
            return Err(Error::InvalidArgument(format!("cursor pagination ({cursor}) is not supported")));
        }
    }
    Ok(tree.arg("first").map(|first| Param::new(Value::from(first)).into()))
}

/// `[{ node: { name: ASC } }, { edge: { screenTime: DESC } }]`
fn parse_connection_sort(tree: &ResolveTree) -> Result<Vec<(SortKey, Order)>> {
    let mut out = Vec::new();
    for entry in tree.arg("sort").map(as_list).unwrap_or_default() {
        for (side, fields) in as_object(entry, "sort")? {
            let wrap: fn(String) -> SortKey = match side.as_str() {
                "node" => SortKey::Node,
                "edge" => SortKey::Edge,
                other => return Err(Error::InvalidArgument(format!("invalid connection sort key {other}"))),
            };
            for (field, order) in parse_sort(Some(fields))? {
                out.push((wrap(field), order));
            }
        }
    }
    Ok(out)
}

/// `WITH collect(x) AS edges` → `WITH edges, size(edges) AS totalCount`
fn count_edges(item: &Variable, edges: &Variable, total: &Variable) -> [Option<Clause>; 2] {
    [
        Some(Clause::with(Projection::new().alias(collect(item), edges))),
        Some(Clause::with(Projection::of([edges]).alias(size(Expr::from(edges)), total))),
    ]
}

/// `RETURN { edges: ..., totalCount: totalCount } AS result`
fn return_connection(edges: Expr, total: &Variable, result: &Variable) -> Clause {
    Clause::ret(Projection::new().alias(Expr::map([("edges", edges), ("totalCount", Expr::from(total))]), result))
}

/// ```text
/// MATCH (this:Movie)
/// WITH collect(this) AS edges
/// WITH edges, size(edges) AS totalCount
/// CALL {
///   WITH edges
///   UNWIND edges AS this
///   WITH this ORDER BY ... LIMIT ...
///   RETURN collect({ node: this { ... } }) AS var0
/// }
/// RETURN { edges: var0, totalCount: totalCount } AS this
/// ```
pub fn translate_root_connection(ctx: &Context<'_>, node: &Node, tree: &ResolveTree) -> Result<Clause> {
    let this = NodeRef::named("this", node.labels());
    let source = match_source(ctx, node, &this, tree, AuthOperation::Read)?;
    let edges = Variable::named("edges");
    let total = Variable::named("totalCount");
    let page = Variable::new();

    let limit = first(tree)?;
    let sort = parse_sort(tree.arg("sort"))?;
    let paginate = (limit.is_some() || !sort.is_empty()).then(|| {
        let projection = sort.iter().fold(Projection::of([&this.var]), |p, (key, order)| {
            p.order_by(node_property(node, &this.var, key), *order)
        });
        Clause::with(projection.limit(limit))
    });

    let node_fields = tree
        .child("edges")
        .and_then(|edges| edges.child("node"))
        .map(|n| n.fields_for(&[node.name.as_str()]))
        .unwrap_or_default();
    let (map, subqueries) = project_node(ctx, node, &this.var, &node_fields)?.into_parts(&this.var);

    let page_body = concat(
        [Some(Clause::from(Unwind::new(&edges, &this.var))), paginate]
            .into_iter()
            .chain(subqueries.into_iter().map(Some))
            .chain([Some(Clause::ret(Projection::new().alias(collect(Expr::map([("node", map)])), &page)))]),
    );

    let [collected, counted] = count_edges(&this.var, &edges, &total);
    Ok(concat([
        Some(source),
        collected,
        counted,
        Some(Clause::from(Call::new(page_body).import_with([&edges])?)),
        Some(return_connection(Expr::from(&page), &total, &this.var)),
    ]))
}

/// Selected relationship-property entries of an edge.
fn edge_entries(
    props: Option<&RelationshipProperties>,
    relationship: &Variable,
    edges_tree: Option<&ResolveTree>,
) -> Result<Vec<(String, Expr)>> {
    let mut entries = Vec::new();
    for selection in edges_tree.map(ResolveTree::children).unwrap_or_default() {
        if matches!(selection.name.as_str(), "node" | "cursor" | "__typename") {
            continue;
        }
        let field = props.and_then(|p| p.field(&selection.name)).ok_or_else(|| Error::UnknownField {
            node: props.map(|p| p.name.clone()).unwrap_or_default(),
            field: selection.name.clone(),
        })?;
        entries.push((selection.alias().to_string(), stored_value(field, relationship)));
    }
    Ok(entries)
}

/// Connection field on a node, as a subquery importing `parent`.
///
/// ```text
/// CALL {
///   WITH this
///   MATCH (this)<-[this0:ACTED_IN]-(this1:Actor)
///   WITH { screenTime: this0.screenTime, node: this1 { .name } } AS edge
///   WITH collect(edge) AS edges
///   WITH edges, size(edges) AS totalCount
///   RETURN { edges: edges, totalCount: totalCount } AS var2
/// }
/// ```
pub(crate) fn connection_subquery(
    ctx: &Context<'_>,
    parent: &Variable,
    field: &Field,
    rel: &RelationField,
    tree: &ResolveTree,
) -> Result<(Clause, Variable)> {
    let limit = first(tree)?;
    let sort = parse_connection_sort(tree)?;
    let props = rel.properties.as_deref().and_then(|p| ctx.schema.relationship(p));
    let polymorphic = !matches!(field.kind, FieldKind::Relation(_));
    let direction = super::pattern_direction(rel.direction);
    let edges_tree = tree.child("edges");

    let edge = Variable::named("edge");
    let edges = Variable::named("edges");
    let total = Variable::named("totalCount");
    let result = Variable::new();

    let null = Json::Null;
    let filters = member_filters(ctx, field, rel, tree.arg("where").unwrap_or(&null))?;

    let mut branches = Vec::new();
    for (member, filter) in filters {
        let child = NodeRef::new(member.labels());
        let relationship = RelationshipRef::new(rel.rel_type.as_str());
        let pattern = Pattern::new(NodePattern::var(parent))
            .related(RelPattern::new(&relationship, direction), NodePattern::new(&child));
        let filter = match filter {
            Some(filter) => connection_where(ctx, member, &child.var, props, &relationship.var, filter)?,
            None => None,
        };
        let predicate = and([
            filter,
            auth_where(ctx, member, &child.var, AuthOperation::Read)?,
            auth_allow(ctx, member, &child.var, AuthOperation::Read)?,
        ]);

        let node_fields = edges_tree
            .and_then(|e| e.child("node"))
            .map(|n| n.fields_for(&[member.name.as_str(), rel.target.as_str()]))
            .unwrap_or_default();
        let mut projection = project_node(ctx, member, &child.var, &node_fields)?;
        if polymorphic {
            projection
                .entries
                .insert(0, MapEntry::Pair("__resolveType".into(), Expr::string(member.name.as_str())));
        }

        let mut entries = edge_entries(props, &relationship.var, edges_tree)?;
        for (key, _) in &sort {
            match key {
                SortKey::Node(key) => projection.ensure(key, node_property(member, &child.var, key)),
                SortKey::Edge(key) if !entries.iter().any(|(k, _)| k == key) => {
                    let edge_field = props.and_then(|p| p.field(key)).ok_or_else(|| {
                        Error::InvalidArgument(format!("cannot sort {} edges by {key}", field.name))
                    })?;
                    entries.push((key.clone(), stored_value(edge_field, &relationship.var)));
                }
                SortKey::Edge(_) => {}
            }
        }
        let (map, subqueries) = projection.into_parts(&child.var);
        entries.push(("node".to_string(), map));

        branches.push(concat(
            std::iter::once(Some(Clause::from(Match::new(pattern).and_where(predicate))))
                .chain(subqueries.into_iter().map(Some))
                .chain([Some(Clause::with(Projection::new().alias(Expr::map(entries), &edge)))]),
        ));
    }

    let matched = if polymorphic {
        let union = Clause::Union(
            branches
                .into_iter()
                .map(|branch| {
                    concat([
                        Some(Clause::with(Projection::new().star())),
                        Some(branch),
                        Some(Clause::ret(Projection::of([&edge]))),
                    ])
                })
                .collect(),
        );
        Clause::from(Call::new(union))
    } else {
        concat(branches.into_iter().map(Some))
    };

    let page = Variable::new();
    let paginate = (limit.is_some() || !sort.is_empty()).then(|| {
        let projection = sort.iter().fold(Projection::of([&edge]), |p, (key, order)| {
            let key = match key {
                SortKey::Node(key) => Expr::from(&edge).property("node").property(key.as_str()),
                SortKey::Edge(key) => Expr::from(&edge).property(key.as_str()),
            };
            p.order_by(key, *order)
        });
        let body = concat([
            Some(Unwind::new(&edges, &edge).into()),
            Some(Clause::with(projection.limit(limit))),
            Some(Clause::ret(Projection::new().alias(collect(&edge), &page))),
        ]);
        Call::new(body).import_with([&edges])
    });
    let (paginate, paged) = match paginate {
        Some(call) => (Some(Clause::from(call?)), Expr::from(&page)),
        None => (None, Expr::from(&edges)),
    };

    let [collected, counted] = count_edges(&edge, &edges, &total);
    let body = concat([
        Some(matched),
        collected,
        counted,
        paginate,
        Some(return_connection(paged, &total, &result)),
    ]);
    Ok((Call::new(body).import_with([parent])?.into(), result))
}
