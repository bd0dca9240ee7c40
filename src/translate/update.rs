//! `updateMovies(where, update, connect, disconnect, create, delete)`

use serde_json::{Map, Value as Json};

use super::auth::{auth_allow, auth_bind, auth_where};
use super::create::{connect, nested_create, required_checks, set_properties};
use super::delete::nested_delete;
use super::projection::project_node;
use super::read::match_source;
use super::subscriptions::{append, fold_collected, init_meta, update_event};
use super::where_clause::connection_where;
use super::{Context, ResolveTree, as_list, as_object, carry, chain_name, member_inputs, subscriptions};
use crate::cypher::functions::{collect, collect_distinct, count_star};
use crate::cypher::{
    Call, Clause, Delete, Expr, MapEntry, Match, NodePattern, NodeRef, Pattern, Projection, RelPattern,
    RelationshipRef, SetItem, Unwind, Variable, and, concat,
};
use crate::model::{AuthOperation, Field, Node, RelationField, RelationshipProperties, TimestampOperation};
use crate::{Error, Result};

/// ```text
/// MATCH (this:Movie)
/// WHERE this.title = $param0
/// SET this.title = $param1
/// <nested writes>
/// RETURN collect(DISTINCT this { .title }) AS data
/// ```
pub fn translate_update(ctx: &Context<'_>, node: &Node, tree: &ResolveTree) -> Result<Clause> {
    let this = NodeRef::named("this", node.labels());
    let meta = ctx.config.subscriptions.then(subscriptions::meta);
    let scope = [this.var.clone()];

    let mut clauses: Vec<Clause> = meta.iter().map(init_meta).collect();
    clauses.push(match_source(ctx, node, &this, tree, AuthOperation::Update)?);

    if let Some(update) = tree.arg("update") {
        let update = as_object(update, "update")?;
        let items = set_properties(&node.fields, &node.name, &this.var, update, TimestampOperation::Update)?;
        if !items.is_empty() {
            match &meta {
                Some(meta) => {
                    let old = Variable::new();
                    let snapshot = Projection::new()
                        .alias(Expr::projection(&this.var, [MapEntry::All]), &old)
                        .item(&this.var)
                        .item(meta);
                    clauses.push(Clause::with(snapshot));
                    clauses.push(Clause::set(items));
                    clauses.push(append(meta, update_event(&this.var, &old, &node.name), &scope));
                }
                None => clauses.push(Clause::set(items)),
            }
        }
        clauses.extend(update_relations(ctx, node, &this.var, "this", update, &scope, meta.as_ref())?);
    }

    for op in ["disconnect", "connect", "create", "delete"] {
        let Some(input) = tree.arg(op) else { continue };
        for (key, value) in as_object(input, op)? {
            let (field, rel) = node
                .relation_field(key)
                .ok_or_else(|| Error::UnknownField { node: node.name.clone(), field: key.clone() })?;
            for (member, segment, items) in member_inputs(ctx, field, rel, value)? {
                let base = chain_name(&format!("this_{op}"), field, segment);
                for (k, item) in as_list(items).into_iter().enumerate() {
                    let name = format!("{base}{k}");
                    clauses.extend(relation_op(ctx, op, &this.var, rel, member, &name, item, &scope, meta.as_ref())?);
                }
            }
        }
    }

    clauses.extend(required_checks(ctx, node, &this.var)?);
    let carried: Vec<Variable> = scope.iter().chain(meta.as_ref()).cloned().collect();
    clauses.extend(auth_bind(ctx, node, &this.var, AuthOperation::Update, &carried)?);

    let fields = tree
        .child(&node.plural())
        .map(|selection| selection.fields_for(&[node.name.as_str()]))
        .unwrap_or_default();
    let (map, subqueries) = project_node(ctx, node, &this.var, &fields)?.into_parts(&this.var);
    clauses.extend(subqueries);

    let mut ret = Projection::new().alias(collect_distinct(map), &Variable::named("data"));
    if let Some(meta) = &meta {
        ret = ret.alias(fold_collected(meta), meta);
    }
    clauses.push(Clause::ret(ret));
    Ok(concat(clauses.into_iter().map(Some)))
}

/// One `connect`, `disconnect`, `create` or `delete` item.
#[allow(clippy::too_many_arguments)]
fn relation_op(
    ctx: &Context<'_>,
    op: &str,
    parent: &Variable,
    rel: &RelationField,
    member: &Node,
    name: &str,
    item: &Json,
    scope: &[Variable],
    meta: Option<&Variable>,
) -> Result<Vec<Clause>> {
    match op {
        "connect" => connect(ctx, parent, rel, member, name, item, scope, meta),
        "disconnect" => disconnect(ctx, parent, rel, member, name, item, scope, meta),
        "create" => nested_create(ctx, parent, rel, member, name, item, scope, meta),
        "delete" => nested_delete(ctx, parent, rel, member, name, item, scope, meta),
        other => Err(Error::InvalidArgument(format!("{other} is not a relationship operation"))),
    }
}

/// Relationship keys of an update input: each holds a list of
/// `{ where, update, connect, disconnect, create, delete }` entries.
pub(crate) fn update_relations(
    ctx: &Context<'_>,
    node: &Node,
    parent: &Variable,
    parent_name: &str,
    input: &Map<String, Json>,
    scope: &[Variable],
    meta: Option<&Variable>,
) -> Result<Vec<Clause>> {
    let mut clauses = Vec::new();
    for (key, value) in input {
        let Some((field, rel)) = node.relation_field(key) else { continue };
        for (member, segment, entries) in member_inputs(ctx, field, rel, value)? {
            let base = chain_name(parent_name, field, segment);
            for (j, entry) in as_list(entries).into_iter().enumerate() {
                let name = format!("{base}{j}");
                clauses.extend(update_entry(ctx, parent, field, rel, member, &name, entry, scope, meta)?);
            }
        }
    }
    Ok(clauses)
}

#[allow(clippy::too_many_arguments)]
fn update_entry(
    ctx: &Context<'_>,
    parent: &Variable,
    field: &Field,
    rel: &RelationField,
    member: &Node,
    name: &str,
    entry: &Json,
    scope: &[Variable],
    meta: Option<&Variable>,
) -> Result<Vec<Clause>> {
    let entry = as_object(entry, &field.name)?;
    let mut clauses = Vec::new();
    if let Some(update) = entry.get("update").filter(|u| !u.is_null()) {
        let filter = entry.get("where").filter(|w| !w.is_null());
        clauses.extend(nested_update(ctx, parent, rel, member, name, filter, update, scope, meta)?);
    }
    for op in ["disconnect", "connect", "create", "delete"] {
        let Some(items) = entry.get(op).filter(|v| !v.is_null()) else { continue };
        for (k, item) in as_list(items).into_iter().enumerate() {
            let nested = format!("{name}_{op}{k}");
            clauses.extend(relation_op(ctx, op, parent, rel, member, &nested, item, scope, meta)?);
        }
    }
    for key in entry.keys() {
        if !matches!(key.as_str(), "where" | "update" | "disconnect" | "connect" | "create" | "delete") {
            return Err(Error::InvalidArgument(format!("{key} is not valid under {}", field.name)));
        }
    }
    Ok(clauses)
}

/// ```text
/// WITH this
/// CALL {
///   WITH this
///   MATCH (this)<-[this_actors0_relationship:ACTED_IN]-(this_actors0:Actor)
///   WHERE this_actors0.name = $param0
///   SET this_actors0.name = $param1
///   RETURN count(*) AS update_this_actors0
/// }
/// ```
#[allow(clippy::too_many_arguments)]
fn nested_update(
    ctx: &Context<'_>,
    parent: &Variable,
    rel: &RelationField,
    member: &Node,
    name: &str,
    filter: Option<&Json>,
    update: &Json,
    scope: &[Variable],
    meta: Option<&Variable>,
) -> Result<Vec<Clause>> {
    let update = as_object(update, "update")?;
    let child = NodeRef::named(name, member.labels());
    let relationship = RelationshipRef::named(format!("{name}_relationship"), rel.rel_type.as_str());
    let props = rel.properties.as_deref().and_then(|p| ctx.schema.relationship(p));

    let filter = match filter {
        Some(filter) => {
            connection_where(ctx, member, &child.var, props, &relationship.var, as_object(filter, "where")?)?
        }
        None => None,
    };
    let predicate = and([
        filter,
        auth_where(ctx, member, &child.var, AuthOperation::Update)?,
        auth_allow(ctx, member, &child.var, AuthOperation::Update)?,
    ]);
    let pattern = Pattern::new(NodePattern::var(parent)).related(
        RelPattern::new(&relationship, super::pattern_direction(rel.direction)),
        NodePattern::new(&child),
    );

    let node_input = update.get("node").filter(|n| !n.is_null()).map(|n| as_object(n, "node")).transpose()?;
    let mut items = Vec::new();
    if let Some(node_input) = node_input {
        items.extend(set_properties(&member.fields, &member.name, &child.var, node_input, TimestampOperation::Update)?);
    }
    if let Some(edge) = update.get("edge").filter(|e| !e.is_null()) {
        items.extend(edge_updates(props, rel, &relationship, edge)?);
    }

    let mut body = vec![Clause::from(Match::new(pattern).and_where(predicate))];
    if !items.is_empty() {
        body.push(Clause::set(items));
    }
    if let Some(node_input) = node_input {
        body.extend(update_relations(ctx, member, &child.var, name, node_input, &[child.var.clone()], None)?);
    }
    body.extend(required_checks(ctx, member, &child.var)?);
    body.extend(auth_bind(ctx, member, &child.var, AuthOperation::Update, &[])?);
    body.push(Clause::ret(
        Projection::new().alias(count_star(), &Variable::named(format!("update_{name}"))),
    ));

    Ok(vec![
        carry(scope, meta),
        Call::new(concat(body.into_iter().map(Some))).import_with([parent])?.into(),
    ])
}

fn edge_updates(
    props: Option<&RelationshipProperties>,
    rel: &RelationField,
    relationship: &RelationshipRef,
    edge: &Json,
) -> Result<Vec<SetItem>> {
    let props = props
        .ok_or_else(|| Error::InvalidArgument(format!("{} has no relationship properties", rel.rel_type)))?;
    set_properties(&props.fields, &props.name, &relationship.var, as_object(edge, "edge")?, TimestampOperation::Update)
}

/// ```text
/// WITH this
/// CALL {
///   WITH this
///   OPTIONAL MATCH (this)<-[this_disconnect_actors0_rel:ACTED_IN]-(this_disconnect_actors0:Actor)
///   WHERE this_disconnect_actors0.name = $param0
///   CALL {
///     WITH this_disconnect_actors0_rel
///     WITH collect(this_disconnect_actors0_rel) AS rels
///     UNWIND rels AS x
///     DELETE x
///     RETURN count(*) AS _
///   }
///   RETURN count(*) AS disconnect_this_disconnect_actors0
/// }
/// ```
#[allow(clippy::too_many_arguments)]
pub(crate) fn disconnect(
    ctx: &Context<'_>,
    parent: &Variable,
    rel: &RelationField,
    member: &Node,
    name: &str,
    input: &Json,
    scope: &[Variable],
    meta: Option<&Variable>,
) -> Result<Vec<Clause>> {
    let input = as_object(input, "disconnect")?;
    let child = NodeRef::named(name, member.labels());
    let relationship = RelationshipRef::named(format!("{name}_rel"), rel.rel_type.as_str());
    let props = rel.properties.as_deref().and_then(|p| ctx.schema.relationship(p));

    let filter = match input.get("where").filter(|w| !w.is_null()) {
        Some(filter) => {
            connection_where(ctx, member, &child.var, props, &relationship.var, as_object(filter, "where")?)?
        }
        None => None,
    };
    let predicate = and([
        filter,
        auth_where(ctx, member, &child.var, AuthOperation::Disconnect)?,
        auth_allow(ctx, member, &child.var, AuthOperation::Disconnect)?,
    ]);
    let pattern = Pattern::new(NodePattern::var(parent)).related(
        RelPattern::new(&relationship, super::pattern_direction(rel.direction)),
        NodePattern::new(&child),
    );

    let rels = Variable::named("rels");
    let x = Variable::named("x");
    let unlink = concat([
        Some(Clause::with(Projection::new().alias(collect(&relationship.var), &rels))),
        Some(Unwind::new(&rels, &x).into()),
        Some(Delete::new([&x]).into()),
        Some(Clause::ret(Projection::new().alias(count_star(), &Variable::named("_")))),
    ]);

    let mut body = vec![
        Clause::from(Match::optional(pattern).and_where(predicate)),
        Call::new(unlink).import_with([&relationship.var])?.into(),
    ];
    if let Some(nested) = input.get("disconnect").filter(|d| !d.is_null()) {
        for entry in as_list(nested) {
            for (key, value) in as_object(entry, "disconnect")? {
                let (field, nested_rel) = member
                    .relation_field(key)
                    .ok_or_else(|| Error::UnknownField { node: member.name.clone(), field: key.clone() })?;
                for (target, segment, items) in member_inputs(ctx, field, nested_rel, value)? {
                    let base = chain_name(name, field, segment);
                    for (k, item) in as_list(items).into_iter().enumerate() {
                        let nested_name = format!("{base}{k}");
                        body.extend(disconnect(
                            ctx,
                            &child.var,
                            nested_rel,
                            target,
                            &nested_name,
                            item,
                            &[child.var.clone()],
                            None,
                        )?);
                    }
                }
            }
        }
    }
    body.extend(auth_bind(ctx, member, &child.var, AuthOperation::Disconnect, &[parent.clone(), child.var.clone()])?);
    body.push(Clause::ret(
        Projection::new().alias(count_star(), &Variable::named(format!("disconnect_{name}"))),
    ));

    Ok(vec![
        carry(scope, meta),
        Call::new(concat(body.into_iter().map(Some))).import_with([parent])?.into(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::cypher::CypherResult;
    use crate::model::{AuthContext, Direction, ScalarType, Schema, TemporalType};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new()
            .with_node(Node::new("Movie").with_fields([
                Field::scalar("title", ScalarType::String),
                Field::temporal("updatedAt", TemporalType::DateTime).with_timestamps([TimestampOperation::Update]),
                Field::relation(
                    "actors",
                    RelationField::new("ACTED_IN", Direction::Incoming, "Actor").with_properties("ActedIn"),
                ),
            ]))
            .with_node(Node::new("Actor").with_fields([
                Field::scalar("name", ScalarType::String),
                Field::relation("movies", RelationField::new("ACTED_IN", Direction::Outgoing, "Movie")),
            ]))
            .with_relationship(RelationshipProperties::new(
                "ActedIn",
                vec![Field::scalar("screenTime", ScalarType::Int)],
            ))
    }

    fn render(config: &Config, tree: ResolveTree) -> Result<CypherResult> {
        let schema = schema();
        let auth = AuthContext::anonymous();
        let tree = tree.with_fields(
            "UpdateMoviesMutationResponse",
            [ResolveTree::new("movies").with_fields("Movie", [ResolveTree::new("title")])],
        );
        super::super::translate(&Context::new(&schema, &auth, config), &tree)
    }

    #[test]
    fn test_simple_update() {
        let tree = ResolveTree::new("updateMovies")
            .with_arg("where", json!({ "title": "A" }))
            .with_arg("update", json!({ "title": "B" }));
        assert_eq!(
            render(&Config::default(), tree).unwrap().cypher,
            "MATCH (this:Movie)\nWHERE this.title = $param0\nSET this.title = $param1, this.updatedAt = datetime()\nRETURN collect(DISTINCT this { .title }) AS data"
        );
    }

    #[test]
    fn test_nested_update() {
        let tree = ResolveTree::new("updateMovies").with_arg(
            "update",
            json!({
                "actors": [{
                    "where": { "node": { "name": "K" }, "edge": { "screenTime_GT": 3 } },
                    "update": { "node": { "name": "Keanu" }, "edge": { "screenTime": 10 } }
                }]
            }),
        );
        assert_eq!(
            render(&Config::default(), tree).unwrap().cypher,
            "MATCH (this:Movie)
SET this.updatedAt = datetime()
WITH this
CALL {
  WITH this
  MATCH (this)<-[this_actors0_relationship:ACTED_IN]-(this_actors0:Actor)
  WHERE this_actors0.name = $param0
  AND this_actors0_relationship.screenTime > $param1
  SET this_actors0.name = $param2, this_actors0_relationship.screenTime = $param3
  RETURN count(*) AS update_this_actors0
}
RETURN collect(DISTINCT this { .title }) AS data"
        );
    }

    #[test]
    fn test_disconnect() {
        let tree = ResolveTree::new("updateMovies")
            .with_arg("disconnect", json!({ "actors": [{ "where": { "node": { "name": "K" } } }] }));
        assert_eq!(
            render(&Config::default(), tree).unwrap().cypher,
            "MATCH (this:Movie)
WITH this
CALL {
  WITH this
  OPTIONAL MATCH (this)<-[this_disconnect_actors0_rel:ACTED_IN]-(this_disconnect_actors0:Actor)
  WHERE this_disconnect_actors0.name = $param0
  CALL {
    WITH this_disconnect_actors0_rel
    WITH collect(this_disconnect_actors0_rel) AS rels
    UNWIND rels AS x
    DELETE x
    RETURN count(*) AS _
  }
  RETURN count(*) AS disconnect_this_disconnect_actors0
}
RETURN collect(DISTINCT this { .title }) AS data"
        );
    }

    #[test]
    fn test_nested_connect_create_and_delete_names() {
        let tree = ResolveTree::new("updateMovies").with_arg(
            "update",
            json!({
                "actors": [{
                    "connect": [{ "where": { "node": { "name": "A" } } }],
                    "create": [{ "node": { "name": "B" } }],
                    "delete": [{ "where": { "node": { "name": "C" } } }]
                }]
            }),
        );
        let cypher = render(&Config::default(), tree).unwrap().cypher;
        let connect = cypher.find("OPTIONAL MATCH (this_actors0_connect0_node:Actor)").unwrap();
        let create = cypher.find("CREATE (this_actors0_create0_node:Actor)").unwrap();
        let delete = cypher.find("collect(DISTINCT this_actors0_delete0) AS this_actors0_delete0_to_delete").unwrap();
        assert!(connect < create && create < delete);
    }

    #[test]
    fn test_update_event() {
        let config = Config { subscriptions: true, ..Config::default() };
        let tree = ResolveTree::new("updateMovies").with_arg("update", json!({ "title": "B" }));
        assert_eq!(
            render(&config, tree).unwrap().cypher,
            "WITH [] AS meta
MATCH (this:Movie)
WITH this { .* } AS var0, this, meta
SET this.title = $param0, this.updatedAt = datetime()
WITH meta + { event: \"update\", id: id(this), properties: { old: var0, new: this { .* } }, timestamp: timestamp(), typename: \"Movie\" } AS meta, this
RETURN collect(DISTINCT this { .title }) AS data, REDUCE(var1=[], var2 IN collect(meta) | var1 + var2) AS meta"
        );
    }

    #[test]
    fn test_invalid_entry_key() {
        let tree = ResolveTree::new("updateMovies").with_arg("update", json!({ "actors": [{ "replace": [] }] }));
        assert!(matches!(render(&Config::default(), tree), Err(Error::InvalidArgument(_))));
    }
}
