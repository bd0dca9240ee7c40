//! `createMovies(input: [...])`, plus the nested create and connect
//! writes shared with update.
//!
//! Every top-level input runs in its own `CALL` block so the nodes it
//! creates never share a row with another input's.

use serde_json::{Map, Value as Json};

use super::auth::{auth_allow, auth_bind, auth_where};
use super::projection::project_node;
use super::subscriptions::{append, create_event, init_meta};
use super::where_clause::node_where;
use super::{Context, ResolveTree, as_list, as_object, carry, chain_name, member_inputs, subscriptions};
use crate::cypher::functions::{collect, count, count_star, point, random_uuid};
use crate::cypher::{
    Call, Clause, Create, Expr, Match, Merge, NodePattern, NodeRef, Param, Pattern, Procedure, Projection,
    RelPattern, RelationshipRef, SetItem, Unwind, Variable, and, concat,
};
use crate::model::{
    AuthOperation, Field, FieldKind, Node, RelationField, TemporalType, TimestampOperation, Value,
};
use crate::{Error, Result};

/// Raised by the database when a required single relationship is missing
/// or duplicated after a write.
pub const RELATIONSHIP_REQUIRED: &str = "@neo4j/graphql/RELATIONSHIP-REQUIRED";

/// ```text
/// CALL {
///   CREATE (this0:Movie)
///   SET this0.title = $param0
///   RETURN this0
/// }
/// RETURN [this0 { .title }] AS data
/// ```
pub fn translate_create(ctx: &Context<'_>, node: &Node, tree: &ResolveTree) -> Result<Clause> {
    let input = tree
        .arg("input")
        .ok_or_else(|| Error::InvalidArgument(format!("{} needs an input", tree.name)))?;
    let meta = ctx.config.subscriptions.then(subscriptions::meta);

    let mut calls = Vec::new();
    let mut created = Vec::new();
    for (i, input) in as_list(input).into_iter().enumerate() {
        let name = format!("this{i}");
        let this = NodeRef::named(name.as_str(), node.labels());
        let events = Variable::named(format!("{name}_meta"));

        let mut body: Vec<Clause> = meta.iter().map(init_meta).collect();
        body.extend(create_node(ctx, node, &this, &name, as_object(input, "input")?, &[], meta.as_ref(), Vec::new())?);
        let mut ret = Projection::of([&this.var]);
        if let Some(meta) = &meta {
            ret = ret.alias(meta, &events);
        }
        body.push(Clause::ret(ret));

        calls.push(Clause::from(Call::new(concat(body.into_iter().map(Some)))));
        created.push((this, events));
    }

    let fields = tree
        .child(&node.plural())
        .map(|selection| selection.fields_for(&[node.name.as_str()]))
        .unwrap_or_default();
    let mut projected = Vec::new();
    let mut subqueries = Vec::new();
    for (this, _) in &created {
        let (map, nested) = project_node(ctx, node, &this.var, &fields)?.into_parts(&this.var);
        projected.push(map);
        subqueries.extend(nested);
    }

    let mut ret = Projection::new().alias(Expr::List(projected), &Variable::named("data"));
    if meta.is_some() {
        let events = created
            .iter()
            .map(|(_, events)| Expr::from(events))
            .reduce(|all, next| all.add(next))
            .unwrap_or_else(|| Expr::List(Vec::new()));
        ret = ret.alias(events, &subscriptions::meta());
    }

    Ok(concat(calls.into_iter().chain(subqueries).chain([Clause::ret(ret)]).map(Some)))
}

/// `CREATE` one node, then `attach` (the relationship to its parent, if
/// any), then every write nested under it.
#[allow(clippy::too_many_arguments)]
pub(crate) fn create_node(
    ctx: &Context<'_>,
    node: &Node,
    this: &NodeRef,
    name: &str,
    input: &Map<String, Json>,
    scope: &[Variable],
    meta: Option<&Variable>,
    attach: Vec<Clause>,
) -> Result<Vec<Clause>> {
    let properties = set_properties(&node.fields, &node.name, &this.var, input, TimestampOperation::Create)?;
    let mut clauses = vec![Clause::from(Create::new(NodePattern::new(this)).set(properties))];

    let mut inner = scope.to_vec();
    inner.push(this.var.clone());
    if let Some(meta) = meta {
        clauses.push(append(meta, create_event(&this.var, &node.name), &inner));
    }
    clauses.extend(attach);

    for (key, value) in input {
        if let Some((field, rel)) = node.relation_field(key) {
            clauses.extend(relation_writes(ctx, &this.var, name, field, rel, value, &inner, meta)?);
        }
    }

    clauses.extend(required_checks(ctx, node, &this.var)?);
    let carried: Vec<Variable> = inner.iter().chain(meta).cloned().collect();
    clauses.extend(auth_bind(ctx, node, &this.var, AuthOperation::Create, &carried)?);
    Ok(clauses)
}

/// `create` and `connect` under one relationship key of a create input.
#[allow(clippy::too_many_arguments)]
fn relation_writes(
    ctx: &Context<'_>,
    parent: &Variable,
    parent_name: &str,
    field: &Field,
    rel: &RelationField,
    value: &Json,
    scope: &[Variable],
    meta: Option<&Variable>,
) -> Result<Vec<Clause>> {
    let mut clauses = Vec::new();
    for (member, segment, input) in member_inputs(ctx, field, rel, value)? {
        let base = chain_name(parent_name, field, segment);
        for (op, items) in as_object(input, &field.name)? {
            match op.as_str() {
                "create" => {
                    for (j, item) in as_list(items).into_iter().enumerate() {
                        let name = format!("{base}{j}");
                        clauses.extend(nested_create(ctx, parent, rel, member, &name, item, scope, meta)?);
                    }
                }
                "connect" => {
                    for (j, item) in as_list(items).into_iter().enumerate() {
                        let name = format!("{base}_connect{j}");
                        clauses.extend(connect(ctx, parent, rel, member, &name, item, scope, meta)?);
                    }
                }
                other => {
                    return Err(Error::InvalidArgument(format!("{other} is not valid under {}", field.name)));
                }
            }
        }
    }
    Ok(clauses)
}

fn relationship_pattern(parent: &Variable, rel: &RelationField, relationship: &RelationshipRef, child: &Variable) -> Pattern {
    Pattern::new(NodePattern::var(parent)).related(
        RelPattern::new(relationship, super::pattern_direction(rel.direction)),
        NodePattern::var(child),
    )
}

/// SET items for relationship properties, including generated ones when
/// no edge input was given.
fn edge_properties(
    ctx: &Context<'_>,
    rel: &RelationField,
    relationship: &RelationshipRef,
    edge: Option<&Json>,
    op: TimestampOperation,
) -> Result<Option<Clause>> {
    let Some(props) = rel.properties.as_deref().and_then(|p| ctx.schema.relationship(p)) else {
        if edge.is_some() {
            return Err(Error::InvalidArgument(format!("{} has no relationship properties", rel.rel_type)));
        }
        return Ok(None);
    };
    let empty = Map::new();
    let input = match edge {
        Some(edge) => as_object(edge, "edge")?,
        None => &empty,
    };
    let items = set_properties(&props.fields, &props.name, &relationship.var, input, op)?;
    Ok((!items.is_empty()).then(|| Clause::set(items)))
}

/// ```text
/// WITH this0
/// CREATE (this0_actors0_node:Actor)
/// SET this0_actors0_node.name = $param1
/// MERGE (this0)<-[this0_actors0_relationship:ACTED_IN]-(this0_actors0_node)
/// ```
#[allow(clippy::too_many_arguments)]
pub(crate) fn nested_create(
    ctx: &Context<'_>,
    parent: &Variable,
    rel: &RelationField,
    member: &Node,
    name: &str,
    input: &Json,
    scope: &[Variable],
    meta: Option<&Variable>,
) -> Result<Vec<Clause>> {
    let input = as_object(input, "create")?;
    let node_input = input
        .get("node")
        .ok_or_else(|| Error::InvalidArgument(format!("nested create of {} needs a node", member.name)))?;
    let child = NodeRef::named(format!("{name}_node"), member.labels());
    let relationship = RelationshipRef::named(format!("{name}_relationship"), rel.rel_type.as_str());

    let mut attach = vec![Clause::from(Merge::new(relationship_pattern(parent, rel, &relationship, &child.var)))];
    attach.extend(edge_properties(ctx, rel, &relationship, input.get("edge"), TimestampOperation::Create)?);

    let mut clauses = vec![carry(scope, meta)];
    clauses.extend(create_node(ctx, member, &child, name, as_object(node_input, "node")?, scope, meta, attach)?);
    Ok(clauses)
}

/// ```text
/// WITH this0
/// CALL {
///   WITH this0
///   OPTIONAL MATCH (this0_actors_connect0_node:Actor)
///   WHERE this0_actors_connect0_node.name = $param0
///   CALL {
///     WITH *
///     WITH collect(this0_actors_connect0_node) AS connectedNodes, collect(this0) AS parentNodes
///     CALL {
///       WITH connectedNodes, parentNodes
///       UNWIND parentNodes AS this0
///       UNWIND connectedNodes AS this0_actors_connect0_node
///       MERGE (this0)<-[this0_actors_connect0_relationship:ACTED_IN]-(this0_actors_connect0_node)
///       RETURN count(*) AS _
///     }
///     RETURN count(*) AS _
///   }
///   RETURN count(*) AS connect_this0_actors_connect0
/// }
/// ```
///
/// Collecting before the MERGE keeps a connect that matched nothing from
/// dropping the parent row.
#[allow(clippy::too_many_arguments)]
pub(crate) fn connect(
    ctx: &Context<'_>,
    parent: &Variable,
    rel: &RelationField,
    member: &Node,
    name: &str,
    input: &Json,
    scope: &[Variable],
    meta: Option<&Variable>,
) -> Result<Vec<Clause>> {
    let input = as_object(input, "connect")?;
    let node = NodeRef::named(format!("{name}_node"), member.labels());
    let relationship = RelationshipRef::named(format!("{name}_relationship"), rel.rel_type.as_str());

    let filter = match input.get("where").filter(|w| !w.is_null()) {
        Some(filter) => match as_object(filter, "where")?.get("node") {
            Some(node_filter) => node_where(ctx, member, &node.var, as_object(node_filter, "node")?)?,
            None => None,
        },
        None => None,
    };
    let predicate = and([
        filter,
        auth_where(ctx, member, &node.var, AuthOperation::Connect)?,
        auth_allow(ctx, member, &node.var, AuthOperation::Connect)?,
    ]);

    let connected = Variable::named("connectedNodes");
    let parents = Variable::named("parentNodes");
    let discard = Variable::named("_");
    let merge = concat([
        Some(Unwind::new(&parents, parent).into()),
        Some(Unwind::new(&connected, &node.var).into()),
        Some(Merge::new(relationship_pattern(parent, rel, &relationship, &node.var)).into()),
        edge_properties(ctx, rel, &relationship, input.get("edge"), TimestampOperation::Create)?,
        Some(Clause::ret(Projection::new().alias(count_star(), &discard))),
    ]);
    let collected = concat([
        Some(Clause::with(
            Projection::new().alias(collect(&node.var), &connected).alias(collect(parent), &parents),
        )),
        Some(Call::new(merge).import_with([&connected, &parents])?.into()),
        Some(Clause::ret(Projection::new().alias(count_star(), &discard))),
    ]);

    let mut body = vec![
        Clause::from(Match::optional(NodePattern::new(&node)).and_where(predicate)),
        Call::new(collected).import_all()?.into(),
    ];
    if let Some(nested) = input.get("connect") {
        body.extend(nested_connects(ctx, member, &node.var, name, nested)?);
    }
    body.extend(auth_bind(ctx, member, &node.var, AuthOperation::Connect, &[parent.clone(), node.var.clone()])?);
    body.push(Clause::ret(
        Projection::new().alias(count_star(), &Variable::named(format!("connect_{name}"))),
    ));

    Ok(vec![
        carry(scope, meta),
        Call::new(concat(body.into_iter().map(Some))).import_with([parent])?.into(),
    ])
}

/// `connect: { actors: [...] }` nested inside a connect input.
fn nested_connects(
    ctx: &Context<'_>,
    node: &Node,
    var: &Variable,
    name: &str,
    input: &Json,
) -> Result<Vec<Clause>> {
    let mut clauses = Vec::new();
    for entry in as_list(input) {
        for (key, value) in as_object(entry, "connect")? {
            let (field, rel) = node
                .relation_field(key)
                .ok_or_else(|| Error::UnknownField { node: node.name.clone(), field: key.clone() })?;
            for (member, segment, items) in member_inputs(ctx, field, rel, value)? {
                let base = chain_name(name, field, segment);
                for (j, item) in as_list(items).into_iter().enumerate() {
                    let nested = format!("{base}_connect{j}");
                    clauses.extend(connect(ctx, var, rel, member, &nested, item, &[var.clone()], None)?);
                }
            }
        }
    }
    Ok(clauses)
}

/// ```text
/// CALL {
///   WITH this0
///   MATCH (this0)<-[this1:DIRECTED]-(:Person)
///   WITH count(this1) AS var2
///   CALL apoc.util.validate(NOT (var2 = 1), "@neo4j/graphql/RELATIONSHIP-REQUIRED...", [0])
///   RETURN var2
/// }
/// ```
pub(crate) fn required_checks(ctx: &Context<'_>, node: &Node, var: &Variable) -> Result<Vec<Clause>> {
    let mut checks = Vec::new();
    for field in node.fields.iter().filter(|f| f.required && !f.list) {
        let FieldKind::Relation(rel) = &field.kind else { continue };
        let target = ctx.schema.node(&rel.target)?;
        let relationship = RelationshipRef::new(rel.rel_type.as_str());
        let pattern = Pattern::new(NodePattern::var(var)).related(
            RelPattern::new(&relationship, super::pattern_direction(rel.direction)),
            NodePattern::anonymous(target.labels()),
        );
        let counted = Variable::new();
        let message = format!("{RELATIONSHIP_REQUIRED}: {}.{} required exactly once", node.name, field.name);
        let body = concat([
            Some(Match::new(pattern).into()),
            Some(Clause::with(Projection::new().alias(count(&relationship.var), &counted))),
            Some(Procedure::validate(Expr::from(&counted).eq(Expr::literal(1)).not(), &message).into()),
            Some(Clause::ret(Projection::of([&counted]))),
        ]);
        checks.push(Call::new(body).import_with([var])?.into());
    }
    Ok(checks)
}

/// SET items for the stored properties in `input`, plus `@id` and
/// `@timestamp` values generated for `op`.
///
/// Relationship keys are skipped; the caller handles them.
pub(crate) fn set_properties(
    fields: &[Field],
    owner: &str,
    var: &Variable,
    input: &Map<String, Json>,
    op: TimestampOperation,
) -> Result<Vec<SetItem>> {
    let mut items = Vec::new();
    for (key, value) in input {
        let field = fields
            .iter()
            .find(|f| f.name == *key)
            .ok_or_else(|| Error::UnknownField { node: owner.to_string(), field: key.clone() })?;
        let value = match &field.kind {
            FieldKind::Relation(_) | FieldKind::Union(_) | FieldKind::Interface(_) => continue,
            FieldKind::Computed(_) => {
                return Err(Error::InvalidArgument(format!("{owner}.{key} is computed and cannot be set")));
            }
            FieldKind::Temporal { temporal } => Param::new(Value::from(value).coerce_temporal(*temporal)?).into(),
            FieldKind::Primitive { scalar } if scalar.is_point() => {
                let param = Param::new(Value::from(value));
                if field.list {
                    let item = Variable::new();
                    Expr::list_comprehension(&item, param.into(), None, Some(point(Expr::from(&item))))
                } else {
                    point(param.into())
                }
            }
            FieldKind::Primitive { .. } => Param::new(Value::from(value)).into(),
        };
        items.push(SetItem::new(var.property(field.db_name()), value));
    }

    for field in fields {
        if input.contains_key(&field.name) {
            continue;
        }
        if field.autogenerate && op == TimestampOperation::Create {
            items.push(SetItem::new(var.property(field.db_name()), random_uuid()));
        }
        if field.timestamps.contains(&op) {
            let FieldKind::Temporal { temporal } = field.kind else {
                return Err(Error::InvalidArgument(format!("{owner}.{} is not temporal", field.name)));
            };
            items.push(SetItem::new(var.property(field.db_name()), now(temporal)?));
        }
    }
    Ok(items)
}

/// The current instant in the field's temporal type.
fn now(temporal: TemporalType) -> Result<Expr> {
    let function = match temporal {
        TemporalType::DateTime => "datetime",
        TemporalType::LocalDateTime => "localdatetime",
        TemporalType::Date => "date",
        TemporalType::Time => "time",
        TemporalType::LocalTime => "localtime",
        TemporalType::Duration => return Err(Error::InvalidArgument("a Duration cannot be a timestamp".into())),
    };
    Ok(Expr::function(function, std::iter::empty()))
}
