//! `where` argument → predicate.
//!
//! Keys are `field[_OPERATOR]` plus the `AND` / `OR` / `NOT` combinators.
//! Relationship keys (`actors`, `actorsConnection`, `actorsAggregate`)
//! compare the size of a filtered pattern comprehension.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value as Json};

use super::{Context, as_list, as_object};
use crate::cypher::functions::{distance, point, size};
use crate::cypher::{
    Expr, NodePattern, NodeRef, Param, Pattern, RelPattern, RelationshipRef, Variable, and, or,
};
use crate::model::{Field, FieldKind, Node, RelationField, RelationshipProperties, ScalarType, Value};
use crate::{Error, Result};

static FILTER_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<field>[_A-Za-z][_0-9A-Za-z]*?)(?:_(?P<op>NOT_IN|NOT_INCLUDES|NOT_CONTAINS|NOT_STARTS_WITH|NOT_ENDS_WITH|NOT|IN|INCLUDES|CONTAINS|STARTS_WITH|ENDS_WITH|MATCHES|LTE|LT|GTE|GT|DISTANCE|ALL|NONE|SINGLE|SOME))?$",
    )
    .expect("valid filter key regex")
});

/// Operator suffix of a filter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Equal,
    Not,
    In,
    NotIn,
    Includes,
    NotIncludes,
    Contains,
    NotContains,
    StartsWith,
    NotStartsWith,
    EndsWith,
    NotEndsWith,
    Matches,
    Lt,
    Lte,
    Gt,
    Gte,
    Distance,
    All,
    None,
    Single,
    Some,
}

impl FilterOp {
    fn parse(op: Option<&str>) -> Self {
        match op {
            Some("NOT") => FilterOp::Not,
            Some("IN") => FilterOp::In,
            Some("NOT_IN") => FilterOp::NotIn,
            Some("INCLUDES") => FilterOp::Includes,
            Some("NOT_INCLUDES") => FilterOp::NotIncludes,
            Some("CONTAINS") => FilterOp::Contains,
            Some("NOT_CONTAINS") => FilterOp::NotContains,
            Some("STARTS_WITH") => FilterOp::StartsWith,
            Some("NOT_STARTS_WITH") => FilterOp::NotStartsWith,
            Some("ENDS_WITH") => FilterOp::EndsWith,
            Some("NOT_ENDS_WITH") => FilterOp::NotEndsWith,
            Some("MATCHES") => FilterOp::Matches,
            Some("LT") => FilterOp::Lt,
            Some("LTE") => FilterOp::Lte,
            Some("GT") => FilterOp::Gt,
            Some("GTE") => FilterOp::Gte,
            Some("DISTANCE") => FilterOp::Distance,
            Some("ALL") => FilterOp::All,
            Some("NONE") => FilterOp::None,
            Some("SINGLE") => FilterOp::Single,
            Some("SOME") => FilterOp::Some,
            _ => FilterOp::Equal,
        }
    }
}

/// Split `title_NOT_CONTAINS` into `("title", NotContains)`.
pub fn parse_filter_key(key: &str) -> Result<(&str, FilterOp)> {
    let caps = FILTER_KEY.captures(key).ok_or_else(|| Error::MalformedFilterKey(key.to_string()))?;
    let field = caps.name("field").map(|m| m.as_str()).ok_or_else(|| Error::MalformedFilterKey(key.to_string()))?;
    Ok((field, FilterOp::parse(caps.name("op").map(|m| m.as_str()))))
}

/// Predicate for a node `where` argument.
pub fn node_where(ctx: &Context<'_>, node: &Node, var: &Variable, filter: &Map<String, Json>) -> Result<Option<Expr>> {
    fields_where(ctx, &node.name, &node.fields, var, filter)
}

/// Predicate for relationship properties (`edge` in connection filters).
pub fn edge_where(
    ctx: &Context<'_>,
    props: &RelationshipProperties,
    var: &Variable,
    filter: &Map<String, Json>,
) -> Result<Option<Expr>> {
    fields_where(ctx, &props.name, &props.fields, var, filter)
}

fn fields_where(
    ctx: &Context<'_>,
    owner: &str,
    fields: &[Field],
    var: &Variable,
    filter: &Map<String, Json>,
) -> Result<Option<Expr>> {
    let mut predicates = Vec::new();

    for (key, value) in filter {
        let predicate = match key.as_str() {
            "AND" | "OR" => {
                let mut nested = Vec::new();
                for item in as_list(value) {
                    nested.push(fields_where(ctx, owner, fields, var, as_object(item, key)?)?);
                }
                if key == "AND" { and(nested) } else { or(nested) }
            }
            "NOT" => fields_where(ctx, owner, fields, var, as_object(value, key)?)?.map(Expr::not),
            _ => Some(field_predicate(ctx, owner, fields, var, key, value)?),
        };
        predicates.push(predicate);
    }

    Ok(and(predicates))
}

fn find<'f>(fields: &'f [Field], name: &str) -> Option<&'f Field> {
    fields.iter().find(|f| f.name == name)
}

fn field_predicate(
    ctx: &Context<'_>,
    owner: &str,
    fields: &[Field],
    var: &Variable,
    key: &str,
    value: &Json,
) -> Result<Expr> {
    let (name, op) = parse_filter_key(key)?;
    let unknown = || Error::UnknownField { node: owner.to_string(), field: name.to_string() };

    if let Some(field) = find(fields, name) {
        return match &field.kind {
            FieldKind::Primitive { scalar } if scalar.is_point() => point_predicate(var.property(field.db_name()), op, value),
            FieldKind::Primitive { .. } => scalar_predicate(ctx, var.property(field.db_name()), op, Value::from(value)),
            FieldKind::Temporal { temporal } => {
                let value = Value::from(value).coerce_temporal(*temporal)?;
                scalar_predicate(ctx, var.property(field.db_name()), op, value)
            }
            FieldKind::Relation(rel) | FieldKind::Union(rel) | FieldKind::Interface(rel) => {
                relationship_predicate(ctx, var, field, rel, op, value)
            }
            FieldKind::Computed(_) => Err(Error::InvalidArgument(format!("cannot filter on computed field {name}"))),
        };
    }

    if let Some(base) = name.strip_suffix("Connection") {
        let field = find(fields, base).ok_or_else(unknown)?;
        let rel = field.relationship().ok_or_else(unknown)?;
        return connection_predicate(ctx, var, field, rel, op, value);
    }

    if let Some(base) = name.strip_suffix("Aggregate") {
        let field = find(fields, base).ok_or_else(unknown)?;
        return match &field.kind {
            FieldKind::Relation(rel) => aggregate_predicate(ctx, var, rel, as_object(value, key)?),
            _ => Err(unknown()),
        };
    }

    Err(unknown())
}

fn scalar_predicate(ctx: &Context<'_>, prop: Expr, op: FilterOp, value: Value) -> Result<Expr> {
    if value.is_null() {
        return match op {
            FilterOp::Equal => Ok(prop.is_null()),
            FilterOp::Not => Ok(prop.is_not_null()),
            _ => Err(Error::InvalidArgument(format!("null is only valid with equality, got {op:?}"))),
        };
    }

    let param = Expr::from(Param::new(value));
    let predicate = match op {
        FilterOp::Equal => prop.eq(param),
        FilterOp::Not => prop.eq(param).not(),
        FilterOp::In => prop.in_list(param),
        FilterOp::NotIn => prop.in_list(param).not(),
        FilterOp::Includes => param.in_list(prop),
        FilterOp::NotIncludes => param.in_list(prop).not(),
        FilterOp::Contains => prop.contains(param),
        FilterOp::NotContains => prop.contains(param).not(),
        FilterOp::StartsWith => prop.starts_with(param),
        FilterOp::NotStartsWith => prop.starts_with(param).not(),
        FilterOp::EndsWith => prop.ends_with(param),
        FilterOp::NotEndsWith => prop.ends_with(param).not(),
        FilterOp::Matches if ctx.config.enable_regex => prop.matches(param),
        FilterOp::Matches => {
            return Err(Error::InvalidArgument("_MATCHES filters require enableRegex".into()));
        }
        FilterOp::Lt => prop.lt(param),
        FilterOp::Lte => prop.lte(param),
        FilterOp::Gt => prop.gt(param),
        FilterOp::Gte => prop.gte(param),
        FilterOp::Distance | FilterOp::All | FilterOp::None | FilterOp::Single | FilterOp::Some => {
            return Err(Error::InvalidArgument(format!("{op:?} is not valid on a scalar field")));
        }
    };
    Ok(predicate)
}

/// Point fields compare against `point($param)`; distance filters take
/// `{ point, distance }`.
fn point_predicate(prop: Expr, op: FilterOp, value: &Json) -> Result<Expr> {
    if value.is_null() {
        return match op {
            FilterOp::Equal => Ok(prop.is_null()),
            FilterOp::Not => Ok(prop.is_not_null()),
            _ => Err(Error::InvalidArgument(format!("null is only valid with equality, got {op:?}"))),
        };
    }

    let param = Param::new(Value::from(value));
    let as_points = || {
        let p = Variable::new();
        Expr::list_comprehension(&p, Expr::from(&param), None, Some(point(Expr::from(&p))))
    };
    let within = |p: &Param| distance(prop.clone(), point(p.property("point")));

    let predicate = match op {
        FilterOp::Equal => prop.eq(point(Expr::from(&param))),
        FilterOp::Not => prop.eq(point(Expr::from(&param))).not(),
        FilterOp::In => prop.in_list(as_points()),
        FilterOp::NotIn => prop.in_list(as_points()).not(),
        FilterOp::Includes => point(Expr::from(&param)).in_list(prop),
        FilterOp::NotIncludes => point(Expr::from(&param)).in_list(prop).not(),
        FilterOp::Lt => within(&param).lt(param.property("distance")),
        FilterOp::Lte => within(&param).lte(param.property("distance")),
        FilterOp::Gt => within(&param).gt(param.property("distance")),
        FilterOp::Gte => within(&param).gte(param.property("distance")),
        FilterOp::Distance => within(&param).eq(param.property("distance")),
        other => return Err(Error::InvalidArgument(format!("{other:?} is not valid on a point field"))),
    };
    Ok(predicate)
}

/// One `(parent)-[r]->(member)` traversal with its filter.
struct Traversal {
    pattern: Pattern,
    predicate: Option<Expr>,
}

/// Compare the number of matching related nodes:
/// `size([pattern WHERE pred | 1]) > 0` and friends. `ALL` counts the
/// non-matching ones instead.
fn quantify(traversals: Vec<Traversal>, op: FilterOp) -> Result<Expr> {
    let negate = op == FilterOp::All;
    let mut count: Option<Expr> = None;
    for t in traversals {
        let predicate = match (negate, t.predicate) {
            (true, Some(p)) => Some(p.not()),
            (true, None) => Some(Expr::literal(false)),
            (false, p) => p,
        };
        let term = size(Expr::pattern_comprehension(t.pattern, predicate, Expr::literal(1)));
        count = Some(match count {
            Some(acc) => acc.add(term),
            None => term,
        });
    }
    let count = count.ok_or_else(|| Error::InvalidArgument("relationship filter selects no member types".into()))?;

    Ok(match op {
        FilterOp::Equal | FilterOp::Some => count.gt(Expr::literal(0)),
        FilterOp::Not | FilterOp::None | FilterOp::All => count.eq(Expr::literal(0)),
        FilterOp::Single => count.eq(Expr::literal(1)),
        other => return Err(Error::InvalidArgument(format!("{other:?} is not valid on a relationship field"))),
    })
}

/// Member node types of a relationship field paired with the filter for
/// each. Union filters are keyed by member name; interface filters apply to
/// every implementation.
pub(crate) fn member_filters<'a, 'j>(
    ctx: &Context<'a>,
    field: &Field,
    rel: &RelationField,
    value: &'j Json,
) -> Result<Vec<(&'a Node, Option<&'j Map<String, Json>>)>> {
    match &field.kind {
        FieldKind::Union(_) => {
            let Some(map) = value.as_object() else {
                return rel.members.iter().map(|m| Ok((ctx.schema.node(m)?, None))).collect();
            };
            let mut out = Vec::new();
            for (member, filter) in map {
                if !rel.members.contains(member) {
                    return Err(Error::UnknownField { node: rel.target.clone(), field: member.clone() });
                }
                out.push((ctx.schema.node(member)?, Some(as_object(filter, member)?)));
            }
            Ok(out)
        }
        FieldKind::Interface(_) => rel
            .members
            .iter()
            .map(|m| Ok((ctx.schema.node(m)?, value.as_object())))
            .collect(),
        _ => Ok(vec![(ctx.schema.node(&rel.target)?, value.as_object())]),
    }
}

fn relationship_predicate(
    ctx: &Context<'_>,
    var: &Variable,
    field: &Field,
    rel: &RelationField,
    op: FilterOp,
    value: &Json,
) -> Result<Expr> {
    if value.is_null() && !matches!(op, FilterOp::Equal | FilterOp::Not) {
        return Err(Error::InvalidArgument(format!("null is only valid with equality on {}", field.name)));
    }

    let direction = super::pattern_direction(rel.direction);
    let mut traversals = Vec::new();
    for (member, filter) in member_filters(ctx, field, rel, value)? {
        let child = NodeRef::new(member.labels());
        let pattern = Pattern::new(NodePattern::var(var))
            .related(RelPattern::anonymous(&rel.rel_type, direction), NodePattern::new(&child));
        let predicate = match filter {
            Some(filter) => node_where(ctx, member, &child.var, filter)?,
            None => None,
        };
        traversals.push(Traversal { pattern, predicate });
    }

    // `actors: null` means "has none".
    let op = match (value.is_null(), op) {
        (true, FilterOp::Equal) => FilterOp::None,
        (true, FilterOp::Not) => FilterOp::Some,
        (_, op) => op,
    };
    quantify(traversals, op)
}

fn connection_predicate(
    ctx: &Context<'_>,
    var: &Variable,
    field: &Field,
    rel: &RelationField,
    op: FilterOp,
    value: &Json,
) -> Result<Expr> {
    if value.is_null() && !matches!(op, FilterOp::Equal | FilterOp::Not) {
        return Err(Error::InvalidArgument(format!("null is only valid with equality on {}Connection", field.name)));
    }

    let direction = super::pattern_direction(rel.direction);
    let props = rel.properties.as_deref().and_then(|p| ctx.schema.relationship(p));
    let mut traversals = Vec::new();
    for (member, filter) in member_filters(ctx, field, rel, value)? {
        let child = NodeRef::new(member.labels());
        let relationship = RelationshipRef::new(&rel.rel_type);
        let pattern = Pattern::new(NodePattern::var(var))
            .related(RelPattern::new(&relationship, direction), NodePattern::new(&child));
        let predicate = match filter {
            Some(filter) => connection_where(ctx, member, &child.var, props, &relationship.var, filter)?,
            None => None,
        };
        traversals.push(Traversal { pattern, predicate });
    }

    let op = match (value.is_null(), op) {
        (true, FilterOp::Equal) => FilterOp::None,
        (true, FilterOp::Not) => FilterOp::Some,
        (_, op) => op,
    };
    quantify(traversals, op)
}

/// `{ node, edge, AND, OR, NOT }` filter of a connection.
pub(crate) fn connection_where(
    ctx: &Context<'_>,
    node: &Node,
    node_var: &Variable,
    props: Option<&RelationshipProperties>,
    rel_var: &Variable,
    filter: &Map<String, Json>,
) -> Result<Option<Expr>> {
    let mut predicates = Vec::new();
    for (key, value) in filter {
        let predicate = match key.as_str() {
            "node" => node_where(ctx, node, node_var, as_object(value, key)?)?,
            "node_NOT" => node_where(ctx, node, node_var, as_object(value, key)?)?.map(Expr::not),
            "edge" | "edge_NOT" => {
                let props = props.ok_or_else(|| Error::InvalidArgument("relationship has no properties".into()))?;
                let predicate = edge_where(ctx, props, rel_var, as_object(value, key)?)?;
                if key == "edge_NOT" { predicate.map(Expr::not) } else { predicate }
            }
            "AND" | "OR" => {
                let mut nested = Vec::new();
                for item in as_list(value) {
                    nested.push(connection_where(ctx, node, node_var, props, rel_var, as_object(item, key)?)?);
                }
                if key == "AND" { and(nested) } else { or(nested) }
            }
            "NOT" => connection_where(ctx, node, node_var, props, rel_var, as_object(value, key)?)?.map(Expr::not),
            other => return Err(Error::MalformedFilterKey(other.to_string())),
        };
        predicates.push(predicate);
    }
    Ok(and(predicates))
}

/// `actorsAggregate: { count, count_LT, ... }`
fn aggregate_predicate(
    ctx: &Context<'_>,
    var: &Variable,
    rel: &RelationField,
    filter: &Map<String, Json>,
) -> Result<Expr> {
    let target = ctx.schema.node(&rel.target)?;
    let pattern = Pattern::new(NodePattern::var(var)).related(
        RelPattern::anonymous(&rel.rel_type, super::pattern_direction(rel.direction)),
        NodePattern::anonymous(target.labels()),
    );
    let count = || size(Expr::pattern_comprehension(pattern.clone(), None, Expr::literal(1)));

    let mut predicates = Vec::new();
    for (key, value) in filter {
        let predicate = match key.as_str() {
            "AND" | "OR" => {
                let mut nested = Vec::new();
                for item in as_list(value) {
                    nested.push(Some(aggregate_predicate(ctx, var, rel, as_object(item, key)?)?));
                }
                if key == "AND" { and(nested) } else { or(nested) }
            }
            "count" => Some(count().eq(Param::new(Value::from(value)))),
            "count_LT" => Some(count().lt(Param::new(Value::from(value)))),
            "count_LTE" => Some(count().lte(Param::new(Value::from(value)))),
            "count_GT" => Some(count().gt(Param::new(Value::from(value)))),
            "count_GTE" => Some(count().gte(Param::new(Value::from(value)))),
            other => {
                return Err(Error::InvalidArgument(format!("unsupported aggregation filter {other}")));
            }
        };
        predicates.push(predicate);
    }
    and(predicates).ok_or_else(|| Error::InvalidArgument("empty aggregation filter".into()))
}
