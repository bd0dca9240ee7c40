//! Selection set → map projection.
//!
//! Stored fields project inline (`this { .title }`). Relation and
//! connection fields each become a `CALL` subquery that runs before the
//! projection and binds one result variable.

use serde_json::Value as Json;

use super::auth::{auth_allow, auth_where};
use super::where_clause::{member_filters, node_where};
use super::{Context, ListOptions, ResolveTree, aggregate, connection, node_property};
use crate::cypher::functions::{collect, head, iso_datetime};
use crate::cypher::{
    ApocMode, ApocRun, Call, Clause, Expr, MapEntry, Match, NodePattern, NodeRef, Param, Pattern, Projection,
    RelPattern, Variable, and, concat,
};
use crate::model::{AuthOperation, ComputedField, Field, FieldKind, Node, RelationField, TemporalType, Value};
use crate::{Error, Result};

/// Map entries for one node plus the subqueries they depend on.
#[derive(Debug, Default)]
pub(crate) struct ProjectionResult {
    pub entries: Vec<MapEntry>,
    pub subqueries: Vec<Clause>,
}

impl ProjectionResult {
    fn has(&self, key: &str) -> bool {
        self.entries.iter().any(|entry| match entry {
            MapEntry::Shorthand(k) | MapEntry::Pair(k, _) => k == key,
            MapEntry::All => true,
        })
    }

    /// Add `key: expr` unless the key is already projected. Sort fields
    /// must be present in the projected map.
    pub fn ensure(&mut self, key: &str, expr: Expr) {
        if !self.has(key) {
            self.entries.push(MapEntry::Pair(key.to_string(), expr));
        }
    }

    pub fn into_parts(self, var: &Variable) -> (Expr, Vec<Clause>) {
        (Expr::projection(var, self.entries), self.subqueries)
    }
}

/// Project the selected `fields` of `node` bound to `var`.
pub(crate) fn project_node(
    ctx: &Context<'_>,
    node: &Node,
    var: &Variable,
    fields: &[&ResolveTree],
) -> Result<ProjectionResult> {
    let mut result = ProjectionResult::default();

    for selection in fields {
        let alias = selection.alias();
        if selection.name == "__typename" {
            result.entries.push(MapEntry::Pair(alias.to_string(), Expr::string(node.name.as_str())));
            continue;
        }

        if let Some(field) = node.field(&selection.name) {
            let entry = match &field.kind {
                FieldKind::Primitive { .. } | FieldKind::Temporal { .. } => stored_entry(field, var, alias),
                FieldKind::Computed(computed) => {
                    MapEntry::Pair(alias.to_string(), computed_value(ctx, var, field, computed, selection)?)
                }
                FieldKind::Relation(rel) | FieldKind::Union(rel) | FieldKind::Interface(rel) => {
                    let (subquery, value) = relation_subquery(ctx, var, field, rel, selection)?;
                    result.subqueries.push(subquery);
                    MapEntry::Pair(alias.to_string(), Expr::from(&value))
                }
            };
            result.entries.push(entry);
        } else if let Some((field, rel)) = node.connection_field(&selection.name) {
            let (subquery, value) = connection::connection_subquery(ctx, var, field, rel, selection)?;
            result.subqueries.push(subquery);
            result.entries.push(MapEntry::Pair(alias.to_string(), Expr::from(&value)));
        } else if let Some((_, rel)) = node.aggregate_field(&selection.name) {
            let value = aggregate::field_aggregate(ctx, var, rel, selection)?;
            result.entries.push(MapEntry::Pair(alias.to_string(), value));
        } else {
            return Err(Error::UnknownField { node: node.name.clone(), field: selection.name.clone() });
        }
    }

    Ok(result)
}

/// Value of a stored field, formatting points and datetimes for output.
pub(crate) fn stored_value(field: &Field, var: &Variable) -> Expr {
    let property = var.property(field.db_name());
    let format: Option<fn(Expr) -> Expr> = match &field.kind {
        FieldKind::Primitive { scalar } if scalar.is_point() => Some(point_value),
        FieldKind::Temporal { temporal: TemporalType::DateTime } => Some(iso_datetime),
        _ => None,
    };
    match format {
        Some(format) if field.list => {
            let item = Variable::new();
            Expr::list_comprehension(&item, property, None, Some(format(Expr::from(&item))))
        }
        Some(format) => format(property),
        None => property,
    }
}

fn stored_entry(field: &Field, var: &Variable, alias: &str) -> MapEntry {
    let plain = match &field.kind {
        FieldKind::Primitive { scalar } => !scalar.is_point(),
        FieldKind::Temporal { temporal } => *temporal != TemporalType::DateTime,
        _ => false,
    };
    if plain && alias == field.db_name() {
        MapEntry::Shorthand(alias.to_string())
    } else {
        MapEntry::Pair(alias.to_string(), stored_value(field, var))
    }
}

/// `CASE WHEN p IS NOT NULL THEN { point: p, crs: p.crs } ELSE NULL END`
fn point_value(point: Expr) -> Expr {
    Expr::case(
        vec![(
            point.clone().is_not_null(),
            Expr::map([("point", point.clone()), ("crs", point.property("crs"))]),
        )],
        Some(Expr::null()),
    )
}

/// `@cypher` field: the statement runs with `this`, `auth` and the field
/// arguments bound.
fn computed_value(
    ctx: &Context<'_>,
    var: &Variable,
    field: &Field,
    computed: &ComputedField,
    selection: &ResolveTree,
) -> Result<Expr> {
    let many = field.list || computed.returns_node.is_some();
    let mode = if many { ApocMode::Many } else { ApocMode::Single };

    let mut run = ApocRun::raw(mode, computed.statement.as_str()).arg("this", var).arg("auth", ctx.auth_param());
    for (name, value) in &selection.args {
        run = run.arg(name.as_str(), Param::new(Value::from(value)));
    }
    let value = Expr::apoc(run);

    let Some(target) = &computed.returns_node else {
        return Ok(value);
    };
    let target = ctx.schema.node(target)?;
    let item = Variable::new();
    let mut entries = Vec::new();
    for selected in selection.fields_for(&[target.name.as_str()]) {
        match target.field(&selected.name) {
            Some(f) if f.is_stored() => entries.push(stored_entry(f, &item, selected.alias())),
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "{}.{} returns {}; only its stored fields can be selected",
                    field.name, selected.name, target.name
                )));
            }
        }
    }
    let projected = Expr::list_comprehension(&item, value, None, Some(Expr::projection(&item, entries)));
    Ok(if field.list { projected } else { head(projected) })
}

/// ```text
/// CALL {
///   WITH this
///   MATCH (this)-[:ACTED_IN]->(this0:Actor)
///   WITH this0 { .name } AS var1
///   RETURN collect(var1) AS var1
/// }
/// ```
///
/// Union and interface fields match each member in its own `UNION` branch
/// tagged with `__resolveType`.
fn relation_subquery(
    ctx: &Context<'_>,
    parent: &Variable,
    field: &Field,
    rel: &RelationField,
    selection: &ResolveTree,
) -> Result<(Clause, Variable)> {
    let options = ListOptions::from_args(selection)?;
    let result = Variable::new();
    let polymorphic = !matches!(field.kind, FieldKind::Relation(_));
    let direction = super::pattern_direction(rel.direction);
    let null = Json::Null;

    let mut branches = Vec::new();
    for (member, filter) in member_filters(ctx, field, rel, selection.arg("where").unwrap_or(&null))? {
        let child = NodeRef::new(member.labels());
        let pattern = Pattern::new(NodePattern::var(parent))
            .related(RelPattern::anonymous(rel.rel_type.as_str(), direction), NodePattern::new(&child));
        let filter = match filter {
            Some(filter) => node_where(ctx, member, &child.var, filter)?,
            None => None,
        };
        let predicate = and([
            filter,
            auth_where(ctx, member, &child.var, AuthOperation::Read)?,
            auth_allow(ctx, member, &child.var, AuthOperation::Read)?,
        ]);

        let fields = selection.fields_for(&[member.name.as_str(), rel.target.as_str()]);
        let mut projection = project_node(ctx, member, &child.var, &fields)?;
        if polymorphic {
            projection
                .entries
                .insert(0, MapEntry::Pair("__resolveType".into(), Expr::string(member.name.as_str())));
        }
        for (key, _) in &options.sort {
            projection.ensure(key, node_property(member, &child.var, key));
        }
        let (map, subqueries) = projection.into_parts(&child.var);

        let mut projected = Projection::new().alias(map, &result);
        if !polymorphic {
            projected = options.apply(projected, |key| result.property(key));
        }

        branches.push(concat(
            std::iter::once(Some(Clause::from(Match::new(pattern).and_where(predicate))))
                .chain(subqueries.into_iter().map(Some))
                .chain([Some(Clause::with(projected))]),
        ));
    }

    let collected = if field.list { collect(&result) } else { head(collect(&result)) };
    let ret = Clause::ret(Projection::new().alias(collected, &result));

    let body = if polymorphic {
        let union = Clause::Union(
            branches
                .into_iter()
                .map(|branch| {
                    concat([
                        Some(Clause::with(Projection::new().star())),
                        Some(branch),
                        Some(Clause::ret(Projection::of([&result]))),
                    ])
                })
                .collect(),
        );
        let sorted = (!options.is_empty())
            .then(|| Clause::with(options.apply(Projection::of([&result]), |key| result.property(key))));
        concat([Some(Clause::from(Call::new(union))), sorted, Some(ret)])
    } else {
        concat(branches.into_iter().map(Some).chain([Some(ret)]))
    };

    Ok((Call::new(body).import_with([parent])?.into(), result))
}
