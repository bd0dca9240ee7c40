//! # Translation
//!
//! Walks a resolved GraphQL field tree against the [`Schema`] and builds
//! one clause tree per root field. Every builder here returns clauses; text
//! is produced once, by [`crate::cypher::build`].

pub mod aggregate;
pub mod auth;
pub mod connection;
pub mod create;
pub mod delete;
pub mod projection;
pub mod read;
pub mod subscriptions;
pub mod update;
pub mod where_clause;

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as Json};
use tracing::{debug, trace};

use crate::config::Config;
use crate::cypher::{self, CypherResult, Expr, Order, Param, PatternDirection, Projection, Variable};
use crate::model::{AuthContext, Direction, Field, FieldKind, Node, RelationField, RootOperation, Schema, Value};
use crate::{Error, Result};

// ============================================================================
// Resolve tree
// ============================================================================

/// One selected field with its arguments and sub-selections, keyed by the
/// GraphQL type they were selected on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveTree {
    pub name: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub args: Map<String, Json>,
    /// Accepts either `{ Type: { alias: tree } }` or `{ Type: [tree] }`.
    #[serde(default, deserialize_with = "fields_by_type_name")]
    pub fields_by_type_name: BTreeMap<String, Vec<ResolveTree>>,
}

fn fields_by_type_name<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, Vec<ResolveTree>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Json>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(type_name, fields)| {
            let items: Vec<Json> = match fields {
                Json::Array(items) => items,
                Json::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
                other => return Err(D::Error::custom(format!("invalid selection for {type_name}: {other}"))),
            };
            let trees = items
                .into_iter()
                .map(serde_json::from_value)
                .collect::<std::result::Result<Vec<ResolveTree>, _>>()
                .map_err(D::Error::custom)?;
            Ok((type_name, trees))
        })
        .collect()
}

impl ResolveTree {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: Json) -> Self {
        self.args.insert(key.into(), value);
        self
    }

    pub fn with_fields(mut self, type_name: impl Into<String>, fields: impl IntoIterator<Item = ResolveTree>) -> Self {
        self.fields_by_type_name.entry(type_name.into()).or_default().extend(fields);
        self
    }

    /// Response key.
    pub fn alias(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn arg(&self, key: &str) -> Option<&Json> {
        self.args.get(key).filter(|v| !v.is_null())
    }

    /// Fields selected on any of `type_names`, first selection per alias wins.
    pub fn fields_for(&self, type_names: &[&str]) -> Vec<&ResolveTree> {
        let mut out: Vec<&ResolveTree> = Vec::new();
        for type_name in type_names {
            for field in self.fields_by_type_name.get(*type_name).into_iter().flatten() {
                if !out.iter().any(|f| f.alias() == field.alias()) {
                    out.push(field);
                }
            }
        }
        out
    }

    /// Every selected field regardless of type.
    pub fn children(&self) -> Vec<&ResolveTree> {
        let names: Vec<&str> = self.fields_by_type_name.keys().map(String::as_str).collect();
        self.fields_for(&names)
    }

    pub fn child(&self, name: &str) -> Option<&ResolveTree> {
        self.children().into_iter().find(|f| f.name == name)
    }
}

// ============================================================================
// Context
// ============================================================================

/// Per-request translation context.
#[derive(Debug, Clone)]
pub struct Context<'a> {
    pub schema: &'a Schema,
    pub auth: &'a AuthContext,
    pub config: &'a Config,
    auth_param: Param,
}

impl<'a> Context<'a> {
    pub fn new(schema: &'a Schema, auth: &'a AuthContext, config: &'a Config) -> Self {
        Self { schema, auth, config, auth_param: Param::named("auth", auth.to_param_value()) }
    }

    /// `$auth`, holding `{ isAuthenticated, roles, jwt, context }`.
    pub fn auth_param(&self) -> Expr {
        Expr::from(&self.auth_param)
    }
}

// ============================================================================
// Entry point
// ============================================================================

/// Translate one root field into query text and parameters.
pub fn translate(ctx: &Context<'_>, tree: &ResolveTree) -> Result<CypherResult> {
    let (node, op) = ctx
        .schema
        .node_for_root_field(&tree.name)
        .ok_or_else(|| Error::UnknownField { node: "root".into(), field: tree.name.clone() })?;

    let clause = match op {
        RootOperation::Read => read::translate_read(ctx, node, tree)?,
        RootOperation::Connection => connection::translate_root_connection(ctx, node, tree)?,
        RootOperation::Aggregate => aggregate::translate_root_aggregate(ctx, node, tree)?,
        RootOperation::Create => create::translate_create(ctx, node, tree)?,
        RootOperation::Update => update::translate_update(ctx, node, tree)?,
        RootOperation::Delete => delete::translate_delete(ctx, node, tree)?,
    };

    let result = cypher::build(&clause)?;
    debug!(
        operation = ?op,
        node = %node.name,
        query_len = result.cypher.len(),
        params = result.params.len(),
        "Translated GraphQL operation"
    );
    trace!(cypher = %result.cypher);
    Ok(result)
}

// ============================================================================
// Shared helpers
// ============================================================================

pub(crate) fn pattern_direction(direction: Direction) -> PatternDirection {
    match direction {
        Direction::Outgoing => PatternDirection::Right,
        Direction::Incoming => PatternDirection::Left,
    }
}

pub(crate) fn as_object<'j>(value: &'j Json, what: &str) -> Result<&'j Map<String, Json>> {
    value.as_object().ok_or_else(|| Error::InvalidArgument(format!("{what} must be an object")))
}

/// A single input object or a list of them.
pub(crate) fn as_list(value: &Json) -> Vec<&Json> {
    match value {
        Json::Array(items) => items.iter().collect(),
        Json::Null => Vec::new(),
        other => vec![other],
    }
}

/// `options: { sort, limit, offset }` of a list field.
#[derive(Debug, Default)]
pub(crate) struct ListOptions {
    pub sort: Vec<(String, Order)>,
    pub limit: Option<Value>,
    pub offset: Option<Value>,
}

impl ListOptions {
    pub fn from_args(tree: &ResolveTree) -> Result<Self> {
        let Some(options) = tree.arg("options") else {
            return Ok(Self::default());
        };
        let options = as_object(options, "options")?;
        Ok(Self {
            sort: parse_sort(options.get("sort"))?,
            limit: options.get("limit").filter(|v| !v.is_null()).map(Value::from),
            offset: options.get("offset").filter(|v| !v.is_null()).map(Value::from),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.sort.is_empty() && self.limit.is_none() && self.offset.is_none()
    }

    /// Apply ORDER BY / SKIP / LIMIT to a projection; `key` maps a sort
    /// field to the expression sorted on.
    pub fn apply(&self, projection: Projection, key: impl Fn(&str) -> Expr) -> Projection {
        let mut projection = projection
            .skip(self.offset.clone().map(|v| Param::new(v).into()))
            .limit(self.limit.clone().map(|v| Param::new(v).into()));
        for (field, order) in &self.sort {
            projection = projection.order_by(key(field), *order);
        }
        projection
    }
}

/// `[{ title: ASC }, { year: DESC }]`
pub(crate) fn parse_sort(sort: Option<&Json>) -> Result<Vec<(String, Order)>> {
    let mut out = Vec::new();
    for entry in sort.map(as_list).unwrap_or_default() {
        for (field, direction) in as_object(entry, "sort")? {
            let order = match direction.as_str() {
                Some("ASC") => Order::Asc,
                Some("DESC") => Order::Desc,
                _ => return Err(Error::InvalidArgument(format!("invalid sort direction for {field}: {direction}"))),
            };
            out.push((field.clone(), order));
        }
    }
    Ok(out)
}

/// Mutation input under a relationship key, split per target node.
///
/// Union and interface inputs are keyed by member (`{ Movie: {...} }`);
/// the member name is returned so nested variable names stay distinct.
pub(crate) fn member_inputs<'a, 'j>(
    ctx: &Context<'a>,
    field: &Field,
    rel: &RelationField,
    value: &'j Json,
) -> Result<Vec<(&'a Node, Option<&'j str>, &'j Json)>> {
    if let FieldKind::Relation(_) = field.kind {
        return Ok(vec![(ctx.schema.node(&rel.target)?, None, value)]);
    }
    let mut out = Vec::new();
    for (member, input) in as_object(value, &field.name)? {
        if !rel.members.contains(member) {
            return Err(Error::UnknownField { node: rel.target.clone(), field: member.clone() });
        }
        out.push((ctx.schema.node(member)?, Some(member.as_str()), input));
    }
    Ok(out)
}

/// `{parent}_{field}[_{Member}]`
pub(crate) fn chain_name(parent: &str, field: &Field, member: Option<&str>) -> String {
    match member {
        Some(member) => format!("{parent}_{}_{member}", field.name),
        None => format!("{parent}_{}", field.name),
    }
}

/// `WITH a, b[, meta]`: the variables a write chain keeps in scope.
pub(crate) fn carry(scope: &[Variable], meta: Option<&Variable>) -> cypher::Clause {
    cypher::Clause::with(Projection::of(scope.iter().chain(meta)))
}

/// Property expression for a field of `node`, honouring `@alias`.
pub(crate) fn node_property(node: &Node, var: &Variable, field: &str) -> Expr {
    let db_name = node.field(field).map(|f| f.db_name()).unwrap_or(field);
    var.property(db_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_tree_from_keyed_json() {
        let tree: ResolveTree = serde_json::from_value(json!({
            "name": "movies",
            "alias": "movies",
            "args": { "where": { "title": "Matrix" } },
            "fieldsByTypeName": {
                "Movie": {
                    "title": { "name": "title", "alias": "title", "args": {}, "fieldsByTypeName": {} },
                    "name": { "name": "title", "alias": "name", "args": {}, "fieldsByTypeName": {} },
                    "year": { "name": "year", "alias": "year", "args": {}, "fieldsByTypeName": {} }
                }
            }
        }))
        .unwrap();

        let aliases: Vec<&str> = tree.fields_for(&["Movie"]).iter().map(|f| f.alias()).collect();
        assert_eq!(aliases, vec!["title", "name", "year"]);
        assert!(tree.arg("where").is_some());
        assert!(tree.arg("options").is_none());
    }

    #[test]
    fn test_fields_for_dedupes_by_alias() {
        let tree = ResolveTree::new("search")
            .with_fields("Production", [ResolveTree::new("title")])
            .with_fields("Movie", [ResolveTree::new("title"), ResolveTree::new("runtime")]);
        let aliases: Vec<&str> = tree.fields_for(&["Movie", "Production"]).iter().map(|f| f.alias()).collect();
        assert_eq!(aliases, vec!["title", "runtime"]);
    }

    #[test]
    fn test_list_options() {
        let tree = ResolveTree::new("movies")
            .with_arg("options", json!({ "sort": [{ "title": "DESC" }], "limit": 10 }));
        let options = ListOptions::from_args(&tree).unwrap();
        assert_eq!(options.sort, vec![("title".to_string(), Order::Desc)]);
        assert_eq!(options.limit, Some(Value::Int(10)));
        assert!(options.offset.is_none());

        let bad = ResolveTree::new("movies").with_arg("options", json!({ "sort": [{ "title": "UP" }] }));
        assert!(matches!(ListOptions::from_args(&bad), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_union_input_split_by_member() {
        use crate::model::ScalarType;

        let schema = Schema::new()
            .with_node(Node::new("Movie").with_fields([Field::scalar("title", ScalarType::String)]))
            .with_node(Node::new("Series").with_fields([Field::scalar("title", ScalarType::String)]))
            .with_node(Node::new("Actor").with_fields([Field::union(
                "actedIn",
                RelationField::new("ACTED_IN", Direction::Outgoing, "Production").with_members(["Movie", "Series"]),
            )]));
        let auth = AuthContext::anonymous();
        let config = Config::default();
        let ctx = Context::new(&schema, &auth, &config);
        let (field, rel) = schema.node("Actor").unwrap().relation_field("actedIn").unwrap();

        let input = json!({ "Series": [{ "node": { "title": "Dark" } }] });
        let split = member_inputs(&ctx, field, rel, &input).unwrap();
        assert_eq!(split.len(), 1);
        assert_eq!(split[0].0.name, "Series");
        assert_eq!(chain_name("this", field, split[0].1), "this_actedIn_Series");

        let unknown = json!({ "Book": [] });
        assert!(matches!(member_inputs(&ctx, field, rel, &unknown), Err(Error::UnknownField { .. })));
    }

    #[test]
    fn test_carry_keeps_meta_last() {
        let scope = [Variable::named("this"), Variable::named("this_actors0")];
        let meta = Variable::named("meta");
        let clause = carry(&scope, Some(&meta));
        assert_eq!(cypher::build(&clause).unwrap().cypher, "WITH this, this_actors0, meta");
    }
}
