//! `deleteMovies(where, delete)`
//!
//! Nested deletes run depth-first: each level matches its children,
//! recurses into them, then collects and detaches them before handing
//! control back to its parent.

use serde_json::Value as Json;

use super::auth::{auth_allow, auth_where};
use super::read::match_source;
use super::subscriptions::{append, delete_event, init_meta};
use super::where_clause::connection_where;
use super::{Context, ResolveTree, as_list, as_object, carry, chain_name, member_inputs, subscriptions};
use crate::cypher::functions::{collect, collect_distinct, count_star};
use crate::cypher::{
    Call, Clause, Delete, Expr, Match, NodePattern, NodeRef, Pattern, Projection, RelPattern, RelationshipRef,
    Unwind, Variable, and, concat,
};
use crate::model::{AuthOperation, Node, RelationField};
use crate::{Error, Result};

/// ```text
/// MATCH (this:Movie)
/// WHERE this.title = $param0
/// <nested deletes>
/// DETACH DELETE this
/// ```
pub fn translate_delete(ctx: &Context<'_>, node: &Node, tree: &ResolveTree) -> Result<Clause> {
    let this = NodeRef::named("this", node.labels());
    let meta = ctx.config.subscriptions.then(subscriptions::meta);
    let scope = [this.var.clone()];

    let mut clauses: Vec<Clause> = meta.iter().map(init_meta).collect();
    clauses.push(match_source(ctx, node, &this, tree, AuthOperation::Delete)?);
    if let Some(meta) = &meta {
        clauses.push(append(meta, delete_event(&this.var, &node.name), &scope));
    }
    if let Some(input) = tree.arg("delete") {
        clauses.extend(delete_relations(ctx, node, &this.var, "this", input, &scope, meta.as_ref())?);
    }
    clauses.push(Delete::detach([&this.var]).into());

    if let Some(meta) = &meta {
        let acc = Variable::new();
        let item = Variable::new();
        clauses.push(Clause::with(Projection::new().alias(collect(meta), meta)));
        clauses.push(Clause::with(Projection::new().alias(
            Expr::reduce(&acc, Expr::List(Vec::new()), &item, Expr::from(meta), Expr::from(&acc).add(&item)),
            meta,
        )));
        clauses.push(Clause::ret(Projection::of([meta])));
    }
    Ok(concat(clauses.into_iter().map(Some)))
}

/// `delete: { actors: [{ where, delete }] }` under the node bound to
/// `parent`.
pub(crate) fn delete_relations(
    ctx: &Context<'_>,
    node: &Node,
    parent: &Variable,
    parent_name: &str,
    input: &Json,
    scope: &[Variable],
    meta: Option<&Variable>,
) -> Result<Vec<Clause>> {
    let mut clauses = Vec::new();
    for (key, value) in as_object(input, "delete")? {
        let (field, rel) = node
            .relation_field(key)
            .ok_or_else(|| Error::UnknownField { node: node.name.clone(), field: key.clone() })?;
        for (member, segment, items) in member_inputs(ctx, field, rel, value)? {
            let base = chain_name(parent_name, field, segment);
            for (j, item) in as_list(items).into_iter().enumerate() {
                let name = format!("{base}{j}");
                clauses.extend(nested_delete(ctx, parent, rel, member, &name, item, scope, meta)?);
            }
        }
    }
    Ok(clauses)
}

/// ```text
/// WITH this
/// OPTIONAL MATCH (this)<-[this_actors0_relationship:ACTED_IN]-(this_actors0:Actor)
/// WHERE this_actors0.name = $param1
/// <deletes nested under this_actors0>
/// WITH this, collect(DISTINCT this_actors0) AS this_actors0_to_delete
/// CALL {
///   WITH this_actors0_to_delete
///   UNWIND this_actors0_to_delete AS x
///   DETACH DELETE x
///   RETURN count(*) AS _
/// }
/// ```
#[allow(clippy::too_many_arguments)]
pub(crate) fn nested_delete(
    ctx: &Context<'_>,
    parent: &Variable,
    rel: &RelationField,
    member: &Node,
    name: &str,
    input: &Json,
    scope: &[Variable],
    meta: Option<&Variable>,
) -> Result<Vec<Clause>> {
    let input = as_object(input, "delete")?;
    let child = NodeRef::named(name, member.labels());
    let relationship = RelationshipRef::named(format!("{name}_relationship"), rel.rel_type.as_str());
    let props = rel.properties.as_deref().and_then(|p| ctx.schema.relationship(p));

    let filter = match input.get("where").filter(|w| !w.is_null()) {
        Some(filter) => {
            connection_where(ctx, member, &child.var, props, &relationship.var, as_object(filter, "where")?)?
        }
        None => None,
    };
    let predicate = and([
        filter,
        auth_where(ctx, member, &child.var, AuthOperation::Delete)?,
        auth_allow(ctx, member, &child.var, AuthOperation::Delete)?,
    ]);
    let pattern = Pattern::new(NodePattern::var(parent)).related(
        RelPattern::new(&relationship, super::pattern_direction(rel.direction)),
        NodePattern::new(&child),
    );

    let mut clauses = vec![carry(scope, meta), Match::optional(pattern).and_where(predicate).into()];

    if let Some(nested) = input.get("delete").filter(|d| !d.is_null()) {
        let mut inner = scope.to_vec();
        inner.push(child.var.clone());
        clauses.extend(delete_relations(ctx, member, &child.var, name, nested, &inner, meta)?);
    }

    let to_delete = Variable::named(format!("{name}_to_delete"));
    let grouped = scope.iter().chain(meta).fold(Projection::new(), |p, var| p.item(var));
    clauses.push(Clause::with(grouped.alias(collect_distinct(&child.var), &to_delete)));

    if let Some(meta) = meta {
        let acc = Variable::new();
        let item = Variable::new();
        let events = Expr::reduce(
            &acc,
            Expr::from(meta),
            &item,
            Expr::from(&to_delete),
            Expr::from(&acc).add(delete_event(&item, &member.name)),
        );
        let folded = Projection::of(scope).item(&to_delete).alias(events, meta);
        clauses.push(Clause::with(folded));
    }

    let x = Variable::named("x");
    let detach = concat([
        Some(Unwind::new(&to_delete, &x).into()),
        Some(Delete::detach([&x]).into()),
        Some(Clause::ret(Projection::new().alias(count_star(), &Variable::named("_")))),
    ]);
    clauses.push(Call::new(detach).import_with([&to_delete])?.into());
    Ok(clauses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::cypher::CypherResult;
    use crate::model::{AuthContext, Direction, Field, ScalarType, Schema};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new()
            .with_node(Node::new("Movie").with_fields([
                Field::scalar("title", ScalarType::String),
                Field::relation("actors", RelationField::new("ACTED_IN", Direction::Incoming, "Actor")),
            ]))
            .with_node(Node::new("Actor").with_fields([
                Field::scalar("name", ScalarType::String),
                Field::relation("movies", RelationField::new("ACTED_IN", Direction::Outgoing, "Movie")),
            ]))
    }

    fn render(config: &Config, tree: &ResolveTree) -> Result<CypherResult> {
        let schema = schema();
        let auth = AuthContext::anonymous();
        super::super::translate(&Context::new(&schema, &auth, config), tree)
    }

    fn three_levels() -> ResolveTree {
        ResolveTree::new("deleteMovies").with_arg("where", json!({ "title": "A" })).with_arg(
            "delete",
            json!({
                "actors": [{
                    "where": { "node": { "name": "K" } },
                    "delete": { "movies": [{ "where": { "node": { "title": "B" } } }] }
                }]
            }),
        )
    }

    #[test]
    fn test_simple_delete() {
        let tree = ResolveTree::new("deleteMovies").with_arg("where", json!({ "title": "A" }));
        assert_eq!(
            render(&Config::default(), &tree).unwrap().cypher,
            "MATCH (this:Movie)\nWHERE this.title = $param0\nDETACH DELETE this"
        );
    }

    #[test]
    fn test_nested_delete_depth_first() {
        assert_eq!(
            render(&Config::default(), &three_levels()).unwrap().cypher,
            "MATCH (this:Movie)
WHERE this.title = $param0
WITH this
OPTIONAL MATCH (this)<-[this_actors0_relationship:ACTED_IN]-(this_actors0:Actor)
WHERE this_actors0.name = $param1
WITH this, this_actors0
OPTIONAL MATCH (this_actors0)-[this_actors0_movies0_relationship:ACTED_IN]->(this_actors0_movies0:Movie)
WHERE this_actors0_movies0.title = $param2
WITH this, this_actors0, collect(DISTINCT this_actors0_movies0) AS this_actors0_movies0_to_delete
CALL {
  WITH this_actors0_movies0_to_delete
  UNWIND this_actors0_movies0_to_delete AS x
  DETACH DELETE x
  RETURN count(*) AS _
}
WITH this, collect(DISTINCT this_actors0) AS this_actors0_to_delete
CALL {
  WITH this_actors0_to_delete
  UNWIND this_actors0_to_delete AS x
  DETACH DELETE x
  RETURN count(*) AS _
}
DETACH DELETE this"
        );
    }

    #[test]
    fn test_nested_delete_folds_events() {
        let config = Config { subscriptions: true, ..Config::default() };
        let cypher = render(&config, &three_levels()).unwrap().cypher;

        assert!(cypher.starts_with("WITH [] AS meta\nMATCH (this:Movie)"));
        assert!(cypher.contains(
            "WITH this, this_actors0, meta, collect(DISTINCT this_actors0_movies0) AS this_actors0_movies0_to_delete\nWITH this, this_actors0, this_actors0_movies0_to_delete, REDUCE(var0=meta, var1 IN this_actors0_movies0_to_delete | var0 + { event: \"delete\", id: id(var1)"
        ));
        assert!(cypher.contains("WITH this, this_actors0_to_delete, REDUCE(var2=meta, var3 IN this_actors0_to_delete"));
        assert!(cypher.ends_with(
            "DETACH DELETE this\nWITH collect(meta) AS meta\nWITH REDUCE(var4=[], var5 IN meta | var4 + var5) AS meta\nRETURN meta"
        ));

        let grandchild = cypher.find("this_actors0_movies0_to_delete AS x").unwrap();
        let child = cypher.find("this_actors0_to_delete AS x").unwrap();
        let root = cypher.find("DETACH DELETE this\n").unwrap();
        assert!(grandchild < child && child < root);
    }

    #[test]
    fn test_unknown_relationship_key() {
        let tree = ResolveTree::new("deleteMovies").with_arg("delete", json!({ "directors": [{}] }));
        assert!(matches!(
            render(&Config::default(), &tree),
            Err(Error::UnknownField { field, .. }) if field == "directors"
        ));
    }
}
