//! Root list queries: `movies(where, options, fulltext)`.

use super::auth::{auth_allow, auth_where};
use super::projection::project_node;
use super::where_clause::node_where;
use super::{Context, ListOptions, ResolveTree, as_object, node_property};
use crate::cypher::functions::labels;
use crate::cypher::{Clause, Expr, Match, NodePattern, NodeRef, Param, Procedure, Projection, and, concat};
use crate::model::{AuthOperation, Node, Value};
use crate::{Error, Result};

/// ```text
/// MATCH (this:Movie)
/// WHERE <where> AND <auth where> AND <auth allow>
/// WITH this ORDER BY ... SKIP ... LIMIT ...
/// <relation subqueries>
/// RETURN this { ... } AS this
/// ```
pub fn translate_read(ctx: &Context<'_>, node: &Node, tree: &ResolveTree) -> Result<Clause> {
    let this = NodeRef::named("this", node.labels());
    let source = match_source(ctx, node, &this, tree, AuthOperation::Read)?;

    let options = ListOptions::from_args(tree)?;
    let sorted = (!options.is_empty()).then(|| {
        Clause::with(options.apply(Projection::of([&this.var]), |key| node_property(node, &this.var, key)))
    });

    let fields = tree.fields_for(&[node.name.as_str()]);
    let (map, subqueries) = project_node(ctx, node, &this.var, &fields)?.into_parts(&this.var);

    Ok(concat(
        [Some(source), sorted]
            .into_iter()
            .chain(subqueries.into_iter().map(Some))
            .chain([Some(Clause::ret(Projection::new().alias(map, &this.var)))]),
    ))
}

/// Bind `this` to the filtered root nodes, through a fulltext index when
/// the `fulltext` argument is present.
pub(crate) fn match_source(
    ctx: &Context<'_>,
    node: &Node,
    this: &NodeRef,
    tree: &ResolveTree,
    op: AuthOperation,
) -> Result<Clause> {
    let filter = match tree.arg("where") {
        Some(filter) => node_where(ctx, node, &this.var, as_object(filter, "where")?)?,
        None => None,
    };
    let predicate = and([
        filter,
        auth_where(ctx, node, &this.var, op)?,
        auth_allow(ctx, node, &this.var, op)?,
    ]);

    let Some(fulltext) = tree.arg("fulltext") else {
        return Ok(Match::new(NodePattern::new(this)).and_where(predicate).into());
    };
    let fulltext = as_object(fulltext, "fulltext")?;
    if fulltext.len() > 1 {
        return Err(Error::MultipleFulltextArguments);
    }
    let Some((index_name, input)) = fulltext.iter().next() else {
        return Ok(Match::new(NodePattern::new(this)).and_where(predicate).into());
    };

    let index = node
        .fulltext
        .iter()
        .find(|index| &index.name == index_name)
        .ok_or_else(|| Error::InvalidArgument(format!("{} has no fulltext index {index_name}", node.name)))?;
    let phrase = as_object(input, index_name)?
        .get("phrase")
        .and_then(|p| p.as_str())
        .ok_or_else(|| Error::InvalidArgument(format!("fulltext {index_name} needs a phrase")))?;

    let label_check = Expr::string(node.main_label()).in_list(labels(&this.var));
    Ok(Procedure::new(
        "db.index.fulltext.queryNodes",
        [Expr::string(index.name.as_str()), Param::new(Value::from(phrase)).into()],
    )
    .yield_as("node", &this.var)
    .and_where(and([Some(label_check), predicate]))
    .into())
}
