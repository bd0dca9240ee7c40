//! `@auth` rules → predicates.
//!
//! Three shapes come out of a rule set:
//! - `where`: a filter ANDed into the MATCH, hiding rows silently
//! - `allow`: a `validatePredicate` that raises FORBIDDEN
//! - `bind`: a post-write `apoc.util.validate` check
//!
//! Claim references (`"$jwt.sub"`, `"$context.tenant"`) resolve against the
//! `$auth` parameter at query time.

use serde_json::{Map, Value as Json};

use super::{Context, as_list, as_object};
use crate::cypher::functions::validate_predicate;
use crate::cypher::{
    Clause, Expr, NodePattern, NodeRef, Param, Pattern, Procedure, Projection, Quantifier, RelPattern, Variable,
    and, concat, or,
};
use crate::model::{AuthOperation, AuthRule, FieldKind, Node, Value};
use crate::{Error, Result};

/// Raised when an `allow` or `bind` rule fails.
pub const FORBIDDEN: &str = "@neo4j/graphql/FORBIDDEN";
/// Raised when a rule requires authentication and the request has none.
pub const UNAUTHENTICATED: &str = "@neo4j/graphql/UNAUTHENTICATED";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RuleKind {
    Allow,
    Where,
    Bind,
}

fn applicable(node: &Node, op: AuthOperation) -> impl Iterator<Item = &AuthRule> {
    node.auth.iter().flat_map(|auth| auth.rules.iter()).filter(move |rule| rule.applies_to(op))
}

/// Row filter from the `where` of every rule that applies to `op`.
pub fn auth_where(ctx: &Context<'_>, node: &Node, var: &Variable, op: AuthOperation) -> Result<Option<Expr>> {
    rules_predicate(ctx, node, var, op, RuleKind::Where)
}

/// FORBIDDEN check for the `allow`, `roles` and `isAuthenticated` parts of
/// the applicable rules, preceded by an UNAUTHENTICATED check when a rule
/// demands an authenticated caller.
pub fn auth_allow(ctx: &Context<'_>, node: &Node, var: &Variable, op: AuthOperation) -> Result<Option<Expr>> {
    let needs_authentication = applicable(node, op)
        .any(|rule| rule.is_authenticated == Some(true) && !rule.allow_unauthenticated);
    let unauthenticated = needs_authentication.then(|| {
        let authenticated = ctx.auth_param().property("isAuthenticated").eq(Expr::literal(true));
        validate_predicate(authenticated.not(), UNAUTHENTICATED)
    });

    let forbidden = rules_predicate(ctx, node, var, op, RuleKind::Allow)?
        .map(|predicate| validate_predicate(predicate.not(), FORBIDDEN));

    Ok(and([unauthenticated, forbidden]))
}

/// `WITH scope` plus a FORBIDDEN validation of the `bind` rules, run after
/// a write so the written state is what gets checked. An empty `scope`
/// carries `var` alone.
pub fn auth_bind(
    ctx: &Context<'_>,
    node: &Node,
    var: &Variable,
    op: AuthOperation,
    scope: &[Variable],
) -> Result<Option<Clause>> {
    let Some(predicate) = rules_predicate(ctx, node, var, op, RuleKind::Bind)? else {
        return Ok(None);
    };
    let carried = if scope.is_empty() { Projection::of([var]) } else { Projection::of(scope) };
    Ok(Some(concat([
        Some(Clause::with(carried)),
        Some(Procedure::validate(predicate.not(), FORBIDDEN).into()),
    ])))
}

/// Rules are alternatives: any one passing is enough.
fn rules_predicate(
    ctx: &Context<'_>,
    node: &Node,
    var: &Variable,
    op: AuthOperation,
    kind: RuleKind,
) -> Result<Option<Expr>> {
    let mut alternatives = Vec::new();
    for rule in applicable(node, op) {
        alternatives.push(rule_predicate(ctx, node, var, rule, kind)?);
    }
    Ok(or(alternatives))
}

fn rule_predicate(ctx: &Context<'_>, node: &Node, var: &Variable, rule: &AuthRule, kind: RuleKind) -> Result<Option<Expr>> {
    let mut parts = Vec::new();

    if kind == RuleKind::Allow {
        if !rule.roles.is_empty() {
            parts.push(Some(roles_predicate(ctx, &rule.roles)));
        }
        if let Some(required) = rule.is_authenticated {
            parts.push(Some(ctx.auth_param().property("isAuthenticated").eq(Expr::literal(required))));
        }
    }

    let map = match kind {
        RuleKind::Allow => rule.allow.as_ref(),
        RuleKind::Where => rule.where_.as_ref(),
        RuleKind::Bind => rule.bind.as_ref(),
    };
    if let Some(map) = map {
        parts.push(map_predicate(ctx, node, var, map)?);
    }

    let mut all = Vec::new();
    for nested in &rule.and {
        all.push(rule_predicate(ctx, node, var, nested, kind)?);
    }
    parts.push(and(all));

    let mut any = Vec::new();
    for nested in &rule.or {
        any.push(rule_predicate(ctx, node, var, nested, kind)?);
    }
    parts.push(or(any));

    Ok(and(parts))
}

/// `any(r IN ["admin"] WHERE any(x IN $auth.roles WHERE x = r))`
fn roles_predicate(ctx: &Context<'_>, roles: &[String]) -> Expr {
    let role = Variable::new();
    let granted = Variable::new();
    let held = Expr::quantified(
        Quantifier::Any,
        &granted,
        ctx.auth_param().property("roles"),
        Expr::from(&granted).eq(&role),
    );
    Expr::quantified(
        Quantifier::Any,
        &role,
        Expr::list(roles.iter().map(|r| Expr::string(r.as_str()))),
        held,
    )
}

/// Resolve `"$jwt.a.b"` to `$auth.jwt.a.b`; other values become parameters.
fn rule_value(ctx: &Context<'_>, value: &Json) -> (Expr, bool) {
    if let Some(path) = value.as_str()
        && let Some((root, rest)) = path
            .strip_prefix("$jwt.")
            .map(|rest| ("jwt", rest))
            .or_else(|| path.strip_prefix("$context.").map(|rest| ("context", rest)))
    {
        let claim = rest.split('.').fold(ctx.auth_param().property(root), |claim, key| claim.property(key));
        return (claim, true);
    }
    (Param::new(Value::from(value)).into(), false)
}

fn map_predicate(ctx: &Context<'_>, node: &Node, var: &Variable, map: &Map<String, Json>) -> Result<Option<Expr>> {
    let mut parts = Vec::new();
    for (key, value) in map {
        let part = match key.as_str() {
            "AND" | "OR" => {
                let mut nested = Vec::new();
                for item in as_list(value) {
                    nested.push(map_predicate(ctx, node, var, as_object(item, key)?)?);
                }
                if key == "AND" { and(nested) } else { or(nested) }
            }
            _ => {
                let field = node
                    .field(key)
                    .ok_or_else(|| Error::UnknownField { node: node.name.clone(), field: key.clone() })?;
                match &field.kind {
                    FieldKind::Relation(rel) => {
                        let target = ctx.schema.node(&rel.target)?;
                        let child = NodeRef::new(target.labels());
                        let item = Variable::new();
                        let related = Expr::pattern_comprehension(
                            Pattern::new(NodePattern::var(var)).related(
                                RelPattern::anonymous(&rel.rel_type, super::pattern_direction(rel.direction)),
                                NodePattern::new(&child),
                            ),
                            None,
                            Expr::from(&child),
                        );
                        map_predicate(ctx, target, &item, as_object(value, key)?)?
                            .map(|inner| Expr::quantified(Quantifier::Any, &item, related, inner))
                    }
                    _ if field.is_stored() => {
                        let property = var.property(field.db_name());
                        let (expected, is_claim) = rule_value(ctx, value);
                        // A missing claim must not match a missing property.
                        if is_claim {
                            and([Some(property.clone().is_not_null()), Some(property.eq(expected))])
                        } else {
                            Some(property.eq(expected))
                        }
                    }
                    _ => {
                        return Err(Error::InvalidArgument(format!(
                            "auth rules cannot reference {}.{}",
                            node.name, field.name
                        )));
                    }
                }
            }
        };
        parts.push(part);
    }
    Ok(and(parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::cypher::build;
    use crate::model::{Auth, AuthContext, Direction, Field, RelationField, ScalarType, Schema};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn rule(value: Json) -> AuthRule {
        serde_json::from_value(value).unwrap()
    }

    fn schema(rules: Vec<AuthRule>) -> Schema {
        Schema::new()
            .with_node(
                Node::new("Post")
                    .with_fields([
                        Field::scalar("id", ScalarType::Id),
                        Field::relation("author", RelationField::new("HAS_POST", Direction::Incoming, "User").single()),
                    ])
                    .with_auth(Auth { rules }),
            )
            .with_node(Node::new("User").with_fields([Field::scalar("id", ScalarType::Id)]))
    }

    fn with_ctx<R>(schema: &Schema, f: impl FnOnce(&Context<'_>, &Node) -> R) -> R {
        let jwt = json!({ "sub": "u1", "roles": ["editor"] });
        let auth = AuthContext::from_jwt(jwt.as_object().unwrap().clone());
        let config = Config::default();
        let ctx = Context::new(schema, &auth, &config);
        f(&ctx, schema.node("Post").unwrap())
    }

    #[test]
    fn test_roles_allow() {
        let schema = schema(vec![rule(json!({ "roles": ["admin"] }))]);
        let this = Variable::named("this");
        let allow = with_ctx(&schema, |ctx, node| auth_allow(ctx, node, &this, AuthOperation::Read))
            .unwrap()
            .unwrap();
        let result = build(&allow).unwrap();
        assert_eq!(
            result.cypher,
            "apoc.util.validatePredicate(NOT (any(var0 IN [\"admin\"] WHERE any(var1 IN $auth.roles WHERE var1 = var0))), \"@neo4j/graphql/FORBIDDEN\", [0])"
        );
        assert!(result.params.contains_key("auth"));
    }

    #[test]
    fn test_where_resolves_claims() {
        let schema = schema(vec![rule(json!({ "operations": ["READ"], "where": { "id": "$jwt.sub" } }))]);
        let this = Variable::named("this");
        let filter = with_ctx(&schema, |ctx, node| auth_where(ctx, node, &this, AuthOperation::Read))
            .unwrap()
            .unwrap();
        assert_eq!(build(&filter).unwrap().cypher, "this.id IS NOT NULL\nAND this.id = $auth.jwt.sub");

        let none = with_ctx(&schema, |ctx, node| auth_where(ctx, node, &this, AuthOperation::Delete)).unwrap();
        assert!(none.is_none());
    }

    #[test]
    fn test_where_does_not_produce_allow() {
        let schema = schema(vec![rule(json!({ "where": { "id": "$jwt.sub" } }))]);
        let this = Variable::named("this");
        let allow = with_ctx(&schema, |ctx, node| auth_allow(ctx, node, &this, AuthOperation::Read)).unwrap();
        assert!(allow.is_none());
    }

    #[test]
    fn test_unauthenticated_check_precedes_forbidden() {
        let schema = schema(vec![rule(json!({ "isAuthenticated": true }))]);
        let this = Variable::named("this");
        let allow = with_ctx(&schema, |ctx, node| auth_allow(ctx, node, &this, AuthOperation::Update))
            .unwrap()
            .unwrap();
        let cypher = build(&allow).unwrap().cypher;
        let unauthenticated = cypher.find(UNAUTHENTICATED).unwrap();
        let forbidden = cypher.find(FORBIDDEN).unwrap();
        assert!(unauthenticated < forbidden);
    }

    #[test]
    fn test_relation_allow() {
        let schema = schema(vec![rule(json!({ "allow": { "author": { "id": "$jwt.sub" } } }))]);
        let this = Variable::named("this");
        let allow = with_ctx(&schema, |ctx, node| auth_allow(ctx, node, &this, AuthOperation::Update))
            .unwrap()
            .unwrap();
        let cypher = build(&allow).unwrap().cypher;
        assert!(cypher.contains("any(var0 IN [(this)<-[:HAS_POST]-(this1:User) | this1] WHERE var0.id IS NOT NULL"));
    }

    #[test]
    fn test_bind() {
        let schema = schema(vec![rule(json!({ "operations": ["CREATE"], "bind": { "id": "$jwt.sub" } }))]);
        let this = Variable::named("this");
        let bind = with_ctx(&schema, |ctx, node| auth_bind(ctx, node, &this, AuthOperation::Create, &[]))
            .unwrap()
            .unwrap();
        assert_eq!(
            build(&bind).unwrap().cypher,
            "WITH this\nCALL apoc.util.validate(NOT (this.id IS NOT NULL\nAND this.id = $auth.jwt.sub), \"@neo4j/graphql/FORBIDDEN\", [0])"
        );
    }
}
