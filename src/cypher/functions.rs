//! Cypher and APOC function constructors.

use super::expr::Expr;

fn call(name: &str, args: impl IntoIterator<Item = Expr>) -> Expr {
    Expr::function(name, args)
}

pub fn coalesce(args: impl IntoIterator<Item = Expr>) -> Expr {
    call("coalesce", args)
}

pub fn point(arg: Expr) -> Expr {
    call("point", [arg])
}

pub fn distance(a: Expr, b: Expr) -> Expr {
    call("point.distance", [a, b])
}

pub fn labels(node: impl Into<Expr>) -> Expr {
    call("labels", [node.into()])
}

pub fn id(entity: impl Into<Expr>) -> Expr {
    call("id", [entity.into()])
}

pub fn size(arg: Expr) -> Expr {
    call("size", [arg])
}

pub fn count(arg: impl Into<Expr>) -> Expr {
    call("count", [arg.into()])
}

/// `count(*)`
pub fn count_star() -> Expr {
    call("count", [Expr::raw("*")])
}

pub fn collect(arg: impl Into<Expr>) -> Expr {
    call("collect", [arg.into()])
}

pub fn collect_distinct(arg: impl Into<Expr>) -> Expr {
    Expr::Function { name: "collect".into(), args: vec![arg.into()], distinct: true }
}

pub fn head(arg: Expr) -> Expr {
    call("head", [arg])
}

pub fn last(arg: Expr) -> Expr {
    call("last", [arg])
}

pub fn min(arg: Expr) -> Expr {
    call("min", [arg])
}

pub fn max(arg: Expr) -> Expr {
    call("max", [arg])
}

pub fn avg(arg: Expr) -> Expr {
    call("avg", [arg])
}

pub fn sum(arg: Expr) -> Expr {
    call("sum", [arg])
}

pub fn to_string(arg: Expr) -> Expr {
    call("toString", [arg])
}

pub fn datetime() -> Expr {
    call("datetime", std::iter::empty())
}

pub fn timestamp() -> Expr {
    call("timestamp", std::iter::empty())
}

pub fn random_uuid() -> Expr {
    call("randomUUID", std::iter::empty())
}

// ============================================================================
// APOC
// ============================================================================

/// `apoc.util.validatePredicate(predicate, message, [0])`
pub fn validate_predicate(predicate: Expr, message: &str) -> Expr {
    call(
        "apoc.util.validatePredicate",
        [predicate, Expr::string(message), Expr::list([Expr::literal(0)])],
    )
}

/// Format a DateTime as an ISO offset string.
pub fn iso_datetime(arg: Expr) -> Expr {
    call(
        "apoc.date.convertFormat",
        [to_string(arg), Expr::string("iso_zoned_date_time"), Expr::string("iso_offset_date_time")],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher::{Variable, build};

    #[test]
    fn test_functions() {
        let this = Variable::named("this");
        assert_eq!(build(&collect_distinct(&this)).unwrap().cypher, "collect(DISTINCT this)");
        assert_eq!(build(&count_star()).unwrap().cypher, "count(*)");
        assert_eq!(
            build(&validate_predicate(Expr::raw("x"), "@neo4j/graphql/FORBIDDEN")).unwrap().cypher,
            r#"apoc.util.validatePredicate(x, "@neo4j/graphql/FORBIDDEN", [0])"#
        );
        assert_eq!(
            build(&iso_datetime(this.property("createdAt"))).unwrap().cypher,
            r#"apoc.date.convertFormat(toString(this.createdAt), "iso_zoned_date_time", "iso_offset_date_time")"#
        );
    }
}
