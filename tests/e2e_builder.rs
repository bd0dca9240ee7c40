//! End-to-end tests for the query builder on its own: naming, parameter
//! sharing and subquery rendering, plus rendering properties.

use neo4j_graphql::cypher::functions::collect;
use neo4j_graphql::cypher::{
    Call, Clause, Expr, Match, NodePattern, NodeRef, Param, Pattern, PatternDirection, Projection, RelPattern,
    RelationshipRef, Variable, and, build, concat,
};
use neo4j_graphql::{Error, Value};
use pretty_assertions::assert_eq;
use proptest::prelude::*;

// ============================================================================
// 1. Names are assigned at render time
// ============================================================================

#[test]
fn test_match_with_subquery() {
    let movie = NodeRef::new(["Movie"]);
    let actor = NodeRef::new(["Actor"]);
    let acted = RelationshipRef::new("ACTED_IN");
    let names = Variable::new();

    let pattern = Pattern::new(NodePattern::var(&movie.var))
        .related(RelPattern::new(&acted, PatternDirection::Left), NodePattern::new(&actor));
    let body = concat([
        Some(Match::new(pattern).into()),
        Some(Clause::ret(Projection::new().alias(collect(actor.property("name")), &names))),
    ]);
    let title = movie.property("title").eq(Param::new("Dune"));
    let query = concat([
        Some(Match::new(NodePattern::new(&movie)).and_where(Some(title)).into()),
        Some(Call::new(body).import_with([&movie.var]).unwrap().into()),
        Some(Clause::ret(Projection::of([&movie.var, &names]))),
    ]);

    let result = build(&query).unwrap();
    assert_eq!(
        result.cypher,
        "MATCH (this0:Movie)
WHERE this0.title = $param0
CALL {
  WITH this0
  MATCH (this0)<-[this1:ACTED_IN]-(this2:Actor)
  RETURN collect(this2.name) AS var3
}
RETURN this0, var3"
    );
    assert_eq!(result.params.get("param0"), Some(&Value::String("Dune".into())));
}

#[test]
fn test_import_with_twice_fails() {
    let this = Variable::named("this");
    let call = Call::new(Clause::raw("RETURN 1 AS one")).import_with([&this]).unwrap();
    assert!(matches!(call.import_with([&this]), Err(Error::ImportWithAlreadySet)));
}

#[test]
fn test_cloned_param_renders_once() {
    let limit = Param::new(10);
    let this = Variable::named("this");
    let predicate = and([
        Some(this.property("a").lt(limit.clone())),
        Some(this.property("b").lt(limit.clone())),
        Some(this.property("c").eq(Expr::null())),
    ]);
    let result = build(&Match::new(NodePattern::var(&this)).and_where(predicate)).unwrap();
    assert_eq!(result.params.len(), 1);
    assert_eq!(result.cypher.matches("$param0").count(), 2);
}

// ============================================================================
// 2. Rendering properties
// ============================================================================

fn predicate_tree(values: &[i64]) -> Clause {
    let node = NodeRef::new(["Movie"]);
    let predicate = and(values.iter().map(|v| Some(node.property("year").gt(Param::new(*v)))));
    concat([
        Some(Match::new(NodePattern::new(&node)).and_where(predicate).into()),
        Some(Clause::ret(Projection::of([&node.var]))),
    ])
}

proptest! {
    #[test]
    fn prop_rendering_is_deterministic(values in prop::collection::vec(any::<i64>(), 0..8)) {
        let tree = predicate_tree(&values);
        let first = build(&tree).unwrap();
        let second = build(&tree).unwrap();
        prop_assert_eq!(first, second);
    }

    #[test]
    fn prop_distinct_params_get_distinct_names(values in prop::collection::vec(any::<i64>(), 1..8)) {
        let result = build(&predicate_tree(&values)).unwrap();
        prop_assert_eq!(result.params.len(), values.len());
        for (i, value) in values.iter().enumerate() {
            prop_assert_eq!(result.params.get(&format!("param{i}")), Some(&Value::Int(*value)));
        }
    }

    #[test]
    fn prop_named_variables_are_never_reused(count in 1usize..6) {
        let named = Variable::named("var0");
        let generated: Vec<Variable> = (0..count).map(|_| Variable::new()).collect();
        let projection = generated.iter().fold(Projection::of([&named]), |p, v| p.item(v));
        let cypher = build(&Clause::ret(projection)).unwrap().cypher;
        prop_assert_eq!(cypher.matches("var0").count(), 1);
    }
}
