//! End-to-end tests for root and field aggregations.

use neo4j_graphql::{
    AuthContext, Config, Context, CypherResult, Direction, Field, Node, RelationField, ResolveTree, ScalarType,
    Schema, TemporalType, translate,
};
use pretty_assertions::assert_eq;
use serde_json::json;

fn schema() -> Schema {
    Schema::new()
        .with_node(Node::new("Movie").with_fields([
            Field::scalar("title", ScalarType::String),
            Field::scalar("year", ScalarType::Int),
            Field::temporal("released", TemporalType::DateTime),
            Field::relation("actors", RelationField::new("ACTED_IN", Direction::Incoming, "Actor")),
        ]))
        .with_node(Node::new("Actor").with_fields([Field::scalar("name", ScalarType::String)]))
}

fn run(tree: &ResolveTree) -> CypherResult {
    let schema = schema();
    let auth = AuthContext::anonymous();
    let config = Config::default();
    translate(&Context::new(&schema, &auth, &config), tree).unwrap()
}

// ============================================================================
// Root aggregation: one CALL per selected aggregate
// ============================================================================

#[test]
fn test_count_and_string_aggregate() {
    let tree = ResolveTree::new("moviesAggregate")
        .with_fields("MovieAggregateSelection", [ResolveTree::new("count"), ResolveTree::new("title")]);
    assert_eq!(
        run(&tree).cypher,
        "CALL {
  MATCH (this:Movie)
  RETURN count(this) AS var0
}
CALL {
  MATCH (this:Movie)
  WITH this.title AS var1
  ORDER BY size(var1) DESC
  WITH collect(var1) AS var2, avg(size(var1)) AS var3
  RETURN { longest: head(var2), shortest: last(var2), averageLength: var3 } AS var4
}
RETURN { count: var0, title: var4 } AS this"
    );
}

#[test]
fn test_filter_is_shared_between_aggregates() {
    let tree = ResolveTree::new("moviesAggregate").with_arg("where", json!({ "year_GT": 2000 })).with_fields(
        "MovieAggregateSelection",
        [ResolveTree::new("count"), ResolveTree::new("year"), ResolveTree::new("released")],
    );
    let result = run(&tree);

    assert_eq!(result.cypher.matches("WHERE this.year > $param0").count(), 3);
    assert_eq!(result.params.len(), 1);
    assert!(result.cypher.contains("average: avg(this.year)"));
}

// ============================================================================
// Field aggregation inside a read
// ============================================================================

#[test]
fn test_relationship_count_inline() {
    let tree = ResolveTree::new("movies").with_fields(
        "Movie",
        [
            ResolveTree::new("title"),
            ResolveTree::new("actorsAggregate")
                .with_fields("MovieActorActorsAggregationSelection", [ResolveTree::new("count")]),
        ],
    );
    assert_eq!(
        run(&tree).cypher,
        "MATCH (this:Movie)\nRETURN this { .title, actorsAggregate: { count: size([(this)<-[this0:ACTED_IN]-(this1:Actor) | this1]) } } AS this"
    );
}

#[test]
fn test_aggregate_where_on_count() {
    let tree = ResolveTree::new("movies")
        .with_arg("where", json!({ "actorsAggregate": { "count_GT": 2 } }))
        .with_fields("Movie", [ResolveTree::new("title")]);
    let result = run(&tree);

    assert!(result.cypher.starts_with("MATCH (this:Movie)\nWHERE "));
    assert!(result.cypher.contains("> $param0"));
    assert_eq!(result.params.len(), 1);
}
