//! End-to-end tests for read translation: filters, options, nested
//! relation projections and root connections.
//!
//! Each test builds a schema, resolves a root field and checks the
//! rendered Cypher plus its parameters.

use neo4j_graphql::{
    AuthContext, Config, Context, Direction, Error, Field, Node, RelationField, RelationshipProperties, ResolveTree,
    ScalarType, Schema, Value, translate,
};
use pretty_assertions::assert_eq;
use serde_json::json;

// ============================================================================
// Helper: a small movie graph
// ============================================================================

fn schema() -> Schema {
    Schema::new()
        .with_node(Node::new("Movie").with_fields([
            Field::scalar("title", ScalarType::String),
            Field::scalar("year", ScalarType::Int),
            Field::relation(
                "actors",
                RelationField::new("ACTED_IN", Direction::Incoming, "Actor").with_properties("ActedIn"),
            ),
        ]))
        .with_node(Node::new("Actor").with_fields([
            Field::scalar("name", ScalarType::String),
            Field::relation("movies", RelationField::new("ACTED_IN", Direction::Outgoing, "Movie")),
        ]))
        .with_relationship(RelationshipProperties::new("ActedIn", vec![Field::scalar("screenTime", ScalarType::Int)]))
}

fn run(tree: &ResolveTree) -> neo4j_graphql::Result<neo4j_graphql::CypherResult> {
    let schema = schema();
    let auth = AuthContext::anonymous();
    let config = Config::default();
    translate(&Context::new(&schema, &auth, &config), tree)
}

// ============================================================================
// 1. Filter plus nested relation projection
// ============================================================================

#[test]
fn test_read_with_nested_relation() {
    let tree = ResolveTree::new("movies").with_arg("where", json!({ "title": "The Matrix" })).with_fields(
        "Movie",
        [
            ResolveTree::new("title"),
            ResolveTree::new("actors")
                .with_arg("where", json!({ "name": "Keanu" }))
                .with_arg("options", json!({ "limit": 2 }))
                .with_fields("Actor", [ResolveTree::new("name")]),
        ],
    );
    let result = run(&tree).unwrap();

    assert_eq!(
        result.cypher,
        "MATCH (this:Movie)
WHERE this.title = $param0
CALL {
  WITH this
  MATCH (this)<-[:ACTED_IN]-(this0:Actor)
  WHERE this0.name = $param1
  WITH this0 { .name } AS var1
  LIMIT $param2
  RETURN collect(var1) AS var1
}
RETURN this { .title, actors: var1 } AS this"
    );
    assert_eq!(result.params.get("param0"), Some(&Value::String("The Matrix".into())));
    assert_eq!(result.params.get("param1"), Some(&Value::String("Keanu".into())));
    assert_eq!(result.params.len(), 3);
}

// ============================================================================
// 2. Sorting and pagination happen before projection
// ============================================================================

#[test]
fn test_sort_and_paginate() {
    let tree = ResolveTree::new("movies")
        .with_arg("options", json!({ "sort": [{ "year": "DESC" }], "offset": 5, "limit": 10 }))
        .with_fields("Movie", [ResolveTree::new("title")]);
    assert_eq!(
        run(&tree).unwrap().cypher,
        "MATCH (this:Movie)\nWITH this\nORDER BY this.year DESC\nSKIP $param0\nLIMIT $param1\nRETURN this { .title } AS this"
    );
}

// ============================================================================
// 3. Root connection counts before it limits
// ============================================================================

#[test]
fn test_connection_counts_before_limit() {
    let tree = ResolveTree::new("moviesConnection")
        .with_arg("first", json!(2))
        .with_arg("sort", json!([{ "title": "ASC" }]))
        .with_fields(
            "MoviesConnection",
            [
                ResolveTree::new("totalCount"),
                ResolveTree::new("edges").with_fields(
                    "MovieEdge",
                    [ResolveTree::new("node").with_fields("Movie", [ResolveTree::new("title")])],
                ),
            ],
        );
    let cypher = run(&tree).unwrap().cypher;

    let count = cypher.find("size(edges) AS totalCount").unwrap();
    let limit = cypher.find("LIMIT $param0").unwrap();
    assert!(count < limit);
    assert!(cypher.ends_with("AS this"));
}

// ============================================================================
// 4. Errors
// ============================================================================

#[test]
fn test_unknown_root_field() {
    assert!(matches!(run(&ResolveTree::new("directors")), Err(Error::UnknownField { .. })));
}

#[test]
fn test_malformed_filter_key() {
    let tree = ResolveTree::new("movies")
        .with_arg("where", json!({ "title_SOUNDS_LIKE": "x" }))
        .with_fields("Movie", [ResolveTree::new("title")]);
    assert!(run(&tree).is_err());
}

#[test]
fn test_translation_is_deterministic() {
    let tree = ResolveTree::new("movies")
        .with_arg("where", json!({ "OR": [{ "year_GT": 1999 }, { "title_CONTAINS": "Matrix" }] }))
        .with_fields("Movie", [ResolveTree::new("title")]);
    let first = run(&tree).unwrap();
    let second = run(&tree).unwrap();
    assert_eq!(first, second);
}
