//! Check (or create) the unique constraints and fulltext indexes the
//! schema relies on.

use tracing::{debug, warn};

use super::{AccessMode, ExecuteRequest, Executor, Record};
use crate::cypher::escape;
use crate::model::{Node, PropertyMap, Schema};
use crate::{Error, Result};

/// Every problem found is reported in one [`Error::SchemaAssertion`].
/// With `create`, missing constraints and indexes are created instead.
pub async fn assert_indexes_and_constraints(executor: &dyn Executor, schema: &Schema, create: bool) -> Result<()> {
    let constraints = fetch(executor, "SHOW UNIQUE CONSTRAINTS").await?;
    let indexes = fetch(executor, "SHOW INDEXES YIELD * WHERE type = \"FULLTEXT\"").await?;

    let mut problems = Vec::new();
    for node in schema.nodes() {
        let label = node.main_label();
        for field in node.unique_fields() {
            let property = field.db_name();
            if constraints.iter().any(|c| covers(c, label, property)) {
                continue;
            }
            if create {
                let name = field.unique.as_deref().unwrap_or(property);
                let query = format!(
                    "CREATE CONSTRAINT {} IF NOT EXISTS FOR (n:{}) REQUIRE n.{} IS UNIQUE",
                    escape(name),
                    escape(label),
                    escape(property),
                );
                write(executor, query).await?;
                debug!(label, property, "created unique constraint");
            } else {
                problems.push(format!("Missing constraint for {}.{}", node.name, property));
            }
        }
        problems.extend(fulltext(executor, node, &indexes, create).await?);
    }

    if problems.is_empty() {
        return Ok(());
    }
    for problem in &problems {
        warn!(problem = %problem, "schema assertion");
    }
    Err(Error::SchemaAssertion(problems))
}

async fn fulltext(executor: &dyn Executor, node: &Node, indexes: &[Record], create: bool) -> Result<Vec<String>> {
    let mut problems = Vec::new();
    for index in &node.fulltext {
        let properties: Vec<&str> = index
            .fields
            .iter()
            .map(|name| node.field(name).map_or(name.as_str(), |f| f.db_name()))
            .collect();

        match indexes.iter().find(|i| i.get("name").and_then(|n| n.as_str()) == Some(index.name.as_str())) {
            Some(existing) => {
                for property in &properties {
                    if !strings(existing, "properties").contains(property) {
                        problems.push(format!(
                            "@fulltext index '{}' on Node '{}' already exists, but is missing field '{}'",
                            index.name, node.name, property
                        ));
                    }
                }
            }
            None if create => {
                let each: Vec<String> = properties.iter().map(|p| format!("n.{}", escape(p))).collect();
                let query = format!(
                    "CREATE FULLTEXT INDEX {} IF NOT EXISTS FOR (n:{}) ON EACH [{}]",
                    escape(&index.name),
                    escape(node.main_label()),
                    each.join(", "),
                );
                write(executor, query).await?;
                debug!(index = %index.name, "created fulltext index");
            }
            None => problems.push(format!("Missing @fulltext index '{}' on Node '{}'", index.name, node.name)),
        }
    }
    Ok(problems)
}

fn covers(constraint: &Record, label: &str, property: &str) -> bool {
    strings(constraint, "labelsOrTypes").contains(&label) && strings(constraint, "properties").contains(&property)
}

fn strings<'r>(record: &'r Record, key: &str) -> Vec<&'r str> {
    record
        .get(key)
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(|i| i.as_str()).collect())
        .unwrap_or_default()
}

async fn fetch(executor: &dyn Executor, query: &str) -> Result<Vec<Record>> {
    run(executor, query.to_string(), AccessMode::Read).await
}

async fn write(executor: &dyn Executor, query: String) -> Result<()> {
    run(executor, query, AccessMode::Write).await.map(|_| ())
}

async fn run(executor: &dyn Executor, query: String, mode: AccessMode) -> Result<Vec<Record>> {
    let request = ExecuteRequest { query, params: PropertyMap::new(), mode, database: None, bookmarks: Vec::new() };
    executor.run(&request).await.map_err(|e| Error::Database { code: e.code, message: e.message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::execute::DatabaseError;
    use crate::model::{Field, FulltextIndex, ScalarType};

    /// Answers SHOW queries from fixed rows and records every write.
    struct Database {
        constraints: Vec<Record>,
        indexes: Vec<Record>,
        writes: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Executor for Database {
        async fn run(&self, request: &ExecuteRequest) -> std::result::Result<Vec<Record>, DatabaseError> {
            if request.query.starts_with("SHOW UNIQUE CONSTRAINTS") {
                Ok(self.constraints.clone())
            } else if request.query.starts_with("SHOW INDEXES") {
                Ok(self.indexes.clone())
            } else {
                self.writes.lock().unwrap().push(request.query.clone());
                Ok(Vec::new())
            }
        }
    }

    fn record(value: serde_json::Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn schema() -> Schema {
        Schema::new().with_node(
            Node::new("Movie")
                .with_fields([
                    Field::scalar("id", ScalarType::Id).with_unique("movie_id"),
                    Field::scalar("title", ScalarType::String),
                    Field::scalar("plot", ScalarType::String),
                ])
                .with_fulltext(FulltextIndex { name: "MovieSearch".into(), fields: vec!["title".into(), "plot".into()] }),
        )
    }

    fn database(constraints: Vec<Record>, indexes: Vec<Record>) -> Database {
        Database { constraints, indexes, writes: Mutex::new(Vec::new()) }
    }

    #[tokio::test]
    async fn test_problems_are_batched() {
        let db = database(
            Vec::new(),
            vec![record(json!({ "name": "MovieSearch", "labelsOrTypes": ["Movie"], "properties": ["title"] }))],
        );
        match assert_indexes_and_constraints(&db, &schema(), false).await {
            Err(Error::SchemaAssertion(problems)) => assert_eq!(
                problems,
                vec![
                    "Missing constraint for Movie.id".to_string(),
                    "@fulltext index 'MovieSearch' on Node 'Movie' already exists, but is missing field 'plot'"
                        .to_string(),
                ]
            ),
            other => panic!("unexpected {other:?}"),
        }
        assert!(db.writes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_satisfied_schema_passes() {
        let db = database(
            vec![record(json!({ "labelsOrTypes": ["Movie"], "properties": ["id"] }))],
            vec![record(json!({ "name": "MovieSearch", "labelsOrTypes": ["Movie"], "properties": ["title", "plot"] }))],
        );
        assert!(assert_indexes_and_constraints(&db, &schema(), false).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_missing() {
        let db = database(Vec::new(), Vec::new());
        assert_indexes_and_constraints(&db, &schema(), true).await.unwrap();
        assert_eq!(
            *db.writes.lock().unwrap(),
            vec![
                "CREATE CONSTRAINT movie_id IF NOT EXISTS FOR (n:Movie) REQUIRE n.id IS UNIQUE".to_string(),
                "CREATE FULLTEXT INDEX MovieSearch IF NOT EXISTS FOR (n:Movie) ON EACH [n.title, n.plot]".to_string(),
            ]
        );
    }
}
