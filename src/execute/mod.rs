//! # Executor boundary
//!
//! [`Executor`] is the only contract with a database driver: it receives
//! finished Cypher plus parameters and returns records as JSON maps.
//! [`execute`] adds the query-option prefix and turns driver failures
//! carrying the library's error markers back into typed [`Error`]s.

pub mod asserts;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::debug;

use crate::config::Config;
use crate::cypher::CypherResult;
use crate::model::PropertyMap;
use crate::translate::auth::{FORBIDDEN, UNAUTHENTICATED};
use crate::translate::create::RELATIONSHIP_REQUIRED;
use crate::{Error, Result};

pub use asserts::assert_indexes_and_constraints;

/// One result row, keyed by column name.
pub type Record = serde_json::Map<String, Json>;

const CONSTRAINT_VALIDATION_FAILED: &str = "Neo.ClientError.Schema.ConstraintValidationFailed";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccessMode {
    Read,
    Write,
}

/// A failure reported by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseError {
    pub code: String,
    pub message: String,
}

impl DatabaseError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecuteRequest {
    pub query: String,
    pub params: PropertyMap,
    pub mode: AccessMode,
    pub database: Option<String>,
    pub bookmarks: Vec<String>,
}

#[async_trait]
pub trait Executor: Send + Sync {
    async fn run(&self, request: &ExecuteRequest) -> std::result::Result<Vec<Record>, DatabaseError>;
}

/// Run a translated statement.
pub async fn execute(
    executor: &dyn Executor,
    result: CypherResult,
    mode: AccessMode,
    config: &Config,
) -> Result<Vec<Record>> {
    let query = match config.query_prefix() {
        Some(prefix) => format!("{prefix}\n{}", result.cypher),
        None => result.cypher,
    };
    let request = ExecuteRequest {
        query,
        params: result.params,
        mode,
        database: config.database.clone(),
        bookmarks: config.bookmarks.clone(),
    };

    debug!(mode = ?request.mode, params = request.params.len(), "About to execute Cypher");
    executor.run(&request).await.map_err(map_error)
}

fn map_error(err: DatabaseError) -> Error {
    if err.message.contains(FORBIDDEN) {
        Error::Forbidden
    } else if err.message.contains(UNAUTHENTICATED) {
        Error::Unauthenticated
    } else if err.code == CONSTRAINT_VALIDATION_FAILED {
        Error::ConstraintValidation(err.message)
    } else if let Some(at) = err.message.find(RELATIONSHIP_REQUIRED) {
        let detail = err.message[at + RELATIONSHIP_REQUIRED.len()..].trim_start_matches(':').trim();
        Error::RelationshipValidation(detail.to_string())
    } else {
        Error::Database { code: err.code, message: err.message }
    }
}
