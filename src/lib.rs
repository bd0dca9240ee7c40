//! # neo4j-graphql-rs: GraphQL → Cypher translation for Neo4j
//!
//! A Cypher query builder plus the translation engine that turns a resolved
//! GraphQL request into one parameterized Cypher statement.
//!
//! ## Design Principles
//!
//! 1. **AST, not strings**: clauses, patterns and expressions are values;
//!    text only exists after [`cypher::build`]
//! 2. **One environment per render**: names and parameters are assigned
//!    during rendering, never while building
//! 3. **Schema is read-only**: field kinds are classified once, translation
//!    never mutates the model
//! 4. **Trait at the seam**: [`Executor`] is the only contract with the
//!    database driver
//!
//! ## Quick Start
//!
//! ```rust
//! use neo4j_graphql::{translate, AuthContext, Config, Context, Field, Node, ResolveTree, ScalarType, Schema};
//! use serde_json::json;
//!
//! # fn main() -> neo4j_graphql::Result<()> {
//! let schema = Schema::new().with_node(
//!     Node::new("Movie").with_fields([Field::scalar("title", ScalarType::String)]),
//! );
//! let tree = ResolveTree::new("movies")
//!     .with_arg("where", json!({ "title": "The Matrix" }))
//!     .with_fields("Movie", [ResolveTree::new("title")]);
//!
//! let auth = AuthContext::anonymous();
//! let config = Config::default();
//! let result = translate(&Context::new(&schema, &auth, &config), &tree)?;
//!
//! println!("{}", result.cypher);
//! # Ok(())
//! # }
//! ```
//!
//! ## Operations
//!
//! | Root field | Module |
//! |------------|--------|
//! | `movies` | `translate::read` |
//! | `moviesConnection` | `translate::connection` |
//! | `moviesAggregate` | `translate::aggregate` |
//! | `createMovies` | `translate::create` |
//! | `updateMovies` | `translate::update` |
//! | `deleteMovies` | `translate::delete` |

// ============================================================================
// Modules
// ============================================================================

pub mod config;
pub mod cypher;
pub mod execute;
pub mod model;
pub mod translate;

// ============================================================================
// Re-exports: Model
// ============================================================================

pub use model::{
    Auth, AuthContext, AuthOperation, AuthRule, Direction, Field, FieldKind, FulltextIndex, Node, PropertyMap,
    RelationField, RelationshipProperties, ScalarType, Schema, TemporalType, Value,
};

// ============================================================================
// Re-exports: Builder, translation, execution
// ============================================================================

pub use config::Config;
pub use cypher::{CypherResult, build};
pub use execute::{AccessMode, DatabaseError, ExecuteRequest, Executor, Record, assert_indexes_and_constraints, execute};
pub use translate::subscriptions::EventMeta;
pub use translate::{Context, ResolveTree, translate};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Malformed filter key: {0}")]
    MalformedFilterKey(String),

    #[error("Subquery import-with is already set")]
    ImportWithAlreadySet,

    #[error("Can only call one search at any given time")]
    MultipleFulltextArguments,

    #[error("Parameter name collision: {0}")]
    ParameterCollision(String),

    #[error("Unknown node type: {0}")]
    UnknownNode(String),

    #[error("Unknown field {field} on {node}")]
    UnknownField { node: String, field: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Unauthenticated")]
    Unauthenticated,

    #[error("Constraint validation failed: {0}")]
    ConstraintValidation(String),

    #[error("{0}")]
    RelationshipValidation(String),

    #[error("Schema assertion failed:\n{}", .0.join("\n"))]
    SchemaAssertion(Vec<String>),

    #[error("Database error {code}: {message}")]
    Database { code: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
