//! # Schema Model
//!
//! Descriptors for the GraphQL types backed by the graph, plus the value
//! type used for parameters and literals.
//!
//! Design rule: everything here is built once per schema and read-only
//! during translation. Pure data: no I/O, no state, no async.

pub mod auth;
pub mod field;
pub mod node;
pub mod property_map;
pub mod relationship;
pub mod schema;
pub mod value;

pub use auth::{Auth, AuthContext, AuthOperation, AuthRule};
pub use field::{ComputedField, Field, FieldKind, ScalarType, TemporalType, TimestampOperation};
pub use node::{FulltextIndex, Node, RootFieldNames};
pub use property_map::PropertyMap;
pub use relationship::{Direction, RelationField, RelationshipProperties};
pub use schema::{RootOperation, Schema};
pub use value::Value;
