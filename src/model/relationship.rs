//! Relationship descriptors: `@relationship` fields and the interfaces that
//! carry relationship properties.

use serde::{Deserialize, Serialize};

use super::field::Field;

/// Declared direction of a relationship, seen from the owning node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    #[serde(rename = "OUT")]
    Outgoing,
    #[serde(rename = "IN")]
    Incoming,
}

/// `@relationship(type: ..., direction: ..., properties: ...)` on a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationField {
    pub rel_type: String,
    pub direction: Direction,
    /// Type name at the far end (node, union or interface name).
    pub target: String,
    /// Union members / interface implementations. Empty for plain relations.
    #[serde(default)]
    pub members: Vec<String>,
    /// Name of the relationship-properties descriptor, if any.
    #[serde(default)]
    pub properties: Option<String>,
    #[serde(default)]
    pub list: bool,
}

impl RelationField {
    pub fn new(rel_type: impl Into<String>, direction: Direction, target: impl Into<String>) -> Self {
        Self {
            rel_type: rel_type.into(),
            direction,
            target: target.into(),
            members: Vec::new(),
            properties: None,
            list: true,
        }
    }

    pub fn with_properties(mut self, properties: impl Into<String>) -> Self {
        self.properties = Some(properties.into());
        self
    }

    pub fn with_members(mut self, members: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.members = members.into_iter().map(Into::into).collect();
        self
    }

    pub fn single(mut self) -> Self {
        self.list = false;
        self
    }
}

/// Properties stored on a relationship (`interface ActedIn { screenTime: Int }`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipProperties {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<Field>,
}

impl RelationshipProperties {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        Self { name: name.into(), fields }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}
