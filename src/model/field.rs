//! Field descriptors: the per-field classification resolved once when the
//! schema is ingested.

use serde::{Deserialize, Serialize};

use super::relationship::RelationField;

/// Built-in scalar types stored as plain properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScalarType {
    #[serde(rename = "ID")]
    Id,
    String,
    Int,
    BigInt,
    Float,
    Boolean,
    Point,
    CartesianPoint,
}

impl ScalarType {
    pub fn is_point(self) -> bool {
        matches!(self, ScalarType::Point | ScalarType::CartesianPoint)
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, ScalarType::Int | ScalarType::BigInt | ScalarType::Float)
    }
}

/// Temporal scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemporalType {
    DateTime,
    LocalDateTime,
    Date,
    Time,
    LocalTime,
    Duration,
}

/// A `@cypher` field: its value is computed by a custom statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedField {
    pub statement: String,
    /// Name of the node type returned, when the statement returns nodes.
    #[serde(default)]
    pub returns_node: Option<String>,
}

/// When a `@timestamp` field is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimestampOperation {
    Create,
    Update,
}

/// Closed classification of a field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FieldKind {
    /// Plain scalar property.
    Primitive { scalar: ScalarType },
    /// Date/time property.
    Temporal { temporal: TemporalType },
    /// Relationship to a concrete node type.
    Relation(RelationField),
    /// Relationship to a union; `RelationField::members` lists the members.
    Union(RelationField),
    /// Relationship to an interface; `RelationField::members` lists implementations.
    Interface(RelationField),
    /// `@cypher` computed field.
    Computed(ComputedField),
}

/// A field on a node or on relationship properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub name: String,
    /// `@alias`: the property name in the database, when it differs.
    #[serde(default)]
    pub db_property: Option<String>,
    pub kind: FieldKind,
    #[serde(default)]
    pub list: bool,
    #[serde(default)]
    pub required: bool,
    /// `@unique` constraint name.
    #[serde(default)]
    pub unique: Option<String>,
    /// `@id(autogenerate: true)`
    #[serde(default)]
    pub autogenerate: bool,
    /// `@timestamp(operations: [...])`
    #[serde(default)]
    pub timestamps: Vec<TimestampOperation>,
}

impl Field {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            db_property: None,
            kind,
            list: false,
            required: false,
            unique: None,
            autogenerate: false,
            timestamps: Vec::new(),
        }
    }

    pub fn scalar(name: impl Into<String>, scalar: ScalarType) -> Self {
        Self::new(name, FieldKind::Primitive { scalar })
    }

    pub fn temporal(name: impl Into<String>, temporal: TemporalType) -> Self {
        Self::new(name, FieldKind::Temporal { temporal })
    }

    pub fn relation(name: impl Into<String>, relation: RelationField) -> Self {
        let list = relation.list;
        let mut field = Self::new(name, FieldKind::Relation(relation));
        field.list = list;
        field
    }

    pub fn union(name: impl Into<String>, relation: RelationField) -> Self {
        let list = relation.list;
        let mut field = Self::new(name, FieldKind::Union(relation));
        field.list = list;
        field
    }

    pub fn interface(name: impl Into<String>, relation: RelationField) -> Self {
        let list = relation.list;
        let mut field = Self::new(name, FieldKind::Interface(relation));
        field.list = list;
        field
    }

    pub fn computed(name: impl Into<String>, statement: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldKind::Computed(ComputedField { statement: statement.into(), returns_node: None }),
        )
    }

    pub fn with_alias(mut self, db_property: impl Into<String>) -> Self {
        self.db_property = Some(db_property.into());
        self
    }

    pub fn with_list(mut self, list: bool) -> Self {
        self.list = list;
        self
    }

    pub fn with_unique(mut self, constraint_name: impl Into<String>) -> Self {
        self.unique = Some(constraint_name.into());
        self
    }

    pub fn with_autogenerate(mut self) -> Self {
        self.autogenerate = true;
        self
    }

    pub fn with_timestamps(mut self, ops: impl IntoIterator<Item = TimestampOperation>) -> Self {
        self.timestamps = ops.into_iter().collect();
        self
    }

    /// Property name used in Cypher.
    pub fn db_name(&self) -> &str {
        self.db_property.as_deref().unwrap_or(&self.name)
    }

    /// The relationship descriptor for relation, union and interface fields.
    pub fn relationship(&self) -> Option<&RelationField> {
        match &self.kind {
            FieldKind::Relation(r) | FieldKind::Union(r) | FieldKind::Interface(r) => Some(r),
            _ => None,
        }
    }

    /// True for fields stored as a property on the entity itself.
    pub fn is_stored(&self) -> bool {
        matches!(self.kind, FieldKind::Primitive { .. } | FieldKind::Temporal { .. })
    }
}
