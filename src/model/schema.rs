//! Schema: the read-only registry of node and relationship descriptors
//! consulted while translating a request.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use super::node::Node;
use super::relationship::RelationshipProperties;
use crate::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    #[serde(default)]
    nodes: HashMap<String, Node>,
    #[serde(default)]
    relationships: HashMap<String, RelationshipProperties>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.insert(node.name.clone(), node);
        self
    }

    pub fn with_relationship(mut self, props: RelationshipProperties) -> Self {
        self.relationships.insert(props.name.clone(), props);
        self
    }

    pub fn node(&self, name: &str) -> Result<&Node> {
        self.nodes.get(name).ok_or_else(|| Error::UnknownNode(name.to_string()))
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipProperties> {
        self.relationships.get(name)
    }

    /// Nodes sorted by name, for deterministic iteration.
    pub fn nodes(&self) -> Vec<&Node> {
        let mut nodes: Vec<_> = self.nodes.values().collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        nodes
    }

    /// Find the node type owning a root field (`movies`, `createMovies`, ...).
    pub fn node_for_root_field(&self, field: &str) -> Option<(&Node, RootOperation)> {
        self.nodes().into_iter().find_map(|node| {
            let names = node.root_field_names();
            let op = if field == names.read {
                RootOperation::Read
            } else if field == names.connection {
                RootOperation::Connection
            } else if field == names.aggregate {
                RootOperation::Aggregate
            } else if field == names.create {
                RootOperation::Create
            } else if field == names.update {
                RootOperation::Update
            } else if field == names.delete {
                RootOperation::Delete
            } else {
                return None;
            };
            Some((node, op))
        })
    }
}

/// Kind of generated root field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootOperation {
    Read,
    Connection,
    Aggregate,
    Create,
    Update,
    Delete,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_node() {
        let schema = Schema::new().with_node(Node::new("Movie"));
        assert!(schema.node("Movie").is_ok());
        assert!(matches!(schema.node("Actor"), Err(Error::UnknownNode(n)) if n == "Actor"));
    }

    #[test]
    fn test_root_field_lookup() {
        let schema = Schema::new().with_node(Node::new("Movie")).with_node(Node::new("Actor"));
        let (node, op) = schema.node_for_root_field("createActors").unwrap();
        assert_eq!(node.name, "Actor");
        assert_eq!(op, RootOperation::Create);
        assert_eq!(schema.node_for_root_field("moviesAggregate").unwrap().1, RootOperation::Aggregate);
        assert!(schema.node_for_root_field("films").is_none());
    }
}
