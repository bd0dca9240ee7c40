//! Variables, node/relationship references and parameters.
//!
//! Each value carries a process-unique [`VarId`]. Clones share the id, so a
//! cloned reference renders to the same name within one render.

use std::sync::atomic::{AtomicU64, Ordering};

use smallvec::SmallVec;

use super::environment::Environment;
use super::expr::Expr;
use super::ToCypher;
use crate::model::Value;

static NEXT_VAR_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a variable or parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(u64);

impl VarId {
    pub(crate) fn next() -> Self {
        VarId(NEXT_VAR_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum VarName {
    /// Named by the environment: `{prefix}{n}`.
    Generated(&'static str),
    /// Rendered verbatim.
    Named(String),
}

/// A Cypher variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub(crate) id: VarId,
    pub(crate) name: VarName,
}

impl Variable {
    /// Generated variable, rendered `var<n>`.
    pub fn new() -> Self {
        Self::with_prefix("var")
    }

    pub(crate) fn with_prefix(prefix: &'static str) -> Self {
        Self { id: VarId::next(), name: VarName::Generated(prefix) }
    }

    /// Variable with a fixed name.
    pub fn named(name: impl Into<String>) -> Self {
        Self { id: VarId::next(), name: VarName::Named(name.into()) }
    }

    pub fn id(&self) -> VarId {
        self.id
    }

    /// `var.key`
    pub fn property(&self, key: impl Into<String>) -> Expr {
        Expr::from(self).property(key)
    }
}

impl Default for Variable {
    fn default() -> Self {
        Self::new()
    }
}

impl ToCypher for Variable {
    fn to_cypher(&self, env: &mut Environment) -> String {
        env.variable_name(self)
    }
}

/// Variable bound to a node, carrying the labels used when it appears in a
/// pattern.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeRef {
    pub var: Variable,
    pub labels: SmallVec<[String; 2]>,
}

impl NodeRef {
    /// Generated node variable, rendered `this<n>`.
    pub fn new(labels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { var: Variable::with_prefix("this"), labels: labels.into_iter().map(Into::into).collect() }
    }

    pub fn named(name: impl Into<String>, labels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { var: Variable::named(name), labels: labels.into_iter().map(Into::into).collect() }
    }

    pub fn property(&self, key: impl Into<String>) -> Expr {
        self.var.property(key)
    }
}

/// Variable bound to a relationship.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipRef {
    pub var: Variable,
    pub rel_type: Option<String>,
}

impl RelationshipRef {
    pub fn new(rel_type: impl Into<String>) -> Self {
        Self { var: Variable::with_prefix("this"), rel_type: Some(rel_type.into()) }
    }

    pub fn named(name: impl Into<String>, rel_type: impl Into<String>) -> Self {
        Self { var: Variable::named(name), rel_type: Some(rel_type.into()) }
    }

    pub fn property(&self, key: impl Into<String>) -> Expr {
        self.var.property(key)
    }
}

/// A query parameter. Renders `$name` and registers its value once per
/// render.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub(crate) id: VarId,
    pub(crate) name: Option<String>,
    pub value: Value,
}

impl Param {
    /// Generated parameter, rendered `$param<n>`.
    pub fn new(value: impl Into<Value>) -> Self {
        Self { id: VarId::next(), name: None, value: value.into() }
    }

    pub fn named(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self { id: VarId::next(), name: Some(name.into()), value: value.into() }
    }

    pub fn id(&self) -> VarId {
        self.id
    }

    pub fn property(&self, key: impl Into<String>) -> Expr {
        Expr::from(self).property(key)
    }
}

impl ToCypher for Param {
    fn to_cypher(&self, env: &mut Environment) -> String {
        format!("${}", env.param_name(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher::build;

    #[test]
    fn test_clone_shares_identity() {
        let a = Variable::new();
        let b = a.clone();
        let c = Variable::new();
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn test_ids_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..100).map(|_| VarId::next()).collect::<Vec<_>>()))
            .collect();
        let mut all: Vec<VarId> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), total);
    }

    #[test]
    fn test_param_renders_once() {
        let p = Param::new(1);
        let expr = Expr::list([Expr::from(&p), Expr::from(&p)]);
        let result = build(&expr).unwrap();
        assert_eq!(result.cypher, "[$param0, $param0]");
        assert_eq!(result.params.len(), 1);
    }
}
