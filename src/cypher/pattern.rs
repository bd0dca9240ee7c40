//! Path patterns: `(a:Label)-[r:TYPE]->(b)`.

use smallvec::SmallVec;

use super::environment::Environment;
use super::expr::Expr;
use super::variable::{NodeRef, RelationshipRef, Variable};
use super::{ToCypher, escape};

/// Pattern direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternDirection {
    /// ->
    Right,
    /// <-
    Left,
    /// - (undirected)
    Both,
}

impl PatternDirection {
    pub fn reversed(self) -> Self {
        match self {
            PatternDirection::Right => PatternDirection::Left,
            PatternDirection::Left => PatternDirection::Right,
            PatternDirection::Both => PatternDirection::Both,
        }
    }
}

/// Node pattern: `(alias:Label1:Label2 { prop: value })`
#[derive(Debug, Clone, PartialEq)]
pub struct NodePattern {
    pub variable: Option<Variable>,
    pub labels: SmallVec<[String; 2]>,
    pub properties: Vec<(String, Expr)>,
}

impl NodePattern {
    /// The node with its labels.
    pub fn new(node: &NodeRef) -> Self {
        Self { variable: Some(node.var.clone()), labels: node.labels.clone(), properties: Vec::new() }
    }

    /// The node variable alone: `(this)`.
    pub fn bare(node: &NodeRef) -> Self {
        Self::var(&node.var)
    }

    pub fn var(var: &Variable) -> Self {
        Self { variable: Some(var.clone()), labels: SmallVec::new(), properties: Vec::new() }
    }

    /// `(:Label)`
    pub fn anonymous(labels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { variable: None, labels: labels.into_iter().map(Into::into).collect(), properties: Vec::new() }
    }

    pub fn with_properties<K: Into<String>>(mut self, props: impl IntoIterator<Item = (K, Expr)>) -> Self {
        self.properties.extend(props.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }
}

impl ToCypher for NodePattern {
    fn to_cypher(&self, env: &mut Environment) -> String {
        let mut out = String::from("(");
        if let Some(var) = &self.variable {
            out.push_str(&var.to_cypher(env));
        }
        for label in &self.labels {
            out.push(':');
            out.push_str(&escape(label));
        }
        out.push_str(&render_properties(&self.properties, env));
        out.push(')');
        out
    }
}

/// Relationship pattern: `-[alias:TYPE *min..max { props }]->`
#[derive(Debug, Clone, PartialEq)]
pub struct RelPattern {
    pub variable: Option<Variable>,
    pub rel_type: Option<String>,
    pub direction: PatternDirection,
    pub properties: Vec<(String, Expr)>,
    pub length: Option<(Option<u32>, Option<u32>)>,
}

impl RelPattern {
    pub fn new(rel: &RelationshipRef, direction: PatternDirection) -> Self {
        Self {
            variable: Some(rel.var.clone()),
            rel_type: rel.rel_type.clone(),
            direction,
            properties: Vec::new(),
            length: None,
        }
    }

    /// `-[:TYPE]->`
    pub fn anonymous(rel_type: impl Into<String>, direction: PatternDirection) -> Self {
        Self { variable: None, rel_type: Some(rel_type.into()), direction, properties: Vec::new(), length: None }
    }

    pub fn with_length(mut self, min: Option<u32>, max: Option<u32>) -> Self {
        self.length = Some((min, max));
        self
    }

    pub fn with_properties<K: Into<String>>(mut self, props: impl IntoIterator<Item = (K, Expr)>) -> Self {
        self.properties.extend(props.into_iter().map(|(k, v)| (k.into(), v)));
        self
    }
}

impl ToCypher for RelPattern {
    fn to_cypher(&self, env: &mut Environment) -> String {
        let mut inner = String::new();
        if let Some(var) = &self.variable {
            inner.push_str(&var.to_cypher(env));
        }
        if let Some(rel_type) = &self.rel_type {
            inner.push(':');
            inner.push_str(&escape(rel_type));
        }
        if let Some(length) = self.length {
            let bound = |b: Option<u32>| b.map(|b| b.to_string()).unwrap_or_default();
            match length {
                (None, None) => inner.push('*'),
                (Some(min), Some(max)) if min == max => inner.push_str(&format!("*{min}")),
                (min, max) => inner.push_str(&format!("*{}..{}", bound(min), bound(max))),
            }
        }
        inner.push_str(&render_properties(&self.properties, env));

        match self.direction {
            PatternDirection::Right => format!("-[{inner}]->"),
            PatternDirection::Left => format!("<-[{inner}]-"),
            PatternDirection::Both => format!("-[{inner}]-"),
        }
    }
}

fn render_properties(props: &[(String, Expr)], env: &mut Environment) -> String {
    if props.is_empty() {
        return String::new();
    }
    let body: Vec<String> = props.iter().map(|(k, v)| format!("{}: {}", escape(k), v.to_cypher(env))).collect();
    format!(" {{ {} }}", body.join(", "))
}

/// A chain of nodes and relationships.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub start: NodePattern,
    pub chain: Vec<(RelPattern, NodePattern)>,
}

impl Pattern {
    pub fn new(start: NodePattern) -> Self {
        Self { start, chain: Vec::new() }
    }

    pub fn related(mut self, rel: RelPattern, to: NodePattern) -> Self {
        self.chain.push((rel, to));
        self
    }

    /// Flip every arrow; node order is kept.
    pub fn reverse(mut self) -> Self {
        for (rel, _) in &mut self.chain {
            rel.direction = rel.direction.reversed();
        }
        self
    }
}

impl From<NodePattern> for Pattern {
    fn from(start: NodePattern) -> Self {
        Pattern::new(start)
    }
}

impl ToCypher for Pattern {
    fn to_cypher(&self, env: &mut Environment) -> String {
        let mut out = self.start.to_cypher(env);
        for (rel, node) in &self.chain {
            out.push_str(&rel.to_cypher(env));
            out.push_str(&node.to_cypher(env));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher::{Param, build};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_simple_pattern() {
        let this = NodeRef::named("this", ["Movie"]);
        let actor = NodeRef::new(["Actor"]);
        let rel = RelationshipRef::new("ACTED_IN");
        let pattern = Pattern::new(NodePattern::bare(&this))
            .related(RelPattern::new(&rel, PatternDirection::Left), NodePattern::new(&actor));
        assert_eq!(build(&pattern).unwrap().cypher, "(this)<-[this0:ACTED_IN]-(this1:Actor)");
    }

    #[test]
    fn test_reverse_flips_glyphs_only() {
        let a = NodeRef::named("a", ["A"]);
        let b = NodeRef::named("b", ["B"]);
        let pattern = Pattern::new(NodePattern::new(&a))
            .related(RelPattern::anonymous("R", PatternDirection::Right), NodePattern::new(&b));
        let reversed = pattern.clone().reverse();
        assert_eq!(build(&reversed).unwrap().cypher, "(a:A)<-[:R]-(b:B)");
        assert_eq!(build(&reversed.reverse()).unwrap().cypher, build(&pattern).unwrap().cypher);
    }

    #[test]
    fn test_properties_and_escaping() {
        let n = NodeRef::named("n", ["My Label"]);
        let pattern = NodePattern::new(&n).with_properties([("id", Expr::from(Param::new(1)))]);
        let result = build(&pattern).unwrap();
        assert_eq!(result.cypher, "(n:`My Label` { id: $param0 })");
        assert_eq!(result.params.len(), 1);
    }

    #[test]
    fn test_variable_length() {
        let rel = RelPattern::anonymous("KNOWS", PatternDirection::Both).with_length(Some(1), Some(3));
        assert_eq!(build(&rel).unwrap().cypher, "-[:KNOWS*1..3]-");
        let rel = RelPattern::anonymous("KNOWS", PatternDirection::Right).with_length(Some(2), Some(2));
        assert_eq!(build(&rel).unwrap().cypher, "-[:KNOWS*2]->");
    }
}
