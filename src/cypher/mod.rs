//! # Cypher Builder
//!
//! Clauses, patterns and expressions as composable values, rendered to
//! text through a per-render [`Environment`].
//! Pure functions: no I/O, no global naming state.

pub mod clause;
pub mod environment;
pub mod expr;
pub mod functions;
pub mod pattern;
pub mod variable;

pub use clause::{
    Call, Clause, Create, Delete, Match, Merge, Order, Procedure, Projection, SetItem, Unwind, concat,
};
pub use environment::{CypherResult, Environment};
pub use expr::{ApocMode, ApocRun, CompareOp, Expr, MapEntry, Quantifier, and, or};
pub use pattern::{NodePattern, Pattern, PatternDirection, RelPattern};
pub use variable::{NodeRef, Param, RelationshipRef, VarId, Variable};

use std::sync::LazyLock;

use regex::Regex;

use crate::Result;

/// Anything that renders to Cypher text.
pub trait ToCypher {
    fn to_cypher(&self, env: &mut Environment) -> String;
}

/// Render a tree into query text and its parameter map.
///
/// Renders twice: a scouting pass records every user-named variable and
/// parameter, the real pass keeps generated names clear of them.
pub fn build<T: ToCypher + ?Sized>(root: &T) -> Result<CypherResult> {
    let mut scout = Environment::new();
    root.to_cypher(&mut scout);

    let mut env = Environment::reserving(&scout);
    let cypher = root.to_cypher(&mut env);
    env.finish(cypher)
}

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Backtick-quote a label, type or key unless it is a plain identifier.
pub fn escape(name: &str) -> String {
    if IDENTIFIER.is_match(name) {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

/// Indent every line of a block.
pub(crate) fn pad_block(text: &str, spaces: usize) -> String {
    let pad = " ".repeat(spaces);
    text.lines()
        .map(|line| if line.is_empty() { String::new() } else { format!("{pad}{line}") })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape() {
        assert_eq!(escape("Movie"), "Movie");
        assert_eq!(escape("My Label"), "`My Label`");
        assert_eq!(escape("a`b"), "`a``b`");
        assert_eq!(escape("1st"), "`1st`");
    }

    #[test]
    fn test_pad_block() {
        assert_eq!(pad_block("MATCH (n)\nRETURN n", 2), "  MATCH (n)\n  RETURN n");
    }
}
