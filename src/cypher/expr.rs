//! Expressions and predicates.

use super::clause::Clause;
use super::environment::Environment;
use super::pattern::Pattern;
use super::variable::{NodeRef, Param, RelationshipRef, Variable};
use super::{ToCypher, escape};
use crate::model::Value;
use crate::model::value::quote;

/// Comparison and string operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    Contains,
    StartsWith,
    EndsWith,
    Matches,
    IsNull,
    IsNotNull,
}

impl CompareOp {
    fn as_str(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Neq => "<>",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::In => "IN",
            CompareOp::Contains => "CONTAINS",
            CompareOp::StartsWith => "STARTS WITH",
            CompareOp::EndsWith => "ENDS WITH",
            CompareOp::Matches => "=~",
            CompareOp::IsNull => "IS NULL",
            CompareOp::IsNotNull => "IS NOT NULL",
        }
    }
}

/// List predicate functions: `any(x IN list WHERE p)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Any,
    All,
    None,
    Single,
}

/// Entry of a map projection `this { .title, alias: expr, .* }`.
#[derive(Debug, Clone, PartialEq)]
pub enum MapEntry {
    Shorthand(String),
    Pair(String, Expr),
    All,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApocMode {
    /// `apoc.cypher.runFirstColumnMany`
    Many,
    /// `apoc.cypher.runFirstColumnSingle`
    Single,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ApocStatement {
    Clause(Clause),
    Raw(String),
}

/// A statement run through `apoc.cypher.runFirstColumn*`.
///
/// A built statement is rendered in the enclosing environment; every
/// parameter it references is forwarded through the argument map.
#[derive(Debug, Clone, PartialEq)]
pub struct ApocRun {
    pub(crate) mode: ApocMode,
    pub(crate) statement: ApocStatement,
    pub(crate) imports: Vec<Variable>,
    pub(crate) args: Vec<(String, Expr)>,
}

impl ApocRun {
    pub fn new(mode: ApocMode, statement: Clause) -> Self {
        Self { mode, statement: ApocStatement::Clause(statement), imports: Vec::new(), args: Vec::new() }
    }

    /// User-supplied statement text (`@cypher` fields).
    pub fn raw(mode: ApocMode, statement: impl Into<String>) -> Self {
        Self { mode, statement: ApocStatement::Raw(statement.into()), imports: Vec::new(), args: Vec::new() }
    }

    /// Pass a variable under its own rendered name: `{ this0: this0 }`.
    pub fn import(mut self, var: &Variable) -> Self {
        self.imports.push(var.clone());
        self
    }

    pub fn arg(mut self, key: impl Into<String>, value: impl Into<Expr>) -> Self {
        self.args.push((key.into(), value.into()));
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Variable(Variable),
    Param(Param),
    /// Inlined literal.
    Literal(Value),
    /// `subject.key`
    Property(Box<Expr>, String),
    List(Vec<Expr>),
    Map(Vec<(String, Expr)>),
    MapProjection(Variable, Vec<MapEntry>),
    Function { name: String, args: Vec<Expr>, distinct: bool },
    Compare { op: CompareOp, left: Box<Expr>, right: Option<Box<Expr>> },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Add(Box<Expr>, Box<Expr>),
    /// `[pattern WHERE p | map]`
    PatternComprehension { pattern: Box<Pattern>, predicate: Option<Box<Expr>>, map: Box<Expr> },
    /// `[x IN list WHERE p | map]`
    ListComprehension {
        var: Variable,
        list: Box<Expr>,
        predicate: Option<Box<Expr>>,
        map: Option<Box<Expr>>,
    },
    Quantified { kind: Quantifier, var: Variable, list: Box<Expr>, predicate: Box<Expr> },
    Case { branches: Vec<(Expr, Expr)>, otherwise: Option<Box<Expr>> },
    /// `REDUCE(acc=init, var IN list | expr)`
    Reduce { acc: Variable, init: Box<Expr>, var: Variable, list: Box<Expr>, expr: Box<Expr> },
    Apoc(Box<ApocRun>),
    /// Leaf text rendered verbatim.
    Raw(String),
}

// ============================================================================
// Constructors
// ============================================================================

/// AND of the present operands. `None` when none are present, the operand
/// itself when only one is.
pub fn and(operands: impl IntoIterator<Item = Option<Expr>>) -> Option<Expr> {
    combine(operands, Expr::And)
}

/// OR of the present operands, with the same collapsing rules as [`and`].
pub fn or(operands: impl IntoIterator<Item = Option<Expr>>) -> Option<Expr> {
    combine(operands, Expr::Or)
}

fn combine(operands: impl IntoIterator<Item = Option<Expr>>, wrap: fn(Vec<Expr>) -> Expr) -> Option<Expr> {
    let mut present: Vec<Expr> = operands.into_iter().flatten().collect();
    match present.len() {
        0 => None,
        1 => present.pop(),
        _ => Some(wrap(present)),
    }
}

impl Expr {
    pub fn literal(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    pub fn string(s: impl Into<String>) -> Self {
        Expr::Literal(Value::String(s.into()))
    }

    pub fn null() -> Self {
        Expr::Literal(Value::Null)
    }

    pub fn raw(text: impl Into<String>) -> Self {
        Expr::Raw(text.into())
    }

    pub fn list(items: impl IntoIterator<Item = Expr>) -> Self {
        Expr::List(items.into_iter().collect())
    }

    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Expr)>) -> Self {
        Expr::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    pub fn function(name: impl Into<String>, args: impl IntoIterator<Item = Expr>) -> Self {
        Expr::Function { name: name.into(), args: args.into_iter().collect(), distinct: false }
    }

    pub fn projection(var: &Variable, entries: impl IntoIterator<Item = MapEntry>) -> Self {
        Expr::MapProjection(var.clone(), entries.into_iter().collect())
    }

    pub fn pattern_comprehension(pattern: Pattern, predicate: Option<Expr>, map: Expr) -> Self {
        Expr::PatternComprehension {
            pattern: Box::new(pattern),
            predicate: predicate.map(Box::new),
            map: Box::new(map),
        }
    }

    pub fn list_comprehension(var: &Variable, list: Expr, predicate: Option<Expr>, map: Option<Expr>) -> Self {
        Expr::ListComprehension {
            var: var.clone(),
            list: Box::new(list),
            predicate: predicate.map(Box::new),
            map: map.map(Box::new),
        }
    }

    pub fn quantified(kind: Quantifier, var: &Variable, list: Expr, predicate: Expr) -> Self {
        Expr::Quantified { kind, var: var.clone(), list: Box::new(list), predicate: Box::new(predicate) }
    }

    pub fn case(branches: Vec<(Expr, Expr)>, otherwise: Option<Expr>) -> Self {
        Expr::Case { branches, otherwise: otherwise.map(Box::new) }
    }

    pub fn reduce(acc: &Variable, init: Expr, var: &Variable, list: Expr, expr: Expr) -> Self {
        Expr::Reduce {
            acc: acc.clone(),
            init: Box::new(init),
            var: var.clone(),
            list: Box::new(list),
            expr: Box::new(expr),
        }
    }

    pub fn apoc(run: ApocRun) -> Self {
        Expr::Apoc(Box::new(run))
    }

    // -- builders ------------------------------------------------------------

    pub fn property(self, key: impl Into<String>) -> Self {
        Expr::Property(Box::new(self), key.into())
    }

    fn compare(self, op: CompareOp, right: Expr) -> Self {
        Expr::Compare { op, left: Box::new(self), right: Some(Box::new(right)) }
    }

    pub fn eq(self, right: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Eq, right.into())
    }

    pub fn neq(self, right: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Neq, right.into())
    }

    pub fn lt(self, right: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Lt, right.into())
    }

    pub fn lte(self, right: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Lte, right.into())
    }

    pub fn gt(self, right: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Gt, right.into())
    }

    pub fn gte(self, right: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Gte, right.into())
    }

    pub fn in_list(self, list: impl Into<Expr>) -> Self {
        self.compare(CompareOp::In, list.into())
    }

    pub fn contains(self, right: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Contains, right.into())
    }

    pub fn starts_with(self, right: impl Into<Expr>) -> Self {
        self.compare(CompareOp::StartsWith, right.into())
    }

    pub fn ends_with(self, right: impl Into<Expr>) -> Self {
        self.compare(CompareOp::EndsWith, right.into())
    }

    pub fn matches(self, right: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Matches, right.into())
    }

    pub fn is_null(self) -> Self {
        Expr::Compare { op: CompareOp::IsNull, left: Box::new(self), right: None }
    }

    pub fn is_not_null(self) -> Self {
        Expr::Compare { op: CompareOp::IsNotNull, left: Box::new(self), right: None }
    }

    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    pub fn add(self, right: impl Into<Expr>) -> Self {
        Expr::Add(Box::new(self), Box::new(right.into()))
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<&Variable> for Expr {
    fn from(v: &Variable) -> Self {
        Expr::Variable(v.clone())
    }
}

impl From<Variable> for Expr {
    fn from(v: Variable) -> Self {
        Expr::Variable(v)
    }
}

impl From<&NodeRef> for Expr {
    fn from(n: &NodeRef) -> Self {
        Expr::Variable(n.var.clone())
    }
}

impl From<&RelationshipRef> for Expr {
    fn from(r: &RelationshipRef) -> Self {
        Expr::Variable(r.var.clone())
    }
}

impl From<&Param> for Expr {
    fn from(p: &Param) -> Self {
        Expr::Param(p.clone())
    }
}

impl From<Param> for Expr {
    fn from(p: Param) -> Self {
        Expr::Param(p)
    }
}

impl From<Value> for Expr {
    fn from(v: Value) -> Self {
        Expr::Literal(v)
    }
}

// ============================================================================
// Rendering
// ============================================================================

impl Expr {
    /// True when the rendered text brings its own parentheses in a nested
    /// boolean position.
    fn self_parenthesised(&self) -> bool {
        match self {
            Expr::And(ops) | Expr::Or(ops) if ops.len() == 1 => ops[0].self_parenthesised(),
            Expr::And(_) | Expr::Or(_) => true,
            _ => false,
        }
    }

    fn is_atomic(&self) -> bool {
        matches!(
            self,
            Expr::Variable(_)
                | Expr::Param(_)
                | Expr::Literal(_)
                | Expr::Property(..)
                | Expr::Function { .. }
                | Expr::Apoc(_)
        )
    }

    fn render(&self, env: &mut Environment, nested: bool) -> String {
        match self {
            Expr::Variable(v) => v.to_cypher(env),
            Expr::Param(p) => p.to_cypher(env),
            Expr::Literal(v) => v.to_string(),
            Expr::Property(subject, key) => format!("{}.{}", subject.to_cypher(env), escape(key)),
            Expr::List(items) => format!("[{}]", join(items, env, ", ")),
            Expr::Map(entries) => {
                if entries.is_empty() {
                    return "{}".to_string();
                }
                let body: Vec<String> =
                    entries.iter().map(|(k, v)| format!("{}: {}", escape(k), v.to_cypher(env))).collect();
                format!("{{ {} }}", body.join(", "))
            }
            Expr::MapProjection(var, entries) => {
                let subject = var.to_cypher(env);
                if entries.is_empty() {
                    return format!("{subject} {{}}");
                }
                let body: Vec<String> = entries
                    .iter()
                    .map(|entry| match entry {
                        MapEntry::Shorthand(key) => format!(".{}", escape(key)),
                        MapEntry::Pair(key, value) => format!("{}: {}", escape(key), value.to_cypher(env)),
                        MapEntry::All => ".*".to_string(),
                    })
                    .collect();
                format!("{subject} {{ {} }}", body.join(", "))
            }
            Expr::Function { name, args, distinct } => {
                let args = join(args, env, ", ");
                if *distinct { format!("{name}(DISTINCT {args})") } else { format!("{name}({args})") }
            }
            Expr::Compare { op, left, right } => {
                let left = left.to_cypher(env);
                match right {
                    Some(right) => format!("{left} {} {}", op.as_str(), right.to_cypher(env)),
                    None => format!("{left} {}", op.as_str()),
                }
            }
            Expr::And(ops) if ops.len() == 1 => ops[0].render(env, nested),
            Expr::Or(ops) if ops.len() == 1 => ops[0].render(env, nested),
            Expr::And(ops) => {
                let body: Vec<String> = ops.iter().map(|op| op.render(env, false)).collect();
                let body = body.join("\nAND ");
                if nested { format!("({body})") } else { body }
            }
            Expr::Or(ops) => {
                let body: Vec<String> = ops.iter().map(|op| op.render(env, true)).collect();
                format!("({})", body.join("\nOR "))
            }
            Expr::Not(inner) => {
                let rendered = inner.render(env, true);
                if inner.is_atomic() || inner.self_parenthesised() {
                    format!("NOT {rendered}")
                } else {
                    format!("NOT ({rendered})")
                }
            }
            Expr::Add(left, right) => format!("{} + {}", left.to_cypher(env), right.to_cypher(env)),
            Expr::PatternComprehension { pattern, predicate, map } => {
                let mut out = format!("[{}", pattern.to_cypher(env));
                if let Some(predicate) = predicate {
                    out.push_str(&format!(" WHERE {}", predicate.to_cypher(env)));
                }
                out.push_str(&format!(" | {}]", map.to_cypher(env)));
                out
            }
            Expr::ListComprehension { var, list, predicate, map } => {
                let mut out = format!("[{} IN {}", var.to_cypher(env), list.to_cypher(env));
                if let Some(predicate) = predicate {
                    out.push_str(&format!(" WHERE {}", predicate.to_cypher(env)));
                }
                if let Some(map) = map {
                    out.push_str(&format!(" | {}", map.to_cypher(env)));
                }
                out.push(']');
                out
            }
            Expr::Quantified { kind, var, list, predicate } => {
                let name = match kind {
                    Quantifier::Any => "any",
                    Quantifier::All => "all",
                    Quantifier::None => "none",
                    Quantifier::Single => "single",
                };
                format!(
                    "{name}({} IN {} WHERE {})",
                    var.to_cypher(env),
                    list.to_cypher(env),
                    predicate.to_cypher(env)
                )
            }
            Expr::Case { branches, otherwise } => {
                let mut out = String::from("CASE");
                for (when, then) in branches {
                    out.push_str(&format!(" WHEN {} THEN {}", when.to_cypher(env), then.to_cypher(env)));
                }
                if let Some(otherwise) = otherwise {
                    out.push_str(&format!(" ELSE {}", otherwise.to_cypher(env)));
                }
                out.push_str(" END");
                out
            }
            Expr::Reduce { acc, init, var, list, expr } => format!(
                "REDUCE({}={}, {} IN {} | {})",
                acc.to_cypher(env),
                init.to_cypher(env),
                var.to_cypher(env),
                list.to_cypher(env),
                expr.to_cypher(env)
            ),
            Expr::Apoc(run) => run.to_cypher(env),
            Expr::Raw(text) => text.clone(),
        }
    }
}

fn join(items: &[Expr], env: &mut Environment, sep: &str) -> String {
    items.iter().map(|item| item.to_cypher(env)).collect::<Vec<_>>().join(sep)
}

impl ToCypher for Expr {
    fn to_cypher(&self, env: &mut Environment) -> String {
        self.render(env, false)
    }
}

impl ToCypher for ApocRun {
    fn to_cypher(&self, env: &mut Environment) -> String {
        let function = match self.mode {
            ApocMode::Many => "apoc.cypher.runFirstColumnMany",
            ApocMode::Single => "apoc.cypher.runFirstColumnSingle",
        };
        let (statement, captured) = match &self.statement {
            ApocStatement::Clause(clause) => env.capture_params(|env| clause.to_cypher(env)),
            ApocStatement::Raw(text) => (text.clone(), Vec::new()),
        };

        let mut entries: Vec<String> = self
            .imports
            .iter()
            .map(|var| {
                let name = var.to_cypher(env);
                format!("{name}: {name}")
            })
            .collect();
        entries.extend(self.args.iter().map(|(k, v)| format!("{}: {}", escape(k), v.to_cypher(env))));
        for name in captured {
            if !self.args.iter().any(|(k, _)| *k == name) {
                entries.push(format!("{name}: ${name}"));
            }
        }
        let args = if entries.is_empty() { "{}".to_string() } else { format!("{{ {} }}", entries.join(", ")) };
        format!("{function}({}, {args})", quote(&statement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher::build;
    use pretty_assertions::assert_eq;

    fn render(expr: &Expr) -> String {
        build(expr).unwrap().cypher
    }

    #[test]
    fn test_and_single_operand_unwrapped() {
        let this = Variable::named("this");
        let a = this.property("a").eq(Expr::literal(1));
        let b = this.property("b").eq(Expr::literal(2));

        assert_eq!(render(&and([Some(a.clone()), None]).unwrap()), "this.a = 1");
        assert_eq!(render(&and([Some(a.clone()), Some(b.clone())]).unwrap()), "this.a = 1\nAND this.b = 2");
        assert!(and([None, None]).is_none());
    }

    #[test]
    fn test_or_wraps() {
        let this = Variable::named("this");
        let a = this.property("a").eq(Expr::literal(1));
        let b = this.property("b").eq(Expr::literal(2));
        assert_eq!(render(&or([Some(a), Some(b)]).unwrap()), "(this.a = 1\nOR this.b = 2)");
    }

    #[test]
    fn test_and_nested_under_or_and_not() {
        let this = Variable::named("this");
        let a = || Some(this.property("a").eq(Expr::literal(1)));
        let b = || Some(this.property("b").eq(Expr::literal(2)));
        let c = || Some(this.property("c").eq(Expr::literal(3)));

        let nested = or([and([a(), b()]), c()]).unwrap();
        assert_eq!(render(&nested), "((this.a = 1\nAND this.b = 2)\nOR this.c = 3)");

        let negated = and([a(), b()]).unwrap().not();
        assert_eq!(render(&negated), "NOT (this.a = 1\nAND this.b = 2)");

        let outer = and([or([a(), b()]), c()]).unwrap();
        assert_eq!(render(&outer), "(this.a = 1\nOR this.b = 2)\nAND this.c = 3");

        assert_eq!(render(&a().unwrap().not()), "NOT (this.a = 1)");
    }

    #[test]
    fn test_map_and_projection() {
        let this = Variable::named("this");
        let p = Param::new("x");
        let map = Expr::map([("title", Expr::from(&p)), ("my key", Expr::literal(1))]);
        assert_eq!(render(&map), "{ title: $param0, `my key`: 1 }");
        assert_eq!(render(&Expr::map(Vec::<(String, Expr)>::new())), "{}");

        let projection = Expr::projection(
            &this,
            [MapEntry::Shorthand("title".into()), MapEntry::Pair("n".into(), Expr::literal(1)), MapEntry::All],
        );
        assert_eq!(render(&projection), "this { .title, n: 1, .* }");
    }

    #[test]
    fn test_comprehensions_and_quantifiers() {
        let role = Variable::new();
        let list = Param::named("auth", Value::Null).property("roles");
        let any = Expr::quantified(Quantifier::Any, &role, list, Expr::from(&role).eq(Expr::string("admin")));
        assert_eq!(render(&any), "any(var0 IN $auth.roles WHERE var0 = \"admin\")");

        let x = Variable::new();
        let comprehension = Expr::list_comprehension(
            &x,
            Expr::raw("[1, 2]"),
            None,
            Some(Expr::function("point", [Expr::from(&x)])),
        );
        assert_eq!(render(&comprehension), "[var0 IN [1, 2] | point(var0)]");
    }

    #[test]
    fn test_reduce_and_case() {
        let m = Variable::named("m");
        let n = Variable::named("n");
        let meta = Variable::named("meta");
        let reduce = Expr::reduce(&m, Expr::from(&meta), &n, Expr::raw("xs"), Expr::from(&m).add(&n));
        assert_eq!(render(&reduce), "REDUCE(m=meta, n IN xs | m + n)");

        let this = Variable::named("this");
        let case = Expr::case(
            vec![(this.property("p").is_not_null(), this.property("p"))],
            Some(Expr::null()),
        );
        assert_eq!(render(&case), "CASE WHEN this.p IS NOT NULL THEN this.p ELSE NULL END");
    }

    #[test]
    fn test_apoc_forwards_captured_params() {
        let this = Variable::new();
        let body = Clause::ret(
            crate::cypher::Projection::new().item(Expr::from(&this).property("a").eq(Param::new(1))),
        );
        let run = ApocRun::new(ApocMode::Many, body).import(&this);
        let result = build(&Expr::apoc(run)).unwrap();
        assert_eq!(
            result.cypher,
            r#"apoc.cypher.runFirstColumnMany("RETURN var0.a = $param0", { var0: var0, param0: $param0 })"#
        );
        assert_eq!(result.params.len(), 1);
    }

    #[test]
    fn test_apoc_raw_statement() {
        let this = Variable::named("this");
        let run = ApocRun::raw(ApocMode::Single, "RETURN \"x\"").arg("this", &this);
        assert_eq!(
            render(&Expr::apoc(run)),
            r#"apoc.cypher.runFirstColumnSingle("RETURN \"x\"", { this: this })"#
        );
    }
}
