//! Clauses and their composition.

use super::environment::Environment;
use super::expr::Expr;
use super::pattern::Pattern;
use super::variable::Variable;
use super::{ToCypher, pad_block};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    Match(Match),
    With(Projection),
    Return(Projection),
    Call(Box<Call>),
    Create(Create),
    Merge(Merge),
    Set(Vec<SetItem>),
    Delete(Delete),
    Unwind(Unwind),
    Procedure(Procedure),
    /// Branches joined with `UNION`.
    Union(Vec<Clause>),
    /// Clauses joined with newlines, see [`concat`].
    Sequence(Vec<Clause>),
    /// Leaf text rendered verbatim.
    Raw(String),
}

/// Join the present clauses, in order, into one sequence.
pub fn concat(parts: impl IntoIterator<Item = Option<Clause>>) -> Clause {
    let mut flat = Vec::new();
    for part in parts.into_iter().flatten() {
        match part {
            Clause::Sequence(inner) => flat.extend(inner),
            other => flat.push(other),
        }
    }
    Clause::Sequence(flat)
}

impl Clause {
    pub fn with(projection: Projection) -> Self {
        Clause::With(projection)
    }

    pub fn ret(projection: Projection) -> Self {
        Clause::Return(projection)
    }

    pub fn set(items: impl IntoIterator<Item = SetItem>) -> Self {
        Clause::Set(items.into_iter().collect())
    }

    pub fn raw(text: impl Into<String>) -> Self {
        Clause::Raw(text.into())
    }

    /// True for a sequence with nothing in it.
    pub fn is_empty(&self) -> bool {
        match self {
            Clause::Sequence(parts) => parts.iter().all(Clause::is_empty),
            Clause::Set(items) => items.is_empty(),
            _ => false,
        }
    }
}

// ============================================================================
// MATCH
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub optional: bool,
    pub patterns: Vec<Pattern>,
    pub predicate: Option<Expr>,
}

impl Match {
    pub fn new(pattern: impl Into<Pattern>) -> Self {
        Self { optional: false, patterns: vec![pattern.into()], predicate: None }
    }

    pub fn optional(pattern: impl Into<Pattern>) -> Self {
        Self { optional: true, patterns: vec![pattern.into()], predicate: None }
    }

    /// AND another predicate into the WHERE.
    pub fn and_where(mut self, predicate: Option<Expr>) -> Self {
        self.predicate = super::expr::and([self.predicate.take(), predicate]);
        self
    }
}

impl ToCypher for Match {
    fn to_cypher(&self, env: &mut Environment) -> String {
        let keyword = if self.optional { "OPTIONAL MATCH" } else { "MATCH" };
        let patterns: Vec<String> = self.patterns.iter().map(|p| p.to_cypher(env)).collect();
        let mut out = format!("{keyword} {}", patterns.join(", "));
        if let Some(predicate) = &self.predicate {
            out.push_str(&format!("\nWHERE {}", predicate.to_cypher(env)));
        }
        out
    }
}

// ============================================================================
// WITH / RETURN
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// Projection shared by WITH and RETURN.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    pub star: bool,
    pub distinct: bool,
    pub items: Vec<(Expr, Option<Variable>)>,
    pub order_by: Vec<(Expr, Order)>,
    pub skip: Option<Expr>,
    pub limit: Option<Expr>,
    /// WHERE, for WITH only.
    pub predicate: Option<Expr>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Project each item under its own name.
    pub fn of(items: impl IntoIterator<Item = impl Into<Expr>>) -> Self {
        Self { items: items.into_iter().map(|e| (e.into(), None)).collect(), ..Self::default() }
    }

    pub fn star(mut self) -> Self {
        self.star = true;
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn item(mut self, expr: impl Into<Expr>) -> Self {
        self.items.push((expr.into(), None));
        self
    }

    /// `expr AS alias`
    pub fn alias(mut self, expr: impl Into<Expr>, alias: &Variable) -> Self {
        self.items.push((expr.into(), Some(alias.clone())));
        self
    }

    pub fn order_by(mut self, expr: Expr, order: Order) -> Self {
        self.order_by.push((expr, order));
        self
    }

    pub fn skip(mut self, skip: Option<Expr>) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: Option<Expr>) -> Self {
        self.limit = limit;
        self
    }

    pub fn and_where(mut self, predicate: Option<Expr>) -> Self {
        self.predicate = super::expr::and([self.predicate.take(), predicate]);
        self
    }

    fn render(&self, keyword: &str, env: &mut Environment) -> String {
        let mut items = Vec::new();
        if self.star {
            items.push("*".to_string());
        }
        for (expr, alias) in &self.items {
            let rendered = expr.to_cypher(env);
            match alias {
                Some(alias) => items.push(format!("{rendered} AS {}", alias.to_cypher(env))),
                None => items.push(rendered),
            }
        }
        let distinct = if self.distinct { "DISTINCT " } else { "" };
        let mut out = format!("{keyword} {distinct}{}", items.join(", "));

        if !self.order_by.is_empty() {
            let order: Vec<String> = self
                .order_by
                .iter()
                .map(|(expr, order)| {
                    let dir = match order {
                        Order::Asc => "ASC",
                        Order::Desc => "DESC",
                    };
                    format!("{} {dir}", expr.to_cypher(env))
                })
                .collect();
            out.push_str(&format!("\nORDER BY {}", order.join(", ")));
        }
        if let Some(skip) = &self.skip {
            out.push_str(&format!("\nSKIP {}", skip.to_cypher(env)));
        }
        if let Some(limit) = &self.limit {
            out.push_str(&format!("\nLIMIT {}", limit.to_cypher(env)));
        }
        if let Some(predicate) = &self.predicate {
            out.push_str(&format!("\nWHERE {}", predicate.to_cypher(env)));
        }
        out
    }
}

// ============================================================================
// CALL { ... }
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Import {
    Vars(Vec<Expr>),
    All,
}

/// Subquery: `CALL {\n  WITH x\n  ...\n}` with an optional trailing RETURN.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    body: Clause,
    import: Option<Import>,
    ret: Option<Projection>,
}

impl Call {
    pub fn new(body: Clause) -> Self {
        Self { body, import: None, ret: None }
    }

    /// Carry variables into the subquery scope. An empty list imports nothing.
    pub fn import_with(self, vars: impl IntoIterator<Item = impl Into<Expr>>) -> Result<Self> {
        let vars: Vec<Expr> = vars.into_iter().map(Into::into).collect();
        if vars.is_empty() {
            return Ok(self);
        }
        self.set_import(Import::Vars(vars))
    }

    /// `WITH *`
    pub fn import_all(self) -> Result<Self> {
        self.set_import(Import::All)
    }

    fn set_import(mut self, import: Import) -> Result<Self> {
        if self.import.is_some() {
            return Err(Error::ImportWithAlreadySet);
        }
        self.import = Some(import);
        Ok(self)
    }

    pub fn returning(mut self, ret: Projection) -> Self {
        self.ret = Some(ret);
        self
    }
}

impl ToCypher for Call {
    fn to_cypher(&self, env: &mut Environment) -> String {
        let mut body = String::new();
        match &self.import {
            Some(Import::Vars(vars)) => {
                let vars: Vec<String> = vars.iter().map(|v| v.to_cypher(env)).collect();
                body.push_str(&format!("WITH {}\n", vars.join(", ")));
            }
            Some(Import::All) => body.push_str("WITH *\n"),
            None => {}
        }
        body.push_str(&self.body.to_cypher(env));

        let mut out = format!("CALL {{\n{}\n}}", pad_block(&body, 2));
        if let Some(ret) = &self.ret {
            out.push('\n');
            out.push_str(&ret.render("RETURN", env));
        }
        out
    }
}

impl From<Call> for Clause {
    fn from(call: Call) -> Self {
        Clause::Call(Box::new(call))
    }
}

// ============================================================================
// Writes
// ============================================================================

/// `target = value`
#[derive(Debug, Clone, PartialEq)]
pub struct SetItem {
    pub target: Expr,
    pub value: Expr,
}

impl SetItem {
    pub fn new(target: Expr, value: impl Into<Expr>) -> Self {
        Self { target, value: value.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Create {
    pub pattern: Pattern,
    pub set: Vec<SetItem>,
}

impl Create {
    pub fn new(pattern: impl Into<Pattern>) -> Self {
        Self { pattern: pattern.into(), set: Vec::new() }
    }

    pub fn set(mut self, items: impl IntoIterator<Item = SetItem>) -> Self {
        self.set.extend(items);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Merge {
    pub pattern: Pattern,
}

impl Merge {
    pub fn new(pattern: impl Into<Pattern>) -> Self {
        Self { pattern: pattern.into() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub detach: bool,
    pub targets: Vec<Expr>,
}

impl Delete {
    pub fn new(targets: impl IntoIterator<Item = impl Into<Expr>>) -> Self {
        Self { detach: false, targets: targets.into_iter().map(Into::into).collect() }
    }

    pub fn detach(targets: impl IntoIterator<Item = impl Into<Expr>>) -> Self {
        Self { detach: true, ..Self::new(targets) }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unwind {
    pub list: Expr,
    pub alias: Variable,
}

impl Unwind {
    pub fn new(list: impl Into<Expr>, alias: &Variable) -> Self {
        Self { list: list.into(), alias: alias.clone() }
    }
}

/// Standalone procedure call: `CALL name(args) YIELD a AS b`.
#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    pub name: String,
    pub args: Vec<Expr>,
    pub yields: Vec<(String, Option<Variable>)>,
    pub predicate: Option<Expr>,
}

impl Procedure {
    pub fn new(name: impl Into<String>, args: impl IntoIterator<Item = Expr>) -> Self {
        Self { name: name.into(), args: args.into_iter().collect(), yields: Vec::new(), predicate: None }
    }

    /// `CALL apoc.util.validate(predicate, message, [0])`
    pub fn validate(predicate: Expr, message: &str) -> Self {
        Self::new(
            "apoc.util.validate",
            [predicate, Expr::string(message), Expr::list([Expr::literal(0)])],
        )
    }

    pub fn yield_as(mut self, column: impl Into<String>, alias: &Variable) -> Self {
        self.yields.push((column.into(), Some(alias.clone())));
        self
    }

    pub fn and_where(mut self, predicate: Option<Expr>) -> Self {
        self.predicate = super::expr::and([self.predicate.take(), predicate]);
        self
    }
}

fn render_set(items: &[SetItem], env: &mut Environment) -> String {
    let items: Vec<String> = items
        .iter()
        .map(|item| format!("{} = {}", item.target.to_cypher(env), item.value.to_cypher(env)))
        .collect();
    format!("SET {}", items.join(", "))
}

impl ToCypher for Clause {
    fn to_cypher(&self, env: &mut Environment) -> String {
        match self {
            Clause::Match(m) => m.to_cypher(env),
            Clause::With(p) => p.render("WITH", env),
            Clause::Return(p) => p.render("RETURN", env),
            Clause::Call(call) => call.to_cypher(env),
            Clause::Create(create) => {
                let mut out = format!("CREATE {}", create.pattern.to_cypher(env));
                if !create.set.is_empty() {
                    out.push('\n');
                    out.push_str(&render_set(&create.set, env));
                }
                out
            }
            Clause::Merge(merge) => format!("MERGE {}", merge.pattern.to_cypher(env)),
            Clause::Set(items) => render_set(items, env),
            Clause::Delete(delete) => {
                let keyword = if delete.detach { "DETACH DELETE" } else { "DELETE" };
                let targets: Vec<String> = delete.targets.iter().map(|t| t.to_cypher(env)).collect();
                format!("{keyword} {}", targets.join(", "))
            }
            Clause::Unwind(unwind) => {
                format!("UNWIND {} AS {}", unwind.list.to_cypher(env), unwind.alias.to_cypher(env))
            }
            Clause::Procedure(proc) => {
                let args: Vec<String> = proc.args.iter().map(|a| a.to_cypher(env)).collect();
                let mut out = format!("CALL {}({})", proc.name, args.join(", "));
                if !proc.yields.is_empty() {
                    let yields: Vec<String> = proc
                        .yields
                        .iter()
                        .map(|(column, alias)| match alias {
                            Some(alias) => format!("{column} AS {}", alias.to_cypher(env)),
                            None => column.clone(),
                        })
                        .collect();
                    out.push_str(&format!(" YIELD {}", yields.join(", ")));
                }
                if let Some(predicate) = &proc.predicate {
                    out.push_str(&format!("\nWHERE {}", predicate.to_cypher(env)));
                }
                out
            }
            Clause::Union(branches) => {
                let branches: Vec<String> = branches.iter().map(|b| b.to_cypher(env)).collect();
                branches.join("\nUNION\n")
            }
            Clause::Sequence(parts) => {
                let parts: Vec<String> =
                    parts.iter().map(|p| p.to_cypher(env)).filter(|s| !s.is_empty()).collect();
                parts.join("\n")
            }
            Clause::Raw(text) => text.clone(),
        }
    }
}

macro_rules! impl_into_clause {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for Clause {
            fn from(value: $ty) -> Self {
                Clause::$variant(value)
            }
        })*
    };
}

impl_into_clause! {
    Match => Match,
    Create => Create,
    Merge => Merge,
    Delete => Delete,
    Unwind => Unwind,
    Procedure => Procedure,
}
