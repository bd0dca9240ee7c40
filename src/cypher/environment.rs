//! Environment: the per-render naming and parameter registry.

use hashbrown::{HashMap, HashSet};
use serde::Serialize;

use super::variable::{Param, VarId, VarName, Variable};
use crate::model::PropertyMap;
use crate::{Error, Result};

/// Rendered query text plus its parameter map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CypherResult {
    pub cypher: String,
    pub params: PropertyMap,
}

/// Assigns names to variables and parameters during one render.
///
/// Same [`VarId`] → same name; distinct ids never share a name. Generated
/// names come from one counter per namespace in traversal order, so two
/// fresh environments name the same tree identically.
#[derive(Debug, Default)]
pub struct Environment {
    names: HashMap<VarId, String>,
    used_vars: HashSet<String>,
    reserved_vars: HashSet<String>,
    reserved_params: HashSet<String>,
    named_vars: HashSet<String>,
    named_params: HashSet<String>,
    var_count: usize,
    param_count: usize,
    params: PropertyMap,
    collisions: Vec<String>,
    captures: Vec<Vec<String>>,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Environment whose generated names avoid every name `scout` saw as a
    /// user-named variable or parameter.
    pub fn reserving(scout: &Environment) -> Self {
        Self {
            reserved_vars: scout.named_vars.clone(),
            reserved_params: scout.named_params.clone(),
            ..Self::default()
        }
    }

    pub(crate) fn variable_name(&mut self, var: &Variable) -> String {
        if let Some(name) = self.names.get(&var.id) {
            return name.clone();
        }
        let name = match &var.name {
            VarName::Named(name) => {
                self.named_vars.insert(name.clone());
                name.clone()
            }
            VarName::Generated(prefix) => loop {
                let candidate = format!("{prefix}{}", self.var_count);
                self.var_count += 1;
                if !self.reserved_vars.contains(&candidate) && !self.used_vars.contains(&candidate) {
                    break candidate;
                }
            },
        };
        self.used_vars.insert(name.clone());
        self.names.insert(var.id, name.clone());
        name
    }

    pub(crate) fn param_name(&mut self, param: &Param) -> String {
        let name = match self.names.get(&param.id) {
            Some(name) => name.clone(),
            None => {
                let name = match &param.name {
                    Some(name) => {
                        self.named_params.insert(name.clone());
                        if let Some(existing) = self.params.get(name)
                            && *existing != param.value
                        {
                            self.collisions.push(name.clone());
                        }
                        name.clone()
                    }
                    None => loop {
                        let candidate = format!("param{}", self.param_count);
                        self.param_count += 1;
                        if !self.reserved_params.contains(&candidate) && !self.params.contains_key(&candidate) {
                            break candidate;
                        }
                    },
                };
                self.params.insert(name.clone(), param.value.clone());
                self.names.insert(param.id, name.clone());
                name
            }
        };
        if let Some(frame) = self.captures.last_mut()
            && !frame.contains(&name)
        {
            frame.push(name.clone());
        }
        name
    }

    /// Run `f`, returning the names of every parameter it rendered.
    pub(crate) fn capture_params<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> (R, Vec<String>) {
        self.captures.push(Vec::new());
        let out = f(self);
        let captured = self.captures.pop().unwrap_or_default();
        if let Some(parent) = self.captures.last_mut() {
            for name in &captured {
                if !parent.contains(name) {
                    parent.push(name.clone());
                }
            }
        }
        (out, captured)
    }

    pub fn params(&self) -> &PropertyMap {
        &self.params
    }

    pub(crate) fn finish(self, cypher: String) -> Result<CypherResult> {
        if let Some(name) = self.collisions.into_iter().next() {
            return Err(Error::ParameterCollision(name));
        }
        Ok(CypherResult { cypher, params: self.params })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cypher::{Expr, build};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_generated_names_follow_traversal_order() {
        let a = Variable::new();
        let b = Variable::new();
        let expr = Expr::list([Expr::from(&b), Expr::from(&a), Expr::from(&b)]);
        assert_eq!(build(&expr).unwrap().cypher, "[var0, var1, var0]");
    }

    #[test]
    fn test_generated_names_skip_named() {
        let generated = Variable::new();
        let named = Variable::named("var0");
        let expr = Expr::list([Expr::from(&generated), Expr::from(&named)]);
        assert_eq!(build(&expr).unwrap().cypher, "[var1, var0]");
    }

    #[test]
    fn test_generated_params_skip_named() {
        let generated = Param::new(1);
        let named = Param::named("param0", 2);
        let expr = Expr::list([Expr::from(&generated), Expr::from(&named)]);
        let result = build(&expr).unwrap();
        assert_eq!(result.cypher, "[$param1, $param0]");
        assert_eq!(result.params["param0"], 2.into());
        assert_eq!(result.params["param1"], 1.into());
    }

    #[test]
    fn test_named_param_collision() {
        let a = Param::named("auth", 1);
        let b = Param::named("auth", 2);
        let expr = Expr::list([Expr::from(&a), Expr::from(&b)]);
        assert!(matches!(build(&expr), Err(Error::ParameterCollision(n)) if n == "auth"));

        let c = Param::named("auth", 1);
        let expr = Expr::list([Expr::from(&a), Expr::from(&c)]);
        assert_eq!(build(&expr).unwrap().params.len(), 1);
    }

    #[test]
    fn test_capture_params() {
        let mut env = Environment::new();
        let outer = Param::new("a");
        let inner = Param::new("b");
        env.param_name(&outer);
        let (_, captured) = env.capture_params(|env| {
            env.param_name(&inner);
            env.param_name(&outer);
        });
        assert_eq!(captured, vec!["param1".to_string(), "param0".to_string()]);
    }
}
