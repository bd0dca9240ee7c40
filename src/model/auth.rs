//! Declarative authorization rules (`@auth(rules: [...])`) and the decoded
//! request claims they are evaluated against.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use super::Value;
use super::property_map::from_json_object;

/// Operation an auth rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthOperation {
    Create,
    Read,
    Update,
    Delete,
    Connect,
    Disconnect,
}

/// One `@auth` rule.
///
/// `allow`, `where` and `bind` hold where-style filter objects whose values
/// may reference claims as `"$jwt.path"` or `"$context.path"`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthRule {
    /// `None` means every operation.
    pub operations: Option<Vec<AuthOperation>>,
    pub is_authenticated: Option<bool>,
    pub roles: Vec<String>,
    pub allow: Option<Map<String, Json>>,
    #[serde(rename = "where")]
    pub where_: Option<Map<String, Json>>,
    pub bind: Option<Map<String, Json>>,
    pub allow_unauthenticated: bool,
    #[serde(rename = "AND")]
    pub and: Vec<AuthRule>,
    #[serde(rename = "OR")]
    pub or: Vec<AuthRule>,
}

impl AuthRule {
    pub fn applies_to(&self, op: AuthOperation) -> bool {
        self.operations.as_ref().is_none_or(|ops| ops.contains(&op))
    }
}

/// All auth rules declared on a type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Auth {
    pub rules: Vec<AuthRule>,
}

/// Decoded claims of the current request. Produced by an external
/// authentication layer; never verified here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthContext {
    pub is_authenticated: bool,
    pub roles: Vec<String>,
    pub jwt: Map<String, Json>,
    /// Extra request context addressable as `$context.path`.
    pub context: Map<String, Json>,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Build from a decoded JWT payload; roles come from its `roles` claim.
    pub fn from_jwt(jwt: Map<String, Json>) -> Self {
        let roles = jwt
            .get("roles")
            .and_then(Json::as_array)
            .map(|roles| roles.iter().filter_map(|r| r.as_str().map(String::from)).collect())
            .unwrap_or_default();
        Self { is_authenticated: true, roles, jwt, context: Map::new() }
    }

    /// The value passed to Cypher as `$auth`.
    pub fn to_param_value(&self) -> Value {
        let mut map = std::collections::BTreeMap::new();
        map.insert("isAuthenticated".to_string(), Value::Bool(self.is_authenticated));
        map.insert(
            "roles".to_string(),
            Value::List(self.roles.iter().map(|r| Value::from(r.as_str())).collect()),
        );
        map.insert("jwt".to_string(), Value::Map(from_json_object(&self.jwt)));
        map.insert("context".to_string(), Value::Map(from_json_object(&self.context)));
        Value::Map(map)
    }
}
