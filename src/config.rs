//! Translation and execution settings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Allow `_MATCHES` filters.
    pub enable_regex: bool,
    /// Emit change-event metadata from mutations.
    pub subscriptions: bool,
    /// Prepended as `CYPHER key=value ...`.
    pub query_options: BTreeMap<String, String>,
    pub database: Option<String>,
    pub bookmarks: Vec<String>,
}

impl Config {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// `CYPHER runtime=interpreted`, or `None` without options.
    pub fn query_prefix(&self) -> Option<String> {
        if self.query_options.is_empty() {
            return None;
        }
        let options: Vec<String> = self.query_options.iter().map(|(k, v)| format!("{k}={v}")).collect();
        Some(format!("CYPHER {}", options.join(" ")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_defaults() {
        let config = Config::from_json(r#"{ "enableRegex": true }"#).unwrap();
        assert!(config.enable_regex);
        assert!(!config.subscriptions);
        assert!(config.query_prefix().is_none());
    }

    #[test]
    fn test_query_prefix() {
        let config =
            Config::from_json(r#"{ "queryOptions": { "runtime": "interpreted", "planner": "cost" } }"#).unwrap();
        assert_eq!(config.query_prefix().unwrap(), "CYPHER planner=cost runtime=interpreted");
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(Config::from_json("{ nope"), Err(Error::Config(_))));
    }
}
