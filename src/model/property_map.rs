//! PropertyMap: the flat parameter map handed to the executor.

use std::collections::BTreeMap;
use super::Value;

/// A map of parameter (or property) names to values.
///
/// Ordered so that rendered parameter maps are stable across runs.
pub type PropertyMap = BTreeMap<String, Value>;

/// Convert a JSON object into a PropertyMap, converting each value.
pub(crate) fn from_json_object(map: &serde_json::Map<String, serde_json::Value>) -> PropertyMap {
    map.iter().map(|(k, v)| (k.clone(), Value::from(v))).collect()
}
