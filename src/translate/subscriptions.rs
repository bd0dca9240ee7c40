//! Change events emitted by mutations when subscriptions are enabled.
//!
//! Events accumulate in a `meta` list carried through the mutation and
//! come back as the `meta` column of the result.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

use crate::cypher::functions::{collect, id, timestamp};
use crate::cypher::{Clause, Expr, MapEntry, Projection, Variable};
use crate::execute::Record;
use crate::{Error, Result};

/// The list every event is appended to.
pub(crate) fn meta() -> Variable {
    Variable::named("meta")
}

/// `WITH [] AS meta`
pub(crate) fn init_meta(meta: &Variable) -> Clause {
    Clause::with(Projection::new().alias(Expr::List(Vec::new()), meta))
}

fn event(kind: &str, node: &Variable, old: Expr, new: Expr, typename: &str) -> Expr {
    Expr::map([
        ("event", Expr::string(kind)),
        ("id", id(node)),
        ("properties", Expr::map([("old", old), ("new", new)])),
        ("timestamp", timestamp()),
        ("typename", Expr::string(typename)),
    ])
}

fn all_properties(node: &Variable) -> Expr {
    Expr::projection(node, [MapEntry::All])
}

pub(crate) fn create_event(node: &Variable, typename: &str) -> Expr {
    event("create", node, Expr::null(), all_properties(node), typename)
}

/// `old` is the `this { .* }` snapshot taken before SET.
pub(crate) fn update_event(node: &Variable, old: &Variable, typename: &str) -> Expr {
    event("update", node, Expr::from(old), all_properties(node), typename)
}

pub(crate) fn delete_event(node: &Variable, typename: &str) -> Expr {
    event("delete", node, all_properties(node), Expr::null(), typename)
}

/// `WITH meta + event AS meta, scope...`
pub(crate) fn append(meta: &Variable, event: Expr, scope: &[Variable]) -> Clause {
    let projection = Projection::new().alias(Expr::from(meta).add(event), meta);
    Clause::with(scope.iter().fold(projection, |p, var| p.item(var)))
}

/// `REDUCE(m=[], n IN collect(meta) | m + n)`: merge the per-row event
/// lists of an aggregated result.
pub(crate) fn fold_collected(meta: &Variable) -> Expr {
    let acc = Variable::new();
    let item = Variable::new();
    Expr::reduce(&acc, Expr::List(Vec::new()), &item, collect(meta), Expr::from(&acc).add(&item))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventProperties {
    pub old: Option<Map<String, Json>>,
    pub new: Option<Map<String, Json>>,
}

/// One change event as returned in the `meta` column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMeta {
    pub event: EventType,
    pub id: i64,
    pub properties: EventProperties,
    pub timestamp: i64,
    pub typename: String,
}

impl EventMeta {
    /// Decode the `meta` column of every record, in emission order.
    ///
    /// Nested deletes fan out into one row per matched path, so the same
    /// event can be collected more than once; exact repeats are dropped.
    pub fn from_records(records: &[Record]) -> Result<Vec<EventMeta>> {
        let mut events: Vec<EventMeta> = Vec::new();
        for record in records {
            let Some(meta) = record.get("meta") else { continue };
            let items = match meta {
                Json::Null => continue,
                Json::Array(items) => items.as_slice(),
                single => std::slice::from_ref(single),
            };
            for item in items {
                let event: EventMeta = serde_json::from_value(item.clone())
                    .map_err(|e| Error::InvalidArgument(format!("malformed event metadata: {e}")))?;
                if !events.contains(&event) {
                    events.push(event);
                }
            }
        }
        Ok(events)
    }
}
