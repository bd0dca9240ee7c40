//! Node descriptor: one GraphQL object type backed by labelled nodes.

use serde::{Deserialize, Serialize};

use super::auth::Auth;
use super::field::{Field, FieldKind};
use super::relationship::RelationField;

/// `@fulltext(indexes: [{ name, fields }])`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FulltextIndex {
    pub name: String,
    pub fields: Vec<String>,
}

/// Names of the generated root fields for a node type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootFieldNames {
    pub create: String,
    pub read: String,
    pub connection: String,
    pub update: String,
    pub delete: String,
    pub aggregate: String,
}

/// Schema metadata for a node type. Built once with the schema and
/// read-only while translating requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub name: String,
    /// `@node(labels: [...])`; when empty the type name is the only label.
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub auth: Option<Auth>,
    #[serde(default)]
    pub fulltext: Vec<FulltextIndex>,
    /// `@plural(value: ...)`
    #[serde(default)]
    pub plural: Option<String>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: Vec::new(),
            fields: Vec::new(),
            auth: None,
            fulltext: Vec::new(),
            plural: None,
        }
    }

    pub fn with_fields(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn with_labels(mut self, labels: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_auth(mut self, auth: Auth) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_fulltext(mut self, index: FulltextIndex) -> Self {
        self.fulltext.push(index);
        self
    }

    pub fn main_label(&self) -> &str {
        self.labels.first().map(String::as_str).unwrap_or(&self.name)
    }

    pub fn labels(&self) -> Vec<String> {
        if self.labels.is_empty() {
            vec![self.name.clone()]
        } else {
            self.labels.clone()
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Relation field backing `<name>`, `<name>Connection` or `<name>Aggregate`.
    pub fn relation_field(&self, name: &str) -> Option<(&Field, &RelationField)> {
        let field = self.field(name)?;
        field.relationship().map(|r| (field, r))
    }

    pub fn connection_field(&self, name: &str) -> Option<(&Field, &RelationField)> {
        self.relation_field(name.strip_suffix("Connection")?)
    }

    pub fn aggregate_field(&self, name: &str) -> Option<(&Field, &RelationField)> {
        let (field, rel) = self.relation_field(name.strip_suffix("Aggregate")?)?;
        matches!(field.kind, FieldKind::Relation(_)).then_some((field, rel))
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| f.unique.is_some())
    }

    pub fn plural(&self) -> String {
        match &self.plural {
            Some(p) => camel_case(p),
            None => pluralize(&camel_case(&self.name)),
        }
    }

    pub fn root_field_names(&self) -> RootFieldNames {
        let plural = self.plural();
        let upper = upper_first(&plural);
        RootFieldNames {
            create: format!("create{upper}"),
            read: plural.clone(),
            connection: format!("{plural}Connection"),
            update: format!("update{upper}"),
            delete: format!("delete{upper}"),
            aggregate: format!("{plural}Aggregate"),
        }
    }
}

// ============================================================================
// Naming helpers
// ============================================================================

fn split_words(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut words = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        let prev = i.checked_sub(1).map(|p| chars[p]);
        let next = chars.get(i + 1).copied();
        let boundary = c.is_uppercase()
            && prev.is_some_and(|p| {
                p.is_lowercase()
                    || p.is_ascii_digit()
                    || (p.is_uppercase() && next.is_some_and(|n| n.is_lowercase()))
            });
        if boundary && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// `AWS_ACCOUNT` / `AWSAccount` → `awsAccount`
pub(crate) fn camel_case(s: &str) -> String {
    split_words(s)
        .iter()
        .enumerate()
        .map(|(i, w)| {
            let lower = w.to_lowercase();
            if i == 0 { lower } else { upper_first(&lower) }
        })
        .collect()
}

pub(crate) fn upper_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn pluralize(s: &str) -> String {
    let lower = s.to_lowercase();
    if lower.ends_with('s') || lower.ends_with('x') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{s}es")
    } else if lower.ends_with('y')
        && !lower.ends_with("ay")
        && !lower.ends_with("ey")
        && !lower.ends_with("oy")
        && !lower.ends_with("uy")
    {
        format!("{}ies", &s[..s.len() - 1])
    } else {
        format!("{s}s")
    }
}
