//! Generic document-store contract.
//!
//! Collections hold JSON objects. The store owns the opaque `id` key: it is
//! assigned by [`DocumentStore::insert_one`] and surfaced on every document read
//! back as a string field named `id`.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::DomainResult;
use crate::error::DomainError;
use crate::ports::BoxFuture;

pub type Document = Map<String, Value>;

pub const ID_FIELD: &str = "id";

#[derive(Clone, Debug, PartialEq)]
pub enum Condition {
    Id(String),
    Eq(String, Value),
    Gte(String, Value),
    Lte(String, Value),
}

/// Conjunction of conditions. An empty filter matches every document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<Condition>,
}

impl Filter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            conditions: vec![Condition::Id(id.into())],
        }
    }

    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Eq(field.into(), value.into()));
        self
    }

    pub fn gte(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Gte(field.into(), value.into()));
        self
    }

    pub fn lte(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions
            .push(Condition::Lte(field.into(), value.into()));
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn validate(&self) -> DomainResult<()> {
        for condition in &self.conditions {
            match condition {
                Condition::Id(_) => {}
                Condition::Eq(field, _) | Condition::Gte(field, _) | Condition::Lte(field, _) => {
                    validate_field_name(field)?
                }
            }
        }
        Ok(())
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.conditions.iter().all(|condition| match condition {
            Condition::Id(id) => document.get(ID_FIELD).and_then(Value::as_str) == Some(id),
            Condition::Eq(field, expected) => document.get(field) == Some(expected),
            Condition::Gte(field, bound) => document
                .get(field)
                .and_then(|value| compare_values(value, bound))
                .is_some_and(|ordering| ordering != Ordering::Less),
            Condition::Lte(field, bound) => document
                .get(field)
                .and_then(|value| compare_values(value, bound))
                .is_some_and(|ordering| ordering != Ordering::Greater),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub descending: bool,
}

impl Sort {
    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: true,
        }
    }

    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            descending: false,
        }
    }

    /// Orders two documents; documents missing the field sort last.
    pub fn compare(&self, left: &Document, right: &Document) -> Ordering {
        let ordering = match (left.get(&self.field), right.get(&self.field)) {
            (Some(a), Some(b)) => compare_values(a, b).unwrap_or(Ordering::Equal),
            (Some(_), None) => return Ordering::Less,
            (None, Some(_)) => return Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

/// Single-document mutation. `set` overwrites fields; `push` appends one value
/// to an array field. Stores apply both halves as one atomic write.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UpdatePatch {
    pub set: Document,
    pub push: Vec<(String, Value)>,
}

impl UpdatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(field.into(), value.into());
        self
    }

    pub fn push(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push.push((field.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.push.is_empty()
    }

    pub fn validate(&self) -> DomainResult<()> {
        for field in self.set.keys().chain(self.push.iter().map(|(field, _)| field)) {
            validate_field_name(field)?;
            if field == ID_FIELD {
                return Err(DomainError::Validation(
                    "document id cannot be updated".into(),
                ));
            }
        }
        Ok(())
    }

    /// Applies the patch in place and reports whether the document changed.
    pub fn apply_to(&self, document: &mut Document) -> DomainResult<bool> {
        let before = document.clone();
        for (field, value) in &self.set {
            document.insert(field.clone(), value.clone());
        }
        for (field, value) in &self.push {
            let slot = document
                .entry(field.clone())
                .or_insert_with(|| Value::Array(Vec::new()));
            match slot {
                Value::Array(items) => items.push(value.clone()),
                Value::Null => *slot = Value::Array(vec![value.clone()]),
                _ => {
                    return Err(DomainError::Persistence(format!(
                        "cannot append to non-array field '{field}'"
                    )));
                }
            }
        }
        Ok(*document != before)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Aggregation {
    /// One group keyed `null` holding the number of documents.
    Count,
    /// One group per distinct value of `field`; a missing field groups under `null`.
    CountBy { field: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupCount {
    pub key: Value,
    pub count: u64,
}

pub fn validate_field_name(field: &str) -> DomainResult<()> {
    if field.is_empty()
        || !field
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
    {
        return Err(DomainError::Validation(format!(
            "invalid field name '{field}'"
        )));
    }
    Ok(())
}

fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[allow(clippy::needless_pass_by_value)]
pub trait DocumentStore: Send + Sync {
    fn find_one(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> BoxFuture<'_, DomainResult<Option<Document>>>;

    fn find(
        &self,
        collection: &str,
        filter: &Filter,
        sort: Option<&Sort>,
    ) -> BoxFuture<'_, DomainResult<Vec<Document>>>;

    fn insert_one(&self, collection: &str, document: Document)
    -> BoxFuture<'_, DomainResult<String>>;

    fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        patch: &UpdatePatch,
    ) -> BoxFuture<'_, DomainResult<u64>>;

    fn delete_one(&self, collection: &str, filter: &Filter) -> BoxFuture<'_, DomainResult<u64>>;

    fn aggregate(
        &self,
        collection: &str,
        aggregation: &Aggregation,
    ) -> BoxFuture<'_, DomainResult<Vec<GroupCount>>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn filter_matches_id_and_fields() {
        let document = doc(json!({ "id": "abc", "status": "open", "createdAtMs": 10 }));
        assert!(Filter::all().matches(&document));
        assert!(Filter::by_id("abc").eq("status", "open").matches(&document));
        assert!(!Filter::by_id("abc").eq("status", "closed").matches(&document));
        assert!(Filter::all().gte("createdAtMs", 10).lte("createdAtMs", 20).matches(&document));
        assert!(!Filter::all().gte("createdAtMs", 11).matches(&document));
        assert!(!Filter::all().eq("missing", "x").matches(&document));
    }

    #[test]
    fn filter_rejects_unsafe_field_names() {
        assert!(Filter::all().eq("status; DELETE", "x").validate().is_err());
        assert!(Filter::all().eq("caseId", "x").validate().is_ok());
    }

    #[test]
    fn patch_appends_to_arrays_and_reports_change() {
        let mut document = doc(json!({ "log": [1], "name": "a" }));
        let patch = UpdatePatch::new().push("log", 2).push("fresh", "x");
        assert!(patch.apply_to(&mut document).expect("apply"));
        assert_eq!(document.get("log"), Some(&json!([1, 2])));
        assert_eq!(document.get("fresh"), Some(&json!(["x"])));

        let unchanged = UpdatePatch::new().set("name", "a");
        assert!(!unchanged.apply_to(&mut document).expect("apply"));
    }

    #[test]
    fn patch_refuses_to_append_to_scalar() {
        let mut document = doc(json!({ "name": "a" }));
        let patch = UpdatePatch::new().push("name", "b");
        assert!(patch.apply_to(&mut document).is_err());
    }

    #[test]
    fn patch_cannot_touch_id() {
        assert!(UpdatePatch::new().set("id", "x").validate().is_err());
    }

    #[test]
    fn sort_descending_puts_missing_last() {
        let sort = Sort::descending("createdAtMs");
        let newer = doc(json!({ "createdAtMs": 2 }));
        let older = doc(json!({ "createdAtMs": 1 }));
        let missing = doc(json!({}));
        assert_eq!(sort.compare(&newer, &older), Ordering::Less);
        assert_eq!(sort.compare(&missing, &older), Ordering::Greater);
    }
}
