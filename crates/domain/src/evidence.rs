use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::DomainResult;
use crate::error::DomainError;
use crate::identifiers;
use crate::ports::documents::{
    Aggregation, Document, DocumentStore, Filter, GroupCount, ID_FIELD, Sort, UpdatePatch,
};
use crate::util::now_ms;

pub const EVIDENCE_COLLECTION: &str = "evidence";

pub const INITIAL_CUSTODY_ACTION: &str = "collected";
pub const INITIAL_CUSTODY_NOTES: &str = "Initial evidence collection";
pub const UNKNOWN_OFFICER: &str = "Unknown Officer";
pub const UNKNOWN_LOCATION: &str = "Unknown Location";
pub const DEFAULT_CONDITION: &str = "Good";
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

const FIELD_EVIDENCE_NUMBER: &str = "evidenceNumber";
const FIELD_CASE_ID: &str = "caseId";
const FIELD_OB_ID: &str = "obId";
const FIELD_STATUS: &str = "status";
const FIELD_TYPE: &str = "type";
const FIELD_CUSTODY_LOG: &str = "custodyLog";
const FIELD_MEDIA: &str = "media";
const FIELD_CREATED_AT: &str = "createdAtMs";
const FIELD_UPDATED_AT: &str = "updatedAtMs";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustodyEntry {
    pub action: String,
    pub officer: String,
    pub timestamp_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAttachment {
    pub name: String,
    pub url: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    pub uploaded_at_ms: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceRecord {
    pub id: String,
    pub evidence_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ob_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub evidence_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_condition")]
    pub condition: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collected_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_location: Option<String>,
    #[serde(default)]
    pub is_sealed: bool,
    #[serde(default)]
    pub bags_sealed: bool,
    #[serde(default)]
    pub photographed: bool,
    #[serde(default)]
    pub fingerprinted: bool,
    #[serde(default)]
    pub dna_collected: bool,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub media: Vec<MediaAttachment>,
    pub custody_log: Vec<CustodyEntry>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

/// Candidate values for a new record. Everything is optional; the manager
/// fills defaults and owns the number, custody log and timestamps.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceCreate {
    pub evidence_number: Option<String>,
    pub case_id: Option<String>,
    pub ob_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub evidence_type: Option<String>,
    pub status: Option<String>,
    pub priority: Option<Priority>,
    pub condition: Option<String>,
    pub collected_by: Option<String>,
    pub location: Option<String>,
    pub storage_location: Option<String>,
    pub is_sealed: Option<bool>,
    pub bags_sealed: Option<bool>,
    pub photographed: Option<bool>,
    pub fingerprinted: Option<bool>,
    pub dna_collected: Option<bool>,
    pub tags: Option<Vec<String>>,
    pub media: Option<Vec<MediaFile>>,
}

/// Fields a general update may touch. Keys outside this set (the evidence
/// number, creation time, custody log, media) are dropped on deserialization.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub case_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ob_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub evidence_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collected_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_sealed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bags_sealed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photographed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprinted: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dna_collected: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl EvidenceUpdate {
    fn into_patch(mut self, now: i64) -> DomainResult<UpdatePatch> {
        self.tags = self.tags.map(normalize_tags);
        let value = serde_json::to_value(&self)
            .map_err(|err| DomainError::Validation(format!("invalid update payload: {err}")))?;
        let Value::Object(set) = value else {
            return Err(DomainError::Validation(
                "update payload must be an object".into(),
            ));
        };
        Ok(UpdatePatch {
            set,
            push: Vec::new(),
        }
        .set(FIELD_UPDATED_AT, now))
    }
}

/// A handling event as reported by the caller. The timestamp is stamped by
/// the manager when the entry is appended.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCustodyEntry {
    pub action: String,
    pub officer: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
}

impl NewCustodyEntry {
    fn into_entry(self, now: i64) -> DomainResult<CustodyEntry> {
        let action = self.action.trim().to_string();
        if action.is_empty() {
            return Err(DomainError::Validation("action is required".into()));
        }
        let officer = self.officer.trim().to_string();
        if officer.is_empty() {
            return Err(DomainError::Validation("officer is required".into()));
        }
        Ok(CustodyEntry {
            action,
            officer,
            timestamp_ms: now,
            notes: self.notes,
            location: self.location,
        })
    }
}

/// Reference to media already written to the blob store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaFile {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Set by the media service from the stored blob, never read from callers.
    #[serde(default, skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl MediaFile {
    fn into_attachment(self, now: i64) -> DomainResult<MediaAttachment> {
        if self.name.trim().is_empty() {
            return Err(DomainError::Validation("media name is required".into()));
        }
        if self.url.trim().is_empty() {
            return Err(DomainError::Validation("media url is required".into()));
        }
        Ok(MediaAttachment {
            name: self.name,
            url: self.url,
            content_type: self
                .content_type
                .filter(|value| !value.trim().is_empty())
                .unwrap_or_else(default_content_type),
            uploaded_at_ms: now,
            sha256: self.sha256,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: Option<String>,
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCount {
    #[serde(rename = "type")]
    pub evidence_type: Option<String>,
    pub count: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceStats {
    pub total: u64,
    pub by_status: Vec<StatusCount>,
    pub by_type: Vec<TypeCount>,
}

/// Evidence record manager. Sole writer of the evidence number, custody log
/// and timestamps; appends go through the store's atomic push so concurrent
/// handlers of the same item never lose an entry.
#[derive(Clone)]
pub struct EvidenceService {
    store: Arc<dyn DocumentStore>,
}

impl EvidenceService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, input: EvidenceCreate) -> DomainResult<EvidenceRecord> {
        let supplied = input
            .evidence_number
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        let evidence_number = match supplied {
            Some(number) => {
                if self.find_by_evidence_number(&number).await?.is_some() {
                    tracing::warn!(evidence_number = %number, "duplicate evidence number rejected");
                    return Err(DomainError::Conflict);
                }
                number
            }
            None => identifiers::evidence_number(),
        };

        let record = new_record(input, evidence_number, now_ms())?;
        let id = self
            .store
            .insert_one(EVIDENCE_COLLECTION, to_document(&record)?)
            .await?;
        tracing::info!(
            evidence_id = %id,
            evidence_number = %record.evidence_number,
            "evidence created"
        );

        self.find_by_id(&id).await?.ok_or_else(|| {
            DomainError::Persistence(format!("evidence {id} missing after insert"))
        })
    }

    pub async fn find_by_id(&self, id: &str) -> DomainResult<Option<EvidenceRecord>> {
        tracing::debug!(evidence_id = %id, "finding evidence by id");
        self.find_first(Filter::by_id(id)).await
    }

    pub async fn find_by_evidence_number(
        &self,
        evidence_number: &str,
    ) -> DomainResult<Option<EvidenceRecord>> {
        tracing::debug!(evidence_number, "finding evidence by number");
        self.find_first(Filter::all().eq(FIELD_EVIDENCE_NUMBER, evidence_number))
            .await
    }

    pub async fn find_by_case_id(&self, case_id: &str) -> DomainResult<Vec<EvidenceRecord>> {
        self.find_many(Filter::all().eq(FIELD_CASE_ID, case_id), None)
            .await
    }

    pub async fn find_by_ob_id(&self, ob_id: &str) -> DomainResult<Vec<EvidenceRecord>> {
        self.find_many(Filter::all().eq(FIELD_OB_ID, ob_id), None)
            .await
    }

    pub async fn find_by_status(&self, status: &str) -> DomainResult<Vec<EvidenceRecord>> {
        self.find_many(Filter::all().eq(FIELD_STATUS, status), None)
            .await
    }

    pub async fn find_by_type(&self, evidence_type: &str) -> DomainResult<Vec<EvidenceRecord>> {
        self.find_many(Filter::all().eq(FIELD_TYPE, evidence_type), None)
            .await
    }

    /// Most recently created first.
    pub async fn find_all(&self) -> DomainResult<Vec<EvidenceRecord>> {
        let records = self
            .find_many(Filter::all(), Some(Sort::descending(FIELD_CREATED_AT)))
            .await?;
        tracing::debug!(count = records.len(), "listed evidence");
        Ok(records)
    }

    /// General field update. Returns whether the store reported a change;
    /// an unknown id is a plain `false`.
    pub async fn update(&self, id: &str, input: EvidenceUpdate) -> DomainResult<bool> {
        let patch = input.into_patch(now_ms())?;
        let modified = self
            .store
            .update_one(EVIDENCE_COLLECTION, &Filter::by_id(id), &patch)
            .await?;
        tracing::info!(evidence_id = %id, applied = modified > 0, "evidence updated");
        Ok(modified > 0)
    }

    pub async fn add_custody_entry(&self, id: &str, input: NewCustodyEntry) -> DomainResult<bool> {
        let now = now_ms();
        let entry = input.into_entry(now)?;
        let value = serde_json::to_value(&entry)
            .map_err(|err| DomainError::Validation(format!("invalid custody entry: {err}")))?;
        let patch = UpdatePatch::new()
            .push(FIELD_CUSTODY_LOG, value)
            .set(FIELD_UPDATED_AT, now);
        let modified = self
            .store
            .update_one(EVIDENCE_COLLECTION, &Filter::by_id(id), &patch)
            .await?;
        tracing::info!(
            evidence_id = %id,
            action = %entry.action,
            officer = %entry.officer,
            applied = modified > 0,
            "custody entry appended"
        );
        Ok(modified > 0)
    }

    pub async fn add_media(&self, id: &str, media: MediaFile) -> DomainResult<bool> {
        let now = now_ms();
        let attachment = media.into_attachment(now)?;
        let value = serde_json::to_value(&attachment)
            .map_err(|err| DomainError::Validation(format!("invalid media: {err}")))?;
        let patch = UpdatePatch::new()
            .push(FIELD_MEDIA, value)
            .set(FIELD_UPDATED_AT, now);
        let modified = self
            .store
            .update_one(EVIDENCE_COLLECTION, &Filter::by_id(id), &patch)
            .await?;
        tracing::info!(
            evidence_id = %id,
            media_url = %attachment.url,
            applied = modified > 0,
            "media attached"
        );
        Ok(modified > 0)
    }

    /// Hard delete. Blob content referenced from `media` is left in place.
    pub async fn delete(&self, id: &str) -> DomainResult<bool> {
        let deleted = self
            .store
            .delete_one(EVIDENCE_COLLECTION, &Filter::by_id(id))
            .await?;
        tracing::info!(evidence_id = %id, deleted = deleted > 0, "evidence delete");
        Ok(deleted > 0)
    }

    pub async fn stats(&self) -> DomainResult<EvidenceStats> {
        let total = self
            .store
            .aggregate(EVIDENCE_COLLECTION, &Aggregation::Count)
            .await?
            .iter()
            .map(|group| group.count)
            .sum();
        let by_status = self
            .group_counts(FIELD_STATUS)
            .await?
            .into_iter()
            .map(|(status, count)| StatusCount { status, count })
            .collect();
        let by_type = self
            .group_counts(FIELD_TYPE)
            .await?
            .into_iter()
            .map(|(evidence_type, count)| TypeCount {
                evidence_type,
                count,
            })
            .collect();
        Ok(EvidenceStats {
            total,
            by_status,
            by_type,
        })
    }

    async fn group_counts(&self, field: &str) -> DomainResult<Vec<(Option<String>, u64)>> {
        let groups = self
            .store
            .aggregate(
                EVIDENCE_COLLECTION,
                &Aggregation::CountBy {
                    field: field.to_string(),
                },
            )
            .await?;
        Ok(sort_groups(groups))
    }

    async fn find_first(&self, filter: Filter) -> DomainResult<Option<EvidenceRecord>> {
        self.store
            .find_one(EVIDENCE_COLLECTION, &filter)
            .await?
            .map(from_document)
            .transpose()
    }

    async fn find_many(
        &self,
        filter: Filter,
        sort: Option<Sort>,
    ) -> DomainResult<Vec<EvidenceRecord>> {
        self.store
            .find(EVIDENCE_COLLECTION, &filter, sort.as_ref())
            .await?
            .into_iter()
            .map(from_document)
            .collect()
    }
}

fn new_record(
    input: EvidenceCreate,
    evidence_number: String,
    now: i64,
) -> DomainResult<EvidenceRecord> {
    let initial_custody = CustodyEntry {
        action: INITIAL_CUSTODY_ACTION.to_string(),
        officer: non_blank(input.collected_by.as_deref())
            .unwrap_or(UNKNOWN_OFFICER)
            .to_string(),
        timestamp_ms: now,
        notes: Some(INITIAL_CUSTODY_NOTES.to_string()),
        location: Some(
            non_blank(input.location.as_deref())
                .unwrap_or(UNKNOWN_LOCATION)
                .to_string(),
        ),
    };
    let media = input
        .media
        .unwrap_or_default()
        .into_iter()
        .map(|file| file.into_attachment(now))
        .collect::<DomainResult<Vec<_>>>()?;

    Ok(EvidenceRecord {
        id: String::new(),
        evidence_number,
        case_id: input.case_id,
        ob_id: input.ob_id,
        title: input.title,
        description: input.description,
        evidence_type: input.evidence_type,
        status: input.status,
        priority: input.priority.unwrap_or_default(),
        condition: non_blank(input.condition.as_deref())
            .unwrap_or(DEFAULT_CONDITION)
            .to_string(),
        collected_by: input.collected_by,
        location: input.location,
        storage_location: input.storage_location,
        is_sealed: input.is_sealed.unwrap_or(false),
        bags_sealed: input.bags_sealed.unwrap_or(false),
        photographed: input.photographed.unwrap_or(false),
        fingerprinted: input.fingerprinted.unwrap_or(false),
        dna_collected: input.dna_collected.unwrap_or(false),
        tags: normalize_tags(input.tags.unwrap_or_default()),
        media,
        custody_log: vec![initial_custody],
        created_at_ms: now,
        updated_at_ms: now,
    })
}

fn to_document(record: &EvidenceRecord) -> DomainResult<Document> {
    let value = serde_json::to_value(record)
        .map_err(|err| DomainError::Validation(format!("invalid evidence payload: {err}")))?;
    let Value::Object(mut document) = value else {
        return Err(DomainError::Validation(
            "evidence payload must be an object".into(),
        ));
    };
    document.remove(ID_FIELD);
    Ok(document)
}

fn from_document(document: Document) -> DomainResult<EvidenceRecord> {
    serde_json::from_value(Value::Object(document))
        .map_err(|err| DomainError::Persistence(format!("invalid evidence document: {err}")))
}

/// Tags are a set; keep first occurrence order so responses stay stable.
fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .filter(|tag| seen.insert(tag.clone()))
        .collect()
}

fn sort_groups(groups: Vec<GroupCount>) -> Vec<(Option<String>, u64)> {
    let mut pairs: Vec<(Option<String>, u64)> = groups
        .into_iter()
        .map(|group| {
            let key = match group.key {
                Value::String(value) => Some(value),
                Value::Null => None,
                other => Some(other.to_string()),
            };
            (key, group.count)
        })
        .collect();
    pairs.sort_by(|left, right| right.1.cmp(&left.1).then_with(|| left.0.cmp(&right.0)));
    pairs
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.trim().is_empty())
}

fn default_condition() -> String {
    DEFAULT_CONDITION.to_string()
}

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_string()
}
