//! Plain CRUD over the non-evidence collections (cases, OB entries, plates,
//! vehicles, officers, profiles, geofiles, reports). Documents stay schemaless here; the service
//! only owns ids, timestamps and the few generated business numbers.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::DomainResult;
use crate::error::DomainError;
use crate::identifiers;
use crate::ports::documents::{
    Document, DocumentStore, Filter, ID_FIELD, Sort, UpdatePatch, validate_field_name,
};
use crate::util::now_ms;

const FIELD_CREATED_AT: &str = "createdAtMs";
const FIELD_UPDATED_AT: &str = "updatedAtMs";
const FIELD_BADGE_NUMBER: &str = "badgeNumber";
const FIELD_CASE_NUMBER: &str = "caseNumber";
const FIELD_OB_NUMBER: &str = "obNumber";
const FIELD_REPORT_NUMBER: &str = "reportNumber";
const FIELD_STATUS: &str = "status";
const DEFAULT_OFFICER_STATUS: &str = "active";
const DEFAULT_OB_STATUS: &str = "Pending";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Case,
    ObEntry,
    LicensePlate,
    PoliceVehicle,
    Officer,
    Profile,
    Geofile,
    Report,
}

impl RecordKind {
    pub const ALL: [RecordKind; 8] = [
        RecordKind::Case,
        RecordKind::ObEntry,
        RecordKind::LicensePlate,
        RecordKind::PoliceVehicle,
        RecordKind::Officer,
        RecordKind::Profile,
        RecordKind::Geofile,
        RecordKind::Report,
    ];

    pub fn collection(self) -> &'static str {
        match self {
            RecordKind::Case => "cases",
            RecordKind::ObEntry => "ob_entries",
            RecordKind::LicensePlate => "license_plates",
            RecordKind::PoliceVehicle => "police_vehicles",
            RecordKind::Officer => "officers",
            RecordKind::Profile => "profiles",
            RecordKind::Geofile => "geofiles",
            RecordKind::Report => "reports",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection())
    }
}

impl FromStr for RecordKind {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().replace('-', "_");
        RecordKind::ALL
            .into_iter()
            .find(|kind| kind.collection() == normalized)
            .ok_or_else(|| DomainError::Validation(format!("unknown record kind '{value}'")))
    }
}

#[derive(Clone)]
pub struct RecordService {
    store: Arc<dyn DocumentStore>,
}

impl RecordService {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn create(&self, kind: RecordKind, mut document: Document) -> DomainResult<Document> {
        let now = now_ms();
        document.remove(ID_FIELD);
        document.insert(FIELD_CREATED_AT.to_string(), Value::from(now));
        document.insert(FIELD_UPDATED_AT.to_string(), Value::from(now));
        match kind {
            RecordKind::Officer => {
                fill_if_blank(&mut document, FIELD_BADGE_NUMBER, identifiers::badge_number);
                fill_if_blank(&mut document, FIELD_STATUS, || {
                    DEFAULT_OFFICER_STATUS.to_string()
                });
            }
            RecordKind::Case => {
                fill_if_blank(&mut document, FIELD_CASE_NUMBER, identifiers::case_number);
            }
            RecordKind::ObEntry => {
                fill_if_blank(&mut document, FIELD_OB_NUMBER, identifiers::ob_number);
                fill_if_blank(&mut document, FIELD_STATUS, || DEFAULT_OB_STATUS.to_string());
            }
            RecordKind::Report => {
                fill_if_blank(&mut document, FIELD_REPORT_NUMBER, || {
                    identifiers::report_number(now)
                });
            }
            RecordKind::LicensePlate
            | RecordKind::PoliceVehicle
            | RecordKind::Profile
            | RecordKind::Geofile => {}
        }

        let id = self.store.insert_one(kind.collection(), document).await?;
        tracing::info!(kind = %kind, record_id = %id, "record created");
        self.find_by_id(kind, &id).await?.ok_or_else(|| {
            DomainError::Persistence(format!("{kind} record {id} missing after insert"))
        })
    }

    pub async fn find_by_id(&self, kind: RecordKind, id: &str) -> DomainResult<Option<Document>> {
        self.store
            .find_one(kind.collection(), &Filter::by_id(id))
            .await
    }

    /// Most recently created first.
    pub async fn find_all(&self, kind: RecordKind) -> DomainResult<Vec<Document>> {
        self.store
            .find(
                kind.collection(),
                &Filter::all(),
                Some(&Sort::descending(FIELD_CREATED_AT)),
            )
            .await
    }

    pub async fn find_by_field(
        &self,
        kind: RecordKind,
        field: &str,
        value: impl Into<Value>,
    ) -> DomainResult<Vec<Document>> {
        validate_field_name(field)?;
        self.store
            .find(kind.collection(), &Filter::all().eq(field, value), None)
            .await
    }

    /// Records created within `[from_ms, to_ms]`, inclusive on both ends.
    pub async fn find_in_range(
        &self,
        kind: RecordKind,
        from_ms: i64,
        to_ms: i64,
    ) -> DomainResult<Vec<Document>> {
        if from_ms > to_ms {
            return Err(DomainError::Validation(
                "range start must not be after range end".into(),
            ));
        }
        let filter = Filter::all()
            .gte(FIELD_CREATED_AT, from_ms)
            .lte(FIELD_CREATED_AT, to_ms);
        self.store
            .find(
                kind.collection(),
                &filter,
                Some(&Sort::ascending(FIELD_CREATED_AT)),
            )
            .await
    }

    pub async fn update(
        &self,
        kind: RecordKind,
        id: &str,
        mut document: Document,
    ) -> DomainResult<bool> {
        document.remove(ID_FIELD);
        document.remove(FIELD_CREATED_AT);
        let patch = UpdatePatch {
            set: document,
            push: Vec::new(),
        }
        .set(FIELD_UPDATED_AT, now_ms());
        let modified = self
            .store
            .update_one(kind.collection(), &Filter::by_id(id), &patch)
            .await?;
        tracing::info!(kind = %kind, record_id = %id, applied = modified > 0, "record updated");
        Ok(modified > 0)
    }

    pub async fn delete(&self, kind: RecordKind, id: &str) -> DomainResult<bool> {
        let deleted = self
            .store
            .delete_one(kind.collection(), &Filter::by_id(id))
            .await?;
        tracing::info!(kind = %kind, record_id = %id, deleted = deleted > 0, "record delete");
        Ok(deleted > 0)
    }
}

fn fill_if_blank(document: &mut Document, field: &str, value: impl FnOnce() -> String) {
    let blank = match document.get(field) {
        None | Some(Value::Null) => true,
        Some(Value::String(current)) => current.trim().is_empty(),
        Some(_) => false,
    };
    if blank {
        document.insert(field.to_string(), Value::String(value()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryDocumentStore;
    use serde_json::json;

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap_or_default()
    }

    fn service() -> RecordService {
        RecordService::new(Arc::new(InMemoryDocumentStore::new()))
    }

    #[test]
    fn parses_kinds_from_collection_names() {
        assert_eq!("ob-entries".parse::<RecordKind>().ok(), Some(RecordKind::ObEntry));
        assert_eq!("officers".parse::<RecordKind>().ok(), Some(RecordKind::Officer));
        assert_eq!("geofiles".parse::<RecordKind>().ok(), Some(RecordKind::Geofile));
        assert_eq!("reports".parse::<RecordKind>().ok(), Some(RecordKind::Report));
        assert!("users".parse::<RecordKind>().is_err());
    }

    #[tokio::test]
    async fn officer_gets_badge_and_active_status() {
        let officer = service()
            .create(RecordKind::Officer, doc(json!({ "name": "Achieng" })))
            .await
            .expect("create");
        let badge = officer
            .get("badgeNumber")
            .and_then(Value::as_str)
            .expect("badge");
        assert!(badge.starts_with("OFC-"));
        assert_eq!(officer.get("status"), Some(&json!("active")));
        assert!(officer.get("id").is_some());
    }

    #[tokio::test]
    async fn supplied_badge_is_kept() {
        let officer = service()
            .create(
                RecordKind::Officer,
                doc(json!({ "badgeNumber": "OFC-1999-ABCDEF", "status": "suspended" })),
            )
            .await
            .expect("create");
        assert_eq!(officer.get("badgeNumber"), Some(&json!("OFC-1999-ABCDEF")));
        assert_eq!(officer.get("status"), Some(&json!("suspended")));
    }

    #[tokio::test]
    async fn update_cannot_rewrite_created_at() {
        let records = service();
        let plate = records
            .create(RecordKind::LicensePlate, doc(json!({ "plateNumber": "KDA 123A" })))
            .await
            .expect("create");
        let id = plate.get("id").and_then(Value::as_str).expect("id").to_string();
        let created_at = plate.get("createdAtMs").cloned();

        let applied = records
            .update(
                RecordKind::LicensePlate,
                &id,
                doc(json!({ "createdAtMs": 1, "status": "flagged" })),
            )
            .await
            .expect("update");
        assert!(applied);

        let stored = records
            .find_by_id(RecordKind::LicensePlate, &id)
            .await
            .expect("find")
            .expect("present");
        assert_eq!(stored.get("createdAtMs").cloned(), created_at);
        assert_eq!(stored.get("status"), Some(&json!("flagged")));

        let by_plate = records
            .find_by_field(RecordKind::LicensePlate, "plateNumber", "KDA 123A")
            .await
            .expect("by field");
        assert_eq!(by_plate.len(), 1);
    }

    #[tokio::test]
    async fn range_query_is_inclusive() {
        let records = service();
        let entry = records
            .create(RecordKind::ObEntry, doc(json!({ "summary": "noise complaint" })))
            .await
            .expect("create");
        let created = entry
            .get("createdAtMs")
            .and_then(Value::as_i64)
            .expect("created");

        let hits = records
            .find_in_range(RecordKind::ObEntry, created, created)
            .await
            .expect("range");
        assert_eq!(hits.len(), 1);
        let misses = records
            .find_in_range(RecordKind::ObEntry, created + 1, created + 10)
            .await
            .expect("range");
        assert!(misses.is_empty());
        assert!(
            records
                .find_in_range(RecordKind::ObEntry, 10, 1)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn ob_entry_and_case_get_generated_numbers() {
        let records = service();
        let entry = records
            .create(RecordKind::ObEntry, doc(json!({ "summary": "lost phone" })))
            .await
            .expect("create");
        let ob_number = entry.get("obNumber").and_then(Value::as_str).expect("ob number");
        assert!(ob_number.starts_with("OB-"));
        assert_eq!(ob_number.rsplit('-').next().map(str::len), Some(6));
        assert_eq!(entry.get("status"), Some(&json!("Pending")));

        let case = records
            .create(RecordKind::Case, doc(json!({ "caseNumber": "CASE-2020-ABC123" })))
            .await
            .expect("create");
        assert_eq!(case.get("caseNumber"), Some(&json!("CASE-2020-ABC123")));
    }

    #[tokio::test]
    async fn report_number_minted_from_creation_time() {
        let report = service()
            .create(RecordKind::Report, doc(json!({ "title": "Weekly summary" })))
            .await
            .expect("create");
        let created = report
            .get("createdAtMs")
            .and_then(Value::as_i64)
            .expect("created");
        assert_eq!(report.get("reportNumber"), Some(&json!(format!("RPT-{created}"))));
    }

    #[tokio::test]
    async fn geofiles_filter_by_type() {
        let records = service();
        for kind in ["crime_scene", "patrol_zone", "crime_scene"] {
            records
                .create(RecordKind::Geofile, doc(json!({ "type": kind })))
                .await
                .expect("create");
        }
        let scenes = records
            .find_by_field(RecordKind::Geofile, "type", "crime_scene")
            .await
            .expect("by type");
        assert_eq!(scenes.len(), 2);
    }

    #[tokio::test]
    async fn delete_missing_is_false() {
        assert!(!service().delete(RecordKind::Case, "nope").await.expect("delete"));
    }
}
