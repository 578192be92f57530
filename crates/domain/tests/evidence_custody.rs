use std::sync::Arc;
use std::time::Duration;

use precinct_domain::error::DomainError;
use precinct_domain::evidence::{
    EvidenceCreate, EvidenceService, EvidenceUpdate, MediaFile, NewCustodyEntry, Priority,
    StatusCount, TypeCount,
};
use precinct_domain::memory::InMemoryDocumentStore;
use serde_json::json;

fn service() -> EvidenceService {
    EvidenceService::new(Arc::new(InMemoryDocumentStore::new()))
}

fn handoff(action: &str, officer: &str) -> NewCustodyEntry {
    NewCustodyEntry {
        action: action.to_string(),
        officer: officer.to_string(),
        notes: Some(format!("{action} by {officer}")),
        location: Some("Central Station".to_string()),
    }
}

fn is_generated_number(value: &str) -> bool {
    let parts: Vec<&str> = value.split('-').collect();
    parts.len() == 3
        && parts[0] == "EVD"
        && parts[1].len() == 4
        && parts[1].chars().all(|ch| ch.is_ascii_digit())
        && parts[2].len() == 8
        && parts[2]
            .chars()
            .all(|ch| ch.is_ascii_digit() || ch.is_ascii_uppercase())
}

#[tokio::test]
async fn created_evidence_gets_generated_number_and_initial_custody() {
    let evidence = service();
    let record = evidence
        .create(EvidenceCreate::default())
        .await
        .expect("create");

    assert!(!record.id.is_empty());
    assert!(is_generated_number(&record.evidence_number));
    assert_eq!(record.custody_log.len(), 1);
    let first = &record.custody_log[0];
    assert_eq!(first.action, "collected");
    assert_eq!(first.officer, "Unknown Officer");
    assert_eq!(first.location.as_deref(), Some("Unknown Location"));
    assert_eq!(first.notes.as_deref(), Some("Initial evidence collection"));
    assert_eq!(record.priority, Priority::Medium);
    assert_eq!(record.condition, "Good");
    assert_eq!(record.created_at_ms, record.updated_at_ms);
}

#[tokio::test]
async fn supplied_evidence_number_is_kept_verbatim() {
    let evidence = service();
    let record = evidence
        .create(EvidenceCreate {
            evidence_number: Some("EVD-2024-CUSTOM1".to_string()),
            collected_by: Some("Cpl. Mwangi".to_string()),
            ..EvidenceCreate::default()
        })
        .await
        .expect("create");
    assert_eq!(record.evidence_number, "EVD-2024-CUSTOM1");
    assert_eq!(record.custody_log[0].officer, "Cpl. Mwangi");

    let by_number = evidence
        .find_by_evidence_number("EVD-2024-CUSTOM1")
        .await
        .expect("lookup")
        .expect("present");
    assert_eq!(by_number.id, record.id);
}

#[tokio::test]
async fn duplicate_supplied_number_conflicts() {
    let evidence = service();
    let input = EvidenceCreate {
        evidence_number: Some("EVD-2024-DUPL0001".to_string()),
        ..EvidenceCreate::default()
    };
    evidence.create(input.clone()).await.expect("first");
    assert!(matches!(
        evidence.create(input).await,
        Err(DomainError::Conflict)
    ));
}

#[tokio::test]
async fn custody_log_only_grows_and_keeps_history() {
    let evidence = service();
    let record = evidence
        .create(EvidenceCreate::default())
        .await
        .expect("create");

    let mut previous = record.custody_log.clone();
    for step in 0..5 {
        let applied = evidence
            .add_custody_entry(&record.id, handoff("transferred", &format!("officer-{step}")))
            .await
            .expect("append");
        assert!(applied);

        let current = evidence
            .find_by_id(&record.id)
            .await
            .expect("find")
            .expect("present")
            .custody_log;
        assert_eq!(current.len(), previous.len() + 1);
        assert_eq!(&current[..previous.len()], previous.as_slice());
        assert_eq!(current.last().map(|entry| entry.officer.as_str()), Some(format!("officer-{step}").as_str()));
        previous = current;
    }
    assert_eq!(previous.len(), 6);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_custody_appends_are_not_lost() {
    let evidence = service();
    let record = evidence
        .create(EvidenceCreate::default())
        .await
        .expect("create");

    let mut handles = Vec::new();
    for n in 0..32 {
        let evidence = evidence.clone();
        let id = record.id.clone();
        handles.push(tokio::spawn(async move {
            evidence
                .add_custody_entry(&id, handoff("examined", &format!("analyst-{n}")))
                .await
        }));
    }
    for handle in handles {
        assert!(handle.await.expect("join").expect("append"));
    }

    let stored = evidence
        .find_by_id(&record.id)
        .await
        .expect("find")
        .expect("present");
    assert_eq!(stored.custody_log.len(), 33);
    assert_eq!(stored.custody_log[0].action, "collected");
}

#[tokio::test]
async fn update_ignores_reserved_fields() {
    let evidence = service();
    let record = evidence
        .create(EvidenceCreate {
            media: Some(vec![MediaFile {
                name: "scene.jpg".to_string(),
                url: "/v1/media/abc".to_string(),
                content_type: Some("image/jpeg".to_string()),
                sha256: None,
            }]),
            ..EvidenceCreate::default()
        })
        .await
        .expect("create");

    let update: EvidenceUpdate = serde_json::from_value(json!({
        "evidenceNumber": "X",
        "createdAtMs": 0,
        "custodyLog": [],
        "media": [],
        "status": "In Storage"
    }))
    .expect("payload");
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert!(evidence.update(&record.id, update).await.expect("update"));

    let stored = evidence
        .find_by_id(&record.id)
        .await
        .expect("find")
        .expect("present");
    assert_eq!(stored.evidence_number, record.evidence_number);
    assert_eq!(stored.created_at_ms, record.created_at_ms);
    assert_eq!(stored.custody_log, record.custody_log);
    assert_eq!(stored.media, record.media);
    assert_eq!(stored.status.as_deref(), Some("In Storage"));
    assert!(stored.updated_at_ms > record.updated_at_ms);
}

#[tokio::test]
async fn media_grows_only_through_add_media() {
    let evidence = service();
    let record = evidence
        .create(EvidenceCreate::default())
        .await
        .expect("create");

    for name in ["a.jpg", "b.mp4"] {
        let applied = evidence
            .add_media(
                &record.id,
                MediaFile {
                    name: name.to_string(),
                    url: format!("/v1/media/{}", name.replace('.', "")),
                    content_type: None,
                    sha256: None,
                },
            )
            .await
            .expect("attach");
        assert!(applied);
    }

    let stored = evidence
        .find_by_id(&record.id)
        .await
        .expect("find")
        .expect("present");
    let names: Vec<&str> = stored.media.iter().map(|media| media.name.as_str()).collect();
    assert_eq!(names, vec!["a.jpg", "b.mp4"]);
    assert_eq!(stored.custody_log.len(), 1);
}

#[tokio::test]
async fn every_mutation_advances_updated_at_and_keeps_created_at() {
    let evidence = service();
    let record = evidence
        .create(EvidenceCreate::default())
        .await
        .expect("create");
    let mut last_updated = record.updated_at_ms;

    for step in ["update", "custody", "media"] {
        tokio::time::sleep(Duration::from_millis(5)).await;
        let applied = match step {
            "update" => {
                let update: EvidenceUpdate =
                    serde_json::from_value(json!({ "condition": "Damaged" })).expect("payload");
                evidence.update(&record.id, update).await
            }
            "custody" => {
                evidence
                    .add_custody_entry(&record.id, handoff("examined", "Dr. Wanjiru"))
                    .await
            }
            _ => {
                evidence
                    .add_media(
                        &record.id,
                        MediaFile {
                            name: "scene.jpg".to_string(),
                            url: "/v1/media/scene".to_string(),
                            content_type: None,
                            sha256: None,
                        },
                    )
                    .await
            }
        }
        .expect(step);
        assert!(applied, "{step} applied");

        let stored = evidence
            .find_by_id(&record.id)
            .await
            .expect("find")
            .expect("present");
        assert!(
            stored.updated_at_ms > last_updated,
            "{step} must advance updatedAtMs"
        );
        assert_eq!(stored.created_at_ms, record.created_at_ms, "{step} kept createdAtMs");
        last_updated = stored.updated_at_ms;
    }
}

#[tokio::test]
async fn mutations_on_missing_id_return_false() {
    let evidence = service();
    assert!(!evidence.delete("missing").await.expect("delete"));
    assert!(
        !evidence
            .add_custody_entry("missing", handoff("moved", "x"))
            .await
            .expect("append")
    );
    assert!(
        !evidence
            .update(
                "missing",
                EvidenceUpdate {
                    status: Some("Closed".to_string()),
                    ..EvidenceUpdate::default()
                }
            )
            .await
            .expect("update")
    );
    assert!(evidence.find_by_id("missing").await.expect("find").is_none());
}

#[tokio::test]
async fn delete_removes_record() {
    let evidence = service();
    let record = evidence
        .create(EvidenceCreate::default())
        .await
        .expect("create");
    assert!(evidence.delete(&record.id).await.expect("delete"));
    assert!(evidence.find_by_id(&record.id).await.expect("find").is_none());
    assert!(!evidence.delete(&record.id).await.expect("second delete"));
}

#[tokio::test]
async fn lookups_filter_by_case_ob_status_and_type() {
    let evidence = service();
    for (case_id, ob_id, status, kind) in [
        ("case-1", "ob-1", "Collected", "Weapon"),
        ("case-1", "ob-2", "Analyzed", "Document"),
        ("case-2", "ob-2", "Collected", "Weapon"),
    ] {
        evidence
            .create(EvidenceCreate {
                case_id: Some(case_id.to_string()),
                ob_id: Some(ob_id.to_string()),
                status: Some(status.to_string()),
                evidence_type: Some(kind.to_string()),
                ..EvidenceCreate::default()
            })
            .await
            .expect("create");
    }

    assert_eq!(evidence.find_by_case_id("case-1").await.expect("case").len(), 2);
    assert_eq!(evidence.find_by_ob_id("ob-2").await.expect("ob").len(), 2);
    assert_eq!(evidence.find_by_status("Collected").await.expect("status").len(), 2);
    assert_eq!(evidence.find_by_type("Document").await.expect("type").len(), 1);
    assert!(evidence.find_by_type("Vehicle").await.expect("type").is_empty());
}

#[tokio::test]
async fn find_all_returns_newest_first() {
    let evidence = service();
    let first = evidence
        .create(EvidenceCreate::default())
        .await
        .expect("create");
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = evidence
        .create(EvidenceCreate::default())
        .await
        .expect("create");

    let all = evidence.find_all().await.expect("all");
    let ids: Vec<&str> = all.iter().map(|record| record.id.as_str()).collect();
    assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
}

#[tokio::test]
async fn stats_group_by_distinct_status_and_type() {
    let evidence = service();
    for (status, kind) in [("A", "Weapon"), ("A", "Weapon"), ("B", "Document")] {
        evidence
            .create(EvidenceCreate {
                status: Some(status.to_string()),
                evidence_type: Some(kind.to_string()),
                ..EvidenceCreate::default()
            })
            .await
            .expect("create");
    }

    let stats = evidence.stats().await.expect("stats");
    assert_eq!(stats.total, 3);
    assert_eq!(
        stats.by_status,
        vec![
            StatusCount {
                status: Some("A".to_string()),
                count: 2
            },
            StatusCount {
                status: Some("B".to_string()),
                count: 1
            },
        ]
    );
    assert_eq!(
        stats.by_type,
        vec![
            TypeCount {
                evidence_type: Some("Weapon".to_string()),
                count: 2
            },
            TypeCount {
                evidence_type: Some("Document".to_string()),
                count: 1
            },
        ]
    );
}

#[tokio::test]
async fn stats_on_empty_collection_are_zero() {
    let stats = service().stats().await.expect("stats");
    assert_eq!(stats.total, 0);
    assert!(stats.by_status.is_empty());
    assert!(stats.by_type.is_empty());
}
