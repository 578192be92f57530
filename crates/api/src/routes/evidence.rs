use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use precinct_domain::evidence::{
    EvidenceCreate, EvidenceRecord, EvidenceStats, EvidenceUpdate, MediaFile, NewCustodyEntry,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    error::ApiError, middleware::CorrelationId, observability, state::AppState, validation,
};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/evidence", post(create_evidence).get(list_evidence))
        .route("/v1/evidence/stats", get(evidence_stats))
        .route(
            "/v1/evidence/by-number/:evidence_number",
            get(get_evidence_by_number),
        )
        .route(
            "/v1/evidence/:evidence_id",
            get(get_evidence)
                .put(update_evidence)
                .delete(delete_evidence),
        )
        .route("/v1/evidence/:evidence_id/custody", post(add_custody_entry))
        .route("/v1/evidence/:evidence_id/media", post(attach_media))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvidenceListQuery {
    status: Option<String>,
    #[serde(rename = "type")]
    evidence_type: Option<String>,
    case_id: Option<String>,
    ob_id: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
struct CustodyEntryRequest {
    #[validate(length(min = 1, max = 128))]
    action: String,
    #[validate(length(min = 1, max = 128))]
    officer: String,
    #[validate(length(max = 2000))]
    notes: Option<String>,
    #[validate(length(max = 256))]
    location: Option<String>,
}

#[derive(Serialize)]
struct MutationResponse {
    id: String,
    applied: bool,
}

async fn create_evidence(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    Json(mut payload): Json<EvidenceCreate>,
) -> Result<(StatusCode, Json<EvidenceRecord>), ApiError> {
    if let Some(files) = payload.media.take() {
        let mut resolved = Vec::with_capacity(files.len());
        for file in files {
            resolved.push(state.media.resolve(file).await?);
        }
        payload.media = Some(resolved);
    }
    let record = state.evidence.create(payload).await?;
    tracing::info!(
        correlation_id = %correlation_id.as_str(),
        evidence_id = %record.id,
        evidence_number = %record.evidence_number,
        "evidence create request served"
    );
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_evidence(
    State(state): State<AppState>,
    Query(query): Query<EvidenceListQuery>,
) -> Result<Json<Vec<EvidenceRecord>>, ApiError> {
    let service = &state.evidence;
    let mut records = if let Some(case_id) = query.case_id.as_deref() {
        service.find_by_case_id(case_id).await?
    } else if let Some(ob_id) = query.ob_id.as_deref() {
        service.find_by_ob_id(ob_id).await?
    } else if let Some(status) = query.status.as_deref() {
        service.find_by_status(status).await?
    } else if let Some(evidence_type) = query.evidence_type.as_deref() {
        service.find_by_type(evidence_type).await?
    } else {
        service.find_all().await?
    };

    // The store answers one lookup; remaining filters narrow the result here.
    records.retain(|record| {
        matches_filter(&query.case_id, &record.case_id)
            && matches_filter(&query.ob_id, &record.ob_id)
            && matches_filter(&query.status, &record.status)
            && matches_filter(&query.evidence_type, &record.evidence_type)
    });
    Ok(Json(records))
}

fn matches_filter(wanted: &Option<String>, actual: &Option<String>) -> bool {
    wanted.is_none() || wanted == actual
}

async fn evidence_stats(State(state): State<AppState>) -> Result<Json<EvidenceStats>, ApiError> {
    Ok(Json(state.evidence.stats().await?))
}

async fn get_evidence(
    State(state): State<AppState>,
    Path(evidence_id): Path<String>,
) -> Result<Json<EvidenceRecord>, ApiError> {
    state
        .evidence
        .find_by_id(&evidence_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn get_evidence_by_number(
    State(state): State<AppState>,
    Path(evidence_number): Path<String>,
) -> Result<Json<EvidenceRecord>, ApiError> {
    state
        .evidence
        .find_by_evidence_number(&evidence_number)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn update_evidence(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    Path(evidence_id): Path<String>,
    Json(payload): Json<EvidenceUpdate>,
) -> Result<Json<EvidenceRecord>, ApiError> {
    // `false` also covers a write that changed nothing, so existence decides the status.
    let applied = state.evidence.update(&evidence_id, payload).await?;
    tracing::info!(
        correlation_id = %correlation_id.as_str(),
        evidence_id = %evidence_id,
        applied,
        "evidence update request served"
    );
    state
        .evidence
        .find_by_id(&evidence_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn delete_evidence(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    Path(evidence_id): Path<String>,
) -> Result<Json<MutationResponse>, ApiError> {
    let deleted = state.evidence.delete(&evidence_id).await?;
    tracing::info!(
        correlation_id = %correlation_id.as_str(),
        evidence_id = %evidence_id,
        deleted,
        "evidence delete request served"
    );
    if !deleted {
        return Err(ApiError::NotFound);
    }
    Ok(Json(MutationResponse {
        id: evidence_id,
        applied: true,
    }))
}

async fn add_custody_entry(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    Path(evidence_id): Path<String>,
    Json(payload): Json<CustodyEntryRequest>,
) -> Result<(StatusCode, Json<EvidenceRecord>), ApiError> {
    validation::validate(&payload)?;
    let entry = NewCustodyEntry {
        action: payload.action,
        officer: payload.officer,
        notes: payload.notes,
        location: payload.location,
    };
    let applied = state.evidence.add_custody_entry(&evidence_id, entry).await?;
    observability::register_custody_append(applied);
    tracing::info!(
        correlation_id = %correlation_id.as_str(),
        evidence_id = %evidence_id,
        applied,
        "custody append request served"
    );
    if !applied {
        return Err(ApiError::NotFound);
    }
    let record = state
        .evidence
        .find_by_id(&evidence_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn attach_media(
    State(state): State<AppState>,
    correlation_id: CorrelationId,
    Path(evidence_id): Path<String>,
    Json(payload): Json<MediaFile>,
) -> Result<(StatusCode, Json<EvidenceRecord>), ApiError> {
    let file = state.media.resolve(payload).await?;
    let applied = state.evidence.add_media(&evidence_id, file).await?;
    tracing::info!(
        correlation_id = %correlation_id.as_str(),
        evidence_id = %evidence_id,
        applied,
        "media attach request served"
    );
    if !applied {
        return Err(ApiError::NotFound);
    }
    let record = state
        .evidence
        .find_by_id(&evidence_id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok((StatusCode::CREATED, Json(record)))
}
