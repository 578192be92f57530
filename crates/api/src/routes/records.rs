use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use precinct_domain::ports::documents::Document;
use precinct_domain::records::RecordKind;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{error::ApiError, state::AppState, validation};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/records/:kind", get(list_records).post(create_record))
        .route(
            "/v1/records/:kind/:record_id",
            get(get_record).put(update_record).delete(delete_record),
        )
}

/// Either a single `field`/`value` match or a `from`/`to` creation window;
/// neither lists everything.
#[derive(Debug, Default, Deserialize, Validate)]
struct RecordListQuery {
    #[validate(length(min = 1, max = 64))]
    field: Option<String>,
    value: Option<String>,
    from: Option<i64>,
    to: Option<i64>,
}

#[derive(Serialize)]
struct MutationResponse {
    id: String,
    applied: bool,
}

fn parse_kind(kind: &str) -> Result<RecordKind, ApiError> {
    Ok(kind.parse::<RecordKind>()?)
}

async fn create_record(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Json(payload): Json<Document>,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let kind = parse_kind(&kind)?;
    let record = state.records.create(kind, payload).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_records(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(query): Query<RecordListQuery>,
) -> Result<Json<Vec<Document>>, ApiError> {
    validation::validate(&query)?;
    let kind = parse_kind(&kind)?;
    let records = match query {
        RecordListQuery {
            field: Some(field),
            value: Some(value),
            ..
        } => state.records.find_by_field(kind, &field, value).await?,
        RecordListQuery {
            field: Some(_), ..
        } => return Err(ApiError::Validation("value is required with field".into())),
        RecordListQuery {
            from: Some(from),
            to: Some(to),
            ..
        } => state.records.find_in_range(kind, from, to).await?,
        RecordListQuery { from: None, to: None, .. } => state.records.find_all(kind).await?,
        _ => {
            return Err(ApiError::Validation(
                "from and to must be supplied together".into(),
            ));
        }
    };
    Ok(Json(records))
}

async fn get_record(
    State(state): State<AppState>,
    Path((kind, record_id)): Path<(String, String)>,
) -> Result<Json<Document>, ApiError> {
    let kind = parse_kind(&kind)?;
    state
        .records
        .find_by_id(kind, &record_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn update_record(
    State(state): State<AppState>,
    Path((kind, record_id)): Path<(String, String)>,
    Json(payload): Json<Document>,
) -> Result<Json<Document>, ApiError> {
    let kind = parse_kind(&kind)?;
    state.records.update(kind, &record_id, payload).await?;
    state
        .records
        .find_by_id(kind, &record_id)
        .await?
        .map(Json)
        .ok_or(ApiError::NotFound)
}

async fn delete_record(
    State(state): State<AppState>,
    Path((kind, record_id)): Path<(String, String)>,
) -> Result<Json<MutationResponse>, ApiError> {
    let kind = parse_kind(&kind)?;
    if !state.records.delete(kind, &record_id).await? {
        return Err(ApiError::NotFound);
    }
    Ok(Json(MutationResponse {
        id: record_id,
        applied: true,
    }))
}
