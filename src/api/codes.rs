use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{identity, AppState};
use crate::error::{AppError, Result};
use crate::models::{AuthorizationCode, SortField};
use crate::services::{csv_export, lifecycle};
use crate::store::SearchParams;

/// Externally visible view of a code. The 12-digit value itself is
/// omitted; it leaves the service exactly once, in the registration
/// response.
#[derive(Debug, Serialize)]
pub struct CodeSummary {
    pub id: i64,
    pub specimen_number: String,
    pub receive_date: NaiveDate,
    pub onset_date: NaiveDate,
    pub transmission_risk: String,
    pub registered_at: DateTime<Utc>,
    pub registered_by: String,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<String>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub issue_log: Vec<DateTime<Utc>>,
}

/// Only the first three deliveries are surfaced, however many exist.
const SURFACED_ISSUE_ENTRIES: usize = 3;

impl From<&AuthorizationCode> for CodeSummary {
    fn from(code: &AuthorizationCode) -> Self {
        CodeSummary {
            id: code.id,
            specimen_number: code.specimen_number.clone(),
            receive_date: code.receive_date,
            onset_date: code.onset_date,
            transmission_risk: code.transmission_risk.clone(),
            registered_at: code.registered_at,
            registered_by: code.registered_by.clone(),
            revoked_at: code.revoked_at,
            revoked_by: code.revoked_by.clone(),
            redeemed_at: code.redeemed_at,
            expires_at: code.expires_at,
            issue_log: code
                .issue_log
                .iter()
                .take(SURFACED_ISSUE_ENTRIES)
                .copied()
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RegisteredCode {
    #[serde(flatten)]
    pub summary: CodeSummary,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct CodesPage {
    pub codes: Vec<CodeSummary>,
    pub total: u64,
}

fn default_all() -> String {
    "N".to_string()
}

fn default_sort() -> String {
    "specimen_number".to_string()
}

fn default_order() -> String {
    "ASC".to_string()
}

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default)]
    q: String,
    #[serde(default = "default_all")]
    all: String,
    #[serde(default)]
    start: u64,
    #[serde(default)]
    size: u64,
    #[serde(default = "default_sort")]
    sort: String,
    #[serde(default = "default_order")]
    order: String,
}

fn parse_descending(order: &str) -> Result<bool> {
    match order {
        "ASC" | "asc" => Ok(false),
        "DESC" | "desc" => Ok(true),
        other => Err(AppError::Validation(format!("invalid order: {other}"))),
    }
}

fn validate_query_text(q: &str) -> Result<Option<String>> {
    if q.is_empty() {
        return Ok(None);
    }
    if q.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(Some(q.to_string()))
    } else {
        Err(AppError::Validation("invalid query text".to_string()))
    }
}

async fn list_codes(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<CodesPage>> {
    let text = validate_query_text(&params.q)?;
    let sort = params
        .sort
        .parse::<SortField>()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    let descending = parse_descending(&params.order)?;

    let search = SearchParams {
        text,
        include_all: params.all == "Y",
        exclude_expired: state.config.search_excludes_expired,
        offset: params.start,
        limit: params.size,
        sort,
        descending,
    };

    let page = state.store.search(&search, Utc::now()).await?;
    Ok(Json(CodesPage {
        codes: page.codes.iter().map(CodeSummary::from).collect(),
        total: page.total,
    }))
}

async fn get_code(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CodeSummary>> {
    let code = state
        .store
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound("code not found".to_string()))?;
    Ok(Json(CodeSummary::from(&code)))
}

#[derive(Debug, Deserialize)]
struct RegisterBody {
    specimen_number: String,
    receive_date: NaiveDate,
    onset_date: NaiveDate,
    transmission_risk: String,
}

async fn register_code(
    State(state): State<AppState>,
    claims: Option<Extension<identity::TokenClaims>>,
    Json(body): Json<RegisterBody>,
) -> Result<Json<RegisteredCode>> {
    let registered_by =
        identity::user_identifier(state.config.auth_required, claims.as_deref())?;

    let created = lifecycle::register(
        state.store.as_ref(),
        state.rng.as_ref(),
        lifecycle::RegisterRequest {
            specimen_number: body.specimen_number,
            receive_date: body.receive_date,
            onset_date: body.onset_date,
            transmission_risk: body.transmission_risk,
        },
        &registered_by,
        Duration::days(state.config.code_validity_days),
        Utc::now(),
    )
    .await?;

    Ok(Json(RegisteredCode {
        summary: CodeSummary::from(&created),
        code: created.code.clone(),
    }))
}

async fn revoke_code(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    claims: Option<Extension<identity::TokenClaims>>,
) -> Result<Json<CodeSummary>> {
    let revoked_by = identity::user_identifier(state.config.auth_required, claims.as_deref())?;
    let revoked = lifecycle::revoke(state.store.as_ref(), id, &revoked_by, Utc::now()).await?;
    Ok(Json(CodeSummary::from(&revoked)))
}

async fn redeem_code(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<StatusCode> {
    // Both fresh and repeat redemption answer 204.
    lifecycle::redeem(state.store.as_ref(), &code, Utc::now()).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn issue_code(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CodeSummary>> {
    let updated = lifecycle::issue(state.store.as_ref(), id, Utc::now()).await?;
    Ok(Json(CodeSummary::from(&updated)))
}

#[derive(Debug, Deserialize)]
struct CsvParams {
    #[serde(default)]
    offset: i32,
}

async fn export_csv(
    State(state): State<AppState>,
    Query(params): Query<CsvParams>,
) -> Result<Response> {
    if !(-23..=23).contains(&params.offset) {
        return Err(AppError::Validation("invalid timezone offset".to_string()));
    }
    let offset = FixedOffset::east_opt(params.offset * 3600)
        .ok_or_else(|| AppError::Validation("invalid timezone offset".to_string()))?;

    let codes = state.store.fetch_all().await?;
    let body = csv_export::export(&codes, offset)
        .map_err(|e| AppError::Internal(e.into()))?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"AuthorizationCodes.csv\"",
            ),
        ],
        body,
    )
        .into_response())
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/codes", get(list_codes).post(register_code))
        .route("/codes/:id", get(get_code))
        .route("/codes/revoked/:id", delete(revoke_code))
        .route("/codes/redeemed/:code", delete(redeem_code))
        .route("/codes/issued/:id", post(issue_code))
        .route("/csv", get(export_csv))
}
