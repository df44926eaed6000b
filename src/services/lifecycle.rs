//! State transitions for authorization codes.
//!
//! A code is registered Active and closed at most once, by either a revoke
//! or a redeem. Closed is terminal: neither field is ever reversed. The
//! store's conditional updates decide races; this module translates their
//! outcomes into the error taxonomy.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use thiserror::Error;

use crate::models::{AuthorizationCode, NewAuthorizationCode};
use crate::services::code_generator::{self, RandomSource, RandomSourceError};
use crate::store::{CodeStore, StoreError, UniqueColumn};

#[derive(Debug, Error)]
pub enum CodeError {
    #[error("code not found")]
    NotFound,

    #[error("code is already closed")]
    AlreadyClosed,

    #[error("specimen number already exists")]
    DuplicateSpecimen,

    #[error(transparent)]
    Random(#[from] RandomSourceError),

    #[error("storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for CodeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => CodeError::NotFound,
            other => CodeError::Store(other),
        }
    }
}

/// Caller-supplied fields for a new registration.
#[derive(Debug, Clone)]
pub struct RegisterRequest {
    pub specimen_number: String,
    pub receive_date: NaiveDate,
    pub onset_date: NaiveDate,
    pub transmission_risk: String,
}

/// Registers a new Active code with a freshly generated value.
///
/// The specimen pre-check and generator pre-check both exist to keep the
/// common path cheap; the store's unique constraints are what actually
/// hold under concurrency. A code-column conflict regenerates and retries,
/// a specimen-column conflict surfaces as `DuplicateSpecimen`.
pub async fn register(
    store: &dyn CodeStore,
    rng: &dyn RandomSource,
    request: RegisterRequest,
    registered_by: &str,
    validity: Duration,
    at: DateTime<Utc>,
) -> Result<AuthorizationCode, CodeError> {
    if store.specimen_exists(&request.specimen_number).await? {
        return Err(CodeError::DuplicateSpecimen);
    }

    loop {
        let code = code_generator::generate(rng, store).await?;
        let new = NewAuthorizationCode {
            specimen_number: request.specimen_number.clone(),
            receive_date: request.receive_date,
            onset_date: request.onset_date,
            transmission_risk: request.transmission_risk.clone(),
            code,
            registered_at: at,
            registered_by: registered_by.to_string(),
            expires_at: at + validity,
        };

        match store.insert(new).await {
            Ok(created) => {
                tracing::info!(id = created.id, specimen = %created.specimen_number, "code registered");
                return Ok(created);
            }
            Err(StoreError::UniqueViolation(UniqueColumn::Code)) => {
                tracing::debug!("code conflicted on insert, regenerating");
            }
            Err(StoreError::UniqueViolation(UniqueColumn::SpecimenNumber)) => {
                return Err(CodeError::DuplicateSpecimen);
            }
            Err(other) => return Err(other.into()),
        }
    }
}

/// Revokes an open code. Fails with `AlreadyClosed` once either closing
/// field is set; the fields are never overwritten.
pub async fn revoke(
    store: &dyn CodeStore,
    id: i64,
    by: &str,
    at: DateTime<Utc>,
) -> Result<AuthorizationCode, CodeError> {
    match store.revoke_if_open(id, at, by).await {
        Ok(Some(code)) => {
            tracing::info!(id, by, "code revoked");
            Ok(code)
        }
        Ok(None) => Err(CodeError::AlreadyClosed),
        Err(StoreError::NotFound) => Err(CodeError::NotFound),
        Err(other) => Err(other.into()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedeemOutcome {
    Redeemed,
    /// The code was already redeemed; repeat redemption is a no-op.
    AlreadyRedeemed,
}

/// Redeems a code by its 12-digit value.
///
/// Redeeming an already-redeemed code succeeds without a state change;
/// redeeming a revoked code fails with `AlreadyClosed`. Expiry does not
/// gate redemption.
pub async fn redeem(
    store: &dyn CodeStore,
    code: &str,
    at: DateTime<Utc>,
) -> Result<RedeemOutcome, CodeError> {
    let found = store.find_by_code(code).await?.ok_or(CodeError::NotFound)?;

    if found.is_redeemed() {
        return Ok(RedeemOutcome::AlreadyRedeemed);
    }
    if found.is_revoked() {
        return Err(CodeError::AlreadyClosed);
    }

    if store.redeem_if_open(found.id, at).await? {
        tracing::info!(id = found.id, "code redeemed");
        return Ok(RedeemOutcome::Redeemed);
    }

    // Lost a concurrent close between the read and the update; re-read to
    // tell an idempotent redeem from a revoke.
    let current = store.get(found.id).await?.ok_or(CodeError::NotFound)?;
    if current.is_redeemed() {
        Ok(RedeemOutcome::AlreadyRedeemed)
    } else {
        Err(CodeError::AlreadyClosed)
    }
}

/// Records a delivery of the code to its holder. Never gated by state.
pub async fn issue(
    store: &dyn CodeStore,
    id: i64,
    at: DateTime<Utc>,
) -> Result<AuthorizationCode, CodeError> {
    let code = store.append_issue(id, at).await?;
    tracing::info!(id, deliveries = code.issue_log.len(), "issuance recorded");
    Ok(code)
}
