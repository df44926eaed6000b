//! Storage abstraction for the code collection.
//!
//! The engine treats persistence as an ordered, keyed collection with
//! filter/sort/paginate, unique constraints, and conditional updates. The
//! `CodeStore` trait captures exactly that surface; `PgCodeStore` is the
//! production backend and `InMemoryCodeStore` backs the tests.

mod memory;
mod postgres;

pub use memory::InMemoryCodeStore;
pub use postgres::PgCodeStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{AuthorizationCode, NewAuthorizationCode, SortField};

/// Column protected by a uniqueness constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueColumn {
    Code,
    SpecimenNumber,
}

impl std::fmt::Display for UniqueColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UniqueColumn::Code => write!(f, "code"),
            UniqueColumn::SpecimenNumber => write!(f, "specimen_number"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("row not found")]
    NotFound,

    #[error("unique constraint violated on {0}")]
    UniqueViolation(UniqueColumn),

    #[error("backend error: {0}")]
    Backend(String),
}

/// Search filter, sort, and page window.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Case-insensitive substring match on the specimen number. `None`
    /// means no filter. Callers validate the charset before building this.
    pub text: Option<String>,
    /// When false, only codes that are neither revoked nor redeemed match.
    pub include_all: bool,
    /// Policy knob: when true, an `include_all = false` search also drops
    /// codes already past `expires_at`.
    pub exclude_expired: bool,
    pub offset: u64,
    /// `0` means no limit.
    pub limit: u64,
    pub sort: SortField,
    pub descending: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        SearchParams {
            text: None,
            include_all: false,
            exclude_expired: false,
            offset: 0,
            limit: 0,
            sort: SortField::default(),
            descending: false,
        }
    }
}

/// One page of results plus the total match count ignoring pagination.
#[derive(Debug, Clone)]
pub struct CodePage {
    pub codes: Vec<AuthorizationCode>,
    pub total: u64,
}

/// Persistence seam for authorization codes.
///
/// Conditional mutations (`revoke_if_open`, `redeem_if_open`) must be
/// atomic in the backend: the loser of a concurrent close observes the
/// closed state, never a silent overwrite. Uniqueness of `code` and
/// `specimen_number` is enforced here, not by the caller's pre-checks.
#[async_trait]
pub trait CodeStore: Send + Sync {
    /// Inserts a new code and returns it with its assigned id.
    async fn insert(&self, new: NewAuthorizationCode)
        -> Result<AuthorizationCode, StoreError>;

    async fn get(&self, id: i64) -> Result<Option<AuthorizationCode>, StoreError>;

    async fn find_by_code(&self, code: &str)
        -> Result<Option<AuthorizationCode>, StoreError>;

    async fn code_exists(&self, code: &str) -> Result<bool, StoreError>;

    async fn specimen_exists(&self, specimen_number: &str) -> Result<bool, StoreError>;

    /// Sets the revocation fields if the code is still open.
    ///
    /// `Ok(Some)` with the updated entity on success, `Ok(None)` when the
    /// code exists but is already closed, `Err(NotFound)` when the id is
    /// unknown.
    async fn revoke_if_open(
        &self,
        id: i64,
        at: DateTime<Utc>,
        by: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError>;

    /// Sets `redeemed_at` if the code is still open. Returns whether the
    /// update applied; `false` means another closure won the race.
    async fn redeem_if_open(&self, id: i64, at: DateTime<Utc>) -> Result<bool, StoreError>;

    /// Appends a delivery timestamp to the issue log and returns the
    /// updated entity.
    async fn append_issue(
        &self,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<AuthorizationCode, StoreError>;

    /// Filtered, sorted, paginated listing. `now` anchors the expiry
    /// policy check.
    async fn search(
        &self,
        params: &SearchParams,
        now: DateTime<Utc>,
    ) -> Result<CodePage, StoreError>;

    /// Every code, ordered by id, issue logs included. Feeds the CSV dump.
    async fn fetch_all(&self) -> Result<Vec<AuthorizationCode>, StoreError>;

    /// Deletes at most `batch` codes whose closing event (or expiry, for
    /// codes never closed) lies before `cutoff`. Returns the number
    /// deleted; the caller loops until a short batch.
    async fn purge_retired_before(
        &self,
        cutoff: DateTime<Utc>,
        batch: u32,
    ) -> Result<u64, StoreError>;
}
