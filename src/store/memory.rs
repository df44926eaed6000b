//! In-memory implementation of `CodeStore`.
//!
//! Holds the collection in a `BTreeMap` behind a `RwLock`. Conditional
//! mutations run under the write lock, which gives the same
//! lost-update protection the SQL backend gets from conditional
//! updates. Used by the test suite and for local development without a
//! database.

use std::collections::BTreeMap;
use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::models::{AuthorizationCode, NewAuthorizationCode, SortField};

use super::{CodePage, CodeStore, SearchParams, StoreError, UniqueColumn};

#[derive(Default)]
struct Inner {
    rows: BTreeMap<i64, AuthorizationCode>,
    next_id: i64,
}

#[derive(Default)]
pub struct InMemoryCodeStore {
    inner: RwLock<Inner>,
}

impl InMemoryCodeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Nulls sort last in ascending order, matching the SQL backend.
fn cmp_nullable<T: Ord>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn cmp_field(field: SortField, a: &AuthorizationCode, b: &AuthorizationCode) -> Ordering {
    match field {
        SortField::Id => a.id.cmp(&b.id),
        SortField::SpecimenNumber => a.specimen_number.cmp(&b.specimen_number),
        SortField::ReceiveDate => a.receive_date.cmp(&b.receive_date),
        SortField::OnsetDate => a.onset_date.cmp(&b.onset_date),
        SortField::TransmissionRisk => a.transmission_risk.cmp(&b.transmission_risk),
        SortField::RegisteredAt => a.registered_at.cmp(&b.registered_at),
        SortField::RegisteredBy => a.registered_by.cmp(&b.registered_by),
        SortField::RevokedAt => cmp_nullable(&a.revoked_at, &b.revoked_at),
        SortField::RedeemedAt => cmp_nullable(&a.redeemed_at, &b.redeemed_at),
        SortField::ExpiresAt => a.expires_at.cmp(&b.expires_at),
    }
}

fn matches(params: &SearchParams, now: DateTime<Utc>, code: &AuthorizationCode) -> bool {
    if let Some(text) = &params.text {
        let needle = text.to_lowercase();
        if !code.specimen_number.to_lowercase().contains(&needle) {
            return false;
        }
    }
    if !params.include_all {
        if code.is_closed() {
            return false;
        }
        if params.exclude_expired && code.is_expired(now) {
            return false;
        }
    }
    true
}

#[async_trait]
impl CodeStore for InMemoryCodeStore {
    async fn insert(
        &self,
        new: NewAuthorizationCode,
    ) -> Result<AuthorizationCode, StoreError> {
        let mut inner = self.inner.write().await;

        if inner
            .rows
            .values()
            .any(|c| c.specimen_number == new.specimen_number)
        {
            return Err(StoreError::UniqueViolation(UniqueColumn::SpecimenNumber));
        }
        if inner.rows.values().any(|c| c.code == new.code) {
            return Err(StoreError::UniqueViolation(UniqueColumn::Code));
        }

        inner.next_id += 1;
        let id = inner.next_id;
        let code = AuthorizationCode {
            id,
            specimen_number: new.specimen_number,
            receive_date: new.receive_date,
            onset_date: new.onset_date,
            transmission_risk: new.transmission_risk,
            code: new.code,
            registered_at: new.registered_at,
            registered_by: new.registered_by,
            revoked_at: None,
            revoked_by: None,
            redeemed_at: None,
            expires_at: new.expires_at,
            issue_log: Vec::new(),
        };
        inner.rows.insert(id, code.clone());
        Ok(code)
    }

    async fn get(&self, id: i64) -> Result<Option<AuthorizationCode>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.rows.get(&id).cloned())
    }

    async fn find_by_code(
        &self,
        code: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.rows.values().find(|c| c.code == code).cloned())
    }

    async fn code_exists(&self, code: &str) -> Result<bool, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.rows.values().any(|c| c.code == code))
    }

    async fn specimen_exists(&self, specimen_number: &str) -> Result<bool, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .rows
            .values()
            .any(|c| c.specimen_number == specimen_number))
    }

    async fn revoke_if_open(
        &self,
        id: i64,
        at: DateTime<Utc>,
        by: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError> {
        let mut inner = self.inner.write().await;
        let code = inner.rows.get_mut(&id).ok_or(StoreError::NotFound)?;
        if code.is_closed() {
            return Ok(None);
        }
        code.revoked_at = Some(at);
        code.revoked_by = Some(by.to_string());
        Ok(Some(code.clone()))
    }

    async fn redeem_if_open(&self, id: i64, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let code = inner.rows.get_mut(&id).ok_or(StoreError::NotFound)?;
        if code.is_closed() {
            return Ok(false);
        }
        code.redeemed_at = Some(at);
        Ok(true)
    }

    async fn append_issue(
        &self,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<AuthorizationCode, StoreError> {
        let mut inner = self.inner.write().await;
        let code = inner.rows.get_mut(&id).ok_or(StoreError::NotFound)?;
        code.issue_log.push(at);
        Ok(code.clone())
    }

    async fn search(
        &self,
        params: &SearchParams,
        now: DateTime<Utc>,
    ) -> Result<CodePage, StoreError> {
        let inner = self.inner.read().await;

        let mut hits: Vec<AuthorizationCode> = inner
            .rows
            .values()
            .filter(|c| matches(params, now, c))
            .cloned()
            .collect();

        let sort = params.sort;
        let descending = params.descending;
        hits.sort_by(|a, b| {
            let primary = cmp_field(sort, a, b);
            let primary = if descending { primary.reverse() } else { primary };
            // Deterministic pages: ties always break on id ascending.
            primary.then_with(|| a.id.cmp(&b.id))
        });

        let total = hits.len() as u64;
        let start = (params.offset as usize).min(hits.len());
        let end = if params.limit == 0 {
            hits.len()
        } else {
            (start + params.limit as usize).min(hits.len())
        };

        Ok(CodePage {
            codes: hits[start..end].to_vec(),
            total,
        })
    }

    async fn fetch_all(&self) -> Result<Vec<AuthorizationCode>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.rows.values().cloned().collect())
    }

    async fn purge_retired_before(
        &self,
        cutoff: DateTime<Utc>,
        batch: u32,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.write().await;
        let doomed: Vec<i64> = inner
            .rows
            .values()
            .filter(|c| c.retired_at() < cutoff)
            .take(batch as usize)
            .map(|c| c.id)
            .collect();
        for id in &doomed {
            inner.rows.remove(id);
        }
        Ok(doomed.len() as u64)
    }
}
