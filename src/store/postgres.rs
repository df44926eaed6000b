//! Postgres implementation of `CodeStore`.
//!
//! The UNIQUE constraints on `code` and `specimen_number` are the real
//! uniqueness guarantee; application pre-checks only reduce retry cost.
//! Closing transitions use conditional updates so a concurrent revoke and
//! redeem can never both apply.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::models::{AuthorizationCode, NewAuthorizationCode};

use super::{CodePage, CodeStore, SearchParams, StoreError, UniqueColumn};

pub struct PgCodeStore {
    pool: PgPool,
}

impl PgCodeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn attach_issue_logs(
        &self,
        codes: &mut [AuthorizationCode],
    ) -> Result<(), StoreError> {
        if codes.is_empty() {
            return Ok(());
        }
        let ids: Vec<i64> = codes.iter().map(|c| c.id).collect();
        let rows = sqlx::query_as::<_, (i64, DateTime<Utc>)>(
            r#"
            SELECT code_id, issued_at FROM issue_log
            WHERE code_id = ANY($1)
            ORDER BY issued_at, id
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;

        let mut by_code: HashMap<i64, Vec<DateTime<Utc>>> = HashMap::new();
        for (code_id, issued_at) in rows {
            by_code.entry(code_id).or_default().push(issued_at);
        }
        for code in codes.iter_mut() {
            code.issue_log = by_code.remove(&code.id).unwrap_or_default();
        }
        Ok(())
    }

    async fn load_one(
        &self,
        mut code: Option<AuthorizationCode>,
    ) -> Result<Option<AuthorizationCode>, StoreError> {
        if let Some(c) = code.as_mut() {
            self.attach_issue_logs(std::slice::from_mut(c)).await?;
        }
        Ok(code)
    }
}

fn map_sqlx(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.code().map(|c| c == "23505").unwrap_or(false) {
            return match db.constraint() {
                Some("authorization_codes_code_key") => {
                    StoreError::UniqueViolation(UniqueColumn::Code)
                }
                Some("authorization_codes_specimen_number_key") => {
                    StoreError::UniqueViolation(UniqueColumn::SpecimenNumber)
                }
                _ => StoreError::Backend(err.to_string()),
            };
        }
    }
    StoreError::Backend(err.to_string())
}

/// Shared filter clause for search and count. `$1` text filter, `$2`
/// include_all, `$3` exclude_expired policy, `$4` now. The text filter is
/// a literal case-insensitive substring match; `strpos` avoids LIKE
/// pattern semantics, where `_` would act as a wildcard.
const SEARCH_FILTER: &str = r#"
    ($1 = '' OR strpos(lower(specimen_number), lower($1)) > 0)
    AND ($2 OR (revoked_at IS NULL AND redeemed_at IS NULL
                AND (NOT $3 OR expires_at > $4)))
"#;

#[async_trait]
impl CodeStore for PgCodeStore {
    async fn insert(
        &self,
        new: NewAuthorizationCode,
    ) -> Result<AuthorizationCode, StoreError> {
        sqlx::query_as::<_, AuthorizationCode>(
            r#"
            INSERT INTO authorization_codes
                (specimen_number, receive_date, onset_date, transmission_risk,
                 code, registered_at, registered_by, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(&new.specimen_number)
        .bind(new.receive_date)
        .bind(new.onset_date)
        .bind(&new.transmission_risk)
        .bind(&new.code)
        .bind(new.registered_at)
        .bind(&new.registered_by)
        .bind(new.expires_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)
    }

    async fn get(&self, id: i64) -> Result<Option<AuthorizationCode>, StoreError> {
        let code = sqlx::query_as::<_, AuthorizationCode>(
            "SELECT * FROM authorization_codes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        self.load_one(code).await
    }

    async fn find_by_code(
        &self,
        code: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError> {
        let found = sqlx::query_as::<_, AuthorizationCode>(
            "SELECT * FROM authorization_codes WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;
        self.load_one(found).await
    }

    async fn code_exists(&self, code: &str) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM authorization_codes WHERE code = $1)",
        )
        .bind(code)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)
    }

    async fn specimen_exists(&self, specimen_number: &str) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM authorization_codes WHERE specimen_number = $1)",
        )
        .bind(specimen_number)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)
    }

    async fn revoke_if_open(
        &self,
        id: i64,
        at: DateTime<Utc>,
        by: &str,
    ) -> Result<Option<AuthorizationCode>, StoreError> {
        let updated = sqlx::query_as::<_, AuthorizationCode>(
            r#"
            UPDATE authorization_codes
            SET revoked_at = $2, revoked_by = $3
            WHERE id = $1 AND revoked_at IS NULL AND redeemed_at IS NULL
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(at)
        .bind(by)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx)?;

        match updated {
            Some(code) => self.load_one(Some(code)).await,
            // Zero rows: either absent or already closed.
            None => {
                let exists = sqlx::query_scalar::<_, bool>(
                    "SELECT EXISTS (SELECT 1 FROM authorization_codes WHERE id = $1)",
                )
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx)?;
                if exists {
                    Ok(None)
                } else {
                    Err(StoreError::NotFound)
                }
            }
        }
    }

    async fn redeem_if_open(&self, id: i64, at: DateTime<Utc>) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE authorization_codes
            SET redeemed_at = $2
            WHERE id = $1 AND revoked_at IS NULL AND redeemed_at IS NULL
            "#,
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected() > 0)
    }

    async fn append_issue(
        &self,
        id: i64,
        at: DateTime<Utc>,
    ) -> Result<AuthorizationCode, StoreError> {
        let result = sqlx::query("INSERT INTO issue_log (code_id, issued_at) SELECT $1, $2 WHERE EXISTS (SELECT 1 FROM authorization_codes WHERE id = $1)")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx)?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        self.get(id).await?.ok_or(StoreError::NotFound)
    }

    async fn search(
        &self,
        params: &SearchParams,
        now: DateTime<Utc>,
    ) -> Result<CodePage, StoreError> {
        let text = params.text.clone().unwrap_or_default();

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM authorization_codes WHERE {SEARCH_FILTER}"
        ))
        .bind(&text)
        .bind(params.include_all)
        .bind(params.exclude_expired)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx)?;

        // Sort column and direction come from the allow-list enum, never
        // from caller input, so interpolation is safe here.
        let direction = if params.descending { "DESC" } else { "ASC" };
        let mut sql = format!(
            "SELECT * FROM authorization_codes WHERE {SEARCH_FILTER} \
             ORDER BY {} {}, id ASC",
            params.sort.as_column(),
            direction,
        );
        if params.limit > 0 {
            sql.push_str(&format!(" LIMIT {}", params.limit));
        }
        if params.offset > 0 {
            sql.push_str(&format!(" OFFSET {}", params.offset));
        }

        let mut codes = sqlx::query_as::<_, AuthorizationCode>(&sql)
            .bind(&text)
            .bind(params.include_all)
            .bind(params.exclude_expired)
            .bind(now)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
        self.attach_issue_logs(&mut codes).await?;

        Ok(CodePage {
            codes,
            total: total as u64,
        })
    }

    async fn fetch_all(&self) -> Result<Vec<AuthorizationCode>, StoreError> {
        let mut codes = sqlx::query_as::<_, AuthorizationCode>(
            "SELECT * FROM authorization_codes ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx)?;
        self.attach_issue_logs(&mut codes).await?;
        Ok(codes)
    }

    async fn purge_retired_before(
        &self,
        cutoff: DateTime<Utc>,
        batch: u32,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM authorization_codes
            WHERE id IN (
                SELECT id FROM authorization_codes
                WHERE COALESCE(revoked_at, redeemed_at, expires_at) < $1
                ORDER BY id
                LIMIT $2
            )
            "#,
        )
        .bind(cutoff)
        .bind(batch as i64)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx)?;
        Ok(result.rows_affected())
    }
}
