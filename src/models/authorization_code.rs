use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::str::FromStr;

/// One-time authorization code tied to a lab specimen.
///
/// A code is Active until a revoke or redeem closes it; closed codes never
/// transition again. Expiry is derived once at registration and is a
/// read-only view, not a state of its own.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AuthorizationCode {
    pub id: i64,
    pub specimen_number: String,
    pub receive_date: NaiveDate,
    pub onset_date: NaiveDate,
    pub transmission_risk: String,
    pub code: String,
    pub registered_at: DateTime<Utc>,
    pub registered_by: String,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by: Option<String>,
    pub redeemed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    /// Delivery timestamps, oldest first. Lives in its own table; loaded
    /// separately from the row.
    #[sqlx(skip)]
    pub issue_log: Vec<DateTime<Utc>>,
}

impl AuthorizationCode {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_redeemed(&self) -> bool {
        self.redeemed_at.is_some()
    }

    /// Closed codes are terminal: no further transition is legal.
    pub fn is_closed(&self) -> bool {
        self.is_revoked() || self.is_redeemed()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// The instant the retention clock starts from: the closing event, or
    /// expiry for codes that were never closed.
    pub fn retired_at(&self) -> DateTime<Utc> {
        self.revoked_at
            .or(self.redeemed_at)
            .unwrap_or(self.expires_at)
    }
}

/// Field values for a code about to be persisted. The store assigns `id`.
#[derive(Debug, Clone)]
pub struct NewAuthorizationCode {
    pub specimen_number: String,
    pub receive_date: NaiveDate,
    pub onset_date: NaiveDate,
    pub transmission_risk: String,
    pub code: String,
    pub registered_at: DateTime<Utc>,
    pub registered_by: String,
    pub expires_at: DateTime<Utc>,
}

/// Allow-list of sortable attributes.
///
/// Sort parameters are parsed into this enum before they get anywhere near
/// a query, so an arbitrary string can never reach the ORDER BY clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    Id,
    SpecimenNumber,
    ReceiveDate,
    OnsetDate,
    TransmissionRisk,
    RegisteredAt,
    RegisteredBy,
    RevokedAt,
    RedeemedAt,
    ExpiresAt,
}

impl SortField {
    pub fn as_column(self) -> &'static str {
        match self {
            SortField::Id => "id",
            SortField::SpecimenNumber => "specimen_number",
            SortField::ReceiveDate => "receive_date",
            SortField::OnsetDate => "onset_date",
            SortField::TransmissionRisk => "transmission_risk",
            SortField::RegisteredAt => "registered_at",
            SortField::RegisteredBy => "registered_by",
            SortField::RevokedAt => "revoked_at",
            SortField::RedeemedAt => "redeemed_at",
            SortField::ExpiresAt => "expires_at",
        }
    }
}

impl Default for SortField {
    fn default() -> Self {
        SortField::SpecimenNumber
    }
}

impl FromStr for SortField {
    type Err = UnknownSortField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "id" => Ok(SortField::Id),
            "specimen_number" => Ok(SortField::SpecimenNumber),
            "receive_date" => Ok(SortField::ReceiveDate),
            "onset_date" => Ok(SortField::OnsetDate),
            "transmission_risk" => Ok(SortField::TransmissionRisk),
            "registered_at" => Ok(SortField::RegisteredAt),
            "registered_by" => Ok(SortField::RegisteredBy),
            "revoked_at" => Ok(SortField::RevokedAt),
            "redeemed_at" => Ok(SortField::RedeemedAt),
            "expires_at" => Ok(SortField::ExpiresAt),
            other => Err(UnknownSortField(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown sort field: {0}")]
pub struct UnknownSortField(pub String);

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn sample() -> AuthorizationCode {
        let registered_at = Utc.with_ymd_and_hms(2023, 1, 1, 10, 0, 0).unwrap();
        AuthorizationCode {
            id: 1,
            specimen_number: "SN1".to_string(),
            receive_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            onset_date: NaiveDate::from_ymd_opt(2022, 12, 30).unwrap(),
            transmission_risk: "HIGH".to_string(),
            code: "123456789012".to_string(),
            registered_at,
            registered_by: "tester".to_string(),
            revoked_at: None,
            revoked_by: None,
            redeemed_at: None,
            expires_at: registered_at + Duration::days(1),
            issue_log: Vec::new(),
        }
    }

    #[test]
    fn closed_is_terminal_view_over_either_field() {
        let mut code = sample();
        assert!(!code.is_closed());

        code.redeemed_at = Some(code.registered_at + Duration::hours(1));
        assert!(code.is_closed());
        assert!(!code.is_revoked());
    }

    #[test]
    fn expiry_is_independent_of_closed_state() {
        let code = sample();
        assert!(!code.is_expired(code.registered_at + Duration::hours(23)));
        assert!(code.is_expired(code.registered_at + Duration::hours(25)));
    }

    #[test]
    fn retired_at_prefers_the_closing_event() {
        let mut code = sample();
        assert_eq!(code.retired_at(), code.expires_at);

        let closed = code.registered_at + Duration::hours(2);
        code.revoked_at = Some(closed);
        assert_eq!(code.retired_at(), closed);
    }

    #[test]
    fn sort_field_parses_only_allow_listed_names() {
        assert_eq!(
            "specimen_number".parse::<SortField>().unwrap(),
            SortField::SpecimenNumber
        );
        assert_eq!("expires_at".parse::<SortField>().unwrap(), SortField::ExpiresAt);
        assert!("specimen_no; DROP TABLE".parse::<SortField>().is_err());
        assert!("created_at".parse::<SortField>().is_err());
    }
}
