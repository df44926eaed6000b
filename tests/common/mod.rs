#![allow(dead_code)]

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use authcodes::models::NewAuthorizationCode;
use authcodes::store::{CodeStore, InMemoryCodeStore};

pub fn fixed_instant() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 1, 10, 0, 0).unwrap()
}

pub fn new_code(
    specimen_number: &str,
    code: &str,
    registered_at: DateTime<Utc>,
) -> NewAuthorizationCode {
    NewAuthorizationCode {
        specimen_number: specimen_number.to_string(),
        receive_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
        onset_date: NaiveDate::from_ymd_opt(2022, 12, 30).unwrap(),
        transmission_risk: "HIGH".to_string(),
        code: code.to_string(),
        registered_at,
        registered_by: "tester".to_string(),
        expires_at: registered_at + Duration::days(1),
    }
}

/// Seeds one open code and returns its id.
pub async fn seed(store: &InMemoryCodeStore, specimen_number: &str, code: &str) -> i64 {
    store
        .insert(new_code(specimen_number, code, fixed_instant()))
        .await
        .unwrap()
        .id
}
