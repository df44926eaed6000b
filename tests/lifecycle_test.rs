mod common;

use chrono::{Duration, NaiveDate, Utc};

use authcodes::jobs::retention_cleaner;
use authcodes::services::code_generator::SystemRandomSource;
use authcodes::services::lifecycle::{self, CodeError, RedeemOutcome, RegisterRequest};
use authcodes::store::{CodeStore, InMemoryCodeStore};

use common::{fixed_instant, new_code, seed};

fn request(specimen_number: &str) -> RegisterRequest {
    RegisterRequest {
        specimen_number: specimen_number.to_string(),
        receive_date: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
        onset_date: NaiveDate::from_ymd_opt(2022, 12, 30).unwrap(),
        transmission_risk: "HIGH".to_string(),
    }
}

#[tokio::test]
async fn register_creates_an_active_code_with_derived_expiry() {
    let store = InMemoryCodeStore::new();
    let rng = SystemRandomSource::new();
    let at = fixed_instant();

    let created = lifecycle::register(&store, &rng, request("SN1"), "jdoe", Duration::days(1), at)
        .await
        .unwrap();

    assert_eq!(created.code.len(), 12);
    assert!(created.code.bytes().all(|b| b.is_ascii_digit()));
    assert_eq!(created.registered_at, at);
    assert_eq!(created.expires_at, at + Duration::days(1));
    assert_eq!(created.registered_by, "jdoe");
    assert!(!created.is_closed());
    assert!(created.issue_log.is_empty());
}

#[tokio::test]
async fn register_rejects_duplicate_specimen_numbers() {
    let store = InMemoryCodeStore::new();
    let rng = SystemRandomSource::new();
    let at = fixed_instant();

    lifecycle::register(&store, &rng, request("SN1"), "jdoe", Duration::days(1), at)
        .await
        .unwrap();
    let err = lifecycle::register(&store, &rng, request("SN1"), "jdoe", Duration::days(1), at)
        .await
        .unwrap_err();

    assert!(matches!(err, CodeError::DuplicateSpecimen));
}

#[tokio::test]
async fn generated_codes_are_unique_across_registrations() {
    let store = InMemoryCodeStore::new();
    let rng = SystemRandomSource::new();
    let at = fixed_instant();

    let mut seen = std::collections::HashSet::new();
    for n in 0..50 {
        let created = lifecycle::register(
            &store,
            &rng,
            request(&format!("SN{n}")),
            "jdoe",
            Duration::days(1),
            at,
        )
        .await
        .unwrap();
        assert!(seen.insert(created.code));
    }
}

#[tokio::test]
async fn revoke_succeeds_once_then_reports_already_closed() {
    let store = InMemoryCodeStore::new();
    let id = seed(&store, "SN1", "111111111111").await;
    let at = fixed_instant() + Duration::hours(1);

    let revoked = lifecycle::revoke(&store, id, "jdoe", at).await.unwrap();
    assert_eq!(revoked.revoked_at, Some(at));
    assert_eq!(revoked.revoked_by.as_deref(), Some("jdoe"));

    let err = lifecycle::revoke(&store, id, "other", at + Duration::hours(1))
        .await
        .unwrap_err();
    assert!(matches!(err, CodeError::AlreadyClosed));

    // The first revocation is untouched.
    let current = store.get(id).await.unwrap().unwrap();
    assert_eq!(current.revoked_at, Some(at));
    assert_eq!(current.revoked_by.as_deref(), Some("jdoe"));
}

#[tokio::test]
async fn revoke_of_unknown_id_is_not_found() {
    let store = InMemoryCodeStore::new();
    let err = lifecycle::revoke(&store, 404, "jdoe", fixed_instant())
        .await
        .unwrap_err();
    assert!(matches!(err, CodeError::NotFound));
}

#[tokio::test]
async fn redeem_of_unknown_code_is_not_found() {
    let store = InMemoryCodeStore::new();
    let err = lifecycle::redeem(&store, "000000000000", fixed_instant())
        .await
        .unwrap_err();
    assert!(matches!(err, CodeError::NotFound));
}

#[tokio::test]
async fn redeem_is_idempotent() {
    let store = InMemoryCodeStore::new();
    let id = seed(&store, "SN1", "111111111111").await;
    let at = fixed_instant() + Duration::hours(1);

    let first = lifecycle::redeem(&store, "111111111111", at).await.unwrap();
    assert_eq!(first, RedeemOutcome::Redeemed);

    let second = lifecycle::redeem(&store, "111111111111", at + Duration::hours(1))
        .await
        .unwrap();
    assert_eq!(second, RedeemOutcome::AlreadyRedeemed);

    let current = store.get(id).await.unwrap().unwrap();
    assert_eq!(current.redeemed_at, Some(at));
}

#[tokio::test]
async fn redeem_of_a_revoked_code_is_already_closed() {
    let store = InMemoryCodeStore::new();
    let id = seed(&store, "SN1", "111111111111").await;
    lifecycle::revoke(&store, id, "jdoe", fixed_instant())
        .await
        .unwrap();

    let err = lifecycle::redeem(&store, "111111111111", fixed_instant())
        .await
        .unwrap_err();
    assert!(matches!(err, CodeError::AlreadyClosed));

    let current = store.get(id).await.unwrap().unwrap();
    assert!(current.redeemed_at.is_none());
}

#[tokio::test]
async fn expired_codes_remain_redeemable() {
    let store = InMemoryCodeStore::new();
    seed(&store, "SN1", "111111111111").await;

    // Two days past a one-day validity.
    let late = fixed_instant() + Duration::days(2);
    let outcome = lifecycle::redeem(&store, "111111111111", late).await.unwrap();
    assert_eq!(outcome, RedeemOutcome::Redeemed);
}

#[tokio::test]
async fn conditional_update_refuses_the_race_loser() {
    let store = InMemoryCodeStore::new();
    let id = seed(&store, "SN1", "111111111111").await;
    let at = fixed_instant();

    assert!(store
        .revoke_if_open(id, at, "jdoe")
        .await
        .unwrap()
        .is_some());
    // A concurrent redeem that read the open state must now fail to apply.
    assert!(!store.redeem_if_open(id, at).await.unwrap());
    assert!(store.revoke_if_open(id, at, "other").await.unwrap().is_none());
}

#[tokio::test]
async fn issue_appends_to_the_log_without_changing_state() {
    let store = InMemoryCodeStore::new();
    let id = seed(&store, "SN1", "111111111111").await;
    let at = fixed_instant();

    for n in 1..=4 {
        let updated = lifecycle::issue(&store, id, at + Duration::hours(n))
            .await
            .unwrap();
        assert_eq!(updated.issue_log.len(), n as usize);
        assert!(!updated.is_closed());
    }

    // Issuance is never gated, closed codes included.
    lifecycle::revoke(&store, id, "jdoe", at).await.unwrap();
    let updated = lifecycle::issue(&store, id, at + Duration::hours(5))
        .await
        .unwrap();
    assert_eq!(updated.issue_log.len(), 5);
}

#[tokio::test]
async fn issue_of_unknown_id_is_not_found() {
    let store = InMemoryCodeStore::new();
    let err = lifecycle::issue(&store, 404, fixed_instant()).await.unwrap_err();
    assert!(matches!(err, CodeError::NotFound));
}

#[tokio::test]
async fn retention_cleanup_removes_only_long_retired_codes() {
    let store = InMemoryCodeStore::new();
    let now = Utc::now();

    // Closed well past retention.
    let old_revoked = store
        .insert(new_code("SN-OLD-REVOKED", "111111111111", now - Duration::days(100)))
        .await
        .unwrap();
    store
        .revoke_if_open(old_revoked.id, now - Duration::days(90), "jdoe")
        .await
        .unwrap();

    // Never closed, expired well past retention.
    store
        .insert(new_code("SN-OLD-EXPIRED", "222222222222", now - Duration::days(80)))
        .await
        .unwrap();

    // Closed recently: stays.
    let fresh = store
        .insert(new_code("SN-FRESH", "333333333333", now - Duration::days(2)))
        .await
        .unwrap();
    store
        .revoke_if_open(fresh.id, now - Duration::days(1), "jdoe")
        .await
        .unwrap();

    // Open and unexpired: stays.
    store
        .insert(new_code("SN-OPEN", "444444444444", now))
        .await
        .unwrap();

    let deleted = retention_cleaner::cleanup(&store, Duration::days(30), 1)
        .await
        .unwrap();
    assert_eq!(deleted, 2);

    let remaining = store.fetch_all().await.unwrap();
    let specimens: Vec<&str> = remaining.iter().map(|c| c.specimen_number.as_str()).collect();
    assert_eq!(specimens, vec!["SN-FRESH", "SN-OPEN"]);

    // Idempotent: nothing new to remove.
    let again = retention_cleaner::cleanup(&store, Duration::days(30), 1)
        .await
        .unwrap();
    assert_eq!(again, 0);
}
