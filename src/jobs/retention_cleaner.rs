//! Periodic purge of long-closed codes.
//!
//! A code becomes eligible once its closing event (revoke or redeem), or
//! its expiry when it was never closed, lies more than the retention
//! window in the past. Deletion happens in bounded batches so the cleaner
//! never holds the collection hostage while foreground requests run.

use chrono::{Duration, Utc};

use crate::store::{CodeStore, StoreError};

/// Deletes every code retired longer than `retention` ago and returns how
/// many were removed. Idempotent: a second run with no new closures
/// deletes nothing.
pub async fn cleanup(
    store: &dyn CodeStore,
    retention: Duration,
    batch_size: u32,
) -> Result<u64, StoreError> {
    let cutoff = Utc::now() - retention;
    let mut total = 0u64;

    loop {
        let deleted = store.purge_retired_before(cutoff, batch_size).await?;
        total += deleted;
        if deleted < u64::from(batch_size) {
            break;
        }
    }

    if total > 0 {
        tracing::info!(deleted = total, "retention cleanup removed codes");
    } else {
        tracing::debug!("retention cleanup found nothing to remove");
    }

    Ok(total)
}
