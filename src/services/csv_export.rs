//! Fixed-layout CSV export of the code collection, used for audits.
//!
//! The column order is a compile-time constant and every cell is quoted.
//! Instants are stored in UTC and rendered shifted by the caller's offset;
//! date-only fields render without a time component.

use chrono::{DateTime, FixedOffset, Utc};
use csv::{QuoteStyle, WriterBuilder};
use thiserror::Error;

use crate::models::AuthorizationCode;

pub const COLUMNS: [&str; 15] = [
    "ID",
    "SPECIMEN_NUMBER",
    "RECEIVE_DATE",
    "ONSET_DATE",
    "TRANSMISSION_RISK",
    "AUTHORISATION_CODE",
    "REGISTERED_AT",
    "REGISTERED_BY",
    "REVOKED_AT",
    "REVOKED_BY",
    "EXPIRES_AT",
    "REDEEMED_AT",
    "ISSUED_AT_1",
    "ISSUED_AT_2",
    "ISSUED_AT_3",
];

/// Issue-log columns in the export; later deliveries are dropped.
const ISSUE_COLUMNS: usize = 3;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("csv write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("csv output was not valid UTF-8")]
    Encoding,
}

fn format_instant(at: DateTime<Utc>, offset: FixedOffset) -> String {
    at.with_timezone(&offset).format(TIMESTAMP_FORMAT).to_string()
}

/// Regroups 12 contiguous digits as `DDD-DDD-DDD-DDD`. Anything else
/// passes through untouched.
fn dash_grouped(code: &str) -> String {
    if code.len() == 12 && code.bytes().all(|b| b.is_ascii_digit()) {
        format!(
            "{}-{}-{}-{}",
            &code[..3],
            &code[3..6],
            &code[6..9],
            &code[9..]
        )
    } else {
        code.to_string()
    }
}

/// Pure mapping from entity to output row, in `COLUMNS` order.
pub fn row(code: &AuthorizationCode, offset: FixedOffset) -> [String; 15] {
    let mut issued = [String::new(), String::new(), String::new()];
    for (slot, at) in issued.iter_mut().zip(code.issue_log.iter().take(ISSUE_COLUMNS)) {
        *slot = format_instant(*at, offset);
    }

    let opt_instant = |at: Option<DateTime<Utc>>| {
        at.map(|a| format_instant(a, offset)).unwrap_or_default()
    };

    [
        code.id.to_string(),
        code.specimen_number.clone(),
        code.receive_date.format(DATE_FORMAT).to_string(),
        code.onset_date.format(DATE_FORMAT).to_string(),
        code.transmission_risk.clone(),
        dash_grouped(&code.code),
        format_instant(code.registered_at, offset),
        code.registered_by.clone(),
        opt_instant(code.revoked_at),
        code.revoked_by.clone().unwrap_or_default(),
        format_instant(code.expires_at, offset),
        opt_instant(code.redeemed_at),
        issued[0].clone(),
        issued[1].clone(),
        issued[2].clone(),
    ]
}

/// Serializes the given codes, header first, every field quoted.
pub fn export(codes: &[AuthorizationCode], offset: FixedOffset) -> Result<String, ExportError> {
    let mut writer = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .from_writer(Vec::new());

    writer.write_record(COLUMNS)?;
    for code in codes {
        writer.write_record(row(code, offset))?;
    }

    let bytes = writer.into_inner().map_err(|e| ExportError::Csv(e.into_error().into()))?;
    String::from_utf8(bytes).map_err(|_| ExportError::Encoding)
}
