use chrono::Utc;

use crate::models::{StatusCode, U256};

/// Heuristic flight status: a flight whose scheduled time has been reached
/// is reported late by the airline, anything still in the future is on time.
///
/// `now == scheduled_timestamp` counts as late. Timestamps beyond any
/// representable wall clock are always on time.
pub fn classify(scheduled_timestamp: U256, now: u64) -> StatusCode {
    if U256::from(now) >= scheduled_timestamp {
        StatusCode::LateAirline
    } else {
        StatusCode::OnTime
    }
}

/// Current wall clock in unix seconds.
pub fn now_unix() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}
