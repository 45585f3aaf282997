//! Progress & timing calculator.
//!
//! Pure functions over a `StatusRecord` and the current unix time. Nothing
//! here touches the store; derived values are computed on read, except the
//! `pct_complete` snapshot the worker caches at each progress write.

use super::record::StatusRecord;
use super::state::JobStatus;

/// `round(at / total * 100)`, 0 when `total == 0`.
///
/// Not clamped: an `at` past `total` yields more than 100.
pub fn percent_of(at: i64, total: i64) -> i64 {
    if total == 0 {
        return 0;
    }
    (at as f64 / total as f64 * 100.0).round() as i64
}

/// Percent complete for display. `complete` always reads as 100.
///
/// Falls back to the cached `pct_complete` snapshot when the record carries
/// no `at` yet (e.g. written by an older worker), then to 0.
pub fn percent_complete(record: &StatusRecord) -> i64 {
    if record.status == Some(JobStatus::Complete) {
        return 100;
    }
    match record.at {
        Some(at) => percent_of(at, record.total_units()),
        None => record.pct_complete.unwrap_or(0),
    }
}

/// Seconds spent executing.
///
/// - terminal: `ended_at - started_at`, `None` if either is unset
/// - working / retrying: `now - started_at`
/// - queued / unknown: `None`
///
/// Timestamps are stored as given, so a difference that overflows is `None`.
pub fn elapsed(record: &StatusRecord, now: i64) -> Option<i64> {
    match record.status? {
        status if status.is_terminal() => record.ended_at?.checked_sub(record.started_at?),
        status if status.is_active() => now.checked_sub(record.started_at?),
        _ => None,
    }
}

/// Linear projection of the seconds left, assuming constant throughput.
///
/// The reference start is `started_at`, then `enqueued_at`, then
/// `updated_at`. `None` when nothing is done yet or no reference exists.
/// Callers decide whether the status makes the number meaningful.
pub fn estimated_time_remaining(record: &StatusRecord, now: i64) -> Option<f64> {
    let at = record.units_completed();
    if at == 0 {
        return None;
    }
    let reference = record
        .started_at
        .or(record.enqueued_at)
        .or(record.updated_at)?;
    // f64 throughout: `at` and `total` are stored unchecked
    let elapsed = now as f64 - reference as f64;
    let remaining = record.total_units() as f64 - at as f64;
    Some(elapsed / at as f64 * remaining)
}
