// Time helpers for logging and record timestamps. System time is never
// used for consensus decisions; block ordering comes from the ledger.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub type TimestampSeconds = u64;

#[inline]
pub fn get_current_time() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Incorrect time returned from get_current_time")
}

pub fn get_current_time_in_seconds() -> TimestampSeconds {
    get_current_time().as_secs()
}
