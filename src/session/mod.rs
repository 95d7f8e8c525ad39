pub mod holidays;
pub mod scheduler;

pub use holidays::HolidayTable;
pub use scheduler::{FeedCommand, Scheduler, SessionInfo};

use chrono::{DateTime, FixedOffset, Utc};

/// IST is a fixed UTC+05:30 offset; all session logic is defined on it.
pub const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

/// The IST offset as a chrono timezone.
pub fn ist() -> FixedOffset {
    FixedOffset::east_opt(IST_OFFSET_SECS).expect("IST offset is valid")
}

/// Current IST wall-clock time.
pub fn ist_now() -> DateTime<FixedOffset> {
    Utc::now().with_timezone(&ist())
}

/// Convert epoch milliseconds to an IST timestamp. Out-of-range inputs clamp
/// to the epoch.
pub fn ist_from_millis(ms: i64) -> DateTime<FixedOffset> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .unwrap_or_default()
        .with_timezone(&ist())
}
