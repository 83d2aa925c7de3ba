#![forbid(unsafe_code)]

use time::OffsetDateTime;

/// Timestamp written to `ejaLog` columns: `YYYY-MM-DD HH:MM:SS` (UTC).
pub fn now() -> String {
    let now = OffsetDateTime::now_utc();
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

pub fn unix_secs() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}
