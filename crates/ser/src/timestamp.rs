use std::time::{SystemTime, UNIX_EPOCH};

/// Number of 100 ns ticks between the SER epoch (Jan 1, year 0001, the
/// Visual Basic Date epoch) and the Unix epoch.
pub const TICKS_AT_UNIX_EPOCH: i64 = 621_355_968_000_000_000;

/// SER timestamps count 100 ns ticks.
pub const TICKS_PER_SEC: i64 = 10_000_000;

/// Convert nanoseconds since the Unix epoch to SER ticks.
pub fn ticks_from_unix_ns(ns: i64) -> i64 {
    ns / 100 + TICKS_AT_UNIX_EPOCH
}

/// Current UTC time in SER ticks. A system clock before 1970 reads as the
/// Unix epoch rather than failing.
pub fn utc_ticks_now() -> i64 {
    let ns = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0);
    ticks_from_unix_ns(ns)
}

/// Local timezone offset from UTC in seconds, via libc because the standard
/// library has no way to ask for it.
pub fn local_utc_offset_secs() -> i64 {
    let now = unsafe { libc::time(std::ptr::null_mut()) };
    let mut tm: libc::tm = unsafe { std::mem::zeroed() };
    let result = unsafe { libc::localtime_r(&now, &mut tm) };
    if result.is_null() {
        return 0;
    }
    tm.tm_gmtoff as i64
}
