//! Centralized time formatting utilities.
//!
//! All clock/countdown display formatting goes through this module to keep
//! the overlay, notification text, and CLI output consistent.

/// Format a timeline clock position as `m:ss`.
///
/// Negative positions (pre-pull countdowns) are prefixed with `-`.
///
/// # Examples
/// ```
/// use raidline_types::formatting::format_clock;
/// assert_eq!(format_clock(0.0), "0:00");
/// assert_eq!(format_clock(75.4), "1:15");
/// assert_eq!(format_clock(-3.0), "-0:03");
/// ```
pub fn format_clock(secs: f64) -> String {
    let sign = if secs < 0.0 { "-" } else { "" };
    let total = secs.abs() as u64;
    format!("{}{}:{:02}", sign, total / 60, total % 60)
}

/// Format the "time remaining" suffix appended to early activity notices.
///
/// Sub-second remainders round up so a notice never claims `in 0s` while the
/// activity is still pending.
///
/// # Examples
/// ```
/// use raidline_types::formatting::format_remaining;
/// assert_eq!(format_remaining(6.0), "in 6s");
/// assert_eq!(format_remaining(0.3), "in 1s");
/// assert_eq!(format_remaining(65.0), "in 1m05s");
/// ```
pub fn format_remaining(secs: f64) -> String {
    let total = secs.max(0.0).ceil() as u64;
    if total >= 60 {
        format!("in {}m{:02}s", total / 60, total % 60)
    } else {
        format!("in {}s", total.max(1))
    }
}
