//! Remaining-time rendering.
//!
//! The app shows the time left on an order as a compact string of
//! day/hour/minute/second parts, e.g. `1天2小时`.

const DAY: u64 = 86_400;
const HOUR: u64 = 3_600;
const MINUTE: u64 = 60;

/// Render a remaining duration in seconds.
///
/// A unit is emitted only when the seconds still left strictly exceed the
/// unit's size, so exactly one day renders as `24小时` and exactly one
/// minute as `60秒`. Zero renders as an empty string.
///
/// # Examples
///
/// ```
/// use cellar_protocol::format_remaining;
///
/// assert_eq!(format_remaining(93_600 + 1), "1天2小时1秒");
/// assert_eq!(format_remaining(0), "");
/// ```
pub fn format_remaining(seconds: u64) -> String {
    let mut left = seconds;
    let mut out = String::new();

    for (size, unit) in [(DAY, "天"), (HOUR, "小时"), (MINUTE, "分钟")] {
        if left > size {
            let count = left / size;
            left -= count * size;
            out.push_str(&count.to_string());
            out.push_str(unit);
        }
    }

    if left > 0 {
        out.push_str(&left.to_string());
        out.push('秒');
    }

    out
}
