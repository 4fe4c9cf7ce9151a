use once_cell::sync::Lazy;
use regex::Regex;

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("valid regex"));

/// Tracker durations in seconds as `Xh Ym`, `Xh`, `Ym`, or `Ns` under a minute.
pub fn format_seconds(seconds: i64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    match (hours, minutes) {
        (0, 0) => format!("{seconds}s"),
        (h, 0) => format!("{h}h"),
        (0, m) => format!("{m}m"),
        (h, m) => format!("{h}h {m}m"),
    }
}

pub fn is_iso_date(value: &str) -> bool {
    ISO_DATE.is_match(value.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seconds_format() {
        assert_eq!(format_seconds(5400), "1h 30m");
        assert_eq!(format_seconds(7200), "2h");
        assert_eq!(format_seconds(900), "15m");
        assert_eq!(format_seconds(42), "42s");
        assert_eq!(format_seconds(0), "0s");
    }

    #[test]
    fn iso_dates() {
        assert!(is_iso_date("2025-07-03"));
        assert!(is_iso_date(" 2025-07-03 "));
        assert!(!is_iso_date("3/7/2025"));
        assert!(!is_iso_date("2025-7-3"));
    }
}
