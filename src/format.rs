//! Date and detection-window formatting.
//!
//! Output uses a fixed day/month/year, 24-hour convention
//! (`dd/mm/yyyy HH:MM`) so every card reads the same regardless of host locale.

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, Offset, TimeZone, Utc};

const DATE_FORMAT: &str = "%d/%m/%Y";
const TIME_FORMAT: &str = "%H:%M";
const ARROW: &str = " → ";

/// Naive layouts accepted besides RFC 3339. Read in the display zone.
const NAIVE_LAYOUTS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Time zone used to read naive timestamps and to display instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayZone {
    /// The host's local zone.
    #[default]
    Local,
    Fixed(FixedOffset),
}

impl DisplayZone {
    pub fn utc() -> Self {
        Self::Fixed(Utc.fix())
    }

    /// Fixed offset in minutes east of UTC. Out-of-range offsets yield None.
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        FixedOffset::east_opt(minutes.checked_mul(60)?).map(Self::Fixed)
    }

    fn localize(&self, naive: NaiveDateTime) -> Option<DateTime<Utc>> {
        match self {
            Self::Local => Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc)),
            Self::Fixed(offset) => offset
                .from_local_datetime(&naive)
                .single()
                .map(|dt| dt.with_timezone(&Utc)),
        }
    }

    fn wall_clock(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        match self {
            Self::Local => instant.with_timezone(&Local).naive_local(),
            Self::Fixed(offset) => instant.with_timezone(offset).naive_local(),
        }
    }
}

/// Parse an ISO-like timestamp. Returns None when nothing matches.
pub fn parse_instant(raw: &str, zone: DisplayZone) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    for layout in NAIVE_LAYOUTS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, layout) {
            return zone.localize(naive);
        }
    }

    // Date-only forms are UTC midnight, as browsers read them.
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn format_parsed(instant: DateTime<Utc>, zone: DisplayZone) -> String {
    zone.wall_clock(instant)
        .format(&format!("{DATE_FORMAT} {TIME_FORMAT}"))
        .to_string()
}

/// Format one timestamp. Unparseable input is returned verbatim.
pub fn format_instant(raw: &str, zone: DisplayZone) -> String {
    match parse_instant(raw, zone) {
        Some(instant) => format_parsed(instant, zone),
        None => raw.to_string(),
    }
}

/// Format a detection window, earliest bound first.
///
/// - both bounds unparseable: empty string
/// - one bound unparseable: the other one alone
/// - bounds that display identically: shown once
/// - same calendar day: `<date> <start time> → <end time>`
/// - otherwise: `<start> → <end>`
pub fn format_window(start: Option<&str>, end: Option<&str>, zone: DisplayZone) -> String {
    let a = start.and_then(|s| parse_instant(s, zone));
    let b = end.and_then(|s| parse_instant(s, zone));

    let (a, b) = match (a, b) {
        (None, None) => return String::new(),
        (Some(only), None) | (None, Some(only)) => return format_parsed(only, zone),
        (Some(a), Some(b)) if a <= b => (a, b),
        (Some(a), Some(b)) => (b, a),
    };

    let first = format_parsed(a, zone);
    let last = format_parsed(b, zone);
    if first == last {
        return first;
    }

    let wall_a = zone.wall_clock(a);
    let wall_b = zone.wall_clock(b);
    if wall_a.date() == wall_b.date() {
        let date = wall_a.format(DATE_FORMAT).to_string();
        let time_a = wall_a.format(TIME_FORMAT).to_string();
        let time_b = wall_b.format(TIME_FORMAT).to_string();
        if time_a == time_b {
            return format!("{date} {time_a}");
        }
        return format!("{date} {time_a}{ARROW}{time_b}");
    }

    format!("{first}{ARROW}{last}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> DisplayZone {
        DisplayZone::utc()
    }

    #[test]
    fn test_format_instant_fixed_convention() {
        assert_eq!(
            format_instant("2024-01-01T10:00:00Z", utc()),
            "01/01/2024 10:00"
        );
        assert_eq!(
            format_instant("2024-07-14T21:05:33", utc()),
            "14/07/2024 21:05"
        );
    }

    #[test]
    fn test_format_instant_applies_offset() {
        let paris = DisplayZone::from_offset_minutes(60).unwrap();
        assert_eq!(
            format_instant("2024-01-01T23:30:00Z", paris),
            "02/01/2024 00:30"
        );
    }

    #[test]
    fn test_format_instant_unparseable_is_verbatim() {
        assert_eq!(format_instant("hier soir", utc()), "hier soir");
        assert_eq!(format_instant("", utc()), "");
    }

    #[test]
    fn test_date_only_is_utc_midnight() {
        assert_eq!(format_instant("2024-02-29", utc()), "29/02/2024 00:00");
    }

    #[test]
    fn test_window_equal_instants_shown_once() {
        let t = "2024-01-01T10:00:00Z";
        assert_eq!(format_window(Some(t), Some(t), utc()), "01/01/2024 10:00");
        // Same minute, different seconds: still identical on screen.
        assert_eq!(
            format_window(
                Some("2024-01-01T10:00:05Z"),
                Some("2024-01-01T10:00:55Z"),
                utc()
            ),
            "01/01/2024 10:00"
        );
    }

    #[test]
    fn test_window_one_side_unparseable() {
        assert_eq!(
            format_window(Some("nope"), Some("2024-01-01T10:00:00Z"), utc()),
            "01/01/2024 10:00"
        );
        assert_eq!(
            format_window(Some("2024-01-01T10:00:00Z"), Some("nope"), utc()),
            "01/01/2024 10:00"
        );
        assert_eq!(
            format_window(None, Some("2024-01-01T10:00:00Z"), utc()),
            "01/01/2024 10:00"
        );
    }

    #[test]
    fn test_window_both_unparseable_is_empty() {
        assert_eq!(format_window(Some("a"), Some("b"), utc()), "");
        assert_eq!(format_window(None, None, utc()), "");
    }

    #[test]
    fn test_window_same_day() {
        assert_eq!(
            format_window(
                Some("2024-01-01T10:00:00Z"),
                Some("2024-01-01T10:05:00Z"),
                utc()
            ),
            "01/01/2024 10:00 → 10:05"
        );
    }

    #[test]
    fn test_window_normalizes_order() {
        assert_eq!(
            format_window(
                Some("2024-01-01T10:05:00Z"),
                Some("2024-01-01T10:00:00Z"),
                utc()
            ),
            "01/01/2024 10:00 → 10:05"
        );
    }

    #[test]
    fn test_window_across_days() {
        assert_eq!(
            format_window(
                Some("2024-01-01T23:50:00Z"),
                Some("2024-01-02T00:10:00Z"),
                utc()
            ),
            "01/01/2024 23:50 → 02/01/2024 00:10"
        );
    }

    #[test]
    fn test_offset_out_of_range() {
        assert!(DisplayZone::from_offset_minutes(24 * 60).is_none());
        assert!(DisplayZone::from_offset_minutes(-120).is_some());
    }
}
