//! Detection records as published by the feed, and the client-side
//! transforms applied before rendering.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::format::{parse_instant, DisplayZone};

/// One detection as received from the remote JSON array.
///
/// The feed has shipped several shapes over time: a single `datetime`, or a
/// pre-folded `datetime_start`/`datetime_end` pair with a `count`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datetime_end: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub sci_name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub com_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

/// Names may be published as `null`; read them as empty.
fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

impl DetectionRecord {
    /// Create a single-instant record.
    pub fn new(sci_name: &str, datetime: &str) -> Self {
        Self {
            datetime: Some(datetime.to_string()),
            sci_name: sci_name.to_string(),
            ..Default::default()
        }
    }

    /// Trimmed scientific name, used as the species key everywhere.
    pub fn species_key(&self) -> &str {
        self.sci_name.trim()
    }

    /// Raw start of the record's window (`datetime_start`, else `datetime`).
    pub fn start_raw(&self) -> Option<&str> {
        self.datetime_start.as_deref().or(self.datetime.as_deref())
    }

    /// Raw end of the record's window (`datetime_end`, else `datetime`).
    pub fn end_raw(&self) -> Option<&str> {
        self.datetime_end.as_deref().or(self.datetime.as_deref())
    }

    /// Latest parseable instant in the record, used for ordering.
    pub fn sort_instant(&self, zone: DisplayZone) -> Option<DateTime<Utc>> {
        let start = self.start_raw().and_then(|s| parse_instant(s, zone));
        let end = self.end_raw().and_then(|s| parse_instant(s, zone));
        start.max(end)
    }

    /// Number of detections this record stands for.
    pub fn weight(&self) -> u32 {
        self.count.unwrap_or(1).max(1)
    }
}

/// A run of consecutive detections of the same species, rendered as one card.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub sci_name: String,
    pub com_name: String,
    pub count: u32,
    /// Raw timestamp of the earliest detection in the run.
    pub start: Option<String>,
    /// Raw timestamp of the latest detection in the run.
    pub end: Option<String>,
    pub confidence: Option<f64>,
}

impl Detection {
    pub fn species_key(&self) -> &str {
        self.sci_name.trim()
    }

    /// Common name, falling back to the scientific name.
    pub fn display_name(&self) -> &str {
        let common = self.com_name.trim();
        if !common.is_empty() {
            common
        } else {
            self.sci_name.trim()
        }
    }
}

impl From<&DetectionRecord> for Detection {
    fn from(record: &DetectionRecord) -> Self {
        Self {
            sci_name: record.sci_name.clone(),
            com_name: record.com_name.clone(),
            count: record.weight(),
            start: record.start_raw().map(str::to_string),
            end: record.end_raw().map(str::to_string),
            confidence: record.confidence,
        }
    }
}

/// Sort records newest first. Records without a parseable instant keep
/// their relative order and go last.
pub fn sort_descending(records: &mut [DetectionRecord], zone: DisplayZone) {
    records.sort_by_cached_key(|r| std::cmp::Reverse(r.sort_instant(zone)));
}

/// Fold adjacent records of the same species into single detections.
///
/// Records with an empty species key are never folded.
pub fn fold_consecutive(records: &[DetectionRecord], zone: DisplayZone) -> Vec<Detection> {
    let mut groups: Vec<Detection> = Vec::new();

    for record in records {
        let key = record.species_key();
        let extend = matches!(groups.last(), Some(last) if !key.is_empty() && last.species_key() == key);

        if !extend {
            groups.push(Detection::from(record));
            continue;
        }

        if let Some(last) = groups.last_mut() {
            last.count += record.weight();
            if last.com_name.trim().is_empty() {
                last.com_name = record.com_name.clone();
            }
            last.confidence = match (last.confidence, record.confidence) {
                (Some(a), Some(b)) => Some(a.max(b)),
                (a, b) => a.or(b),
            };
            widen(&mut last.start, record.start_raw(), zone, |new, old| new < old);
            widen(&mut last.end, record.end_raw(), zone, |new, old| new > old);
        }
    }

    groups
}

/// Replace `bound` with `candidate` when it parses and `better` says so.
/// An unparseable bound is always replaced by a parseable candidate.
fn widen(
    bound: &mut Option<String>,
    candidate: Option<&str>,
    zone: DisplayZone,
    better: impl Fn(DateTime<Utc>, DateTime<Utc>) -> bool,
) {
    let Some(candidate) = candidate else {
        return;
    };
    let Some(new) = parse_instant(candidate, zone) else {
        return;
    };
    let replace = match bound.as_deref().and_then(|b| parse_instant(b, zone)) {
        Some(old) => better(new, old),
        None => true,
    };
    if replace {
        *bound = Some(candidate.to_string());
    }
}

/// Convert records one-to-one without folding.
pub fn unfolded(records: &[DetectionRecord]) -> Vec<Detection> {
    records.iter().map(Detection::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc() -> DisplayZone {
        DisplayZone::utc()
    }

    #[test]
    fn test_fold_consecutive_same_species() {
        let records = vec![
            DetectionRecord::new("Parus major", "2024-01-01T10:00:00Z"),
            DetectionRecord::new("Parus major", "2024-01-01T10:05:00Z"),
            DetectionRecord::new("Turdus merula", "2024-01-01T11:00:00Z"),
        ];

        let groups = fold_consecutive(&records, utc());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].sci_name, "Parus major");
        assert_eq!(groups[0].count, 2);
        assert_eq!(groups[0].start.as_deref(), Some("2024-01-01T10:00:00Z"));
        assert_eq!(groups[0].end.as_deref(), Some("2024-01-01T10:05:00Z"));
        assert_eq!(groups[1].sci_name, "Turdus merula");
        assert_eq!(groups[1].count, 1);
    }

    #[test]
    fn test_fold_does_not_merge_non_adjacent() {
        let records = vec![
            DetectionRecord::new("Parus major", "2024-01-01T10:00:00Z"),
            DetectionRecord::new("Turdus merula", "2024-01-01T10:01:00Z"),
            DetectionRecord::new("Parus major", "2024-01-01T10:02:00Z"),
        ];
        let groups = fold_consecutive(&records, utc());
        assert_eq!(groups.len(), 3);
    }

    #[test]
    fn test_fold_keeps_empty_names_apart() {
        let records = vec![
            DetectionRecord::new("", "2024-01-01T10:00:00Z"),
            DetectionRecord::new("  ", "2024-01-01T10:01:00Z"),
        ];
        assert_eq!(fold_consecutive(&records, utc()).len(), 2);
    }

    #[test]
    fn test_fold_adds_counts_and_keeps_best_confidence() {
        let mut a = DetectionRecord::new("Pica pica", "2024-03-02T08:00:00Z");
        a.count = Some(3);
        a.confidence = Some(0.7);
        let mut b = DetectionRecord::new("Pica pica ", "2024-03-02T07:00:00Z");
        b.confidence = Some(0.9);

        let groups = fold_consecutive(&[a, b], utc());
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].count, 4);
        assert_eq!(groups[0].confidence, Some(0.9));
        assert_eq!(groups[0].start.as_deref(), Some("2024-03-02T07:00:00Z"));
        assert_eq!(groups[0].end.as_deref(), Some("2024-03-02T08:00:00Z"));
    }

    #[test]
    fn test_sort_descending_puts_unparseable_last() {
        let mut records = vec![
            DetectionRecord::new("A", "2024-01-01T10:00:00Z"),
            DetectionRecord::new("B", "garbage"),
            DetectionRecord::new("C", "2024-01-02T10:00:00Z"),
        ];
        sort_descending(&mut records, utc());
        let names: Vec<&str> = records.iter().map(|r| r.sci_name.as_str()).collect();
        assert_eq!(names, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_record_deserializes_window_shape() {
        let json = r#"{"datetime_start":"2024-05-01T06:00:00","datetime_end":"2024-05-01T06:10:00",
            "sci_name":"Erithacus rubecula","com_name":"Rougegorge familier","count":4}"#;
        let record: DetectionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.weight(), 4);
        assert_eq!(record.start_raw(), Some("2024-05-01T06:00:00"));
        assert_eq!(record.end_raw(), Some("2024-05-01T06:10:00"));
        assert!(record.confidence.is_none());
    }

    #[test]
    fn test_record_accepts_null_names() {
        let json = r#"[{"datetime":"2024-05-01T06:00:00","sci_name":"Parus major","com_name":null},
            {"datetime":"2024-05-01T06:01:00","sci_name":null,"com_name":"Inconnu"}]"#;
        let records: Vec<DetectionRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(records[0].com_name, "");
        assert_eq!(records[1].sci_name, "");
        assert_eq!(Detection::from(&records[0]).display_name(), "Parus major");
        assert_eq!(records[1].species_key(), "");
    }

    #[test]
    fn test_display_name_falls_back_to_sci_name() {
        let detection = Detection::from(&DetectionRecord::new("Sitta europaea", "x"));
        assert_eq!(detection.display_name(), "Sitta europaea");
    }
}
