//! Conversion of a detector's `BirdDB.txt` export into the JSON feed.
//!
//! The export is semicolon-delimited with a header row (`Date;Time;Sci_Name;
//! Com_Name;Confidence;...`). Common names come from a labels file with one
//! `<scientific name>_<common name>` entry per line.

use std::collections::HashMap;
use std::fs;
use std::mem::take;
use std::path::Path;

use chrono::NaiveDateTime;
use thiserror::Error;
use tracing::{debug, info};

use crate::models::DetectionRecord;

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("{0} has no header row")]
    MissingHeader(String),
    #[error("cannot encode feed: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Parse a labels file into a scientific name → common name map.
///
/// Lines without `_` are skipped; the first `_` splits the two names.
pub fn parse_labels(text: &str) -> HashMap<String, String> {
    let mut labels = HashMap::new();
    for line in text.lines() {
        let line = line.trim();
        let Some((sci, common)) = line.split_once('_') else {
            continue;
        };
        let sci = sci.trim();
        if !sci.is_empty() {
            labels.insert(sci.to_string(), common.trim().to_string());
        }
    }
    labels
}

/// Split delimited text into rows of fields. Double-quoted fields may hold
/// the separator, line breaks and `""` escapes. Blank lines yield no row.
pub fn parse_rows(text: &str, sep: char) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' => in_quotes = true,
            c if c == sep && !in_quotes => row.push(take(&mut field)),
            '\n' | '\r' if !in_quotes => {
                if ch == '\r' && chars.peek() == Some(&'\n') {
                    chars.next();
                }
                row.push(take(&mut field));
                if row.len() == 1 && row[0].trim().is_empty() {
                    row.clear();
                } else {
                    rows.push(take(&mut row));
                }
            }
            _ => field.push(ch),
        }
    }

    row.push(field);
    if !(row.len() == 1 && row[0].trim().is_empty()) {
        rows.push(row);
    }
    rows
}

/// Parse a semicolon-delimited detection export.
///
/// Rows missing a date, time, species or confidence, or whose datetime or
/// confidence does not parse, are dropped.
pub fn parse_birddb(
    text: &str,
    labels: &HashMap<String, String>,
) -> Result<Vec<DetectionRecord>, ConvertError> {
    let mut rows = parse_rows(text, ';').into_iter();
    let header = rows
        .next()
        .ok_or_else(|| ConvertError::MissingHeader("BirdDB".to_string()))?;
    let columns: HashMap<String, usize> = header
        .iter()
        .enumerate()
        .map(|(i, name)| (name.trim().trim_start_matches('\u{feff}').to_string(), i))
        .collect();

    let field = |row: &[String], name: &str| -> String {
        columns
            .get(name)
            .and_then(|&i| row.get(i))
            .map(|v| v.trim().to_string())
            .unwrap_or_default()
    };

    let mut records = Vec::new();
    let mut skipped = 0usize;

    for row in rows {
        let date = field(&row, "Date");
        let time = field(&row, "Time");
        let sci_name = field(&row, "Sci_Name");
        let confidence = field(&row, "Confidence");

        if date.is_empty() || time.is_empty() || sci_name.is_empty() || confidence.is_empty() {
            skipped += 1;
            continue;
        }

        let Ok(datetime) =
            NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y-%m-%d %H:%M:%S")
        else {
            skipped += 1;
            continue;
        };
        let Ok(confidence) = confidence.parse::<f64>() else {
            skipped += 1;
            continue;
        };

        let com_name = labels.get(&sci_name).cloned().unwrap_or_default();
        records.push(DetectionRecord {
            datetime: Some(datetime.format("%Y-%m-%dT%H:%M:%S").to_string()),
            sci_name,
            com_name,
            confidence: Some(confidence),
            ..Default::default()
        });
    }

    if skipped > 0 {
        debug!("Skipped {} incomplete rows", skipped);
    }
    Ok(records)
}

fn read(path: &Path) -> Result<String, ConvertError> {
    fs::read_to_string(path).map_err(|source| ConvertError::Read {
        path: path.display().to_string(),
        source,
    })
}

/// Convert an export and a labels file into pretty-printed feed JSON.
pub fn convert_files(db_path: &Path, labels_path: &Path) -> Result<String, ConvertError> {
    let labels = parse_labels(&read(labels_path)?);
    let records = parse_birddb(&read(db_path)?, &labels).map_err(|e| match e {
        ConvertError::MissingHeader(_) => {
            ConvertError::MissingHeader(db_path.display().to_string())
        }
        other => other,
    })?;
    info!(
        "Converted {} detections from {}",
        records.len(),
        db_path.display()
    );
    Ok(serde_json::to_string_pretty(&records)?)
}
