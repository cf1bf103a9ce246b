use std::collections::HashSet;
use calamine::Data;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

use super::types::ColumnKind;

const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%m-%Y"];

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
];

// Cheap shape check before handing a string to chrono.
static DATE_SHAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{4}[-/]\d{1,2}[-/]\d{1,2}|\d{1,2}[-/]\d{1,2}[-/]\d{4})([ T]\d{1,2}:\d{2}(:\d{2}(\.\d+)?)?)?$")
        .expect("date shape pattern is valid")
});

/// Days between the Excel 1900 epoch (as used by serial dates) and 1970-01-01.
const EXCEL_UNIX_EPOCH_DAYS: f64 = 25569.0;
const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Trim, lowercase and replace spaces with underscores.
pub fn normalize_column_name(name: &str) -> String {
    name.trim().to_lowercase().replace(' ', "_")
}

/// Normalize a header row, suffixing names that collapse onto an earlier one.
pub fn normalize_headers<'a, I>(headers: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut existing_names = HashSet::new();
    headers
        .into_iter()
        .map(|raw| unique_name(normalize_column_name(raw), &mut existing_names))
        .collect()
}

/// Returns `name`, or `name_1`, `name_2`, ... if it is already taken.
pub fn unique_name(name: String, existing_names: &mut HashSet<String>) -> String {
    let mut cleaned = name.clone();
    let mut counter = 1;
    while !existing_names.insert(cleaned.clone()) {
        cleaned = format!("{}_{}", name, counter);
        counter += 1;
    }
    cleaned
}

pub fn is_date_string(s: &str) -> bool {
    parse_date_millis(s).is_some()
}

/// Parses a date or datetime string into milliseconds since the Unix epoch.
pub fn parse_date_millis(s: &str) -> Option<i64> {
    let s = s.trim();
    if !DATE_SHAPE.is_match(s) {
        return None;
    }

    for format in DATETIME_FORMATS.iter() {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    for format in DATE_FORMATS.iter() {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc().timestamp_millis());
        }
    }
    None
}

/// Renders epoch milliseconds as `%Y-%m-%d`, or with the time of day when it
/// is not midnight.
pub fn millis_to_date_text(millis: i64) -> Option<String> {
    let dt = DateTime::from_timestamp_millis(millis)?.naive_utc();
    if dt.time() == NaiveTime::MIN {
        Some(dt.format("%Y-%m-%d").to_string())
    } else {
        Some(dt.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

pub fn excel_serial_to_millis(serial: f64) -> i64 {
    ((serial - EXCEL_UNIX_EPOCH_DAYS) * MILLIS_PER_DAY).round() as i64
}

/// Interprets a cell as a point in time, if it holds one.
pub fn cell_to_millis(cell: &Data) -> Option<i64> {
    match cell {
        Data::DateTime(d) => Some(excel_serial_to_millis(d.as_f64())),
        Data::DateTimeIso(s) | Data::String(s) => parse_date_millis(s),
        _ => None,
    }
}

pub fn cell_to_f64(cell: &Data) -> Option<f64> {
    match cell {
        Data::Float(f) => Some(*f),
        Data::Int(i) => Some(*i as f64),
        _ => None,
    }
}

/// Turns a raw CSV field into the closest typed cell.
pub fn guess_cell(raw: &str) -> Data {
    let s = raw.trim();
    if s.is_empty() {
        return Data::Empty;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Data::Int(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return Data::Float(f);
    }
    match s.to_ascii_lowercase().as_str() {
        "true" => Data::Bool(true),
        "false" => Data::Bool(false),
        _ => Data::String(s.to_string()),
    }
}

/// A column only gets a non-string kind when every non-empty cell agrees.
pub fn detect_column_type(values: &[Data]) -> ColumnKind {
    let mut int_count = 0;
    let mut float_count = 0;
    let mut date_count = 0;
    let mut bool_count = 0;
    let mut total_count = 0;

    for value in values.iter().filter(|v| !matches!(v, Data::Empty)) {
        total_count += 1;
        match value {
            Data::Int(_) => int_count += 1,
            Data::Float(_) => float_count += 1,
            Data::DateTime(_) => date_count += 1,
            Data::DateTimeIso(s) | Data::String(s) if is_date_string(s) => date_count += 1,
            Data::Bool(_) => bool_count += 1,
            _ => {}
        }
    }

    match () {
        _ if total_count == 0 => ColumnKind::Text,
        _ if int_count == total_count => ColumnKind::Integer,
        _ if int_count + float_count == total_count => ColumnKind::Float,
        _ if date_count == total_count => ColumnKind::Date,
        _ if bool_count == total_count => ColumnKind::Boolean,
        _ => ColumnKind::Text,
    }
}
