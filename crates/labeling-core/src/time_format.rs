//! Time-format autodetection and conversion to epoch seconds (spec §4.4).
//! Grounded on `parsing.py`'s `pd.to_datetime(x)` / `pd.to_datetime(x, format='mixed')`
//! fallback chain: try a strict format first, then a loose/mixed parse.
//! Rust has no single `pandas`-equivalent "mixed format" parser, so the
//! ordered candidate-pattern list below stands in for pandas' internal
//! format inference, with `chrono`'s own flexible parsers as the final
//! fallback (marked `"auto"` rather than a literal strftime pattern).

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TimeFormatError {
    #[error("no non-empty time samples to detect a format from")]
    NoSamples,

    #[error("value `{0}` does not match time format `{1}`")]
    ParseFailed(String, String),

    #[error("value `{0}` could not be parsed by any known time format")]
    AutoParseFailed(String),
}

const MAX_SAMPLES: usize = 10;

/// A candidate strftime pattern plus the regex that gates whether it's
/// even worth attempting (cheap reject before the formal `chrono` parse).
struct Candidate {
    regex: &'static str,
    pattern: &'static str,
}

/// Ordered most-specific to least-specific, per spec §4.4.
const CANDIDATES: &[Candidate] = &[
    Candidate {
        regex: r"^\d{4}-\d{2}-\d{2}[ T]\d{2}:\d{2}:\d{2}\.\d+$",
        pattern: "%Y-%m-%d %H:%M:%S%.f",
    },
    Candidate {
        regex: r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}$",
        pattern: "%Y-%m-%d %H:%M:%S",
    },
    Candidate {
        regex: r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}\.\d+$",
        pattern: "%Y-%m-%dT%H:%M:%S%.f",
    },
    Candidate {
        regex: r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}$",
        pattern: "%Y-%m-%dT%H:%M:%S",
    },
    Candidate {
        regex: r"^\d{4}-\d{2}-\d{2}$",
        pattern: "%Y-%m-%d",
    },
    Candidate {
        regex: r"^\d{2}:\d{2}:\d{2}\.\d+$",
        pattern: "%H:%M:%S%.f",
    },
    Candidate {
        regex: r"^\d{2}:\d{2}:\d{2}$",
        pattern: "%H:%M:%S",
    },
];

fn compiled(pattern_regex: &'static str) -> Regex {
    static CACHE: OnceLock<std::sync::Mutex<std::collections::HashMap<&'static str, Regex>>> =
        OnceLock::new();
    let cache = CACHE.get_or_init(|| std::sync::Mutex::new(std::collections::HashMap::new()));
    let mut guard = cache.lock().expect("time format regex cache poisoned");
    if !guard.contains_key(pattern_regex) {
        guard.insert(pattern_regex, Regex::new(pattern_regex).expect("static regex is valid"));
    }
    guard.get(pattern_regex).unwrap().clone()
}

/// Either a concrete strftime pattern or the `"auto"` fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectedFormat {
    Pattern(String),
    Auto,
}

impl DetectedFormat {
    pub fn as_str(&self) -> &str {
        match self {
            DetectedFormat::Pattern(p) => p,
            DetectedFormat::Auto => "auto",
        }
    }
}

/// Infers a format from up to the first 10 non-empty samples. Each
/// candidate must match every sample's structure and successfully parse
/// every sample; the first such candidate wins.
pub fn detect_time_format(samples: &[&str]) -> Result<DetectedFormat, TimeFormatError> {
    let sampled: Vec<&str> = samples
        .iter()
        .filter(|s| !s.trim().is_empty())
        .take(MAX_SAMPLES)
        .copied()
        .collect();

    if sampled.is_empty() {
        return Err(TimeFormatError::NoSamples);
    }

    for candidate in CANDIDATES {
        let re = compiled(candidate.regex);
        if sampled.iter().all(|s| re.is_match(s.trim())) {
            if sampled
                .iter()
                .all(|s| parse_with_pattern(s.trim(), candidate.pattern).is_ok())
            {
                return Ok(DetectedFormat::Pattern(candidate.pattern.to_string()));
            }
        }
    }

    for s in &sampled {
        if parse_loose(s.trim()).is_err() {
            return Err(TimeFormatError::AutoParseFailed(s.to_string()));
        }
    }
    Ok(DetectedFormat::Auto)
}

fn parse_with_pattern(value: &str, pattern: &str) -> Result<f64, TimeFormatError> {
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, pattern) {
        return Ok(dt.and_utc().timestamp() as f64 + dt.and_utc().timestamp_subsec_nanos() as f64 / 1e9);
    }
    if let Ok(d) = NaiveDate::parse_from_str(value, pattern) {
        let dt = d
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| TimeFormatError::ParseFailed(value.to_string(), pattern.to_string()))?;
        return Ok(dt.and_utc().timestamp() as f64);
    }
    if let Ok(t) = NaiveTime::parse_from_str(value, pattern) {
        let epoch_date = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        let dt = epoch_date.and_time(t);
        return Ok(dt.and_utc().timestamp() as f64 + t.nanosecond() as f64 / 1e9);
    }
    Err(TimeFormatError::ParseFailed(value.to_string(), pattern.to_string()))
}

fn parse_loose(value: &str) -> Result<f64, TimeFormatError> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(value) {
        return Ok(dt.timestamp() as f64 + dt.timestamp_subsec_nanos() as f64 / 1e9);
    }
    if let Ok(dt) = chrono::DateTime::parse_from_rfc2822(value) {
        return Ok(dt.timestamp() as f64);
    }
    const WIDENED: &[&str] = &[
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y/%m/%d %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%Y-%m-%d",
        "%Y/%m/%d",
        "%m/%d/%Y",
        "%d-%m-%Y",
        // Alphabetic-month, am/pm samples (pandas `format='mixed'`'s
        // equivalent to what these widened patterns stand in for).
        "%b %d, %Y %I:%M%P",
        "%b %d, %Y %I:%M %P",
        "%B %d, %Y %I:%M%P",
        "%B %d, %Y %I:%M %P",
        "%b %d, %Y %I:%M%p",
        "%b %d, %Y %I:%M %p",
        "%B %d, %Y %I:%M%p",
        "%B %d, %Y %I:%M %p",
        "%b %d, %Y %H:%M:%S",
        "%B %d, %Y %H:%M:%S",
    ];
    for pattern in WIDENED {
        if let Ok(v) = parse_with_pattern(value, pattern) {
            return Ok(v);
        }
    }
    Err(TimeFormatError::AutoParseFailed(value.to_string()))
}

/// Converts a single value to epoch seconds under the given (previously
/// detected or user-supplied) format.
pub fn to_epoch_seconds(value: &str, format: &DetectedFormat) -> Result<f64, TimeFormatError> {
    let value = value.trim();
    match format {
        DetectedFormat::Pattern(pattern) => parse_with_pattern(value, pattern),
        DetectedFormat::Auto => parse_loose(value),
    }
}

/// Converts a whole column; mirrors pandas' vectorised `to_datetime` path
/// for the `auto` case.
pub fn convert_column(values: &[String], format: &DetectedFormat) -> Result<Vec<f64>, TimeFormatError> {
    values.iter().map(|v| to_epoch_seconds(v, format)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_date_time_with_fractional_seconds() {
        let samples = ["2024-01-01 10:00:00.123", "2024-01-01 10:00:01.456"];
        let fmt = detect_time_format(&samples).unwrap();
        assert_eq!(fmt, DetectedFormat::Pattern("%Y-%m-%d %H:%M:%S%.f".to_string()));
    }

    #[test]
    fn detects_plain_date_time() {
        let samples = ["2024-01-01 10:00:00", "2024-01-01 10:00:01"];
        let fmt = detect_time_format(&samples).unwrap();
        assert_eq!(fmt, DetectedFormat::Pattern("%Y-%m-%d %H:%M:%S".to_string()));
    }

    #[test]
    fn detects_iso_t_variant() {
        let samples = ["2024-01-01T10:00:00", "2024-01-01T10:00:01"];
        let fmt = detect_time_format(&samples).unwrap();
        assert_eq!(fmt, DetectedFormat::Pattern("%Y-%m-%dT%H:%M:%S".to_string()));
    }

    #[test]
    fn detects_date_only() {
        let samples = ["2024-01-01", "2024-01-02"];
        let fmt = detect_time_format(&samples).unwrap();
        assert_eq!(fmt, DetectedFormat::Pattern("%Y-%m-%d".to_string()));
    }

    #[test]
    fn falls_back_to_auto_for_mixed_samples() {
        let samples = ["Jan 1, 2024 10:00am", "Jan 2, 2024 11:00am"];
        let fmt = detect_time_format(&samples).unwrap();
        assert_eq!(fmt, DetectedFormat::Auto);
    }

    #[test]
    fn round_trips_within_fractional_precision() {
        let fmt = DetectedFormat::Pattern("%Y-%m-%d %H:%M:%S".to_string());
        let ts = to_epoch_seconds("2024-01-01 00:00:00", &fmt).unwrap();
        assert_eq!(ts, 1704067200.0);
    }

    #[test]
    fn empty_samples_error() {
        let samples: [&str; 2] = ["", "   "];
        assert!(matches!(detect_time_format(&samples), Err(TimeFormatError::NoSamples)));
    }
}
