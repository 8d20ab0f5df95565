//! Template-driven parsing of raw CSV/XLS/XLSX uploads and the
//! binary/overview writer that turns a parsed series into on-disk
//! artifacts. Column selection is explicit row/column resolution over
//! `calamine`/`csv` output rather than a dataframe library.

pub mod error;
pub mod reader;
pub mod template;
pub mod writer;

pub use error::{ParseError, Result};
pub use template::{ChannelSpec, FileType, ParseTemplate, XSpec};
pub use writer::{write_outputs, WriteOutcome};

use labeling_core::time_format;
use regex::Regex;
use std::path::Path;

/// One resolved series in the parser's output, in template order: the x
/// column first, then each requested channel that actually resolved.
#[derive(Debug, Clone)]
pub struct ParsedColumn {
    pub is_x: bool,
    pub name: String,
    pub unit: Option<String>,
    pub color: Option<String>,
    pub data: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct ParsedSeries {
    pub columns: Vec<ParsedColumn>,
    pub x_is_time: bool,
    pub x_format: Option<String>,
}

impl ParsedSeries {
    pub fn x(&self) -> &ParsedColumn {
        &self.columns[0]
    }

    pub fn channels(&self) -> &[ParsedColumn] {
        &self.columns[1..]
    }

    pub fn len(&self) -> usize {
        self.columns.first().map(|c| c.data.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn parse_file(template: &ParseTemplate, path: &Path) -> Result<ParsedSeries> {
    let raw = reader::read_raw_rows(path, template.file_type, template.sheet_name.as_deref())?;
    if raw.len() <= template.head_row {
        return Err(ParseError::EmptyFile);
    }

    let headers = &raw[template.head_row];
    let data_start = template.head_row + 1 + template.skip_row;
    if data_start >= raw.len() {
        return Err(ParseError::EmptyFile);
    }
    let data_rows = &raw[data_start..];
    let n = data_rows.len();

    let (x_values, x_format) = resolve_x(&template.x, headers, data_rows)?;

    let mut columns = Vec::with_capacity(1 + template.channels.len());
    columns.push(ParsedColumn {
        is_x: true,
        name: template.x.name.clone(),
        unit: template.x.unit.clone(),
        color: None,
        data: x_values,
    });

    for channel in &template.channels {
        if let Some(col) = resolve_channel(channel, headers, data_rows, n)? {
            columns.push(col);
        }
    }

    Ok(ParsedSeries {
        columns,
        x_is_time: template.x.is_time,
        x_format,
    })
}

fn resolve_column_index(locator: &str, headers: &[String]) -> Result<usize> {
    if let Some(rest) = locator.strip_prefix("col:") {
        return rest
            .parse::<usize>()
            .map_err(|_| ParseError::InvalidLocator(locator.to_string()));
    }
    let re = Regex::new(locator).map_err(|_| ParseError::InvalidLocator(locator.to_string()))?;
    headers
        .iter()
        .position(|h| re.is_match(h))
        .ok_or_else(|| ParseError::InvalidLocator(locator.to_string()))
}

fn resolve_x(
    spec: &XSpec,
    headers: &[String],
    data_rows: &[Vec<String>],
) -> Result<(Vec<f64>, Option<String>)> {
    if spec.use_index {
        let values: Vec<f64> = (0..data_rows.len()).map(|i| i as f64).collect();
        return Ok((values, None));
    }

    let locator = spec
        .locator
        .as_deref()
        .ok_or_else(|| ParseError::InvalidLocator("<missing x locator>".to_string()))?;
    let idx = resolve_column_index(locator, headers)?;

    let strings: Vec<String> = data_rows
        .iter()
        .map(|row| row.get(idx).cloned().unwrap_or_default())
        .collect();

    if !spec.is_time {
        let mut values = Vec::with_capacity(strings.len());
        for s in &strings {
            match s.trim().parse::<f64>() {
                Ok(v) => values.push(v),
                Err(_) => return Err(ParseError::NonNumericX),
            }
        }
        return Ok((values, None));
    }

    let sample: Vec<&str> = strings.iter().map(|s| s.as_str()).take(10).collect();
    let format = time_format::detect_time_format(&sample).map_err(|e| {
        ParseError::TimeParseFailure(sample.first().unwrap_or(&"").to_string(), e.to_string())
    })?;

    let values: Result<Vec<f64>> = strings
        .iter()
        .map(|s| {
            time_format::to_epoch_seconds(s, &format)
                .map_err(|e| ParseError::TimeParseFailure(s.clone(), e.to_string()))
        })
        .collect();

    Ok((values?, Some(format.as_str().to_string())))
}

fn resolve_channel(
    spec: &ChannelSpec,
    headers: &[String],
    data_rows: &[Vec<String>],
    expected_len: usize,
) -> Result<Option<ParsedColumn>> {
    let idx = match resolve_column_index(&spec.locator, headers) {
        Ok(idx) => idx,
        Err(_) if !spec.mandatory => return Ok(None),
        Err(_) => return Err(ParseError::ChannelMissing(spec.channel_name.clone())),
    };

    let mut data = Vec::with_capacity(expected_len);
    for row in data_rows {
        let raw = row.get(idx).cloned().unwrap_or_default();
        let value = raw.trim().parse::<f64>().unwrap_or(f64::NAN);
        data.push(value);
    }

    Ok(Some(ParsedColumn {
        is_x: false,
        name: spec.channel_name.clone(),
        unit: spec.unit.clone(),
        color: spec.color.clone(),
        data,
    }))
}
