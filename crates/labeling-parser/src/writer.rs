//! Binary/overview writer: decides the on-disk representation by row
//! count and always keeps a small overview JSON around for the initial
//! page load.

use crate::error::Result;
use crate::ParsedSeries;
use labeling_core::mmap_reader::{BinaryMeta, ChannelMeta, XColumnMeta};
use labeling_core::resampler::Resampler;
use labeling_types::XType;
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct WriteOutcome {
    pub json_path: Option<String>,
    pub binary_path: Option<String>,
    pub meta_path: Option<String>,
    pub overview_path: String,
    pub use_binary_format: bool,
    pub total_points: u64,
    pub x_type: XType,
    pub x_format: Option<String>,
    pub x_min: f64,
    pub x_max: f64,
}

#[derive(Serialize)]
struct JsonChannel<'a> {
    x: bool,
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit: &'a Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    color: &'a Option<String>,
    data: &'a [f64],
}

#[derive(Serialize)]
struct OverviewMeta<'a> {
    x_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    x_format: &'a Option<String>,
    x_min: f64,
    x_max: f64,
    total_points: usize,
    overview_points: usize,
}

#[derive(Serialize)]
struct OverviewFile<'a> {
    meta: OverviewMeta<'a>,
    data: Vec<JsonChannel<'a>>,
}

/// Writes `{stem}.bin`/`{stem}_meta.json` (when the series is large
/// enough), `{stem}_overview.json` (always), and `{stem}.json` (always,
/// for backward compatibility) next to `stem`.
pub fn write_outputs(
    stem: &Path,
    series: &ParsedSeries,
    binary_format_threshold: usize,
    overview_target_points: usize,
) -> Result<WriteOutcome> {
    let x = &series.x().data;
    let n = x.len();
    let x_min = x.first().copied().unwrap_or(0.0);
    let x_max = x.last().copied().unwrap_or(0.0);
    let x_type = if series.x_is_time {
        XType::Datetime
    } else {
        XType::Numeric
    };

    let use_binary = n >= binary_format_threshold;

    let (binary_path, meta_path) = if use_binary {
        let binary_path = dotted(stem, "bin");
        let meta_path = underscored(stem, "meta.json");
        write_binary(&binary_path, series)?;
        write_binary_meta(&meta_path, series, x_type)?;
        (
            Some(path_to_string(&binary_path)),
            Some(path_to_string(&meta_path)),
        )
    } else {
        (None, None)
    };

    let json_path = dotted(stem, "json");
    write_full_json(&json_path, series)?;

    let overview_path = underscored(stem, "overview.json");
    write_overview(&overview_path, series, overview_target_points, x_type)?;

    Ok(WriteOutcome {
        json_path: Some(path_to_string(&json_path)),
        binary_path,
        meta_path,
        overview_path: path_to_string(&overview_path),
        use_binary_format: use_binary,
        total_points: n as u64,
        x_type,
        x_format: series.x_format.clone(),
        x_min,
        x_max,
    })
}

/// `{stem}.ext`
fn dotted(stem: &Path, ext: &str) -> std::path::PathBuf {
    let mut s = stem.as_os_str().to_os_string();
    s.push(".");
    s.push(ext);
    std::path::PathBuf::from(s)
}

/// `{stem}_suffix`, e.g. `{stem}_meta.json`, `{stem}_overview.json`.
fn underscored(stem: &Path, suffix: &str) -> std::path::PathBuf {
    let mut s = stem.as_os_str().to_os_string();
    s.push("_");
    s.push(suffix);
    std::path::PathBuf::from(s)
}

fn path_to_string(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}

fn write_file(path: &Path, bytes: Vec<u8>) -> Result<()> {
    fs::write(path, bytes).map_err(|e| crate::ParseError::Io {
        path: path_to_string(path),
        source: e,
    })
}

fn write_binary(path: &Path, series: &ParsedSeries) -> Result<()> {
    let mut file = fs::File::create(path).map_err(|e| crate::ParseError::Io {
        path: path_to_string(path),
        source: e,
    })?;
    let n = series.len();
    let x = &series.x().data;
    let channels = series.channels();

    let mut buf = Vec::with_capacity(n * (1 + channels.len()) * 8);
    for row in 0..n {
        buf.extend_from_slice(&x[row].to_le_bytes());
        for ch in channels {
            buf.extend_from_slice(&ch.data[row].to_le_bytes());
        }
    }
    file.write_all(&buf).map_err(|e| crate::ParseError::Io {
        path: path_to_string(path),
        source: e,
    })?;
    Ok(())
}

fn write_binary_meta(path: &Path, series: &ParsedSeries, x_type: XType) -> Result<()> {
    let x = series.x();
    let meta = BinaryMeta {
        total_points: series.len(),
        shape: [series.len(), 1 + series.channels().len()],
        dtype: "float64".to_string(),
        x_column: XColumnMeta {
            name: x.name.clone(),
            unit: x.unit.clone(),
            x_type: xtype_str(x_type).to_string(),
            column: 0,
            min: x.data.first().copied().unwrap_or(0.0),
            max: x.data.last().copied().unwrap_or(0.0),
            format: series.x_format.clone(),
            timezone: None,
        },
        channels: series
            .channels()
            .iter()
            .enumerate()
            .map(|(i, ch)| ChannelMeta {
                name: ch.name.clone(),
                unit: ch.unit.clone(),
                color: ch.color.clone(),
                column: i + 1,
            })
            .collect(),
        version: 2,
    };
    write_file(path, serde_json::to_vec_pretty(&meta)?)
}

fn write_full_json(path: &Path, series: &ParsedSeries) -> Result<()> {
    let channels: Vec<JsonChannel> = series
        .columns
        .iter()
        .map(|c| JsonChannel {
            x: c.is_x,
            name: &c.name,
            unit: &c.unit,
            color: &c.color,
            data: &c.data,
        })
        .collect();
    write_file(path, serde_json::to_vec(&channels)?)
}

fn write_overview(
    path: &Path,
    series: &ParsedSeries,
    target_points: usize,
    x_type: XType,
) -> Result<()> {
    let resampler = Resampler::new(target_points);
    let x = &series.x().data;
    let no_color: Option<String> = None;
    let channel_data: Vec<Vec<f64>> = series.channels().iter().map(|c| c.data.clone()).collect();

    let (x_out, channels_out, _is_full) = resampler
        .resample(x, &channel_data)
        .map_err(|e| crate::ParseError::WriteFailed(format!("overview resample: {e}")))?;

    let mut data = Vec::with_capacity(1 + series.channels().len());
    data.push(JsonChannel {
        x: true,
        name: &series.x().name,
        unit: &series.x().unit,
        color: &no_color,
        data: &x_out,
    });

    let overview = OverviewFile {
        meta: OverviewMeta {
            x_type: xtype_str(x_type),
            x_format: &series.x_format,
            x_min: x.first().copied().unwrap_or(0.0),
            x_max: x.last().copied().unwrap_or(0.0),
            total_points: series.len(),
            overview_points: x_out.len(),
        },
        data: {
            let mut owned_channels: Vec<JsonChannel> = Vec::new();
            for (spec, values) in series.channels().iter().zip(channels_out.iter()) {
                owned_channels.push(JsonChannel {
                    x: false,
                    name: &spec.name,
                    unit: &spec.unit,
                    color: &spec.color,
                    data: values,
                });
            }
            let mut all = data;
            all.append(&mut owned_channels);
            all
        },
    };

    write_file(path, serde_json::to_vec(&overview)?)
}

fn xtype_str(x_type: XType) -> &'static str {
    match x_type {
        XType::Numeric => "numeric",
        XType::Datetime => "timestamp",
    }
}
