//! Loads a file's full-resolution series into memory for the agent runner
//! (C11), which needs every sample at once rather than a viewport slice.
//! Binary-format files go through the shared mmap reader cache; smaller
//! files fall back to the plain parsed JSON array.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use labeling_core::get_reader;
use labeling_tools::ChannelSeries;
use labeling_types::FileRecord;

#[derive(Deserialize)]
struct StoredChannel {
    x: bool,
    name: String,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    color: Option<String>,
    data: Vec<f64>,
}

pub async fn load_full_series(record: &FileRecord) -> Result<(Vec<f64>, Vec<ChannelSeries>)> {
    if record.use_binary_format {
        let binary_path = record
            .binary_path
            .as_deref()
            .context("file has no binary artifact")?;
        let meta_path = record
            .meta_path
            .as_deref()
            .context("file has no binary metadata")?;

        let reader = get_reader(Path::new(binary_path), Path::new(meta_path))?;
        let (x, channel_data) = reader.read_all();
        let channels = reader
            .meta
            .channels
            .iter()
            .zip(channel_data)
            .map(|(meta, data)| ChannelSeries {
                name: meta.name.clone(),
                unit: meta.unit.clone(),
                color: meta.color.clone(),
                data,
            })
            .collect();
        Ok((x, channels))
    } else {
        let json_path = record
            .json_path
            .as_deref()
            .context("file has no parsed json")?;
        let raw = tokio::fs::read(json_path)
            .await
            .with_context(|| format!("reading {json_path}"))?;
        let stored: Vec<StoredChannel> = serde_json::from_slice(&raw)?;
        let x_col = stored
            .iter()
            .find(|c| c.x)
            .context("parsed json has no x column")?;
        let channels = stored
            .iter()
            .filter(|c| !c.x)
            .map(|c| ChannelSeries {
                name: c.name.clone(),
                unit: c.unit.clone(),
                color: c.color.clone(),
                data: c.data.clone(),
            })
            .collect();
        Ok((x_col.data.clone(), channels))
    }
}
