//! Memory-mapped reads over a parsed file's `.bin` sidecar: row-major
//! `f64` layout, one row per sample `[x, ch1, ch2, ...]`, binary search
//! on the x column to resolve a viewport range without loading the
//! whole file.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use anyhow::{anyhow, Context, Result};
use memmap2::Mmap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XColumnMeta {
    pub name: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(rename = "type")]
    pub x_type: String,
    pub column: usize,
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelMeta {
    pub name: String,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    pub column: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryMeta {
    pub total_points: usize,
    /// `[rows, cols]`, row-major: `cols == 1 + channels.len()`.
    pub shape: [usize; 2],
    #[serde(default = "default_dtype")]
    pub dtype: String,
    pub x_column: XColumnMeta,
    pub channels: Vec<ChannelMeta>,
    #[serde(default = "default_version")]
    pub version: u32,
}

fn default_dtype() -> String {
    "float64".to_string()
}

fn default_version() -> u32 {
    2
}

pub struct MmapReader {
    pub meta: BinaryMeta,
    mmap: Mmap,
}

impl MmapReader {
    pub fn open(binary_path: &Path, meta_path: &Path) -> Result<Self> {
        let meta_raw = fs::read_to_string(meta_path)
            .with_context(|| format!("reading meta file {}", meta_path.display()))?;
        let meta: BinaryMeta = serde_json::from_str(&meta_raw)
            .with_context(|| format!("parsing meta file {}", meta_path.display()))?;

        let file = fs::File::open(binary_path)
            .with_context(|| format!("opening binary file {}", binary_path.display()))?;
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("memory-mapping {}", binary_path.display()))?;

        let expected_bytes = meta.shape[0] * meta.shape[1] * std::mem::size_of::<f64>();
        if mmap.len() < expected_bytes {
            return Err(anyhow!(
                "binary file {} is shorter than its metadata implies ({} < {})",
                binary_path.display(),
                mmap.len(),
                expected_bytes
            ));
        }

        Ok(Self { meta, mmap })
    }

    pub fn num_columns(&self) -> usize {
        self.meta.shape[1]
    }

    pub fn total_points(&self) -> usize {
        self.meta.shape[0]
    }

    fn row(&self, index: usize) -> &[f64] {
        let cols = self.num_columns();
        let floats: &[f64] = bytemuck_cast(&self.mmap);
        &floats[index * cols..(index + 1) * cols]
    }

    fn x_value(&self, index: usize) -> f64 {
        self.row(index)[0]
    }

    /// Binary search for `[x_min, x_max]`, matching `np.searchsorted`
    /// with `side='left'`/`side='right'` on the x column.
    pub fn range_indices(&self, x_min: f64, x_max: f64) -> (usize, usize) {
        let n = self.total_points();
        let start = (0..n).partition_point(|&i| self.x_value(i) < x_min);
        let end = (0..n).partition_point(|&i| self.x_value(i) <= x_max);
        (start, end.max(start).min(n))
    }

    /// Reads rows `[start, end)`, returning x values and per-channel
    /// value vectors (column order preserved from the metadata).
    pub fn read_slice(&self, start: usize, end: usize) -> (Vec<f64>, Vec<Vec<f64>>) {
        let cols = self.num_columns();
        let n_channels = cols.saturating_sub(1);
        let mut x_out = Vec::with_capacity(end.saturating_sub(start));
        let mut channels_out: Vec<Vec<f64>> = vec![Vec::with_capacity(end.saturating_sub(start)); n_channels];

        for i in start..end {
            let row = self.row(i);
            x_out.push(row[0]);
            for (c, slot) in channels_out.iter_mut().enumerate() {
                slot.push(row[1 + c]);
            }
        }

        (x_out, channels_out)
    }

    pub fn read_range(&self, x_min: f64, x_max: f64) -> (Vec<f64>, Vec<Vec<f64>>, usize) {
        let (start, end) = self.range_indices(x_min, x_max);
        let (x, channels) = self.read_slice(start, end);
        (x, channels, end - start)
    }

    pub fn read_all(&self) -> (Vec<f64>, Vec<Vec<f64>>) {
        self.read_slice(0, self.total_points())
    }
}

fn bytemuck_cast(bytes: &[u8]) -> &[f64] {
    debug_assert_eq!(bytes.len() % std::mem::size_of::<f64>(), 0);
    let ptr = bytes.as_ptr() as *const f64;
    unsafe { std::slice::from_raw_parts(ptr, bytes.len() / std::mem::size_of::<f64>()) }
}

type ReaderCache = Mutex<HashMap<PathBuf, Arc<MmapReader>>>;

fn cache() -> &'static ReaderCache {
    static CACHE: OnceLock<ReaderCache> = OnceLock::new();
    CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Returns a cached reader for `binary_path`, opening and mapping the
/// file on first access. Mirrors `get_data_reader`'s `_reader_cache`.
pub fn get_reader(binary_path: &Path, meta_path: &Path) -> Result<Arc<MmapReader>> {
    let mut guard = cache().lock().expect("mmap reader cache poisoned");
    if let Some(existing) = guard.get(binary_path) {
        return Ok(existing.clone());
    }

    let reader = Arc::new(MmapReader::open(binary_path, meta_path)?);
    guard.insert(binary_path.to_path_buf(), reader.clone());
    Ok(reader)
}

/// Drops every cached reader, releasing its memory map. Mirrors
/// `clear_reader_cache`; mainly useful after a file has been reparsed.
pub fn clear_reader_cache() {
    cache().lock().expect("mmap reader cache poisoned").clear();
}

pub fn evict_reader(binary_path: &Path) {
    cache().lock().expect("mmap reader cache poisoned").remove(binary_path);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_fixture(dir: &Path, rows: &[[f64; 3]]) -> (PathBuf, PathBuf) {
        let bin_path = dir.join("fixture.bin");
        let meta_path = dir.join("fixture_meta.json");

        let mut file = fs::File::create(&bin_path).unwrap();
        for row in rows {
            for v in row {
                file.write_all(&v.to_le_bytes()).unwrap();
            }
        }

        let meta = BinaryMeta {
            total_points: rows.len(),
            shape: [rows.len(), 3],
            dtype: "float64".to_string(),
            x_column: XColumnMeta {
                name: "x".to_string(),
                unit: None,
                x_type: "numeric".to_string(),
                column: 0,
                min: rows.first().map(|r| r[0]).unwrap_or(0.0),
                max: rows.last().map(|r| r[0]).unwrap_or(0.0),
                format: None,
                timezone: None,
            },
            channels: vec![
                ChannelMeta { name: "a".into(), unit: None, color: None, column: 1 },
                ChannelMeta { name: "b".into(), unit: None, color: None, column: 2 },
            ],
            version: 2,
        };
        fs::write(&meta_path, serde_json::to_vec(&meta).unwrap()).unwrap();

        (bin_path, meta_path)
    }

    #[test]
    fn reads_full_range() {
        let dir = tempfile::tempdir().unwrap();
        let rows: Vec<[f64; 3]> = (0..100).map(|i| [i as f64, i as f64 * 2.0, -(i as f64)]).collect();
        let (bin, meta) = write_fixture(dir.path(), &rows);

        let reader = MmapReader::open(&bin, &meta).unwrap();
        let (x, channels) = reader.read_all();
        assert_eq!(x.len(), 100);
        assert_eq!(channels.len(), 2);
        assert_eq!(x[50], 50.0);
        assert_eq!(channels[0][50], 100.0);
    }

    #[test]
    fn range_indices_matches_left_right_searchsorted() {
        let dir = tempfile::tempdir().unwrap();
        let rows: Vec<[f64; 3]> = (0..10).map(|i| [i as f64, 0.0, 0.0]).collect();
        let (bin, meta) = write_fixture(dir.path(), &rows);

        let reader = MmapReader::open(&bin, &meta).unwrap();
        let (start, end) = reader.range_indices(3.0, 6.0);
        assert_eq!((start, end), (3, 7));
    }

    #[test]
    fn cache_returns_same_instance() {
        let dir = tempfile::tempdir().unwrap();
        let rows: Vec<[f64; 3]> = (0..5).map(|i| [i as f64, 0.0, 0.0]).collect();
        let (bin, meta) = write_fixture(dir.path(), &rows);

        let a = get_reader(&bin, &meta).unwrap();
        let b = get_reader(&bin, &meta).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        evict_reader(&bin);
    }
}
