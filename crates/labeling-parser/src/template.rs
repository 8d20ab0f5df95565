use serde::{Deserialize, Serialize};

/// File types the parser accepts, matching the template's `fileType` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Csv,
    Xls,
    Xlsx,
}

impl FileType {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "csv" => Some(FileType::Csv),
            "xls" => Some(FileType::Xls),
            "xlsx" => Some(FileType::Xlsx),
            _ => None,
        }
    }
}

/// A column locator: either `col:N` (zero-based index) or a regex matched
/// against header names. Shared by the x spec and every channel spec, per
/// the template's overloaded `regex|col:N` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XSpec {
    #[serde(default)]
    pub locator: Option<String>,
    #[serde(default)]
    pub use_index: bool,
    pub is_time: bool,
    pub name: String,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelSpec {
    pub channel_name: String,
    pub locator: String,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParseTemplate {
    pub file_type: FileType,
    #[serde(default)]
    pub sheet_name: Option<String>,
    pub head_row: usize,
    #[serde(default)]
    pub skip_row: usize,
    pub x: XSpec,
    pub channels: Vec<ChannelSpec>,
}
