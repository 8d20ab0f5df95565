//! Core domain DTOs from the Data Model: a parsed file's on-disk record,
//! the events an agent detects inside it, and the plan items the planner
//! hands out to the identifier/validator agents.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsingStatus {
    Uploading,
    Queued,
    Parsing,
    Parsed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum XType {
    Numeric,
    Datetime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub id: String,
    pub raw_path: String,
    pub json_path: Option<String>,
    pub binary_path: Option<String>,
    pub meta_path: Option<String>,
    pub overview_path: Option<String>,
    pub use_binary_format: bool,
    pub total_points: u64,
    pub x_type: XType,
    pub x_format: Option<String>,
    pub x_min: f64,
    pub x_max: f64,
    pub parsing: ParsingStatus,
    /// Populated once `parsing == Error`; the worker's failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsing_error: Option<String>,
    pub label: Option<String>,
    /// Set by C12 event persistence whenever a run writes detected events
    /// back onto the file's label record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<i64>,
}

/// An event detected (or proposed) by an agent, before it is reconciled
/// into the file's persisted event list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DetectedEvent {
    pub event_name: String,
    pub start_index: u64,
    pub end_index: u64,
    pub visual_pattern: String,
    pub need_verification: bool,
    pub verification_result: Option<VerificationResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationResult {
    Keep,
    Remove,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanItemType {
    Identification,
    Verification,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PlanItem {
    pub task_id: String,
    pub task_description: String,
    pub task_type: PlanItemType,
    pub is_done: bool,
}

/// Default swatch applied to a newly saved event that carries no
/// explicit color.
pub const DEFAULT_EVENT_COLOR: &str = "#FF6B6B";

/// A label class defined on the file's owning project/folder. Event
/// persistence (C12) looks a detected event's `event_name` up against
/// this list to pick the label's display color; project/folder CRUD
/// itself lives outside the core (spec §1 Non-goals), so this is the
/// minimal slice the core reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectClass {
    pub name: String,
    pub color: String,
}

/// Looks `name` up in `classes` by exact match, falling back to
/// [`DEFAULT_EVENT_COLOR`] when the project defines no matching class
/// (or no classes at all).
pub fn class_color<'a>(classes: &'a [ProjectClass], name: &str) -> &'a str {
    classes
        .iter()
        .find(|c| c.name == name)
        .map(|c| c.color.as_str())
        .unwrap_or(DEFAULT_EVENT_COLOR)
}
