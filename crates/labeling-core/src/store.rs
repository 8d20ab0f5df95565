//! Disk-backed, in-process stores for the subset of external CRUD state
//! the core subsystems actually read or write: file records (§3), the
//! labels an agent run persists onto a file (§4.12), and the lazily
//! created conversation rows a WebSocket session observes (§3
//! Lifecycles). Full project/folder/template/label CRUD lives outside
//! this core (spec §1 Non-goals); these stores hold only what C3/C5/C7/
//! C8/C9-C12 need to do their job.
//!
//! Grounded on `tandem-core/src/storage.rs`'s `Storage`: an
//! `RwLock<HashMap<_, _>>` hydrated from a JSON file on `new()` and
//! flushed back to disk after every mutation, giving the "MongoDB-like
//! atomic single-document update" semantics spec §4.7 assumes without
//! requiring an actual database dependency.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;

use labeling_types::{EngineEvent, FileRecord, ParsingStatus, ProjectClass};

/// File records keyed by id, plus a folder → file-id index populated from
/// the `data` form field on `POST /files` (spec §6). Folder/project
/// identity itself is an external concept; this index exists only so
/// `PUT /files/reparse` can find the files to re-enqueue, and so C11/C12
/// can look a file's project classes up for the event color lookup
/// (spec §4.12).
pub struct FileStore {
    base: PathBuf,
    records: RwLock<HashMap<String, FileRecord>>,
    folders: RwLock<HashMap<String, Vec<String>>>,
    classes: RwLock<HashMap<String, Vec<ProjectClass>>>,
}

impl FileStore {
    pub async fn new(base: impl AsRef<Path>) -> Result<Self> {
        let base = base.as_ref().to_path_buf();
        fs::create_dir_all(&base)
            .await
            .with_context(|| format!("creating file store dir {}", base.display()))?;

        let records = load_json(&base.join("files.json")).await?;
        let folders = load_json(&base.join("folders.json")).await?;
        let classes = load_json(&base.join("classes.json")).await?;

        Ok(Self {
            base,
            records: RwLock::new(records),
            folders: RwLock::new(folders),
            classes: RwLock::new(classes),
        })
    }

    pub async fn insert(&self, record: FileRecord, folder_id: Option<&str>) -> Result<()> {
        let id = record.id.clone();
        self.records.write().await.insert(id.clone(), record);
        if let Some(folder_id) = folder_id {
            self.folders
                .write()
                .await
                .entry(folder_id.to_string())
                .or_default()
                .push(id);
        }
        self.flush().await
    }

    pub async fn get(&self, id: &str) -> Option<FileRecord> {
        self.records.read().await.get(id).cloned()
    }

    /// Applies `f` to the record under the write lock and flushes the
    /// result, giving callers (the parse worker, the viewport handler,
    /// event persistence) an atomic single-document update without a
    /// separate read-then-write race window.
    pub async fn update<F>(&self, id: &str, f: F) -> Result<FileRecord>
    where
        F: FnOnce(&mut FileRecord),
    {
        let updated = {
            let mut guard = self.records.write().await;
            let record = guard
                .get_mut(id)
                .with_context(|| format!("file record {id} not found"))?;
            f(record);
            record.clone()
        };
        self.flush().await?;
        Ok(updated)
    }

    pub async fn list_by_folder(&self, folder_id: &str) -> Vec<FileRecord> {
        let ids = self
            .folders
            .read()
            .await
            .get(folder_id)
            .cloned()
            .unwrap_or_default();
        let records = self.records.read().await;
        ids.iter().filter_map(|id| records.get(id).cloned()).collect()
    }

    pub async fn set_error(&self, id: &str, message: impl Into<String>) -> Result<FileRecord> {
        let message = message.into();
        self.update(id, |record| {
            record.parsing = ParsingStatus::Error;
            record.parsing_error = Some(message);
        })
        .await
    }

    /// The folder a file was uploaded into, if any; a reverse lookup over
    /// the same index `insert` populates.
    pub async fn folder_of(&self, file_id: &str) -> Option<String> {
        self.folders
            .read()
            .await
            .iter()
            .find(|(_, files)| files.iter().any(|id| id == file_id))
            .map(|(folder_id, _)| folder_id.clone())
    }

    /// Replaces the label classes defined on `folder_id` (spec §4.11 "load
    /// project classes"). Project/folder CRUD lives outside this core, so
    /// this exists only as the write side C11's init step reads back from.
    pub async fn set_classes(&self, folder_id: &str, classes: Vec<ProjectClass>) -> Result<()> {
        self.classes.write().await.insert(folder_id.to_string(), classes);
        self.flush().await
    }

    pub async fn classes_for_folder(&self, folder_id: &str) -> Vec<ProjectClass> {
        self.classes.read().await.get(folder_id).cloned().unwrap_or_default()
    }

    /// Convenience wrapper for C11/C12: the classes of the folder a file
    /// belongs to, or empty if the file has no folder or the folder has no
    /// classes defined.
    pub async fn classes_for_file(&self, file_id: &str) -> Vec<ProjectClass> {
        match self.folder_of(file_id).await {
            Some(folder_id) => self.classes_for_folder(&folder_id).await,
            None => Vec::new(),
        }
    }

    async fn flush(&self) -> Result<()> {
        write_json(&self.base.join("files.json"), &*self.records.read().await).await?;
        write_json(&self.base.join("folders.json"), &*self.folders.read().await).await?;
        write_json(&self.base.join("classes.json"), &*self.classes.read().await).await
    }
}

/// A label materialized from a detected event (spec §4.12), attached to a
/// file. Persisted separately from `FileRecord` because a file can carry
/// many labels across many detection runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedLabel {
    pub class_name: String,
    pub color: String,
    pub description: String,
    pub labeler: String,
    pub start: u64,
    pub end: u64,
    pub hide: bool,
    pub auto_detected: bool,
}

pub struct LabelStore {
    base: PathBuf,
    labels: RwLock<HashMap<String, Vec<PersistedLabel>>>,
}

impl LabelStore {
    pub async fn new(base: impl AsRef<Path>) -> Result<Self> {
        let base = base.as_ref().to_path_buf();
        fs::create_dir_all(&base).await?;
        let labels = load_json(&base.join("labels.json")).await?;
        Ok(Self {
            base,
            labels: RwLock::new(labels),
        })
    }

    pub async fn append_all(&self, file_id: &str, labels: Vec<PersistedLabel>) -> Result<()> {
        self.labels
            .write()
            .await
            .entry(file_id.to_string())
            .or_default()
            .extend(labels);
        self.flush().await
    }

    pub async fn list(&self, file_id: &str) -> Vec<PersistedLabel> {
        self.labels.read().await.get(file_id).cloned().unwrap_or_default()
    }

    async fn flush(&self) -> Result<()> {
        write_json(&self.base.join("labels.json"), &*self.labels.read().await).await
    }
}

/// One of the two conversation flavors a file can have open: the
/// auto-detection agent run, or the chat assistant thread (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    AutoDetection,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Idle,
    Started,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Append-only notification log plus the current status, shared across
/// every subscriber of a given `(file_id, kind)` conversation. Created
/// lazily on first interaction (spec §3 Lifecycles); kept in memory only
/// — a conversation's history does not need to survive a process
/// restart the way a file record does.
#[derive(Debug, Clone, Default)]
pub struct ConversationRecord {
    pub status: Option<ConversationStatus>,
    pub log: Vec<EngineEvent>,
}

#[derive(Default)]
pub struct ConversationStore {
    conversations: RwLock<HashMap<(String, ConversationKind), ConversationRecord>>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_status(&self, file_id: &str, kind: ConversationKind, status: ConversationStatus) {
        let mut guard = self.conversations.write().await;
        let record = guard.entry((file_id.to_string(), kind)).or_default();
        record.status = Some(status);
    }

    pub async fn status(&self, file_id: &str, kind: ConversationKind) -> Option<ConversationStatus> {
        self.conversations
            .read()
            .await
            .get(&(file_id.to_string(), kind))
            .and_then(|r| r.status)
    }

    pub async fn append(&self, file_id: &str, kind: ConversationKind, event: EngineEvent) {
        let mut guard = self.conversations.write().await;
        guard
            .entry((file_id.to_string(), kind))
            .or_default()
            .log
            .push(event);
    }

    pub async fn log(&self, file_id: &str, kind: ConversationKind) -> Vec<EngineEvent> {
        self.conversations
            .read()
            .await
            .get(&(file_id.to_string(), kind))
            .map(|r| r.log.clone())
            .unwrap_or_default()
    }
}

async fn load_json<T: for<'de> Deserialize<'de> + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let raw = fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(serde_json::from_str(&raw).unwrap_or_default())
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value)?;
    fs::write(path, payload)
        .await
        .with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use labeling_types::XType;

    fn sample_record(id: &str) -> FileRecord {
        FileRecord {
            id: id.to_string(),
            raw_path: format!("/data/{id}/raw.csv"),
            json_path: None,
            binary_path: None,
            meta_path: None,
            overview_path: None,
            use_binary_format: false,
            total_points: 0,
            x_type: XType::Numeric,
            x_format: None,
            x_min: 0.0,
            x_max: 0.0,
            parsing: ParsingStatus::Queued,
            parsing_error: None,
            label: None,
            last_modifier: None,
            last_update: None,
        }
    }

    #[tokio::test]
    async fn update_is_visible_after_flush() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();
        store.insert(sample_record("f1"), Some("folder-a")).await.unwrap();

        store
            .update("f1", |r| r.parsing = ParsingStatus::Parsed)
            .await
            .unwrap();

        let record = store.get("f1").await.unwrap();
        assert_eq!(record.parsing, ParsingStatus::Parsed);

        let by_folder = store.list_by_folder("folder-a").await;
        assert_eq!(by_folder.len(), 1);
    }

    #[tokio::test]
    async fn reopening_store_reloads_persisted_records() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = FileStore::new(dir.path()).await.unwrap();
            store.insert(sample_record("f1"), None).await.unwrap();
        }
        let reopened = FileStore::new(dir.path()).await.unwrap();
        assert!(reopened.get("f1").await.is_some());
    }

    #[tokio::test]
    async fn classes_for_file_looks_up_through_the_owning_folder() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();
        store.insert(sample_record("f1"), Some("folder-a")).await.unwrap();
        store
            .set_classes(
                "folder-a",
                vec![ProjectClass { name: "spike".into(), color: "#123456".into() }],
            )
            .await
            .unwrap();

        let classes = store.classes_for_file("f1").await;
        assert_eq!(classes.len(), 1);
        assert_eq!(classes[0].color, "#123456");
    }

    #[tokio::test]
    async fn classes_for_file_is_empty_without_a_folder() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path()).await.unwrap();
        store.insert(sample_record("f1"), None).await.unwrap();
        assert!(store.classes_for_file("f1").await.is_empty());
    }

    #[tokio::test]
    async fn label_store_accumulates_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        let store = LabelStore::new(dir.path()).await.unwrap();
        let label = PersistedLabel {
            class_name: "spike".into(),
            color: "#FF6B6B".into(),
            description: "Auto-detected: Multi-agent detection".into(),
            labeler: "AI Multi-Agent".into(),
            start: 10,
            end: 20,
            hide: false,
            auto_detected: true,
        };
        store.append_all("f1", vec![label.clone()]).await.unwrap();
        store.append_all("f1", vec![label]).await.unwrap();
        assert_eq!(store.list("f1").await.len(), 2);
    }

    #[tokio::test]
    async fn conversation_store_tracks_status_and_log() {
        let store = ConversationStore::new();
        store
            .set_status("f1", ConversationKind::AutoDetection, ConversationStatus::Running)
            .await;
        store
            .append(
                "f1",
                ConversationKind::AutoDetection,
                EngineEvent::new("analysis_progress", Some("f1".into()), serde_json::json!({})),
            )
            .await;

        assert_eq!(
            store.status("f1", ConversationKind::AutoDetection).await,
            Some(ConversationStatus::Running)
        );
        assert_eq!(store.log("f1", ConversationKind::AutoDetection).await.len(), 1);
    }
}
