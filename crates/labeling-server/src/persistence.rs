//! Event Persistence (C12, spec §4.12): once a detection run finalizes,
//! materialize its surviving detected events into the file's label list
//! and stamp the file record with who touched it last.

use anyhow::Result;

use labeling_core::{LabelStore, PersistedLabel};
use labeling_orchestrator::AgentState;
use labeling_types::{class_color, VerificationResult};

use crate::AppState;

const AUTO_DETECTION_LABELER: &str = "AI Multi-Agent";

/// Writes every detected event that wasn't flagged for removal as a
/// label, then updates the file's `lastModifier`/`lastUpdate`. Returns
/// the number of labels written.
pub async fn persist_agent_state(state: &AppState, file_id: &str, agent_state: &AgentState) -> Result<usize> {
    let classes = state.files.classes_for_file(file_id).await;
    let labels: Vec<PersistedLabel> = agent_state
        .detected_events
        .values()
        .filter(|event| event.verification_result != Some(VerificationResult::Remove))
        .map(|event| PersistedLabel {
            class_name: event.event_name.clone(),
            color: class_color(&classes, &event.event_name).to_string(),
            description: "Auto-detected: Multi-agent detection".to_string(),
            labeler: AUTO_DETECTION_LABELER.to_string(),
            start: event.start_index,
            end: event.end_index,
            hide: false,
            auto_detected: true,
        })
        .collect();

    let count = labels.len();
    state.labels.append_all(file_id, labels).await?;
    state
        .files
        .update(file_id, |record| {
            record.last_modifier = Some(AUTO_DETECTION_LABELER.to_string());
            record.last_update = Some(chrono::Utc::now().timestamp_millis());
        })
        .await?;
    Ok(count)
}
