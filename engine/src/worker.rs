//! The `labeling-engine worker` subcommand body: a loop over
//! `QueueClient::read_group`, with the `block_ms` argument doing the
//! waiting instead of a fixed sleep between polls.

use std::path::Path;

use anyhow::Context;
use labeling_core::Config;
use labeling_core::FileStore;
use labeling_parser::{parse_file, write_outputs, ParseTemplate};
use labeling_queue::{QueueClient, FILE_PARSING_STREAM, PARSE_CONSUMER_GROUP};
use labeling_types::ParsingStatus;
use tracing::{error, info, warn};

/// Runs forever, claiming parse tasks for `config.worker_name` until the
/// process is killed. Each message is acked whether the parse succeeds or
/// fails — failures are recorded on the file record instead of being
/// retried, so a bad file doesn't get redelivered forever.
pub async fn run(config: Config, queue: QueueClient, files: FileStore) -> anyhow::Result<()> {
    queue
        .ensure_group(FILE_PARSING_STREAM, PARSE_CONSUMER_GROUP)
        .await
        .context("bootstrapping parse consumer group")?;

    info!(worker = %config.worker_name, "parse worker started");

    // Reclaim anything left in this consumer's own PEL from a previous
    // crashed run before waiting on new work — otherwise a message that
    // was delivered but never acked would sit stuck forever, since
    // `read_group`'s `>` only ever hands out entries nobody has seen yet.
    loop {
        let pending = queue
            .read_pending(
                FILE_PARSING_STREAM,
                PARSE_CONSUMER_GROUP,
                &config.worker_name,
                config.worker_batch_size,
            )
            .await
            .context("reclaiming pending parse messages")?;
        if pending.is_empty() {
            break;
        }
        info!(worker = %config.worker_name, count = pending.len(), "reclaimed pending parse messages");
        handle_batch(&config, &files, &queue, pending).await?;
    }

    loop {
        let messages = queue
            .read_group(
                FILE_PARSING_STREAM,
                PARSE_CONSUMER_GROUP,
                &config.worker_name,
                config.worker_batch_size,
                config.worker_block_ms,
            )
            .await
            .context("reading from parse queue")?;

        handle_batch(&config, &files, &queue, messages).await?;
    }
}

async fn handle_batch(
    config: &Config,
    files: &FileStore,
    queue: &QueueClient,
    messages: Vec<(String, std::collections::HashMap<String, String>)>,
) -> anyhow::Result<()> {
    for (message_id, fields) in messages {
        let Some(file_id) = fields.get("file_id").cloned() else {
            warn!(%message_id, "parse message missing file_id, acking and skipping");
            queue.ack(FILE_PARSING_STREAM, PARSE_CONSUMER_GROUP, &message_id).await.ok();
            continue;
        };

        if let Err(err) = process_one(config, files, &file_id).await {
            error!(file_id = %file_id, error = %err, "parse failed");
        }

        queue
            .ack(FILE_PARSING_STREAM, PARSE_CONSUMER_GROUP, &message_id)
            .await
            .context("acking parse message")?;
    }
    Ok(())
}

/// One claim → parse → persist cycle. Acking happens in the caller
/// regardless of outcome; this function's job is only to leave the file
/// record in the right terminal state.
async fn process_one(config: &Config, files: &FileStore, file_id: &str) -> anyhow::Result<()> {
    let Some(record) = files.get(file_id).await else {
        warn!(file_id, "file record missing, skipping");
        return Ok(());
    };

    files
        .update(file_id, |r| r.parsing = ParsingStatus::Parsing)
        .await
        .context("marking file parsing")?;

    let dir = Path::new(&record.raw_path)
        .parent()
        .context("raw path has no parent directory")?
        .to_path_buf();
    let template_path = dir.join("template.json");
    let stem = dir.join("data");

    let outcome = match run_parse(&template_path, Path::new(&record.raw_path), &stem, config) {
        Ok(outcome) => outcome,
        Err(err) => {
            let message = err.to_string();
            files.set_error(file_id, message).await.ok();
            return Err(err);
        }
    };

    files
        .update(file_id, |r| {
            r.json_path = outcome.json_path.clone();
            r.binary_path = outcome.binary_path.clone();
            r.meta_path = outcome.meta_path.clone();
            r.overview_path = Some(outcome.overview_path.clone());
            r.use_binary_format = outcome.use_binary_format;
            r.total_points = outcome.total_points;
            r.x_type = outcome.x_type;
            r.x_format = outcome.x_format.clone();
            r.x_min = outcome.x_min;
            r.x_max = outcome.x_max;
            r.parsing = ParsingStatus::Parsed;
            r.parsing_error = None;
        })
        .await
        .context("recording parse outcome")?;

    info!(file_id, points = outcome.total_points, "parsed");
    Ok(())
}

fn run_parse(
    template_path: &Path,
    raw_path: &Path,
    stem: &Path,
    config: &Config,
) -> anyhow::Result<labeling_parser::WriteOutcome> {
    let template_raw = std::fs::read_to_string(template_path)
        .with_context(|| format!("reading template at {}", template_path.display()))?;
    let template: ParseTemplate =
        serde_json::from_str(&template_raw).context("parsing template.json")?;

    let series = parse_file(&template, raw_path).context("parsing raw file")?;
    let outcome = write_outputs(
        stem,
        &series,
        config.binary_format_threshold as usize,
        config.overview_target_points,
    )
    .context("writing parsed outputs")?;
    Ok(outcome)
}
