//! REST surface (spec §6): file upload/ingest, the initial-load/overview
//! endpoint, the binary viewport endpoint the canvas re-queries on pan and
//! zoom, folder reparse, and a liveness probe. WebSocket routes live in
//! [`crate::ws`].

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use labeling_core::{get_reader, Resampler};
use labeling_queue::FILE_PARSING_STREAM;
use labeling_types::{FileRecord, ParsingStatus, XType};

use crate::{loader, ws, ApiError, AppState};

pub fn app_router(state: AppState) -> Router {
    let cors = build_cors(&state.config.cors_origins);

    Router::new()
        .route("/files", post(create_file))
        .route("/files/{id}", get(get_file))
        .route("/files/{id}/viewport", get(get_viewport))
        .route("/files/reparse", put(reparse_folder))
        .route("/healthz", get(healthz))
        .route("/ws/auto-detection/{file_id}", get(ws::auto_detection_upgrade))
        .route("/ws/chat/{file_id}", get(ws::chat_upgrade))
        .layer(cors)
        .with_state(state)
}

fn build_cors(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }
    let parsed: Vec<HeaderValue> = origins.iter().filter_map(|o| o.parse().ok()).collect();
    if parsed.is_empty() {
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(parsed)
    }
}

async fn create_file(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<Value>, ApiError> {
    let mut folder_id: Option<String> = None;
    let mut uploader: Option<String> = None;
    let mut file_name: Option<String> = None;
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut template_json: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::validation(format!("malformed multipart body: {e}")))?
    {
        match field.name().unwrap_or_default() {
            "data" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation(format!("invalid `data` field: {e}")))?;
                folder_id = Some(text);
            }
            "user" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation(format!("invalid `user` field: {e}")))?;
                uploader = Some(text);
            }
            "template" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::validation(format!("invalid `template` field: {e}")))?;
                template_json = Some(text);
            }
            "file" => {
                file_name = field.file_name().map(|s| s.to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::validation(format!("invalid `file` field: {e}")))?;
                file_bytes = Some(bytes.to_vec());
            }
            _ => {}
        }
    }

    let file_name = file_name.ok_or_else(|| ApiError::validation("multipart body missing `file` field"))?;
    let file_bytes = file_bytes.ok_or_else(|| ApiError::validation("multipart body missing file contents"))?;
    let template_json =
        template_json.ok_or_else(|| ApiError::validation("multipart body missing `template` field"))?;
    let template: labeling_parser::ParseTemplate = serde_json::from_str(&template_json)
        .map_err(|e| ApiError::validation(format!("invalid parse template: {e}")))?;

    if file_bytes.len() as u64 > state.config.upload_size_cap_bytes {
        return Err(ApiError::validation(format!(
            "file exceeds the {} byte upload cap",
            state.config.upload_size_cap_bytes
        )));
    }

    let extension = std::path::Path::new(&file_name)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("csv")
        .to_lowercase();

    let id = Uuid::new_v4().to_string();
    let dir = state.config.data_dir.join(&id);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(|e| ApiError::internal(format!("creating upload directory: {e}")))?;

    let raw_path = dir.join(format!("raw.{extension}"));
    tokio::fs::write(&raw_path, &file_bytes)
        .await
        .map_err(|e| ApiError::internal(format!("writing uploaded file: {e}")))?;

    let template_path = dir.join("template.json");
    tokio::fs::write(&template_path, serde_json::to_vec_pretty(&template)?)
        .await
        .map_err(|e| ApiError::internal(format!("writing parse template: {e}")))?;

    let record = FileRecord {
        id: id.clone(),
        raw_path: raw_path.to_string_lossy().into_owned(),
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
        parsing: ParsingStatus::Uploading,
        parsing_error: None,
        label: None,
        last_modifier: uploader.clone(),
        last_update: None,
    };

    state
        .files
        .insert(record, folder_id.as_deref())
        .await
        .map_err(|e| ApiError::internal(format!("persisting file record: {e}")))?;

    let mut metadata = std::collections::HashMap::new();
    metadata.insert("fileName".to_string(), json!(file_name));
    metadata.insert("extension".to_string(), json!(extension));
    if let Some(uploader) = uploader {
        metadata.insert("uploader".to_string(), json!(uploader));
    }

    state
        .queue
        .enqueue(FILE_PARSING_STREAM, &id, Some(&metadata))
        .await
        .map_err(|e| ApiError::internal(format!("enqueuing parse work: {e}")))?;

    state
        .files
        .update(&id, |record| record.parsing = ParsingStatus::Queued)
        .await
        .map_err(|e| ApiError::internal(format!("marking file queued: {e}")))?;

    Ok(Json(json!({ "done": true, "id": id })))
}

async fn get_file(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let record = state
        .files
        .get(&id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("file {id} not found")))?;

    let data = if record.parsing != ParsingStatus::Parsed {
        Value::Array(Vec::new())
    } else {
        let overview_path = record
            .overview_path
            .as_deref()
            .ok_or_else(|| ApiError::internal("parsed file has no overview artifact"))?;
        let raw = tokio::fs::read(overview_path)
            .await
            .map_err(|e| ApiError::internal(format!("reading overview: {e}")))?;
        let overview: Value = serde_json::from_slice(&raw)?;
        overview.get("data").cloned().unwrap_or_else(|| Value::Array(Vec::new()))
    };

    Ok(Json(json!({ "fileInfo": record, "data": data })))
}

#[derive(Deserialize)]
struct ViewportQuery {
    x_min: f64,
    x_max: f64,
    #[serde(default)]
    max_points: Option<usize>,
}

async fn get_viewport(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ViewportQuery>,
) -> Result<Response, ApiError> {
    let record = state
        .files
        .get(&id)
        .await
        .ok_or_else(|| ApiError::not_found(format!("file {id} not found")))?;

    if record.parsing != ParsingStatus::Parsed {
        return Err(ApiError::validation("file is not parsed yet"));
    }

    let max_points = query.max_points.unwrap_or(20_000).max(1);

    let (x, channel_names, channel_values) = if record.use_binary_format {
        let binary_path = record
            .binary_path
            .as_deref()
            .ok_or_else(|| ApiError::internal("file has no binary artifact"))?;
        let meta_path = record
            .meta_path
            .as_deref()
            .ok_or_else(|| ApiError::internal("file has no binary metadata"))?;
        let reader = get_reader(std::path::Path::new(binary_path), std::path::Path::new(meta_path))?;
        let (x, channels, _count) = reader.read_range(query.x_min, query.x_max);
        let names = reader.meta.channels.iter().map(|c| c.name.clone()).collect();
        (x, names, channels)
    } else {
        let (x_full, channels_full) = loader::load_full_series(&record).await?;
        let (start, end) = slice_bounds(&x_full, query.x_min, query.x_max);
        let x = x_full[start..end].to_vec();
        let names = channels_full.iter().map(|c| c.name.clone()).collect();
        let values = channels_full.iter().map(|c| c.data[start..end].to_vec()).collect();
        (x, names, values)
    };

    let total_points = x.len();

    let (x_out, channels_out, is_full) = if total_points == 0 {
        (Vec::new(), vec![Vec::new(); channel_values.len()], true)
    } else {
        Resampler::new(max_points)
            .resample(&x, &channel_values)
            .map_err(|e| ApiError::internal(format!("resampling viewport: {e}")))?
    };

    let mut body = Vec::with_capacity((x_out.len() * (1 + channels_out.len())) * 8);
    for v in &x_out {
        body.extend_from_slice(&v.to_le_bytes());
    }
    for channel in &channels_out {
        for v in channel {
            body.extend_from_slice(&v.to_le_bytes());
        }
    }

    let mut headers = HeaderMap::new();
    set_header(&mut headers, "x-total-points", total_points.to_string());
    set_header(&mut headers, "x-returned-points", x_out.len().to_string());
    set_header(&mut headers, "x-full-resolution", is_full.to_string());
    set_header(&mut headers, "x-num-columns", channels_out.len().to_string());
    set_header(&mut headers, "x-x-min", query.x_min.to_string());
    set_header(&mut headers, "x-x-max", query.x_max.to_string());
    set_header(&mut headers, "x-channel-names", channel_names.join(","));
    set_header(&mut headers, "x-x-type", xtype_str(record.x_type).to_string());
    if let Some(format) = &record.x_format {
        set_header(&mut headers, "x-x-format", format.clone());
    }

    Ok((StatusCode::OK, headers, body).into_response())
}

fn set_header(headers: &mut HeaderMap, name: &'static str, value: String) {
    if let Ok(value) = HeaderValue::from_str(&value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

fn xtype_str(x_type: XType) -> &'static str {
    match x_type {
        XType::Numeric => "numeric",
        XType::Datetime => "timestamp",
    }
}

fn slice_bounds(x: &[f64], x_min: f64, x_max: f64) -> (usize, usize) {
    let start = x.partition_point(|&v| v < x_min);
    let end = x.partition_point(|&v| v <= x_max).max(start);
    (start, end)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReparseRequest {
    folder_id: String,
}

async fn reparse_folder(
    State(state): State<AppState>,
    Json(input): Json<ReparseRequest>,
) -> Result<Json<Value>, ApiError> {
    let files = state.files.list_by_folder(&input.folder_id).await;
    let mut requeued = 0usize;
    for file in files {
        state
            .files
            .update(&file.id, |record| record.parsing = ParsingStatus::Queued)
            .await
            .map_err(|e| ApiError::internal(format!("resetting file state: {e}")))?;
        state
            .queue
            .enqueue(FILE_PARSING_STREAM, &file.id, None)
            .await
            .map_err(|e| ApiError::internal(format!("enqueuing reparse: {e}")))?;
        requeued += 1;
    }
    Ok(Json(json!({ "requeued": requeued })))
}

async fn healthz(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let healthy = state
        .queue
        .health_check()
        .await
        .map_err(|e| ApiError::internal(format!("queue health check failed: {e}")))?;
    if healthy {
        Ok(Json(json!({ "status": "ok" })))
    } else {
        Err(ApiError::internal("queue did not respond to PING"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slice_bounds_matches_inclusive_upper_bound() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        assert_eq!(slice_bounds(&x, 3.0, 6.0), (3, 7));
        assert_eq!(slice_bounds(&x, -5.0, 100.0), (0, 10));
        assert_eq!(slice_bounds(&x, 20.0, 30.0), (10, 10));
    }
}
