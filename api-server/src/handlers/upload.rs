//! Upload handler - capture ingress
//!
//! The capture is streamed to a private `.partial` file and then linked under
//! its final name, so the directory watcher never sees a half-written file.
//! A stored capture is never replaced: if `<name>` is taken the upload is
//! stored as `<stem>-<n>.<ext>`.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    extract::{Multipart, Query, State, multipart::Field},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tokio::io::AsyncWriteExt;

use flowguard_core::{ArtifactOrigin, CaptureArtifact};

use crate::{AppState, AppResult, AppError};
use crate::models::{UploadAccepted, UploadCompleted, UploadParams};

/// Suffixed names tried before giving up on a crowded name
const MAX_NAME_ATTEMPTS: u32 = 1000;

static PARTIAL_SEQ: AtomicU64 = AtomicU64::new(0);

/// `POST /upload[?wait=true]`, multipart field `file`
pub async fn upload(
    State(state): State<AppState>,
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let stored = receive_capture(&state.config.pipeline.input_dir, &mut multipart).await?;

    let artifact = CaptureArtifact::from_path(&stored, ArtifactOrigin::Upload)?;
    let file = artifact.name.clone();
    tracing::info!("Capture uploaded: {} ({} bytes)", file, artifact.size_bytes);

    let submission = state.dispatcher.submit(artifact)?;

    if !params.wait {
        let body = UploadAccepted {
            status: submission.status(),
            file,
            job: submission.snapshot().clone(),
        };
        return Ok((StatusCode::ACCEPTED, Json(body)).into_response());
    }

    let key = submission.snapshot().key.clone();
    state
        .dispatcher
        .wait(&key, state.config.upload_wait_timeout)
        .await?;
    let job = state
        .dispatcher
        .status(&key)
        .unwrap_or_else(|| submission.snapshot().clone());

    let store = state.store.clone();
    let alerts = tokio::task::spawn_blocking(move || store.alerts_for(&key))
        .await
        .map_err(|e| AppError::InternalError(format!("alert read task failed: {}", e)))?;

    Ok(Json(UploadCompleted { pcap: file, job, alerts }).into_response())
}

/// Store the first `file` field; returns its final path, which may differ
/// from the client's file name
async fn receive_capture(input_dir: &Path, multipart: &mut Multipart) -> AppResult<PathBuf> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let name = field
            .file_name()
            .and_then(sanitize_file_name)
            .ok_or_else(|| AppError::BadRequest("Missing or invalid file name".to_string()))?;

        tokio::fs::create_dir_all(input_dir).await?;
        let partial = input_dir.join(format!(
            ".{}.{}-{}.partial",
            name,
            std::process::id(),
            PARTIAL_SEQ.fetch_add(1, Ordering::Relaxed)
        ));

        let stored = match write_field(&mut field, &partial).await {
            Ok(()) => link_unique(&partial, input_dir, &name).await,
            Err(e) => Err(e),
        };
        let _ = tokio::fs::remove_file(&partial).await;

        return stored;
    }

    Err(AppError::BadRequest("Missing 'file' field".to_string()))
}

/// Hard-link `partial` under the first free name; linking never replaces
/// an existing file
async fn link_unique(partial: &Path, input_dir: &Path, name: &str) -> AppResult<PathBuf> {
    for n in 0..MAX_NAME_ATTEMPTS {
        let target = input_dir.join(numbered_name(name, n));
        match tokio::fs::hard_link(partial, &target).await {
            Ok(()) => return Ok(target),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Err(AppError::InternalError(format!("no free file name for {}", name)))
}

/// `a.pcap`, `a-1.pcap`, `a-2.pcap`, ...
pub fn numbered_name(name: &str, n: u32) -> String {
    if n == 0 {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}-{}.{}", stem, n, ext),
        _ => format!("{}-{}", name, n),
    }
}

async fn write_field(field: &mut Field<'_>, path: &Path) -> AppResult<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| AppError::BadRequest(format!("Upload interrupted: {}", e)))?
    {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

/// Final path component only; empty, `.` and `..` are rejected
pub fn sanitize_file_name(raw: &str) -> Option<String> {
    let name = raw.rsplit(['/', '\\']).next()?.trim();
    match name {
        "" | "." | ".." => None,
        _ => Some(name.to_string()),
    }
}
