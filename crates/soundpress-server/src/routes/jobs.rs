//! Job submission, status, download, and deletion.

use std::path::Path as FsPath;

use axum::body::Body;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tokio_util::io::ReaderStream;

use soundpress_av::presets;
use soundpress_core::{Error, Job, JobId, JobState};

use crate::context::AppContext;
use crate::error::AppError;
use crate::orchestrator;

/// Streaming chunk size for downloads.
const DOWNLOAD_CHUNK: usize = 64 * 1024;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub job_id: JobId,
    pub status: JobState,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub job_id: JobId,
    pub status: JobState,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Job> for JobResponse {
    fn from(job: &Job) -> Self {
        let download_url = (job.state == JobState::Completed)
            .then(|| format!("/api/jobs/{}/download", job.id));
        Self {
            job_id: job.id,
            status: job.state,
            progress: job.progress,
            download_url,
            error: job.error.clone(),
        }
    }
}

/// POST /api/jobs
///
/// Accepts a multipart form with a `file` field and an optional `preset`
/// field. The upload is spooled to disk first because field order is up to
/// the client; the preset check runs before a job is created, and a bad
/// preset removes the spooled file again.
pub async fn submit_job(
    State(ctx): State<AppContext>,
    mut multipart: Multipart,
) -> Result<Json<SubmitResponse>, AppError> {
    let upload_dir = &ctx.config.jobs.upload_dir;
    tokio::fs::create_dir_all(upload_dir).await?;

    let job_id = JobId::new();
    let input_path = upload_dir.join(format!("upload_{job_id}"));

    // Once anything is spooled, every error exit must remove it again; a
    // file without a job record is invisible to the reclaim sweep.
    let (original_name, input_bytes, preset_name) =
        match read_submission(&mut multipart, &input_path).await {
            Ok(parts) => parts,
            Err(e) => {
                discard_spooled(&input_path, job_id).await;
                return Err(e.into());
            }
        };

    let Some(original_name) = original_name else {
        return Err(Error::Validation("no file uploaded".into()).into());
    };

    let preset = preset_name.unwrap_or_else(|| presets::DEFAULT_PRESET.to_string());
    if !presets::is_valid(&preset) {
        discard_spooled(&input_path, job_id).await;
        return Err(Error::Validation(format!("invalid preset: {preset}")).into());
    }

    let job = Job::new(job_id, &preset, &original_name, input_path.clone(), input_bytes);
    if let Err(e) = ctx.store.insert(job) {
        discard_spooled(&input_path, job_id).await;
        return Err(e.into());
    }

    tracing::info!(
        job_id = %job_id,
        preset = %preset,
        file = %original_name,
        bytes = input_bytes,
        "job accepted"
    );

    tokio::spawn(orchestrator::process_job(ctx.clone(), job_id));

    Ok(Json(SubmitResponse {
        job_id,
        status: JobState::Queued,
    }))
}

/// GET /api/jobs/{id}
pub async fn get_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>, AppError> {
    let job_id: JobId = id
        .parse()
        .map_err(|_| Error::Validation("invalid job id".into()))?;

    let job = ctx
        .store
        .get(job_id)
        .ok_or_else(|| Error::not_found("job", job_id))?;

    Ok(Json(JobResponse::from(&job)))
}

/// GET /api/jobs/{id}/download
///
/// Streams the compressed output as an attachment. The job's files are
/// removed after a grace delay so deletion cannot race the response body;
/// the job record itself stays until the reclamation sweep.
pub async fn download_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let job_id: JobId = id
        .parse()
        .map_err(|_| Error::Validation("invalid job id".into()))?;

    let job = ctx
        .store
        .get(job_id)
        .ok_or_else(|| Error::not_found("job", job_id))?;

    if job.state != JobState::Completed {
        return Err(Error::Validation(format!(
            "job is not completed (status: {})",
            job.state
        ))
        .into());
    }

    let output_path = job
        .output_path
        .clone()
        .ok_or_else(|| Error::Internal("completed job has no output path".into()))?;

    let metadata = tokio::fs::metadata(&output_path)
        .await
        .map_err(|_| Error::not_found("output file", job_id))?;

    let file = tokio::fs::File::open(&output_path)
        .await
        .map_err(|_| Error::not_found("output file", job_id))?;

    let stream = ReaderStream::with_capacity(file, DOWNLOAD_CHUNK);
    let body = Body::from_stream(stream);
    let filename = download_name(&job.original_name);

    // Deferred cleanup so deletion cannot race the streamed body.
    let grace = std::time::Duration::from_secs(ctx.config.jobs.download_grace_secs);
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        crate::store::delete_job_files(&job);
        tracing::info!(job_id = %job_id, "cleaned up files after download");
    });

    let response = (
        [
            (header::CONTENT_TYPE, "audio/mpeg".to_string()),
            (header::CONTENT_LENGTH, metadata.len().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response();

    Ok(response)
}

/// DELETE /api/jobs/{id}
///
/// Removes the job record and its files. Deleting an unknown job is a
/// no-op so clients can retry safely.
pub async fn delete_job(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let job_id: JobId = id
        .parse()
        .map_err(|_| Error::Validation("invalid job id".into()))?;

    if let Some(job) = ctx.store.remove(job_id) {
        crate::store::delete_job_files(&job);
        tracing::info!(job_id = %job_id, "job deleted");
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Drain the multipart form, spooling the `file` field to `input_path`.
async fn read_submission(
    multipart: &mut Multipart,
    input_path: &FsPath,
) -> Result<(Option<String>, u64, Option<String>), Error> {
    let mut original_name: Option<String> = None;
    let mut input_bytes: u64 = 0;
    let mut preset_name: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::Validation(format!("multipart error: {e}")))?
    {
        match field.name() {
            Some("file") => {
                let name = field.file_name().unwrap_or("upload").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| Error::Validation(format!("upload read error: {e}")))?;
                input_bytes = data.len() as u64;
                tokio::fs::write(input_path, &data).await?;
                original_name = Some(name);
            }
            Some("preset") => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| Error::Validation(format!("preset field error: {e}")))?;
                preset_name = Some(value);
            }
            _ => {}
        }
    }

    Ok((original_name, input_bytes, preset_name))
}

/// Best-effort removal of a spooled upload that never became a job.
async fn discard_spooled(path: &FsPath, job_id: JobId) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::debug!(job_id = %job_id, error = %e, "spooled upload not removed");
    }
}

/// Attachment filename for a download: `compressed_<original stem>.mp3`.
fn download_name(original_name: &str) -> String {
    let stem = FsPath::new(original_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("audio");
    format!("compressed_{stem}.mp3")
}
