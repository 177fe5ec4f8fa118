//! The job orchestrator.
//!
//! [`process_job`] drives one accepted upload from queued to a terminal
//! state: wait for a worker slot, validate the input, run the transcode,
//! and mirror its events into the store. It never returns an error; every
//! failure ends as a failed job with its input file and any partial
//! output removed.

use std::path::Path;

use soundpress_av::{validate, TranscodeRequest};
use soundpress_core::{JobId, JobState};

use crate::context::AppContext;
use crate::store::JobUpdate;

/// Process a single job end to end. Spawned per submission.
pub async fn process_job(ctx: AppContext, job_id: JobId) {
    // Admission control: excess submissions queue here until a slot frees.
    let permit = match ctx.slots.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(_) => {
            // Semaphore closed; shutting down.
            ctx.store.fail_quietly(job_id, "server shutting down");
            return;
        }
    };

    let Some(job) = ctx.store.get(job_id) else {
        tracing::warn!(job_id = %job_id, "job vanished before processing");
        return;
    };

    if let Err(e) = validate::validate_input(&job.input_path, &job.original_name).await {
        tracing::info!(job_id = %job_id, error = %e, "rejecting invalid input");
        ctx.store.fail_quietly(job_id, e.to_string());
        cleanup_failed(&ctx, job_id, None);
        return;
    }

    let Some(preset) = soundpress_av::presets::get(&job.preset) else {
        // Presets are validated at submission; this is a programming error.
        ctx.store.fail_quietly(job_id, format!("unknown preset: {}", job.preset));
        cleanup_failed(&ctx, job_id, None);
        return;
    };

    if let Err(e) = ctx.store.update(job_id, JobUpdate::Start) {
        tracing::warn!(job_id = %job_id, error = %e, "job not startable");
        return;
    }

    let output_path = ctx
        .config
        .jobs
        .upload_dir
        .join(format!("compressed_{job_id}.mp3"));

    let request = TranscodeRequest {
        job_id,
        input_path: job.input_path.clone(),
        output_path: output_path.clone(),
        preset: *preset,
        timeout: ctx.config.jobs.transcode_timeout(),
        cancel: ctx.shutdown.clone(),
    };

    let mut events = ctx.transcoder.start(request).await;

    while let Some(event) = events.recv().await {
        match event {
            soundpress_av::TranscodeEvent::Progress(pct) => {
                if let Err(e) = ctx.store.update(job_id, JobUpdate::Progress(pct)) {
                    tracing::debug!(job_id = %job_id, error = %e, "progress update dropped");
                }
            }
            soundpress_av::TranscodeEvent::Completed {
                output_path,
                output_bytes,
            } => {
                match ctx.store.update(
                    job_id,
                    JobUpdate::Complete {
                        output_path,
                        output_bytes,
                    },
                ) {
                    Ok(job) => {
                        tracing::info!(
                            job_id = %job_id,
                            input_bytes = job.input_bytes,
                            output_bytes,
                            "job completed"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(job_id = %job_id, error = %e, "completion not recorded");
                    }
                }
            }
            soundpress_av::TranscodeEvent::Failed(message) => {
                ctx.store.fail_quietly(job_id, message);
                cleanup_failed(&ctx, job_id, Some(&output_path));
            }
        }
    }

    match ctx.store.get(job_id) {
        // A transcoder that drops its channel without a terminal event must
        // not leave the job processing forever.
        Some(job) if job.state == JobState::Processing => {
            ctx.store.fail_quietly(job_id, "transcoder ended without a result");
            cleanup_failed(&ctx, job_id, Some(&output_path));
        }
        // The job was deleted while the transcode ran; whatever the encoder
        // wrote has no owning record and must go too.
        None => remove_partial_output(job_id, &output_path),
        _ => {}
    }

    drop(permit);
}

/// Remove the files of a job that will never complete: the stored upload
/// and, when a transcode was started, the partial output the encoder may
/// have left at the derived path.
fn cleanup_failed(ctx: &AppContext, job_id: JobId, output_path: Option<&Path>) {
    if let Some(job) = ctx.store.get(job_id) {
        if let Err(e) = std::fs::remove_file(&job.input_path) {
            tracing::debug!(job_id = %job_id, error = %e, "input file not removed");
        }
    }
    if let Some(path) = output_path {
        remove_partial_output(job_id, path);
    }
}

fn remove_partial_output(job_id: JobId, path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            tracing::debug!(job_id = %job_id, error = %e, "partial output not removed");
        }
    }
}
