//! The job data model shared between the lifecycle engine and the API layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::ids::JobId;

/// Lifecycle state of a compression job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Accepted and waiting for a worker slot.
    Queued,
    /// An ffmpeg process is running for this job.
    Processing,
    /// The transcode finished and the output is downloadable.
    Completed,
    /// The transcode failed; see [`Job::error`].
    Failed,
}

impl JobState {
    /// Whether this state is terminal. Terminal jobs never change state
    /// again and become eligible for reclamation.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }

    /// Whether a transition from `self` to `next` is legal.
    ///
    /// Legal transitions: Queued -> Processing, Processing -> Completed,
    /// Processing -> Failed, and Queued -> Failed (a job can fail before
    /// it ever starts, e.g. when its input vanished).
    pub fn can_transition_to(&self, next: JobState) -> bool {
        matches!(
            (self, next),
            (JobState::Queued, JobState::Processing)
                | (JobState::Queued, JobState::Failed)
                | (JobState::Processing, JobState::Completed)
                | (JobState::Processing, JobState::Failed)
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobState::Queued => "queued",
            JobState::Processing => "processing",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A single audio compression job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub state: JobState,
    /// Percent complete, 0..=100.
    pub progress: u8,
    /// Name of the compression preset selected at submission.
    pub preset: String,
    /// Original filename as uploaded by the client.
    pub original_name: String,
    /// Where the uploaded input was stored on disk.
    pub input_path: PathBuf,
    /// Where the transcoded output lives, once completed.
    pub output_path: Option<PathBuf>,
    /// Failure description for failed jobs.
    pub error: Option<String>,
    pub input_bytes: u64,
    pub output_bytes: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when the job reaches a terminal state; drives retention.
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Create a freshly queued job.
    pub fn new(
        id: JobId,
        preset: impl Into<String>,
        original_name: impl Into<String>,
        input_path: PathBuf,
        input_bytes: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            state: JobState::Queued,
            progress: 0,
            preset: preset.into(),
            original_name: original_name.into(),
            input_path,
            output_path: None,
            error: None,
            input_bytes,
            output_bytes: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }
}
