//! The transcoding seam between the job engine and ffmpeg.
//!
//! [`Transcoder::start`] launches a transcode and hands back a channel of
//! [`TranscodeEvent`]s. The contract: zero or more `Progress` events
//! followed by exactly one terminal event (`Completed` or `Failed`),
//! regardless of how the underlying process dies. The job engine relies on
//! that terminal event to move jobs out of `processing`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::command::ToolCommand;
use crate::presets::Preset;
use crate::probe;
use crate::tools::ToolRegistry;

use soundpress_core::JobId;

/// Progress reported during the encode is confined to this band; 0 means
/// "not started" and 100 is reserved for verified completion.
const PROGRESS_FLOOR: f64 = 5.0;
const PROGRESS_CEIL: f64 = 95.0;

/// Everything needed to run one transcode.
#[derive(Debug, Clone)]
pub struct TranscodeRequest {
    pub job_id: JobId,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub preset: Preset,
    /// Wall-clock limit for the ffmpeg process.
    pub timeout: Duration,
    /// Fired on server shutdown; kills the process.
    pub cancel: CancellationToken,
}

/// Events emitted over the channel returned by [`Transcoder::start`].
#[derive(Debug, Clone, PartialEq)]
pub enum TranscodeEvent {
    /// Percent complete, within the progress band.
    Progress(u8),
    /// Terminal: the output file exists and has the given size.
    Completed {
        output_path: PathBuf,
        output_bytes: u64,
    },
    /// Terminal: the transcode did not produce a usable output.
    Failed(String),
}

impl TranscodeEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TranscodeEvent::Progress(_))
    }
}

/// Abstraction over the external encoder so the job engine and tests do not
/// depend on a real ffmpeg binary.
#[async_trait]
pub trait Transcoder: Send + Sync {
    /// Start a transcode. The returned channel yields progress events and
    /// always ends with exactly one terminal event.
    async fn start(&self, req: TranscodeRequest) -> mpsc::Receiver<TranscodeEvent>;
}

/// Production [`Transcoder`] shelling out to ffmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    tools: Arc<ToolRegistry>,
}

impl FfmpegTranscoder {
    pub fn new(tools: Arc<ToolRegistry>) -> Self {
        Self { tools }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn start(&self, req: TranscodeRequest) -> mpsc::Receiver<TranscodeEvent> {
        let (tx, rx) = mpsc::channel(32);
        let tools = Arc::clone(&self.tools);

        tokio::spawn(async move {
            let event = match run_transcode(&tools, &req, &tx).await {
                Ok(output_bytes) => TranscodeEvent::Completed {
                    output_path: req.output_path.clone(),
                    output_bytes,
                },
                Err(e) => {
                    tracing::warn!(job_id = %req.job_id, error = %e, "transcode failed");
                    TranscodeEvent::Failed(e.to_string())
                }
            };
            // The engine may have gone away (shutdown); nothing to do then.
            let _ = tx.send(event).await;
        });

        rx
    }
}

async fn run_transcode(
    tools: &ToolRegistry,
    req: &TranscodeRequest,
    tx: &mpsc::Sender<TranscodeEvent>,
) -> soundpress_core::Result<u64> {
    let duration = match probe::duration_secs(tools, &req.input_path).await {
        Ok(d) => d,
        Err(e) => {
            tracing::debug!(job_id = %req.job_id, error = %e, "duration probe failed");
            None
        }
    };

    let ffmpeg = tools.require("ffmpeg")?;

    tracing::info!(
        job_id = %req.job_id,
        preset = req.preset.name,
        input = %req.input_path.display(),
        output = %req.output_path.display(),
        "starting ffmpeg"
    );

    let mut cmd = ToolCommand::new(ffmpeg.path.clone());
    cmd.timeout(req.timeout);
    cmd.args(["-y", "-progress", "pipe:2", "-nostats"]);
    cmd.arg("-i");
    cmd.arg(req.input_path.to_string_lossy().as_ref());
    cmd.args(["-vn", "-c:a", "libmp3lame"]);
    cmd.args(req.preset.ffmpeg_args());
    cmd.args(["-f", "mp3"]);
    cmd.arg(req.output_path.to_string_lossy().as_ref());

    // The process is alive from here; move off the 0% floor.
    let _ = tx.try_send(TranscodeEvent::Progress(PROGRESS_FLOOR as u8));

    let mut parser = ProgressParser::new(duration);
    cmd.execute_with_stderr_lines(
        |line| {
            if let Some(pct) = parser.push_line(line) {
                // Progress is lossy; a full channel just drops the update.
                let _ = tx.try_send(TranscodeEvent::Progress(pct));
            }
        },
        Some(req.cancel.clone()),
    )
    .await?;

    let metadata = tokio::fs::metadata(&req.output_path).await.map_err(|e| {
        soundpress_core::Error::tool("ffmpeg", format!("output file missing after encode: {e}"))
    })?;

    Ok(metadata.len())
}

/// Incremental parser for ffmpeg `-progress pipe:2` output.
///
/// Key/value lines arrive in blocks terminated by a `progress=` line; a
/// percentage is computed once per block, clamped to the progress band, and
/// only emitted when it advances.
struct ProgressParser {
    duration_us: Option<f64>,
    out_time_us: Option<i64>,
    last_pct: u8,
}

impl ProgressParser {
    fn new(duration_secs: Option<f64>) -> Self {
        Self {
            duration_us: duration_secs.map(|d| d * 1_000_000.0),
            out_time_us: None,
            last_pct: 0,
        }
    }

    fn push_line(&mut self, line: &str) -> Option<u8> {
        if let Some(val) = line.strip_prefix("out_time_us=") {
            self.out_time_us = val.trim().parse::<i64>().ok();
            None
        } else if line.starts_with("progress=") {
            // End of a progress block.
            let duration_us = self.duration_us?;
            let out_us = self.out_time_us? as f64;
            let pct = (out_us / duration_us * 100.0).clamp(PROGRESS_FLOOR, PROGRESS_CEIL) as u8;
            if pct > self.last_pct {
                self.last_pct = pct;
                Some(pct)
            } else {
                None
            }
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(parser: &mut ProgressParser, out_time_us: i64) -> Option<u8> {
        assert!(parser.push_line(&format!("out_time_us={out_time_us}")).is_none());
        parser.push_line("progress=continue")
    }

    #[test]
    fn percent_tracks_out_time() {
        let mut parser = ProgressParser::new(Some(100.0));
        assert_eq!(feed(&mut parser, 50_000_000), Some(50));
        assert_eq!(feed(&mut parser, 80_000_000), Some(80));
    }

    #[test]
    fn percent_is_clamped_to_band() {
        let mut parser = ProgressParser::new(Some(100.0));
        assert_eq!(feed(&mut parser, 1_000_000), Some(5));
        assert_eq!(feed(&mut parser, 99_000_000), Some(95));
        // Past the end of the source; still capped.
        assert_eq!(feed(&mut parser, 150_000_000), None);
    }

    #[test]
    fn regressing_out_time_is_ignored() {
        let mut parser = ProgressParser::new(Some(100.0));
        assert_eq!(feed(&mut parser, 60_000_000), Some(60));
        assert_eq!(feed(&mut parser, 40_000_000), None);
        assert_eq!(feed(&mut parser, 60_000_000), None);
        assert_eq!(feed(&mut parser, 61_000_000), Some(61));
    }

    #[test]
    fn no_duration_means_no_progress() {
        let mut parser = ProgressParser::new(None);
        assert_eq!(feed(&mut parser, 50_000_000), None);
    }

    #[test]
    fn unrelated_lines_are_ignored() {
        let mut parser = ProgressParser::new(Some(100.0));
        assert!(parser.push_line("bitrate= 128.0kbits/s").is_none());
        assert!(parser.push_line("speed=12.3x").is_none());
        assert!(parser.push_line("out_time_us=garbage").is_none());
        assert!(parser.push_line("progress=continue").is_none());
    }

    async fn collect_terminals(mut rx: mpsc::Receiver<TranscodeEvent>) -> Vec<TranscodeEvent> {
        let mut terminals = Vec::new();
        while let Some(event) = rx.recv().await {
            if event.is_terminal() {
                terminals.push(event);
            }
        }
        terminals
    }

    #[tokio::test]
    async fn missing_ffmpeg_produces_one_failed_event() {
        let dir = tempfile::tempdir().unwrap();
        let transcoder = FfmpegTranscoder::new(Arc::new(ToolRegistry::empty()));

        let rx = transcoder
            .start(TranscodeRequest {
                job_id: JobId::new(),
                input_path: dir.path().join("in.wav"),
                output_path: dir.path().join("out.mp3"),
                preset: *crate::presets::get("medium").unwrap(),
                timeout: Duration::from_secs(5),
                cancel: CancellationToken::new(),
            })
            .await;

        let terminals = collect_terminals(rx).await;
        assert_eq!(terminals.len(), 1);
        match &terminals[0] {
            TranscodeEvent::Failed(msg) => {
                assert!(msg.contains("ffmpeg"), "unexpected message: {msg}")
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn hung_encoder_times_out_with_failed_event() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fake_ffmpeg = dir.path().join("ffmpeg");
        std::fs::write(&fake_ffmpeg, "#!/bin/sh\nsleep 5\n").unwrap();
        std::fs::set_permissions(&fake_ffmpeg, std::fs::Permissions::from_mode(0o755)).unwrap();

        let input = dir.path().join("in.wav");
        std::fs::write(&input, b"RIFF fake audio payload").unwrap();

        let tools_config = soundpress_core::config::ToolsConfig {
            ffmpeg_path: Some(fake_ffmpeg),
            ffprobe_path: Some(dir.path().join("no-ffprobe")),
        };
        let transcoder = FfmpegTranscoder::new(Arc::new(ToolRegistry::discover(&tools_config)));

        let rx = transcoder
            .start(TranscodeRequest {
                job_id: JobId::new(),
                input_path: input,
                output_path: dir.path().join("out.mp3"),
                preset: *crate::presets::get("low").unwrap(),
                timeout: Duration::from_millis(200),
                cancel: CancellationToken::new(),
            })
            .await;

        let terminals = collect_terminals(rx).await;
        assert_eq!(terminals.len(), 1);
        match &terminals[0] {
            TranscodeEvent::Failed(msg) => {
                assert!(msg.contains("timed out"), "unexpected message: {msg}")
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn terminal_event_detection() {
        assert!(!TranscodeEvent::Progress(50).is_terminal());
        assert!(TranscodeEvent::Failed("x".into()).is_terminal());
        assert!(TranscodeEvent::Completed {
            output_path: PathBuf::from("/tmp/out.mp3"),
            output_bytes: 1,
        }
        .is_terminal());
    }
}
