//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which builds a full [`AppContext`] around a
//! scripted [`MockTranscoder`] and a temporary upload directory. The
//! [`TestHarness::with_server`] constructor starts Axum on a random port
//! for HTTP-level testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use soundpress_av::{ToolRegistry, TranscodeEvent, TranscodeRequest, Transcoder};
use soundpress_core::config::Config;
use soundpress_server::context::AppContext;
use soundpress_server::router::build_router;

/// Scripted behavior for the [`MockTranscoder`].
#[derive(Debug, Clone)]
pub enum MockBehavior {
    /// Emit the progress values, write an output file of the given size,
    /// then complete.
    Succeed {
        progress: Vec<u8>,
        output_bytes: usize,
        delay: Duration,
    },
    /// Emit the progress values, then fail with the message.
    Fail { progress: Vec<u8>, message: String },
    /// Write a partial output file of the given size, then fail with the
    /// message, as a killed or timed-out encoder would.
    FailWithPartial {
        output_bytes: usize,
        message: String,
    },
}

impl MockBehavior {
    pub fn quick_success() -> Self {
        MockBehavior::Succeed {
            progress: vec![5, 40, 80],
            output_bytes: 512,
            delay: Duration::ZERO,
        }
    }

    pub fn slow_success(delay: Duration) -> Self {
        MockBehavior::Succeed {
            progress: vec![5, 50],
            output_bytes: 256,
            delay,
        }
    }

    pub fn failure(message: &str) -> Self {
        MockBehavior::Fail {
            progress: vec![5],
            message: message.to_string(),
        }
    }

    pub fn failure_with_partial_output(message: &str) -> Self {
        MockBehavior::FailWithPartial {
            output_bytes: 128,
            message: message.to_string(),
        }
    }
}

/// A [`Transcoder`] that follows a script instead of running ffmpeg.
pub struct MockTranscoder {
    behavior: MockBehavior,
}

impl MockTranscoder {
    pub fn new(behavior: MockBehavior) -> Self {
        Self { behavior }
    }
}

#[async_trait]
impl Transcoder for MockTranscoder {
    async fn start(&self, req: TranscodeRequest) -> mpsc::Receiver<TranscodeEvent> {
        let (tx, rx) = mpsc::channel(32);
        let behavior = self.behavior.clone();

        tokio::spawn(async move {
            match behavior {
                MockBehavior::Succeed {
                    progress,
                    output_bytes,
                    delay,
                } => {
                    for pct in progress {
                        let _ = tx.send(TranscodeEvent::Progress(pct)).await;
                    }
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let data = vec![0u8; output_bytes];
                    tokio::fs::write(&req.output_path, &data)
                        .await
                        .expect("mock output write failed");
                    let _ = tx
                        .send(TranscodeEvent::Completed {
                            output_path: req.output_path.clone(),
                            output_bytes: output_bytes as u64,
                        })
                        .await;
                }
                MockBehavior::Fail { progress, message } => {
                    for pct in progress {
                        let _ = tx.send(TranscodeEvent::Progress(pct)).await;
                    }
                    let _ = tx.send(TranscodeEvent::Failed(message)).await;
                }
                MockBehavior::FailWithPartial {
                    output_bytes,
                    message,
                } => {
                    let _ = tx.send(TranscodeEvent::Progress(5)).await;
                    let data = vec![0u8; output_bytes];
                    tokio::fs::write(&req.output_path, &data)
                        .await
                        .expect("mock partial write failed");
                    let _ = tx.send(TranscodeEvent::Failed(message)).await;
                }
            }
        });

        rx
    }
}

/// Test harness wrapping a fully-constructed [`AppContext`].
pub struct TestHarness {
    pub ctx: AppContext,
    // Held so the upload directory survives the test.
    _dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new harness with default configuration.
    pub fn new(behavior: MockBehavior) -> Self {
        Self::with_config(Config::default(), behavior)
    }

    /// Create a new harness with a custom configuration.
    pub fn with_config(mut config: Config, behavior: MockBehavior) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        config.jobs.upload_dir = dir.path().join("uploads");
        std::fs::create_dir_all(&config.jobs.upload_dir).expect("failed to create upload dir");

        let tools = Arc::new(ToolRegistry::discover(&config.tools));
        let transcoder = Arc::new(MockTranscoder::new(behavior));
        let ctx = AppContext::new(Arc::new(config), transcoder, tools);

        Self { ctx, _dir: dir }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server(behavior: MockBehavior) -> (Self, SocketAddr) {
        Self::with_server_config(Config::default(), behavior).await
    }

    /// Start an Axum server with custom config on a random port.
    pub async fn with_server_config(
        config: Config,
        behavior: MockBehavior,
    ) -> (Self, SocketAddr) {
        let harness = Self::with_config(config, behavior);
        let app = build_router(harness.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }
}

/// Submit a small multipart upload. `preset` is omitted from the form when
/// `None`, exercising the server-side default.
pub async fn submit_upload(
    client: &reqwest::Client,
    addr: SocketAddr,
    file_name: &str,
    preset: Option<&str>,
) -> reqwest::Response {
    let part = reqwest::multipart::Part::bytes(b"RIFF fake audio payload".to_vec())
        .file_name(file_name.to_string());
    let mut form = reqwest::multipart::Form::new().part("file", part);
    if let Some(p) = preset {
        form = form.text("preset", p.to_string());
    }

    client
        .post(format!("http://{addr}/api/jobs"))
        .multipart(form)
        .send()
        .await
        .expect("submit request failed")
}

/// Poll a job until it reaches a terminal state, returning the final body.
pub async fn wait_for_terminal(
    client: &reqwest::Client,
    addr: SocketAddr,
    job_id: &str,
) -> serde_json::Value {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);

    loop {
        let resp = client
            .get(format!("http://{addr}/api/jobs/{job_id}"))
            .send()
            .await
            .expect("status request failed");
        assert_eq!(resp.status(), 200);
        let body: serde_json::Value = resp.json().await.expect("invalid status body");

        match body["status"].as_str() {
            Some("completed") | Some("failed") => return body,
            _ => {}
        }

        assert!(
            tokio::time::Instant::now() < deadline,
            "job {job_id} did not reach a terminal state: {body}"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
