//! Builder for executing external tool commands with timeout support.

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Default command timeout: 5 minutes.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// A builder for constructing and executing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use soundpress_av::ToolCommand;
/// use std::path::PathBuf;
///
/// # async fn example() -> soundpress_core::Result<()> {
/// let output = ToolCommand::new(PathBuf::from("ffprobe"))
///     .arg("-v").arg("quiet")
///     .arg("-print_format").arg("json")
///     .arg("-show_format")
///     .arg("/path/to/audio.wav")
///     .execute()
///     .await?;
/// println!("{}", output.stdout);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Execute the command, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// - Returns [`soundpress_core::Error::Tool`] if the process times out
    ///   (message includes the timeout duration).
    /// - Returns [`soundpress_core::Error::Tool`] if the process exits with a
    ///   non-zero status (message includes stderr).
    /// - Returns [`soundpress_core::Error::Tool`] if spawning fails.
    pub async fn execute(&self) -> soundpress_core::Result<ToolOutput> {
        let program_name = self.program_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdout(std::process::Stdio::piped());
        cmd.stderr(std::process::Stdio::piped());
        cmd.kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| soundpress_core::Error::Tool {
            tool: program_name.clone(),
            message: format!("failed to spawn: {e}"),
        })?;

        let result = tokio::time::timeout(self.timeout, child.wait_with_output()).await;

        match result {
            Ok(Ok(output)) => {
                let tool_output = ToolOutput {
                    status: output.status,
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                };

                if !output.status.success() {
                    return Err(soundpress_core::Error::Tool {
                        tool: program_name,
                        message: format!(
                            "exited with status {}: {}",
                            output.status,
                            tool_output.stderr.trim()
                        ),
                    });
                }

                Ok(tool_output)
            }
            Ok(Err(e)) => Err(soundpress_core::Error::Tool {
                tool: program_name,
                message: format!("I/O error waiting for process: {e}"),
            }),
            Err(_elapsed) => Err(soundpress_core::Error::Tool {
                tool: program_name,
                message: format!("timed out after {:?}", self.timeout),
            }),
        }
    }

    /// Execute the command, streaming stderr lines to `on_line` as they
    /// arrive. Used for ffmpeg's `-progress pipe:2` output.
    ///
    /// The child is killed if the timeout elapses or `cancel` fires before
    /// the process exits.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`ToolCommand::execute`], plus
    /// [`soundpress_core::Error::Tool`] with a "cancelled" message when the
    /// cancellation token fires.
    pub async fn execute_with_stderr_lines(
        &self,
        mut on_line: impl FnMut(&str) + Send,
        cancel: Option<CancellationToken>,
    ) -> soundpress_core::Result<ExitStatus> {
        let program_name = self.program_name();

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd.stdout(std::process::Stdio::null());
        cmd.stderr(std::process::Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| soundpress_core::Error::Tool {
            tool: program_name.clone(),
            message: format!("failed to spawn: {e}"),
        })?;

        let stderr = child.stderr.take().ok_or_else(|| soundpress_core::Error::Tool {
            tool: program_name.clone(),
            message: "failed to capture stderr".to_string(),
        })?;
        let mut lines = BufReader::new(stderr).lines();

        let cancel = cancel.unwrap_or_default();
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        // Tail of stderr, kept for the error message on non-zero exit.
        let mut recent_lines: Vec<String> = Vec::new();

        loop {
            tokio::select! {
                line = lines.next_line() => match line {
                    Ok(Some(line)) => {
                        on_line(&line);
                        recent_lines.push(line);
                        if recent_lines.len() > 20 {
                            recent_lines.remove(0);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        let _ = child.kill().await;
                        return Err(soundpress_core::Error::Tool {
                            tool: program_name,
                            message: format!("I/O error reading stderr: {e}"),
                        });
                    }
                },
                _ = &mut deadline => {
                    let _ = child.kill().await;
                    return Err(soundpress_core::Error::Tool {
                        tool: program_name,
                        message: format!("timed out after {:?}", self.timeout),
                    });
                }
                _ = cancel.cancelled() => {
                    let _ = child.kill().await;
                    return Err(soundpress_core::Error::Tool {
                        tool: program_name,
                        message: "cancelled".to_string(),
                    });
                }
            }
        }

        let status = tokio::select! {
            status = child.wait() => status.map_err(|e| soundpress_core::Error::Tool {
                tool: program_name.clone(),
                message: format!("I/O error waiting for process: {e}"),
            })?,
            _ = &mut deadline => {
                let _ = child.kill().await;
                return Err(soundpress_core::Error::Tool {
                    tool: program_name,
                    message: format!("timed out after {:?}", self.timeout),
                });
            }
        };

        if !status.success() {
            // Progress key/value lines are noise in an error message.
            let tail: Vec<&str> = recent_lines
                .iter()
                .map(|s| s.as_str())
                .filter(|l| !l.contains('='))
                .collect();
            return Err(soundpress_core::Error::Tool {
                tool: program_name,
                message: format!("exited with status {}: {}", status, tail.join(" ")),
            });
        }

        Ok(status)
    }
}
