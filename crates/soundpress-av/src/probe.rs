//! ffprobe-based duration lookup.
//!
//! Shells out to `ffprobe -v quiet -print_format json -show_format` and
//! extracts the container duration. Progress percentages are computed
//! against this value; when it cannot be determined the transcode still
//! runs, just without meaningful progress.

use std::path::Path;

use serde::Deserialize;

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
}

/// Probe the duration of a media file in seconds.
///
/// Returns `Ok(None)` when ffprobe succeeds but reports no duration (some
/// streams legitimately lack one).
pub async fn duration_secs(
    tools: &ToolRegistry,
    path: &Path,
) -> soundpress_core::Result<Option<f64>> {
    let ffprobe = tools.require("ffprobe")?;

    let mut cmd = ToolCommand::new(ffprobe.path.clone());
    cmd.args(["-v", "quiet", "-print_format", "json", "-show_format"]);
    cmd.arg(path.to_string_lossy().as_ref());

    let output = cmd.execute().await?;
    let parsed: FfprobeOutput = serde_json::from_str(&output.stdout).map_err(|e| {
        soundpress_core::Error::tool("ffprobe", format!("JSON parse error: {e}"))
    })?;

    Ok(parsed
        .format
        .duration
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| *d > 0.0))
}
