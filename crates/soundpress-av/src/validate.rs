//! Input file validation.
//!
//! Uploads land on disk under a server-generated name, so the extension
//! check runs against the client-supplied original filename. The on-disk
//! path is only checked for existence and regular-file-ness.

use std::path::Path;

use soundpress_core::{Error, Result};

/// Extensions accepted for compression input. Container formats that can
/// carry audio (mp4, webm) are accepted; ffmpeg extracts the audio stream.
const VALID_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "ogg", "flac", "aac", "mp4", "webm"];

/// Whether the original filename carries a supported audio extension.
pub fn is_supported_audio(original_name: &str) -> bool {
    Path::new(original_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let lower = e.to_ascii_lowercase();
            VALID_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

/// Validate a stored upload before it is handed to ffmpeg: the file must
/// exist as a regular file and the original name must carry a supported
/// extension.
pub async fn validate_input(path: &Path, original_name: &str) -> Result<()> {
    let metadata = tokio::fs::metadata(path).await.map_err(|e| {
        Error::Validation(format!("uploaded file is not readable: {e}"))
    })?;

    if !metadata.is_file() {
        return Err(Error::Validation("uploaded path is not a regular file".into()));
    }

    if metadata.len() == 0 {
        return Err(Error::Validation("uploaded file is empty".into()));
    }

    if !is_supported_audio(original_name) {
        return Err(Error::Validation(format!(
            "unsupported file type: {original_name}"
        )));
    }

    Ok(())
}
