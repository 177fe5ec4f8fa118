//! Built-in compression presets.
//!
//! Each preset maps to a fixed set of ffmpeg arguments for MP3 output via
//! libmp3lame. The set is closed; clients select a preset by name and cannot
//! supply their own encoder arguments.

use serde::Serialize;

/// A named compression profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Preset {
    /// Stable identifier clients send in the `preset` form field.
    pub name: &'static str,
    /// Human-readable description for preset listings.
    pub label: &'static str,
    /// Target bitrate in kbit/s.
    pub bitrate_kbps: u32,
    /// Output sample rate in Hz.
    pub sample_rate: u32,
    /// Output channel count.
    pub channels: u32,
    /// libmp3lame VBR quality (0 best, 9 worst).
    pub vbr_quality: u32,
}

impl Preset {
    /// The encoder arguments this preset contributes to the ffmpeg
    /// invocation, excluding input/output paths.
    pub fn ffmpeg_args(&self) -> Vec<String> {
        vec![
            "-b:a".into(),
            format!("{}k", self.bitrate_kbps),
            "-ar".into(),
            self.sample_rate.to_string(),
            "-ac".into(),
            self.channels.to_string(),
            "-q:a".into(),
            self.vbr_quality.to_string(),
        ]
    }
}

const PRESETS: &[Preset] = &[
    Preset {
        name: "high",
        label: "High Quality (192k)",
        bitrate_kbps: 192,
        sample_rate: 44100,
        channels: 2,
        vbr_quality: 2,
    },
    Preset {
        name: "medium",
        label: "Medium Quality (128k)",
        bitrate_kbps: 128,
        sample_rate: 44100,
        channels: 2,
        vbr_quality: 4,
    },
    Preset {
        name: "low",
        label: "Low Quality (64k)",
        bitrate_kbps: 64,
        sample_rate: 44100,
        channels: 2,
        vbr_quality: 6,
    },
    Preset {
        name: "voice",
        label: "Voice (64k mono)",
        bitrate_kbps: 64,
        sample_rate: 24000,
        channels: 1,
        vbr_quality: 6,
    },
    Preset {
        name: "podcast",
        label: "Podcast (96k)",
        bitrate_kbps: 96,
        sample_rate: 44100,
        channels: 2,
        vbr_quality: 5,
    },
];

/// Preset used when the client omits the `preset` field.
pub const DEFAULT_PRESET: &str = "medium";

/// Look up a preset by name.
pub fn get(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.name == name)
}

/// Whether `name` refers to a known preset.
pub fn is_valid(name: &str) -> bool {
    get(name).is_some()
}

/// All available presets, in listing order.
pub fn all() -> &'static [Preset] {
    PRESETS
}
