use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{FrameRate, LipSyncError, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub timeline: TimelineConfig,
    pub rig: RigConfig,
    pub recognizer: RecognizerConfig,
    /// Location of the phoneme map JSON file.
    pub phoneme_map: Option<PathBuf>,
}

impl AppConfig {
    /// Reads a JSON configuration file. A missing or malformed file is a
    /// configuration error rather than an IO error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|err| {
            LipSyncError::config(format!("cannot read config `{}`: {err}", path.display()))
        })?;
        Self::parse(&raw, &path.display().to_string())
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        Self::parse(raw, "config")
    }

    fn parse(raw: &str, origin: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|err| LipSyncError::config(format!("malformed `{origin}`: {err}")))?;
        config.timeline.frame_rate()?;
        Ok(config)
    }

    /// Returns the phoneme map path or fails when none was configured.
    pub fn phoneme_map_path(&self) -> Result<&Path> {
        self.phoneme_map
            .as_deref()
            .ok_or_else(|| LipSyncError::config("no phoneme map configured"))
    }
}

/// Frame rate and default frame range of the timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    pub fps: u32,
    pub fps_base: f64,
    pub frame_start: i64,
    pub frame_end: i64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            fps: 24,
            fps_base: 1.0,
            frame_start: 1,
            frame_end: 250,
        }
    }
}

impl TimelineConfig {
    pub fn frame_rate(&self) -> Result<FrameRate> {
        FrameRate::new(self.fps, self.fps_base)
    }
}

/// Describes the skeletal rig that receives the phoneme poses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    pub phoneme_rig: String,
    /// Prepended to every bone name found in the phoneme map.
    pub bone_prefix: String,
    /// Explicit rig bones. When empty the bones referenced by the phoneme map
    /// are used.
    pub bones: Vec<String>,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            phoneme_rig: "MBLab_skeleton_phoneme_rig".to_string(),
            bone_prefix: "ph_".to_string(),
            bones: Vec::new(),
        }
    }
}

/// External speech recognizer invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognizerConfig {
    pub program: Option<PathBuf>,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for RecognizerConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            timeout_secs: 120,
        }
    }
}

impl RecognizerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
