use std::{fmt, path::PathBuf};

use serde::{Deserialize, Serialize};

use crate::{LipSyncError, Result};

/// Scene frame rate, expressed the way editors store it: `fps / fps_base`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameRate {
    pub fps: u32,
    pub fps_base: f64,
}

impl FrameRate {
    pub fn new(fps: u32, fps_base: f64) -> Result<Self> {
        if fps == 0 {
            return Err(LipSyncError::config("fps must be positive"));
        }
        if !fps_base.is_finite() || fps_base <= 0.0 {
            return Err(LipSyncError::config(format!(
                "fps_base must be a positive number, got {fps_base}"
            )));
        }
        Ok(Self { fps, fps_base })
    }

    pub fn frames_per_second(&self) -> f64 {
        self.fps as f64 / self.fps_base
    }

    /// Converts a recognizer start time in hundredths of a second to a frame
    /// offset. Halfway values round to the even frame.
    pub fn frame_for_start(&self, start_centis: i64) -> i64 {
        (self.frames_per_second() * (start_centis as f64 / 100.0)).round_ties_even() as i64
    }
}

impl Default for FrameRate {
    fn default() -> Self {
        Self {
            fps: 24,
            fps_base: 1.0,
        }
    }
}

/// Opaque handle of an audio clip placed on the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClipId(u64);

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "clip#{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioClip {
    pub id: ClipId,
    pub name: String,
    pub path: PathBuf,
    pub channel: u32,
    pub frame_start: i64,
    pub frame_end: i64,
}

/// Minimal sequence editor: audio clips stacked on channels plus the scene's
/// frame range and playhead.
#[derive(Debug, Clone)]
pub struct Timeline {
    pub rate: FrameRate,
    pub frame_start: i64,
    pub frame_end: i64,
    pub current_frame: i64,
    clips: Vec<AudioClip>,
    next_id: u64,
}

impl Timeline {
    pub fn new(rate: FrameRate, frame_start: i64, frame_end: i64) -> Self {
        Self {
            rate,
            frame_start,
            frame_end,
            current_frame: frame_start,
            clips: Vec::new(),
            next_id: 1,
        }
    }

    pub fn clips(&self) -> &[AudioClip] {
        &self.clips
    }

    pub fn clip(&self, id: ClipId) -> Option<&AudioClip> {
        self.clips.iter().find(|clip| clip.id == id)
    }

    /// Lowest channel, starting at 1, not occupied by any clip.
    pub fn free_channel(&self) -> u32 {
        let mut channels: Vec<u32> = self.clips.iter().map(|clip| clip.channel).collect();
        channels.sort_unstable();

        let mut selected = 1;
        for channel in channels {
            if channel > selected {
                break;
            }
            selected = channel + 1;
        }
        selected
    }

    /// Places a clip of `length` frames (at least one) on a free channel.
    pub fn place_clip(
        &mut self,
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        frame_start: i64,
        length: i64,
    ) -> ClipId {
        let id = ClipId(self.next_id);
        self.next_id += 1;

        let clip = AudioClip {
            id,
            name: name.into(),
            path: path.into(),
            channel: self.free_channel(),
            frame_start,
            frame_end: frame_start + length.max(1),
        };
        tracing::debug!(%id, channel = clip.channel, frame_start, "placed audio clip");
        self.clips.push(clip);
        id
    }

    pub fn remove_clip(&mut self, id: ClipId) -> Option<AudioClip> {
        let index = self.clips.iter().position(|clip| clip.id == id)?;
        Some(self.clips.remove(index))
    }

    /// Stretches the scene end to the last frame covered by any clip.
    pub fn fit_end_to_clips(&mut self) {
        if let Some(end) = self.clips.iter().map(|clip| clip.frame_end).max() {
            self.frame_end = end;
        }
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new(FrameRate::default(), 1, 250)
    }
}

/// Snapshot of the scene frame range taken before any audio is added.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimelineBounds {
    original: Option<(i64, i64)>,
}

impl TimelineBounds {
    /// Records the current range. Later calls are no-ops until [`reset`].
    ///
    /// [`reset`]: TimelineBounds::reset
    pub fn capture(&mut self, timeline: &Timeline) {
        if self.original.is_none() {
            self.original = Some((timeline.frame_start, timeline.frame_end));
        }
    }

    pub fn is_captured(&self) -> bool {
        self.original.is_some()
    }

    pub fn original(&self) -> Option<(i64, i64)> {
        self.original
    }

    pub fn restore(&self, timeline: &mut Timeline) {
        if let Some((start, end)) = self.original {
            timeline.frame_start = start;
            timeline.frame_end = end;
        }
    }

    pub fn reset(&mut self) {
        self.original = None;
    }
}
