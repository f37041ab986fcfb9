use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{ClipId, LipSyncError, Result};

/// A recognized phoneme pinned to a timeline frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marker {
    pub label: String,
    pub time: i64,
}

impl Marker {
    pub fn new(label: impl Into<String>, time: i64) -> Self {
        Self {
            label: label.into(),
            time,
        }
    }
}

/// An audio clip on the timeline together with its phoneme markers.
///
/// Markers are kept sorted by time. Markers sharing a frame keep their
/// insertion order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sequence {
    clip: ClipId,
    markers: Vec<Marker>,
}

impl Sequence {
    pub fn new(clip: ClipId) -> Self {
        Self {
            clip,
            markers: Vec::new(),
        }
    }

    pub fn clip(&self) -> ClipId {
        self.clip
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn add_marker(&mut self, marker: Marker) {
        let index = self.markers.partition_point(|m| m.time <= marker.time);
        self.markers.insert(index, marker);
    }

    pub fn clear_markers(&mut self) -> Vec<Marker> {
        std::mem::take(&mut self.markers)
    }

    /// First marker exactly at `time`, with its ordinal position.
    pub fn marker_at(&self, time: i64) -> Option<(usize, &Marker)> {
        let index = self.markers.partition_point(|m| m.time < time);
        self.markers
            .get(index)
            .filter(|m| m.time == time)
            .map(|m| (index, m))
    }

    /// Smallest marker time strictly after `time`.
    pub fn next_after(&self, time: i64) -> Option<i64> {
        let index = self.markers.partition_point(|m| m.time <= time);
        self.markers.get(index).map(|m| m.time)
    }

    /// Largest marker time strictly before `time`.
    pub fn prev_before(&self, time: i64) -> Option<i64> {
        let index = self.markers.partition_point(|m| m.time < time);
        index.checked_sub(1).map(|i| self.markers[i].time)
    }
}

/// Registry of every live sequence keyed by its clip.
#[derive(Debug, Default, Clone)]
pub struct SequenceIndex {
    sequences: BTreeMap<ClipId, Sequence>,
}

impl SequenceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn add(&mut self, clip: ClipId) -> Result<&mut Sequence> {
        if self.sequences.contains_key(&clip) {
            let message = format!("{clip} already has a sequence");
            return Err(LipSyncError::Duplicate(message));
        }
        Ok(self.sequences.entry(clip).or_insert(Sequence::new(clip)))
    }

    /// Drops the sequence and hands back its markers. Keyframes derived from
    /// them are left untouched.
    pub fn remove(&mut self, clip: ClipId) -> Option<Sequence> {
        self.sequences.remove(&clip)
    }

    pub fn find(&self, clip: ClipId) -> Option<&Sequence> {
        self.sequences.get(&clip)
    }

    pub fn get(&self, clip: ClipId) -> Result<&Sequence> {
        self.find(clip).ok_or_else(|| not_found(clip))
    }

    pub fn mark(&mut self, clip: ClipId, label: impl Into<String>, time: i64) -> Result<()> {
        let sequence = self
            .sequences
            .get_mut(&clip)
            .ok_or_else(|| not_found(clip))?;
        sequence.add_marker(Marker::new(label, time));
        Ok(())
    }

    /// Clears the markers of `clip` while keeping the sequence registered.
    pub fn unmark_all(&mut self, clip: ClipId) -> Result<Vec<Marker>> {
        let sequence = self
            .sequences
            .get_mut(&clip)
            .ok_or_else(|| not_found(clip))?;
        Ok(sequence.clear_markers())
    }

    pub fn next_marker(&self, clip: ClipId, current: i64) -> Result<Option<i64>> {
        Ok(self.get(clip)?.next_after(current))
    }

    pub fn prev_marker(&self, clip: ClipId, current: i64) -> Result<Option<i64>> {
        Ok(self.get(clip)?.prev_before(current))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sequence> {
        self.sequences.values()
    }
}

fn not_found(clip: ClipId) -> LipSyncError {
    LipSyncError::NotFound(format!("no sequence for {clip}"))
}
