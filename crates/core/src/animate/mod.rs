use std::{
    cmp::Ordering,
    collections::{BTreeMap, BTreeSet},
    fmt,
};

use serde::{Deserialize, Serialize};

use crate::{LipSyncError, Marker, PhonemeMapper, PhonemeRig, Result, Sequence};

/// Keyframe position in (possibly fractional) frames.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyTime(pub f64);

impl KeyTime {
    pub fn frame(frame: i64) -> Self {
        Self(frame as f64)
    }

    /// Rest key written ahead of the first marker: halfway between frame 1
    /// and the marker. The exact half is kept, so even marker frames land on
    /// a subframe (frame 4 gives 1.5).
    pub fn pre_roll(marker_time: i64) -> Self {
        Self((marker_time - 1) as f64 / 2.0)
    }
}

impl PartialEq for KeyTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyTime {}

impl PartialOrd for KeyTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for KeyTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Destination of pose channel writes.
pub trait PoseSink {
    /// Clears any pose selection before a bulk write.
    fn deselect_all(&mut self);

    /// Sets `bone`'s channel to `value` and keys it at `time`.
    fn set_key(&mut self, bone: &str, time: KeyTime, value: f32);

    /// Removes the key of `bone` at `time`. Returns whether one existed.
    fn delete_key(&mut self, bone: &str, time: KeyTime) -> bool;
}

/// In-memory keyframe storage, one curve per bone.
#[derive(Debug, Default, Clone)]
pub struct KeyframeStore {
    curves: BTreeMap<String, BTreeMap<KeyTime, f32>>,
    selected: BTreeSet<String>,
}

impl KeyframeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn value_at(&self, bone: &str, time: KeyTime) -> Option<f32> {
        self.curves.get(bone)?.get(&time).copied()
    }

    /// Keys of `bone` in time order.
    pub fn keys(&self, bone: &str) -> Vec<(KeyTime, f32)> {
        self.curves
            .get(bone)
            .map(|curve| curve.iter().map(|(t, v)| (*t, *v)).collect())
            .unwrap_or_default()
    }

    pub fn bones(&self) -> impl Iterator<Item = &str> {
        self.curves.keys().map(String::as_str)
    }

    pub fn key_count(&self) -> usize {
        self.curves.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.key_count() == 0
    }

    pub fn selected(&self) -> impl Iterator<Item = &str> {
        self.selected.iter().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.curves.clear();
        self.selected.clear();
    }

    /// Serializes every curve as `{ "<bone>": [[time, value], ...] }`.
    pub fn to_json_pretty(&self) -> Result<String> {
        let export: BTreeMap<&str, Vec<(f64, f32)>> = self
            .curves
            .iter()
            .filter(|(_, curve)| !curve.is_empty())
            .map(|(bone, curve)| {
                (
                    bone.as_str(),
                    curve.iter().map(|(t, v)| (t.0, *v)).collect(),
                )
            })
            .collect();
        Ok(serde_json::to_string_pretty(&export)?)
    }
}

impl PoseSink for KeyframeStore {
    fn deselect_all(&mut self) {
        self.selected.clear();
    }

    fn set_key(&mut self, bone: &str, time: KeyTime, value: f32) {
        self.selected.insert(bone.to_string());
        self.curves
            .entry(bone.to_string())
            .or_default()
            .insert(time, value);
    }

    fn delete_key(&mut self, bone: &str, time: KeyTime) -> bool {
        self.curves
            .get_mut(bone)
            .map(|curve| curve.remove(&time).is_some())
            .unwrap_or(false)
    }
}

/// Tally of a bulk animation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnimationReport {
    pub animated: usize,
    pub skipped: usize,
}

/// Turns phoneme markers into pose keyframes on a rig.
#[derive(Debug, Clone, Copy)]
pub struct MarkerAnimator<'a> {
    mapper: &'a PhonemeMapper,
    rig: &'a PhonemeRig,
}

impl<'a> MarkerAnimator<'a> {
    pub fn new(mapper: &'a PhonemeMapper, rig: &'a PhonemeRig) -> Self {
        Self { mapper, rig }
    }

    /// Keys `marker`, which must belong to `sequence`.
    ///
    /// Every rig bone is reset to zero at the marker (and, for the first
    /// marker, at the pre-roll time too) before the mapped weights are keyed.
    /// Returns `MappingMiss` when the label has no pose; the neutral keys are
    /// still written in that case.
    pub fn animate(
        &self,
        marker: &Marker,
        sequence: &Sequence,
        sink: &mut dyn PoseSink,
    ) -> Result<usize> {
        let idx = sequence
            .markers()
            .iter()
            .position(|m| m == marker)
            .ok_or_else(|| {
                LipSyncError::NotFound(format!(
                    "marker `{}` at frame {} is not part of {}",
                    marker.label,
                    marker.time,
                    sequence.clip()
                ))
            })?;
        self.animate_index(sequence, idx, sink)
    }

    /// Keys every marker of `sequence` in stored order. Unmapped labels are
    /// logged and skipped.
    pub fn animate_all(&self, sequence: &Sequence, sink: &mut dyn PoseSink) -> AnimationReport {
        sink.deselect_all();

        let mut report = AnimationReport::default();
        for idx in 0..sequence.markers().len() {
            match self.animate_index(sequence, idx, sink) {
                Ok(_) => report.animated += 1,
                Err(err) => {
                    tracing::warn!(%err, "skipping marker");
                    report.skipped += 1;
                }
            }
        }
        tracing::info!(
            clip = %sequence.clip(),
            animated = report.animated,
            skipped = report.skipped,
            "animated sequence"
        );
        report
    }

    /// Keys the marker sitting exactly on `frame`, if there is one.
    pub fn animate_at_frame(
        &self,
        sequence: &Sequence,
        frame: i64,
        sink: &mut dyn PoseSink,
    ) -> Result<Option<usize>> {
        let Some((idx, _)) = sequence.marker_at(frame) else {
            return Ok(None);
        };
        self.animate_index(sequence, idx, sink).map(Some)
    }

    /// Removes every key [`animate_all`] could have written for `sequence`.
    ///
    /// [`animate_all`]: MarkerAnimator::animate_all
    pub fn delete_all_keyframes(&self, sequence: &Sequence, sink: &mut dyn PoseSink) -> usize {
        let mut deleted = 0;
        for (idx, marker) in sequence.markers().iter().enumerate() {
            if idx == 0 {
                deleted += self.delete_keys_at(KeyTime::pre_roll(marker.time), sink);
            }
            deleted += self.delete_keys_at(KeyTime::frame(marker.time), sink);
        }
        deleted
    }

    /// Removes the key of every rig bone at `time`.
    pub fn delete_keys_at(&self, time: KeyTime, sink: &mut dyn PoseSink) -> usize {
        self.rig
            .bones()
            .iter()
            .filter(|bone| sink.delete_key(bone, time))
            .count()
    }

    fn animate_index(
        &self,
        sequence: &Sequence,
        idx: usize,
        sink: &mut dyn PoseSink,
    ) -> Result<usize> {
        let marker = &sequence.markers()[idx];
        if idx == 0 {
            self.reset_pose(KeyTime::pre_roll(marker.time), sink);
        }
        let time = KeyTime::frame(marker.time);
        self.reset_pose(time, sink);

        let pose = self
            .mapper
            .lookup(&marker.label)
            .filter(|pose| !pose.is_empty())
            .ok_or_else(|| LipSyncError::MappingMiss(marker.label.clone()))?;

        let mut written = 0;
        for target in pose {
            let bone = self.rig.bone_name(&target.bone);
            if !self.rig.has_bone(&bone) {
                tracing::warn!(%bone, label = %marker.label, "rig has no such bone");
                continue;
            }
            tracing::debug!(%bone, frame = marker.time, weight = target.weight, "pose key");
            sink.set_key(&bone, time, target.weight);
            written += 1;
        }
        Ok(written)
    }

    fn reset_pose(&self, time: KeyTime, sink: &mut dyn PoseSink) {
        for bone in self.rig.bones() {
            sink.set_key(bone, time, 0.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BoneWeight, ClipId, PhonemeMap, Timeline};

    fn mapper() -> PhonemeMapper {
        let mut map = PhonemeMap::new();
        map.insert(
            "ph_AA".to_string(),
            vec![BoneWeight::new("jaw", 0.8), BoneWeight::new("lips", 0.3)],
        );
        map.insert("ph_EE".to_string(), vec![BoneWeight::new("lips", 1.0)]);
        PhonemeMapper::new(map)
    }

    fn clip() -> ClipId {
        Timeline::default().place_clip("voice.wav", "voice.wav", 1, 100)
    }

    fn sequence(markers: &[(&str, i64)]) -> Sequence {
        let mut sequence = Sequence::new(clip());
        for (label, time) in markers {
            sequence.add_marker(Marker::new(*label, *time));
        }
        sequence
    }

    #[test]
    fn first_marker_gets_pre_roll_and_pose() {
        let mapper = mapper();
        let rig = PhonemeRig::from_mapper("rig", "", &mapper);
        let animator = MarkerAnimator::new(&mapper, &rig);
        let sequence = sequence(&[("ph_AA", 5), ("ph_EE", 9)]);
        let mut store = KeyframeStore::new();

        let written = animator
            .animate(&sequence.markers()[0], &sequence, &mut store)
            .unwrap();
        assert_eq!(written, 2);
        assert_eq!(store.value_at("jaw", KeyTime(2.0)), Some(0.0));
        assert_eq!(store.value_at("lips", KeyTime(2.0)), Some(0.0));
        assert_eq!(store.value_at("jaw", KeyTime::frame(5)), Some(0.8));
        assert_eq!(store.value_at("lips", KeyTime::frame(5)), Some(0.3));
        assert_eq!(store.key_count(), 4);
    }

    #[test]
    fn later_markers_reset_unused_bones() {
        let mapper = mapper();
        let rig = PhonemeRig::from_mapper("rig", "", &mapper);
        let animator = MarkerAnimator::new(&mapper, &rig);
        let sequence = sequence(&[("ph_AA", 5), ("ph_EE", 9)]);
        let mut store = KeyframeStore::new();

        animator
            .animate(&sequence.markers()[1], &sequence, &mut store)
            .unwrap();
        assert_eq!(store.value_at("jaw", KeyTime::frame(9)), Some(0.0));
        assert_eq!(store.value_at("lips", KeyTime::frame(9)), Some(1.0));
        assert_eq!(store.value_at("jaw", KeyTime(2.0)), None);
    }

    #[test]
    fn unmapped_label_keeps_neutral_reset() {
        let mapper = mapper();
        let rig = PhonemeRig::from_mapper("rig", "", &mapper);
        let animator = MarkerAnimator::new(&mapper, &rig);
        let sequence = sequence(&[("ph_AA", 5), ("ph_XX", 9), ("ph_EE", 12)]);
        let mut store = KeyframeStore::new();

        let err = animator
            .animate(&sequence.markers()[1], &sequence, &mut store)
            .unwrap_err();
        assert!(matches!(err, LipSyncError::MappingMiss(label) if label == "ph_XX"));
        assert_eq!(store.value_at("jaw", KeyTime::frame(9)), Some(0.0));

        store.clear();
        let report = animator.animate_all(&sequence, &mut store);
        assert_eq!(
            report,
            AnimationReport {
                animated: 2,
                skipped: 1
            }
        );
        assert_eq!(store.value_at("lips", KeyTime::frame(12)), Some(1.0));
    }

    #[test]
    fn pre_roll_keeps_fractional_frames() {
        assert_eq!(KeyTime::pre_roll(1), KeyTime(0.0));
        assert_eq!(KeyTime::pre_roll(4), KeyTime(1.5));
        assert_eq!(KeyTime::pre_roll(0), KeyTime(-0.5));
    }

    #[test]
    fn delete_all_removes_everything_written() {
        let mapper = mapper();
        let rig = PhonemeRig::from_mapper("rig", "ph_", &mapper);
        let animator = MarkerAnimator::new(&mapper, &rig);
        let sequence = sequence(&[("ph_AA", 4), ("ph_EE", 9)]);
        let mut store = KeyframeStore::new();

        animator.animate_all(&sequence, &mut store);
        assert_eq!(store.value_at("ph_jaw", KeyTime::frame(4)), Some(0.8));
        assert_eq!(store.key_count(), 6);

        let deleted = animator.delete_all_keyframes(&sequence, &mut store);
        assert_eq!(deleted, 6);
        assert!(store.is_empty());
    }

    #[test]
    fn animates_only_marker_on_frame() {
        let mapper = mapper();
        let rig = PhonemeRig::from_mapper("rig", "", &mapper);
        let animator = MarkerAnimator::new(&mapper, &rig);
        let sequence = sequence(&[("ph_AA", 5), ("ph_EE", 9)]);
        let mut store = KeyframeStore::new();

        assert_eq!(
            animator.animate_at_frame(&sequence, 7, &mut store).unwrap(),
            None
        );
        assert!(store.is_empty());
        assert_eq!(
            animator.animate_at_frame(&sequence, 9, &mut store).unwrap(),
            Some(1)
        );
        assert_eq!(animator.delete_keys_at(KeyTime::frame(9), &mut store), 2);
    }

    #[test]
    fn bulk_pass_clears_selection_first() {
        let mapper = mapper();
        let rig = PhonemeRig::from_mapper("rig", "", &mapper);
        let animator = MarkerAnimator::new(&mapper, &rig);
        let mut store = KeyframeStore::new();
        store.set_key("brow", KeyTime::frame(1), 1.0);

        animator.animate_all(&sequence(&[("ph_EE", 3)]), &mut store);
        let selected: Vec<_> = store.selected().collect();
        assert_eq!(selected, ["jaw", "lips"]);
    }

    #[test]
    fn exports_curves_as_json() {
        let mut store = KeyframeStore::new();
        store.set_key("jaw", KeyTime::frame(1), 0.5);
        store.set_key("jaw", KeyTime(0.0), 0.0);

        let raw = store.to_json_pretty().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["jaw"][0][0], 0.0);
        assert_eq!(json["jaw"][1][1], 0.5);
    }
}
