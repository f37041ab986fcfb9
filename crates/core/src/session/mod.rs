use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use crate::{
    recognizer::{recognize_with_timeout, RecognitionOutput, Recognizer},
    AnimationReport, AppConfig, ClipId, KeyTime, KeyframeStore, LipSyncError, MarkerAnimator,
    PhonemeMapper, PhonemeRig, Result, SequenceIndex, Timeline, TimelineBounds,
};

/// Audio to place on the timeline and mark with phonemes.
#[derive(Debug, Clone)]
pub struct MarkRequest {
    pub wave: PathBuf,
    pub transcript: PathBuf,
    pub start_frame: i64,
    /// Clip length in frames. Defaults to one frame past the last phoneme.
    pub length: Option<i64>,
}

impl MarkRequest {
    pub fn new(wave: impl Into<PathBuf>, transcript: impl Into<PathBuf>, start_frame: i64) -> Self {
        Self {
            wave: wave.into(),
            transcript: transcript.into(),
            start_frame,
            length: None,
        }
    }

    pub fn with_length(mut self, length: i64) -> Self {
        self.length = Some(length);
        self
    }

    fn clip_name(&self) -> String {
        self.wave
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.wave.display().to_string())
    }
}

/// Editing session state: everything the lip-sync commands read and write.
#[derive(Debug)]
pub struct LipSyncSession {
    mapper: PhonemeMapper,
    rig: Option<PhonemeRig>,
    sequences: SequenceIndex,
    timeline: Timeline,
    bounds: TimelineBounds,
    keys: KeyframeStore,
    active: Option<ClipId>,
}

impl LipSyncSession {
    /// Starts a session and snapshots the timeline's frame range.
    pub fn new(mapper: PhonemeMapper, rig: Option<PhonemeRig>, timeline: Timeline) -> Self {
        let mut bounds = TimelineBounds::default();
        bounds.capture(&timeline);
        Self {
            mapper,
            rig,
            sequences: SequenceIndex::new(),
            timeline,
            bounds,
            keys: KeyframeStore::new(),
            active: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let mapper = PhonemeMapper::load(config.phoneme_map_path()?)?;
        let rig = PhonemeRig::from_config(&config.rig, &mapper);
        let timeline = Timeline::new(
            config.timeline.frame_rate()?,
            config.timeline.frame_start,
            config.timeline.frame_end,
        );
        tracing::info!(rig = rig.name(), bones = rig.bones().len(), "session started");
        Ok(Self::new(mapper, Some(rig), timeline))
    }

    /// Ends the session, restoring the original frame range, and hands back
    /// the keys written.
    pub fn close(mut self) -> KeyframeStore {
        self.bounds.restore(&mut self.timeline);
        self.keys
    }

    pub fn mapper(&self) -> &PhonemeMapper {
        &self.mapper
    }

    pub fn rig(&self) -> Option<&PhonemeRig> {
        self.rig.as_ref()
    }

    pub fn set_rig(&mut self, rig: Option<PhonemeRig>) {
        self.rig = rig;
    }

    pub fn sequences(&self) -> &SequenceIndex {
        &self.sequences
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn bounds(&self) -> &TimelineBounds {
        &self.bounds
    }

    pub fn keys(&self) -> &KeyframeStore {
        &self.keys
    }

    pub fn active(&self) -> Option<ClipId> {
        self.active
    }

    pub fn select(&mut self, clip: ClipId) -> Result<()> {
        if self.timeline.clip(clip).is_none() {
            return Err(LipSyncError::NotFound(format!("{clip} is not on the timeline")));
        }
        self.active = Some(clip);
        Ok(())
    }

    pub fn deselect(&mut self) {
        self.active = None;
    }

    pub fn set_current_frame(&mut self, frame: i64) {
        self.timeline.current_frame = frame;
    }

    /// Recognizes `request.wave`, places it on the timeline and marks every
    /// phoneme. Nothing is left behind when any step fails.
    pub fn mark_audio(
        &mut self,
        recognizer: Arc<dyn Recognizer>,
        request: &MarkRequest,
        timeout: Duration,
    ) -> Result<ClipId> {
        check_input(&request.wave)?;
        check_input(&request.transcript)?;

        let output = recognize_with_timeout(
            recognizer,
            &request.wave,
            &request.transcript,
            timeout,
        )?;
        self.mark_from_output(request, &output)
    }

    pub fn mark_from_output(
        &mut self,
        request: &MarkRequest,
        output: &RecognitionOutput,
    ) -> Result<ClipId> {
        let rate = self.timeline.rate;
        let last = output.last_frame(rate).ok_or_else(|| {
            LipSyncError::RecognitionFailure("recognizer found no phonemes".to_string())
        })?;
        let length = request.length.unwrap_or(last + 1);

        self.bounds.capture(&self.timeline);
        let clip = self.timeline.place_clip(
            request.clip_name(),
            &request.wave,
            request.start_frame,
            length,
        );

        if let Err(err) = self.register(clip, output, request.start_frame) {
            tracing::warn!(%clip, %err, "failed to mark audio, rolling back");
            self.sequences.remove(clip);
            self.timeline.remove_clip(clip);
            return Err(err);
        }

        self.active = Some(clip);
        self.timeline.fit_end_to_clips();
        tracing::info!(
            %clip,
            markers = output.phoneme_count(),
            frame_end = self.timeline.frame_end,
            "marked audio"
        );
        Ok(clip)
    }

    fn register(&mut self, clip: ClipId, output: &RecognitionOutput, offset: i64) -> Result<()> {
        self.sequences.add(clip)?;
        for (label, time) in output.marker_events(self.timeline.rate, offset) {
            self.sequences.mark(clip, label, time)?;
        }
        Ok(())
    }

    /// Drops the markers of the selected clip and restores the frame range.
    pub fn unmark_active(&mut self) -> Result<usize> {
        let clip = self.require_active()?;
        let removed = self.sequences.unmark_all(clip)?;
        self.bounds.restore(&mut self.timeline);
        Ok(removed.len())
    }

    /// Removes the selected clip and its sequence. Keys already written stay.
    pub fn delete_active(&mut self) -> Result<()> {
        let clip = self.require_active()?;
        self.sequences.remove(clip);
        self.timeline.remove_clip(clip);
        self.active = None;
        if self.timeline.clips().is_empty() {
            self.bounds.restore(&mut self.timeline);
        }
        Ok(())
    }

    pub fn animate_all_active(&mut self) -> Result<AnimationReport> {
        let clip = self.require_active()?;
        let rig = self.rig.as_ref().ok_or_else(rig_missing)?;
        let sequence = self.sequences.get(clip)?;
        let animator = MarkerAnimator::new(&self.mapper, rig);
        Ok(animator.animate_all(sequence, &mut self.keys))
    }

    pub fn delete_all_keys_active(&mut self) -> Result<usize> {
        let clip = self.require_active()?;
        let rig = self.rig.as_ref().ok_or_else(rig_missing)?;
        let sequence = self.sequences.get(clip)?;
        let animator = MarkerAnimator::new(&self.mapper, rig);
        Ok(animator.delete_all_keyframes(sequence, &mut self.keys))
    }

    /// Keys the marker on the current frame. `None` when no marker sits there.
    pub fn animate_current(&mut self) -> Result<Option<usize>> {
        let clip = self.require_active()?;
        let rig = self.rig.as_ref().ok_or_else(rig_missing)?;
        let sequence = self.sequences.get(clip)?;
        let animator = MarkerAnimator::new(&self.mapper, rig);
        animator.animate_at_frame(sequence, self.timeline.current_frame, &mut self.keys)
    }

    /// Removes every rig bone key on the current frame.
    pub fn delete_current_key(&mut self) -> Result<usize> {
        self.require_active()?;
        let rig = self.rig.as_ref().ok_or_else(rig_missing)?;
        let animator = MarkerAnimator::new(&self.mapper, rig);
        Ok(animator.delete_keys_at(KeyTime::frame(self.timeline.current_frame), &mut self.keys))
    }

    /// Moves the playhead to the next marker, if any, and returns it.
    pub fn next_marker(&mut self) -> Result<Option<i64>> {
        let clip = self.require_active()?;
        let frame = self.timeline.current_frame;
        let next = self.sequences.next_marker(clip, frame)?;
        if let Some(frame) = next {
            self.timeline.current_frame = frame;
        }
        Ok(next)
    }

    pub fn prev_marker(&mut self) -> Result<Option<i64>> {
        let clip = self.require_active()?;
        let frame = self.timeline.current_frame;
        let prev = self.sequences.prev_marker(clip, frame)?;
        if let Some(frame) = prev {
            self.timeline.current_frame = frame;
        }
        Ok(prev)
    }

    fn require_active(&self) -> Result<ClipId> {
        self.active
            .filter(|clip| self.timeline.clip(*clip).is_some())
            .ok_or_else(|| LipSyncError::Precondition("must select a strip".to_string()))
    }
}

fn rig_missing() -> LipSyncError {
    LipSyncError::Precondition("phoneme rig not found".to_string())
}

fn check_input(path: &Path) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(LipSyncError::Precondition(format!(
            "bad path to wave or transcript: `{}`",
            path.display()
        )))
    }
}
