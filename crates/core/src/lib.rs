//! Core library for phoneme-driven lip-sync on a facial rig.
//!
//! Recognizer output is turned into phoneme markers on audio clips, and the
//! markers are turned into pose keyframes on the phoneme rig. Each module owns
//! one piece of that pipeline; [`LipSyncSession`] ties them together for an
//! editing session.

pub mod animate;
pub mod config;
pub mod error;
pub mod mapping;
pub mod recognizer;
pub mod rig;
pub mod sequence;
pub mod session;
pub mod timeline;

pub use animate::{AnimationReport, KeyTime, KeyframeStore, MarkerAnimator, PoseSink};
pub use config::{AppConfig, RecognizerConfig, RigConfig, TimelineConfig};
pub use error::{LipSyncError, Result};
pub use mapping::{BoneWeight, PhonemeMap, PhonemeMapper};
pub use recognizer::{CommandRecognizer, FileRecognizer, RecognitionOutput, Recognizer};
pub use rig::{DriverDescription, PhonemeRig};
pub use sequence::{Marker, Sequence, SequenceIndex};
pub use session::{LipSyncSession, MarkRequest};
pub use timeline::{AudioClip, ClipId, FrameRate, Timeline, TimelineBounds};
