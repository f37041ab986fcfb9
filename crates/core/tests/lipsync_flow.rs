use std::{fs, sync::Arc, time::Duration};

use lipsync_rig_core::{
    AppConfig, FileRecognizer, KeyTime, LipSyncError, LipSyncSession, MarkRequest, Recognizer,
};

const MAP: &str = r#"{ "ph_AA": [["jaw", 0.8]], "ph_EE": [["lips", 1.0]] }"#;

const RECOGNIZED: &str = r#"{
    "words": [
        { "phonemes": [ { "phoneme": "ph_AA", "start": 0 } ] },
        { "phonemes": [ { "phoneme": "ph_EE", "start": 100 } ] }
    ]
}"#;

struct Fixture {
    dir: tempfile::TempDir,
    config: AppConfig,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let map = dir.path().join("yasp_map.json");
        fs::write(&map, MAP).unwrap();
        fs::write(dir.path().join("voice.wav"), b"RIFF").unwrap();
        fs::write(dir.path().join("voice.txt"), b"hello there").unwrap();
        fs::write(dir.path().join("recognized.json"), RECOGNIZED).unwrap();

        let raw = format!(
            r#"{{ "timeline": {{ "fps": 24, "fps_base": 1.0 }}, "phoneme_map": {:?} }}"#,
            map
        );
        let config_path = dir.path().join("config.json");
        fs::write(&config_path, raw).unwrap();
        let config = AppConfig::load(&config_path).unwrap();

        Self { dir, config }
    }

    fn request(&self) -> MarkRequest {
        MarkRequest::new(
            self.dir.path().join("voice.wav"),
            self.dir.path().join("voice.txt"),
            1,
        )
    }

    fn recognizer(&self, name: &str) -> Arc<dyn Recognizer> {
        Arc::new(FileRecognizer::new(self.dir.path().join(name)))
    }
}

#[test]
fn marks_and_animates_two_words() {
    let fixture = Fixture::new();
    let mut session = LipSyncSession::from_config(&fixture.config).unwrap();

    let clip = session
        .mark_audio(
            fixture.recognizer("recognized.json"),
            &fixture.request(),
            Duration::from_secs(5),
        )
        .unwrap();

    let markers = session.sequences().get(clip).unwrap().markers().to_vec();
    assert_eq!(markers.len(), 2);
    assert_eq!((markers[0].label.as_str(), markers[0].time), ("ph_AA", 1));
    assert_eq!((markers[1].label.as_str(), markers[1].time), ("ph_EE", 25));

    let report = session.animate_all_active().unwrap();
    assert_eq!(report.animated, 2);

    let keys = session.keys();
    assert_eq!(keys.value_at("ph_jaw", KeyTime(0.0)), Some(0.0));
    assert_eq!(keys.value_at("ph_lips", KeyTime(0.0)), Some(0.0));
    assert_eq!(keys.value_at("ph_jaw", KeyTime::frame(1)), Some(0.8));
    assert_eq!(keys.value_at("ph_lips", KeyTime::frame(1)), Some(0.0));
    assert_eq!(keys.value_at("ph_jaw", KeyTime::frame(25)), Some(0.0));
    assert_eq!(keys.value_at("ph_lips", KeyTime::frame(25)), Some(1.0));

    assert_eq!(session.delete_all_keys_active().unwrap(), 6);
    assert!(session.keys().is_empty());
}

#[test]
fn failed_recognition_registers_nothing() {
    let fixture = Fixture::new();
    let garbage = fixture.dir.path().join("garbage.json");
    fs::write(garbage, r#"{ "sentences": [] }"#).unwrap();
    let mut session = LipSyncSession::from_config(&fixture.config).unwrap();

    let err = session
        .mark_audio(
            fixture.recognizer("garbage.json"),
            &fixture.request(),
            Duration::from_secs(5),
        )
        .unwrap_err();

    assert!(matches!(err, LipSyncError::RecognitionFailure(_)));
    assert!(session.sequences().is_empty());
    assert!(session.timeline().clips().is_empty());
    assert_eq!(session.timeline().frame_end, 250);
}

#[test]
fn closing_restores_frame_range() {
    let fixture = Fixture::new();
    let mut session = LipSyncSession::from_config(&fixture.config).unwrap();
    session
        .mark_audio(
            fixture.recognizer("recognized.json"),
            &fixture.request().with_length(480),
            Duration::from_secs(5),
        )
        .unwrap();
    assert_eq!(session.timeline().frame_end, 481);
    assert_eq!(session.bounds().original(), Some((1, 250)));

    session.animate_all_active().unwrap();
    let keys = session.close();
    assert_eq!(keys.keys("ph_jaw").len(), 3);
}
