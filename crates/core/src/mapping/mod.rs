use std::{
    collections::{BTreeSet, HashMap},
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{LipSyncError, Result};

/// A single bone target of a phoneme pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "(String, f32)", into = "(String, f32)")]
pub struct BoneWeight {
    pub bone: String,
    pub weight: f32,
}

impl BoneWeight {
    pub fn new(bone: impl Into<String>, weight: f32) -> Self {
        Self {
            bone: bone.into(),
            weight,
        }
    }
}

impl From<(String, f32)> for BoneWeight {
    fn from((bone, weight): (String, f32)) -> Self {
        Self { bone, weight }
    }
}

impl From<BoneWeight> for (String, f32) {
    fn from(value: BoneWeight) -> Self {
        (value.bone, value.weight)
    }
}

/// Label to pose table. The recognizer emits fine-grained phonemes which are
/// reduced here to the handful of mouth shapes the rig can express.
pub type PhonemeMap = HashMap<String, Vec<BoneWeight>>;

/// Immutable phoneme lookup loaded once per session.
#[derive(Debug, Clone, Default)]
pub struct PhonemeMapper {
    map: PhonemeMap,
}

impl PhonemeMapper {
    pub fn new(map: PhonemeMap) -> Self {
        Self { map }
    }

    /// Loads the table from a JSON file of the form
    /// `{ "<label>": [["<bone>", <weight>], ...] }`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| {
            LipSyncError::config(format!("phoneme map `{}` not found: {err}", path.display()))
        })?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let map: PhonemeMap = serde_json::from_reader(reader)
            .map_err(|err| LipSyncError::config(format!("malformed phoneme map: {err}")))?;
        tracing::debug!(labels = map.len(), "loaded phoneme map");
        Ok(Self { map })
    }

    /// Returns the pose for `label`, or `None` when the label is unknown.
    pub fn lookup(&self, label: &str) -> Option<&[BoneWeight]> {
        self.map.get(label).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Sorted, de-duplicated bones referenced by any label.
    pub fn bones(&self) -> Vec<String> {
        self.map
            .values()
            .flatten()
            .map(|target| target.bone.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: &str = r#"{
        "ph_AA": [["jaw", 0.8], ["lips_wide", 0.2]],
        "ph_EE": [["lips_wide", 1.0]],
        "ph_SIL": []
    }"#;

    #[test]
    fn looks_up_known_labels_in_order() {
        let mapper = PhonemeMapper::from_reader(TABLE.as_bytes()).unwrap();
        let pose = mapper.lookup("ph_AA").unwrap();
        assert_eq!(pose.len(), 2);
        assert_eq!(pose[0], BoneWeight::new("jaw", 0.8));
        assert_eq!(pose[1], BoneWeight::new("lips_wide", 0.2));
        assert_eq!(mapper.lookup("ph_SIL").map(<[_]>::len), Some(0));
    }

    #[test]
    fn unknown_labels_have_no_mapping() {
        let mapper = PhonemeMapper::from_reader(TABLE.as_bytes()).unwrap();
        for label in ["", "ph_ZZ", "PH_AA", "ph_AA "] {
            assert!(mapper.lookup(label).is_none());
        }
    }

    #[test]
    fn collects_unique_bones() {
        let mapper = PhonemeMapper::from_reader(TABLE.as_bytes()).unwrap();
        assert_eq!(mapper.bones(), vec!["jaw", "lips_wide"]);
    }

    #[test]
    fn malformed_tables_are_config_errors() {
        for raw in [
            "not json",
            r#"{"ph_AA": [["jaw"]]}"#,
            r#"{"ph_AA": [["jaw", "loud"]]}"#,
            r#"["ph_AA"]"#,
        ] {
            let err = PhonemeMapper::from_reader(raw.as_bytes()).unwrap_err();
            assert!(matches!(err, LipSyncError::Config(_)), "{raw}");
        }
    }

    #[test]
    fn missing_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PhonemeMapper::load(dir.path().join("yasp_map.json")).unwrap_err();
        assert!(format!("{err}").contains("yasp_map.json"));
    }
}
