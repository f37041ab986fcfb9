use std::{
    collections::{BTreeMap, BTreeSet},
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{LipSyncError, Result};

const SHAPE_PATH_PREFIX: &str = "key_blocks[\"";
const SHAPE_PATH_SUFFIX: &str = "\"].value";

/// Every shape-key driver of the facial rig, keyed by entry name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverDescription {
    entries: BTreeMap<String, DriverEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriverEntry {
    pub data_path: String,
    pub hide: bool,
    pub lock: bool,
    pub mute: bool,
    pub select: bool,
    pub modifiers: Vec<ModifierSpec>,
    pub driver: DriverSpec,
}

/// F-curve modifier settings. The first entry configures the generator the
/// host creates together with the driver; the rest are added by type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModifierSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub active: bool,
    pub blend_in: f32,
    pub blend_out: f32,
    pub influence: f32,
    pub mode: String,
    pub mute: bool,
    pub poly_order: u32,
    pub use_additive: bool,
    pub use_influence: bool,
    pub coefficients: [f32; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DriverSpec {
    pub expression: String,
    pub is_valid: bool,
    #[serde(rename = "type")]
    pub kind: String,
    pub use_self: bool,
    pub variables: Vec<VariableSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariableSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub targets: Vec<TargetSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TargetSpec {
    pub id_name: String,
    pub transform_space: String,
    pub transform_type: String,
    pub bone_target: String,
}

impl DriverDescription {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| {
            LipSyncError::config(format!(
                "driver description `{}` not found: {err}",
                path.display()
            ))
        })?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader(reader: impl Read) -> Result<Self> {
        let description: Self = serde_json::from_reader(reader)
            .map_err(|err| LipSyncError::config(format!("malformed driver description: {err}")))?;
        description.validate()?;
        Ok(description)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &DriverEntry)> {
        self.entries
            .iter()
            .map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn entry(&self, name: &str) -> Result<&DriverEntry> {
        self.entries
            .get(name)
            .ok_or_else(|| LipSyncError::NotFound(format!("driver `{name}`")))
    }

    /// Shape keys targeted by the drivers, in entry order.
    pub fn shape_keys(&self) -> Vec<&str> {
        self.entries
            .values()
            .filter_map(|entry| entry.shape_key().ok())
            .collect()
    }

    /// Objects referenced by any driver variable target.
    pub fn target_objects(&self) -> BTreeSet<&str> {
        self.entries
            .values()
            .flat_map(|entry| &entry.driver.variables)
            .flat_map(|variable| &variable.targets)
            .map(|target| target.id_name.as_str())
            .collect()
    }

    fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for (name, entry) in &self.entries {
            let shape = entry
                .shape_key()
                .map_err(|err| LipSyncError::config(format!("driver `{name}`: {err}")))?;
            if !seen.insert(shape) {
                return Err(LipSyncError::config(format!(
                    "driver `{name}`: shape key `{shape}` is driven twice"
                )));
            }
            if entry.modifiers.is_empty() {
                return Err(LipSyncError::config(format!("driver `{name}` has no modifiers")));
            }
            if let Some(variable) = entry
                .driver
                .variables
                .iter()
                .find(|variable| variable.targets.is_empty())
            {
                return Err(LipSyncError::config(format!(
                    "driver `{name}`: variable `{}` has no target",
                    variable.name
                )));
            }
        }
        Ok(())
    }
}

impl DriverEntry {
    /// Name of the shape key addressed by `data_path`
    /// (`key_blocks["<shape>"].value`).
    pub fn shape_key(&self) -> Result<&str> {
        self.data_path
            .strip_prefix(SHAPE_PATH_PREFIX)
            .and_then(|rest| rest.strip_suffix(SHAPE_PATH_SUFFIX))
            .filter(|shape| !shape.is_empty())
            .ok_or_else(|| {
                LipSyncError::config(format!("`{}` is not a shape key value path", self.data_path))
            })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn entry(shape: &str) -> serde_json::Value {
        json!({
            "data_path": format!("key_blocks[\"{shape}\"].value"),
            "hide": false,
            "lock": false,
            "mute": false,
            "select": true,
            "modifiers": [{
                "type": "GENERATOR",
                "active": true,
                "blend_in": 0.0,
                "blend_out": 0.0,
                "influence": 1.0,
                "mode": "POLYNOMIAL",
                "mute": false,
                "poly_order": 1,
                "use_additive": false,
                "use_influence": false,
                "coefficients": [0.0, 1.0]
            }],
            "driver": {
                "expression": "jaw_open",
                "is_valid": true,
                "type": "SCRIPTED",
                "use_self": false,
                "variables": [{
                    "name": "jaw_open",
                    "type": "TRANSFORMS",
                    "targets": [{
                        "id_name": "MBLab_skeleton_face_rig",
                        "transform_space": "LOCAL_SPACE",
                        "transform_type": "LOC_Y",
                        "bone_target": "jaw"
                    }]
                }]
            }
        })
    }

    fn parse(value: serde_json::Value) -> Result<DriverDescription> {
        DriverDescription::from_reader(value.to_string().as_bytes())
    }

    #[test]
    fn parses_typed_description() {
        let description = parse(json!({
            "a": entry("Expressions_mouthOpen_max"),
            "b": entry("Expressions_mouthSmile_max"),
        }))
        .unwrap();

        assert_eq!(description.len(), 2);
        assert_eq!(
            description.shape_keys(),
            ["Expressions_mouthOpen_max", "Expressions_mouthSmile_max"]
        );
        assert_eq!(
            description.target_objects().into_iter().collect::<Vec<_>>(),
            ["MBLab_skeleton_face_rig"]
        );
        let modifier = &description.entry("a").unwrap().modifiers[0];
        assert_eq!(modifier.kind, "GENERATOR");
        assert_eq!(modifier.coefficients, [0.0, 1.0]);
        let err = description.entry("c").unwrap_err();
        assert!(matches!(err, LipSyncError::NotFound(_)));
    }

    #[test]
    fn rejects_unknown_and_missing_fields() {
        let mut extra = entry("mouth");
        extra["driver"]["extra"] = json!(1);
        let err = parse(json!({ "a": extra })).unwrap_err();
        assert!(matches!(err, LipSyncError::Config(_)));

        let mut missing = entry("mouth");
        missing["modifiers"][0]
            .as_object_mut()
            .unwrap()
            .remove("influence");
        let err = parse(json!({ "a": missing })).unwrap_err();
        assert!(matches!(err, LipSyncError::Config(_)));
    }

    #[test]
    fn rejects_wrong_coefficient_count() {
        let mut value = entry("mouth");
        value["modifiers"][0]["coefficients"] = json!([0.0, 1.0, 2.0]);
        assert!(parse(json!({ "a": value })).is_err());
    }

    #[test]
    fn rejects_structural_problems() {
        let mut bad_path = entry("mouth");
        bad_path["data_path"] = json!("location");
        let err = parse(json!({ "a": bad_path })).unwrap_err();
        assert!(format!("{err}").contains("location"));

        let mut no_modifiers = entry("mouth");
        no_modifiers["modifiers"] = json!([]);
        assert!(parse(json!({ "a": no_modifiers })).is_err());

        let mut no_targets = entry("mouth");
        no_targets["driver"]["variables"][0]["targets"] = json!([]);
        assert!(parse(json!({ "a": no_targets })).is_err());

        assert!(parse(json!({ "a": entry("mouth"), "b": entry("mouth") })).is_err());
    }
}
