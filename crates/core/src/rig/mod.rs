//! Skeletal rigs that receive the lip-sync poses, and the typed description
//! of the facial rig's shape-key drivers.

mod drivers;

pub use drivers::{
    DriverDescription, DriverEntry, DriverSpec, ModifierSpec, TargetSpec, VariableSpec,
};

use crate::{PhonemeMapper, RigConfig};

/// The pose bones of the phoneme rig.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhonemeRig {
    name: String,
    bone_prefix: String,
    bones: Vec<String>,
}

impl PhonemeRig {
    pub fn new(
        name: impl Into<String>,
        bone_prefix: impl Into<String>,
        bones: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut bones: Vec<String> = bones.into_iter().collect();
        bones.sort();
        bones.dedup();
        Self {
            name: name.into(),
            bone_prefix: bone_prefix.into(),
            bones,
        }
    }

    /// Builds a rig whose bones are exactly those the phoneme map drives.
    pub fn from_mapper(
        name: impl Into<String>,
        bone_prefix: impl Into<String>,
        mapper: &PhonemeMapper,
    ) -> Self {
        let bone_prefix = bone_prefix.into();
        let bones = mapper
            .bones()
            .into_iter()
            .map(|bone| format!("{bone_prefix}{bone}"))
            .collect::<Vec<_>>();
        Self::new(name, bone_prefix, bones)
    }

    pub fn from_config(config: &RigConfig, mapper: &PhonemeMapper) -> Self {
        if config.bones.is_empty() {
            Self::from_mapper(&config.phoneme_rig, &config.bone_prefix, mapper)
        } else {
            Self::new(
                &config.phoneme_rig,
                &config.bone_prefix,
                config.bones.iter().cloned(),
            )
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bones(&self) -> &[String] {
        &self.bones
    }

    /// Rig bone driven by a phoneme map entry.
    pub fn bone_name(&self, mapped: &str) -> String {
        format!("{}{mapped}", self.bone_prefix)
    }

    pub fn has_bone(&self, bone: &str) -> bool {
        self.bones
            .binary_search_by(|b| b.as_str().cmp(bone))
            .is_ok()
    }
}
