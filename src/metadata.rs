// src/metadata.rs - Per-sample orientation and bend metadata

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::doublet::ClockDirection;
use crate::errors::{DyneinError, Result};

/// Manual bend call for a sample, used only to route it into a pooled group
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BendDirection {
    Straight,
    Bend,
    Undetermined,
}

impl BendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            BendDirection::Straight => "straight",
            BendDirection::Bend => "bend",
            BendDirection::Undetermined => "undetermined",
        }
    }
}

/// Orientation of one tomogram's contour tracing
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SampleMetadata {
    /// Contour that becomes doublet 1
    pub first_doublet: i64,
    /// "c" for clockwise, anything else for counter-clockwise
    pub clock_direction: String,
    pub bend_direction: BendDirection,
}

impl SampleMetadata {
    pub fn clock(&self) -> ClockDirection {
        ClockDirection::from_code(&self.clock_direction)
    }
}

/// Metadata for every sample of a batch
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct MetadataFile {
    /// Must be set by hand once every sample has been filled in
    pub ready_for_analysis: bool,
    #[serde(default)]
    pub samples: BTreeMap<String, SampleMetadata>,
}

impl MetadataFile {
    /// Fresh metadata with placeholder values for each sample
    pub fn template<I, S>(sample_names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let samples = sample_names
            .into_iter()
            .map(|name| {
                (
                    name.into(),
                    SampleMetadata {
                        first_doublet: 0,
                        clock_direction: "undetermined".to_string(),
                        bend_direction: BendDirection::Undetermined,
                    },
                )
            })
            .collect();

        Self {
            ready_for_analysis: false,
            samples,
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            DyneinError::Config(format!("Failed to read metadata file '{}': {}", path.display(), e))
        })?;

        toml::from_str(&content).map_err(|source| DyneinError::ConfigLoad {
            source,
            path: path.to_path_buf(),
        })
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            DyneinError::Config(format!("Failed to serialize metadata: {}", e))
        })?;

        fs::write(path, content)?;

        Ok(())
    }

    pub fn ensure_ready(&self) -> Result<()> {
        if self.ready_for_analysis {
            Ok(())
        } else {
            Err(DyneinError::Config(
                "metadata is not marked ready_for_analysis; fill in every sample first".to_string(),
            ))
        }
    }

    pub fn sample(&self, name: &str) -> Result<&SampleMetadata> {
        self.samples
            .get(name)
            .ok_or_else(|| DyneinError::Config(format!("no metadata entry for sample '{}'", name)))
    }
}
