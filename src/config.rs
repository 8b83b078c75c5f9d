// src/config.rs - Analysis configuration loaded from TOML

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use crate::doublet::RING_SIZE;
use crate::errors::{DyneinError, Result};

/// Configuration for a batch analysis run
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    #[serde(default = "default_input_path")]
    pub input_path: String,

    #[serde(default = "default_output_base_dir")]
    pub output_base_dir: String,

    #[serde(default = "default_parallel")]
    pub use_parallel: bool,

    // Segment fitting
    #[serde(default = "default_num_segments")]
    pub num_segments: usize,

    /// Flip each direction so it has a non-negative dot product with its predecessor
    #[serde(default = "default_align_direction_signs")]
    pub align_direction_signs: bool,

    // Bend thresholds (degrees)
    #[serde(default = "default_angle_threshold_deg")]
    pub angle_threshold_deg: f64,

    #[serde(default = "default_bend_threshold_deg")]
    pub bend_threshold_deg: f64,

    // Significance testing
    #[serde(default = "default_significance_alpha")]
    pub significance_alpha: f64,

    #[serde(default = "default_yates_correction")]
    pub yates_correction: bool,

    /// Samples left out of the statistics stage
    #[serde(default)]
    pub skip_samples: Vec<String>,

    /// Class code -> canonical class group (4 is merged into 2 by default)
    #[serde(default = "default_class_groups")]
    pub class_groups: Vec<ClassGroupMapping>,

    /// Display names for canonical class groups
    #[serde(default = "default_class_labels")]
    pub class_labels: Vec<ClassLabel>,

    /// Structural doublet groups compared by the chi-square tests, in report order
    #[serde(default = "default_doublet_groups")]
    pub doublet_groups: Vec<DoubletGroup>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ClassGroupMapping {
    pub code: u8,
    pub group: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ClassLabel {
    pub group: u8,
    pub label: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct DoubletGroup {
    pub label: String,
    pub doublets: Vec<u8>,
}

impl DoubletGroup {
    pub fn new(label: &str, doublets: &[u8]) -> Self {
        Self {
            label: label.to_string(),
            doublets: doublets.to_vec(),
        }
    }

    pub fn contains(&self, doublet: u8) -> bool {
        self.doublets.contains(&doublet)
    }
}

fn default_input_path() -> String {
    "./Data".to_string()
}

fn default_output_base_dir() -> String {
    "./Results".to_string()
}

fn default_parallel() -> bool {
    true
}

fn default_num_segments() -> usize {
    10
}

fn default_align_direction_signs() -> bool {
    false // antiparallel fits are kept as real signal
}

fn default_angle_threshold_deg() -> f64 {
    6.0 // any retained angle above this marks the doublet as bent
}

fn default_bend_threshold_deg() -> f64 {
    100.0 // angles above this are junk and dropped
}

fn default_significance_alpha() -> f64 {
    0.05
}

fn default_yates_correction() -> bool {
    false
}

fn default_class_groups() -> Vec<ClassGroupMapping> {
    [(1, 1), (2, 2), (3, 3), (4, 2)]
        .iter()
        .map(|&(code, group)| ClassGroupMapping { code, group })
        .collect()
}

fn default_class_labels() -> Vec<ClassLabel> {
    [(1, "Unknown"), (2, "Pre PS"), (3, "Post PS")]
        .iter()
        .map(|&(group, label)| ClassLabel { group, label: label.to_string() })
        .collect()
}

fn default_doublet_groups() -> Vec<DoubletGroup> {
    vec![
        DoubletGroup::new("1-4", &[1, 2, 3, 4]),
        DoubletGroup::new("5", &[5]),
        DoubletGroup::new("6-9", &[6, 7, 8, 9]),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_path: default_input_path(),
            output_base_dir: default_output_base_dir(),
            use_parallel: default_parallel(),
            num_segments: default_num_segments(),
            align_direction_signs: default_align_direction_signs(),
            angle_threshold_deg: default_angle_threshold_deg(),
            bend_threshold_deg: default_bend_threshold_deg(),
            significance_alpha: default_significance_alpha(),
            yates_correction: default_yates_correction(),
            skip_samples: Vec::new(),
            class_groups: default_class_groups(),
            class_labels: default_class_labels(),
            doublet_groups: default_doublet_groups(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            DyneinError::Config(format!("Failed to read config file '{}': {}", path.display(), e))
        })?;

        toml::from_str(&content).map_err(|source| DyneinError::ConfigLoad {
            source,
            path: path.to_path_buf(),
        })
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| {
            DyneinError::Config(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, content)?;

        Ok(())
    }

    /// Validate configuration. Any failure here is fatal to the whole run.
    pub fn validate(&self) -> Result<()> {
        if self.num_segments == 0 {
            return Err(DyneinError::Config(
                "num_segments must be > 0".to_string(),
            ));
        }

        if self.angle_threshold_deg <= 0.0 || self.angle_threshold_deg >= self.bend_threshold_deg {
            return Err(DyneinError::Config(
                "angle_threshold_deg must be > 0.0 and < bend_threshold_deg".to_string(),
            ));
        }

        if self.bend_threshold_deg > 180.0 {
            return Err(DyneinError::Config(
                "bend_threshold_deg must be <= 180.0".to_string(),
            ));
        }

        if self.significance_alpha <= 0.0 || self.significance_alpha >= 1.0 {
            return Err(DyneinError::Config(
                "significance_alpha must be between 0.0 and 1.0".to_string(),
            ));
        }

        if self.doublet_groups.len() < 2 {
            return Err(DyneinError::Config(
                "at least two doublet_groups are required for the chi-square tests".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for group in &self.doublet_groups {
            if group.doublets.is_empty() {
                return Err(DyneinError::Config(format!(
                    "doublet group '{}' is empty", group.label
                )));
            }
            for &doublet in &group.doublets {
                if doublet == 0 || doublet > RING_SIZE {
                    return Err(DyneinError::Config(format!(
                        "doublet group '{}' contains {}, outside 1..={}",
                        group.label, doublet, RING_SIZE
                    )));
                }
                if !seen.insert(doublet) {
                    return Err(DyneinError::Config(format!(
                        "doublet {} appears in more than one doublet group", doublet
                    )));
                }
            }
        }

        if self.class_groups.is_empty() {
            return Err(DyneinError::Config(
                "class_groups must map at least one class code".to_string(),
            ));
        }

        let mut codes = BTreeSet::new();
        for mapping in &self.class_groups {
            if !codes.insert(mapping.code) {
                return Err(DyneinError::Config(format!(
                    "class code {} is mapped twice in class_groups", mapping.code
                )));
            }
        }

        Ok(())
    }

    /// Class code -> canonical group lookup
    pub fn class_group_map(&self) -> BTreeMap<u8, u8> {
        self.class_groups.iter().map(|m| (m.code, m.group)).collect()
    }

    /// Canonical class groups in ascending order, each with its member codes
    pub fn class_sets(&self) -> Vec<(u8, Vec<u8>)> {
        let mut sets: BTreeMap<u8, Vec<u8>> = BTreeMap::new();
        for mapping in &self.class_groups {
            sets.entry(mapping.group).or_default().push(mapping.code);
        }
        for codes in sets.values_mut() {
            codes.sort_unstable();
        }
        sets.into_iter().collect()
    }

    /// Display name for a canonical class group, falling back to its number
    pub fn class_label(&self, group: u8) -> String {
        self.class_labels
            .iter()
            .find(|l| l.group == group)
            .map(|l| l.label.clone())
            .unwrap_or_else(|| group.to_string())
    }

    pub fn is_skipped(&self, sample: &str) -> bool {
        self.skip_samples.iter().any(|s| s == sample)
    }
}
