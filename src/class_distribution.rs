// src/class_distribution.rs - Class counts per doublet (group), the data behind the histograms

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::{Config, DoubletGroup};
use crate::doublet::RING_SIZE;

/// Rows are either the configured doublet groups or the nine single doublets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DistributionMode {
    Grouped,
    Single,
}

impl DistributionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistributionMode::Grouped => "grouped",
            DistributionMode::Single => "single",
        }
    }
}

/// Count matrix `row × canonical class`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassDistribution {
    pub mode: DistributionMode,
    rows: Vec<DoubletGroup>,
    class_groups: BTreeMap<u8, u8>,
    /// canonical class -> count per row
    counts: BTreeMap<u8, Vec<u64>>,
}

impl ClassDistribution {
    pub fn new(config: &Config, mode: DistributionMode) -> Self {
        let rows = match mode {
            DistributionMode::Grouped => config.doublet_groups.clone(),
            DistributionMode::Single => (1..=RING_SIZE)
                .map(|d| DoubletGroup::new(&d.to_string(), &[d]))
                .collect(),
        };

        let counts = config
            .class_sets()
            .into_iter()
            .map(|(group, _)| (group, vec![0; rows.len()]))
            .collect();

        Self {
            mode,
            rows,
            class_groups: config.class_group_map(),
            counts,
        }
    }

    /// Add `(doublet, class_code)` observations. Unmapped codes keep their own column.
    pub fn add<I>(&mut self, observations: I)
    where
        I: IntoIterator<Item = (u8, u8)>,
    {
        let row_count = self.rows.len();
        for (doublet, code) in observations {
            let Some(row) = self.rows.iter().position(|r| r.contains(doublet)) else {
                continue;
            };
            let class = self.class_groups.get(&code).copied().unwrap_or(code);
            self.counts.entry(class).or_insert_with(|| vec![0; row_count])[row] += 1;
        }
    }

    pub fn reset(&mut self) {
        for column in self.counts.values_mut() {
            column.iter_mut().for_each(|c| *c = 0);
        }
    }

    pub fn row_labels(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.label.as_str()).collect()
    }

    pub fn classes(&self) -> Vec<u8> {
        self.counts.keys().copied().collect()
    }

    pub fn count(&self, row: usize, class: u8) -> u64 {
        self.counts.get(&class).map(|c| c[row]).unwrap_or(0)
    }

    pub fn row_total(&self, row: usize) -> u64 {
        self.counts.values().map(|c| c[row]).sum()
    }

    pub fn is_empty(&self) -> bool {
        (0..self.rows.len()).all(|row| self.row_total(row) == 0)
    }

    /// Share of each class within its row; empty rows stay at zero
    pub fn fraction(&self, row: usize, class: u8) -> f64 {
        let total = self.row_total(row);
        if total == 0 {
            0.0
        } else {
            self.count(row, class) as f64 / total as f64
        }
    }
}
