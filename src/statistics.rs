// src/statistics.rs - Contingency tables and chi-square tests across doublet groups

use std::collections::BTreeMap;

use log::{debug, warn};
use serde::Serialize;
use statrs::distribution::{ChiSquared, ContinuousCDF};

use crate::config::{Config, DoubletGroup};
use crate::errors::{DyneinError, Result};

/// One canonical class group and the raw class codes merged into it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassSet {
    pub group: u8,
    pub label: String,
    pub codes: Vec<u8>,
}

impl ClassSet {
    pub fn contains(&self, code: u8) -> bool {
        self.codes.contains(&code)
    }
}

/// Which groups are compared, which classes are tested, and at what level
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestDesign {
    pub doublet_groups: Vec<DoubletGroup>,
    pub class_sets: Vec<ClassSet>,
    pub alpha: f64,
    pub yates_correction: bool,
}

impl TestDesign {
    pub fn from_config(config: &Config) -> Self {
        let class_sets = config
            .class_sets()
            .into_iter()
            .map(|(group, codes)| ClassSet {
                group,
                label: config.class_label(group),
                codes,
            })
            .collect();

        Self {
            doublet_groups: config.doublet_groups.clone(),
            class_sets,
            alpha: config.significance_alpha,
            yates_correction: config.yates_correction,
        }
    }

    /// Number of unordered group pairs, C(k, 2)
    pub fn num_pairwise_tests(&self) -> usize {
        let k = self.doublet_groups.len();
        k * k.saturating_sub(1) / 2
    }

    pub fn corrected_alpha(&self) -> f64 {
        bonferroni_alpha(self.alpha, self.num_pairwise_tests())
    }

    fn group_of(&self, doublet: u8) -> Option<usize> {
        self.doublet_groups.iter().position(|g| g.contains(doublet))
    }
}

/// Bonferroni-corrected significance level
pub fn bonferroni_alpha(alpha: f64, num_tests: usize) -> f64 {
    if num_tests == 0 {
        alpha
    } else {
        alpha / num_tests as f64
    }
}

/// Observed in-class counts and group totals for every class set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupedClassCounts {
    pub group_labels: Vec<String>,
    /// `in_class[set][group]`
    pub in_class: Vec<Vec<u64>>,
    /// Total particles per doublet group, from the count table
    pub totals: Vec<u64>,
}

impl GroupedClassCounts {
    pub fn zeroed(design: &TestDesign) -> Self {
        let groups = design.doublet_groups.len();
        Self {
            group_labels: design.doublet_groups.iter().map(|g| g.label.clone()).collect(),
            in_class: vec![vec![0; groups]; design.class_sets.len()],
            totals: vec![0; groups],
        }
    }

    /// Count class membership per doublet group.
    ///
    /// `observations` yields `(doublet, class_code)` per particle and
    /// `doublet_counts` is the doublet → particle count table.
    pub fn tally<I>(design: &TestDesign, observations: I, doublet_counts: &BTreeMap<u8, u64>) -> Self
    where
        I: IntoIterator<Item = (u8, u8)>,
    {
        let mut counts = Self::zeroed(design);

        for (doublet, code) in observations {
            let Some(group) = design.group_of(doublet) else {
                continue;
            };
            for (set_index, set) in design.class_sets.iter().enumerate() {
                if set.contains(code) {
                    counts.in_class[set_index][group] += 1;
                }
            }
        }

        for (&doublet, &count) in doublet_counts {
            if let Some(group) = design.group_of(doublet) {
                counts.totals[group] += count;
            }
        }

        counts
    }

    /// Element-wise sum with another tally of the same design
    pub fn merge(&mut self, other: &GroupedClassCounts) -> Result<()> {
        if self.group_labels != other.group_labels || self.in_class.len() != other.in_class.len() {
            return Err(DyneinError::Invariant(
                "cannot merge class counts built from different designs".to_string(),
            ));
        }

        for (mine, theirs) in self.in_class.iter_mut().zip(&other.in_class) {
            for (a, b) in mine.iter_mut().zip(theirs) {
                *a += b;
            }
        }
        for (a, b) in self.totals.iter_mut().zip(&other.totals) {
            *a += b;
        }

        Ok(())
    }

    /// `(label, in_class, total)` rows for one class set
    pub fn rows(&self, set_index: usize) -> Vec<(String, u64, u64)> {
        self.group_labels
            .iter()
            .zip(&self.in_class[set_index])
            .zip(&self.totals)
            .map(|((label, &in_class), &total)| (label.clone(), in_class, total))
            .collect()
    }
}

/// k×2 table of (in class, not in class) per group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContingencyTable {
    pub labels: Vec<String>,
    pub cells: Vec<[u64; 2]>,
}

impl ContingencyTable {
    pub fn rows(&self) -> usize {
        self.cells.len()
    }

    /// Sub-table made of rows `a` and `b`
    pub fn pair(&self, a: usize, b: usize) -> ContingencyTable {
        ContingencyTable {
            labels: vec![self.labels[a].clone(), self.labels[b].clone()],
            cells: vec![self.cells[a], self.cells[b]],
        }
    }
}

/// Build a contingency table from `(label, in_class, total)` rows.
/// An in-class count larger than its total is an invariant violation.
pub fn build_contingency(rows: &[(String, u64, u64)]) -> Result<ContingencyTable> {
    let mut labels = Vec::with_capacity(rows.len());
    let mut cells = Vec::with_capacity(rows.len());

    for (label, in_class, total) in rows {
        let outside = total.checked_sub(*in_class).ok_or_else(|| {
            DyneinError::Invariant(format!(
                "group '{}' has {} in-class particles but only {} in total",
                label, in_class, total
            ))
        })?;
        labels.push(label.clone());
        cells.push([*in_class, outside]);
    }

    Ok(ContingencyTable { labels, cells })
}

/// Pearson chi-square test of independence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChiSquareResult {
    pub statistic: f64,
    pub p_value: f64,
    pub dof: usize,
    pub expected: Vec<[f64; 2]>,
}

/// Chi-square test on a k×2 table.
///
/// Expected cells are `row_total * col_total / grand_total`; a zero expected
/// cell is reported as [`DyneinError::ZeroExpectedFrequency`]. With
/// `yates_correction` set, 1-dof tables have each observed cell moved up to 0.5
/// toward its expectation.
pub fn chi_square_test(table: &ContingencyTable, yates_correction: bool) -> Result<ChiSquareResult> {
    let rows = table.rows();
    if rows < 2 {
        return Err(DyneinError::Statistics(format!(
            "chi-square test needs at least 2 rows, got {}",
            rows
        )));
    }

    let row_totals: Vec<f64> = table.cells.iter().map(|r| (r[0] + r[1]) as f64).collect();
    let col_totals = [0, 1].map(|c| table.cells.iter().map(|r| r[c] as f64).sum::<f64>());
    let grand_total: f64 = row_totals.iter().sum();

    let mut expected = Vec::with_capacity(rows);
    for (row, row_total) in row_totals.iter().enumerate() {
        let mut cells = [0.0; 2];
        for (column, col_total) in col_totals.iter().enumerate() {
            let value = if grand_total > 0.0 {
                row_total * col_total / grand_total
            } else {
                0.0
            };
            if value <= 0.0 {
                return Err(DyneinError::ZeroExpectedFrequency { row, column });
            }
            cells[column] = value;
        }
        expected.push(cells);
    }

    let dof = rows - 1;
    let correct = yates_correction && dof == 1;

    let mut statistic = 0.0;
    for (observed_row, expected_row) in table.cells.iter().zip(&expected) {
        for (&observed, &expect) in observed_row.iter().zip(expected_row) {
            let mut observed = observed as f64;
            if correct {
                let diff = expect - observed;
                observed += diff.signum() * diff.abs().min(0.5);
            }
            statistic += (observed - expect).powi(2) / expect;
        }
    }

    let distribution = ChiSquared::new(dof as f64)
        .map_err(|e| DyneinError::Statistics(format!("chi-square distribution: {}", e)))?;
    let p_value = distribution.sf(statistic).clamp(0.0, 1.0);

    Ok(ChiSquareResult {
        statistic,
        p_value,
        dof,
        expected,
    })
}

/// One 2×2 comparison between two doublet groups
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairwiseComparison {
    pub first: String,
    pub second: String,
    pub result: std::result::Result<PairwiseStatistic, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairwiseStatistic {
    pub statistic: f64,
    pub p_value: f64,
    pub significant: bool,
}

/// Every unordered pair of rows, tested against the Bonferroni-corrected level
pub fn pairwise_tests(table: &ContingencyTable, corrected_alpha: f64, yates_correction: bool) -> Vec<PairwiseComparison> {
    let mut comparisons = Vec::new();

    for a in 0..table.rows() {
        for b in (a + 1)..table.rows() {
            let result = chi_square_test(&table.pair(a, b), yates_correction)
                .map(|r| PairwiseStatistic {
                    statistic: r.statistic,
                    p_value: r.p_value,
                    significant: r.p_value < corrected_alpha,
                })
                .map_err(|e| e.to_string());

            comparisons.push(PairwiseComparison {
                first: table.labels[a].clone(),
                second: table.labels[b].clone(),
                result,
            });
        }
    }

    comparisons
}

/// Omnibus and pairwise results for one class set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassGroupReport {
    pub class_set: ClassSet,
    pub table: Option<ContingencyTable>,
    pub omnibus: std::result::Result<ChiSquareResult, String>,
    pub pairwise: Vec<PairwiseComparison>,
    pub alpha: f64,
    pub corrected_alpha: f64,
}

/// Run omnibus and pairwise tests for every class set. A failure in one class
/// set is kept in its own report and does not affect the others.
pub fn run_tests(design: &TestDesign, counts: &GroupedClassCounts) -> Vec<ClassGroupReport> {
    let corrected_alpha = design.corrected_alpha();

    design
        .class_sets
        .iter()
        .enumerate()
        .map(|(set_index, class_set)| {
            let (table, omnibus, pairwise) = match build_contingency(&counts.rows(set_index)) {
                Ok(table) => {
                    let omnibus = chi_square_test(&table, design.yates_correction).map_err(|e| e.to_string());
                    let pairwise = pairwise_tests(&table, corrected_alpha, design.yates_correction);
                    (Some(table), omnibus, pairwise)
                }
                Err(e) => (None, Err(e.to_string()), Vec::new()),
            };

            if let Err(reason) = &omnibus {
                warn!("Class group {} ({}): {}", class_set.group, class_set.label, reason);
            }

            ClassGroupReport {
                class_set: class_set.clone(),
                table,
                omnibus,
                pairwise,
                alpha: design.alpha,
                corrected_alpha,
            }
        })
        .collect()
}

/// Pooled counts across the samples of one batch run.
///
/// Created per run, fed one sample at a time, and emptied with [`reset`](Self::reset).
#[derive(Debug, Clone)]
pub struct SignificanceAccumulator {
    design: TestDesign,
    counts: GroupedClassCounts,
    samples: Vec<String>,
}

impl SignificanceAccumulator {
    pub fn new(design: TestDesign) -> Self {
        let counts = GroupedClassCounts::zeroed(&design);
        Self {
            design,
            counts,
            samples: Vec::new(),
        }
    }

    pub fn add_sample(&mut self, sample: &str, counts: &GroupedClassCounts) -> Result<()> {
        self.counts.merge(counts)?;
        self.samples.push(sample.to_string());
        debug!("Pooled {} ({} samples so far)", sample, self.samples.len());
        Ok(())
    }

    pub fn samples(&self) -> &[String] {
        &self.samples
    }

    pub fn counts(&self) -> &GroupedClassCounts {
        &self.counts
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn reset(&mut self) {
        self.counts = GroupedClassCounts::zeroed(&self.design);
        self.samples.clear();
    }

    pub fn finalize(&self) -> Vec<ClassGroupReport> {
        run_tests(&self.design, &self.counts)
    }
}
