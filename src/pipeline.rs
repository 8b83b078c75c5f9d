// src/pipeline.rs - Per-sample analysis and batch pooling

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};

use crate::bending::{analyze_sample, BendParameters, SampleBendSummary};
use crate::class_distribution::{ClassDistribution, DistributionMode};
use crate::config::Config;
use crate::errors::{DyneinError, Result};
use crate::metadata::{BendDirection, SampleMetadata};
use crate::points::{assign_doublets, read_class_codes, read_point_records, DoubletCounts, DoubletPointTable, PointRecord};
use crate::statistics::{run_tests, ClassGroupReport, GroupedClassCounts, SignificanceAccumulator, TestDesign};

/// Raw inputs of one sample as handed over by the loader
#[derive(Debug, Clone)]
pub struct SampleInput {
    pub name: String,
    pub records: Vec<PointRecord>,
    pub class_codes: Vec<u8>,
}

/// Everything computed for one sample
#[derive(Debug, Clone)]
pub struct SampleAnalysis {
    pub sample: String,
    pub bend_direction: BendDirection,
    pub table: DoubletPointTable,
    pub doublet_counts: DoubletCounts,
    pub bend: SampleBendSummary,
    pub class_counts: GroupedClassCounts,
    /// `None` when the sample is excluded from statistics
    pub significance: Option<Vec<ClassGroupReport>>,
}

pub fn points_file_name(sample: &str) -> String {
    format!("{}_points.csv", sample)
}

pub fn classification_file_name(sample: &str) -> String {
    format!("{}_classification.csv", sample)
}

/// Sample directories under `input_dir` that contain both input files, sorted by name
pub fn find_sample_dirs<P: AsRef<Path>>(input_dir: P) -> Result<Vec<(String, PathBuf)>> {
    let input_dir = input_dir.as_ref();
    if !input_dir.is_dir() {
        return Err(DyneinError::InvalidPath(input_dir.to_path_buf()));
    }

    let mut samples = Vec::new();
    for entry in fs::read_dir(input_dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|s| s.to_str()).map(str::to_string) else {
            continue;
        };

        let has_points = path.join(points_file_name(&name)).is_file();
        let has_classes = path.join(classification_file_name(&name)).is_file();
        if has_points && has_classes {
            samples.push((name, path));
        } else {
            warn!("{} is missing its points or classification file, moving on", name);
        }
    }

    samples.sort();
    Ok(samples)
}

/// Every subdirectory name under `input_dir`, used for the metadata template
pub fn list_sample_names<P: AsRef<Path>>(input_dir: P) -> Result<Vec<String>> {
    let input_dir = input_dir.as_ref();
    if !input_dir.is_dir() {
        return Err(DyneinError::InvalidPath(input_dir.to_path_buf()));
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(input_dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if let Some(name) = path.file_name().and_then(|s| s.to_str()) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}

pub fn load_sample<P: AsRef<Path>>(sample_dir: P, name: &str) -> Result<SampleInput> {
    let sample_dir = sample_dir.as_ref();
    let records = read_point_records(sample_dir.join(points_file_name(name)))?;
    let class_codes = read_class_codes(sample_dir.join(classification_file_name(name)))?;

    Ok(SampleInput {
        name: name.to_string(),
        records,
        class_codes,
    })
}

/// Normalize doublets, measure bends and tally classes for one sample
pub fn process_sample(input: &SampleInput, metadata: &SampleMetadata, config: &Config) -> Result<SampleAnalysis> {
    let table = assign_doublets(&input.name, &input.records, &input.class_codes, metadata)?;
    let doublet_counts = table.doublet_counts();
    debug!("{}: {} points over {} doublets", input.name, table.points.len(), doublet_counts.len());

    let bend = analyze_sample(&input.name, &table.traces(), &BendParameters::from_config(config))?;
    info!("{}: {}", input.name, bend.verdict());

    let design = TestDesign::from_config(config);
    let class_counts = GroupedClassCounts::tally(&design, table.observations(), &doublet_counts);

    let significance = if config.is_skipped(&input.name) {
        info!("{}: excluded from statistics by configuration", input.name);
        None
    } else {
        Some(run_tests(&design, &class_counts))
    };

    Ok(SampleAnalysis {
        sample: input.name.clone(),
        bend_direction: metadata.bend_direction,
        table,
        doublet_counts,
        bend,
        class_counts,
        significance,
    })
}

/// Pooled counts for all samples sharing one bend direction
#[derive(Debug, Clone)]
pub struct PooledGroup {
    pub direction: BendDirection,
    pub significance: SignificanceAccumulator,
    pub grouped: ClassDistribution,
    pub single: ClassDistribution,
}

impl PooledGroup {
    fn new(direction: BendDirection, config: &Config) -> Self {
        Self {
            direction,
            significance: SignificanceAccumulator::new(TestDesign::from_config(config)),
            grouped: ClassDistribution::new(config, DistributionMode::Grouped),
            single: ClassDistribution::new(config, DistributionMode::Single),
        }
    }

    fn reset(&mut self) {
        self.significance.reset();
        self.grouped.reset();
        self.single.reset();
    }

    pub fn samples(&self) -> &[String] {
        self.significance.samples()
    }
}

/// Batch-level accumulation, one pool per manual bend call.
///
/// Build one per run, feed samples in a fixed order, then [`finalize`](Self::finalize).
#[derive(Debug, Clone)]
pub struct PooledAnalysis {
    straight: PooledGroup,
    bend: PooledGroup,
    skip_samples: Vec<String>,
}

impl PooledAnalysis {
    pub fn new(config: &Config) -> Self {
        Self {
            straight: PooledGroup::new(BendDirection::Straight, config),
            bend: PooledGroup::new(BendDirection::Bend, config),
            skip_samples: config.skip_samples.clone(),
        }
    }

    /// Route a sample into its pool. Returns false when it was not pooled.
    pub fn add(&mut self, analysis: &SampleAnalysis) -> Result<bool> {
        let pool = match analysis.bend_direction {
            BendDirection::Straight => &mut self.straight,
            BendDirection::Bend => &mut self.bend,
            BendDirection::Undetermined => {
                info!("{} is undetermined, moving on", analysis.sample);
                return Ok(false);
            }
        };

        pool.grouped.add(analysis.table.observations());
        pool.single.add(analysis.table.observations());

        if self.skip_samples.iter().any(|s| s == &analysis.sample) {
            return Ok(true);
        }
        pool.significance.add_sample(&analysis.sample, &analysis.class_counts)?;

        Ok(true)
    }

    pub fn reset(&mut self) {
        self.straight.reset();
        self.bend.reset();
    }

    /// Pools in report order (straight, then bend)
    pub fn finalize(self) -> Vec<PooledGroup> {
        vec![self.straight, self.bend]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(bend_direction: BendDirection) -> SampleMetadata {
        SampleMetadata {
            first_doublet: 1,
            clock_direction: "c".to_string(),
            bend_direction,
        }
    }

    /// Nine straight doublets of 20 points each, class code cycling 1..=4
    fn synthetic_input(name: &str) -> SampleInput {
        let mut records = Vec::new();
        let mut class_codes = Vec::new();
        let mut point = 1;
        for contour in 1..=9_i64 {
            for i in 0..20 {
                records.push(PointRecord {
                    point,
                    contour,
                    x: i as f64,
                    y: contour as f64 * 10.0 + 0.5 * i as f64,
                    z: 3.0,
                });
                class_codes.push((point % 4) as u8 + 1);
                point += 1;
            }
        }
        SampleInput {
            name: name.to_string(),
            records,
            class_codes,
        }
    }

    fn config() -> Config {
        Config {
            num_segments: 5,
            align_direction_signs: true,
            ..Config::default()
        }
    }

    #[test]
    fn processes_a_straight_sample() {
        let analysis = process_sample(&synthetic_input("tomo"), &metadata(BendDirection::Straight), &config()).unwrap();

        assert_eq!(analysis.table.points.len(), 180);
        assert_eq!(analysis.doublet_counts.values().sum::<u64>(), 180);
        assert_eq!(analysis.bend.reports.len(), 9);
        assert!(analysis.bend.failures.is_empty());
        assert!(!analysis.bend.is_bent());
        assert_eq!(analysis.class_counts.totals, vec![80, 20, 80]);

        let significance = analysis.significance.unwrap();
        assert_eq!(significance.len(), 3);
        assert!(significance.iter().all(|r| r.pairwise.len() == 3));
    }

    #[test]
    fn skipped_sample_has_no_statistics() {
        let config = Config {
            skip_samples: vec!["tomo".to_string()],
            ..config()
        };
        let analysis = process_sample(&synthetic_input("tomo"), &metadata(BendDirection::Bend), &config).unwrap();
        assert!(analysis.significance.is_none());
    }

    #[test]
    fn pools_by_bend_direction() {
        let config = config();
        let mut pooled = PooledAnalysis::new(&config);

        for (name, direction) in [
            ("a", BendDirection::Straight),
            ("b", BendDirection::Straight),
            ("c", BendDirection::Bend),
            ("d", BendDirection::Undetermined),
        ] {
            let analysis = process_sample(&synthetic_input(name), &metadata(direction), &config).unwrap();
            let pooled_it = pooled.add(&analysis).unwrap();
            assert_eq!(pooled_it, direction != BendDirection::Undetermined);
        }

        let groups = pooled.clone().finalize();
        assert_eq!(groups[0].samples(), &["a".to_string(), "b".to_string()]);
        assert_eq!(groups[1].samples(), &["c".to_string()]);
        assert_eq!(groups[0].significance.counts().totals, vec![160, 40, 160]);
        assert_eq!(groups[0].grouped.row_total(1), 40);

        pooled.reset();
        let groups = pooled.finalize();
        assert!(groups.iter().all(|g| g.samples().is_empty() && g.grouped.is_empty()));
    }
}
