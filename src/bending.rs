// src/bending.rs - Inter-segment angles, bend classification and per-sample aggregates

use log::{debug, warn};
use serde::Serialize;

use crate::config::Config;
use crate::errors::{DyneinError, Result};
use crate::segments::{align_direction_signs, direction_dot, fit_segments, segment_layout, DirectionVector, DoubletTrace};

/// Parameters of the bend analysis, usually taken from [`Config`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BendParameters {
    pub num_segments: usize,
    pub angle_threshold_deg: f64,
    pub bend_threshold_deg: f64,
    pub align_direction_signs: bool,
}

impl BendParameters {
    pub fn from_config(config: &Config) -> Self {
        Self {
            num_segments: config.num_segments,
            angle_threshold_deg: config.angle_threshold_deg,
            bend_threshold_deg: config.bend_threshold_deg,
            align_direction_signs: config.align_direction_signs,
        }
    }
}

impl Default for BendParameters {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Angle in degrees between every pair of consecutive directions.
///
/// The dot product is not sign-corrected, so antiparallel fits come out near 180°.
pub fn consecutive_angles(directions: &[DirectionVector]) -> Vec<f64> {
    directions
        .windows(2)
        .map(|pair| direction_dot(&pair[0], &pair[1]).clamp(-1.0, 1.0).acos().to_degrees())
        .collect()
}

/// Drop angles strictly above `bend_threshold_deg`
pub fn reject_outlier_angles(angles: &[f64], bend_threshold_deg: f64) -> Vec<f64> {
    angles
        .iter()
        .copied()
        .filter(|&angle| angle <= bend_threshold_deg)
        .collect()
}

/// Consecutive-pair angles with junk angles already removed
pub fn compute_angles(directions: &[DirectionVector], bend_threshold_deg: f64) -> Vec<f64> {
    reject_outlier_angles(&consecutive_angles(directions), bend_threshold_deg)
}

/// True iff the largest retained angle exceeds `angle_threshold_deg`.
/// An empty angle list cannot be classified.
pub fn classify_bend(angles: &[f64], angle_threshold_deg: f64) -> Result<bool> {
    max_angle(angles)
        .map(|max| max > angle_threshold_deg)
        .ok_or_else(|| DyneinError::NoData("no retained angles to classify".to_string()))
}

/// Sum of absolute retained angles
pub fn bending_amount(angles: &[f64]) -> f64 {
    angles.iter().map(|a| a.abs()).sum()
}

/// Spread between the largest and smallest retained angle
pub fn angle_range(angles: &[f64]) -> Option<f64> {
    Some(max_angle(angles)? - min_angle(angles)?)
}

fn max_angle(angles: &[f64]) -> Option<f64> {
    angles.iter().copied().reduce(f64::max)
}

fn min_angle(angles: &[f64]) -> Option<f64> {
    angles.iter().copied().reduce(f64::min)
}

/// Bend measurements for one doublet
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoubletBendReport {
    pub doublet: u8,
    /// Retained angles in segment order (degrees)
    pub angles: Vec<f64>,
    /// Angles above the bend threshold that were discarded
    pub rejected_angles: usize,
    pub bending_amount: f64,
    pub angle_range: f64,
    pub max_angle: f64,
    pub bent: bool,
    pub point_count: usize,
    /// Trailing points not covered by any segment
    pub dropped_points: usize,
}

/// A doublet that could not be measured, and why
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoubletFailure {
    pub doublet: u8,
    pub reason: String,
}

/// Fit, measure and classify a single doublet trace
pub fn analyze_doublet(trace: &DoubletTrace, params: &BendParameters) -> Result<DoubletBendReport> {
    let layout = segment_layout(trace.len(), params.num_segments)?;
    let mut directions = fit_segments(trace, params.num_segments)?;
    if params.align_direction_signs {
        directions = align_direction_signs(&directions);
    }

    let raw_angles = consecutive_angles(&directions);
    let angles = reject_outlier_angles(&raw_angles, params.bend_threshold_deg);
    let rejected_angles = raw_angles.len() - angles.len();

    let bent = classify_bend(&angles, params.angle_threshold_deg).map_err(|_| {
        DyneinError::NoData(format!(
            "doublet {}: {} of {} angles retained",
            trace.doublet,
            angles.len(),
            raw_angles.len()
        ))
    })?;

    let report = DoubletBendReport {
        doublet: trace.doublet,
        bending_amount: bending_amount(&angles),
        angle_range: angle_range(&angles).unwrap_or(0.0),
        max_angle: max_angle(&angles).unwrap_or(0.0),
        rejected_angles,
        bent,
        point_count: trace.len(),
        dropped_points: layout.dropped_points,
        angles,
    };

    debug!(
        "Doublet {}: {} angles kept, {} rejected, bending amount {:.3}",
        report.doublet,
        report.angles.len(),
        report.rejected_angles,
        report.bending_amount
    );

    Ok(report)
}

/// Bend results for one sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleBendSummary {
    pub sample: String,
    pub reports: Vec<DoubletBendReport>,
    pub failures: Vec<DoubletFailure>,
    /// Aggregates cover measured doublets only; `None` when none were measured
    pub mean_bending_amount: Option<f64>,
    pub max_bending_amount: Option<f64>,
    pub mean_angle_range: Option<f64>,
    pub bent_doublets: Vec<u8>,
}

impl SampleBendSummary {
    pub fn verdict(&self) -> String {
        if !self.bent_doublets.is_empty() {
            format!("Doublets likely to have a bend: {:?}", self.bent_doublets)
        } else if self.reports.is_empty() {
            "No doublet had enough data to classify.".to_string()
        } else {
            "All doublets are likely straight.".to_string()
        }
    }

    pub fn is_bent(&self) -> bool {
        !self.bent_doublets.is_empty()
    }
}

/// Analyze every doublet trace of a sample.
///
/// A doublet that fails is recorded in `failures` and left out of the
/// aggregates; only an invalid segment count aborts the whole sample.
pub fn analyze_sample(
    sample: &str,
    traces: &[DoubletTrace],
    params: &BendParameters,
) -> Result<SampleBendSummary> {
    if params.num_segments == 0 {
        return Err(DyneinError::Config("num_segments must be > 0".to_string()));
    }

    let mut reports = Vec::with_capacity(traces.len());
    let mut failures = Vec::new();

    for trace in traces {
        match analyze_doublet(trace, params) {
            Ok(report) => reports.push(report),
            Err(e) => {
                warn!("{}: doublet {} skipped: {}", sample, trace.doublet, e);
                failures.push(DoubletFailure {
                    doublet: trace.doublet,
                    reason: e.to_string(),
                });
            }
        }
    }

    let amounts: Vec<f64> = reports.iter().map(|r| r.bending_amount).collect();
    let ranges: Vec<f64> = reports.iter().map(|r| r.angle_range).collect();

    Ok(SampleBendSummary {
        sample: sample.to_string(),
        mean_bending_amount: mean(&amounts),
        max_bending_amount: amounts.iter().copied().reduce(f64::max),
        mean_angle_range: mean(&ranges),
        bent_doublets: reports.iter().filter(|r| r.bent).map(|r| r.doublet).collect(),
        reports,
        failures,
    })
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
