// src/output.rs - Text, CSV and JSON reports for samples and pooled groups

use std::fmt::{self, Write as _};
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};

use csv::Writer;
use log::info;
use serde::Serialize;

use crate::bending::SampleBendSummary;
use crate::class_distribution::ClassDistribution;
use crate::config::Config;
use crate::errors::Result;
use crate::pipeline::{PooledGroup, SampleAnalysis};
use crate::points::{write_doublet_counts, write_point_table, DoubletCounts, UnmappedContour};
use crate::statistics::{ChiSquareResult, ClassGroupReport};

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn format_option(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "n/a".to_string())
}

fn write_aggregates(out: &mut String, summary: &SampleBendSummary) -> fmt::Result {
    writeln!(out, "Mean Bending Amount: {}", format_option(summary.mean_bending_amount))?;
    writeln!(out, "Average angle difference: {}", format_option(summary.mean_angle_range))?;
    writeln!(out, "Maximum Bending Amount: {}", format_option(summary.max_bending_amount))?;
    writeln!(out, "{}", summary.verdict())
}

fn write_bending_text(out: &mut String, summary: &SampleBendSummary, unmapped: &[UnmappedContour]) -> fmt::Result {
    for report in &summary.reports {
        writeln!(out, "Angles for doublet {} (in degrees): {:?}", report.doublet, report.angles)?;
        writeln!(out, "Max angle difference: {}", report.angle_range)?;
        writeln!(out, "Bending amount for doublet {}: {}\n", report.doublet, report.bending_amount)?;
    }

    if !summary.failures.is_empty() {
        writeln!(out, "Doublets without a measurement:")?;
        for failure in &summary.failures {
            writeln!(out, "  Doublet {}: {}", failure.doublet, failure.reason)?;
        }
        writeln!(out)?;
    }

    if !unmapped.is_empty() {
        writeln!(out, "Contours left out of the doublet assignment:")?;
        for contour in unmapped {
            writeln!(out, "  Contour {} ({} points): {}", contour.contour, contour.points, contour.reason)?;
        }
        writeln!(out)?;
    }

    writeln!(out, "\nAggregate Scores:")?;
    write_aggregates(out, summary)
}

/// Per-doublet angles, failures and unmapped contours plus the sample aggregates, as plain text
pub fn render_bending_report(summary: &SampleBendSummary, unmapped: &[UnmappedContour]) -> Result<String> {
    let mut text = String::new();
    write_bending_text(&mut text, summary, unmapped)?;
    Ok(text)
}

pub fn write_bending_report<P: AsRef<Path>>(
    summary: &SampleBendSummary,
    unmapped: &[UnmappedContour],
    output_dir: P,
) -> Result<PathBuf> {
    let path = output_dir.as_ref().join(format!("{}_bending_results.txt", summary.sample));
    ensure_parent(&path)?;
    fs::write(&path, render_bending_report(summary, unmapped)?)?;
    Ok(path)
}

/// Append one sample's aggregate block to the batch overview
pub fn append_bending_overview<P: AsRef<Path>>(summary: &SampleBendSummary, overview_path: P) -> Result<()> {
    let path = overview_path.as_ref();
    ensure_parent(path)?;

    let mut block = String::new();
    writeln!(block, "Aggregate Scores for {}:", summary.sample)?;
    write_aggregates(&mut block, summary)?;
    writeln!(block)?;

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(block.as_bytes())?;

    Ok(())
}

/// One row per doublet, failed doublets included with their reason
pub fn write_bending_csv<P: AsRef<Path>>(summary: &SampleBendSummary, output_dir: P) -> Result<()> {
    let path = output_dir.as_ref().join(format!("{}_bending.csv", summary.sample));
    ensure_parent(&path)?;

    let mut writer = Writer::from_path(&path)?;
    writer.write_record([
        "Doublet",
        "Points",
        "Dropped_Points",
        "Retained_Angles",
        "Rejected_Angles",
        "Bending_Amount",
        "Angle_Range",
        "Max_Angle",
        "Bent",
        "Error",
    ])?;

    let mut rows: Vec<(u8, Vec<String>)> = summary
        .reports
        .iter()
        .map(|r| {
            (
                r.doublet,
                vec![
                    r.doublet.to_string(),
                    r.point_count.to_string(),
                    r.dropped_points.to_string(),
                    r.angles.len().to_string(),
                    r.rejected_angles.to_string(),
                    format!("{:.6}", r.bending_amount),
                    format!("{:.6}", r.angle_range),
                    format!("{:.6}", r.max_angle),
                    r.bent.to_string(),
                    String::new(),
                ],
            )
        })
        .collect();

    rows.extend(summary.failures.iter().map(|f| {
        let mut row = vec![f.doublet.to_string()];
        row.extend(std::iter::repeat(String::new()).take(8));
        row.push(f.reason.clone());
        (f.doublet, row)
    }));
    rows.sort_by_key(|(doublet, _)| *doublet);

    for (_, row) in rows {
        writer.write_record(&row)?;
    }
    writer.flush()?;

    Ok(())
}

fn render_expected(result: &ChiSquareResult) -> String {
    result
        .expected
        .iter()
        .map(|row| format!("[{:.4} {:.4}]", row[0], row[1]))
        .collect::<Vec<_>>()
        .join("\n")
}

fn write_statistics_text(out: &mut String, reports: &[ClassGroupReport]) -> fmt::Result {
    for report in reports {
        writeln!(
            out,
            "Chi-Square Test Results for {} ({}, codes {:?}):",
            report.class_set.group, report.class_set.label, report.class_set.codes
        )?;

        match &report.omnibus {
            Ok(result) => {
                writeln!(out, "Chi-Square statistic: {}", result.statistic)?;
                writeln!(out, "P-value: {}", result.p_value)?;
                writeln!(out, "Degrees of freedom: {}", result.dof)?;
                writeln!(out, "Expected frequencies:\n{}", render_expected(result))?;
            }
            Err(reason) => writeln!(out, "Omnibus test not performed: {}", reason)?,
        }

        if let Some(table) = &report.table {
            writeln!(out, "Actual frequencies:")?;
            for (label, cells) in table.labels.iter().zip(&table.cells) {
                writeln!(out, "{:>6}: [{} {}]", label, cells[0], cells[1])?;
            }
        }

        writeln!(
            out,
            "\nPairwise Chi-Square Tests with Bonferroni Correction (alpha {} -> {})",
            report.alpha, report.corrected_alpha
        )?;
        for comparison in &report.pairwise {
            match &comparison.result {
                Ok(r) => writeln!(
                    out,
                    "{} vs {}: Chi-Square={}, P-value={}, Significant={}",
                    comparison.first, comparison.second, r.statistic, r.p_value, r.significant
                )?,
                Err(reason) => writeln!(out, "{} vs {}: not performed ({})", comparison.first, comparison.second, reason)?,
            }
        }
        writeln!(out, "\n")?;
    }

    Ok(())
}

/// Omnibus and pairwise results for every class group, as plain text
pub fn render_statistics(reports: &[ClassGroupReport]) -> Result<String> {
    let mut text = String::new();
    write_statistics_text(&mut text, reports)?;
    Ok(text)
}

pub fn write_statistics_report<P: AsRef<Path>>(reports: &[ClassGroupReport], path: P) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;
    fs::write(path, render_statistics(reports)?)?;
    Ok(())
}

/// Pooled statistics for one bend direction, prefixed with the samples it covers
pub fn write_pooled_statistics<P: AsRef<Path>>(group: &PooledGroup, output_dir: P) -> Result<PathBuf> {
    let path = output_dir
        .as_ref()
        .join(format!("pooled_statistics_{}.txt", group.direction.as_str()));
    ensure_parent(&path)?;

    let text = format!(
        "Pooled samples ({}): {}\n\n{}",
        group.direction.as_str(),
        group.samples().join(", "),
        render_statistics(&group.significance.finalize())?
    );
    fs::write(&path, text)?;

    Ok(path)
}

/// Class distribution as CSV, one row per doublet (group), one column per class label
pub fn write_class_distribution_csv<P: AsRef<Path>>(
    distribution: &ClassDistribution,
    config: &Config,
    normalized: bool,
    path: P,
) -> Result<()> {
    let path = path.as_ref();
    ensure_parent(path)?;

    let classes = distribution.classes();
    let mut writer = Writer::from_path(path)?;

    let mut header = vec!["Doublet".to_string()];
    header.extend(classes.iter().map(|&c| config.class_label(c)));
    writer.write_record(&header)?;

    for (row, label) in distribution.row_labels().into_iter().enumerate() {
        let mut record = vec![label.to_string()];
        for &class in &classes {
            record.push(if normalized {
                format!("{:.6}", distribution.fraction(row, class))
            } else {
                distribution.count(row, class).to_string()
            });
        }
        writer.write_record(&record)?;
    }
    writer.flush()?;

    Ok(())
}

#[derive(Serialize)]
struct SampleSummaryJson<'a> {
    sample: &'a str,
    bend_direction: &'a str,
    doublet_counts: &'a DoubletCounts,
    bending: &'a SampleBendSummary,
    unmapped_contours: &'a [UnmappedContour],
    verdict: String,
    statistics: &'a Option<Vec<ClassGroupReport>>,
}

/// Machine-readable summary of one sample
pub fn write_summary_json<P: AsRef<Path>>(analysis: &SampleAnalysis, output_dir: P) -> Result<()> {
    let path = output_dir.as_ref().join(format!("{}_summary.json", analysis.sample));
    ensure_parent(&path)?;

    let summary = SampleSummaryJson {
        sample: &analysis.sample,
        bend_direction: analysis.bend_direction.as_str(),
        doublet_counts: &analysis.doublet_counts,
        bending: &analysis.bend,
        unmapped_contours: &analysis.table.unmapped,
        verdict: analysis.bend.verdict(),
        statistics: &analysis.significance,
    };
    fs::write(&path, serde_json::to_string_pretty(&summary)?)?;

    Ok(())
}

/// Every per-sample report under `output_dir/<sample>/`
pub fn write_sample_outputs<P: AsRef<Path>>(analysis: &SampleAnalysis, output_dir: P) -> Result<PathBuf> {
    let sample_dir = output_dir.as_ref().join(&analysis.sample);
    fs::create_dir_all(&sample_dir)?;

    write_point_table(&analysis.table, sample_dir.join(format!("{}_doublets.csv", analysis.sample)))?;
    write_doublet_counts(
        &analysis.doublet_counts,
        sample_dir.join(format!("{}_doublet_counts.csv", analysis.sample)),
    )?;
    write_bending_report(&analysis.bend, &analysis.table.unmapped, &sample_dir)?;
    write_bending_csv(&analysis.bend, &sample_dir)?;

    if let Some(reports) = &analysis.significance {
        write_statistics_report(reports, sample_dir.join(format!("{}_statistics.txt", analysis.sample)))?;
    }
    write_summary_json(analysis, &sample_dir)?;

    Ok(sample_dir)
}

/// Pooled statistics and class distributions for each bend direction
pub fn write_pooled_outputs<P: AsRef<Path>>(groups: &[PooledGroup], config: &Config, output_dir: P) -> Result<()> {
    let output_dir = output_dir.as_ref();

    for group in groups {
        if group.significance.is_empty() {
            info!("No samples pooled as {}, skipping its statistics", group.direction.as_str());
        } else {
            write_pooled_statistics(group, output_dir)?;
        }

        for distribution in [&group.grouped, &group.single] {
            if distribution.is_empty() {
                continue;
            }
            let stem = format!(
                "class_distribution_{}_{}",
                distribution.mode.as_str(),
                group.direction.as_str()
            );
            write_class_distribution_csv(distribution, config, false, output_dir.join(format!("{}.csv", stem)))?;
            write_class_distribution_csv(
                distribution,
                config,
                true,
                output_dir.join(format!("{}_fraction.csv", stem)),
            )?;
        }
    }

    Ok(())
}
