// src/points.rs - Doublet point tables: loading, doublet assignment and count tables

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use csv::{Reader, Writer};
use log::warn;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

use crate::doublet::{normalize, RING_SIZE};
use crate::errors::{DyneinError, Result};
use crate::metadata::SampleMetadata;
use crate::segments::DoubletTrace;

/// Doublet -> number of particles, ordered by doublet
pub type DoubletCounts = BTreeMap<u8, u64>;

/// One row of a contour point export
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct PointRecord {
    #[serde(rename = "Point")]
    pub point: u64,
    #[serde(rename = "Contour")]
    pub contour: i64,
    #[serde(rename = "X")]
    pub x: f64,
    #[serde(rename = "Y")]
    pub y: f64,
    #[serde(rename = "Z")]
    pub z: f64,
}

#[derive(Debug, Deserialize)]
struct ClassRecord {
    class: f64,
}

/// A point with its canonical doublet and class code
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifiedPoint {
    pub point: u64,
    pub contour: i64,
    pub position: Point3<f64>,
    pub doublet: u8,
    pub class_code: u8,
}

#[derive(Debug, Serialize)]
struct ClassifiedRow {
    #[serde(rename = "Point")]
    point: u64,
    #[serde(rename = "Contour")]
    contour: i64,
    #[serde(rename = "X")]
    x: f64,
    #[serde(rename = "Y")]
    y: f64,
    #[serde(rename = "Z")]
    z: f64,
    #[serde(rename = "Doublet")]
    doublet: u8,
    class: u8,
}

/// A raw contour that could not be placed on the doublet ring; its points are left out
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnmappedContour {
    pub contour: i64,
    pub points: usize,
    pub reason: String,
}

/// All classified points of one sample, in acquisition order
#[derive(Debug, Clone, PartialEq)]
pub struct DoubletPointTable {
    pub sample: String,
    pub points: Vec<ClassifiedPoint>,
    /// Contours outside the doublet table, ordered by contour
    pub unmapped: Vec<UnmappedContour>,
}

impl DoubletPointTable {
    /// One trace per doublet 1..=9 in doublet order; point order is preserved
    pub fn traces(&self) -> Vec<DoubletTrace> {
        (1..=RING_SIZE)
            .map(|doublet| {
                let points = self
                    .points
                    .iter()
                    .filter(|p| p.doublet == doublet)
                    .map(|p| p.position)
                    .collect();
                DoubletTrace::new(doublet, points)
            })
            .collect()
    }

    pub fn doublet_counts(&self) -> DoubletCounts {
        let mut counts = DoubletCounts::new();
        for p in &self.points {
            *counts.entry(p.doublet).or_insert(0) += 1;
        }
        counts
    }

    /// `(doublet, class_code)` per point
    pub fn observations(&self) -> impl Iterator<Item = (u8, u8)> + '_ {
        self.points.iter().map(|p| (p.doublet, p.class_code))
    }
}

/// Attach class codes (joined by row position) and canonical doublets to raw points.
///
/// A contour outside the doublet table only loses its own points; it is
/// recorded in [`DoubletPointTable::unmapped`] and the rest of the sample is kept.
pub fn assign_doublets(
    sample: &str,
    records: &[PointRecord],
    class_codes: &[u8],
    metadata: &SampleMetadata,
) -> Result<DoubletPointTable> {
    if records.len() != class_codes.len() {
        return Err(DyneinError::InvalidInput(format!(
            "{}: {} points but {} class codes",
            sample,
            records.len(),
            class_codes.len()
        )));
    }

    let clockwise = metadata.clock().is_clockwise();
    let mut points = Vec::with_capacity(records.len());
    let mut unmapped: BTreeMap<i64, UnmappedContour> = BTreeMap::new();

    for (record, &class_code) in records.iter().zip(class_codes) {
        match normalize(record.contour, metadata.first_doublet, clockwise) {
            Ok(doublet) => points.push(ClassifiedPoint {
                point: record.point,
                contour: record.contour,
                position: Point3::new(record.x, record.y, record.z),
                doublet,
                class_code,
            }),
            Err(e @ DyneinError::Domain(_)) => {
                unmapped
                    .entry(record.contour)
                    .or_insert_with(|| UnmappedContour {
                        contour: record.contour,
                        points: 0,
                        reason: e.to_string(),
                    })
                    .points += 1;
            }
            Err(e) => return Err(e),
        }
    }

    for contour in unmapped.values() {
        warn!(
            "{}: {} point(s) of contour {} left out: {}",
            sample, contour.points, contour.contour, contour.reason
        );
    }

    Ok(DoubletPointTable {
        sample: sample.to_string(),
        points,
        unmapped: unmapped.into_values().collect(),
    })
}

/// Read a `Point,Contour,X,Y,Z` CSV
pub fn read_point_records<P: AsRef<Path>>(path: P) -> Result<Vec<PointRecord>> {
    let mut reader = Reader::from_path(path.as_ref())?;
    let records = reader
        .deserialize()
        .collect::<std::result::Result<Vec<PointRecord>, csv::Error>>()?;
    Ok(records)
}

/// Read the `class` column of a classification (MOTL) CSV
pub fn read_class_codes<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let path = path.as_ref();
    let mut reader = Reader::from_path(path)?;

    reader
        .deserialize::<ClassRecord>()
        .enumerate()
        .map(|(row, record)| -> Result<u8> {
            let class = record?.class;
            if class.fract() != 0.0 || class < 1.0 || class > u8::MAX as f64 {
                return Err(DyneinError::InvalidInput(format!(
                    "{}: row {} has class {}, expected a small positive integer",
                    path.display(),
                    row + 1,
                    class
                )));
            }
            Ok(class as u8)
        })
        .collect()
}

/// Write the classified table as `Point,Contour,X,Y,Z,Doublet,class`
pub fn write_point_table<P: AsRef<Path>>(table: &DoubletPointTable, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = Writer::from_path(path)?;
    for p in &table.points {
        writer.serialize(ClassifiedRow {
            point: p.point,
            contour: p.contour,
            x: p.position.x,
            y: p.position.y,
            z: p.position.z,
            doublet: p.doublet,
            class: p.class_code,
        })?;
    }
    writer.flush()?;

    Ok(())
}

/// Write the `Doublet,Count` table
pub fn write_doublet_counts<P: AsRef<Path>>(counts: &DoubletCounts, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = Writer::from_path(path)?;
    writer.write_record(["Doublet", "Count"])?;
    for (doublet, count) in counts {
        writer.write_record([doublet.to_string(), count.to_string()])?;
    }
    writer.flush()?;

    Ok(())
}
