// src/lib.rs - Library interface for the dynein conformation analysis

pub mod bending;
pub mod class_distribution;
pub mod config;
pub mod doublet;
pub mod errors;
pub mod metadata;
pub mod output;
pub mod pipeline;
pub mod points;
pub mod segments;
pub mod statistics;

// Re-export commonly used types and functions
pub use errors::{DyneinError, Result};
pub use config::Config;
pub use metadata::{BendDirection, MetadataFile, SampleMetadata};
pub use pipeline::{find_sample_dirs, load_sample, process_sample, PooledAnalysis, SampleAnalysis};

// Doublet normalization and segment fitting
pub use doublet::{normalize, ClockDirection};
pub use segments::{fit_segments, DirectionVector, DoubletTrace};

// Bend analysis
pub use bending::{
    analyze_doublet,
    analyze_sample,
    classify_bend,
    compute_angles,
    BendParameters,
    DoubletBendReport,
    SampleBendSummary,
};

// Significance testing
pub use statistics::{
    build_contingency,
    chi_square_test,
    pairwise_tests,
    run_tests,
    ChiSquareResult,
    ClassGroupReport,
    ContingencyTable,
    SignificanceAccumulator,
    TestDesign,
};

pub use points::{assign_doublets, DoubletCounts, DoubletPointTable, PointRecord, UnmappedContour};
pub use class_distribution::{ClassDistribution, DistributionMode};
