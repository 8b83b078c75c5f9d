use thiserror::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;

/// Custom error types for the dynein conformation analysis
#[derive(Error, Debug)]
pub enum DyneinError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to load configuration from {path}: {source}")]
    ConfigLoad {
        source: toml::de::Error,
        path: PathBuf,
    },

    /// Shifted contour value outside the doublet ring table
    #[error("Doublet domain error: {0}")]
    Domain(String),

    #[error("Degenerate segment {segment} of doublet {doublet}: {reason}")]
    DegenerateSegment {
        doublet: u8,
        segment: usize,
        reason: String,
    },

    #[error("Insufficient data: {0}")]
    NoData(String),

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("Zero expected frequency in contingency table at row {row}, column {column}")]
    ZeroExpectedFrequency { row: usize, column: usize },

    #[error("Statistics error: {0}")]
    Statistics(String),

    #[error("CSV error: {0}")]
    CsvOutput(#[from] csv::Error),

    #[error("Report formatting error: {0}")]
    Format(#[from] fmt::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input path: {0}")]
    InvalidPath(PathBuf),

    #[error("Invalid input data: {0}")]
    InvalidInput(String),

    #[error("Unexpected error: {0}")]
    Other(String),
}

/// Type alias for Result with our custom error type
pub type Result<T> = std::result::Result<T, DyneinError>;
