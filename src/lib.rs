//! McM test log analyzer
//!
//! This library extracts generator metrics (cross section, filter and matching
//! efficiencies, time and size per event) from the stdout/stderr logs of
//! HTCondor test jobs and consolidates them into a CSV report keyed by prepID.

pub mod config;
pub mod core;
pub mod grid;
pub mod utils;

// Re-export main analyzer types for convenience
pub use crate::config::AnalyzerConfig;
pub use crate::core::analyzer::{
    Analysis, ExtractedMetrics, JobLogs, JobRecord, LogAnalyzer, LogAnalyzerError, MissingMarker,
};
pub use crate::core::patterns::{LogLayout, Marker, Stream};
pub use crate::grid::condor::{condor_submit, SubmissionError};
pub use crate::grid::proxy::{copy_proxy, voms_proxy_path, CredentialError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Analyze a log directory and write the CSV report
///
/// This is a convenience function for simple use cases. Missing markers are
/// logged as warnings and reported as `0` in the CSV.
///
/// # Arguments
///
/// * `directory` - Directory holding the `out_*.txt` and `err_*.txt` files
/// * `csv_path` - Path of the CSV report to write
///
/// # Returns
///
/// The analysis that was written
pub fn analyze_directory<P, Q>(directory: P, csv_path: Q) -> anyhow::Result<Analysis>
where
    P: AsRef<std::path::Path>,
    Q: AsRef<std::path::Path>,
{
    use anyhow::Context;

    let directory = directory.as_ref();
    let analyzer = LogAnalyzer::new(directory)
        .with_context(|| format!("Failed to initialize analyzer for {}", directory.display()))?;
    let analysis = analyzer.export(csv_path)?;
    analysis.log_diagnostics();

    Ok(analysis)
}
