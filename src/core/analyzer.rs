//! Core log analyzer implementation
//!
//! Discovers the stdout/stderr log pairs of HTCondor test jobs in a directory,
//! scans each log for the generator metric markers and consolidates the values
//! into one record per prepID.
//!
//! The stages are kept separate: discovery yields immutable [`JobLogs`],
//! extraction turns one log file into [`ExtractedMetrics`], and
//! [`build_analysis`] merges both passes into [`JobRecord`]s plus a list of
//! [`MissingMarker`] diagnostics.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde::Serialize;

use crate::config::AnalyzerConfig;
use crate::core::patterns::{LogLayout, Marker, Stream, ALL_MARKERS, STDERR_MARKERS, STDOUT_MARKERS};
use crate::utils::file_utils::{self, LogLines};
use crate::utils::output_formatter;

/// Errors that abort an analysis run
#[derive(Debug, thiserror::Error)]
pub enum LogAnalyzerError {
    /// The log directory cannot be resolved or listed
    #[error("Cannot read log directory {path}: {source}")]
    Directory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A discovered job lacks one of its two log files
    #[error("{stream} file not found for {prepid}: {path}")]
    MissingFile {
        prepid: String,
        stream: Stream,
        path: PathBuf,
    },

    /// A log file could not be opened or read to the end
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Strict mode refuses to export records with defaulted fields
    #[error("{} metric(s) missing from job logs: {}", .missing.len(), describe_missing(.missing))]
    IncompleteLogs { missing: Vec<MissingMarker> },

    /// The report could not be written
    #[error("Failed to write report {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, LogAnalyzerError>;

fn describe_missing(missing: &[MissingMarker]) -> String {
    missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// The log pair of one job, as found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLogs {
    pub prepid: String,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
}

/// Values found in a single log file, keyed by marker
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedMetrics {
    values: BTreeMap<Marker, f64>,
}

impl ExtractedMetrics {
    /// Value of `marker`, if the log carried it
    pub fn get(&self, marker: Marker) -> Option<f64> {
        self.values.get(&marker).copied()
    }

    /// Markers that produced a value
    pub fn found(&self) -> impl Iterator<Item = Marker> + '_ {
        self.values.keys().copied()
    }

    fn insert(&mut self, marker: Marker, value: f64) {
        self.values.insert(marker, value);
    }
}

/// A marker that never produced a value in a job's log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingMarker {
    pub prepid: String,
    pub marker: Marker,
}

impl fmt::Display for MissingMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} for {}", self.marker, self.prepid)
    }
}

/// Consolidated metrics of one job. Fields not found in the logs are `0.0`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobRecord {
    pub prepid: String,
    pub stdout_path: PathBuf,
    pub stderr_path: PathBuf,
    pub cross_section_pb: f64,
    pub filter_efficiency: f64,
    pub match_efficiency: f64,
    pub time_per_event: f64,
    pub size_per_event: f64,
}

impl JobRecord {
    /// Value of the field a marker feeds
    pub fn value(&self, marker: Marker) -> f64 {
        match marker {
            Marker::CrossSection => self.cross_section_pb,
            Marker::FilterEfficiency => self.filter_efficiency,
            Marker::MatchEfficiency => self.match_efficiency,
            Marker::TimePerEvent => self.time_per_event,
            Marker::SizePerEvent => self.size_per_event,
        }
    }
}

/// Result of one analysis run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Analysis {
    pub records: Vec<JobRecord>,
    pub diagnostics: Vec<MissingMarker>,
}

impl Analysis {
    /// Look up the record of a job
    pub fn record(&self, prepid: &str) -> Option<&JobRecord> {
        self.records.iter().find(|record| record.prepid == prepid)
    }

    /// True when every marker was found for every job
    pub fn is_complete(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Fail with [`LogAnalyzerError::IncompleteLogs`] if any field was defaulted
    pub fn ensure_complete(&self) -> Result<()> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(LogAnalyzerError::IncompleteLogs {
                missing: self.diagnostics.clone(),
            })
        }
    }

    /// Emit one warning per missing marker
    pub fn log_diagnostics(&self) {
        for missing in &self.diagnostics {
            warn!("{} not found, setting to 0", missing);
        }
    }

    /// Write the CSV report and, optionally, the JSON export.
    ///
    /// Both files are written in full before either is moved into place, so
    /// a failure on one leaves no report behind.
    pub fn write_reports(&self, csv_path: &Path, json_path: Option<&Path>) -> Result<()> {
        let write_error = |path: &Path| {
            let path = path.to_path_buf();
            move |source: io::Error| LogAnalyzerError::Write { path, source }
        };

        let csv = output_formatter::stage_csv_report(&self.records, csv_path)
            .map_err(write_error(csv_path))?;
        let json = match json_path {
            Some(path) => Some(
                output_formatter::stage_records_json(&self.records, path)
                    .map_err(write_error(path))?,
            ),
            None => None,
        };

        csv.commit().map_err(write_error(csv_path))?;
        info!("CSV file saved: {}", csv_path.display());

        if let (Some(json), Some(path)) = (json, json_path) {
            json.commit().map_err(write_error(path))?;
            info!("JSON file saved: {}", path.display());
        }

        Ok(())
    }

    /// Write the records as a JSON array to `path`
    pub fn write_json(&self, path: &Path) -> Result<()> {
        output_formatter::export_records_json(&self.records, path).map_err(|source| {
            LogAnalyzerError::Write {
                path: path.to_path_buf(),
                source,
            }
        })?;
        info!("JSON file saved: {}", path.display());
        Ok(())
    }
}

/// Find the log pairs in `directory`.
///
/// Every file following the stdout naming convention registers a job. Both
/// of its log files must exist, otherwise discovery fails as a whole.
///
/// # Arguments
///
/// * `directory` - Absolute path of the log directory
/// * `layout` - Naming convention of the log files
///
/// # Returns
///
/// Jobs ordered by prepID
pub fn discover_jobs(directory: &Path, layout: &LogLayout) -> Result<Vec<JobLogs>> {
    let names = file_utils::list_file_names(directory).map_err(|source| {
        LogAnalyzerError::Directory {
            path: directory.to_path_buf(),
            source,
        }
    })?;

    let prepids: BTreeSet<&str> = names
        .iter()
        .filter_map(|name| layout.prepid_from_stdout_name(name))
        .collect();

    let mut jobs = Vec::with_capacity(prepids.len());
    for prepid in prepids {
        let stderr_path = layout.path_in(directory, Stream::Stderr, prepid);
        if !file_utils::is_existing_file(&stderr_path) {
            return Err(LogAnalyzerError::MissingFile {
                prepid: prepid.to_string(),
                stream: Stream::Stderr,
                path: stderr_path,
            });
        }

        let stdout_path = layout.path_in(directory, Stream::Stdout, prepid);
        if !file_utils::is_existing_file(&stdout_path) {
            return Err(LogAnalyzerError::MissingFile {
                prepid: prepid.to_string(),
                stream: Stream::Stdout,
                path: stdout_path,
            });
        }

        jobs.push(JobLogs {
            prepid: prepid.to_string(),
            stdout_path,
            stderr_path,
        });
    }

    debug!("Discovered {} job(s) in {}", jobs.len(), directory.display());
    Ok(jobs)
}

/// How the markers of one stream compete for a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchMode {
    /// Every marker is tested on every line
    Independent,
    /// Markers are tested in order and the first match claims the line
    FirstWins,
}

/// Offer one line to the markers and record any value it carries.
///
/// Returns how many markers claimed the line: at most one in
/// [`MatchMode::FirstWins`].
fn apply_markers(line: &str, markers: &[Marker], mode: MatchMode, metrics: &mut ExtractedMetrics) -> usize {
    let mut claimed = 0;

    for &marker in markers {
        if !marker.matches(line) {
            continue;
        }

        claimed += 1;
        match marker.parse_value(line) {
            Some(value) => metrics.insert(marker, value),
            None => debug!("{} line without a number: {}", marker, line),
        }

        if mode == MatchMode::FirstWins {
            break;
        }
    }

    claimed
}

/// Single forward pass over a log file. A later occurrence of a marker
/// replaces an earlier one.
fn scan_markers(path: &Path, markers: &[Marker], mode: MatchMode) -> io::Result<ExtractedMetrics> {
    let mut lines = LogLines::open(path)?;
    let mut metrics = ExtractedMetrics::default();

    debug!("Scanning {}", lines.path().display());
    while let Some(line) = lines.next_line()? {
        apply_markers(&line, markers, mode, &mut metrics);
    }

    Ok(metrics)
}

/// Extract the time/event and size/event values from a stdout log
pub fn extract_stdout_metrics(path: &Path) -> io::Result<ExtractedMetrics> {
    scan_markers(path, &STDOUT_MARKERS, MatchMode::Independent)
}

/// Extract the cross section and filter/matching efficiencies from a stderr log
pub fn extract_stderr_metrics(path: &Path) -> io::Result<ExtractedMetrics> {
    scan_markers(path, &STDERR_MARKERS, MatchMode::FirstWins)
}

/// Merge the two scan passes into records, defaulting missing values to `0.0`.
///
/// `stdout` and `stderr` are aligned with `jobs`.
pub fn build_analysis(
    jobs: &[JobLogs],
    stdout: &[ExtractedMetrics],
    stderr: &[ExtractedMetrics],
) -> Analysis {
    let mut analysis = Analysis::default();

    for ((job, out), err) in jobs.iter().zip(stdout).zip(stderr) {
        let mut value_of = |marker: Marker| {
            let source = match marker.stream() {
                Stream::Stdout => out,
                Stream::Stderr => err,
            };
            source.get(marker).unwrap_or_else(|| {
                analysis.diagnostics.push(MissingMarker {
                    prepid: job.prepid.clone(),
                    marker,
                });
                0.0
            })
        };

        let [cross_section_pb, filter_efficiency, match_efficiency, time_per_event, size_per_event] =
            ALL_MARKERS.map(&mut value_of);

        analysis.records.push(JobRecord {
            prepid: job.prepid.clone(),
            stdout_path: job.stdout_path.clone(),
            stderr_path: job.stderr_path.clone(),
            cross_section_pb,
            filter_efficiency,
            match_efficiency,
            time_per_event,
            size_per_event,
        });
    }

    analysis
}

/// Analyzer for the logs of one directory of HTCondor test jobs
#[derive(Debug, Clone)]
pub struct LogAnalyzer {
    directory: PathBuf,
    layout: LogLayout,
    strict: bool,
    jobs: Vec<JobLogs>,
}

impl LogAnalyzer {
    /// Create an analyzer for `directory` using the default `out_`/`err_` layout.
    ///
    /// Fails immediately if the directory cannot be read or a job is missing
    /// one of its log files.
    pub fn new<P: AsRef<Path>>(directory: P) -> Result<Self> {
        Self::with_layout(directory, LogLayout::default())
    }

    /// Create an analyzer from a loaded configuration
    pub fn from_config<P: AsRef<Path>>(directory: P, config: &AnalyzerConfig) -> Result<Self> {
        let analyzer = Self::with_layout(directory, config.layout.clone())?;
        Ok(analyzer.strict(config.strict))
    }

    /// Create an analyzer for `directory` with a custom naming layout
    pub fn with_layout<P: AsRef<Path>>(directory: P, layout: LogLayout) -> Result<Self> {
        let directory = directory.as_ref();
        let directory = directory
            .canonicalize()
            .map_err(|source| LogAnalyzerError::Directory {
                path: directory.to_path_buf(),
                source,
            })?;

        let jobs = discover_jobs(&directory, &layout)?;
        info!("Found {} job(s) in {}", jobs.len(), directory.display());

        Ok(Self {
            directory,
            layout,
            strict: false,
            jobs,
        })
    }

    /// Refuse to export when any metric had to be defaulted
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Absolute path of the analyzed directory
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Naming layout in use
    pub fn layout(&self) -> &LogLayout {
        &self.layout
    }

    /// Discovered jobs, ordered by prepID
    pub fn jobs(&self) -> &[JobLogs] {
        &self.jobs
    }

    /// Scan every stdout log. The result is aligned with [`Self::jobs`].
    pub fn scan_stdout_metrics(&self) -> Result<Vec<ExtractedMetrics>> {
        self.scan_all(|job| &job.stdout_path, extract_stdout_metrics)
    }

    /// Scan every stderr log. The result is aligned with [`Self::jobs`].
    pub fn scan_stderr_metrics(&self) -> Result<Vec<ExtractedMetrics>> {
        self.scan_all(|job| &job.stderr_path, extract_stderr_metrics)
    }

    fn scan_all<F, E>(&self, path_of: F, extract: E) -> Result<Vec<ExtractedMetrics>>
    where
        F: Fn(&JobLogs) -> &PathBuf,
        E: Fn(&Path) -> io::Result<ExtractedMetrics>,
    {
        self.jobs
            .iter()
            .map(|job| {
                let path = path_of(job);
                extract(path.as_path()).map_err(|source| LogAnalyzerError::Read {
                    path: path.clone(),
                    source,
                })
            })
            .collect()
    }

    /// Run both scan passes and merge them into records
    pub fn analyze(&self) -> Result<Analysis> {
        let stdout = self.scan_stdout_metrics()?;
        let stderr = self.scan_stderr_metrics()?;
        Ok(build_analysis(&self.jobs, &stdout, &stderr))
    }

    /// Analyze the directory and write the CSV report to `csv_path`.
    ///
    /// Each call rescans the logs, so repeated exports of an unchanged
    /// directory are byte-identical. Nothing is written if a scan fails, or,
    /// in strict mode, if any metric is missing.
    pub fn export<P: AsRef<Path>>(&self, csv_path: P) -> Result<Analysis> {
        self.export_all(csv_path.as_ref(), None)
    }

    /// Analyze the directory and write the CSV report plus an optional JSON
    /// export. Neither file appears unless both could be written.
    pub fn export_all(&self, csv_path: &Path, json_path: Option<&Path>) -> Result<Analysis> {
        let analysis = self.analyze()?;
        if self.strict {
            analysis.ensure_complete()?;
        }
        analysis.write_reports(csv_path, json_path)?;
        Ok(analysis)
    }

    /// Analyze the directory and write the records as JSON to `json_path`
    pub fn export_json<P: AsRef<Path>>(&self, json_path: P) -> Result<Analysis> {
        let analysis = self.analyze()?;
        if self.strict {
            analysis.ensure_complete()?;
        }
        analysis.write_json(json_path.as_ref())?;
        Ok(analysis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_log(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_stdout_markers_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(
            dir.path(),
            "out_A.txt",
            "Begin processing\nMcM time_event: 12.5 sec\nnoise\nMcM Size/event: 310.25 kB\n",
        );

        let metrics = extract_stdout_metrics(&path).unwrap();
        assert_eq!(metrics.get(Marker::TimePerEvent), Some(12.5));
        assert_eq!(metrics.get(Marker::SizePerEvent), Some(310.25));
        assert_eq!(metrics.get(Marker::CrossSection), None);
    }

    #[test]
    fn test_stderr_markers() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(
            dir.path(),
            "err_A.txt",
            "After filter: final cross section = 1.23e-05 pb\nMatching efficiency = 0.75 +- 0.01\n",
        );

        let metrics = extract_stderr_metrics(&path).unwrap();
        assert_eq!(metrics.get(Marker::CrossSection), Some(1.23e-05));
        assert_eq!(metrics.get(Marker::MatchEfficiency), Some(0.75));
        assert_eq!(metrics.get(Marker::FilterEfficiency), None);
        assert_eq!(metrics.found().count(), 2);
    }

    #[test]
    fn test_first_matching_marker_claims_line() {
        let markers = [Marker::FilterEfficiency, Marker::FilterEfficiency, Marker::MatchEfficiency];
        let line = "Filter efficiency (event-level): 0.42";

        let mut metrics = ExtractedMetrics::default();
        assert_eq!(apply_markers(line, &markers, MatchMode::FirstWins, &mut metrics), 1);
        assert_eq!(metrics.get(Marker::FilterEfficiency), Some(0.42));

        let mut metrics = ExtractedMetrics::default();
        assert_eq!(apply_markers(line, &markers, MatchMode::Independent, &mut metrics), 2);

        let mut metrics = ExtractedMetrics::default();
        assert_eq!(apply_markers("Matching efficiency 0.5", &markers, MatchMode::FirstWins, &mut metrics), 1);
        assert_eq!(metrics.get(Marker::MatchEfficiency), Some(0.5));
        assert_eq!(metrics.get(Marker::FilterEfficiency), None);
    }

    #[test]
    fn test_last_occurrence_wins() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(
            dir.path(),
            "err_A.txt",
            "Filter efficiency (event-level): 0.10\nFilter efficiency (event-level): 0.42\n",
        );

        let metrics = extract_stderr_metrics(&path).unwrap();
        assert_eq!(metrics.get(Marker::FilterEfficiency), Some(0.42));
    }

    #[test]
    fn test_marker_without_number_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_log(dir.path(), "out_A.txt", "McM time_event: unavailable\n");

        let metrics = extract_stdout_metrics(&path).unwrap();
        assert_eq!(metrics.get(Marker::TimePerEvent), None);
    }

    #[test]
    fn test_build_analysis_defaults_and_diagnostics() {
        let jobs = vec![JobLogs {
            prepid: "REQ1".to_string(),
            stdout_path: PathBuf::from("out_REQ1.txt"),
            stderr_path: PathBuf::from("err_REQ1.txt"),
        }];
        let mut stderr = ExtractedMetrics::default();
        stderr.insert(Marker::FilterEfficiency, 0.42);

        let analysis = build_analysis(&jobs, &[ExtractedMetrics::default()], &[stderr]);
        let record = analysis.record("REQ1").unwrap();
        assert_eq!(record.filter_efficiency, 0.42);
        assert_eq!(record.cross_section_pb, 0.0);
        assert_eq!(record.time_per_event, 0.0);

        let missing: Vec<Marker> = analysis.diagnostics.iter().map(|d| d.marker).collect();
        assert_eq!(
            missing,
            vec![
                Marker::CrossSection,
                Marker::MatchEfficiency,
                Marker::TimePerEvent,
                Marker::SizePerEvent,
            ]
        );
        assert!(!analysis.is_complete());
    }

    #[test]
    fn test_discovery_ignores_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        write_log(dir.path(), "out_B.txt", "");
        write_log(dir.path(), "err_B.txt", "");
        write_log(dir.path(), "out_A.txt", "");
        write_log(dir.path(), "err_A.txt", "");
        write_log(dir.path(), "condor.log", "");
        write_log(dir.path(), "err_orphan.txt", "");

        let jobs = discover_jobs(dir.path(), &LogLayout::default()).unwrap();
        let prepids: Vec<&str> = jobs.iter().map(|j| j.prepid.as_str()).collect();
        assert_eq!(prepids, vec!["A", "B"]);
        assert_eq!(jobs[0].stderr_path, dir.path().join("err_A.txt"));
    }

    #[test]
    fn test_missing_stderr_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write_log(dir.path(), "out_REQ1.txt", "");

        match discover_jobs(dir.path(), &LogLayout::default()) {
            Err(LogAnalyzerError::MissingFile { prepid, stream, path }) => {
                assert_eq!(prepid, "REQ1");
                assert_eq!(stream, Stream::Stderr);
                assert_eq!(path, dir.path().join("err_REQ1.txt"));
            }
            other => panic!("expected missing file error, got {:?}", other),
        }
    }

    #[test]
    fn test_failed_json_export_leaves_no_csv() {
        let dir = tempfile::tempdir().unwrap();
        write_log(dir.path(), "out_REQ1.txt", "McM time_event: 1.0\n");
        write_log(dir.path(), "err_REQ1.txt", "");
        let csv_path = dir.path().join("report.csv");
        let json_path = dir.path().join("missing").join("report.json");

        let analyzer = LogAnalyzer::new(dir.path()).unwrap();
        let err = analyzer.export_all(&csv_path, Some(&json_path)).unwrap_err();
        assert!(matches!(err, LogAnalyzerError::Write { ref path, .. } if path == &json_path));
        assert!(!csv_path.exists());

        analyzer.export_all(&csv_path, Some(&dir.path().join("report.json"))).unwrap();
        assert!(csv_path.exists());
        assert!(dir.path().join("report.json").exists());
    }

    #[test]
    fn test_strict_export_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        write_log(dir.path(), "out_REQ1.txt", "McM time_event: 1.0\n");
        write_log(dir.path(), "err_REQ1.txt", "");
        let csv_path = dir.path().join("report.csv");

        let analyzer = LogAnalyzer::new(dir.path()).unwrap().strict(true);
        let err = analyzer.export(&csv_path).unwrap_err();
        assert!(matches!(err, LogAnalyzerError::IncompleteLogs { ref missing } if missing.len() == 4));
        assert!(!csv_path.exists());
    }
}
