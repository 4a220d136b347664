//! Output formatter for analysis results
//!
//! This module handles exporting job records as CSV and JSON, and formatting
//! a summary table for the console.

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use colored::Colorize;
use tempfile::NamedTempFile;

use crate::core::analyzer::{Analysis, JobRecord};
use crate::core::patterns::ALL_MARKERS;

/// CSV column names, in output order
pub const CSV_HEADER: [&str; 6] = [
    "prepid",
    "Cross section (pb)",
    "Filter efficiency",
    "Match efficiency",
    "Time per event",
    "Size per event",
];

/// Render a metric as a plain decimal. `0.0` is written as `0`.
pub fn format_value(value: f64) -> String {
    value.to_string()
}

/// A report fully written to a temporary sibling of its destination.
///
/// Nothing appears at the destination until [`StagedReport::commit`]; dropping
/// an uncommitted report removes the temporary file.
#[derive(Debug)]
pub struct StagedReport {
    temp: NamedTempFile,
    output_path: PathBuf,
}

impl StagedReport {
    /// Destination of the report
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Move the report into place
    pub fn commit(self) -> io::Result<()> {
        self.temp.persist(&self.output_path).map_err(|e| e.error)?;
        Ok(())
    }
}

/// Create the temporary sibling of `output_path`.
///
/// A new report gets the same mode as any file created by the process
/// (`0o666` filtered by the umask); a replaced report keeps its mode.
fn create_temp_sibling(output_path: &Path) -> io::Result<NamedTempFile> {
    let parent = match output_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    #[allow(unused_mut)]
    let mut builder = tempfile::Builder::new();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(0o666));
    }
    let temp = builder.tempfile_in(parent)?;

    if let Ok(existing) = fs::metadata(output_path) {
        temp.as_file().set_permissions(existing.permissions())?;
    }

    Ok(temp)
}

fn stage<F>(output_path: &Path, write: F) -> io::Result<StagedReport>
where
    F: FnOnce(&mut File) -> io::Result<()>,
{
    let mut temp = create_temp_sibling(output_path)?;
    write(temp.as_file_mut())?;
    temp.as_file().sync_all()?;

    Ok(StagedReport {
        temp,
        output_path: output_path.to_path_buf(),
    })
}

/// Write a CSV report from job records without exposing it yet
///
/// # Arguments
///
/// * `records` - Records in the order they should appear
/// * `output_path` - Path where the CSV file will be written
///
/// # Returns
///
/// The staged report, to be committed by the caller
pub fn stage_csv_report(records: &[JobRecord], output_path: &Path) -> io::Result<StagedReport> {
    stage(output_path, |file| {
        let mut writer = csv::Writer::from_writer(file);

        writer.write_record(CSV_HEADER)?;

        for record in records {
            let mut row = Vec::with_capacity(CSV_HEADER.len());
            row.push(record.prepid.clone());
            row.extend(ALL_MARKERS.iter().map(|&marker| format_value(record.value(marker))));
            writer.write_record(&row)?;
        }

        writer.flush()
    })
}

/// Write job records as a JSON array without exposing the file yet
pub fn stage_records_json(records: &[JobRecord], output_path: &Path) -> io::Result<StagedReport> {
    stage(output_path, |file| {
        serde_json::to_writer_pretty(&mut *file, records)?;
        file.write_all(b"\n")
    })
}

/// Create a CSV report from job records
pub fn create_csv_report(records: &[JobRecord], output_path: &Path) -> io::Result<()> {
    stage_csv_report(records, output_path)?.commit()
}

/// Export job records to a JSON file
pub fn export_records_json(records: &[JobRecord], output_path: &Path) -> io::Result<()> {
    stage_records_json(records, output_path)?.commit()
}

/// Format an analysis as a console table
pub fn format_summary(analysis: &Analysis) -> String {
    let mut output = String::new();

    if analysis.records.is_empty() {
        output.push_str("No jobs found.\n");
        return output;
    }

    let width = analysis
        .records
        .iter()
        .map(|record| record.prepid.len())
        .max()
        .unwrap_or(0)
        .max(CSV_HEADER[0].len());

    output.push_str(&format!("{:<width$}", CSV_HEADER[0], width = width).bold().to_string());
    for column in &CSV_HEADER[1..] {
        output.push_str(&format!("  {:>18}", column).bold().to_string());
    }
    output.push('\n');

    for record in &analysis.records {
        output.push_str(&format!("{:<width$}", record.prepid, width = width).cyan().to_string());
        for &marker in &ALL_MARKERS {
            let cell = format!("  {:>18}", format_value(record.value(marker)));
            let defaulted = analysis
                .diagnostics
                .iter()
                .any(|missing| missing.prepid == record.prepid && missing.marker == marker);
            if defaulted {
                output.push_str(&cell.yellow().to_string());
            } else {
                output.push_str(&cell);
            }
        }
        output.push('\n');
    }

    if !analysis.diagnostics.is_empty() {
        output.push_str(&format!(
            "\n{} {} value(s) not found and set to 0\n",
            "Warning:".yellow().bold(),
            analysis.diagnostics.len()
        ));
    }

    output
}
