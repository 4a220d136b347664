//! HTCondor job submission

use std::io;
use std::path::Path;
use std::process::{Command, ExitStatus};

use log::{debug, info};

/// Program used to submit jobs
pub const CONDOR_SUBMIT: &str = "condor_submit";

/// Errors raised while submitting a job
#[derive(Debug, thiserror::Error)]
pub enum SubmissionError {
    /// The submission program could not be started
    #[error("Could not run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The scheduler rejected the submission
    #[error("Condor submission failed ({status}): {diagnostic}")]
    Rejected { status: ExitStatus, diagnostic: String },

    /// The submission succeeded but printed no job identifier
    #[error("Condor submission printed no job identifier")]
    NoJobId,
}

/// Extract the job identifier from `condor_submit` output.
///
/// The identifier is the last word of the output with its dots removed, e.g.
/// `1 job(s) submitted to cluster 4242.` yields `4242`.
pub fn parse_job_id(stdout: &str) -> Option<String> {
    let job_id: String = stdout.split_whitespace().last()?.replace('.', "");
    (!job_id.is_empty()).then_some(job_id)
}

/// Submit `jobfile` with `condor_submit` and return the assigned job identifier
pub fn condor_submit(jobfile: &Path) -> Result<String, SubmissionError> {
    submit_with(CONDOR_SUBMIT, jobfile)
}

/// Submit `jobfile` using a specific submission program
pub fn submit_with(program: &str, jobfile: &Path) -> Result<String, SubmissionError> {
    debug!("Running {} {}", program, jobfile.display());

    let output = Command::new(program)
        .arg(jobfile)
        .output()
        .map_err(|source| SubmissionError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SubmissionError::Rejected {
            status: output.status,
            diagnostic: stderr.trim().to_string(),
        });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let job_id = parse_job_id(&stdout).ok_or(SubmissionError::NoJobId)?;
    info!("Submitted {} as job {}", jobfile.display(), job_id);

    Ok(job_id)
}
