//! VOMS proxy lookup
//!
//! Jobs need a copy of the grid proxy in a location the batch nodes can read.
//! The active proxy is located through `voms-proxy-info` and copied into the
//! test area cache.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info};

/// Program reporting the active proxy
pub const VOMS_PROXY_INFO: &str = "voms-proxy-info";

/// Errors raised while locating or copying the proxy
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// The proxy info program could not be started
    #[error("Could not run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// No proxy is active, or its path is not reported
    #[error("No active VOMS proxy found: {0}")]
    NoActiveProxy(String),

    /// The cache location is unknown because no home directory is set
    #[error("Cannot determine the home directory for the proxy cache")]
    NoHomeDirectory,

    /// The proxy could not be copied into the cache
    #[error("Failed to copy proxy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Extract the proxy path from `voms-proxy-info` output.
///
/// The path is read from the first line starting with `path`, e.g.
/// `path      : /tmp/x509up_u1000`.
pub fn parse_proxy_path(stdout: &str) -> Option<PathBuf> {
    let line = stdout.lines().find(|line| line.starts_with("path"))?;
    let start = line.rfind(" /")? + 1;
    Some(PathBuf::from(line[start..].trim_end()))
}

/// Path of the active proxy
pub fn voms_proxy_path() -> Result<PathBuf, CredentialError> {
    proxy_path_with(VOMS_PROXY_INFO)
}

/// Path of the active proxy, as reported by a specific program
pub fn proxy_path_with(program: &str) -> Result<PathBuf, CredentialError> {
    let output = Command::new(program)
        .output()
        .map_err(|source| CredentialError::Spawn {
            program: program.to_string(),
            source,
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(CredentialError::NoActiveProxy(stderr.trim().to_string()));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let path = parse_proxy_path(&stdout).ok_or_else(|| {
        CredentialError::NoActiveProxy(format!("{} reported no path", program))
    })?;
    debug!("Active proxy: {}", path.display());

    Ok(path)
}

/// Default proxy cache: `~/mcm_testarea/.voms`
pub fn default_proxy_cache_dir() -> Result<PathBuf, CredentialError> {
    let home = std::env::var_os("HOME").ok_or(CredentialError::NoHomeDirectory)?;
    Ok(PathBuf::from(home).join("mcm_testarea").join(".voms"))
}

/// Copy the proxy at `proxy_path` into `cache_dir`, creating it if needed.
///
/// # Returns
///
/// Path of the copy
pub fn copy_proxy_to(proxy_path: &Path, cache_dir: &Path) -> Result<PathBuf, CredentialError> {
    let file_name = proxy_path
        .file_name()
        .ok_or_else(|| CredentialError::NoActiveProxy(format!("{} is not a file", proxy_path.display())))?;
    let destination = cache_dir.join(file_name);

    let copy_error = |source: io::Error| CredentialError::Copy {
        from: proxy_path.to_path_buf(),
        to: destination.clone(),
        source,
    };

    fs::create_dir_all(cache_dir).map_err(copy_error)?;
    fs::copy(proxy_path, &destination).map_err(copy_error)?;
    info!("Proxy copied to {}", destination.display());

    Ok(destination)
}

/// Locate the active proxy and copy it into `cache_dir`
pub fn copy_proxy(cache_dir: &Path) -> Result<PathBuf, CredentialError> {
    let proxy_path = voms_proxy_path()?;
    copy_proxy_to(&proxy_path, cache_dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_proxy_path() {
        let stdout = "subject   : /DC=ch/DC=cern/CN=user\n\
                      issuer    : /DC=ch/DC=cern/CN=user\n\
                      path      : /tmp/x509up_u1000\n\
                      timeleft  : 11:59:58\n";
        assert_eq!(parse_proxy_path(stdout), Some(PathBuf::from("/tmp/x509up_u1000")));
        assert_eq!(parse_proxy_path("timeleft  : 0:00:00\n"), None);
    }

    #[test]
    fn test_copy_creates_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let proxy = dir.path().join("x509up_u1000");
        fs::write(&proxy, "proxy").unwrap();
        let cache = dir.path().join("mcm_testarea").join(".voms");

        let copied = copy_proxy_to(&proxy, &cache).unwrap();
        assert_eq!(copied, cache.join("x509up_u1000"));
        assert_eq!(fs::read_to_string(&copied).unwrap(), "proxy");
    }

    #[test]
    fn test_copy_missing_proxy_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = copy_proxy_to(&dir.path().join("absent"), dir.path()).unwrap_err();
        assert!(matches!(err, CredentialError::Copy { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_info_program() {
        let err = proxy_path_with("false").unwrap_err();
        assert!(matches!(err, CredentialError::NoActiveProxy(_)));
    }
}
