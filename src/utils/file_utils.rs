//! File handling utilities
//!
//! This module provides the directory listing used for job discovery and a
//! line reader that scans large log files without holding them in memory.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use log::debug;
use walkdir::WalkDir;

/// List the names of the regular files directly inside `directory`.
///
/// Sub-directories are not descended into. Symlinks count when they resolve
/// to a regular file; dangling or unreadable entries are skipped. Names that
/// are not valid UTF-8 cannot follow the log naming convention and are
/// skipped as well.
///
/// # Arguments
///
/// * `directory` - Directory to list
///
/// # Returns
///
/// File names sorted byte-wise. Only a failure to read `directory` itself is
/// an error.
pub fn list_file_names(directory: &Path) -> io::Result<Vec<String>> {
    let mut names = Vec::new();

    for entry in WalkDir::new(directory).min_depth(1).max_depth(1).follow_links(false) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => return Err(io::Error::from(e)),
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        let is_file = if entry.file_type().is_symlink() {
            fs::metadata(entry.path()).map(|meta| meta.is_file()).unwrap_or(false)
        } else {
            entry.file_type().is_file()
        };
        if !is_file {
            continue;
        }

        match entry.file_name().to_str() {
            Some(name) => names.push(name.to_string()),
            None => debug!("Skipping non UTF-8 file name: {}", entry.path().display()),
        }
    }

    names.sort();
    Ok(names)
}

/// Check that `path` exists as a regular file
pub fn is_existing_file(path: &Path) -> bool {
    path.is_file()
}

/// Line-by-line reader over a log file.
///
/// Invalid UTF-8 is replaced rather than treated as an error, since job logs
/// routinely contain stray binary output. The file is closed when the reader
/// is dropped.
pub struct LogLines {
    path: PathBuf,
    reader: BufReader<File>,
    buffer: Vec<u8>,
}

impl LogLines {
    /// Open `path` for scanning
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            buffer: Vec::with_capacity(256),
        })
    }

    /// Path being scanned
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the next line without its line terminator.
    ///
    /// Returns `Ok(None)` at end of file.
    pub fn next_line(&mut self) -> io::Result<Option<String>> {
        self.buffer.clear();
        let bytes_read = self.reader.read_until(b'\n', &mut self.buffer)?;
        if bytes_read == 0 {
            return Ok(None);
        }

        if self.buffer.last() == Some(&b'\n') {
            self.buffer.pop();
            if self.buffer.last() == Some(&b'\r') {
                self.buffer.pop();
            }
        }

        Ok(Some(String::from_utf8_lossy(&self.buffer).into_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_list_file_names_is_flat_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("out_b.txt"), "").unwrap();
        fs::write(dir.path().join("out_a.txt"), "").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("out_c.txt"), "").unwrap();

        let names = list_file_names(dir.path()).unwrap();
        assert_eq!(names, vec!["out_a.txt".to_string(), "out_b.txt".to_string()]);
    }

    #[cfg(unix)]
    #[test]
    fn test_list_skips_dangling_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("out_a.txt"), "").unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("stale_link")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("out_a.txt"), dir.path().join("out_b.txt")).unwrap();

        let names = list_file_names(dir.path()).unwrap();
        assert_eq!(names, vec!["out_a.txt".to_string(), "out_b.txt".to_string()]);
    }

    #[test]
    fn test_list_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list_file_names(&dir.path().join("absent")).is_err());
    }

    #[test]
    fn test_log_lines_handles_crlf_and_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.txt");
        fs::write(&path, b"first\r\nsec\xffond\nlast").unwrap();

        let mut lines = LogLines::open(&path).unwrap();
        assert_eq!(lines.next_line().unwrap().as_deref(), Some("first"));
        assert_eq!(lines.next_line().unwrap().as_deref(), Some("sec\u{fffd}ond"));
        assert_eq!(lines.next_line().unwrap().as_deref(), Some("last"));
        assert_eq!(lines.next_line().unwrap(), None);
    }
}
