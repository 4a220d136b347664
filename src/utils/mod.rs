//! Utility modules for the log analyzer
//!
//! This module contains utility functions for file handling and output
//! formatting.

pub mod file_utils;
pub mod output_formatter;
