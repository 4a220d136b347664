//! Core module for log analysis
//!
//! This module contains the marker definitions and the analyzer that turns job
//! log pairs into per-job metric records.

pub mod analyzer;
pub mod patterns;
