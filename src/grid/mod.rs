//! Grid collaborators
//!
//! Thin wrappers around the HTCondor submission and VOMS proxy command-line
//! tools. They only run the external program and interpret its output.

pub mod condor;
pub mod proxy;
