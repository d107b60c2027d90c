//! CLI command implementations

pub mod cache;
pub mod registry_helper;
pub mod run;
pub mod steps;
