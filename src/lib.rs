// src/lib.rs
//! Analysis core for insect bite, plant, animal and wound-healing photo scans.
pub mod analytics;
pub mod clock;
pub mod config;
pub mod context;
pub mod errors;
pub mod models;
pub mod progress;
pub mod services;

#[cfg(test)]
mod testing;

pub use errors::{AnalysisError, ErrorKind};
pub use models::{AnalysisKind, AnalysisOutcome, AnalysisRequest};
pub use progress::{ProgressEvent, ProgressReporter};
pub use services::AnalysisService;
