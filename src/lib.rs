//! TAT-breach delivery performance analysis.
//!
//! Reads per-shipment delivery events, classifies which shipments missed
//! their expected delivery date, and aggregates the late ones into day-wise,
//! payment-method, zone, route and courier reports.

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod error;
pub mod loader;
pub mod output;
pub mod reports;
pub mod types;
pub mod util;

pub use config::{AnalysisConfig, DeliveredOffsetBasis};
pub use error::{AnalysisError, AnalysisResult};
pub use reports::{analyze_table, run_analysis};
pub use types::{AnalysisOutcome, AnalysisReport, LoadDiagnostics};
