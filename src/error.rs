//! Analysis error types.
//!
//! Only fatal conditions are errors. A single unparsable field is counted in
//! the load diagnostics, and an input without breach cases is reported as
//! `AnalysisOutcome::NoBreachCases`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("cannot read input table {source_name}: {reason}")]
    Ingestion { source_name: String, reason: String },

    #[error("input table is missing required columns: {}", missing.join(", "))]
    Schema { missing: Vec<String> },

    #[error("failed to write {path}: {source}")]
    Output {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AnalysisError {
    pub(crate) fn ingestion(source_name: &str, reason: impl ToString) -> Self {
        AnalysisError::Ingestion {
            source_name: source_name.to_string(),
            reason: reason.to_string(),
        }
    }
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
