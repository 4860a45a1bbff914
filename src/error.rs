//! Error types for the analysis pipeline.
//!
//! Every expected failure of a request is a variant of [`AnalysisError`] and
//! maps to one fixed, caller-visible message. Only [`AnalysisError::Internal`]
//! wraps unexpected infrastructure failures.

use thiserror::Error;

// ---

/// The request body does not describe a valid plant collection.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("body must be a JSON object keyed by plant id")]
    NotAnObject,

    #[error("plant '{plant}': {source}")]
    Plant {
        plant: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("plant '{plant}': unparsable timestamp '{value}'")]
    Timestamp { plant: String, value: String },

    #[error("plant '{plant}': wetness at '{timestamp}' is not an integer")]
    Level { plant: String, timestamp: String },
}

/// Why a request did not produce a chart.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("auth header missing or mismatched")]
    Unauthorized,

    #[error("body is not base64-encoded JSON: {0}")]
    Decode(String),

    #[error("missing query parameter '{0}'")]
    MissingParam(&'static str),

    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    DateFormat(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("plant '{0}' not found in body")]
    NotFound(String),

    #[error("internal error: {0:#}")]
    Internal(#[from] anyhow::Error),
}

impl AnalysisError {
    // ---
    /// The message returned to callers for this failure.
    pub fn message(&self) -> &'static str {
        // ---
        match self {
            AnalysisError::Unauthorized => "Unauthorized",
            AnalysisError::Decode(_) => "Invalid JSON body",
            AnalysisError::MissingParam("id") => "Missing id param",
            AnalysisError::MissingParam(_) => "Missing start or end params",
            AnalysisError::DateFormat(_) => "Invalid date format",
            AnalysisError::Schema(_) => "Invalid body",
            AnalysisError::NotFound(_) => "ID not found in body",
            AnalysisError::Internal(_) => "Internal error",
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, AnalysisError::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_messages() {
        // ---
        assert_eq!(AnalysisError::Unauthorized.message(), "Unauthorized");
        assert_eq!(AnalysisError::Decode("x".into()).message(), "Invalid JSON body");
        assert_eq!(AnalysisError::MissingParam("id").message(), "Missing id param");
        assert_eq!(
            AnalysisError::MissingParam("start").message(),
            "Missing start or end params"
        );
        assert_eq!(
            AnalysisError::MissingParam("end").message(),
            "Missing start or end params"
        );
        assert_eq!(
            AnalysisError::DateFormat("2024/01/01".into()).message(),
            "Invalid date format"
        );
        assert_eq!(
            AnalysisError::Schema(SchemaError::NotAnObject).message(),
            "Invalid body"
        );
        assert_eq!(
            AnalysisError::NotFound("p9".into()).message(),
            "ID not found in body"
        );
    }

    #[test]
    fn test_only_internal_is_internal() {
        // ---
        assert!(AnalysisError::Internal(anyhow::anyhow!("disk full")).is_internal());
        assert!(!AnalysisError::Unauthorized.is_internal());
        assert!(!AnalysisError::NotFound("p1".into()).is_internal());
    }
}
