// SPDX-FileCopyrightText: 2026 Proofbench Project Team
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error taxonomy
//!
//! Extraction and provider errors are scoped to a file, a declaration or a
//! single model call and never abort a run. Configuration errors are fatal
//! and surface before any work is dispatched.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to extract declarations from part of a source tree
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("{}:{line}: {message}", file.display())]
    Parse {
        file: PathBuf,
        line: usize,
        message: String,
    },

    #[error("dependency cycle among {}", members.join(", "))]
    Cycle { members: Vec<String> },

    #[error("failed to read {}: {source}", file.display())]
    Io {
        file: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ExtractionError {
    /// File the failure is scoped to, if any
    pub fn file(&self) -> Option<&PathBuf> {
        match self {
            ExtractionError::Parse { file, .. } | ExtractionError::Io { file, .. } => Some(file),
            ExtractionError::Cycle { .. } => None,
        }
    }
}

/// Failure of a single model request
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("rate limited (429)")]
    RateLimited,

    #[error("server error ({status}): {body}")]
    Server { status: u16, body: String },

    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("bad request ({status}): {body}")]
    BadRequest { status: u16, body: String },

    #[error("authentication rejected ({status})")]
    Auth { status: u16 },

    #[error("invalid model `{0}`")]
    InvalidModel(String),

    #[error("model returned empty content")]
    EmptyResponse,

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("prompt of about {estimated} tokens exceeds the {limit}-token context of {model}")]
    ContextTooLong {
        model: String,
        estimated: u64,
        limit: u64,
    },
}

impl ProviderError {
    /// Timeouts, connection failures, 5xx and 429 may succeed on a later attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited
                | ProviderError::Server { .. }
                | ProviderError::Timeout
                | ProviderError::Connect(_)
        )
    }

    /// Map a non-success HTTP status and its body
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            429 => ProviderError::RateLimited,
            401 | 403 => ProviderError::Auth { status },
            404 => ProviderError::InvalidModel(body),
            500..=599 => ProviderError::Server { status, body },
            _ => ProviderError::BadRequest { status, body },
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProviderError::Timeout
        } else if e.is_connect() {
            ProviderError::Connect(e.to_string())
        } else if let Some(status) = e.status() {
            ProviderError::from_status(status.as_u16(), e.to_string())
        } else if e.is_decode() {
            ProviderError::Malformed(e.to_string())
        } else {
            ProviderError::Connect(e.to_string())
        }
    }
}

/// Invalid setup detected at startup
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("project path {} does not exist", .0.display())]
    MissingProject(PathBuf),

    #[error("no _CoqProject found at {}", .0.display())]
    MissingCoqProject(PathBuf),

    #[error("logs directory {} is not usable: {reason}", path.display())]
    LogsDir { path: PathBuf, reason: String },

    #[error("unknown model `{0}` (see `proofbench list-models`)")]
    UnknownModel(String),

    #[error("missing environment variable {0}")]
    MissingEnv(&'static str),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(ProviderError::RateLimited.is_retryable());
        assert!(ProviderError::Timeout.is_retryable());
        assert!(ProviderError::from_status(503, String::new()).is_retryable());
        assert!(!ProviderError::from_status(400, String::new()).is_retryable());
        assert!(!ProviderError::from_status(401, String::new()).is_retryable());
        assert!(!ProviderError::InvalidModel("x".into()).is_retryable());
        assert!(!ProviderError::EmptyResponse.is_retryable());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(ProviderError::from_status(429, "slow down".into()), ProviderError::RateLimited);
        assert!(matches!(
            ProviderError::from_status(404, "no such model".into()),
            ProviderError::InvalidModel(_)
        ));
        assert!(matches!(
            ProviderError::from_status(502, String::new()),
            ProviderError::Server { status: 502, .. }
        ));
    }

    #[test]
    fn test_extraction_error_display() {
        let err = ExtractionError::Parse {
            file: PathBuf::from("theories/A.v"),
            line: 12,
            message: "unterminated comment".into(),
        };
        assert_eq!(err.to_string(), "theories/A.v:12: unterminated comment");

        let cycle = ExtractionError::Cycle {
            members: vec!["A.f".into(), "A.g".into()],
        };
        assert_eq!(cycle.to_string(), "dependency cycle among A.f, A.g");
        assert!(cycle.file().is_none());
    }
}
