//! Error taxonomy at the adapter boundary.
//!
//! Every backend failure is converted into a [`BackendError`] before it
//! leaves an adapter. The aggregator isolates these per backend and the
//! dispatcher turns them into user-facing replies, so none of them are ever
//! fatal to the process.

use crate::models::BackendKind;

/// Failure of a single backend call.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Malformed input, rejected before any network call.
    #[error("invalid input: {0}")]
    Invalid(String),
    /// The backend was reached but holds no matching entity.
    #[error("not found")]
    NotFound,
    /// The backend is unreachable, timed out, or answered with an error status.
    #[error("{backend} unavailable: {reason}")]
    Unavailable { backend: BackendKind, reason: String },
    /// The backend rejected a write. Nothing was applied.
    #[error("write rejected: {0}")]
    WriteError(String),
}

impl BackendError {
    pub fn unavailable(backend: BackendKind, reason: impl Into<String>) -> Self {
        BackendError::Unavailable {
            backend,
            reason: reason.into(),
        }
    }

    /// Map a transport error from `reqwest` into the taxonomy.
    pub fn from_transport(backend: BackendKind, err: reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            "request timed out".to_string()
        } else if err.is_connect() {
            "connection failed".to_string()
        } else if err.is_decode() {
            "malformed response body".to_string()
        } else {
            err.to_string()
        };
        BackendError::unavailable(backend, reason)
    }

    /// Short machine-readable label, used in audit records and logs.
    pub fn label(&self) -> &'static str {
        match self {
            BackendError::Invalid(_) => "invalid",
            BackendError::NotFound => "not_found",
            BackendError::Unavailable { .. } => "unavailable",
            BackendError::WriteError(_) => "write_error",
        }
    }
}

pub type BackendResult<T> = std::result::Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            BackendError::Invalid("need 8 digits".into()).to_string(),
            "invalid input: need 8 digits"
        );
        assert_eq!(BackendError::NotFound.to_string(), "not found");
        assert_eq!(
            BackendError::unavailable(BackendKind::IdentityLookup, "status 500").to_string(),
            "identity unavailable: status 500"
        );
        assert_eq!(
            BackendError::WriteError("quota".into()).to_string(),
            "write rejected: quota"
        );
    }

    #[test]
    fn test_labels_are_distinct() {
        let labels = [
            BackendError::Invalid(String::new()).label(),
            BackendError::NotFound.label(),
            BackendError::unavailable(BackendKind::Tabular, "").label(),
            BackendError::WriteError(String::new()).label(),
        ];
        for (i, a) in labels.iter().enumerate() {
            for b in &labels[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
