//! Error types for pair instance management
//!
//! Errors carry enough context (instance name, resource kind) to be
//! actionable from a log line alone. The store boundary classifies raw
//! Kubernetes failures into `NotFound` / `AlreadyExists` so the lifecycle
//! code can treat those as expected outcomes.

use thiserror::Error;

/// Default context value when no specific context is available
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for pair operations
#[derive(Debug, Error)]
pub enum Error {
    /// Any store failure that is not a not-found or already-exists
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// Bad input; nothing was created
    #[error("validation error for {instance}: {message}")]
    Validation {
        /// Name of the instance (or user) the spec belongs to
        instance: String,
        /// Description of what's invalid
        message: String,
        /// The invalid field path (e.g., "setup.email")
        field: Option<String>,
    },

    /// The requested resource does not exist
    #[error("{kind} {name} not found")]
    NotFound {
        /// Resource kind (e.g., "Cluster")
        kind: String,
        /// Resource name
        name: String,
    },

    /// A resource with the same name already exists
    #[error("{kind} {name} already exists")]
    AlreadyExists {
        /// Resource kind
        kind: String,
        /// Resource name
        name: String,
    },

    /// Cloud-init command substitution failed
    #[error("templating error: {message}")]
    Templating {
        /// Description of what failed
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// The resource kind being converted (if known)
        kind: Option<String>,
    },

    /// Internal/operational error
    #[error("internal error [{context}]: {message}")]
    Internal {
        /// Description of what failed
        message: String,
        /// Where the error occurred (e.g., "create_client", "reconciler")
        context: String,
    },
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            instance: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
            field: None,
        }
    }

    /// Create a validation error with instance context and field path
    pub fn validation_for_field(
        instance: impl Into<String>,
        field: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            instance: instance.into(),
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a not-found error for a resource
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create an already-exists error for a resource
    pub fn already_exists(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a templating error
    pub fn templating(msg: impl Into<String>) -> Self {
        Self::Templating {
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with resource kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create an internal error with the given message
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: UNKNOWN_CONTEXT.to_string(),
        }
    }

    /// Create an internal error with context
    pub fn internal_with_context(context: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
            context: context.into(),
        }
    }

    /// Classify a kube-rs error for a named resource
    ///
    /// 404 becomes `NotFound`, 409 `AlreadyExists` becomes `AlreadyExists`,
    /// anything else is passed through untouched.
    pub fn from_kube(kind: &str, name: &str, err: kube::Error) -> Self {
        match &err {
            kube::Error::Api(ae) if ae.code == 404 => Self::not_found(kind, name),
            kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
                Self::already_exists(kind, name)
            }
            _ => Self::Kube { source: err },
        }
    }

    /// True for `NotFound`, including a raw 404 from kube
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound { .. } => true,
            Error::Kube {
                source: kube::Error::Api(ae),
            } => ae.code == 404,
            _ => false,
        }
    }

    /// True for `AlreadyExists`
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists { .. })
    }

    /// Check if re-issuing the same operation could succeed
    ///
    /// Input and templating problems need a spec fix; upstream 4xx errors
    /// other than conflicts are permanent too.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Kube { source } => !matches!(
                source,
                kube::Error::Api(ae) if (400..500).contains(&ae.code) && ae.code != 409
            ),
            Error::Validation { .. } => false,
            Error::NotFound { .. } => false,
            Error::AlreadyExists { .. } => false,
            Error::Templating { .. } => false,
            Error::Serialization { .. } => false,
            Error::Internal { .. } => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: u16, reason: &str) -> kube::Error {
        kube::Error::Api(kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: format!("{} happened", reason),
            reason: reason.to_string(),
            code,
        })
    }

    /// Story: a bad spec is rejected with the offending field named
    #[test]
    fn story_validation_names_the_field() {
        let err = Error::validation_for_field("alice", "setup.email", "must be a valid address");
        assert!(err.to_string().contains("validation error for alice"));
        match &err {
            Error::Validation {
                instance, field, ..
            } => {
                assert_eq!(instance, "alice");
                assert_eq!(field.as_deref(), Some("setup.email"));
            }
            _ => panic!("Expected Validation variant"),
        }
        assert!(!err.is_retryable());
    }

    #[test]
    fn validation_without_context_uses_unknown() {
        match Error::validation("type must be Kubernetes or Plain") {
            Error::Validation { instance, .. } => assert_eq!(instance, UNKNOWN_CONTEXT),
            other => panic!("Expected Validation variant, got {other:?}"),
        }
    }

    /// Story: store errors are classified so create/delete can stay idempotent
    #[test]
    fn story_kube_errors_are_classified_at_the_boundary() {
        let err = Error::from_kube("Cluster", "alice-1", api_error(404, "NotFound"));
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Cluster alice-1 not found");

        let err = Error::from_kube("Cluster", "alice-1", api_error(409, "AlreadyExists"));
        assert!(err.is_already_exists());

        // A 409 that is an update conflict stays upstream and is retryable
        let err = Error::from_kube("Cluster", "alice-1", api_error(409, "Conflict"));
        assert!(matches!(err, Error::Kube { .. }));
        assert!(err.is_retryable());

        let err = Error::from_kube("Cluster", "alice-1", api_error(403, "Forbidden"));
        assert!(!err.is_retryable());
        assert!(!err.is_not_found());

        let err = Error::from_kube("Cluster", "alice-1", api_error(503, "ServiceUnavailable"));
        assert!(err.is_retryable());
    }

    #[test]
    fn raw_404_counts_as_not_found() {
        let err: Error = api_error(404, "NotFound").into();
        assert!(err.is_not_found());
    }

    #[test]
    fn templating_and_serialization_are_permanent() {
        assert!(!Error::templating("undefined variable").is_retryable());
        let err = Error::serialization_for_kind("KubeadmControlPlane", "missing spec");
        match &err {
            Error::Serialization { kind, .. } => {
                assert_eq!(kind.as_deref(), Some("KubeadmControlPlane"))
            }
            _ => panic!("Expected Serialization variant"),
        }
        assert!(!err.is_retryable());
    }

    #[test]
    fn internal_error_with_context() {
        let err = Error::internal_with_context("reconciler", "lease lost");
        assert!(err.to_string().contains("[reconciler]"));
        assert!(err.is_retryable());
        assert!(Error::internal("x").to_string().contains("[unknown]"));
    }
}
