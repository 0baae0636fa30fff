//! Error types for policy compilation
//!
//! Every variant's `Display` is the bare message: these strings end up in
//! `Accepted=False` condition messages, so they must read the same way
//! regardless of which stage produced them.

use thiserror::Error;

/// Errors raised while resolving or compiling a SecurityPolicy
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Error {
    /// The policy or a reference it carries is malformed
    #[error("{message}")]
    Validation {
        /// Description of what's invalid
        message: String,
    },

    /// A referenced object (Service, Secret, port) does not exist
    #[error("{message}")]
    NotFound {
        /// Description of what's missing
        message: String,
    },

    /// The target is already held by another policy
    #[error("{message}")]
    Conflict {
        /// Description of the conflict
        message: String,
    },

    /// An external lookup (OIDC discovery) failed
    #[error("{message}")]
    ExternalResolution {
        /// Description of the failure
        message: String,
    },

    /// Inconsistent input that validation should have caught earlier
    #[error("{message}")]
    Internal {
        /// Description of the failure
        message: String,
    },
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound {
            message: msg.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict {
            message: msg.into(),
        }
    }

    /// Create an external resolution error
    pub fn external(msg: impl Into<String>) -> Self {
        Self::ExternalResolution {
            message: msg.into(),
        }
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
        }
    }

    /// The raw message carried by this error
    pub fn message(&self) -> &str {
        match self {
            Self::Validation { message }
            | Self::NotFound { message }
            | Self::Conflict { message }
            | Self::ExternalResolution { message }
            | Self::Internal { message } => message,
        }
    }

    /// Prefix the message with additional context, keeping the variant
    pub fn context(self, prefix: &str) -> Self {
        let wrap = |message: String| format!("{}: {}", prefix, message);
        match self {
            Self::Validation { message } => Self::validation(wrap(message)),
            Self::NotFound { message } => Self::not_found(wrap(message)),
            Self::Conflict { message } => Self::conflict(wrap(message)),
            Self::ExternalResolution { message } => Self::external(wrap(message)),
            Self::Internal { message } => Self::internal(wrap(message)),
        }
    }

    /// Whether a later pass could succeed without the policy changing
    ///
    /// Discovery outages and missing referents can heal on their own;
    /// malformed specs and conflicts cannot.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ExternalResolution { .. } | Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_bare_message() {
        let err = Error::not_found("service default/authz not found");
        assert_eq!(err.to_string(), "service default/authz not found");
        assert_eq!(err.message(), "service default/authz not found");
    }

    #[test]
    fn context_keeps_variant() {
        let err = Error::external("connection refused").context("error fetching endpoints from issuer");
        assert_eq!(
            err.to_string(),
            "error fetching endpoints from issuer: connection refused"
        );
        assert!(matches!(err, Error::ExternalResolution { .. }));
    }

    #[test]
    fn retryable_classification() {
        assert!(Error::external("timeout").is_retryable());
        assert!(Error::not_found("secret missing").is_retryable());
        assert!(!Error::validation("bad group").is_retryable());
        assert!(!Error::conflict("already attached").is_retryable());
        assert!(!Error::internal("both set").is_retryable());
    }
}
