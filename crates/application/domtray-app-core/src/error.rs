use std::time::Duration;

/// Failure reported by the domain-management API.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("domain no longer exists")]
    NotFound,
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("{0}")]
    Failed(String),
    #[error("query timed out after {0:?}")]
    TimedOut(Duration),
}

/// How the engine treats an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Query failed for a reason other than non-existence: fall back to a safe default.
    TransientQueryFailure,
    /// The identity no longer denotes a live domain: implicit deletion.
    EntityVanished,
    /// A mutating action was not authorised.
    PermissionDenied,
    /// A mutating action failed for another domain-specific reason.
    ActionFailure,
}

impl ApiError {
    pub fn query_class(&self) -> ErrorClass {
        match self {
            ApiError::NotFound => ErrorClass::EntityVanished,
            _ => ErrorClass::TransientQueryFailure,
        }
    }

    pub fn action_class(&self) -> ErrorClass {
        match self {
            ApiError::NotFound => ErrorClass::EntityVanished,
            ApiError::PermissionDenied(_) => ErrorClass::PermissionDenied,
            ApiError::Failed(_) | ApiError::TimedOut(_) => ErrorClass::ActionFailure,
        }
    }

    /// The raw reason string shown to the user.
    pub fn reason(&self) -> String {
        match self {
            ApiError::PermissionDenied(reason) | ApiError::Failed(reason) => reason.clone(),
            other => other.to_string(),
        }
    }
}
