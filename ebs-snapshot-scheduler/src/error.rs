use crate::snapshot::DeletionResult;
use thiserror::Error;

/// A failed call to the cloud provider.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    /// The request could not be built or was rejected before reaching the provider.
    #[error("parameter validation failed for {operation}: {message}")]
    Validation {
        operation: &'static str,
        message: String,
    },

    /// The provider answered with an error, e.g. permissions, quota, not found or throttling.
    #[error("{operation} failed with {}: {message}", .code.as_deref().unwrap_or("unknown error code"))]
    Client {
        operation: &'static str,
        code: Option<String>,
        message: String,
    },

    #[error("unexpected failure in {operation}: {message}")]
    Unexpected {
        operation: &'static str,
        message: String,
    },
}

impl ProviderError {
    pub fn operation(&self) -> &'static str {
        match self {
            ProviderError::Validation { operation, .. }
            | ProviderError::Client { operation, .. }
            | ProviderError::Unexpected { operation, .. } => operation,
        }
    }
}

/// Errors raised while running a schedule.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("the request does not name a stack (StackName)")]
    MissingStackName,

    #[error("the request must be a JSON object, got {0}")]
    InvalidRequest(String),

    #[error("failed to resolve the outputs of stack {stack}: {source}")]
    StackLookup {
        stack: String,
        #[source]
        source: ProviderError,
    },

    #[error("configuration value {key} is required for this request")]
    MissingConfig { key: &'static str },

    #[error("configuration value {key}={value:?} is invalid: {reason}")]
    InvalidConfig {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("failed to list the instances of stack {stack}: {source}")]
    InstanceLookup {
        stack: String,
        #[source]
        source: ProviderError,
    },

    #[error("instance {instance_id} has no {tag} tag")]
    MissingTag {
        instance_id: String,
        tag: &'static str,
    },

    #[error("instance {instance_id} has no data volume matching {selector}")]
    MissingDataVolume {
        instance_id: String,
        selector: String,
    },

    #[error("failed to snapshot {volume_id} of {instance_id}: {source}")]
    Backup {
        instance_id: String,
        volume_id: String,
        #[source]
        source: ProviderError,
    },

    /// Purging stopped part way through. `deleted` holds what was removed before the failure.
    #[error("failed to purge snapshots of {name} in stack {stack} after {} deletions: {source}", .deleted.len())]
    Purge {
        name: String,
        stack: String,
        deleted: Vec<DeletionResult>,
        #[source]
        source: ProviderError,
    },
}

impl ScheduleError {
    /// Deletions that completed before the error, if any.
    pub fn completed_deletions(&self) -> &[DeletionResult] {
        match self {
            ScheduleError::Purge { deleted, .. } => deleted,
            _ => &[],
        }
    }
}
