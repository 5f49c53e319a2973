use crate::error::ScheduleError;
use crate::snapshot::{BackupArtifact, DeletionResult};
use serde::Serialize;
use serde_json::Value;

/// Which step of an instance's processing failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    Backup,
    Purge,
}

/// One instance that could not be fully processed. Other instances are unaffected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceFailure {
    pub instance_id: String,
    pub stage: FailureStage,
    pub reason: String,
}

impl InstanceFailure {
    pub fn new(instance_id: &str, stage: FailureStage, err: &ScheduleError) -> Self {
        InstanceFailure {
            instance_id: instance_id.to_owned(),
            stage,
            reason: err.to_string(),
        }
    }
}

/// What a run did.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleReport {
    /// The request event, unchanged.
    pub event: Value,
    pub created: Vec<BackupArtifact>,
    pub removed: Vec<DeletionResult>,
    pub failures: Vec<InstanceFailure>,
}

impl ScheduleReport {
    pub fn new(event: Value) -> Self {
        ScheduleReport {
            event,
            created: Vec::new(),
            removed: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn response(&self) -> ScheduleResponse {
        ScheduleResponse {
            created_snaps: self.created.len(),
            removed_snaps: self.removed.len(),
            status_code: if self.is_success() { "200" } else { "207" },
            event: self.event.clone(),
            failures: self.failures.clone(),
            error: None,
        }
    }
}

/// The JSON document returned to the invoker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduleResponse {
    pub created_snaps: usize,
    pub removed_snaps: usize,
    /// `200` all done, `207` some instances failed, `500` the run was aborted.
    #[serde(rename = "statusCode")]
    pub status_code: &'static str,
    pub event: Value,
    pub failures: Vec<InstanceFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ScheduleResponse {
    pub fn aborted(event: Value, err: &ScheduleError) -> Self {
        ScheduleResponse {
            created_snaps: 0,
            removed_snaps: 0,
            status_code: "500",
            event,
            failures: Vec::new(),
            error: Some(err.to_string()),
        }
    }
}
