use chrono::{DateTime, Utc};
use serde::Serialize;

/// A point in time copy of one volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupArtifact {
    pub snapshot_id: String,
    pub volume_id: String,
    /// Value of the `Name` tag.
    pub name: Option<String>,
    /// Value of the `MainStack` tag.
    pub stack: Option<String>,
    pub description: Option<String>,
    /// `None` when the provider did not report a start time.
    pub created_at: Option<DateTime<Utc>>,
}

/// Everything needed to ask the provider for a new snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRequest {
    pub volume_id: String,
    pub description: String,
    pub name: String,
    pub stack: String,
}

impl SnapshotRequest {
    pub fn new(
        instance_id: &str,
        volume_id: &str,
        name: &str,
        stack: &str,
        now: DateTime<Utc>,
    ) -> Self {
        SnapshotRequest {
            volume_id: volume_id.to_owned(),
            description: description(instance_id, volume_id, now),
            name: name.to_owned(),
            stack: stack.to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionResult {
    pub snapshot_id: String,
    pub request_id: Option<String>,
}

/// `Created by EBSSnapshotScheduler from <instance> (<volume>) at <Mon DD,HH:MM> UTC`
pub fn description(instance_id: &str, volume_id: &str, now: DateTime<Utc>) -> String {
    format!(
        "Created by EBSSnapshotScheduler from {instance_id} ({volume_id}) at {} UTC",
        now.format("%b %d,%H:%M")
    )
}
