use crate::error::ScheduleError;
use crate::instance::ManagedInstance;
use crate::provider::ComputeApi;
use crate::retention::{age_in_days, is_expired};
use crate::scheduler::Clock;
use crate::snapshot::{BackupArtifact, DeletionResult, SnapshotRequest};

/// Creates and purges the snapshots of one stack's instances.
pub struct RetentionEvaluator<'a, C> {
    compute: &'a C,
    clock: &'a Clock,
}

impl<'a, C: ComputeApi> RetentionEvaluator<'a, C> {
    pub fn new(compute: &'a C, clock: &'a Clock) -> Self {
        RetentionEvaluator { compute, clock }
    }

    /// Snapshots `volume_id` of `instance`, tagging it with the instance's backup name and `stack`.
    pub async fn create_backup(
        &self,
        instance: &ManagedInstance,
        volume_id: &str,
        stack: &str,
    ) -> Result<BackupArtifact, ScheduleError> {
        let name = instance.backup_name()?;
        tracing::debug!(
            name = %name,
            instance_id = %instance.instance_id,
            volume_id,
            stack,
            "creating backup"
        );

        let request = SnapshotRequest::new(
            &instance.instance_id,
            volume_id,
            &name,
            stack,
            (self.clock)(),
        );
        self.compute
            .create_snapshot(&request)
            .await
            .map_err(|source| ScheduleError::Backup {
                instance_id: instance.instance_id.clone(),
                volume_id: volume_id.to_owned(),
                source,
            })
    }

    /// Deletes every snapshot named `name` in `stack` that is at least `retention_days` old.
    ///
    /// Deletion starts as soon as the first expired snapshot is found. If a deletion fails the
    /// returned [`ScheduleError::Purge`] still carries the snapshots removed before it.
    pub async fn purge_expired(
        &self,
        name: &str,
        retention_days: i64,
        stack: &str,
    ) -> Result<Vec<DeletionResult>, ScheduleError> {
        tracing::info!("Remove backups of {name} in stack {stack} older than {retention_days} days");

        let mut deleted = Vec::new();
        let snapshots = match self.compute.list_snapshots(stack, name).await {
            Ok(snapshots) => snapshots,
            Err(source) => return Err(purge_error(name, stack, deleted, source)),
        };

        let now = (self.clock)();
        for snapshot in snapshots {
            let Some(created_at) = snapshot.created_at else {
                tracing::warn!(
                    snapshot_id = %snapshot.snapshot_id,
                    "snapshot has no start time, skipping"
                );
                continue;
            };
            tracing::info!(
                "Checking {}, is {} days old",
                snapshot.snapshot_id,
                age_in_days(created_at, now)
            );

            if is_expired(created_at, now, retention_days) {
                match self.compute.delete_snapshot(&snapshot.snapshot_id).await {
                    Ok(result) => {
                        tracing::debug!(?result, "deleted snapshot");
                        deleted.push(result);
                    }
                    Err(source) => return Err(purge_error(name, stack, deleted, source)),
                }
            }
        }
        Ok(deleted)
    }
}

fn purge_error(
    name: &str,
    stack: &str,
    deleted: Vec<DeletionResult>,
    source: crate::error::ProviderError,
) -> ScheduleError {
    ScheduleError::Purge {
        name: name.to_owned(),
        stack: stack.to_owned(),
        deleted,
        source,
    }
}
