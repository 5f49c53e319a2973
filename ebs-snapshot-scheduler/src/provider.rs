use crate::error::ProviderError;
use crate::instance::ManagedInstance;
use crate::snapshot::{BackupArtifact, DeletionResult, SnapshotRequest};
use async_trait::async_trait;
use std::collections::HashMap;

/// Stack metadata lookups.
#[async_trait]
pub trait StackApi: Send + Sync {
    /// The declared outputs of `stack_name`, keyed by output key.
    async fn stack_outputs(
        &self,
        stack_name: &str,
    ) -> Result<HashMap<String, String>, ProviderError>;
}

/// Instance and snapshot operations, bound to one region.
#[async_trait]
pub trait ComputeApi: Send + Sync {
    /// Instances tagged `MainStack = stack` that also carry the `tag_key` tag, in provider order.
    async fn tagged_instances(
        &self,
        stack: &str,
        tag_key: &str,
    ) -> Result<Vec<ManagedInstance>, ProviderError>;

    async fn create_snapshot(
        &self,
        request: &SnapshotRequest,
    ) -> Result<BackupArtifact, ProviderError>;

    /// Snapshots owned by the caller tagged `MainStack = stack` and `Name = name`.
    async fn list_snapshots(
        &self,
        stack: &str,
        name: &str,
    ) -> Result<Vec<BackupArtifact>, ProviderError>;

    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<DeletionResult, ProviderError>;
}

/// Entry point to a cloud account.
///
/// Stack lookups are made first, and the region for compute calls is only known once
/// the stack outputs have been merged into the configuration.
#[async_trait]
pub trait CloudProvider: StackApi {
    type Compute: ComputeApi;

    /// Compute API for `region`, or for the provider's default region when `None`.
    async fn compute(&self, region: Option<&str>) -> Self::Compute;
}
