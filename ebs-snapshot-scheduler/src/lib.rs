//! Scheduled EBS snapshots for the instances of a CloudFormation stack.
//!
//! A run looks up the stack's outputs, merges them with the invocation event into a
//! [`ScheduleConfig`], snapshots the data volume of every in-scope instance and, when
//! auto deletion is enabled, purges that instance's snapshots once they reach the
//! retention period.
//!
//! All cloud access goes through the [`CloudProvider`] trait.
//! With the default `use_sdk` feature, [`aws::AwsProvider`] implements it on top of the AWS SDK.

#[cfg(feature = "use_sdk")]
pub mod aws;
mod config;
mod error;
mod evaluator;
mod instance;
#[cfg(feature = "use_sdk")]
pub mod kit;
mod provider;
mod report;
mod retention;
mod scheduler;
mod snapshot;

pub use config::{keys, ConfigSources, RequestType, ScheduleConfig};
pub use error::{ProviderError, ScheduleError};
pub use evaluator::RetentionEvaluator;
pub use instance::{ManagedInstance, Volume, VolumeSelector};
pub use provider::{CloudProvider, ComputeApi, StackApi};
pub use report::{FailureStage, InstanceFailure, ScheduleReport, ScheduleResponse};
pub use retention::{age_in_days, is_expired, RetentionPolicy};
pub use scheduler::{Clock, ScheduleRequest, Scheduler};
pub use snapshot::{BackupArtifact, DeletionResult, SnapshotRequest};

/// Tag carrying the owning stack name on both instances and snapshots.
pub const MAIN_STACK_TAG: &str = "MainStack";
/// Tag carrying the display name on both instances and snapshots.
pub const NAME_TAG: &str = "Name";
