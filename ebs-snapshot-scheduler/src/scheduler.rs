use crate::config::{keys, ConfigSources, RequestType, ScheduleConfig};
use crate::error::ScheduleError;
use crate::evaluator::RetentionEvaluator;
use crate::instance::ManagedInstance;
use crate::provider::{CloudProvider, ComputeApi};
use crate::report::{FailureStage, InstanceFailure, ScheduleReport};
use crate::retention::RetentionPolicy;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::Instrument;

/// Source of the current time, replaceable in tests.
pub type Clock = Box<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// An invocation event: `{"RequestType": ..., "StackName": ..., ...overrides}`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleRequest {
    raw: Value,
    fields: Map<String, Value>,
}

impl ScheduleRequest {
    pub fn from_event(event: Value) -> Result<Self, ScheduleError> {
        match &event {
            Value::Object(fields) => Ok(ScheduleRequest {
                fields: fields.clone(),
                raw: event,
            }),
            other => Err(ScheduleError::InvalidRequest(other.to_string())),
        }
    }

    pub fn stack_name(&self) -> Option<&str> {
        self.fields
            .get(keys::STACK_NAME)
            .and_then(Value::as_str)
            .filter(|name| !name.is_empty())
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn event(&self) -> &Value {
        &self.raw
    }
}

pub struct Scheduler<P> {
    provider: P,
    clock: Clock,
}

impl<P: CloudProvider> Scheduler<P> {
    pub fn new(provider: P) -> Self {
        Scheduler {
            provider,
            clock: Box::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Runs one scheduling pass.
    ///
    /// Only `Create` requests do any work. Each in-scope instance gets one snapshot of its data
    /// volume, and with auto deletion on, that instance's expired snapshots are purged right
    /// after its own snapshot is taken. The new snapshot is part of that purge, so a retention
    /// period of zero or less deletes it again. Other request types return an empty report
    /// before the rest of the configuration is parsed.
    ///
    /// A failure on one instance is recorded in the report and the run moves on.
    /// Errors resolving the stack, the configuration or the instance list abort the run.
    pub async fn run(&self, request: &ScheduleRequest) -> Result<ScheduleReport, ScheduleError> {
        let stack = request.stack_name().ok_or(ScheduleError::MissingStackName)?;
        let span = tracing::info_span!("snapshot_schedule", stack);
        self.run_for_stack(stack, request).instrument(span).await
    }

    async fn run_for_stack(
        &self,
        stack: &str,
        request: &ScheduleRequest,
    ) -> Result<ScheduleReport, ScheduleError> {
        tracing::info!("Request received: {}", request.event());
        let outputs = self
            .provider
            .stack_outputs(stack)
            .await
            .map_err(|source| ScheduleError::StackLookup {
                stack: stack.to_owned(),
                source,
            })?;
        for (key, value) in &outputs {
            tracing::info!("{key} :> {value}");
        }

        let sources = ConfigSources {
            event: request.fields(),
            outputs: &outputs,
        };
        let mut report = ScheduleReport::new(request.event().clone());
        match sources.request_type() {
            Some(RequestType::Create) => tracing::info!("Create request"),
            other => {
                tracing::info!(request_type = ?other, "nothing to do for this request type");
                return Ok(report);
            }
        }

        let config = ScheduleConfig::resolve(&sources)?;
        let policy = config.retention_policy()?;
        let compute = self.provider.compute(config.region.as_deref()).await;
        let instances = compute
            .tagged_instances(stack, &policy.custom_tag_key)
            .await
            .map_err(|source| ScheduleError::InstanceLookup {
                stack: stack.to_owned(),
                source,
            })?;
        tracing::info!(count = instances.len(), "found instances in scope");

        let evaluator = RetentionEvaluator::new(&compute, &self.clock);
        for instance in &instances {
            process_instance(&evaluator, &policy, stack, instance, &mut report).await;
        }

        if report.is_success() {
            tracing::info!(
                created = report.created.len(),
                removed = report.removed.len(),
                "SUCCESS"
            );
        } else {
            tracing::error!(
                created = report.created.len(),
                removed = report.removed.len(),
                failed = report.failures.len(),
                "completed with failures"
            );
        }
        Ok(report)
    }
}

async fn process_instance<C: ComputeApi>(
    evaluator: &RetentionEvaluator<'_, C>,
    policy: &RetentionPolicy,
    stack: &str,
    instance: &ManagedInstance,
    report: &mut ScheduleReport,
) {
    let fail = |report: &mut ScheduleReport, stage, err: ScheduleError| {
        tracing::error!(instance_id = %instance.instance_id, "{err}");
        report
            .failures
            .push(InstanceFailure::new(&instance.instance_id, stage, &err));
    };

    let name = match instance.backup_name() {
        Ok(name) => name,
        Err(err) => return fail(report, FailureStage::Backup, err),
    };
    let volume_id = match instance.data_volume(&policy.data_volume) {
        Ok(volume) => volume.volume_id.clone(),
        Err(err) => return fail(report, FailureStage::Backup, err),
    };
    let artifact = match evaluator.create_backup(instance, &volume_id, stack).await {
        Ok(artifact) => artifact,
        Err(err) => return fail(report, FailureStage::Backup, err),
    };
    tracing::info!("Created {name} ({}) from {volume_id}", artifact.snapshot_id);
    report.created.push(artifact);

    if policy.auto_delete {
        match evaluator
            .purge_expired(&name, policy.retention_days, stack)
            .await
        {
            Ok(deleted) => {
                tracing::info!("Cleaned up {} old SnapShots", deleted.len());
                report.removed.extend(deleted);
            }
            Err(err) => {
                report.removed.extend_from_slice(err.completed_deletions());
                fail(report, FailureStage::Purge, err);
            }
        }
    }
}
