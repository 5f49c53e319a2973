//! [`CloudProvider`] backed by the AWS SDK: CloudFormation for stack outputs, EC2 for instances and snapshots.

use crate::error::ProviderError;
use crate::instance::{ManagedInstance, Volume};
use crate::provider::{CloudProvider, ComputeApi, StackApi};
use crate::snapshot::{BackupArtifact, DeletionResult, SnapshotRequest};
use crate::{MAIN_STACK_TAG, NAME_TAG};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_ec2::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_ec2::operation::RequestId;
use aws_sdk_ec2::types::{Filter, ResourceType, Tag, TagSpecification};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Instance states that can still have attached volumes.
const LIVE_INSTANCE_STATES: [&str; 4] = ["pending", "running", "stopping", "stopped"];

pub struct AwsProvider {
    sdk_config: SdkConfig,
    cloudformation: aws_sdk_cloudformation::Client,
}

impl AwsProvider {
    /// Loads credentials and region from the default provider chain.
    pub async fn from_env() -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        Self::new(sdk_config)
    }

    pub fn new(sdk_config: SdkConfig) -> Self {
        AwsProvider {
            cloudformation: aws_sdk_cloudformation::Client::new(&sdk_config),
            sdk_config,
        }
    }
}

#[async_trait]
impl StackApi for AwsProvider {
    async fn stack_outputs(
        &self,
        stack_name: &str,
    ) -> Result<HashMap<String, String>, ProviderError> {
        let response = self
            .cloudformation
            .describe_stacks()
            .stack_name(stack_name)
            .send()
            .await
            .map_err(|err| classify("DescribeStacks", err))?;

        let stack = response
            .stacks()
            .first()
            .ok_or_else(|| ProviderError::Unexpected {
                operation: "DescribeStacks",
                message: format!("no stack named {stack_name} was returned"),
            })?;

        Ok(stack
            .outputs()
            .iter()
            .filter_map(|output| {
                Some((
                    output.output_key()?.to_owned(),
                    output.output_value()?.to_owned(),
                ))
            })
            .collect())
    }
}

#[async_trait]
impl CloudProvider for AwsProvider {
    type Compute = Ec2Compute;

    async fn compute(&self, region: Option<&str>) -> Ec2Compute {
        let mut config = aws_sdk_ec2::config::Builder::from(&self.sdk_config);
        if let Some(region) = region {
            config = config.region(aws_sdk_ec2::config::Region::new(region.to_owned()));
        }
        Ec2Compute {
            client: aws_sdk_ec2::Client::from_conf(config.build()),
        }
    }
}

pub struct Ec2Compute {
    client: aws_sdk_ec2::Client,
}

#[async_trait]
impl ComputeApi for Ec2Compute {
    async fn tagged_instances(
        &self,
        stack: &str,
        tag_key: &str,
    ) -> Result<Vec<ManagedInstance>, ProviderError> {
        let mut pages = self
            .client
            .describe_instances()
            .filters(tag_filter(MAIN_STACK_TAG, stack))
            .filters(Filter::builder().name("tag-key").values(tag_key).build())
            .filters(
                Filter::builder()
                    .name("instance-state-name")
                    .set_values(Some(
                        LIVE_INSTANCE_STATES.iter().map(|s| s.to_string()).collect(),
                    ))
                    .build(),
            )
            .into_paginator()
            .send();

        let mut instances = vec![];
        while let Some(page) = pages.next().await {
            let page = page.map_err(|err| classify("DescribeInstances", err))?;
            for reservation in page.reservations() {
                for instance in reservation.instances() {
                    let Some(instance_id) = instance.instance_id() else {
                        continue;
                    };
                    instances.push(ManagedInstance {
                        instance_id: instance_id.to_owned(),
                        name_tag: find_tag(instance.tags(), NAME_TAG),
                        stack: stack.to_owned(),
                        volumes: instance
                            .block_device_mappings()
                            .iter()
                            .filter_map(|mapping| {
                                Some(Volume {
                                    device_name: mapping.device_name().map(str::to_owned),
                                    volume_id: mapping.ebs()?.volume_id()?.to_owned(),
                                })
                            })
                            .collect(),
                    });
                }
            }
        }
        Ok(instances)
    }

    async fn create_snapshot(
        &self,
        request: &SnapshotRequest,
    ) -> Result<BackupArtifact, ProviderError> {
        let output = self
            .client
            .create_snapshot()
            .volume_id(&request.volume_id)
            .description(&request.description)
            .tag_specifications(
                TagSpecification::builder()
                    .resource_type(ResourceType::Snapshot)
                    .tags(Tag::builder().key(NAME_TAG).value(&request.name).build())
                    .tags(Tag::builder().key(MAIN_STACK_TAG).value(&request.stack).build())
                    .build(),
            )
            .send()
            .await
            .map_err(|err| classify("CreateSnapshot", err))?;

        let snapshot_id = output
            .snapshot_id()
            .ok_or_else(|| ProviderError::Unexpected {
                operation: "CreateSnapshot",
                message: format!("no snapshot id returned for {}", request.volume_id),
            })?;
        Ok(BackupArtifact {
            snapshot_id: snapshot_id.to_owned(),
            volume_id: request.volume_id.clone(),
            name: Some(request.name.clone()),
            stack: Some(request.stack.clone()),
            description: Some(request.description.clone()),
            created_at: output.start_time().and_then(to_chrono),
        })
    }

    async fn list_snapshots(
        &self,
        stack: &str,
        name: &str,
    ) -> Result<Vec<BackupArtifact>, ProviderError> {
        let mut pages = self
            .client
            .describe_snapshots()
            .owner_ids("self")
            .filters(tag_filter(MAIN_STACK_TAG, stack))
            .filters(tag_filter(NAME_TAG, name))
            .into_paginator()
            .send();

        let mut snapshots = vec![];
        while let Some(page) = pages.next().await {
            let page = page.map_err(|err| classify("DescribeSnapshots", err))?;
            for snapshot in page.snapshots() {
                let Some(snapshot_id) = snapshot.snapshot_id() else {
                    continue;
                };
                snapshots.push(BackupArtifact {
                    snapshot_id: snapshot_id.to_owned(),
                    volume_id: snapshot.volume_id().unwrap_or_default().to_owned(),
                    name: find_tag(snapshot.tags(), NAME_TAG),
                    stack: find_tag(snapshot.tags(), MAIN_STACK_TAG),
                    description: snapshot.description().map(str::to_owned),
                    created_at: snapshot.start_time().and_then(to_chrono),
                });
            }
        }
        Ok(snapshots)
    }

    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<DeletionResult, ProviderError> {
        let output = self
            .client
            .delete_snapshot()
            .snapshot_id(snapshot_id)
            .send()
            .await
            .map_err(|err| classify("DeleteSnapshot", err))?;
        Ok(DeletionResult {
            snapshot_id: snapshot_id.to_owned(),
            request_id: output.request_id().map(str::to_owned),
        })
    }
}

fn tag_filter(key: &str, value: &str) -> Filter {
    Filter::builder()
        .name(format!("tag:{key}"))
        .values(value)
        .build()
}

fn find_tag(tags: &[Tag], key: &str) -> Option<String> {
    tags.iter()
        .find(|tag| tag.key() == Some(key))
        .and_then(|tag| tag.value())
        .map(str::to_owned)
}

fn to_chrono(time: &aws_sdk_ec2::primitives::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(time.secs(), time.subsec_nanos())
}

/// Sorts an SDK failure into validation, client and unexpected errors.
pub(crate) fn classify<E, R>(operation: &'static str, err: SdkError<E, R>) -> ProviderError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(&err).to_string();
    match &err {
        SdkError::ConstructionFailure(_) => ProviderError::Validation { operation, message },
        SdkError::ServiceError(_) => ProviderError::Client {
            operation,
            code: err.code().map(str::to_owned),
            message,
        },
        _ => ProviderError::Unexpected { operation, message },
    }
}
