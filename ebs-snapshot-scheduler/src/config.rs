// Configuration for a single scheduler run.
//
// Values are resolved once, at the start of a run, in this order:
// 1. The invocation event (highest priority)
// 2. The outputs of the scheduler's CloudFormation stack
// 3. Built in defaults (lowest priority)

use crate::error::ScheduleError;
use crate::instance::VolumeSelector;
use crate::retention::RetentionPolicy;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;

/// Names of the recognised configuration keys, shared by events and stack outputs.
pub mod keys {
    pub const STACK_NAME: &str = "StackName";
    pub const REQUEST_TYPE: &str = "RequestType";
    pub const AUTO_DELETE: &str = "AutoSnapshotDeletion";
    pub const RETENTION_PERIOD: &str = "ScheduleRetentionPeriod";
    pub const CUSTOM_TAG: &str = "ScheduleCustomTagName";
    pub const REGION: &str = "RegionName";
    pub const DATA_VOLUME: &str = "DataVolumeDevice";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestType {
    Create,
    Delete,
    Test,
    Other(String),
}

impl RequestType {
    pub fn parse(value: &str) -> Self {
        match value {
            "Create" => RequestType::Create,
            "Delete" => RequestType::Delete,
            "Test" => RequestType::Test,
            other => RequestType::Other(other.to_owned()),
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestType::Create => write!(f, "Create"),
            RequestType::Delete => write!(f, "Delete"),
            RequestType::Test => write!(f, "Test"),
            RequestType::Other(other) => write!(f, "{other}"),
        }
    }
}

/// The two places a configuration value can come from.
pub struct ConfigSources<'a> {
    pub event: &'a Map<String, Value>,
    pub outputs: &'a HashMap<String, String>,
}

impl ConfigSources<'_> {
    /// Event first, then stack outputs. JSON `null` counts as absent.
    pub fn lookup(&self, key: &str) -> Option<String> {
        let from_event = match self.event.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(value)) => Some(value.clone()),
            Some(other) => Some(other.to_string()),
        };
        from_event.or_else(|| self.outputs.get(key).cloned())
    }

    /// Looks up the request type alone. No other key is parsed.
    pub fn request_type(&self) -> Option<RequestType> {
        self.lookup(keys::REQUEST_TYPE).map(|value| RequestType::parse(&value))
    }
}

/// Fully merged configuration for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleConfig {
    pub auto_delete: bool,
    /// Only resolved when auto deletion is enabled.
    pub retention_days: Option<i64>,
    pub custom_tag_key: Option<String>,
    pub region: Option<String>,
    pub data_volume: VolumeSelector,
}

impl ScheduleConfig {
    pub fn resolve(sources: &ConfigSources) -> Result<Self, ScheduleError> {
        let auto_delete = match sources.lookup(keys::AUTO_DELETE) {
            Some(value) => parse_flag(keys::AUTO_DELETE, &value)?,
            None => false,
        };

        let retention_days = match sources.lookup(keys::RETENTION_PERIOD) {
            Some(value) if auto_delete => Some(parse_days(&value)?),
            _ => None,
        };

        let data_volume = match sources
            .lookup(keys::DATA_VOLUME)
            .filter(|value| !value.trim().is_empty())
        {
            Some(value) => {
                VolumeSelector::parse(&value).ok_or_else(|| ScheduleError::InvalidConfig {
                    key: keys::DATA_VOLUME,
                    value,
                    reason: "expected a device name or a block device position".into(),
                })?
            }
            None => VolumeSelector::default(),
        };

        Ok(ScheduleConfig {
            auto_delete,
            retention_days,
            custom_tag_key: sources.lookup(keys::CUSTOM_TAG).filter(|key| !key.is_empty()),
            region: sources.lookup(keys::REGION).filter(|region| !region.is_empty()),
            data_volume,
        })
    }

    /// The policy a `Create` request runs with. Fails if a value it needs was never configured.
    pub fn retention_policy(&self) -> Result<RetentionPolicy, ScheduleError> {
        let tag_key = self
            .custom_tag_key
            .clone()
            .ok_or(ScheduleError::MissingConfig {
                key: keys::CUSTOM_TAG,
            })?;
        let mut policy = RetentionPolicy::new(tag_key)
            .auto_delete(self.auto_delete)
            .data_volume(self.data_volume.clone());
        if self.auto_delete {
            let days = self.retention_days.ok_or(ScheduleError::MissingConfig {
                key: keys::RETENTION_PERIOD,
            })?;
            policy = policy.retain_for_days(days);
        }
        Ok(policy)
    }
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ScheduleError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" | "" => Ok(false),
        _ => Err(ScheduleError::InvalidConfig {
            key,
            value: value.to_owned(),
            reason: "expected true or false".into(),
        }),
    }
}

fn parse_days(value: &str) -> Result<i64, ScheduleError> {
    value
        .trim()
        .parse()
        .map_err(|err: std::num::ParseIntError| ScheduleError::InvalidConfig {
            key: keys::RETENTION_PERIOD,
            value: value.to_owned(),
            reason: err.to_string(),
        })
}
