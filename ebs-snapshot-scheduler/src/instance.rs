use crate::error::ScheduleError;
use std::fmt;

/// A volume attached to an instance, in block device mapping order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Volume {
    pub device_name: Option<String>,
    pub volume_id: String,
}

impl Volume {
    pub fn new(device_name: impl Into<String>, volume_id: impl Into<String>) -> Self {
        Volume {
            device_name: Some(device_name.into()),
            volume_id: volume_id.into(),
        }
    }
}

/// An instance in scope for backup, as discovered by a tag query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedInstance {
    pub instance_id: String,
    /// Raw value of the `Name` tag, `None` if the instance is untagged.
    pub name_tag: Option<String>,
    pub stack: String,
    pub volumes: Vec<Volume>,
}

impl ManagedInstance {
    /// The `Name` tag with the leading `"<stack>-"` removed.
    ///
    /// Only a leading prefix is stripped, so `demo-demo-Worker1` in stack `demo` becomes `demo-Worker1`.
    pub fn display_name(&self) -> Result<&str, ScheduleError> {
        let name = self
            .name_tag
            .as_deref()
            .ok_or_else(|| ScheduleError::MissingTag {
                instance_id: self.instance_id.clone(),
                tag: crate::NAME_TAG,
            })?;
        let prefix = format!("{}-", self.stack);
        Ok(name.strip_prefix(&prefix).unwrap_or(name))
    }

    /// Name given to every snapshot of this instance's data volume.
    pub fn backup_name(&self) -> Result<String, ScheduleError> {
        Ok(format!("{}-Data-Volume-SnapShot", self.display_name()?))
    }

    pub fn data_volume(&self, selector: &VolumeSelector) -> Result<&Volume, ScheduleError> {
        let volume = match selector {
            VolumeSelector::Position(index) => self.volumes.get(*index),
            VolumeSelector::Device(device) => self
                .volumes
                .iter()
                .find(|volume| volume.device_name.as_deref() == Some(device.as_str())),
        };
        volume.ok_or_else(|| ScheduleError::MissingDataVolume {
            instance_id: self.instance_id.clone(),
            selector: selector.to_string(),
        })
    }
}

/// Picks which attached volume holds an instance's data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VolumeSelector {
    /// Zero based position in the block device mappings.
    Position(usize),
    /// Device name such as `/dev/sdb`.
    Device(String),
}

impl Default for VolumeSelector {
    /// The second block device. Cluster nodes boot from the first and keep their data on the second.
    fn default() -> Self {
        VolumeSelector::Position(1)
    }
}

impl VolumeSelector {
    /// Parses `DataVolumeDevice`: a device path selects by name, a bare integer by position.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() {
            None
        } else if let Ok(index) = value.parse::<usize>() {
            Some(VolumeSelector::Position(index))
        } else {
            Some(VolumeSelector::Device(value.to_owned()))
        }
    }
}

impl fmt::Display for VolumeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VolumeSelector::Position(index) => write!(f, "block device #{index}"),
            VolumeSelector::Device(device) => write!(f, "device {device}"),
        }
    }
}
