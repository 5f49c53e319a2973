use crate::instance::VolumeSelector;
use chrono::{DateTime, Utc};

/// How long snapshots are kept and which instances are backed up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Snapshots at least this many whole days old are deleted. Zero or negative deletes everything.
    pub retention_days: i64,
    pub auto_delete: bool,
    /// Instances must carry this tag key to be in scope.
    pub custom_tag_key: String,
    pub data_volume: VolumeSelector,
}

impl RetentionPolicy {
    pub fn new(custom_tag_key: impl Into<String>) -> Self {
        RetentionPolicy {
            retention_days: 0,
            auto_delete: false,
            custom_tag_key: custom_tag_key.into(),
            data_volume: VolumeSelector::default(),
        }
    }

    pub fn retain_for_days(mut self, days: i64) -> Self {
        self.retention_days = days;
        self
    }

    pub fn auto_delete(mut self, enabled: bool) -> Self {
        self.auto_delete = enabled;
        self
    }

    pub fn data_volume(mut self, selector: VolumeSelector) -> Self {
        self.data_volume = selector;
        self
    }

}

/// The boundary is inclusive: a snapshot exactly `retention_days` old is expired.
pub fn is_expired(created_at: DateTime<Utc>, now: DateTime<Utc>, retention_days: i64) -> bool {
    age_in_days(created_at, now) >= retention_days
}

/// Whole days between `created_at` and `now`, ignoring direction.
///
/// A start time slightly ahead of `now` due to clock skew counts as age 0 instead of going negative.
/// This also means a snapshot dated days into the future ages as if it were in the past.
pub fn age_in_days(created_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - created_at).num_days().abs()
}
