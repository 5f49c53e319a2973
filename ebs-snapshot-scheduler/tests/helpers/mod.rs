use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use ebs_snapshot_scheduler::{
    BackupArtifact, CloudProvider, ComputeApi, DeletionResult, ManagedInstance, ProviderError,
    SnapshotRequest, StackApi, Volume,
};
use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::MakeWriter;

pub fn now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-06-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

/// Log output collected by a test subscriber.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

impl Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// A tagged instance as the cloud sees it.
#[derive(Clone)]
struct StoredInstance {
    instance: ManagedInstance,
    tag_keys: HashSet<String>,
}

#[derive(Default)]
struct State {
    outputs: HashMap<String, HashMap<String, String>>,
    instances: Vec<StoredInstance>,
    snapshots: Vec<BackupArtifact>,
    next_snapshot: usize,
    calls: Vec<String>,
    regions: Vec<Option<String>>,
    failing_volumes: HashSet<String>,
    failing_deletes: HashSet<String>,
    fail_listing: bool,
}

/// In memory cloud account. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryCloud {
    state: Arc<Mutex<State>>,
}

impl MemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_outputs(self, stack: &str, outputs: &[(&str, &str)]) -> Self {
        self.state.lock().unwrap().outputs.insert(
            stack.to_owned(),
            outputs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
        self
    }

    /// Adds an instance with a boot volume and a data volume, tagged `MainStack`, `Name` and `tag_key`.
    pub fn with_instance(self, stack: &str, instance_id: &str, name: &str, tag_key: &str) -> Self {
        let volumes = vec![
            Volume::new("/dev/sda1", format!("{instance_id}-boot")),
            Volume::new("/dev/sdb", format!("{instance_id}-data")),
        ];
        self.with_instance_volumes(stack, instance_id, name, tag_key, volumes)
    }

    pub fn with_instance_volumes(
        self,
        stack: &str,
        instance_id: &str,
        name: &str,
        tag_key: &str,
        volumes: Vec<Volume>,
    ) -> Self {
        self.state.lock().unwrap().instances.push(StoredInstance {
            instance: ManagedInstance {
                instance_id: instance_id.to_owned(),
                name_tag: Some(name.to_owned()),
                stack: stack.to_owned(),
                volumes,
            },
            tag_keys: [tag_key.to_owned()].into_iter().collect(),
        });
        self
    }

    /// Adds an existing snapshot created `age` before [`now`].
    pub fn with_snapshot(self, id: &str, stack: &str, name: &str, age: Duration) -> Self {
        self.state.lock().unwrap().snapshots.push(BackupArtifact {
            snapshot_id: id.to_owned(),
            volume_id: "vol-old".to_owned(),
            name: Some(name.to_owned()),
            stack: Some(stack.to_owned()),
            description: None,
            created_at: Some(now() - age),
        });
        self
    }

    /// Adds an existing snapshot the cloud reports no start time for.
    pub fn with_undated_snapshot(self, id: &str, stack: &str, name: &str) -> Self {
        self.state.lock().unwrap().snapshots.push(BackupArtifact {
            snapshot_id: id.to_owned(),
            volume_id: "vol-old".to_owned(),
            name: Some(name.to_owned()),
            stack: Some(stack.to_owned()),
            description: None,
            created_at: None,
        });
        self
    }

    pub fn fail_snapshots_of(self, volume_id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_volumes
            .insert(volume_id.to_owned());
        self
    }

    pub fn fail_delete_of(self, snapshot_id: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_deletes
            .insert(snapshot_id.to_owned());
        self
    }

    pub fn fail_listing(self) -> Self {
        self.state.lock().unwrap().fail_listing = true;
        self
    }

    pub fn snapshot_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .snapshots
            .iter()
            .map(|snapshot| snapshot.snapshot_id.clone())
            .collect()
    }

    /// Names of the provider operations called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn regions(&self) -> Vec<Option<String>> {
        self.state.lock().unwrap().regions.clone()
    }

    fn record(&self, call: &str) {
        self.state.lock().unwrap().calls.push(call.to_owned());
    }
}

fn client_error(operation: &'static str, code: &str) -> ProviderError {
    ProviderError::Client {
        operation,
        code: Some(code.to_owned()),
        message: format!("{operation} rejected"),
    }
}

#[async_trait]
impl StackApi for MemoryCloud {
    async fn stack_outputs(
        &self,
        stack_name: &str,
    ) -> Result<HashMap<String, String>, ProviderError> {
        self.record("DescribeStacks");
        self.state
            .lock()
            .unwrap()
            .outputs
            .get(stack_name)
            .cloned()
            .ok_or_else(|| client_error("DescribeStacks", "ValidationError"))
    }
}

#[async_trait]
impl CloudProvider for MemoryCloud {
    type Compute = MemoryCloud;

    async fn compute(&self, region: Option<&str>) -> MemoryCloud {
        self.state
            .lock()
            .unwrap()
            .regions
            .push(region.map(str::to_owned));
        self.clone()
    }
}

#[async_trait]
impl ComputeApi for MemoryCloud {
    async fn tagged_instances(
        &self,
        stack: &str,
        tag_key: &str,
    ) -> Result<Vec<ManagedInstance>, ProviderError> {
        self.record("DescribeInstances");
        Ok(self
            .state
            .lock()
            .unwrap()
            .instances
            .iter()
            .filter(|stored| stored.instance.stack == stack && stored.tag_keys.contains(tag_key))
            .map(|stored| stored.instance.clone())
            .collect())
    }

    async fn create_snapshot(
        &self,
        request: &SnapshotRequest,
    ) -> Result<BackupArtifact, ProviderError> {
        self.record("CreateSnapshot");
        let mut state = self.state.lock().unwrap();
        if state.failing_volumes.contains(&request.volume_id) {
            return Err(client_error("CreateSnapshot", "SnapshotCreationPerVolumeRateExceeded"));
        }
        state.next_snapshot += 1;
        let artifact = BackupArtifact {
            snapshot_id: format!("snap-new-{}", state.next_snapshot),
            volume_id: request.volume_id.clone(),
            name: Some(request.name.clone()),
            stack: Some(request.stack.clone()),
            description: Some(request.description.clone()),
            created_at: Some(now()),
        };
        state.snapshots.push(artifact.clone());
        Ok(artifact)
    }

    async fn list_snapshots(
        &self,
        stack: &str,
        name: &str,
    ) -> Result<Vec<BackupArtifact>, ProviderError> {
        self.record("DescribeSnapshots");
        let state = self.state.lock().unwrap();
        if state.fail_listing {
            return Err(client_error("DescribeSnapshots", "UnauthorizedOperation"));
        }
        Ok(state
            .snapshots
            .iter()
            .filter(|snapshot| {
                snapshot.stack.as_deref() == Some(stack) && snapshot.name.as_deref() == Some(name)
            })
            .cloned()
            .collect())
    }

    async fn delete_snapshot(&self, snapshot_id: &str) -> Result<DeletionResult, ProviderError> {
        self.record("DeleteSnapshot");
        let mut state = self.state.lock().unwrap();
        if state.failing_deletes.contains(snapshot_id) {
            return Err(client_error("DeleteSnapshot", "InvalidSnapshot.InUse"));
        }
        state
            .snapshots
            .retain(|snapshot| snapshot.snapshot_id != snapshot_id);
        Ok(DeletionResult {
            snapshot_id: snapshot_id.to_owned(),
            request_id: Some(format!("req-{snapshot_id}")),
        })
    }
}
