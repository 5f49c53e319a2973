use crate::helpers::{now, MemoryCloud};
use chrono::Duration;
use ebs_snapshot_scheduler::{
    Clock, ManagedInstance, ProviderError, RetentionEvaluator, ScheduleError, Volume,
};
use pretty_assertions::assert_eq;

const NAME: &str = "Worker1-Data-Volume-SnapShot";

fn clock() -> Clock {
    Box::new(now)
}

fn worker1() -> ManagedInstance {
    ManagedInstance {
        instance_id: "i-1".into(),
        name_tag: Some("demo-Worker1".into()),
        stack: "demo".into(),
        volumes: vec![Volume::new("/dev/sda1", "vol-boot"), Volume::new("/dev/sdb", "vol-data")],
    }
}

fn deleted_ids(results: &[ebs_snapshot_scheduler::DeletionResult]) -> Vec<&str> {
    results.iter().map(|result| result.snapshot_id.as_str()).collect()
}

#[tokio::test]
async fn boundary_is_inclusive() {
    let cloud = MemoryCloud::new()
        .with_snapshot("snap-6d", "demo", NAME, Duration::days(6))
        .with_snapshot("snap-7d", "demo", NAME, Duration::days(7))
        .with_snapshot("snap-almost-7d", "demo", NAME, Duration::days(7) - Duration::minutes(1))
        .with_snapshot("snap-8d", "demo", NAME, Duration::days(8));
    let clock = clock();
    let evaluator = RetentionEvaluator::new(&cloud, &clock);

    let deleted = evaluator.purge_expired(NAME, 7, "demo").await.unwrap();

    assert_eq!(deleted_ids(&deleted), vec!["snap-7d", "snap-8d"]);
    assert_eq!(cloud.snapshot_ids(), vec!["snap-6d", "snap-almost-7d"]);
}

#[tokio::test]
async fn other_stacks_are_never_touched() {
    let cloud = MemoryCloud::new()
        .with_snapshot("snap-demo", "demo", NAME, Duration::days(30))
        .with_snapshot("snap-prod", "prod", NAME, Duration::days(30))
        .with_snapshot(
            "snap-other-name",
            "demo",
            "Worker2-Data-Volume-SnapShot",
            Duration::days(30),
        );
    let clock = clock();
    let evaluator = RetentionEvaluator::new(&cloud, &clock);

    let deleted = evaluator.purge_expired(NAME, 1, "demo").await.unwrap();

    assert_eq!(deleted_ids(&deleted), vec!["snap-demo"]);
    assert_eq!(cloud.snapshot_ids(), vec!["snap-prod", "snap-other-name"]);
}

#[tokio::test]
async fn future_dated_snapshots_age_like_past_ones() {
    let cloud = MemoryCloud::new()
        .with_snapshot("snap-skewed", "demo", NAME, -Duration::minutes(3))
        .with_snapshot("snap-future", "demo", NAME, -Duration::days(10));
    let clock = clock();
    let evaluator = RetentionEvaluator::new(&cloud, &clock);

    let deleted = evaluator.purge_expired(NAME, 5, "demo").await.unwrap();

    assert_eq!(deleted_ids(&deleted), vec!["snap-future"]);
}

#[tokio::test]
async fn undated_snapshots_are_kept() {
    let cloud = MemoryCloud::new()
        .with_undated_snapshot("snap-undated", "demo", NAME)
        .with_snapshot("snap-old", "demo", NAME, Duration::days(30));
    let clock = clock();
    let evaluator = RetentionEvaluator::new(&cloud, &clock);

    let deleted = evaluator.purge_expired(NAME, 7, "demo").await.unwrap();

    assert_eq!(deleted_ids(&deleted), vec!["snap-old"]);
    assert_eq!(cloud.snapshot_ids(), vec!["snap-undated"]);
}

#[tokio::test]
async fn nothing_expired_is_an_empty_success() {
    let cloud = MemoryCloud::new().with_snapshot("snap-1", "demo", NAME, Duration::days(1));
    let clock = clock();
    let evaluator = RetentionEvaluator::new(&cloud, &clock);

    let deleted = evaluator.purge_expired(NAME, 7, "demo").await.unwrap();

    assert!(deleted.is_empty());
    assert_eq!(cloud.snapshot_ids(), vec!["snap-1"]);
}

#[tokio::test]
async fn listing_failure_is_an_error_not_an_empty_result() {
    let cloud = MemoryCloud::new()
        .with_snapshot("snap-1", "demo", NAME, Duration::days(30))
        .fail_listing();
    let clock = clock();
    let evaluator = RetentionEvaluator::new(&cloud, &clock);

    let err = evaluator.purge_expired(NAME, 7, "demo").await.unwrap_err();

    match err {
        ScheduleError::Purge { deleted, source, .. } => {
            assert!(deleted.is_empty());
            assert_eq!(source.operation(), "DescribeSnapshots");
            assert!(matches!(source, ProviderError::Client { .. }));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn backup_then_zero_day_purge_removes_it() {
    let cloud = MemoryCloud::new();
    let clock = clock();
    let evaluator = RetentionEvaluator::new(&cloud, &clock);

    let artifact = evaluator
        .create_backup(&worker1(), "vol-data", "demo")
        .await
        .unwrap();
    assert_eq!(artifact.name.as_deref(), Some(NAME));
    assert_eq!(artifact.stack.as_deref(), Some("demo"));
    assert_eq!(artifact.volume_id, "vol-data");

    let deleted = evaluator.purge_expired(NAME, 0, "demo").await.unwrap();

    assert_eq!(deleted_ids(&deleted), vec![artifact.snapshot_id.as_str()]);
    assert!(cloud.snapshot_ids().is_empty());
}

#[tokio::test]
async fn backup_failure_names_the_instance_and_volume() {
    let cloud = MemoryCloud::new().fail_snapshots_of("vol-data");
    let clock = clock();
    let evaluator = RetentionEvaluator::new(&cloud, &clock);

    let err = evaluator
        .create_backup(&worker1(), "vol-data", "demo")
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "failed to snapshot vol-data of i-1: CreateSnapshot failed with SnapshotCreationPerVolumeRateExceeded: CreateSnapshot rejected"
    );
}
