//! Unit tests for resource release.

use std::time::Duration;

use super::*;
use crate::backend::StorageBackend;
use crate::resource::{ResourceKind, VolumeId};
use crate::test_support::{FakeCloud, FakeStep};

const GRACE: Duration = Duration::from_secs(5);

async fn seed(cloud: &FakeCloud, volume: &str) -> Vec<TemporaryResource> {
    let volume_id = VolumeId::from(volume);
    let snapshot = cloud
        .create_snapshot(&volume_id, "snap")
        .await
        .unwrap_or_else(|err| panic!("create snapshot: {err}"));
    let clone = cloud
        .create_volume_from_snapshot(&crate::backend::CloneRequest {
            name: String::from("tmp"),
            snapshot_id: snapshot.clone(),
            size_gb: 1,
        })
        .await
        .unwrap_or_else(|err| panic!("create clone: {err}"));
    vec![
        TemporaryResource::new(ResourceKind::Snapshot, snapshot, volume_id.clone()),
        TemporaryResource::new(ResourceKind::Volume, clone, volume_id),
    ]
}

#[tokio::test]
async fn release_all_runs_in_reverse_creation_order() {
    let cloud = FakeCloud::new();
    let mut stack = ReleaseStack::new();
    for resource in seed(&cloud, "vol-1").await {
        stack.push(resource);
    }
    assert_eq!(stack.len(), 2);

    let outcomes = stack.release_all(&cloud, GRACE).await;

    assert_eq!(outcomes, vec![Release::Deleted, Release::Deleted]);
    assert_eq!(
        cloud.releases_for("vol-1"),
        vec![ResourceKind::Volume, ResourceKind::Snapshot]
    );
    assert!(cloud.live_resources().is_empty());
}

#[tokio::test]
async fn failed_release_does_not_stop_the_rest() {
    let cloud = FakeCloud::new();
    let mut stack = ReleaseStack::new();
    for resource in seed(&cloud, "vol-1").await {
        stack.push(resource);
    }
    cloud.fail_at("vol-1", FakeStep::Release(ResourceKind::Volume));

    let outcomes = stack.release_all(&cloud, GRACE).await;

    assert_eq!(outcomes, vec![Release::Failed, Release::Deleted]);
    let live = cloud.live_resources();
    assert_eq!(live.len(), 1);
    assert!(live.iter().all(|resource| resource.kind == ResourceKind::Volume));
}

#[tokio::test]
async fn slow_release_is_abandoned_after_the_grace_period() {
    let cloud = FakeCloud::new();
    let resources = seed(&cloud, "vol-1").await;
    let slow = cloud.clone().with_latency(Duration::from_millis(200));
    let Some(snapshot) = resources.first() else {
        panic!("seed created no snapshot");
    };

    let outcome = release(&slow, snapshot, Duration::from_millis(10)).await;

    assert_eq!(outcome, Release::TimedOut);
}

#[tokio::test]
async fn empty_stack_releases_nothing() {
    let cloud = FakeCloud::new();
    let stack = ReleaseStack::new();
    assert!(stack.is_empty());

    let outcomes = stack.release_all(&cloud, GRACE).await;

    assert!(outcomes.is_empty());
    assert!(cloud.events().is_empty());
}
