//! Unit tests for the status wait loop.

use std::time::Duration;

use rstest::{fixture, rstest};
use tokio_util::sync::CancellationToken;

use super::*;
use crate::resource::VolumeId;
use crate::test_support::{FakeCloud, FakeStep};

const VOLUME: &str = "vol-1";

#[fixture]
fn cloud() -> FakeCloud {
    FakeCloud::new()
}

fn fast_policy() -> WaitPolicy {
    WaitPolicy::new(Duration::from_millis(200), Duration::from_millis(2))
}

async fn snapshot(cloud: &FakeCloud) -> ResourceId {
    cloud
        .create_snapshot(&VolumeId::from(VOLUME), "snap-vol-1")
        .await
        .unwrap_or_else(|err| panic!("create snapshot: {err}"))
}

#[rstest]
#[case(Duration::from_secs(5), 6)]
#[case(Duration::from_secs(7), 5)]
#[case(Duration::from_secs(10), 3)]
#[case(Duration::from_secs(45), 1)]
#[case(Duration::ZERO, 30_000)]
fn progress_cadence_is_counted_in_polls(#[case] interval: Duration, #[case] expected: u32) {
    let policy = WaitPolicy::new(Duration::from_secs(60), interval);
    assert_eq!(policy.progress_every(), expected);
}

#[test]
fn default_policy_matches_documented_values() {
    let policy = WaitPolicy::default();
    assert_eq!(policy.timeout(), Duration::from_secs(1800));
    assert_eq!(policy.poll_interval(), Duration::from_secs(5));
}

#[rstest]
#[tokio::test]
async fn returns_once_target_is_reached(cloud: FakeCloud) {
    cloud.script_status(
        VOLUME,
        ResourceKind::Snapshot,
        &["creating", "creating", "AVAILABLE"],
    );
    let id = snapshot(&cloud).await;

    let result = wait_for_status(
        &cloud,
        ResourceKind::Snapshot,
        &id,
        "available",
        &fast_policy(),
        &CancellationToken::new(),
    )
    .await;

    assert!(result.is_ok(), "unexpected wait outcome: {result:?}");
    assert_eq!(cloud.status_polls(), 3);
}

#[rstest]
#[case(ResourceKind::Snapshot, "error")]
#[case(ResourceKind::Image, "killed")]
#[tokio::test]
async fn terminal_status_fails_without_waiting_for_timeout(
    cloud: FakeCloud,
    #[case] kind: ResourceKind,
    #[case] terminal: &str,
) {
    cloud.script_status(VOLUME, ResourceKind::Snapshot, &["creating", terminal]);
    let id = snapshot(&cloud).await;
    let policy = WaitPolicy::new(Duration::from_secs(600), Duration::from_millis(1));

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        wait_for_status(
            &cloud,
            kind,
            &id,
            kind.ready_status(),
            &policy,
            &CancellationToken::new(),
        ),
    )
    .await
    .unwrap_or_else(|_| panic!("wait should end on the terminal status"));

    match result {
        Err(WaitError::EnteredErrorState { status, .. }) => assert_eq!(status, terminal),
        other => panic!("expected EnteredErrorState, got {other:?}"),
    }
    assert_eq!(cloud.status_polls(), 2);
}

#[rstest]
#[tokio::test]
async fn times_out_when_target_never_arrives(cloud: FakeCloud) {
    cloud.script_status(VOLUME, ResourceKind::Snapshot, &["creating"]);
    let id = snapshot(&cloud).await;
    let policy = WaitPolicy::new(Duration::from_millis(30), Duration::from_millis(5));

    let result = wait_for_status(
        &cloud,
        ResourceKind::Snapshot,
        &id,
        "available",
        &policy,
        &CancellationToken::new(),
    )
    .await;

    match result {
        Err(WaitError::Timeout {
            last_status,
            waited,
            ..
        }) => {
            assert_eq!(last_status, "creating");
            assert!(waited >= Duration::from_millis(30), "waited {waited:?}");
        }
        other => panic!("expected Timeout, got {other:?}"),
    }
}

#[rstest]
#[tokio::test]
async fn fetch_failure_surfaces_immediately(cloud: FakeCloud) {
    let id = snapshot(&cloud).await;
    cloud.fail_at(VOLUME, FakeStep::Status(ResourceKind::Snapshot));

    let result = wait_for_status(
        &cloud,
        ResourceKind::Snapshot,
        &id,
        "available",
        &fast_policy(),
        &CancellationToken::new(),
    )
    .await;

    assert!(
        matches!(result, Err(WaitError::Fetch { .. })),
        "unexpected wait outcome: {result:?}"
    );
    assert_eq!(cloud.status_polls(), 1);
}

#[rstest]
#[tokio::test]
async fn cancellation_interrupts_the_poll_sleep(cloud: FakeCloud) {
    cloud.script_status(VOLUME, ResourceKind::Snapshot, &["creating"]);
    let id = snapshot(&cloud).await;
    let policy = WaitPolicy::new(Duration::from_secs(600), Duration::from_secs(60));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        wait_for_status(
            &cloud,
            ResourceKind::Snapshot,
            &id,
            "available",
            &policy,
            &cancel,
        ),
    )
    .await
    .unwrap_or_else(|_| panic!("cancellation should end the wait promptly"));

    assert!(
        matches!(result, Err(WaitError::Cancelled { .. })),
        "unexpected wait outcome: {result:?}"
    );
}

#[rstest]
#[tokio::test]
async fn cancelled_token_skips_the_first_poll(cloud: FakeCloud) {
    let id = snapshot(&cloud).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = wait_for_status(
        &cloud,
        ResourceKind::Snapshot,
        &id,
        "available",
        &fast_policy(),
        &cancel,
    )
    .await;

    assert!(
        matches!(result, Err(WaitError::Cancelled { .. })),
        "unexpected wait outcome: {result:?}"
    );
    assert_eq!(cloud.status_polls(), 0);
}
