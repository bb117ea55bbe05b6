//! Unit tests for bounded fan-out.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rstest::rstest;
use tokio::sync::Barrier;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;

use super::*;

#[derive(Default)]
struct Gauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl Gauge {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

#[rstest]
#[case(0)]
#[case(1)]
#[case(3)]
fn semaphore_is_absent_only_for_zero(#[case] limit: usize) {
    let semaphore = build_semaphore(limit);
    assert_eq!(semaphore.is_none(), limit == 0);
    if let Some(sem) = semaphore {
        assert_eq!(sem.available_permits(), limit);
    }
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(4)]
#[tokio::test]
async fn never_exceeds_the_limit(#[case] limit: usize) {
    let gauge = Arc::new(Gauge::default());
    let items: Vec<usize> = (0..10).collect();

    let slots = bounded_fan_out(items, limit, &CancellationToken::new(), |item| {
        let gauge = Arc::clone(&gauge);
        async move {
            gauge.enter();
            sleep(Duration::from_millis(5)).await;
            gauge.leave();
            item * 2
        }
    })
    .await;

    assert!(gauge.peak.load(Ordering::SeqCst) <= limit);
    let outputs: Vec<usize> = slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|err| panic!("slot failed: {err}")))
        .collect();
    assert_eq!(outputs, (0..10).map(|item| item * 2).collect::<Vec<_>>());
}

#[tokio::test]
async fn zero_limit_runs_everything_at_once() {
    let barrier = Arc::new(Barrier::new(6));
    let cancel = CancellationToken::new();

    let run = bounded_fan_out((0..6).collect(), 0, &cancel, |item: u32| {
        let barrier = Arc::clone(&barrier);
        async move {
            barrier.wait().await;
            item
        }
    });
    let slots = timeout(Duration::from_secs(5), run)
        .await
        .unwrap_or_else(|_| panic!("all tasks should reach the barrier together"));

    assert!(slots.iter().all(Result::is_ok));
}

#[tokio::test]
async fn panicking_task_fills_its_own_slot() {
    let slots = bounded_fan_out(vec![1_u32, 2, 3], 2, &CancellationToken::new(), |item| async move {
        assert!(item != 2, "boom on {item}");
        item
    })
    .await;

    assert_eq!(slots.first(), Some(&Ok(1)));
    assert!(
        matches!(slots.get(1), Some(Err(TaskFailure::Panicked(message))) if message.contains("boom on 2")),
        "unexpected slot: {:?}",
        slots.get(1)
    );
    assert_eq!(slots.get(2), Some(&Ok(3)));
}

#[tokio::test]
async fn cancellation_stops_tasks_waiting_for_a_permit() {
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();

    let slots = bounded_fan_out(vec![0_u32, 1, 2], 1, &cancel, move |item| {
        let trigger = trigger.clone();
        async move {
            trigger.cancel();
            item
        }
    })
    .await;

    let cancelled = slots
        .iter()
        .filter(|slot| matches!(slot, Err(TaskFailure::Cancelled)))
        .count();
    assert_eq!(slots.iter().filter(|slot| slot.is_ok()).count(), 1);
    assert_eq!(cancelled, 2);
}
