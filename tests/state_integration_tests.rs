//! Integration tests for StateManager with state change events
//!
//! These tests verify that the StateManager correctly:
//! - Emits state change events on mutations
//! - Supports multiple subscribers
//! - Handles concurrent access from multiple tasks
//! - Maintains consistency across a whole pass

use dcnnt::services::BatchSummary;
use dcnnt::{FileStatus, StateChange, StateManager, TransferDirection};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{Duration, timeout};

async fn next_event(rx: &mut broadcast::Receiver<StateChange>) -> StateChange {
    timeout(Duration::from_millis(100), rx.recv())
        .await
        .expect("Timeout waiting for event")
        .expect("Channel closed")
}

#[tokio::test]
async fn test_batch_started_event_emitted() {
    let state = Arc::new(StateManager::new());
    let mut rx = state.subscribe();

    state.begin_batch(TransferDirection::Download, 2);

    let event = next_event(&mut rx).await;
    assert!(
        matches!(
            event,
            StateChange::BatchStarted {
                direction: TransferDirection::Download,
                total: 2
            }
        ),
        "Expected BatchStarted event, got: {:?}",
        event
    );
    assert_eq!(
        next_event(&mut rx).await,
        StateChange::ProgressUpdated {
            completed: 0,
            total: 2
        }
    );
}

#[tokio::test]
async fn test_multiple_subscribers_receive_events() {
    let state = Arc::new(StateManager::new());
    let mut rx1 = state.subscribe();
    let mut rx2 = state.subscribe();
    let mut rx3 = state.subscribe();

    state.cancel_requested("42");

    let expected = StateChange::CancelRequested {
        id: "42".to_string(),
    };
    assert_eq!(next_event(&mut rx1).await, expected);
    assert_eq!(next_event(&mut rx2).await, expected);
    assert_eq!(next_event(&mut rx3).await, expected);
}

#[tokio::test]
async fn test_full_pass_event_sequence() {
    let state = StateManager::new();
    let mut rx = state.subscribe();

    state.begin_batch(TransferDirection::Upload, 2);
    state.entry_started("a", "a.txt");
    state.entry_finished("a", "a.txt", FileStatus::Done, "OK");
    state.entry_started("b", "b.txt");
    state.entry_finished("b", "b.txt", FileStatus::Failed, "Refused");
    state.finish_batch(&BatchSummary {
        succeeded: 1,
        failed: 1,
        cancelled: 0,
        total: 2,
    });

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }

    assert_eq!(
        events,
        vec![
            StateChange::BatchStarted {
                direction: TransferDirection::Upload,
                total: 2
            },
            StateChange::ProgressUpdated {
                completed: 0,
                total: 2
            },
            StateChange::EntryStarted {
                id: "a".to_string(),
                name: "a.txt".to_string()
            },
            StateChange::ProgressUpdated {
                completed: 1,
                total: 2
            },
            StateChange::EntryFinished {
                id: "a".to_string(),
                name: "a.txt".to_string(),
                status: FileStatus::Done,
                message: "OK".to_string()
            },
            StateChange::EntryStarted {
                id: "b".to_string(),
                name: "b.txt".to_string()
            },
            StateChange::ProgressUpdated {
                completed: 2,
                total: 2
            },
            StateChange::EntryFinished {
                id: "b".to_string(),
                name: "b.txt".to_string(),
                status: FileStatus::Failed,
                message: "Refused".to_string()
            },
            StateChange::BatchFinished {
                succeeded: 1,
                failed: 1,
                cancelled: 0
            },
        ]
    );
}

#[tokio::test]
async fn test_concurrent_state_access() {
    let state = Arc::new(StateManager::new());
    state.begin_batch(TransferDirection::Download, 50);

    let mut handles = vec![];
    for i in 0..50 {
        let state = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            let id = format!("file-{}", i);
            let name = format!("{}.bin", id);
            state.entry_started(&id, &name);
            let status = if i % 5 == 0 {
                FileStatus::Failed
            } else {
                FileStatus::Done
            };
            state.entry_finished(&id, &name, status, "");
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.await.unwrap();
    }

    let snapshot = state.snapshot();
    assert_eq!(snapshot.completed, 50);
    assert!(snapshot.is_complete());
    assert!(snapshot.active.is_empty());
    assert_eq!(snapshot.stats(), (40, 10, 0, 50));
}

#[tokio::test]
async fn test_duplicate_results_count_once() {
    let state = StateManager::new();
    state.begin_batch(TransferDirection::Upload, 3);

    state.entry_finished("x", "x", FileStatus::Cancel, "Cancelled");
    let changes = state.entry_finished("x", "x", FileStatus::Cancel, "Cancelled");

    // Only the per-entry event; progress did not move
    assert_eq!(changes.len(), 1);
    assert_eq!(state.read(|s| s.completed), 1);
    assert_eq!(state.read(|s| s.cancelled.len()), 1);
}

#[tokio::test]
async fn test_reset_after_pass() {
    let state = StateManager::new();
    state.begin_batch(TransferDirection::Upload, 1);
    state.entry_finished("a", "a", FileStatus::Done, "");
    state.finish_batch(&BatchSummary::default());

    let mut rx = state.subscribe();
    state.reset();

    assert_eq!(
        next_event(&mut rx).await,
        StateChange::ProgressUpdated {
            completed: 0,
            total: 0
        }
    );
    assert_eq!(next_event(&mut rx).await, StateChange::StateReset);

    let snapshot = state.snapshot();
    assert!(!snapshot.is_running);
    assert!(snapshot.direction.is_none());
    assert_eq!(snapshot.stats(), (0, 0, 0, 0));
}

#[tokio::test]
async fn test_new_batch_clears_previous_results() {
    let state = StateManager::new();
    state.begin_batch(TransferDirection::Upload, 1);
    state.entry_finished("a", "a", FileStatus::Failed, "boom");
    state.finish_batch(&BatchSummary::default());

    state.begin_batch(TransferDirection::Download, 4);

    let snapshot = state.snapshot();
    assert!(snapshot.is_running);
    assert_eq!(snapshot.direction, Some(TransferDirection::Download));
    assert_eq!(snapshot.stats(), (0, 0, 0, 4));
}

#[tokio::test]
async fn test_clones_share_state_and_channel() {
    let state = StateManager::new();
    let clone = state.clone();
    let mut rx = state.subscribe();

    clone.begin_batch(TransferDirection::Upload, 1);

    assert!(state.read(|s| s.is_running));
    assert!(matches!(
        next_event(&mut rx).await,
        StateChange::BatchStarted { .. }
    ));
}
