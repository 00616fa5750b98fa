// State management module
//
// This module provides the StateManager which wraps TransferState with thread-safe access
// using Arc<RwLock<T>> and emits change events for whatever adapter presents progress.

use crate::models::{FileStatus, TransferDirection, TransferState};
use crate::services::notification::BatchSummary;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

/// Change events emitted when transfer state is modified
///
/// Observers subscribe instead of polling. Events are sent from engine worker
/// tasks; an adapter is responsible for moving them onto its own execution
/// context.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    /// A pass over a batch has started; `total` is that pass's own size
    BatchStarted {
        direction: TransferDirection,
        total: usize,
    },

    /// Number of terminal entries (or the batch size) changed
    ProgressUpdated { completed: usize, total: usize },

    /// An entry moved to `RUN`
    EntryStarted { id: String, name: String },

    /// An entry reached a terminal status
    EntryFinished {
        id: String,
        name: String,
        status: FileStatus,
        message: String,
    },

    /// A running entry was asked to stop
    CancelRequested { id: String },

    /// A pass is over; counts are that pass's own outcomes
    BatchFinished {
        succeeded: usize,
        failed: usize,
        cancelled: usize,
    },

    /// State has been reset
    StateReset,
}

/// Thread-safe state manager with event emission
///
/// - Provides thread-safe access to [`TransferState`] via `Arc<RwLock<T>>`
/// - Detects state changes and emits [`StateChange`] events
/// - Supports subscribing to state changes via tokio broadcast channels
///
/// Nothing here is tied to a UI thread; the engine calls it from worker
/// tasks and any thread may take a [`snapshot`](Self::snapshot).
pub struct StateManager {
    state: Arc<RwLock<TransferState>>,

    /// Multiple subscribers can listen for state changes
    state_tx: broadcast::Sender<StateChange>,
}

impl StateManager {
    /// Create a new StateManager with a broadcast buffer of 100 events
    pub fn new() -> Self {
        let (state_tx, _) = broadcast::channel(100);
        Self {
            state: Arc::new(RwLock::new(TransferState::default())),
            state_tx,
        }
    }

    /// Clone of the current state, safe to keep without holding locks
    pub fn snapshot(&self) -> TransferState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Execute a function with read access to the state
    ///
    /// # Example
    /// ```ignore
    /// let running = state_manager.read(|state| state.is_running);
    /// ```
    pub fn read<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&TransferState) -> R,
    {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Update the state and emit change events
    ///
    /// Captures the old state, applies `update_fn`, then emits one event per
    /// detected change. Returns the emitted events.
    pub fn update<F>(&self, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut TransferState),
    {
        self.apply(None, update_fn)
    }

    /// Like [`update`](Self::update), with `leading` sent ahead of the
    /// detected changes while the write lock is still held
    fn apply<F>(&self, leading: Option<StateChange>, update_fn: F) -> Vec<StateChange>
    where
        F: FnOnce(&mut TransferState),
    {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let old_state = state.clone();

        update_fn(&mut state);

        let mut changes: Vec<StateChange> = leading.into_iter().collect();
        changes.extend(self.detect_changes(&old_state, &state));
        for change in &changes {
            // Ignore send errors - it's OK if no one is listening
            let _ = self.state_tx.send(change.clone());
        }

        changes
    }

    /// Subscribe to state change events
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.state_tx.subscribe()
    }

    fn detect_changes(&self, old: &TransferState, new: &TransferState) -> Vec<StateChange> {
        let mut changes = Vec::new();

        if old.completed != new.completed || old.total != new.total {
            changes.push(StateChange::ProgressUpdated {
                completed: new.completed,
                total: new.total,
            });
        }

        changes
    }

    /// Send an event that has no field-level counterpart in the state
    fn emit(&self, changes: &mut Vec<StateChange>, event: StateChange) {
        let _ = self.state_tx.send(event.clone());
        changes.push(event);
    }

    // Convenience methods used by the transfer engine

    /// Start tracking a pass of `total` entries.
    ///
    /// The first pass clears the previous results; a pass that starts while
    /// others are running adds its entries to theirs.
    pub fn begin_batch(&self, direction: TransferDirection, total: usize) -> Vec<StateChange> {
        let started = StateChange::BatchStarted { direction, total };
        self.apply(Some(started), |state| {
            if state.passes == 0 {
                state.reset();
            }
            state.passes += 1;
            state.direction = Some(direction);
            state.is_running = true;
            state.total += total;
        })
    }

    pub fn entry_started(&self, id: &str, name: &str) -> Vec<StateChange> {
        let mut changes = self.update(|state| {
            state.active.insert(id.to_string(), name.to_string());
        });
        self.emit(
            &mut changes,
            StateChange::EntryStarted {
                id: id.to_string(),
                name: name.to_string(),
            },
        );
        changes
    }

    /// Record a terminal outcome
    pub fn entry_finished(
        &self,
        id: &str,
        name: &str,
        status: FileStatus,
        message: &str,
    ) -> Vec<StateChange> {
        let mut changes = self.update(|state| {
            state.add_result(id.to_string(), status);
        });
        self.emit(
            &mut changes,
            StateChange::EntryFinished {
                id: id.to_string(),
                name: name.to_string(),
                status,
                message: message.to_string(),
            },
        );
        changes
    }

    pub fn cancel_requested(&self, id: &str) -> Vec<StateChange> {
        let mut changes = Vec::new();
        self.emit(&mut changes, StateChange::CancelRequested { id: id.to_string() });
        changes
    }

    /// Stop tracking one pass; the view stops running with the last one
    pub fn finish_batch(&self, summary: &BatchSummary) -> Vec<StateChange> {
        let finished = StateChange::BatchFinished {
            succeeded: summary.succeeded,
            failed: summary.failed,
            cancelled: summary.cancelled,
        };
        self.apply(Some(finished), |state| {
            state.passes = state.passes.saturating_sub(1);
            if state.passes == 0 {
                state.is_running = false;
                state.active.clear();
            }
        })
    }

    pub fn reset(&self) -> Vec<StateChange> {
        let mut changes = self.update(|state| state.reset());
        self.emit(&mut changes, StateChange::StateReset);
        changes
    }
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

// Make StateManager cloneable for sharing across worker tasks
impl Clone for StateManager {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            state_tx: self.state_tx.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_manager() {
        let manager = StateManager::new();
        let state = manager.snapshot();

        assert!(!state.is_running);
        assert_eq!(state.completed, 0);
        assert_eq!(state.total, 0);
    }

    #[test]
    fn test_begin_batch() {
        let manager = StateManager::new();

        let changes = manager.begin_batch(TransferDirection::Download, 3);

        assert_eq!(changes.len(), 2);
        assert_eq!(
            changes[0],
            StateChange::BatchStarted {
                direction: TransferDirection::Download,
                total: 3
            }
        );
        assert!(matches!(
            changes[1],
            StateChange::ProgressUpdated {
                completed: 0,
                total: 3
            }
        ));
    }

    #[test]
    fn test_entry_lifecycle_events() {
        let manager = StateManager::new();
        manager.begin_batch(TransferDirection::Upload, 1);

        let started = manager.entry_started("1", "a.txt");
        assert_eq!(started.len(), 1);
        assert_eq!(
            manager.snapshot().active.get("1").map(String::as_str),
            Some("a.txt")
        );

        let finished = manager.entry_finished("1", "a.txt", FileStatus::Done, "OK");
        assert!(matches!(
            finished[0],
            StateChange::ProgressUpdated {
                completed: 1,
                total: 1
            }
        ));
        assert!(matches!(
            finished[1],
            StateChange::EntryFinished {
                status: FileStatus::Done,
                ..
            }
        ));
        assert!(manager.snapshot().active.is_empty());
    }

    #[test]
    fn test_finish_batch_reports_counts() {
        let manager = StateManager::new();
        manager.begin_batch(TransferDirection::Upload, 3);
        manager.entry_finished("1", "a", FileStatus::Done, "OK");
        manager.entry_finished("2", "b", FileStatus::Failed, "refused");
        manager.entry_finished("3", "c", FileStatus::Cancel, "Cancelled");

        let changes = manager.finish_batch(&BatchSummary {
            succeeded: 1,
            failed: 1,
            cancelled: 1,
            total: 3,
        });

        assert_eq!(
            changes,
            vec![StateChange::BatchFinished {
                succeeded: 1,
                failed: 1,
                cancelled: 1
            }]
        );
        assert!(!manager.snapshot().is_running);
    }

    #[test]
    fn test_overlapping_passes_share_the_view() {
        let manager = StateManager::new();
        manager.begin_batch(TransferDirection::Upload, 2);
        manager.entry_finished("a1", "a1", FileStatus::Done, "OK");

        let joined = manager.begin_batch(TransferDirection::Download, 3);
        assert_eq!(
            joined,
            vec![
                StateChange::BatchStarted {
                    direction: TransferDirection::Download,
                    total: 3
                },
                StateChange::ProgressUpdated {
                    completed: 1,
                    total: 5
                },
            ]
        );

        manager.entry_finished("a2", "a2", FileStatus::Done, "OK");
        manager.finish_batch(&BatchSummary {
            succeeded: 2,
            total: 2,
            ..Default::default()
        });

        let state = manager.snapshot();
        assert!(state.is_running);
        assert_eq!(state.passes, 1);
        assert_eq!((state.completed, state.total), (2, 5));

        manager.finish_batch(&BatchSummary::default());
        assert!(!manager.snapshot().is_running);
    }

    #[test]
    fn test_reset() {
        let manager = StateManager::new();
        manager.begin_batch(TransferDirection::Upload, 2);
        manager.entry_finished("1", "a", FileStatus::Done, "OK");

        let changes = manager.reset();

        assert!(changes.iter().any(|c| matches!(c, StateChange::StateReset)));
        let state = manager.snapshot();
        assert!(!state.is_running);
        assert_eq!(state.completed, 0);
        assert!(state.succeeded.is_empty());
    }

    #[test]
    fn test_subscribe_to_changes() {
        let manager = StateManager::new();
        let mut rx = manager.subscribe();

        manager.cancel_requested("7");

        let event = rx.try_recv();
        assert_eq!(event.unwrap(), StateChange::CancelRequested { id: "7".to_string() });
    }

    #[test]
    fn test_multiple_subscribers() {
        let manager = StateManager::new();
        let mut rx1 = manager.subscribe();
        let mut rx2 = manager.subscribe();

        manager.begin_batch(TransferDirection::Upload, 1);

        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn test_read_with_closure() {
        let manager = StateManager::new();
        manager.update(|state| {
            state.total = 42;
        });

        assert_eq!(manager.read(|state| state.total), 42);
    }

    #[test]
    fn test_clone_state_manager() {
        let manager1 = StateManager::new();
        let manager2 = manager1.clone();

        manager1.update(|state| {
            state.completed = 10;
        });

        assert_eq!(manager2.snapshot().completed, 10);
    }
}
