use super::{FileStatus, TransferDirection};
use indexmap::IndexMap;
use std::collections::HashSet;

/// Progress view of the transfer passes currently (or most recently) running.
///
/// This is what observers read instead of touching entries directly. Passes
/// that overlap on one engine share the view: their totals add up and it
/// stays running until the last of them ends.
///
/// # Thread Safety
///
/// `TransferState` is wrapped in `Arc<RwLock<TransferState>>` by
/// [`crate::state::StateManager`]. Engine workers never hold that lock while a
/// transfer is in flight, and observers only ever see clones:
/// - [`read()`](crate::state::StateManager::read) for read-only access
/// - [`update()`](crate::state::StateManager::update) for mutations with change events
#[derive(Clone, Debug, Default)]
pub struct TransferState {
    /// Direction of the most recently started pass
    pub direction: Option<TransferDirection>,
    pub is_running: bool,
    /// Passes started and not yet finished
    pub passes: usize,

    // Progress
    pub completed: usize,
    pub total: usize,
    /// Entries currently in `RUN`, id to display name, in start order
    pub active: IndexMap<String, String>,

    // Results, keyed by entry id
    pub succeeded: HashSet<String>,
    pub failed: HashSet<String>,
    pub cancelled: HashSet<String>,
}

impl TransferState {
    /// Returns (succeeded, failed, cancelled, total)
    pub fn stats(&self) -> (usize, usize, usize, usize) {
        (
            self.succeeded.len(),
            self.failed.len(),
            self.cancelled.len(),
            self.total,
        )
    }

    /// Record a terminal outcome; non-terminal statuses are ignored
    pub fn add_result(&mut self, id: String, status: FileStatus) {
        if !status.is_terminal() {
            return;
        }
        self.active.shift_remove(&id);
        let recorded = match status {
            FileStatus::Done => self.succeeded.insert(id),
            FileStatus::Failed => self.failed.insert(id),
            _ => self.cancelled.insert(id),
        };
        if recorded {
            self.completed += 1;
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.completed >= self.total
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_result() {
        let mut state = TransferState {
            total: 3,
            active: IndexMap::from([("1".to_string(), "a.txt".to_string())]),
            ..Default::default()
        };
        state.add_result("1".to_string(), FileStatus::Done);
        state.add_result("2".to_string(), FileStatus::Failed);
        state.add_result("3".to_string(), FileStatus::Cancel);

        assert_eq!(state.stats(), (1, 1, 1, 3));
        assert_eq!(state.completed, 3);
        assert!(state.active.is_empty());
        assert!(state.is_complete());
    }

    #[test]
    fn test_same_name_different_ids() {
        let mut state = TransferState {
            total: 2,
            active: IndexMap::from([
                ("1".to_string(), "photo.jpg".to_string()),
                ("2".to_string(), "photo.jpg".to_string()),
            ]),
            ..Default::default()
        };

        state.add_result("2".to_string(), FileStatus::Done);

        assert_eq!(state.active.len(), 1);
        assert!(state.active.contains_key("1"));
    }

    #[test]
    fn test_non_terminal_ignored() {
        let mut state = TransferState::default();
        state.add_result("1".to_string(), FileStatus::Run);
        assert_eq!(state.completed, 0);
    }

    #[test]
    fn test_duplicate_result_counted_once() {
        let mut state = TransferState::default();
        state.add_result("1".to_string(), FileStatus::Done);
        state.add_result("1".to_string(), FileStatus::Done);
        assert_eq!(state.completed, 1);
    }

    #[test]
    fn test_reset() {
        let mut state = TransferState {
            is_running: true,
            total: 2,
            direction: Some(TransferDirection::Upload),
            ..Default::default()
        };
        state.add_result("1".to_string(), FileStatus::Done);
        state.reset();
        assert!(!state.is_running);
        assert!(state.direction.is_none());
        assert_eq!(state.stats(), (0, 0, 0, 0));
    }
}
