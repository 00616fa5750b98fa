use super::entry::{FileStatus, TransferEntry};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Ordered set of entries acted on together by one user request
///
/// The batch carries a single "running" flag. Sub-batches created for a
/// retry share the parent's flag, so one family of entries never has two
/// execution passes at once. Membership changes are refused while a pass
/// is running.
#[derive(Debug)]
pub struct TransferBatch {
    entries: RwLock<Vec<Arc<TransferEntry>>>,
    running: Arc<AtomicBool>,
}

/// Marks a batch as running until dropped
#[derive(Debug)]
pub struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl TransferBatch {
    /// Build a batch; entries with an id already present are dropped
    pub fn new(entries: impl IntoIterator<Item = TransferEntry>) -> Self {
        Self::from_shared(entries.into_iter().map(Arc::new))
    }

    pub fn from_shared(entries: impl IntoIterator<Item = Arc<TransferEntry>>) -> Self {
        let batch = Self {
            entries: RwLock::new(Vec::new()),
            running: Arc::new(AtomicBool::new(false)),
        };
        for entry in entries {
            if batch.push_unchecked(entry.clone()).is_none() {
                tracing::warn!("Dropping duplicate entry id '{}'", entry.id());
            }
        }
        batch
    }

    /// Batch over `entries` that shares this batch's running flag
    pub(crate) fn sub_batch(&self, entries: Vec<Arc<TransferEntry>>) -> Self {
        Self {
            entries: RwLock::new(entries),
            running: Arc::clone(&self.running),
        }
    }

    /// Add an entry; `None` if the id is taken or a pass is running
    pub fn push(&self, entry: TransferEntry) -> Option<Arc<TransferEntry>> {
        if self.is_running() {
            return None;
        }
        self.push_unchecked(Arc::new(entry))
    }

    fn push_unchecked(&self, entry: Arc<TransferEntry>) -> Option<Arc<TransferEntry>> {
        let mut entries = self.write_entries();
        if entries.iter().any(|e| e.id() == entry.id()) {
            return None;
        }
        entries.push(Arc::clone(&entry));
        Some(entry)
    }

    /// Snapshot of the entries in batch order
    pub fn entries(&self) -> Vec<Arc<TransferEntry>> {
        self.read_entries().clone()
    }

    pub fn get(&self, id: &str) -> Option<Arc<TransferEntry>> {
        self.read_entries().iter().find(|e| e.id() == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_entries().is_empty()
    }

    /// Number of entries currently in `status`
    pub fn count(&self, status: FileStatus) -> usize {
        self.read_entries()
            .iter()
            .filter(|e| e.status() == status)
            .count()
    }

    /// Remove an entry and release its local resource.
    ///
    /// Refused (returns `None`) while a pass is running.
    pub fn remove(&self, id: &str) -> Option<Arc<TransferEntry>> {
        if self.is_running() {
            tracing::debug!("Not removing '{}' from a running batch", id);
            return None;
        }
        let mut entries = self.write_entries();
        let index = entries.iter().position(|e| e.id() == id)?;
        let entry = entries.remove(index);
        entry.discard();
        Some(entry)
    }

    /// Remove every entry, releasing their resources; 0 while running
    pub fn clear(&self) -> usize {
        if self.is_running() {
            return 0;
        }
        let drained: Vec<_> = self.write_entries().drain(..).collect();
        drained.iter().for_each(|e| {
            e.discard();
        });
        drained.len()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Claim the running flag without blocking
    pub fn try_claim(&self) -> Option<RunGuard> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard {
                flag: Arc::clone(&self.running),
            })
    }

    fn read_entries(&self) -> RwLockReadGuard<'_, Vec<Arc<TransferEntry>>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_entries(&self) -> RwLockWriteGuard<'_, Vec<Arc<TransferEntry>>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }
}
