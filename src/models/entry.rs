use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lifecycle state of a single transfer entry
///
/// Valid transitions:
/// - `Wait → Run → {Done, Failed, Cancel}`
/// - `Wait → Cancel`
///
/// Terminal states never change again, except that a retry starts a new
/// attempt by moving `Failed → Wait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileStatus {
    Wait,
    Run,
    Done,
    Cancel,
    Failed,
}

impl FileStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancel | Self::Failed)
    }

    /// Position along the lifecycle; never decreases within one attempt
    pub fn rank(self) -> u8 {
        match self {
            Self::Wait => 0,
            Self::Run => 1,
            Self::Done | Self::Cancel | Self::Failed => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wait => "WAIT",
            Self::Run => "RUN",
            Self::Done => "DONE",
            Self::Cancel => "CANCEL",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a cancellation request did to an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The entry had not started and is now `Cancel`
    Cancelled,
    /// The entry is running; it stops at its next checkpoint
    Requested,
    /// The entry was already terminal
    Ignored,
}

/// Result reported by a transfer channel for one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferResult {
    pub success: bool,
    pub message: String,
}

impl TransferResult {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Handle to the local file behind an entry
///
/// Owned by exactly one entry and released when the entry discards it or is
/// dropped.
#[derive(Debug)]
pub struct LocalResource {
    location: Utf8PathBuf,
}

impl LocalResource {
    pub fn new<P: AsRef<Utf8Path>>(location: P) -> Self {
        Self {
            location: location.as_ref().to_path_buf(),
        }
    }

    pub fn location(&self) -> &Utf8Path {
        &self.location
    }
}

impl Drop for LocalResource {
    fn drop(&mut self) {
        tracing::trace!("Released local resource {}", self.location);
    }
}

#[derive(Debug)]
struct EntryState {
    status: FileStatus,
    cancel_requested: bool,
    message: Option<String>,
    attempt: u32,
}

/// One file offered for upload or download
///
/// Status and the pending-cancellation flag sit behind a lock owned by this
/// entry alone, so inspecting or cancelling one entry never waits on another.
/// No lock is held while the transfer itself runs.
#[derive(Debug)]
pub struct TransferEntry {
    id: String,
    name: String,
    size: u64,
    resource: Mutex<Option<LocalResource>>,
    state: Mutex<EntryState>,
}

impl TransferEntry {
    pub fn new(id: impl Into<String>, name: impl Into<String>, size: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size,
            resource: Mutex::new(None),
            state: Mutex::new(EntryState {
                status: FileStatus::Wait,
                cancel_requested: false,
                message: None,
                attempt: 1,
            }),
        }
    }

    /// Attach the local file this entry reads from or writes to
    pub fn with_resource(self, resource: LocalResource) -> Self {
        *self.lock_resource() = Some(resource);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn status(&self) -> FileStatus {
        self.lock_state().status
    }

    /// Message of the last finished attempt, if any
    pub fn message(&self) -> Option<String> {
        self.lock_state().message.clone()
    }

    /// Attempt number, starting at 1 and bumped by every retry
    pub fn attempt(&self) -> u32 {
        self.lock_state().attempt
    }

    /// Checkpoint for channels: true once the user asked this entry to stop
    pub fn is_cancel_requested(&self) -> bool {
        let state = self.lock_state();
        state.cancel_requested || state.status == FileStatus::Cancel
    }

    pub fn resource_location(&self) -> Option<Utf8PathBuf> {
        self.lock_resource()
            .as_ref()
            .map(|r| r.location().to_path_buf())
    }

    /// Release the local resource now; returns false if it was already released
    pub fn discard(&self) -> bool {
        self.lock_resource().take().is_some()
    }

    /// Move `Wait → Run`. Any other current status is returned as the error.
    pub fn begin(&self) -> Result<(), FileStatus> {
        let mut state = self.lock_state();
        if state.status != FileStatus::Wait {
            return Err(state.status);
        }
        state.status = FileStatus::Run;
        Ok(())
    }

    /// Apply the terminal transition for a running entry.
    ///
    /// A cancellation requested while the transfer was in flight wins over the
    /// channel's own verdict. Calling this on an entry that is not running
    /// changes nothing and returns its current status.
    pub fn finish(&self, result: &TransferResult) -> FileStatus {
        let mut state = self.lock_state();
        if state.status != FileStatus::Run {
            return state.status;
        }
        if state.cancel_requested {
            state.status = FileStatus::Cancel;
            state.message = Some("Cancelled".to_string());
            return state.status;
        }
        state.status = if result.success {
            FileStatus::Done
        } else {
            FileStatus::Failed
        };
        state.message = Some(result.message.clone());
        state.status
    }

    /// Cancel a waiting entry or flag a running one for cooperative stop
    pub fn cancel(&self) -> CancelOutcome {
        let mut state = self.lock_state();
        match state.status {
            FileStatus::Wait => {
                state.status = FileStatus::Cancel;
                state.message = Some("Cancelled".to_string());
                CancelOutcome::Cancelled
            }
            FileStatus::Run => {
                state.cancel_requested = true;
                CancelOutcome::Requested
            }
            _ => CancelOutcome::Ignored,
        }
    }

    /// Start a new attempt for a failed entry (`Failed → Wait`)
    pub fn reset_for_retry(&self) -> bool {
        let mut state = self.lock_state();
        if state.status != FileStatus::Failed {
            return false;
        }
        state.status = FileStatus::Wait;
        state.cancel_requested = false;
        state.message = None;
        state.attempt += 1;
        true
    }

    fn lock_state(&self) -> MutexGuard<'_, EntryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_resource(&self) -> MutexGuard<'_, Option<LocalResource>> {
        self.resource.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
