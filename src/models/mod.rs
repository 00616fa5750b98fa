//! Data models for transfers.
//!
//! - [`TransferEntry`]: one file with its own lock-protected state machine
//! - [`TransferBatch`]: ordered entries sharing a single "running" flag
//! - [`TransferState`]: progress view published through [`StateManager`](crate::state::StateManager)
//! - [`TransferDirection`]: which way the bytes flow

pub mod batch;
pub mod entry;
pub mod transfer_state;

pub use batch::{RunGuard, TransferBatch};
pub use entry::{CancelOutcome, FileStatus, LocalResource, TransferEntry, TransferResult};
pub use transfer_state::TransferState;

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferDirection {
    Upload,
    Download,
}

impl TransferDirection {
    /// "Upload" / "Download"
    pub fn noun(self) -> &'static str {
        match self {
            Self::Upload => "Upload",
            Self::Download => "Download",
        }
    }

    pub fn plural(self) -> &'static str {
        match self {
            Self::Upload => "Uploads",
            Self::Download => "Downloads",
        }
    }
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Upload => "upload",
            Self::Download => "download",
        })
    }
}
