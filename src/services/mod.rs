//! Services module - transfer execution, notifications and settings snapshots.
//!
//! The services have no UI dependencies. Everything they report flows through
//! plain traits ([`TransferChannel`], [`NotificationSink`], [`PreviewProvider`])
//! and the [`StateManager`](crate::state::StateManager) broadcast channel, so a
//! presentation layer can be attached without touching them.
//!
//! # Components
//!
//! - [`TransferJobEngine`]: runs a [`TransferBatch`](crate::models::TransferBatch)
//!   through a [`TransferChannel`] with bounded concurrency and cooperative
//!   cancellation
//! - [`NotificationPolicy`]: per-item, batched or silent user notifications
//! - [`SettingsArchiver`]: zip backup and restore of the app config and the
//!   device and plugin registries
//!
//! # Usage Example
//!
//! ```ignore
//! use dcnnt::services::{EngineOptions, NotificationPolicy, TransferJobEngine};
//!
//! let engine =
//!     TransferJobEngine::new(channel, NotificationPolicy::silent(), EngineOptions::default());
//! let outcome = engine.run(&batch, TransferDirection::Download).await?;
//! if outcome.summary().failed > 0 {
//!     let retry = engine.retry_failed(&batch);
//!     engine.run(&retry, TransferDirection::Download).await?;
//! }
//! ```

pub mod archive;
pub mod notification;
pub mod transfer;

pub use archive::{
    ArchiveError, ArchiveLayout, DumpReport, MARKER_ENTRY, RestoreReport, SettingsArchiver,
};
pub use notification::{
    ActionKind, BatchNotifier, BatchSummary, CompletionAction, Notification, NotificationPolicy,
    NotificationSink, NotifyMode, PREVIEW_SIZE_LIMIT, Preview, PreviewProvider,
};
pub use transfer::{
    BatchOutcome, EngineError, EngineOptions, EntryOutcome, TransferChannel, TransferJobEngine,
};
