use crate::models::{FileStatus, TransferDirection, TransferEntry};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Previews are only requested for files up to this size (10 MiB)
pub const PREVIEW_SIZE_LIMIT: u64 = 10 * 1024 * 1024;

/// How a transfer direction reports to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifyMode {
    /// Stay silent
    None,
    /// One notification per finished entry
    PerItem,
    /// One summary after the whole batch
    #[default]
    Batched,
}

impl NotifyMode {
    /// Map a stored option key (`no`, `one`, `all`) to a mode
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "no" => Some(Self::None),
            "one" => Some(Self::Batched),
            "all" => Some(Self::PerItem),
            _ => None,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::None => "no",
            Self::Batched => "one",
            Self::PerItem => "all",
        }
    }
}

/// Thumbnail bytes handed to the presentation layer as-is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub media_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Open,
    Share,
}

/// What tapping a completion notification should do
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionAction {
    pub kind: ActionKind,
    /// Local path of the file, or the entry name when it has none
    pub target: String,
}

/// Counts carried by a batched summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total: usize,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} succeeded, {} failed, {} cancelled",
            self.succeeded, self.total, self.failed, self.cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub preview: Option<Preview>,
    pub action: Option<CompletionAction>,
    pub summary: Option<BatchSummary>,
}

/// Presents notifications to the user
#[cfg_attr(test, mockall::automock)]
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Optional thumbnail source for finished files
#[cfg_attr(test, mockall::automock)]
pub trait PreviewProvider: Send + Sync {
    fn preview(&self, entry: &TransferEntry) -> Option<Preview>;
}

/// Decides whether and what to notify for each direction
#[derive(Clone)]
pub struct NotificationPolicy {
    upload: NotifyMode,
    download: NotifyMode,
    sink: Option<Arc<dyn NotificationSink>>,
    previews: Option<Arc<dyn PreviewProvider>>,
}

impl NotificationPolicy {
    /// Policy delivering to `sink`, batched in both directions
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            upload: NotifyMode::default(),
            download: NotifyMode::default(),
            sink: Some(sink),
            previews: None,
        }
    }

    /// Policy that never emits anything
    pub fn silent() -> Self {
        Self {
            upload: NotifyMode::None,
            download: NotifyMode::None,
            sink: None,
            previews: None,
        }
    }

    pub fn with_modes(mut self, upload: NotifyMode, download: NotifyMode) -> Self {
        self.upload = upload;
        self.download = download;
        self
    }

    pub fn with_preview_provider(mut self, provider: Arc<dyn PreviewProvider>) -> Self {
        self.previews = Some(provider);
        self
    }

    pub fn mode(&self, direction: TransferDirection) -> NotifyMode {
        if self.sink.is_none() {
            return NotifyMode::None;
        }
        match direction {
            TransferDirection::Upload => self.upload,
            TransferDirection::Download => self.download,
        }
    }

    /// Start tracking a pass of `total` entries
    pub fn begin_batch(&self, direction: TransferDirection, total: usize) -> BatchNotifier {
        BatchNotifier {
            mode: self.mode(direction),
            direction,
            sink: self.sink.clone(),
            previews: self.previews.clone(),
            tracker: Mutex::new(BatchSummary {
                total,
                ..Default::default()
            }),
        }
    }
}

impl fmt::Debug for NotificationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationPolicy")
            .field("upload", &self.upload)
            .field("download", &self.download)
            .field("has_sink", &self.sink.is_some())
            .field("has_previews", &self.previews.is_some())
            .finish()
    }
}

/// Per-pass notification state
///
/// Fed with every terminal transition of one pass; entries may finish in any
/// order when transfers run in parallel, but the sink always sees the
/// `current/total` counter increase one step at a time. Sinks must not call
/// back into the notifier.
pub struct BatchNotifier {
    mode: NotifyMode,
    direction: TransferDirection,
    sink: Option<Arc<dyn NotificationSink>>,
    previews: Option<Arc<dyn PreviewProvider>>,
    tracker: Mutex<BatchSummary>,
}

impl BatchNotifier {
    /// Account for one entry reaching `status`; WAIT and RUN are ignored
    pub fn record(&self, entry: &TransferEntry, status: FileStatus) {
        if !status.is_terminal() {
            return;
        }

        let mut tracker = self.tracker.lock().unwrap_or_else(PoisonError::into_inner);
        match status {
            FileStatus::Done => tracker.succeeded += 1,
            FileStatus::Failed => tracker.failed += 1,
            _ => tracker.cancelled += 1,
        }
        let current = tracker.succeeded + tracker.failed + tracker.cancelled;

        let Some(sink) = &self.sink else {
            return;
        };
        // Delivered under the tracker lock so counters reach the sink in order
        match self.mode {
            NotifyMode::None => {}
            NotifyMode::PerItem => {
                sink.notify(self.item_notification(entry, status, current, tracker.total))
            }
            NotifyMode::Batched => {
                if current == tracker.total {
                    sink.notify(self.summary_notification(*tracker));
                }
            }
        }
    }

    /// Counts so far
    pub fn summary(&self) -> BatchSummary {
        *self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn item_notification(
        &self,
        entry: &TransferEntry,
        status: FileStatus,
        current: usize,
        total: usize,
    ) -> Notification {
        let noun = self.direction.noun();
        let progress = format!("{}/{} - {}", current, total, entry.name());
        let mut notification = Notification {
            title: String::new(),
            body: progress,
            preview: None,
            action: None,
            summary: None,
        };

        match status {
            FileStatus::Done => {
                notification.title = format!("{} complete", noun);
                notification.action = Some(CompletionAction {
                    kind: ActionKind::Open,
                    target: entry
                        .resource_location()
                        .map(|p| p.to_string())
                        .unwrap_or_else(|| entry.name().to_string()),
                });
                if entry.size() <= PREVIEW_SIZE_LIMIT {
                    notification.preview = self.previews.as_ref().and_then(|p| p.preview(entry));
                }
            }
            FileStatus::Failed => {
                notification.title = format!("{} failed", noun);
                if let Some(message) = entry.message() {
                    notification.body = format!("{} : {}", notification.body, message);
                }
            }
            _ => notification.title = format!("{} cancelled", noun),
        }

        notification
    }

    fn summary_notification(&self, summary: BatchSummary) -> Notification {
        Notification {
            title: format!("{} finished", self.direction.plural()),
            body: summary.to_string(),
            preview: None,
            action: None,
            summary: Some(summary),
        }
    }
}
