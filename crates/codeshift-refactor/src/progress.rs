//! Change status events for progress reporting

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;
use crate::types::{ChangeId, ChangeStatus, FileChange};

/// One status transition of one change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Change that moved
    pub change_id: ChangeId,
    /// Status before
    pub from: ChangeStatus,
    /// Status after
    pub to: ChangeStatus,
}

/// Sending half of a progress channel
pub type ProgressSender = mpsc::UnboundedSender<ProgressEvent>;

/// Receiving half of a progress channel
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

/// Creates a progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Applies status transitions and reports them to an optional listener
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    sender: Option<ProgressSender>,
}

impl ProgressReporter {
    /// Reporter that sends every transition on `sender`
    pub fn new(sender: Option<ProgressSender>) -> Self {
        Self { sender }
    }

    /// Moves `change` to `to` and emits the event
    ///
    /// A dropped receiver is not an error.
    pub fn transition(&self, change: &mut FileChange, to: ChangeStatus) -> Result<()> {
        let from = change.transition(to)?;
        tracing::debug!(change_id = %change.id, from = ?from, to = ?to, "Change status changed");

        if let Some(sender) = &self.sender {
            let _ = sender.send(ProgressEvent {
                change_id: change.id.clone(),
                from,
                to,
            });
        }
        Ok(())
    }
}
