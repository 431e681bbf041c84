//! Progress reporting and cancellation for SYNC transfers.

use crate::error::ClientError;
use tokio::sync::{mpsc, watch};

/// Events emitted while a transfer runs.
///
/// `bytes_transferred` counts application-visible payload bytes moved in the
/// transfer's direction; framing bytes are not included. An `Error` is
/// always followed by `End`.
#[derive(Debug)]
pub enum TransferEvent {
    Progress { bytes_transferred: u64 },
    Cancelled,
    Error(ClientError),
    End { bytes_transferred: u64 },
}

/// Handle to a running push or pull.
pub struct Transfer {
    events: mpsc::UnboundedReceiver<TransferEvent>,
    cancel: watch::Sender<bool>,
}

impl Transfer {
    pub(crate) fn new(
        events: mpsc::UnboundedReceiver<TransferEvent>,
        cancel: watch::Sender<bool>,
    ) -> Self {
        Self { events, cancel }
    }

    /// Receives the next event. `None` after `End` has been delivered.
    pub async fn next_event(&mut self) -> Option<TransferEvent> {
        self.events.recv().await
    }

    /// Requests cancellation. Best-effort: the underlying stream is closed
    /// at the next I/O point. Idempotent.
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Drains the transfer to completion, returning the total payload bytes
    /// moved on success.
    pub async fn wait(mut self) -> Result<u64, ClientError> {
        let mut failure = None;
        let mut total = 0;
        while let Some(event) = self.events.recv().await {
            match event {
                TransferEvent::Progress { bytes_transferred } => total = bytes_transferred,
                TransferEvent::Error(err) => failure = Some(err),
                TransferEvent::Cancelled => {
                    failure = Some(ClientError::Fail {
                        message: "transfer cancelled".to_string(),
                    });
                }
                TransferEvent::End { bytes_transferred } => {
                    total = bytes_transferred;
                    break;
                }
            }
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(total),
        }
    }
}

pub(crate) struct TransferReporter {
    events: mpsc::UnboundedSender<TransferEvent>,
    bytes: u64,
}

impl TransferReporter {
    pub(crate) fn channel() -> (Self, mpsc::UnboundedReceiver<TransferEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { events: tx, bytes: 0 }, rx)
    }

    pub(crate) fn progress(&mut self, bytes: u64) {
        self.bytes += bytes;
        let _ = self.events.send(TransferEvent::Progress {
            bytes_transferred: self.bytes,
        });
    }

    pub(crate) fn finish(self, result: Result<(), ClientError>, cancelled: bool) {
        if cancelled {
            let _ = self.events.send(TransferEvent::Cancelled);
        } else if let Err(err) = result {
            let _ = self.events.send(TransferEvent::Error(err));
        }
        let _ = self.events.send(TransferEvent::End {
            bytes_transferred: self.bytes,
        });
    }
}
