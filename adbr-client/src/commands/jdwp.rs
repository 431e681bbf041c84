//! JDWP process tracking over the `track-jdwp` device service.
//!
//! The device re-sends the full list of debuggable pids whenever it
//! changes; the tracker diffs consecutive lists.

use crate::connection::Connection;
use crate::error::ClientError;
use std::collections::HashSet;
use tokio::sync::{mpsc, watch};

/// Events emitted by a [`JdwpTracker`].
#[derive(Debug)]
pub enum JdwpEvent {
    Add(u32),
    Remove(u32),
    ChangeSet { added: Vec<u32>, removed: Vec<u32> },
    Error(ClientError),
    End,
}

/// Handle to a running `track-jdwp` reader.
pub struct JdwpTracker {
    events: mpsc::UnboundedReceiver<JdwpEvent>,
    stop: watch::Sender<bool>,
}

impl JdwpTracker {
    /// Starts tracking on a transport-bound connection.
    pub(crate) async fn start(mut conn: Connection) -> Result<Self, ClientError> {
        conn.request("track-jdwp").await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(track_loop(conn, tx, stop_rx));
        Ok(Self {
            events: rx,
            stop: stop_tx,
        })
    }

    pub async fn next_event(&mut self) -> Option<JdwpEvent> {
        self.events.recv().await
    }

    /// Stops tracking and closes the connection. Idempotent.
    pub fn end(&self) {
        let _ = self.stop.send(true);
    }
}

fn parse_pids(value: &str) -> Vec<u32> {
    value
        .split_whitespace()
        .filter_map(|pid| pid.parse().ok())
        .collect()
}

async fn track_loop(
    mut conn: Connection,
    events: mpsc::UnboundedSender<JdwpEvent>,
    mut stop: watch::Receiver<bool>,
) {
    let mut pids: HashSet<u32> = HashSet::new();
    loop {
        let value = tokio::select! {
            value = conn.parser().read_value() => value,
            _ = stop.wait_for(|&s| s) => break,
        };
        let next = match value {
            Ok(value) => parse_pids(&String::from_utf8_lossy(&value)),
            Err(err) => {
                let _ = events.send(JdwpEvent::Error(err));
                break;
            }
        };

        let next_set: HashSet<u32> = next.iter().copied().collect();
        let added: Vec<u32> = next.iter().copied().filter(|p| !pids.contains(p)).collect();
        let removed: Vec<u32> = pids.iter().copied().filter(|p| !next_set.contains(p)).collect();

        for &pid in &added {
            let _ = events.send(JdwpEvent::Add(pid));
        }
        for &pid in &removed {
            let _ = events.send(JdwpEvent::Remove(pid));
        }
        if !added.is_empty() || !removed.is_empty() {
            let _ = events.send(JdwpEvent::ChangeSet { added, removed });
        }
        pids = next_set;
    }
    conn.close().await;
    let _ = events.send(JdwpEvent::End);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pids() {
        assert_eq!(parse_pids("123\n456\n"), vec![123, 456]);
        assert_eq!(parse_pids(""), Vec::<u32>::new());
        assert_eq!(parse_pids("12\nnot-a-pid\n34"), vec![12, 34]);
    }
}
