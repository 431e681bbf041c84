//! Stream registry for one bridge socket.

use crate::error::BridgeError;
use adbr_protocol::Packet;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Maps the local ids we allocated to the packet channels of their
/// service tasks. Owned and mutated only by the socket's read loop.
pub struct ServiceMap {
    services: HashMap<u32, mpsc::Sender<Packet>>,
}

/// Outcome of forwarding a packet to a service.
#[derive(Debug, PartialEq, Eq)]
pub enum ForwardOutcome {
    Delivered,
    /// No service is registered under the id.
    Unknown,
    /// The service's task has already ended; the entry was dropped.
    Gone,
}

impl ServiceMap {
    pub fn new() -> Self {
        Self {
            services: HashMap::new(),
        }
    }

    /// Registers a service under its local id.
    pub fn insert(
        &mut self,
        local_id: u32,
        sender: mpsc::Sender<Packet>,
    ) -> Result<(), BridgeError> {
        if self.services.contains_key(&local_id) {
            return Err(BridgeError::ServiceExists(local_id));
        }
        self.services.insert(local_id, sender);
        Ok(())
    }

    /// Forwards a packet to the service owning `local_id`.
    pub async fn forward(&mut self, local_id: u32, packet: Packet) -> ForwardOutcome {
        match self.services.get(&local_id) {
            None => ForwardOutcome::Unknown,
            Some(sender) => {
                if sender.send(packet).await.is_err() {
                    self.services.remove(&local_id);
                    ForwardOutcome::Gone
                } else {
                    ForwardOutcome::Delivered
                }
            }
        }
    }

    pub fn remove(&mut self, local_id: u32) {
        self.services.remove(&local_id);
    }

    pub fn count(&self) -> usize {
        self.services.len()
    }

    /// Drops all channels; service tasks observe the close and shut their
    /// backing transports down.
    pub fn end(&mut self) {
        self.services.clear();
    }
}

impl Default for ServiceMap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use adbr_protocol::{Command, Packet};
    use bytes::Bytes;

    fn packet() -> Packet {
        Packet {
            command: Command::Okay as u32,
            arg0: 1,
            arg1: 2,
            data: Bytes::new(),
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_ids() {
        let mut map = ServiceMap::new();
        let (tx, _rx) = mpsc::channel(1);
        map.insert(7, tx.clone()).unwrap();
        assert!(matches!(
            map.insert(7, tx),
            Err(BridgeError::ServiceExists(7))
        ));
        assert_eq!(map.count(), 1);
    }

    #[tokio::test]
    async fn test_forward_to_unknown_id() {
        let mut map = ServiceMap::new();
        assert_eq!(map.forward(1, packet()).await, ForwardOutcome::Unknown);
    }

    #[tokio::test]
    async fn test_forward_delivers() {
        let mut map = ServiceMap::new();
        let (tx, mut rx) = mpsc::channel(1);
        map.insert(3, tx).unwrap();

        assert_eq!(map.forward(3, packet()).await, ForwardOutcome::Delivered);
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn test_forward_to_ended_service_drops_entry() {
        let mut map = ServiceMap::new();
        let (tx, rx) = mpsc::channel(1);
        map.insert(3, tx).unwrap();
        drop(rx);

        assert_eq!(map.forward(3, packet()).await, ForwardOutcome::Gone);
        assert_eq!(map.count(), 0);
    }
}
