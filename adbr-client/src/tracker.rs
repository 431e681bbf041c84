//! Device list tracking over `host:track-devices`.
//!
//! The ADB server re-sends the full device list whenever anything changes;
//! the tracker diffs consecutive snapshots keyed by serial and emits
//! add/remove/change events plus a summary per snapshot.

use crate::connection::Connection;
use crate::error::ClientError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::{mpsc, watch};

/// Connection state of a device as reported by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    Device,
    Offline,
    Unauthorized,
    Bootloader,
    Recovery,
    Sideload,
    NoPermissions,
    Other(String),
}

impl DeviceState {
    pub fn parse(s: &str) -> Self {
        match s {
            "device" => DeviceState::Device,
            "offline" => DeviceState::Offline,
            "unauthorized" => DeviceState::Unauthorized,
            "bootloader" => DeviceState::Bootloader,
            "recovery" => DeviceState::Recovery,
            "sideload" => DeviceState::Sideload,
            "no permissions" => DeviceState::NoPermissions,
            other => DeviceState::Other(other.to_string()),
        }
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceState::Device => write!(f, "device"),
            DeviceState::Offline => write!(f, "offline"),
            DeviceState::Unauthorized => write!(f, "unauthorized"),
            DeviceState::Bootloader => write!(f, "bootloader"),
            DeviceState::Recovery => write!(f, "recovery"),
            DeviceState::Sideload => write!(f, "sideload"),
            DeviceState::NoPermissions => write!(f, "no permissions"),
            DeviceState::Other(s) => write!(f, "{s}"),
        }
    }
}

/// One entry of the server's device list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub serial: String,
    pub state: DeviceState,
    /// Device path, present only in `host:devices-l` listings.
    pub path: Option<String>,
}

impl Device {
    pub fn is_online(&self) -> bool {
        self.state == DeviceState::Device
    }
}

/// Parses a `host:devices` value: lines of `serial \t state`.
pub fn parse_device_list(value: &str) -> Result<Vec<Device>, ClientError> {
    let mut devices = Vec::new();
    for line in value.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (serial, state) = line
            .split_once('\t')
            .ok_or_else(|| ClientError::unexpected(line, "serial \\t state"))?;
        devices.push(Device {
            serial: serial.to_string(),
            state: DeviceState::parse(state.trim()),
            path: None,
        });
    }
    Ok(devices)
}

/// Parses a `host:devices-l` value: 3+ whitespace-separated fields per line.
pub fn parse_device_list_with_paths(value: &str) -> Result<Vec<Device>, ClientError> {
    let mut devices = Vec::new();
    for line in value.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            return Err(ClientError::unexpected(line, "serial state path"));
        }
        devices.push(Device {
            serial: fields[0].to_string(),
            state: DeviceState::parse(fields[1]),
            path: Some(fields[2].to_string()),
        });
    }
    Ok(devices)
}

/// Summary of one snapshot transition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub added: Vec<Device>,
    pub removed: Vec<Device>,
    pub changed: Vec<Device>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }
}

/// Diffs two device snapshots keyed by serial.
///
/// `added = new \ old`, `removed = old \ new`, `changed` holds serials
/// present in both whose state differs.
pub fn diff_snapshots(old: &[Device], new: &[Device]) -> ChangeSet {
    let old_by_serial: HashMap<&str, &Device> =
        old.iter().map(|d| (d.serial.as_str(), d)).collect();
    let new_serials: HashMap<&str, ()> = new.iter().map(|d| (d.serial.as_str(), ())).collect();

    let mut changes = ChangeSet::default();
    for device in new {
        match old_by_serial.get(device.serial.as_str()) {
            None => changes.added.push(device.clone()),
            Some(previous) if previous.state != device.state => {
                changes.changed.push(device.clone())
            }
            Some(_) => {}
        }
    }
    for device in old {
        if !new_serials.contains_key(device.serial.as_str()) {
            changes.removed.push(device.clone());
        }
    }
    changes
}

/// Events emitted by a [`DeviceTracker`].
#[derive(Debug)]
pub enum TrackerEvent {
    Add(Device),
    Remove(Device),
    Change(Device),
    ChangeSet(ChangeSet),
    Error(ClientError),
    End,
}

/// Handle to a running `host:track-devices` reader.
pub struct DeviceTracker {
    events: mpsc::UnboundedReceiver<TrackerEvent>,
    stop: watch::Sender<bool>,
}

impl DeviceTracker {
    pub(crate) fn spawn(conn: Connection) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(track_loop(conn, tx, stop_rx));
        Self {
            events: rx,
            stop: stop_tx,
        }
    }

    /// Receives the next event. `None` after `End` has been delivered.
    pub async fn next_event(&mut self) -> Option<TrackerEvent> {
        self.events.recv().await
    }

    /// Stops tracking and closes the underlying connection. Idempotent.
    pub fn end(&self) {
        let _ = self.stop.send(true);
    }
}

async fn track_loop(
    mut conn: Connection,
    events: mpsc::UnboundedSender<TrackerEvent>,
    mut stop: watch::Receiver<bool>,
) {
    let mut snapshot: Vec<Device> = Vec::new();
    loop {
        let value = tokio::select! {
            value = conn.parser().read_value() => value,
            _ = stop.wait_for(|&s| s) => break,
        };
        let devices = match value
            .and_then(|v| parse_device_list(&String::from_utf8_lossy(&v)))
        {
            Ok(devices) => devices,
            Err(err) => {
                let _ = events.send(TrackerEvent::Error(err));
                break;
            }
        };

        let changes = diff_snapshots(&snapshot, &devices);
        snapshot = devices;
        for device in &changes.added {
            let _ = events.send(TrackerEvent::Add(device.clone()));
        }
        for device in &changes.removed {
            let _ = events.send(TrackerEvent::Remove(device.clone()));
        }
        for device in &changes.changed {
            let _ = events.send(TrackerEvent::Change(device.clone()));
        }
        if !changes.is_empty() {
            let _ = events.send(TrackerEvent::ChangeSet(changes));
        }
    }
    conn.close().await;
    let _ = events.send(TrackerEvent::End);
}
