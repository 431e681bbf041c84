//! CPU load sampling from the device's `/proc/stat`.
//!
//! Snapshots are taken by running `cat /proc/stat` over a shell service at
//! a fixed interval; per-cpu percentage loads are derived from consecutive
//! samples. Rows whose tick counters do not advance (seen on some kernels
//! for offlined cores) are ignored from then on.

use crate::client::DeviceClient;
use crate::error::ClientError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Raw tick counters of one `cpu*` row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CpuStats {
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
    pub guest: u64,
    pub guest_nice: u64,
    pub total: u64,
    raw: String,
}

/// Percentage load of one cpu between two samples.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuLoad {
    pub user: u8,
    pub nice: u8,
    pub system: u8,
    pub idle: u8,
    pub iowait: u8,
    pub irq: u8,
    pub softirq: u8,
    pub steal: u8,
    pub guest: u8,
    pub guest_nice: u8,
}

/// Parses the `cpu*` rows of a `/proc/stat` dump.
pub fn parse_proc_stat(text: &str) -> HashMap<String, CpuStats> {
    let mut stats = HashMap::new();
    for line in text.lines() {
        if !line.starts_with("cpu") {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 11 {
            continue;
        }
        let mut values = [0u64; 10];
        let mut valid = true;
        for (slot, field) in values.iter_mut().zip(&fields[1..11]) {
            match field.parse() {
                Ok(v) => *slot = v,
                Err(_) => {
                    valid = false;
                    break;
                }
            }
        }
        if !valid {
            continue;
        }
        stats.insert(
            fields[0].to_string(),
            CpuStats {
                user: values[0],
                nice: values[1],
                system: values[2],
                idle: values[3],
                iowait: values[4],
                irq: values[5],
                softirq: values[6],
                steal: values[7],
                guest: values[8],
                guest_nice: values[9],
                total: values.iter().sum(),
                raw: line.to_string(),
            },
        );
    }
    stats
}

/// Derives percentage loads from two consecutive samples.
///
/// Cpus whose total did not advance are added to `ignore` and dropped from
/// `next` so they stop producing all-zero rows.
pub fn compute_loads(
    previous: &HashMap<String, CpuStats>,
    next: &mut HashMap<String, CpuStats>,
    ignore: &mut HashMap<String, String>,
) -> HashMap<String, CpuLoad> {
    let mut loads = HashMap::new();
    let mut stuck = Vec::new();

    for (id, current) in next.iter() {
        if ignore.get(id) == Some(&current.raw) {
            stuck.push(id.clone());
            continue;
        }
        let Some(old) = previous.get(id) else {
            continue;
        };
        let ticks = current.total.saturating_sub(old.total);
        if ticks == 0 {
            ignore.insert(id.clone(), current.raw.clone());
            stuck.push(id.clone());
            continue;
        }
        let pct = |new: u64, old: u64| ((new - old) * 100 / ticks) as u8;
        loads.insert(
            id.clone(),
            CpuLoad {
                user: pct(current.user, old.user),
                nice: pct(current.nice, old.nice),
                system: pct(current.system, old.system),
                idle: pct(current.idle, old.idle),
                iowait: pct(current.iowait, old.iowait),
                irq: pct(current.irq, old.irq),
                softirq: pct(current.softirq, old.softirq),
                steal: pct(current.steal, old.steal),
                guest: pct(current.guest, old.guest),
                guest_nice: pct(current.guest_nice, old.guest_nice),
            },
        );
    }
    for id in stuck {
        next.remove(&id);
    }
    loads
}

/// Events emitted by a [`ProcStatTracker`].
#[derive(Debug)]
pub enum ProcStatEvent {
    Load(HashMap<String, CpuLoad>),
    Error(ClientError),
    End,
}

/// Handle to a running load sampler.
pub struct ProcStatTracker {
    events: mpsc::UnboundedReceiver<ProcStatEvent>,
    stop: watch::Sender<bool>,
}

impl ProcStatTracker {
    pub(crate) fn spawn(device: DeviceClient, interval: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = watch::channel(false);
        tokio::spawn(sample_loop(device, interval, tx, stop_rx));
        Self {
            events: rx,
            stop: stop_tx,
        }
    }

    pub async fn next_event(&mut self) -> Option<ProcStatEvent> {
        self.events.recv().await
    }

    /// Stops sampling. Idempotent.
    pub fn end(&self) {
        let _ = self.stop.send(true);
    }
}

async fn sample_loop(
    device: DeviceClient,
    interval: Duration,
    events: mpsc::UnboundedSender<ProcStatEvent>,
    mut stop: watch::Receiver<bool>,
) {
    let mut previous: HashMap<String, CpuStats> = HashMap::new();
    let mut ignore: HashMap<String, String> = HashMap::new();
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = stop.wait_for(|&s| s) => break,
        }
        match device.shell_output("cat /proc/stat").await {
            Ok(output) => {
                let mut sample = parse_proc_stat(&String::from_utf8_lossy(&output));
                let loads = compute_loads(&previous, &mut sample, &mut ignore);
                previous = sample;
                if !loads.is_empty() {
                    let _ = events.send(ProcStatEvent::Load(loads));
                }
            }
            Err(err) => {
                let _ = events.send(ProcStatEvent::Error(err));
                break;
            }
        }
    }
    let _ = events.send(ProcStatEvent::End);
}
