//! Device mode and state services: reboot, remount, root, connection mode
//! switching, boot tracking and system properties.

use crate::connection::Connection;
use crate::error::ClientError;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

fn property_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\[([\s\S]*?)\]: \[([\s\S]*?)\]\r?$").unwrap())
}

fn boot_complete_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^1$").unwrap())
}

/// Reboot target, appended to the `reboot:` service name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RebootMode {
    #[default]
    Normal,
    Bootloader,
    Recovery,
    Sideload,
}

impl RebootMode {
    fn service(&self) -> &'static str {
        match self {
            RebootMode::Normal => "reboot:",
            RebootMode::Bootloader => "reboot:bootloader",
            RebootMode::Recovery => "reboot:recovery",
            RebootMode::Sideload => "reboot:sideload",
        }
    }
}

/// `reboot:[<mode>]`: acknowledged with OKAY, then a textual ack until EOF.
pub async fn reboot(conn: &mut Connection, mode: RebootMode) -> Result<(), ClientError> {
    conn.request(mode.service()).await?;
    conn.parser().read_all().await?;
    Ok(())
}

/// `remount:`: remounts the system partitions read-write. Plain OKAY.
pub async fn remount(conn: &mut Connection) -> Result<(), ClientError> {
    conn.request("remount:").await
}

/// `root:`: restarts adbd with root privileges.
///
/// Success is the literal "restarting adbd as root" ack; anything else is
/// surfaced as a failure message.
pub async fn root(conn: &mut Connection) -> Result<(), ClientError> {
    conn.request("root:").await?;
    let output = conn.parser().read_all().await?;
    let text = String::from_utf8_lossy(&output);
    if text.contains("restarting adbd as root") {
        Ok(())
    } else {
        Err(ClientError::Fail {
            message: text.trim().to_string(),
        })
    }
}

/// `tcpip:<port>`: switches the device to TCP listening mode.
pub async fn tcpip(conn: &mut Connection, port: u16) -> Result<u16, ClientError> {
    conn.request(&format!("tcpip:{port}")).await?;
    let output = conn.parser().read_all().await?;
    let text = String::from_utf8_lossy(&output);
    if text.contains("restarting in") {
        Ok(port)
    } else {
        Err(ClientError::Fail {
            message: text.trim().to_string(),
        })
    }
}

/// `usb:`: switches the device back to USB mode.
pub async fn usb(conn: &mut Connection) -> Result<(), ClientError> {
    conn.request("usb:").await?;
    let output = conn.parser().read_all().await?;
    let text = String::from_utf8_lossy(&output);
    if text.contains("restarting in") {
        Ok(())
    } else {
        Err(ClientError::Fail {
            message: text.trim().to_string(),
        })
    }
}

/// Polls `sys.boot_completed` in a device-side loop until it reads `1`.
pub async fn wait_boot_complete(conn: &mut Connection) -> Result<(), ClientError> {
    conn.request("shell:while getprop sys.boot_completed 2>/dev/null; do sleep 1; done")
        .await?;
    conn.parser().search_line(boot_complete_re()).await?;
    conn.close().await;
    Ok(())
}

/// `shell:getprop`: all system properties.
pub async fn get_properties(conn: &mut Connection) -> Result<HashMap<String, String>, ClientError> {
    conn.request("shell:getprop").await?;
    let output = conn.parser().read_all().await?;
    let text = String::from_utf8_lossy(&output);

    let mut properties = HashMap::new();
    for line in text.lines() {
        if let Some(captures) = property_re().captures(line) {
            properties.insert(captures[1].to_string(), captures[2].to_string());
        }
    }
    Ok(properties)
}
