//! `host:*` services answered by the ADB server itself.

use crate::connection::Connection;
use crate::error::ClientError;
use crate::tracker::{parse_device_list, parse_device_list_with_paths, Device};
use regex::Regex;
use std::sync::OnceLock;

fn connect_ok_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"connected to|already connected").unwrap())
}

/// `host:version`: the server's protocol version, sent as hex.
pub async fn version(conn: &mut Connection) -> Result<u32, ClientError> {
    conn.request("host:version").await?;
    let value = conn.parser().read_value().await?;
    let text = String::from_utf8_lossy(&value);
    u32::from_str_radix(text.trim(), 16)
        .map_err(|_| ClientError::unexpected(&value, "a hex version"))
}

/// `host:kill`: asks the server to exit; success is the ensuing close.
pub async fn kill(conn: &mut Connection) -> Result<(), ClientError> {
    conn.request("host:kill").await?;
    conn.close().await;
    Ok(())
}

/// `host:devices`: one `serial \t state` line per device.
pub async fn devices(conn: &mut Connection) -> Result<Vec<Device>, ClientError> {
    conn.request("host:devices").await?;
    let value = conn.parser().read_value().await?;
    parse_device_list(&String::from_utf8_lossy(&value))
}

/// `host:devices-l`: adds the device path as a third field.
pub async fn devices_with_paths(conn: &mut Connection) -> Result<Vec<Device>, ClientError> {
    conn.request("host:devices-l").await?;
    let value = conn.parser().read_value().await?;
    parse_device_list_with_paths(&String::from_utf8_lossy(&value))
}

/// `host:connect:<host>:<port>`: attaches a TCP device.
///
/// The server replies with prose; both "connected to" and "already
/// connected" count as success.
pub async fn connect(conn: &mut Connection, host: &str, port: u16) -> Result<String, ClientError> {
    conn.request(&format!("host:connect:{host}:{port}")).await?;
    let value = conn.parser().read_value().await?;
    let text = String::from_utf8_lossy(&value);
    if connect_ok_re().is_match(&text) {
        Ok(format!("{host}:{port}"))
    } else {
        Err(ClientError::Fail {
            message: text.trim().to_string(),
        })
    }
}

/// `host:disconnect:<host>:<port>`: detaches a TCP device.
pub async fn disconnect(
    conn: &mut Connection,
    host: &str,
    port: u16,
) -> Result<String, ClientError> {
    conn.request(&format!("host:disconnect:{host}:{port}"))
        .await?;
    let value = conn.parser().read_value().await?;
    let text = String::from_utf8_lossy(&value);
    if text.contains("error") {
        Err(ClientError::Fail {
            message: text.trim().to_string(),
        })
    } else {
        Ok(format!("{host}:{port}"))
    }
}

/// `host:transport:<serial>`: binds this connection to a device. All
/// further services on the socket are answered by that device.
pub async fn transport(conn: &mut Connection, serial: &str) -> Result<(), ClientError> {
    conn.request(&format!("host:transport:{serial}")).await
}

/// `host:track-devices`: switches the connection into an endless sequence
/// of device-list values. The caller keeps reading values off the parser.
pub async fn track_devices(conn: &mut Connection) -> Result<(), ClientError> {
    conn.request("host:track-devices").await
}
