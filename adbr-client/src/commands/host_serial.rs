//! `host-serial:<serial>:*` services addressed to one device's transport.

use crate::connection::Connection;
use crate::error::ClientError;
use serde::{Deserialize, Serialize};

/// One `forward` table entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Forward {
    pub serial: String,
    pub local: String,
    pub remote: String,
}

/// `host-serial:<s>:forward:<local>;<remote>`.
///
/// Forward setup replies twice: once for the request reaching the server,
/// once for the device accepting it.
pub async fn forward(
    conn: &mut Connection,
    serial: &str,
    local: &str,
    remote: &str,
) -> Result<(), ClientError> {
    conn.request(&format!("host-serial:{serial}:forward:{local};{remote}"))
        .await?;
    conn.read_okay().await
}

/// `host-serial:<s>:list-forward`.
pub async fn list_forwards(
    conn: &mut Connection,
    serial: &str,
) -> Result<Vec<Forward>, ClientError> {
    conn.request(&format!("host-serial:{serial}:list-forward"))
        .await?;
    let value = conn.parser().read_value().await?;
    parse_forwards(&String::from_utf8_lossy(&value))
}

fn parse_forwards(value: &str) -> Result<Vec<Forward>, ClientError> {
    let mut forwards = Vec::new();
    for line in value.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != 3 {
            return Err(ClientError::unexpected(line, "serial local remote"));
        }
        forwards.push(Forward {
            serial: fields[0].to_string(),
            local: fields[1].to_string(),
            remote: fields[2].to_string(),
        });
    }
    Ok(forwards)
}

/// `host-serial:<s>:wait-for-any`: blocks until the device is usable.
/// Same double-reply pattern as forward setup.
pub async fn wait_for_device(conn: &mut Connection, serial: &str) -> Result<(), ClientError> {
    conn.request(&format!("host-serial:{serial}:wait-for-any"))
        .await?;
    conn.read_okay().await
}

/// `host-serial:<s>:get-devpath`.
pub async fn get_device_path(conn: &mut Connection, serial: &str) -> Result<String, ClientError> {
    conn.request(&format!("host-serial:{serial}:get-devpath"))
        .await?;
    let value = conn.parser().read_value().await?;
    Ok(String::from_utf8_lossy(&value).into_owned())
}

/// `host-serial:<s>:get-serialno`.
pub async fn get_serial_no(conn: &mut Connection, serial: &str) -> Result<String, ClientError> {
    conn.request(&format!("host-serial:{serial}:get-serialno"))
        .await?;
    let value = conn.parser().read_value().await?;
    Ok(String::from_utf8_lossy(&value).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forwards() {
        let forwards =
            parse_forwards("ABC1234 tcp:8080 tcp:80\nABC1234 tcp:9090 localabstract:sock\n")
                .unwrap();
        assert_eq!(forwards.len(), 2);
        assert_eq!(forwards[0].local, "tcp:8080");
        assert_eq!(forwards[1].remote, "localabstract:sock");
    }

    #[test]
    fn test_parse_forwards_rejects_short_lines() {
        assert!(parse_forwards("ABC1234 tcp:8080\n").is_err());
    }
}
