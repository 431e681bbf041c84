//! Reverse port forwarding (device → host), via the `reverse:` service.

use crate::connection::Connection;
use crate::error::ClientError;
use serde::{Deserialize, Serialize};

/// One reverse forward entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reverse {
    pub remote: String,
    pub local: String,
}

/// `reverse:forward:<remote>;<local>`. Double-reply like host forwards.
pub async fn forward(
    conn: &mut Connection,
    remote: &str,
    local: &str,
) -> Result<(), ClientError> {
    conn.request(&format!("reverse:forward:{remote};{local}"))
        .await?;
    conn.read_okay().await
}

/// `reverse:list-forward`.
///
/// Lines carry `serial remote local`; the serial is the device we are
/// already bound to, so only the endpoints are kept.
pub async fn list_forwards(conn: &mut Connection) -> Result<Vec<Reverse>, ClientError> {
    conn.request("reverse:list-forward").await?;
    let value = conn.parser().read_value().await?;
    Ok(parse_reverses(&String::from_utf8_lossy(&value)))
}

fn parse_reverses(value: &str) -> Vec<Reverse> {
    let mut reverses = Vec::new();
    for line in value.lines() {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 3 {
            continue;
        }
        reverses.push(Reverse {
            remote: fields[1].to_string(),
            local: fields[2].to_string(),
        });
    }
    reverses
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reverses() {
        let reverses = parse_reverses(
            "ABC1234 tcp:8080 tcp:3000\nABC1234 localabstract:sock tcp:9000\n",
        );
        assert_eq!(reverses.len(), 2);
        assert_eq!(reverses[0].remote, "tcp:8080");
        assert_eq!(reverses[0].local, "tcp:3000");
        assert_eq!(reverses[1].remote, "localabstract:sock");
    }

    #[test]
    fn test_parse_reverses_skips_malformed_lines() {
        assert!(parse_reverses("tcp:8080\n\n").is_empty());
    }
}
