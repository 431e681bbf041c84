//! The `shell:` service.

use super::escape;
use crate::connection::Connection;
use crate::error::ClientError;
use bytes::Bytes;

/// Starts `shell:<cmd>`; stdout arrives as raw bytes until EOF, readable
/// off the returned connection's parser.
pub async fn shell(mut conn: Connection, cmd: &str) -> Result<Connection, ClientError> {
    conn.request(&format!("shell:{cmd}")).await?;
    Ok(conn)
}

/// Runs a command built from pre-tokenized arguments, each shell-quoted.
pub async fn shell_args(conn: Connection, args: &[&str]) -> Result<Connection, ClientError> {
    let cmd = args.iter().map(|a| escape(a)).collect::<Vec<_>>().join(" ");
    shell(conn, &cmd).await
}

/// Runs a command and collects its entire output.
pub async fn shell_output(conn: Connection, cmd: &str) -> Result<Bytes, ClientError> {
    let mut conn = shell(conn, cmd).await?;
    let output = conn.parser().read_all().await?;
    conn.close().await;
    Ok(output)
}
