//! Long-lived stream services: device logs, logcat, screencap, TCP and
//! Unix-socket tunnels, and the monkey controller.

use crate::connection::Connection;
use crate::error::ClientError;
use crate::line_transform::LineTransform;
use std::time::Duration;

const CHUNK: usize = 8 * 1024;

/// A read-only byte stream repaired by a [`LineTransform`].
pub struct TransformedStream {
    conn: Connection,
    transform: LineTransform,
    pending: Vec<u8>,
    eof: bool,
}

impl TransformedStream {
    fn new(conn: Connection, transform: LineTransform) -> Self {
        Self {
            conn,
            transform,
            pending: Vec::new(),
            eof: false,
        }
    }

    /// Returns the next non-empty chunk, or `None` at end of stream.
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, ClientError> {
        if !self.pending.is_empty() {
            return Ok(Some(std::mem::take(&mut self.pending)));
        }
        let mut buf = [0u8; CHUNK];
        while !self.eof {
            let read = self.conn.parser().read_chunk(&mut buf).await?;
            if read == 0 {
                self.eof = true;
                break;
            }
            let out = self.transform.transform(&buf[..read]);
            if !out.is_empty() {
                return Ok(Some(out));
            }
        }
        Ok(self.transform.flush().map(|b| vec![b]))
    }

    /// Drains the stream into one buffer.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>, ClientError> {
        let mut out = Vec::new();
        while let Some(chunk) = self.next_chunk().await? {
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    /// Closes the underlying connection.
    pub async fn end(mut self) {
        self.conn.close().await;
    }
}

/// `log:<name>`: one of the device's binary log streams (`main`, `events`,
/// `radio`, ...). The caller reads raw bytes off the returned connection.
pub async fn open_log(mut conn: Connection, name: &str) -> Result<Connection, ClientError> {
    conn.request(&format!("log:{name}")).await?;
    Ok(conn)
}

/// Options for [`logcat`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LogcatOptions {
    /// Clear the log before streaming (`logcat -c`).
    pub clear: bool,
}

/// Binary logcat stream.
///
/// The leading `echo` lets [`LineTransform`] detect the device's line
/// discipline and undo the tty's CR LF mangling of the binary stream. The
/// `-B *:I` filter argument works around devices that refuse a bare `-B`.
pub async fn logcat(
    mut conn: Connection,
    options: LogcatOptions,
) -> Result<TransformedStream, ClientError> {
    let cmd = if options.clear {
        "shell:echo && logcat -c 2>/dev/null && logcat -B *:I 2>/dev/null"
    } else {
        "shell:echo && logcat -B *:I 2>/dev/null"
    };
    conn.request(cmd).await?;
    Ok(TransformedStream::new(conn, LineTransform::with_auto_detect()))
}

/// PNG screenshot via `screencap -p`, with the same echo trick.
pub async fn screencap(mut conn: Connection) -> Result<TransformedStream, ClientError> {
    conn.request("shell:echo && screencap -p 2>/dev/null").await?;

    // The first byte decides CR/LF handling; no output at all means the
    // device has no usable screencap.
    let first = match conn.parser().read_bytes(1).await {
        Ok(first) => first,
        Err(ClientError::PrematureEof { .. }) => {
            return Err(ClientError::Fail {
                message: "screencap not supported on this device".to_string(),
            })
        }
        Err(err) => return Err(err),
    };

    let mut stream = TransformedStream::new(conn, LineTransform::with_auto_detect());
    stream.pending = stream.transform.transform(&first);
    Ok(stream)
}

/// `tcp:<port>[:<host>]`: raw bidirectional stream to a TCP endpoint on
/// the device.
pub async fn open_tcp(
    mut conn: Connection,
    port: u16,
    host: Option<&str>,
) -> Result<Connection, ClientError> {
    let service = match host {
        Some(host) => format!("tcp:{port}:{host}"),
        None => format!("tcp:{port}"),
    };
    conn.request(&service).await?;
    Ok(conn)
}

/// `localfilesystem:<path>`: raw stream to a Unix domain socket on the
/// device. Callers that need another socket namespace pass a full
/// `<type>:<path>` service string instead.
pub async fn open_local(mut conn: Connection, path: &str) -> Result<Connection, ClientError> {
    let service = if path.contains(':') {
        path.to_string()
    } else {
        format!("localfilesystem:{path}")
    };
    conn.request(&service).await?;
    Ok(conn)
}

/// Starts `monkey` in TCP server mode and waits for it to come up.
///
/// `EXTERNAL_STORAGE` is pointed at the temp dir because monkey insists on
/// writing a log under it, which fails on devices with odd sdcard mounts.
/// Some devices never print the `:Monkey:` banner, so after one second the
/// stream is handed over as-is.
pub async fn monkey(mut conn: Connection, port: u16) -> Result<Connection, ClientError> {
    conn.request(&format!(
        "shell:EXTERNAL_STORAGE=/data/local/tmp monkey --port {port} -v"
    ))
    .await?;

    let banner = async {
        let mut seen = Vec::new();
        let mut buf = [0u8; 1024];
        loop {
            let read = conn.parser().read_chunk(&mut buf).await?;
            if read == 0 {
                return Err(ClientError::PrematureEof { missing: 1 });
            }
            seen.extend_from_slice(&buf[..read]);
            if seen.windows(8).any(|w| w == b":Monkey:") {
                return Ok(());
            }
        }
    };
    match tokio::time::timeout(Duration::from_secs(1), banner).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => return Err(err),
        Err(_) => tracing::debug!("no monkey banner after 1s, proceeding anyway"),
    }
    Ok(conn)
}
