//! The SYNC sub-protocol: STAT, LIST, SEND and RECV over an open
//! smart-socket connection.
//!
//! A [`Sync`] is obtained from [`DeviceClient::sync`](crate::DeviceClient)
//! after the `sync:` service has been acknowledged. STAT and LIST are
//! plain request/response; push and pull run as background pumps reporting
//! progress through a [`Transfer`] handle.

mod stats;
mod transfer;

pub use stats::{Entry, Stats};
pub use transfer::{Transfer, TransferEvent};

use crate::connection::Connection;
use crate::error::ClientError;
use adbr_protocol::codec;
use adbr_protocol::SYNC_DATA_MAX;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;
use transfer::TransferReporter;

/// Scratch directory used for pushed temporaries.
pub const TEMP_PATH: &str = "/data/local/tmp";

/// Mode used when the caller does not specify one.
pub const DEFAULT_CHMOD: u32 = 0o644;

/// Returns a path under the device temp directory for `path`'s basename.
pub fn temp_file(path: &str) -> String {
    let base = path.rsplit('/').next().unwrap_or(path);
    format!("{TEMP_PATH}/{base}")
}

/// An open SYNC session.
pub struct Sync {
    conn: Connection,
}

impl Sync {
    pub(crate) fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Sends `STAT` for `path`. A zeroed mode means the path does not exist.
    pub async fn stat(&mut self, path: &str) -> Result<Stats, ClientError> {
        self.send_request(codec::STAT, path).await?;

        let reply = self.conn.parser().read_bytes(4).await?;
        match &reply[..] {
            b"STAT" => {
                let body = self.conn.parser().read_bytes(12).await?;
                let mode = u32::from_le_bytes(body[0..4].try_into().unwrap());
                let size = u32::from_le_bytes(body[4..8].try_into().unwrap());
                let mtime = u32::from_le_bytes(body[8..12].try_into().unwrap());
                if mode == 0 {
                    return Err(ClientError::NotFound {
                        path: path.to_string(),
                    });
                }
                Ok(Stats::new(mode, size, mtime))
            }
            b"FAIL" => Err(self.conn.parser().read_error().await),
            other => Err(ClientError::unexpected(other, "STAT or FAIL")),
        }
    }

    /// Enumerates a directory via `LIST`/`DENT`.
    pub async fn list(&mut self, path: &str) -> Result<Vec<Entry>, ClientError> {
        self.send_request(codec::LIST, path).await?;

        let mut entries = Vec::new();
        loop {
            let reply = self.conn.parser().read_bytes(4).await?;
            match &reply[..] {
                b"DENT" => {
                    let body = self.conn.parser().read_bytes(16).await?;
                    let mode = u32::from_le_bytes(body[0..4].try_into().unwrap());
                    let size = u32::from_le_bytes(body[4..8].try_into().unwrap());
                    let mtime = u32::from_le_bytes(body[8..12].try_into().unwrap());
                    let name_len = u32::from_le_bytes(body[12..16].try_into().unwrap());
                    let name = self.conn.parser().read_bytes(name_len as usize).await?;
                    entries.push(Entry {
                        name: String::from_utf8_lossy(&name).into_owned(),
                        stats: Stats::new(mode, size, mtime),
                    });
                }
                b"DONE" => {
                    // DONE carries an empty dent struct.
                    self.conn.parser().read_bytes(16).await?;
                    return Ok(entries);
                }
                b"FAIL" => return Err(self.conn.parser().read_error().await),
                other => return Err(ClientError::unexpected(other, "DENT, DONE or FAIL")),
            }
        }
    }

    /// Streams `src` to `dest` on the device.
    ///
    /// The session is consumed by the transfer pump; progress and completion
    /// arrive through the returned [`Transfer`].
    pub fn push<R>(mut self, src: R, dest: &str, mode: u32) -> Transfer
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let dest = dest.to_string();
        let (mut reporter, events) = TransferReporter::channel();
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            let mut src = src;
            let outcome = tokio::select! {
                result = push_pump(&mut self, &mut src, &dest, mode, &mut reporter) => Some(result),
                _ = cancel_rx.wait_for(|&c| c) => None,
            };
            match outcome {
                Some(result) => reporter.finish(result, false),
                None => reporter.finish(Ok(()), true),
            }
            self.conn.close().await;
        });
        Transfer::new(events, cancel_tx)
    }

    /// Streams the remote `path` into `sink`.
    pub fn pull<W>(mut self, path: &str, sink: W) -> Transfer
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let path = path.to_string();
        let (mut reporter, events) = TransferReporter::channel();
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        tokio::spawn(async move {
            let mut sink = sink;
            let outcome = tokio::select! {
                result = pull_pump(&mut self, &path, &mut sink, &mut reporter) => Some(result),
                _ = cancel_rx.wait_for(|&c| c) => None,
            };
            match outcome {
                Some(result) => reporter.finish(result, false),
                None => reporter.finish(Ok(()), true),
            }
            self.conn.close().await;
        });
        Transfer::new(events, cancel_tx)
    }

    /// Ends the session.
    pub async fn end(mut self) {
        let _ = self
            .conn
            .write(&codec::format_sync_header(codec::QUIT, 0))
            .await;
        self.conn.close().await;
    }

    async fn send_request(&mut self, cmd: &[u8; 4], path: &str) -> Result<(), ClientError> {
        self.conn
            .write(&codec::format_sync_request(cmd, path))
            .await?;
        Ok(())
    }
}

async fn push_pump<R>(
    sync: &mut Sync,
    src: &mut R,
    dest: &str,
    mode: u32,
    reporter: &mut TransferReporter,
) -> Result<(), ClientError>
where
    R: AsyncRead + Unpin + Send,
{
    // Regular-file bit set in-band, like `adb push` does.
    let spec = format!("{dest},{}", mode | Stats::S_IFREG);
    sync.send_request(codec::SEND, &spec).await?;

    let mut buf = vec![0u8; SYNC_DATA_MAX];
    loop {
        let read = src.read(&mut buf).await?;
        if read == 0 {
            break;
        }
        sync.conn
            .write(&codec::format_sync_header(codec::DATA, read as u32))
            .await?;
        sync.conn.write(&buf[..read]).await?;
        reporter.progress(read as u64);
    }

    let mtime = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0);
    sync.conn
        .write(&codec::format_sync_header(codec::DONE, mtime))
        .await?;

    let reply = sync.conn.parser().read_bytes(4).await?;
    match &reply[..] {
        b"OKAY" => Ok(()),
        b"FAIL" => Err(sync.conn.parser().read_error().await),
        other => Err(ClientError::unexpected(other, "OKAY or FAIL")),
    }
}

async fn pull_pump<W>(
    sync: &mut Sync,
    path: &str,
    sink: &mut W,
    reporter: &mut TransferReporter,
) -> Result<(), ClientError>
where
    W: AsyncWrite + Unpin + Send,
{
    sync.send_request(codec::RECV, path).await?;

    loop {
        let reply = sync.conn.parser().read_bytes(4).await?;
        match &reply[..] {
            b"DATA" => {
                let len_bytes = sync.conn.parser().read_bytes(4).await?;
                let length = u32::from_le_bytes(len_bytes[..].try_into().unwrap()) as usize;
                sync.conn.parser().read_byte_flow(length, sink).await?;
                reporter.progress(length as u64);
            }
            b"DONE" => {
                // Trailing word is the file mtime.
                sync.conn.parser().read_bytes(4).await?;
                sink.flush().await?;
                return Ok(());
            }
            b"FAIL" => return Err(sync.conn.parser().read_error().await),
            other => return Err(ClientError::unexpected(other, "DATA, DONE or FAIL")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_file_uses_basename() {
        assert_eq!(temp_file("/sdcard/app.apk"), "/data/local/tmp/app.apk");
        assert_eq!(temp_file("bare.txt"), "/data/local/tmp/bare.txt");
    }
}
