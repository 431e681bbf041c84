//! Stream-oriented reader for smart-socket replies.
//!
//! One Parser is bound to one connection and is its only consumer;
//! concurrent use is undefined.

use crate::dump;
use crate::error::ClientError;
use adbr_protocol::codec;
use bytes::Bytes;
use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;

const FLOW_CHUNK: usize = 8 * 1024;

/// Buffered reader over the receiving half of an ADB connection.
pub struct Parser<R = OwnedReadHalf> {
    stream: BufReader<R>,
}

impl<R: AsyncRead + Unpin> Parser<R> {
    pub fn new(stream: R) -> Self {
        Self {
            stream: BufReader::new(stream),
        }
    }

    /// Reads exactly `n` bytes.
    ///
    /// Fails with [`ClientError::PrematureEof`] carrying the number of bytes
    /// still outstanding if the stream ends first.
    pub async fn read_bytes(&mut self, n: usize) -> Result<Bytes, ClientError> {
        let mut buf = vec![0u8; n];
        let mut filled = 0;
        while filled < n {
            let read = self.stream.read(&mut buf[filled..]).await?;
            if read == 0 {
                return Err(ClientError::PrematureEof { missing: n - filled });
            }
            filled += read;
        }
        dump::record(&buf);
        Ok(buf.into())
    }

    /// Reads exactly `n` bytes and decodes them as ASCII text.
    pub async fn read_ascii(&mut self, n: usize) -> Result<String, ClientError> {
        let bytes = self.read_bytes(n).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Reads a length-prefixed value: 4 hex digits, then that many bytes.
    pub async fn read_value(&mut self) -> Result<Bytes, ClientError> {
        let prefix = self.read_bytes(4).await?;
        let length = codec::decode_length(&prefix)?;
        self.read_bytes(length as usize).await
    }

    /// Reads a length-prefixed error message and wraps it as a failure.
    pub async fn read_error(&mut self) -> ClientError {
        match self.read_value().await {
            Ok(message) => ClientError::Fail {
                message: String::from_utf8_lossy(&message).into_owned(),
            },
            Err(err) => err,
        }
    }

    /// Reads until `code` is seen; the returned bytes exclude it.
    pub async fn read_until(&mut self, code: u8) -> Result<Vec<u8>, ClientError> {
        let mut out = Vec::new();
        loop {
            let mut byte = [0u8; 1];
            let read = self.stream.read(&mut byte).await?;
            if read == 0 {
                return Err(ClientError::PrematureEof { missing: 1 });
            }
            dump::record(&byte);
            if byte[0] == code {
                return Ok(out);
            }
            out.push(byte[0]);
        }
    }

    /// Reads one line, stripping the trailing `\n` and a single `\r`.
    pub async fn read_line(&mut self) -> Result<String, ClientError> {
        let mut line = self.read_until(0x0A).await?;
        if line.last() == Some(&0x0D) {
            line.pop();
        }
        Ok(String::from_utf8_lossy(&line).into_owned())
    }

    /// Reads lines until one matches `re`; returns all capture groups,
    /// with empty strings for groups that did not participate.
    pub async fn search_line(&mut self, re: &Regex) -> Result<Vec<String>, ClientError> {
        loop {
            let line = self.read_line().await?;
            if let Some(captures) = re.captures(&line) {
                return Ok(captures
                    .iter()
                    .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                    .collect());
            }
        }
    }

    /// Reads the remainder of the stream.
    pub async fn read_all(&mut self) -> Result<Bytes, ClientError> {
        let mut out = Vec::new();
        self.stream.read_to_end(&mut out).await?;
        dump::record(&out);
        Ok(out.into())
    }

    /// Copies exactly `n` bytes into `sink`, in chunks.
    pub async fn read_byte_flow<W>(&mut self, n: usize, sink: &mut W) -> Result<(), ClientError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut remaining = n;
        let mut buf = [0u8; FLOW_CHUNK];
        while remaining > 0 {
            let want = remaining.min(FLOW_CHUNK);
            let read = self.stream.read(&mut buf[..want]).await?;
            if read == 0 {
                return Err(ClientError::PrematureEof { missing: remaining });
            }
            dump::record(&buf[..read]);
            sink.write_all(&buf[..read]).await?;
            remaining -= read;
        }
        Ok(())
    }

    /// Performs a single read into `buf`. Returns 0 at end of stream.
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, ClientError> {
        let read = self.stream.read(buf).await?;
        dump::record(&buf[..read]);
        Ok(read)
    }
}
