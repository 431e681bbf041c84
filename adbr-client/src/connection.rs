//! Connection management.
//!
//! Each smart-socket command acquires a fresh [`Connection`], issues its
//! request and either closes it or hands it off to a long-lived reader.
//! A connection has exactly one consumer for its receiving half, the
//! [`Parser`]; there is no background read loop.

use crate::dump;
use crate::error::ClientError;
use crate::parser::Parser;
use adbr_protocol::codec;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Port of the local ADB server.
    pub port: u16,
    /// Path of the `adb` binary used for `start-server`.
    pub bin: String,
    /// Dial timeout.
    pub connect_timeout: Duration,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            port: adbr_protocol::DEFAULT_PORT,
            bin: "adb".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ConnectionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_bin(mut self, bin: impl Into<String>) -> Self {
        self.bin = bin.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// A connection to the local ADB server.
pub struct Connection {
    writer: OwnedWriteHalf,
    parser: Parser,
    closed: bool,
}

impl Connection {
    /// Connects to the ADB server at `127.0.0.1:<port>`.
    ///
    /// On the first failure, `<bin> start-server` is executed once and the
    /// dial retried; a second failure is fatal.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self, ClientError> {
        match Self::dial(config).await {
            Ok(conn) => Ok(conn),
            Err(first) => {
                tracing::debug!("connect failed ({first}), starting adb server");
                Self::start_server(config).await?;
                Self::dial(config).await
            }
        }
    }

    async fn dial(config: &ConnectionConfig) -> Result<Self, ClientError> {
        let addr = ("127.0.0.1", config.port);
        let stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ClientError::Timeout { op: "connect" })??;
        stream.set_nodelay(true).ok();

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            writer: write_half,
            parser: Parser::new(read_half),
            closed: false,
        })
    }

    /// Runs `<bin> start-server`, once per failed dial.
    async fn start_server(config: &ConnectionConfig) -> Result<(), ClientError> {
        tracing::debug!("spawning '{} start-server'", config.bin);
        let output = tokio::process::Command::new(&config.bin)
            .arg("start-server")
            .output()
            .await
            .map_err(|err| ClientError::StartServer(err.to_string()))?;
        if !output.status.success() {
            return Err(ClientError::StartServer(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }

    /// Writes raw bytes; returns the number written.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize, ClientError> {
        self.writer.write_all(data).await?;
        dump::record(data);
        Ok(data.len())
    }

    /// Sends a length-prefixed service request.
    pub async fn send(&mut self, service: &str) -> Result<(), ClientError> {
        tracing::debug!("-> {service}");
        let frame = codec::encode_frame(service.as_bytes());
        self.write(&frame).await?;
        Ok(())
    }

    /// Reads the 4-byte reply status, failing on `FAIL` or anything else.
    pub async fn read_okay(&mut self) -> Result<(), ClientError> {
        let reply = self.parser.read_bytes(4).await?;
        if &reply[..] == codec::OKAY {
            Ok(())
        } else if &reply[..] == codec::FAIL {
            Err(self.parser.read_error().await)
        } else {
            Err(ClientError::unexpected(&reply, "OKAY or FAIL"))
        }
    }

    /// Sends a service request and consumes the `OKAY` reply.
    pub async fn request(&mut self, service: &str) -> Result<(), ClientError> {
        self.send(service).await?;
        self.read_okay().await
    }

    /// The parser bound to this connection's receiving half.
    pub fn parser(&mut self) -> &mut Parser {
        &mut self.parser
    }

    /// Splits the connection for bidirectional piping.
    pub fn into_split(self) -> (Parser, OwnedWriteHalf) {
        (self.parser, self.writer)
    }

    /// Shuts down the sending half. Idempotent.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.writer.shutdown().await;
    }
}
