//! Per-client state machine of the bridge.
//!
//! ```text
//! fresh --A_CNXN--> token issued
//! token --A_AUTH(SIGNATURE)--> token re-issued
//! token --A_AUTH(RSAPUBLICKEY), trusted--> authorized, A_CNXN sent back
//! token --A_AUTH(RSAPUBLICKEY), untrusted--> end
//! authorized --A_OPEN--> stream opened
//! authorized --A_OKAY/A_WRTE/A_CLSE--> forwarded to the stream's service
//! any --error--> end (socket closed, all services ended)
//! ```

use crate::counter::RollingCounter;
use crate::error::BridgeError;
use crate::server::TrustHook;
use crate::service::{self, ServiceContext};
use crate::service_map::{ForwardOutcome, ServiceMap};
use adbr_client::{auth, Client};
use adbr_protocol::packet::{AUTH_RSAPUBLICKEY, AUTH_SIGNATURE, AUTH_TOKEN, TOKEN_LENGTH};
use adbr_protocol::{swap32, Command, Packet, PacketDecoder};
use rand::RngCore;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};

const READ_BUFFER: usize = 16 * 1024;
const SERVICE_CHANNEL: usize = 32;
const MAX_PAYLOAD_CAP: u32 = 0xFFFF;

/// Serialized packet writer shared between the socket and its services.
///
/// Header and payload of one packet are written under a single lock
/// acquisition, so concurrent services can never interleave their bytes.
pub(crate) struct PacketWriter {
    inner: Mutex<OwnedWriteHalf>,
}

impl PacketWriter {
    fn new(half: OwnedWriteHalf) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(half),
        })
    }

    pub(crate) async fn write_packet(
        &self,
        command: Command,
        arg0: u32,
        arg1: u32,
        data: &[u8],
    ) -> std::io::Result<()> {
        let frame = Packet::assemble(command, arg0, arg1, data);
        let mut writer = self.inner.lock().await;
        writer.write_all(&frame).await
    }

    async fn shutdown(&self) {
        let _ = self.inner.lock().await.shutdown().await;
    }
}

struct Socket {
    client: Client,
    serial: String,
    trust: TrustHook,
    writer: Arc<PacketWriter>,
    version: u32,
    max_payload: u32,
    authorized: bool,
    token: Option<[u8; TOKEN_LENGTH]>,
    signature: Option<Vec<u8>>,
    sync_token: RollingCounter,
    local_ids: RollingCounter,
    services: ServiceMap,
}

/// Runs the state machine for one accepted TCP client until it disconnects
/// or errors. All services on the socket are ended on the way out.
pub(crate) async fn run(
    stream: TcpStream,
    client: Client,
    serial: String,
    trust: TrustHook,
) -> Result<(), BridgeError> {
    stream.set_nodelay(true).ok();
    let (mut read_half, write_half) = stream.into_split();

    let mut socket = Socket {
        client,
        serial,
        trust,
        writer: PacketWriter::new(write_half),
        version: 1,
        max_payload: 4096,
        authorized: false,
        token: None,
        signature: None,
        sync_token: RollingCounter::new(1, u32::MAX),
        local_ids: RollingCounter::new(1, u32::MAX),
        services: ServiceMap::new(),
    };

    let mut decoder = PacketDecoder::new();
    let mut buf = [0u8; READ_BUFFER];
    let result = loop {
        let read = match read_half.read(&mut buf).await {
            Ok(0) => break Ok(()),
            Ok(n) => n,
            Err(err) => break Err(BridgeError::Io(err)),
        };
        decoder.feed(&buf[..read]);

        let outcome = loop {
            match decoder.next_packet() {
                Ok(Some(packet)) => {
                    if let Err(err) = socket.handle_packet(packet).await {
                        break Some(err);
                    }
                }
                Ok(None) => break None,
                Err(err) => break Some(BridgeError::Protocol(err)),
            }
        };
        if let Some(err) = outcome {
            break Err(err);
        }
    };

    socket.end().await;
    result
}

impl Socket {
    async fn handle_packet(&mut self, packet: Packet) -> Result<(), BridgeError> {
        tracing::trace!("<- {packet}");
        match packet.command_kind() {
            Some(Command::Sync) => self.handle_sync().await,
            Some(Command::Cnxn) => self.handle_connection(&packet).await,
            Some(Command::Auth) => self.handle_auth(&packet).await,
            Some(Command::Open) => self.handle_open(packet).await,
            Some(Command::Okay) | Some(Command::Wrte) | Some(Command::Clse) => {
                self.forward_to_service(packet).await
            }
            None => Err(BridgeError::UnknownCommand(packet.command)),
        }
    }

    async fn handle_sync(&mut self) -> Result<(), BridgeError> {
        let token = self.sync_token.next();
        self.writer
            .write_packet(Command::Sync, 1, token, b"")
            .await?;
        Ok(())
    }

    async fn handle_connection(&mut self, packet: &Packet) -> Result<(), BridgeError> {
        self.version = swap32(packet.arg0);
        self.max_payload = packet.arg1.min(MAX_PAYLOAD_CAP);

        let mut token = [0u8; TOKEN_LENGTH];
        rand::thread_rng().fill_bytes(&mut token);
        self.token = Some(token);

        tracing::debug!(
            "CNXN version={:#x} max_payload={}, issuing auth token",
            self.version,
            self.max_payload
        );
        self.writer
            .write_packet(Command::Auth, AUTH_TOKEN, 0, &token)
            .await?;
        Ok(())
    }

    async fn handle_auth(&mut self, packet: &Packet) -> Result<(), BridgeError> {
        let Some(token) = self.token else {
            return Err(BridgeError::AuthBeforeConnection);
        };
        match packet.arg0 {
            AUTH_SIGNATURE => {
                // Only the first signature counts; the client may retry
                // with other keys against a re-issued token.
                if self.signature.is_none() {
                    self.signature = Some(packet.data.to_vec());
                }
                self.writer
                    .write_packet(Command::Auth, AUTH_TOKEN, 0, &token)
                    .await?;
                Ok(())
            }
            AUTH_RSAPUBLICKEY => {
                let Some(signature) = self.signature.as_deref() else {
                    return Err(BridgeError::PublicKeyBeforeSignature);
                };
                let key = auth::parse_public_key(&packet.data)?;
                if !auth::verify_token(&key.key, &token, signature) {
                    tracing::debug!("signature of {} did not verify", key.fingerprint);
                    return Err(BridgeError::KeyRejected);
                }
                if !(self.trust)(&key.fingerprint, &key.comment) {
                    tracing::debug!("key {} not trusted", key.fingerprint);
                    return Err(BridgeError::KeyRejected);
                }

                self.authorized = true;
                let comment = if key.comment.is_empty() {
                    "no comment"
                } else {
                    key.comment.as_str()
                };
                tracing::info!("authorized key {} ({comment})", key.fingerprint);
                self.writer
                    .write_packet(
                        Command::Cnxn,
                        swap32(self.version),
                        self.max_payload,
                        b"device::",
                    )
                    .await?;
                Ok(())
            }
            other => Err(BridgeError::UnknownAuthMethod(other)),
        }
    }

    async fn handle_open(&mut self, packet: Packet) -> Result<(), BridgeError> {
        if !self.authorized {
            return Err(BridgeError::Unauthorized);
        }
        if packet.data.len() < 2 {
            return Err(BridgeError::EmptyServiceName);
        }

        let remote_id = packet.arg0;
        let local_id = self.local_ids.next();

        let (tx, rx) = mpsc::channel(SERVICE_CHANNEL);
        self.services.insert(local_id, tx)?;

        let ctx = ServiceContext {
            client: self.client.clone(),
            serial: self.serial.clone(),
            local_id,
            remote_id,
            max_payload: self.max_payload as usize,
            writer: self.writer.clone(),
        };
        tokio::spawn(service::run(ctx, packet.data.to_vec(), rx));
        Ok(())
    }

    async fn forward_to_service(&mut self, packet: Packet) -> Result<(), BridgeError> {
        if !self.authorized {
            return Err(BridgeError::Unauthorized);
        }
        let local_id = packet.arg1;
        let command = packet.command_kind();
        match self.services.forward(local_id, packet).await {
            ForwardOutcome::Delivered => Ok(()),
            // A CLSE racing against a service that already ended is
            // normal teardown traffic.
            ForwardOutcome::Gone => Ok(()),
            ForwardOutcome::Unknown if command == Some(Command::Clse) => Ok(()),
            ForwardOutcome::Unknown => Err(BridgeError::ServiceNotFound(local_id)),
        }
    }

    async fn end(&mut self) {
        self.services.end();
        self.writer.shutdown().await;
    }
}
