//! One logical ADB stream within an authenticated bridge socket.
//!
//! A service is created by an `A_OPEN` carrying a NUL-terminated service
//! name. The name is relayed verbatim into a fresh connection obtained from
//! the client, and bytes are pumped in both directions:
//!
//! - peer → backing: every `A_WRTE` payload is written to the backing
//!   transport and acknowledged with `A_OKAY` only once that write has
//!   completed, which stalls the peer if the backing side does.
//! - backing → peer: chunks of at most `max_payload` bytes are sent as
//!   `A_WRTE`, never more than one in flight; the next read waits for the
//!   peer's `A_OKAY`.

use crate::socket::PacketWriter;
use adbr_client::Client;
use adbr_protocol::{Command, Packet};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

pub(crate) struct ServiceContext {
    pub client: Client,
    pub serial: String,
    pub local_id: u32,
    pub remote_id: u32,
    pub max_payload: usize,
    pub writer: Arc<PacketWriter>,
}

pub(crate) async fn run(
    ctx: ServiceContext,
    service_name: Vec<u8>,
    mut packets: mpsc::Receiver<Packet>,
) {
    let name_end = service_name
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(service_name.len());
    let service = String::from_utf8_lossy(&service_name[..name_end]).into_owned();

    tracing::debug!(
        "stream {}/{}: opening '{}' on {}",
        ctx.local_id,
        ctx.remote_id,
        service,
        ctx.serial
    );

    let backing = match ctx.client.open_stream(&ctx.serial, &service).await {
        Ok(conn) => conn,
        Err(err) => {
            tracing::warn!("stream {}: could not open '{}': {err}", ctx.local_id, service);
            // Never opened, so our side of the stream has no id yet.
            let _ = ctx
                .writer
                .write_packet(Command::Clse, 0, ctx.remote_id, b"")
                .await;
            return;
        }
    };

    if ctx
        .writer
        .write_packet(Command::Okay, ctx.local_id, ctx.remote_id, b"")
        .await
        .is_err()
    {
        return;
    }

    let (mut parser, mut backing_writer) = backing.into_split();
    let mut need_ack = false;
    let mut buf = vec![0u8; ctx.max_payload.max(1)];

    loop {
        tokio::select! {
            packet = packets.recv() => {
                let Some(packet) = packet else { break };
                match packet.command_kind() {
                    Some(Command::Wrte) => {
                        if let Err(err) = backing_writer.write_all(&packet.data).await {
                            tracing::debug!("stream {}: backing write failed: {err}", ctx.local_id);
                            break;
                        }
                        // Ack after the backing write lands; this is the
                        // peer-side backpressure.
                        if ctx
                            .writer
                            .write_packet(Command::Okay, ctx.local_id, ctx.remote_id, b"")
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    Some(Command::Okay) => {
                        need_ack = false;
                    }
                    Some(Command::Clse) => break,
                    _ => {
                        tracing::debug!("stream {}: unexpected {packet}", ctx.local_id);
                        break;
                    }
                }
            }
            read = parser.read_chunk(&mut buf), if !need_ack => {
                match read {
                    Ok(0) => break,
                    Ok(n) => {
                        if ctx
                            .writer
                            .write_packet(Command::Wrte, ctx.local_id, ctx.remote_id, &buf[..n])
                            .await
                            .is_err()
                        {
                            break;
                        }
                        need_ack = true;
                    }
                    Err(err) => {
                        tracing::debug!("stream {}: backing read failed: {err}", ctx.local_id);
                        break;
                    }
                }
            }
        }
    }

    let _ = backing_writer.shutdown().await;
    let _ = ctx
        .writer
        .write_packet(Command::Clse, ctx.local_id, ctx.remote_id, b"")
        .await;
    tracing::debug!("stream {}/{} ended", ctx.local_id, ctx.remote_id);
}
