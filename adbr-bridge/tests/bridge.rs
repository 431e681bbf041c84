//! End-to-end bridge tests: a real TCP client performs the CNXN/AUTH
//! handshake and multiplexes streams that are backed by a scripted fake
//! ADB server.

use adbr_bridge::{BridgeServer, BridgeServerConfig};
use adbr_client::{Client, ConnectionConfig};
use adbr_protocol::packet::{AUTH_RSAPUBLICKEY, AUTH_SIGNATURE, AUTH_TOKEN, TOKEN_LENGTH};
use adbr_protocol::{Command, Packet, PacketDecoder};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Sign, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Reads framed packets off a raw TCP stream.
struct PacketStream {
    stream: TcpStream,
    decoder: PacketDecoder,
}

impl PacketStream {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            decoder: PacketDecoder::new(),
        }
    }

    async fn send(&mut self, command: Command, arg0: u32, arg1: u32, data: &[u8]) {
        let frame = Packet::assemble(command, arg0, arg1, data);
        self.stream.write_all(&frame).await.unwrap();
    }

    async fn recv(&mut self) -> Packet {
        loop {
            if let Some(packet) = self.decoder.next_packet().unwrap() {
                return packet;
            }
            let mut buf = [0u8; 4096];
            let read = self.stream.read(&mut buf).await.unwrap();
            assert_ne!(read, 0, "bridge closed the connection unexpectedly");
            self.decoder.feed(&buf[..read]);
        }
    }

    /// Asserts that no packet arrives within a short window.
    async fn expect_silence(&mut self) {
        assert!(self.decoder.next_packet().unwrap().is_none());
        let mut buf = [0u8; 4096];
        let read = tokio::time::timeout(Duration::from_millis(150), self.stream.read(&mut buf));
        match read.await {
            Err(_) => {}
            Ok(Ok(n)) => {
                self.decoder.feed(&buf[..n]);
                assert!(
                    self.decoder.next_packet().unwrap().is_none(),
                    "unexpected packet while awaiting ack"
                );
            }
            Ok(Err(err)) => panic!("read error while awaiting silence: {err}"),
        }
    }
}

/// Builds the ADB wire blob for a public key.
fn adb_key_blob(key: &RsaPublicKey, comment: &str) -> Vec<u8> {
    let mut n_le = key.n().to_bytes_le();
    let words = n_le.len().div_ceil(4);
    n_le.resize(4 * words, 0);

    let mut raw = Vec::new();
    raw.extend_from_slice(&(words as u32).to_le_bytes());
    raw.extend_from_slice(&0u32.to_le_bytes());
    raw.extend_from_slice(&n_le);
    raw.extend_from_slice(&vec![0u8; 4 * words]);
    raw.extend_from_slice(&65537u32.to_le_bytes());

    let mut blob = BASE64.encode(raw).into_bytes();
    blob.push(0);
    blob.extend_from_slice(comment.as_bytes());
    blob
}

/// A fake local ADB server: accepts any number of connections, answers the
/// transport/service preamble with OKAY and then runs `body` per stream.
async fn fake_adb_server<F>(body: F) -> u16
where
    F: Fn(TcpStream, String) -> tokio::task::JoinHandle<()> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        loop {
            let (mut stream, _) = listener.accept().await.unwrap();
            let service = {
                let transport = read_frame(&mut stream).await;
                assert!(transport.starts_with("host:transport:"));
                stream.write_all(b"OKAY").await.unwrap();
                let service = read_frame(&mut stream).await;
                stream.write_all(b"OKAY").await.unwrap();
                service
            };
            body(stream, service);
        }
    });
    port
}

async fn read_frame(stream: &mut TcpStream) -> String {
    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix).await.unwrap();
    let length = usize::from_str_radix(std::str::from_utf8(&prefix).unwrap(), 16).unwrap();
    let mut body = vec![0u8; length];
    stream.read_exact(&mut body).await.unwrap();
    String::from_utf8(body).unwrap()
}

/// Starts a bridge backed by the given fake adb port, returns the peer
/// stream connected to it.
async fn start_bridge(adb_port: u16) -> PacketStream {
    let client = Client::new(
        ConnectionConfig::new()
            .with_port(adb_port)
            .with_bin("/bin/false"),
    );
    let config = BridgeServerConfig::new("127.0.0.1:0".parse().unwrap(), "emulator-5554");
    let server = BridgeServer::bind(config, client).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(async move { server.run().await.unwrap() });

    PacketStream::new(TcpStream::connect(addr).await.unwrap())
}

/// Runs the CNXN → AUTH dance and returns once the bridge is authorized.
async fn authenticate(peer: &mut PacketStream, key: &RsaPrivateKey, max_payload: u32) {
    peer.send(Command::Cnxn, 0x01000000, max_payload, b"host::")
        .await;

    let auth = peer.recv().await;
    assert_eq!(auth.command_kind(), Some(Command::Auth));
    assert_eq!(auth.arg0, AUTH_TOKEN);
    assert_eq!(auth.data.len(), TOKEN_LENGTH);

    let signature = key.sign(Pkcs1v15Sign::new::<Sha1>(), &auth.data).unwrap();
    peer.send(Command::Auth, AUTH_SIGNATURE, 0, &signature).await;

    // The bridge re-issues the token until it sees a public key.
    let reissued = peer.recv().await;
    assert_eq!(reissued.command_kind(), Some(Command::Auth));
    assert_eq!(reissued.arg0, AUTH_TOKEN);
    assert_eq!(&reissued.data[..], &auth.data[..]);

    let blob = adb_key_blob(&key.to_public_key(), "tester@host");
    peer.send(Command::Auth, AUTH_RSAPUBLICKEY, 0, &blob).await;

    let cnxn = peer.recv().await;
    assert_eq!(cnxn.command_kind(), Some(Command::Cnxn));
    assert_eq!(cnxn.arg0, 0x01000000);
    assert_eq!(cnxn.arg1, max_payload.min(0xFFFF));
    assert_eq!(&cnxn.data[..], b"device::");
}

fn test_key() -> RsaPrivateKey {
    RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap()
}

#[tokio::test]
async fn test_handshake_authorizes_trusted_key() {
    let adb_port = fake_adb_server(|_stream, _service| tokio::spawn(async {})).await;
    let mut peer = start_bridge(adb_port).await;
    authenticate(&mut peer, &test_key(), 0x1000).await;
}

#[tokio::test]
async fn test_open_before_auth_ends_socket() {
    let adb_port = fake_adb_server(|_stream, _service| tokio::spawn(async {})).await;
    let mut peer = start_bridge(adb_port).await;

    peer.send(Command::Cnxn, 0x01000000, 0x1000, b"host::").await;
    peer.recv().await; // token

    peer.send(Command::Open, 1, 0, b"shell:id\0").await;
    // The bridge tears the socket down.
    let mut buf = [0u8; 64];
    loop {
        match peer.stream.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
    }
}

#[tokio::test]
async fn test_sync_packet_echoed_with_rolling_token() {
    let adb_port = fake_adb_server(|_stream, _service| tokio::spawn(async {})).await;
    let mut peer = start_bridge(adb_port).await;

    peer.send(Command::Sync, 0, 0, b"").await;
    let first = peer.recv().await;
    assert_eq!(first.command_kind(), Some(Command::Sync));
    assert_eq!(first.arg0, 1);
    assert_eq!(first.arg1, 2);

    peer.send(Command::Sync, 0, 0, b"").await;
    let second = peer.recv().await;
    assert_eq!(second.arg1, 3);
}

#[tokio::test]
async fn test_stream_round_trip() {
    // Backing service emits "hi\n" and echoes nothing else.
    let adb_port = fake_adb_server(|mut stream, service| {
        tokio::spawn(async move {
            assert_eq!(service, "shell:echo hi");
            stream.write_all(b"hi\n").await.unwrap();
            // EOF towards the bridge.
            drop(stream);
        })
    })
    .await;

    let mut peer = start_bridge(adb_port).await;
    authenticate(&mut peer, &test_key(), 0x1000).await;

    peer.send(Command::Open, 17, 0, b"shell:echo hi\0").await;

    let okay = peer.recv().await;
    assert_eq!(okay.command_kind(), Some(Command::Okay));
    assert_eq!(okay.arg1, 17);
    let local_id = okay.arg0;
    assert_ne!(local_id, 0);

    let wrte = peer.recv().await;
    assert_eq!(wrte.command_kind(), Some(Command::Wrte));
    assert_eq!(wrte.arg0, local_id);
    assert_eq!(wrte.arg1, 17);
    assert_eq!(&wrte.data[..], b"hi\n");
    peer.send(Command::Okay, 17, local_id, b"").await;

    let clse = peer.recv().await;
    assert_eq!(clse.command_kind(), Some(Command::Clse));
    assert_eq!(clse.arg0, local_id);
    assert_eq!(clse.arg1, 17);
}

#[tokio::test]
async fn test_write_to_backing_is_acked() {
    // Backing service collects what the peer writes and echoes it back.
    let adb_port = fake_adb_server(|mut stream, _service| {
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let read = stream.read(&mut buf).await.unwrap();
            stream.write_all(&buf[..read]).await.unwrap();
        })
    })
    .await;

    let mut peer = start_bridge(adb_port).await;
    authenticate(&mut peer, &test_key(), 0x1000).await;

    peer.send(Command::Open, 5, 0, b"shell:cat\0").await;
    let okay = peer.recv().await;
    let local_id = okay.arg0;

    peer.send(Command::Wrte, 5, local_id, b"ping").await;

    // The WRTE is acked once the backing write completed, and the echo
    // comes back as the stream's own WRTE.
    let mut saw_ack = false;
    let mut saw_echo = false;
    while !(saw_ack && saw_echo) {
        let packet = peer.recv().await;
        match packet.command_kind() {
            Some(Command::Okay) => saw_ack = true,
            Some(Command::Wrte) => {
                assert_eq!(&packet.data[..], b"ping");
                peer.send(Command::Okay, 5, local_id, b"").await;
                saw_echo = true;
            }
            other => panic!("unexpected packet {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_credit_of_one_flow_control() {
    // Backing service floods 64 bytes immediately; with max_payload 16 the
    // bridge must emit them as acked 16-byte WRTEs, one in flight at most.
    let adb_port = fake_adb_server(|mut stream, _service| {
        tokio::spawn(async move {
            stream.write_all(&[0xAB; 64]).await.unwrap();
            // Stay open so EOF does not race the assertion window.
            tokio::time::sleep(Duration::from_secs(2)).await;
        })
    })
    .await;

    let mut peer = start_bridge(adb_port).await;
    authenticate(&mut peer, &test_key(), 16).await;

    peer.send(Command::Open, 9, 0, b"shell:flood\0").await;
    let okay = peer.recv().await;
    assert_eq!(okay.command_kind(), Some(Command::Okay));
    let local_id = okay.arg0;

    let mut received = 0usize;
    while received < 64 {
        let wrte = peer.recv().await;
        assert_eq!(wrte.command_kind(), Some(Command::Wrte));
        assert!(wrte.data.len() <= 16, "payload exceeds negotiated maximum");
        received += wrte.data.len();

        // No further WRTE may arrive before our OKAY.
        peer.expect_silence().await;
        peer.send(Command::Okay, 9, local_id, b"").await;
    }
    assert_eq!(received, 64);
}
