//! TCP listener for the bridge.

use crate::error::BridgeError;
use crate::socket;
use adbr_client::Client;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// Decides whether a client public key may use the bridge.
/// Receives the key's fingerprint and comment.
pub type TrustHook = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct BridgeServerConfig {
    /// Address to listen on.
    pub bind_addr: SocketAddr,
    /// Serial of the device being exposed.
    pub serial: String,
}

impl BridgeServerConfig {
    pub fn new(bind_addr: SocketAddr, serial: impl Into<String>) -> Self {
        Self {
            bind_addr,
            serial: serial.into(),
        }
    }
}

/// TCP server exposing one device to remote ADB clients.
pub struct BridgeServer {
    config: BridgeServerConfig,
    client: Client,
    trust: TrustHook,
    listener: TcpListener,
    shutdown: broadcast::Sender<()>,
    running: AtomicBool,
}

impl BridgeServer {
    /// Binds the listener. By default every key that presents a valid
    /// signature is accepted after being logged; install a custom
    /// [`TrustHook`] to restrict access.
    pub async fn bind(config: BridgeServerConfig, client: Client) -> Result<Self, BridgeError> {
        let listener = TcpListener::bind(config.bind_addr).await?;
        let (shutdown, _) = broadcast::channel(1);
        Ok(Self {
            config,
            client,
            trust: Arc::new(|fingerprint, comment| {
                tracing::info!("accepting key {fingerprint} ({comment})");
                true
            }),
            listener,
            shutdown,
            running: AtomicBool::new(false),
        })
    }

    pub fn with_trust_hook(mut self, hook: TrustHook) -> Self {
        self.trust = hook;
        self
    }

    /// The bound address, useful with port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, BridgeError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accepts clients until [`shutdown`](Self::shutdown) is called.
    pub async fn run(&self) -> Result<(), BridgeError> {
        self.running.store(true, Ordering::SeqCst);
        tracing::info!(
            "bridge for {} listening on {}",
            self.config.serial,
            self.local_addr()?
        );

        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            tracing::info!("client connected: {addr}");
                            let client = self.client.clone();
                            let serial = self.config.serial.clone();
                            let trust = self.trust.clone();
                            tokio::spawn(async move {
                                match socket::run(stream, client, serial, trust).await {
                                    Ok(()) => tracing::info!("client disconnected: {addr}"),
                                    Err(err) => {
                                        tracing::warn!("client {addr} ended with error: {err}")
                                    }
                                }
                            });
                        }
                        Err(err) => tracing::error!("accept error: {err}"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("bridge shutting down");
                    break;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// Initiates shutdown of the accept loop.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}
