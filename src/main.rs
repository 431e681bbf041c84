//! adbr - TCP bridge daemon.
//!
//! Exposes one locally connected Android device to remote ADB clients by
//! re-implementing the device-side wire protocol on a TCP listener.

use adbr_bridge::{BridgeServer, BridgeServerConfig};
use adbr_client::{Client, ConnectionConfig};
use clap::Parser;
use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "adbr")]
#[command(about = "Expose a local ADB device to remote ADB clients over TCP")]
#[command(version)]
struct Args {
    /// Serial of the device to expose
    serial: String,

    /// Address to listen on
    #[arg(short, long, default_value = "127.0.0.1:6037")]
    listen: SocketAddr,

    /// Port of the local ADB server
    #[arg(short, long, default_value_t = adbr_protocol::DEFAULT_PORT)]
    port: u16,

    /// Path of the adb binary used to start the server on demand
    #[arg(long, default_value = "adb", env = "ADB")]
    bin: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let config = ConnectionConfig::new()
        .with_port(args.port)
        .with_bin(args.bin);
    let client = Client::new(config);

    // Fail early if the local server is unreachable rather than on the
    // first proxied stream.
    match client.devices().await {
        Ok(devices) if devices.iter().any(|d| d.serial == args.serial) => {}
        Ok(_) => tracing::warn!(
            "device {} is not currently listed; continuing anyway",
            args.serial
        ),
        Err(err) => {
            tracing::error!("could not reach the local ADB server: {err}");
            return Err(err.into());
        }
    }

    let server =
        BridgeServer::bind(BridgeServerConfig::new(args.listen, args.serial), client).await?;
    server.run().await?;
    Ok(())
}
