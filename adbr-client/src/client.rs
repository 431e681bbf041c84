//! High-level client API.
//!
//! A [`Client`] opens a fresh [`Connection`] per request, which is how the
//! smart-socket protocol expects to be used: one-shot queries close their
//! connection, stream services hand it to a long-lived reader.

use crate::commands::am::IntentOptions;
use crate::commands::host_serial::Forward;
use crate::commands::jdwp::JdwpTracker;
use crate::commands::pm::{Feature, UninstallOptions};
use crate::commands::reverse::Reverse;
use crate::commands::streams::{LogcatOptions, TransformedStream};
use crate::commands::system::RebootMode;
use crate::commands::{am, host, host_serial, pm, reverse, shell, streams, system};
use crate::connection::{Connection, ConnectionConfig};
use crate::error::ClientError;
use crate::framebuffer::{self, FramebufferMeta};
use crate::proc_stat::ProcStatTracker;
use crate::sync::{self, Stats, Sync, Transfer};
use crate::tracker::{Device, DeviceTracker};
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};

/// Client for the local ADB server.
#[derive(Debug, Clone, Default)]
pub struct Client {
    config: ConnectionConfig,
}

impl Client {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Opens a fresh connection to the server.
    pub async fn open(&self) -> Result<Connection, ClientError> {
        Connection::connect(&self.config).await
    }

    /// The server's protocol version.
    pub async fn version(&self) -> Result<u32, ClientError> {
        let mut conn = self.open().await?;
        let version = host::version(&mut conn).await?;
        conn.close().await;
        Ok(version)
    }

    /// Asks the server to exit.
    pub async fn kill(&self) -> Result<(), ClientError> {
        let mut conn = self.open().await?;
        host::kill(&mut conn).await
    }

    /// Lists connected devices.
    pub async fn devices(&self) -> Result<Vec<Device>, ClientError> {
        let mut conn = self.open().await?;
        let devices = host::devices(&mut conn).await?;
        conn.close().await;
        Ok(devices)
    }

    /// Lists connected devices with their device paths.
    pub async fn devices_with_paths(&self) -> Result<Vec<Device>, ClientError> {
        let mut conn = self.open().await?;
        let devices = host::devices_with_paths(&mut conn).await?;
        conn.close().await;
        Ok(devices)
    }

    /// Starts tracking device list changes.
    pub async fn track_devices(&self) -> Result<DeviceTracker, ClientError> {
        let mut conn = self.open().await?;
        host::track_devices(&mut conn).await?;
        Ok(DeviceTracker::spawn(conn))
    }

    /// Attaches a TCP device (`adb connect`).
    pub async fn connect_device(&self, host: &str, port: u16) -> Result<String, ClientError> {
        let mut conn = self.open().await?;
        let id = host::connect(&mut conn, host, port).await?;
        conn.close().await;
        Ok(id)
    }

    /// Detaches a TCP device (`adb disconnect`).
    pub async fn disconnect_device(&self, host: &str, port: u16) -> Result<String, ClientError> {
        let mut conn = self.open().await?;
        let id = host::disconnect(&mut conn, host, port).await?;
        conn.close().await;
        Ok(id)
    }

    /// A handle for device-scoped operations.
    pub fn device(&self, serial: &str) -> DeviceClient {
        DeviceClient {
            config: self.config.clone(),
            serial: serial.to_string(),
        }
    }

    /// Opens a connection bound to a device transport.
    pub async fn transport(&self, serial: &str) -> Result<Connection, ClientError> {
        let mut conn = self.open().await?;
        host::transport(&mut conn, serial).await?;
        Ok(conn)
    }

    /// Opens a device service and returns the raw connection once the
    /// service has been acknowledged. Used by the TCP bridge to back its
    /// multiplexed streams.
    pub async fn open_stream(
        &self,
        serial: &str,
        service: &str,
    ) -> Result<Connection, ClientError> {
        let mut conn = self.transport(serial).await?;
        conn.request(service).await?;
        Ok(conn)
    }
}

/// Operations against one device, addressed by serial.
#[derive(Debug, Clone)]
pub struct DeviceClient {
    config: ConnectionConfig,
    serial: String,
}

impl DeviceClient {
    pub fn serial(&self) -> &str {
        &self.serial
    }

    async fn open(&self) -> Result<Connection, ClientError> {
        Connection::connect(&self.config).await
    }

    /// Opens a connection bound to this device's transport.
    pub async fn transport(&self) -> Result<Connection, ClientError> {
        let mut conn = self.open().await?;
        host::transport(&mut conn, &self.serial).await?;
        Ok(conn)
    }

    // ------------------------------------------------------------------
    // host-serial services
    // ------------------------------------------------------------------

    /// Forwards a local socket to a remote one (`adb forward`).
    pub async fn forward(&self, local: &str, remote: &str) -> Result<(), ClientError> {
        let mut conn = self.open().await?;
        host_serial::forward(&mut conn, &self.serial, local, remote).await?;
        conn.close().await;
        Ok(())
    }

    /// Lists this device's forward table.
    pub async fn list_forwards(&self) -> Result<Vec<Forward>, ClientError> {
        let mut conn = self.open().await?;
        let forwards = host_serial::list_forwards(&mut conn, &self.serial).await?;
        conn.close().await;
        Ok(forwards)
    }

    /// Blocks until the device is usable.
    pub async fn wait_for_device(&self) -> Result<(), ClientError> {
        let mut conn = self.open().await?;
        host_serial::wait_for_device(&mut conn, &self.serial).await?;
        conn.close().await;
        Ok(())
    }

    pub async fn get_device_path(&self) -> Result<String, ClientError> {
        let mut conn = self.open().await?;
        let path = host_serial::get_device_path(&mut conn, &self.serial).await?;
        conn.close().await;
        Ok(path)
    }

    pub async fn get_serial_no(&self) -> Result<String, ClientError> {
        let mut conn = self.open().await?;
        let serial = host_serial::get_serial_no(&mut conn, &self.serial).await?;
        conn.close().await;
        Ok(serial)
    }

    // ------------------------------------------------------------------
    // shell
    // ------------------------------------------------------------------

    /// Runs a shell command; read stdout off the returned connection.
    pub async fn shell(&self, cmd: &str) -> Result<Connection, ClientError> {
        shell::shell(self.transport().await?, cmd).await
    }

    /// Runs a shell command from pre-tokenized, individually quoted args.
    pub async fn shell_args(&self, args: &[&str]) -> Result<Connection, ClientError> {
        shell::shell_args(self.transport().await?, args).await
    }

    /// Runs a shell command and collects its entire output.
    pub async fn shell_output(&self, cmd: &str) -> Result<Bytes, ClientError> {
        shell::shell_output(self.transport().await?, cmd).await
    }

    // ------------------------------------------------------------------
    // SYNC
    // ------------------------------------------------------------------

    /// Enters the SYNC sub-protocol.
    pub async fn sync(&self) -> Result<Sync, ClientError> {
        let mut conn = self.transport().await?;
        conn.request("sync:").await?;
        Ok(Sync::new(conn))
    }

    /// Stats a remote path.
    pub async fn stat(&self, path: &str) -> Result<Stats, ClientError> {
        let mut sync = self.sync().await?;
        let stats = sync.stat(path).await?;
        sync.end().await;
        Ok(stats)
    }

    /// Lists a remote directory.
    pub async fn list_dir(&self, path: &str) -> Result<Vec<sync::Entry>, ClientError> {
        let mut sync = self.sync().await?;
        let entries = sync.list(path).await?;
        sync.end().await;
        Ok(entries)
    }

    /// Pushes a byte stream to the device.
    pub async fn push<R>(&self, src: R, dest: &str, mode: u32) -> Result<Transfer, ClientError>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        Ok(self.sync().await?.push(src, dest, mode))
    }

    /// Pushes a local file to the device.
    pub async fn push_file(
        &self,
        local: &str,
        dest: &str,
        mode: u32,
    ) -> Result<Transfer, ClientError> {
        let file = tokio::fs::File::open(local).await?;
        self.push(file, dest, mode).await
    }

    /// Pulls a remote path into `sink`.
    pub async fn pull<W>(&self, path: &str, sink: W) -> Result<Transfer, ClientError>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Ok(self.sync().await?.pull(path, sink))
    }

    /// Pulls a remote path into a local file.
    pub async fn pull_file(&self, path: &str, local: &str) -> Result<Transfer, ClientError> {
        let file = tokio::fs::File::create(local).await?;
        self.pull(path, file).await
    }

    // ------------------------------------------------------------------
    // package management
    // ------------------------------------------------------------------

    /// Installs an APK already on the device.
    pub async fn install(&self, apk: &str) -> Result<(), ClientError> {
        let mut conn = self.transport().await?;
        pm::install(&mut conn, apk).await
    }

    /// Pushes a local APK to the device temp dir, installs it, and cleans
    /// the temporary up (best effort).
    pub async fn install_local(&self, local: &str) -> Result<(), ClientError> {
        let temp = sync::temp_file(local);
        self.push_file(local, &temp, sync::DEFAULT_CHMOD)
            .await?
            .wait()
            .await?;
        let result = self.install(&temp).await;
        if let Ok(mut conn) = self.shell(&format!("rm -f {}", crate::commands::escape(&temp))).await
        {
            let _ = conn.parser().read_all().await;
            conn.close().await;
        }
        result
    }

    /// Uninstalls a package.
    pub async fn uninstall(
        &self,
        pkg: &str,
        options: &UninstallOptions,
    ) -> Result<(), ClientError> {
        let mut conn = self.transport().await?;
        pm::uninstall(&mut conn, pkg, options).await
    }

    /// Clears a package's data.
    pub async fn clear(&self, pkg: &str) -> Result<(), ClientError> {
        let mut conn = self.transport().await?;
        pm::clear(&mut conn, pkg).await
    }

    /// Whether a package is installed.
    pub async fn is_installed(&self, pkg: &str) -> Result<bool, ClientError> {
        let mut conn = self.transport().await?;
        pm::is_installed(&mut conn, pkg).await
    }

    /// Installed package names.
    pub async fn list_packages(&self) -> Result<Vec<String>, ClientError> {
        let mut conn = self.transport().await?;
        pm::list_packages(&mut conn).await
    }

    /// Device features.
    pub async fn list_features(&self) -> Result<HashMap<String, Feature>, ClientError> {
        let mut conn = self.transport().await?;
        pm::list_features(&mut conn).await
    }

    /// All system properties.
    pub async fn get_properties(&self) -> Result<HashMap<String, String>, ClientError> {
        let mut conn = self.transport().await?;
        system::get_properties(&mut conn).await
    }

    // ------------------------------------------------------------------
    // activity manager
    // ------------------------------------------------------------------

    /// Launches an activity.
    pub async fn start_activity(&self, options: &IntentOptions) -> Result<(), ClientError> {
        let mut conn = self.transport().await?;
        am::start_activity(&mut conn, options).await
    }

    /// Starts a service.
    pub async fn start_service(&self, options: &IntentOptions) -> Result<(), ClientError> {
        let mut conn = self.transport().await?;
        am::start_service(&mut conn, options).await
    }

    /// Starts a service with a deadline.
    pub async fn start_service_timeout(
        &self,
        options: &IntentOptions,
        timeout: Duration,
    ) -> Result<(), ClientError> {
        tokio::time::timeout(timeout, self.start_service(options))
            .await
            .map_err(|_| ClientError::Timeout { op: "start-service" })?
    }

    /// Retries [`start_service`](Self::start_service) up to `retries`
    /// times, sleeping `delay` between attempts.
    pub async fn start_service_with_retry(
        &self,
        options: &IntentOptions,
        retries: u32,
        delay: Duration,
    ) -> Result<(), ClientError> {
        let mut last = None;
        for attempt in 0..retries.max(1) {
            match self.start_service(options).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::debug!("start-service attempt {} failed: {err}", attempt + 1);
                    last = Some(err);
                }
            }
            if attempt + 1 < retries {
                tokio::time::sleep(delay).await;
            }
        }
        Err(last.unwrap_or(ClientError::Timeout { op: "start-service" }))
    }

    // ------------------------------------------------------------------
    // device mode and state
    // ------------------------------------------------------------------

    /// Reboots the device.
    pub async fn reboot(&self, mode: RebootMode) -> Result<(), ClientError> {
        let mut conn = self.transport().await?;
        system::reboot(&mut conn, mode).await
    }

    /// Remounts system partitions read-write.
    pub async fn remount(&self) -> Result<(), ClientError> {
        let mut conn = self.transport().await?;
        system::remount(&mut conn).await
    }

    /// Remounts with a deadline.
    pub async fn remount_timeout(&self, timeout: Duration) -> Result<(), ClientError> {
        tokio::time::timeout(timeout, self.remount())
            .await
            .map_err(|_| ClientError::Timeout { op: "remount" })?
    }

    /// Retries [`remount`](Self::remount), for devices whose adbd needs a
    /// moment after restarting.
    pub async fn remount_with_retry(
        &self,
        retries: u32,
        delay: Duration,
    ) -> Result<(), ClientError> {
        let mut last = None;
        for attempt in 0..retries.max(1) {
            match self.remount().await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::debug!("remount attempt {} failed: {err}", attempt + 1);
                    last = Some(err);
                }
            }
            if attempt + 1 < retries {
                tokio::time::sleep(delay).await;
            }
        }
        Err(last.unwrap_or(ClientError::Timeout { op: "remount" }))
    }

    /// Restarts adbd as root.
    pub async fn root(&self) -> Result<(), ClientError> {
        let mut conn = self.transport().await?;
        system::root(&mut conn).await
    }

    /// Restarts adbd as root, with a deadline.
    pub async fn root_timeout(&self, timeout: Duration) -> Result<(), ClientError> {
        tokio::time::timeout(timeout, self.root())
            .await
            .map_err(|_| ClientError::Timeout { op: "root" })?
    }

    /// Switches the device to TCP listening mode.
    pub async fn tcpip(&self, port: u16) -> Result<u16, ClientError> {
        let mut conn = self.transport().await?;
        system::tcpip(&mut conn, port).await
    }

    /// Switches the device back to USB mode.
    pub async fn usb(&self) -> Result<(), ClientError> {
        let mut conn = self.transport().await?;
        system::usb(&mut conn).await
    }

    /// Waits until the device reports boot completion.
    pub async fn wait_boot_complete(&self) -> Result<(), ClientError> {
        let mut conn = self.transport().await?;
        system::wait_boot_complete(&mut conn).await
    }

    /// Waits for boot completion with a deadline.
    pub async fn wait_boot_complete_timeout(&self, timeout: Duration) -> Result<(), ClientError> {
        tokio::time::timeout(timeout, self.wait_boot_complete())
            .await
            .map_err(|_| ClientError::Timeout {
                op: "wait-for-boot-complete",
            })?
    }

    // ------------------------------------------------------------------
    // streams
    // ------------------------------------------------------------------

    /// Grabs the framebuffer; raw pixels follow on the returned connection.
    pub async fn framebuffer(&self) -> Result<(FramebufferMeta, Connection), ClientError> {
        let mut conn = self.transport().await?;
        conn.request("framebuffer:").await?;
        let header = conn.parser().read_bytes(framebuffer::HEADER_SIZE).await?;
        let meta = framebuffer::parse_header(&header)?;
        Ok((meta, conn))
    }

    /// Opens one of the device's binary log streams.
    pub async fn open_log(&self, name: &str) -> Result<Connection, ClientError> {
        streams::open_log(self.transport().await?, name).await
    }

    /// Opens a binary logcat stream.
    pub async fn open_logcat(
        &self,
        options: LogcatOptions,
    ) -> Result<TransformedStream, ClientError> {
        streams::logcat(self.transport().await?, options).await
    }

    /// Takes a PNG screenshot.
    pub async fn screencap(&self) -> Result<TransformedStream, ClientError> {
        streams::screencap(self.transport().await?).await
    }

    /// Opens a raw TCP stream to a port on the device.
    pub async fn open_tcp(
        &self,
        port: u16,
        host: Option<&str>,
    ) -> Result<Connection, ClientError> {
        streams::open_tcp(self.transport().await?, port, host).await
    }

    /// Opens a stream to a Unix domain socket on the device.
    pub async fn open_local(&self, path: &str) -> Result<Connection, ClientError> {
        streams::open_local(self.transport().await?, path).await
    }

    /// Starts monkey in TCP mode on the device and connects to it.
    pub async fn open_monkey(&self, port: u16) -> Result<Connection, ClientError> {
        streams::monkey(self.transport().await?, port).await
    }

    // ------------------------------------------------------------------
    // trackers and reverses
    // ------------------------------------------------------------------

    /// Tracks debuggable (JDWP) processes.
    pub async fn track_jdwp(&self) -> Result<JdwpTracker, ClientError> {
        JdwpTracker::start(self.transport().await?).await
    }

    /// Samples `/proc/stat` CPU loads at `interval`.
    pub fn track_proc_stat(&self, interval: Duration) -> ProcStatTracker {
        ProcStatTracker::spawn(self.clone(), interval)
    }

    /// Sets up a reverse forward (device → host).
    pub async fn reverse(&self, remote: &str, local: &str) -> Result<(), ClientError> {
        let mut conn = self.transport().await?;
        reverse::forward(&mut conn, remote, local).await?;
        conn.close().await;
        Ok(())
    }

    /// Lists reverse forwards.
    pub async fn list_reverses(&self) -> Result<Vec<Reverse>, ClientError> {
        let mut conn = self.transport().await?;
        let reverses = reverse::list_forwards(&mut conn).await?;
        conn.close().await;
        Ok(reverses)
    }
}
