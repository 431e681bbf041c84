//! Package manager operations over `shell:pm ...`.

use super::escape_compat;
use crate::connection::Connection;
use crate::error::ClientError;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

fn install_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(Success|Failure \[(.*?)\])$").unwrap())
}

fn clear_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(Success|Failed)$").unwrap())
}

fn package_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^package:(.*?)\r?$").unwrap())
}

fn feature_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^feature:(.*?)(?:=(.*?))?\r?$").unwrap())
}

/// Installs an APK already present on the device.
///
/// `pm` ends its output with a `Success` or `Failure [CODE]` line; the
/// failure code is surfaced in [`ClientError::Install`].
pub async fn install(conn: &mut Connection, apk: &str) -> Result<(), ClientError> {
    conn.request(&format!("shell:pm install -r {}", escape_compat(apk)))
        .await?;
    let captures = conn.parser().search_line(install_re()).await?;
    if captures[1] == "Success" {
        Ok(())
    } else {
        Err(ClientError::Install {
            apk: apk.to_string(),
            code: captures[2].clone(),
        })
    }
}

/// Options for [`uninstall`].
#[derive(Debug, Clone, Default)]
pub struct UninstallOptions {
    /// Keep the data and cache directories (`-k`).
    pub keep_data: bool,
    /// Uninstall for a specific user (`--user N`).
    pub user: Option<u32>,
}

/// Uninstalls a package.
///
/// `Success`, `Failure` and `Unknown package` all leave the device without
/// the package, so all three count as success.
pub async fn uninstall(
    conn: &mut Connection,
    pkg: &str,
    options: &UninstallOptions,
) -> Result<(), ClientError> {
    let mut cmd = String::from("shell:pm uninstall");
    if options.keep_data {
        cmd.push_str(" -k");
    }
    if let Some(user) = options.user {
        cmd.push_str(&format!(" --user {user}"));
    }
    cmd.push(' ');
    cmd.push_str(pkg);

    conn.request(&cmd).await?;
    let output = conn.parser().read_all().await?;
    let text = String::from_utf8_lossy(&output);
    let text = text.trim();
    if text == "Success" || text.contains("Failure") || text.contains("Unknown package") {
        Ok(())
    } else {
        Err(ClientError::unexpected(
            text,
            "Success, Failure or Unknown package",
        ))
    }
}

/// Clears a package's data via `pm clear`.
pub async fn clear(conn: &mut Connection, pkg: &str) -> Result<(), ClientError> {
    conn.request(&format!("shell:pm clear {pkg}")).await?;
    let captures = conn.parser().search_line(clear_re()).await?;
    if captures[1] == "Success" {
        Ok(())
    } else {
        Err(ClientError::Fail {
            message: format!("package '{pkg}' could not be cleared"),
        })
    }
}

/// Checks whether a package is installed: `pm path` prints `package:<apk>`
/// for installed packages and nothing otherwise.
pub async fn is_installed(conn: &mut Connection, pkg: &str) -> Result<bool, ClientError> {
    conn.request(&format!("shell:pm path {pkg} 2>/dev/null"))
        .await?;
    match conn.parser().read_bytes(8).await {
        Ok(prefix) if &prefix[..] == b"package:" => Ok(true),
        Ok(prefix) => Err(ClientError::unexpected(&prefix, "'package:'")),
        Err(ClientError::PrematureEof { .. }) => Ok(false),
        Err(err) => Err(err),
    }
}

/// Lists installed package names.
pub async fn list_packages(conn: &mut Connection) -> Result<Vec<String>, ClientError> {
    conn.request("shell:pm list packages 2>/dev/null").await?;
    let output = conn.parser().read_all().await?;
    let text = String::from_utf8_lossy(&output);

    let mut packages = Vec::new();
    for line in text.lines() {
        if let Some(captures) = package_re().captures(line.trim()) {
            let name = captures[1].trim();
            if !name.is_empty() {
                packages.push(name.to_string());
            }
        }
    }
    Ok(packages)
}

/// A device feature: either just present, or carrying a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Feature {
    Present,
    Value(String),
}

/// Lists device features from `pm list features`.
pub async fn list_features(conn: &mut Connection) -> Result<HashMap<String, Feature>, ClientError> {
    conn.request("shell:pm list features 2>/dev/null").await?;
    let output = conn.parser().read_all().await?;
    let text = String::from_utf8_lossy(&output);

    let mut features = HashMap::new();
    for line in text.lines() {
        if let Some(captures) = feature_re().captures(line) {
            let value = match captures.get(2) {
                Some(v) if !v.as_str().is_empty() => Feature::Value(v.as_str().to_string()),
                _ => Feature::Present,
            };
            features.insert(captures[1].to_string(), value);
        }
    }
    Ok(features)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_re_captures_failure_code() {
        let captures = install_re().captures("Failure [INSTALL_FAILED_OLDER_SDK]").unwrap();
        assert_eq!(&captures[2], "INSTALL_FAILED_OLDER_SDK");
        assert!(install_re().is_match("Success"));
        assert!(!install_re().is_match("  Success  "));
    }

    #[test]
    fn test_package_re() {
        let captures = package_re().captures("package:com.example.app").unwrap();
        assert_eq!(&captures[1], "com.example.app");
    }

    #[test]
    fn test_feature_re_bare_and_valued() {
        let bare = feature_re().captures("feature:android.hardware.camera").unwrap();
        assert_eq!(&bare[1], "android.hardware.camera");
        assert!(bare.get(2).is_none() || bare[2].is_empty());

        let valued = feature_re()
            .captures("feature:reqGlEsVersion=0x30002")
            .unwrap();
        assert_eq!(&valued[1], "reqGlEsVersion");
        assert_eq!(&valued[2], "0x30002");
    }
}
