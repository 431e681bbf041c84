//! Raw traffic dump facility.
//!
//! When the `ADBKIT_DUMP` environment variable is non-empty, every raw byte
//! read from or written to an ADB socket is appended to `adbkit.dump` in the
//! current directory. Off by default; the file handle is process-wide and
//! mutex-guarded.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::{Mutex, OnceLock};

static DUMP: OnceLock<Option<Mutex<File>>> = OnceLock::new();

fn dump_file() -> &'static Option<Mutex<File>> {
    DUMP.get_or_init(|| {
        if std::env::var("ADBKIT_DUMP").map(|v| v.is_empty()).unwrap_or(true) {
            return None;
        }
        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o644);
        }
        match options.open("adbkit.dump") {
            Ok(file) => Some(Mutex::new(file)),
            Err(err) => {
                tracing::warn!("ADBKIT_DUMP set but adbkit.dump could not be opened: {err}");
                None
            }
        }
    })
}

/// Returns whether dumping is enabled for this process.
pub fn enabled() -> bool {
    dump_file().is_some()
}

/// Appends raw socket bytes to the dump file, if enabled.
pub fn record(data: &[u8]) {
    if let Some(file) = dump_file() {
        if let Ok(mut file) = file.lock() {
            let _ = file.write_all(data);
        }
    }
}
