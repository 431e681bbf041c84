//! Activity manager operations: `am start` and `am startservice`.

use super::escape;
use crate::connection::Connection;
use crate::error::ClientError;

/// A typed intent extra. The type selects the `am` flag used on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtraValue {
    Text(String),
    Bool(bool),
    Int(i32),
    Long(i64),
    Float(f32),
    Null,
}

/// One intent extra.
#[derive(Debug, Clone, PartialEq)]
pub struct Extra {
    pub key: String,
    pub value: ExtraValue,
}

impl Extra {
    pub fn new(key: impl Into<String>, value: ExtraValue) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Intent description for [`start_activity`] and [`start_service`].
#[derive(Debug, Clone, Default)]
pub struct IntentOptions {
    pub extras: Vec<Extra>,
    pub action: Option<String>,
    pub data: Option<String>,
    pub mime_type: Option<String>,
    pub categories: Vec<String>,
    pub component: Option<String>,
    pub flags: Option<u32>,
    pub debug: bool,
    pub wait: bool,
    pub user: Option<u32>,
}

/// Renders intent options into `am` arguments, in a fixed order so the
/// resulting command line is reproducible.
pub fn intent_args(options: &IntentOptions) -> Vec<String> {
    let mut args = Vec::new();

    for extra in &options.extras {
        let key = escape(&extra.key);
        match &extra.value {
            ExtraValue::Text(v) => {
                args.extend(["--es".into(), key, escape(v)]);
            }
            ExtraValue::Bool(v) => {
                args.extend(["--ez".into(), key, v.to_string()]);
            }
            ExtraValue::Int(v) => {
                args.extend(["--ei".into(), key, v.to_string()]);
            }
            ExtraValue::Long(v) => {
                args.extend(["--el".into(), key, v.to_string()]);
            }
            ExtraValue::Float(v) => {
                args.extend(["--ef".into(), key, v.to_string()]);
            }
            ExtraValue::Null => {
                args.extend(["--esn".into(), key]);
            }
        }
    }
    if let Some(action) = &options.action {
        args.extend(["-a".into(), escape(action)]);
    }
    if let Some(data) = &options.data {
        args.extend(["-d".into(), escape(data)]);
    }
    if let Some(mime_type) = &options.mime_type {
        args.extend(["-t".into(), escape(mime_type)]);
    }
    for category in &options.categories {
        args.extend(["-c".into(), escape(category)]);
    }
    if let Some(component) = &options.component {
        args.extend(["-n".into(), escape(component)]);
    }
    if let Some(flags) = options.flags {
        args.extend(["-f".into(), flags.to_string()]);
    }
    if options.debug {
        args.push("-D".into());
    }
    if options.wait {
        args.push("-W".into());
    }
    if let Some(user) = options.user {
        args.extend(["--user".into(), user.to_string()]);
    }
    args
}

async fn run_am(
    conn: &mut Connection,
    verb: &str,
    options: &IntentOptions,
) -> Result<(), ClientError> {
    let args = intent_args(options).join(" ");
    conn.request(&format!("shell:am {verb} {args}")).await?;

    let output = conn.parser().read_all().await?;
    let text = String::from_utf8_lossy(&output);
    if text.contains("Error:") {
        Err(ClientError::Fail {
            message: text.trim().to_string(),
        })
    } else {
        Ok(())
    }
}

/// `am start`: launches an activity.
pub async fn start_activity(
    conn: &mut Connection,
    options: &IntentOptions,
) -> Result<(), ClientError> {
    run_am(conn, "start", options).await
}

/// `am startservice`: starts a service.
pub async fn start_service(
    conn: &mut Connection,
    options: &IntentOptions,
) -> Result<(), ClientError> {
    run_am(conn, "startservice", options).await
}
