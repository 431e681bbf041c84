//! One module per group of ADB services.
//!
//! Every command follows the same contract: write a length-prefixed service
//! string, read the 4-byte `OKAY`/`FAIL` status (handled by
//! [`Connection::request`](crate::Connection)), then decode whatever the
//! service emits afterwards.

pub mod am;
pub mod host;
pub mod host_serial;
pub mod jdwp;
pub mod pm;
pub mod reverse;
pub mod shell;
pub mod streams;
pub mod system;

/// Shell-safe quoting: wrap in single quotes, escaping embedded ones.
pub fn escape(arg: &str) -> String {
    format!("'{}'", arg.replace('\'', r#"'"'"'"#))
}

/// Backslash escaping for shells that mangle quoted arguments
/// (used for the `pm install` path).
pub fn escape_compat(arg: &str) -> String {
    let mut out = String::with_capacity(arg.len());
    for c in arg.chars() {
        if matches!(
            c,
            ' ' | '(' | ')' | '[' | ']' | '&' | '|' | ';' | '<' | '>' | '$' | '`' | '"' | '\''
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
