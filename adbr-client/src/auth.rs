//! ADB RSA public key handling.
//!
//! ADB public keys are a base64-encoded binary struct, little-endian:
//! `len:u32` (modulus words), `n0inv:u32`, `n[len]:u32` (least-significant
//! word first), `rr[len]:u32`, `e:u32`. The struct is followed by a comment,
//! either after a NUL byte (wire form) or after whitespace (key-file form).
//! The MD5 of the raw struct is the key's fingerprint.

use crate::error::ClientError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use md5::{Digest, Md5};
use rsa::pkcs1::{EncodeRsaPublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Pkcs1v15Sign, RsaPublicKey};
use sha1::Sha1;

/// A parsed ADB public key with its identifying metadata.
#[derive(Debug, Clone)]
pub struct PublicKey {
    pub key: RsaPublicKey,
    /// Lowercase hex MD5 of the raw binary struct.
    pub fingerprint: String,
    /// Comment attached to the key, often `user@host`. Empty if absent.
    pub comment: String,
}

/// Parses an ADB public key, in wire form or key-file form.
pub fn parse_public_key(data: &[u8]) -> Result<PublicKey, ClientError> {
    if data.is_empty() {
        return Err(ClientError::InvalidPublicKey("empty input".into()));
    }

    // Wire form terminates the base64 part with NUL, key files with
    // whitespace before the comment.
    let (head, mut comment) = match data.iter().position(|&b| b == 0) {
        Some(nul) => (&data[..nul], text(&data[nul + 1..])),
        None => (data, String::new()),
    };
    let head = text(head);
    let mut parts = head.split_whitespace();
    let encoded = parts
        .next()
        .ok_or_else(|| ClientError::InvalidPublicKey("missing key material".into()))?;
    if comment.is_empty() {
        comment = parts.collect::<Vec<_>>().join(" ");
    }

    let raw = BASE64
        .decode(encoded)
        .map_err(|err| ClientError::InvalidPublicKey(format!("bad base64: {err}")))?;
    decode_struct(&raw, comment)
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

fn decode_struct(raw: &[u8], comment: String) -> Result<PublicKey, ClientError> {
    if raw.len() < 4 {
        return Err(ClientError::InvalidPublicKey("truncated struct".into()));
    }
    let words = u32::from_le_bytes(raw[0..4].try_into().unwrap()) as usize;
    let expected = 4 + 4 + 4 * words + 4 * words + 4;
    if raw.len() != expected {
        return Err(ClientError::InvalidPublicKey(format!(
            "struct is {} bytes, expected {expected}",
            raw.len()
        )));
    }

    // Skip n0inv; the modulus words are little-endian, least-significant
    // first, so the byte-reversed run is the big-endian modulus.
    let n_start = 8;
    let n_end = n_start + 4 * words;
    let mut modulus = raw[n_start..n_end].to_vec();
    modulus.reverse();

    let exponent = u32::from_le_bytes(raw[expected - 4..].try_into().unwrap());
    if exponent != 3 && exponent != 65537 {
        return Err(ClientError::InvalidPublicKey(format!(
            "exponent {exponent}, only 3 and 65537 are supported"
        )));
    }

    let key = RsaPublicKey::new(
        BigUint::from_bytes_be(&modulus),
        BigUint::from(exponent),
    )
    .map_err(|err| ClientError::InvalidPublicKey(err.to_string()))?;

    let fingerprint = format!("{:x}", Md5::digest(raw));

    Ok(PublicKey {
        key,
        fingerprint,
        comment,
    })
}

/// Verifies an AUTH signature over the 20-byte token.
///
/// ADB clients sign the raw token as if it were a SHA-1 digest, with
/// PKCS#1 v1.5 padding.
pub fn verify_token(key: &RsaPublicKey, token: &[u8], signature: &[u8]) -> bool {
    key.verify(Pkcs1v15Sign::new::<Sha1>(), token, signature)
        .is_ok()
}

/// Exports a key as PKCS#1 `RSA PUBLIC KEY` PEM.
pub fn to_pem(key: &RsaPublicKey) -> Result<String, ClientError> {
    key.to_pkcs1_pem(LineEnding::LF)
        .map_err(|err| ClientError::InvalidPublicKey(err.to_string()))
}

/// Exports a key in OpenSSH `authorized_keys` form.
pub fn to_openssh(key: &RsaPublicKey, comment: &str) -> String {
    let mut blob = Vec::new();
    put_ssh_string(&mut blob, b"ssh-rsa");
    put_ssh_mpint(&mut blob, &key.e().to_bytes_be());
    put_ssh_mpint(&mut blob, &key.n().to_bytes_be());
    format!("ssh-rsa {} {}", BASE64.encode(&blob), comment)
}

fn put_ssh_string(out: &mut Vec<u8>, data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(data);
}

fn put_ssh_mpint(out: &mut Vec<u8>, be: &[u8]) {
    // mpints are signed; a leading zero keeps the value positive.
    if be.first().map(|&b| b & 0x80 != 0).unwrap_or(false) {
        out.extend_from_slice(&((be.len() + 1) as u32).to_be_bytes());
        out.push(0);
    } else {
        out.extend_from_slice(&(be.len() as u32).to_be_bytes());
    }
    out.extend_from_slice(be);
}
