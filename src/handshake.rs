// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The greeting parse and CHAP-SHA1 authentication handshake (C2).
//!
//! Modeled on the teacher's `handlers/login_chap.rs`: a short sequence of
//! "read a server message, compute a response, send it" steps, except
//! Tarantool's handshake is a single round (one greeting, optionally one
//! AUTH request) rather than iSCSI's multi-stage Security/Operational
//! negotiation.

use sha1::{Digest, Sha1};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{Error, Result};

/// Length in bytes of the greeting Tarantool sends immediately after accept.
pub const GREETING_LEN: usize = 128;
const SALT_BASE64_LEN: usize = 44;
const SCRAMBLE_LEN: usize = 20;

/// What the greeting told us: the version banner (for logging only) and the
/// 20-byte server salt used to compute the CHAP-SHA1 scramble.
#[derive(Debug, Clone)]
pub struct Greeting {
    pub version_banner: String,
    pub salt: [u8; SCRAMBLE_LEN],
}

/// Reads and parses the 128-byte greeting from a freshly connected socket.
pub async fn read_greeting<R>(reader: &mut R) -> Result<Greeting>
where R: AsyncRead + Unpin {
    let mut buf = [0u8; GREETING_LEN];
    reader
        .read_exact(&mut buf)
        .await
        .map_err(|e| Error::HandshakeFailed(format!("short greeting: {e}")))?;

    parse_greeting(&buf)
}

/// Parses an already-read 128-byte greeting buffer. Split out from
/// [`read_greeting`] so the parsing logic is unit-testable without a socket.
pub fn parse_greeting(buf: &[u8; GREETING_LEN]) -> Result<Greeting> {
    let banner_line = buf[0..64]
        .split(|&b| b == b'\n' || b == b'\r')
        .next()
        .unwrap_or(&buf[0..64]);
    let version_banner = String::from_utf8_lossy(banner_line).trim().to_string();

    let salt_field = &buf[64..64 + SALT_BASE64_LEN];
    let decoded = base64_decode(salt_field)
        .map_err(|e| Error::HandshakeFailed(format!("invalid salt base64: {e}")))?;
    if decoded.len() < SCRAMBLE_LEN {
        return Err(Error::HandshakeFailed(
            "decoded salt shorter than 20 bytes".to_string(),
        ));
    }

    let mut salt = [0u8; SCRAMBLE_LEN];
    salt.copy_from_slice(&decoded[..SCRAMBLE_LEN]);

    Ok(Greeting {
        version_banner,
        salt,
    })
}

fn base64_decode(field: &[u8]) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD.decode(field)
}

/// Computes the 20-byte CHAP-SHA1 scramble:
/// `SHA1(password) XOR SHA1(salt || SHA1(SHA1(password)))`.
pub fn chap_sha1_scramble(salt: &[u8; SCRAMBLE_LEN], password: &[u8]) -> [u8; SCRAMBLE_LEN] {
    let step1 = Sha1::digest(password);
    let step2 = Sha1::digest(step1);

    let mut hasher = Sha1::new();
    hasher.update(salt);
    hasher.update(step2);
    let step3 = hasher.finalize();

    let mut scramble = [0u8; SCRAMBLE_LEN];
    for i in 0..SCRAMBLE_LEN {
        scramble[i] = step1[i] ^ step3[i];
    }
    scramble
}
