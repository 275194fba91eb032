// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use tarantool_iproto_client::{
    handshake::{chap_sha1_scramble, read_greeting},
    Error,
};

fn greeting_buf(banner: &str, salt_b64: &str) -> [u8; 128] {
    let mut buf = [b' '; 128];
    buf[..banner.len()].copy_from_slice(banner.as_bytes());
    buf[63] = b'\n';
    buf[64..64 + salt_b64.len()].copy_from_slice(salt_b64.as_bytes());
    buf
}

#[tokio::test]
async fn greeting_with_a_zero_salt_is_parsed_off_a_stream() {
    let buf = greeting_buf("Tarantool 2.11.0 (Binary)", &"A".repeat(44));
    let mut cursor = std::io::Cursor::new(buf.to_vec());
    let greeting = read_greeting(&mut cursor).await.expect("read greeting");
    assert_eq!(greeting.salt, [0u8; 20]);
    assert!(greeting.version_banner.starts_with("Tarantool"));
}

#[tokio::test]
async fn a_truncated_greeting_is_a_handshake_failure() {
    let buf = greeting_buf("Tarantool", &"A".repeat(44));
    let mut cursor = std::io::Cursor::new(buf[..100].to_vec());
    assert!(matches!(
        read_greeting(&mut cursor).await,
        Err(Error::HandshakeFailed(_))
    ));
}

#[test]
fn chap_scramble_is_deterministic_for_the_same_salt_and_password() {
    let salt = [7u8; 20];
    let a = chap_sha1_scramble(&salt, b"hunter2");
    let b = chap_sha1_scramble(&salt, b"hunter2");
    assert_eq!(a, b);
}

#[test]
fn chap_scramble_differs_across_passwords() {
    let salt = [0u8; 20];
    let a = chap_sha1_scramble(&salt, b"hunter2");
    let b = chap_sha1_scramble(&salt, b"correct-horse-battery-staple");
    assert_ne!(a, b);
}

#[test]
fn chap_scramble_differs_across_salts() {
    let a = chap_sha1_scramble(&[1u8; 20], b"hunter2");
    let b = chap_sha1_scramble(&[2u8; 20], b"hunter2");
    assert_ne!(a, b);
}

#[test]
fn error_display_carries_the_server_message() {
    let err = Error::ServerError {
        code: 3,
        message: "space 999 does not exist".to_string(),
    };
    assert!(err.to_string().contains("space 999 does not exist"));
}
