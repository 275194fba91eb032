// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! An in-process fake IPROTO server. No live Tarantool instance is needed:
//! the core protocol has no external dependency to drive beyond a socket
//! that speaks the same frames this crate's own wire codec produces, so the
//! fake server is built directly out of `tarantool_iproto_client::wire`
//! rather than hand-rolling a second codec.

use std::{collections::HashMap, net::SocketAddr, sync::Arc, time::Duration};

use rmpv::Value;
use tarantool_iproto_client::wire::{
    body_key,
    decode_frame, encode_frame,
    keys::Command,
};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    sync::Mutex,
};

const SPACE_NAME: &str = "examples";
const SPACE_ID: u64 = 999;
const PRIMARY_INDEX_NAME: &str = "primary";

fn greeting() -> [u8; 128] {
    let mut buf = [b' '; 128];
    let banner = b"Tarantool 2.11.0 (Binary)";
    buf[..banner.len()].copy_from_slice(banner);
    buf[63] = b'\n';
    let salt = "A".repeat(44); // base64("\0" * 33) -- a deterministic zero salt
    buf[64..64 + salt.len()].copy_from_slice(salt.as_bytes());
    buf
}

fn map_get(value: &Value, key: u8) -> Option<&Value> {
    value
        .as_map()?
        .iter()
        .find(|(k, _)| k.as_u64() == Some(key as u64))
        .map(|(_, v)| v)
}

fn data_of(items: Vec<Value>) -> Value {
    Value::Map(vec![(Value::from(body_key::DATA as u64), Value::Array(items))])
}

/// Parses the space name back out of a `return box.space['<name>']<suffix>`
/// expression, the inverse of the client's `lua_quote`-based builders.
fn extract_space_name(expr: &str, suffix: &str) -> Option<String> {
    let body = expr.strip_prefix("return box.space['")?;
    let body = body.strip_suffix(&format!("']{suffix}"))?;
    Some(body.replace("\\'", "'").replace("\\\\", "\\"))
}

fn error_of(message: &str) -> (u32, Value) {
    (
        0x8000 | 1,
        Value::Map(vec![(Value::from(body_key::ERROR as u64), Value::from(message))]),
    )
}

type Store = Mutex<HashMap<u16, Vec<Vec<Value>>>>;

fn apply_ops(row: &mut [Value], ops: &[Value]) {
    for op in ops {
        let Some(fields) = op.as_array() else { continue };
        let Some(kind) = fields.first().and_then(Value::as_str) else { continue };
        let Some(field_idx) = fields.get(1).and_then(Value::as_u64).map(|n| n as usize) else {
            continue;
        };
        if field_idx >= row.len() {
            continue;
        }
        match kind {
            "=" => {
                if let Some(v) = fields.get(2) {
                    row[field_idx] = v.clone();
                }
            },
            ":" => {
                let pos = fields.get(2).and_then(Value::as_u64).unwrap_or(0) as usize;
                let len = fields.get(3).and_then(Value::as_u64).unwrap_or(0) as usize;
                let insert = fields.get(4).and_then(Value::as_str).unwrap_or("");
                if let Some(current) = row[field_idx].as_str() {
                    let current = current.to_string();
                    let head: String = current.chars().take(pos).collect();
                    let tail: String = current.chars().skip(pos + len).collect();
                    row[field_idx] = Value::from(format!("{head}{insert}{tail}"));
                }
            },
            _ => {},
        }
    }
}

/// Handles one request body against the shared in-memory space store.
/// Returns `None` when the caller asked this server to never reply (used by
/// the timeout test), meaning the caller's request should be silently
/// dropped on the floor rather than answered.
async fn handle_request(code: u32, body: &Value, store: &Store) -> Option<(u32, Value)> {
    if code == Command::Auth as u32 || code == Command::Ping as u32 {
        return Some((0, Value::Map(Vec::new())));
    }

    if code == Command::Eval as u32 {
        let expr = map_get(body, body_key::EXPRESSION).and_then(Value::as_str).unwrap_or("");

        if expr == "return box.space" {
            // Mirrors the real `box.space` table: keyed by both space name
            // and space id, pointing at the same object. Only the string key
            // is inspected by the client, so the value content doesn't matter.
            let table = Value::Map(vec![(Value::from(SPACE_NAME), Value::Map(Vec::new()))]);
            return Some((0, data_of(vec![table])));
        }
        if let Some(name) = extract_space_name(expr, ".id") {
            return Some(if name == SPACE_NAME {
                (0, data_of(vec![Value::from(SPACE_ID)]))
            } else {
                error_of(&format!("space '{name}' does not exist"))
            });
        }
        if let Some(name) = extract_space_name(expr, ".index") {
            return Some(if name == SPACE_NAME {
                let index_object = Value::Map(vec![
                    (Value::from("id"), Value::from(0u64)),
                    (Value::from("name"), Value::from(PRIMARY_INDEX_NAME)),
                ]);
                let table = Value::Map(vec![(Value::from(0u64), index_object)]);
                (0, data_of(vec![table]))
            } else {
                error_of(&format!("space '{name}' does not exist"))
            });
        }

        let args = map_get(body, body_key::TUPLE).and_then(Value::as_array).cloned().unwrap_or_default();
        let sum: i64 = args.iter().filter_map(Value::as_i64).sum();
        return Some((0, data_of(vec![Value::from(sum)])));
    }

    if code == Command::Call as u32 {
        let func = map_get(body, body_key::FUNCTION_NAME).and_then(Value::as_str).unwrap_or("");
        let args = map_get(body, body_key::TUPLE).and_then(Value::as_array).cloned().unwrap_or_default();
        if func == "sleep_ms" {
            let ms = args.first().and_then(Value::as_u64).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(ms)).await;
            return Some((0, data_of(vec![Value::from(ms)])));
        }
        if func == "hang" {
            return None;
        }
        return Some((0, data_of(Vec::new())));
    }

    let Some(space_id) = map_get(body, body_key::SPACE_ID).and_then(Value::as_u64).map(|n| n as u16) else {
        let (code, body) = error_of("request missing SpaceID");
        return Some((code, body));
    };

    if code == Command::Insert as u32 || code == Command::Replace as u32 {
        let tuple = map_get(body, body_key::TUPLE).and_then(Value::as_array).cloned().unwrap_or_default();
        let mut guard = store.lock().await;
        let rows = guard.entry(space_id).or_default();
        if let Some(existing) = rows.iter_mut().find(|t| t.first() == tuple.first()) {
            if code == Command::Insert as u32 {
                let (code, body) = error_of("duplicate key");
                return Some((code, body));
            }
            *existing = tuple.clone();
        } else {
            rows.push(tuple.clone());
        }
        return Some((0, data_of(vec![Value::Array(tuple)])));
    }

    if code == Command::Select as u32 {
        let key = map_get(body, body_key::KEY).and_then(Value::as_array).cloned().unwrap_or_default();
        let guard = store.lock().await;
        let rows = guard.get(&space_id).cloned().unwrap_or_default();
        let matched: Vec<Value> = rows
            .into_iter()
            .filter(|t| key.is_empty() || t.first() == key.first())
            .map(Value::Array)
            .collect();
        return Some((0, data_of(matched)));
    }

    if code == Command::Update as u32 {
        let key = map_get(body, body_key::KEY).and_then(Value::as_array).cloned().unwrap_or_default();
        let ops = map_get(body, body_key::TUPLE).and_then(Value::as_array).cloned().unwrap_or_default();
        let mut guard = store.lock().await;
        let rows = guard.entry(space_id).or_default();
        if let Some(row) = rows.iter_mut().find(|t| t.first() == key.first()) {
            apply_ops(row, &ops);
            return Some((0, data_of(vec![Value::Array(row.clone())])));
        }
        return Some((0, data_of(Vec::new())));
    }

    if code == Command::Delete as u32 {
        let key = map_get(body, body_key::KEY).and_then(Value::as_array).cloned().unwrap_or_default();
        let mut guard = store.lock().await;
        let rows = guard.entry(space_id).or_default();
        if let Some(pos) = rows.iter().position(|t| t.first() == key.first()) {
            let removed = rows.remove(pos);
            return Some((0, data_of(vec![Value::Array(removed)])));
        }
        return Some((0, data_of(Vec::new())));
    }

    if code == Command::Upsert as u32 {
        let tuple = map_get(body, body_key::TUPLE).and_then(Value::as_array).cloned().unwrap_or_default();
        let ops = map_get(body, body_key::OPS).and_then(Value::as_array).cloned().unwrap_or_default();
        let mut guard = store.lock().await;
        let rows = guard.entry(space_id).or_default();
        if let Some(row) = rows.iter_mut().find(|t| t.first() == tuple.first()) {
            apply_ops(row, &ops);
        } else {
            rows.push(tuple);
        }
        return Some((0, data_of(Vec::new())));
    }

    let (code, body) = error_of("unsupported op in fake server");
    Some((code, body))
}

async fn serve_one_connection(mut stream: TcpStream) {
    if stream.write_all(&greeting()).await.is_err() {
        return;
    }
    let (mut read_half, write_half) = stream.into_split();
    let write_half = Arc::new(Mutex::new(write_half));
    let store: Arc<Store> = Arc::new(Mutex::new(HashMap::new()));

    loop {
        let (header, body) = match decode_frame(&mut read_half).await {
            Ok(v) => v,
            Err(_) => return,
        };
        let store = store.clone();
        let write_half = write_half.clone();
        tokio::spawn(async move {
            let Some((code, resp_body)) = handle_request(header.code, &body, &store).await else {
                return;
            };
            let Ok(frame) = encode_frame(code, header.sync, Some(&resp_body)) else { return };
            let mut w = write_half.lock().await;
            let _ = w.write_all(&frame).await;
        });
    }
}

/// Starts a server that answers every op against a shared in-memory space,
/// handling requests concurrently so out-of-order replies (e.g. varying
/// `CALL "sleep_ms"` durations) are possible.
pub async fn spawn_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake server");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        if let Ok((stream, _)) = listener.accept().await {
            serve_one_connection(stream).await;
        }
    });
    addr
}

/// Starts a server that completes the handshake and then closes the socket
/// as soon as it receives the first non-handshake request, without replying
/// to it. Used to exercise the dispatcher's fatal fan-out path.
pub async fn spawn_dropping_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind fake server");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(async move {
        let Ok((mut stream, _)) = listener.accept().await else { return };
        if stream.write_all(&greeting()).await.is_err() {
            return;
        }
        loop {
            match decode_frame(&mut stream).await {
                Ok((header, body)) => {
                    if header.code == Command::Auth as u32 || header.code == Command::Ping as u32 {
                        let frame = encode_frame(0, header.sync, Some(&Value::Map(Vec::new())))
                            .expect("encode ok reply");
                        if stream.write_all(&frame).await.is_err() {
                            return;
                        }
                        continue;
                    }
                    let _ = body;
                    return; // drop the socket without replying
                },
                Err(_) => return,
            }
        }
    });
    addr
}
