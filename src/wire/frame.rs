// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Length-prefixed MessagePack frame codec (C1).
//!
//! A frame is `<MP uint: length> <MP map: header> <MP map: body>`, where
//! `length` covers only header+body. This mirrors the `read_loop` in the
//! teacher's `client/client.rs`, which also reads a fixed prefix first
//! (there, a 48-byte BHS) and then reads exactly the payload length it
//! describes — except here the "BHS" is itself a MessagePack value instead
//! of a fixed byte layout, so the length has to be decoded before we know
//! how many bytes the header will take.

use rmpv::Value;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{
    error::{Error, Result},
    wire::keys::header_key,
};

/// Parsed frame header (§3 Header keys). `schema_id` is accepted but never
/// interpreted by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub code: u32,
    pub sync: u64,
    pub schema_id: u32,
}

/// Encodes a `(code, sync, body)` triple into a ready-to-write frame.
pub fn encode_frame(code: u32, sync: u64, body: Option<&Value>) -> Result<Vec<u8>> {
    let header = Value::Map(vec![
        (Value::from(header_key::CODE as u64), Value::from(code)),
        (Value::from(header_key::SYNC as u64), Value::from(sync)),
    ]);

    let mut header_bytes = Vec::new();
    rmpv::encode::write_value(&mut header_bytes, &header)?;

    let mut body_bytes = Vec::new();
    let body_value = body.cloned().unwrap_or_else(|| Value::Map(Vec::new()));
    rmpv::encode::write_value(&mut body_bytes, &body_value)?;

    let payload_len = (header_bytes.len() + body_bytes.len()) as u64;

    let mut out = Vec::with_capacity(9 + header_bytes.len() + body_bytes.len());
    rmp::encode::write_uint(&mut out, payload_len)
        .map_err(|e| Error::WireError(format!("failed to encode length prefix: {e}")))?;
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(&body_bytes);
    Ok(out)
}

/// Reads one frame from `reader`: the length prefix, then exactly that many
/// bytes, then decodes the header and body maps out of them.
///
/// Returns `WireError` if trailing bytes remain after the header+body, or if
/// either value is not a map.
pub async fn decode_frame<R>(reader: &mut R) -> Result<(Header, Value)>
where R: AsyncRead + Unpin {
    let payload_len = read_msgpack_uint(reader).await?;

    let mut buf = vec![0u8; payload_len as usize];
    reader.read_exact(&mut buf).await?;

    let mut cursor = &buf[..];
    let header_value = rmpv::decode::read_value(&mut cursor)?;

    let body_value = if cursor.is_empty() {
        Value::Map(Vec::new())
    } else {
        rmpv::decode::read_value(&mut cursor)?
    };

    if !cursor.is_empty() {
        return Err(Error::WireError(format!(
            "{} trailing byte(s) after header+body",
            cursor.len()
        )));
    }
    if !body_value.is_map() {
        return Err(Error::WireError("frame body is not a map".to_string()));
    }

    let header = parse_header(&header_value)?;
    Ok((header, body_value))
}

/// Reads a MessagePack-encoded unsigned integer, one marker byte at a time,
/// from an async stream. `rmp::decode` only understands synchronous
/// `std::io::Read`, so the marker and its trailing bytes are buffered first.
async fn read_msgpack_uint<R>(reader: &mut R) -> Result<u64>
where R: AsyncRead + Unpin {
    let mut marker = [0u8; 1];
    reader.read_exact(&mut marker).await?;

    let extra = match marker[0] {
        0x00..=0x7f => 0,
        0xcc => 1,
        0xcd => 2,
        0xce => 4,
        0xcf => 8,
        other => {
            return Err(Error::WireError(format!(
                "frame length prefix is not a MessagePack uint (marker 0x{other:02x})"
            )));
        },
    };

    let mut buf = Vec::with_capacity(1 + extra);
    buf.push(marker[0]);
    if extra > 0 {
        let mut rest = vec![0u8; extra];
        reader.read_exact(&mut rest).await?;
        buf.extend_from_slice(&rest);
    }

    let mut slice = &buf[..];
    rmp::decode::read_int::<u64, _>(&mut slice)
        .map_err(|e| Error::WireError(format!("malformed length prefix: {e}")))
}

fn parse_header(value: &Value) -> Result<Header> {
    let entries = value
        .as_map()
        .ok_or_else(|| Error::WireError("frame header is not a map".to_string()))?;

    let mut code = None;
    let mut sync = None;
    let mut schema_id = 0u32;

    for (k, v) in entries {
        let Some(key) = k.as_u64() else { continue };
        match key as u8 {
            header_key::CODE => code = v.as_u64().map(|n| n as u32),
            header_key::SYNC => sync = v.as_u64(),
            header_key::SCHEMA_ID => schema_id = v.as_u64().unwrap_or(0) as u32,
            _ => {},
        }
    }

    Ok(Header {
        code: code.ok_or_else(|| Error::WireError("frame header missing Code".to_string()))?,
        sync: sync.ok_or_else(|| Error::WireError("frame header missing Sync".to_string()))?,
        schema_id,
    })
}
