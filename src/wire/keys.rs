// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Fixed protocol vocabulary: command codes, header/body integer keys, and
//! the iterator-kind alias resolver (C3).
//!
//! The IPROTO wire format keys everything by small integers; this module is
//! the single place those integers are named, mirroring how
//! `models::opcode` is the single place the iSCSI BHS opcode byte is named
//! in the teacher.

use crate::error::Error;

/// Request command codes (IPROTO §6). `Ping` doubles as the keep-alive op.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Select = 1,
    Insert = 2,
    Replace = 3,
    Update = 4,
    Delete = 5,
    Auth = 7,
    Eval = 8,
    Upsert = 9,
    Call = 10,
    Ping = 64,
}

/// Integer keys of the frame header map.
pub mod header_key {
    pub const CODE: u8 = 0x00;
    pub const SYNC: u8 = 0x01;
    pub const SCHEMA_ID: u8 = 0x05;
}

/// Integer keys of the frame body map.
pub mod body_key {
    pub const SPACE_ID: u8 = 0x10;
    pub const INDEX_ID: u8 = 0x11;
    pub const LIMIT: u8 = 0x12;
    pub const OFFSET: u8 = 0x13;
    pub const ITERATOR: u8 = 0x14;
    pub const KEY: u8 = 0x20;
    pub const TUPLE: u8 = 0x21;
    pub const FUNCTION_NAME: u8 = 0x22;
    pub const USERNAME: u8 = 0x23;
    pub const EXPRESSION: u8 = 0x27;
    pub const OPS: u8 = 0x28;
    pub const DATA: u8 = 0x30;
    pub const ERROR: u8 = 0x31;
}

/// Response status: the high bit of `Code` set means "error", the low 15
/// bits are the server error code.
pub const RESPONSE_ERROR_BIT: u32 = 0x8000;

/// Splits a response header `Code` into `Ok(())` on success or the server
/// error code on failure.
pub fn response_status(code: u32) -> Option<u32> {
    if code & RESPONSE_ERROR_BIT != 0 {
        Some(code & !RESPONSE_ERROR_BIT)
    } else {
        None
    }
}

/// Closed enumeration of Tarantool's `box.index` iterator kinds.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorKind {
    Equal = 0,
    ReversedEqual = 1,
    All = 2,
    LessThan = 3,
    LessThanOrEqual = 4,
    GreaterThanOrEqual = 5,
    GreaterThan = 6,
    BitsAllSet = 7,
    BitsAnySet = 8,
    RtreeOverlaps = 9,
    RtreeNeighbor = 10,
}

impl IteratorKind {
    /// The numeric value sent on the wire in the `Iterator` body key.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::Equal,
            1 => Self::ReversedEqual,
            2 => Self::All,
            3 => Self::LessThan,
            4 => Self::LessThanOrEqual,
            5 => Self::GreaterThanOrEqual,
            6 => Self::GreaterThan,
            7 => Self::BitsAllSet,
            8 => Self::BitsAnySet,
            9 => Self::RtreeOverlaps,
            10 => Self::RtreeNeighbor,
            _ => return None,
        })
    }

    /// Resolves the integer form, a word alias, or a symbolic-operator
    /// alias into an [`IteratorKind`].
    ///
    /// Accepts any of `eq|==`, `reveq|==<`, `all|*`, `lt|<`, `lte|<=`,
    /// `gte|>=`, `gt|>`, `bitall|&=`, `bitany|&`, `overlaps|&&`,
    /// `neighbor|<->`, or the raw integer 0..=10.
    pub fn resolve(value: &str) -> Result<Self, Error> {
        if let Ok(n) = value.parse::<u8>() {
            return Self::from_u8(n).ok_or_else(|| Error::UnknownIterator(value.to_string()));
        }
        ALIASES
            .iter()
            .find(|(word, op, _)| *word == value || *op == value)
            .map(|(_, _, kind)| *kind)
            .ok_or_else(|| Error::UnknownIterator(value.to_string()))
    }

    /// Resolves an already-numeric iterator value.
    pub fn resolve_u8(value: u8) -> Result<Self, Error> {
        Self::from_u8(value).ok_or_else(|| Error::UnknownIterator(value.to_string()))
    }
}

const ALIASES: &[(&str, &str, IteratorKind)] = &[
    ("eq", "==", IteratorKind::Equal),
    ("reveq", "==<", IteratorKind::ReversedEqual),
    ("all", "*", IteratorKind::All),
    ("lt", "<", IteratorKind::LessThan),
    ("lte", "<=", IteratorKind::LessThanOrEqual),
    ("gte", ">=", IteratorKind::GreaterThanOrEqual),
    ("gt", ">", IteratorKind::GreaterThan),
    ("bitall", "&=", IteratorKind::BitsAllSet),
    ("bitany", "&", IteratorKind::BitsAnySet),
    ("overlaps", "&&", IteratorKind::RtreeOverlaps),
    ("neighbor", "<->", IteratorKind::RtreeNeighbor),
];
