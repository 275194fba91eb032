// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The wire-level vocabulary (C3) and frame codec (C1).

pub mod frame;
pub mod keys;

pub use frame::{decode_frame, encode_frame, Header};
pub use keys::{body_key, header_key, IteratorKind};
