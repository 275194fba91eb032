// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The structured error taxonomy shared by every component of this crate.
//!
//! Every variant is either *fatal* (the connection is closed and every
//! pending waiter is failed with a clone of it) or *non-fatal* (it is
//! returned to exactly one caller and the connection stays open). See
//! [`Error::is_fatal`].

use thiserror::Error;

/// All failure modes a [`crate::dispatcher::Connection`] or request
/// constructor can surface.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The greeting or the AUTH reply was malformed or rejected. Fatal.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The dispatcher is not open anymore. Fatal.
    #[error("connection closed")]
    ConnectionClosed,

    /// The per-request deadline elapsed before a reply arrived. Non-fatal.
    #[error("request timed out")]
    Timeout,

    /// The server replied with a non-zero status code. Non-fatal.
    #[error("server error {code}: {message}")]
    ServerError {
        /// The low 15 bits of the response header's `Code` field.
        code: u32,
        /// The human-readable message carried in the response body.
        message: String,
    },

    /// A frame could not be encoded or decoded. Fatal for the connection.
    #[error("wire error: {0}")]
    WireError(String),

    /// `space_name_to_id` was asked to resolve a name that isn't cached.
    /// Non-fatal.
    #[error("unknown space: {0}")]
    UnknownSpace(String),

    /// `index_name_to_id` was asked to resolve a name that isn't cached for
    /// the given space. Non-fatal.
    #[error("unknown index {index} in space {space}")]
    UnknownIndex {
        /// The space the index was looked up in.
        space: String,
        /// The index name that could not be resolved.
        index: String,
    },

    /// A symbolic or string space/index was used before [`parse_schema`] ever
    /// ran. Non-fatal.
    ///
    /// [`parse_schema`]: crate::schema::Schema::refresh
    #[error("schema not loaded")]
    SchemaNotLoaded,

    /// `resolve_iterator` was given a value that matches no known alias.
    /// Non-fatal.
    #[error("unknown iterator: {0}")]
    UnknownIterator(String),

    /// A low-level transport error. Always fatal when it escapes the reader
    /// task or a socket write.
    #[error("io error: {0}")]
    Io(String),

    /// `ConnectOptions::validate` rejected the configuration. Non-fatal;
    /// never reaches a live connection.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Whether this error, once observed, must close the connection and fail
    /// every other pending waiter.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::HandshakeFailed(_)
                | Error::ConnectionClosed
                | Error::WireError(_)
                | Error::Io(_)
        )
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<rmpv::decode::Error> for Error {
    fn from(e: rmpv::decode::Error) -> Self {
        Error::WireError(e.to_string())
    }
}

impl From<rmpv::encode::Error> for Error {
    fn from(e: rmpv::encode::Error) -> Self {
        Error::WireError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
