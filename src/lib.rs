// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! A pure-Rust async client for Tarantool's binary IPROTO protocol.
//!
//! The crate is built around three layers: a length-prefixed MessagePack
//! frame codec and CHAP-SHA1 handshake ([`wire`], [`handshake`]), a
//! multiplexed request/response [`dispatcher`] that correlates concurrent
//! in-flight requests by sync id, and a [`schema`] cache plus typed
//! [`request`] surface that let callers address spaces and indexes by name.
//! [`Client`] wires all three together into the connection object most
//! callers want.
//!
//! URI parsing, connection pooling across multiple endpoints, TLS, and
//! automatic reconnection are explicitly out of scope: callers supply an
//! already-resolved host/port pair via [`ConnectOptions`], and a dead
//! connection is surfaced as an error rather than silently retried.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handshake;
pub mod keepalive;
pub mod request;
pub mod schema;
pub mod wire;

use std::sync::Arc;

pub use config::ConnectOptions;
pub use dispatcher::{Connection, Response};
pub use error::{Error, Result};
pub use request::{IndexRef, RequestSurface, SpaceRef};
pub use schema::Schema;
pub use wire::keys::IteratorKind;

/// A ready-to-use Tarantool connection: the dispatcher, a schema cache, and
/// (when `read_timeout` is configured) a running keep-alive loop.
#[derive(Debug)]
pub struct Client {
    conn: Arc<Connection>,
    schema: Schema,
    _keepalive: Option<keepalive::KeepAliveHandle>,
}

impl Client {
    /// Connects, authenticates (unless the guest account is used), and
    /// starts the keep-alive loop. The schema cache starts empty; call
    /// [`Client::refresh_schema`] before using symbolic space/index names.
    pub async fn connect(cfg: ConnectOptions) -> Result<Self> {
        let read_timeout = cfg.read_timeout;
        let conn = Connection::connect(cfg).await?;
        let keepalive = keepalive::spawn(conn.clone(), read_timeout);
        Ok(Self {
            conn,
            schema: Schema::new(),
            _keepalive: keepalive,
        })
    }

    /// Re-populates the schema cache by introspecting `box.space` over EVAL.
    pub async fn refresh_schema(&self) -> Result<()> {
        self.schema.refresh(&self.conn).await
    }

    /// Borrows the schema cache directly, e.g. to seed it without an EVAL
    /// round-trip via [`Schema::seed`].
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The typed request surface (PING, SELECT, INSERT, ...) bound to this
    /// connection and its schema cache.
    pub fn requests(&self) -> RequestSurface<'_> {
        RequestSurface::new(&self.conn, &self.schema)
    }

    /// Whether the underlying connection is still usable.
    pub fn alive(&self) -> bool {
        self.conn.alive()
    }

    /// Closes the connection and fails every pending request.
    pub async fn close(&self) {
        self.conn.close().await;
    }
}
