// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! The multiplexed request/response dispatcher (C4).
//!
//! Grounded on the teacher's `client/client.rs`: a TCP stream split into a
//! mutex-guarded write half and a reader task that owns the read half
//! exclusively, with a concurrent map keyed by a per-request tag
//! (`initiator_task_tag` there, `sync` here) used to route replies back to
//! their waiter. Where the teacher keeps a `DashMap<u32, mpsc::Sender<_>>`
//! per in-flight tag, this dispatcher uses a `DashMap<u64,
//! oneshot::Sender<_>>` since IPROTO replies are exactly one-shot (no
//! continuation frames), and stores the terminal connection error in a
//! single-write cell instead of dropping it (see SPEC_FULL §9).

use std::sync::atomic::{AtomicU64, Ordering};

use rmpv::Value;
use tokio::{
    io::AsyncWriteExt,
    net::{
        tcp::{OwnedReadHalf, OwnedWriteHalf},
        TcpStream,
    },
    sync::{oneshot, Mutex, OnceCell},
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::{
    config::ConnectOptions,
    error::{Error, Result},
    handshake::{self, Greeting},
    wire::{
        frame::{decode_frame, encode_frame, Header},
        keys::{body_key, response_status, Command},
    },
};

/// A decoded, status-checked reply to a submitted request.
#[derive(Debug, Clone)]
pub struct Response {
    pub header: Header,
    pub body: Value,
}

impl Response {
    /// The `Data` body key, if present.
    pub fn data(&self) -> Option<&Value> {
        map_get(&self.body, body_key::DATA)
    }

    /// The `Error` body key rendered as a string, if present.
    pub fn error_message(&self) -> Option<String> {
        map_get(&self.body, body_key::ERROR).map(|v| {
            v.as_str()
                .map(str::to_string)
                .unwrap_or_else(|| v.to_string())
        })
    }
}

fn map_get(value: &Value, key: u8) -> Option<&Value> {
    value
        .as_map()?
        .iter()
        .find(|(k, _)| k.as_u64() == Some(key as u64))
        .map(|(_, v)| v)
}

type Waiter = oneshot::Sender<Result<Response>>;

/// An open IPROTO connection: socket ownership, sync assignment, the
/// pending-request table, and the background reader task.
#[derive(Debug)]
pub struct Connection {
    writer: Mutex<OwnedWriteHalf>,
    next_sync: AtomicU64,
    pending: dashmap::DashMap<u64, Waiter>,
    /// Set exactly once, by whichever path (reader task or a failed write)
    /// first observes the connection die. Every later `submit` and every
    /// already-pending waiter are failed with a clone of it.
    fatal: OnceCell<Error>,
    /// Lets `close()` wake the reader task immediately instead of waiting
    /// for it to notice EOF or an I/O error on its own.
    cancel: CancellationToken,
    cfg: ConnectOptions,
    pub greeting: Greeting,
}

impl Connection {
    /// Connects to `cfg.host:cfg.port`, runs the handshake (greeting +
    /// optional AUTH), spawns the background reader, and returns a ready
    /// connection. No request-surface call can race the handshake: the
    /// `Connection` simply doesn't exist until it has already authenticated.
    pub async fn connect(cfg: ConnectOptions) -> Result<std::sync::Arc<Self>> {
        cfg.validate()?;

        let addr = timeout(
            cfg.dns_timeout,
            tokio::net::lookup_host((cfg.host.as_str(), cfg.port)),
        )
        .await
        .map_err(|_| Error::HandshakeFailed("DNS resolution timed out".to_string()))?
        .map_err(|e| Error::HandshakeFailed(format!("DNS resolution failed: {e}")))?
        .next()
        .ok_or_else(|| Error::HandshakeFailed(format!("no address found for {}", cfg.host)))?;

        let stream = timeout(cfg.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| Error::HandshakeFailed("connect timed out".to_string()))?
            .map_err(|e| Error::HandshakeFailed(format!("connect failed: {e}")))?;
        stream
            .set_nodelay(true)
            .map_err(|e| Error::HandshakeFailed(format!("set_nodelay failed: {e}")))?;

        let (mut read_half, write_half) = stream.into_split();
        let greeting = handshake::read_greeting(&mut read_half).await?;

        let conn = std::sync::Arc::new(Self {
            writer: Mutex::new(write_half),
            next_sync: AtomicU64::new(1),
            pending: dashmap::DashMap::new(),
            fatal: OnceCell::new(),
            cancel: CancellationToken::new(),
            cfg,
            greeting,
        });

        spawn_reader(conn.clone(), read_half);

        if conn.cfg.needs_auth() {
            if let Err(e) = conn.authenticate().await {
                // AUTH rejection is a HandshakeFailed, which is fatal (SPEC_FULL
                // §7): tear the connection down so the reader task and socket
                // don't outlive the only `Arc` this caller ever sees.
                conn.close().await;
                return Err(e);
            }
        }

        Ok(conn)
    }

    async fn authenticate(&self) -> Result<()> {
        let user = self
            .cfg
            .user
            .clone()
            .ok_or_else(|| Error::HandshakeFailed("AUTH requested without a user".to_string()))?;
        let password = self.cfg.password.clone().unwrap_or_default();
        let scramble = handshake::chap_sha1_scramble(&self.greeting.salt, password.as_bytes());

        let body = Value::Map(vec![
            (Value::from(body_key::USERNAME as u64), Value::from(user)),
            (
                Value::from(body_key::TUPLE as u64),
                Value::Array(vec![
                    Value::from("chap-sha1"),
                    Value::Binary(scramble.to_vec()),
                ]),
            ),
        ]);

        self.submit(Command::Auth as u32, Some(body))
            .await
            .map_err(|e| Error::HandshakeFailed(format!("AUTH rejected: {e}")))?;
        Ok(())
    }

    /// Whether the connection is still usable.
    pub fn alive(&self) -> bool {
        self.fatal.get().is_none()
    }

    /// Marks the connection closed, fails every pending waiter with
    /// `ConnectionClosed`, wakes the reader task, and shuts down the socket.
    pub async fn close(&self) {
        self.fail_all(Error::ConnectionClosed);
        self.cancel.cancel();
        let mut w = self.writer.lock().await;
        let _ = w.shutdown().await;
    }

    /// Assigns a fresh sync, writes the frame, and suspends until a reply
    /// arrives, the per-request timeout elapses, or the connection fails.
    pub async fn submit(&self, code: u32, body: Option<Value>) -> Result<Response> {
        if let Some(err) = self.fatal.get() {
            return Err(err.clone());
        }

        let sync = self.next_sync.fetch_add(1, Ordering::SeqCst);
        let frame = encode_frame(code, sync, body.as_ref())?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(sync, tx);

        if let Err(e) = self.write_frame(&frame).await {
            self.pending.remove(&sync);
            self.fail_all(e.clone());
            return Err(e);
        }
        trace!(sync, code, "submitted request");

        let result = match self.cfg.read_timeout {
            Some(d) => match timeout(d, rx).await {
                Ok(recv) => recv,
                Err(_) => {
                    self.pending.remove(&sync);
                    return Err(Error::Timeout);
                },
            },
            None => rx.await,
        };

        let response = match result {
            Ok(inner) => inner?,
            // The sender was dropped without sending: only `fail_all` drops a
            // sender without a prior send, and it always records a fatal
            // error first.
            Err(_) => {
                return Err(self
                    .fatal
                    .get()
                    .cloned()
                    .unwrap_or(Error::ConnectionClosed));
            },
        };

        match response_status(response.header.code) {
            None => Ok(response),
            Some(code) => Err(Error::ServerError {
                code,
                message: response
                    .error_message()
                    .unwrap_or_else(|| "no error message".to_string()),
            }),
        }
    }

    async fn write_frame(&self, frame: &[u8]) -> Result<()> {
        let mut w = self.writer.lock().await;
        timeout(self.cfg.write_timeout, w.write_all(frame))
            .await
            .map_err(|_| Error::Timeout)??;
        Ok(())
    }

    /// Records `err` as the terminal error (first write wins) and delivers a
    /// clone of it to every currently pending waiter.
    fn fail_all(&self, err: Error) {
        let _ = self.fatal.set(err.clone());
        for entry in self.pending_drain() {
            let _ = entry.send(Err(err.clone()));
        }
    }

    fn pending_drain(&self) -> Vec<Waiter> {
        let keys: Vec<u64> = self.pending.iter().map(|e| *e.key()).collect();
        keys.into_iter()
            .filter_map(|k| self.pending.remove(&k).map(|(_, v)| v))
            .collect()
    }

    /// Delivers a decoded response to its waiter, if one is still pending.
    /// Called only by the reader task.
    fn deliver(&self, header: Header, body: Value) {
        if let Some((_, tx)) = self.pending.remove(&header.sync) {
            let _ = tx.send(Ok(Response { header, body }));
        } else {
            debug!(sync = header.sync, "dropping reply for unknown/timed-out sync");
        }
    }

    fn strict_sync(&self) -> bool {
        self.cfg.strict_sync
    }
}

fn spawn_reader(conn: std::sync::Arc<Connection>, mut read_half: OwnedReadHalf) {
    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                biased;
                () = conn.cancel.cancelled() => {
                    debug!("reader task exiting: connection was closed");
                    return;
                },
                result = decode_frame(&mut read_half) => result,
            };

            match frame {
                Ok((header, body)) => {
                    let known = conn.pending.contains_key(&header.sync);
                    if !known && conn.strict_sync() {
                        warn!(sync = header.sync, "reply for sync this client never issued");
                        conn.fail_all(Error::WireError(format!(
                            "unsolicited sync {} under strict_sync policy",
                            header.sync
                        )));
                        return;
                    }
                    conn.deliver(header, body);
                },
                Err(e) => {
                    warn!(error = %e, "reader task exiting: connection is fatally broken");
                    conn.fail_all(e);
                    return;
                },
            }
        }
    });
}
