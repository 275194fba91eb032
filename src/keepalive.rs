// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Background keep-alive PING loop (C7).
//!
//! Spawned once per connection when `read_timeout` is configured. It does
//! not implement any liveness policy of its own — a failing PING just calls
//! `submit`, and `submit` already drives the dispatcher's fatal fan-out path
//! (§9 Open Question (a)). This mirrors the teacher's posture towards its
//! own background tasks: report failure through the same channel a live
//! caller would see, rather than maintaining a parallel health flag.

use std::{sync::Arc, time::Duration};

use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::dispatcher::Connection;

/// Guards the spawned keep-alive task: dropping it aborts the loop.
#[derive(Debug)]
pub struct KeepAliveHandle {
    task: JoinHandle<()>,
}

impl Drop for KeepAliveHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// The PING interval for a given `read_timeout`, or `None` if keep-alive
/// should be disabled entirely. Split out from [`spawn`] so the policy is
/// unit-testable without a live connection.
fn keepalive_interval(read_timeout: Option<Duration>) -> Option<Duration> {
    let interval = read_timeout? / 3;
    if interval.is_zero() {
        None
    } else {
        Some(interval)
    }
}

/// Starts a PING loop at `read_timeout / 3` if `read_timeout` is set;
/// returns `None` when keep-alive is disabled (no read timeout configured).
pub fn spawn(conn: Arc<Connection>, read_timeout: Option<Duration>) -> Option<KeepAliveHandle> {
    let interval = keepalive_interval(read_timeout)?;

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            if !conn.alive() {
                debug!("keep-alive loop exiting: connection no longer alive");
                return;
            }
            match conn.submit(crate::wire::keys::Command::Ping as u32, None).await {
                Ok(_) => trace!("keep-alive ping ok"),
                Err(e) => {
                    debug!(error = %e, "keep-alive ping failed, connection is presumed dead");
                    return;
                },
            }
        }
    });

    Some(KeepAliveHandle { task })
}
