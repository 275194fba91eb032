// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Connection configuration.
//!
//! URI parsing is deliberately out of scope for this crate (see the crate
//! root docs): callers supply an already-resolved `host`/`port` pair and
//! plain credential strings. What this module *does* own is validating that
//! combination and, for operators who prefer file-based configuration,
//! loading it from YAML the same way the teacher's `Config::load_from_file`
//! does.

use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Connection parameters for [`crate::dispatcher::Connection::connect`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectOptions {
    /// Hostname or IP address of the Tarantool instance.
    pub host: String,
    /// TCP port of the `box.cfg{listen=...}` endpoint.
    pub port: u16,
    /// Username to authenticate as. `None` or `"guest"` with an empty
    /// password skips authentication.
    #[serde(default)]
    pub user: Option<String>,
    /// Password for `user`. Ignored when `user` is absent.
    #[serde(default)]
    pub password: Option<String>,

    /// Bound on DNS resolution of `host`.
    #[serde(with = "serde_secs")]
    pub dns_timeout: Duration,
    /// Bound on the TCP handshake once an address has been resolved.
    #[serde(with = "serde_secs")]
    pub connect_timeout: Duration,
    /// Bound on a single socket write.
    #[serde(with = "serde_secs")]
    pub write_timeout: Duration,
    /// Bound on a submitted request's wait for its reply. Also the interval
    /// basis for the keep-alive PING loop (`read_timeout / 3`). `None`
    /// disables both per-request timeouts and keep-alive.
    #[serde(default, with = "serde_secs_opt")]
    pub read_timeout: Option<Duration>,

    /// When `true`, a reply whose sync this connection never issued is
    /// treated as a fatal protocol violation (`Error::WireError`) instead of
    /// being dropped silently. See SPEC_FULL §9, Open Question (b).
    #[serde(default)]
    pub strict_sync: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3301,
            user: None,
            password: None,
            dns_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),
            read_timeout: Some(Duration::from_secs(30)),
            strict_sync: false,
        }
    }
}

impl ConnectOptions {
    /// Builds options for `host:port` with otherwise-default timeouts.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Attaches credentials.
    #[must_use]
    pub fn with_auth(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// Loads and validates options from a YAML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::InvalidConfig(format!("failed to read {:?}: {e}", path.as_ref()))
        })?;
        let mut cfg: Self = serde_yaml::from_str(&s)
            .map_err(|e| Error::InvalidConfig(format!("failed to parse config YAML: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks structural invariants: a password implies a user, the host is
    /// non-empty, and the port is nonzero.
    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(Error::InvalidConfig("host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(Error::InvalidConfig("port must be nonzero".into()));
        }
        if self.password.is_some() && self.user.is_none() {
            return Err(Error::InvalidConfig(
                "password set without a user".into(),
            ));
        }
        Ok(())
    }

    /// Whether authentication should be attempted at all: there must be a
    /// user that isn't the anonymous `"guest"` with an empty password.
    pub fn needs_auth(&self) -> bool {
        match (&self.user, &self.password) {
            (None, _) => false,
            (Some(u), None) => u != "guest",
            (Some(u), Some(p)) => !(u == "guest" && p.is_empty()),
        }
    }
}

/// Serde helpers representing `Duration` as whole seconds, matching the
/// teacher's `cfg::config::serde_secs`.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

/// Same as `serde_secs` but for `Option<Duration>`, using `0` as "disabled".
mod serde_secs_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.map(|d| d.as_secs()).unwrap_or(0))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(if secs == 0 {
            None
        } else {
            Some(Duration::from_secs(secs))
        })
    }
}
