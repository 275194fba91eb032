// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Space/index name resolution (C5).
//!
//! Tarantool's wire protocol addresses spaces and indexes by numeric id;
//! names only exist as Lua-side sugar on `box.space`. This cache is
//! populated by introspecting `box.space` itself over EVAL — one query to
//! list every space name, then per space one query for its numeric id and
//! one for its index table — and kept around so callers can use names
//! without round-tripping through Lua on every request. The same shape as a
//! DNS cache sitting in front of a socket API, and grounded the same way the
//! teacher's `cfg::config::Config` holds validated, parsed state behind an
//! RwLock rather than re-parsing on every access.

use std::collections::HashMap;

use rmpv::Value;
use tokio::sync::RwLock;

use crate::{
    dispatcher::Connection,
    error::{Error, Result},
    wire::{body_key, keys::Command},
};

const LIST_SPACES_EXPRESSION: &str = "return box.space";

/// A snapshot of space and index names resolvable to their numeric ids.
#[derive(Debug, Default)]
pub struct Schema {
    spaces: RwLock<HashMap<String, u16>>,
    indexes: RwLock<HashMap<(u16, String), u8>>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-populates the cache over `conn` and replaces the cached maps
    /// wholesale. Issues `1 + 2*N` EVALs for `N` spaces: one to list every
    /// space name off `box.space`, then per space one for `box.space.<name>.id`
    /// and one for `box.space.<name>.index`. Safe to call concurrently with
    /// lookups: readers see either the old or the new snapshot, never a
    /// partial one.
    pub async fn refresh(&self, conn: &Connection) -> Result<()> {
        let names = list_space_names(conn).await?;

        let mut spaces = HashMap::with_capacity(names.len());
        let mut indexes = HashMap::new();
        for name in names {
            let space_id = fetch_space_id(conn, &name).await?;
            for (index_id, index_name) in fetch_space_indexes(conn, &name).await? {
                indexes.insert((space_id, index_name), index_id);
            }
            spaces.insert(name, space_id);
        }

        *self.spaces.write().await = spaces;
        *self.indexes.write().await = indexes;
        Ok(())
    }

    /// Resolves a space name to its numeric id. `SchemaNotLoaded` if
    /// `refresh` never ran; `UnknownSpace` if the name isn't cached.
    pub async fn space_name_to_id(&self, name: &str) -> Result<u16> {
        let spaces = self.spaces.read().await;
        if spaces.is_empty() {
            return Err(Error::SchemaNotLoaded);
        }
        spaces
            .get(name)
            .copied()
            .ok_or_else(|| Error::UnknownSpace(name.to_string()))
    }

    /// Resolves an index name within `space_id` to its numeric id.
    pub async fn index_name_to_id(&self, space_id: u16, name: &str) -> Result<u8> {
        let indexes = self.indexes.read().await;
        if indexes.is_empty() {
            return Err(Error::SchemaNotLoaded);
        }
        indexes
            .get(&(space_id, name.to_string()))
            .copied()
            .ok_or_else(|| Error::UnknownIndex {
                space: space_id.to_string(),
                index: name.to_string(),
            })
    }

    /// Seeds the cache directly without issuing EVALs, for callers that
    /// already know their schema out of band.
    pub async fn seed(&self, spaces: HashMap<String, u16>, indexes: HashMap<(u16, String), u8>) {
        *self.spaces.write().await = spaces;
        *self.indexes.write().await = indexes;
    }
}

/// Issues one EVAL and returns its `Data` array.
async fn eval_data(conn: &Connection, expression: &str) -> Result<Vec<Value>> {
    let body = Value::Map(vec![(
        Value::from(body_key::EXPRESSION as u64),
        Value::from(expression),
    )]);
    let response = conn.submit(Command::Eval as u32, Some(body)).await?;
    response
        .data()
        .and_then(Value::as_array)
        .cloned()
        .ok_or_else(|| Error::WireError("EVAL reply missing Data array".to_string()))
}

/// `return box.space` yields a Lua table keyed both by numeric space id and
/// by space name, both pointing at the same space object. Only the string
/// keys are names; the numeric keys are discarded here; their ids are
/// fetched individually in [`fetch_space_id`].
async fn list_space_names(conn: &Connection) -> Result<Vec<String>> {
    let data = eval_data(conn, LIST_SPACES_EXPRESSION).await?;
    let table = data
        .first()
        .and_then(Value::as_map)
        .ok_or_else(|| Error::WireError("box.space did not return a table".to_string()))?;

    Ok(table
        .iter()
        .filter_map(|(k, _)| k.as_str().map(str::to_string))
        .collect())
}

async fn fetch_space_id(conn: &Connection, name: &str) -> Result<u16> {
    let data = eval_data(conn, &space_id_expression(name)).await?;
    data.first()
        .and_then(Value::as_u64)
        .map(|n| n as u16)
        .ok_or_else(|| Error::WireError(format!("box.space.{name}.id did not return a number")))
}

/// `return box.space.<name>.index` is, like `box.space` itself, keyed both
/// by numeric index id and by index name pointing at the same index object.
/// Each index object carries its own `name` field, so walking the
/// numeric-keyed entries alone yields every `(index_id, index_name)` pair
/// without double-counting the string-keyed aliases.
async fn fetch_space_indexes(conn: &Connection, name: &str) -> Result<Vec<(u8, String)>> {
    let data = eval_data(conn, &space_index_expression(name)).await?;
    let table = data
        .first()
        .and_then(Value::as_map)
        .ok_or_else(|| Error::WireError(format!("box.space.{name}.index did not return a table")))?;

    let mut out = Vec::new();
    for (k, v) in table {
        let Some(index_id) = k.as_u64() else { continue };
        let Some(index_name) = index_object_name(v) else { continue };
        out.push((index_id as u8, index_name.to_string()));
    }
    Ok(out)
}

fn index_object_name(index_object: &Value) -> Option<&str> {
    index_object
        .as_map()?
        .iter()
        .find(|(k, _)| k.as_str() == Some("name"))
        .and_then(|(_, v)| v.as_str())
}

fn space_id_expression(name: &str) -> String {
    format!("return box.space[{}].id", lua_quote(name))
}

fn space_index_expression(name: &str) -> String {
    format!("return box.space[{}].index", lua_quote(name))
}

/// Renders `name` as a single-quoted Lua string literal, escaping backslashes
/// and embedded quotes, so a space name is never interpreted as Lua syntax.
fn lua_quote(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 2);
    out.push('\'');
    for c in name.chars() {
        match c {
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(c),
        }
    }
    out.push('\'');
    out
}
