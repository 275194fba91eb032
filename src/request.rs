// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Typed request constructors (C6): PING, AUTH, SELECT, INSERT, REPLACE,
//! UPDATE, DELETE, CALL, EVAL, UPSERT.
//!
//! Each operation here does exactly two things before handing off to the
//! dispatcher: resolve any symbolic space/index argument through the schema
//! cache, and build the command's body map. Keeping that resolution at this
//! boundary (never inside C4) is the redesign the teacher's flat BHS-builder
//! functions in `models::parse` pointed towards: one place per operation that
//! knows its own body shape, rather than a single giant dispatch match.

use std::time::{Duration, Instant};

use rmpv::Value;

use crate::{
    dispatcher::Connection,
    error::{Error, Result},
    handshake::chap_sha1_scramble,
    schema::Schema,
    wire::{
        body_key,
        keys::{Command, IteratorKind},
    },
};

/// A space argument: either an already-known numeric id or a name to be
/// resolved through the schema cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpaceRef {
    Id(u16),
    Name(String),
}

impl From<u16> for SpaceRef {
    fn from(id: u16) -> Self {
        SpaceRef::Id(id)
    }
}

impl From<&str> for SpaceRef {
    fn from(name: &str) -> Self {
        SpaceRef::Name(name.to_string())
    }
}

impl From<String> for SpaceRef {
    fn from(name: String) -> Self {
        SpaceRef::Name(name)
    }
}

/// An index argument: either an already-known numeric id or a name to be
/// resolved through the schema cache, scoped to the space it was used with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexRef {
    Id(u8),
    Name(String),
}

impl From<u8> for IndexRef {
    fn from(id: u8) -> Self {
        IndexRef::Id(id)
    }
}

impl From<&str> for IndexRef {
    fn from(name: &str) -> Self {
        IndexRef::Name(name.to_string())
    }
}

impl From<String> for IndexRef {
    fn from(name: String) -> Self {
        IndexRef::Name(name)
    }
}

async fn resolve_space(schema: &Schema, space: &SpaceRef) -> Result<u16> {
    match space {
        SpaceRef::Id(id) => Ok(*id),
        SpaceRef::Name(name) => schema.space_name_to_id(name).await,
    }
}

async fn resolve_index(schema: &Schema, space_id: u16, index: &IndexRef) -> Result<u8> {
    match index {
        IndexRef::Id(id) => Ok(*id),
        IndexRef::Name(name) => schema.index_name_to_id(space_id, name).await,
    }
}

const DEFAULT_SELECT_LIMIT: u32 = 1 << 30;

/// The typed request surface bound to one connection and its schema cache.
///
/// Constructed by [`crate::Client`]; exposed directly for callers who manage
/// their own `Connection`/`Schema` pair.
#[derive(Debug)]
pub struct RequestSurface<'a> {
    conn: &'a Connection,
    schema: &'a Schema,
}

impl<'a> RequestSurface<'a> {
    pub fn new(conn: &'a Connection, schema: &'a Schema) -> Self {
        Self { conn, schema }
    }

    /// Round-trips a PING and returns the measured elapsed time rather than
    /// a `Response` — there is nothing meaningful in a PING body.
    pub async fn ping(&self) -> Result<Duration> {
        let start = Instant::now();
        self.conn.submit(Command::Ping as u32, None).await?;
        Ok(start.elapsed())
    }

    /// Authenticates with explicit credentials against the connection's
    /// already-known salt. Used both at connect time and for callers who
    /// want to re-authenticate as a different user mid-connection.
    pub async fn authenticate(&self, user: &str, password: &str) -> Result<()> {
        let scramble = chap_sha1_scramble(&self.conn.greeting.salt, password.as_bytes());
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
        self.conn.submit(Command::Auth as u32, Some(body)).await?;
        Ok(())
    }

    /// `SELECT` with explicit index, bounds, and iterator kind.
    #[allow(clippy::too_many_arguments)]
    pub async fn select(
        &self,
        space: impl Into<SpaceRef>,
        index: impl Into<IndexRef>,
        key: Vec<Value>,
        limit: Option<u32>,
        offset: Option<u32>,
        iterator: Option<IteratorKind>,
    ) -> Result<Vec<Value>> {
        let space_id = resolve_space(self.schema, &space.into()).await?;
        let index_id = resolve_index(self.schema, space_id, &index.into()).await?;
        let body = Value::Map(vec![
            (Value::from(body_key::SPACE_ID as u64), Value::from(space_id)),
            (Value::from(body_key::INDEX_ID as u64), Value::from(index_id)),
            (
                Value::from(body_key::LIMIT as u64),
                Value::from(limit.unwrap_or(DEFAULT_SELECT_LIMIT)),
            ),
            (
                Value::from(body_key::OFFSET as u64),
                Value::from(offset.unwrap_or(0)),
            ),
            (
                Value::from(body_key::ITERATOR as u64),
                Value::from(iterator.unwrap_or(IteratorKind::Equal).as_u8()),
            ),
            (Value::from(body_key::KEY as u64), Value::Array(key)),
        ]);
        let response = self.conn.submit(Command::Select as u32, Some(body)).await?;
        data_tuples(&response.data().cloned())
    }

    /// `SELECT` against the primary index with `limit=1`, returning the
    /// matched tuple, if any.
    pub async fn get(&self, space: impl Into<SpaceRef>, key: Vec<Value>) -> Result<Option<Value>> {
        let mut rows = self
            .select(space, IndexRef::Id(0), key, Some(1), Some(0), Some(IteratorKind::Equal))
            .await?;
        Ok(if rows.is_empty() { None } else { Some(rows.remove(0)) })
    }

    pub async fn insert(&self, space: impl Into<SpaceRef>, tuple: Vec<Value>) -> Result<Vec<Value>> {
        let space_id = resolve_space(self.schema, &space.into()).await?;
        let body = Value::Map(vec![
            (Value::from(body_key::SPACE_ID as u64), Value::from(space_id)),
            (Value::from(body_key::TUPLE as u64), Value::Array(tuple)),
        ]);
        let response = self.conn.submit(Command::Insert as u32, Some(body)).await?;
        data_tuples(&response.data().cloned())
    }

    pub async fn replace(&self, space: impl Into<SpaceRef>, tuple: Vec<Value>) -> Result<Vec<Value>> {
        let space_id = resolve_space(self.schema, &space.into()).await?;
        let body = Value::Map(vec![
            (Value::from(body_key::SPACE_ID as u64), Value::from(space_id)),
            (Value::from(body_key::TUPLE as u64), Value::Array(tuple)),
        ]);
        let response = self.conn.submit(Command::Replace as u32, Some(body)).await?;
        data_tuples(&response.data().cloned())
    }

    pub async fn update(
        &self,
        space: impl Into<SpaceRef>,
        index: impl Into<IndexRef>,
        key: Vec<Value>,
        ops: Vec<Value>,
    ) -> Result<Vec<Value>> {
        let space_id = resolve_space(self.schema, &space.into()).await?;
        let index_id = resolve_index(self.schema, space_id, &index.into()).await?;
        let body = Value::Map(vec![
            (Value::from(body_key::SPACE_ID as u64), Value::from(space_id)),
            (Value::from(body_key::INDEX_ID as u64), Value::from(index_id)),
            (Value::from(body_key::KEY as u64), Value::Array(key)),
            (Value::from(body_key::TUPLE as u64), Value::Array(ops)),
        ]);
        let response = self.conn.submit(Command::Update as u32, Some(body)).await?;
        data_tuples(&response.data().cloned())
    }

    pub async fn delete(
        &self,
        space: impl Into<SpaceRef>,
        index: impl Into<IndexRef>,
        key: Vec<Value>,
    ) -> Result<Vec<Value>> {
        let space_id = resolve_space(self.schema, &space.into()).await?;
        let index_id = resolve_index(self.schema, space_id, &index.into()).await?;
        let body = Value::Map(vec![
            (Value::from(body_key::SPACE_ID as u64), Value::from(space_id)),
            (Value::from(body_key::INDEX_ID as u64), Value::from(index_id)),
            (Value::from(body_key::KEY as u64), Value::Array(key)),
        ]);
        let response = self.conn.submit(Command::Delete as u32, Some(body)).await?;
        data_tuples(&response.data().cloned())
    }

    pub async fn upsert(
        &self,
        space: impl Into<SpaceRef>,
        tuple: Vec<Value>,
        ops: Vec<Value>,
    ) -> Result<()> {
        let space_id = resolve_space(self.schema, &space.into()).await?;
        let body = Value::Map(vec![
            (Value::from(body_key::SPACE_ID as u64), Value::from(space_id)),
            (Value::from(body_key::TUPLE as u64), Value::Array(tuple)),
            (Value::from(body_key::OPS as u64), Value::Array(ops)),
        ]);
        self.conn.submit(Command::Upsert as u32, Some(body)).await?;
        Ok(())
    }

    pub async fn call(&self, function: &str, args: Vec<Value>) -> Result<Vec<Value>> {
        let body = Value::Map(vec![
            (
                Value::from(body_key::FUNCTION_NAME as u64),
                Value::from(function),
            ),
            (Value::from(body_key::TUPLE as u64), Value::Array(args)),
        ]);
        let response = self.conn.submit(Command::Call as u32, Some(body)).await?;
        data_tuples(&response.data().cloned())
    }

    pub async fn eval(&self, expression: &str, args: Vec<Value>) -> Result<Vec<Value>> {
        let body = Value::Map(vec![
            (
                Value::from(body_key::EXPRESSION as u64),
                Value::from(expression),
            ),
            (Value::from(body_key::TUPLE as u64), Value::Array(args)),
        ]);
        let response = self.conn.submit(Command::Eval as u32, Some(body)).await?;
        data_tuples(&response.data().cloned())
    }
}

fn data_tuples(data: &Option<Value>) -> Result<Vec<Value>> {
    match data {
        None => Ok(Vec::new()),
        Some(v) => v
            .as_array()
            .map(<[Value]>::to_vec)
            .ok_or_else(|| Error::WireError("response Data is not an array".to_string())),
    }
}
