// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::time::Duration;

use rmpv::Value;
use tarantool_iproto_client::{ConnectOptions, Connection, Error};

use crate::integration_tests::common::spawn_server;

#[tokio::test]
async fn a_request_the_server_never_answers_times_out_without_killing_the_connection() {
    let addr = spawn_server().await;
    let mut cfg = ConnectOptions::new(addr.ip().to_string(), addr.port());
    cfg.read_timeout = Some(Duration::from_millis(200));

    let conn = Connection::connect(cfg).await.expect("connect");
    assert!(conn.alive());

    let body = rmpv::Value::Map(vec![
        (
            Value::from(tarantool_iproto_client::wire::body_key::FUNCTION_NAME as u64),
            Value::from("hang"),
        ),
        (
            Value::from(tarantool_iproto_client::wire::body_key::TUPLE as u64),
            Value::Array(Vec::new()),
        ),
    ]);
    let err = conn
        .submit(tarantool_iproto_client::wire::keys::Command::Call as u32, Some(body))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Timeout));

    // The connection itself survived the timed-out request.
    assert!(conn.alive());
    conn.submit(tarantool_iproto_client::wire::keys::Command::Ping as u32, None)
        .await
        .expect("ping after timeout");
}
