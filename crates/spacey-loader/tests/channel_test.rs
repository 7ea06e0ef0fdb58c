// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Host process and loader process talking over a channel

use serde_json::json;
use spacey_loader::channel::{BUNDLE_EVENT, INITIALIZE_EVENT};
use spacey_loader::{BundleRequest, Channel, Engine, EngineConfig, LoaderSpec};
use std::fs;
use tempfile::tempdir;
use tokio::io::{duplex, split};

fn connect() -> (Channel, Channel) {
    let (host, loader) = duplex(16 * 1024);
    let (host_read, host_write) = split(host);
    let (loader_read, loader_write) = split(loader);
    (
        Channel::connect(host_read, host_write),
        Channel::connect(loader_read, loader_write),
    )
}

#[tokio::test]
async fn test_engine_is_configured_by_initialize_event() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("main.js"), "import text from './notes.txt';\nexport default text;\n").unwrap();
    fs::write(dir.path().join("notes.txt"), "hi").unwrap();

    let (host, loader) = connect();
    let config = EngineConfig {
        cwd: Some(dir.path().to_path_buf()),
        loaders: vec![LoaderSpec::new("spacey:file", &["txt"])],
        ..Default::default()
    };
    host.send(INITIALIZE_EVENT, vec![config.to_json_value().unwrap()])
        .unwrap();

    let engine = Engine::from_channel(loader).await.unwrap();
    assert_eq!(engine.cwd(), dir.path());

    let output = engine.bundle(BundleRequest::new("main.js")).await.unwrap();
    assert!(output.errors.is_empty(), "{:?}", output.errors);
    assert!(output.code.contains("\"hi\""));

    let args = host.once(BUNDLE_EVENT).await.unwrap();
    assert_eq!(args[0], json!("main.js"));
    assert_eq!(args[1], json!([dir.path().join("notes.txt")]));
}

#[tokio::test]
async fn test_initialize_without_config_fails() {
    let (host, loader) = connect();
    host.send(INITIALIZE_EVENT, Vec::new()).unwrap();

    assert!(Engine::from_channel(loader).await.is_err());
}

#[tokio::test]
async fn test_state_written_by_loader_reaches_host() {
    let (host, loader) = connect();

    loader.state().set("progress", json!({ "done": 3 })).unwrap();
    loader.send("ping", Vec::new()).unwrap();
    host.once("ping").await.unwrap();

    assert_eq!(host.state().get("progress"), Some(json!({ "done": 3 })));
}
