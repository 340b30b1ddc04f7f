//! Shared fixtures: a wiremock server driven from a private tokio runtime
//! while the blocking client runs on the test thread.

#![allow(dead_code)]

use std::fs;
use std::path::Path;
use std::time::Duration;

use droid_factory_core::{Endpoints, HttpClient, Session};
use serde_json::{json, Value};
use tokio::runtime::Runtime;
use wiremock::{Mock, MockServer};

pub struct MockEnv {
    pub server: MockServer,
    pub rt: Runtime,
}

impl MockEnv {
    pub fn start() -> Self {
        let rt = Runtime::new().expect("tokio runtime should start");
        let server = rt.block_on(MockServer::start());
        Self { server, rt }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn mount(&self, mock: Mock) {
        self.rt.block_on(mock.mount(&self.server));
    }

    pub fn session(&self) -> Session {
        self.session_with_token(None)
    }

    pub fn session_with_token(&self, token: Option<&str>) -> Session {
        let http = HttpClient::new(
            Duration::from_secs(5),
            token.map(str::to_string),
            token.map(str::to_string),
        )
        .expect("client should build");
        Session::new(http, Endpoints::all(&self.uri()))
    }

    pub fn received(&self) -> usize {
        self.rt
            .block_on(self.server.received_requests())
            .map(|r| r.len())
            .unwrap_or(0)
    }
}

/// GitHub tree API body
pub fn tree_body(blobs: &[&str]) -> Value {
    let tree: Vec<Value> = blobs
        .iter()
        .map(|p| json!({"path": p, "type": "blob", "mode": "100644"}))
        .collect();
    json!({"sha": "abc", "truncated": false, "tree": tree})
}

/// GitHub contents API entry
pub fn gh_entry(path: &str, kind: &str) -> Value {
    let name = path.rsplit('/').next().unwrap_or(path);
    json!({"name": name, "path": path, "type": kind})
}

/// GitLab tree API entry
pub fn gl_entry(path: &str, kind: &str) -> Value {
    let name = path.rsplit('/').next().unwrap_or(path);
    json!({"id": "0", "name": name, "path": path, "type": kind, "mode": "040000"})
}

pub fn touch(root: &Path, rel: &str, content: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}
