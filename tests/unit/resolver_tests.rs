//! Unit tests for the config resolver.

#![allow(clippy::expect_used)]

use windlass::resolver::{ConfigDetail, ConfigIdRow, ResolveError, resolve};
use windlass::routing::{PortBinding, ServiceRole};

use crate::mocks::CannedConfigApi;

fn row(id: u64, visibility: &str, token: Option<&str>) -> ConfigIdRow {
    serde_json::from_value(serde_json::json!({
        "ID": id,
        "visibility": visibility,
        "token": token,
    }))
    .expect("row")
}

fn detail() -> ConfigDetail {
    serde_json::from_value(serde_json::json!({
        "file_id": "f1",
        "project_id": "p1",
        "region": "r1",
    }))
    .expect("detail")
}

#[tokio::test]
async fn empty_id_lookup_is_not_found() {
    let api = CannedConfigApi::happy(Vec::new(), detail(), Vec::new());
    let err = resolve(&api, "alice", "demo").await.expect_err("not found");
    assert!(matches!(err, ResolveError::NotFound { .. }));
}

#[tokio::test]
async fn first_row_wins_when_multiple_match() {
    let api = CannedConfigApi::happy(
        vec![
            row(7, "public", Some("tok-7")),
            row(9, "private", Some("tok-9")),
        ],
        detail(),
        Vec::new(),
    );
    let config = resolve(&api, "alice", "demo").await.expect("resolved");
    assert_eq!(config.config_id, 7);
    assert_eq!(config.visibility, "public");
    assert_eq!(config.auth_token.as_deref(), Some("tok-7"));
}

#[tokio::test]
async fn detail_failure_is_fatal() {
    let mut api = CannedConfigApi::happy(vec![row(7, "public", None)], detail(), Vec::new());
    api.detail = None;
    let err = resolve(&api, "alice", "demo").await.expect_err("fatal");
    assert!(matches!(
        err,
        ResolveError::Upstream {
            lookup: "config",
            ..
        }
    ));
}

#[tokio::test]
async fn degraded_lookups_fall_back_to_defaults() {
    let mut api = CannedConfigApi::happy(vec![row(7, "public", None)], detail(), Vec::new());
    api.ports = None;
    api.key = None;
    api.mode = None;

    let config = resolve(&api, "alice", "demo").await.expect("resolved");
    assert!(config.port_bindings.is_empty());
    assert_eq!(config.public_key, "");
    assert_eq!(config.runtime_mode, "nodocker");
    // The fatal lookups still populated normally.
    assert_eq!(config.project_id, "p1");
    assert_eq!(config.credential_blob_id, "f1");
}

#[tokio::test]
async fn port_bindings_pass_through() {
    let bindings = vec![PortBinding {
        port: 80,
        route: "/".to_string(),
        role: ServiceRole::Frontend,
    }];
    let api = CannedConfigApi::happy(vec![row(7, "public", None)], detail(), bindings);
    let config = resolve(&api, "alice", "demo").await.expect("resolved");
    assert_eq!(config.port_bindings.len(), 1);
    assert_eq!(config.port_bindings[0].port, 80);
    assert_eq!(config.region, "r1");
}
