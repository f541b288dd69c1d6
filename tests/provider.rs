mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use serde_json::json;
use tokio::task::JoinSet;
use uma::{
    Error, ErrorKind, MemoryResourceStore, Provider, ProviderInfo, ProviderRegistry, Resource,
    ResourceStore,
};
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn registry(store: Arc<MemoryResourceStore>) -> ProviderRegistry {
    ProviderRegistry::new(reqwest::Client::new(), store).with_factory("plain", plain_factory())
}

fn info(server: &MockServer, realm: &str) -> ProviderInfo {
    ProviderInfo::new(
        issuer(server, realm),
        "plain",
        "resource-server",
        "secret",
        Arc::new(NoKeys),
    )
}

fn user(id: u32) -> Resource {
    Resource::new(
        format!("User {}", id),
        format!("http://localhost:8000/users/{}", id),
        user_type(),
    )
}

#[tokio::test]
async fn concurrent_registration_is_single_flight() {
    let server = MockServer::start().await;
    mount_discovery(&server, "test").await;
    Mock::given(method("POST"))
        .and(path(resource_set_path("test")))
        .and(body_json(json!({
            "name": "User 1",
            "uri": "http://localhost:8000/users/1",
            "type": "https://www.example.com/rsrcs/user",
            "icon_uri": "https://www.example.com/rsrcs/user/icon.png",
            "resource_scopes": ["read", "write"],
        })))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({"_id": "d2fe9843-6462-4bfc-baba-b5787bb6e0e7"}))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryResourceStore::new());
    let provider = registry(store.clone())
        .resolve(info(&server, "test"))
        .await
        .unwrap();

    let mut tasks = JoinSet::new();
    for _ in 0..8 {
        let provider = provider.clone();
        tasks.spawn(async move {
            let mut resource = user(1);
            provider.register_resource(&mut resource).await.map(|_| resource.id)
        });
    }
    while let Some(id) = tasks.join_next().await {
        assert_eq!(
            Some("d2fe9843-6462-4bfc-baba-b5787bb6e0e7".to_string()),
            id.unwrap().unwrap()
        );
    }

    // Later calls are served from the cache.
    let mut resource = user(1);
    provider.register_resource(&mut resource).await.unwrap();
    assert_eq!(
        Some("d2fe9843-6462-4bfc-baba-b5787bb6e0e7".to_string()),
        provider.core().cached_id("User 1")
    );
    assert_eq!(
        Some("d2fe9843-6462-4bfc-baba-b5787bb6e0e7".to_string()),
        store.get("User 1").await
    );
}

#[tokio::test]
async fn distinct_names_register_separately() {
    let server = MockServer::start().await;
    mount_discovery(&server, "test").await;
    Mock::given(method("POST"))
        .and(path(resource_set_path("test")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"_id": "some-id"})))
        .expect(3)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryResourceStore::new());
    let provider = registry(store.clone())
        .resolve(info(&server, "test"))
        .await
        .unwrap();
    for id in 1..=3 {
        let mut resource = user(id);
        provider.register_resource(&mut resource).await.unwrap();
        assert!(resource.is_registered());
    }
    assert_eq!(3, store.len());
}

#[tokio::test]
async fn stored_id_skips_registration() {
    let server = MockServer::start().await;
    mount_discovery(&server, "test").await;
    Mock::given(method("POST"))
        .and(path(resource_set_path("test")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"_id": "fresh"})))
        .expect(0)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryResourceStore::from([(
        "User 1".to_string(),
        "stored".to_string(),
    )]));
    let provider = registry(store.clone())
        .resolve(info(&server, "test"))
        .await
        .unwrap();

    let mut resource = user(1);
    resource.id = store.get("User 1").await;
    provider.register_resource(&mut resource).await.unwrap();
    assert_eq!(Some("stored".to_string()), resource.id);
    assert_eq!(Some("stored".to_string()), provider.core().cached_id("User 1"));
}

#[tokio::test]
async fn failed_registration_leaves_no_trace() {
    let server = MockServer::start().await;
    mount_discovery(&server, "test").await;
    Mock::given(method("POST"))
        .and(path(resource_set_path("test")))
        .respond_with(ResponseTemplate::new(409).set_body_string("resource already exists"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(resource_set_path("test")))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"_id": "retried"})))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryResourceStore::new());
    let provider = registry(store.clone())
        .resolve(info(&server, "test"))
        .await
        .unwrap();

    let mut resource = user(1);
    let err = provider.register_resource(&mut resource).await.unwrap_err();
    assert_eq!(ErrorKind::Protocol, err.kind());
    assert_eq!(Some(409), err.status());
    assert!(err.to_string().contains("resource already exists"));
    assert_eq!(None, resource.id);
    assert_eq!(None, provider.core().cached_id("User 1"));
    assert!(store.is_empty());

    provider.register_resource(&mut resource).await.unwrap();
    assert_eq!(Some("retried".to_string()), resource.id);
}

#[tokio::test]
async fn malformed_registration_response() {
    let server = MockServer::start().await;
    mount_discovery(&server, "test").await;
    Mock::given(method("POST"))
        .and(path(resource_set_path("test")))
        .respond_with(ResponseTemplate::new(201).set_body_string("<html>"))
        .mount(&server)
        .await;

    let provider = registry(Arc::new(MemoryResourceStore::new()))
        .resolve(info(&server, "test"))
        .await
        .unwrap();
    let mut resource = user(1);
    let err = provider.register_resource(&mut resource).await.unwrap_err();
    assert_eq!(ErrorKind::Decode, err.kind());
    assert_eq!(None, resource.id);
}

#[tokio::test]
async fn permission_ticket_round_trip() {
    let server = MockServer::start().await;
    mount_discovery(&server, "test").await;
    Mock::given(method("POST"))
        .and(path(permission_path("test")))
        .and(body_json(json!([{"resource_id": "abc", "resource_scopes": ["read"]}])))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({"ticket": "016f84e8-f9b9-11e0-bd6f-0021cc6004de"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider = registry(Arc::new(MemoryResourceStore::new()))
        .resolve(info(&server, "test"))
        .await
        .unwrap();
    let ticket = provider
        .request_permission_ticket("abc", &["read"])
        .await
        .unwrap();
    assert_eq!("016f84e8-f9b9-11e0-bd6f-0021cc6004de", ticket);
}

#[tokio::test]
async fn permission_ticket_rejected() {
    let server = MockServer::start().await;
    mount_discovery(&server, "test").await;
    Mock::given(method("POST"))
        .and(path(permission_path("test")))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_resource_id",
            "error_description": "Resource with id [abc] does not exist."
        })))
        .mount(&server)
        .await;

    let provider = registry(Arc::new(MemoryResourceStore::new()))
        .resolve(info(&server, "test"))
        .await
        .unwrap();
    let err = provider
        .request_permission_ticket("abc", &["read"])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Protocol(ref e) if e.status == 400));
    assert!(!err.is_access_denied());
}

#[tokio::test]
async fn discovery_failure_is_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(discovery_path("test")))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_discovery(&server, "test").await;

    let registry = registry(Arc::new(MemoryResourceStore::new()));
    let err = registry.resolve(info(&server, "test")).await.unwrap_err();
    assert_eq!(ErrorKind::Discovery, err.kind());
    assert!(registry.cached(&issuer(&server, "test")).is_none());

    let provider = registry.resolve(info(&server, "test")).await.unwrap();
    assert_eq!(
        &issuer(&server, "test"),
        provider.authorization_server_uri()
    );
    assert!(registry.cached(&issuer(&server, "test")).is_some());
}

#[tokio::test]
async fn incomplete_discovery_document() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(discovery_path("test")))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"issuer": issuer(&server, "test")})),
        )
        .mount(&server)
        .await;

    let err = registry(Arc::new(MemoryResourceStore::new()))
        .resolve(info(&server, "test"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Discovery { .. }));
}

#[tokio::test]
async fn cached_provider_keeps_first_configuration() {
    let server = MockServer::start().await;
    mount_discovery(&server, "test").await;

    let registry = registry(Arc::new(MemoryResourceStore::new()));
    let first = registry.resolve(info(&server, "test")).await.unwrap();

    let mut other = info(&server, "test");
    other.provider_type = "unknown".into();
    other.client_id = "another-client".into();
    let second = registry.resolve(other).await.unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!("resource-server", second.core().client_id());
    assert!(second.downcast_ref::<PlainProvider>().is_some());
}

#[tokio::test]
async fn unsupported_provider_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(discovery_path("test")))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut unsupported = info(&server, "test");
    unsupported.provider_type = "gluu".into();
    let err = registry(Arc::new(MemoryResourceStore::new()))
        .resolve(unsupported)
        .await
        .unwrap_err();
    assert_eq!(ErrorKind::Configuration, err.kind());
}

#[tokio::test]
async fn verification_is_delegated_to_key_set() {
    let server = MockServer::start().await;
    mount_discovery(&server, "test").await;
    let provider = registry(Arc::new(MemoryResourceStore::new()))
        .resolve(info(&server, "test"))
        .await
        .unwrap();
    assert_eq!(
        b"header.payload.signature".to_vec(),
        provider
            .verify_signature("header.payload.signature")
            .await
            .unwrap()
    );
}
