#![allow(dead_code)]

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use uma::{Error, KeySet, Provider, ProviderCore, ProviderFactory, ResourceType};
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Key set accepting every token, with the token itself as payload.
pub struct NoKeys;

#[async_trait]
impl KeySet for NoKeys {
    async fn verify_signature(&self, token: &str) -> Result<Vec<u8>, Error> {
        Ok(token.as_bytes().to_vec())
    }
}

/// Standards-only provider, sending protocol calls without authentication.
pub struct PlainProvider(pub ProviderCore);

impl Provider for PlainProvider {
    fn core(&self) -> &ProviderCore {
        &self.0
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub fn plain_factory() -> Arc<dyn ProviderFactory> {
    Arc::new(|core: ProviderCore| -> Result<Arc<dyn Provider>, Error> {
        Ok(Arc::new(PlainProvider(core)))
    })
}

pub fn issuer(server: &MockServer, realm: &str) -> Url {
    Url::parse(&format!("{}/realms/{}", server.uri(), realm)).unwrap()
}

pub fn discovery_document(server: &MockServer, realm: &str) -> Value {
    let issuer = issuer(server, realm);
    json!({
        "issuer": issuer,
        "authorization_endpoint": format!("{}/protocol/openid-connect/auth", issuer),
        "token_endpoint": format!("{}/protocol/openid-connect/token", issuer),
        "jwks_uri": format!("{}/protocol/openid-connect/certs", issuer),
        "resource_registration_endpoint": format!("{}/authz/protection/resource_set", issuer),
        "permission_endpoint": format!("{}/authz/protection/permission", issuer),
        "policy_endpoint": format!("{}/authz/protection/uma-policy", issuer),
    })
}

pub fn discovery_path(realm: &str) -> String {
    format!("/realms/{}/.well-known/uma2-configuration", realm)
}

pub fn token_path(realm: &str) -> String {
    format!("/realms/{}/protocol/openid-connect/token", realm)
}

pub fn resource_set_path(realm: &str) -> String {
    format!("/realms/{}/authz/protection/resource_set", realm)
}

pub fn permission_path(realm: &str) -> String {
    format!("/realms/{}/authz/protection/permission", realm)
}

/// Mounts the discovery document of `realm`, expected to be fetched exactly once.
pub async fn mount_discovery(server: &MockServer, realm: &str) -> Url {
    Mock::given(method("GET"))
        .and(path(discovery_path(realm)))
        .respond_with(ResponseTemplate::new(200).set_body_json(discovery_document(server, realm)))
        .expect(1)
        .mount(server)
        .await;
    issuer(server, realm)
}

pub fn user_type() -> ResourceType {
    ResourceType::new("https://www.example.com/rsrcs/user")
        .icon_uri("https://www.example.com/rsrcs/user/icon.png")
        .scope("read")
        .scope("write")
}
