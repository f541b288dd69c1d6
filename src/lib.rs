/*!
# UMA 2.0 resource server middleware using async / await

## Legal

Dual-licensed under `MIT` or the [UNLICENSE](http://unlicense.org/).

## Features

Implements the resource server side of [UMA 2.0](https://docs.kantarainitiative.org/uma/wg/rec-oauth-uma-federated-authz-2.0.html):
discovery of authorization servers, on-the-fly registration of protected resources and
permission tickets.

Requests are matched against resource templates such as `/users/{id}`. A matched request gets
its authorization server resolved (one discovered [`Provider`] per issuer, built on first use),
its resource registered exactly once, and reaches the handler with an [`UmaScope`] extension.

[Keycloak](https://www.keycloak.org/docs/latest/authorization_services/) is supported with
feature `keycloak` (enabled by default), including the client credentials, password, refresh
token and UMA ticket grants. Other authorization servers plug in through [`ProviderFactory`].

Using [reqwest](https://crates.io/crates/reqwest) for the HTTP client,
[biscuit](https://crates.io/crates/biscuit) for Javascript Object Signing and Encryption (JOSE)
and [tower](https://crates.io/crates/tower) for the middleware.

## Usage

Add dependency to Cargo.toml:

```toml
[dependencies]
uma = "0.1"
```

### Use case: [axum](https://crates.io/crates/axum) API protected by Keycloak

```rust,no_run
use std::sync::Arc;

use axum::{http::StatusCode, response::IntoResponse, routing::get, Extension, Router};
use uma::{
    JwksKeySet, MemoryResourceStore, ProviderInfo, ProviderType, ResourceGuard,
    ResourceTemplate, ResourceType, UmaScope,
};
use url::Url;

async fn user(Extension(scope): Extension<UmaScope>) -> axum::response::Response {
    // Verify the RPT here, and on failure:
    match scope.permission_challenge(&["read"]).await {
        Ok(challenge) => challenge.into_response(),
        Err(_) => StatusCode::BAD_GATEWAY.into_response(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let issuer = Url::parse("http://localhost:8080/realms/test")?;
    let http_client = reqwest::Client::new();
    let jwks_uri = Url::parse("http://localhost:8080/realms/test/protocol/openid-connect/certs")?;
    let key_set = Arc::new(JwksKeySet::fetch(&http_client, jwks_uri).await?);

    let guard = ResourceGuard::builder()
        .base_url(|_| Url::parse("http://localhost:8000/").expect("static url"))
        .provider_info(move |_| {
            ProviderInfo::new(
                issuer.clone(),
                ProviderType::KEYCLOAK,
                "resource-server",
                "secret",
                key_set.clone(),
            )
        })
        .resource_type(
            "user",
            ResourceType::new("https://example.com/rsrcs/user").scope("read"),
        )
        .resource_template(ResourceTemplate::new("/users/{id}", "user", "User {id}"))
        .resource_store(Arc::new(MemoryResourceStore::new()))
        .http_client(http_client)
        .build()?;

    let app = Router::new()
        .route("/users/{id}", get(user))
        .layer(guard.into_layer());

    let listener = tokio::net::TcpListener::bind("0.0.0.0:8000").await?;
    axum::serve(listener, app).await?;
    Ok(())
}
```
*/
mod challenge;
mod claim_token_format;
mod credentials;
mod discovered;
pub mod error;
mod http;
mod key_set;
mod matcher;
pub mod middleware;
mod permission_ticket;
pub mod provider;
mod registry;
mod resource;
mod rpt;
mod store;
mod template;

pub use challenge::UmaChallenge;
pub use claim_token_format::ClaimTokenFormat;
pub use credentials::Credentials;
pub use discovered::{discover_uma, UmaDiscovery};
pub use error::{Error, ErrorKind, OAuth2Error, OAuth2ErrorCode};
pub use key_set::{JwksKeySet, KeySet};
pub use matcher::ResourceMatcher;
pub use middleware::{
    ResourceGuard, ResourceGuardBuilder, ResourceLayer, ResourceService, UmaScope,
};
pub use permission_ticket::PermissionRequest;
pub use provider::{Provider, ProviderCore, ProviderFactory, ProviderInfo, ProviderType};
pub use registry::ProviderRegistry;
pub use resource::{Resource, ResourceType};
pub use rpt::{RptRequest, UMA_TICKET_GRANT_TYPE};
pub use store::{MemoryResourceStore, ResourceStore};
pub use template::{ResourceTemplate, ResourceTemplates};

/// Reimport `biscuit` dependency.
pub mod biscuit {
    pub use biscuit::*;
}
