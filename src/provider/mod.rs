/*!
UMA 2.0 authorization server bindings.

[`Provider`] carries the protocol shared by every authorization server: discovery, idempotent
resource registration, permission tickets and signature verification. Concrete bindings only
decide how outbound calls are authenticated ([`Provider::do_request`]) and may add their own
grants on top.
*/
#[cfg(any(feature = "keycloak", doc))]
/// Keycloak Authorization Services.
///
/// See [Keycloak Authorization Services](https://www.keycloak.org/docs/latest/authorization_services/).
pub mod keycloak;

use crate::discovered::{discover_uma, UmaDiscovery};
use crate::error::Error;
use crate::http::{decode_json, ensure_success};
use crate::permission_ticket::{PermissionRequest, PermissionTicket};
use crate::{KeySet, Resource, ResourceStore};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, Request, Response};
use serde::Deserialize;
use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;

/// Tag selecting the [`ProviderFactory`] that builds a provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderType(Cow<'static, str>);

impl ProviderType {
    pub const KEYCLOAK: ProviderType = ProviderType(Cow::Borrowed("keycloak"));

    pub fn new(tag: impl Into<Cow<'static, str>>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for ProviderType {
    fn from(tag: &'static str) -> Self {
        Self(Cow::Borrowed(tag))
    }
}

impl From<String> for ProviderType {
    fn from(tag: String) -> Self {
        Self(Cow::Owned(tag))
    }
}

/// Everything needed to build a provider for one issuer, resolved per request.
#[derive(Clone)]
pub struct ProviderInfo {
    pub issuer: Url,
    pub provider_type: ProviderType,
    pub client_id: String,
    pub client_secret: String,
    pub key_set: Arc<dyn KeySet>,
}

impl ProviderInfo {
    pub fn new(
        issuer: Url,
        provider_type: impl Into<ProviderType>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        key_set: Arc<dyn KeySet>,
    ) -> Self {
        Self {
            issuer,
            provider_type: provider_type.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            key_set,
        }
    }
}

impl fmt::Debug for ProviderInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderInfo")
            .field("issuer", &self.issuer.as_str())
            .field("provider_type", &self.provider_type)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

/// State and transport shared by every provider binding.
///
/// Holds the discovery document, populated once, and the per-name registration cache.
pub struct ProviderCore {
    issuer: Url,
    client_id: String,
    client_secret: String,
    key_set: Arc<dyn KeySet>,
    http_client: Client,
    store: Arc<dyn ResourceStore>,
    discovery: OnceCell<UmaDiscovery>,
    registered: Mutex<HashMap<String, Arc<OnceCell<String>>>>,
}

impl ProviderCore {
    pub fn new(info: ProviderInfo, http_client: Client, store: Arc<dyn ResourceStore>) -> Self {
        Self {
            issuer: info.issuer,
            client_id: info.client_id,
            client_secret: info.client_secret,
            key_set: info.key_set,
            http_client,
            store,
            discovery: OnceCell::new(),
            registered: Mutex::new(HashMap::new()),
        }
    }

    pub fn issuer(&self) -> &Url {
        &self.issuer
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }

    pub fn http_client(&self) -> &Client {
        &self.http_client
    }

    pub fn key_set(&self) -> &dyn KeySet {
        self.key_set.as_ref()
    }

    pub fn store(&self) -> &dyn ResourceStore {
        self.store.as_ref()
    }

    /// Fetches the discovery document on first call. Concurrent callers share one fetch, and a
    /// failed fetch leaves the core undiscovered.
    pub async fn discover(&self) -> Result<&UmaDiscovery, Error> {
        self.discovery
            .get_or_try_init(|| async {
                let discovery = discover_uma(&self.http_client, &self.issuer).await?;
                info!(issuer = %self.issuer, "discovered UMA authorization server");
                Ok::<_, Error>(discovery)
            })
            .await
    }

    /// The discovery document, or [`Error::NoUma2Discovered`] before [`discover`](Self::discover)
    /// succeeded.
    pub fn discovery(&self) -> Result<&UmaDiscovery, Error> {
        self.discovery.get().ok_or(Error::NoUma2Discovered)
    }

    /// Sends `request` as is.
    pub async fn execute(&self, request: Request) -> Result<Response, Error> {
        Ok(self.http_client.execute(request).await?)
    }

    /// Id registered for `name` by this provider, if any.
    pub fn cached_id(&self, name: &str) -> Option<String> {
        let registered = self.registered.lock().unwrap_or_else(PoisonError::into_inner);
        registered.get(name)?.get().cloned()
    }

    fn registration(&self, name: &str) -> Arc<OnceCell<String>> {
        let mut registered = self.registered.lock().unwrap_or_else(PoisonError::into_inner);
        registered.entry(name.to_owned()).or_default().clone()
    }

    // Only drops the cell of a failed attempt, never one a concurrent retry already replaced.
    fn forget(&self, name: &str, cell: &Arc<OnceCell<String>>) {
        let mut registered = self.registered.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = registered.get(name) {
            if Arc::ptr_eq(current, cell) && !current.initialized() {
                registered.remove(name);
            }
        }
    }
}

impl fmt::Debug for ProviderCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCore")
            .field("issuer", &self.issuer.as_str())
            .field("client_id", &self.client_id)
            .field("discovered", &self.discovery.initialized())
            .finish()
    }
}

#[derive(Deserialize)]
struct Created {
    #[serde(rename = "_id")]
    id: String,
}

/// An UMA 2.0 authorization server, as seen by a resource server.
#[async_trait]
pub trait Provider: Send + Sync {
    fn core(&self) -> &ProviderCore;

    fn as_any(&self) -> &dyn Any;

    /// Realm of the authorization server, when the binding has one.
    fn realm(&self) -> Option<&str> {
        None
    }

    fn authorization_server_uri(&self) -> &Url {
        self.core().issuer()
    }

    /// Every protocol call goes through here. Bindings attach their authentication.
    async fn do_request(&self, request: Request) -> Result<Response, Error> {
        self.core().execute(request).await
    }

    /// Discovers the authorization server. Must succeed before any other protocol operation.
    async fn discover_uma(&self) -> Result<(), Error> {
        self.core().discover().await.map(|_| ())
    }

    async fn verify_signature(&self, token: &str) -> Result<Vec<u8>, Error> {
        self.core().key_set().verify_signature(token).await
    }

    /// Registers `resource` unless this provider already knows its name, and sets its id.
    ///
    /// A resource pre-filled with an id is adopted without calling the authorization server.
    /// Concurrent calls for the same name share a single registration.
    async fn register_resource(&self, resource: &mut Resource) -> Result<(), Error> {
        let core = self.core();
        let endpoint = &core.discovery()?.resource_registration_endpoint;

        let cell = core.registration(&resource.name);
        if let Some(id) = cell.get() {
            debug!(name = %resource.name, id = %id, "resource already registered");
            resource.id = Some(id.clone());
            return Ok(());
        }

        let pending: &Resource = resource;
        let result = cell
            .get_or_try_init(|| async move {
                if let Some(ref id) = pending.id {
                    debug!(name = %pending.name, id = %id, "adopting stored resource id");
                    return Ok(id.clone());
                }
                let id = create_resource(self, endpoint, pending).await?;
                core.store().set(&pending.name, &id).await;
                info!(name = %pending.name, id = %id, "registered resource");
                Ok::<_, Error>(id)
            })
            .await
            .cloned();

        match result {
            Ok(id) => {
                resource.id = Some(id);
                Ok(())
            }
            Err(err) => {
                core.forget(&resource.name, &cell);
                Err(err)
            }
        }
    }

    /// Requests a permission ticket for `scopes` of a registered resource.
    async fn request_permission_ticket(
        &self,
        resource_id: &str,
        scopes: &[&str],
    ) -> Result<String, Error> {
        let core = self.core();
        let endpoint = &core.discovery()?.permission_endpoint;
        let body = [PermissionRequest::new(resource_id, scopes.iter().copied())];
        let request = core
            .http_client()
            .post(endpoint.clone())
            .header(ACCEPT, mime::APPLICATION_JSON.as_ref())
            .json(&body)
            .build()?;
        let resp = ensure_success(self.do_request(request).await?).await?;
        let ticket: PermissionTicket = decode_json(resp).await?;
        Ok(ticket.ticket)
    }
}

impl fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("issuer", &self.authorization_server_uri().as_str())
            .field("realm", &self.realm())
            .finish()
    }
}

impl dyn Provider {
    /// The concrete binding, to reach grants beyond the shared protocol.
    pub fn downcast_ref<T: Provider + 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref()
    }
}

async fn create_resource<P: Provider + ?Sized>(
    provider: &P,
    endpoint: &Url,
    resource: &Resource,
) -> Result<String, Error> {
    let request = provider
        .core()
        .http_client()
        .post(endpoint.clone())
        .header(ACCEPT, mime::APPLICATION_JSON.as_ref())
        .json(resource)
        .build()?;
    let resp = ensure_success(provider.do_request(request).await?).await?;
    let created: Created = decode_json(resp).await?;
    Ok(created.id)
}

/// Builds providers of one [`ProviderType`].
pub trait ProviderFactory: Send + Sync {
    fn create(&self, core: ProviderCore) -> Result<Arc<dyn Provider>, Error>;
}

impl<F> ProviderFactory for F
where
    F: Fn(ProviderCore) -> Result<Arc<dyn Provider>, Error> + Send + Sync,
{
    fn create(&self, core: ProviderCore) -> Result<Arc<dyn Provider>, Error> {
        self(core)
    }
}
