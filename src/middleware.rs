//! Resource server middleware.
//!
//! [`ResourceGuard`] matches each request against the declared resource templates, resolves the
//! request's authorization server and makes sure the matched resource is registered there.
//! [`ResourceGuard::authorize`] returns the outcome as an [`UmaScope`] and is the primary API.
//! [`ResourceLayer`] is a convenience on top of it: it runs the guard in front of a tower service
//! and hands the scope to handlers as a request extension.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::request::Parts;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};
use tower::{Layer, Service};
use tracing::{debug, error, warn};
use url::Url;

use crate::challenge::UmaChallenge;
use crate::error::{Error, ErrorKind};
use crate::matcher::ResourceMatcher;
use crate::provider::{Provider, ProviderFactory, ProviderInfo, ProviderType};
use crate::registry::ProviderRegistry;
use crate::{Resource, ResourceStore, ResourceTemplate, ResourceTemplates, ResourceType};

type BaseUrlFn = dyn Fn(&Parts) -> Url + Send + Sync;
type ProviderInfoFn = dyn Fn(&Parts) -> ProviderInfo + Send + Sync;

/// Outcome of a matched request: the resource, registered, and its authorization server.
#[derive(Clone, Debug)]
pub struct UmaScope {
    pub provider: Arc<dyn Provider>,
    pub resource: Resource,
}

impl UmaScope {
    /// Requests a permission ticket for `scopes` of the matched resource and wraps it in the
    /// challenge a resource server answers unauthorized requests with.
    pub async fn permission_challenge(&self, scopes: &[&str]) -> Result<UmaChallenge, Error> {
        let resource_id = self
            .resource
            .id
            .as_deref()
            .ok_or_else(|| Error::UnregisteredResource(self.resource.name.clone()))?;
        let ticket = self
            .provider
            .request_permission_ticket(resource_id, scopes)
            .await?;
        Ok(UmaChallenge {
            realm: self.provider.realm().map(str::to_owned),
            as_uri: self.provider.authorization_server_uri().to_string(),
            ticket,
        })
    }
}

/// Resolves providers and registers resources for incoming requests.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use uma::{
///     JwksKeySet, MemoryResourceStore, ProviderInfo, ProviderType, ResourceGuard,
///     ResourceTemplate, ResourceType,
/// };
/// use url::Url;
///
/// # fn guard(key_set: JwksKeySet) -> Result<ResourceGuard, uma::Error> {
/// let key_set = Arc::new(key_set);
/// let guard = ResourceGuard::builder()
///     .base_url(|_| Url::parse("http://localhost:8000/api").unwrap())
///     .provider_info(move |_| ProviderInfo::new(
///         Url::parse("http://localhost:8080/realms/test").unwrap(),
///         ProviderType::KEYCLOAK,
///         "resource-server",
///         "secret",
///         key_set.clone(),
///     ))
///     .resource_type("user", ResourceType::new("https://example.com/rsrcs/user").scope("read"))
///     .resource_template(ResourceTemplate::new("/users/{id}", "user", "User {id}"))
///     .resource_store(Arc::new(MemoryResourceStore::new()))
///     .build()?;
/// # Ok(guard)
/// # }
/// ```
pub struct ResourceGuard {
    base_url: Arc<BaseUrlFn>,
    provider_info: Arc<ProviderInfoFn>,
    matcher: ResourceMatcher,
    registry: ProviderRegistry,
}

impl ResourceGuard {
    pub fn builder() -> ResourceGuardBuilder {
        ResourceGuardBuilder::default()
    }

    /// `None` when the request matches no resource template. Otherwise the provider is resolved
    /// and the resource registered before returning.
    ///
    /// The returned scope is meant to be threaded through the handler explicitly.
    /// [`ResourceLayer`] does the same through a request extension.
    pub async fn authorize(&self, parts: &Parts) -> Result<Option<UmaScope>, Error> {
        let base_url = (self.base_url)(parts);
        let path = parts.uri.path();
        let Some(mut resource) = self.matcher.match_request(&base_url, path).await else {
            debug!(path = %path, "no protected resource");
            return Ok(None);
        };

        let provider = self.registry.resolve((self.provider_info)(parts)).await?;
        provider.register_resource(&mut resource).await?;
        Ok(Some(UmaScope { provider, resource }))
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn matcher(&self) -> &ResourceMatcher {
        &self.matcher
    }

    pub fn into_layer(self) -> ResourceLayer {
        ResourceLayer::new(self)
    }
}

impl fmt::Debug for ResourceGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceGuard")
            .field("matcher", &self.matcher)
            .field("registry", &self.registry)
            .finish()
    }
}

/// Collects the configuration of a [`ResourceGuard`].
#[derive(Default)]
pub struct ResourceGuardBuilder {
    base_url: Option<Arc<BaseUrlFn>>,
    provider_info: Option<Arc<ProviderInfoFn>>,
    types: HashMap<String, ResourceType>,
    templates: ResourceTemplates,
    store: Option<Arc<dyn ResourceStore>>,
    http_client: Option<reqwest::Client>,
    factories: Vec<(ProviderType, Arc<dyn ProviderFactory>)>,
}

impl ResourceGuardBuilder {
    /// Base URL of the protected API, such as `https://api.example.com/v1`. Required.
    pub fn base_url<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&Parts) -> Url + Send + Sync + 'static,
    {
        self.base_url = Some(Arc::new(resolver));
        self
    }

    /// Authorization server of a request. Required.
    pub fn provider_info<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&Parts) -> ProviderInfo + Send + Sync + 'static,
    {
        self.provider_info = Some(Arc::new(resolver));
        self
    }

    pub fn resource_types(mut self, types: HashMap<String, ResourceType>) -> Self {
        self.types.extend(types);
        self
    }

    pub fn resource_type(mut self, name: impl Into<String>, resource_type: ResourceType) -> Self {
        self.types.insert(name.into(), resource_type);
        self
    }

    pub fn resource_templates(mut self, templates: ResourceTemplates) -> Self {
        self.templates.0.extend(templates.0);
        self
    }

    pub fn resource_template(mut self, template: ResourceTemplate) -> Self {
        self.templates.0.push(template);
        self
    }

    /// Required.
    pub fn resource_store(mut self, store: Arc<dyn ResourceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Client used for every call to authorization servers. Timeouts and proxies belong here.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    pub fn provider_factory(
        mut self,
        provider_type: impl Into<ProviderType>,
        factory: Arc<dyn ProviderFactory>,
    ) -> Self {
        self.factories.push((provider_type.into(), factory));
        self
    }

    pub fn build(self) -> Result<ResourceGuard, Error> {
        let base_url = self.base_url.ok_or(Error::MissingOption("base_url"))?;
        let provider_info = self
            .provider_info
            .ok_or(Error::MissingOption("provider_info"))?;
        let store = self.store.ok_or(Error::MissingOption("resource_store"))?;

        let matcher = ResourceMatcher::new(&self.types, &self.templates, store.clone())?;
        let registry = self.factories.into_iter().fold(
            ProviderRegistry::new(self.http_client.unwrap_or_default(), store),
            |registry, (provider_type, factory)| registry.with_factory(provider_type, factory),
        );

        Ok(ResourceGuard {
            base_url,
            provider_info,
            matcher,
            registry,
        })
    }
}

/// Tower layer running a [`ResourceGuard`] in front of the wrapped service.
///
/// Matched requests reach the inner service with an [`UmaScope`] extension. Handlers that want
/// the scope passed explicitly call [`ResourceGuard::authorize`] instead. Failures are answered
/// directly, with `500` for configuration problems and `502` when the authorization server fails.
#[derive(Clone)]
pub struct ResourceLayer {
    guard: Arc<ResourceGuard>,
}

impl ResourceLayer {
    pub fn new(guard: ResourceGuard) -> Self {
        Self {
            guard: Arc::new(guard),
        }
    }
}

impl<S> Layer<S> for ResourceLayer {
    type Service = ResourceService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        ResourceService {
            inner,
            guard: self.guard.clone(),
        }
    }
}

/// Created by [`ResourceLayer`].
#[derive(Clone)]
pub struct ResourceService<S> {
    inner: S,
    guard: Arc<ResourceGuard>,
}

impl<S> Service<Request<Body>> for ResourceService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
    S::Error: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let guard = self.guard.clone();
        // The service polled ready is the one called; the clone stays behind for the next call.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let (mut parts, body) = req.into_parts();
            match guard.authorize(&parts).await {
                Ok(Some(scope)) => {
                    parts.extensions.insert(scope);
                }
                Ok(None) => {}
                Err(err) => return Ok(error_response(&err)),
            }
            inner.call(Request::from_parts(parts, body)).await
        })
    }
}

fn error_response(err: &Error) -> Response {
    let (status, error) = match err.kind() {
        ErrorKind::Discovery | ErrorKind::Protocol | ErrorKind::Transport | ErrorKind::Decode => {
            (StatusCode::BAD_GATEWAY, "authorization_server_error")
        }
        ErrorKind::Configuration | ErrorKind::Usage | ErrorKind::Verification => {
            (StatusCode::INTERNAL_SERVER_ERROR, "server_error")
        }
    };
    if status == StatusCode::BAD_GATEWAY {
        warn!(error = %err, "authorization server failure");
    } else {
        error!(error = %err, "resource guard misconfigured");
    }

    let body = serde_json::json!({
        "error": error,
        "error_description": err.to_string(),
    });
    (status, axum::Json(body)).into_response()
}
