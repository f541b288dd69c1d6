mod permission;

pub use permission::{DecisionStrategy, PermissionAssociation, PermissionLogic};

use super::{Provider, ProviderCore, ProviderFactory};
use crate::error::Error;
use crate::http::{decode_json, ensure_success, ensure_token_success};
use crate::{Credentials, RptRequest};
use async_trait::async_trait;
use chrono::Duration;
use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Request, Response};
use std::any::Any;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;
use url::form_urlencoded::Serializer;
use url::Url;

// A PAT this close to expiry is replaced before use.
const PAT_EXPIRY_MARGIN: Duration = Duration::seconds(30);

/// Keycloak Authorization Services binding.
///
/// Protection API calls carry a PAT obtained with the client credentials grant. The PAT is
/// reused until it expires.
pub struct KeycloakProvider {
    core: ProviderCore,
    realm: Option<String>,
    pat: Mutex<Option<Credentials>>,
}

impl KeycloakProvider {
    pub fn new(core: ProviderCore) -> Self {
        let realm = realm_from_issuer(core.issuer());
        Self {
            core,
            realm,
            pat: Mutex::new(None),
        }
    }

    /// Client credentials grant, authenticating the resource server itself.
    pub async fn authenticate_client(&self) -> Result<Credentials, Error> {
        let body = {
            let mut body = Serializer::new(String::new());
            body.append_pair("grant_type", "client_credentials");
            body.append_pair("client_id", self.core.client_id());
            body.append_pair("client_secret", self.core.client_secret());
            body.finish()
        };
        self.post_token(body, None).await
    }

    /// Resource owner password grant.
    pub async fn authenticate_user_with_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Credentials, Error> {
        let body = {
            let mut body = Serializer::new(String::new());
            body.append_pair("grant_type", "password");
            body.append_pair("client_id", self.core.client_id());
            body.append_pair("client_secret", self.core.client_secret());
            body.append_pair("scope", "openid");
            body.append_pair("username", username);
            body.append_pair("password", password);
            body.finish()
        };
        self.post_token(body, None).await
    }

    /// Refresh token grant. When the response omits a refresh token, the current one is kept.
    pub async fn refresh_credentials(&self, credentials: &Credentials) -> Result<Credentials, Error> {
        let refresh_token = credentials
            .refresh_token
            .as_deref()
            .ok_or(Error::MissingRefreshToken)?;

        let body = {
            let mut body = Serializer::new(String::new());
            body.append_pair("grant_type", "refresh_token");
            body.append_pair("client_id", self.core.client_id());
            body.append_pair("client_secret", self.core.client_secret());
            body.append_pair("refresh_token", refresh_token);
            body.finish()
        };

        let mut refreshed = self.post_token(body, None).await?;
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = Some(refresh_token.to_owned());
        }
        debug!(issuer = %self.core.issuer(), "refreshed credentials");
        Ok(refreshed)
    }

    /// UMA ticket grant. Exchanges `access_token` for a requesting party token.
    ///
    /// A refusal is reported as an OAuth2 `access_denied` error, see [`Error::is_access_denied`].
    pub async fn request_rpt(
        &self,
        access_token: &str,
        request: &RptRequest,
    ) -> Result<String, Error> {
        let credentials = self
            .post_token(request.form_body(), Some(access_token))
            .await?;
        Ok(credentials.access_token)
    }

    /// Grants a user-managed permission on a registered resource.
    pub async fn create_permission_for_resource(
        &self,
        resource_id: &str,
        permission: &PermissionAssociation,
    ) -> Result<PermissionAssociation, Error> {
        let mut url = self
            .core
            .discovery()?
            .policy_endpoint
            .clone()
            .ok_or(Error::MissingEndpoint("policy_endpoint"))?;
        url.path_segments_mut()
            .map_err(|_| Error::CannotBeABase)?
            .pop_if_empty()
            .push(resource_id);

        let request = self
            .core
            .http_client()
            .post(url)
            .header(ACCEPT, mime::APPLICATION_JSON.as_ref())
            .json(permission)
            .build()?;
        let resp = ensure_success(self.do_request(request).await?).await?;
        decode_json(resp).await
    }

    async fn post_token(&self, body: String, bearer: Option<&str>) -> Result<Credentials, Error> {
        let token_endpoint = &self.core.discovery()?.token_endpoint;
        let mut request = self
            .core
            .http_client()
            .post(token_endpoint.clone())
            .header(ACCEPT, mime::APPLICATION_JSON.as_ref())
            .header(CONTENT_TYPE, mime::APPLICATION_WWW_FORM_URLENCODED.as_ref())
            .body(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }
        let resp = ensure_token_success(self.core.execute(request.build()?).await?).await?;
        decode_json(resp).await
    }

    async fn protection_token(&self) -> Result<String, Error> {
        let mut pat = self.pat.lock().await;
        if let Some(ref credentials) = *pat {
            if !credentials.expires_within(PAT_EXPIRY_MARGIN) {
                return Ok(credentials.access_token.clone());
            }
            debug!(issuer = %self.core.issuer(), "protection API token expired");
        }
        let credentials = self.authenticate_client().await?;
        let access_token = credentials.access_token.clone();
        *pat = Some(credentials);
        Ok(access_token)
    }
}

#[async_trait]
impl Provider for KeycloakProvider {
    fn core(&self) -> &ProviderCore {
        &self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn realm(&self) -> Option<&str> {
        self.realm.as_deref()
    }

    async fn do_request(&self, mut request: Request) -> Result<Response, Error> {
        let pat = self.protection_token().await?;
        let value = HeaderValue::from_str(&format!("Bearer {}", pat))?;
        request.headers_mut().insert(AUTHORIZATION, value);
        self.core.execute(request).await
    }
}

/// Builds [`KeycloakProvider`]s. Registered for [`ProviderType::KEYCLOAK`](super::ProviderType::KEYCLOAK).
#[derive(Debug, Clone, Copy, Default)]
pub struct KeycloakFactory;

impl ProviderFactory for KeycloakFactory {
    fn create(&self, core: ProviderCore) -> Result<Arc<dyn Provider>, Error> {
        Ok(Arc::new(KeycloakProvider::new(core)))
    }
}

// http://host/realms/{realm}
fn realm_from_issuer(issuer: &Url) -> Option<String> {
    let mut segments = issuer.path_segments()?;
    segments.find(|segment| *segment == "realms")?;
    segments
        .next()
        .filter(|realm| !realm.is_empty())
        .map(str::to_owned)
}
