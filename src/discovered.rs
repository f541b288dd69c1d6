use crate::error::Error;
use crate::http::ensure_success;
use reqwest::header::ACCEPT;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

/// UMA 2.0 authorization server metadata.
///
/// See [UMA 2.0 Grant, section 2](https://docs.kantarainitiative.org/uma/wg/rec-oauth-uma-grant-2.0.html#as-config)
/// and [Federated Authorization, section 2](https://docs.kantarainitiative.org/uma/wg/rec-oauth-uma-federated-authz-2.0.html#as-config).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct UmaDiscovery {
    #[serde(default)]
    pub issuer: Option<Url>,
    /// Token endpoint, used for every grant including the `uma-ticket` grant.
    pub token_endpoint: Url,
    /// Endpoint resource servers register their protected resources at.
    pub resource_registration_endpoint: Url,
    /// Endpoint resource servers request permission tickets at.
    pub permission_endpoint: Url,
    #[serde(default)]
    pub authorization_endpoint: Option<Url>,
    #[serde(default)]
    pub jwks_uri: Option<Url>,
    #[serde(default)]
    pub introspection_endpoint: Option<Url>,
    /// Keycloak extension: API to associate permissions to resources on behalf of their owners.
    #[serde(default)]
    pub policy_endpoint: Option<Url>,
}

/// Fetches `{issuer}/.well-known/uma2-configuration`.
///
/// Any failure, including a document without the required endpoints, is reported as
/// [`Error::Discovery`].
pub async fn discover_uma(client: &Client, issuer: &Url) -> Result<UmaDiscovery, Error> {
    let mut url = issuer.clone();
    url.path_segments_mut()
        .map_err(|_| Error::CannotBeABase)?
        .pop_if_empty()
        .extend(&[".well-known", "uma2-configuration"]);

    let discover = async {
        let resp = client.get(url).header(ACCEPT, mime::APPLICATION_JSON.as_ref()).send().await?;
        let body = ensure_success(resp).await?.bytes().await?;
        serde_json::from_slice::<UmaDiscovery>(&body).map_err(Error::from)
    };
    discover.await.map_err(|err| Error::discovery(issuer, err))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keycloak_document() {
        let json = r#"{
            "issuer": "http://localhost:8080/realms/test-realm",
            "authorization_endpoint": "http://localhost:8080/realms/test-realm/protocol/openid-connect/auth",
            "token_endpoint": "http://localhost:8080/realms/test-realm/protocol/openid-connect/token",
            "introspection_endpoint": "http://localhost:8080/realms/test-realm/protocol/openid-connect/token/introspect",
            "end_session_endpoint": "http://localhost:8080/realms/test-realm/protocol/openid-connect/logout",
            "jwks_uri": "http://localhost:8080/realms/test-realm/protocol/openid-connect/certs",
            "grant_types_supported": ["authorization_code", "urn:ietf:params:oauth:grant-type:uma-ticket"],
            "resource_registration_endpoint": "http://localhost:8080/realms/test-realm/authz/protection/resource_set",
            "permission_endpoint": "http://localhost:8080/realms/test-realm/authz/protection/permission",
            "policy_endpoint": "http://localhost:8080/realms/test-realm/authz/protection/uma-policy"
        }"#;
        let discovery: UmaDiscovery = serde_json::from_str(json).unwrap();
        assert_eq!(
            "http://localhost:8080/realms/test-realm/authz/protection/permission",
            discovery.permission_endpoint.as_str()
        );
        assert!(discovery.policy_endpoint.is_some());
    }

    #[test]
    fn missing_required_endpoint() {
        let json = r#"{"token_endpoint": "http://localhost:8080/token"}"#;
        assert!(serde_json::from_str::<UmaDiscovery>(json).is_err());
    }
}
