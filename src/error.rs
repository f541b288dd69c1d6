/*!
Errors returned by the UMA resource server engine.
*/
use serde::Deserialize;
use std::fmt;

pub use biscuit::errors::Error as Jose;
pub use reqwest::Error as Http;
pub use serde_json::Error as Json;

/// OAuth 2.0 error.
///
/// See [RFC 6749, section 5.2](http://tools.ietf.org/html/rfc6749#section-5.2).
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct OAuth2Error {
    /// Error code.
    pub error: OAuth2ErrorCode,

    /// Human-readable text providing additional information about the error.
    pub error_description: Option<String>,

    /// A URI identifying a human-readable web page with information about the error.
    pub error_uri: Option<String>,
}

impl fmt::Display for OAuth2Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "{:?}", self.error)?;
        if let Some(ref description) = self.error_description {
            write!(f, ": {}", description)?;
        }
        if let Some(ref uri) = self.error_uri {
            write!(f, " ({})", uri)?;
        }
        Ok(())
    }
}

impl std::error::Error for OAuth2Error {}

/// OAuth 2.0 error codes.
///
/// See [RFC 6749, section 5.2](http://tools.ietf.org/html/rfc6749#section-5.2). Keycloak also
/// answers a denied `uma-ticket` grant with `access_denied`.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(from = "String")]
pub enum OAuth2ErrorCode {
    /// The request is missing a required parameter, includes an unsupported parameter value (other
    /// than grant type), repeats a parameter, includes multiple credentials, utilizes more than
    /// one mechanism for authenticating the client, or is otherwise malformed.
    InvalidRequest,

    /// Client authentication failed (e.g., unknown client, no client authentication included, or
    /// unsupported authentication method).
    InvalidClient,

    /// The provided authorization grant (e.g., authorization code, resource owner credentials) or
    /// refresh token is invalid, expired, revoked, does not match the redirection URI used in the
    /// authorization request, or was issued to another client.
    InvalidGrant,

    /// The authenticated client is not authorized to use this authorization grant type.
    UnauthorizedClient,

    /// The authorization grant type is not supported by the authorization server.
    UnsupportedGrantType,

    /// The requested scope is invalid, unknown, malformed, or exceeds the scope granted by the
    /// resource owner.
    InvalidScope,

    /// The authorization server refused the requested permissions.
    AccessDenied,

    /// An unrecognized error code, not defined in RFC 6749.
    Unrecognized(String),
}

impl<'a> From<&'a str> for OAuth2ErrorCode {
    fn from(s: &str) -> OAuth2ErrorCode {
        match s {
            "invalid_request" => OAuth2ErrorCode::InvalidRequest,
            "invalid_client" => OAuth2ErrorCode::InvalidClient,
            "invalid_grant" => OAuth2ErrorCode::InvalidGrant,
            "unauthorized_client" => OAuth2ErrorCode::UnauthorizedClient,
            "unsupported_grant_type" => OAuth2ErrorCode::UnsupportedGrantType,
            "invalid_scope" => OAuth2ErrorCode::InvalidScope,
            "access_denied" => OAuth2ErrorCode::AccessDenied,
            s => OAuth2ErrorCode::Unrecognized(s.to_owned()),
        }
    }
}

impl From<String> for OAuth2ErrorCode {
    fn from(s: String) -> OAuth2ErrorCode {
        OAuth2ErrorCode::from(s.as_str())
    }
}

/// A protocol call answered with a non-success status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    /// Upstream HTTP status code.
    pub status: u16,
    /// Upstream response body, as text.
    pub body: String,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        write!(f, "authorization server responded with status {}", self.status)?;
        if !self.body.is_empty() {
            write!(f, ": {}", self.body)?;
        }
        Ok(())
    }
}

impl std::error::Error for ProtocolError {}

/// Invalid resource template set.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TemplateError {
    #[error("Resource template '{path}' is invalid: {reason}")]
    InvalidPath { path: String, reason: &'static str },
    #[error("Resource template '{path}' references unknown resource type '{resource_type}'")]
    UnknownResourceType { path: String, resource_type: String },
    #[error("Resource name '{name}' of template '{path}' references unknown variable '{variable}'")]
    UnknownVariable {
        path: String,
        name: String,
        variable: String,
    },
    #[error("Resource templates '{first}' and '{second}' match the same paths")]
    Ambiguous { first: String, second: String },
    #[error("Resource template '{shadowed}' is unreachable behind '{by}'")]
    Shadowed { shadowed: String, by: String },
}

/// Token decoding failures of [`JwksKeySet`](crate::JwksKeySet).
#[derive(Debug, thiserror::Error)]
pub enum Decode {
    #[error("Token Missing a Key Id when the key set has multiple keys")]
    MissingKid,
    #[error("Token wants this key id not in the key set: {0}")]
    MissingKey(String),
    #[error("JWK Set is empty")]
    EmptySet,
    #[error("Key type mismatch, expected {expected}, got {actual}")]
    WrongKeyType { expected: String, actual: String },
    #[error("Unsupported key type")]
    UnsupportedKey,
}

/// Category of an [`Error`], following the failure taxonomy of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Host configuration is invalid: unsupported provider type, bad templates, missing options.
    Configuration,
    /// Discovery of the authorization server failed.
    Discovery,
    /// The authorization server answered with a non-success status.
    Protocol,
    /// The authorization server could not be reached.
    Transport,
    /// A response body could not be decoded.
    Decode,
    /// An operation was called out of order or without what it needs.
    Usage,
    /// A token signature could not be verified.
    Verification,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unsupported provider type '{0}'")]
    UnsupportedProviderType(String),
    #[error("{0}")]
    Template(#[from] TemplateError),
    #[error("Required option '{0}' is not set")]
    MissingOption(&'static str),
    #[error("UMA discovery failed for '{issuer}': {reason}")]
    Discovery { issuer: String, reason: String },
    #[error("No UMA2 discovered")]
    NoUma2Discovered,
    #[error("No {0} discovered")]
    MissingEndpoint(&'static str),
    #[error("Credentials have no refresh token")]
    MissingRefreshToken,
    #[error("Resource '{0}' is not registered")]
    UnregisteredResource(String),
    #[error("Url: Path segments is cannot-be-a-base")]
    CannotBeABase,
    #[error("{0}")]
    Protocol(ProtocolError),
    #[error("{error} (status {status})")]
    OAuth2 { status: u16, error: OAuth2Error },
    #[error("{0}")]
    Http(#[from] Http),
    #[error("{0}")]
    Json(#[from] Json),
    #[error("{0}")]
    Url(#[from] url::ParseError),
    #[error("{0}")]
    InvalidHeader(#[from] reqwest::header::InvalidHeaderValue),
    #[error("{0}")]
    Jose(#[from] Jose),
    #[error("{0}")]
    Decode(#[from] Decode),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::UnsupportedProviderType(_) | Error::Template(_) | Error::MissingOption(_) => {
                ErrorKind::Configuration
            }
            Error::Discovery { .. } => ErrorKind::Discovery,
            Error::NoUma2Discovered
            | Error::MissingEndpoint(_)
            | Error::MissingRefreshToken
            | Error::UnregisteredResource(_)
            | Error::CannotBeABase
            | Error::Url(_)
            | Error::InvalidHeader(_) => ErrorKind::Usage,
            Error::Protocol(_) | Error::OAuth2 { .. } => ErrorKind::Protocol,
            Error::Http(err) if err.is_decode() => ErrorKind::Decode,
            Error::Http(_) => ErrorKind::Transport,
            Error::Json(_) => ErrorKind::Decode,
            Error::Jose(_) | Error::Decode(_) => ErrorKind::Verification,
        }
    }

    /// Upstream HTTP status, when the authorization server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Protocol(err) => Some(err.status),
            Error::OAuth2 { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the authorization server explicitly refused the requested permissions.
    ///
    /// This is an authorization outcome, not a server-side failure.
    pub fn is_access_denied(&self) -> bool {
        matches!(
            self,
            Error::OAuth2 {
                error: OAuth2Error {
                    error: OAuth2ErrorCode::AccessDenied,
                    ..
                },
                ..
            }
        )
    }

    pub(crate) fn discovery(issuer: &url::Url, reason: impl fmt::Display) -> Self {
        Error::Discovery {
            issuer: issuer.to_string(),
            reason: reason.to_string(),
        }
    }
}
