use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::fmt;

/// `WWW-Authenticate` challenge sent with a permission ticket.
///
/// See [UMA 2.0 Grant, section 3.2](https://docs.kantarainitiative.org/uma/wg/rec-oauth-uma-grant-2.0.html#permission-success-to-client).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UmaChallenge {
    pub realm: Option<String>,
    pub as_uri: String,
    pub ticket: String,
}

impl fmt::Display for UmaChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UMA ")?;
        if let Some(ref realm) = self.realm {
            write!(f, "realm=\"{}\", ", realm)?;
        }
        write!(f, "as_uri=\"{}\", ticket=\"{}\"", self.as_uri, self.ticket)
    }
}

impl IntoResponse for UmaChallenge {
    /// `401 Unauthorized` carrying the challenge.
    fn into_response(self) -> Response {
        match HeaderValue::from_str(&self.to_string()) {
            Ok(value) => {
                (StatusCode::UNAUTHORIZED, [(header::WWW_AUTHENTICATE, value)]).into_response()
            }
            Err(_) => StatusCode::UNAUTHORIZED.into_response(),
        }
    }
}
