use crate::error::{Error, OAuth2Error, ProtocolError};
use reqwest::Response;
use serde::de::DeserializeOwned;

/// Passes successful responses through and turns any other status into [`Error::Protocol`].
pub(crate) async fn ensure_success(resp: Response) -> Result<Response, Error> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Protocol(ProtocolError {
        status: status.as_u16(),
        body,
    }))
}

/// Like [`ensure_success`], but token endpoint error documents become [`Error::OAuth2`].
pub(crate) async fn ensure_token_success(resp: Response) -> Result<Response, Error> {
    match ensure_success(resp).await {
        Err(Error::Protocol(err)) => match serde_json::from_str::<OAuth2Error>(&err.body) {
            Ok(error) => Err(Error::OAuth2 {
                status: err.status,
                error,
            }),
            Err(_) => Err(Error::Protocol(err)),
        },
        other => other,
    }
}

pub(crate) async fn decode_json<T: DeserializeOwned>(resp: Response) -> Result<T, Error> {
    let body = resp.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}
