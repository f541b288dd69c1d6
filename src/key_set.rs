use crate::error::{Decode, Error};
use async_trait::async_trait;
use biscuit::jwa::{self, SignatureAlgorithm};
use biscuit::jwk::{AlgorithmParameters, EllipticCurve, EllipticCurveKeyParameters, JWKSet};
use biscuit::jws::{Compact, Secret};
use biscuit::{CompactJson, Empty};
use serde::{Deserialize, Serialize};
use url::Url;

/// Verifies token signatures.
///
/// Only the signature is checked. Header and claim fields (algorithm policy, issuer, audience,
/// expiry) are validated elsewhere.
#[async_trait]
pub trait KeySet: Send + Sync {
    /// Verifies the signature of a compact JWS and returns its raw payload.
    async fn verify_signature(&self, token: &str) -> Result<Vec<u8>, Error>;
}

// Common pattern in the JwksKeySet::decode function when dealing with mismatched keys
macro_rules! wrong_key {
    ($expected:expr, $actual:expr) => {
        Err(Decode::WrongKeyType {
            expected: format!("{:?}", $expected),
            actual: format!("{:?}", $actual),
        }
        .into())
    };
}

#[derive(Deserialize, Serialize)]
#[serde(transparent)]
struct Payload(serde_json::Map<String, serde_json::Value>);

impl CompactJson for Payload {}

/// [`KeySet`] backed by a JSON Web Key Set.
#[derive(Debug, Clone)]
pub struct JwksKeySet {
    jwks: JWKSet<Empty>,
}

impl JwksKeySet {
    pub fn new(jwks: JWKSet<Empty>) -> Self {
        Self { jwks }
    }

    /// Get the JWK set from the given Url.
    pub async fn fetch(client: &reqwest::Client, url: Url) -> Result<Self, Error> {
        let resp = client.get(url).send().await?.error_for_status()?;
        let jwks = resp.json().await?;
        Ok(Self::new(jwks))
    }

    /// Errors are:
    ///
    /// - Decode::MissingKid if the keyset has multiple keys but the key id on the token is missing
    /// - Decode::MissingKey if the given key id is not in the key set
    /// - Decode::EmptySet if the keyset is empty
    /// - Decode::WrongKeyType if the alg of the key and the alg in the token header mismatch
    /// - Jose error if decoding fails
    fn decode(&self, token: &str) -> Result<Vec<u8>, Error> {
        let token = Compact::<Payload, Empty>::new_encoded(token);

        let header = token.unverified_header()?;
        // If there is more than one key, the token MUST have a key id
        let key = if self.jwks.keys.len() > 1 {
            let token_kid = header.registered.key_id.ok_or(Decode::MissingKid)?;
            self.jwks
                .find(&token_kid)
                .ok_or(Decode::MissingKey(token_kid))?
        } else {
            self.jwks.keys.first().ok_or(Decode::EmptySet)?
        };

        let alg = header.registered.algorithm;
        if let Some(declared) = key.common.algorithm.as_ref() {
            match declared {
                jwa::Algorithm::Signature(sig) if *sig != alg => return wrong_key!(sig, alg),
                jwa::Algorithm::Signature(_) => {}
                other => return wrong_key!(SignatureAlgorithm::default(), other),
            }
        }

        let secret = match key.algorithm {
            AlgorithmParameters::OctetKey(ref params) => match alg {
                SignatureAlgorithm::HS256 | SignatureAlgorithm::HS384 | SignatureAlgorithm::HS512 => {
                    Secret::Bytes(params.value.clone())
                }
                _ => return wrong_key!("HS256 | HS384 | HS512", alg),
            },
            AlgorithmParameters::RSA(ref params) => match alg {
                SignatureAlgorithm::RS256
                | SignatureAlgorithm::RS384
                | SignatureAlgorithm::RS512
                | SignatureAlgorithm::PS256
                | SignatureAlgorithm::PS384
                | SignatureAlgorithm::PS512 => params.jws_public_key_secret(),
                _ => return wrong_key!("RS256 | RS384 | RS512 | PS256 | PS384 | PS512", alg),
            },
            AlgorithmParameters::EllipticCurve(ref params) => match (alg, &params.curve) {
                (SignatureAlgorithm::ES256, EllipticCurve::P256)
                | (SignatureAlgorithm::ES384, EllipticCurve::P384) => ec_public_key(params),
                _ => return wrong_key!(params.curve, alg),
            },
            _ => return Err(Decode::UnsupportedKey.into()),
        };

        let decoded = token.decode(&secret, alg)?;
        let payload = decoded.payload()?;
        Ok(serde_json::to_vec(&payload.0)?)
    }
}

// Uncompressed SEC1 point, 0x04 || x || y
fn ec_public_key(params: &EllipticCurveKeyParameters) -> Secret {
    let mut point = Vec::with_capacity(1 + params.x.len() + params.y.len());
    point.push(0x04);
    point.extend_from_slice(&params.x);
    point.extend_from_slice(&params.y);
    Secret::PublicKey(point)
}

#[async_trait]
impl KeySet for JwksKeySet {
    async fn verify_signature(&self, token: &str) -> Result<Vec<u8>, Error> {
        self.decode(token)
    }
}
