use core::fmt;

/// UMA2 claim token format
/// Either is an access token (urn:ietf:params:oauth:token-type:jwt) or an OIDC ID token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimTokenFormat {
    AccessToken, // urn:ietf:params:oauth:token-type:jwt
    IdToken,     // https://openid.net/specs/openid-connect-core-1_0.html#IDToken
}

impl ClaimTokenFormat {
    pub fn as_str(&self) -> &'static str {
        match *self {
            ClaimTokenFormat::AccessToken => "urn:ietf:params:oauth:token-type:jwt",
            ClaimTokenFormat::IdToken => {
                "https://openid.net/specs/openid-connect-core-1_0.html#IDToken"
            }
        }
    }
}

impl fmt::Display for ClaimTokenFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
