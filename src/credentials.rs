use chrono::{DateTime, Duration, Utc};
use serde::{de::Visitor, Deserialize, Deserializer};
use std::fmt;

/// Token endpoint response of every grant.
///
/// See [RFC 6749, section 5.1](http://tools.ietf.org/html/rfc6749#section-5.1).
#[derive(Deserialize, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_token: String,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(
        default,
        rename = "expires_in",
        deserialize_with = "expire_in_to_instant"
    )]
    pub expires: Option<DateTime<Utc>>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"***")
            .field("id_token", &self.id_token.as_ref().map(|_| "***"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "***"))
            .field("scope", &self.scope)
            .field("expires", &self.expires)
            .finish()
    }
}

fn expire_in_to_instant<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    struct ExpireInVisitor;

    impl<'de> Visitor<'de> for ExpireInVisitor {
        type Value = Option<DateTime<Utc>>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("an integer containing seconds")
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(None)
        }

        fn visit_some<D>(self, d: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let expire_in: u64 = serde::de::Deserialize::deserialize(d)?;
            // Beyond what DateTime can represent, the token never expires in practice.
            Ok(i64::try_from(expire_in)
                .ok()
                .and_then(Duration::try_seconds)
                .and_then(|lifetime| Utc::now().checked_add_signed(lifetime)))
        }
    }

    deserializer.deserialize_option(ExpireInVisitor)
}

impl Credentials {
    pub fn expired(&self) -> bool {
        self.expires_within(Duration::zero())
    }

    /// Whether the credentials expire in less than `margin` from now.
    pub fn expires_within(&self, margin: Duration) -> bool {
        match self.expires {
            Some(expires) => Utc::now()
                .checked_add_signed(margin)
                .map_or(true, |deadline| expires < deadline),
            None => false,
        }
    }
}
