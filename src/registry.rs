use crate::error::Error;
use crate::provider::{Provider, ProviderCore, ProviderFactory, ProviderInfo, ProviderType};
use crate::ResourceStore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};
use url::Url;

type ProviderCell = Arc<OnceCell<Arc<dyn Provider>>>;

/// Discovered providers, one per issuer, built on first use.
///
/// Concurrent requests for an issuer that is not cached yet wait for a single construction and
/// discovery. A failed attempt is not cached, so the next request retries.
pub struct ProviderRegistry {
    http_client: reqwest::Client,
    store: Arc<dyn ResourceStore>,
    factories: HashMap<ProviderType, Arc<dyn ProviderFactory>>,
    providers: Mutex<HashMap<String, ProviderCell>>,
}

impl ProviderRegistry {
    /// A registry knowing the built-in provider types.
    pub fn new(http_client: reqwest::Client, store: Arc<dyn ResourceStore>) -> Self {
        #[allow(unused_mut)]
        let mut factories: HashMap<ProviderType, Arc<dyn ProviderFactory>> = HashMap::new();
        #[cfg(feature = "keycloak")]
        factories.insert(
            ProviderType::KEYCLOAK,
            Arc::new(crate::provider::keycloak::KeycloakFactory),
        );
        Self {
            http_client,
            store,
            factories,
            providers: Mutex::new(HashMap::new()),
        }
    }

    /// Adds or replaces the factory for `provider_type`.
    pub fn with_factory(
        mut self,
        provider_type: impl Into<ProviderType>,
        factory: Arc<dyn ProviderFactory>,
    ) -> Self {
        self.factories.insert(provider_type.into(), factory);
        self
    }

    /// The discovered provider for `info.issuer`, building it on first use.
    ///
    /// A cached provider is returned as is, even if `info` names another type or other
    /// credentials.
    pub async fn resolve(&self, info: ProviderInfo) -> Result<Arc<dyn Provider>, Error> {
        let key = info.issuer.as_str().to_owned();
        let cell = self.cell(&key);
        if let Some(provider) = cell.get() {
            debug!(issuer = %key, "provider cache hit");
            return Ok(provider.clone());
        }

        let result = cell
            .get_or_try_init(|| self.create(info))
            .await
            .cloned();
        if let Err(ref err) = result {
            warn!(issuer = %key, error = %err, "could not resolve provider");
            self.forget(&key, &cell);
        }
        result
    }

    /// The cached provider for `issuer`, if discovery already succeeded.
    pub fn cached(&self, issuer: &Url) -> Option<Arc<dyn Provider>> {
        let providers = self.providers.lock().unwrap_or_else(PoisonError::into_inner);
        providers.get(issuer.as_str())?.get().cloned()
    }

    async fn create(&self, info: ProviderInfo) -> Result<Arc<dyn Provider>, Error> {
        let factory = self
            .factories
            .get(&info.provider_type)
            .ok_or_else(|| Error::UnsupportedProviderType(info.provider_type.to_string()))?;
        let provider_type = info.provider_type.clone();
        let core = ProviderCore::new(info, self.http_client.clone(), self.store.clone());
        let provider = factory.create(core)?;
        provider.discover_uma().await?;
        info!(
            issuer = %provider.authorization_server_uri(),
            provider_type = %provider_type,
            "created provider"
        );
        Ok(provider)
    }

    fn cell(&self, issuer: &str) -> ProviderCell {
        let mut providers = self.providers.lock().unwrap_or_else(PoisonError::into_inner);
        providers.entry(issuer.to_owned()).or_default().clone()
    }

    fn forget(&self, issuer: &str, cell: &ProviderCell) {
        let mut providers = self.providers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = providers.get(issuer) {
            if Arc::ptr_eq(current, cell) && !current.initialized() {
                providers.remove(issuer);
            }
        }
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let providers = self.providers.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ProviderRegistry")
            .field("factories", &self.factories.keys().collect::<Vec<_>>())
            .field("providers", &providers.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{KeySet, MemoryResourceStore};
    use async_trait::async_trait;

    struct NoKeys;

    #[async_trait]
    impl KeySet for NoKeys {
        async fn verify_signature(&self, _token: &str) -> Result<Vec<u8>, Error> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn unknown_provider_type_is_not_cached() {
        let registry =
            ProviderRegistry::new(reqwest::Client::new(), Arc::new(MemoryResourceStore::new()));
        let issuer = Url::parse("http://localhost:1/realms/test").unwrap();
        let info = ProviderInfo::new(issuer.clone(), "gluu", "client", "secret", Arc::new(NoKeys));

        let err = registry.resolve(info).await.unwrap_err();
        assert!(matches!(err, Error::UnsupportedProviderType(ref ty) if ty == "gluu"));
        assert!(registry.cached(&issuer).is_none());
        assert!(registry
            .providers
            .lock()
            .unwrap()
            .get(issuer.as_str())
            .is_none());
    }
}
