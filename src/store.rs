use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Durable mapping of resource names to the ids assigned by the authorization server.
///
/// Some authorization servers reject a second registration of the same resource, so the ids
/// have to outlive the process. Losing an entry only costs a re-registration attempt.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    async fn get(&self, name: &str) -> Option<String>;

    async fn set(&self, name: &str, id: &str);
}

/// Process-local [`ResourceStore`], for tests and single instance deployments.
#[derive(Debug, Default)]
pub struct MemoryResourceStore {
    ids: RwLock<HashMap<String, String>>,
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ids.read().map(|ids| ids.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<const N: usize> From<[(String, String); N]> for MemoryResourceStore {
    fn from(entries: [(String, String); N]) -> Self {
        Self {
            ids: RwLock::new(HashMap::from(entries)),
        }
    }
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn get(&self, name: &str) -> Option<String> {
        self.ids.read().ok()?.get(name).cloned()
    }

    async fn set(&self, name: &str, id: &str) {
        if let Ok(mut ids) = self.ids.write() {
            ids.insert(name.to_owned(), id.to_owned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_then_get() {
        let store = MemoryResourceStore::new();
        assert_eq!(None, store.get("Users").await);
        store.set("Users", "abc").await;
        assert_eq!(Some("abc".to_string()), store.get("Users").await);
        assert_eq!(1, store.len());
    }
}
