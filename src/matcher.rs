use crate::error::Error;
use crate::template::CompiledTemplates;
use crate::{Resource, ResourceStore, ResourceTemplates, ResourceType};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use url::Url;

/// Maps request paths to protected resources.
pub struct ResourceMatcher {
    templates: CompiledTemplates,
    store: Arc<dyn ResourceStore>,
}

impl ResourceMatcher {
    /// Validates `templates` against `types`. See [`ResourceTemplates`] for precedence.
    pub fn new(
        types: &HashMap<String, ResourceType>,
        templates: &ResourceTemplates,
        store: Arc<dyn ResourceStore>,
    ) -> Result<Self, Error> {
        Ok(Self {
            templates: CompiledTemplates::compile(templates, types)?,
            store,
        })
    }

    /// The resource `path` refers to, without consulting the store.
    ///
    /// `path` must lie under the path of `base_url`. The query string and a trailing `/` are
    /// ignored.
    pub fn match_path(&self, base_url: &Url, path: &str) -> Option<Resource> {
        let path = path.split_once('?').map_or(path, |(path, _)| path);
        let base_path = base_url.path().trim_end_matches('/');
        let relative = path.strip_prefix(base_path)?;
        if !(relative.is_empty() || relative.starts_with('/')) {
            return None;
        }

        let (template, matched) = self.templates.find(relative)?;
        let mut base = base_url.clone();
        base.set_query(None);
        base.set_fragment(None);
        let uri = format!("{}{}", base.as_str().trim_end_matches('/'), matched.path);
        debug!(template = %template.path(), name = %matched.name, "matched resource");
        Some(Resource::new(
            matched.name,
            uri,
            template.resource_type().clone(),
        ))
    }

    /// Like [`match_path`](Self::match_path), with the id pre-filled from the resource store.
    pub async fn match_request(&self, base_url: &Url, path: &str) -> Option<Resource> {
        let mut resource = self.match_path(base_url, path)?;
        resource.id = self.store.get(&resource.name).await;
        Some(resource)
    }
}

impl std::fmt::Debug for ResourceMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceMatcher")
            .field(
                "templates",
                &self.templates.iter().map(|t| t.path()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryResourceStore, ResourceTemplate};

    fn matcher(store: Arc<dyn ResourceStore>) -> ResourceMatcher {
        let types = HashMap::from([
            (
                "users".to_string(),
                ResourceType::new("https://www.example.com/rsrcs/users")
                    .scope("read")
                    .scope("write"),
            ),
            (
                "user".to_string(),
                ResourceType::new("https://www.example.com/rsrcs/user").scope("read"),
            ),
        ]);
        let templates = ResourceTemplates::new()
            .template(ResourceTemplate::new("/users", "users", "Users"))
            .template(ResourceTemplate::new("/users/{id}", "user", "User {id}"));
        ResourceMatcher::new(&types, &templates, store).unwrap()
    }

    fn base() -> Url {
        Url::parse("http://localhost:8000/api").unwrap()
    }

    #[test]
    fn collection_and_item() {
        let matcher = matcher(Arc::new(MemoryResourceStore::new()));

        let users = matcher.match_path(&base(), "/api/users").unwrap();
        assert_eq!("Users", users.name);
        assert_eq!("http://localhost:8000/api/users", users.uri);
        assert_eq!(
            vec!["read".to_string(), "write".to_string()],
            users.resource_type.resource_scopes
        );

        let user = matcher.match_path(&base(), "/api/users/1").unwrap();
        assert_eq!("User 1", user.name);
        assert_eq!("http://localhost:8000/api/users/1", user.uri);
        assert_eq!(None, user.id);
    }

    #[test]
    fn trailing_slash_and_query_are_ignored() {
        let matcher = matcher(Arc::new(MemoryResourceStore::new()));
        let user = matcher.match_path(&base(), "/api/users/1/?fields=name").unwrap();
        assert_eq!("http://localhost:8000/api/users/1", user.uri);
    }

    #[test]
    fn outside_base_path() {
        let matcher = matcher(Arc::new(MemoryResourceStore::new()));
        assert!(matcher.match_path(&base(), "/users").is_none());
        assert!(matcher.match_path(&base(), "/apiv2/users").is_none());
        assert!(matcher.match_path(&base(), "/api/unrelated").is_none());
        assert!(matcher.match_path(&base(), "/api/users/1/posts").is_none());
    }

    #[test]
    fn base_url_with_trailing_slash() {
        let matcher = matcher(Arc::new(MemoryResourceStore::new()));
        let base = Url::parse("http://localhost:8000/").unwrap();
        let users = matcher.match_path(&base, "/users").unwrap();
        assert_eq!("http://localhost:8000/users", users.uri);
    }

    #[tokio::test]
    async fn id_prefilled_from_store() {
        let store = Arc::new(MemoryResourceStore::from([(
            "User 1".to_string(),
            "9c6a".to_string(),
        )]));
        let matcher = matcher(store);
        let user = matcher.match_request(&base(), "/api/users/1").await.unwrap();
        assert_eq!(Some("9c6a".to_string()), user.id);
        let other = matcher.match_request(&base(), "/api/users/2").await.unwrap();
        assert_eq!(None, other.id);
    }

    #[test]
    fn rejects_ambiguous_templates() {
        let types = HashMap::from([("user".to_string(), ResourceType::new("user"))]);
        let templates = ResourceTemplates::new()
            .template(ResourceTemplate::new("/users/{id}", "user", "User {id}"))
            .template(ResourceTemplate::new("/users/{name}", "user", "User {name}"));
        let err =
            ResourceMatcher::new(&types, &templates, Arc::new(MemoryResourceStore::new()))
                .unwrap_err();
        assert_eq!(crate::ErrorKind::Configuration, err.kind());
    }
}
