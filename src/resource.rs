use serde::{Deserialize, Serialize};

/// Category of protected resources, shared by every resource of that category.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct ResourceType {
    /// URI identifying the resource category.
    #[serde(rename = "type")]
    pub type_uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_uri: Option<String>,
    #[serde(default)]
    pub resource_scopes: Vec<String>,
}

impl ResourceType {
    pub fn new(type_uri: impl Into<String>) -> Self {
        Self {
            type_uri: type_uri.into(),
            ..Default::default()
        }
    }

    pub fn icon_uri(mut self, icon_uri: impl Into<String>) -> Self {
        self.icon_uri = Some(icon_uri.into());
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.resource_scopes.push(scope.into());
        self
    }
}

/// A protected resource, as registered with the authorization server.
///
/// Serializes to the resource description of the
/// [UMA Federated Authorization](https://docs.kantarainitiative.org/uma/wg/rec-oauth-uma-federated-authz-2.0.html#resource-set-desc)
/// registration endpoint. `id` is only present once the authorization server assigned one.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Stable key used to register each resource at most once.
    pub name: String,
    pub uri: String,
    #[serde(flatten)]
    pub resource_type: ResourceType,
}

impl Resource {
    pub fn new(
        name: impl Into<String>,
        uri: impl Into<String>,
        resource_type: ResourceType,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            uri: uri.into(),
            resource_type,
        }
    }

    pub fn is_registered(&self) -> bool {
        self.id.is_some()
    }
}
