use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One element of a permission endpoint request.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PermissionRequest {
    pub resource_id: String,
    pub resource_scopes: Vec<String>,
    /// Keycloak pushed claims.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claims: Option<HashMap<String, Vec<String>>>,
}

impl PermissionRequest {
    pub fn new<S: Into<String>>(
        resource_id: impl Into<String>,
        scopes: impl IntoIterator<Item = S>,
    ) -> Self {
        Self {
            resource_id: resource_id.into(),
            resource_scopes: scopes.into_iter().map(Into::into).collect(),
            claims: None,
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub(crate) struct PermissionTicket {
    pub ticket: String,
}
