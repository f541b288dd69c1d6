use crate::ClaimTokenFormat;
use url::form_urlencoded::Serializer;

pub const UMA_TICKET_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:uma-ticket";

/// Parameters of the `urn:ietf:params:oauth:grant-type:uma-ticket` grant.
///
/// Every field is optional; absent fields are left out of the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RptRequest {
    /// The most recent permission ticket received by the client as part of the UMA
    /// authorization process.
    pub ticket: Option<String>,

    /// Additional claims the server should consider when evaluating permissions for the
    /// resource(s) and scope(s) being requested. See [`ClaimTokenFormat`] for supported formats.
    pub claim_token: Option<String>,

    pub claim_token_format: Option<ClaimTokenFormat>,

    /// A previously issued RPT whose permissions should also be evaluated and added to the new
    /// one, for incremental authorization.
    pub rpt: Option<String>,

    /// Resources and scopes the client is seeking access to, as `RESOURCE#SCOPE`. Either side may
    /// be omitted (`Resource A`, `#Scope A`). Lets clients request permissions without a ticket.
    pub permissions: Vec<String>,

    /// Client identifier of the resource server the client is seeking access to. Keycloak requires
    /// it together with `permissions`.
    pub audience: Option<String>,

    /// Whether resource names should be included in the RPT's permissions.
    pub response_include_resource_name: Option<bool>,

    /// Keeps only the last N requested permissions in the RPT.
    pub response_permissions_limit: Option<u32>,

    /// Whether the server should create permission requests for the resources and scopes
    /// referenced by the ticket. Only meaningful together with `ticket`.
    pub submit_request: Option<bool>,
}

impl RptRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ticket(mut self, ticket: impl Into<String>) -> Self {
        self.ticket = Some(ticket.into());
        self
    }

    pub fn claim_token(mut self, claim_token: impl Into<String>, format: ClaimTokenFormat) -> Self {
        self.claim_token = Some(claim_token.into());
        self.claim_token_format = Some(format);
        self
    }

    pub fn rpt(mut self, rpt: impl Into<String>) -> Self {
        self.rpt = Some(rpt.into());
        self
    }

    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.push(permission.into());
        self
    }

    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// Form-urlencoded token request body, `grant_type` included.
    pub fn form_body(&self) -> String {
        let mut body = Serializer::new(String::new());
        body.append_pair("grant_type", UMA_TICKET_GRANT_TYPE);
        if let Some(ref ticket) = self.ticket {
            body.append_pair("ticket", ticket);
        }
        if let Some(ref claim_token) = self.claim_token {
            body.append_pair("claim_token", claim_token);
        }
        if let Some(claim_token_format) = self.claim_token_format {
            body.append_pair("claim_token_format", claim_token_format.as_str());
        }
        if let Some(ref rpt) = self.rpt {
            body.append_pair("rpt", rpt);
        }
        for permission in &self.permissions {
            body.append_pair("permission", permission);
        }
        if let Some(ref audience) = self.audience {
            body.append_pair("audience", audience);
        }
        if let Some(response_include_resource_name) = self.response_include_resource_name {
            body.append_pair(
                "response_include_resource_name",
                if response_include_resource_name {
                    "true"
                } else {
                    "false"
                },
            );
        }
        if let Some(response_permissions_limit) = self.response_permissions_limit {
            body.append_pair(
                "response_permissions_limit",
                &response_permissions_limit.to_string(),
            );
        }
        if let Some(submit_request) = self.submit_request {
            body.append_pair("submit_request", if submit_request { "true" } else { "false" });
        }
        body.finish()
    }
}
