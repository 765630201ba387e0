use serde::{Deserialize, Serialize};

/// An authenticated account as the hosted identity platform reports it.
/// The id is immutable; display name and photo change through explicit
/// `update_profile_fields` calls.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, utoipa::ToSchema)]
pub struct Identity {
    pub id: String,  // PRIMARY IDENTIFIER - platform uid
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    /// Platform session token. Opaque everywhere except inside the
    /// identity-service implementation that minted it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

/// Mutable identity-service profile fields. `None` means "leave unchanged".
#[derive(Debug, Deserialize, Serialize, Clone, Default, utoipa::ToSchema)]
pub struct IdentityProfileFields {
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl Identity {
    pub fn apply(&mut self, fields: &IdentityProfileFields) {
        if let Some(name) = &fields.display_name {
            self.display_name = Some(name.clone());
        }
        if let Some(url) = &fields.photo_url {
            self.photo_url = Some(url.clone());
        }
    }
}
