use serde::{Deserialize, Serialize};

/// The persisted, user-editable profile record in the hosted document store.
/// Distinct from the identity service's own profile fields - the two are
/// written by different paths and are allowed to diverge.
///
/// Every field is optional so a partial or missing document deserializes to
/// "not set" instead of failing the snapshot.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, utoipa::ToSchema)]
pub struct ProfileDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(rename = "displayName", default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "photoURL", default)]
    pub photo_url: Option<String>,
    #[serde(rename = "subscriptionStatus", default, skip_serializing_if = "Option::is_none")]
    pub subscription_status: Option<String>,
    #[serde(rename = "contentSuggestions", default, skip_serializing_if = "Vec::is_empty")]
    pub content_suggestions: Vec<String>,
}

/// Partial update for a profile document. Only `Some` fields are written.
#[derive(Debug, Serialize, Deserialize, Clone, Default, utoipa::ToSchema)]
pub struct ProfileFieldPatch {
    #[serde(rename = "displayName", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(rename = "photoURL", skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

impl ProfileFieldPatch {
    pub fn display_name(name: impl Into<String>) -> Self {
        Self {
            display_name: Some(name.into()),
            photo_url: None,
        }
    }

    pub fn photo_url(url: impl Into<String>) -> Self {
        Self {
            display_name: None,
            photo_url: Some(url.into()),
        }
    }
}

/// Avatar file staged locally for preview. No network effect until the
/// upload is confirmed.
#[derive(Debug, Clone)]
pub struct StagedAvatar {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl StagedAvatar {
    /// Inline preview a UI can render without a round-trip to the store.
    pub fn preview_data_url(&self) -> String {
        use base64::Engine;
        format!(
            "data:{};base64,{}",
            self.content_type,
            base64::engine::general_purpose::STANDARD.encode(&self.bytes)
        )
    }
}

/// Opaque handle returned by the blob store after an upload, exchangeable
/// for a retrievable URL. The token is fresh per upload, so two uploads to
/// the same key resolve to distinguishable URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobReceipt {
    pub key: String,
    pub token: String,
}
