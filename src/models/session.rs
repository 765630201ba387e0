use serde::{Deserialize, Serialize};

use super::Identity;

/// Process-local session state. Owned exclusively by the session manager;
/// everything else only reads it.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, utoipa::ToSchema)]
pub struct SessionState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    /// True until the first session-change event from the identity service.
    pub loading: bool,
}

impl SessionState {
    pub fn resolving() -> Self {
        Self {
            identity: None,
            loading: true,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        !self.loading && self.identity.is_some()
    }
}
