// Contracts for the three hosted-platform collaborators. The application
// never talks to the platform directly; everything goes through these traits
// so the session/profile components stay backend-agnostic.
pub mod google;
pub mod memory;
pub mod mongo;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::models::{BlobReceipt, Identity, IdentityProfileFields, ProfileDocument, ProfileFieldPatch};
use crate::utils::AppResult;

/// Invoked with the new session identity (or `None` on sign-out) for every
/// session-change event: sign-in, sign-out, token refresh.
pub type SessionCallback = Box<dyn Fn(Option<Identity>) + Send + Sync>;

/// Invoked with the current document snapshot - `None` when the document
/// does not exist - once on subscribe and again after every write.
pub type DocumentCallback = Box<dyn Fn(Option<ProfileDocument>) + Send + Sync>;

/// Cancellation handle for a session or document listener. Teardown is
/// explicit via [`Subscription::unsubscribe`]; dropping the handle also
/// detaches the listener so a dropped component never keeps receiving
/// events for a stale identity.
pub struct Subscription {
    handle: Option<JoinHandle<()>>,
}

impl Subscription {
    pub fn new(handle: JoinHandle<()>) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    pub fn unsubscribe(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Consent URL for the federated provider plus the CSRF state that must come
/// back with the callback.
#[derive(Debug, Serialize, Clone, utoipa::ToSchema)]
pub struct FederatedAuthUrl {
    pub auth_url: String,
    pub state: String,
}

/// Remote identity service: owns account creation, credential verification,
/// password reset and session tokens.
#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn create_account(&self, email: &str, password: &str) -> AppResult<Identity>;

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Identity>;

    /// Builds the provider consent URL the client opens in a popup.
    async fn federated_auth_url(&self) -> AppResult<FederatedAuthUrl>;

    /// Completes the federated flow with the authorization code from the
    /// provider callback. `None` means the popup was dismissed.
    async fn sign_in_with_federated_provider(&self, code: Option<&str>) -> AppResult<Identity>;

    async fn sign_out(&self) -> AppResult<()>;

    async fn send_password_reset(&self, email: &str) -> AppResult<()>;

    /// Updates the identity service's own profile fields. Does not touch the
    /// profile document store.
    async fn update_profile_fields(
        &self,
        identity_id: &str,
        fields: &IdentityProfileFields,
    ) -> AppResult<Identity>;

    fn subscribe_to_session_changes(&self, callback: SessionCallback) -> Subscription;
}

/// Remote profile store: key-value documents keyed by identity id.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Creates or fully replaces a document.
    async fn write_document(
        &self,
        collection: &str,
        id: &str,
        document: &ProfileDocument,
    ) -> AppResult<()>;

    /// Merges the `Some` fields of the patch into the document.
    async fn update_document_fields(
        &self,
        collection: &str,
        id: &str,
        patch: &ProfileFieldPatch,
    ) -> AppResult<()>;

    async fn read_document_once(
        &self,
        collection: &str,
        id: &str,
    ) -> AppResult<Option<ProfileDocument>>;

    fn subscribe_to_document(
        &self,
        collection: &str,
        id: &str,
        callback: DocumentCallback,
    ) -> Subscription;
}

/// Remote blob store for avatar binaries.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload_blob(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> AppResult<BlobReceipt>;

    async fn get_public_url(&self, receipt: &BlobReceipt) -> AppResult<String>;

    /// Fetches the stored bytes and content type for a key, for serving the
    /// public URL. `None` when nothing is stored under the key.
    async fn download_blob(&self, key: &str) -> AppResult<Option<(Vec<u8>, String)>>;
}
