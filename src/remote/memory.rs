// In-memory implementations of the three platform contracts. Used by the
// test suite and by `BACKEND=memory` for running without a database. Event
// emission matches the hosted backend: process-local broadcast on every
// sign-in/sign-out/document write.
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};
use uuid::Uuid;

use crate::models::{BlobReceipt, Identity, IdentityProfileFields, ProfileDocument, ProfileFieldPatch};
use crate::remote::{
    BlobStore, DocumentCallback, FederatedAuthUrl, IdentityService, ProfileStore, SessionCallback,
    Subscription,
};
use crate::utils::{AppError, AppResult};

// Low bcrypt cost: this backend only ever holds dev/test accounts.
const MEMORY_BCRYPT_COST: u32 = 4;

#[derive(Debug, Clone)]
struct StoredAccount {
    id: String,
    email: String,
    password_hash: Option<String>, // None for federated accounts
    display_name: Option<String>,
    photo_url: Option<String>,
}

impl StoredAccount {
    fn identity(&self) -> Identity {
        Identity {
            id: self.id.clone(),
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            photo_url: self.photo_url.clone(),
            id_token: None,
        }
    }
}

#[derive(Clone)]
pub struct MemoryIdentityService {
    accounts: Arc<Mutex<HashMap<String, StoredAccount>>>, // keyed by email
    current: Arc<std::sync::Mutex<Option<Identity>>>,
    events: broadcast::Sender<Option<Identity>>,
}

impl Default for MemoryIdentityService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentityService {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            accounts: Arc::new(Mutex::new(HashMap::new())),
            current: Arc::new(std::sync::Mutex::new(None)),
            events,
        }
    }

    fn emit(&self, identity: Option<Identity>) {
        if let Ok(mut current) = self.current.lock() {
            *current = identity.clone();
        }
        // No subscribers is fine (e.g. before the session manager attaches).
        let _ = self.events.send(identity);
    }
}

#[async_trait]
impl IdentityService for MemoryIdentityService {
    async fn create_account(&self, email: &str, password: &str) -> AppResult<Identity> {
        if password.len() < 6 {
            return Err(AppError::WeakPassword);
        }

        let mut accounts = self.accounts.lock().await;
        if accounts.contains_key(email) {
            return Err(AppError::EmailInUse);
        }

        let hash = bcrypt::hash(password, MEMORY_BCRYPT_COST)
            .map_err(|e| AppError::DatabaseError(format!("Failed to hash password: {}", e)))?;

        let account = StoredAccount {
            id: Uuid::new_v4().to_string(),
            email: email.to_string(),
            password_hash: Some(hash),
            display_name: None,
            photo_url: None,
        };
        let identity = account.identity();
        accounts.insert(email.to_string(), account);
        drop(accounts);

        // The platform signs the new account in immediately.
        self.emit(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_in(&self, email: &str, password: &str) -> AppResult<Identity> {
        let accounts = self.accounts.lock().await;
        let account = accounts.get(email).ok_or(AppError::InvalidCredentials)?;
        let hash = account
            .password_hash
            .as_ref()
            .ok_or(AppError::InvalidCredentials)?;

        let valid = bcrypt::verify(password, hash)
            .map_err(|e| AppError::DatabaseError(format!("Password verification error: {}", e)))?;
        if !valid {
            return Err(AppError::InvalidCredentials);
        }

        let identity = account.identity();
        drop(accounts);

        self.emit(Some(identity.clone()));
        Ok(identity)
    }

    async fn federated_auth_url(&self) -> AppResult<FederatedAuthUrl> {
        let state = Uuid::new_v4().to_string();
        Ok(FederatedAuthUrl {
            auth_url: format!("memory://federated/consent?state={}", state),
            state,
        })
    }

    async fn sign_in_with_federated_provider(&self, code: Option<&str>) -> AppResult<Identity> {
        // In this backend the "authorization code" is the federated account's
        // email address. A dismissed popup arrives with no code at all.
        let email = code.ok_or(AppError::PopupClosed)?;

        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .entry(email.to_string())
            .or_insert_with(|| StoredAccount {
                id: Uuid::new_v4().to_string(),
                email: email.to_string(),
                password_hash: None,
                display_name: None,
                photo_url: None,
            });
        let identity = account.identity();
        drop(accounts);

        self.emit(Some(identity.clone()));
        Ok(identity)
    }

    async fn sign_out(&self) -> AppResult<()> {
        self.emit(None);
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> AppResult<()> {
        let accounts = self.accounts.lock().await;
        if !accounts.contains_key(email) {
            return Err(AppError::UserNotFound);
        }
        log::info!("📧 Password reset email queued for {}", email);
        Ok(())
    }

    async fn update_profile_fields(
        &self,
        identity_id: &str,
        fields: &IdentityProfileFields,
    ) -> AppResult<Identity> {
        let mut accounts = self.accounts.lock().await;
        let account = accounts
            .values_mut()
            .find(|a| a.id == identity_id)
            .ok_or(AppError::UserNotFound)?;

        if let Some(name) = &fields.display_name {
            account.display_name = Some(name.clone());
        }
        if let Some(url) = &fields.photo_url {
            account.photo_url = Some(url.clone());
        }
        // No session event: profile-field updates do not change who is
        // signed in, same as the hosted platform.
        Ok(account.identity())
    }

    fn subscribe_to_session_changes(&self, callback: SessionCallback) -> Subscription {
        let mut rx = self.events.subscribe();
        let current = self.current.clone();
        let handle = tokio::spawn(async move {
            // The platform fires the listener once with the session as it
            // stands, then again on every change.
            let initial = current.lock().map(|c| c.clone()).unwrap_or(None);
            callback(initial);

            while let Ok(identity) = rx.recv().await {
                callback(identity);
            }
        });
        Subscription::new(handle)
    }
}

#[derive(Debug, Clone)]
struct DocumentEvent {
    collection: String,
    id: String,
    document: Option<ProfileDocument>,
}

#[derive(Clone)]
pub struct MemoryProfileStore {
    documents: Arc<Mutex<HashMap<(String, String), ProfileDocument>>>,
    events: broadcast::Sender<DocumentEvent>,
    writes: Arc<AtomicUsize>,
}

impl Default for MemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            documents: Arc::new(Mutex::new(HashMap::new())),
            events,
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Total number of write/update calls this store has served. Lets tests
    /// assert that an operation issued no network write.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn emit(&self, collection: &str, id: &str, document: Option<ProfileDocument>) {
        let _ = self.events.send(DocumentEvent {
            collection: collection.to_string(),
            id: id.to_string(),
            document,
        });
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn write_document(
        &self,
        collection: &str,
        id: &str,
        document: &ProfileDocument,
    ) -> AppResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut documents = self.documents.lock().await;
        documents.insert((collection.to_string(), id.to_string()), document.clone());
        drop(documents);
        self.emit(collection, id, Some(document.clone()));
        Ok(())
    }

    async fn update_document_fields(
        &self,
        collection: &str,
        id: &str,
        patch: &ProfileFieldPatch,
    ) -> AppResult<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut documents = self.documents.lock().await;
        let document = documents
            .entry((collection.to_string(), id.to_string()))
            .or_default();
        if let Some(name) = &patch.display_name {
            document.display_name = Some(name.clone());
        }
        if let Some(url) = &patch.photo_url {
            document.photo_url = Some(url.clone());
        }
        let snapshot = document.clone();
        drop(documents);
        self.emit(collection, id, Some(snapshot));
        Ok(())
    }

    async fn read_document_once(
        &self,
        collection: &str,
        id: &str,
    ) -> AppResult<Option<ProfileDocument>> {
        let documents = self.documents.lock().await;
        Ok(documents
            .get(&(collection.to_string(), id.to_string()))
            .cloned())
    }

    fn subscribe_to_document(
        &self,
        collection: &str,
        id: &str,
        callback: DocumentCallback,
    ) -> Subscription {
        // Subscribe before reading the snapshot so a write between the two
        // is never lost.
        let mut rx = self.events.subscribe();
        let documents = self.documents.clone();
        let collection = collection.to_string();
        let id = id.to_string();

        let handle = tokio::spawn(async move {
            let initial = {
                let documents = documents.lock().await;
                documents.get(&(collection.clone(), id.clone())).cloned()
            };
            // Missing document: an empty snapshot, not an error.
            callback(initial);

            while let Ok(event) = rx.recv().await {
                if event.collection == collection && event.id == id {
                    callback(event.document);
                }
            }
        });
        Subscription::new(handle)
    }
}

#[derive(Clone)]
pub struct MemoryBlobStore {
    blobs: Arc<Mutex<HashMap<String, (Vec<u8>, String)>>>,
    fail_next: Arc<AtomicBool>,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: Arc::new(Mutex::new(HashMap::new())),
            fail_next: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Makes the next upload fail. Test hook for the storage-error path.
    pub fn fail_next_upload(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload_blob(
        &self,
        path: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> AppResult<BlobReceipt> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(AppError::UploadFailed("simulated storage failure".to_string()));
        }
        let mut blobs = self.blobs.lock().await;
        blobs.insert(path.to_string(), (bytes.to_vec(), content_type.to_string()));
        Ok(BlobReceipt {
            key: path.to_string(),
            token: Uuid::new_v4().to_string(),
        })
    }

    async fn get_public_url(&self, receipt: &BlobReceipt) -> AppResult<String> {
        let blobs = self.blobs.lock().await;
        if !blobs.contains_key(&receipt.key) {
            return Err(AppError::UploadFailed(format!(
                "no blob stored under {}",
                receipt.key
            )));
        }
        Ok(format!("memory://blobs/{}?token={}", receipt.key, receipt.token))
    }

    async fn download_blob(&self, key: &str) -> AppResult<Option<(Vec<u8>, String)>> {
        let blobs = self.blobs.lock().await;
        Ok(blobs.get(key).cloned())
    }
}
