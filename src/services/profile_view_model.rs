// Keeps the mirrored profile fields synchronized with the profile store for
// the current session identity. A single watcher task re-establishes the
// document subscription whenever the session identity changes, detaching the
// old one so updates for a prior identity are never applied.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::{ProfileDocument, ProfileFieldPatch, SessionState, StagedAvatar};
use crate::remote::{BlobStore, ProfileStore, Subscription};
use crate::services::USERS_COLLECTION;
use crate::utils::{AppError, AppResult};

/// Mirrored display state. Replaced wholesale on every document snapshot;
/// the edit buffers (`editing_name`, `draft_name`, staging) are local and
/// survive snapshots.
#[derive(Debug, Serialize, Clone, Default, utoipa::ToSchema)]
pub struct ProfileState {
    /// Identity the mirrored fields belong to.
    pub identity_id: Option<String>,
    /// False while the profile document does not exist (e.g. a registration
    /// that never completed its document write). Missing fields read as
    /// "not set", never as an error.
    pub found: bool,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub subscription_status: Option<String>,
    pub content_suggestions: Vec<String>,
    pub editing_name: bool,
    pub draft_name: Option<String>,
    pub uploading: bool,
    /// Inline preview of the staged avatar, if any.
    pub staged_preview: Option<String>,
}

impl ProfileState {
    fn apply_snapshot(&mut self, snapshot: Option<ProfileDocument>) {
        match snapshot {
            Some(document) => {
                self.found = true;
                self.display_name = document.display_name;
                self.photo_url = document.photo_url;
                self.subscription_status = document.subscription_status;
                self.content_suggestions = document.content_suggestions;
            }
            None => {
                self.found = false;
                self.display_name = None;
                self.photo_url = None;
                self.subscription_status = None;
                self.content_suggestions.clear();
            }
        }
    }
}

fn as_upload_error(e: AppError) -> AppError {
    match e {
        AppError::UploadFailed(_) => e,
        other => AppError::UploadFailed(other.to_string()),
    }
}

pub struct ProfileViewModel {
    store: Arc<dyn ProfileStore>,
    blobs: Arc<dyn BlobStore>,
    state: Arc<RwLock<ProfileState>>,
    staged: Arc<Mutex<Option<StagedAvatar>>>,
    upload_seq: AtomicU64,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl ProfileViewModel {
    /// Builds the view-model and starts the session watcher that drives the
    /// document subscription lifecycle.
    pub fn attach(
        store: Arc<dyn ProfileStore>,
        blobs: Arc<dyn BlobStore>,
        mut session_rx: watch::Receiver<SessionState>,
    ) -> Arc<Self> {
        let state = Arc::new(RwLock::new(ProfileState::default()));
        let staged = Arc::new(Mutex::new(None));

        let watcher_store = store.clone();
        let watcher_state = state.clone();
        let watcher_staged = staged.clone();

        let watcher = tokio::spawn(async move {
            let mut active: Option<String> = None;
            let mut doc_sub: Option<Subscription> = None;

            loop {
                let target = {
                    let session = session_rx.borrow_and_update();
                    if session.loading {
                        None
                    } else {
                        session.identity.as_ref().map(|i| i.id.clone())
                    }
                };

                if target != active {
                    // Detach the old subscription before establishing the
                    // new one so a prior identity's updates never land.
                    if let Some(subscription) = doc_sub.take() {
                        subscription.unsubscribe();
                    }

                    match &target {
                        Some(id) => {
                            if let Ok(mut s) = watcher_state.write() {
                                *s = ProfileState {
                                    identity_id: Some(id.clone()),
                                    ..ProfileState::default()
                                };
                            }
                            let snapshot_state = watcher_state.clone();
                            doc_sub = Some(watcher_store.subscribe_to_document(
                                USERS_COLLECTION,
                                id,
                                Box::new(move |snapshot| {
                                    if let Ok(mut s) = snapshot_state.write() {
                                        s.apply_snapshot(snapshot);
                                    }
                                }),
                            ));
                            log::info!("👤 Profile subscription established for {}", id);
                        }
                        None => {
                            if let Ok(mut s) = watcher_state.write() {
                                *s = ProfileState::default();
                            }
                            if let Ok(mut staged) = watcher_staged.lock() {
                                *staged = None;
                            }
                        }
                    }
                    active = target;
                }

                if session_rx.changed().await.is_err() {
                    break;
                }
            }
        });

        Arc::new(Self {
            store,
            blobs,
            state,
            staged,
            upload_seq: AtomicU64::new(0),
            watcher: Mutex::new(Some(watcher)),
        })
    }

    /// Current mirrored state.
    pub fn snapshot(&self) -> ProfileState {
        self.state
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    /// Stops the session watcher and, through it, any live document
    /// subscription. Call on shutdown.
    pub fn detach(&self) {
        if let Ok(mut watcher) = self.watcher.lock() {
            if let Some(handle) = watcher.take() {
                handle.abort();
            }
        }
    }

    fn identity_id(&self) -> AppResult<String> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.identity_id.clone())
            .ok_or(AppError::NotAuthenticated)
    }

    fn with_state(&self, f: impl FnOnce(&mut ProfileState)) {
        if let Ok(mut s) = self.state.write() {
            f(&mut s);
        }
    }

    /// Enters name-edit mode, seeding the draft with the displayed name.
    pub fn begin_name_edit(&self) {
        self.with_state(|s| {
            s.draft_name = Some(s.display_name.clone().unwrap_or_default());
            s.editing_name = true;
        });
    }

    /// Leaves edit mode without any network write; the displayed name stays
    /// exactly what the last snapshot said.
    pub fn cancel_name_edit(&self) {
        self.with_state(|s| {
            s.draft_name = None;
            s.editing_name = false;
        });
    }

    /// Writes the new display name to the profile document and mirrors it
    /// optimistically.
    pub async fn save_name(&self, new_name: &str) -> AppResult<()> {
        let id = self.identity_id()?;

        self.store
            .update_document_fields(
                USERS_COLLECTION,
                &id,
                &ProfileFieldPatch::display_name(new_name),
            )
            .await?;

        self.with_state(|s| {
            s.display_name = Some(new_name.to_string());
            s.editing_name = false;
            s.draft_name = None;
        });
        Ok(())
    }

    /// Stages an avatar locally for preview. No network call.
    pub fn select_avatar_file(&self, bytes: Vec<u8>, content_type: &str) {
        let staged = StagedAvatar {
            bytes,
            content_type: content_type.to_string(),
        };
        let preview = staged.preview_data_url();
        if let Ok(mut slot) = self.staged.lock() {
            *slot = Some(staged);
        }
        self.with_state(|s| s.staged_preview = Some(preview));
    }

    /// Discards the staged file and preview. No network effect.
    pub fn cancel_avatar_upload(&self) {
        if let Ok(mut slot) = self.staged.lock() {
            *slot = None;
        }
        self.with_state(|s| s.staged_preview = None);
    }

    /// Uploads the staged avatar under a key derived from the identity id,
    /// writes the resulting URL to the profile document and mirrors it.
    /// On any storage error the prior photo stays untouched and the
    /// uploading flag is reset; the staged file is kept so the upload can
    /// be retried.
    pub async fn confirm_avatar_upload(&self) -> AppResult<String> {
        let id = self.identity_id()?;
        let staged = self
            .staged
            .lock()
            .ok()
            .and_then(|slot| slot.clone())
            .ok_or_else(|| AppError::UploadFailed("no avatar staged".to_string()))?;

        // Sequence number so a slow upload that finishes after a newer one
        // never overwrites the newer photo URL.
        let seq = self.upload_seq.fetch_add(1, Ordering::SeqCst) + 1;
        self.with_state(|s| s.uploading = true);

        let path = format!("profilePictures/{}", id);
        let receipt = match self
            .blobs
            .upload_blob(&path, &staged.bytes, &staged.content_type)
            .await
        {
            Ok(receipt) => receipt,
            Err(e) => {
                self.with_state(|s| s.uploading = false);
                log::warn!("❌ Avatar upload failed for {}: {}", id, e);
                return Err(as_upload_error(e));
            }
        };

        let url = match self.blobs.get_public_url(&receipt).await {
            Ok(url) => url,
            Err(e) => {
                self.with_state(|s| s.uploading = false);
                log::warn!("❌ Avatar URL resolution failed for {}: {}", id, e);
                return Err(as_upload_error(e));
            }
        };

        if self.upload_seq.load(Ordering::SeqCst) != seq {
            // A newer confirm finished (or is in flight); its URL wins. The
            // blob itself was stored fine, so this is not a failure.
            self.with_state(|s| s.uploading = false);
            return Ok(url);
        }

        if let Err(e) = self
            .store
            .update_document_fields(USERS_COLLECTION, &id, &ProfileFieldPatch::photo_url(url.clone()))
            .await
        {
            self.with_state(|s| s.uploading = false);
            return Err(e);
        }

        if let Ok(mut slot) = self.staged.lock() {
            *slot = None;
        }
        self.with_state(|s| {
            s.photo_url = Some(url.clone());
            s.uploading = false;
            s.staged_preview = None;
        });
        log::info!("✅ Avatar updated for {}", id);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Identity;
    use crate::remote::memory::{MemoryBlobStore, MemoryIdentityService, MemoryProfileStore};
    use crate::remote::{BlobStore, ProfileStore};
    use crate::services::SessionManager;
    use async_trait::async_trait;
    use std::time::Duration;

    struct Harness {
        session: SessionManager,
        vm: Arc<ProfileViewModel>,
        store: Arc<MemoryProfileStore>,
        blobs: Arc<MemoryBlobStore>,
    }

    fn harness() -> Harness {
        let identity = Arc::new(MemoryIdentityService::new());
        let store = Arc::new(MemoryProfileStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let session = SessionManager::new(identity);
        let vm = ProfileViewModel::attach(store.clone(), blobs.clone(), session.subscribe());
        Harness {
            session,
            vm,
            store,
            blobs,
        }
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached within timeout");
    }

    async fn sign_up(h: &Harness, email: &str, name: &str) -> Identity {
        let identity = h.session.signup(email, "secret1").await.unwrap();
        // The registration flow's client-side document write.
        h.store
            .write_document(
                USERS_COLLECTION,
                &identity.id,
                &ProfileDocument {
                    email: Some(email.to_string()),
                    display_name: Some(name.to_string()),
                    photo_url: None,
                    subscription_status: None,
                    content_suggestions: vec![],
                },
            )
            .await
            .unwrap();
        wait_until(|| h.vm.snapshot().display_name.as_deref() == Some(name)).await;
        identity
    }

    #[tokio::test]
    async fn mirrors_the_document_for_the_signed_in_identity() {
        let h = harness();
        let identity = sign_up(&h, "ann@example.com", "Ann").await;

        let state = h.vm.snapshot();
        assert_eq!(state.identity_id.as_deref(), Some(identity.id.as_str()));
        assert!(state.found);
        assert_eq!(state.display_name.as_deref(), Some("Ann"));
        assert_eq!(state.photo_url, None);
    }

    #[tokio::test]
    async fn missing_document_reads_as_empty_snapshot_not_an_error() {
        let h = harness();
        // Signup without the registration document write: the identity
        // exists but no profile document does.
        h.session.signup("ghost@example.com", "secret1").await.unwrap();
        wait_until(|| h.vm.snapshot().identity_id.is_some()).await;

        // Give the initial snapshot a moment to land.
        tokio::time::sleep(Duration::from_millis(30)).await;
        let state = h.vm.snapshot();
        assert!(!state.found);
        assert_eq!(state.display_name, None);
        assert_eq!(state.photo_url, None);
        assert!(state.content_suggestions.is_empty());
    }

    #[tokio::test]
    async fn registration_document_contains_email_name_and_null_photo() {
        let h = harness();
        let identity = sign_up(&h, "a@b.com", "Ann").await;

        let document = h
            .store
            .read_document_once(USERS_COLLECTION, &identity.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(document.email.as_deref(), Some("a@b.com"));
        assert_eq!(document.display_name.as_deref(), Some("Ann"));
        assert_eq!(document.photo_url, None);
    }

    #[tokio::test]
    async fn remote_document_updates_replace_mirrored_fields_wholesale() {
        let h = harness();
        let identity = sign_up(&h, "ann@example.com", "Ann").await;

        h.store
            .write_document(
                USERS_COLLECTION,
                &identity.id,
                &ProfileDocument {
                    email: Some("ann@example.com".to_string()),
                    display_name: Some("Annie".to_string()),
                    photo_url: Some("https://example.com/a.png".to_string()),
                    subscription_status: Some("premium".to_string()),
                    content_suggestions: vec!["doc-1".to_string()],
                },
            )
            .await
            .unwrap();

        wait_until(|| h.vm.snapshot().display_name.as_deref() == Some("Annie")).await;
        let state = h.vm.snapshot();
        assert_eq!(state.subscription_status.as_deref(), Some("premium"));
        assert_eq!(state.content_suggestions, vec!["doc-1".to_string()]);
        assert_eq!(state.photo_url.as_deref(), Some("https://example.com/a.png"));
    }

    #[tokio::test]
    async fn cancel_name_edit_restores_the_name_with_no_write() {
        let h = harness();
        sign_up(&h, "ann@example.com", "Ann").await;
        let writes_before = h.store.write_count();

        h.vm.begin_name_edit();
        assert!(h.vm.snapshot().editing_name);
        assert_eq!(h.vm.snapshot().draft_name.as_deref(), Some("Ann"));

        h.vm.cancel_name_edit();
        let state = h.vm.snapshot();
        assert!(!state.editing_name);
        assert_eq!(state.draft_name, None);
        assert_eq!(state.display_name.as_deref(), Some("Ann"));
        assert_eq!(h.store.write_count(), writes_before);
    }

    #[tokio::test]
    async fn save_name_writes_the_document_and_mirrors_optimistically() {
        let h = harness();
        let identity = sign_up(&h, "ann@example.com", "Ann").await;

        h.vm.begin_name_edit();
        h.vm.save_name("Annie").await.unwrap();

        assert_eq!(h.vm.snapshot().display_name.as_deref(), Some("Annie"));
        assert!(!h.vm.snapshot().editing_name);

        let document = h
            .store
            .read_document_once(USERS_COLLECTION, &identity.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(document.display_name.as_deref(), Some("Annie"));
    }

    #[tokio::test]
    async fn cancel_avatar_selection_leaves_the_document_untouched() {
        let h = harness();
        let identity = sign_up(&h, "ann@example.com", "Ann").await;

        h.vm.select_avatar_file(vec![1, 2, 3], "image/png");
        assert!(h.vm.snapshot().staged_preview.is_some());

        h.vm.cancel_avatar_upload();
        assert!(h.vm.snapshot().staged_preview.is_none());

        let document = h
            .store
            .read_document_once(USERS_COLLECTION, &identity.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(document.photo_url, None);
    }

    #[tokio::test]
    async fn confirm_upload_writes_url_and_retry_yields_a_valid_url_both_times() {
        let h = harness();
        let identity = sign_up(&h, "ann@example.com", "Ann").await;

        h.vm.select_avatar_file(vec![1, 2, 3], "image/png");
        let first = h.vm.confirm_avatar_upload().await.unwrap();
        assert!(!first.is_empty());

        // Retrying the same file yields a valid URL again and the document
        // reflects the most recent successful upload.
        h.vm.select_avatar_file(vec![1, 2, 3], "image/png");
        let second = h.vm.confirm_avatar_upload().await.unwrap();
        assert!(!second.is_empty());

        let document = h
            .store
            .read_document_once(USERS_COLLECTION, &identity.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(document.photo_url, Some(second));
        assert!(!h.vm.snapshot().uploading);
    }

    #[tokio::test]
    async fn failed_upload_keeps_prior_photo_and_resets_uploading() {
        let h = harness();
        let identity = sign_up(&h, "ann@example.com", "Ann").await;

        h.vm.select_avatar_file(vec![1, 2, 3], "image/png");
        let url = h.vm.confirm_avatar_upload().await.unwrap();
        wait_until(|| h.vm.snapshot().photo_url.is_some()).await;

        h.vm.select_avatar_file(vec![9, 9, 9], "image/png");
        h.blobs.fail_next_upload();
        let result = h.vm.confirm_avatar_upload().await;
        assert!(matches!(result, Err(AppError::UploadFailed(_))));

        let state = h.vm.snapshot();
        assert!(!state.uploading);
        assert_eq!(state.photo_url, Some(url.clone()));

        let document = h
            .store
            .read_document_once(USERS_COLLECTION, &identity.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(document.photo_url, Some(url));
    }

    /// Blob store whose first upload parks until released, for exercising
    /// the out-of-order protection deterministically.
    struct GatedBlobStore {
        inner: MemoryBlobStore,
        gate: tokio::sync::Notify,
        gated: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl BlobStore for GatedBlobStore {
        async fn upload_blob(
            &self,
            path: &str,
            bytes: &[u8],
            content_type: &str,
        ) -> AppResult<crate::models::BlobReceipt> {
            if self.gated.swap(false, Ordering::SeqCst) {
                self.gate.notified().await;
            }
            self.inner.upload_blob(path, bytes, content_type).await
        }

        async fn get_public_url(
            &self,
            receipt: &crate::models::BlobReceipt,
        ) -> AppResult<String> {
            self.inner.get_public_url(receipt).await
        }

        async fn download_blob(&self, key: &str) -> AppResult<Option<(Vec<u8>, String)>> {
            self.inner.download_blob(key).await
        }
    }

    #[tokio::test]
    async fn slow_older_upload_never_overwrites_a_newer_one() {
        let identity_service = Arc::new(MemoryIdentityService::new());
        let store = Arc::new(MemoryProfileStore::new());
        let blobs = Arc::new(GatedBlobStore {
            inner: MemoryBlobStore::new(),
            gate: tokio::sync::Notify::new(),
            gated: std::sync::atomic::AtomicBool::new(true),
        });
        let session = SessionManager::new(identity_service);
        let vm = ProfileViewModel::attach(store.clone(), blobs.clone(), session.subscribe());

        let identity = session.signup("ann@example.com", "secret1").await.unwrap();
        wait_until(|| vm.snapshot().identity_id.is_some()).await;

        // First confirm parks inside the blob store.
        vm.select_avatar_file(vec![1], "image/png");
        let slow_vm = vm.clone();
        let slow = tokio::spawn(async move { slow_vm.confirm_avatar_upload().await });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Second confirm completes while the first is still in flight.
        vm.select_avatar_file(vec![2], "image/png");
        let newer_url = vm.confirm_avatar_upload().await.unwrap();

        // Release the parked upload; it must not win.
        blobs.gate.notify_one();
        slow.await.unwrap().unwrap();

        let document = store
            .read_document_once(USERS_COLLECTION, &identity.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(document.photo_url, Some(newer_url));
    }

    #[tokio::test]
    async fn logout_detaches_the_subscription_and_clears_state() {
        let h = harness();
        let identity = sign_up(&h, "ann@example.com", "Ann").await;

        h.session.logout().await;
        wait_until(|| h.vm.snapshot().identity_id.is_none()).await;

        // A document update for the old identity must not reach the
        // view-model anymore.
        h.store
            .update_document_fields(
                USERS_COLLECTION,
                &identity.id,
                &ProfileFieldPatch::display_name("Stale"),
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let state = h.vm.snapshot();
        assert_eq!(state.identity_id, None);
        assert_eq!(state.display_name, None);
        assert!(!state.found);
    }

    #[tokio::test]
    async fn switching_identities_swaps_the_mirrored_document() {
        let h = harness();
        sign_up(&h, "ann@example.com", "Ann").await;

        h.session.logout().await;
        wait_until(|| h.vm.snapshot().identity_id.is_none()).await;

        sign_up(&h, "bob@example.com", "Bob").await;
        let state = h.vm.snapshot();
        assert_eq!(state.display_name.as_deref(), Some("Bob"));
    }

    #[tokio::test]
    async fn session_update_profile_does_not_touch_the_document_store() {
        let h = harness();
        let identity = sign_up(&h, "ann@example.com", "Ann").await;
        let writes_before = h.store.write_count();

        h.session
            .update_profile(&crate::models::IdentityProfileFields {
                display_name: Some("Renamed".to_string()),
                photo_url: None,
            })
            .await
            .unwrap();

        // The identity service's fields and the document diverge on purpose.
        assert_eq!(h.store.write_count(), writes_before);
        let document = h
            .store
            .read_document_once(USERS_COLLECTION, &identity.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(document.display_name.as_deref(), Some("Ann"));
    }
}
