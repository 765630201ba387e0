// Registration flow: identity creation, optional avatar upload, then the
// client-side profile document write. The document write happens after the
// account already exists and is not transactional with it; a crash in
// between leaves an identity without a document, which the view-model
// tolerates as an empty snapshot.
use std::sync::Arc;

use crate::models::{Identity, ProfileDocument};
use crate::remote::{BlobStore, ProfileStore};
use crate::services::{SessionManager, USERS_COLLECTION};
use crate::utils::AppResult;

pub struct RegistrationRequest {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
    /// Avatar picked during registration, uploaded before the document
    /// write so the document can point at it from the start.
    pub avatar: Option<(Vec<u8>, String)>,
}

pub async fn register_user(
    session: &SessionManager,
    store: &Arc<dyn ProfileStore>,
    blobs: &Arc<dyn BlobStore>,
    request: RegistrationRequest,
) -> AppResult<Identity> {
    let identity = session.signup(&request.email, &request.password).await?;

    let photo_url = match &request.avatar {
        Some((bytes, content_type)) => {
            let receipt = blobs
                .upload_blob(
                    &format!("profilePictures/{}", identity.id),
                    bytes,
                    content_type,
                )
                .await?;
            Some(blobs.get_public_url(&receipt).await?)
        }
        None => None,
    };

    store
        .write_document(
            USERS_COLLECTION,
            &identity.id,
            &ProfileDocument {
                email: Some(request.email.clone()),
                display_name: request.display_name.clone(),
                photo_url,
                subscription_status: None,
                content_suggestions: vec![],
            },
        )
        .await?;

    log::info!("✅ Registration completed for {}", request.email);
    Ok(identity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::{MemoryBlobStore, MemoryIdentityService, MemoryProfileStore};
    use crate::remote::ProfileStore as _;
    use crate::utils::AppError;

    fn services() -> (SessionManager, Arc<dyn ProfileStore>, Arc<dyn BlobStore>, Arc<MemoryProfileStore>) {
        let identity = Arc::new(MemoryIdentityService::new());
        let store = Arc::new(MemoryProfileStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let session = SessionManager::new(identity);
        (session, store.clone(), blobs, store)
    }

    #[tokio::test]
    async fn register_writes_the_document_after_identity_creation() {
        let (session, store, blobs, raw_store) = services();

        let identity = register_user(
            &session,
            &store,
            &blobs,
            RegistrationRequest {
                email: "a@b.com".to_string(),
                password: "secret1".to_string(),
                display_name: Some("Ann".to_string()),
                avatar: None,
            },
        )
        .await
        .unwrap();

        let document = raw_store
            .read_document_once(USERS_COLLECTION, &identity.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(document.email.as_deref(), Some("a@b.com"));
        assert_eq!(document.display_name.as_deref(), Some("Ann"));
        assert_eq!(document.photo_url, None);
    }

    #[tokio::test]
    async fn register_with_avatar_points_the_document_at_the_upload() {
        let (session, store, blobs, raw_store) = services();

        let identity = register_user(
            &session,
            &store,
            &blobs,
            RegistrationRequest {
                email: "pic@b.com".to_string(),
                password: "secret1".to_string(),
                display_name: Some("Pic".to_string()),
                avatar: Some((vec![1, 2, 3], "image/png".to_string())),
            },
        )
        .await
        .unwrap();

        let document = raw_store
            .read_document_once(USERS_COLLECTION, &identity.id)
            .await
            .unwrap()
            .unwrap();
        let url = document.photo_url.expect("document should carry the avatar URL");
        assert!(url.contains(&format!("profilePictures/{}", identity.id)));
    }

    #[tokio::test]
    async fn duplicate_registration_fails_without_touching_the_store() {
        let (session, store, blobs, raw_store) = services();

        let request = || RegistrationRequest {
            email: "dup@b.com".to_string(),
            password: "secret1".to_string(),
            display_name: None,
            avatar: None,
        };
        register_user(&session, &store, &blobs, request()).await.unwrap();
        let writes_after_first = raw_store.write_count();

        let result = register_user(&session, &store, &blobs, request()).await;
        assert!(matches!(result, Err(AppError::EmailInUse)));
        assert_eq!(raw_store.write_count(), writes_after_first);
    }
}
