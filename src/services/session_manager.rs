// Single source of truth for "who is logged in". The session-change
// listener registered at construction is the only writer of the identity
// slot (plus the documented local updates in update_profile and logout), so
// session updates are strictly ordered by event arrival.
use std::sync::Arc;

use tokio::sync::watch;

use crate::models::{Identity, IdentityProfileFields, SessionState};
use crate::remote::{FederatedAuthUrl, IdentityService, Subscription};
use crate::utils::{AppError, AppResult};

pub struct SessionManager {
    identity_service: Arc<dyn IdentityService>,
    state: Arc<watch::Sender<SessionState>>,
    listener: std::sync::Mutex<Option<Subscription>>,
}

impl SessionManager {
    /// Builds the manager and registers the persistent session listener.
    /// The session starts in `loading` and resolves on the listener's first
    /// callback.
    pub fn new(identity_service: Arc<dyn IdentityService>) -> Self {
        let (tx, _) = watch::channel(SessionState::resolving());
        let state = Arc::new(tx);

        let writer = state.clone();
        let listener = identity_service.subscribe_to_session_changes(Box::new(move |identity| {
            writer.send_modify(|session| {
                session.identity = identity;
                session.loading = false;
            });
        }));

        Self {
            identity_service,
            state,
            listener: std::sync::Mutex::new(Some(listener)),
        }
    }

    /// Current session snapshot.
    pub fn current(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Hands out a receiver for session-change notifications.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Detaches the session listener. Call on shutdown.
    pub fn teardown(&self) {
        if let Ok(mut listener) = self.listener.lock() {
            if let Some(subscription) = listener.take() {
                subscription.unsubscribe();
            }
        }
    }

    /// Creates a remote account. Does NOT write the profile document; that
    /// is the registration flow's responsibility.
    pub async fn signup(&self, email: &str, password: &str) -> AppResult<Identity> {
        self.identity_service.create_account(email, password).await
    }

    pub async fn login(&self, email: &str, password: &str) -> AppResult<Identity> {
        self.identity_service.sign_in(email, password).await
    }

    pub async fn google_auth_url(&self) -> AppResult<FederatedAuthUrl> {
        self.identity_service.federated_auth_url().await
    }

    /// Completes the federated sign-in with the provider callback code.
    /// `None` means the consent popup was dismissed.
    pub async fn login_with_google(&self, code: Option<&str>) -> AppResult<Identity> {
        self.identity_service
            .sign_in_with_federated_provider(code)
            .await
    }

    /// Always succeeds locally: the session is cleared even when the remote
    /// sign-out call fails.
    pub async fn logout(&self) {
        if let Err(e) = self.identity_service.sign_out().await {
            log::warn!("❌ Remote sign-out failed, clearing session anyway: {}", e);
        }
        self.state.send_modify(|session| {
            session.identity = None;
            session.loading = false;
        });
    }

    pub async fn reset_password(&self, email: &str) -> AppResult<()> {
        self.identity_service.send_password_reset(email).await
    }

    /// Updates the identity service's own profile fields and mirrors them
    /// into the local session. The profile document store is deliberately
    /// not written here; the two representations are separate surfaces.
    pub async fn update_profile(&self, fields: &IdentityProfileFields) -> AppResult<Identity> {
        let identity = self
            .current()
            .identity
            .ok_or(AppError::NotAuthenticated)?;

        let updated = self
            .identity_service
            .update_profile_fields(&identity.id, fields)
            .await?;

        self.state.send_modify(|session| {
            if let Some(current) = session.identity.as_mut() {
                current.apply(fields);
            }
        });

        log::info!("✅ Identity profile updated for {}", identity.id);
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::memory::MemoryIdentityService;
    use std::time::Duration;

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        for _ in 0..200 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached within timeout");
    }

    fn manager() -> (SessionManager, Arc<MemoryIdentityService>) {
        let service = Arc::new(MemoryIdentityService::new());
        (SessionManager::new(service.clone()), service)
    }

    #[tokio::test]
    async fn session_resolves_to_signed_out_on_startup() {
        let (manager, _service) = manager();
        assert!(manager.current().loading);

        wait_until(|| !manager.current().loading).await;
        assert!(manager.current().identity.is_none());
    }

    #[tokio::test]
    async fn signup_then_login_yields_same_identity_id() {
        let (manager, _service) = manager();

        let created = manager.signup("ann@example.com", "secret1").await.unwrap();
        let logged_in = manager.login("ann@example.com", "secret1").await.unwrap();
        assert_eq!(created.id, logged_in.id);

        wait_until(|| manager.current().identity.is_some()).await;
        assert_eq!(manager.current().identity.unwrap().id, created.id);
    }

    #[tokio::test]
    async fn listener_clears_loading_and_never_leaves_it_set_with_an_identity() {
        let (manager, _service) = manager();
        let mut rx = manager.subscribe();

        manager.signup("bob@example.com", "secret1").await.unwrap();

        // Every observable state after the first callback has loading=false;
        // no state ever pairs loading=true with a resolved identity.
        wait_until(|| manager.current().identity.is_some()).await;
        loop {
            let state = rx.borrow_and_update().clone();
            if state.identity.is_some() {
                assert!(!state.loading);
                break;
            }
            assert!(state.loading || state.identity.is_none());
            rx.changed().await.unwrap();
        }
    }

    #[tokio::test]
    async fn weak_password_and_duplicate_email_are_rejected() {
        let (manager, _service) = manager();

        let weak = manager.signup("eve@example.com", "short").await;
        assert!(matches!(weak, Err(AppError::WeakPassword)));

        manager.signup("eve@example.com", "secret1").await.unwrap();
        let duplicate = manager.signup("eve@example.com", "secret2").await;
        assert!(matches!(duplicate, Err(AppError::EmailInUse)));
    }

    #[tokio::test]
    async fn login_with_wrong_password_fails() {
        let (manager, _service) = manager();
        manager.signup("carol@example.com", "secret1").await.unwrap();

        let result = manager.login("carol@example.com", "wrong-password").await;
        assert!(matches!(result, Err(AppError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn dismissed_popup_maps_to_popup_closed() {
        let (manager, _service) = manager();
        let result = manager.login_with_google(None).await;
        assert!(matches!(result, Err(AppError::PopupClosed)));
    }

    #[tokio::test]
    async fn logout_clears_the_session() {
        let (manager, _service) = manager();
        manager.signup("dave@example.com", "secret1").await.unwrap();
        wait_until(|| manager.current().identity.is_some()).await;

        manager.logout().await;
        wait_until(|| manager.current().identity.is_none()).await;
        assert!(!manager.current().loading);
    }

    #[tokio::test]
    async fn reset_password_for_unknown_email_is_user_not_found() {
        let (manager, _service) = manager();
        let result = manager.reset_password("nobody@example.com").await;
        assert!(matches!(result, Err(AppError::UserNotFound)));
    }

    #[tokio::test]
    async fn update_profile_requires_an_active_session() {
        let (manager, _service) = manager();
        let result = manager
            .update_profile(&IdentityProfileFields {
                display_name: Some("Ann".to_string()),
                photo_url: None,
            })
            .await;
        assert!(matches!(result, Err(AppError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn update_profile_mirrors_fields_into_the_session() {
        let (manager, _service) = manager();
        manager.signup("fay@example.com", "secret1").await.unwrap();
        wait_until(|| manager.current().identity.is_some()).await;

        manager
            .update_profile(&IdentityProfileFields {
                display_name: Some("Fay".to_string()),
                photo_url: Some("https://example.com/fay.png".to_string()),
            })
            .await
            .unwrap();

        let identity = manager.current().identity.unwrap();
        assert_eq!(identity.display_name.as_deref(), Some("Fay"));
        assert_eq!(identity.photo_url.as_deref(), Some("https://example.com/fay.png"));
    }
}
