// Route guard: protected scopes render only for a resolved, signed-in
// session. While the session is still loading the guard answers with a
// neutral placeholder instead of redirecting, so protected content neither
// flashes before the session resolves nor bounces a signed-in user to the
// login page on startup.
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    error::InternalError,
    http::header,
    Error, HttpResponse,
};
use futures::future::LocalBoxFuture;
use std::future::{ready, Ready};

use crate::models::SessionState;
use crate::services::SessionManager;

pub const LOGIN_ROUTE: &str = "/login";

#[derive(Debug, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    Placeholder,
    RedirectToLogin,
}

pub fn decide(session: &SessionState) -> GuardDecision {
    if session.loading {
        GuardDecision::Placeholder
    } else if session.is_authenticated() {
        GuardDecision::Allow
    } else {
        GuardDecision::RedirectToLogin
    }
}

pub struct RouteGuard;

impl<S, B> Transform<S, ServiceRequest> for RouteGuard
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RouteGuardService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RouteGuardService { service }))
    }
}

pub struct RouteGuardService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for RouteGuardService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let session = req
            .app_data::<actix_web::web::Data<SessionManager>>()
            .map(|manager| manager.current());

        let decision = match &session {
            Some(state) => decide(state),
            // No session manager registered: never expose protected content.
            None => GuardDecision::RedirectToLogin,
        };

        match decision {
            GuardDecision::Allow => {
                let fut = self.service.call(req);
                Box::pin(async move {
                    let res = fut.await?;
                    Ok(res)
                })
            }
            GuardDecision::Placeholder => Box::pin(async move {
                let response = HttpResponse::ServiceUnavailable()
                    .insert_header((header::RETRY_AFTER, "1"))
                    .json(serde_json::json!({
                        "success": false,
                        "status": "resolving-session"
                    }));
                Err(InternalError::from_response("session resolving", response).into())
            }),
            GuardDecision::RedirectToLogin => Box::pin(async move {
                let response = HttpResponse::SeeOther()
                    .insert_header((header::LOCATION, LOGIN_ROUTE))
                    .json(serde_json::json!({
                        "success": false,
                        "error": "Not signed in",
                        "redirect": LOGIN_ROUTE
                    }));
                Err(InternalError::from_response("not signed in", response).into())
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Identity;

    fn identity() -> Identity {
        Identity {
            id: "uid-1".to_string(),
            email: "ann@example.com".to_string(),
            display_name: Some("Ann".to_string()),
            photo_url: None,
            id_token: None,
        }
    }

    #[test]
    fn loading_session_renders_a_placeholder_never_a_redirect() {
        let state = SessionState {
            identity: None,
            loading: true,
        };
        assert_eq!(decide(&state), GuardDecision::Placeholder);
    }

    #[test]
    fn resolved_session_without_identity_redirects_to_login() {
        let state = SessionState {
            identity: None,
            loading: false,
        };
        assert_eq!(decide(&state), GuardDecision::RedirectToLogin);
    }

    #[test]
    fn signed_in_session_allows_protected_content() {
        let state = SessionState {
            identity: Some(identity()),
            loading: false,
        };
        assert_eq!(decide(&state), GuardDecision::Allow);
    }
}
