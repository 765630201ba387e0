// Diagnostic routes surfacing the internals directly. Deliberately outside
// the route guard so session resolution can be observed while it happens.
use actix_web::{web, HttpResponse};

use crate::api::error_response;
use crate::remote::{mongo, ProfileStore};
use crate::services::{SessionManager, USERS_COLLECTION};
use crate::utils::AppError;

#[utoipa::path(
    get,
    path = "/api/v1/diag/session",
    tag = "Diagnostics",
    responses(
        (status = 200, description = "Raw session state")
    )
)]
pub async fn session_state(session: web::Data<SessionManager>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "session": session.current()
    }))
}

#[utoipa::path(
    get,
    path = "/api/v1/diag/user",
    tag = "Diagnostics",
    responses(
        (status = 200, description = "Identity-service view of the current user"),
        (status = 403, description = "No active session")
    )
)]
pub async fn current_user(session: web::Data<SessionManager>) -> HttpResponse {
    match session.current().identity {
        Some(identity) => {
            // Decode the platform session token when one is attached.
            let token_claims = identity
                .id_token
                .as_deref()
                .and_then(|token| mongo::verify_id_token(token).ok());

            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "identity": identity,
                "token_claims": token_claims
            }))
        }
        None => error_response(&AppError::NotAuthenticated),
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/diag/profile",
    tag = "Diagnostics",
    responses(
        (status = 200, description = "One-shot profile document read"),
        (status = 404, description = "No profile document for the current identity")
    )
)]
pub async fn profile_once(
    session: web::Data<SessionManager>,
    store: web::Data<dyn ProfileStore>,
) -> HttpResponse {
    let identity = match session.current().identity {
        Some(identity) => identity,
        None => return error_response(&AppError::NotAuthenticated),
    };

    match store.read_document_once(USERS_COLLECTION, &identity.id).await {
        Ok(Some(document)) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "profile": document
        })),
        Ok(None) => error_response(&AppError::ProfileNotFound),
        Err(e) => {
            log::warn!("❌ One-shot profile read failed: {}", e);
            error_response(&e)
        }
    }
}
