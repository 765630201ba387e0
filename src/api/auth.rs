use actix_web::{web, HttpResponse};
use base64::Engine;
use serde::Deserialize;

use crate::api::error_response;
use crate::remote::{BlobStore, ProfileStore};
use crate::services::{register_user, RegistrationRequest, SessionManager};
use crate::models::IdentityProfileFields;
use crate::utils::AppError;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct AvatarPayload {
    /// Base64-encoded image bytes.
    pub data: String,
    pub content_type: String,
}

impl AvatarPayload {
    pub fn decode(&self) -> Result<(Vec<u8>, String), AppError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(&self.data)
            .map_err(|e| AppError::UploadFailed(format!("Invalid avatar payload: {}", e)))?;
        Ok((bytes, self.content_type.clone()))
    }
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RegisterBody {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
    pub avatar: Option<AvatarPayload>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginBody {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ResetPasswordBody {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub error: Option<String>,
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "Auth",
    request_body = RegisterBody,
    responses(
        (status = 201, description = "Registration successful"),
        (status = 400, description = "Email in use or weak password")
    )
)]
pub async fn register(
    session: web::Data<SessionManager>,
    store: web::Data<dyn ProfileStore>,
    blobs: web::Data<dyn BlobStore>,
    body: web::Json<RegisterBody>,
) -> HttpResponse {
    log::info!("📝 POST /auth/register - email: {}", body.email);

    let avatar = match &body.avatar {
        Some(payload) => match payload.decode() {
            Ok(decoded) => Some(decoded),
            Err(e) => return error_response(&e),
        },
        None => None,
    };

    let request = RegistrationRequest {
        email: body.email.clone(),
        password: body.password.clone(),
        display_name: body.display_name.clone(),
        avatar,
    };

    match register_user(&session, &store.into_inner(), &blobs.into_inner(), request).await {
        Ok(identity) => {
            log::info!("✅ Registration successful: {}", body.email);
            HttpResponse::Created().json(serde_json::json!({
                "success": true,
                "identity": identity
            }))
        }
        Err(e) => {
            log::warn!("❌ Registration failed: {} - {}", body.email, e);
            error_response(&e)
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "Auth",
    request_body = LoginBody,
    responses(
        (status = 200, description = "Login successful"),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    session: web::Data<SessionManager>,
    body: web::Json<LoginBody>,
) -> HttpResponse {
    log::info!("🔐 POST /auth/login - email: {}", body.email);

    match session.login(&body.email, &body.password).await {
        Ok(identity) => {
            log::info!("✅ Login successful: {}", body.email);
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "identity": identity
            }))
        }
        Err(e) => {
            log::warn!("❌ Login failed: {} - {}", body.email, e);
            error_response(&e)
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/google",
    tag = "Auth",
    responses(
        (status = 200, description = "Consent URL for the Google popup")
    )
)]
pub async fn google_auth(session: web::Data<SessionManager>) -> HttpResponse {
    log::info!("🔐 GET /auth/google");

    match session.google_auth_url().await {
        Ok(url) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "auth_url": url.auth_url,
            "state": url.state
        })),
        Err(e) => {
            log::warn!("❌ Google auth URL failed: {}", e);
            error_response(&e)
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/callback",
    tag = "Auth",
    responses(
        (status = 200, description = "Federated login successful"),
        (status = 401, description = "Popup dismissed or exchange failed")
    )
)]
pub async fn google_callback(
    session: web::Data<SessionManager>,
    query: web::Query<CallbackQuery>,
) -> HttpResponse {
    log::info!("🔐 GET /auth/callback");

    // A denied consent screen comes back as error=access_denied with no
    // code; both read as a dismissed popup.
    let code = if query.error.is_some() {
        None
    } else {
        query.code.as_deref()
    };

    match session.login_with_google(code).await {
        Ok(identity) => {
            log::info!("✅ Federated login successful: {}", identity.email);
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "identity": identity
            }))
        }
        Err(e) => {
            log::warn!("❌ Federated login failed: {}", e);
            error_response(&e)
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "Auth",
    responses(
        (status = 200, description = "Session cleared")
    )
)]
pub async fn logout(session: web::Data<SessionManager>) -> HttpResponse {
    log::info!("🚪 POST /auth/logout");
    session.logout().await;
    HttpResponse::Ok().json(serde_json::json!({ "success": true }))
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/reset-password",
    tag = "Auth",
    request_body = ResetPasswordBody,
    responses(
        (status = 200, description = "Reset email queued"),
        (status = 404, description = "Unknown email")
    )
)]
pub async fn reset_password(
    session: web::Data<SessionManager>,
    body: web::Json<ResetPasswordBody>,
) -> HttpResponse {
    log::info!("🔑 POST /auth/reset-password - email: {}", body.email);

    match session.reset_password(&body.email).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({ "success": true })),
        Err(e) => {
            log::warn!("❌ Password reset failed: {} - {}", body.email, e);
            error_response(&e)
        }
    }
}

#[utoipa::path(
    patch,
    path = "/api/v1/auth/profile",
    tag = "Auth",
    request_body = IdentityProfileFields,
    responses(
        (status = 200, description = "Identity profile fields updated"),
        (status = 403, description = "No active session")
    )
)]
pub async fn update_profile(
    session: web::Data<SessionManager>,
    body: web::Json<IdentityProfileFields>,
) -> HttpResponse {
    log::info!("✏️  PATCH /auth/profile");

    match session.update_profile(&body).await {
        Ok(identity) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "identity": identity
        })),
        Err(e) => {
            log::warn!("❌ Identity profile update failed: {}", e);
            error_response(&e)
        }
    }
}
