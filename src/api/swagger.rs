use utoipa::OpenApi;

use crate::api;
use crate::models::{Identity, IdentityProfileFields, ProfileDocument, SessionState};
use crate::services::ProfileState;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Profile Sync Service API",
        version = "1.0.0",
        description = "Session and profile synchronization against a hosted document/auth/storage platform.\n\n**Features:**\n- Email/password and Google sign-in\n- Session state resolution with a loading placeholder\n- Real-time profile document mirroring\n- Display-name editing with cancel\n- Staged avatar upload with preview",
    ),
    paths(
        api::health::health_check,
        api::auth::register,
        api::auth::login,
        api::auth::google_auth,
        api::auth::google_callback,
        api::auth::logout,
        api::auth::reset_password,
        api::auth::update_profile,
        api::home::get_profile,
        api::home::begin_name_edit,
        api::home::cancel_name_edit,
        api::home::save_name,
        api::home::stage_avatar,
        api::home::confirm_avatar,
        api::home::cancel_avatar,
        api::diag::session_state,
        api::diag::current_user,
        api::diag::profile_once,
    ),
    components(schemas(
        Identity,
        IdentityProfileFields,
        ProfileDocument,
        SessionState,
        ProfileState,
        api::health::HealthResponse,
        api::auth::RegisterBody,
        api::auth::LoginBody,
        api::auth::ResetPasswordBody,
        api::auth::AvatarPayload,
        api::home::NameUpdateBody,
    )),
    tags(
        (name = "Auth", description = "Session manager operations"),
        (name = "Home", description = "Protected profile view"),
        (name = "Diagnostics", description = "Unguarded internals"),
        (name = "Health", description = "Service health")
    )
)]
pub struct ApiDoc;
