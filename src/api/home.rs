// Protected profile surface. Everything here sits behind the route guard,
// so a handler can assume a resolved, signed-in session.
use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::api::auth::AvatarPayload;
use crate::api::error_response;
use crate::services::ProfileViewModel;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct NameUpdateBody {
    pub display_name: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/home/profile",
    tag = "Home",
    responses(
        (status = 200, description = "Mirrored profile state")
    )
)]
pub async fn get_profile(vm: web::Data<ProfileViewModel>) -> HttpResponse {
    let profile = vm.snapshot();
    if profile.found {
        HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "profile": profile
        }))
    } else {
        // Identity without a document: render "no profile found", not an
        // error.
        HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "No user profile found",
            "profile": profile
        }))
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/home/profile/name/edit",
    tag = "Home",
    responses(
        (status = 200, description = "Name edit mode entered")
    )
)]
pub async fn begin_name_edit(vm: web::Data<ProfileViewModel>) -> HttpResponse {
    vm.begin_name_edit();
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "profile": vm.snapshot()
    }))
}

#[utoipa::path(
    delete,
    path = "/api/v1/home/profile/name/edit",
    tag = "Home",
    responses(
        (status = 200, description = "Name edit cancelled, no write issued")
    )
)]
pub async fn cancel_name_edit(vm: web::Data<ProfileViewModel>) -> HttpResponse {
    vm.cancel_name_edit();
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "profile": vm.snapshot()
    }))
}

#[utoipa::path(
    put,
    path = "/api/v1/home/profile/name",
    tag = "Home",
    request_body = NameUpdateBody,
    responses(
        (status = 200, description = "Display name saved"),
        (status = 403, description = "No active session")
    )
)]
pub async fn save_name(
    vm: web::Data<ProfileViewModel>,
    body: web::Json<NameUpdateBody>,
) -> HttpResponse {
    log::info!("✏️  PUT /home/profile/name");

    match vm.save_name(&body.display_name).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "profile": vm.snapshot()
        })),
        Err(e) => {
            log::warn!("❌ Display name save failed: {}", e);
            error_response(&e)
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/home/avatar",
    tag = "Home",
    request_body = AvatarPayload,
    responses(
        (status = 200, description = "Avatar staged for preview, no upload yet")
    )
)]
pub async fn stage_avatar(
    vm: web::Data<ProfileViewModel>,
    body: web::Json<AvatarPayload>,
) -> HttpResponse {
    let (bytes, content_type) = match body.decode() {
        Ok(decoded) => decoded,
        Err(e) => return error_response(&e),
    };

    vm.select_avatar_file(bytes, &content_type);
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "profile": vm.snapshot()
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/home/avatar/confirm",
    tag = "Home",
    responses(
        (status = 200, description = "Avatar uploaded and profile document updated"),
        (status = 502, description = "Blob store failure, previous avatar kept")
    )
)]
pub async fn confirm_avatar(vm: web::Data<ProfileViewModel>) -> HttpResponse {
    log::info!("🖼️  POST /home/avatar/confirm");

    match vm.confirm_avatar_upload().await {
        Ok(photo_url) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "photo_url": photo_url,
            "profile": vm.snapshot()
        })),
        Err(e) => {
            log::warn!("❌ Avatar upload failed: {}", e);
            error_response(&e)
        }
    }
}

#[utoipa::path(
    delete,
    path = "/api/v1/home/avatar",
    tag = "Home",
    responses(
        (status = 200, description = "Staged avatar discarded, no network effect")
    )
)]
pub async fn cancel_avatar(vm: web::Data<ProfileViewModel>) -> HttpResponse {
    vm.cancel_avatar_upload();
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "profile": vm.snapshot()
    }))
}
