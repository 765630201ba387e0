pub mod auth;
pub mod diag;
pub mod files;
pub mod health;
pub mod home;
pub mod swagger;

use actix_web::http::StatusCode;
use actix_web::HttpResponse;

use crate::utils::AppError;

/// Inline JSON error body with the status the taxonomy maps this error to.
pub fn error_response(e: &AppError) -> HttpResponse {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    HttpResponse::build(status).json(serde_json::json!({
        "success": false,
        "error": e.to_string()
    }))
}
