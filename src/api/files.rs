use actix_web::{web, HttpResponse};

use crate::api::error_response;
use crate::remote::BlobStore;

/// Serves stored blobs; this is what the blob store's public URLs point at.
pub async fn get_file(
    blobs: web::Data<dyn BlobStore>,
    path: web::Path<String>,
) -> HttpResponse {
    let key = path.into_inner();

    match blobs.download_blob(&key).await {
        Ok(Some((bytes, content_type))) => {
            HttpResponse::Ok().content_type(content_type).body(bytes)
        }
        Ok(None) => HttpResponse::NotFound().json(serde_json::json!({
            "success": false,
            "error": format!("No file stored under {}", key)
        })),
        Err(e) => {
            log::warn!("❌ Blob read failed for {}: {}", key, e);
            error_response(&e)
        }
    }
}
