use std::env;
use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use profile_sync_service::api;
use profile_sync_service::middleware::RouteGuard;
use profile_sync_service::remote::memory::{
    MemoryBlobStore, MemoryIdentityService, MemoryProfileStore,
};
use profile_sync_service::remote::mongo::{
    MongoBlobStore, MongoIdentityService, MongoPlatform, MongoProfileStore,
};
use profile_sync_service::remote::{BlobStore, IdentityService, ProfileStore};
use profile_sync_service::services::{ProfileViewModel, SessionManager};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    // Get configuration from environment
    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let backend = env::var("BACKEND").unwrap_or_else(|_| "mongo".to_string());

    log::info!("🚀 Starting Profile Sync Service...");

    let (identity_service, profile_store, blob_store): (
        Arc<dyn IdentityService>,
        Arc<dyn ProfileStore>,
        Arc<dyn BlobStore>,
    ) = match backend.as_str() {
        "memory" => {
            log::info!("🗄️  Backend: in-memory (no persistence)");
            (
                Arc::new(MemoryIdentityService::new()),
                Arc::new(MemoryProfileStore::new()),
                Arc::new(MemoryBlobStore::new()),
            )
        }
        _ => {
            let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
            log::info!("🗄️  Backend: hosted platform at {}", database_url);

            let platform = MongoPlatform::new(&database_url)
                .await
                .expect("Failed to connect to the hosted platform");
            log::info!("✅ Platform connected successfully");

            let public_base_url = env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| format!("http://{}:{}", host, port));

            (
                Arc::new(MongoIdentityService::new(&platform)),
                Arc::new(MongoProfileStore::new(&platform)),
                Arc::new(MongoBlobStore::new(&platform, public_base_url)),
            )
        }
    };

    // Process-local singletons. The session manager owns session state; the
    // view model follows it and mirrors the profile document.
    let session = Arc::new(SessionManager::new(identity_service));
    let view_model = ProfileViewModel::attach(
        profile_store.clone(),
        blob_store.clone(),
        session.subscribe(),
    );

    let session_data = web::Data::from(session.clone());
    let view_model_data = web::Data::from(view_model.clone());
    let store_data: web::Data<dyn ProfileStore> = web::Data::from(profile_store);
    let blobs_data: web::Data<dyn BlobStore> = web::Data::from(blob_store);

    log::info!("🌐 Server starting on {}:{}", host, port);
    log::info!("📚 Swagger UI available at: http://{}:{}/swagger-ui/", host, port);

    let bind_addr = format!("{}:{}", host, port);

    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin("http://localhost:3000")
            .allowed_origin("http://localhost:5173")
            .allowed_origin("http://127.0.0.1:3000")
            .allowed_origin("http://127.0.0.1:5173")
            .allowed_methods(vec!["GET", "POST", "PUT", "PATCH", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                actix_web::http::header::AUTHORIZATION,
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::ACCEPT,
            ])
            .supports_credentials()
            .max_age(3600);

        let openapi = api::swagger::ApiDoc::openapi();

        App::new()
            .app_data(session_data.clone())
            .app_data(view_model_data.clone())
            .app_data(store_data.clone())
            .app_data(blobs_data.clone())
            .wrap(cors)
            .wrap(Logger::default())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}").url("/api-docs/openapi.json", openapi),
            )
            // Health check
            .route("/health", web::get().to(api::health::health_check))
            // Session manager operations
            .service(
                web::scope("/api/v1/auth")
                    .route("/register", web::post().to(api::auth::register))
                    .route("/login", web::post().to(api::auth::login))
                    .route("/google", web::get().to(api::auth::google_auth))
                    .route("/callback", web::get().to(api::auth::google_callback))
                    .route("/logout", web::post().to(api::auth::logout))
                    .route("/reset-password", web::post().to(api::auth::reset_password))
                    .route("/profile", web::patch().to(api::auth::update_profile)),
            )
            // Protected profile view
            .service(
                web::scope("/api/v1/home")
                    .wrap(RouteGuard)
                    .route("/profile", web::get().to(api::home::get_profile))
                    .route("/profile/name", web::put().to(api::home::save_name))
                    .route(
                        "/profile/name/edit",
                        web::post().to(api::home::begin_name_edit),
                    )
                    .route(
                        "/profile/name/edit",
                        web::delete().to(api::home::cancel_name_edit),
                    )
                    .route("/avatar", web::post().to(api::home::stage_avatar))
                    .route("/avatar/confirm", web::post().to(api::home::confirm_avatar))
                    .route("/avatar", web::delete().to(api::home::cancel_avatar)),
            )
            // Diagnostics, deliberately unguarded
            .service(
                web::scope("/api/v1/diag")
                    .route("/session", web::get().to(api::diag::session_state))
                    .route("/user", web::get().to(api::diag::current_user))
                    .route("/profile", web::get().to(api::diag::profile_once)),
            )
            // Public blob URLs resolve here
            .route("/files/{key:.*}", web::get().to(api::files::get_file))
    })
    .bind(&bind_addr)?
    .run()
    .await;

    // Detach the listeners before exiting.
    view_model.detach();
    session.teardown();

    server
}
