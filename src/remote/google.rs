// Google OAuth plumbing for the federated sign-in path: consent URL
// construction and authorization-code exchange.
use lazy_static::lazy_static;
use serde::Deserialize;
use uuid::Uuid;

use crate::remote::FederatedAuthUrl;
use crate::utils::{AppError, AppResult};

lazy_static! {
    // One connection pool for every token exchange.
    static ref HTTP: reqwest::Client = reqwest::Client::new();
}

#[derive(Debug, Deserialize)]
pub struct GoogleUserInfo {
    pub id: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

fn client_id() -> AppResult<String> {
    std::env::var("GOOGLE_CLIENT_ID")
        .map_err(|_| AppError::NetworkError("GOOGLE_CLIENT_ID not configured".to_string()))
}

fn client_secret() -> AppResult<String> {
    std::env::var("GOOGLE_CLIENT_SECRET")
        .map_err(|_| AppError::NetworkError("GOOGLE_CLIENT_SECRET not configured".to_string()))
}

fn redirect_uri() -> String {
    std::env::var("GOOGLE_REDIRECT_URI")
        .unwrap_or_else(|_| "http://localhost:3000/api/v1/auth/callback".to_string())
}

/// Builds the consent URL the client opens in a popup.
pub fn consent_url() -> AppResult<FederatedAuthUrl> {
    let client_id = client_id()?;
    let redirect_uri = redirect_uri();

    // State for CSRF protection
    let state = Uuid::new_v4().to_string();

    let params = vec![
        ("client_id", client_id.as_str()),
        ("redirect_uri", redirect_uri.as_str()),
        ("response_type", "code"),
        ("scope", "openid email profile"),
        ("state", state.as_str()),
        ("prompt", "select_account"),
    ];

    let query_string = params
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&");

    Ok(FederatedAuthUrl {
        auth_url: format!("https://accounts.google.com/o/oauth2/v2/auth?{}", query_string),
        state,
    })
}

/// Exchanges the callback authorization code for the Google account info.
pub async fn exchange_code(code: &str) -> AppResult<GoogleUserInfo> {
    let client_id = client_id()?;
    let client_secret = client_secret()?;
    let redirect_uri = redirect_uri();

    let token_response = HTTP
        .post("https://oauth2.googleapis.com/token")
        .form(&[
            ("code", code),
            ("client_id", &client_id),
            ("client_secret", &client_secret),
            ("redirect_uri", &redirect_uri),
            ("grant_type", "authorization_code"),
        ])
        .send()
        .await
        .map_err(|e| AppError::NetworkError(format!("Failed to exchange code: {}", e)))?;

    if !token_response.status().is_success() {
        return Err(AppError::NetworkError(
            "Failed to exchange authorization code".to_string(),
        ));
    }

    let tokens: TokenResponse = token_response
        .json()
        .await
        .map_err(|e| AppError::NetworkError(format!("Failed to parse token response: {}", e)))?;

    let user_info = HTTP
        .get("https://www.googleapis.com/oauth2/v2/userinfo")
        .header("Authorization", format!("Bearer {}", tokens.access_token))
        .send()
        .await
        .map_err(|e| AppError::NetworkError(format!("Failed to get user info: {}", e)))?
        .json::<GoogleUserInfo>()
        .await
        .map_err(|e| AppError::NetworkError(format!("Failed to parse user info: {}", e)))?;

    Ok(user_info)
}
