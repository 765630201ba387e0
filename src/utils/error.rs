use std::fmt;

#[derive(Debug)]
pub enum AppError {
    InvalidCredentials,
    EmailInUse,
    WeakPassword,
    PopupClosed,
    UserNotFound,
    ProfileNotFound,
    NotAuthenticated,
    UploadFailed(String),
    DatabaseError(String),
    NetworkError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InvalidCredentials => write!(f, "Invalid credentials"),
            AppError::EmailInUse => write!(f, "Email already in use"),
            AppError::WeakPassword => write!(f, "Password should be at least 6 characters"),
            AppError::PopupClosed => write!(f, "Sign-in popup was closed before completing"),
            AppError::UserNotFound => write!(f, "User not found"),
            AppError::ProfileNotFound => write!(f, "No user profile found"),
            AppError::NotAuthenticated => write!(f, "No authenticated user"),
            AppError::UploadFailed(msg) => write!(f, "Upload failed: {}", msg),
            AppError::DatabaseError(msg) => write!(f, "Database error: {}", msg),
            AppError::NetworkError(msg) => write!(f, "Network error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    /// HTTP status the API layer answers with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::InvalidCredentials | AppError::PopupClosed => 401,
            AppError::EmailInUse | AppError::WeakPassword => 400,
            AppError::UserNotFound | AppError::ProfileNotFound => 404,
            AppError::NotAuthenticated => 403,
            AppError::UploadFailed(_) | AppError::NetworkError(_) => 502,
            AppError::DatabaseError(_) => 500,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
