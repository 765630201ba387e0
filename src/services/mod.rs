pub mod profile_view_model;
pub mod registration;
pub mod session_manager;

pub use profile_view_model::*;
pub use registration::*;
pub use session_manager::*;

/// Profile documents live in one collection keyed by identity id.
pub const USERS_COLLECTION: &str = "users";
