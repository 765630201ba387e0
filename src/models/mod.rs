pub mod identity;
pub mod profile;
pub mod session;

pub use identity::*;
pub use profile::*;
pub use session::*;
