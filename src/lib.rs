pub mod api;
pub mod middleware;
pub mod models;
pub mod remote;
pub mod services;
pub mod utils;
