pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod notifier;
pub mod repository;
pub mod services;

pub use error::ServiceError;
pub use services::{Admissions, Identity};

/// Shared state handed to every request handler.
pub struct AppState {
    pub admissions: Admissions,
}
