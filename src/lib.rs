pub mod attachments;
pub mod auth;
pub mod config;
pub mod error;
pub mod form;
pub mod models;
pub mod openapi;
pub mod repo;
pub mod routes;
pub mod security;
pub mod service;
pub mod storage;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
pub use service::MessageStore;
