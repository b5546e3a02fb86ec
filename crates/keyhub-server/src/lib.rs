pub mod auth;
pub mod bytes;
pub mod dirs;
pub mod error;
pub mod handlers;
pub mod manager;
pub mod render;
pub mod server;
pub mod store;
pub mod upstream;

use std::sync::Arc;

/// Shared application state threaded through axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Admin credential and session markers.
    pub gate: Arc<auth::CredentialGate>,
    pub manager: Arc<manager::Manager>,
    pub templates: Arc<render::Templates>,
}

pub use error::{Error, Result};
pub use server::{build_app, resolve_data_dir, run, ServerConfig};
