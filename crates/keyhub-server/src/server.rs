use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    auth::{require_session, Bcrypt, CredentialGate},
    handlers::{change_admin, login, login_page, logout, not_found, server_index},
    manager::{Manager, BASE_PATH},
    render::Templates,
    store::CredentialFile,
    upstream::{build_client, TransportOptions},
    AppState,
};

/// Link tag appended to access URLs unless configured otherwise.
pub const DEFAULT_ACCESS_URL_TAG: &str = "keyhub";

pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Access-key API URLs, one per managed server, in id order.
    pub servers: Vec<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub accept_invalid_certs: bool,
    pub upstream_timeout: Option<Duration>,
    pub access_url_tag: String,
}

/// Split a comma-separated list, dropping blanks.
pub fn parse_server_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

fn env_flag(name: &str, default: bool) -> bool {
    std::env::var(name)
        .map(|v| !matches!(v.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no"))
        .unwrap_or(default)
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: std::env::var("KEYHUB_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: std::env::var("KEYHUB_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            servers: std::env::var("KEYHUB_SERVERS")
                .map(|s| parse_server_list(&s))
                .unwrap_or_default(),
            username: std::env::var("KEYHUB_USERNAME").ok(),
            password: std::env::var("KEYHUB_PASSWORD").ok(),
            data_dir: std::env::var("KEYHUB_DATA_DIR").ok().map(PathBuf::from),
            accept_invalid_certs: env_flag("KEYHUB_ACCEPT_INVALID_CERTS", true),
            upstream_timeout: std::env::var("KEYHUB_UPSTREAM_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs),
            access_url_tag: std::env::var("KEYHUB_ACCESS_URL_TAG")
                .unwrap_or_else(|_| DEFAULT_ACCESS_URL_TAG.into()),
        }
    }
}

/// Use `dir` when given, otherwise the platform data directory.
pub fn resolve_data_dir(dir: Option<&PathBuf>) -> Result<PathBuf> {
    match dir {
        Some(d) => {
            std::fs::create_dir_all(d).context("create data dir")?;
            Ok(d.clone())
        }
        None => crate::dirs::data_dir(),
    }
}

/// Assemble the router: public login routes, everything else behind the
/// session gate, and one 404 for whatever matches nothing.
pub fn build_app(state: AppState) -> Router {
    let public = Router::new()
        .route("/login", get(login_page).post(login).fallback(not_found))
        .route("/logout", post(logout).fallback(not_found));

    let protected = Router::new()
        .route(BASE_PATH, get(server_index).fallback(not_found))
        .route(
            &format!("{BASE_PATH}/set/admin"),
            post(change_admin).fallback(not_found),
        )
        .merge(state.manager.routes(&state.templates))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_session,
        ));

    Router::new()
        .merge(public)
        .merge(protected)
        .fallback(not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

pub async fn run(cfg: ServerConfig) -> Result<()> {
    let data_dir = resolve_data_dir(cfg.data_dir.as_ref())?;
    info!(data_dir = %data_dir.display(), "using data directory");

    let gate = CredentialGate::from_config(
        cfg.username,
        cfg.password,
        CredentialFile::in_dir(&data_dir),
        Arc::new(Bcrypt::default()),
    )
    .await
    .context("load admin credentials")?;
    info!(username = %gate.username(), "admin credential ready");

    let client = build_client(&TransportOptions {
        accept_invalid_certs: cfg.accept_invalid_certs,
        timeout: cfg.upstream_timeout,
    })
    .context("build upstream client")?;

    let manager = Manager::bootstrap(&cfg.servers, client, &cfg.access_url_tag)
        .await
        .context("bootstrap managed servers")?;
    info!(servers = manager.views().len(), "managed servers ready");

    let state = AppState {
        gate: Arc::new(gate),
        manager: Arc::new(manager),
        templates: Arc::new(Templates::new().context("compile templates")?),
    };

    let app = build_app(state);

    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .context("invalid host/port")?;

    info!(%addr, "keyhub console listening, sign in at /login");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("bind listener")?;

    axum::serve(listener, app).await.context("server error")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_list_skips_blanks() {
        assert_eq!(
            parse_server_list(" https://a:1/x , ,https://b:2/y,"),
            vec!["https://a:1/x".to_owned(), "https://b:2/y".to_owned()]
        );
        assert!(parse_server_list("").is_empty());
    }

    #[test]
    fn explicit_data_dir_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("nested/data");
        let resolved = resolve_data_dir(Some(&dir)).unwrap();
        assert_eq!(resolved, dir);
        assert!(dir.is_dir());
    }
}
