use std::sync::{Arc, PoisonError, RwLock};

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use constant_time_eq::constant_time_eq;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::store::{AdminCredential, CredentialFile};
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

/// Cookie carrying the session marker handed out by a successful login.
pub const SESSION_COOKIE: &str = "keyhub_session";

/// The one response for unknown routes, bad methods, missing parameters,
/// failed logins and failed operations alike.
pub fn access_denied() -> Response {
    StatusCode::NOT_FOUND.into_response()
}

// ── Password hashing ─────────────────────────────────────────────────────────

pub trait PasswordHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<String>;
    fn verify(&self, plaintext: &str, hash: &str) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct Bcrypt {
    cost: u32,
}

impl Bcrypt {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }
}

impl Default for Bcrypt {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl PasswordHasher for Bcrypt {
    fn hash(&self, plaintext: &str) -> Result<String> {
        bcrypt::hash(plaintext, self.cost).map_err(|e| Error::Credentials(e.to_string()))
    }

    fn verify(&self, plaintext: &str, hash: &str) -> bool {
        bcrypt::verify(plaintext, hash).unwrap_or(false)
    }
}

// ── Gate ─────────────────────────────────────────────────────────────────────

/// Holds the admin credential and issues/validates stateless session markers.
///
/// A marker is `hex(HMAC-SHA256(password_hash, username))`. The hash is
/// salted, so replacing the credential invalidates every issued marker.
pub struct CredentialGate {
    current: RwLock<AdminCredential>,
    file: CredentialFile,
    hasher: Arc<dyn PasswordHasher>,
}

impl CredentialGate {
    pub fn new(cred: AdminCredential, file: CredentialFile, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self {
            current: RwLock::new(cred),
            file,
            hasher,
        }
    }

    /// Hash supplied credentials in memory, or fall back to the credential file.
    pub async fn from_config(
        username: Option<String>,
        password: Option<String>,
        file: CredentialFile,
        hasher: Arc<dyn PasswordHasher>,
    ) -> Result<Self> {
        let cred = match (username, password) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                let password_hash = hash_blocking(Arc::clone(&hasher), pass.clone()).await?;
                AdminCredential {
                    username: user,
                    display_password: pass,
                    password_hash,
                }
            }
            _ => file.load().map_err(|e| {
                Error::Configuration(format!(
                    "no admin credentials supplied and {} is unusable: {e}",
                    file.path().display()
                ))
            })?,
        };
        Ok(Self::new(cred, file, hasher))
    }

    fn snapshot(&self) -> AdminCredential {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn username(&self) -> String {
        self.snapshot().username.clone()
    }

    /// Check a login attempt; on success return the marker the client replays.
    ///
    /// The password is checked even when the username is wrong, so both
    /// failures cost the same.
    pub async fn login(&self, username: &str, password: &str) -> Result<String> {
        if username.is_empty() || password.is_empty() {
            return Err(Error::AuthenticationFailure);
        }

        let cred = self.snapshot();
        let user_ok = constant_time_eq(username.as_bytes(), cred.username.as_bytes());

        let hasher = Arc::clone(&self.hasher);
        let plaintext = password.to_owned();
        let hash = cred.password_hash.clone();
        let pass_ok = tokio::task::spawn_blocking(move || hasher.verify(&plaintext, &hash))
            .await
            .map_err(|e| Error::Credentials(e.to_string()))?;

        if user_ok && pass_ok {
            Ok(session_marker(&cred))
        } else {
            Err(Error::AuthenticationFailure)
        }
    }

    pub fn verify_marker(&self, marker: &str) -> bool {
        let expected = session_marker(&self.snapshot());
        constant_time_eq(marker.as_bytes(), expected.as_bytes())
    }

    /// Persist a new credential, then swap it in. Returns a fresh marker.
    pub async fn change_credential(&self, username: &str, password: &str) -> Result<String> {
        if username.is_empty() || password.is_empty() {
            return Err(Error::Credentials("username and password are required".into()));
        }

        let password_hash = hash_blocking(Arc::clone(&self.hasher), password.to_owned()).await?;
        let cred = AdminCredential {
            username: username.to_owned(),
            display_password: password.to_owned(),
            password_hash,
        };
        let marker = session_marker(&cred);
        {
            // Held across the save: disk and memory always name the same credential.
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            self.file.save(&cred)?;
            *current = cred;
        }
        info!(username, path = %self.file.path().display(), "audit: admin.change");
        Ok(marker)
    }
}

async fn hash_blocking(hasher: Arc<dyn PasswordHasher>, plaintext: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hasher.hash(&plaintext))
        .await
        .map_err(|e| Error::Credentials(e.to_string()))?
}

fn session_marker(cred: &AdminCredential) -> String {
    let mut mac = HmacSha256::new_from_slice(cred.password_hash.as_bytes())
        .expect("HMAC accepts any key length");
    mac.update(cred.username.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Axum middleware admitting only requests that replay a valid session marker.
pub async fn require_session(
    State(state): State<AppState>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    match jar.get(SESSION_COOKIE) {
        Some(cookie) if state.gate.verify_marker(cookie.value()) => next.run(request).await,
        Some(_) => {
            warn!(path = %request.uri().path(), "stale or forged session marker");
            access_denied()
        }
        None => access_denied(),
    }
}
