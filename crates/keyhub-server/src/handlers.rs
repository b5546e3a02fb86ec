use std::sync::Arc;

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::{
    auth::{access_denied, SESSION_COOKIE},
    manager::BASE_PATH,
    render::Templates,
    store::AccountView,
    AppState,
};

/// State for the routes of one managed server.
#[derive(Clone)]
pub struct ServerContext {
    pub view: Arc<AccountView>,
    pub prefix: String,
    pub templates: Arc<Templates>,
}

/// Every account route reads its arguments from the query string.
#[derive(Debug, Default, Deserialize)]
pub struct AccountParams {
    pub id: Option<String>,
    pub name: Option<String>,
    pub allowance: Option<String>,
    pub days: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CredentialParams {
    pub user: Option<String>,
    pub pass: Option<String>,
}

/// Present and non-empty, or `None`.
fn required(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn operation_failed(ctx: &ServerContext, op: &str, e: crate::Error) -> Response {
    error!(server_id = ctx.view.id(), op, error = %e, "operation failed");
    access_denied()
}

pub async fn not_found() -> Response {
    access_denied()
}

// ── Dashboard ─────────────────────────────────────────────────────────────────

pub async fn dashboard(State(ctx): State<ServerContext>) -> Response {
    if let Err(e) = ctx.view.refresh().await {
        warn!(server_id = ctx.view.id(), error = %e, "refresh failed; showing last known state");
    }

    let snapshot = ctx.view.snapshot();
    match ctx.templates.dashboard(BASE_PATH, &ctx.prefix, &snapshot) {
        Ok(html) => Html(html).into_response(),
        Err(e) => operation_failed(&ctx, "render", e),
    }
}

pub async fn server_index(State(state): State<AppState>) -> Response {
    let summaries: Vec<_> = state.manager.views().iter().map(|v| v.summary()).collect();
    match state.templates.index(BASE_PATH, &summaries) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!(error = %e, "render index failed");
            access_denied()
        }
    }
}

// ── Account mutations ────────────────────────────────────────────────────────

pub async fn add_account(State(ctx): State<ServerContext>) -> Response {
    match ctx.view.add_account().await {
        Ok(_) => StatusCode::OK.into_response(),
        Err(e) => operation_failed(&ctx, "add", e),
    }
}

pub async fn delete_account(
    State(ctx): State<ServerContext>,
    params: Result<Query<AccountParams>, QueryRejection>,
) -> Response {
    let Ok(Query(params)) = params else {
        return access_denied();
    };
    let Some(id) = required(&params.id) else {
        return access_denied();
    };

    match ctx.view.delete_account(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => operation_failed(&ctx, "delete", e),
    }
}

pub async fn rename_account(
    State(ctx): State<ServerContext>,
    params: Result<Query<AccountParams>, QueryRejection>,
) -> Response {
    let Ok(Query(params)) = params else {
        return access_denied();
    };
    let Some(id) = required(&params.id) else {
        return access_denied();
    };
    // An empty name clears it.
    let name = params.name.as_deref().unwrap_or_default();

    match ctx.view.rename_account(id, name).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => operation_failed(&ctx, "rename", e),
    }
}

pub async fn set_allowance(
    State(ctx): State<ServerContext>,
    params: Result<Query<AccountParams>, QueryRejection>,
) -> Response {
    let Ok(Query(params)) = params else {
        return access_denied();
    };
    let (Some(id), Some(allowance)) = (required(&params.id), required(&params.allowance)) else {
        return access_denied();
    };
    let Ok(gigabytes) = allowance.trim().parse::<u64>() else {
        return access_denied();
    };

    match ctx.view.set_allowance(id, gigabytes).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => operation_failed(&ctx, "allowance", e),
    }
}

pub async fn toggle_status(
    State(ctx): State<ServerContext>,
    params: Result<Query<AccountParams>, QueryRejection>,
) -> Response {
    let Ok(Query(params)) = params else {
        return access_denied();
    };
    let Some(id) = required(&params.id) else {
        return access_denied();
    };

    match ctx.view.toggle_status(id).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => operation_failed(&ctx, "status", e),
    }
}

pub async fn set_deadline(
    State(ctx): State<ServerContext>,
    params: Result<Query<AccountParams>, QueryRejection>,
) -> Response {
    let Ok(Query(params)) = params else {
        return access_denied();
    };
    let (Some(id), Some(days)) = (required(&params.id), required(&params.days)) else {
        return access_denied();
    };
    let Ok(days) = days.trim().parse::<i64>() else {
        return access_denied();
    };

    match ctx.view.set_deadline(id, days).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(e) => operation_failed(&ctx, "deadline", e),
    }
}

// ── Login / admin ─────────────────────────────────────────────────────────────

fn session_cookie(marker: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, marker))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

pub async fn login_page(State(state): State<AppState>) -> Response {
    match state.templates.login(BASE_PATH) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!(error = %e, "render login failed");
            access_denied()
        }
    }
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    params: Result<Query<CredentialParams>, QueryRejection>,
) -> Response {
    let Ok(Query(params)) = params else {
        return access_denied();
    };
    let (Some(user), Some(pass)) = (required(&params.user), required(&params.pass)) else {
        return access_denied();
    };

    match state.gate.login(user, pass).await {
        Ok(marker) => {
            info!(username = user, "audit: admin.login");
            (jar.add(session_cookie(marker)), StatusCode::OK).into_response()
        }
        Err(e) => {
            warn!(username = user, error = %e, "login rejected");
            access_denied()
        }
    }
}

pub async fn logout(jar: CookieJar) -> Response {
    (
        jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
        StatusCode::NO_CONTENT,
    )
        .into_response()
}

/// Replace the admin credential. Reached only through the session gate.
pub async fn change_admin(
    State(state): State<AppState>,
    jar: CookieJar,
    params: Result<Query<CredentialParams>, QueryRejection>,
) -> Response {
    let Ok(Query(params)) = params else {
        return access_denied();
    };
    let (Some(user), Some(pass)) = (required(&params.user), required(&params.pass)) else {
        info!("credential change without user or password ignored");
        return access_denied();
    };

    match state.gate.change_credential(user, pass).await {
        Ok(marker) => (jar.add(session_cookie(marker)), StatusCode::OK).into_response(),
        Err(e) => {
            error!(error = %e, "credential change failed");
            access_denied()
        }
    }
}
