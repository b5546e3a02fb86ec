use std::sync::Arc;

use axum::{
    routing::{delete, get, patch, post, put},
    Router,
};
use tracing::{error, info};

use crate::{
    error::{Error, Result},
    handlers::{
        add_account, dashboard, delete_account, not_found, rename_account, set_allowance,
        set_deadline, toggle_status, ServerContext,
    },
    render::Templates,
    store::AccountView,
    upstream::Endpoints,
};

/// Root of every console route.
pub const BASE_PATH: &str = "/outline/manager";

/// The set of managed servers, one [`AccountView`] each.
pub struct Manager {
    views: Vec<Arc<AccountView>>,
}

impl Manager {
    /// Bootstrap every configured server. Server ids are 1-based positions in
    /// `urls`, so a server that fails to come up leaves a gap.
    pub async fn bootstrap(urls: &[String], client: reqwest::Client, tag: &str) -> Result<Self> {
        if urls.is_empty() {
            return Err(Error::Configuration("no access-key API URL configured".into()));
        }
        let endpoints = urls.iter().map(|url| Endpoints::derive(url)).collect();
        Self::bootstrap_endpoints(endpoints, client, tag).await
    }

    /// Like [`Manager::bootstrap`] with the API roots already resolved.
    pub async fn bootstrap_endpoints(
        endpoints: Vec<Result<Endpoints>>,
        client: reqwest::Client,
        tag: &str,
    ) -> Result<Self> {
        let mut views = Vec::with_capacity(endpoints.len());
        for (idx, endpoints) in endpoints.into_iter().enumerate() {
            let id = idx as u32 + 1;
            let endpoints = match endpoints {
                Ok(e) => e,
                Err(e) => {
                    error!(server_id = id, error = %e, "skipping server with unusable URL");
                    continue;
                }
            };

            let view = AccountView::new(id, &endpoints, client.clone(), tag);
            match view.bootstrap().await {
                Ok(()) => {
                    let summary = view.summary();
                    info!(
                        server_id = id,
                        name = %summary.name,
                        accounts = summary.account_count,
                        "server ready"
                    );
                    views.push(Arc::new(view));
                }
                Err(e) => error!(server_id = id, error = %e, "skipping server that failed to bootstrap"),
            }
        }

        if views.is_empty() {
            return Err(Error::Configuration("no configured server is reachable".into()));
        }
        Ok(Self { views })
    }

    pub fn views(&self) -> &[Arc<AccountView>] {
        &self.views
    }

    pub fn prefix_for(id: u32) -> String {
        format!("{BASE_PATH}/{id}")
    }

    /// Dashboard and account routes of every server, each under its own prefix.
    pub fn routes<S>(&self, templates: &Arc<Templates>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        self.views.iter().fold(Router::new(), |router, view| {
            let prefix = Self::prefix_for(view.id());
            let ctx = ServerContext {
                view: Arc::clone(view),
                prefix: prefix.clone(),
                templates: Arc::clone(templates),
            };
            router.nest(&prefix, server_routes(ctx))
        })
    }
}

fn server_routes<S>(ctx: ServerContext) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/", get(dashboard).fallback(not_found))
        .route("/user", post(add_account).fallback(not_found))
        .route("/id", delete(delete_account).fallback(not_found))
        .route("/name", put(rename_account).fallback(not_found))
        .route("/data", put(set_allowance).fallback(not_found))
        .route("/status", patch(toggle_status).fallback(not_found))
        .route("/deadline", put(set_deadline).fallback(not_found))
        .with_state(ctx)
}
