use std::collections::HashMap;

use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::expect_status;
use crate::bytes::ByteCount;
use crate::error::{Error, Result};
use crate::store::model::{AccessKey, ServerInfo};

/// Client for the primary access-key API.
#[derive(Debug, Clone)]
pub struct AccessKeyClient {
    client: Client,
    root: String,
}

#[derive(Deserialize)]
struct AccessKeyList {
    #[serde(rename = "accessKeys", default)]
    access_keys: Vec<AccessKey>,
}

#[derive(Deserialize)]
struct TransferMetrics {
    #[serde(rename = "bytesTransferredByUserId", default)]
    by_user_id: HashMap<String, u64>,
}

impl AccessKeyClient {
    pub fn new(client: Client, root: impl Into<String>) -> Self {
        Self {
            client,
            root: root.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.root, path)
    }

    /// `{root}/access-keys/{id}/{tail..}` with `id` encoded as one path segment.
    fn key_url(&self, id: &str, tail: &[&str]) -> Result<Url> {
        // The url crate silently drops dot segments, which would retarget the call.
        if id.is_empty() || id == "." || id == ".." {
            return Err(Error::AccountNotFound);
        }
        let mut url = Url::parse(&self.root)
            .map_err(|e| Error::Configuration(format!("invalid server url {:?}: {e}", self.root)))?;
        url.path_segments_mut()
            .map_err(|_| Error::Configuration(format!("server url {:?} cannot carry a path", self.root)))?
            .pop_if_empty()
            .push("access-keys")
            .push(id)
            .extend(tail);
        Ok(url)
    }

    /// `GET /server`
    pub async fn fetch_server_info(&self) -> Result<ServerInfo> {
        let resp = self.client.get(self.url("/server")).send().await?;
        expect_status(&resp, StatusCode::OK)?;
        Ok(resp.json().await?)
    }

    /// `POST /access-keys`; the remote assigns id and secret.
    pub async fn create_account(&self) -> Result<AccessKey> {
        let resp = self.client.post(self.url("/access-keys")).send().await?;
        expect_status(&resp, StatusCode::CREATED)?;
        let key: AccessKey = resp.json().await?;
        debug!(account_id = %key.id, "access key created upstream");
        Ok(key)
    }

    /// `DELETE /access-keys/{id}`
    pub async fn delete_account(&self, id: &str) -> Result<()> {
        let resp = self
            .client
            .delete(self.key_url(id, &[])?)
            .send()
            .await?;
        expect_status(&resp, StatusCode::NO_CONTENT)
    }

    /// `PUT /access-keys/{id}/data-limit` with `{"limit":{"bytes":N}}`.
    pub async fn set_data_limit(&self, id: &str, gigabytes: u64) -> Result<()> {
        let bytes = ByteCount::from_gigabytes(gigabytes).as_u64();
        let resp = self
            .client
            .put(self.key_url(id, &["data-limit"])?)
            .json(&json!({ "limit": { "bytes": bytes } }))
            .send()
            .await?;

        match resp.status() {
            StatusCode::NO_CONTENT => Ok(()),
            StatusCode::BAD_REQUEST => Err(Error::InvalidLimit),
            StatusCode::NOT_FOUND => Err(Error::AccountNotFound),
            other => Err(Error::upstream_status(other)),
        }
    }

    /// `PUT /access-keys/{id}/name` with `{"name":...}`.
    pub async fn rename_account(&self, id: &str, name: &str) -> Result<()> {
        let resp = self
            .client
            .put(self.key_url(id, &["name"])?)
            .json(&json!({ "name": name }))
            .send()
            .await?;
        expect_status(&resp, StatusCode::NO_CONTENT)
    }

    /// `GET /metrics/transfer`: cumulative bytes per access-key id.
    pub async fn fetch_usage(&self) -> Result<HashMap<String, u64>> {
        let resp = self.client.get(self.url("/metrics/transfer")).send().await?;
        expect_status(&resp, StatusCode::OK)?;
        let metrics: TransferMetrics = resp.json().await?;
        Ok(metrics.by_user_id)
    }

    /// `GET /access-keys`, in whatever order the server returns them.
    pub async fn fetch_all_accounts(&self) -> Result<Vec<AccessKey>> {
        let resp = self.client.get(self.url("/access-keys")).send().await?;
        expect_status(&resp, StatusCode::OK)?;
        let list: AccessKeyList = resp.json().await?;
        Ok(list.access_keys)
    }
}
