use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::expect_status;
use crate::error::Result;
use crate::store::model::StatusRecord;

const MANAGER_PATH: &str = "/go/manager";

/// Client for the status companion API (`{status root}/go/manager`).
#[derive(Debug, Clone)]
pub struct StatusClient {
    client: Client,
    url: String,
}

#[derive(Deserialize)]
struct StatusList {
    #[serde(default)]
    status: Vec<StatusRecord>,
}

impl StatusClient {
    pub fn new(client: Client, root: &str) -> Self {
        Self {
            client,
            url: format!("{root}{MANAGER_PATH}"),
        }
    }

    pub async fn fetch_status_list(&self) -> Result<Vec<StatusRecord>> {
        let resp = self.client.get(&self.url).send().await?;
        expect_status(&resp, StatusCode::OK)?;
        let list: StatusList = resp.json().await?;
        Ok(list.status)
    }

    /// Flip the enabled flag server-side.
    pub async fn toggle_enabled(&self, id: &str) -> Result<()> {
        let resp = self
            .client
            .patch(&self.url)
            .query(&[("id", id)])
            .send()
            .await?;
        expect_status(&resp, StatusCode::OK)
    }

    pub async fn set_deadline(&self, id: &str, days: i64) -> Result<()> {
        let days = days.to_string();
        let resp = self
            .client
            .put(&self.url)
            .query(&[("id", id), ("deadline", days.as_str())])
            .send()
            .await?;
        expect_status(&resp, StatusCode::OK)
    }

    pub async fn set_limit(&self, id: &str, gigabytes: i64) -> Result<()> {
        let limit = gigabytes.to_string();
        let resp = self
            .client
            .post(&self.url)
            .query(&[("id", id), ("limit", limit.as_str())])
            .send()
            .await?;
        expect_status(&resp, StatusCode::OK)
    }
}
