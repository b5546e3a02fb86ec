use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{Local, NaiveDate};
use tracing::{debug, error, info, warn};

use super::model::{
    created_date, merge_accounts, sort_for_listing, Account, ServerInfo, ServerSummary,
};
use crate::bytes::ByteCount;
use crate::error::{Error, Result};
use crate::upstream::{AccessKeyClient, Endpoints, StatusClient};

/// Deadline given to every freshly created key.
pub const TRIAL_DAYS: i64 = 30;

#[derive(Debug, Default)]
struct ServerState {
    info: ServerInfo,
    total: ByteCount,
    accounts: HashMap<String, Account>,
    /// Ids whose two backends may disagree after a failed dual write.
    inconsistent: BTreeSet<String>,
}

/// Consistent copy of one server's state taken under a single lock.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub summary: ServerSummary,
    pub accounts: Vec<Account>,
}

/// Merged view of one managed server.
///
/// The lock covers only in-memory reads and writes; every upstream call runs
/// unlocked. Two concurrent refreshes therefore race, and whichever applies
/// last wins. Readers always see one complete refresh, never a mix.
#[derive(Debug)]
pub struct AccountView {
    id: u32,
    access: AccessKeyClient,
    status: StatusClient,
    tag: String,
    state: Mutex<ServerState>,
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

impl AccountView {
    pub fn new(id: u32, endpoints: &Endpoints, client: reqwest::Client, tag: impl Into<String>) -> Self {
        Self {
            id,
            access: AccessKeyClient::new(client.clone(), endpoints.primary.clone()),
            status: StatusClient::new(client, &endpoints.status),
            tag: tag.into(),
            state: Mutex::new(ServerState::default()),
        }
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fetch server metadata and the first account list; both must succeed.
    pub async fn bootstrap(&self) -> Result<()> {
        let info = self.access.fetch_server_info().await?;
        self.lock().info = info;
        self.refresh().await
    }

    /// Re-fetch both APIs and replace the account mapping wholesale.
    ///
    /// Any fetch failure leaves the previous mapping untouched.
    pub async fn refresh(&self) -> Result<()> {
        let (usage, statuses) =
            tokio::try_join!(self.access.fetch_usage(), self.status.fetch_status_list())?;
        let keys = self.access.fetch_all_accounts().await?;

        let total: ByteCount = usage.values().map(|&n| ByteCount(n)).sum();
        let merged = merge_accounts(keys, &usage, &statuses, &self.tag, today());

        let mut state = self.lock();
        state.accounts = merged;
        state.total = total;
        debug!(server_id = self.id, accounts = state.accounts.len(), "refreshed");
        Ok(())
    }

    pub fn summary(&self) -> ServerSummary {
        Self::summarize(self.id, &self.lock())
    }

    fn summarize(id: u32, state: &ServerState) -> ServerSummary {
        ServerSummary {
            id,
            name: state.info.name.clone(),
            server_id: state.info.server_id.clone(),
            created: created_date(state.info.created_timestamp_ms),
            metrics_enabled: state.info.metrics_enabled,
            port_for_new_access_keys: state.info.port_for_new_access_keys,
            total: state.total,
            account_count: state.accounts.len(),
            inconsistent: state.inconsistent.iter().cloned().collect(),
        }
    }

    /// Summary plus every account in listing order.
    pub fn snapshot(&self) -> Snapshot {
        let state = self.lock();
        let summary = Self::summarize(self.id, &state);
        let mut accounts: Vec<Account> = state.accounts.values().cloned().collect();
        drop(state);

        sort_for_listing(&mut accounts);
        Snapshot { summary, accounts }
    }

    pub fn account(&self, id: &str) -> Option<Account> {
        self.lock().accounts.get(id).cloned()
    }

    pub fn is_inconsistent(&self, id: &str) -> bool {
        self.lock().inconsistent.contains(id)
    }

    // ── Mutations ────────────────────────────────────────────────────────────

    /// Create a key, then give it the trial deadline on the status API.
    pub async fn add_account(&self) -> Result<Account> {
        let key = self.access.create_account().await?;
        self.status.set_deadline(&key.id, TRIAL_DAYS).await?;

        let mut account = Account::from_key(key, ByteCount(0));
        account.days_left = TRIAL_DAYS;
        account.decorate(&self.tag, today());

        self.lock()
            .accounts
            .insert(account.id.clone(), account.clone());
        info!(server_id = self.id, account_id = %account.id, "audit: account.create");
        Ok(account)
    }

    /// Delete on the access-key API only; the status record is left behind.
    pub async fn delete_account(&self, id: &str) -> Result<()> {
        self.access.delete_account(id).await?;

        let mut state = self.lock();
        state.accounts.remove(id);
        state.inconsistent.remove(id);
        info!(server_id = self.id, account_id = %id, "audit: account.delete");
        Ok(())
    }

    /// The new name shows up with the next refresh.
    pub async fn rename_account(&self, id: &str, name: &str) -> Result<()> {
        self.access.rename_account(id, name).await?;
        info!(server_id = self.id, account_id = %id, "audit: account.rename");
        Ok(())
    }

    /// Set the data allowance on both backends, status API first.
    ///
    /// If the access-key write fails the previous status-API limit is
    /// restored. When that is impossible the id is marked inconsistent until
    /// a later allowance write succeeds.
    pub async fn set_allowance(&self, id: &str, gigabytes: u64) -> Result<()> {
        let limit = i64::try_from(gigabytes).map_err(|_| Error::InvalidLimit)?;
        let previous = self
            .lock()
            .accounts
            .get(id)
            .filter(|a| a.has_status)
            .map(|a| a.limit);

        self.status.set_limit(id, limit).await?;

        if let Err(e) = self.access.set_data_limit(id, gigabytes).await {
            warn!(server_id = self.id, account_id = %id, error = %e, "data limit write failed after status write");
            self.compensate_limit(id, previous).await;
            return Err(e);
        }

        let mut state = self.lock();
        state.inconsistent.remove(id);
        if let Some(account) = state.accounts.get_mut(id) {
            account.limit = limit;
        }
        info!(server_id = self.id, account_id = %id, gigabytes, "audit: account.allowance");
        Ok(())
    }

    async fn compensate_limit(&self, id: &str, previous: Option<i64>) {
        let undo = match previous {
            Some(limit) => self.status.set_limit(id, limit).await,
            None => Err(Error::Configuration(format!(
                "no previous status limit known for {id}"
            ))),
        };

        match undo {
            Ok(()) => {
                info!(server_id = self.id, account_id = %id, "status limit restored");
            }
            Err(e) => {
                error!(server_id = self.id, account_id = %id, error = %e, "status limit not restored; backends disagree");
                self.lock().inconsistent.insert(id.to_owned());
            }
        }
    }

    /// Only the status API knows the resulting state; the next refresh reads it.
    pub async fn toggle_status(&self, id: &str) -> Result<()> {
        self.status.toggle_enabled(id).await?;
        info!(server_id = self.id, account_id = %id, "audit: account.toggle");
        Ok(())
    }

    pub async fn set_deadline(&self, id: &str, days: i64) -> Result<()> {
        self.status.set_deadline(id, days).await?;

        if let Some(account) = self.lock().accounts.get_mut(id) {
            account.set_days_left(days, today());
        }
        info!(server_id = self.id, account_id = %id, days, "audit: account.deadline");
        Ok(())
    }
}
