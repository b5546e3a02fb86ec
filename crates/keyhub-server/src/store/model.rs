use std::cmp::Ordering;
use std::collections::HashMap;
use std::net::IpAddr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::bytes::ByteCount;

/// Suffix the access-key API appends to every `ss://` URL.
pub const ACCESS_URL_SUFFIX: &str = "/?outline=1";

/// One access key as returned by the primary API.
///
/// ```json
/// {"id":"3","name":"","password":"5PgTilMvdrhK","port":61081,
///  "method":"chacha20-ietf-poly1305","accessUrl":"ss://...@18.182.68.185:61081/?outline=1"}
/// ```
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AccessKey {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub access_url: String,
}

/// Per-key state reported by the status companion API.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct StatusRecord {
    pub id: String,
    #[serde(default, deserialize_with = "lenient_ip")]
    pub ip: Option<IpAddr>,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub online: bool,
    #[serde(default)]
    pub days_left: i64,
    #[serde(default)]
    pub limit: i64,
}

/// The status API encodes "no address" as `""` or `null`.
fn lenient_ip<'de, D>(deserializer: D) -> Result<Option<IpAddr>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.and_then(|s| s.trim().parse().ok()))
}

/// Server-level metadata from `GET {root}/server`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerInfo {
    pub name: String,
    pub server_id: String,
    pub metrics_enabled: bool,
    pub created_timestamp_ms: u64,
    pub port_for_new_access_keys: u16,
}

/// An access key merged with its usage figure and status overlay.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Account {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub port: u16,
    pub method: String,
    pub access_url: String,
    pub transferred: ByteCount,
    pub ip: Option<IpAddr>,
    pub enabled: bool,
    pub online: bool,
    pub days_left: i64,
    pub limit: i64,
    pub expires: String,
    /// Whether a status record was overlaid during the last merge.
    #[serde(skip_serializing)]
    pub has_status: bool,
}

impl Account {
    pub fn from_key(key: AccessKey, transferred: ByteCount) -> Self {
        Self {
            id: key.id,
            name: key.name,
            password: key.password,
            port: key.port,
            method: key.method,
            access_url: key.access_url,
            transferred,
            ip: None,
            enabled: false,
            online: false,
            days_left: 0,
            limit: 0,
            expires: String::new(),
            has_status: false,
        }
    }

    pub fn apply_status(&mut self, status: &StatusRecord) {
        self.ip = status.ip;
        self.enabled = status.enabled;
        self.online = status.online;
        self.days_left = status.days_left;
        self.limit = status.limit;
        self.has_status = true;
    }

    /// Recompute the derived display fields.
    pub fn decorate(&mut self, tag: &str, today: NaiveDate) {
        if !self.has_status {
            self.enabled = true;
        }
        self.access_url = display_access_url(&self.access_url, tag);
        self.expires = expiry_date(today, self.days_left);
    }

    pub fn set_days_left(&mut self, days: i64, today: NaiveDate) {
        self.days_left = days;
        self.expires = expiry_date(today, days);
    }
}

/// Build a fresh account mapping from one round of upstream fetches.
///
/// Status records for ids missing from `keys` are dropped; keys without a
/// status record stay enabled.
pub fn merge_accounts(
    keys: Vec<AccessKey>,
    usage: &HashMap<String, u64>,
    statuses: &[StatusRecord],
    tag: &str,
    today: NaiveDate,
) -> HashMap<String, Account> {
    let mut accounts: HashMap<String, Account> = keys
        .into_iter()
        .map(|key| {
            let used = ByteCount(usage.get(&key.id).copied().unwrap_or(0));
            (key.id.clone(), Account::from_key(key, used))
        })
        .collect();

    for status in statuses {
        if let Some(account) = accounts.get_mut(&status.id) {
            account.apply_status(status);
        }
    }

    for account in accounts.values_mut() {
        account.decorate(tag, today);
    }
    accounts
}

pub fn display_access_url(url: &str, tag: &str) -> String {
    let base = url
        .split_once('#')
        .map_or(url, |(head, _)| head)
        .trim_end_matches(ACCESS_URL_SUFFIX);
    if tag.is_empty() {
        base.to_owned()
    } else {
        format!("{base}#{tag}")
    }
}

pub fn expiry_date(today: NaiveDate, days_left: i64) -> String {
    Duration::try_days(days_left)
        .and_then(|d| today.checked_add_signed(d))
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

/// Shorter ids first, then lexicographic: "1" < "2" < "10".
pub fn listing_order(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

pub fn sort_for_listing(accounts: &mut [Account]) {
    accounts.sort_by(|a, b| listing_order(&a.id, &b.id));
}

/// Read-only projection of one server for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct ServerSummary {
    pub id: u32,
    pub name: String,
    pub server_id: String,
    pub created: String,
    pub metrics_enabled: bool,
    pub port_for_new_access_keys: u16,
    pub total: ByteCount,
    pub account_count: usize,
    pub inconsistent: Vec<String>,
}

pub fn created_date(timestamp_ms: u64) -> String {
    i64::try_from(timestamp_ms)
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(id: &str) -> AccessKey {
        AccessKey {
            id: id.to_owned(),
            name: format!("user-{id}"),
            password: "secret".into(),
            port: 61081,
            method: "chacha20-ietf-poly1305".into(),
            access_url: format!("ss://abc{id}@10.0.0.1:61081/?outline=1"),
        }
    }

    fn status(id: &str, enabled: bool) -> StatusRecord {
        StatusRecord {
            id: id.to_owned(),
            ip: Some("203.0.113.9".parse().unwrap()),
            enabled,
            online: true,
            days_left: 12,
            limit: 40,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn keys_without_status_default_to_enabled() {
        let merged = merge_accounts(vec![key("1"), key("2")], &HashMap::new(), &[], "hub", today());
        assert!(merged.values().all(|a| a.enabled));
        assert!(merged.values().all(|a| a.ip.is_none() && !a.online));
    }

    #[test]
    fn status_overlay_overrides_every_field() {
        let merged = merge_accounts(
            vec![key("1"), key("2")],
            &HashMap::new(),
            &[status("1", false)],
            "hub",
            today(),
        );
        let one = &merged["1"];
        assert!(!one.enabled);
        assert!(one.online);
        assert_eq!(one.ip, Some("203.0.113.9".parse().unwrap()));
        assert_eq!(one.days_left, 12);
        assert_eq!(one.limit, 40);
        assert_eq!(one.expires, "2024-03-13");
        assert!(merged["2"].enabled);
    }

    #[test]
    fn status_for_unknown_id_is_ignored() {
        let merged = merge_accounts(vec![key("1")], &HashMap::new(), &[status("9", true)], "hub", today());
        assert_eq!(merged.len(), 1);
        assert!(!merged.contains_key("9"));
    }

    #[test]
    fn usage_is_merged_by_id() {
        let usage = HashMap::from([("1".to_owned(), 2048u64), ("7".to_owned(), 5)]);
        let merged = merge_accounts(vec![key("1"), key("2")], &usage, &[], "hub", today());
        assert_eq!(merged["1"].transferred, ByteCount(2048));
        assert_eq!(merged["2"].transferred, ByteCount(0));
    }

    #[test]
    fn access_url_suffix_is_replaced_by_tag() {
        assert_eq!(
            display_access_url("ss://abc@1.2.3.4:8388/?outline=1", "hub"),
            "ss://abc@1.2.3.4:8388#hub"
        );
        assert_eq!(display_access_url("ss://abc@1.2.3.4:8388", ""), "ss://abc@1.2.3.4:8388");
        // Decorating twice must not stack anchors.
        let once = display_access_url("ss://abc@h:1/?outline=1", "hub");
        assert_eq!(display_access_url(&once, "hub"), once);
    }

    #[test]
    fn expiry_handles_negative_and_absurd_days() {
        assert_eq!(expiry_date(today(), 0), "2024-03-01");
        assert_eq!(expiry_date(today(), -1), "2024-02-29");
        assert_eq!(expiry_date(today(), i64::MAX), "");
    }

    #[test]
    fn listing_orders_by_length_then_lexicographically() {
        let mut accounts: Vec<Account> = ["10", "2", "1"]
            .iter()
            .map(|id| Account::from_key(key(id), ByteCount(0)))
            .collect();
        sort_for_listing(&mut accounts);
        let ids: Vec<&str> = accounts.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "10"]);
    }

    #[test]
    fn status_record_accepts_empty_ip() {
        let rec: StatusRecord = serde_json::from_str(
            r#"{"id":"4","ip":"","enabled":true,"online":false,"days_left":3,"limit":0}"#,
        )
        .unwrap();
        assert_eq!(rec.ip, None);
        let rec: StatusRecord = serde_json::from_str(r#"{"id":"4","ip":null}"#).unwrap();
        assert_eq!(rec.ip, None);
    }

    #[test]
    fn created_date_formats_millis() {
        assert_eq!(created_date(1_700_000_000_000), "2023-11-14");
        assert_eq!(created_date(u64::MAX), "");
    }

    #[test]
    fn serialized_account_hides_password() {
        let account = Account::from_key(key("1"), ByteCount(0));
        let v = serde_json::to_value(&account).unwrap();
        assert!(v.get("password").is_none());
        assert_eq!(v["transferred"], "0 B");
    }
}
