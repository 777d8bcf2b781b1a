//! HTTP transport for the sync backend.
//!
//! The backend is a thin row store: one `/sync/<table>` endpoint per synced
//! table, every response wrapped in the usual `{success, data, error}`
//! envelope. Rows travel as plain JSON objects so this layer never needs to
//! know their shape; the engine decodes them.
//!
//! Transport failures map to [`AppError::Offline`], which is what tells the
//! effects queue to retry on the short reconnection rung instead of the
//! normal backoff ladder.

use crate::config::Config;
use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration as StdDuration;

const SYNC_HTTP_TIMEOUT_SECS: u64 = 15;

pub trait RemoteStore {
    /// Cheap reachability check, run before any rows move.
    fn probe(&self) -> AppResult<()>;

    /// Push a batch of rows for one table. Returns the ids the backend
    /// accepted; anything missing from the ack list stays dirty locally.
    fn upsert(&self, table: &str, rows: &[Value]) -> AppResult<Vec<String>>;

    /// Rows of `table` changed on the backend since the watermark, oldest
    /// first. `None` means "everything" (first sync).
    fn changed_since(
        &self,
        table: &str,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Value>>;
}

/// API response wrapper
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    device_id: &'a str,
    rows: &'a [Value],
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    #[serde(default)]
    acked: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    #[serde(default)]
    rows: Vec<Value>,
}

pub struct HttpRemote {
    agent: ureq::Agent,
    base_url: String,
    api_key: Option<String>,
    device_id: String,
}

impl HttpRemote {
    pub fn new(base_url: &str, api_key: Option<&str>, device_id: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(StdDuration::from_secs(SYNC_HTTP_TIMEOUT_SECS))
            .build();
        Self {
            agent,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(|k| k.to_string()),
            device_id: device_id.to_string(),
        }
    }

    /// None when no sync backend is configured.
    pub fn from_config(cfg: &Config) -> Option<HttpRemote> {
        let url = cfg.sync_url.as_deref().filter(|u| !u.is_empty())?;
        Some(HttpRemote::new(
            url,
            cfg.sync_api_key.as_deref(),
            &cfg.device_id,
        ))
    }

    fn request(&self, method: &str, url: &str) -> ureq::Request {
        let mut req = self.agent.request(method, url);
        if let Some(key) = &self.api_key {
            req = req.set("x-api-key", key);
        }
        req
    }

    fn unwrap_envelope<T>(resp: ApiResponse<T>) -> AppResult<T> {
        if !resp.success {
            return Err(AppError::Remote(
                resp.error.unwrap_or_else(|| "unspecified error".to_string()),
            ));
        }
        resp.data
            .ok_or_else(|| AppError::Remote("response carried no data".to_string()))
    }

    fn map_http_err(e: ureq::Error) -> AppError {
        match e {
            // 5xx means the backend is up but unable; treat like offline so
            // the queue retries soon instead of laddering out.
            ureq::Error::Status(code, _) if code >= 500 => AppError::Offline,
            ureq::Error::Status(code, _) => AppError::Remote(format!("HTTP {code}")),
            ureq::Error::Transport(_) => AppError::Offline,
        }
    }
}

impl RemoteStore for HttpRemote {
    fn probe(&self) -> AppResult<()> {
        let url = format!("{}/health", self.base_url);
        let resp: ApiResponse<Value> = self
            .request("GET", &url)
            .call()
            .map_err(Self::map_http_err)?
            .into_json()
            .map_err(|e| AppError::Remote(format!("malformed health response: {e}")))?;
        Self::unwrap_envelope(resp).map(|_| ())
    }

    fn upsert(&self, table: &str, rows: &[Value]) -> AppResult<Vec<String>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!("{}/sync/{}", self.base_url, table);
        let body = PushRequest {
            device_id: &self.device_id,
            rows,
        };
        let resp: ApiResponse<PushResponse> = self
            .request("POST", &url)
            .send_json(&body)
            .map_err(Self::map_http_err)?
            .into_json()
            .map_err(|e| AppError::Remote(format!("malformed push response: {e}")))?;
        Ok(Self::unwrap_envelope(resp)?.acked)
    }

    fn changed_since(
        &self,
        table: &str,
        user_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Value>> {
        let mut url = format!(
            "{}/sync/{}?user_id={}&device_id={}",
            self.base_url, table, user_id, self.device_id
        );
        if let Some(ts) = since {
            url.push_str(&format!("&since={}", ts.to_rfc3339()));
        }
        let resp: ApiResponse<PullResponse> = self
            .request("GET", &url)
            .call()
            .map_err(Self::map_http_err)?
            .into_json()
            .map_err(|e| AppError::Remote(format!("malformed pull response: {e}")))?;
        Ok(Self::unwrap_envelope(resp)?.rows)
    }
}

/// In-memory backend used by the sync engine tests.
#[cfg(test)]
pub struct MemoryRemote {
    pub reachable: std::cell::Cell<bool>,
    pub pushed: std::cell::RefCell<std::collections::BTreeMap<String, Vec<Value>>>,
    pub serves: std::cell::RefCell<std::collections::BTreeMap<String, Vec<Value>>>,
}

#[cfg(test)]
impl MemoryRemote {
    pub fn new() -> Self {
        Self {
            reachable: std::cell::Cell::new(true),
            pushed: std::cell::RefCell::new(std::collections::BTreeMap::new()),
            serves: std::cell::RefCell::new(std::collections::BTreeMap::new()),
        }
    }

    pub fn serve(&self, table: &str, row: Value) {
        self.serves
            .borrow_mut()
            .entry(table.to_string())
            .or_default()
            .push(row);
    }

    pub fn pushed_ids(&self, table: &str) -> Vec<String> {
        self.pushed
            .borrow()
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter_map(|r| r.get("id").and_then(|v| v.as_str()).map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
impl RemoteStore for MemoryRemote {
    fn probe(&self) -> AppResult<()> {
        if self.reachable.get() {
            Ok(())
        } else {
            Err(AppError::Offline)
        }
    }

    fn upsert(&self, table: &str, rows: &[Value]) -> AppResult<Vec<String>> {
        let mut pushed = self.pushed.borrow_mut();
        let entry = pushed.entry(table.to_string()).or_default();
        let mut acked = Vec::new();
        for row in rows {
            entry.push(row.clone());
            if let Some(id) = row.get("id").and_then(|v| v.as_str()) {
                acked.push(id.to_string());
            }
        }
        Ok(acked)
    }

    fn changed_since(
        &self,
        table: &str,
        _user_id: &str,
        _since: Option<DateTime<Utc>>,
    ) -> AppResult<Vec<Value>> {
        Ok(self
            .serves
            .borrow()
            .get(table)
            .cloned()
            .unwrap_or_default())
    }
}
