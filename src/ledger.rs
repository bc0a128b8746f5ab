//! Ledger collaborators: the read/confirm client and the wallet signer.
//!
//! Everything above this module talks to the chain only through these two
//! traits, so tests can swap in in-memory fakes.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::time::{sleep, Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::ptb::{ObjectOwnership, PtbError, Transaction};
use crate::rpc_utils::{rpc_call, RpcError, RpcSettings};
use crate::types::{Address, Coin, EventId, EventPage, LedgerEvent, TxDigest, TxResponse};
use crate::util_text::json_u64;

pub const SUI_COIN_TYPE: &str = "0x2::sui::SUI";

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Rpc(#[from] RpcError),
    #[error("transaction encoding: {0}")]
    Encode(#[from] PtbError),
    /// Simulated execution aborted; carries the node's message.
    #[error("{0}")]
    Inspect(String),
    #[error("object {0} not found")]
    ObjectNotFound(Address),
    #[error("unexpected payload: {0}")]
    Payload(String),
    #[error("wait cancelled")]
    Cancelled,
    #[error("timed out after {0}ms waiting for finality")]
    TimedOut(u64),
}

impl LedgerError {
    /// Short message suitable for showing to a user.
    pub fn short_message(&self) -> String {
        match self {
            LedgerError::Rpc(e) => e
                .node_message()
                .map(str::to_string)
                .unwrap_or_else(|| e.to_string()),
            other => other.to_string(),
        }
    }
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Simulate `tx` as `sender`; returns the per-command `results` array.
    async fn dev_inspect(&self, tx: &Transaction, sender: Address) -> Result<Value, LedgerError>;

    /// One page of events of `event_type`, most recent first.
    async fn query_events(
        &self,
        event_type: &str,
        cursor: Option<EventId>,
        limit: usize,
    ) -> Result<EventPage, LedgerError>;

    /// Block until `digest` is final, the wait is cancelled, or it times out.
    async fn wait_for_transaction(
        &self,
        digest: &TxDigest,
        cancel: &CancellationToken,
    ) -> Result<TxResponse, LedgerError>;

    async fn get_coins(
        &self,
        owner: Address,
        coin_type: &str,
        limit: usize,
    ) -> Result<Vec<Coin>, LedgerError>;

    /// Existence flag per id, same order as `ids`.
    async fn objects_exist(&self, ids: &[Address]) -> Result<Vec<bool>, LedgerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("{0}")]
    Rejected(String),
    /// The chain refused the transaction; message as reported.
    #[error("{0}")]
    Contract(String),
    #[error("{0}")]
    Transport(String),
}

/// Wallet seam. Key management and signing internals live on the other side.
#[async_trait]
pub trait Signer: Send + Sync {
    fn active_account(&self) -> Option<Address>;

    /// Sign `tx` for `chain` (e.g. `sui:testnet`) and submit it.
    async fn sign_and_submit(&self, tx: &Transaction, chain: &str) -> Result<TxDigest, SignerError>;
}

/// `LedgerClient` over Sui JSON-RPC.
#[derive(Clone, Debug)]
pub struct HttpLedgerClient {
    settings: RpcSettings,
    finality_timeout_ms: u64,
    finality_poll_ms: u64,
}

impl HttpLedgerClient {
    pub fn new(cfg: &Config) -> Self {
        Self {
            settings: cfg.rpc_settings(),
            finality_timeout_ms: cfg.finality_timeout_ms,
            finality_poll_ms: cfg.finality_poll_ms,
        }
    }

    async fn multi_get(&self, ids: &[Address], options: Value) -> Result<Vec<Value>, LedgerError> {
        let strs: Vec<String> = ids.iter().map(Address::to_string).collect();
        let res = rpc_call(&self.settings, "sui_multiGetObjects", json!([strs, options])).await?;
        match res {
            Value::Array(items) if items.len() == ids.len() => Ok(items),
            _ => Err(LedgerError::Payload(
                "sui_multiGetObjects returned a mismatched list".into(),
            )),
        }
    }

    async fn resolve_objects(
        &self,
        ids: &[Address],
    ) -> Result<HashMap<Address, ObjectOwnership>, LedgerError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let items = self.multi_get(ids, json!({"showOwner": true})).await?;
        let mut out = HashMap::with_capacity(ids.len());
        for (id, item) in ids.iter().zip(items.iter()) {
            let own = item
                .get("data")
                .and_then(parse_ownership)
                .ok_or(LedgerError::ObjectNotFound(*id))?;
            out.insert(*id, own);
        }
        Ok(out)
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn dev_inspect(&self, tx: &Transaction, sender: Address) -> Result<Value, LedgerError> {
        let resolved = self.resolve_objects(&tx.object_ids()).await?;
        let kind = tx.to_kind_bytes(&resolved)?;
        let res = rpc_call(
            &self.settings,
            "sui_devInspectTransactionBlock",
            json!([sender.to_string(), B64.encode(kind), Value::Null, Value::Null]),
        )
        .await?;
        if let Some(err) = res.get("error").and_then(|e| e.as_str()) {
            return Err(LedgerError::Inspect(err.to_string()));
        }
        Ok(res.get("results").cloned().unwrap_or_else(|| json!([])))
    }

    async fn query_events(
        &self,
        event_type: &str,
        cursor: Option<EventId>,
        limit: usize,
    ) -> Result<EventPage, LedgerError> {
        let res = rpc_call(
            &self.settings,
            "suix_queryEvents",
            json!([{ "MoveEventType": event_type }, cursor, limit, true]),
        )
        .await?;
        parse_event_page(&res)
    }

    async fn wait_for_transaction(
        &self,
        digest: &TxDigest,
        cancel: &CancellationToken,
    ) -> Result<TxResponse, LedgerError> {
        let deadline = Instant::now() + Duration::from_millis(self.finality_timeout_ms);
        let params = json!([digest.as_str(), {"showEffects": true, "showEvents": true}]);
        loop {
            let attempt = tokio::select! {
                _ = cancel.cancelled() => return Err(LedgerError::Cancelled),
                r = rpc_call(&self.settings, "sui_getTransactionBlock", params.clone()) => r,
            };
            match attempt {
                Ok(v) if v.get("effects").is_some() => return Ok(parse_tx_response(digest, &v)),
                Ok(_) => log::debug!("⏳ {digest} known but not yet executed"),
                // not indexed yet, or a transient failure: keep polling
                Err(e) => log::debug!("⏳ {digest} not final yet: {e}"),
            }
            if Instant::now() >= deadline {
                return Err(LedgerError::TimedOut(self.finality_timeout_ms));
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(LedgerError::Cancelled),
                _ = sleep(Duration::from_millis(self.finality_poll_ms)) => {}
            }
        }
    }

    async fn get_coins(
        &self,
        owner: Address,
        coin_type: &str,
        limit: usize,
    ) -> Result<Vec<Coin>, LedgerError> {
        let res = rpc_call(
            &self.settings,
            "suix_getCoins",
            json!([owner.to_string(), coin_type, Value::Null, limit]),
        )
        .await?;
        parse_coins(&res)
    }

    async fn objects_exist(&self, ids: &[Address]) -> Result<Vec<bool>, LedgerError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let items = self.multi_get(ids, json!({})).await?;
        Ok(items
            .iter()
            .map(|i| i.get("data").map(|d| !d.is_null()).unwrap_or(false))
            .collect())
    }
}

/// Ownership of an object from a `sui_multiGetObjects` `data` entry.
pub fn parse_ownership(data: &Value) -> Option<ObjectOwnership> {
    let owner = data.get("owner")?;
    if let Some(shared) = owner.get("Shared") {
        return Some(ObjectOwnership::Shared {
            initial_shared_version: json_u64(shared.get("initial_shared_version")?)?,
        });
    }
    let version = json_u64(data.get("version")?)?;
    let raw = bs58::decode(data.get("digest")?.as_str()?).into_vec().ok()?;
    let digest: [u8; 32] = raw.try_into().ok()?;
    Some(ObjectOwnership::Owned { version, digest })
}

pub fn parse_event_page(v: &Value) -> Result<EventPage, LedgerError> {
    let data: Vec<LedgerEvent> = match v.get("data") {
        Some(d) => serde_json::from_value(d.clone())
            .map_err(|e| LedgerError::Payload(format!("events: {e}")))?,
        None => return Err(LedgerError::Payload("events: missing data".into())),
    };
    let next_cursor = match v.get("nextCursor") {
        None | Some(Value::Null) => None,
        Some(c) => serde_json::from_value(c.clone()).ok(),
    };
    let has_next_page = v
        .get("hasNextPage")
        .and_then(|h| h.as_bool())
        .unwrap_or(false);
    Ok(EventPage {
        data,
        next_cursor,
        has_next_page,
    })
}

pub fn parse_coins(v: &Value) -> Result<Vec<Coin>, LedgerError> {
    let data = v
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| LedgerError::Payload("coins: missing data".into()))?;
    let mut out = Vec::with_capacity(data.len());
    for c in data {
        let id = c
            .get("coinObjectId")
            .and_then(|s| s.as_str())
            .and_then(|s| s.parse::<Address>().ok());
        let balance = c.get("balance").and_then(json_u64);
        match (id, balance) {
            (Some(id), Some(balance)) => out.push(Coin { id, balance }),
            _ => log::warn!("⚠️ skipping malformed coin entry: {c}"),
        }
    }
    Ok(out)
}

pub fn parse_tx_response(digest: &TxDigest, v: &Value) -> TxResponse {
    let events = v
        .get("events")
        .and_then(|e| e.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|e| serde_json::from_value(e.clone()).ok())
                .collect()
        })
        .unwrap_or_default();
    TxResponse {
        digest: v
            .get("digest")
            .and_then(|d| d.as_str())
            .map(TxDigest::from)
            .unwrap_or_else(|| digest.clone()),
        effects: v.get("effects").cloned(),
        events,
    }
}
