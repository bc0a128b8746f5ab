#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use gascover::config::Config;
use gascover::decode::{OfferRecord, PolicyRecord};
use gascover::ledger::{LedgerClient, LedgerError, Signer, SignerError};
use gascover::ptb::Transaction;
use gascover::rpc_utils::RpcError;
use gascover::types::{Address, Coin, EventId, EventPage, LedgerEvent, TxDigest, TxResponse};

/// Holds one fake call until released. `entered` fires when the call
/// reaches the gate; both use `Notify` permits so order does not matter.
#[derive(Clone, Debug, Default)]
pub struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

impl Gate {
    async fn pass(&self) {
        self.entered.notify_one();
        self.release.notified().await;
    }
}

pub fn addr(b: u8) -> Address {
    Address::new([b; 32])
}

/// Reply to a simulated view call, keyed by `function/arg_count`.
#[derive(Clone, Debug)]
pub enum ViewReply {
    Bytes(Vec<u8>),
    Empty,
    Abort(String),
}

#[derive(Clone, Debug)]
pub enum Finality {
    Success,
    Failure(String),
    /// Never finalizes; only cancellation ends the wait.
    Pending,
    TimedOut,
    /// Finalizes successfully once the gate is released.
    Gated(Gate),
}

#[derive(Default)]
pub struct FakeLedger {
    views: Mutex<HashMap<String, ViewReply>>,
    events: Mutex<HashMap<String, Vec<LedgerEvent>>>,
    failing_events: Mutex<HashSet<String>>,
    event_gates: Mutex<HashMap<String, Gate>>,
    coins: Mutex<Vec<Coin>>,
    existing: Mutex<HashSet<Address>>,
    finality: Mutex<HashMap<String, Finality>>,
    pub inspected: Mutex<Vec<String>>,
    pub event_queries: Mutex<Vec<(String, Option<EventId>, usize)>>,
}

impl FakeLedger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn view(&self, key: &str, reply: ViewReply) {
        self.views.lock().insert(key.to_string(), reply);
    }

    /// Events of `name` (e.g. `OfferPosted`), most recent first.
    pub fn events(&self, name: &str, events: Vec<LedgerEvent>) {
        self.events.lock().insert(name.to_string(), events);
    }

    pub fn fail_events(&self, name: &str) {
        self.failing_events.lock().insert(name.to_string());
    }

    /// Hold the next query of `name`. Its reply is taken from the events
    /// present when the query arrives, not when it is released.
    pub fn gate_events(&self, name: &str) -> Gate {
        let gate = Gate::default();
        self.event_gates.lock().insert(name.to_string(), gate.clone());
        gate
    }

    pub fn coins(&self, coins: Vec<Coin>) {
        *self.coins.lock() = coins;
    }

    pub fn exists(&self, id: Address) {
        self.existing.lock().insert(id);
    }

    pub fn finality(&self, digest: &str, f: Finality) {
        self.finality.lock().insert(digest.to_string(), f);
    }

    pub fn inspected(&self) -> Vec<String> {
        self.inspected.lock().clone()
    }
}

fn short_name(event_type: &str) -> &str {
    event_type.rsplit("::").next().unwrap_or(event_type)
}

#[async_trait]
impl LedgerClient for FakeLedger {
    async fn dev_inspect(&self, tx: &Transaction, _sender: Address) -> Result<Value, LedgerError> {
        let call = tx
            .move_calls()
            .next()
            .ok_or_else(|| LedgerError::Payload("no move call".into()))?;
        let key = format!("{}/{}", call.function, call.arguments.len());
        self.inspected.lock().push(key.clone());
        match self.views.lock().get(&key).cloned() {
            Some(ViewReply::Bytes(b)) => Ok(json!([{ "returnValues": [[b, "bytes"]] }])),
            Some(ViewReply::Empty) => Ok(json!([{ "returnValues": [] }])),
            Some(ViewReply::Abort(m)) => Err(LedgerError::Inspect(m)),
            None => Err(LedgerError::Rpc(RpcError::Rpc {
                code: -32000,
                message: format!("FunctionNotFound {key}"),
            })),
        }
    }

    async fn query_events(
        &self,
        event_type: &str,
        cursor: Option<EventId>,
        limit: usize,
    ) -> Result<EventPage, LedgerError> {
        let name = short_name(event_type).to_string();
        self.event_queries
            .lock()
            .push((name.clone(), cursor.clone(), limit));
        if self.failing_events.lock().contains(&name) {
            return Err(LedgerError::Rpc(RpcError::InvalidPayload("events offline")));
        }
        let all = self.events.lock().get(&name).cloned().unwrap_or_default();
        let start = match &cursor {
            Some(c) => all.iter().position(|e| &e.id == c).map(|i| i + 1).unwrap_or(all.len()),
            None => 0,
        };
        let end = (start + limit).min(all.len());
        let data: Vec<LedgerEvent> = all[start..end].to_vec();
        let page = EventPage {
            next_cursor: data.last().map(|e| e.id.clone()),
            has_next_page: end < all.len(),
            data,
        };
        let gate = self.event_gates.lock().remove(&name);
        if let Some(gate) = gate {
            gate.pass().await;
        }
        Ok(page)
    }

    async fn wait_for_transaction(
        &self,
        digest: &TxDigest,
        cancel: &CancellationToken,
    ) -> Result<TxResponse, LedgerError> {
        let f = self
            .finality
            .lock()
            .get(digest.as_str())
            .cloned()
            .unwrap_or(Finality::Success);
        let effects = match f {
            Finality::Success => json!({"status": {"status": "success"}}),
            Finality::Failure(e) => json!({"status": {"status": "failure", "error": e}}),
            Finality::Pending => {
                cancel.cancelled().await;
                return Err(LedgerError::Cancelled);
            }
            Finality::TimedOut => return Err(LedgerError::TimedOut(1000)),
            Finality::Gated(gate) => {
                tokio::select! {
                    _ = cancel.cancelled() => return Err(LedgerError::Cancelled),
                    _ = gate.pass() => json!({"status": {"status": "success"}}),
                }
            }
        };
        Ok(TxResponse {
            digest: digest.clone(),
            effects: Some(effects),
            events: Vec::new(),
        })
    }

    async fn get_coins(
        &self,
        _owner: Address,
        _coin_type: &str,
        limit: usize,
    ) -> Result<Vec<Coin>, LedgerError> {
        Ok(self.coins.lock().iter().take(limit).cloned().collect())
    }

    async fn objects_exist(&self, ids: &[Address]) -> Result<Vec<bool>, LedgerError> {
        let existing = self.existing.lock();
        Ok(ids.iter().map(|id| existing.contains(id)).collect())
    }
}

/// Signer handing out digests `D1`, `D2`, ...
pub struct FakeSigner {
    pub account: Option<Address>,
    pub failure: Mutex<Option<SignerError>>,
    pub submitted: Mutex<Vec<(Transaction, String)>>,
    holds: Mutex<HashMap<usize, Gate>>,
    counter: AtomicUsize,
}

impl FakeSigner {
    pub fn connected(account: Address) -> Arc<Self> {
        Arc::new(Self {
            account: Some(account),
            failure: Mutex::new(None),
            submitted: Mutex::new(Vec::new()),
            holds: Mutex::new(HashMap::new()),
            counter: AtomicUsize::new(0),
        })
    }

    pub fn disconnected() -> Arc<Self> {
        Arc::new(Self {
            account: None,
            failure: Mutex::new(None),
            submitted: Mutex::new(Vec::new()),
            holds: Mutex::new(HashMap::new()),
            counter: AtomicUsize::new(0),
        })
    }

    pub fn fail_next(&self, e: SignerError) {
        *self.failure.lock() = Some(e);
    }

    /// Hold the `n`th signature request (1-based) until released.
    pub fn hold(&self, n: usize) -> Gate {
        let gate = Gate::default();
        self.holds.lock().insert(n, gate.clone());
        gate
    }
}

#[async_trait]
impl Signer for FakeSigner {
    fn active_account(&self) -> Option<Address> {
        self.account
    }

    async fn sign_and_submit(&self, tx: &Transaction, chain: &str) -> Result<TxDigest, SignerError> {
        if let Some(e) = self.failure.lock().take() {
            return Err(e);
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let gate = self.holds.lock().remove(&n);
        if let Some(gate) = gate {
            gate.pass().await;
        }
        self.submitted.lock().push((tx.clone(), chain.to_string()));
        Ok(TxDigest(format!("D{n}")))
    }
}

pub fn event(digest: &str, seq: u32, parsed_json: Value) -> LedgerEvent {
    LedgerEvent {
        id: EventId {
            tx_digest: digest.to_string(),
            event_seq: seq.to_string(),
        },
        type_: "OfferPosted".into(),
        parsed_json,
        timestamp_ms: None,
    }
}

pub fn offer_posted(digest: &str, id: u8, premium: u64) -> LedgerEvent {
    event(
        digest,
        0,
        json!({
            "offer_id": addr(id).to_string(),
            "insurer": addr(0xee).to_string(),
            "premium_mist": premium.to_string(),
            "policy_type": 1
        }),
    )
}

pub fn policy_created(digest: &str, id: u8, expiry_ms: u64) -> LedgerEvent {
    event(
        digest,
        0,
        json!({
            "policy_id": addr(id).to_string(),
            "insured": addr(0xaa).to_string(),
            "insurer": addr(0xee).to_string(),
            "expiry_ms": expiry_ms.to_string(),
            "remaining_txs": "1",
        }),
    )
}

pub fn offer_record(id: u8, premium: u64) -> OfferRecord {
    OfferRecord {
        offer_id: addr(id),
        insurer: addr(0xee),
        policy_type: 0,
        strike_mist_per_unit: 1_000,
        premium_mist: premium,
        coverage_limit_mist: 9_000,
        start_ms: 500,
        expiry_ms: 500,
        max_txs: 1,
        is_active: true,
    }
}

pub fn policy_record(id: u8, expiry_ms: u64) -> PolicyRecord {
    PolicyRecord {
        policy_id: addr(id),
        insured: addr(0xaa),
        insurer: addr(0xee),
        expiry_ms,
        remaining_txs: 2,
        coverage_left_mist: 1_000,
        policy_type: 1,
    }
}

/// Config with small pages so pagination is easy to exercise.
pub fn test_config(page_size: usize) -> Config {
    Config {
        page_size,
        ..Config::default()
    }
}
