//! Transaction Lifecycle Driver: build → sign → submit → wait for finality.
//!
//! Status is published on a `watch` channel so callers can observe progress
//! without awaiting `execute`. Only the most recent invocation writes that
//! status, and only the most recent finality wait is live; starting a new
//! one, `reset`, or dropping the executor cancels its predecessor.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::ledger::{LedgerClient, LedgerError, Signer, SignerError};
use crate::ptb::Transaction;
use crate::types::{TxDigest, TxResponse};

pub const DEFAULT_FAILURE: &str = "Transaction failed.";
pub const NOT_CONNECTED: &str = "Wallet not connected.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TxPhase {
    Idle,
    Building,
    AwaitingSignature,
    Submitted,
    AwaitingFinality,
    Settled,
    Error,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TxStatus {
    pub phase: TxPhase,
    pub last_digest: Option<TxDigest>,
    pub error: Option<String>,
    pub is_pending: bool,
}

impl Default for TxStatus {
    fn default() -> Self {
        Self {
            phase: TxPhase::Idle,
            last_digest: None,
            error: None,
            is_pending: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TxError {
    #[error("Wallet not connected.")]
    NotConnected,
    #[error("{0}")]
    Build(String),
    #[error("{0}")]
    Signer(String),
    #[error("{0}")]
    Transport(String),
    /// The chain rejected or aborted the transaction.
    #[error("{0}")]
    Contract(String),
    #[error("{0}")]
    Finality(String),
    /// The wait was superseded or torn down before finality.
    #[error("wait cancelled")]
    Cancelled,
}

#[derive(Clone, Debug)]
pub struct ExecuteTxResponse {
    pub digest: TxDigest,
    pub response: TxResponse,
}

/// Contract messages first, then transport, then the generic fallback.
pub fn normalize_message(contract: Option<&str>, transport: Option<&str>) -> String {
    [contract, transport]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|m| !m.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| DEFAULT_FAILURE.to_string())
}

/// `MoveAbort(..., 3) in command 0` → `MoveAbort(..., 3)`
pub fn short_contract_message(raw: &str) -> &str {
    raw.split(" in command").next().unwrap_or(raw).trim()
}

impl From<SignerError> for TxError {
    fn from(e: SignerError) -> Self {
        match e {
            SignerError::Contract(m) => {
                TxError::Contract(normalize_message(Some(short_contract_message(&m)), None))
            }
            SignerError::Transport(m) => TxError::Transport(normalize_message(None, Some(&m))),
            SignerError::Rejected(m) => TxError::Signer(normalize_message(None, Some(&m))),
        }
    }
}

impl From<LedgerError> for TxError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Cancelled => TxError::Cancelled,
            LedgerError::TimedOut(_) => TxError::Finality(e.to_string()),
            LedgerError::Inspect(m) => {
                TxError::Contract(normalize_message(Some(short_contract_message(&m)), None))
            }
            other => TxError::Transport(normalize_message(None, Some(&other.short_message()))),
        }
    }
}

#[derive(Default)]
struct Slot {
    /// Most recent `execute` invocation; only it may publish status.
    latest: u64,
    /// Live finality wait and the invocation that owns it.
    wait: Option<(u64, CancellationToken)>,
}

pub struct TxExecutor {
    ledger: Arc<dyn LedgerClient>,
    signer: Arc<dyn Signer>,
    chain: String,
    status: watch::Sender<TxStatus>,
    slot: Mutex<Slot>,
}

impl TxExecutor {
    pub fn new(ledger: Arc<dyn LedgerClient>, signer: Arc<dyn Signer>, cfg: &Config) -> Self {
        let (status, _) = watch::channel(TxStatus::default());
        Self {
            ledger,
            signer,
            chain: cfg.chain(),
            status,
            slot: Mutex::new(Slot::default()),
        }
    }

    pub fn status(&self) -> TxStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<TxStatus> {
        self.status.subscribe()
    }

    /// Clear the error and digest, and cancel any outstanding wait.
    pub fn reset(&self) {
        if let Some((_, token)) = self.slot.lock().wait.take() {
            token.cancel();
        }
        self.status.send_modify(|s| *s = TxStatus::default());
    }

    fn begin_call(&self) -> u64 {
        let mut slot = self.slot.lock();
        slot.latest += 1;
        slot.latest
    }

    /// Apply `f` to the shared status if `call` is still the latest
    /// invocation. Returns whether it was applied.
    fn publish(&self, call: u64, f: impl FnOnce(&mut TxStatus)) -> bool {
        let slot = self.slot.lock();
        if slot.latest != call {
            return false;
        }
        self.status.send_modify(f);
        true
    }

    fn enter(&self, call: u64, phase: TxPhase) {
        log::debug!("🔁 tx phase → {phase:?}");
        self.publish(call, |s| {
            s.phase = phase;
            s.is_pending = true;
        });
    }

    fn fail(&self, call: u64, err: TxError) -> TxError {
        log::warn!("❌ transaction failed: {err}");
        let msg = err.to_string();
        self.publish(call, |s| {
            s.phase = TxPhase::Error;
            s.error = Some(msg);
            s.is_pending = false;
        });
        err
    }

    /// Supersede the previous wait and hand out a token for the new one.
    fn begin_wait(&self, call: u64) -> CancellationToken {
        let mut slot = self.slot.lock();
        if let Some((_, prev)) = slot.wait.take() {
            prev.cancel();
        }
        let token = CancellationToken::new();
        slot.wait = Some((call, token.clone()));
        token
    }

    fn finish_wait(&self, call: u64) {
        let mut slot = self.slot.lock();
        if matches!(slot.wait, Some((owner, _)) if owner == call) {
            slot.wait = None;
        }
    }

    /// Build a fresh transaction with `build`, sign and submit it, then wait
    /// for finality.
    ///
    /// A later call takes over the shared status; an earlier one still
    /// returns its own outcome but stops publishing.
    pub async fn execute<F>(&self, build: F) -> Result<ExecuteTxResponse, TxError>
    where
        F: FnOnce(&mut Transaction) -> anyhow::Result<()>,
    {
        let call = self.begin_call();
        self.publish(call, |s| {
            s.error = None;
            s.last_digest = None;
        });

        let Some(account) = self.signer.active_account() else {
            return Err(self.fail(call, TxError::NotConnected));
        };

        self.enter(call, TxPhase::Building);
        let mut tx = Transaction::new();
        if let Err(e) = build(&mut tx) {
            let msg = normalize_message(None, Some(&format!("{e:#}")));
            return Err(self.fail(call, TxError::Build(msg)));
        }
        tx.set_sender_if_not_set(account);

        self.enter(call, TxPhase::AwaitingSignature);
        let digest = match self.signer.sign_and_submit(&tx, &self.chain).await {
            Ok(d) => d,
            Err(e) => return Err(self.fail(call, e.into())),
        };
        log::info!("📤 submitted {digest} on {}", self.chain);
        self.enter(call, TxPhase::Submitted);

        let token = self.begin_wait(call);
        self.enter(call, TxPhase::AwaitingFinality);
        let waited = self.ledger.wait_for_transaction(&digest, &token).await;
        self.finish_wait(call);

        let response = match waited {
            Ok(r) => r,
            Err(LedgerError::Cancelled) => {
                let published = self.publish(call, |s| {
                    s.phase = TxPhase::Cancelled;
                    s.is_pending = false;
                });
                if published {
                    log::info!("🛑 wait for {digest} cancelled");
                } else {
                    log::debug!("🧹 wait for {digest} superseded");
                }
                return Err(TxError::Cancelled);
            }
            Err(e) => return Err(self.fail(call, e.into())),
        };

        // Final either way: the digest is known from here on.
        let final_digest = response.digest.clone();
        self.publish(call, |s| s.last_digest = Some(final_digest.clone()));

        if let Some(raw) = response.execution_error() {
            let msg = normalize_message(Some(short_contract_message(&raw)), None);
            return Err(self.fail(call, TxError::Contract(msg)));
        }

        log::info!("✅ {final_digest} final");
        self.publish(call, |s| {
            s.phase = TxPhase::Settled;
            s.is_pending = false;
        });
        self.publish(call, |s| s.phase = TxPhase::Idle);
        Ok(ExecuteTxResponse {
            digest: final_digest,
            response,
        })
    }
}

impl Drop for TxExecutor {
    fn drop(&mut self) {
        if let Some((_, token)) = self.slot.get_mut().wait.take() {
            token.cancel();
        }
    }
}
