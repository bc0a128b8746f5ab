use rand::{thread_rng, Rng};
use serde_json::{json, Value};
use std::sync::OnceLock;
use tokio::time::{sleep, Duration};

static HTTP: OnceLock<reqwest::Client> = OnceLock::new();

fn http_client() -> &'static reqwest::Client {
    HTTP.get_or_init(|| {
        reqwest::Client::builder()
            .pool_max_idle_per_host(8)
            .tcp_nodelay(true)
            .build()
            .unwrap_or_else(|e| {
                log::warn!("⚠️ reqwest builder failed ({e}), using default client");
                reqwest::Client::new()
            })
    })
}

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("http {0}")]
    Http(reqwest::StatusCode),
    #[error("rpc {code} {message}")]
    Rpc { code: i64, message: String },
    #[error("transport: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid rpc payload ({0})")]
    InvalidPayload(&'static str),
}

impl RpcError {
    /// Message reported by the node itself, if any.
    pub fn node_message(&self) -> Option<&str> {
        match self {
            RpcError::Rpc { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Transport settings shared by every call made through one client.
#[derive(Clone, Debug)]
pub struct RpcSettings {
    pub url: String,
    pub timeout_ms: u64,
    pub retries: u32,
}

pub async fn rpc_post(settings: &RpcSettings, body: &Value) -> Result<Value, RpcError> {
    // Small, bounded retry on transient HTTP failures
    let mut attempt = 0u32;
    loop {
        let req = http_client()
            .post(&settings.url)
            .json(body)
            .timeout(Duration::from_millis(settings.timeout_ms));

        let res = match req.send().await {
            Ok(r) => r,
            Err(e) if attempt < settings.retries && (e.is_timeout() || e.is_connect()) => {
                attempt += 1;
                let back_ms = backoff_delay_ms(attempt);
                log::debug!("🔁 transport error, retry={attempt} backoff={back_ms}ms: {e}");
                sleep(Duration::from_millis(back_ms)).await;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        if res.status().is_success() {
            let v: Value = res.json().await?;
            if let Some(err) = v.get("error") {
                let code = err.get("code").and_then(|c| c.as_i64()).unwrap_or_default();
                let msg = err
                    .get("message")
                    .and_then(|m| m.as_str())
                    .unwrap_or("rpc error");
                return Err(RpcError::Rpc {
                    code,
                    message: msg.to_string(),
                });
            }
            if let Some(r) = v.get("result") {
                return Ok(r.clone());
            }
            return Err(RpcError::InvalidPayload("no result"));
        }

        // Retry only on transient statuses
        if matches!(res.status().as_u16(), 429 | 500 | 502 | 503 | 504) && attempt < settings.retries
        {
            attempt += 1;
            let back_ms = backoff_delay_ms(attempt);
            log::debug!(
                "🔁 http {} retry={attempt} backoff={back_ms}ms",
                res.status()
            );
            sleep(Duration::from_millis(back_ms)).await;
            continue;
        }
        return Err(RpcError::Http(res.status()));
    }
}

pub async fn rpc_call(settings: &RpcSettings, method: &str, params: Value) -> Result<Value, RpcError> {
    log::debug!("📡 {method}");
    rpc_post(
        settings,
        &json!({"jsonrpc":"2.0","id":"gascover","method":method,"params":params}),
    )
    .await
}

fn backoff_delay_ms(attempt: u32) -> u64 {
    let base = 150u64.saturating_mul(1u64 << (attempt.clamp(1, 6) - 1)); // 150,300,600,...
    let jitter: u64 = thread_rng().gen_range(0..=100);
    base + jitter
}
