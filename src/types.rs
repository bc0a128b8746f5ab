use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// 32-byte Sui address or object id.
///
/// Human-readable formats (JSON) see a `0x`-prefixed hex string; binary formats
/// (BCS) see the raw 32 bytes with no length prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; 32]);

impl Address {
    pub const LENGTH: usize = 32;

    /// Sentinel for identity fields missing from an event payload.
    pub const ZERO: Address = Address([0u8; 32]);

    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Short form for logs: `0x1234…abcd`
    pub fn short(&self) -> String {
        let full = self.to_string();
        format!("{}…{}", &full[..6], &full[full.len() - 4..])
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("address is empty")]
    Empty,
    #[error("address has {0} hex digits, at most 64 allowed")]
    TooLong(usize),
    #[error("address is not valid hex: {0}")]
    Hex(String),
}

impl FromStr for Address {
    type Err = AddressParseError;

    /// Accepts `0x`-prefixed or bare hex, short forms are left-padded (`0x6`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = s.trim();
        let t = t
            .strip_prefix("0x")
            .or_else(|| t.strip_prefix("0X"))
            .unwrap_or(t);
        if t.is_empty() {
            return Err(AddressParseError::Empty);
        }
        if t.len() > 64 {
            return Err(AddressParseError::TooLong(t.len()));
        }
        let padded = format!("{t:0>64}");
        let mut out = [0u8; 32];
        hex::decode_to_slice(&padded, &mut out)
            .map_err(|e| AddressParseError::Hex(e.to_string()))?;
        Ok(Self(out))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        } else {
            <[u8; 32]>::deserialize(deserializer).map(Address)
        }
    }
}

/// Transaction digest as reported by the ledger (base58 string).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxDigest(pub String);

impl TxDigest {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TxDigest {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Policy kind as encoded on-chain (`u8`): 0 = single transaction, 1 = recurring window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyKind {
    Single,
    Recurring,
}

impl PolicyKind {
    pub fn as_u8(self) -> u8 {
        match self {
            PolicyKind::Single => 0,
            PolicyKind::Recurring => 1,
        }
    }

    /// Only `1` means recurring; every other byte reads as single.
    pub fn from_u8(v: u8) -> Self {
        if v == 1 {
            PolicyKind::Recurring
        } else {
            PolicyKind::Single
        }
    }
}

impl FromStr for PolicyKind {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_lowercase().as_str() {
            "single" | "one-time" | "0" => Ok(PolicyKind::Single),
            "recurring" | "window" | "1" => Ok(PolicyKind::Recurring),
            _ => Err(anyhow::anyhow!(
                "Invalid policy kind '{s}'. Valid options: single, recurring"
            )),
        }
    }
}

/// How much of a record was actually observed on-chain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Fidelity {
    /// Decoded from a view call.
    Exact,
    /// Mapped from an event payload; absent fields are zero/sentinel defaults.
    Degraded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: Address,
    pub insurer: Address,
    pub kind: PolicyKind,
    #[serde(with = "crate::util_text::u64_string")]
    pub strike_mist: u64,
    #[serde(with = "crate::util_text::u64_string")]
    pub premium_mist: u64,
    #[serde(with = "crate::util_text::u64_string")]
    pub coverage_limit_mist: u64,
    pub start_ms: u64,
    pub expiry_ms: u64,
    pub max_txs: u64,
    pub is_active: bool,
    pub fidelity: Fidelity,
    /// Creation event the record was mapped from, when it came from the event log.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_event: Option<EventId>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub id: Address,
    pub insured: Address,
    pub insurer: Address,
    pub expiry_ms: u64,
    pub remaining_txs: u64,
    #[serde(with = "crate::util_text::u64_string")]
    pub coverage_left_mist: u64,
    pub kind: Option<PolicyKind>,
    pub fidelity: Fidelity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_event: Option<EventId>,
}

/// Identity used to deduplicate records across reads.
pub trait Keyed {
    fn key(&self) -> String;
}

/// Record id, or `txDigest:eventSeq` of its creation event when the payload had none.
fn record_key(id: &Address, source: Option<&EventId>) -> String {
    match source {
        Some(ev) if id.is_zero() => format!("{}:{}", ev.tx_digest, ev.event_seq),
        _ => id.to_string(),
    }
}

impl Keyed for Offer {
    fn key(&self) -> String {
        record_key(&self.id, self.source_event.as_ref())
    }
}

impl Keyed for Policy {
    fn key(&self) -> String {
        record_key(&self.id, self.source_event.as_ref())
    }
}

impl Policy {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.expiry_ms
    }
}

/// Gas observation reported by the oracle feed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Observation {
    pub policy_id: Address,
    pub tx_digest: String,
    #[serde(with = "crate::util_text::u64_string")]
    pub gas_used_mist: u64,
    pub timestamp_ms: Option<u64>,
}

/// A `Coin<SUI>` held by an account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub id: Address,
    #[serde(with = "crate::util_text::u64_string")]
    pub balance: u64,
}

/// Event cursor as returned by `suix_queryEvents`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventId {
    pub tx_digest: String,
    pub event_seq: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEvent {
    pub id: EventId,
    #[serde(rename = "type", default)]
    pub type_: String,
    #[serde(default)]
    pub parsed_json: serde_json::Value,
    #[serde(default)]
    pub timestamp_ms: Option<String>,
}

/// One page of events, most recent first.
#[derive(Clone, Debug, Default)]
pub struct EventPage {
    pub data: Vec<LedgerEvent>,
    pub next_cursor: Option<EventId>,
    pub has_next_page: bool,
}

/// Typed page produced by the reader.
#[derive(Clone, Debug)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<EventId>,
    pub has_more: bool,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
            has_more: false,
        }
    }
}

/// Finalized transaction as returned by `sui_getTransactionBlock`.
#[derive(Clone, Debug)]
pub struct TxResponse {
    pub digest: TxDigest,
    pub effects: Option<serde_json::Value>,
    pub events: Vec<LedgerEvent>,
}

impl TxResponse {
    /// Error string from failed effects, `None` when execution succeeded.
    pub fn execution_error(&self) -> Option<String> {
        let status = self.effects.as_ref()?.get("status")?;
        if status.get("status").and_then(|s| s.as_str()) == Some("failure") {
            Some(
                status
                    .get("error")
                    .and_then(|e| e.as_str())
                    .unwrap_or("execution failed")
                    .to_string(),
            )
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn short_addresses_are_left_padded() {
        let clock: Address = "0x6".parse().unwrap();
        assert_eq!(clock.as_bytes()[31], 6);
        assert!(clock.as_bytes()[..31].iter().all(|b| *b == 0));
        assert_eq!(
            clock.to_string(),
            "0x0000000000000000000000000000000000000000000000000000000000000006"
        );
    }

    #[test]
    fn rejects_bad_addresses() {
        assert_eq!("0x".parse::<Address>(), Err(AddressParseError::Empty));
        assert!(matches!(
            "0xzz".parse::<Address>(),
            Err(AddressParseError::Hex(_))
        ));
        let long = format!("0x{}", "a".repeat(65));
        assert_eq!(long.parse::<Address>(), Err(AddressParseError::TooLong(65)));
    }

    #[test]
    fn address_is_hex_in_json_and_raw_in_bcs() {
        let a: Address = "0xab".parse().unwrap();
        let js = serde_json::to_value(a).unwrap();
        assert_eq!(js, json!(a.to_string()));
        let raw = bcs::to_bytes(&a).unwrap();
        assert_eq!(raw.len(), 32);
        assert_eq!(raw[31], 0xab);
        let back: Address = bcs::from_bytes(&raw).unwrap();
        assert_eq!(back, a);
    }

    #[test]
    fn policy_kind_byte_mapping() {
        assert_eq!(PolicyKind::from_u8(1), PolicyKind::Recurring);
        assert_eq!(PolicyKind::from_u8(0), PolicyKind::Single);
        assert_eq!(PolicyKind::from_u8(7), PolicyKind::Single);
        assert_eq!("window".parse::<PolicyKind>().unwrap(), PolicyKind::Recurring);
        assert!("weekly".parse::<PolicyKind>().is_err());
    }

    #[test]
    fn records_without_id_are_keyed_by_their_event() {
        let ev = EventId {
            tx_digest: "Dg".into(),
            event_seq: "3".into(),
        };
        let mut p = Policy {
            id: Address::ZERO,
            insured: Address::ZERO,
            insurer: Address::ZERO,
            expiry_ms: 0,
            remaining_txs: 0,
            coverage_left_mist: 0,
            kind: None,
            fidelity: Fidelity::Degraded,
            source_event: Some(ev),
        };
        assert_eq!(p.key(), "Dg:3");
        p.id = "0x9".parse().unwrap();
        assert_eq!(p.key(), p.id.to_string());
    }

    #[test]
    fn execution_error_reads_failed_status() {
        let ok = TxResponse {
            digest: "d1".into(),
            effects: Some(json!({"status": {"status": "success"}})),
            events: vec![],
        };
        assert_eq!(ok.execution_error(), None);

        let failed = TxResponse {
            digest: "d2".into(),
            effects: Some(json!({"status": {"status": "failure", "error": "MoveAbort(_, 3)"}})),
            events: vec![],
        };
        assert_eq!(failed.execution_error().as_deref(), Some("MoveAbort(_, 3)"));
    }
}
