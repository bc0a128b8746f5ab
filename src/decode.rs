//! Binary decoding of view-call return values.
//!
//! Every schema is a fixed sequence of primitive fields laid out in BCS order.
//! Decoding is strict: a short buffer, trailing bytes, or an out-of-range bool
//! is an error and no partially populated record is ever returned.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Address, Fidelity, Offer, Policy, PolicyKind};

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("view returned no bytes")]
    Empty,
    #[error("buffer too short for {schema}: need {need} bytes, got {got}")]
    Short {
        schema: &'static str,
        need: usize,
        got: usize,
    },
    #[error("bcs: {0}")]
    Bcs(#[from] bcs::Error),
}

/// Fixed-width schema with a known minimum encoded size.
pub trait Schema: DeserializeOwned {
    const NAME: &'static str;
    const MIN_WIDTH: usize;
}

/// `gas_insurance_marketplace::OfferView`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferRecord {
    pub offer_id: Address,
    pub insurer: Address,
    pub policy_type: u8,
    pub strike_mist_per_unit: u64,
    pub premium_mist: u64,
    pub coverage_limit_mist: u64,
    pub start_ms: u64,
    pub expiry_ms: u64,
    pub max_txs: u64,
    pub is_active: bool,
}

impl Schema for OfferRecord {
    const NAME: &'static str = "OfferView";
    const MIN_WIDTH: usize = 32 + 32 + 1 + 8 * 6 + 1;
}

/// `gas_insurance_marketplace::PolicyView`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub policy_id: Address,
    pub insured: Address,
    pub insurer: Address,
    pub expiry_ms: u64,
    pub remaining_txs: u64,
    pub coverage_left_mist: u64,
    pub policy_type: u8,
}

impl Schema for PolicyRecord {
    const NAME: &'static str = "PolicyView";
    const MIN_WIDTH: usize = 32 * 3 + 8 * 3 + 1;
}

impl Schema for u64 {
    const NAME: &'static str = "u64";
    const MIN_WIDTH: usize = 8;
}

impl From<OfferRecord> for Offer {
    fn from(o: OfferRecord) -> Self {
        Offer {
            id: o.offer_id,
            insurer: o.insurer,
            kind: PolicyKind::from_u8(o.policy_type),
            strike_mist: o.strike_mist_per_unit,
            premium_mist: o.premium_mist,
            coverage_limit_mist: o.coverage_limit_mist,
            start_ms: o.start_ms,
            expiry_ms: o.expiry_ms,
            max_txs: o.max_txs,
            is_active: o.is_active,
            fidelity: Fidelity::Exact,
            source_event: None,
        }
    }
}

impl From<PolicyRecord> for Policy {
    fn from(p: PolicyRecord) -> Self {
        Policy {
            id: p.policy_id,
            insured: p.insured,
            insurer: p.insurer,
            expiry_ms: p.expiry_ms,
            remaining_txs: p.remaining_txs,
            coverage_left_mist: p.coverage_left_mist,
            kind: Some(PolicyKind::from_u8(p.policy_type)),
            fidelity: Fidelity::Exact,
            source_event: None,
        }
    }
}

/// Decode exactly one record; the whole buffer must be consumed.
pub fn decode_one<T: Schema>(bytes: &[u8]) -> Result<T, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    if bytes.len() < T::MIN_WIDTH {
        return Err(DecodeError::Short {
            schema: T::NAME,
            need: T::MIN_WIDTH,
            got: bytes.len(),
        });
    }
    Ok(bcs::from_bytes(bytes)?)
}

/// Decode a `vector<T>` return value.
pub fn decode_many<T: Schema>(bytes: &[u8]) -> Result<Vec<T>, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::Empty);
    }
    Ok(bcs::from_bytes(bytes)?)
}

pub fn decode_offers(bytes: &[u8]) -> Result<Vec<Offer>, DecodeError> {
    Ok(decode_many::<OfferRecord>(bytes)?
        .into_iter()
        .map(Offer::from)
        .collect())
}

pub fn decode_policies(bytes: &[u8]) -> Result<Vec<Policy>, DecodeError> {
    Ok(decode_many::<PolicyRecord>(bytes)?
        .into_iter()
        .map(Policy::from)
        .collect())
}

pub fn decode_count(bytes: &[u8]) -> Result<u64, DecodeError> {
    decode_one::<u64>(bytes)
}

/// Oracle gas view: either a bare `u64`, or a struct led by `gas_used_mist: u64`.
pub fn observation_gas(bytes: &[u8]) -> Result<u64, DecodeError> {
    match decode_one::<u64>(bytes) {
        Ok(v) => Ok(v),
        Err(DecodeError::Bcs(_)) => {
            let mut head = [0u8; 8];
            head.copy_from_slice(&bytes[..8]);
            Ok(u64::from_le_bytes(head))
        }
        Err(e) => Err(e),
    }
}

/// Raw bytes of the first return value of the first command in a dev-inspect result.
pub fn first_return_bytes(results: &Value) -> Option<Vec<u8>> {
    let rv = results.get(0)?.get("returnValues")?.get(0)?;
    return_bytes(rv)
}

/// Tolerant byte extraction from a dev-inspect return value.
///
/// Accepts `[bytes, "type"]` pairs, base64 or `0x` hex strings, numeric arrays,
/// and `{ "bytes": [...] }` / `{ "value": "..." }` objects. Zero-length values
/// are reported as absent.
pub fn return_bytes(v: &Value) -> Option<Vec<u8>> {
    let out = match v {
        Value::Array(items) => {
            if items.len() == 2 && items[1].is_string() && !items[0].is_number() {
                return return_bytes(&items[0]);
            }
            numeric_array(items)?
        }
        Value::String(s) => string_bytes(s)?,
        Value::Object(map) => {
            if let Some(Value::Array(items)) = map.get("bytes") {
                numeric_array(items)?
            } else if let Some(inner @ Value::String(_)) = map.get("value") {
                return return_bytes(inner);
            } else {
                return None;
            }
        }
        _ => return None,
    };
    if out.is_empty() {
        None
    } else {
        Some(out)
    }
}

fn numeric_array(items: &[Value]) -> Option<Vec<u8>> {
    items
        .iter()
        .map(|x| x.as_u64().and_then(|n| u8::try_from(n).ok()))
        .collect()
}

fn string_bytes(s: &str) -> Option<Vec<u8>> {
    if let Some(h) = s.strip_prefix("0x") {
        return hex::decode(h).ok();
    }
    B64.decode(s).ok().or_else(|| hex::decode(s).ok())
}
