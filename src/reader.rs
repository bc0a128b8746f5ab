//! Ledger Reader: typed offers and policies from view calls, with event replay
//! as the fallback when a view fails or comes back empty.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::Config;
use crate::decode::{self, DecodeError};
use crate::ledger::{LedgerClient, LedgerError};
use crate::ptb::{Argument, PtbError, Transaction};
use crate::types::{
    Address, EventId, EventPage, Fidelity, Keyed, LedgerEvent, Observation, Offer, Page, Policy,
    PolicyKind,
};
use crate::util_text::json_u64;

pub const MARKETPLACE_MODULE: &str = "gas_insurance_marketplace";
pub const ORACLE_MODULE: &str = "gas_oracle";

pub const OFFER_POSTED: &str = "OfferPosted";
pub const POLICY_CREATED: &str = "PolicyCreated";
pub const OBSERVATION_SUBMITTED: &str = "ObservationSubmitted";

/// Where a listing came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ListingOrigin {
    View,
    Events {
        next_cursor: Option<EventId>,
        has_more: bool,
    },
}

#[derive(Clone, Debug)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub origin: ListingOrigin,
}

impl<T> Listing<T> {
    pub fn view(items: Vec<T>) -> Self {
        Self {
            items,
            origin: ListingOrigin::View,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("could not read from any source ({0})")]
    Exhausted(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Build(#[from] PtbError),
}

/// One way of producing a listing.
#[async_trait]
pub trait ListSource<T>: Send + Sync {
    fn name(&self) -> &str;
    async fn fetch(&self, client: &dyn LedgerClient, cfg: &Config) -> Result<Listing<T>, SourceError>;
}

/// Ordered sources; the first non-empty listing wins.
pub struct FallbackChain<T> {
    sources: Vec<Box<dyn ListSource<T>>>,
}

impl<T: Send + 'static> FallbackChain<T> {
    pub fn new(sources: Vec<Box<dyn ListSource<T>>>) -> Self {
        Self { sources }
    }

    pub async fn run(&self, client: &dyn LedgerClient, cfg: &Config) -> Result<Listing<T>, ReadError> {
        let mut failures = Vec::new();
        let mut last_empty = None;
        for source in &self.sources {
            match source.fetch(client, cfg).await {
                Ok(listing) if !listing.items.is_empty() => {
                    log::debug!("📚 {} returned {} records", source.name(), listing.items.len());
                    return Ok(listing);
                }
                Ok(listing) => {
                    log::debug!("🫙 {} returned nothing", source.name());
                    last_empty = Some(listing);
                }
                Err(e) => {
                    log::warn!("⚠️ {} failed: {e}", source.name());
                    failures.push(format!("{}: {e}", source.name()));
                }
            }
        }
        match last_empty {
            Some(listing) => Ok(listing),
            None => Err(ReadError::Exhausted(failures.join("; "))),
        }
    }
}

/// Run a read-only call and return the first command's first return value.
pub async fn view_bytes<F>(
    client: &dyn LedgerClient,
    package: Address,
    module: &str,
    function: &str,
    args: F,
) -> Result<Option<Vec<u8>>, SourceError>
where
    F: FnOnce(&mut Transaction) -> Result<Vec<Argument>, PtbError>,
{
    let mut tx = Transaction::new();
    let arguments = args(&mut tx)?;
    tx.move_call(package, module, function, arguments);
    let results = client.dev_inspect(&tx, Address::ZERO).await?;
    Ok(decode::first_return_bytes(&results))
}

/// `view_offers(book, vector<ID>)` fed with ids from recent `OfferPosted` events.
pub struct OfferViewSource;

#[async_trait]
impl ListSource<Offer> for OfferViewSource {
    fn name(&self) -> &str {
        "view_offers"
    }

    async fn fetch(&self, client: &dyn LedgerClient, cfg: &Config) -> Result<Listing<Offer>, SourceError> {
        let recent = client
            .query_events(&event_type(cfg, MARKETPLACE_MODULE, OFFER_POSTED), None, cfg.view_id_window)
            .await?;
        let ids: Vec<Address> = recent
            .data
            .iter()
            .filter_map(|e| e.parsed_json.get("offer_id")?.as_str()?.parse().ok())
            .collect();
        if ids.is_empty() {
            return Ok(Listing::view(Vec::new()));
        }
        let book = cfg.book_id;
        let bytes = view_bytes(client, cfg.package_id, MARKETPLACE_MODULE, "view_offers", |tx| {
            Ok(vec![tx.object_readonly(book), tx.pure(&ids)?])
        })
        .await?;
        match bytes {
            Some(b) => Ok(Listing::view(decode::decode_offers(&b)?)),
            None => Ok(Listing::view(Vec::new())),
        }
    }
}

/// `view_policies(book)`, or `view_policies()` for deployments without the book argument.
pub struct PolicyViewSource {
    pub with_book: bool,
}

#[async_trait]
impl ListSource<Policy> for PolicyViewSource {
    fn name(&self) -> &str {
        if self.with_book {
            "view_policies(book)"
        } else {
            "view_policies()"
        }
    }

    async fn fetch(&self, client: &dyn LedgerClient, cfg: &Config) -> Result<Listing<Policy>, SourceError> {
        let book = cfg.book_id;
        let with_book = self.with_book;
        let bytes = view_bytes(client, cfg.package_id, MARKETPLACE_MODULE, "view_policies", |tx| {
            Ok(if with_book {
                vec![tx.object_readonly(book)]
            } else {
                Vec::new()
            })
        })
        .await?;
        match bytes {
            Some(b) => Ok(Listing::view(decode::decode_policies(&b)?)),
            None => Ok(Listing::view(Vec::new())),
        }
    }
}

/// First page of a creation event, lossy-mapped into records.
pub struct EventSource<T> {
    pub event: &'static str,
    pub map: fn(&LedgerEvent) -> T,
}

#[async_trait]
impl<T: Keyed + Send + Sync + 'static> ListSource<T> for EventSource<T> {
    fn name(&self) -> &str {
        self.event
    }

    async fn fetch(&self, client: &dyn LedgerClient, cfg: &Config) -> Result<Listing<T>, SourceError> {
        let page = client
            .query_events(&event_type(cfg, MARKETPLACE_MODULE, self.event), None, cfg.page_size)
            .await?;
        let page = map_page(page, self.map);
        Ok(Listing {
            items: page.items,
            origin: ListingOrigin::Events {
                next_cursor: page.next_cursor,
                has_more: page.has_more,
            },
        })
    }
}

pub fn event_type(cfg: &Config, module: &str, name: &str) -> String {
    format!("{}::{module}::{name}", cfg.package_id)
}

/// Map an event page, keeping the first (most recent) record per identity.
pub fn map_page<T: Keyed>(page: EventPage, map: fn(&LedgerEvent) -> T) -> Page<T> {
    let mut seen = HashSet::new();
    let items = page
        .data
        .iter()
        .map(map)
        .filter(|r| seen.insert(r.key()))
        .collect();
    Page {
        items,
        next_cursor: page.next_cursor,
        has_more: page.has_next_page,
    }
}

/// Insert or replace by identity. Returns how many identities were new.
///
/// Last write wins; a same-identity record with different content is
/// replaced without conflict detection.
pub fn merge_by_identity<T: Keyed + PartialEq>(
    map: &mut HashMap<String, T>,
    items: impl IntoIterator<Item = T>,
) -> usize {
    let mut added = 0;
    for item in items {
        let key = item.key();
        match map.get(&key) {
            None => added += 1,
            Some(prev) if *prev != item => log::debug!("🔀 {key} replaced with different content"),
            Some(_) => {}
        }
        map.insert(key, item);
    }
    added
}

fn field_u64(pj: &Value, key: &str) -> u64 {
    pj.get(key).and_then(json_u64).unwrap_or(0)
}

/// `None` when absent or wider than a `u8`; never truncated.
fn field_kind(pj: &Value, key: &str) -> Option<PolicyKind> {
    let v = pj.get(key).and_then(json_u64)?;
    u8::try_from(v).ok().map(PolicyKind::from_u8)
}

fn field_addr(pj: &Value, keys: &[&str]) -> Address {
    keys.iter()
        .find_map(|k| pj.get(*k)?.as_str()?.parse().ok())
        .unwrap_or(Address::ZERO)
}

pub fn map_offer_event(ev: &LedgerEvent) -> Offer {
    let pj = &ev.parsed_json;
    Offer {
        id: field_addr(pj, &["offer_id"]),
        insurer: field_addr(pj, &["insurer", "creator"]),
        kind: field_kind(pj, "policy_type").unwrap_or(PolicyKind::Single),
        strike_mist: field_u64(pj, "strike_mist_per_unit"),
        premium_mist: field_u64(pj, "premium_mist"),
        coverage_limit_mist: field_u64(pj, "coverage_limit_mist"),
        start_ms: field_u64(pj, "start_ms"),
        expiry_ms: field_u64(pj, "expiry_ms"),
        max_txs: field_u64(pj, "max_txs"),
        is_active: pj.get("is_active").and_then(|b| b.as_bool()).unwrap_or(true),
        fidelity: Fidelity::Degraded,
        source_event: Some(ev.id.clone()),
    }
}

pub fn map_policy_event(ev: &LedgerEvent) -> Policy {
    let pj = &ev.parsed_json;
    Policy {
        id: field_addr(pj, &["policy_id", "id"]),
        insured: field_addr(pj, &["insured"]),
        insurer: field_addr(pj, &["insurer"]),
        expiry_ms: field_u64(pj, "expiry_ms"),
        remaining_txs: field_u64(pj, "remaining_txs"),
        coverage_left_mist: field_u64(pj, "coverage_left_mist"),
        kind: field_kind(pj, "policy_type"),
        fidelity: Fidelity::Degraded,
        source_event: Some(ev.id.clone()),
    }
}

pub fn map_observation_event(ev: &LedgerEvent) -> Observation {
    let pj = &ev.parsed_json;
    let tx_digest = match pj.get("tx_digest") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(bytes)) => {
            let raw: Vec<u8> = bytes
                .iter()
                .filter_map(|b| b.as_u64().and_then(|n| u8::try_from(n).ok()))
                .collect();
            String::from_utf8_lossy(&raw).into_owned()
        }
        _ => String::new(),
    };
    Observation {
        policy_id: field_addr(pj, &["policy_id"]),
        tx_digest,
        gas_used_mist: field_u64(pj, "gas_used_mist"),
        timestamp_ms: ev.timestamp_ms.as_deref().and_then(|t| t.parse().ok()),
    }
}

impl Keyed for Observation {
    fn key(&self) -> String {
        format!("{}:{}", self.policy_id, self.tx_digest)
    }
}

/// Existence of the configured on-chain objects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConfigCheck {
    pub package: bool,
    pub book: bool,
    pub oracle: bool,
}

impl ConfigCheck {
    pub fn is_ok(&self) -> bool {
        self.package && self.book && self.oracle
    }
}

pub struct LedgerReader {
    client: Arc<dyn LedgerClient>,
    cfg: Config,
    offers: FallbackChain<Offer>,
    policies: FallbackChain<Policy>,
}

impl LedgerReader {
    pub fn new(client: Arc<dyn LedgerClient>, cfg: Config) -> Self {
        let offers = FallbackChain::new(vec![
            Box::new(OfferViewSource),
            Box::new(EventSource::<Offer> {
                event: OFFER_POSTED,
                map: map_offer_event,
            }),
        ]);
        let policies = FallbackChain::new(vec![
            Box::new(PolicyViewSource { with_book: true }),
            Box::new(PolicyViewSource { with_book: false }),
            Box::new(EventSource::<Policy> {
                event: POLICY_CREATED,
                map: map_policy_event,
            }),
        ]);
        Self {
            client,
            cfg,
            offers,
            policies,
        }
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub async fn list_offers(&self) -> Result<Listing<Offer>, ReadError> {
        self.offers.run(self.client.as_ref(), &self.cfg).await
    }

    pub async fn list_policies(&self) -> Result<Listing<Policy>, ReadError> {
        self.policies.run(self.client.as_ref(), &self.cfg).await
    }

    pub async fn count_offers(&self) -> u64 {
        self.count("count_offers").await
    }

    pub async fn count_policies(&self) -> u64 {
        self.count("count_policies").await
    }

    /// `f(book)` then `f()`; counts are advisory so every failure reads as zero.
    async fn count(&self, function: &str) -> u64 {
        let book = self.cfg.book_id;
        for with_book in [true, false] {
            let bytes = view_bytes(
                self.client.as_ref(),
                self.cfg.package_id,
                MARKETPLACE_MODULE,
                function,
                |tx| {
                    Ok(if with_book {
                        vec![tx.object_readonly(book)]
                    } else {
                        Vec::new()
                    })
                },
            )
            .await;
            match bytes.map(|b| b.map(|b| decode::decode_count(&b))) {
                Ok(Some(Ok(n))) => return n,
                Ok(Some(Err(e))) => log::debug!("🔢 {function} (book={with_book}) undecodable: {e}"),
                Ok(None) => log::debug!("🔢 {function} (book={with_book}) returned nothing"),
                Err(e) => log::debug!("🔢 {function} (book={with_book}) failed: {e}"),
            }
        }
        log::warn!("⚠️ {function} unavailable, reporting 0");
        0
    }

    pub async fn offer_events_page(
        &self,
        cursor: Option<EventId>,
        limit: usize,
    ) -> Result<Page<Offer>, LedgerError> {
        let page = self
            .client
            .query_events(&event_type(&self.cfg, MARKETPLACE_MODULE, OFFER_POSTED), cursor, limit)
            .await?;
        Ok(map_page(page, map_offer_event))
    }

    pub async fn policy_events_page(
        &self,
        cursor: Option<EventId>,
        limit: usize,
    ) -> Result<Page<Policy>, LedgerError> {
        let page = self
            .client
            .query_events(&event_type(&self.cfg, MARKETPLACE_MODULE, POLICY_CREATED), cursor, limit)
            .await?;
        Ok(map_page(page, map_policy_event))
    }

    /// Oracle observation feed; a failed query reads as an empty last page.
    pub async fn observation_events_page(&self, cursor: Option<EventId>, limit: usize) -> Page<Observation> {
        let ty = event_type(&self.cfg, ORACLE_MODULE, OBSERVATION_SUBMITTED);
        match self.client.query_events(&ty, cursor, limit).await {
            Ok(page) => map_page(page, map_observation_event),
            Err(e) => {
                log::warn!("⚠️ observation query failed: {e}");
                Page::default()
            }
        }
    }

    /// Gas the oracle recorded for `policy_id`, if any.
    pub async fn observed_gas(&self, policy_id: Address) -> Option<u64> {
        let oracle = self.cfg.oracle_id;
        let bytes = view_bytes(
            self.client.as_ref(),
            self.cfg.package_id,
            ORACLE_MODULE,
            "get_observed_gas",
            |tx| Ok(vec![tx.object_readonly(oracle), tx.object_readonly(policy_id)]),
        )
        .await;
        match bytes {
            Ok(Some(b)) => decode::observation_gas(&b)
                .map_err(|e| log::debug!("🔮 observed gas undecodable: {e}"))
                .ok(),
            Ok(None) => None,
            Err(e) => {
                log::debug!("🔮 get_observed_gas failed: {e}");
                None
            }
        }
    }

    pub async fn verify_config(&self) -> Result<ConfigCheck, LedgerError> {
        let ids = [self.cfg.package_id, self.cfg.book_id, self.cfg.oracle_id];
        let found = self.client.objects_exist(&ids).await?;
        let at = |i: usize| found.get(i).copied().unwrap_or(false);
        let check = ConfigCheck {
            package: at(0),
            book: at(1),
            oracle: at(2),
        };
        if !check.is_ok() {
            log::warn!("⚠️ configured objects missing on {}: {check:?}", self.cfg.network);
        }
        Ok(check)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(digest: &str, seq: &str, pj: Value) -> LedgerEvent {
        LedgerEvent {
            id: EventId {
                tx_digest: digest.into(),
                event_seq: seq.into(),
            },
            type_: "t".into(),
            parsed_json: pj,
            timestamp_ms: Some("1700000000000".into()),
        }
    }

    #[test]
    fn offer_event_mapping_defaults_and_aliases() {
        let ev = event(
            "D",
            "0",
            json!({"offer_id": "0x5", "creator": "0x7", "premium_mist": "250", "policy_type": 1}),
        );
        let o = map_offer_event(&ev);
        assert_eq!(o.id, "0x5".parse().unwrap());
        assert_eq!(o.insurer, "0x7".parse().unwrap());
        assert_eq!(o.premium_mist, 250);
        assert_eq!(o.kind, PolicyKind::Recurring);
        assert_eq!(o.coverage_limit_mist, 0);
        assert_eq!(o.start_ms, 0);
        assert!(o.is_active);
        assert_eq!(o.fidelity, Fidelity::Degraded);

        let bare = map_offer_event(&event("D", "4", json!({})));
        assert!(bare.id.is_zero() && bare.insurer.is_zero());
        assert_eq!(bare.kind, PolicyKind::Single);
        assert_eq!(bare.key(), "D:4");
    }

    #[test]
    fn policy_event_mapping_keeps_kind_optional() {
        let p = map_policy_event(&event("D", "1", json!({"id": "0x2", "remaining_txs": 3})));
        assert_eq!(p.id, "0x2".parse().unwrap());
        assert_eq!(p.remaining_txs, 3);
        assert_eq!(p.kind, None);
        assert!(p.insured.is_zero());

        let p = map_policy_event(&event("D", "2", json!({"policy_id": "0x3", "policy_type": "0"})));
        assert_eq!(p.kind, Some(PolicyKind::Single));
    }

    #[test]
    fn wide_policy_type_is_not_truncated() {
        // 257 would wrap to 1 (Recurring) if narrowed
        let p = map_policy_event(&event("D", "3", json!({"policy_id": "0x3", "policy_type": 257})));
        assert_eq!(p.kind, None);

        let o = map_offer_event(&event("D", "3", json!({"offer_id": "0x4", "policy_type": "257"})));
        assert_eq!(o.kind, PolicyKind::Single);
    }

    #[test]
    fn observation_digest_from_string_or_bytes() {
        let o = map_observation_event(&event(
            "D",
            "0",
            json!({"policy_id": "0x1", "tx_digest": [65, 66], "gas_used_mist": "900"}),
        ));
        assert_eq!(o.tx_digest, "AB");
        assert_eq!(o.gas_used_mist, 900);
        assert_eq!(o.timestamp_ms, Some(1_700_000_000_000));
    }

    #[test]
    fn page_mapping_keeps_most_recent_duplicate() {
        let page = EventPage {
            data: vec![
                event("D2", "0", json!({"offer_id": "0x1", "premium_mist": 20})),
                event("D1", "0", json!({"offer_id": "0x1", "premium_mist": 10})),
                event("D1", "1", json!({"offer_id": "0x2"})),
            ],
            next_cursor: None,
            has_next_page: false,
        };
        let page = map_page(page, map_offer_event);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0].premium_mist, 20);
    }

    #[test]
    fn merging_overlapping_pages_keeps_one_per_identity() {
        let a = map_offer_event(&event("D1", "0", json!({"offer_id": "0x1", "premium_mist": 10})));
        let b = map_offer_event(&event("D1", "1", json!({"offer_id": "0x2"})));
        let a2 = map_offer_event(&event("D3", "0", json!({"offer_id": "0x1", "premium_mist": 99})));

        let mut map = HashMap::new();
        assert_eq!(merge_by_identity(&mut map, vec![a, b]), 2);
        assert_eq!(merge_by_identity(&mut map, vec![a2]), 0);
        assert_eq!(map.len(), 2);
        assert_eq!(map[&"0x1".parse::<Address>().unwrap().to_string()].premium_mist, 99);
    }
}
