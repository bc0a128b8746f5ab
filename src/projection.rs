//! Projection Hooks: in-memory, best-effort mirrors of offers and policies.
//!
//! A projection is repopulated wholesale by `refresh` and extended by
//! `load_more` when the listing came from the event log. Nothing is persisted.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;

use crate::ledger::LedgerError;
use crate::reader::{merge_by_identity, LedgerReader, Listing, ListingOrigin, ReadError};
use crate::types::{EventId, Keyed, Offer, Page, Policy};

/// Shown when neither the view nor the event log could be read.
pub const STALE_MESSAGE: &str = "Could not confirm fresh data";

/// What a projection mirrors and how it is read and ordered.
#[async_trait]
pub trait EntityKind: Send + Sync + 'static {
    type Record: Keyed + Clone + PartialEq + Send + Sync + 'static;
    const NAME: &'static str;
    /// Whether `refresh` also loads the marketplace counters.
    const LOADS_COUNTS: bool;

    async fn list(reader: &LedgerReader) -> Result<Listing<Self::Record>, ReadError>;
    async fn page(
        reader: &LedgerReader,
        cursor: Option<EventId>,
        limit: usize,
    ) -> Result<Page<Self::Record>, LedgerError>;
    fn sort(items: &mut [Self::Record], now_ms: u64);
}

pub struct Offers;
pub struct Policies;

#[async_trait]
impl EntityKind for Offers {
    type Record = Offer;
    const NAME: &'static str = "offers";
    const LOADS_COUNTS: bool = true;

    async fn list(reader: &LedgerReader) -> Result<Listing<Offer>, ReadError> {
        reader.list_offers().await
    }

    async fn page(
        reader: &LedgerReader,
        cursor: Option<EventId>,
        limit: usize,
    ) -> Result<Page<Offer>, LedgerError> {
        reader.offer_events_page(cursor, limit).await
    }

    /// Cheapest premium first, ties by identity.
    fn sort(items: &mut [Offer], _now_ms: u64) {
        items.sort_by_cached_key(|o| (o.premium_mist, o.key()));
    }
}

#[async_trait]
impl EntityKind for Policies {
    type Record = Policy;
    const NAME: &'static str = "policies";
    const LOADS_COUNTS: bool = false;

    async fn list(reader: &LedgerReader) -> Result<Listing<Policy>, ReadError> {
        reader.list_policies().await
    }

    async fn page(
        reader: &LedgerReader,
        cursor: Option<EventId>,
        limit: usize,
    ) -> Result<Page<Policy>, LedgerError> {
        reader.policy_events_page(cursor, limit).await
    }

    /// Unexpired first, then soonest expiry, ties by identity.
    fn sort(items: &mut [Policy], now_ms: u64) {
        items.sort_by_cached_key(|p| (p.is_expired(now_ms), p.expiry_ms, p.key()));
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub offers: u64,
    pub policies: u64,
}

struct State<R> {
    items: HashMap<String, R>,
    origin: Option<ListingOrigin>,
    cursor: Option<EventId>,
    has_more: bool,
    loading: bool,
    error: Option<String>,
    counts: Counts,
    generation: u64,
    token: Option<CancellationToken>,
}

impl<R> Default for State<R> {
    fn default() -> Self {
        Self {
            items: HashMap::new(),
            origin: None,
            cursor: None,
            has_more: false,
            loading: false,
            error: None,
            counts: Counts::default(),
            generation: 0,
            token: None,
        }
    }
}

pub struct Projection<K: EntityKind> {
    reader: Arc<LedgerReader>,
    state: Mutex<State<K::Record>>,
    _kind: PhantomData<K>,
}

pub type OfferProjection = Projection<Offers>;
pub type PolicyProjection = Projection<Policies>;

impl<K: EntityKind> Projection<K> {
    pub fn new(reader: Arc<LedgerReader>) -> Self {
        Self {
            reader,
            state: Mutex::new(State::default()),
            _kind: PhantomData,
        }
    }

    /// Drop everything held and reload from the reader. A refresh started
    /// later supersedes this one; its result is then discarded.
    pub async fn refresh(&self) {
        let (generation, token) = {
            let mut st = self.state.lock();
            if let Some(prev) = st.token.take() {
                prev.cancel();
            }
            st.generation += 1;
            st.items.clear();
            st.origin = None;
            st.cursor = None;
            st.has_more = false;
            st.error = None;
            st.loading = true;
            let token = CancellationToken::new();
            st.token = Some(token.clone());
            (st.generation, token)
        };
        log::debug!("🔄 refreshing {}", K::NAME);

        let reader = self.reader.as_ref();
        let work = async {
            if K::LOADS_COUNTS {
                let (listing, offers, policies) = futures::join!(
                    K::list(reader),
                    reader.count_offers(),
                    reader.count_policies()
                );
                (listing, Some(Counts { offers, policies }))
            } else {
                (K::list(reader).await, None)
            }
        };
        let (listing, counts) = tokio::select! {
            _ = token.cancelled() => return,
            r = work => r,
        };

        let mut st = self.state.lock();
        if st.generation != generation {
            return;
        }
        if let Some(c) = counts {
            st.counts = c;
        }
        match listing {
            Ok(listing) => {
                log::info!("📋 {} {} loaded", listing.items.len(), K::NAME);
                merge_by_identity(&mut st.items, listing.items);
                if let ListingOrigin::Events {
                    next_cursor,
                    has_more,
                } = &listing.origin
                {
                    st.cursor = next_cursor.clone();
                    st.has_more = *has_more;
                }
                st.origin = Some(listing.origin);
            }
            Err(e) => {
                log::warn!("⚠️ {} unavailable: {e}", K::NAME);
                st.error = Some(STALE_MESSAGE.to_string());
            }
        }
        st.loading = false;
        st.token = None;
    }

    /// Fetch the next event page. No-op unless more pages exist and nothing
    /// is loading.
    pub async fn load_more(&self) {
        let (generation, cursor) = {
            let mut st = self.state.lock();
            if !st.has_more || st.loading {
                return;
            }
            st.loading = true;
            (st.generation, st.cursor.clone())
        };
        let limit = self.reader.config().page_size;
        let page = K::page(self.reader.as_ref(), cursor, limit).await;

        let mut st = self.state.lock();
        if st.generation != generation {
            return;
        }
        match page {
            Ok(page) => {
                let added = merge_by_identity(&mut st.items, page.items);
                log::debug!("➕ {added} new {}", K::NAME);
                st.cursor = page.next_cursor;
                st.has_more = page.has_more;
            }
            Err(e) => {
                log::warn!("⚠️ next {} page failed: {e}", K::NAME);
                st.error = Some(STALE_MESSAGE.to_string());
            }
        }
        st.loading = false;
    }

    /// Sorted snapshot relative to the current wall clock.
    pub fn items(&self) -> Vec<K::Record> {
        self.items_at(chrono::Utc::now().timestamp_millis().max(0) as u64)
    }

    pub fn items_at(&self, now_ms: u64) -> Vec<K::Record> {
        let mut out: Vec<K::Record> = self.state.lock().items.values().cloned().collect();
        K::sort(&mut out, now_ms);
        out
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_loading(&self) -> bool {
        self.state.lock().loading
    }

    pub fn has_more(&self) -> bool {
        self.state.lock().has_more
    }

    pub fn error(&self) -> Option<String> {
        self.state.lock().error.clone()
    }

    pub fn origin(&self) -> Option<ListingOrigin> {
        self.state.lock().origin.clone()
    }

    pub fn counts(&self) -> Counts {
        self.state.lock().counts
    }

    /// Refresh every `interval` until `cancel` fires.
    pub async fn run_periodic(&self, interval: Duration, cancel: CancellationToken) {
        log::info!(
            "🚀 {} refresh loop started - every {}ms",
            K::NAME,
            interval.as_millis()
        );
        loop {
            self.refresh().await;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = sleep(interval) => {}
            }
        }
        log::info!("🛑 {} refresh loop stopped", K::NAME);
    }
}

impl<K: EntityKind> Drop for Projection<K> {
    fn drop(&mut self) {
        if let Some(token) = self.state.get_mut().token.take() {
            token.cancel();
        }
    }
}
