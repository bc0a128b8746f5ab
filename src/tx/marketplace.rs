use super::CoinSource;
use crate::config::Config;
use crate::ptb::{Argument, PtbError, Transaction};
use crate::reader::MARKETPLACE_MODULE;
use crate::types::{Address, PolicyKind};

#[derive(Clone, Debug)]
pub struct PostOffer {
    pub kind: PolicyKind,
    pub strike_mist: u64,
    pub premium_mist: u64,
    /// Ignored for `Single`, which starts at its expiry.
    pub start_ms: u64,
    pub expiry_ms: u64,
    /// Ignored for `Single`, which covers exactly one transaction.
    pub max_txs: u64,
    pub collateral: CoinSource,
    pub coverage_limit_mist: u64,
}

/// `post_offer(book, policy_type, strike, premium, start, expiry, max_txs, collateral, coverage_limit)`
pub fn post_offer(tx: &mut Transaction, cfg: &Config, p: &PostOffer) -> Argument {
    let (start_ms, max_txs) = match p.kind {
        PolicyKind::Single => (p.expiry_ms, 1),
        PolicyKind::Recurring => (p.start_ms, p.max_txs),
    };
    let book = tx.object(cfg.book_id);
    let policy_type = tx.pure_u8(p.kind.as_u8());
    let strike = tx.pure_u64(p.strike_mist);
    let premium = tx.pure_u64(p.premium_mist);
    let start = tx.pure_u64(start_ms);
    let expiry = tx.pure_u64(p.expiry_ms);
    let max_txs = tx.pure_u64(max_txs);
    let collateral = p.collateral.into_arg(tx);
    let coverage = tx.pure_u64(p.coverage_limit_mist);
    tx.move_call(
        cfg.package_id,
        MARKETPLACE_MODULE,
        "post_offer",
        vec![
            book,
            policy_type,
            strike,
            premium,
            start,
            expiry,
            max_txs,
            collateral,
            coverage,
        ],
    )
}

/// `accept_offer(book, clock, offer_id, premium_coin)`
pub fn accept_offer(
    tx: &mut Transaction,
    cfg: &Config,
    offer_id: Address,
    premium: CoinSource,
) -> Argument {
    let book = tx.object(cfg.book_id);
    let clock = tx.object_readonly(cfg.clock_id);
    let offer = tx.pure_address(offer_id);
    let premium = premium.into_arg(tx);
    tx.move_call(
        cfg.package_id,
        MARKETPLACE_MODULE,
        "accept_offer",
        vec![book, clock, offer, premium],
    )
}

/// `settle_tx(book, oracle, clock, policy, tx_digest: vector<u8>)`
pub fn settle(
    tx: &mut Transaction,
    cfg: &Config,
    policy_id: Address,
    tx_digest: &str,
) -> Result<Argument, PtbError> {
    let book = tx.object(cfg.book_id);
    let oracle = tx.object(cfg.oracle_id);
    let clock = tx.object_readonly(cfg.clock_id);
    let policy = tx.object(policy_id);
    let digest = tx.pure(tx_digest.as_bytes())?;
    Ok(tx.move_call(
        cfg.package_id,
        MARKETPLACE_MODULE,
        "settle_tx",
        vec![book, oracle, clock, policy, digest],
    ))
}

/// `reclaim_collateral_after_expiry(book, clock, policy)`
pub fn reclaim_after_expiry(tx: &mut Transaction, cfg: &Config, policy_id: Address) -> Argument {
    let book = tx.object(cfg.book_id);
    let clock = tx.object_readonly(cfg.clock_id);
    let policy = tx.object(policy_id);
    tx.move_call(
        cfg.package_id,
        MARKETPLACE_MODULE,
        "reclaim_collateral_after_expiry",
        vec![book, clock, policy],
    )
}
