//! Funding Planner: assemble an exact-value `Coin<SUI>` from fragmented holdings.
//!
//! Planning is pure and happens before any transaction exists. Enacting a plan
//! adds the merge/split commands to a transaction and hands back the split
//! coin, which only has meaning inside that same transaction.

use serde::Serialize;

use crate::ledger::{LedgerClient, LedgerError, SUI_COIN_TYPE};
use crate::ptb::{Argument, Transaction};
use crate::types::{Address, Coin};
use crate::util_text::format_sui;

/// Holdings fetched per plan; matches the node's maximum page.
pub const COIN_QUERY_LIMIT: usize = 200;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FundPlan {
    /// Coin that receives the merges and is split.
    pub target: Address,
    /// Coins merged into `target` first, largest first.
    pub merge_sources: Vec<Address>,
}

#[derive(Debug, thiserror::Error)]
pub enum FundingError {
    #[error("no SUI coins available")]
    NoCoins,
    #[error("insufficient SUI balance: need {required} MIST, have {available} MIST")]
    InsufficientFunds { required: u64, available: u64 },
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Smallest consolidation that covers `amount`.
///
/// A single coin that already covers the amount is always preferred, even when
/// it is not the largest. Otherwise the largest coins are picked until the
/// running sum covers it.
pub fn plan_exact(holdings: &[Coin], amount: u64) -> Result<FundPlan, FundingError> {
    if holdings.is_empty() {
        return Err(FundingError::NoCoins);
    }
    if let Some(single) = holdings.iter().find(|c| c.balance >= amount) {
        return Ok(FundPlan {
            target: single.id,
            merge_sources: Vec::new(),
        });
    }

    let mut sorted: Vec<&Coin> = holdings.iter().collect();
    sorted.sort_by(|a, b| b.balance.cmp(&a.balance));

    let mut sum: u128 = 0;
    let mut picked = Vec::new();
    for coin in sorted {
        sum += u128::from(coin.balance);
        picked.push(coin.id);
        if sum >= u128::from(amount) {
            break;
        }
    }
    if sum < u128::from(amount) {
        return Err(FundingError::InsufficientFunds {
            required: amount,
            available: u64::try_from(sum).unwrap_or(u64::MAX),
        });
    }

    let target = picked.remove(0);
    Ok(FundPlan {
        target,
        merge_sources: picked,
    })
}

/// Query `owner`'s SUI coins once, then plan.
pub async fn plan_for_owner(
    client: &dyn LedgerClient,
    owner: Address,
    amount: u64,
) -> Result<FundPlan, FundingError> {
    let coins = client.get_coins(owner, SUI_COIN_TYPE, COIN_QUERY_LIMIT).await?;
    log::debug!("🪙 {} coins held by {}", coins.len(), owner.short());
    let plan = plan_exact(&coins, amount)?;
    if !plan.merge_sources.is_empty() {
        log::info!(
            "🧩 merging {} coins into {} to fund {}",
            plan.merge_sources.len(),
            plan.target.short(),
            format_sui(amount)
        );
    }
    Ok(plan)
}

/// Merge (when needed) and split `amount` off the plan's target.
pub fn enact(tx: &mut Transaction, plan: &FundPlan, amount: u64) -> Argument {
    let target = tx.object(plan.target);
    if !plan.merge_sources.is_empty() {
        let sources = plan.merge_sources.iter().map(|id| tx.object(*id)).collect();
        tx.merge_coins(target, sources);
    }
    let parts = tx.split_coins(target, &[amount]);
    parts[0]
}

/// First held coin, whatever its balance.
pub fn pick_any(coins: &[Coin]) -> Result<Address, FundingError> {
    coins.first().map(|c| c.id).ok_or(FundingError::NoCoins)
}

/// First coin that alone covers `amount`.
pub fn pick_for_amount(coins: &[Coin], amount: u64) -> Result<Address, FundingError> {
    coins
        .iter()
        .find(|c| c.balance >= amount)
        .map(|c| c.id)
        .ok_or_else(|| FundingError::InsufficientFunds {
            required: amount,
            available: coins.iter().map(|c| c.balance).max().unwrap_or(0),
        })
}
