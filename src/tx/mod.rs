//! Contract call builders. Each appends one Move call to a caller-owned
//! transaction, so several calls and a funding plan can share one block.

pub mod marketplace;
pub mod oracle;

use crate::ptb::{Argument, Transaction};
use crate::types::Address;

/// A coin argument: an owned object by id, or a handle produced earlier in
/// the same transaction (e.g. by `funding::enact`).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoinSource {
    Id(Address),
    Arg(Argument),
}

impl CoinSource {
    pub fn into_arg(self, tx: &mut Transaction) -> Argument {
        match self {
            CoinSource::Id(id) => tx.object(id),
            CoinSource::Arg(arg) => arg,
        }
    }
}

impl From<Address> for CoinSource {
    fn from(id: Address) -> Self {
        CoinSource::Id(id)
    }
}

impl From<Argument> for CoinSource {
    fn from(arg: Argument) -> Self {
        CoinSource::Arg(arg)
    }
}
