//! gascover - client layer for the Sui gas-fee insurance marketplace
//!
//! This library reads offers and policies from the `gas_insurance_marketplace`
//! Move package, plans exact-value coin funding, builds the contract calls,
//! and drives signed transactions to finality.
//!
//! ## Architecture
//!
//! - **Reads**: view calls through dev-inspect, falling back to the event log
//! - **Writes**: programmable transactions signed by an external `Signer`
//!
//! ## Usage
//!
//! ```bash
//! cargo run -- offers --network testnet
//! ```

// Core modules
pub mod config;
pub mod types;
pub mod util_text;

// Wire formats (BCS views and programmable transactions)
pub mod decode;
pub mod ptb;

// RPC utilities and the ledger/signer seams
pub mod ledger;
pub mod rpc_utils;

// Read side
pub mod projection;
pub mod reader;

// Write side
pub mod executor;
pub mod funding;
pub mod tx;

// Re-export commonly used types
pub use config::{Config, Network};
pub use executor::{ExecuteTxResponse, TxError, TxExecutor, TxPhase, TxStatus};
pub use ledger::{HttpLedgerClient, LedgerClient, LedgerError, Signer, SignerError};
pub use projection::{OfferProjection, PolicyProjection};
pub use reader::{LedgerReader, Listing, ListingOrigin, ReadError};
pub use types::{Address, Coin, Fidelity, Offer, Policy, PolicyKind, TxDigest};
