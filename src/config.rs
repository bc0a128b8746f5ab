// On-chain configuration for the marketplace client
// Priority: CLI args > Environment variables > Config file > Defaults

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::rpc_utils::RpcSettings;
use crate::types::Address;

const DEFAULT_PACKAGE_ID: &str =
    "0x205acdd30a8a741d3f7de74ed7517e526aa720e1d02789aeda87e53a0cf5dc99";
const DEFAULT_BOOK_ID: &str =
    "0xd49a7b1a8e205fd69aecc9fca7ebaa713258dbe7430e88145ab7b93c93715cdd";
const DEFAULT_ORACLE_ID: &str =
    "0x14011bd609a7905416bca0bfa056b269ffb1d91003cf04d2352db04fbfb580c6";
const CLOCK_ID: &str = "0x6";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Localnet,
    Devnet,
    Testnet,
    Mainnet,
}

impl std::str::FromStr for Network {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "localnet" | "local" => Ok(Network::Localnet),
            "devnet" => Ok(Network::Devnet),
            "testnet" => Ok(Network::Testnet),
            "mainnet" => Ok(Network::Mainnet),
            _ => Err(anyhow!(
                "Invalid network '{s}'. Valid options: localnet, devnet, testnet, mainnet"
            )),
        }
    }
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Network::Localnet => write!(f, "localnet"),
            Network::Devnet => write!(f, "devnet"),
            Network::Testnet => write!(f, "testnet"),
            Network::Mainnet => write!(f, "mainnet"),
        }
    }
}

impl Network {
    /// Public fullnode for the network
    pub fn fullnode_url(self) -> &'static str {
        match self {
            Network::Localnet => "http://127.0.0.1:9000",
            Network::Devnet => "https://fullnode.devnet.sui.io:443",
            Network::Testnet => "https://fullnode.testnet.sui.io:443",
            Network::Mainnet => "https://fullnode.mainnet.sui.io:443",
        }
    }
}

/// Connection and object settings, shared by every subcommand.
///
/// The TOML config file uses the same keys, e.g. `network = "mainnet"`.
#[derive(clap::Args, Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CliArgs {
    /// Sui network: localnet, devnet, testnet or mainnet
    #[arg(long, env = "SUI_NETWORK", value_parser = clap::value_parser!(Network))]
    pub network: Option<Network>,

    /// RPC endpoint override (defaults to the network's public fullnode)
    #[arg(long, env = "SUI_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Marketplace package id
    #[arg(long, env = "GASCOVER_PACKAGE_ID")]
    pub package_id: Option<String>,

    /// Shared offer/policy book object id
    #[arg(long, env = "GASCOVER_BOOK_ID")]
    pub book_id: Option<String>,

    /// Shared gas oracle object id
    #[arg(long, env = "GASCOVER_ORACLE_ID")]
    pub oracle_id: Option<String>,

    /// RPC request timeout in milliseconds (1000-60000)
    #[arg(long, env = "RPC_TIMEOUT_MS")]
    pub rpc_timeout_ms: Option<u64>,

    /// Retry attempts for transient RPC failures (0-10)
    #[arg(long, env = "RPC_RETRIES")]
    pub rpc_retries: Option<u32>,

    /// Event page size for fallback reads (1-1000)
    #[arg(long, env = "PAGE_SIZE")]
    pub page_size: Option<usize>,

    /// Recent offer events scanned for view-call ids (1-1000)
    #[arg(long, env = "VIEW_ID_WINDOW")]
    pub view_id_window: Option<usize>,

    /// Maximum wait for transaction finality in milliseconds (1000-300000)
    #[arg(long, env = "FINALITY_TIMEOUT_MS")]
    pub finality_timeout_ms: Option<u64>,

    /// Poll interval while waiting for finality in milliseconds (50-10000)
    #[arg(long, env = "FINALITY_POLL_MS")]
    pub finality_poll_ms: Option<u64>,

    /// Optional config file path (TOML format)
    #[arg(long, env = "GASCOVER_CONFIG")]
    #[serde(skip)]
    pub config_file: Option<PathBuf>,
}

impl CliArgs {
    /// Fill every unset field from `lower`.
    fn or(self, lower: CliArgs) -> CliArgs {
        CliArgs {
            network: self.network.or(lower.network),
            rpc_url: self.rpc_url.or(lower.rpc_url),
            package_id: self.package_id.or(lower.package_id),
            book_id: self.book_id.or(lower.book_id),
            oracle_id: self.oracle_id.or(lower.oracle_id),
            rpc_timeout_ms: self.rpc_timeout_ms.or(lower.rpc_timeout_ms),
            rpc_retries: self.rpc_retries.or(lower.rpc_retries),
            page_size: self.page_size.or(lower.page_size),
            view_id_window: self.view_id_window.or(lower.view_id_window),
            finality_timeout_ms: self.finality_timeout_ms.or(lower.finality_timeout_ms),
            finality_poll_ms: self.finality_poll_ms.or(lower.finality_poll_ms),
            config_file: self.config_file,
        }
    }
}



#[derive(Clone, Debug)]
pub struct Config {
    pub network: Network,
    pub rpc_url: String,
    pub package_id: Address,
    pub book_id: Address,
    pub oracle_id: Address,
    pub clock_id: Address,
    pub rpc_timeout_ms: u64,
    pub rpc_retries: u32,
    pub page_size: usize,
    pub view_id_window: usize,
    pub finality_timeout_ms: u64,
    pub finality_poll_ms: u64,
}

impl Default for Config {
    /// Testnet deployment with default transport settings
    fn default() -> Self {
        Self {
            network: Network::Testnet,
            rpc_url: Network::Testnet.fullnode_url().to_string(),
            package_id: parse_default(DEFAULT_PACKAGE_ID),
            book_id: parse_default(DEFAULT_BOOK_ID),
            oracle_id: parse_default(DEFAULT_ORACLE_ID),
            clock_id: parse_default(CLOCK_ID),
            rpc_timeout_ms: 8000,
            rpc_retries: 2,
            page_size: 100,
            view_id_window: 200,
            finality_timeout_ms: 60_000,
            finality_poll_ms: 500,
        }
    }
}

fn parse_default(s: &str) -> Address {
    s.parse().unwrap_or(Address::ZERO)
}

impl Config {
    /// Chain identifier handed to the signer, e.g. `sui:testnet`
    pub fn chain(&self) -> String {
        format!("sui:{}", self.network)
    }

    pub fn rpc_settings(&self) -> RpcSettings {
        RpcSettings {
            url: self.rpc_url.clone(),
            timeout_ms: self.rpc_timeout_ms,
            retries: self.rpc_retries,
        }
    }

    /// Print current configuration (useful for debugging)
    pub fn print_summary(&self) {
        log::info!("⚙️  Configuration:");
        log::info!("  🌐 Network: {}", self.network);
        log::info!("  📡 RPC URL: {}", self.rpc_url);
        log::info!("  📦 Package: {}", self.package_id);
        log::info!("  📒 Book: {}", self.book_id);
        log::info!("  🔮 Oracle: {}", self.oracle_id);
        log::info!(
            "  ⏱️  RPC timeout: {}ms, retries: {}",
            self.rpc_timeout_ms,
            self.rpc_retries
        );
        log::info!(
            "  📄 Page size: {}, view id window: {}",
            self.page_size,
            self.view_id_window
        );
    }
}

/// Validate that a value is within a given range (inclusive)
fn validate_in_range<T>(val: T, min: T, max: T, name: &str) -> Result<T>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if val < min || val > max {
        Err(anyhow!("{name} must be in range [{min}, {max}], got {val}"))
    } else {
        Ok(val)
    }
}

/// Validate URL format (basic check)
fn validate_url(url: &str, name: &str) -> Result<()> {
    if url.is_empty() {
        return Err(anyhow!("{name} cannot be empty"));
    }
    if url.starts_with("http://") || url.starts_with("https://") {
        Ok(())
    } else {
        Err(anyhow!("{name} must start with http:// or https://"))
    }
}

fn parse_id(raw: Option<String>, default: &str, name: &str) -> Result<Address> {
    let s = raw.unwrap_or_else(|| default.to_string());
    s.parse()
        .map_err(|e| anyhow!("{name} is not a valid object id ({e}): {s}"))
}

/// Load configuration from TOML file
pub fn load_file(path: &PathBuf) -> Result<CliArgs> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("Failed to parse TOML config: {}", path.display()))
}

/// Resolve the full priority chain for already-parsed CLI/env arguments
pub fn resolve(args: CliArgs) -> Result<Config> {
    let file = match args.config_file {
        Some(ref path) => {
            log::info!("📄 Loading configuration from {}", path.display());
            load_file(path)?
        }
        None => CliArgs::default(),
    };
    resolve_with_file(args, file)
}

/// Merge CLI/env arguments over file values, then defaults, then validate
pub fn resolve_with_file(args: CliArgs, file: CliArgs) -> Result<Config> {
    let defaults = Config::default();
    let args = args.or(file);

    let network = args.network.unwrap_or(defaults.network);
    let rpc_url = args
        .rpc_url
        .unwrap_or_else(|| network.fullnode_url().to_string());
    validate_url(&rpc_url, "SUI_RPC_URL")?;

    let package_id = parse_id(args.package_id, DEFAULT_PACKAGE_ID, "GASCOVER_PACKAGE_ID")?;
    let book_id = parse_id(args.book_id, DEFAULT_BOOK_ID, "GASCOVER_BOOK_ID")?;
    let oracle_id = parse_id(args.oracle_id, DEFAULT_ORACLE_ID, "GASCOVER_ORACLE_ID")?;

    let rpc_timeout_ms = validate_in_range(
        args.rpc_timeout_ms.unwrap_or(defaults.rpc_timeout_ms),
        1000,
        60000,
        "RPC_TIMEOUT_MS",
    )?;
    let rpc_retries = validate_in_range(
        args.rpc_retries.unwrap_or(defaults.rpc_retries),
        0,
        10,
        "RPC_RETRIES",
    )?;
    let page_size = validate_in_range(
        args.page_size.unwrap_or(defaults.page_size),
        1,
        1000,
        "PAGE_SIZE",
    )?;
    let view_id_window = validate_in_range(
        args.view_id_window.unwrap_or(defaults.view_id_window),
        1,
        1000,
        "VIEW_ID_WINDOW",
    )?;
    let finality_timeout_ms = validate_in_range(
        args.finality_timeout_ms.unwrap_or(defaults.finality_timeout_ms),
        1000,
        300_000,
        "FINALITY_TIMEOUT_MS",
    )?;
    let finality_poll_ms = validate_in_range(
        args.finality_poll_ms.unwrap_or(defaults.finality_poll_ms),
        50,
        10000,
        "FINALITY_POLL_MS",
    )?;

    Ok(Config {
        network,
        rpc_url,
        package_id,
        book_id,
        oracle_id,
        clock_id: defaults.clock_id,
        rpc_timeout_ms,
        rpc_retries,
        page_size,
        view_id_window,
        finality_timeout_ms,
        finality_poll_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_parsing() {
        assert_eq!("testnet".parse::<Network>().unwrap(), Network::Testnet);
        assert_eq!("LOCAL".parse::<Network>().unwrap(), Network::Localnet);
        assert!("moonnet".parse::<Network>().is_err());
    }

    #[test]
    fn defaults_resolve_to_testnet_deployment() {
        let cfg = resolve_with_file(CliArgs::default(), CliArgs::default()).unwrap();
        assert_eq!(cfg.network, Network::Testnet);
        assert_eq!(cfg.rpc_url, "https://fullnode.testnet.sui.io:443");
        assert_eq!(cfg.chain(), "sui:testnet");
        assert_eq!(cfg.clock_id.to_string(), format!("0x{:0>64}", "6"));
        assert_eq!(cfg.book_id.to_string(), DEFAULT_BOOK_ID);
    }

    #[test]
    fn cli_beats_file_beats_defaults() {
        let file: CliArgs = toml::from_str(
            r#"
            network = "mainnet"
            rpc_url = "https://file.example"
            page_size = 25
            "#,
        )
        .unwrap();
        let args = CliArgs {
            rpc_url: Some("https://cli.example".into()),
            ..CliArgs::default()
        };
        let cfg = resolve_with_file(args, file).unwrap();
        assert_eq!(cfg.network, Network::Mainnet);
        assert_eq!(cfg.rpc_url, "https://cli.example");
        assert_eq!(cfg.page_size, 25);
        assert_eq!(cfg.chain(), "sui:mainnet");
    }

    #[test]
    fn network_without_override_uses_its_fullnode() {
        let args = CliArgs {
            network: Some(Network::Devnet),
            ..CliArgs::default()
        };
        let cfg = resolve_with_file(args, CliArgs::default()).unwrap();
        assert_eq!(cfg.rpc_url, Network::Devnet.fullnode_url());
    }

    #[test]
    fn rejects_out_of_range_and_bad_values() {
        let args = CliArgs {
            page_size: Some(0),
            ..CliArgs::default()
        };
        assert!(resolve_with_file(args, CliArgs::default()).is_err());

        let args = CliArgs {
            rpc_url: Some("ftp://nope".into()),
            ..CliArgs::default()
        };
        assert!(resolve_with_file(args, CliArgs::default()).is_err());

        let args = CliArgs {
            book_id: Some("0xnothex".into()),
            ..CliArgs::default()
        };
        assert!(resolve_with_file(args, CliArgs::default()).is_err());
    }
}
