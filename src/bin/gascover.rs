// Read-only command line client for the gas insurance marketplace

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::sync::Arc;

use gascover::{
    config::{self, CliArgs},
    funding,
    ledger::{HttpLedgerClient, LedgerClient, SUI_COIN_TYPE},
    projection::{EntityKind, Offers, Policies, Projection},
    reader::LedgerReader,
    types::Address,
};

#[derive(Parser, Debug)]
#[command(name = "gascover", about = "Gas-fee insurance marketplace on Sui")]
struct Cli {
    #[command(flatten)]
    config: CliArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List offers, cheapest premium first
    Offers {
        /// Extra event pages to load after the first (event fallback only)
        #[arg(long, default_value_t = 0)]
        pages: usize,
    },
    /// List policies, unexpired first
    Policies {
        #[arg(long, default_value_t = 0)]
        pages: usize,
    },
    /// Offer and policy counters
    Counts,
    /// SUI coins held by an account
    Coins {
        #[arg(long)]
        owner: Address,
    },
    /// Plan how to fund an exact amount from an account's coins
    Plan {
        #[arg(long)]
        owner: Address,
        /// Amount in MIST
        #[arg(long)]
        amount: u64,
    },
    /// Gas the oracle recorded for a policy
    ObservedGas {
        #[arg(long)]
        policy: Address,
    },
    /// Most recent oracle observations
    Observations {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Check the configured package, book and oracle exist on the network
    Verify,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn list<K: EntityKind>(reader: Arc<LedgerReader>, pages: usize) -> Result<()>
where
    K::Record: Serialize,
{
    let projection = Projection::<K>::new(reader);
    projection.refresh().await;
    for _ in 0..pages {
        if !projection.has_more() {
            break;
        }
        projection.load_more().await;
    }
    if let Some(err) = projection.error() {
        log::warn!("⚠️ {err}");
    }
    print_json(&projection.items())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (safe to ignore if not found)
    let _ = dotenvy::dotenv();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let cfg = config::resolve(cli.config).context("Failed to load configuration")?;
    cfg.print_summary();

    let client = Arc::new(HttpLedgerClient::new(&cfg));
    let reader = Arc::new(LedgerReader::new(client.clone(), cfg));

    match cli.command {
        Command::Offers { pages } => list::<Offers>(reader, pages).await?,
        Command::Policies { pages } => list::<Policies>(reader, pages).await?,
        Command::Counts => {
            let (offers, policies) = futures::join!(reader.count_offers(), reader.count_policies());
            print_json(&serde_json::json!({ "offers": offers, "policies": policies }))?;
        }
        Command::Coins { owner } => {
            let coins = client
                .get_coins(owner, SUI_COIN_TYPE, funding::COIN_QUERY_LIMIT)
                .await
                .context("Failed to query coins")?;
            print_json(&coins)?;
        }
        Command::Plan { owner, amount } => {
            let plan = funding::plan_for_owner(client.as_ref(), owner, amount).await?;
            print_json(&plan)?;
        }
        Command::ObservedGas { policy } => {
            print_json(&reader.observed_gas(policy).await)?;
        }
        Command::Observations { limit } => {
            let page = reader.observation_events_page(None, limit).await;
            print_json(&page.items)?;
        }
        Command::Verify => {
            let check = reader.verify_config().await?;
            print_json(&check)?;
            if !check.is_ok() {
                anyhow::bail!("configured objects are missing on {}", reader.config().network);
            }
        }
    }

    Ok(())
}
