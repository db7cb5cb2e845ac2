//! solrpc CLI — priority fees and live transaction streams from the terminal.
//!
//! Usage:
//! ```bash
//! # Priority fee estimate for a set of accounts (Helius)
//! solrpc fee --account JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4 --all-levels
//!
//! # Stream transactions touching an account (Helius enhanced websockets)
//! solrpc subscribe --account JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4 --count 5
//!
//! # Same, through Syndica ChainStream
//! solrpc chainstream --account JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4
//! ```

mod logging;

use std::env;
use std::process;

use anyhow::{anyhow, bail, Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use solrpc_core::{Commitment, Encoding, TransactionDetails};
use solrpc_http::HttpRpcClient;
use solrpc_providers::helius::{self, FeeTarget, GetPriorityFeeEstimateOpts, PriorityLevel};
use solrpc_providers::{syndica, Cluster};
use solrpc_ws::{
    Subscription, TransactionSubscribeFilter, TransactionSubscribeOpts, WsClientConfig,
    WsRpcClient,
};

use logging::{init_tracing, LogConfig};

const HELIUS_KEY_ENV: &str = "HELIUS_API_KEY";
const SYNDICA_KEY_ENV: &str = "SYNDICA_API_KEY";

#[tokio::main]
async fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    init_tracing(&log_config(&args[2..]));

    let result = match args[1].as_str() {
        "fee" => cmd_fee(&args[2..]).await,
        "subscribe" => cmd_subscribe(&args[2..]).await,
        "chainstream" => cmd_chainstream(&args[2..]).await,
        "version" | "--version" | "-V" => {
            println!("solrpc {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn print_usage() {
    println!("solrpc {}", env!("CARGO_PKG_VERSION"));
    println!("Solana RPC fees and transaction streams\n");
    println!("USAGE:");
    println!("    solrpc <COMMAND> [FLAGS]\n");
    println!("COMMANDS:");
    println!("    fee          Priority fee estimate (getPriorityFeeEstimate)");
    println!("    subscribe    Stream transactions via transactionSubscribe");
    println!("    chainstream  Stream transactions via Syndica ChainStream");
    println!("    version      Print version");
    println!("    help         Print this help\n");
    println!("COMMON FLAGS:");
    println!("    --url <URL>            Endpoint URL (overrides the provider URL)");
    println!("    --cluster <NAME>       mainnet | devnet             [default: mainnet]");
    println!("    --account <KEY>        Account filter, repeatable");
    println!("    --count <N>            Stop after N notifications");
    println!("    --log-level <LEVEL>    trace | debug | info | warn | error");
    println!("    --log-json             JSON log lines on stderr\n");
    println!("FEE FLAGS:");
    println!("    --tx <DATA>            Serialized transaction instead of accounts");
    println!("    --level <LEVEL>        min | low | medium | high | veryHigh | unsafeMax");
    println!("    --all-levels           Return every priority level");
    println!("    --recommended          Return the recommended fee\n");
    println!("SUBSCRIBE FLAGS:");
    println!("    --commitment <LEVEL>   processed | confirmed | finalized");
    println!("    --encoding <ENC>       base58 | base64 | base64+zstd");
    println!("    --details <LEVEL>      full | signatures | accounts | none");
    println!("    --vote / --failed      Include vote / failed transactions\n");
    println!("CHAINSTREAM FLAGS:");
    println!("    --exclude-votes        Drop vote transactions");
    println!("    --verified             Only verified transactions\n");
    println!("ENVIRONMENT:");
    println!("    {HELIUS_KEY_ENV}         API key for fee / subscribe");
    println!("    {SYNDICA_KEY_ENV}        API key for chainstream");
}

// ─── Commands ─────────────────────────────────────────────────────────────────

async fn cmd_fee(args: &[String]) -> Result<()> {
    let cluster = cluster(args)?;
    let url = match parse_flag(args, "--url") {
        Some(url) => url,
        None => {
            let key = api_key(args, "--helius-key", HELIUS_KEY_ENV)?;
            helius::http_url(&key, cluster)
                .ok_or_else(|| anyhow!("Helius does not serve {cluster}"))?
        }
    };
    let client = HttpRpcClient::default_for(url)?;

    let accounts = parse_flags(args, "--account");
    let tx = parse_flag(args, "--tx");
    let target = match &tx {
        Some(tx) => FeeTarget::Transaction(tx),
        None if !accounts.is_empty() => FeeTarget::Accounts(&accounts),
        None => bail!("--account or --tx is required"),
    };

    let opts = GetPriorityFeeEstimateOpts {
        priority_level: parse_flag(args, "--level")
            .map(|l| l.parse::<PriorityLevel>())
            .transpose()
            .map_err(|e| anyhow!(e))?,
        recommended: has_flag(args, "--recommended").then_some(true),
        include_all_priority_fee_levels: has_flag(args, "--all-levels").then_some(true),
        transaction_encoding: parse_encoding(args)?,
    };

    let estimate = helius::get_priority_fee_estimate(&client, target, Some(&opts))
        .await
        .context("getPriorityFeeEstimate failed")?;
    println!("{}", serde_json::to_string_pretty(&estimate)?);
    Ok(())
}

async fn cmd_subscribe(args: &[String]) -> Result<()> {
    let cluster = cluster(args)?;
    let url = match parse_flag(args, "--url") {
        Some(url) => url,
        None => {
            let key = api_key(args, "--helius-key", HELIUS_KEY_ENV)?;
            helius::atlas_ws_url(&key, cluster)
                .ok_or_else(|| anyhow!("Helius does not serve {cluster}"))?
        }
    };

    let filter = TransactionSubscribeFilter {
        vote: has_flag(args, "--vote"),
        failed: has_flag(args, "--failed"),
        signature: parse_flag(args, "--signature"),
        account_include: parse_flags(args, "--account"),
        account_exclude: parse_flags(args, "--exclude"),
        account_required: parse_flags(args, "--require"),
    };
    let opts = TransactionSubscribeOpts {
        commitment: parse_flag(args, "--commitment")
            .map(|c| parse_wire_name::<Commitment>(&c))
            .transpose()?,
        encoding: parse_encoding(args)?,
        transaction_details: parse_flag(args, "--details")
            .map(|d| parse_wire_name::<TransactionDetails>(&d))
            .transpose()?,
        rewards: None,
        max_supported_transaction_version: Some(0),
    };

    let client = WsRpcClient::connect(url, WsClientConfig::default()).await?;
    let mut sub = client.transaction_subscribe(&filter, Some(&opts)).await?;
    info!(subscription = %sub.id(), "transactionSubscribe active");

    let outcome = stream_results(&mut sub, parse_count(args)?).await;
    sub.unsubscribe().await?;
    client.close().await;
    outcome
}

async fn cmd_chainstream(args: &[String]) -> Result<()> {
    let url = match parse_flag(args, "--url") {
        Some(url) => url,
        None => syndica::ws_url(&api_key(args, "--syndica-key", SYNDICA_KEY_ENV)?),
    };
    let params = syndica::mainnet_transactions(
        &parse_flags(args, "--account"),
        has_flag(args, "--exclude-votes"),
    )
    .verified(has_flag(args, "--verified"));

    let client = WsRpcClient::connect(url, WsClientConfig::default()).await?;
    let mut sub = client.syndica_transaction_subscribe(Some(&params)).await?;
    info!(subscription = %sub.id(), "chainstream.transactionsSubscribe active");

    let outcome = stream_results(&mut sub, parse_count(args)?).await;
    sub.unsubscribe().await?;
    client.close().await;
    outcome
}

/// Print each result as a JSON line until `count` results, Ctrl-C, or the
/// subscription ends.
async fn stream_results<T: Serialize>(sub: &mut Subscription<T>, count: Option<u64>) -> Result<()> {
    let mut received = 0u64;
    loop {
        tokio::select! {
            next = sub.recv() => match next {
                Ok(result) => {
                    println!("{}", serde_json::to_string(&result)?);
                    received += 1;
                    if count.is_some_and(|c| received >= c) {
                        return Ok(());
                    }
                }
                Err(e) if e.is_terminal() => return Err(e.into()),
                Err(e) => warn!(error = %e, "skipping notification"),
            },
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

// ─── Flags ────────────────────────────────────────────────────────────────────

fn parse_flag(args: &[String], flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.get(pos + 1).cloned()
}

/// Every value of a repeatable flag; comma-separated values are split.
fn parse_flags(args: &[String], flag: &str) -> Vec<String> {
    args.windows(2)
        .filter(|w| w[0] == flag)
        .flat_map(|w| w[1].split(','))
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|a| a == flag)
}

fn log_config(args: &[String]) -> LogConfig {
    let mut config = LogConfig::default();
    if let Some(level) = parse_flag(args, "--log-level") {
        config.level = level;
    }
    config.json = has_flag(args, "--log-json");
    config
}

fn api_key(args: &[String], flag: &str, var: &str) -> Result<String> {
    parse_flag(args, flag)
        .or_else(|| env::var(var).ok().filter(|k| !k.is_empty()))
        .ok_or_else(|| anyhow!("{flag}, {var} or --url is required"))
}

fn cluster(args: &[String]) -> Result<Cluster> {
    parse_flag(args, "--cluster")
        .map(|c| c.parse::<Cluster>().map_err(|e| anyhow!(e)))
        .transpose()
        .map(Option::unwrap_or_default)
}

fn parse_count(args: &[String]) -> Result<Option<u64>> {
    parse_flag(args, "--count")
        .map(|c| c.parse::<u64>().with_context(|| format!("invalid --count: {c}")))
        .transpose()
}

fn parse_encoding(args: &[String]) -> Result<Option<Encoding>> {
    parse_flag(args, "--encoding")
        .map(|e| e.parse::<Encoding>().map_err(|e| anyhow!(e)))
        .transpose()
}

/// Parse a value by its JSON wire name, e.g. `confirmed`.
fn parse_wire_name<T: serde::de::DeserializeOwned>(name: &str) -> Result<T> {
    serde_json::from_value(serde_json::Value::String(name.to_string()))
        .with_context(|| format!("unknown value: {name}"))
}
