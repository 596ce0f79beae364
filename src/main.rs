use clap::{Parser, Subcommand};
use colored::*;
use comfy_table::{presets::UTF8_FULL, Table};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use yrt_dex::{flows, utils, Config, DexClient, Quote, Result};

#[derive(Parser)]
#[command(name = "yrtdex")]
#[command(about = "YRT DEX client - pools, quotes, swaps and yield operations", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output as JSON
    #[arg(short, long, global = true)]
    json: bool,

    /// Signer private key (writes only)
    #[arg(long, global = true, env = "PRIVATE_KEY")]
    private_key: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List all pools deployed through the factory
    ListPools {
        /// Ignore the cached snapshot and refetch
        #[arg(long)]
        refresh: bool,
    },

    /// Resolve a token pair to its pool
    FindPool {
        /// First token address
        token_a: String,

        /// Second token address
        token_b: String,
    },

    /// Quote a swap without submitting it
    Quote {
        /// Input token address
        token_in: String,

        /// Output token address
        token_out: String,

        /// Amount to swap (decimal, in token units)
        amount: String,

        /// Slippage tolerance in basis points
        #[arg(long)]
        slippage_bps: Option<u32>,
    },

    /// Swap tokens through the router (approve first when needed)
    Swap {
        /// Input token address
        token_in: String,

        /// Output token address
        token_out: String,

        /// Amount to swap (decimal, in token units)
        amount: String,

        /// Slippage tolerance in basis points
        #[arg(long)]
        slippage_bps: Option<u32>,
    },

    /// Add liquidity to a pool (approves both tokens when needed)
    AddLiquidity {
        /// First token address
        token_a: String,

        /// Second token address
        token_b: String,

        /// Amount of the first token (decimal)
        amount_a: String,

        /// Amount of the second token (decimal)
        amount_b: String,

        /// Slippage tolerance in basis points
        #[arg(long)]
        slippage_bps: Option<u32>,
    },

    /// Create the AMM pool for a pair
    CreatePool {
        /// First token address
        token_a: String,

        /// Second token address
        token_b: String,
    },

    /// Mint test tokens to the connected account
    Faucet {
        /// Token address (defaults to the mock USD stable token)
        #[arg(long)]
        token: Option<String>,

        /// Amount to mint (decimal)
        amount: String,
    },

    /// Token balance of the connected account
    Balance {
        /// Token address
        token: String,
    },

    /// YRT series operations
    Yrt {
        #[command(subcommand)]
        action: YrtAction,
    },
}

#[derive(Subcommand)]
enum YrtAction {
    /// Deploy a new YRT series
    CreateSeries {
        name: String,
        symbol: String,

        /// Total supply (decimal, 18 decimals)
        supply: String,
    },

    /// Open a new yield period
    StartPeriod {
        /// Series address
        series: String,

        /// Period duration in seconds
        #[arg(long, default_value = "2592000")]
        duration: u64,
    },

    /// Deposit stable-token yield for a series
    DepositYield {
        /// Series address
        series: String,

        /// Amount of stable token (decimal)
        amount: String,
    },

    /// Distribute the deposited yield to holders
    Distribute {
        /// Series address
        series: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    // Load configuration
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            eprintln!("\nCheck your .env file; see .env.example for reference.");
            std::process::exit(1);
        }
    };

    // Create client: signing when a key is given, view-only otherwise
    let client = match &cli.private_key {
        Some(key) => DexClient::with_private_key(config, key),
        None => DexClient::read_only(config),
    };
    let client = match client {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{} {}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };

    let result = run(&client, cli.command, cli.json).await;

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn run(client: &DexClient, command: Commands, json: bool) -> Result<()> {
    match command {
        Commands::ListPools { refresh } => handle_list_pools(client, refresh, json).await,
        Commands::FindPool { token_a, token_b } => {
            handle_find_pool(client, &token_a, &token_b, json).await
        }
        Commands::Quote {
            token_in,
            token_out,
            amount,
            slippage_bps,
        } => handle_quote(client, &token_in, &token_out, &amount, slippage_bps, json).await,
        Commands::Swap {
            token_in,
            token_out,
            amount,
            slippage_bps,
        } => handle_swap(client, &token_in, &token_out, &amount, slippage_bps, json).await,
        Commands::AddLiquidity {
            token_a,
            token_b,
            amount_a,
            amount_b,
            slippage_bps,
        } => {
            handle_add_liquidity(client, &token_a, &token_b, &amount_a, &amount_b, slippage_bps)
                .await
        }
        Commands::CreatePool { token_a, token_b } => {
            let a = utils::parse_address(&token_a)?;
            let b = utils::parse_address(&token_b)?;
            let tx = client.create_pool(a, b).await?;
            print_tx(client, "Pool Created", tx);
            Ok(())
        }
        Commands::Faucet { token, amount } => handle_faucet(client, token.as_deref(), &amount).await,
        Commands::Balance { token } => handle_balance(client, &token, json).await,
        Commands::Yrt { action } => handle_yrt(client, action).await,
    }
}

async fn handle_list_pools(client: &DexClient, refresh: bool, json: bool) -> Result<()> {
    let snapshot = if refresh {
        client.refresh_pools().await?
    } else {
        client.list_pools().await?
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&snapshot.pools)
                .map_err(|e| yrt_dex::DexError::Other(anyhow::anyhow!("JSON error: {}", e)))?
        );
        return Ok(());
    }

    if snapshot.pools.is_empty() {
        println!("\n{}", "No pools deployed yet".bright_yellow().bold());
        println!();
        return Ok(());
    }

    println!("\n{}", "━".repeat(60).bright_cyan());
    println!(
        "  {} - {} pools at block {}",
        "Pools".bright_cyan().bold(),
        snapshot.pools.len().to_string().bright_yellow().bold(),
        snapshot.block_number
    );
    println!("{}", "━".repeat(60).bright_cyan());
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Pool", "Token0", "Token1", "Reserve0", "Reserve1"]);

    for pool in snapshot.pools.iter() {
        let info0 = client.token_info(pool.token0).await;
        let info1 = client.token_info(pool.token1).await;
        table.add_row(vec![
            utils::short_address(&pool.address),
            format!("{} {}", info0.symbol, utils::short_address(&pool.token0)),
            format!("{} {}", info1.symbol, utils::short_address(&pool.token1)),
            utils::format_token_amount(pool.reserve0, info0.decimals),
            utils::format_token_amount(pool.reserve1, info1.decimals),
        ]);
    }

    println!("{}", table);
    println!();
    Ok(())
}

async fn handle_find_pool(
    client: &DexClient,
    token_a: &str,
    token_b: &str,
    json: bool,
) -> Result<()> {
    let a = utils::parse_address(token_a)?;
    let b = utils::parse_address(token_b)?;

    match client.find_pool(a, b).await? {
        Some(pool) => {
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&pool)
                        .map_err(|e| yrt_dex::DexError::Other(anyhow::anyhow!("JSON error: {}", e)))?
                );
            } else {
                println!("\n{} {:#x}", "Pool:".bright_green().bold(), pool.address);
                println!("  token0:   {:#x}", pool.token0);
                println!("  token1:   {:#x}", pool.token1);
                println!("  reserve0: {}", pool.reserve0);
                println!("  reserve1: {}", pool.reserve1);
                println!("  fee:      {} bps", pool.fee_bps);
                println!();
            }
        }
        None => {
            println!("\n{}", "No pool exists for this pair".bright_yellow().bold());
            println!(
                "  {} yrtdex create-pool {} {}",
                "Tip:".bright_black(),
                token_a,
                token_b
            );
            println!();
        }
    }
    Ok(())
}

async fn handle_quote(
    client: &DexClient,
    token_in: &str,
    token_out: &str,
    amount: &str,
    slippage_bps: Option<u32>,
    json: bool,
) -> Result<()> {
    let token_in = utils::parse_address(token_in)?;
    let token_out = utils::parse_address(token_out)?;

    let info_in = client.token_info(token_in).await;
    let info_out = client.token_info(token_out).await;
    let amount_in = utils::parse_token_amount(amount, info_in.decimals)?;

    let quote = client
        .quote(token_in, token_out, amount_in, slippage_bps)
        .await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&quote)
                .map_err(|e| yrt_dex::DexError::Other(anyhow::anyhow!("JSON error: {}", e)))?
        );
    } else {
        print_quote(&quote, &info_in, &info_out);
    }
    Ok(())
}

async fn handle_swap(
    client: &DexClient,
    token_in: &str,
    token_out: &str,
    amount: &str,
    slippage_bps: Option<u32>,
    json: bool,
) -> Result<()> {
    let token_in = utils::parse_address(token_in)?;
    let token_out = utils::parse_address(token_out)?;

    let info_in = client.token_info(token_in).await;
    let info_out = client.token_info(token_out).await;
    let amount_in = utils::parse_token_amount(amount, info_in.decimals)?;

    let outcome = client
        .swap(flows::SwapParams {
            token_in,
            token_out,
            amount_in,
            slippage_bps,
        })
        .await?;

    if json {
        let output = serde_json::json!({
            "amount_in": outcome.quote.amount_in.to_string(),
            "amount_out": outcome.quote.amount_out.to_string(),
            "verified_out": outcome.verified_out.to_string(),
            "minimum_received": outcome.quote.minimum_received.to_string(),
            "approve_tx": outcome.approve_tx.map(|h| format!("{:#x}", h)),
            "swap_tx": format!("{:#x}", outcome.swap_tx),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output)
                .map_err(|e| yrt_dex::DexError::Other(anyhow::anyhow!("JSON error: {}", e)))?
        );
        return Ok(());
    }

    print_quote(&outcome.quote, &info_in, &info_out);
    if let Some(approve_tx) = outcome.approve_tx {
        print_tx(client, "Approved", approve_tx);
    }
    print_tx(client, "Swap Confirmed", outcome.swap_tx);
    Ok(())
}

async fn handle_add_liquidity(
    client: &DexClient,
    token_a: &str,
    token_b: &str,
    amount_a: &str,
    amount_b: &str,
    slippage_bps: Option<u32>,
) -> Result<()> {
    let token_a = utils::parse_address(token_a)?;
    let token_b = utils::parse_address(token_b)?;
    let info_a = client.token_info(token_a).await;
    let info_b = client.token_info(token_b).await;

    let outcome = client
        .add_liquidity(flows::AddLiquidityParams {
            token_a,
            token_b,
            amount_a: utils::parse_token_amount(amount_a, info_a.decimals)?,
            amount_b: utils::parse_token_amount(amount_b, info_b.decimals)?,
            slippage_bps,
        })
        .await?;

    if let Some(tx) = outcome.approve_a_tx {
        print_tx(client, &format!("Approved {}", info_a.symbol), tx);
    }
    if let Some(tx) = outcome.approve_b_tx {
        print_tx(client, &format!("Approved {}", info_b.symbol), tx);
    }
    print_tx(client, "Liquidity Added", outcome.liquidity_tx);
    Ok(())
}

async fn handle_faucet(client: &DexClient, token: Option<&str>, amount: &str) -> Result<()> {
    let token = match token {
        Some(t) => utils::parse_address(t)?,
        None => client.config().contracts.stable_usd,
    };
    let info = client.token_info(token).await;
    let amount = utils::parse_token_amount(amount, info.decimals)?;

    let tx = client.faucet_mint(token, amount).await?;
    print_tx(client, &format!("Minted {}", info.symbol), tx);
    Ok(())
}

async fn handle_balance(client: &DexClient, token: &str, json: bool) -> Result<()> {
    let token = utils::parse_address(token)?;
    let owner = client.session().account()?;
    let info = client.token_info(token).await;
    let balance = client.balance_of(token, owner).await?;

    if json {
        let output = serde_json::json!({
            "token": format!("{:#x}", token),
            "symbol": info.symbol,
            "balance": balance.to_string(),
            "formatted": utils::format_token_amount(balance, info.decimals),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&output)
                .map_err(|e| yrt_dex::DexError::Other(anyhow::anyhow!("JSON error: {}", e)))?
        );
    } else {
        println!(
            "\n  {} {} {}",
            "Balance:".bright_white().bold(),
            utils::format_token_amount(balance, info.decimals)
                .bright_green()
                .bold(),
            info.symbol.bright_green()
        );
        println!();
    }
    Ok(())
}

async fn handle_yrt(client: &DexClient, action: YrtAction) -> Result<()> {
    match action {
        YrtAction::CreateSeries {
            name,
            symbol,
            supply,
        } => {
            let total_supply = utils::parse_token_amount(&supply, 18)?;
            let tx = client.create_series(name, symbol, total_supply).await?;
            print_tx(client, "Series Created", tx);
        }
        YrtAction::StartPeriod { series, duration } => {
            let series = utils::parse_address(&series)?;
            let tx = client.start_new_period(series, duration).await?;
            print_tx(client, "Period Started", tx);
        }
        YrtAction::DepositYield { series, amount } => {
            let series = utils::parse_address(&series)?;
            let stable = client.config().contracts.stable_usd;
            let info = client.token_info(stable).await;
            let amount = utils::parse_token_amount(&amount, info.decimals)?;

            let outcome = client.deposit_yield(series, amount).await?;
            if let Some(tx) = outcome.approve_tx {
                print_tx(client, &format!("Approved {}", info.symbol), tx);
            }
            print_tx(client, "Yield Deposited", outcome.deposit_tx);
        }
        YrtAction::Distribute { series } => {
            let series = utils::parse_address(&series)?;
            let tx = client.distribute(series).await?;
            print_tx(client, "Yield Distributed", tx);
        }
    }
    Ok(())
}

fn print_quote(quote: &Quote, info_in: &yrt_dex::TokenInfo, info_out: &yrt_dex::TokenInfo) {
    println!();
    println!("{}", "━".repeat(60).bright_green());
    println!("  {}", "Swap Quote".bright_green().bold());
    println!("{}", "━".repeat(60).bright_green());
    println!();

    println!(
        "  {} {} {}",
        "Input:".bright_white().bold(),
        utils::format_token_amount(quote.amount_in, info_in.decimals)
            .bright_cyan()
            .bold(),
        info_in.symbol.bright_cyan()
    );
    println!(
        "  {} {} {}",
        "Output:".bright_white().bold(),
        utils::format_token_amount(quote.amount_out, info_out.decimals)
            .bright_green()
            .bold(),
        info_out.symbol.bright_green()
    );
    println!(
        "  {} {} {}",
        "Minimum:".bright_white().bold(),
        utils::format_token_amount(quote.minimum_received, info_out.decimals).bright_yellow(),
        info_out.symbol.bright_yellow()
    );
    println!();

    let impact = quote.price_impact_bps as f64 / 100.0;
    let impact_str = format!("{:.2}%", impact);
    let colored_impact = if impact < 0.5 {
        impact_str.bright_green()
    } else if impact < 1.0 {
        impact_str.bright_yellow()
    } else {
        impact_str.bright_red()
    };
    println!(
        "  {} {}",
        "Price Impact:".bright_white().bold(),
        colored_impact.bold()
    );
    println!();
}

fn print_tx(client: &DexClient, label: &str, tx: ethers::types::H256) {
    let hash = format!("{:#x}", tx);
    println!(
        "\n{} {}",
        format!("{}:", label).bright_green().bold(),
        hash.bright_cyan()
    );
    println!(
        "  {}",
        client.config().chain.tx_url(&hash).bright_black()
    );
    println!();
}
