use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Cell, Table};
use configuration::{load_config, Config, StopPolicyKind, StrategyId};
use engine::{MarketEvent, StrategyController};
use executor::{Account, Broker, PaperBroker};
use rust_decimal::Decimal;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// The main entry point for the Candlewick controller.
#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; CANDLEWICK__* may come from the real environment.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Check(args) => handle_check(args),
        Commands::Paper(args) => handle_paper(args).await,
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Candlestick-pattern position controller for one instrument.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file and print the resolved parameters.
    Check(CheckArgs),
    /// Run the controller against a paper account, reading market events as
    /// JSON lines from stdin and writing controller events as JSON lines to stdout.
    Paper(PaperArgs),
}

#[derive(Parser)]
struct CheckArgs {
    /// Path to the TOML configuration file.
    #[arg(long, short)]
    config: PathBuf,
}

#[derive(Parser)]
struct PaperArgs {
    /// Path to the TOML configuration file.
    #[arg(long, short)]
    config: PathBuf,

    /// Opening balance of the paper account.
    #[arg(long, default_value = "10000")]
    starting_balance: Decimal,

    /// Overrides `strategy.id` from the configuration file.
    #[arg(long, value_enum)]
    strategy: Option<StrategyId>,

    /// Overrides `stops.policy` from the configuration file.
    #[arg(long, value_enum)]
    stop_policy: Option<StopPolicyKind>,

    /// Directory for daily rotated log files. Logs go to stderr only when omitted.
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

// ==============================================================================
// Logging
// ==============================================================================

/// Logs to stderr, plus a daily rotated file under `log_dir` when given.
/// The returned guard must live until the program exits so the file writer flushes.
fn init_logging(log_dir: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    let stderr = fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));

    let (file, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "candlewick.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stderr)
        .with(file)
        .try_init()
        .context("Failed to install the tracing subscriber")?;
    Ok(guard)
}

// ==============================================================================
// Check Command
// ==============================================================================

fn handle_check(args: CheckArgs) -> Result<()> {
    let config = load_config(&args.config)
        .with_context(|| format!("Invalid configuration in {}", args.config.display()))?;
    println!("{}", parameters_table(&config));
    Ok(())
}

fn parameters_table(config: &Config) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Parameter", "Value"]);

    let rows: Vec<(&str, String)> = vec![
        ("symbol", config.instrument.symbol.clone()),
        ("point", config.instrument.point.to_string()),
        ("point value", config.instrument.point_value.to_string()),
        ("bar period (s)", config.instrument.period_secs.to_string()),
        ("strategy", format!("{:?}", config.strategy.id)),
        ("magic", config.strategy.magic.to_string()),
        ("lot size", config.orders.lot_size.to_string()),
        ("slippage (points)", config.orders.slippage_points.to_string()),
        ("stop loss (points)", config.orders.stop_loss_points.to_string()),
        ("take profit (points)", config.orders.take_profit_points.to_string()),
        ("stop policy", format!("{:?}", config.stop_policy())),
        ("holding bars", config.exits.holding_bars.to_string()),
        ("profit target (points)", config.exits.profit_target_points.to_string()),
        ("minimum equity", config.risk.minimum_equity.to_string()),
        ("max loss (%)", config.risk.max_loss_pct.to_string()),
    ];
    for (name, value) in rows {
        table.add_row(vec![Cell::new(name), Cell::new(value)]);
    }
    table
}

// ==============================================================================
// Paper Command
// ==============================================================================

async fn handle_paper(args: PaperArgs) -> Result<()> {
    let _guard = init_logging(args.log_dir.as_ref())?;

    let mut config = load_config(&args.config)
        .with_context(|| format!("Invalid configuration in {}", args.config.display()))?;
    if let Some(id) = args.strategy {
        config.strategy.id = id;
    }
    if let Some(policy) = args.stop_policy {
        config.stops.policy = policy;
    }
    config.validate()?;

    if args.starting_balance <= Decimal::ZERO {
        anyhow::bail!("--starting-balance must be greater than 0");
    }
    let contract_size = config.instrument.point_value / config.instrument.point;
    let broker = Arc::new(PaperBroker::new(args.starting_balance, contract_size));
    let symbol = config.instrument.symbol.clone();
    let magic = config.strategy.magic;

    let (events_tx, mut events_rx) = broadcast::channel(1024);
    let mut controller = StrategyController::new(config, broker.clone(), broker.clone())
        .await?
        .with_quote_sink(broker.clone())
        .with_event_sink(events_tx);

    let printer = tokio::spawn(async move {
        loop {
            match events_rx.recv().await {
                Ok(event) => match event.to_json() {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::error!(error = %e, "Failed to encode event"),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event printer fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // A plain thread so a pending stdin read never holds up shutdown.
    let (market_tx, market_rx) = mpsc::channel(1024);
    std::thread::spawn(move || {
        for (index, line) in std::io::stdin().lock().lines().enumerate() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to read stdin");
                    break;
                }
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match line.parse::<MarketEvent>() {
                Ok(event) => {
                    if market_tx.blocking_send(event).is_err() {
                        break;
                    }
                }
                Err(e) => tracing::warn!(line = index + 1, error = %e, "Skipping malformed market event"),
            }
        }
    });

    tracing::info!(%symbol, %magic, balance = %args.starting_balance, "Paper session started");
    controller.run(market_rx).await?;
    let halted = controller.is_halted();
    // Dropping the controller closes the event channel and ends the printer.
    drop(controller);
    printer.await?;

    let positions = broker.list_positions(&symbol, magic).await?;
    let mut table = Table::new();
    table.load_preset(UTF8_FULL).set_header(vec!["Balance", "Equity", "Open positions", "Halted"]);
    table.add_row(vec![
        Cell::new(broker.balance().await?.round_dp(2)),
        Cell::new(broker.equity().await?.round_dp(2)),
        Cell::new(positions.len()),
        Cell::new(halted),
    ]);
    eprintln!("{}", table);

    let pnl = broker.equity().await? - args.starting_balance;
    if pnl < Decimal::ZERO {
        tracing::info!(%pnl, "Paper session finished with a loss");
    } else {
        tracing::info!(%pnl, "Paper session finished");
    }
    Ok(())
}
