//! FX Signal Bot
//!
//! Trades a single FX symbol from a scored set of trend and momentum
//! indicators, with ATR-based stop-loss/take-profit, a trailing stop and
//! partial profit-taking.

mod api;
mod bot;
mod error;
mod indicators;
mod models;
mod trading;

use std::fs::OpenOptions;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::api::{notifier_from_env, BridgeClient, MarketGateway, PaperGateway};
use crate::bot::{Bot, BotConfig};
use crate::trading::{lots_f64, Strategy, TradingConfig};

/// Single-symbol FX trading bot CLI.
#[derive(Parser)]
#[command(name = "fxbot")]
#[command(about = "Indicator-scored FX trading bot with ATR risk management", long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Also write the activity log to this file
    #[arg(long, global = true)]
    log_file: Option<String>,

    /// Symbol to trade
    #[arg(short, long, default_value = "EURUSD", global = true)]
    symbol: String,

    /// Bar timeframe (M1, M5, M15, M30, H1, H4, D1)
    #[arg(short, long, default_value = "M30", global = true)]
    timeframe: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the trading loop
    Run {
        /// Tick interval in seconds
        #[arg(short, long, default_value = "10")]
        interval: u64,

        /// Heartbeat notification interval in seconds
        #[arg(long, default_value = "3600")]
        heartbeat: u64,

        /// Lot size for fixed sizing
        #[arg(long, default_value = "0.10")]
        lot: Decimal,

        /// Sizing method (fixed, percent_risk)
        #[arg(long, default_value = "fixed")]
        sizing: String,

        /// Fraction of balance risked per trade with percent_risk sizing
        #[arg(long, default_value = "0.01")]
        risk_percent: f64,

        /// Votes (out of 7) needed for a trade
        #[arg(long, default_value = "4")]
        min_signals: u32,

        /// Keep trailing stops and partial closes running outside trading hours
        #[arg(long, default_value = "true", action = clap::ArgAction::Set)]
        manage_outside_window: bool,

        /// Dry run (simulate fills, don't send orders)
        #[arg(long)]
        dry_run: bool,
    },

    /// Score the latest bars once and print the decision
    Signal,

    /// Show live position, quote and account
    Status,

    /// Show current configuration
    Config,
}

fn init_logging(level: &str, log_file: Option<&str>) -> Result<()> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path))?;
            let subscriber = FmtSubscriber::builder()
                .with_max_level(log_level)
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
        None => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(log_level)
                .with_target(false)
                .finish();
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_logging(&cli.log_level, cli.log_file.as_deref())?;

    let bridge = Arc::new(BridgeClient::from_env(&cli.symbol, &cli.timeframe)?);

    match cli.command {
        Commands::Run {
            interval,
            heartbeat,
            lot,
            sizing,
            risk_percent,
            min_signals,
            manage_outside_window,
            dry_run,
        } => {
            let mut config = BotConfig {
                symbol: cli.symbol.clone(),
                timeframe: cli.timeframe.clone(),
                poll_interval_secs: interval,
                heartbeat_secs: heartbeat,
                dry_run,
                ..Default::default()
            };
            config.trading.lot = lot;
            config.trading.sizing_method = sizing;
            config.trading.risk_percent = risk_percent;
            config.strategy.min_signals = min_signals;
            config.window.manage_outside_window = manage_outside_window;

            info!(
                symbol = %config.symbol,
                timeframe = %config.timeframe,
                interval = interval,
                dry_run = dry_run,
                bridge = %bridge.base_url(),
                "Starting FX bot"
            );

            let gateway: Arc<dyn MarketGateway> = if dry_run {
                Arc::new(PaperGateway::new(bridge, config.paper_balance))
            } else {
                bridge
            };
            let notifier = notifier_from_env();

            let mut bot = Bot::new(config.clone(), gateway, notifier);
            bot.initialize()
                .await
                .context("Failed to connect to the trading terminal")?;

            println!("\n=== FX Signal Bot ===");
            println!("Symbol:           {} {}", config.symbol, config.timeframe);
            println!("Lot:              {} ({})", config.trading.lot, config.trading.sizing_method);
            println!("Polling interval: {}s", interval);
            println!("Mode: {}", if dry_run { "DRY RUN (simulated fills)" } else { "LIVE TRADING" });
            println!("\nPress Ctrl+C to stop.\n");

            if let Err(e) = bot.run().await {
                tracing::error!(error = %e, "Bot error");
            }

            // Show final stats
            println!("\n{}", bot.get_stats());
        }

        Commands::Signal => {
            let config = BotConfig::default();
            let strategy = Strategy::default_strategy();

            bridge.connect().await?;
            let bars = bridge.fetch_bars(config.bar_count).await?;
            let indicators = strategy.indicators(&bars);
            let signal = strategy.evaluate_indicators(bars.len(), &indicators);

            println!("\n=== {} {} ({} bars) ===", cli.symbol, cli.timeframe, bars.len());
            if let Some(last) = bars.last() {
                println!("Last bar:   {} close {:.5}", last.time, last.close);
            }

            match indicators.snapshot() {
                Ok(snap) => {
                    println!("\n--- Trend ---");
                    println!("EMA fast/slow:  {:.5} / {:.5}", snap.ema_fast, snap.ema_slow);
                    println!("SMA long:       {:.5}", snap.sma_long);
                    println!("MACD hist:      {:.6}", snap.macd_hist);

                    println!("\n--- Momentum ---");
                    println!("RSI slow/fast:  {:.1} / {:.1}", snap.rsi_slow, snap.rsi_fast);
                    println!("Stoch %K/%D:    {:.1} / {:.1}", snap.stoch_k, snap.stoch_d);
                    println!("Williams %R:    {:.1}", snap.williams_r);

                    println!("\n--- Volatility ---");
                    println!("ATR / average:  {:.5} / {:.5}", snap.atr, snap.atr_average);
                    println!(
                        "Bollinger:      {:.5} / {:.5} / {:.5}",
                        snap.bb_upper, snap.bb_middle, snap.bb_lower
                    );
                }
                Err(e) => println!("\nIndicators unavailable: {}", e),
            }

            println!("\n--- Decision ---");
            println!("Bullish/Bearish: {} / {}", signal.bullish, signal.bearish);
            println!("Decision:        {:?}", signal.decision);
            if let Some(veto) = &signal.veto {
                println!("Vetoed:          {}", veto);
            }
        }

        Commands::Status => {
            bridge.connect().await?;
            let quote = bridge.fetch_quote().await?;
            let symbol = bridge.symbol_constraints().await?;
            let balance = bridge.account_balance().await?;
            let position = bridge.fetch_open_position().await?;

            println!("\n=== {} ===", bridge.symbol());
            println!("Bid/Ask:    {:.5} / {:.5}", quote.bid, quote.ask);
            println!("Spread:     {:.1} points", quote.spread() / symbol.point);
            println!("Volume:     {} - {} step {}", symbol.min_vol, symbol.max_vol, symbol.step_vol);
            println!("Balance:    {:.2}", balance);

            println!("\n=== Position ===");
            match position {
                Some(pos) => {
                    let pips = pos.profit_distance(&quote) / TradingConfig::default().pip_size;
                    println!("Ticket:     {}", pos.ticket.unwrap_or_default());
                    println!("Side:       {:?}", pos.side);
                    println!("Volume:     {:.2} (opened {:.2})", lots_f64(pos.volume), lots_f64(pos.initial_volume));
                    println!("Entry:      {:.5}", pos.entry_price);
                    let level = |p: Option<f64>| p.map_or("-".to_string(), |p| format!("{:.5}", p));
                    println!("Stop Loss:  {}", level(pos.stop_loss));
                    println!("Take Prof:  {}", level(pos.take_profit));
                    println!("Profit:     {:.1} pips", pips);
                }
                None => println!("Flat"),
            }
        }

        Commands::Config => {
            let config = BotConfig {
                symbol: cli.symbol.clone(),
                timeframe: cli.timeframe.clone(),
                ..Default::default()
            };
            let t = &config.trading;
            let s = &config.strategy;
            let w = &config.window;

            println!("\n=== Bot Configuration ===\n");
            println!("Symbol:               {} {}", config.symbol, config.timeframe);
            println!("Bars:                 {} (min {})", config.bar_count, s.min_bars);
            println!("Tick / Heartbeat:     {}s / {}s", config.poll_interval_secs, config.heartbeat_secs);
            println!("Bar Cache:            {}s", config.bar_cache_secs);
            println!("Reconnect Backoff:    {}s", config.reconnect_backoff_secs);
            println!("Retry:                {} attempts, {}ms", config.retry.max_attempts, config.retry.delay_ms);

            println!("\nTrading Window:");
            println!("  Hours:              {:02}:00 - {:02}:00", w.start_hour, w.end_hour);
            println!("  Days:               {:?}", w.weekdays);
            println!("  Manage Outside:     {}", w.manage_outside_window);

            println!("\nPosition Sizing:");
            println!("  Method:             {}", t.sizing_method);
            println!("  Lot:                {}", t.lot);
            println!("  Risk Percent:       {}%", t.risk_percent * 100.0);

            println!("\nRisk Management:");
            println!("  Stop Loss:          ATR x {} in [{}, {}] pips", t.sl_atr_multiplier, t.min_sl_pips, t.max_sl_pips);
            println!("  Take Profit:        ATR x {} in [{}, {}] pips", t.tp_atr_multiplier, t.min_tp_pips, t.max_tp_pips);
            println!("  Trailing Stop:      ATR x {} (min {} pips)", t.trailing_atr_multiplier, t.min_trailing_pips);
            println!("  Partial Close:      {}% above {} pips", t.partial_close_fraction * Decimal::from(100), t.partial_close_trigger_pips);

            println!("\n=== Strategy Configuration ===\n");
            println!("Min Signals:          {} of 7", s.min_signals);
            println!("ATR Floor:            {}", s.min_atr);
            println!("ATR Spike Factor:     {}x", s.atr_spike_factor);
            println!("RSI Band:             ({}, {}) bull > {} bear < {}", s.rsi_oversold, s.rsi_overbought, s.rsi_bullish, s.rsi_bearish);
            println!("Fast RSI:             bull > {} bear < {}", s.rsi_fast_bullish, s.rsi_fast_bearish);
            println!("Periods:              {:?}", s.indicators);
        }
    }

    Ok(())
}
