//! Bot runner: the fixed-cadence control loop.
//!
//! Each tick, in order:
//! - Re-query the live position
//! - Send the heartbeat when due
//! - Check the trading window
//! - Trail the stop and take partial profit on an open position
//! - Score a fresh signal and act on it
//!
//! Losing the terminal pauses the loop, reconnects and rehydrates.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::api::{MarketGateway, Notifier};
use crate::error::TradeError;
use crate::indicators::IndicatorSet;
use crate::models::{BarSeries, SignalDecision};
use crate::trading::{
    ControllerState, ControllerStats, PositionController, RetryPolicy, Strategy, StrategyConfig,
    TradingConfig, TradingWindow,
};

/// Bot configuration. Fixed once the bot starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub symbol: String,

    /// Terminal timeframe code (M1, M5, M15, M30, H1, ...)
    pub timeframe: String,

    /// Bars requested per fetch
    pub bar_count: usize,

    /// Control loop cadence (seconds)
    pub poll_interval_secs: u64,

    /// Heartbeat notification cadence (seconds)
    pub heartbeat_secs: u64,

    /// Reuse fetched bars while younger than this (seconds)
    pub bar_cache_secs: u64,

    /// Pause before reconnecting after losing the terminal (seconds)
    pub reconnect_backoff_secs: u64,

    /// Simulate execution instead of sending orders
    pub dry_run: bool,

    /// Starting balance of the simulated account
    pub paper_balance: f64,

    pub trading: TradingConfig,
    pub strategy: StrategyConfig,
    pub window: TradingWindow,
    pub retry: RetryPolicy,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            symbol: "EURUSD".to_string(),
            timeframe: "M30".to_string(),
            bar_count: 250,
            poll_interval_secs: 10,
            heartbeat_secs: 3600,
            bar_cache_secs: 1800,
            reconnect_backoff_secs: 60,
            dry_run: false,
            paper_balance: 10_000.0,
            trading: TradingConfig::default(),
            strategy: StrategyConfig::default(),
            window: TradingWindow::default(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Last fetched bar window and when it was fetched.
#[derive(Debug)]
pub struct BarCache {
    max_age: chrono::Duration,
    entry: Option<(DateTime<Utc>, BarSeries)>,
}

impl BarCache {
    pub fn new(max_age_secs: u64) -> Self {
        Self {
            max_age: chrono::Duration::seconds(max_age_secs as i64),
            entry: None,
        }
    }

    /// Cached bars, if fetched less than `max_age` before `now`.
    pub fn fresh(&self, now: DateTime<Utc>) -> Option<&BarSeries> {
        match &self.entry {
            Some((fetched_at, bars)) if now - *fetched_at < self.max_age => Some(bars),
            _ => None,
        }
    }

    pub fn store(&mut self, now: DateTime<Utc>, bars: BarSeries) {
        self.entry = Some((now, bars));
    }

    pub fn invalidate(&mut self) {
        self.entry = None;
    }
}

#[derive(Debug, Clone, Default)]
struct LoopCounters {
    ticks: u64,
    buy_signals: u64,
    sell_signals: u64,
    skipped_ticks: u64,
    reconnects: u64,
}

/// Main bot runner.
pub struct Bot {
    config: BotConfig,
    gateway: Arc<dyn MarketGateway>,
    notifier: Arc<dyn Notifier>,
    strategy: Strategy,
    controller: PositionController,
    bar_cache: BarCache,
    last_heartbeat: Option<DateTime<Utc>>,
    started_at: DateTime<Utc>,
    counters: LoopCounters,

    // Shutdown signal
    shutdown: Arc<AtomicBool>,
}

impl Bot {
    pub fn new(
        config: BotConfig,
        gateway: Arc<dyn MarketGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let controller = PositionController::new(
            gateway.clone(),
            notifier.clone(),
            config.trading.clone(),
            config.retry.clone(),
            config.symbol.clone(),
        );

        Self {
            strategy: Strategy::new(config.strategy.clone()),
            bar_cache: BarCache::new(config.bar_cache_secs),
            controller,
            gateway,
            notifier,
            last_heartbeat: None,
            started_at: Utc::now(),
            counters: LoopCounters::default(),
            shutdown: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    /// Connect, adopt the live position and announce the start.
    ///
    /// An unreachable terminal is retried after the reconnect backoff until it
    /// answers. Any other failure is returned.
    pub async fn initialize(&mut self) -> Result<(), TradeError> {
        info!(symbol = %self.config.symbol, timeframe = %self.config.timeframe, "Initializing bot...");

        loop {
            match self.connect_and_rehydrate().await {
                Ok(()) => break,
                Err(e) if e.is_fatal() => {
                    self.connectivity_lost(&e).await;
                    self.counters.reconnects += 1;
                }
                Err(e) => return Err(e),
            }
        }

        let now = Utc::now();
        self.started_at = now;
        self.last_heartbeat = Some(now);

        self.notifier.notify(&format!(
            "{} bot started on {} {}, position: {}",
            if self.config.dry_run { "Paper" } else { "Live" },
            self.config.symbol,
            self.config.timeframe,
            describe_state(self.controller.state()),
        ));
        Ok(())
    }

    /// Main run loop. Returns after Ctrl+C, once the current tick completes.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        info!(
            dry_run = self.config.dry_run,
            poll_interval = self.config.poll_interval_secs,
            "Starting bot run loop"
        );

        let mut poll_interval = interval(Duration::from_secs(self.config.poll_interval_secs));

        // Register shutdown handler
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
            shutdown.store(true, Ordering::SeqCst);
        });

        while !self.shutdown.load(Ordering::SeqCst) {
            poll_interval.tick().await;
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            if let Err(e) = self.tick().await {
                if e.is_fatal() {
                    self.recover(&e).await;
                } else {
                    self.log_skipped(&e);
                }
            }
        }

        info!("Bot stopped");
        Ok(())
    }

    /// Single iteration of the main loop at wall-clock time.
    pub async fn tick(&mut self) -> Result<(), TradeError> {
        self.tick_at(Local::now()).await
    }

    /// Single iteration of the main loop at `now`.
    pub async fn tick_at<Tz: TimeZone>(&mut self, now: DateTime<Tz>) -> Result<(), TradeError> {
        self.counters.ticks += 1;
        let now_utc = now.with_timezone(&Utc);

        // 1. Position state
        self.controller.refresh_position().await?;

        // 2. Heartbeat
        self.heartbeat_if_due(now_utc);

        // 3. Trading window
        let in_window = self.config.window.contains(&now);
        let manage = self.config.window.allows_management(&now);
        let open = self.controller.state() != ControllerState::Flat;
        if !in_window && !(open && manage) {
            debug!("Outside trading window");
            return Ok(());
        }

        let bars = self.bars(now_utc).await?;
        let indicators = self.strategy.indicators(&bars);
        let atr = latest_atr(&indicators)?;

        // 4. Open position management
        if open && manage {
            self.controller.manage_open_position(atr).await?;
        }

        // 5. Signal
        if !in_window {
            return Ok(());
        }
        let signal = self.strategy.evaluate_indicators(bars.len(), &indicators);
        match signal.decision {
            SignalDecision::Buy => self.counters.buy_signals += 1,
            SignalDecision::Sell => self.counters.sell_signals += 1,
            SignalDecision::Neutral => {}
        }
        info!(
            decision = ?signal.decision,
            bullish = signal.bullish,
            bearish = signal.bearish,
            veto = ?signal.veto,
            atr = atr,
            state = ?self.controller.state(),
            volume = %self.controller.position().volume,
            "Signal"
        );

        self.controller.act_on_signal(&signal, atr).await
    }

    async fn bars(&mut self, now: DateTime<Utc>) -> Result<BarSeries, TradeError> {
        if let Some(bars) = self.bar_cache.fresh(now) {
            return Ok(bars.clone());
        }

        let count = self.config.bar_count;
        let bars = crate::trading::with_retry(&self.config.retry, "fetch bars", || {
            self.gateway.fetch_bars(count)
        })
        .await?;
        debug!(bars = bars.len(), "Fetched bars");
        self.bar_cache.store(now, bars.clone());
        Ok(bars)
    }

    fn heartbeat_if_due(&mut self, now: DateTime<Utc>) {
        let due = match self.last_heartbeat {
            Some(last) => now - last >= chrono::Duration::seconds(self.config.heartbeat_secs as i64),
            None => true,
        };
        if !due {
            return;
        }

        self.last_heartbeat = Some(now);
        let stats = self.controller.stats();
        self.notifier.notify(&format!(
            "{} heartbeat: {}, ticks {}, opens {}, closes {}, failures {}",
            self.config.symbol,
            describe_state(self.controller.state()),
            self.counters.ticks,
            stats.opens,
            stats.closes,
            stats.failures,
        ));
    }

    async fn connect_and_rehydrate(&mut self) -> Result<(), TradeError> {
        self.gateway.connect().await?;
        self.controller.rehydrate().await
    }

    /// Notify and wait out the reconnect backoff.
    async fn connectivity_lost(&mut self, err: &TradeError) {
        error!(error = %err, backoff_secs = self.config.reconnect_backoff_secs, "Terminal lost");
        self.notifier.notify(&format!(
            "{}: {}. Reconnecting in {}s",
            self.config.symbol, err, self.config.reconnect_backoff_secs
        ));
        tokio::time::sleep(Duration::from_secs(self.config.reconnect_backoff_secs)).await;
    }

    /// Pause, reconnect and rehydrate after losing the terminal.
    ///
    /// A failed reconnect is left to the next tick, which fails fatally again
    /// and comes back here.
    async fn recover(&mut self, err: &TradeError) {
        self.connectivity_lost(err).await;
        self.counters.reconnects += 1;
        self.bar_cache.invalidate();

        match self.connect_and_rehydrate().await {
            Ok(()) => info!(state = ?self.controller.state(), "Reconnected"),
            Err(e) => warn!(error = %e, "Reconnect failed"),
        }
    }

    fn log_skipped(&mut self, err: &TradeError) {
        self.counters.skipped_ticks += 1;
        match err {
            TradeError::IndicatorUnavailable(reason) => debug!(reason = %reason, "No signal this tick"),
            TradeError::DataUnavailable(reason) => warn!(reason = %reason, "Market data unavailable, tick skipped"),
            other => warn!(error = %other, "Tick ended early"),
        }
    }

    /// Get current stats.
    pub fn get_stats(&self) -> BotStats {
        BotStats {
            symbol: self.config.symbol.clone(),
            started_at: self.started_at,
            ticks: self.counters.ticks,
            buy_signals: self.counters.buy_signals,
            sell_signals: self.counters.sell_signals,
            skipped_ticks: self.counters.skipped_ticks,
            reconnects: self.counters.reconnects,
            controller: self.controller.stats().clone(),
            state: self.controller.state(),
            is_running: !self.shutdown.load(Ordering::SeqCst),
            dry_run: self.config.dry_run,
        }
    }
}

fn latest_atr(indicators: &IndicatorSet) -> Result<f64, TradeError> {
    match indicators.atr.last() {
        Some(atr) if atr.is_finite() => Ok(*atr),
        _ => Err(TradeError::IndicatorUnavailable(
            "atr has no value for the latest bar".to_string(),
        )),
    }
}

fn describe_state(state: ControllerState) -> String {
    match state {
        ControllerState::Flat => "flat".to_string(),
        ControllerState::Open(side) => format!("open {}", side),
    }
}

/// Bot statistics.
#[derive(Debug, Clone)]
pub struct BotStats {
    pub symbol: String,
    pub started_at: DateTime<Utc>,
    pub ticks: u64,
    pub buy_signals: u64,
    pub sell_signals: u64,
    pub skipped_ticks: u64,
    pub reconnects: u64,
    pub controller: ControllerStats,
    pub state: ControllerState,
    pub is_running: bool,
    pub dry_run: bool,
}

impl std::fmt::Display for BotStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Bot Statistics ===")?;
        writeln!(f, "Symbol:          {}", self.symbol)?;
        writeln!(f, "Started:         {}", self.started_at.format("%Y-%m-%d %H:%M:%S UTC"))?;
        writeln!(f, "Position:        {}", describe_state(self.state))?;
        writeln!(f, "Ticks:           {} (Skipped: {})", self.ticks, self.skipped_ticks)?;
        writeln!(f, "Signals:         {} buy, {} sell", self.buy_signals, self.sell_signals)?;
        writeln!(f, "Opens/Closes:    {} / {}", self.controller.opens, self.controller.closes)?;
        writeln!(f, "Trailing Moves:  {}", self.controller.modifications)?;
        writeln!(f, "Partial Closes:  {}", self.controller.partial_closes)?;
        writeln!(f, "Broker Closes:   {}", self.controller.external_closes)?;
        writeln!(f, "Failures:        {}", self.controller.failures)?;
        writeln!(f, "Reconnects:      {}", self.reconnects)?;
        writeln!(f, "Status:          {} {}",
            if self.is_running { "Running" } else { "Stopped" },
            if self.dry_run { "(Dry Run)" } else { "" })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::{long_position, trending_bars, MockGateway, RecordingNotifier};
    use crate::error::GatewayError;
    use crate::models::TradeSide;
    use rust_decimal_macros::dec;

    fn test_config() -> BotConfig {
        BotConfig {
            reconnect_backoff_secs: 0,
            retry: RetryPolicy {
                max_attempts: 2,
                delay_ms: 1,
            },
            ..Default::default()
        }
    }

    fn bot(gateway: &Arc<MockGateway>, notifier: &Arc<RecordingNotifier>) -> Bot {
        Bot::new(test_config(), gateway.clone(), notifier.clone())
    }

    /// Wednesday 2024-01-03 at `hour`:00 UTC
    fn wednesday(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 3, hour, 0, 0).unwrap()
    }

    fn saturday_noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 6, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_bar_cache_freshness() {
        let mut cache = BarCache::new(1800);
        let t0 = wednesday(12);
        assert!(cache.fresh(t0).is_none());

        cache.store(t0, trending_bars(10, 1.0));
        assert!(cache.fresh(t0 + chrono::Duration::minutes(29)).is_some());
        assert!(cache.fresh(t0 + chrono::Duration::minutes(30)).is_none());

        cache.invalidate();
        assert!(cache.fresh(t0).is_none());
    }

    #[tokio::test]
    async fn test_initialize_rehydrates_and_notifies() {
        let gateway = Arc::new(MockGateway::with_position(long_position(1.1, 1.0985, dec!(0.10))));
        let notifier = Arc::new(RecordingNotifier::default());
        let mut bot = bot(&gateway, &notifier);

        bot.initialize().await.unwrap();

        assert_eq!(*gateway.connects.lock().unwrap(), 1);
        assert_eq!(bot.get_stats().state, ControllerState::Open(TradeSide::Buy));
        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("started"));
    }

    #[tokio::test]
    async fn test_initialize_waits_for_unreachable_terminal() {
        let gateway = Arc::new(MockGateway::with_position(long_position(1.1, 1.0985, dec!(0.10))));
        gateway.script_connect(vec![
            Err(GatewayError::Unreachable("refused".into())),
            Err(GatewayError::Unreachable("refused".into())),
        ]);
        let notifier = Arc::new(RecordingNotifier::default());
        let mut bot = bot(&gateway, &notifier);

        bot.initialize().await.unwrap();

        assert_eq!(*gateway.connects.lock().unwrap(), 3);
        assert_eq!(bot.get_stats().reconnects, 2);
        assert_eq!(bot.get_stats().state, ControllerState::Open(TradeSide::Buy));
        let messages = notifier.messages();
        assert_eq!(messages.len(), 3);
        assert!(messages[0].contains("Reconnecting"));
        assert!(messages[2].contains("started"));
    }

    #[tokio::test]
    async fn test_initialize_returns_non_fatal_errors() {
        let gateway = Arc::new(MockGateway::default());
        gateway.script_connect(vec![Err(GatewayError::Rejected("invalid account".into()))]);
        let notifier = Arc::new(RecordingNotifier::default());
        let mut bot = bot(&gateway, &notifier);

        let err = bot.initialize().await.unwrap_err();

        assert!(matches!(err, TradeError::ExecutionRejected(_)));
        assert_eq!(*gateway.connects.lock().unwrap(), 1);
        assert!(notifier.messages().is_empty());
    }

    #[tokio::test]
    async fn test_rising_market_opens_long_once() {
        let gateway = Arc::new(MockGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let mut bot = bot(&gateway, &notifier);
        bot.initialize().await.unwrap();

        bot.tick_at(wednesday(12)).await.unwrap();
        assert_eq!(bot.get_stats().state, ControllerState::Open(TradeSide::Buy));

        bot.tick_at(wednesday(12) + chrono::Duration::seconds(10)).await.unwrap();
        assert_eq!(gateway.opens.lock().unwrap().len(), 1);
        assert_eq!(bot.get_stats().buy_signals, 2);

        // Second tick reused the cached bars
        assert_eq!(*gateway.bar_fetches.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_no_entries_outside_window() {
        let gateway = Arc::new(MockGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let mut bot = bot(&gateway, &notifier);
        bot.initialize().await.unwrap();

        bot.tick_at(saturday_noon()).await.unwrap();
        bot.tick_at(wednesday(23)).await.unwrap();

        assert!(gateway.opens.lock().unwrap().is_empty());
        assert_eq!(*gateway.bar_fetches.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_management_continues_outside_window() {
        let gateway = Arc::new(MockGateway::with_position(long_position(1.1, 1.0985, dec!(0.10))));
        let notifier = Arc::new(RecordingNotifier::default());
        let mut bot = bot(&gateway, &notifier);
        bot.initialize().await.unwrap();

        gateway.set_quote(1.1031, 1.1033);
        bot.tick_at(saturday_noon()).await.unwrap();

        assert_eq!(gateway.modifies.lock().unwrap().len(), 1);
        assert_eq!(gateway.closes.lock().unwrap().len(), 1);
        assert!(gateway.opens.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_management_can_be_gated_by_window() {
        let gateway = Arc::new(MockGateway::with_position(long_position(1.1, 1.0985, dec!(0.10))));
        let notifier = Arc::new(RecordingNotifier::default());
        let mut config = test_config();
        config.window.manage_outside_window = false;
        let mut bot = Bot::new(config, gateway.clone(), notifier.clone());
        bot.initialize().await.unwrap();

        gateway.set_quote(1.1031, 1.1033);
        bot.tick_at(saturday_noon()).await.unwrap();

        assert!(gateway.modifies.lock().unwrap().is_empty());
        assert!(gateway.closes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_bars_skip_tick() {
        let gateway = Arc::new(MockGateway::default());
        *gateway.bars.lock().unwrap() = Err(GatewayError::Unavailable("no bars".into()));
        let notifier = Arc::new(RecordingNotifier::default());
        let mut bot = bot(&gateway, &notifier);
        bot.initialize().await.unwrap();

        let err = bot.tick_at(wednesday(12)).await.unwrap_err();
        assert!(matches!(err, TradeError::DataUnavailable(_)));
        assert!(!err.is_fatal());
        assert!(gateway.opens.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_short_history_never_trades() {
        let gateway = Arc::new(MockGateway::default());
        gateway.set_bars(trending_bars(60, 1.0));
        let notifier = Arc::new(RecordingNotifier::default());
        let mut bot = bot(&gateway, &notifier);
        bot.initialize().await.unwrap();

        bot.tick_at(wednesday(12)).await.unwrap();
        assert!(gateway.opens.lock().unwrap().is_empty());
        assert_eq!(bot.get_stats().buy_signals, 0);
    }

    #[tokio::test]
    async fn test_heartbeat_cadence() {
        let gateway = Arc::new(MockGateway::default());
        gateway.set_bars(trending_bars(60, 1.0));
        let notifier = Arc::new(RecordingNotifier::default());
        let mut bot = bot(&gateway, &notifier);
        bot.initialize().await.unwrap();
        let start = Utc::now();

        bot.tick_at(start + chrono::Duration::minutes(30)).await.unwrap();
        assert_eq!(notifier.messages().len(), 1);

        bot.tick_at(start + chrono::Duration::minutes(61)).await.unwrap();
        let messages = notifier.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[1].contains("heartbeat"));
    }

    #[tokio::test]
    async fn test_recover_reconnects_and_rehydrates() {
        let gateway = Arc::new(MockGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let mut bot = bot(&gateway, &notifier);
        bot.initialize().await.unwrap();

        *gateway.position_error.lock().unwrap() =
            Some(GatewayError::Unreachable("connection refused".into()));
        let err = bot.tick_at(wednesday(12)).await.unwrap_err();
        assert!(err.is_fatal());

        // Terminal back with a position opened elsewhere
        *gateway.position_error.lock().unwrap() = None;
        *gateway.position.lock().unwrap() = Some(long_position(1.1, 1.0985, dec!(0.10)));
        bot.recover(&err).await;

        assert_eq!(*gateway.connects.lock().unwrap(), 2);
        assert_eq!(bot.get_stats().reconnects, 1);
        assert_eq!(bot.get_stats().state, ControllerState::Open(TradeSide::Buy));
        assert!(notifier.messages().iter().any(|m| m.contains("Reconnecting")));
    }

    #[test]
    fn test_stats_display() {
        let gateway = Arc::new(MockGateway::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let text = bot(&gateway, &notifier).get_stats().to_string();

        assert!(text.contains("=== Bot Statistics ==="));
        assert!(text.contains("Position:        flat"));
    }
}
