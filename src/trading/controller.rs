//! Position controller: owns the single position and sequences open, close
//! and modify requests against the terminal.
//!
//! State is `Flat` or `Open(side)`, always derived from the last confirmed
//! [`Position`]. Nothing is changed on a request alone; only a confirmed
//! fill, close or modification (or a re-query of the terminal) moves it.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::position_sizer::{lots_f64, validate_lot, PositionSizer, SizingMethod};
use super::retry::{with_retry, RetryPolicy};
use super::risk_manager::RiskManager;
use super::TradingConfig;
use crate::api::{MarketGateway, Notifier};
use crate::error::{GatewayError, TradeError};
use crate::models::{
    CloseOrder, OpenOrder, Position, PositionSide, Quote, Signal, SymbolConstraints, TradeSide,
};

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Flat,
    Open(TradeSide),
}

/// Confirmed actions since start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControllerStats {
    pub opens: u64,
    pub closes: u64,
    pub modifications: u64,
    pub partial_closes: u64,
    pub external_closes: u64,
    pub failures: u64,
}

pub struct PositionController {
    gateway: Arc<dyn MarketGateway>,
    notifier: Arc<dyn Notifier>,
    risk: RiskManager,
    sizer: PositionSizer,
    retry: RetryPolicy,
    symbol: String,
    position: Position,
    stats: ControllerStats,
}

impl PositionController {
    pub fn new(
        gateway: Arc<dyn MarketGateway>,
        notifier: Arc<dyn Notifier>,
        config: TradingConfig,
        retry: RetryPolicy,
        symbol: impl Into<String>,
    ) -> Self {
        Self {
            gateway,
            notifier,
            risk: RiskManager::new(config.clone()),
            sizer: PositionSizer::new(config),
            retry,
            symbol: symbol.into(),
            position: Position::flat(),
            stats: ControllerStats::default(),
        }
    }

    pub fn state(&self) -> ControllerState {
        match self.position.side.trade_side() {
            Some(side) if !self.position.is_flat() => ControllerState::Open(side),
            _ => ControllerState::Flat,
        }
    }

    pub fn position(&self) -> &Position {
        &self.position
    }

    pub fn stats(&self) -> &ControllerStats {
        &self.stats
    }

    fn config(&self) -> &TradingConfig {
        self.risk.config()
    }

    /// Adopt the terminal's live exposure. Called at start and after reconnecting.
    pub async fn rehydrate(&mut self) -> Result<(), TradeError> {
        let live = self.fetch_position().await?;
        self.position = self.with_known_initial_volume(live);

        match self.state() {
            ControllerState::Open(side) => info!(
                ticket = ?self.position.ticket,
                side = %side,
                volume = %self.position.volume,
                entry = self.position.entry_price,
                stop_loss = ?self.position.stop_loss,
                "Rehydrated open position"
            ),
            ControllerState::Flat => info!("Rehydrated flat"),
        }
        Ok(())
    }

    /// Re-query the terminal. A position that vanished was closed by the
    /// broker (stop-loss or take-profit).
    pub async fn refresh_position(&mut self) -> Result<(), TradeError> {
        let live = self.fetch_position().await?;
        let was_open = self.state();
        self.position = self.with_known_initial_volume(live);

        if let (ControllerState::Open(side), ControllerState::Flat) = (was_open, self.state()) {
            self.stats.external_closes += 1;
            info!(side = %side, "Position closed externally (stop-loss or take-profit)");
        }
        Ok(())
    }

    async fn fetch_position(&self) -> Result<Position, TradeError> {
        let live = with_retry(&self.retry, "fetch position", || {
            self.gateway.fetch_open_position()
        })
        .await?;
        Ok(live.unwrap_or_default())
    }

    /// Keep a known opening volume when the terminal does not report one.
    fn with_known_initial_volume(&self, mut live: Position) -> Position {
        if live.initial_volume <= Decimal::ZERO {
            live.initial_volume = if live.ticket.is_some() && live.ticket == self.position.ticket {
                self.position.initial_volume
            } else {
                Decimal::ZERO
            };
        }
        live
    }

    async fn fetch_quote(&self) -> Result<Quote, TradeError> {
        Ok(with_retry(&self.retry, "fetch quote", || self.gateway.fetch_quote()).await?)
    }

    async fn fetch_constraints(&self) -> Result<SymbolConstraints, TradeError> {
        Ok(with_retry(&self.retry, "symbol constraints", || {
            self.gateway.symbol_constraints()
        })
        .await?)
    }

    /// Trailing stop then partial close, for an open position.
    pub async fn manage_open_position(&mut self, atr: f64) -> Result<(), TradeError> {
        let ControllerState::Open(_) = self.state() else {
            return Ok(());
        };
        let Some(ticket) = self.position.ticket else {
            return Ok(());
        };

        let quote = self.fetch_quote().await?;
        let symbol = self.fetch_constraints().await?;

        if let Some(update) = self.risk.trailing_stop(&self.position, &quote, atr, &symbol) {
            let take_profit = self.position.take_profit;
            let result = with_retry(&self.retry, "modify", || {
                self.gateway
                    .submit_modify(ticket, update.new_stop_loss, take_profit)
            })
            .await;

            match result {
                Ok(()) => {
                    self.position.stop_loss = Some(update.new_stop_loss);
                    self.stats.modifications += 1;
                    info!(
                        ticket = ticket,
                        from = ?update.previous_stop_loss,
                        to = update.new_stop_loss,
                        distance = update.trailing_distance,
                        atr = atr,
                        "Trailing stop moved"
                    );
                }
                Err(e) => self.execution_failed("Trailing stop update", e)?,
            }
        }

        if let Some(partial) = self.risk.partial_close(&self.position, &quote, &symbol) {
            let Some(side) = self.position.side.trade_side() else {
                return Ok(());
            };
            let deviation = self.config().close_deviation;
            let result = with_retry(&self.retry, "partial close", || {
                let gateway = self.gateway.clone();
                async move {
                    let quote = gateway.fetch_quote().await?;
                    let order = CloseOrder {
                        ticket,
                        position_side: side,
                        volume: partial.volume,
                        price: quote.exit_price(side),
                        deviation,
                        comment: "partial close".to_string(),
                    };
                    gateway.submit_close(&order).await
                }
            })
            .await;

            match result {
                Ok(fill) => {
                    self.position.reduce(fill.volume);
                    self.stats.partial_closes += 1;
                    if fill.volume < partial.volume {
                        warn!(
                            ticket = ticket,
                            requested = %partial.volume,
                            filled = %fill.volume,
                            "Partial close filled short"
                        );
                    }
                    info!(
                        ticket = ticket,
                        closed = %fill.volume,
                        remaining = %self.position.volume,
                        profit_pips = %format!("{:.1}", partial.profit_pips),
                        price = fill.price,
                        "Partial close"
                    );
                }
                Err(e) => self.execution_failed("Partial close", e)?,
            }
        }

        Ok(())
    }

    /// Act on a directional decision.
    ///
    /// Flat opens. An opposing decision closes first and only opens the new
    /// side once the close is confirmed. Same side or no decision is a no-op.
    pub async fn act_on_signal(&mut self, signal: &Signal, atr: f64) -> Result<(), TradeError> {
        let Some(side) = signal.decision.trade_side() else {
            return Ok(());
        };

        match self.state() {
            ControllerState::Open(current) if current == side => {
                debug!(side = %side, "Signal matches open position");
                Ok(())
            }
            ControllerState::Open(current) => {
                info!(
                    from = %current,
                    to = %side,
                    bullish = signal.bullish,
                    bearish = signal.bearish,
                    "Opposing signal, closing before reversing"
                );
                self.close_all().await?;
                self.open(side, atr, signal).await
            }
            ControllerState::Flat => self.open(side, atr, signal).await,
        }
    }

    /// Close all volume at market.
    pub async fn close_all(&mut self) -> Result<(), TradeError> {
        let (Some(ticket), Some(side)) = (self.position.ticket, self.position.side.trade_side())
        else {
            return Ok(());
        };
        let volume = self.position.volume;
        let deviation = self.config().close_deviation;

        let result = with_retry(&self.retry, "close", || {
            let gateway = self.gateway.clone();
            async move {
                let quote = gateway.fetch_quote().await?;
                let order = CloseOrder {
                    ticket,
                    position_side: side,
                    volume,
                    price: quote.exit_price(side),
                    deviation,
                    comment: "signal reversal".to_string(),
                };
                gateway.submit_close(&order).await
            }
        })
        .await;

        match result {
            Ok(fill) => {
                let profit_pips = self
                    .risk
                    .price_to_pips((fill.price - self.position.entry_price) * side.sign());
                self.position.reduce(fill.volume);

                if !self.position.is_flat() {
                    let err = TradeError::ExecutionRejected(format!(
                        "close filled {} of {} lots",
                        fill.volume, volume
                    ));
                    self.stats.failures += 1;
                    warn!(
                        ticket = ticket,
                        side = %side,
                        filled = %fill.volume,
                        remaining = %self.position.volume,
                        "Close partially filled, position still open"
                    );
                    self.notifier
                        .notify(&format!("{} Close failed: {}", self.symbol, err));
                    return Err(err);
                }

                self.stats.closes += 1;
                info!(
                    ticket = ticket,
                    side = %side,
                    volume = %volume,
                    price = fill.price,
                    profit_pips = %format!("{:.1}", profit_pips),
                    "Position closed"
                );
                Ok(())
            }
            Err(e) => {
                self.execution_failed("Close", e.clone())?;
                Err(e.into())
            }
        }
    }

    async fn open(&mut self, side: TradeSide, atr: f64, signal: &Signal) -> Result<(), TradeError> {
        let symbol = self.fetch_constraints().await?;
        let balance = match self.sizer.method() {
            SizingMethod::PercentRisk => {
                with_retry(&self.retry, "account balance", || {
                    self.gateway.account_balance()
                })
                .await?
            }
            SizingMethod::Fixed => 0.0,
        };

        let sl_distance = self.risk.sl_distance(atr);
        let lot = self.sizer.lot_size(balance, sl_distance, &symbol);
        if let Err(e) = validate_lot(lot, &symbol) {
            self.stats.failures += 1;
            warn!(lot = %lot, error = %e, "Lot rejected, not opening");
            self.notifier
                .notify(&format!("{} {}: order not sent, {}", self.symbol, side, e));
            return Err(e);
        }

        let risk = &self.risk;
        let deviation = self.config().open_deviation;
        let comment = format!("B{}/S{}", signal.bullish, signal.bearish);
        let result = with_retry(&self.retry, "open", || {
            let gateway = self.gateway.clone();
            let symbol = &symbol;
            let comment = comment.clone();
            async move {
                let quote = gateway.fetch_quote().await?;
                let price = quote.entry_price(side);
                let levels = risk.entry_levels(side, price, atr);
                let order = OpenOrder {
                    side,
                    volume: lot,
                    price,
                    stop_loss: symbol.normalize_price(levels.stop_loss),
                    take_profit: symbol.normalize_price(levels.take_profit),
                    deviation,
                    comment,
                };
                let fill = gateway.submit_open(&order).await?;
                Ok::<_, GatewayError>((order, levels, fill))
            }
        })
        .await;

        match result {
            Ok((order, levels, fill)) => {
                self.position = Position {
                    ticket: Some(fill.ticket),
                    side: PositionSide::from(side),
                    volume: fill.volume,
                    initial_volume: fill.volume,
                    entry_price: fill.price,
                    stop_loss: Some(order.stop_loss),
                    take_profit: Some(order.take_profit),
                    opened_at: Some(fill.filled_at),
                };
                self.stats.opens += 1;
                info!(
                    ticket = fill.ticket,
                    side = %side,
                    lots = lots_f64(fill.volume),
                    price = fill.price,
                    stop_loss = order.stop_loss,
                    take_profit = order.take_profit,
                    sl_pips = %format!("{:.1}", levels.sl_pips),
                    tp_pips = %format!("{:.1}", levels.tp_pips),
                    risk_reward = levels.risk_reward,
                    atr = atr,
                    "Position opened"
                );
                Ok(())
            }
            Err(e) => {
                self.execution_failed("Open", e.clone())?;
                Err(e.into())
            }
        }
    }

    /// Final outcome of a failed execution call after retries.
    ///
    /// Connectivity loss is returned for the control loop to handle. Anything
    /// else is counted, logged and notified; the next tick tries again.
    fn execution_failed(&mut self, action: &str, err: GatewayError) -> Result<(), TradeError> {
        let err = TradeError::from(err);
        if err.is_fatal() {
            return Err(err);
        }

        self.stats.failures += 1;
        warn!(
            action = action,
            state = ?self.state(),
            ticket = ?self.position.ticket,
            error = %err,
            "Execution failed, deferring to next tick"
        );
        self.notifier
            .notify(&format!("{} {} failed: {}", self.symbol, action, err));
        Ok(())
    }
}
