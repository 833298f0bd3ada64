//! Dry-run gateway: real market data, simulated execution.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::info;

use super::gateway::MarketGateway;
use crate::error::GatewayError;
use crate::models::{
    BarSeries, CloseOrder, Fill, OpenOrder, Position, PositionSide, Quote, SymbolConstraints,
    TradeSide,
};
use crate::trading::lots_f64;

#[derive(Debug)]
struct PaperState {
    position: Option<Position>,
    balance: f64,
    next_ticket: u64,
}

/// Reads bars, quotes and constraints from `data`; fills, closes and
/// stop-loss/take-profit hits are simulated in memory.
pub struct PaperGateway {
    data: Arc<dyn MarketGateway>,
    state: Mutex<PaperState>,
}

impl PaperGateway {
    pub fn new(data: Arc<dyn MarketGateway>, starting_balance: f64) -> Self {
        Self {
            data,
            state: Mutex::new(PaperState {
                position: None,
                balance: starting_balance,
                next_ticket: 1,
            }),
        }
    }

    /// Realized P&L in account currency for closing `volume` of `side` at `exit`.
    fn realized_pnl(
        side: TradeSide,
        entry: f64,
        exit: f64,
        volume: Decimal,
        symbol: &SymbolConstraints,
    ) -> f64 {
        if symbol.point <= 0.0 {
            return 0.0;
        }
        (exit - entry) * side.sign() / symbol.point * symbol.tick_value * lots_f64(volume)
    }

    /// Level the broker would have filled at, if the quote crossed SL or TP.
    fn triggered_level(position: &Position, quote: &Quote) -> Option<(f64, &'static str)> {
        let side = position.side.trade_side()?;
        let price = quote.exit_price(side);
        let crossed = |level: f64, toward_loss: bool| match (side, toward_loss) {
            (TradeSide::Buy, true) | (TradeSide::Sell, false) => price <= level,
            (TradeSide::Buy, false) | (TradeSide::Sell, true) => price >= level,
        };

        if let Some(sl) = position.stop_loss.filter(|sl| crossed(*sl, true)) {
            return Some((sl, "stop loss"));
        }
        if let Some(tp) = position.take_profit.filter(|tp| crossed(*tp, false)) {
            return Some((tp, "take profit"));
        }
        None
    }

    fn matching<'a>(
        state: &'a mut PaperState,
        ticket: u64,
    ) -> Result<&'a mut Position, GatewayError> {
        match state.position.as_mut() {
            Some(pos) if pos.ticket == Some(ticket) => Ok(pos),
            _ => Err(GatewayError::Rejected(format!("position {} not found", ticket))),
        }
    }
}

#[async_trait]
impl MarketGateway for PaperGateway {
    async fn connect(&self) -> Result<(), GatewayError> {
        self.data.connect().await
    }

    async fn fetch_bars(&self, count: usize) -> Result<BarSeries, GatewayError> {
        self.data.fetch_bars(count).await
    }

    async fn fetch_quote(&self) -> Result<Quote, GatewayError> {
        self.data.fetch_quote().await
    }

    async fn fetch_open_position(&self) -> Result<Option<Position>, GatewayError> {
        let mut state = self.state.lock().await;
        let Some(position) = state.position.clone() else {
            return Ok(None);
        };

        let quote = self.data.fetch_quote().await?;
        if let Some((level, reason)) = Self::triggered_level(&position, &quote) {
            let symbol = self.data.symbol_constraints().await?;
            if let Some(side) = position.side.trade_side() {
                let pnl =
                    Self::realized_pnl(side, position.entry_price, level, position.volume, &symbol);
                state.balance += pnl;
                info!(
                    ticket = ?position.ticket,
                    reason = reason,
                    price = level,
                    pnl = pnl,
                    "[PAPER] Position closed by broker level"
                );
            }
            state.position = None;
            return Ok(None);
        }

        Ok(Some(position))
    }

    async fn submit_open(&self, order: &OpenOrder) -> Result<Fill, GatewayError> {
        let mut state = self.state.lock().await;
        if state.position.is_some() {
            return Err(GatewayError::Rejected("position already open".to_string()));
        }

        let ticket = state.next_ticket;
        state.next_ticket += 1;
        let now = Utc::now();
        state.position = Some(Position {
            ticket: Some(ticket),
            side: PositionSide::from(order.side),
            volume: order.volume,
            initial_volume: order.volume,
            entry_price: order.price,
            stop_loss: Some(order.stop_loss),
            take_profit: Some(order.take_profit),
            opened_at: Some(now),
        });

        info!(
            ticket = ticket,
            side = %order.side,
            volume = %order.volume,
            price = order.price,
            "[PAPER] Opened"
        );

        Ok(Fill {
            ticket,
            price: order.price,
            volume: order.volume,
            filled_at: now,
        })
    }

    async fn submit_close(&self, order: &CloseOrder) -> Result<Fill, GatewayError> {
        let symbol = self.data.symbol_constraints().await?;
        let mut state = self.state.lock().await;
        let position = Self::matching(&mut state, order.ticket)?;
        if order.volume > position.volume {
            return Err(GatewayError::Rejected(format!(
                "close volume {} exceeds position volume {}",
                order.volume, position.volume
            )));
        }

        let pnl = Self::realized_pnl(
            order.position_side,
            position.entry_price,
            order.price,
            order.volume,
            &symbol,
        );
        position.reduce(order.volume);
        if position.is_flat() {
            state.position = None;
        }
        state.balance += pnl;

        info!(
            ticket = order.ticket,
            volume = %order.volume,
            price = order.price,
            pnl = pnl,
            "[PAPER] Closed"
        );

        Ok(Fill {
            ticket: order.ticket,
            price: order.price,
            volume: order.volume,
            filled_at: Utc::now(),
        })
    }

    async fn submit_modify(
        &self,
        ticket: u64,
        stop_loss: f64,
        take_profit: Option<f64>,
    ) -> Result<(), GatewayError> {
        let mut state = self.state.lock().await;
        let position = Self::matching(&mut state, ticket)?;
        position.stop_loss = Some(stop_loss);
        position.take_profit = take_profit;
        Ok(())
    }

    async fn symbol_constraints(&self) -> Result<SymbolConstraints, GatewayError> {
        self.data.symbol_constraints().await
    }

    async fn account_balance(&self) -> Result<f64, GatewayError> {
        Ok(self.state.lock().await.balance)
    }
}
