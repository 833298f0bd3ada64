//! Market data and order execution capability for a single symbol.

use async_trait::async_trait;

use crate::error::GatewayError;
use crate::models::{BarSeries, CloseOrder, Fill, OpenOrder, Position, Quote, SymbolConstraints};

/// Everything the bot asks of the trading terminal.
///
/// An implementation is bound to one symbol and timeframe. Every call may
/// fail; see [`GatewayError`] for how failures are classified.
#[async_trait]
pub trait MarketGateway: Send + Sync {
    /// Establish (or re-establish) the terminal session.
    async fn connect(&self) -> Result<(), GatewayError>;

    /// Most recent `count` bars, latest last.
    async fn fetch_bars(&self, count: usize) -> Result<BarSeries, GatewayError>;

    /// Current bid/ask.
    async fn fetch_quote(&self) -> Result<Quote, GatewayError>;

    /// Live position on the symbol, `None` when flat.
    async fn fetch_open_position(&self) -> Result<Option<Position>, GatewayError>;

    async fn submit_open(&self, order: &OpenOrder) -> Result<Fill, GatewayError>;

    /// Close `order.volume` of the position; a partial volume leaves the rest open.
    async fn submit_close(&self, order: &CloseOrder) -> Result<Fill, GatewayError>;

    /// Move protective levels of an open position.
    async fn submit_modify(
        &self,
        ticket: u64,
        stop_loss: f64,
        take_profit: Option<f64>,
    ) -> Result<(), GatewayError>;

    async fn symbol_constraints(&self) -> Result<SymbolConstraints, GatewayError>;

    /// Account balance in account currency.
    async fn account_balance(&self) -> Result<f64, GatewayError>;
}
