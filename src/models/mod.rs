//! Data models for bars, quotes, positions, orders and signals.

mod bar;
mod market;
mod position;
mod signal;
mod trade;

pub use bar::{Bar, BarSeries};
pub use market::{Quote, SymbolConstraints};
pub use position::{Position, PositionSide};
pub use signal::{Signal, SignalDecision};
pub use trade::{CloseOrder, Fill, OpenOrder, TradeSide};
