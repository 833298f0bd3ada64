//! Trading logic: signal scoring, risk management, sizing and position control.

mod config;
mod controller;
mod position_sizer;
mod retry;
mod risk_manager;
mod strategy;

pub use config::{TradingConfig, TradingWindow};
pub use controller::{ControllerState, ControllerStats, PositionController};
pub use position_sizer::lots_f64;
pub use retry::{with_retry, RetryPolicy};
pub use strategy::{Strategy, StrategyConfig};
