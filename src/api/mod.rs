//! Terminal and notification clients.

mod bridge_client;
mod gateway;
mod paper;
mod telegram;
mod types;

#[cfg(test)]
pub mod testing;

pub use bridge_client::BridgeClient;
pub use gateway::MarketGateway;
pub use paper::PaperGateway;
pub use telegram::{notifier_from_env, Notifier};
