//! Wire types for the terminal bridge REST API.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{Bar, Position, PositionSide, Quote, SymbolConstraints};

/// Body of `POST /initialize`.
#[derive(Debug, Clone, Serialize)]
pub struct InitializeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
}

/// Response of `POST /initialize`.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResponse {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Response of `GET /symbols/{symbol}`.
#[derive(Debug, Clone, Deserialize)]
pub struct SymbolInfoResponse {
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub volume_min: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub volume_max: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub volume_step: Decimal,
    pub point: f64,
    #[serde(default)]
    pub trade_tick_value: f64,
    pub digits: u32,
}

impl From<SymbolInfoResponse> for SymbolConstraints {
    fn from(info: SymbolInfoResponse) -> Self {
        SymbolConstraints {
            min_vol: info.volume_min,
            max_vol: info.volume_max,
            step_vol: info.volume_step,
            point: info.point,
            tick_value: info.trade_tick_value,
            digits: info.digits,
        }
    }
}

/// Response of `GET /symbols/{symbol}/tick`.
#[derive(Debug, Clone, Deserialize)]
pub struct TickResponse {
    pub bid: f64,
    pub ask: f64,
    /// Unix seconds
    #[serde(default)]
    pub time: i64,
}

impl From<TickResponse> for Quote {
    fn from(tick: TickResponse) -> Self {
        Quote {
            bid: tick.bid,
            ask: tick.ask,
        }
    }
}

/// One element of `GET /symbols/{symbol}/rates`.
#[derive(Debug, Clone, Deserialize)]
pub struct RateResponse {
    /// Bar open time, unix seconds
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub tick_volume: f64,
}

impl RateResponse {
    /// `None` when the timestamp is out of range.
    pub fn to_bar(&self) -> Option<Bar> {
        Some(Bar {
            time: DateTime::<Utc>::from_timestamp(self.time, 0)?,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.tick_volume,
        })
    }
}

/// Terminal position type codes.
pub const POSITION_TYPE_BUY: i32 = 0;
pub const POSITION_TYPE_SELL: i32 = 1;

/// One element of `GET /positions?symbol=`.
#[derive(Debug, Clone, Deserialize)]
pub struct PositionResponse {
    pub ticket: u64,
    pub symbol: String,
    #[serde(rename = "type")]
    pub position_type: i32,
    #[serde(with = "rust_decimal::serde::float")]
    pub volume: Decimal,
    /// Volume of the opening deal, when the bridge reports it
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub volume_initial: Option<Decimal>,
    pub price_open: f64,
    /// 0.0 when unset
    #[serde(default)]
    pub sl: f64,
    /// 0.0 when unset
    #[serde(default)]
    pub tp: f64,
    /// Open time, unix seconds
    #[serde(default)]
    pub time: i64,
    #[serde(default)]
    pub magic: u64,
}

impl PositionResponse {
    pub fn side(&self) -> PositionSide {
        match self.position_type {
            POSITION_TYPE_BUY => PositionSide::Long,
            POSITION_TYPE_SELL => PositionSide::Short,
            _ => PositionSide::Flat,
        }
    }

    pub fn to_position(&self) -> Position {
        let level = |price: f64| (price > 0.0).then_some(price);
        Position {
            ticket: Some(self.ticket),
            side: self.side(),
            volume: self.volume,
            initial_volume: self.volume_initial.unwrap_or(Decimal::ZERO),
            entry_price: self.price_open,
            stop_loss: level(self.sl),
            take_profit: level(self.tp),
            opened_at: DateTime::<Utc>::from_timestamp(self.time, 0),
        }
    }
}

/// Response of `GET /account`.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountResponse {
    pub balance: f64,
    #[serde(default)]
    pub equity: f64,
    #[serde(default)]
    pub currency: String,
}

/// Trade request action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderAction {
    /// Market deal (open or close)
    Deal,
    /// Modify stop-loss / take-profit
    Sltp,
}

/// Body of `POST /orders`.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    pub action: OrderAction,
    pub symbol: String,
    #[serde(with = "rust_decimal::serde::float_option", skip_serializing_if = "Option::is_none")]
    pub volume: Option<Decimal>,
    /// "buy" or "sell"
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub order_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    pub sl: f64,
    pub tp: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deviation: Option<u32>,
    pub magic: u64,
    pub comment: String,
    /// Ticket of the position being closed or modified
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_filling: Option<String>,
}

/// Response of `POST /orders`.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderResponse {
    pub retcode: u32,
    #[serde(default)]
    pub deal: u64,
    #[serde(default)]
    pub order: u64,
    #[serde(default, with = "rust_decimal::serde::float")]
    pub volume: Decimal,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub comment: String,
}

/// Error body returned with a non-2xx status.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeErrorResponse {
    #[serde(alias = "detail", alias = "message")]
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_position_response_mapping() {
        let json = r#"{
            "ticket": 5012,
            "symbol": "EURUSD",
            "type": 1,
            "volume": 0.05,
            "volume_initial": 0.1,
            "price_open": 1.1,
            "sl": 1.1015,
            "tp": 0.0,
            "time": 1704103200,
            "magic": 123456
        }"#;
        let resp: PositionResponse = serde_json::from_str(json).unwrap();
        let pos = resp.to_position();

        assert_eq!(pos.side, PositionSide::Short);
        assert_eq!(pos.volume, dec!(0.05));
        assert_eq!(pos.initial_volume, dec!(0.1));
        assert_eq!(pos.stop_loss, Some(1.1015));
        assert_eq!(pos.take_profit, None);
        assert!(pos.opened_at.is_some());
    }

    #[test]
    fn test_symbol_info_mapping() {
        let json = r#"{
            "name": "EURUSD",
            "volume_min": 0.01,
            "volume_max": 100.0,
            "volume_step": 0.01,
            "point": 0.00001,
            "trade_tick_value": 1.0,
            "digits": 5
        }"#;
        let info: SymbolInfoResponse = serde_json::from_str(json).unwrap();
        let constraints = SymbolConstraints::from(info);

        assert_eq!(constraints.min_vol, dec!(0.01));
        assert_eq!(constraints.step_vol, dec!(0.01));
        assert_eq!(constraints.digits, 5);
    }

    #[test]
    fn test_modify_request_omits_deal_fields() {
        let req = OrderRequest {
            action: OrderAction::Sltp,
            symbol: "EURUSD".into(),
            volume: None,
            order_type: None,
            price: None,
            sl: 1.0995,
            tp: 1.1025,
            deviation: None,
            magic: 123456,
            comment: "trail".into(),
            position: Some(5012),
            type_filling: None,
        };
        let value = serde_json::to_value(&req).unwrap();

        assert_eq!(value["action"], "sltp");
        assert_eq!(value["position"], 5012);
        assert!(value.get("volume").is_none());
        assert!(value.get("type").is_none());
    }
}
