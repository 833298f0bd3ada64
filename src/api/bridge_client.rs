//! HTTP client for the REST bridge in front of the trading terminal.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::GatewayError;
use crate::models::{
    BarSeries, CloseOrder, Fill, OpenOrder, Position, PositionSide, Quote, SymbolConstraints,
};

use super::gateway::MarketGateway;
use super::types::*;

const DEFAULT_BRIDGE_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Tag identifying this bot's orders on the terminal.
pub const MAGIC_NUMBER: u64 = 123456;

// Terminal trade return codes
const RETCODE_PLACED: u32 = 10008;
const RETCODE_DONE: u32 = 10009;
const RETCODE_DONE_PARTIAL: u32 = 10010;
const RETCODE_REQUOTE: u32 = 10004;
const RETCODE_PRICE_CHANGED: u32 = 10020;
const RETCODE_PRICE_OFF: u32 = 10021;
const RETCODE_CONNECTION: u32 = 10031;
const RETCODE_TIMEOUT: u32 = 10012;
const RETCODE_TOO_MANY_REQUESTS: u32 = 10024;

/// Classify a trade return code.
pub fn check_retcode(retcode: u32, comment: &str) -> Result<(), GatewayError> {
    let detail = format!("retcode {} {}", retcode, comment).trim_end().to_string();
    match retcode {
        RETCODE_PLACED | RETCODE_DONE | RETCODE_DONE_PARTIAL => Ok(()),
        RETCODE_REQUOTE | RETCODE_PRICE_CHANGED | RETCODE_PRICE_OFF => {
            Err(GatewayError::Requote(detail))
        }
        RETCODE_CONNECTION => Err(GatewayError::Unreachable(detail)),
        RETCODE_TIMEOUT | RETCODE_TOO_MANY_REQUESTS => Err(GatewayError::Transient(detail)),
        _ => Err(GatewayError::Rejected(detail)),
    }
}

fn classify_request_error(context: &str, err: reqwest::Error) -> GatewayError {
    if err.is_connect() {
        GatewayError::Unreachable(format!("{}: {}", context, err))
    } else if err.is_timeout() {
        GatewayError::Transient(format!("{}: timed out", context))
    } else if err.is_decode() {
        GatewayError::Unavailable(format!("{}: bad response: {}", context, err))
    } else {
        GatewayError::Transient(format!("{}: {}", context, err))
    }
}

/// Volume a deal actually executed. A partial fill reports what it filled;
/// a full fill may omit the volume.
pub fn filled_volume(response: &OrderResponse, requested: Decimal) -> Decimal {
    if response.retcode == RETCODE_DONE_PARTIAL || response.volume > Decimal::ZERO {
        response.volume.min(requested)
    } else {
        requested
    }
}

/// An order POST that got no answer may still have executed on the terminal,
/// so it is final for this tick. The next position re-query shows the outcome.
fn unconfirmed_order(err: GatewayError) -> GatewayError {
    match err {
        GatewayError::Transient(detail) => {
            GatewayError::Rejected(format!("{} (outcome unknown, not resent)", detail))
        }
        other => other,
    }
}

fn classify_status(context: &str, status: StatusCode, body: &str) -> GatewayError {
    let message = serde_json::from_str::<BridgeErrorResponse>(body)
        .map(|e| e.error)
        .unwrap_or_else(|_| body.to_string());
    let detail = format!("{}: {} - {}", context, status, message);

    match status {
        StatusCode::NOT_FOUND => GatewayError::Unavailable(detail),
        // Bridge up, terminal session gone
        StatusCode::SERVICE_UNAVAILABLE => GatewayError::Unreachable(detail),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::GATEWAY_TIMEOUT => {
            GatewayError::Transient(detail)
        }
        s if s.is_server_error() => GatewayError::Transient(detail),
        _ => GatewayError::Rejected(detail),
    }
}

/// Terminal login, all optional (the terminal may already be logged in).
#[derive(Debug, Clone, Default)]
pub struct BridgeCredentials {
    pub login: Option<String>,
    pub password: Option<String>,
    pub server: Option<String>,
}

impl BridgeCredentials {
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        Self {
            login: var("TERMINAL_LOGIN"),
            password: var("TERMINAL_PASSWORD"),
            server: var("TERMINAL_SERVER"),
        }
    }
}

/// Client for one symbol/timeframe on the terminal bridge.
pub struct BridgeClient {
    client: Client,
    base_url: String,
    symbol: String,
    timeframe: String,
    credentials: BridgeCredentials,
}

impl BridgeClient {
    pub fn new(
        base_url: impl Into<String>,
        symbol: impl Into<String>,
        timeframe: impl Into<String>,
        credentials: BridgeCredentials,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            symbol: symbol.into(),
            timeframe: timeframe.into(),
            credentials,
        })
    }

    /// Build from `TERMINAL_BRIDGE_URL` and the `TERMINAL_*` login variables.
    pub fn from_env(symbol: &str, timeframe: &str) -> Result<Self> {
        let base_url = std::env::var("TERMINAL_BRIDGE_URL")
            .unwrap_or_else(|_| DEFAULT_BRIDGE_URL.to_string());
        Self::new(base_url, symbol, timeframe, BridgeCredentials::from_env())
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn rates_path(&self, count: usize) -> String {
        format!(
            "/symbols/{}/rates?timeframe={}&count={}",
            self.symbol, self.timeframe, count
        )
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        context: &str,
        request: RequestBuilder,
    ) -> Result<T, GatewayError> {
        let response = request
            .send()
            .await
            .map_err(|e| classify_request_error(context, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(context, status, &body));
        }

        response
            .json()
            .await
            .map_err(|e| classify_request_error(context, e))
    }

    async fn get<T: DeserializeOwned>(&self, context: &str, path: &str) -> Result<T, GatewayError> {
        let url = self.url(path);
        debug!(url = %url, "GET");
        self.send_json(context, self.client.get(&url)).await
    }

    async fn send_order(&self, request: &OrderRequest) -> Result<OrderResponse, GatewayError> {
        let url = self.url("/orders");
        debug!(
            action = ?request.action,
            order_type = ?request.order_type,
            volume = ?request.volume,
            position = ?request.position,
            "POST order"
        );
        let response: OrderResponse = self
            .send_json("order", self.client.post(&url).json(request))
            .await
            .map_err(unconfirmed_order)?;
        check_retcode(response.retcode, &response.comment)?;
        Ok(response)
    }
}

#[async_trait]
impl MarketGateway for BridgeClient {
    async fn connect(&self) -> Result<(), GatewayError> {
        let body = InitializeRequest {
            login: self.credentials.login.clone(),
            password: self.credentials.password.clone(),
            server: self.credentials.server.clone(),
        };
        let url = self.url("/initialize");
        let response: InitializeResponse = self
            .send_json("initialize", self.client.post(&url).json(&body))
            .await?;

        if !response.success {
            return Err(GatewayError::Unreachable(format!(
                "terminal initialization failed: {}",
                response.error.unwrap_or_default()
            )));
        }

        info!(bridge = %self.base_url, symbol = %self.symbol, "Terminal connected");
        Ok(())
    }

    async fn fetch_bars(&self, count: usize) -> Result<BarSeries, GatewayError> {
        let rates: Vec<RateResponse> = self.get("rates", &self.rates_path(count)).await?;
        if rates.is_empty() {
            return Err(GatewayError::Unavailable(format!(
                "no {} bars for {}",
                self.timeframe, self.symbol
            )));
        }

        let bars: Vec<_> = rates.iter().filter_map(RateResponse::to_bar).collect();
        if bars.len() < rates.len() {
            warn!(dropped = rates.len() - bars.len(), "Dropped bars with invalid timestamps");
        }
        let series = BarSeries::new(bars);
        if series.is_empty() {
            return Err(GatewayError::Unavailable(format!(
                "no valid {} bars for {}",
                self.timeframe, self.symbol
            )));
        }
        Ok(series)
    }

    async fn fetch_quote(&self) -> Result<Quote, GatewayError> {
        let tick: TickResponse = self
            .get("tick", &format!("/symbols/{}/tick", self.symbol))
            .await?;
        let quote = Quote::from(tick);
        if !quote.is_valid() {
            return Err(GatewayError::Unavailable(format!(
                "no price for {} (bid {}, ask {})",
                self.symbol, quote.bid, quote.ask
            )));
        }
        Ok(quote)
    }

    async fn fetch_open_position(&self) -> Result<Option<Position>, GatewayError> {
        let positions: Vec<PositionResponse> = self
            .get("positions", &format!("/positions?symbol={}", self.symbol))
            .await?;

        let mut ours = positions
            .iter()
            .filter(|p| p.symbol == self.symbol && p.side() != PositionSide::Flat);
        let first = ours.next();
        if ours.next().is_some() {
            warn!(symbol = %self.symbol, "More than one open position, managing the first");
        }
        Ok(first.map(PositionResponse::to_position))
    }

    async fn submit_open(&self, order: &OpenOrder) -> Result<Fill, GatewayError> {
        let request = OrderRequest {
            action: OrderAction::Deal,
            symbol: self.symbol.clone(),
            volume: Some(order.volume),
            order_type: Some(order.side.as_str().to_lowercase()),
            price: Some(order.price),
            sl: order.stop_loss,
            tp: order.take_profit,
            deviation: Some(order.deviation),
            magic: MAGIC_NUMBER,
            comment: order.comment.clone(),
            position: None,
            type_filling: Some("ioc".to_string()),
        };
        let response = self.send_order(&request).await?;

        Ok(Fill {
            ticket: if response.order > 0 { response.order } else { response.deal },
            price: if response.price > 0.0 { response.price } else { order.price },
            volume: filled_volume(&response, order.volume),
            filled_at: Utc::now(),
        })
    }

    async fn submit_close(&self, order: &CloseOrder) -> Result<Fill, GatewayError> {
        let request = OrderRequest {
            action: OrderAction::Deal,
            symbol: self.symbol.clone(),
            volume: Some(order.volume),
            order_type: Some(order.position_side.opposite().as_str().to_lowercase()),
            price: Some(order.price),
            sl: 0.0,
            tp: 0.0,
            deviation: Some(order.deviation),
            magic: MAGIC_NUMBER,
            comment: order.comment.clone(),
            position: Some(order.ticket),
            type_filling: Some("ioc".to_string()),
        };
        let response = self.send_order(&request).await?;

        Ok(Fill {
            ticket: order.ticket,
            price: if response.price > 0.0 { response.price } else { order.price },
            volume: filled_volume(&response, order.volume),
            filled_at: Utc::now(),
        })
    }

    async fn submit_modify(
        &self,
        ticket: u64,
        stop_loss: f64,
        take_profit: Option<f64>,
    ) -> Result<(), GatewayError> {
        let request = OrderRequest {
            action: OrderAction::Sltp,
            symbol: self.symbol.clone(),
            volume: None,
            order_type: None,
            price: None,
            sl: stop_loss,
            tp: take_profit.unwrap_or(0.0),
            deviation: None,
            magic: MAGIC_NUMBER,
            comment: "trailing stop".to_string(),
            position: Some(ticket),
            type_filling: None,
        };
        self.send_order(&request).await.map(|_| ())
    }

    async fn symbol_constraints(&self) -> Result<SymbolConstraints, GatewayError> {
        let info: SymbolInfoResponse = self
            .get("symbol", &format!("/symbols/{}", self.symbol))
            .await?;
        Ok(info.into())
    }

    async fn account_balance(&self) -> Result<f64, GatewayError> {
        let account: AccountResponse = self.get("account", "/account").await?;
        Ok(account.balance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retcode_mapping() {
        assert!(check_retcode(10009, "done").is_ok());
        assert!(check_retcode(10008, "").is_ok());
        assert!(check_retcode(10010, "").is_ok());

        assert!(matches!(check_retcode(10004, "requote"), Err(GatewayError::Requote(_))));
        assert!(matches!(check_retcode(10021, ""), Err(GatewayError::Requote(_))));
        assert!(matches!(check_retcode(10031, ""), Err(GatewayError::Unreachable(_))));
        assert!(matches!(check_retcode(10024, ""), Err(GatewayError::Transient(_))));
        assert!(matches!(
            check_retcode(10019, "no money"),
            Err(GatewayError::Rejected(_))
        ));
    }

    #[test]
    fn test_status_mapping() {
        let body = r#"{"detail": "symbol not found"}"#;
        let err = classify_status("symbol", StatusCode::NOT_FOUND, body);
        assert_eq!(
            err,
            GatewayError::Unavailable("symbol: 404 Not Found - symbol not found".into())
        );

        assert!(matches!(
            classify_status("tick", StatusCode::SERVICE_UNAVAILABLE, ""),
            GatewayError::Unreachable(_)
        ));
        assert!(matches!(
            classify_status("tick", StatusCode::BAD_GATEWAY, ""),
            GatewayError::Transient(_)
        ));
        assert!(matches!(
            classify_status("order", StatusCode::BAD_REQUEST, "bad volume"),
            GatewayError::Rejected(_)
        ));
    }

    fn order_response(retcode: u32, volume: Decimal) -> OrderResponse {
        OrderResponse {
            retcode,
            deal: 1,
            order: 1,
            volume,
            price: 1.1,
            comment: String::new(),
        }
    }

    #[test]
    fn test_filled_volume() {
        let requested = Decimal::new(10, 2);

        // Full fill without a reported volume
        assert_eq!(filled_volume(&order_response(10009, Decimal::ZERO), requested), requested);
        assert_eq!(filled_volume(&order_response(10009, requested), requested), requested);

        let half = Decimal::new(5, 2);
        assert_eq!(filled_volume(&order_response(10010, half), requested), half);
        assert_eq!(filled_volume(&order_response(10010, Decimal::ZERO), requested), Decimal::ZERO);
    }

    #[test]
    fn test_unanswered_order_is_final() {
        let err = unconfirmed_order(GatewayError::Transient("order: timed out".into()));
        assert_eq!(
            err,
            GatewayError::Rejected("order: timed out (outcome unknown, not resent)".into())
        );
        assert!(!err.is_transient());

        let requote = GatewayError::Requote("retcode 10004".into());
        assert_eq!(unconfirmed_order(requote.clone()), requote);
        let lost = GatewayError::Unreachable("connection refused".into());
        assert_eq!(unconfirmed_order(lost.clone()), lost);
    }

    #[test]
    fn test_paths() {
        let client = BridgeClient::new(
            "http://localhost:8000/",
            "EURUSD",
            "M30",
            BridgeCredentials::default(),
        )
        .unwrap();

        assert_eq!(client.base_url(), "http://localhost:8000");
        assert_eq!(
            client.url(&client.rates_path(250)),
            "http://localhost:8000/symbols/EURUSD/rates?timeframe=M30&count=250"
        );
    }
}
