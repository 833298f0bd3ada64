//! In-memory terminal and notifier for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::gateway::MarketGateway;
use super::telegram::Notifier;
use crate::error::GatewayError;
use crate::models::{
    Bar, BarSeries, CloseOrder, Fill, OpenOrder, Position, PositionSide, Quote, SymbolConstraints,
};

pub fn eurusd() -> SymbolConstraints {
    SymbolConstraints {
        min_vol: dec!(0.01),
        max_vol: dec!(100),
        step_vol: dec!(0.01),
        point: 0.00001,
        tick_value: 1.0,
        digits: 5,
    }
}

/// Accelerating trend: `direction` +1 up, -1 down. ATR stays near 0.0010.
pub fn trending_bars(n: usize, direction: f64) -> BarSeries {
    let bars = (0..n)
        .map(|i| {
            let x = i as f64;
            let close = 1.1 + direction * (0.0002 * x + 0.000001 * x * x);
            Bar {
                time: DateTime::<Utc>::UNIX_EPOCH + Duration::minutes(30 * i as i64),
                open: close,
                high: close + 0.0005,
                low: close - 0.0005,
                close,
                volume: 100.0,
            }
        })
        .collect();
    BarSeries::new(bars)
}

/// Scripted terminal. Unscripted submissions succeed and update the held position.
pub struct MockGateway {
    pub bars: Mutex<Result<BarSeries, GatewayError>>,
    pub quote: Mutex<Result<Quote, GatewayError>>,
    pub position: Mutex<Option<Position>>,
    pub position_error: Mutex<Option<GatewayError>>,
    pub constraints: Mutex<SymbolConstraints>,
    pub balance: f64,
    pub connect_results: Mutex<VecDeque<Result<(), GatewayError>>>,
    pub open_results: Mutex<VecDeque<Result<(), GatewayError>>>,
    pub close_results: Mutex<VecDeque<Result<(), GatewayError>>>,
    pub modify_results: Mutex<VecDeque<Result<(), GatewayError>>>,
    pub close_fills: Mutex<VecDeque<Decimal>>,
    pub opens: Mutex<Vec<OpenOrder>>,
    pub closes: Mutex<Vec<CloseOrder>>,
    pub modifies: Mutex<Vec<(u64, f64, Option<f64>)>>,
    pub connects: Mutex<u32>,
    pub bar_fetches: Mutex<u32>,
    next_ticket: Mutex<u64>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self {
            bars: Mutex::new(Ok(trending_bars(250, 1.0))),
            quote: Mutex::new(Ok(Quote { bid: 1.1000, ask: 1.1002 })),
            position: Mutex::new(None),
            position_error: Mutex::new(None),
            constraints: Mutex::new(eurusd()),
            balance: 10_000.0,
            connect_results: Mutex::new(VecDeque::new()),
            open_results: Mutex::new(VecDeque::new()),
            close_results: Mutex::new(VecDeque::new()),
            modify_results: Mutex::new(VecDeque::new()),
            close_fills: Mutex::new(VecDeque::new()),
            opens: Mutex::new(Vec::new()),
            closes: Mutex::new(Vec::new()),
            modifies: Mutex::new(Vec::new()),
            connects: Mutex::new(0),
            bar_fetches: Mutex::new(0),
            next_ticket: Mutex::new(1000),
        }
    }
}

impl MockGateway {
    pub fn with_position(position: Position) -> Self {
        let gateway = Self::default();
        *gateway.position.lock().unwrap() = Some(position);
        gateway
    }

    pub fn set_quote(&self, bid: f64, ask: f64) {
        *self.quote.lock().unwrap() = Ok(Quote { bid, ask });
    }

    pub fn set_bars(&self, bars: BarSeries) {
        *self.bars.lock().unwrap() = Ok(bars);
    }

    pub fn script_open(&self, results: Vec<Result<(), GatewayError>>) {
        self.open_results.lock().unwrap().extend(results);
    }

    pub fn script_close(&self, results: Vec<Result<(), GatewayError>>) {
        self.close_results.lock().unwrap().extend(results);
    }

    pub fn script_modify(&self, results: Vec<Result<(), GatewayError>>) {
        self.modify_results.lock().unwrap().extend(results);
    }

    /// Volumes the next closes actually fill, instead of the requested volume.
    pub fn script_close_fills(&self, volumes: Vec<Decimal>) {
        self.close_fills.lock().unwrap().extend(volumes);
    }

    pub fn script_connect(&self, results: Vec<Result<(), GatewayError>>) {
        self.connect_results.lock().unwrap().extend(results);
    }

    pub fn held(&self) -> Option<Position> {
        self.position.lock().unwrap().clone()
    }

    fn next(queue: &Mutex<VecDeque<Result<(), GatewayError>>>) -> Result<(), GatewayError> {
        queue.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

#[async_trait]
impl MarketGateway for MockGateway {
    async fn connect(&self) -> Result<(), GatewayError> {
        *self.connects.lock().unwrap() += 1;
        Self::next(&self.connect_results)
    }

    async fn fetch_bars(&self, _count: usize) -> Result<BarSeries, GatewayError> {
        *self.bar_fetches.lock().unwrap() += 1;
        self.bars.lock().unwrap().clone()
    }

    async fn fetch_quote(&self) -> Result<Quote, GatewayError> {
        self.quote.lock().unwrap().clone()
    }

    async fn fetch_open_position(&self) -> Result<Option<Position>, GatewayError> {
        if let Some(err) = self.position_error.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(self.held())
    }

    async fn submit_open(&self, order: &OpenOrder) -> Result<Fill, GatewayError> {
        self.opens.lock().unwrap().push(order.clone());
        Self::next(&self.open_results)?;

        let mut ticket = self.next_ticket.lock().unwrap();
        *ticket += 1;
        let now = Utc::now();
        *self.position.lock().unwrap() = Some(Position {
            ticket: Some(*ticket),
            side: PositionSide::from(order.side),
            volume: order.volume,
            initial_volume: order.volume,
            entry_price: order.price,
            stop_loss: Some(order.stop_loss),
            take_profit: Some(order.take_profit),
            opened_at: Some(now),
        });
        Ok(Fill {
            ticket: *ticket,
            price: order.price,
            volume: order.volume,
            filled_at: now,
        })
    }

    async fn submit_close(&self, order: &CloseOrder) -> Result<Fill, GatewayError> {
        self.closes.lock().unwrap().push(order.clone());
        Self::next(&self.close_results)?;
        let filled = self
            .close_fills
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(order.volume);

        let mut held = self.position.lock().unwrap();
        if let Some(pos) = held.as_mut() {
            pos.reduce(filled);
            if pos.is_flat() {
                *held = None;
            }
        }
        Ok(Fill {
            ticket: order.ticket,
            price: order.price,
            volume: filled,
            filled_at: Utc::now(),
        })
    }

    async fn submit_modify(
        &self,
        ticket: u64,
        stop_loss: f64,
        take_profit: Option<f64>,
    ) -> Result<(), GatewayError> {
        self.modifies.lock().unwrap().push((ticket, stop_loss, take_profit));
        Self::next(&self.modify_results)?;

        if let Some(pos) = self.position.lock().unwrap().as_mut() {
            pos.stop_loss = Some(stop_loss);
            pos.take_profit = take_profit;
        }
        Ok(())
    }

    async fn symbol_constraints(&self) -> Result<SymbolConstraints, GatewayError> {
        Ok(self.constraints.lock().unwrap().clone())
    }

    async fn account_balance(&self) -> Result<f64, GatewayError> {
        Ok(self.balance)
    }
}

/// Keeps every notification for inspection.
#[derive(Default)]
pub struct RecordingNotifier {
    pub messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, text: &str) {
        self.messages.lock().unwrap().push(text.to_string());
    }
}

/// Long position held at full lot.
pub fn long_position(entry: f64, stop_loss: f64, volume: Decimal) -> Position {
    Position {
        ticket: Some(77),
        side: PositionSide::Long,
        volume,
        initial_volume: volume,
        entry_price: entry,
        stop_loss: Some(stop_loss),
        take_profit: Some(entry + 0.0025),
        opened_at: Some(Utc::now()),
    }
}
