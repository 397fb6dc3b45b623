//! Single-instrument backtest of direction predictions.
//!
//! Samples are replayed in time order after a warm-up of `lookback`
//! points. At each step the predicted class sets a target position of
//! `sign × position_size`; a trade happens only when the prediction's
//! confidence exceeds the threshold and the position would change by more
//! than `position_change_threshold`. Portfolio value is cash plus the
//! position marked at the latest trade price.

use serde::{Deserialize, Serialize};

use tc_core::config::BacktestSettings;
use tc_core::types::{ClassProbs, Direction, Side, Timestamp};
use tc_ml::argmax;

use crate::trading::{max_drawdown_of_curve, sharpe_ratio};

/// One replayed observation with the model's prediction for it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BacktestPoint {
    pub timestamp: Timestamp,
    pub price: f64,
    pub probs: ClassProbs,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BacktestConfig {
    pub initial_capital: f64,
    pub lookback: usize,
    pub confidence_threshold: f64,
    pub position_change_threshold: f64,
    pub position_size: f64,
    /// Annual risk-free rate for the Sharpe ratio.
    pub risk_free_rate: f64,
    pub periods_per_year: f64,
}

impl BacktestConfig {
    pub fn new(settings: &BacktestSettings, risk_free_rate: f64, periods_per_year: f64) -> Self {
        Self {
            initial_capital: settings.initial_capital,
            lookback: settings.lookback,
            confidence_threshold: settings.confidence_threshold,
            position_change_threshold: settings.position_change_threshold,
            position_size: settings.position_size,
            risk_free_rate,
            periods_per_year,
        }
    }
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self::new(&BacktestSettings::default(), 0.02, 252.0)
    }
}

/// One executed position change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub timestamp: Timestamp,
    pub side: Side,
    /// Absolute quantity traded.
    pub quantity: f64,
    pub price: f64,
    pub position_after: f64,
    /// P&L realized by the closing part of the trade; `None` for a pure
    /// opening trade.
    pub realized_pnl: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub initial_capital: f64,
    pub final_value: f64,
    pub total_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub trades: Vec<Trade>,
    /// Portfolio value after each replayed step.
    pub value_history: Vec<f64>,
}

/// Position book with average entry price.
#[derive(Debug, Default)]
struct Book {
    cash: f64,
    position: f64,
    entry_price: f64,
    mark: Option<f64>,
}

impl Book {
    /// Move to `target`, returning the realized P&L of any closed quantity.
    fn trade_to(&mut self, target: f64, price: f64) -> Option<f64> {
        let delta = target - self.position;
        self.cash -= delta * price;

        let closing = if self.position != 0.0 && self.position.signum() != delta.signum() {
            delta.abs().min(self.position.abs())
        } else {
            0.0
        };
        let realized = (closing > 0.0)
            .then(|| closing * (price - self.entry_price) * self.position.signum());

        let opening = delta.abs() - closing;
        if opening > 0.0 {
            let new_sign = delta.signum();
            let kept = if self.position.signum() == new_sign {
                self.position.abs()
            } else {
                0.0
            };
            self.entry_price = (self.entry_price * kept + price * opening) / (kept + opening);
        }
        self.position = target;
        if self.position == 0.0 {
            self.entry_price = 0.0;
        }
        self.mark = Some(price);
        realized
    }

    fn value(&self) -> f64 {
        self.cash + self.mark.map_or(0.0, |m| self.position * m)
    }
}

/// Replay `points` and simulate trading on their predictions.
pub fn run_backtest(points: &[BacktestPoint], cfg: &BacktestConfig) -> BacktestResult {
    let mut book = Book {
        cash: cfg.initial_capital,
        ..Book::default()
    };
    let mut trades = Vec::new();
    let mut values = Vec::with_capacity(points.len().saturating_sub(cfg.lookback));

    for point in points.iter().skip(cfg.lookback) {
        let class = argmax(&point.probs);
        let confidence = point.probs[class];
        let target = Direction::from_class(class).sign() as f64 * cfg.position_size;
        let change = target - book.position;

        if confidence > cfg.confidence_threshold && change.abs() > cfg.position_change_threshold {
            let realized = book.trade_to(target, point.price);
            trades.push(Trade {
                timestamp: point.timestamp,
                side: if change > 0.0 { Side::Buy } else { Side::Sell },
                quantity: change.abs(),
                price: point.price,
                position_after: book.position,
                realized_pnl: realized,
            });
        }
        values.push(book.value());
    }

    let mut curve = Vec::with_capacity(values.len() + 1);
    curve.push(cfg.initial_capital);
    curve.extend_from_slice(&values);
    let step_returns: Vec<f64> = curve
        .windows(2)
        .map(|w| if w[0] != 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect();

    let final_value = values.last().copied().unwrap_or(cfg.initial_capital);
    let winning_trades = trades.iter().filter(|t| t.realized_pnl.map_or(false, |p| p > 0.0)).count();
    let losing_trades = trades.iter().filter(|t| t.realized_pnl.map_or(false, |p| p < 0.0)).count();

    BacktestResult {
        initial_capital: cfg.initial_capital,
        final_value,
        total_return: if cfg.initial_capital != 0.0 {
            final_value / cfg.initial_capital - 1.0
        } else {
            0.0
        },
        sharpe_ratio: sharpe_ratio(&step_returns, cfg.risk_free_rate, cfg.periods_per_year),
        max_drawdown: max_drawdown_of_curve(&curve),
        total_trades: trades.len(),
        winning_trades,
        losing_trades,
        trades,
        value_history: values,
    }
}

impl BacktestResult {
    /// Winning share of the trades that realized P&L.
    pub fn win_rate(&self) -> f64 {
        let decided = self.winning_trades + self.losing_trades;
        if decided == 0 {
            0.0
        } else {
            self.winning_trades as f64 / decided as f64
        }
    }
}
