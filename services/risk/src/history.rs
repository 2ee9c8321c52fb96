//! Trade history and daily profit/loss ledger.
//!
//! The history feeds the Kelly estimate once enough trades accumulate; the
//! ledger backs the daily-loss-budget check and resets on UTC date
//! rollover.

use std::collections::VecDeque;

use chrono::{DateTime, NaiveDate, Utc};

/// Win-rate and win/loss magnitude derived from recorded trades.
#[derive(Debug, Clone, Copy)]
pub struct KellyInputs {
    pub trades: usize,
    pub win_rate: f64,
    pub avg_win_eth: f64,
    pub avg_loss_eth: f64,
}

/// Capped window of realized trade results (ETH, signed).
#[derive(Debug)]
pub struct TradeHistory {
    trades: VecDeque<f64>,
    cap: usize,
}

impl TradeHistory {
    pub fn new(cap: usize) -> Self {
        Self {
            trades: VecDeque::with_capacity(cap.min(1024)),
            cap: cap.max(1),
        }
    }

    pub fn record(&mut self, realized_profit_eth: f64) {
        if self.trades.len() == self.cap {
            self.trades.pop_front();
        }
        self.trades.push_back(realized_profit_eth);
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// Kelly inputs over the whole retained window.
    pub fn kelly_inputs(&self) -> KellyInputs {
        let trades = self.trades.len();
        if trades == 0 {
            return KellyInputs {
                trades: 0,
                win_rate: 0.0,
                avg_win_eth: 0.0,
                avg_loss_eth: 0.0,
            };
        }

        let wins: Vec<f64> = self.trades.iter().copied().filter(|p| *p > 0.0).collect();
        let losses: Vec<f64> = self.trades.iter().copied().filter(|p| *p < 0.0).collect();

        let avg = |xs: &[f64]| {
            if xs.is_empty() {
                0.0
            } else {
                xs.iter().sum::<f64>() / xs.len() as f64
            }
        };

        KellyInputs {
            trades,
            win_rate: wins.len() as f64 / trades as f64,
            avg_win_eth: avg(&wins),
            avg_loss_eth: avg(&losses).abs(),
        }
    }
}

/// Daily realized profit and loss, reset on UTC date rollover.
#[derive(Debug)]
pub struct DailyLedger {
    date: NaiveDate,
    realized_loss_eth: f64,
    realized_profit_eth: f64,
}

impl DailyLedger {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            date: now.date_naive(),
            realized_loss_eth: 0.0,
            realized_profit_eth: 0.0,
        }
    }

    /// Reset counters if the UTC date has rolled over since the last call.
    pub fn roll(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if today != self.date {
            self.date = today;
            self.realized_loss_eth = 0.0;
            self.realized_profit_eth = 0.0;
        }
    }

    pub fn record(&mut self, now: DateTime<Utc>, realized_profit_eth: f64) {
        self.roll(now);
        if realized_profit_eth < 0.0 {
            self.realized_loss_eth += -realized_profit_eth;
        } else {
            self.realized_profit_eth += realized_profit_eth;
        }
    }

    pub fn loss_today_eth(&self) -> f64 {
        self.realized_loss_eth
    }

    pub fn profit_today_eth(&self) -> f64 {
        self.realized_profit_eth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn history_caps_and_computes_inputs() {
        let mut history = TradeHistory::new(4);
        for p in [1.0, -0.5, 2.0, -0.5, 1.0] {
            history.record(p);
        }
        // First entry evicted by the cap.
        assert_eq!(history.len(), 4);

        let inputs = history.kelly_inputs();
        assert_eq!(inputs.trades, 4);
        assert!((inputs.win_rate - 0.5).abs() < 1e-9);
        assert!((inputs.avg_win_eth - 1.5).abs() < 1e-9);
        assert!((inputs.avg_loss_eth - 0.5).abs() < 1e-9);
    }

    #[test]
    fn ledger_rolls_on_utc_midnight() {
        let day_one = Utc::now();
        let mut ledger = DailyLedger::new(day_one);
        ledger.record(day_one, -0.3);
        ledger.record(day_one, 0.1);
        assert!((ledger.loss_today_eth() - 0.3).abs() < 1e-9);
        assert!((ledger.profit_today_eth() - 0.1).abs() < 1e-9);

        let day_two = day_one + Duration::days(1);
        ledger.record(day_two, -0.05);
        assert!((ledger.loss_today_eth() - 0.05).abs() < 1e-9);
        assert!(ledger.profit_today_eth().abs() < 1e-9);
    }
}
