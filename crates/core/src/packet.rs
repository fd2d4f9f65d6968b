//! Trade packets: the canonical output unit of the engine.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::market::OptionRight;

/// Tradable structure produced by a strategy engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    CashSecuredPut,
    CoveredCall,
    PutCreditSpread,
    CallCreditSpread,
}

impl StrategyKind {
    /// Registry order.
    #[must_use]
    pub fn all() -> [Self; 4] {
        [
            Self::CashSecuredPut,
            Self::CoveredCall,
            Self::PutCreditSpread,
            Self::CallCreditSpread,
        ]
    }

    /// Strategies that profit when the underlying holds or rises.
    #[must_use]
    pub fn is_bullish(self) -> bool {
        !matches!(self, Self::CallCreditSpread)
    }

    /// Defined-risk structures have a long protective leg.
    #[must_use]
    pub fn is_defined_risk(self) -> bool {
        matches!(self, Self::PutCreditSpread | Self::CallCreditSpread)
    }

    #[must_use]
    pub fn short_right(self) -> OptionRight {
        match self {
            Self::CashSecuredPut | Self::PutCreditSpread => OptionRight::Put,
            Self::CoveredCall | Self::CallCreditSpread => OptionRight::Call,
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::CashSecuredPut => "cash-secured put",
            Self::CoveredCall => "covered call",
            Self::PutCreditSpread => "put credit spread",
            Self::CallCreditSpread => "call credit spread",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegAction {
    SellToOpen,
    BuyToOpen,
    SellToClose,
    BuyToClose,
}

impl LegAction {
    #[must_use]
    pub fn is_sell(self) -> bool {
        matches!(self, Self::SellToOpen | Self::SellToClose)
    }
}

impl std::fmt::Display for LegAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SellToOpen => "sell_to_open",
            Self::BuyToOpen => "buy_to_open",
            Self::SellToClose => "sell_to_close",
            Self::BuyToClose => "buy_to_close",
        };
        write!(f, "{s}")
    }
}

/// One option leg of a trade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionLeg {
    pub action: LegAction,
    pub quantity: u32,
    pub strike: Decimal,
    pub right: OptionRight,
    pub expiration: NaiveDate,
    /// OCC option symbol.
    pub option_symbol: String,
    /// Mid premium per share at packet creation.
    pub premium: Decimal,
    pub delta: f64,
}

/// Liquidity observed on the short leg when the packet was built.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiquiditySnapshot {
    pub open_interest: u64,
    pub volume: u64,
    pub bid_ask_spread_pct: f64,
}

/// Components that made up a packet's score.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub annualized_return: f64,
    pub return_score: f64,
    pub probability_of_profit: f64,
    pub liquidity_score: f64,
    pub regime_adjustment: f64,
}

/// A proposed trade. Immutable once created; scoring produces a new packet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradePacket {
    pub id: Uuid,
    pub symbol: String,
    pub strategy: StrategyKind,
    pub legs: Vec<OptionLeg>,
    /// Net premium collected for one lot, in dollars.
    pub net_credit: Decimal,
    /// Worst-case loss for one lot, in dollars.
    pub max_loss: Decimal,
    pub dte: i64,
    pub expiration: NaiveDate,
    pub short_delta: f64,
    pub breakeven: Decimal,
    pub underlying_price: Decimal,
    pub liquidity: LiquiditySnapshot,
    pub score: f64,
    pub score_breakdown: Option<ScoreBreakdown>,
    pub created_at: DateTime<Utc>,
}

impl TradePacket {
    /// Copy of this packet carrying a score.
    #[must_use]
    pub fn with_score(&self, score: f64, breakdown: ScoreBreakdown) -> Self {
        Self {
            score,
            score_breakdown: Some(breakdown),
            ..self.clone()
        }
    }

    /// The leg that collects premium.
    #[must_use]
    pub fn short_leg(&self) -> Option<&OptionLeg> {
        self.legs.iter().find(|l| l.action.is_sell())
    }

    /// Spread width in dollars per share for two-leg structures.
    #[must_use]
    pub fn spread_width(&self) -> Option<Decimal> {
        if self.legs.len() != 2 {
            return None;
        }
        Some((self.legs[0].strike - self.legs[1].strike).abs())
    }

    /// Net credit per share (the limit price an order would carry).
    #[must_use]
    pub fn credit_per_share(&self) -> Decimal {
        self.net_credit / Decimal::ONE_HUNDRED
    }

    /// Return on risk, credit divided by max loss.
    #[must_use]
    pub fn return_on_risk(&self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        if self.max_loss <= Decimal::ZERO {
            return 0.0;
        }
        (self.net_credit / self.max_loss).to_f64().unwrap_or(0.0)
    }
}
