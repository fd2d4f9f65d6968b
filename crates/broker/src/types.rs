//! Orders, fills, account and position records.

use chrono::{DateTime, NaiveDate, Utc};
use premia_core::{LegAction, OptionRight, StrategyKind, TradePacket};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Contract multiplier for standard US equity options.
pub const CONTRACT_MULTIPLIER: Decimal = Decimal::ONE_HUNDRED;

/// One option leg of an order, quantity per lot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderLeg {
    /// OCC option symbol.
    pub option_symbol: String,
    pub underlying: String,
    pub strike: Decimal,
    pub right: OptionRight,
    pub expiration: NaiveDate,
    pub action: LegAction,
    pub quantity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeInForce {
    Day,
    Gtc,
}

/// A net-credit limit order for one option structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    /// Client-side id, echoed back on results.
    pub id: Uuid,
    pub symbol: String,
    pub strategy: StrategyKind,
    pub legs: Vec<OrderLeg>,
    /// Number of lots.
    pub quantity: u32,
    /// Net credit per share.
    pub limit_price: Decimal,
    /// Worst-case loss per lot, in dollars.
    pub max_loss_per_lot: Decimal,
    /// Needed to bound the limit price of a lone short call.
    pub underlying_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
    pub packet_id: Option<Uuid>,
}

impl OrderRequest {
    /// Order for `quantity` lots of a packet at its net credit.
    #[must_use]
    pub fn from_packet(packet: &TradePacket, quantity: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: packet.symbol.clone(),
            strategy: packet.strategy,
            legs: packet
                .legs
                .iter()
                .map(|leg| OrderLeg {
                    option_symbol: leg.option_symbol.clone(),
                    underlying: packet.symbol.clone(),
                    strike: leg.strike,
                    right: leg.right,
                    expiration: leg.expiration,
                    action: leg.action,
                    quantity: leg.quantity,
                })
                .collect(),
            quantity,
            limit_price: packet.credit_per_share().round_dp(2),
            max_loss_per_lot: packet.max_loss,
            underlying_price: Some(packet.underlying_price),
            time_in_force: TimeInForce::Day,
            packet_id: Some(packet.id),
        }
    }

    /// Dollar credit for the whole order at the limit.
    #[must_use]
    pub fn total_credit(&self) -> Decimal {
        self.limit_price * CONTRACT_MULTIPLIER * Decimal::from(self.quantity)
    }

    #[must_use]
    pub fn total_max_loss(&self) -> Decimal {
        self.max_loss_per_lot * Decimal::from(self.quantity)
    }

    /// Contracts across all legs.
    #[must_use]
    pub fn contract_count(&self) -> u32 {
        self.legs.iter().map(|l| l.quantity).sum::<u32>() * self.quantity
    }

    /// Highest net credit per share the structure can be worth: the width
    /// for spreads, the strike for a lone put, spot for a lone call.
    #[must_use]
    pub fn max_structure_value(&self) -> Option<Decimal> {
        match self.legs.as_slice() {
            [a, b] => Some((a.strike - b.strike).abs()),
            [single] => match single.right {
                OptionRight::Put => Some(single.strike),
                OptionRight::Call => self.underlying_price,
            },
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Ticket waiting for a human to place it.
    PendingManual,
    Submitted,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Filled | Self::Cancelled | Self::Rejected)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::PendingManual => "pending_manual",
            Self::Submitted => "submitted",
            Self::PartiallyFilled => "partially_filled",
            Self::Filled => "filled",
            Self::Cancelled => "cancelled",
            Self::Rejected => "rejected",
        };
        write!(f, "{s}")
    }
}

/// A broker's view of one order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub client_order_id: Option<Uuid>,
    pub broker: String,
    pub status: OrderStatus,
    pub quantity: u32,
    pub filled_quantity: u32,
    /// Net credit per share actually received.
    pub avg_fill_price: Option<Decimal>,
    pub commission: Decimal,
    pub submitted_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Human-readable detail (ticket instructions, broker message).
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    pub account_id: String,
    pub broker: String,
    pub cash: Decimal,
    pub equity: Decimal,
    /// Cash not reserved as collateral.
    pub buying_power: Decimal,
    pub open_orders: usize,
}

/// Net option position. Negative quantity is short.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub option_symbol: String,
    pub underlying: String,
    pub strike: Decimal,
    pub right: OptionRight,
    pub expiration: NaiveDate,
    pub quantity: i64,
    /// Average premium per share, always positive.
    pub average_price: Decimal,
}
