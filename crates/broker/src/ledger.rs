//! In-memory book of cash, collateral and positions for brokers that do
//! not have a real account behind them.

use std::collections::BTreeMap;

use premia_core::LegAction;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::types::{OrderRequest, Position, CONTRACT_MULTIPLIER};

/// Commission per contract on simulated fills.
pub const COMMISSION_PER_CONTRACT: Decimal = dec!(0.65);

#[derive(Debug, Clone)]
pub(crate) struct Ledger {
    cash: Decimal,
    /// Max loss reserved by open structures.
    reserved: Decimal,
    positions: BTreeMap<String, Position>,
}

impl Ledger {
    pub(crate) fn new(starting_cash: Decimal) -> Self {
        Self {
            cash: starting_cash,
            reserved: Decimal::ZERO,
            positions: BTreeMap::new(),
        }
    }

    pub(crate) fn cash(&self) -> Decimal {
        self.cash
    }

    pub(crate) fn buying_power(&self) -> Decimal {
        self.cash - self.reserved
    }

    pub(crate) fn positions(&self) -> Vec<Position> {
        self.positions.values().cloned().collect()
    }

    /// Books a fill at `net_price` per share. Returns the commission charged.
    pub(crate) fn apply_fill(&mut self, order: &OrderRequest, net_price: Decimal) -> Decimal {
        let commission = COMMISSION_PER_CONTRACT * Decimal::from(order.contract_count());
        self.cash += net_price * CONTRACT_MULTIPLIER * Decimal::from(order.quantity) - commission;
        self.reserved += order.total_max_loss();

        for leg in &order.legs {
            let signed = i64::from(leg.quantity) * i64::from(order.quantity);
            let delta = match leg.action {
                LegAction::SellToOpen | LegAction::SellToClose => -signed,
                LegAction::BuyToOpen | LegAction::BuyToClose => signed,
            };
            let position = self
                .positions
                .entry(leg.option_symbol.clone())
                .or_insert_with(|| Position {
                    option_symbol: leg.option_symbol.clone(),
                    underlying: leg.underlying.clone(),
                    strike: leg.strike,
                    right: leg.right,
                    expiration: leg.expiration,
                    quantity: 0,
                    average_price: Decimal::ZERO,
                });
            position.quantity += delta;
        }
        // Average price per leg is not tracked separately for multi-leg fills.
        if let [leg] = order.legs.as_slice() {
            if let Some(position) = self.positions.get_mut(&leg.option_symbol) {
                position.average_price = net_price;
            }
        }
        self.positions.retain(|_, p| p.quantity != 0);
        commission
    }
}
