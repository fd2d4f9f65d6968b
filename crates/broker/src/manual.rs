//! Manual broker: orders become tickets a human places by hand.
//!
//! `submit_order` only records the ticket. The human reports back through
//! [`ManualBrokerProvider::confirm_fill`] or cancels it.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use premia_core::BrokerKind;
use rust_decimal::Decimal;

use crate::error::{BrokerError, Result};
use crate::ledger::Ledger;
use crate::provider::BrokerProvider;
use crate::types::{AccountInfo, OrderRequest, OrderResult, OrderStatus, Position};

struct Ticket {
    order: OrderRequest,
    result: OrderResult,
}

pub struct ManualBrokerProvider {
    tickets: Mutex<HashMap<String, Ticket>>,
    ledger: Mutex<Ledger>,
    sequence: AtomicU64,
}

impl Default for ManualBrokerProvider {
    fn default() -> Self {
        Self::new(Decimal::ZERO)
    }
}

impl ManualBrokerProvider {
    /// `starting_cash` seeds the local book that confirmed fills update.
    pub fn new(starting_cash: Decimal) -> Self {
        Self {
            tickets: Mutex::new(HashMap::new()),
            ledger: Mutex::new(Ledger::new(starting_cash)),
            sequence: AtomicU64::new(1),
        }
    }

    /// Tickets still waiting for a human.
    #[must_use]
    pub fn pending_tickets(&self) -> Vec<OrderResult> {
        let mut pending: Vec<OrderResult> = self
            .tickets
            .lock()
            .values()
            .filter(|t| t.result.status == OrderStatus::PendingManual)
            .map(|t| t.result.clone())
            .collect();
        pending.sort_by(|a, b| a.order_id.cmp(&b.order_id));
        pending
    }

    /// Records that the human got filled at `fill_price` (net credit per share).
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown ticket, `InvalidState` if the
    /// ticket is no longer pending.
    pub fn confirm_fill(&self, order_id: &str, fill_price: Decimal) -> Result<OrderResult> {
        let mut tickets = self.tickets.lock();
        let ticket = tickets
            .get_mut(order_id)
            .ok_or_else(|| BrokerError::not_found(format!("ticket {order_id}")))?;
        if ticket.result.status != OrderStatus::PendingManual {
            return Err(BrokerError::invalid_state(format!(
                "ticket {order_id} is already {}",
                ticket.result.status
            )));
        }

        let commission = self.ledger.lock().apply_fill(&ticket.order, fill_price);
        ticket.result.status = OrderStatus::Filled;
        ticket.result.filled_quantity = ticket.order.quantity;
        ticket.result.avg_fill_price = Some(fill_price);
        ticket.result.commission = commission;
        ticket.result.updated_at = Utc::now();

        tracing::info!(order_id, price = %fill_price, "manual ticket filled");
        Ok(ticket.result.clone())
    }

    fn next_order_id(&self) -> String {
        format!("MANUAL-{:06}", self.sequence.fetch_add(1, Ordering::Relaxed))
    }
}

/// Plain-text placing instructions for a ticket.
fn instructions(order: &OrderRequest) -> String {
    let mut text = format!(
        "{} x{} {} limit credit {} ({:?})",
        order.symbol, order.quantity, order.strategy, order.limit_price, order.time_in_force
    );
    for leg in &order.legs {
        let _ = write!(
            text,
            "; {} {} {} {}{} {}",
            leg.action,
            leg.quantity * order.quantity,
            leg.underlying,
            leg.strike,
            leg.right,
            leg.expiration
        );
    }
    text
}

#[async_trait]
impl BrokerProvider for ManualBrokerProvider {
    fn name(&self) -> &str {
        "manual"
    }

    fn kind(&self) -> BrokerKind {
        BrokerKind::Manual
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderResult> {
        let now = Utc::now();
        let result = OrderResult {
            order_id: self.next_order_id(),
            client_order_id: Some(order.id),
            broker: self.name().to_string(),
            status: OrderStatus::PendingManual,
            quantity: order.quantity,
            filled_quantity: 0,
            avg_fill_price: None,
            commission: Decimal::ZERO,
            submitted_at: now,
            updated_at: now,
            note: Some(instructions(order)),
        };

        tracing::info!(order_id = %result.order_id, symbol = %order.symbol, "manual ticket recorded");

        self.tickets.lock().insert(
            result.order_id.clone(),
            Ticket {
                order: order.clone(),
                result: result.clone(),
            },
        );
        Ok(result)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<OrderResult> {
        let mut tickets = self.tickets.lock();
        let ticket = tickets
            .get_mut(order_id)
            .ok_or_else(|| BrokerError::not_found(format!("ticket {order_id}")))?;
        if ticket.result.status.is_terminal() {
            return Err(BrokerError::invalid_state(format!(
                "ticket {order_id} is already {}",
                ticket.result.status
            )));
        }
        ticket.result.status = OrderStatus::Cancelled;
        ticket.result.updated_at = Utc::now();
        Ok(ticket.result.clone())
    }

    async fn get_order(&self, order_id: &str) -> Result<OrderResult> {
        self.tickets
            .lock()
            .get(order_id)
            .map(|t| t.result.clone())
            .ok_or_else(|| BrokerError::not_found(format!("ticket {order_id}")))
    }

    async fn get_account_info(&self) -> Result<AccountInfo> {
        let open_orders = self.pending_tickets().len();
        let ledger = self.ledger.lock();
        Ok(AccountInfo {
            account_id: "manual".to_string(),
            broker: self.name().to_string(),
            cash: ledger.cash(),
            equity: ledger.cash(),
            buying_power: ledger.buying_power(),
            open_orders,
        })
    }

    async fn get_positions(&self) -> Result<Vec<Position>> {
        Ok(self.ledger.lock().positions())
    }
}
