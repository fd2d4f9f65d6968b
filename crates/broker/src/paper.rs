//! Paper broker: deterministic fills at the limit price.
//!
//! Never contacts an external system. Tracks cash, reserved collateral and
//! positions in memory.

use std::collections::HashMap;
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

pub struct PaperBrokerProvider {
    ledger: Mutex<Ledger>,
    orders: Mutex<HashMap<String, OrderResult>>,
    sequence: AtomicU64,
}

impl PaperBrokerProvider {
    pub fn new(starting_cash: Decimal) -> Self {
        Self {
            ledger: Mutex::new(Ledger::new(starting_cash)),
            orders: Mutex::new(HashMap::new()),
            sequence: AtomicU64::new(1),
        }
    }

    fn next_order_id(&self) -> String {
        format!("PAPER-{:06}", self.sequence.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Debug for PaperBrokerProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaperBrokerProvider")
            .field("orders", &self.orders.lock().len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BrokerProvider for PaperBrokerProvider {
    fn name(&self) -> &str {
        "paper"
    }

    fn kind(&self) -> BrokerKind {
        BrokerKind::Paper
    }

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderResult> {
        let fill_price = order.limit_price;
        let commission = self.ledger.lock().apply_fill(order, fill_price);
        let now = Utc::now();

        let result = OrderResult {
            order_id: self.next_order_id(),
            client_order_id: Some(order.id),
            broker: self.name().to_string(),
            status: OrderStatus::Filled,
            quantity: order.quantity,
            filled_quantity: order.quantity,
            avg_fill_price: Some(fill_price),
            commission,
            submitted_at: now,
            updated_at: now,
            note: None,
        };

        tracing::info!(
            order_id = %result.order_id,
            symbol = %order.symbol,
            strategy = %order.strategy,
            price = %fill_price,
            quantity = order.quantity,
            "paper fill simulated"
        );

        self.orders.lock().insert(result.order_id.clone(), result.clone());
        Ok(result)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<OrderResult> {
        let orders = self.orders.lock();
        let order = orders
            .get(order_id)
            .ok_or_else(|| BrokerError::not_found(format!("order {order_id}")))?;
        Err(BrokerError::invalid_state(format!(
            "order {order_id} is {} and cannot be cancelled",
            order.status
        )))
    }

    async fn get_order(&self, order_id: &str) -> Result<OrderResult> {
        self.orders
            .lock()
            .get(order_id)
            .cloned()
            .ok_or_else(|| BrokerError::not_found(format!("order {order_id}")))
    }

    async fn get_account_info(&self) -> Result<AccountInfo> {
        let ledger = self.ledger.lock();
        Ok(AccountInfo {
            account_id: "paper".to_string(),
            broker: self.name().to_string(),
            cash: ledger.cash(),
            equity: ledger.cash(),
            buying_power: ledger.buying_power(),
            open_orders: 0,
        })
    }

    async fn get_positions(&self) -> Result<Vec<Position>> {
        Ok(self.ledger.lock().positions())
    }
}
