//! The broker abstraction.

use async_trait::async_trait;
use premia_core::BrokerKind;

use crate::error::Result;
use crate::types::{AccountInfo, OrderRequest, OrderResult, Position};

/// Uniform order and account surface, so the execution manager does not
/// care which broker sits behind it.
#[async_trait]
pub trait BrokerProvider: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> BrokerKind;

    async fn submit_order(&self, order: &OrderRequest) -> Result<OrderResult>;

    async fn cancel_order(&self, order_id: &str) -> Result<OrderResult>;

    async fn get_order(&self, order_id: &str) -> Result<OrderResult>;

    async fn get_account_info(&self) -> Result<AccountInfo>;

    async fn get_positions(&self) -> Result<Vec<Position>>;
}
