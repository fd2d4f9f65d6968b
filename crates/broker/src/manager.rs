//! Kill-switch gated order routing.
//!
//! Every call re-reads the switches from the settings passed in, so turning
//! `trading_enabled` off stops the next submission with no restart. Orders
//! that clear the gates are checked structurally and against the per-trade
//! and daily risk caps before they reach the paper book or the broker.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use premia_core::settings::ExecutionSwitches;
use premia_core::{parse_occ_symbol, TradePacket, TradingSettings};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{BrokerError, Result, SafetyGateRejection};
use crate::paper::PaperBrokerProvider;
use crate::provider::BrokerProvider;
use crate::types::{AccountInfo, OrderRequest, OrderResult, Position};

/// Where an order that cleared the gates went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionRoute {
    /// Simulated fill in the internal paper book.
    Paper,
    /// Validated only, nothing submitted.
    DryRun,
    /// Sent to the configured broker.
    Broker,
}

impl std::fmt::Display for ExecutionRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Paper => "paper",
            Self::DryRun => "dry_run",
            Self::Broker => "broker",
        };
        write!(f, "{s}")
    }
}

/// Picks the route for the current switches.
///
/// # Errors
/// `TradingDisabled` whenever the master switch is off, whatever the other
/// switches say. `BrokerExecutionDisabled` when trading is on but neither
/// paper mode nor broker execution is.
pub fn route_for(switches: &ExecutionSwitches) -> std::result::Result<ExecutionRoute, SafetyGateRejection> {
    if !switches.trading_enabled {
        return Err(SafetyGateRejection::TradingDisabled);
    }
    match (switches.broker_execution_enabled, switches.dry_run, switches.paper_mode_enabled) {
        (false, _, true) => Ok(ExecutionRoute::Paper),
        (true, true, _) => Ok(ExecutionRoute::DryRun),
        (true, false, _) => Ok(ExecutionRoute::Broker),
        (false, _, false) => Err(SafetyGateRejection::BrokerExecutionDisabled),
    }
}

/// Outcome of an order that cleared every gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub route: ExecutionRoute,
    pub request_id: Uuid,
    /// `None` for dry runs.
    pub order: Option<OrderResult>,
    pub message: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    PendingApproval,
    /// Approved and currently going through the gates.
    Submitting,
    Executed,
    /// Refused by a human or by a safety gate.
    Rejected,
    /// Cleared the gates but the broker call failed.
    Failed,
}

impl ProposalStatus {
    #[must_use]
    pub fn is_decided(self) -> bool {
        !matches!(self, Self::PendingApproval)
    }
}

/// A packet waiting for a human to approve or reject it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    pub id: Uuid,
    pub packet: TradePacket,
    pub request: OrderRequest,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub report: Option<ExecutionReport>,
    /// Rejection or failure reason.
    pub reason: Option<String>,
}

/// Max loss committed through execution today.
#[derive(Debug, Clone)]
struct DailyRisk {
    date: NaiveDate,
    committed: Decimal,
}

impl DailyRisk {
    fn new(today: NaiveDate) -> Self {
        Self {
            date: today,
            committed: Decimal::ZERO,
        }
    }

    fn roll(&mut self, today: NaiveDate) {
        if today != self.date {
            tracing::info!(previous = %self.date, committed = %self.committed, "daily risk reset");
            self.date = today;
            self.committed = Decimal::ZERO;
        }
    }

    /// Reserves `amount` if it fits under `budget`.
    fn try_reserve(&mut self, today: NaiveDate, amount: Decimal, budget: Decimal) -> std::result::Result<(), SafetyGateRejection> {
        self.roll(today);
        if self.committed + amount > budget {
            return Err(SafetyGateRejection::RiskLimit(format!(
                "daily committed risk {} plus {} exceeds daily budget {}",
                self.committed, amount, budget
            )));
        }
        self.committed += amount;
        Ok(())
    }

    fn release(&mut self, today: NaiveDate, amount: Decimal) {
        if today == self.date {
            self.committed = (self.committed - amount).max(Decimal::ZERO);
        }
    }
}

/// Structural checks every order must pass, whatever the route.
///
/// # Errors
/// `InvalidOrder` naming the first failed check.
pub fn validate_order(order: &OrderRequest, today: NaiveDate) -> std::result::Result<(), SafetyGateRejection> {
    let invalid = |msg: String| Err(SafetyGateRejection::InvalidOrder(msg));

    if order.legs.is_empty() {
        return invalid("order has no legs".to_string());
    }
    if order.quantity == 0 {
        return invalid("order quantity must be positive".to_string());
    }
    for leg in &order.legs {
        if leg.underlying != order.symbol {
            return invalid(format!(
                "leg {} underlying {} does not match order symbol {}",
                leg.option_symbol, leg.underlying, order.symbol
            ));
        }
        if leg.strike <= Decimal::ZERO {
            return invalid(format!("leg {} has non-positive strike", leg.option_symbol));
        }
        if leg.expiration < today {
            return invalid(format!("leg {} expired on {}", leg.option_symbol, leg.expiration));
        }
        if leg.quantity == 0 {
            return invalid(format!("leg {} quantity must be positive", leg.option_symbol));
        }
        let Some(occ) = parse_occ_symbol(&leg.option_symbol) else {
            return invalid(format!("leg symbol {} is not an OCC option symbol", leg.option_symbol));
        };
        if !occ.underlying.eq_ignore_ascii_case(&leg.underlying)
            || occ.expiration != leg.expiration
            || occ.right != leg.right
            || occ.strike != leg.strike
        {
            return invalid(format!(
                "leg symbol {} does not match {} {}{} {}",
                leg.option_symbol, leg.underlying, leg.strike, leg.right, leg.expiration
            ));
        }
    }
    match order.legs.as_slice() {
        [single] if !single.action.is_sell() => {
            return invalid(format!("single leg {} must be a sell", single.option_symbol));
        }
        [a, b] => {
            if a.expiration != b.expiration {
                return invalid("spread legs expire on different dates".to_string());
            }
            if a.right != b.right {
                return invalid("spread legs mix puts and calls".to_string());
            }
            if a.action.is_sell() == b.action.is_sell() {
                return invalid("spread needs exactly one sold and one bought leg".to_string());
            }
        }
        _ => {}
    }
    if order.limit_price <= Decimal::ZERO {
        return invalid(format!("limit price {} must be positive", order.limit_price));
    }
    if order.max_loss_per_lot <= Decimal::ZERO {
        return invalid(format!("max loss per lot {} must be positive", order.max_loss_per_lot));
    }
    match order.max_structure_value() {
        None => invalid(format!("unsupported structure with {} legs", order.legs.len())),
        Some(max) if order.limit_price >= max => invalid(format!(
            "limit price {} is not below the structure's max value {}",
            order.limit_price, max
        )),
        Some(_) => Ok(()),
    }
}

pub struct BrokerExecutionManager {
    broker: Arc<dyn BrokerProvider>,
    paper: PaperBrokerProvider,
    daily: Mutex<DailyRisk>,
    proposals: Mutex<HashMap<Uuid, Proposal>>,
}

impl BrokerExecutionManager {
    /// `paper_starting_cash` seeds the internal paper book used in paper mode.
    pub fn new(broker: Arc<dyn BrokerProvider>, paper_starting_cash: Decimal) -> Self {
        Self {
            broker,
            paper: PaperBrokerProvider::new(paper_starting_cash),
            daily: Mutex::new(DailyRisk::new(Utc::now().date_naive())),
            proposals: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn broker(&self) -> &Arc<dyn BrokerProvider> {
        &self.broker
    }

    /// Max loss committed through paper or broker fills today.
    #[must_use]
    pub fn daily_committed_risk(&self) -> Decimal {
        let mut daily = self.daily.lock();
        daily.roll(Utc::now().date_naive());
        daily.committed
    }

    /// Runs the gate chain and routes the order.
    ///
    /// # Errors
    /// `Gate` for any safety gate rejection; provider errors from the
    /// paper book or broker pass through unchanged.
    pub async fn submit(&self, order: &OrderRequest, settings: &TradingSettings) -> Result<ExecutionReport> {
        let route = match route_for(&settings.execution) {
            Ok(route) => route,
            Err(rejection) => {
                tracing::warn!(request_id = %order.id, symbol = %order.symbol, %rejection, "order rejected at gate");
                return Err(rejection.into());
            }
        };

        let today = Utc::now().date_naive();
        if let Err(rejection) = validate_order(order, today).and_then(|()| check_per_trade(order, settings)) {
            tracing::warn!(request_id = %order.id, symbol = %order.symbol, %route, %rejection, "order rejected");
            return Err(rejection.into());
        }

        let max_loss = order.total_max_loss();
        let daily_budget = settings.daily_risk_budget();

        if route == ExecutionRoute::DryRun {
            let mut trial = self.daily.lock().clone();
            if let Err(rejection) = trial.try_reserve(today, max_loss, daily_budget) {
                tracing::warn!(request_id = %order.id, symbol = %order.symbol, %route, %rejection, "order rejected");
                return Err(rejection.into());
            }
            tracing::info!(request_id = %order.id, symbol = %order.symbol, "dry run: order validated");
            return Ok(ExecutionReport {
                route,
                request_id: order.id,
                order: None,
                message: format!("dry run: {} x{} validated, nothing submitted", order.symbol, order.quantity),
                at: Utc::now(),
            });
        }

        if let Err(rejection) = self.daily.lock().try_reserve(today, max_loss, daily_budget) {
            tracing::warn!(request_id = %order.id, symbol = %order.symbol, %route, %rejection, "order rejected");
            return Err(rejection.into());
        }

        let provider: &dyn BrokerProvider = match route {
            ExecutionRoute::Paper => &self.paper,
            _ => self.broker.as_ref(),
        };
        match provider.submit_order(order).await {
            Ok(result) => {
                tracing::info!(
                    request_id = %order.id,
                    order_id = %result.order_id,
                    broker = provider.name(),
                    %route,
                    max_loss = %max_loss,
                    "order routed"
                );
                Ok(ExecutionReport {
                    route,
                    request_id: order.id,
                    message: format!("{} order {} is {}", provider.name(), result.order_id, result.status),
                    order: Some(result),
                    at: Utc::now(),
                })
            }
            Err(e) => {
                self.daily.lock().release(today, max_loss);
                tracing::error!(request_id = %order.id, broker = provider.name(), error = %e, "order submission failed");
                Err(e)
            }
        }
    }

    /// Records a packet for human approval. Nothing is checked yet.
    pub fn propose(&self, packet: &TradePacket, quantity: u32) -> Proposal {
        let proposal = Proposal {
            id: Uuid::new_v4(),
            packet: packet.clone(),
            request: OrderRequest::from_packet(packet, quantity),
            status: ProposalStatus::PendingApproval,
            created_at: Utc::now(),
            decided_at: None,
            report: None,
            reason: None,
        };
        tracing::info!(proposal_id = %proposal.id, symbol = %packet.symbol, strategy = %packet.strategy, "proposal created");
        self.proposals.lock().insert(proposal.id, proposal.clone());
        proposal
    }

    /// Approves a pending proposal and submits it under `settings`.
    ///
    /// # Errors
    /// `NotFound` for an unknown id, `InvalidState` if the proposal was
    /// already decided, otherwise whatever [`submit`](Self::submit) returns.
    pub async fn approve(&self, id: Uuid, settings: &TradingSettings) -> Result<ExecutionReport> {
        let request = {
            let mut proposals = self.proposals.lock();
            let proposal = proposals
                .get_mut(&id)
                .ok_or_else(|| BrokerError::not_found(format!("proposal {id}")))?;
            if proposal.status.is_decided() {
                return Err(BrokerError::invalid_state(format!(
                    "proposal {id} is already {:?}",
                    proposal.status
                )));
            }
            proposal.status = ProposalStatus::Submitting;
            proposal.request.clone()
        };

        let outcome = self.submit(&request, settings).await;

        let mut proposals = self.proposals.lock();
        if let Some(proposal) = proposals.get_mut(&id) {
            proposal.decided_at = Some(Utc::now());
            match &outcome {
                Ok(report) => {
                    proposal.status = ProposalStatus::Executed;
                    proposal.report = Some(report.clone());
                }
                Err(e) => {
                    proposal.status = if e.is_gate_rejection() {
                        ProposalStatus::Rejected
                    } else {
                        ProposalStatus::Failed
                    };
                    proposal.reason = Some(e.to_string());
                }
            }
        }
        outcome
    }

    /// Rejects a pending proposal.
    ///
    /// # Errors
    /// `NotFound` for an unknown id, `InvalidState` if already decided.
    pub fn reject(&self, id: Uuid, reason: impl Into<String>) -> Result<Proposal> {
        let mut proposals = self.proposals.lock();
        let proposal = proposals
            .get_mut(&id)
            .ok_or_else(|| BrokerError::not_found(format!("proposal {id}")))?;
        if proposal.status.is_decided() {
            return Err(BrokerError::invalid_state(format!(
                "proposal {id} is already {:?}",
                proposal.status
            )));
        }
        proposal.status = ProposalStatus::Rejected;
        proposal.decided_at = Some(Utc::now());
        proposal.reason = Some(reason.into());
        tracing::info!(proposal_id = %id, "proposal rejected");
        Ok(proposal.clone())
    }

    #[must_use]
    pub fn get_proposal(&self, id: Uuid) -> Option<Proposal> {
        self.proposals.lock().get(&id).cloned()
    }

    /// All proposals, oldest first.
    #[must_use]
    pub fn proposals(&self) -> Vec<Proposal> {
        let mut all: Vec<Proposal> = self.proposals.lock().values().cloned().collect();
        all.sort_by_key(|p| p.created_at);
        all
    }

    fn provider_for(&self, route: ExecutionRoute) -> Result<&dyn BrokerProvider> {
        match route {
            ExecutionRoute::Paper => Ok(&self.paper),
            ExecutionRoute::Broker => Ok(self.broker.as_ref()),
            ExecutionRoute::DryRun => Err(BrokerError::invalid_state("dry runs hold no orders or accounts")),
        }
    }

    /// Cancels an order on the route it was sent to. Cancels are never gated.
    ///
    /// # Errors
    /// `InvalidState` for the dry-run route; otherwise the provider's error.
    pub async fn cancel_order(&self, route: ExecutionRoute, order_id: &str) -> Result<OrderResult> {
        self.provider_for(route)?.cancel_order(order_id).await
    }

    /// # Errors
    /// `InvalidState` for the dry-run route; otherwise the provider's error.
    pub async fn account_info(&self, route: ExecutionRoute) -> Result<AccountInfo> {
        self.provider_for(route)?.get_account_info().await
    }

    /// # Errors
    /// `InvalidState` for the dry-run route; otherwise the provider's error.
    pub async fn positions(&self, route: ExecutionRoute) -> Result<Vec<Position>> {
        self.provider_for(route)?.get_positions().await
    }
}

fn check_per_trade(order: &OrderRequest, settings: &TradingSettings) -> std::result::Result<(), SafetyGateRejection> {
    let max_loss = order.total_max_loss();
    let budget = settings.per_trade_risk_budget();
    if max_loss > budget {
        return Err(SafetyGateRejection::RiskLimit(format!(
            "max loss {max_loss} exceeds per-trade budget {budget}"
        )));
    }
    Ok(())
}
