//! Order execution for premia trade packets.
//!
//! Every submission passes through [`BrokerExecutionManager`], which checks
//! the kill switches in [`ExecutionSwitches`](premia_core::settings::ExecutionSwitches)
//! before anything reaches a broker. Brokers implement [`BrokerProvider`]:
//!
//! - [`ManualBrokerProvider`]: orders become tickets a human places by hand
//! - [`PaperBrokerProvider`]: deterministic fills at the limit price
//! - [`TradierBrokerProvider`]: live orders over the Tradier REST API

pub mod error;
pub mod factory;
mod ledger;
pub mod manager;
pub mod manual;
pub mod paper;
pub mod provider;
pub mod tradier;
pub mod types;

pub use error::{BrokerError, Result, SafetyGateRejection};
pub use factory::create_broker;
pub use ledger::COMMISSION_PER_CONTRACT;
pub use manager::{
    route_for, validate_order, BrokerExecutionManager, ExecutionReport, ExecutionRoute, Proposal, ProposalStatus,
};
pub use manual::ManualBrokerProvider;
pub use paper::PaperBrokerProvider;
pub use provider::BrokerProvider;
pub use tradier::TradierBrokerProvider;
pub use types::{
    AccountInfo, OrderLeg, OrderRequest, OrderResult, OrderStatus, Position, TimeInForce, CONTRACT_MULTIPLIER,
};
