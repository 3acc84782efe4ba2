use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::graph::{BlockId, Strategy};
use crate::market::MarketData;
use crate::wallet::WalletBalance;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Error,
    Success,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkStatus {
    Connected,
    Degraded,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Buy,
    Sell,
    Trigger,
    Condition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    Pending,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutedAction {
    pub block_id: BlockId,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    pub status: ActionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pair: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ExecutedAction {
    pub fn new(block_id: &str, action_type: ActionType, status: ActionStatus, now: DateTime<Utc>) -> Self {
        Self {
            block_id: block_id.to_string(),
            timestamp: now,
            action_type,
            amount: None,
            price: None,
            status,
            tx_hash: None,
            pair: None,
            error_message: None,
        }
    }

    /// Buy and sell records; signals are excluded.
    pub fn is_order(&self) -> bool {
        matches!(self.action_type, ActionType::Buy | ActionType::Sell)
    }
}

/// Externally visible engine state. Readers always get a copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    pub status: ExecutionStatus,
    pub last_update: DateTime<Utc>,
    pub errors: Vec<String>,
    pub current_block: Option<BlockId>,
    pub network_status: Option<NetworkStatus>,
    pub gas_price: Option<f64>,
    pub executed_actions: Vec<ExecutedAction>,
    /// Signature of the DCA setup transaction once submitted.
    pub last_signature: Option<String>,
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self {
            status: ExecutionStatus::Idle,
            last_update: Utc::now(),
            errors: Vec::new(),
            current_block: None,
            network_status: None,
            gas_price: None,
            executed_actions: Vec::new(),
            last_signature: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetrics {
    pub total_trades: u64,
    pub failed_trades: u64,
    /// Percentage of order attempts that completed.
    pub success_rate: f64,
    pub gas_used: f64,
    pub profit_loss: f64,
    pub last_trade_time: Option<DateTime<Utc>>,
    pub cycles_run: u64,
    pub skipped_cycles: u64,
}

/// Block state carried from one cycle to the next.
#[derive(Debug, Clone, Default)]
pub struct CycleMemory {
    /// When each delay block was first activated.
    pub delay_started: HashMap<BlockId, DateTime<Utc>>,
    pub last_fired: HashMap<BlockId, DateTime<Utc>>,
    /// Limit orders waiting for the price to cross.
    pub resting_orders: HashSet<BlockId>,
}

/// How many upstream blocks a block has, and how many of them fired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputSignal {
    pub total: usize,
    pub fired: usize,
}

impl InputSignal {
    pub fn any(&self) -> bool {
        self.fired > 0
    }

    pub fn all(&self) -> bool {
        self.total > 0 && self.fired == self.total
    }
}

pub struct ExecutionContext<'a> {
    pub strategy: &'a Strategy,
    pub market: &'a MarketData,
    pub balances: &'a WalletBalance,
    pub memory: &'a mut CycleMemory,
    pub inputs: InputSignal,
    pub now: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_signal_gates() {
        let none = InputSignal { total: 2, fired: 0 };
        let some = InputSignal { total: 2, fired: 1 };
        let all = InputSignal { total: 2, fired: 2 };
        assert!(!none.any() && !none.all());
        assert!(some.any() && !some.all());
        assert!(all.any() && all.all());
        assert!(!InputSignal::default().all());
    }

    #[test]
    fn state_serializes_for_the_ui() {
        let mut state = ExecutionState::default();
        state.executed_actions.push(ExecutedAction::new(
            "b1",
            ActionType::Buy,
            ActionStatus::Completed,
            Utc::now(),
        ));
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["status"], "idle");
        assert_eq!(json["executedActions"][0]["type"], "buy");
        assert_eq!(json["executedActions"][0]["status"], "completed");
        assert!(json["executedActions"][0].get("txHash").is_none());
    }
}
