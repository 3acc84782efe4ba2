use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use std::sync::Arc;

use crate::error::EngineError;
use crate::market::GasOracle;

/// Highest recent prioritization fee (micro-lamports per CU).
///
/// Not all RPCs support getRecentPrioritizationFees; failures surface as
/// market-data errors so the engine records them and keeps running.
pub struct PriorityFeeOracle {
    rpc: Arc<RpcClient>,
}

impl PriorityFeeOracle {
    pub fn new(rpc: Arc<RpcClient>) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl GasOracle for PriorityFeeOracle {
    async fn gas_price(&self) -> Result<f64, EngineError> {
        let fees = self
            .rpc
            .get_recent_prioritization_fees(&[])
            .await
            .map_err(|e| EngineError::MarketData(format!("prioritization fees: {e}")))?;
        Ok(fees
            .iter()
            .map(|f| f.prioritization_fee)
            .max()
            .unwrap_or(0) as f64)
    }
}
