use anyhow::{anyhow, Result};
use solana_client::nonblocking::rpc_client::RpcClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use blockbot::chain::{PriorityFeeOracle, RpcDcaClient};
use blockbot::config::Config;
use blockbot::execution::{Collaborators, ExecutionEngine, ExecutionStatus};
use blockbot::market::{JupiterPriceSource, MarketDataSource, SimulatedMarketSource};
use blockbot::monitoring;
use blockbot::registry::BlockRegistry;
use blockbot::template::load_template;
use blockbot::validation::ValidationService;
use blockbot::wallet::{DisconnectedWallet, KeypairWallet, WalletProvider};

#[tokio::main]
async fn main() -> Result<()> {
    // Load local .env if present (no-op in prod/systemd envs)
    let _ = dotenvy::dotenv();

    let cfg = Config::from_env()?;
    monitoring::init_tracing(cfg.log_json);
    info!(?cfg, "boot");

    let registry = BlockRegistry::with_defaults();
    let path = cfg
        .strategy_path
        .as_deref()
        .ok_or_else(|| anyhow!("BOT_STRATEGY_PATH is required"))?;
    let loaded = load_template(path, &registry)?;

    let report = ValidationService::new().validate_strategy(&loaded.strategy);
    if !report.is_valid {
        for e in &report.errors {
            error!(kind = ?e.kind, block = ?e.block_id, "{}", e.message);
        }
        return Err(anyhow!(
            "strategy {} is invalid ({} errors)",
            loaded.template_id,
            report.errors.len()
        ));
    }

    let rpc = Arc::new(RpcClient::new(cfg.rpc_http_url.clone()));
    let market: Arc<dyn MarketDataSource> = if cfg.simulated_market {
        Arc::new(SimulatedMarketSource::new(100.0, 0.01))
    } else {
        Arc::new(JupiterPriceSource::new(
            cfg.price_api_url.clone(),
            cfg.price_mint.clone(),
        ))
    };
    let wallet: Arc<dyn WalletProvider> = match cfg.sol_keypair_path.as_deref() {
        Some(p) => Arc::new(KeypairWallet::from_file(p)?),
        None => {
            warn!("SOL_KEYPAIR_PATH not set; on-chain actions will be refused");
            Arc::new(DisconnectedWallet)
        }
    };

    let deps = Collaborators {
        market,
        gas: Arc::new(PriorityFeeOracle::new(rpc.clone())),
        wallet,
        dca: Arc::new(RpcDcaClient::new(rpc, cfg.dry_run)),
        program_ids: cfg.program_ids()?,
    };
    let engine = ExecutionEngine::new(loaded.strategy, cfg.engine_config(), deps);
    engine.start().await;

    let mut poll = tokio::time::interval(Duration::from_millis(250));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown.signal");
                break;
            }
            _ = poll.tick() => {
                if matches!(engine.status(), ExecutionStatus::Error | ExecutionStatus::Success) {
                    break;
                }
            }
        }
    }

    let state = engine.execution_state();
    let metrics = engine.metrics();
    engine.stop();
    info!(
        status = ?state.status,
        signature = ?state.last_signature,
        errors = state.errors.len(),
        total_trades = metrics.total_trades,
        failed_trades = metrics.failed_trades,
        profit_loss = metrics.profit_loss,
        "shutdown"
    );
    for e in &state.errors {
        warn!(error = %e, "shutdown.error");
    }

    if state.status == ExecutionStatus::Error {
        return Err(anyhow!("strategy halted with errors"));
    }
    Ok(())
}
