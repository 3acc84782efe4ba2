use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use blockbot::chain::{DcaProgramClient, ProgramIds, SetupDcaAccounts, SetupDcaParams};
use blockbot::execution::executors::{BlockExecutor, ExecutorRegistry};
use blockbot::execution::types::ExecutionContext;
use blockbot::execution::{
    ActionStatus, ActionType, Collaborators, EngineConfig, ExecutedAction, ExecutionEngine,
    ExecutionMetrics, ExecutionStatus, NetworkStatus, RetryPolicy,
};
use blockbot::graph::{Block, Position, Strategy};
use blockbot::market::{FixedGasOracle, MarketData, MarketDataSource, ScriptedMarketSource};
use blockbot::wallet::{DisconnectedWallet, WalletProvider};
use blockbot::{BlockRegistry, EngineError, ValidationService};

struct NoDca;

#[async_trait]
impl DcaProgramClient for NoDca {
    async fn setup_dca(
        &self,
        _wallet: &dyn WalletProvider,
        _program_id: Pubkey,
        _params: &SetupDcaParams,
        _accounts: &SetupDcaAccounts,
    ) -> Result<String, EngineError> {
        Err(EngineError::Transaction("unexpected DCA call".into()))
    }
}

fn config() -> EngineConfig {
    EngineConfig {
        cycle_interval: Duration::from_secs(60),
        max_gas_price: 50_000.0,
        retry: RetryPolicy {
            attempts: 3,
            base_delay: Duration::from_millis(10),
        },
        max_errors: 100,
    }
}

/// Always fails with a retryable error.
#[derive(Clone, Default)]
struct Flaky {
    calls: Arc<AtomicUsize>,
}

impl BlockExecutor for Flaky {
    fn execute(
        &self,
        block: &Block,
        _ctx: &mut ExecutionContext<'_>,
    ) -> Result<Option<ExecutedAction>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(EngineError::execution(&block.id, "flaky"))
    }
}

/// Answers after a fixed delay.
struct SlowMarket {
    delay: Duration,
    price: f64,
    calls: AtomicUsize,
}

#[async_trait]
impl MarketDataSource for SlowMarket {
    async fn fetch(&self) -> Result<MarketData, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(MarketData::at_price(self.price))
    }
}

fn collaborators(market: Arc<dyn MarketDataSource>, gas: f64) -> Collaborators {
    Collaborators {
        market,
        gas: Arc::new(FixedGasOracle(gas)),
        wallet: Arc::new(DisconnectedWallet),
        dca: Arc::new(NoDca),
        program_ids: ProgramIds::default(),
    }
}

fn build_engine(
    strategy: Strategy,
    market: Arc<ScriptedMarketSource>,
    gas: f64,
) -> ExecutionEngine {
    ExecutionEngine::new(strategy, config(), collaborators(market, gas))
}

/// price-trigger (above 2000) -> market-buy (amount 1, slippage 1%)
fn buy_above_2000() -> Strategy {
    let registry = BlockRegistry::with_defaults();
    let mut trigger = registry.create_block("price-trigger").unwrap();
    trigger.set_config("price", 2000.0).unwrap();
    trigger.set_config("condition", "above").unwrap();
    let mut buy = registry.create_block("market-buy").unwrap();
    buy.set_config("amount", 1.0).unwrap();
    buy.set_config("slippage", 1.0).unwrap();
    strategy_of(vec![trigger, buy], true)
}

fn strategy_of(blocks: Vec<Block>, chain: bool) -> Strategy {
    let mut s = Strategy::new("s1", "test");
    let ids: Vec<String> = blocks.iter().map(|b| b.id.clone()).collect();
    for (i, b) in blocks.into_iter().enumerate() {
        s.add_block(b, Position::new(i as f64 * 300.0, 100.0)).unwrap();
    }
    if chain {
        for pair in ids.windows(2) {
            s.connect(&pair[0], &pair[1]).unwrap();
        }
    }
    s
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

#[tokio::test(start_paused = true)]
async fn trigger_fires_and_buy_completes_with_slippage() {
    let strategy = buy_above_2000();
    assert!(ValidationService::new().validate_strategy(&strategy).is_valid);

    let market = Arc::new(ScriptedMarketSource::prices(&[2100.0]));
    let engine = build_engine(strategy, market, 10.0);
    engine.start().await;
    settle().await;

    let state = engine.execution_state();
    assert_eq!(state.status, ExecutionStatus::Running);
    assert_eq!(state.executed_actions.len(), 2);
    assert_eq!(state.executed_actions[0].action_type, ActionType::Trigger);

    let buy = &state.executed_actions[1];
    assert_eq!(buy.action_type, ActionType::Buy);
    assert_eq!(buy.status, ActionStatus::Completed);
    assert!((buy.price.unwrap() - 2100.0 * 1.01).abs() < 1e-6);
    assert!(buy.tx_hash.is_some());

    let metrics = engine.metrics();
    assert_eq!(metrics.total_trades, 1);
    assert_eq!(metrics.failed_trades, 0);
    assert_eq!(metrics.success_rate, 100.0);
    assert_eq!(metrics.cycles_run, 1);
    assert_eq!(engine.market_data().price, 2100.0);
    assert_eq!(state.network_status, Some(NetworkStatus::Connected));
    engine.stop();
}

#[tokio::test(start_paused = true)]
async fn quiet_trigger_leaves_the_action_alone() {
    let market = Arc::new(ScriptedMarketSource::prices(&[1900.0]));
    let engine = build_engine(buy_above_2000(), market, 10.0);
    engine.start().await;
    settle().await;

    assert!(engine.execution_state().executed_actions.is_empty());
    assert_eq!(engine.metrics().total_trades, 0);
    assert_eq!(engine.metrics().cycles_run, 1);
    engine.stop();
}

#[tokio::test(start_paused = true)]
async fn start_is_idempotent_and_stop_halts_updates() {
    let market = Arc::new(ScriptedMarketSource::prices(&[2100.0]));
    let engine = build_engine(buy_above_2000(), market.clone(), 10.0);
    assert_eq!(engine.status(), ExecutionStatus::Idle);

    engine.start().await;
    engine.start().await;
    assert_eq!(engine.status(), ExecutionStatus::Running);
    settle().await;
    assert_eq!(engine.metrics().cycles_run, 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(engine.metrics().cycles_run, 2);

    engine.stop();
    engine.stop();
    assert_eq!(engine.status(), ExecutionStatus::Idle);
    let calls = market.calls();
    let metrics = engine.metrics();

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(market.calls(), calls);
    assert_eq!(engine.metrics(), metrics);
}

#[tokio::test(start_paused = true)]
async fn pause_keeps_metrics_and_resumes() {
    let market = Arc::new(ScriptedMarketSource::prices(&[2100.0]));
    let engine = build_engine(buy_above_2000(), market, 10.0);

    engine.pause();
    assert_eq!(engine.status(), ExecutionStatus::Idle);

    engine.start().await;
    settle().await;
    engine.pause();
    assert_eq!(engine.status(), ExecutionStatus::Paused);
    assert_eq!(engine.metrics().total_trades, 1);

    tokio::time::sleep(Duration::from_secs(300)).await;
    assert_eq!(engine.metrics().cycles_run, 1);

    engine.start().await;
    settle().await;
    assert_eq!(engine.status(), ExecutionStatus::Running);
    assert_eq!(engine.metrics().cycles_run, 2);
    assert_eq!(engine.metrics().total_trades, 2);
    engine.stop();
}

#[tokio::test(start_paused = true)]
async fn expensive_gas_skips_the_cycle() {
    let market = Arc::new(ScriptedMarketSource::prices(&[2100.0]));
    let engine = build_engine(buy_above_2000(), market, 90_000.0);
    engine.start().await;
    settle().await;

    let state = engine.execution_state();
    assert_eq!(state.status, ExecutionStatus::Running);
    assert!(state.executed_actions.is_empty());
    assert_eq!(state.gas_price, Some(90_000.0));
    let metrics = engine.metrics();
    assert_eq!(metrics.skipped_cycles, 1);
    assert_eq!(metrics.cycles_run, 0);
    engine.stop();
}

#[tokio::test(start_paused = true)]
async fn market_outage_is_recorded_and_survived() {
    let market = Arc::new(ScriptedMarketSource::new(vec![
        Err(EngineError::MarketData("price feed down".into())),
        Err(EngineError::MarketData("price feed down".into())),
        Err(EngineError::MarketData("price feed down".into())),
        Ok(MarketData::at_price(2100.0)),
    ]));
    let engine = build_engine(buy_above_2000(), market.clone(), 10.0);
    engine.start().await;
    tokio::time::sleep(Duration::from_secs(1)).await;

    let state = engine.execution_state();
    assert_eq!(state.status, ExecutionStatus::Running);
    assert_eq!(state.errors.len(), 1);
    assert!(state.errors[0].contains("price feed down"));
    assert_eq!(state.network_status, Some(NetworkStatus::Disconnected));
    assert_eq!(market.calls(), 3);
    assert_eq!(engine.metrics().skipped_cycles, 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(engine.metrics().cycles_run, 1);
    assert_eq!(engine.metrics().total_trades, 1);
    engine.stop();
}

#[tokio::test(start_paused = true)]
async fn bad_block_config_halts_the_engine() {
    let registry = BlockRegistry::with_defaults();
    let mut trigger = registry.create_block("price-trigger").unwrap();
    trigger.set_config("condition", "sideways").unwrap();
    let buy = registry.create_block("market-buy").unwrap();

    let market = Arc::new(ScriptedMarketSource::prices(&[2100.0]));
    let engine = build_engine(strategy_of(vec![trigger, buy], true), market.clone(), 10.0);
    engine.start().await;
    settle().await;

    let state = engine.execution_state();
    assert_eq!(state.status, ExecutionStatus::Error);
    assert_eq!(state.errors.len(), 1);
    assert!(state.errors[0].contains("unknown condition 'sideways'"));

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(market.calls(), 1);

    engine.stop();
    assert_eq!(engine.status(), ExecutionStatus::Idle);
}

#[tokio::test(start_paused = true)]
async fn gates_combine_triggers() {
    let registry = BlockRegistry::with_defaults();
    let mut above = registry.create_block("price-trigger").unwrap();
    above.set_config("price", 2000.0).unwrap();
    let mut below = registry.create_block("price-trigger").unwrap();
    below.set_config("price", 2050.0).unwrap();
    below.set_config("condition", "below").unwrap();
    let gate = registry.create_block("and-condition").unwrap();
    let mut sell = registry.create_block("market-sell").unwrap();
    sell.set_config("amount", 2.0).unwrap();

    let (a, b, g, s_id) = (
        above.id.clone(),
        below.id.clone(),
        gate.id.clone(),
        sell.id.clone(),
    );
    let mut strategy = strategy_of(vec![above, below, gate, sell], false);
    strategy.connect(&a, &g).unwrap();
    strategy.connect(&b, &g).unwrap();
    strategy.connect(&g, &s_id).unwrap();
    assert!(ValidationService::new().validate_strategy(&strategy).is_valid);

    // 2100 clears "above 2000" but not "below 2050"
    let market = Arc::new(ScriptedMarketSource::prices(&[2100.0, 2025.0]));
    let engine = build_engine(strategy, market, 10.0);
    engine.start().await;
    settle().await;
    assert_eq!(engine.metrics().total_trades, 0);

    tokio::time::sleep(Duration::from_secs(60)).await;
    let state = engine.execution_state();
    let sells: Vec<_> = state
        .executed_actions
        .iter()
        .filter(|a| a.action_type == ActionType::Sell)
        .collect();
    assert_eq!(sells.len(), 1);
    assert_eq!(sells[0].block_id, s_id);
    assert!((sells[0].price.unwrap() - 2025.0 * 0.99).abs() < 1e-6);
    engine.stop();
}

#[tokio::test(start_paused = true)]
async fn failing_block_is_retried_then_recorded() {
    let strategy = buy_above_2000();
    let trigger_id = strategy.blocks[0].id.clone();
    let flaky = Flaky::default();
    let mut executors = ExecutorRegistry::with_defaults();
    executors.register("price-trigger", flaky.clone());

    let market = Arc::new(ScriptedMarketSource::prices(&[2100.0]));
    let engine = ExecutionEngine::with_executors(
        strategy,
        config(),
        collaborators(market, 10.0),
        executors,
    );
    engine.start().await;
    // two backoff waits: 10ms then 20ms
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    let state = engine.execution_state();
    assert_eq!(state.status, ExecutionStatus::Running);
    assert_eq!(state.errors, vec![format!("Block '{trigger_id}' failed: flaky")]);
    assert!(state.executed_actions.is_empty());
    assert_eq!(engine.metrics().cycles_run, 1);
    assert_eq!(engine.metrics().total_trades, 0);
    engine.stop();
}

#[tokio::test(start_paused = true)]
async fn tick_settling_after_stop_changes_nothing() {
    let market = Arc::new(SlowMarket {
        delay: Duration::from_secs(5),
        price: 2100.0,
        calls: AtomicUsize::new(0),
    });
    let engine = ExecutionEngine::new(
        buy_above_2000(),
        config(),
        collaborators(market.clone(), 10.0),
    );
    engine.start().await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(market.calls.load(Ordering::SeqCst), 1);

    engine.stop();
    tokio::time::sleep(Duration::from_secs(10)).await;

    let state = engine.execution_state();
    assert_eq!(state.status, ExecutionStatus::Idle);
    assert!(state.executed_actions.is_empty());
    assert!(state.errors.is_empty());
    assert_eq!(state.network_status, None);
    assert_eq!(engine.metrics(), ExecutionMetrics::default());
    assert_eq!(engine.market_data().price, 0.0);

    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(market.calls.load(Ordering::SeqCst), 1);
}
