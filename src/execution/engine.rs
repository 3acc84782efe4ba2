use chrono::Utc;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::chain::{DcaProgramClient, ProgramIds};
use crate::error::EngineError;
use crate::execution::dca::submit_dca;
use crate::execution::executors::{ExecutorRegistry, SIMULATED_GAS_PER_ORDER};
use crate::execution::retry::{with_retry, RetryPolicy};
use crate::execution::scheduler::RepeatingTask;
use crate::execution::types::{
    ActionStatus, ActionType, CycleMemory, ExecutedAction, ExecutionContext, ExecutionMetrics,
    ExecutionState, ExecutionStatus, InputSignal, NetworkStatus,
};
use crate::graph::{Block, BlockKind, Strategy};
use crate::market::{GasOracle, MarketData, MarketDataSource};
use crate::wallet::{WalletBalance, WalletProvider};

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub cycle_interval: Duration,
    /// Cycles are skipped while the gas oracle reports more than this.
    pub max_gas_price: f64,
    pub retry: RetryPolicy,
    /// Cap on the error log and on the action log.
    pub max_errors: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(5),
            max_gas_price: 50_000.0,
            retry: RetryPolicy::default(),
            max_errors: 100,
        }
    }
}

/// Everything the engine talks to outside itself.
#[derive(Clone)]
pub struct Collaborators {
    pub market: Arc<dyn MarketDataSource>,
    pub gas: Arc<dyn GasOracle>,
    pub wallet: Arc<dyn WalletProvider>,
    pub dca: Arc<dyn DcaProgramClient>,
    pub program_ids: ProgramIds,
}

/// Open position used to realize P&L against average entry cost.
#[derive(Debug, Clone, Copy, Default)]
struct Book {
    held: f64,
    cost: f64,
}

impl Book {
    fn buy(&mut self, amount: f64, price: f64) {
        self.held += amount;
        self.cost += amount * price;
    }

    /// Realized P&L of the sold quantity.
    fn sell(&mut self, amount: f64, price: f64) -> f64 {
        let qty = amount.min(self.held);
        if qty <= 0.0 {
            return 0.0;
        }
        let avg = self.cost / self.held;
        self.held -= qty;
        self.cost -= avg * qty;
        (price - avg) * qty
    }
}

#[derive(Default)]
struct Runtime {
    state: ExecutionState,
    metrics: ExecutionMetrics,
    market: MarketData,
    memory: CycleMemory,
    book: Book,
}

impl Runtime {
    fn running(&self) -> bool {
        self.state.status == ExecutionStatus::Running
    }

    fn push_error(&mut self, message: String, cap: usize) {
        self.state.errors.push(message);
        trim_front(&mut self.state.errors, cap);
    }

    fn record(&mut self, action: ExecutedAction, cap: usize) {
        if action.is_order() && action.status != ActionStatus::Pending {
            let m = &mut self.metrics;
            m.total_trades += 1;
            match action.status {
                ActionStatus::Completed => {
                    m.gas_used += SIMULATED_GAS_PER_ORDER;
                    m.last_trade_time = Some(action.timestamp);
                    let amount = action.amount.unwrap_or(0.0);
                    let price = action.price.unwrap_or(0.0);
                    match action.action_type {
                        ActionType::Buy => self.book.buy(amount, price),
                        _ => m.profit_loss += self.book.sell(amount, price),
                    }
                }
                _ => m.failed_trades += 1,
            }
            m.success_rate =
                (m.total_trades - m.failed_trades) as f64 / m.total_trades as f64 * 100.0;
        }
        self.state.executed_actions.push(action);
        trim_front(&mut self.state.executed_actions, cap);
    }
}

fn trim_front<T>(items: &mut Vec<T>, cap: usize) {
    if items.len() > cap {
        let excess = items.len() - cap;
        items.drain(..excess);
    }
}

struct Shared {
    strategy: Strategy,
    config: EngineConfig,
    deps: Collaborators,
    executors: ExecutorRegistry,
    runtime: Mutex<Runtime>,
    /// Held for the whole of a tick; a tick that cannot take it is dropped.
    tick_guard: tokio::sync::Mutex<()>,
    /// Lock order: `task` before `runtime`.
    task: Mutex<Option<RepeatingTask>>,
    dca_in_flight: AtomicBool,
}

impl Shared {
    fn runtime(&self) -> MutexGuard<'_, Runtime> {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn task(&self) -> MutexGuard<'_, Option<RepeatingTask>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Runs one strategy: either the periodic block cycle or, for strategies
/// with a `dca` block, a single DCA setup submission.
///
/// Cheap to clone; clones share the same state.
#[derive(Clone)]
pub struct ExecutionEngine {
    shared: Arc<Shared>,
}

impl ExecutionEngine {
    pub fn new(strategy: Strategy, config: EngineConfig, deps: Collaborators) -> Self {
        Self::with_executors(strategy, config, deps, ExecutorRegistry::with_defaults())
    }

    pub fn with_executors(
        strategy: Strategy,
        config: EngineConfig,
        deps: Collaborators,
        executors: ExecutorRegistry,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                strategy,
                config,
                deps,
                executors,
                runtime: Mutex::new(Runtime::default()),
                tick_guard: tokio::sync::Mutex::new(()),
                task: Mutex::new(None),
                dca_in_flight: AtomicBool::new(false),
            }),
        }
    }

    pub fn strategy(&self) -> &Strategy {
        &self.shared.strategy
    }

    pub fn status(&self) -> ExecutionStatus {
        self.shared.runtime().state.status
    }

    pub fn execution_state(&self) -> ExecutionState {
        self.shared.runtime().state.clone()
    }

    pub fn metrics(&self) -> ExecutionMetrics {
        self.shared.runtime().metrics.clone()
    }

    pub fn market_data(&self) -> MarketData {
        self.shared.runtime().market.clone()
    }

    /// True while a DCA submission is outstanding; starting again is refused.
    pub fn dca_in_flight(&self) -> bool {
        self.shared.dca_in_flight.load(Ordering::SeqCst)
    }

    /// Starts from idle, paused, error or success. A no-op while running.
    ///
    /// For DCA strategies this awaits the submission; otherwise it schedules
    /// the cycle and returns.
    pub async fn start(&self) {
        let dca_block = self.shared.strategy.find_kind(BlockKind::Dca);
        {
            let mut rt = self.shared.runtime();
            let from = rt.state.status;
            if from == ExecutionStatus::Running {
                debug!(strategy = %self.shared.strategy.id, "engine.start.ignored");
                return;
            }
            if dca_block.is_some() && self.dca_in_flight() {
                warn!(strategy = %self.shared.strategy.id, "engine.start.dca_in_flight");
                return;
            }
            if matches!(from, ExecutionStatus::Error | ExecutionStatus::Success) {
                rt.state.errors.clear();
            }
            rt.state.status = ExecutionStatus::Running;
            rt.state.last_update = Utc::now();
            info!(strategy = %self.shared.strategy.id, from = ?from, "engine.start");
        }

        match dca_block {
            Some(block) => self.run_dca(block).await,
            None => self.schedule(),
        }
    }

    /// Stops the cycle and keeps metrics. Only valid while running.
    pub fn pause(&self) {
        let mut task = self.shared.task();
        let mut rt = self.shared.runtime();
        if !rt.running() {
            debug!(status = ?rt.state.status, "engine.pause.ignored");
            return;
        }
        if let Some(t) = task.take() {
            t.cancel();
        }
        rt.state.status = ExecutionStatus::Paused;
        rt.state.last_update = Utc::now();
        info!(strategy = %self.shared.strategy.id, "engine.pause");
    }

    /// Cancels the cycle and returns to idle. Safe from any state.
    pub fn stop(&self) {
        let mut task = self.shared.task();
        if let Some(t) = task.take() {
            t.cancel();
        }
        let mut rt = self.shared.runtime();
        rt.state.status = ExecutionStatus::Idle;
        rt.state.current_block = None;
        rt.state.last_update = Utc::now();
        info!(strategy = %self.shared.strategy.id, "engine.stop");
    }

    fn schedule(&self) {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let task = RepeatingTask::spawn(self.shared.config.cycle_interval, move || {
            let weak = weak.clone();
            async move {
                if let Some(shared) = weak.upgrade() {
                    ExecutionEngine { shared }.tick().await;
                }
            }
        });

        let mut slot = self.shared.task();
        if !self.shared.runtime().running() {
            // stopped while starting
            task.cancel();
            return;
        }
        if let Some(old) = slot.replace(task) {
            old.cancel();
        }
    }

    /// One execution cycle. Normally driven by the scheduler.
    pub async fn tick(&self) {
        let shared = &self.shared;
        let Ok(_guard) = shared.tick_guard.try_lock() else {
            debug!("engine.tick.overlap");
            return;
        };
        if !shared.runtime().running() {
            return;
        }

        let market = match with_retry(&shared.config.retry, "market_data", || {
            shared.deps.market.fetch()
        })
        .await
        {
            Ok(market) => market,
            Err(e) => {
                warn!(error = %e, "engine.market.unavailable");
                let mut rt = shared.runtime();
                if rt.running() {
                    rt.push_error(e.to_string(), shared.config.max_errors);
                    rt.state.network_status = Some(NetworkStatus::Disconnected);
                    rt.state.last_update = Utc::now();
                    rt.metrics.skipped_cycles += 1;
                }
                return;
            }
        };

        let (gas_price, network) = match shared.deps.gas.gas_price().await {
            Ok(gas) => (Some(gas), NetworkStatus::Connected),
            Err(e) => {
                warn!(error = %e, "engine.gas.unavailable");
                (None, NetworkStatus::Degraded)
            }
        };

        if let Some(gas) = gas_price.filter(|g| *g > shared.config.max_gas_price) {
            info!(gas, ceiling = shared.config.max_gas_price, "engine.cycle.skipped");
            let mut rt = shared.runtime();
            if rt.running() {
                rt.market = market;
                rt.state.gas_price = Some(gas);
                rt.state.network_status = Some(network);
                rt.state.last_update = Utc::now();
                rt.metrics.skipped_cycles += 1;
            }
            return;
        }

        let mut memory = shared.runtime().memory.clone();
        let balances = shared.deps.wallet.balances();
        let outcome = self.run_blocks(&market, &balances, &mut memory).await;

        let mut rt = shared.runtime();
        if !rt.running() {
            debug!(status = ?rt.state.status, "engine.tick.discarded");
            return;
        }
        let cap = shared.config.max_errors;
        rt.market = market;
        rt.memory = memory;
        rt.state.gas_price = gas_price;
        rt.state.network_status = Some(network);
        rt.state.last_update = Utc::now();
        rt.metrics.cycles_run += 1;
        if outcome.last_block.is_some() {
            rt.state.current_block = outcome.last_block;
        }
        for action in outcome.actions {
            rt.record(action, cap);
        }
        for message in outcome.errors {
            rt.push_error(message, cap);
        }

        if let Some(fatal) = outcome.fatal {
            error!(error = %fatal, "engine.halted");
            rt.push_error(fatal.to_string(), cap);
            rt.state.status = ExecutionStatus::Error;
            drop(rt);
            if let Some(t) = shared.task().take() {
                t.cancel();
            }
        }
    }

    async fn run_blocks(
        &self,
        market: &MarketData,
        balances: &WalletBalance,
        memory: &mut CycleMemory,
    ) -> CycleOutcome {
        let strategy = &self.shared.strategy;
        let policy = self.shared.config.retry;
        let now = Utc::now();
        let mut fired: HashSet<&str> = HashSet::new();
        let mut outcome = CycleOutcome::default();

        for block in strategy.topological_order() {
            if block.kind() == BlockKind::Dca {
                continue;
            }
            let inputs = input_signal(strategy, block, &fired);
            if block.kind() == BlockKind::Action && !inputs.any() {
                continue;
            }
            let Some(executor) = self.shared.executors.get(&block.template) else {
                outcome.fatal = Some(EngineError::config(
                    &block.id,
                    format!("no executor for '{}'", block.template),
                ));
                break;
            };

            outcome.last_block = Some(block.id.clone());
            let result = with_retry(&policy, &block.id, || {
                let mut ctx = ExecutionContext {
                    strategy,
                    market,
                    balances,
                    memory: &mut *memory,
                    inputs,
                    now,
                };
                std::future::ready(executor.execute(block, &mut ctx))
            })
            .await;

            match result {
                Ok(Some(action)) => {
                    debug!(block = %block.id, status = ?action.status, "engine.block.executed");
                    if action.status == ActionStatus::Completed {
                        fired.insert(block.id.as_str());
                    }
                    outcome.actions.push(action);
                }
                Ok(None) => {}
                Err(e @ EngineError::Config { .. }) => {
                    outcome.fatal = Some(e);
                    break;
                }
                Err(e) => {
                    warn!(block = %block.id, error = %e, "engine.block.failed");
                    outcome.errors.push(e.to_string());
                }
            }
        }
        outcome
    }

    async fn run_dca(&self, block: &Block) {
        let shared = &self.shared;
        if shared
            .dca_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!(block = %block.id, "dca.already_in_flight");
            return;
        }

        let outcome = submit_dca(
            block,
            shared.deps.wallet.as_ref(),
            shared.deps.dca.as_ref(),
            &shared.deps.program_ids,
        )
        .await;
        shared.dca_in_flight.store(false, Ordering::SeqCst);

        let mut rt = shared.runtime();
        rt.state.last_update = Utc::now();
        rt.state.current_block = Some(block.id.clone());
        if !rt.running() {
            // stopped or paused while submitting; report without changing status
            match &outcome {
                Ok(signature) => {
                    info!(%signature, status = ?rt.state.status, "dca.settled_after_stop");
                    rt.state.last_signature = Some(signature.clone());
                }
                Err(e) => warn!(error = %e, status = ?rt.state.status, "dca.failed_after_stop"),
            }
            return;
        }
        match outcome {
            Ok(signature) => {
                info!(block = %block.id, %signature, "engine.dca.success");
                rt.state.status = ExecutionStatus::Success;
                rt.state.last_signature = Some(signature);
            }
            Err(e) => {
                error!(block = %block.id, error = %e, "engine.dca.failed");
                rt.state.status = ExecutionStatus::Error;
                rt.push_error(e.to_string(), shared.config.max_errors);
            }
        }
    }
}

#[derive(Default)]
struct CycleOutcome {
    actions: Vec<ExecutedAction>,
    errors: Vec<String>,
    fatal: Option<EngineError>,
    last_block: Option<String>,
}

fn input_signal(strategy: &Strategy, block: &Block, fired: &HashSet<&str>) -> InputSignal {
    let mut signal = InputSignal::default();
    for c in strategy.incoming(&block.id) {
        if strategy.block(&c.source_id).is_none() {
            continue;
        }
        signal.total += 1;
        if fired.contains(c.source_id.as_str()) {
            signal.fired += 1;
        }
    }
    signal
}
