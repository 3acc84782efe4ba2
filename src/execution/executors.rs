//! Per-block executors. Each one evaluates a block against the current
//! market snapshot and records at most one action.

use chrono::{Datelike, NaiveTime};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::EngineError;
use crate::execution::types::{ActionStatus, ActionType, ExecutedAction, ExecutionContext};
use crate::graph::{parse_interval, Block, WEEKDAYS};

/// Relative distance at which `equals` counts as a hit.
pub const EQUALS_THRESHOLD: f64 = 0.001;

/// Gas charged per completed simulated order.
pub const SIMULATED_GAS_PER_ORDER: f64 = 50_000.0;

pub trait BlockExecutor: Send + Sync {
    /// `Ok(None)` when the block did not fire this cycle.
    fn execute(
        &self,
        block: &Block,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<Option<ExecutedAction>, EngineError>;
}

fn required_number(block: &Block, field: &str) -> Result<f64, EngineError> {
    block
        .number(field)
        .filter(|n| n.is_finite())
        .ok_or_else(|| EngineError::config(&block.id, format!("\"{field}\" must be a number")))
}

fn required_interval(block: &Block, field: &str) -> Result<chrono::Duration, EngineError> {
    let raw = block.text(field).unwrap_or_default();
    parse_interval(raw)
        .and_then(|d| chrono::Duration::from_std(d).ok())
        .ok_or_else(|| EngineError::config(&block.id, format!("\"{field}\" is not a valid interval")))
}

fn signal(block: &Block, kind: ActionType, ctx: &ExecutionContext<'_>) -> ExecutedAction {
    let mut action = ExecutedAction::new(&block.id, kind, ActionStatus::Completed, ctx.now);
    action.price = Some(ctx.market.price);
    action.pair = block.pair().map(|p| p.id.clone());
    action
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparison {
    Above,
    Below,
    Equals,
}

impl Comparison {
    fn parse(block: &Block) -> Result<Self, EngineError> {
        match block.text("condition").unwrap_or("above") {
            "above" => Ok(Self::Above),
            "below" => Ok(Self::Below),
            "equals" => Ok(Self::Equals),
            other => Err(EngineError::config(
                &block.id,
                format!("unknown condition '{other}'"),
            )),
        }
    }

    fn holds(self, live: f64, target: f64) -> bool {
        match self {
            Self::Above => live > target,
            Self::Below => live < target,
            Self::Equals if target == 0.0 => live == 0.0,
            Self::Equals => ((live - target) / target).abs() <= EQUALS_THRESHOLD,
        }
    }
}

pub struct PriceTrigger;

impl BlockExecutor for PriceTrigger {
    fn execute(
        &self,
        block: &Block,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<Option<ExecutedAction>, EngineError> {
        let target = required_number(block, "price")?;
        let comparison = Comparison::parse(block)?;
        Ok(comparison
            .holds(ctx.market.price, target)
            .then(|| signal(block, ActionType::Trigger, ctx)))
    }
}

pub struct VolumeTrigger;

impl BlockExecutor for VolumeTrigger {
    fn execute(
        &self,
        block: &Block,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<Option<ExecutedAction>, EngineError> {
        let target = required_number(block, "volume")?;
        let comparison = Comparison::parse(block)?;
        let fired = comparison.holds(ctx.market.volume_24h, target);
        Ok(fired.then(|| {
            let mut action = signal(block, ActionType::Trigger, ctx);
            action.amount = Some(ctx.market.volume_24h);
            action
        }))
    }
}

/// Fires once per interval on the allowed weekdays, inside the optional
/// `startTime`/`endTime` (HH:MM, UTC) window.
pub struct TimeTrigger;

impl TimeTrigger {
    fn window_bound(block: &Block, field: &str) -> Result<Option<NaiveTime>, EngineError> {
        match block.text(field) {
            None | Some("") => Ok(None),
            Some(raw) => NaiveTime::parse_from_str(raw, "%H:%M")
                .map(Some)
                .map_err(|_| EngineError::config(&block.id, format!("\"{field}\" must be HH:MM"))),
        }
    }
}

impl BlockExecutor for TimeTrigger {
    fn execute(
        &self,
        block: &Block,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<Option<ExecutedAction>, EngineError> {
        let interval = required_interval(block, "interval")?;

        if let Some(days) = block.field("daysOfWeek").and_then(|v| v.as_list()) {
            let today = WEEKDAYS[ctx.now.weekday().num_days_from_monday() as usize];
            if !days.is_empty() && !days.iter().any(|d| d.eq_ignore_ascii_case(today)) {
                return Ok(None);
            }
        }

        let time = ctx.now.time();
        if let Some(start) = Self::window_bound(block, "startTime")? {
            if time < start {
                return Ok(None);
            }
        }
        if let Some(end) = Self::window_bound(block, "endTime")? {
            if time > end {
                return Ok(None);
            }
        }

        let due = match ctx.memory.last_fired.get(&block.id) {
            None => true,
            Some(last) => ctx.now - *last >= interval,
        };
        if !due {
            return Ok(None);
        }
        ctx.memory.last_fired.insert(block.id.clone(), ctx.now);
        Ok(Some(signal(block, ActionType::Trigger, ctx)))
    }
}

pub struct AndGate;

impl BlockExecutor for AndGate {
    fn execute(
        &self,
        block: &Block,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<Option<ExecutedAction>, EngineError> {
        Ok(ctx
            .inputs
            .all()
            .then(|| signal(block, ActionType::Condition, ctx)))
    }
}

pub struct OrGate;

impl BlockExecutor for OrGate {
    fn execute(
        &self,
        block: &Block,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<Option<ExecutedAction>, EngineError> {
        Ok(ctx
            .inputs
            .any()
            .then(|| signal(block, ActionType::Condition, ctx)))
    }
}

/// Passes its input on once `delay` has elapsed since first activation.
/// With `cancelOnNewTrigger`, every new input restarts the wait.
pub struct DelayGate;

impl BlockExecutor for DelayGate {
    fn execute(
        &self,
        block: &Block,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<Option<ExecutedAction>, EngineError> {
        let delay = required_interval(block, "delay")?;
        let restart = block
            .field("cancelOnNewTrigger")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        if ctx.inputs.any() {
            if restart {
                ctx.memory.delay_started.insert(block.id.clone(), ctx.now);
            } else {
                ctx.memory
                    .delay_started
                    .entry(block.id.clone())
                    .or_insert(ctx.now);
            }
        }

        let Some(started) = ctx.memory.delay_started.get(&block.id).copied() else {
            return Ok(None);
        };
        if ctx.now - started < delay {
            return Ok(None);
        }
        ctx.memory.delay_started.remove(&block.id);
        Ok(Some(signal(block, ActionType::Condition, ctx)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStyle {
    Market,
    /// Fills at `limitPrice` once the live price crosses it.
    Limit,
    /// Sells at market once the price falls to `stopPrice`.
    Stop,
    /// Sells once the price reaches `targetPrice`.
    TakeProfit,
}

pub struct OrderExecutor {
    pub side: OrderSide,
    pub style: OrderStyle,
}

impl OrderExecutor {
    pub fn new(side: OrderSide, style: OrderStyle) -> Self {
        Self { side, style }
    }

    fn slipped(&self, block: &Block, price: f64) -> f64 {
        let slippage = block.number("slippage").unwrap_or(0.0) / 100.0;
        match self.side {
            OrderSide::Buy => price * (1.0 + slippage),
            OrderSide::Sell => price * (1.0 - slippage),
        }
    }

    /// Fill price when the order executes this cycle.
    fn fill_price(&self, block: &Block, live: f64) -> Result<Option<f64>, EngineError> {
        Ok(match self.style {
            OrderStyle::Market => Some(self.slipped(block, live)),
            OrderStyle::Limit => {
                let limit = required_number(block, "limitPrice")?;
                let crossed = match self.side {
                    OrderSide::Buy => live <= limit,
                    OrderSide::Sell => live >= limit,
                };
                crossed.then_some(limit)
            }
            OrderStyle::Stop => {
                let stop = required_number(block, "stopPrice")?;
                (live <= stop).then(|| self.slipped(block, live))
            }
            OrderStyle::TakeProfit => {
                let target = required_number(block, "targetPrice")?;
                (live >= target).then_some(live)
            }
        })
    }

    /// The token spent and how much of it the order needs.
    fn spend(&self, block: &Block, amount: f64, price: f64) -> Option<(String, f64)> {
        let pair = block.pair()?;
        Some(match self.side {
            OrderSide::Buy => (pair.input_token.symbol.clone(), amount * price),
            OrderSide::Sell => (pair.output_token.symbol.clone(), amount),
        })
    }
}

impl BlockExecutor for OrderExecutor {
    fn execute(
        &self,
        block: &Block,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<Option<ExecutedAction>, EngineError> {
        let amount = required_number(block, "amount")?;
        let kind = match self.side {
            OrderSide::Buy => ActionType::Buy,
            OrderSide::Sell => ActionType::Sell,
        };

        let mut action = ExecutedAction::new(&block.id, kind, ActionStatus::Completed, ctx.now);
        action.amount = Some(amount);
        action.pair = block.pair().map(|p| p.id.clone());

        let Some(price) = self.fill_price(block, ctx.market.price)? else {
            if self.style == OrderStyle::Limit
                && ctx.memory.resting_orders.insert(block.id.clone())
            {
                action.status = ActionStatus::Pending;
                action.price = block.number("limitPrice");
                return Ok(Some(action));
            }
            return Ok(None);
        };
        ctx.memory.resting_orders.remove(&block.id);
        action.price = Some(price);

        if amount <= 0.0 {
            action.status = ActionStatus::Failed;
            action.error_message = Some("Amount must be greater than zero".into());
            return Ok(Some(action));
        }
        if let Some((symbol, needed)) = self.spend(block, amount, price) {
            if let Some(held) = ctx.balances.get(&symbol) {
                if held.amount < needed {
                    action.status = ActionStatus::Failed;
                    action.error_message = Some(format!("Insufficient {symbol} balance"));
                    return Ok(Some(action));
                }
            }
        }

        action.tx_hash = Some(format!("sim-{}", Uuid::new_v4()));
        Ok(Some(action))
    }
}

/// Executors keyed by block template id.
pub struct ExecutorRegistry {
    executors: HashMap<String, Box<dyn BlockExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Executors for every periodic block in the default catalog.
    pub fn with_defaults() -> Self {
        use OrderSide::{Buy, Sell};
        use OrderStyle::{Limit, Market, Stop, TakeProfit};

        let mut registry = Self::new();
        registry.register("price-trigger", PriceTrigger);
        registry.register("volume-trigger", VolumeTrigger);
        registry.register("time-trigger", TimeTrigger);
        registry.register("and-condition", AndGate);
        registry.register("or-condition", OrGate);
        registry.register("delay-condition", DelayGate);
        registry.register("market-buy", OrderExecutor::new(Buy, Market));
        registry.register("market-sell", OrderExecutor::new(Sell, Market));
        registry.register("limit-buy", OrderExecutor::new(Buy, Limit));
        registry.register("limit-sell", OrderExecutor::new(Sell, Limit));
        registry.register("stop-loss", OrderExecutor::new(Sell, Stop));
        registry.register("take-profit", OrderExecutor::new(Sell, TakeProfit));
        registry
    }

    pub fn register(&mut self, template: &str, executor: impl BlockExecutor + 'static) {
        self.executors
            .insert(template.to_string(), Box::new(executor));
    }

    pub fn get(&self, template: &str) -> Option<&dyn BlockExecutor> {
        self.executors.get(template).map(|e| e.as_ref())
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::types::{CycleMemory, InputSignal};
    use crate::graph::{BlockKind, Strategy};
    use crate::market::MarketData;
    use crate::registry::BlockRegistry;
    use crate::wallet::{TokenBalance, WalletBalance};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    struct Harness {
        strategy: Strategy,
        market: MarketData,
        balances: WalletBalance,
        memory: CycleMemory,
        now: DateTime<Utc>,
    }

    impl Harness {
        fn at(price: f64) -> Self {
            Self {
                strategy: Strategy::new("s", "test"),
                market: MarketData::at_price(price).with_volume(1_000.0),
                balances: WalletBalance::new(),
                memory: CycleMemory::default(),
                // a Wednesday
                now: Utc.with_ymd_and_hms(2024, 5, 15, 12, 0, 0).unwrap(),
            }
        }

        fn run(
            &mut self,
            executor: &dyn BlockExecutor,
            block: &Block,
            inputs: InputSignal,
        ) -> Result<Option<ExecutedAction>, EngineError> {
            let mut ctx = ExecutionContext {
                strategy: &self.strategy,
                market: &self.market,
                balances: &self.balances,
                memory: &mut self.memory,
                inputs,
                now: self.now,
            };
            executor.execute(block, &mut ctx)
        }
    }

    fn block(template: &str) -> Block {
        BlockRegistry::with_defaults().create_block(template).unwrap()
    }

    const FIRED: InputSignal = InputSignal { total: 1, fired: 1 };
    const QUIET: InputSignal = InputSignal { total: 1, fired: 0 };

    #[test]
    fn price_trigger_conditions() {
        let mut h = Harness::at(2100.0);
        let mut b = block("price-trigger");
        b.set_config("price", 2000.0).unwrap();

        let fired = h.run(&PriceTrigger, &b, QUIET).unwrap().unwrap();
        assert_eq!(fired.action_type, ActionType::Trigger);
        assert_eq!(fired.price, Some(2100.0));
        assert_eq!(fired.pair.as_deref(), Some("USDC-SOL"));

        b.set_config("condition", "below").unwrap();
        assert!(h.run(&PriceTrigger, &b, QUIET).unwrap().is_none());

        b.set_config("condition", "equals").unwrap();
        assert!(h.run(&PriceTrigger, &b, QUIET).unwrap().is_none());
        b.set_config("price", 2101.0).unwrap();
        assert!(h.run(&PriceTrigger, &b, QUIET).unwrap().is_some());
    }

    #[test]
    fn unknown_condition_is_a_config_error() {
        let mut h = Harness::at(1.0);
        let mut b = block("price-trigger");
        b.set_config("condition", "sideways").unwrap();
        let err = h.run(&PriceTrigger, &b, QUIET).unwrap_err();
        assert!(matches!(err, EngineError::Config { .. }));
    }

    #[test]
    fn volume_trigger_compares_daily_volume() {
        let mut h = Harness::at(1.0);
        let mut b = block("volume-trigger");
        b.set_config("volume", 500.0).unwrap();
        assert!(h.run(&VolumeTrigger, &b, QUIET).unwrap().is_some());
        b.set_config("volume", 5_000.0).unwrap();
        assert!(h.run(&VolumeTrigger, &b, QUIET).unwrap().is_none());
    }

    #[test]
    fn time_trigger_waits_for_its_interval() {
        let mut h = Harness::at(1.0);
        let b = block("time-trigger");
        assert!(h.run(&TimeTrigger, &b, QUIET).unwrap().is_some());
        h.now += Duration::minutes(30);
        assert!(h.run(&TimeTrigger, &b, QUIET).unwrap().is_none());
        h.now += Duration::minutes(30);
        assert!(h.run(&TimeTrigger, &b, QUIET).unwrap().is_some());
    }

    #[test]
    fn time_trigger_respects_weekdays() {
        let mut h = Harness::at(1.0);
        // a Saturday
        h.now = Utc.with_ymd_and_hms(2024, 5, 18, 12, 0, 0).unwrap();
        let b = block("time-trigger");
        assert!(h.run(&TimeTrigger, &b, QUIET).unwrap().is_none());
    }

    #[test]
    fn gates_follow_their_inputs() {
        let mut h = Harness::at(1.0);
        let and = Block::new("a", "and-condition", BlockKind::Condition, "AND");
        let some = InputSignal { total: 2, fired: 1 };
        let all = InputSignal { total: 2, fired: 2 };
        assert!(h.run(&AndGate, &and, some).unwrap().is_none());
        assert!(h.run(&AndGate, &and, all).unwrap().is_some());
        assert!(h.run(&OrGate, &and, some).unwrap().is_some());
        assert!(h.run(&OrGate, &and, QUIET).unwrap().is_none());
    }

    #[test]
    fn delay_releases_after_its_wait() {
        let mut h = Harness::at(1.0);
        let b = block("delay-condition");
        assert!(h.run(&DelayGate, &b, FIRED).unwrap().is_none());
        h.now += Duration::minutes(3);
        assert!(h.run(&DelayGate, &b, FIRED).unwrap().is_none());
        h.now += Duration::minutes(2);
        let released = h.run(&DelayGate, &b, QUIET).unwrap().unwrap();
        assert_eq!(released.action_type, ActionType::Condition);
        assert!(h.memory.delay_started.is_empty());
    }

    #[test]
    fn delay_can_restart_on_new_input() {
        let mut h = Harness::at(1.0);
        let mut b = block("delay-condition");
        b.set_config("cancelOnNewTrigger", true).unwrap();
        h.run(&DelayGate, &b, FIRED).unwrap();
        h.now += Duration::minutes(4);
        assert!(h.run(&DelayGate, &b, FIRED).unwrap().is_none());
        h.now += Duration::minutes(4);
        assert!(h.run(&DelayGate, &b, QUIET).unwrap().is_none());
        h.now += Duration::minutes(1);
        assert!(h.run(&DelayGate, &b, QUIET).unwrap().is_some());
    }

    #[test]
    fn market_orders_apply_slippage() {
        let mut h = Harness::at(2100.0);
        let mut buy = block("market-buy");
        buy.set_config("amount", 1.0).unwrap();
        let done = h
            .run(&OrderExecutor::new(OrderSide::Buy, OrderStyle::Market), &buy, FIRED)
            .unwrap()
            .unwrap();
        assert_eq!(done.status, ActionStatus::Completed);
        assert!((done.price.unwrap() - 2121.0).abs() < 1e-9);
        assert!(done.tx_hash.unwrap().starts_with("sim-"));

        let mut sell = block("market-sell");
        sell.set_config("amount", 1.0).unwrap();
        let done = h
            .run(&OrderExecutor::new(OrderSide::Sell, OrderStyle::Market), &sell, FIRED)
            .unwrap()
            .unwrap();
        assert!((done.price.unwrap() - 2079.0).abs() < 1e-9);
    }

    #[test]
    fn orders_fail_without_raising() {
        let mut h = Harness::at(100.0);
        let exec = OrderExecutor::new(OrderSide::Buy, OrderStyle::Market);
        let zero = block("market-buy");
        let failed = h.run(&exec, &zero, FIRED).unwrap().unwrap();
        assert_eq!(failed.status, ActionStatus::Failed);
        assert!(failed.error_message.is_some());

        let mut buy = block("market-buy");
        buy.set_config("amount", 2.0).unwrap();
        h.balances.insert(
            "USDC".into(),
            TokenBalance {
                amount: 150.0,
                value: 150.0,
            },
        );
        let failed = h.run(&exec, &buy, FIRED).unwrap().unwrap();
        assert_eq!(failed.status, ActionStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("Insufficient USDC balance"));
    }

    #[test]
    fn limit_orders_rest_then_fill() {
        let mut h = Harness::at(110.0);
        let exec = OrderExecutor::new(OrderSide::Buy, OrderStyle::Limit);
        let mut b = block("limit-buy");
        b.set_config("amount", 1.0).unwrap();
        b.set_config("limitPrice", 100.0).unwrap();

        let pending = h.run(&exec, &b, FIRED).unwrap().unwrap();
        assert_eq!(pending.status, ActionStatus::Pending);
        assert!(h.run(&exec, &b, FIRED).unwrap().is_none());

        h.market.price = 99.0;
        let filled = h.run(&exec, &b, FIRED).unwrap().unwrap();
        assert_eq!(filled.status, ActionStatus::Completed);
        assert_eq!(filled.price, Some(100.0));
        assert!(h.memory.resting_orders.is_empty());
    }

    #[test]
    fn stop_and_take_profit_thresholds() {
        let mut h = Harness::at(95.0);
        let mut stop = block("stop-loss");
        stop.set_config("amount", 1.0).unwrap();
        stop.set_config("stopPrice", 90.0).unwrap();
        let stop_exec = OrderExecutor::new(OrderSide::Sell, OrderStyle::Stop);
        assert!(h.run(&stop_exec, &stop, FIRED).unwrap().is_none());
        h.market.price = 89.0;
        assert!(h.run(&stop_exec, &stop, FIRED).unwrap().is_some());

        let mut tp = block("take-profit");
        tp.set_config("amount", 1.0).unwrap();
        tp.set_config("targetPrice", 120.0).unwrap();
        let tp_exec = OrderExecutor::new(OrderSide::Sell, OrderStyle::TakeProfit);
        assert!(h.run(&tp_exec, &tp, FIRED).unwrap().is_none());
        h.market.price = 121.0;
        assert_eq!(
            h.run(&tp_exec, &tp, FIRED).unwrap().unwrap().price,
            Some(121.0)
        );
    }

    #[test]
    fn registry_covers_the_periodic_catalog() {
        let executors = ExecutorRegistry::with_defaults();
        for t in BlockRegistry::with_defaults().templates() {
            if t.id != "dca" {
                assert!(executors.get(&t.id).is_some(), "no executor for {}", t.id);
            }
        }
        assert!(executors.get("dca").is_none());
    }
}
