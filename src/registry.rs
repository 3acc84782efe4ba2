//! Catalog of block templates.
//!
//! The registry is constructed once and handed to the builder session and
//! the template loader; it is never consulted through global state.

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::graph::{
    AllowedConnections, Block, BlockConfig, BlockKind, ChainAffinity, ConfigValue, CustomCheck,
    FieldRule, OrderedMap, Pattern,
};
use crate::tokens::default_pair;

/// Canonical shape of a block kind.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockTemplate {
    pub id: String,
    pub kind: BlockKind,
    pub category: Option<String>,
    pub label: String,
    pub description: String,
    pub chain_affinity: ChainAffinity,
    pub default_config: BlockConfig,
    pub validation_rules: OrderedMap<FieldRule>,
    pub max_inputs: Option<usize>,
    pub max_outputs: Option<usize>,
    pub allowed_connections: AllowedConnections,
}

impl BlockTemplate {
    pub fn new(id: &str, kind: BlockKind, label: &str) -> Self {
        Self {
            id: id.to_string(),
            kind,
            category: None,
            label: label.to_string(),
            description: String::new(),
            chain_affinity: ChainAffinity::Both,
            default_config: BlockConfig::new(),
            validation_rules: OrderedMap::new(),
            max_inputs: None,
            max_outputs: None,
            allowed_connections: AllowedConnections::default(),
        }
    }

    pub fn category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn chain(mut self, affinity: ChainAffinity) -> Self {
        self.chain_affinity = affinity;
        self
    }

    pub fn field(mut self, name: &str, value: impl Into<ConfigValue>) -> Self {
        self.default_config.insert(name, value.into());
        self
    }

    pub fn rule(mut self, name: &str, rule: FieldRule) -> Self {
        self.validation_rules.insert(name, rule);
        self
    }

    pub fn inputs(mut self, kinds: &[BlockKind], max: Option<usize>) -> Self {
        self.allowed_connections.inputs = Some(kinds.to_vec());
        self.max_inputs = max;
        self
    }

    pub fn outputs(mut self, kinds: &[BlockKind], max: Option<usize>) -> Self {
        self.allowed_connections.outputs = Some(kinds.to_vec());
        self.max_outputs = max;
        self
    }

    /// Instantiates the template under the given id.
    fn instantiate(&self, id: String) -> Block {
        let mut block = Block::new(id, self.id.clone(), self.kind, self.label.clone())
            .with_chain_affinity(self.chain_affinity)
            .with_config(self.default_config.clone());
        block.category = self.category.clone();
        self.attach_rules(&mut block);
        block
    }

    fn attach_rules(&self, block: &mut Block) {
        block.validation_rules = self.validation_rules.clone();
        block.max_inputs = self.max_inputs;
        block.max_outputs = self.max_outputs;
        block.allowed_connections = self.allowed_connections.clone();
    }
}

#[derive(Debug, Clone, Default)]
pub struct BlockRegistry {
    templates: Vec<BlockTemplate>,
}

impl BlockRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The builder's standard catalog.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        for template in default_templates() {
            registry.register(template);
        }
        registry
    }

    /// Adds a template, replacing any existing one with the same id.
    pub fn register(&mut self, template: BlockTemplate) {
        debug!(template = %template.id, "registry.register");
        self.templates.retain(|t| t.id != template.id);
        self.templates.push(template);
    }

    pub fn templates(&self) -> &[BlockTemplate] {
        &self.templates
    }

    pub fn get_template(&self, id: &str) -> Option<&BlockTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// A fresh block with a new id and its own copy of the default config.
    /// Unknown ids yield `None` so unrecognized drag payloads are no-ops.
    pub fn create_block(&self, id: &str) -> Option<Block> {
        self.get_template(id)
            .map(|t| t.instantiate(Uuid::new_v4().to_string()))
    }

    /// Re-attaches catalog rules and limits to a deserialized block whose
    /// template is known. Returns false for unknown templates.
    pub fn hydrate(&self, block: &mut Block) -> bool {
        let Some(template) = self.get_template(&block.template) else {
            return false;
        };
        if template.kind != block.kind() {
            return false;
        }
        template.attach_rules(block);
        if block.category.is_none() {
            block.category = template.category.clone();
        }
        if block.label.is_empty() {
            block.label = template.label.clone();
        }
        true
    }
}

const SIGNALS: &[BlockKind] = &[BlockKind::Trigger, BlockKind::Condition];

fn trigger(id: &str, category: &str, label: &str, description: &str) -> BlockTemplate {
    BlockTemplate::new(id, BlockKind::Trigger, label)
        .category(category)
        .describe(description)
        .outputs(&[BlockKind::Action, BlockKind::Condition], Some(1))
}

fn order(id: &str, label: &str, description: &str, style: &str, side: &str) -> BlockTemplate {
    BlockTemplate::new(id, BlockKind::Action, label)
        .category("trade")
        .describe(description)
        .inputs(SIGNALS, Some(1))
        .field("type", style)
        .field("side", side)
        .field("amount", 0.0)
        .rule("amount", FieldRule::required().min(0.0))
}

fn gate(id: &str, label: &str, description: &str) -> BlockTemplate {
    BlockTemplate::new(id, BlockKind::Condition, label)
        .category("logic")
        .describe(description)
        .inputs(SIGNALS, Some(5))
        .outputs(&[BlockKind::Action], Some(1))
}

fn pair_rule() -> FieldRule {
    FieldRule::required().custom(CustomCheck::ValidPair)
}

fn default_templates() -> Vec<BlockTemplate> {
    let pair = default_pair();
    let weekdays: Vec<String> = ["mon", "tue", "wed", "thu", "fri"]
        .iter()
        .map(|d| d.to_string())
        .collect();

    vec![
        trigger(
            "price-trigger",
            "price",
            "Price Trigger",
            "Triggers when price meets specified condition",
        )
        .field("price", 0.0)
        .field("condition", "above")
        .field("pair", pair.clone())
        .rule("price", FieldRule::required().min(0.0))
        .rule("condition", FieldRule::required())
        .rule("pair", pair_rule()),
        trigger(
            "volume-trigger",
            "volume",
            "Volume Trigger",
            "Triggers based on trading volume conditions",
        )
        .field("volume", 0.0)
        .field("timeframe", "1h")
        .field("condition", "above")
        .field("pair", pair.clone())
        .rule("volume", FieldRule::required().min(0.0))
        .rule("timeframe", FieldRule::required().pattern(Pattern::Interval))
        .rule("pair", pair_rule()),
        trigger(
            "time-trigger",
            "time",
            "Time Trigger",
            "Triggers at specified time intervals",
        )
        .field("interval", "1h")
        .field("startTime", ConfigValue::Null)
        .field("endTime", ConfigValue::Null)
        .field("daysOfWeek", weekdays)
        .rule("interval", FieldRule::required().pattern(Pattern::Interval))
        .rule("daysOfWeek", FieldRule::optional().custom(CustomCheck::Weekdays)),
        order(
            "market-buy",
            "Market Buy",
            "Execute a market buy order",
            "market",
            "buy",
        )
        .field("slippage", 1.0)
        .field("pair", pair.clone())
        .rule("slippage", FieldRule::optional().min(0.0).max(100.0))
        .rule("pair", pair_rule()),
        order(
            "limit-buy",
            "Limit Buy",
            "Place a limit buy order",
            "limit",
            "buy",
        )
        .field("limitPrice", 0.0)
        .field("expiry", "24h")
        .field("pair", pair.clone())
        .rule("limitPrice", FieldRule::required().min(0.0))
        .rule("expiry", FieldRule::optional().pattern(Pattern::Interval))
        .rule("pair", pair_rule()),
        order(
            "stop-loss",
            "Stop Loss",
            "Place a stop-loss order",
            "stop",
            "sell",
        )
        .field("stopPrice", 0.0)
        .field("slippage", 1.0)
        .field("pair", pair.clone())
        .rule("stopPrice", FieldRule::required().min(0.0))
        .rule("slippage", FieldRule::optional().min(0.0).max(100.0))
        .rule("pair", pair_rule()),
        gate(
            "and-condition",
            "AND Gate",
            "Combines multiple conditions with AND logic",
        )
        .field("type", "and"),
        gate(
            "or-condition",
            "OR Gate",
            "Combines multiple conditions with OR logic",
        )
        .field("type", "or"),
        gate(
            "delay-condition",
            "Delay",
            "Adds a time delay before executing the next action",
        )
        .inputs(SIGNALS, Some(1))
        .field("delay", "5m")
        .field("cancelOnNewTrigger", false)
        .rule("delay", FieldRule::required().pattern(Pattern::Interval)),
        order(
            "market-sell",
            "Market Sell",
            "Execute a market sell order",
            "market",
            "sell",
        )
        .field("slippage", 1.0)
        .field("pair", pair.clone())
        .rule("slippage", FieldRule::optional().min(0.0).max(100.0))
        .rule("pair", pair_rule()),
        order(
            "limit-sell",
            "Limit Sell",
            "Place a limit sell order",
            "limit",
            "sell",
        )
        .field("limitPrice", 0.0)
        .field("expiry", "24h")
        .field("pair", pair.clone())
        .rule("limitPrice", FieldRule::required().min(0.0))
        .rule("expiry", FieldRule::optional().pattern(Pattern::Interval))
        .rule("pair", pair_rule()),
        order(
            "take-profit",
            "Take Profit",
            "Place a take-profit sell order",
            "limit",
            "sell",
        )
        .field("targetPrice", 0.0)
        .field("trailingPercent", 0.0)
        .field("pair", pair.clone())
        .rule("targetPrice", FieldRule::required().min(0.0))
        .rule("trailingPercent", FieldRule::optional().min(0.0).max(100.0))
        .rule("pair", pair_rule()),
        BlockTemplate::new("dca", BlockKind::Dca, "DCA Strategy")
            .describe("Dollar Cost Averaging")
            .chain(ChainAffinity::Solana)
            .field("applicationIdx", 0.0)
            .field("pair", pair)
            .field("inAmount", 0.0)
            .field("inAmountPerCycle", 0.0)
            .field("cycleFrequency", 3600.0)
            .field("minOutAmount", 0.0)
            .field("maxOutAmount", 0.0)
            .field("startAt", Utc::now().timestamp_millis().to_string())
            .rule("applicationIdx", FieldRule::required().min(0.0))
            .rule("pair", pair_rule())
            .rule("inAmount", FieldRule::required().min(0.0))
            .rule("inAmountPerCycle", FieldRule::required().min(0.0))
            .rule("cycleFrequency", FieldRule::required().min(60.0))
            .rule("minOutAmount", FieldRule::optional().min(0.0))
            .rule("maxOutAmount", FieldRule::optional().min(0.0))
            .rule("startAt", FieldRule::required()),
    ]
}
