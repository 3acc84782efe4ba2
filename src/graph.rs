//! The strategy graph: blocks, connections and their canvas positions.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use solana_sdk::pubkey::Pubkey;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::error::GraphError;
use crate::tokens::TokenPair;

pub type BlockId = String;
pub type ConnectionId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockKind {
    Trigger,
    Action,
    Condition,
    Dca,
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Trigger => "trigger",
            Self::Action => "action",
            Self::Condition => "condition",
            Self::Dca => "dca",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainAffinity {
    Evm,
    Solana,
    #[default]
    Both,
}

impl fmt::Display for ChainAffinity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Evm => "evm",
            Self::Solana => "solana",
            Self::Both => "both",
        };
        f.write_str(s)
    }
}

/// Insertion-ordered string map. Serialized as a plain JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Replaces in place when the key exists, so field order is stable.
    pub fn insert(&mut self, key: impl Into<String>, value: V) -> Option<V> {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V> FromIterator<(K, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct OrderedMapVisitor<V>(PhantomData<V>);

impl<'de, V: Deserialize<'de>> Visitor<'de> for OrderedMapVisitor<V> {
    type Value = OrderedMap<V>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a map of field names to values")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = OrderedMap::new();
        while let Some((k, v)) = access.next_entry::<String, V>()? {
            map.insert(k, v);
        }
        Ok(map)
    }
}

impl<'de, V: Deserialize<'de>> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(OrderedMapVisitor(PhantomData))
    }
}

/// A single block config value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Pair(TokenPair),
    List(Vec<String>),
}

impl ConfigValue {
    /// Numbers, and text that parses as a number.
    /// Finite numbers only; `NaN` and infinities read as non-numeric.
    pub fn as_f64(&self) -> Option<f64> {
        let n: f64 = match self {
            Self::Number(n) => *n,
            Self::Text(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        n.is_finite().then_some(n)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_pair(&self) -> Option<&TokenPair> {
        match self {
            Self::Pair(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// Null or the empty string.
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            _ => false,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => Ok(()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
            Self::Pair(p) => f.write_str(&p.id),
            Self::List(l) => f.write_str(&l.join(",")),
        }
    }
}

impl From<f64> for ConfigValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for ConfigValue {
    fn from(n: i64) -> Self {
        Self::Number(n as f64)
    }
}

impl From<bool> for ConfigValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for ConfigValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<TokenPair> for ConfigValue {
    fn from(p: TokenPair) -> Self {
        Self::Pair(p)
    }
}

impl From<Vec<String>> for ConfigValue {
    fn from(l: Vec<String>) -> Self {
        Self::List(l)
    }
}

pub type BlockConfig = OrderedMap<ConfigValue>;

/// String formats a field may be constrained to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Pattern {
    /// `30s`, `5m`, `1h`, `1d`, `1w`
    Interval,
    /// Base58 Solana public key.
    Pubkey,
}

impl Pattern {
    pub fn matches(&self, s: &str) -> bool {
        match self {
            Self::Interval => parse_interval(s).is_some(),
            Self::Pubkey => Pubkey::from_str(s).is_ok(),
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interval => f.write_str("an interval such as 5m or 1h"),
            Self::Pubkey => f.write_str("a base58 public key"),
        }
    }
}

/// Parses `<n><unit>` with unit one of `s m h d w`.
pub fn parse_interval(s: &str) -> Option<Duration> {
    let s = s.trim();
    let unit = s.chars().last()?;
    let n: u64 = s[..s.len() - unit.len_utf8()].parse().ok()?;
    if n == 0 {
        return None;
    }
    let unit_secs: u64 = match unit {
        's' => 1,
        'm' => 60,
        'h' => 3_600,
        'd' => 86_400,
        'w' => 604_800,
        _ => return None,
    };
    n.checked_mul(unit_secs).map(Duration::from_secs)
}

pub const WEEKDAYS: [&str; 7] = ["mon", "tue", "wed", "thu", "fri", "sat", "sun"];

/// Named predicates a field rule can reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CustomCheck {
    NonEmpty,
    /// A token pair with both mints selected.
    ValidPair,
    /// A non-empty list of `mon`..`sun`.
    Weekdays,
}

impl CustomCheck {
    pub fn check(&self, value: &ConfigValue) -> bool {
        match self {
            Self::NonEmpty => match value {
                ConfigValue::List(l) => !l.is_empty(),
                other => !other.is_blank(),
            },
            Self::ValidPair => value.as_pair().is_some_and(TokenPair::has_mints),
            Self::Weekdays => value.as_list().is_some_and(|days| {
                !days.is_empty() && days.iter().all(|d| WEEKDAYS.contains(&d.as_str()))
            }),
        }
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Self::NonEmpty => "must not be empty",
            Self::ValidPair => "must select both input and output tokens",
            Self::Weekdays => "must list days as mon..sun",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRule {
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<Pattern>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom: Option<CustomCheck>,
}

impl FieldRule {
    pub fn required() -> Self {
        Self {
            required: true,
            ..Self::default()
        }
    }

    pub fn optional() -> Self {
        Self::default()
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn pattern(mut self, pattern: Pattern) -> Self {
        self.pattern = Some(pattern);
        self
    }

    pub fn custom(mut self, check: CustomCheck) -> Self {
        self.custom = Some(check);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedConnections {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Vec<BlockKind>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<BlockKind>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: BlockId,
    /// Catalog entry this block was created from, e.g. `price-trigger`.
    pub template: String,
    #[serde(rename = "type")]
    kind: BlockKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    chain_affinity: ChainAffinity,
    #[serde(default)]
    config: BlockConfig,
    #[serde(default, skip_serializing_if = "OrderedMap::is_empty")]
    pub validation_rules: OrderedMap<FieldRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_inputs: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_outputs: Option<usize>,
    #[serde(default)]
    pub allowed_connections: AllowedConnections,
}

impl Block {
    pub fn new(
        id: impl Into<BlockId>,
        template: impl Into<String>,
        kind: BlockKind,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            template: template.into(),
            kind,
            category: None,
            label: label.into(),
            chain_affinity: ChainAffinity::Both,
            config: BlockConfig::new(),
            validation_rules: OrderedMap::new(),
            max_inputs: None,
            max_outputs: None,
            allowed_connections: AllowedConnections::default(),
        }
    }

    pub fn with_chain_affinity(mut self, affinity: ChainAffinity) -> Self {
        self.chain_affinity = affinity;
        self
    }

    /// Declares a config field. Used while building, before the block joins a strategy.
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.config.insert(field, value.into());
        self
    }

    pub fn with_config(mut self, config: BlockConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_rule(mut self, field: impl Into<String>, rule: FieldRule) -> Self {
        self.validation_rules.insert(field, rule);
        self
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn chain_affinity(&self) -> ChainAffinity {
        self.chain_affinity
    }

    pub fn config(&self) -> &BlockConfig {
        &self.config
    }

    pub fn field(&self, name: &str) -> Option<&ConfigValue> {
        self.config.get(name)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.field(name).and_then(ConfigValue::as_f64)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(ConfigValue::as_str)
    }

    pub fn pair(&self) -> Option<&TokenPair> {
        self.field("pair").and_then(ConfigValue::as_pair)
    }

    /// Label when set, otherwise the id.
    pub fn display_name(&self) -> &str {
        if self.label.is_empty() {
            &self.id
        } else {
            &self.label
        }
    }

    /// Updates a config value. Keys are fixed at creation except on `dca` blocks.
    pub fn set_config(
        &mut self,
        field: &str,
        value: impl Into<ConfigValue>,
    ) -> Result<(), GraphError> {
        if self.kind != BlockKind::Dca && !self.config.contains_key(field) {
            return Err(GraphError::FixedConfigKey {
                block: self.id.clone(),
                field: field.to_string(),
            });
        }
        self.config.insert(field, value.into());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: ConnectionId,
    pub source_id: BlockId,
    pub target_id: BlockId,
}

impl Connection {
    pub fn new(
        id: impl Into<ConnectionId>,
        source_id: impl Into<BlockId>,
        target_id: impl Into<BlockId>,
    ) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            target_id: target_id.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub connections: Vec<Connection>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub positions: HashMap<BlockId, Position>,
}

impl Strategy {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn block(&self, id: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn block_mut(&mut self, id: &str) -> Option<&mut Block> {
        self.blocks.iter_mut().find(|b| b.id == id)
    }

    pub fn has_kind(&self, kind: BlockKind) -> bool {
        self.blocks.iter().any(|b| b.kind() == kind)
    }

    pub fn find_kind(&self, kind: BlockKind) -> Option<&Block> {
        self.blocks.iter().find(|b| b.kind() == kind)
    }

    pub fn incoming<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter(move |c| c.target_id == id)
    }

    pub fn outgoing<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Connection> + 'a {
        self.connections.iter().filter(move |c| c.source_id == id)
    }

    pub fn position(&self, id: &str) -> Option<Position> {
        self.positions.get(id).copied()
    }

    pub fn add_block(&mut self, block: Block, position: Position) -> Result<(), GraphError> {
        if self.block(&block.id).is_some() {
            return Err(GraphError::DuplicateBlock(block.id));
        }
        self.positions.insert(block.id.clone(), position);
        self.blocks.push(block);
        Ok(())
    }

    /// Removes the block together with every connection touching it.
    pub fn remove_block(&mut self, id: &str) -> Result<Block, GraphError> {
        let idx = self
            .blocks
            .iter()
            .position(|b| b.id == id)
            .ok_or_else(|| GraphError::UnknownBlock(id.to_string()))?;
        self.connections
            .retain(|c| c.source_id != id && c.target_id != id);
        self.positions.remove(id);
        Ok(self.blocks.remove(idx))
    }

    /// Adds a directed edge. A repeated ordered pair returns the existing edge id.
    pub fn connect(&mut self, source_id: &str, target_id: &str) -> Result<ConnectionId, GraphError> {
        if source_id == target_id {
            return Err(GraphError::SelfLoop(source_id.to_string()));
        }
        for id in [source_id, target_id] {
            if self.block(id).is_none() {
                return Err(GraphError::UnknownBlock(id.to_string()));
            }
        }
        if let Some(existing) = self
            .connections
            .iter()
            .find(|c| c.source_id == source_id && c.target_id == target_id)
        {
            return Ok(existing.id.clone());
        }
        let id = Uuid::new_v4().to_string();
        self.connections
            .push(Connection::new(id.clone(), source_id, target_id));
        Ok(id)
    }

    pub fn disconnect(&mut self, connection_id: &str) -> Result<Connection, GraphError> {
        let idx = self
            .connections
            .iter()
            .position(|c| c.id == connection_id)
            .ok_or_else(|| GraphError::UnknownConnection(connection_id.to_string()))?;
        Ok(self.connections.remove(idx))
    }

    pub fn update_config(
        &mut self,
        block_id: &str,
        field: &str,
        value: impl Into<ConfigValue>,
    ) -> Result<(), GraphError> {
        self.block_mut(block_id)
            .ok_or_else(|| GraphError::UnknownBlock(block_id.to_string()))?
            .set_config(field, value)
    }

    pub fn move_block(&mut self, id: &str, position: Position) -> Result<(), GraphError> {
        if self.block(id).is_none() {
            return Err(GraphError::UnknownBlock(id.to_string()));
        }
        self.positions.insert(id.to_string(), position);
        Ok(())
    }

    /// Blocks ordered so that every block follows its inputs, ties broken by
    /// declaration order. Blocks left on a cycle are appended in declaration order.
    pub fn topological_order(&self) -> Vec<&Block> {
        let index: HashMap<&str, usize> = self
            .blocks
            .iter()
            .enumerate()
            .map(|(i, b)| (b.id.as_str(), i))
            .collect();

        let mut indegree = vec![0usize; self.blocks.len()];
        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); self.blocks.len()];
        for c in &self.connections {
            let (Some(&s), Some(&t)) = (
                index.get(c.source_id.as_str()),
                index.get(c.target_id.as_str()),
            ) else {
                continue;
            };
            edges[s].push(t);
            indegree[t] += 1;
        }

        let mut ready: BinaryHeap<Reverse<usize>> = indegree
            .iter()
            .enumerate()
            .filter(|(_, d)| **d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();
        let mut placed = vec![false; self.blocks.len()];
        let mut order = Vec::with_capacity(self.blocks.len());

        while let Some(Reverse(i)) = ready.pop() {
            placed[i] = true;
            order.push(&self.blocks[i]);
            for &t in &edges[i] {
                indegree[t] -= 1;
                if indegree[t] == 0 {
                    ready.push(Reverse(t));
                }
            }
        }

        order.extend(
            self.blocks
                .iter()
                .enumerate()
                .filter(|(i, _)| !placed[*i])
                .map(|(_, b)| b),
        );
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(id: &str, kind: BlockKind) -> Block {
        Block::new(id, "test", kind, id.to_uppercase()).with_field("amount", 1.0)
    }

    fn strategy(ids: &[(&str, BlockKind)]) -> Strategy {
        let mut s = Strategy::new("s", "test");
        for (id, kind) in ids {
            s.add_block(block(id, *kind), Position::default()).unwrap();
        }
        s
    }

    #[test]
    fn connect_rejects_self_loops_and_unknown_blocks() {
        let mut s = strategy(&[("a", BlockKind::Trigger), ("b", BlockKind::Action)]);
        assert_eq!(s.connect("a", "a"), Err(GraphError::SelfLoop("a".into())));
        assert_eq!(s.connect("a", "zz"), Err(GraphError::UnknownBlock("zz".into())));
        assert!(s.connections.is_empty());
    }

    #[test]
    fn duplicate_edges_are_deduplicated() {
        let mut s = strategy(&[("a", BlockKind::Trigger), ("b", BlockKind::Action)]);
        let first = s.connect("a", "b").unwrap();
        let second = s.connect("a", "b").unwrap();
        assert_eq!(first, second);
        assert_eq!(s.connections.len(), 1);
    }

    #[test]
    fn removing_a_block_drops_its_edges_and_position() {
        let mut s = strategy(&[
            ("a", BlockKind::Trigger),
            ("b", BlockKind::Condition),
            ("c", BlockKind::Action),
        ]);
        s.connect("a", "b").unwrap();
        s.connect("b", "c").unwrap();
        s.remove_block("b").unwrap();
        assert!(s.connections.is_empty());
        assert!(s.position("b").is_none());
        assert_eq!(s.blocks.len(), 2);
        assert!(s.remove_block("b").is_err());
    }

    #[test]
    fn config_keys_are_fixed_except_for_dca() {
        let mut s = strategy(&[("a", BlockKind::Action), ("d", BlockKind::Dca)]);
        s.update_config("a", "amount", 2.5).unwrap();
        assert_eq!(s.block("a").and_then(|b| b.number("amount")), Some(2.5));
        assert!(matches!(
            s.update_config("a", "bogus", 1.0),
            Err(GraphError::FixedConfigKey { .. })
        ));
        s.update_config("d", "note", "weekly").unwrap();
        assert_eq!(s.block("d").and_then(|b| b.text("note")), Some("weekly"));
    }

    #[test]
    fn topological_order_respects_edges_then_declaration() {
        let mut s = strategy(&[
            ("act", BlockKind::Action),
            ("cond", BlockKind::Condition),
            ("trig", BlockKind::Trigger),
            ("lone", BlockKind::Trigger),
        ]);
        s.connect("trig", "cond").unwrap();
        s.connect("cond", "act").unwrap();
        let ids: Vec<&str> = s.topological_order().iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["trig", "cond", "act", "lone"]);
    }

    #[test]
    fn non_finite_text_is_not_a_number() {
        assert_eq!(ConfigValue::from("42.5").as_f64(), Some(42.5));
        assert_eq!(ConfigValue::from("NaN").as_f64(), None);
        assert_eq!(ConfigValue::from("inf").as_f64(), None);
        assert_eq!(ConfigValue::Number(f64::NAN).as_f64(), None);
    }

    #[test]
    fn intervals_parse() {
        assert_eq!(parse_interval("5m"), Some(Duration::from_secs(300)));
        assert_eq!(parse_interval("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_interval("24h"), Some(Duration::from_secs(86_400)));
        assert_eq!(parse_interval("0m"), None);
        assert_eq!(parse_interval("h"), None);
        assert_eq!(parse_interval("5x"), None);
        assert_eq!(parse_interval(""), None);
    }

    #[test]
    fn config_round_trips_as_an_ordered_object() {
        let b = block("a", BlockKind::Action)
            .with_field("side", "buy")
            .with_field("slippage", 1.0);
        let json = serde_json::to_value(&b).unwrap();
        assert_eq!(json["type"], "action");
        assert_eq!(json["config"]["side"], "buy");
        let back: Block = serde_json::from_value(json).unwrap();
        let keys: Vec<&str> = back.config().keys().collect();
        assert_eq!(keys, vec!["amount", "side", "slippage"]);
        assert_eq!(back, b);
    }
}
