//! Structural and semantic checks over a whole strategy.
//!
//! Every violation is collected; nothing short-circuits. Connections whose
//! endpoints do not resolve are ignored by the structural checks.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::graph::{Block, BlockId, BlockKind, ChainAffinity, ConfigValue, ConnectionId, FieldRule, Strategy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationErrorKind {
    Connection,
    Configuration,
    General,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    #[serde(rename = "type")]
    pub kind: ValidationErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<BlockId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_id: Option<ConnectionId>,
}

impl ValidationError {
    fn general(message: impl Into<String>) -> Self {
        Self {
            kind: ValidationErrorKind::General,
            message: message.into(),
            block_id: None,
            connection_id: None,
        }
    }

    fn on_block(kind: ValidationErrorKind, block: &Block, message: String) -> Self {
        Self {
            kind,
            message,
            block_id: Some(block.id.clone()),
            connection_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    fn from_errors(errors: Vec<ValidationError>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationService;

impl ValidationService {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_strategy(&self, strategy: &Strategy) -> ValidationResult {
        let index: HashMap<&str, &Block> = strategy
            .blocks
            .iter()
            .map(|b| (b.id.as_str(), b))
            .collect();
        let mut errors = Vec::new();

        self.check_chain_compatibility(strategy, &index, &mut errors);
        self.check_presence(strategy, &mut errors);
        for block in &strategy.blocks {
            self.check_arity(block, strategy, &index, &mut errors);
            self.check_input_kinds(block, strategy, &index, &mut errors);
            errors.extend(self.validate_block_fields(block));
            self.check_block_values(block, &mut errors);
        }
        if has_cycle(strategy, &index) {
            errors.push(ValidationError::general(
                "Strategy contains circular dependencies",
            ));
        }

        ValidationResult::from_errors(errors)
    }

    /// Field-level rule checks for a single block.
    pub fn validate_block_fields(&self, block: &Block) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        for (field, rule) in block.validation_rules.iter() {
            let value = block.field(field).unwrap_or(&ConfigValue::Null);
            for message in field_violations(field, block.display_name(), value, rule) {
                errors.push(ValidationError::on_block(
                    ValidationErrorKind::Configuration,
                    block,
                    message,
                ));
            }
        }
        errors
    }

    /// Triggers need a positive `price` and actions a positive `amount`.
    /// Blocks without the field are skipped.
    fn check_block_values(&self, block: &Block, errors: &mut Vec<ValidationError>) {
        let field = match block.kind() {
            BlockKind::Trigger => "price",
            BlockKind::Action => "amount",
            _ => return,
        };
        if block.number(field).is_some_and(|n| n <= 0.0) {
            errors.push(ValidationError::on_block(
                ValidationErrorKind::Configuration,
                block,
                format!("Invalid {field} in \"{}\"", block.display_name()),
            ));
        }
    }

    fn check_chain_compatibility(
        &self,
        strategy: &Strategy,
        index: &HashMap<&str, &Block>,
        errors: &mut Vec<ValidationError>,
    ) {
        for conn in &strategy.connections {
            let (Some(source), Some(target)) = (
                index.get(conn.source_id.as_str()),
                index.get(conn.target_id.as_str()),
            ) else {
                continue;
            };
            let (a, b) = (source.chain_affinity(), target.chain_affinity());
            if a == ChainAffinity::Both || b == ChainAffinity::Both || a == b {
                continue;
            }
            errors.push(ValidationError {
                kind: ValidationErrorKind::Configuration,
                message: format!(
                    "Chain incompatibility: {} ({a}) cannot connect to {} ({b})",
                    source.display_name(),
                    target.display_name()
                ),
                block_id: Some(source.id.clone()),
                connection_id: Some(conn.id.clone()),
            });
        }
    }

    fn check_presence(&self, strategy: &Strategy, errors: &mut Vec<ValidationError>) {
        if !strategy.has_kind(BlockKind::Trigger) {
            errors.push(ValidationError::general(
                "Strategy must have at least one trigger",
            ));
        }
        if !strategy.has_kind(BlockKind::Action) {
            errors.push(ValidationError::general(
                "Strategy must have at least one action",
            ));
        }
    }

    fn check_arity(
        &self,
        block: &Block,
        strategy: &Strategy,
        index: &HashMap<&str, &Block>,
        errors: &mut Vec<ValidationError>,
    ) {
        let inputs = strategy
            .incoming(&block.id)
            .filter(|c| index.contains_key(c.source_id.as_str()))
            .count();
        let outputs = strategy
            .outgoing(&block.id)
            .filter(|c| index.contains_key(c.target_id.as_str()))
            .count();

        if let Some(max) = block.max_inputs.filter(|max| inputs > *max) {
            errors.push(ValidationError::on_block(
                ValidationErrorKind::Connection,
                block,
                format!(
                    "Block \"{}\" exceeds maximum input connections ({max})",
                    block.display_name()
                ),
            ));
        }
        if let Some(max) = block.max_outputs.filter(|max| outputs > *max) {
            errors.push(ValidationError::on_block(
                ValidationErrorKind::Connection,
                block,
                format!(
                    "Block \"{}\" exceeds maximum output connections ({max})",
                    block.display_name()
                ),
            ));
        }
    }

    fn check_input_kinds(
        &self,
        block: &Block,
        strategy: &Strategy,
        index: &HashMap<&str, &Block>,
        errors: &mut Vec<ValidationError>,
    ) {
        let Some(allowed) = &block.allowed_connections.inputs else {
            return;
        };
        for conn in strategy.incoming(&block.id) {
            let Some(source) = index.get(conn.source_id.as_str()) else {
                continue;
            };
            if !allowed.contains(&source.kind()) {
                errors.push(ValidationError {
                    kind: ValidationErrorKind::Connection,
                    message: format!(
                        "Invalid connection: {} cannot connect to {}",
                        source.display_name(),
                        block.display_name()
                    ),
                    block_id: None,
                    connection_id: Some(conn.id.clone()),
                });
            }
        }
    }
}

fn field_violations(field: &str, block: &str, value: &ConfigValue, rule: &FieldRule) -> Vec<String> {
    if value.is_blank() {
        return if rule.required {
            vec![format!("\"{field}\" is required in \"{block}\"")]
        } else {
            Vec::new()
        };
    }

    let mut out = Vec::new();
    if rule.min.is_some() || rule.max.is_some() {
        match value.as_f64() {
            None => out.push(format!("\"{field}\" in \"{block}\" must be a number")),
            Some(n) => {
                if let Some(min) = rule.min.filter(|min| n < *min) {
                    out.push(format!("\"{field}\" in \"{block}\" must be at least {min}"));
                }
                if let Some(max) = rule.max.filter(|max| n > *max) {
                    out.push(format!("\"{field}\" in \"{block}\" must be at most {max}"));
                }
            }
        }
    }
    if let Some(pattern) = rule.pattern {
        if !pattern.matches(&value.to_string()) {
            out.push(format!("\"{field}\" in \"{block}\" must be {pattern}"));
        }
    }
    if let Some(check) = rule.custom {
        if !check.check(value) {
            out.push(format!("\"{field}\" in \"{block}\" {}", check.describe()));
        }
    }
    out
}

/// Depth-first search with an explicit recursion stack; stops at the first back edge.
fn has_cycle(strategy: &Strategy, index: &HashMap<&str, &Block>) -> bool {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for c in &strategy.connections {
        if index.contains_key(c.source_id.as_str()) && index.contains_key(c.target_id.as_str()) {
            adjacency
                .entry(c.source_id.as_str())
                .or_default()
                .push(c.target_id.as_str());
        }
    }

    let mut visited: HashSet<&str> = HashSet::new();
    let mut on_stack: HashSet<&str> = HashSet::new();

    for root in strategy.blocks.iter().map(|b| b.id.as_str()) {
        if visited.contains(root) {
            continue;
        }
        // (node, index of the next child to explore)
        let mut stack: Vec<(&str, usize)> = vec![(root, 0)];
        visited.insert(root);
        on_stack.insert(root);

        while let Some((node, next)) = stack.last_mut() {
            let children = adjacency.get(*node).map(Vec::as_slice).unwrap_or(&[]);
            if let Some(&child) = children.get(*next) {
                *next += 1;
                if on_stack.contains(child) {
                    return true;
                }
                if visited.insert(child) {
                    on_stack.insert(child);
                    stack.push((child, 0));
                }
            } else {
                on_stack.remove(*node);
                stack.pop();
            }
        }
    }
    false
}
