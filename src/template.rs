use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{info, warn};

use crate::graph::{BlockId, Position, Strategy};
use crate::registry::BlockRegistry;

const GRID_COLS: usize = 3;
const BLOCK_SPACING_X: f64 = 300.0;
const BLOCK_SPACING_Y: f64 = 200.0;
const INITIAL_OFFSET: Position = Position { x: 100.0, y: 100.0 };

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyTemplate {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    pub strategy: Strategy,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub chain_support: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LoadedTemplate {
    pub template_id: String,
    pub strategy: Strategy,
    pub positions: HashMap<BlockId, Position>,
}

pub fn load_template(path: impl AsRef<Path>, registry: &BlockRegistry) -> Result<LoadedTemplate> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading template {}", path.display()))?;
    parse_template(&raw, registry)
}

/// Parses a template, re-attaches catalog rules and lays blocks out on a grid.
pub fn parse_template(raw: &str, registry: &BlockRegistry) -> Result<LoadedTemplate> {
    let template: StrategyTemplate = serde_json::from_str(raw)?;
    let mut strategy = template.strategy;

    let mut seen = HashSet::new();
    for block in &strategy.blocks {
        if !seen.insert(block.id.as_str()) {
            return Err(anyhow!("template {}: duplicate block id {}", template.id, block.id));
        }
    }

    for block in strategy.blocks.iter_mut() {
        if !registry.hydrate(block) {
            warn!(block = %block.id, template = %block.template, "template.unknown_block_template");
        }
    }

    let positions = grid_positions(&strategy);
    strategy.positions = positions.clone();
    info!(
        template = %template.id,
        blocks = strategy.blocks.len(),
        connections = strategy.connections.len(),
        "template.loaded"
    );

    Ok(LoadedTemplate {
        template_id: template.id,
        strategy,
        positions,
    })
}

pub fn grid_positions(strategy: &Strategy) -> HashMap<BlockId, Position> {
    strategy
        .blocks
        .iter()
        .enumerate()
        .map(|(i, b)| {
            let pos = Position {
                x: INITIAL_OFFSET.x + (i % GRID_COLS) as f64 * BLOCK_SPACING_X,
                y: INITIAL_OFFSET.y + (i / GRID_COLS) as f64 * BLOCK_SPACING_Y,
            };
            (b.id.clone(), pos)
        })
        .collect()
}
