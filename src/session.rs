//! Editing session for one strategy, as driven by the visual builder.

use tracing::{debug, info};

use crate::error::GraphError;
use crate::graph::{BlockId, ConfigValue, ConnectionId, Position, Strategy};
use crate::registry::BlockRegistry;
use crate::template::LoadedTemplate;
use crate::validation::{ValidationError, ValidationService};

pub struct BuilderSession {
    registry: BlockRegistry,
    validator: ValidationService,
    strategy: Strategy,
    errors: Vec<ValidationError>,
    validated: bool,
}

impl BuilderSession {
    pub fn new(registry: BlockRegistry, validator: ValidationService, strategy: Strategy) -> Self {
        Self {
            registry,
            validator,
            strategy,
            errors: Vec::new(),
            validated: false,
        }
    }

    pub fn from_template(
        registry: BlockRegistry,
        validator: ValidationService,
        loaded: LoadedTemplate,
    ) -> Self {
        let mut strategy = loaded.strategy;
        strategy.positions = loaded.positions;
        Self::new(registry, validator, strategy)
    }

    pub fn strategy(&self) -> &Strategy {
        &self.strategy
    }

    pub fn registry(&self) -> &BlockRegistry {
        &self.registry
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    /// True once the latest validation pass came back clean.
    pub fn can_start(&self) -> bool {
        self.validated && self.errors.is_empty()
    }

    pub fn validate(&mut self) -> &[ValidationError] {
        self.errors = self.validator.validate_strategy(&self.strategy).errors;
        self.validated = true;
        &self.errors
    }

    /// Drops a new block from the palette. Unknown kinds are ignored.
    pub fn drop_block(&mut self, kind_id: &str, position: Position) -> Option<BlockId> {
        let Some(block) = self.registry.create_block(kind_id) else {
            debug!(kind = kind_id, "builder.drop.unknown_kind");
            return None;
        };
        let id = block.id.clone();
        self.strategy.add_block(block, position).ok()?;
        self.validated = false;
        Some(id)
    }

    pub fn remove_block(&mut self, id: &str) -> Result<(), GraphError> {
        self.strategy.remove_block(id)?;
        self.validated = false;
        Ok(())
    }

    /// Keeps the edge only when it introduces no validation error that was
    /// not already present. Rejected edges leave the strategy untouched and
    /// store the full error list.
    pub fn connect(
        &mut self,
        source_id: &str,
        target_id: &str,
    ) -> Result<Result<ConnectionId, Vec<ValidationError>>, GraphError> {
        let before = self.validator.validate_strategy(&self.strategy).errors;
        let mut candidate = self.strategy.clone();
        let id = candidate.connect(source_id, target_id)?;
        let after = self.validator.validate_strategy(&candidate).errors;

        let introduced = after.iter().any(|e| !before.contains(e));
        if introduced {
            info!(source = source_id, target = target_id, "builder.connect.rejected");
            self.errors = after.clone();
            self.validated = true;
            return Ok(Err(after));
        }

        self.strategy = candidate;
        self.errors = after;
        self.validated = true;
        Ok(Ok(id))
    }

    pub fn disconnect(&mut self, connection_id: &str) -> Result<(), GraphError> {
        self.strategy.disconnect(connection_id)?;
        self.validated = false;
        Ok(())
    }

    pub fn update_config(
        &mut self,
        block_id: &str,
        field: &str,
        value: impl Into<ConfigValue>,
    ) -> Result<(), GraphError> {
        self.strategy.update_config(block_id, field, value)?;
        self.validated = false;
        Ok(())
    }

    pub fn move_block(&mut self, id: &str, position: Position) -> Result<(), GraphError> {
        self.strategy.move_block(id, position)
    }

    /// Empties the canvas, keeping the strategy identity.
    pub fn reset(&mut self) {
        self.strategy = Strategy::new(self.strategy.id.clone(), self.strategy.name.clone());
        self.errors.clear();
        self.validated = false;
    }
}
