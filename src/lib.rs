//! Core of a block-based trading bot builder: the strategy graph, the block
//! catalog, strategy validation, and the execution engine with its Solana
//! DCA path.

pub mod chain;
pub mod config;
pub mod error;
pub mod execution;
pub mod graph;
pub mod market;
pub mod monitoring;
pub mod registry;
pub mod session;
pub mod template;
pub mod tokens;
pub mod validation;
pub mod wallet;

pub use error::{EngineError, GraphError};
pub use graph::{Block, BlockKind, ChainAffinity, Connection, Strategy};
pub use registry::BlockRegistry;
pub use validation::{ValidationError, ValidationResult, ValidationService};
