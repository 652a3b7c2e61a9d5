//! Ruleforge: the operation IR, schema registry and optimizer behind a rule-engine script compiler.
//!
//! Higher-level lowering code builds [`Node`] trees against a [`Registry`] loaded from an
//! external schema, runs them through the rewrite engine, and emits them as the target's
//! textual script format.
//!
//! # Architecture
//! - Schema registry (operations, parameters, enum families, default values)
//! - Operation IR (construction with defaulting, structural equality, constant extraction)
//! - Rewrite engine (constant folding, algebraic identities, vector arithmetic)
//! - Cost accounting and text emission

mod schema;
mod registry;
mod types;
mod ir;
mod optimize;
mod emit;
mod cost;
mod config;

pub use schema::*;
pub use registry::{global, init_global, Registry, LOCALIZED_DEFAULT_TOKEN, NULL_OPERATION};
pub use types::*;
pub use ir::*;
pub use optimize::*;
pub use emit::*;
pub use cost::*;
pub use config::*;

use thiserror::Error;

/// Unified error type for Ruleforge operations.
///
/// Every variant is an internal-invariant failure: a malformed schema or a lowering bug.
/// Optimization and emission never fail.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RuleforgeError {
    #[error("unknown operation: {0}")]
    UnknownOperation(String),
    #[error("unknown enum family: {0}")]
    UnknownEnumFamily(String),
    #[error("unknown member '{member}' in enum family '{family}'")]
    UnknownEnumMember { family: String, member: String },
    #[error("parameter '{parameter}' (#{index}) of '{operation}' has no value and no default")]
    MissingDefault {
        operation: String,
        parameter: String,
        index: usize,
    },
    #[error("parameter '{parameter}' of '{operation}' has an unusable default value: {raw}")]
    InvalidDefault {
        operation: String,
        parameter: String,
        raw: String,
    },
    #[error("schema error: {0}")]
    Schema(String),
    #[error("malformed document: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RuleforgeError>;
