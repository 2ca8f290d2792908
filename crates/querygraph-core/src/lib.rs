//! QueryGraph Core
//!
//! Canonical query model, error taxonomy and configuration shared by the
//! parser, the generator and the round-trip validator.
//! Never rename diagnostic codes - they are part of the public API.

pub mod diagnostic;
pub mod error;
pub mod model;
pub mod config;

pub use diagnostic::{Diagnostic, DiagnosticCode, Severity, Location};
pub use error::TranspileError;
pub use model::{
    AggregateFunction, AggregationBlock, FilterCondition, FilterOperator, FilterValue,
    HavingCondition, JoinRelation, JoinType, ModelShape, OrderByColumn, Position, QueryModel,
    SelectColumn, SortDirection, TableNode, DEFAULT_NAMESPACE, UNKNOWN_TABLE, WILDCARD,
};
pub use config::{Config, ConfigError, DialectConfig, GeneratorConfig, LimitsConfig, CacheConfig};
