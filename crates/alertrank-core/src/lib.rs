//! alertrank-core: alert lifecycle tracking and ranked unhealthy-time indexes.
//! Pairs each alert's opening with its resolution, attributes the elapsed time
//! to every configured grouping dimension, and answers top-k queries.
//! Synchronous and IO-free apart from loading a config file.

pub mod config;
pub mod error;
pub mod extractor;
pub mod index;
pub mod manager;
pub mod pipeline;
pub mod query;
pub mod tracker;
pub mod types;
pub mod validator;

pub use config::{DEFAULT_DIMENSIONS, DimensionSpec, EngineConfig};
pub use error::{ConfigError, EventError, LifecycleWarning, QueryError, ValidationIssue};
pub use extractor::{AttributeExtractor, DimensionExtractor, ExtractorRegistry, FallbackExtractor};
pub use index::{EntityState, RankedDimensionIndex};
pub use manager::IndexManager;
pub use pipeline::{IngestStats, Pipeline};
pub use query::QueryEngine;
pub use tracker::{AlertTracker, Transition, UnmatchedResolvePolicy};
pub use types::{AlertEvent, LifecycleState, RankedEntity, TopKReport, UnhealthyInterval};
pub use validator::{EventValidator, Validated};
