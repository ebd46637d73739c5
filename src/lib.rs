//! # BoardSync Coordination Core
//!
//! The operational transform and selection coordination engines behind a
//! real-time collaborative whiteboard: reconciles concurrent element edits
//! from many users into one consistent document, and arbitrates contested
//! element selections between them.
//!
//! ## Architecture
//!
//! - `clock`: vector clocks and Lamport timestamps for causal ordering
//! - `operation`: the element-operation data model the engine ingests
//! - `spatial`: bounded R-tree index used to narrow spatial-conflict candidates
//! - `cache`: bounded LRU caches (transform results, recent operations)
//! - `limits`: payload shape/size validation bounds
//! - `config`: the single immutable engine configuration
//! - `conflict`: the shared conflict-record vocabulary
//! - `detector`: pairwise conflict detectors (spatial/temporal/semantic/ordering/dependency/compound)
//! - `resolver`: automatic conflict resolution strategies
//! - `transform`: the operational transform core
//! - `validator`: payload validation, rate limiting, and abuse detection
//! - `transaction`: multi-operation transaction lifecycle
//! - `selection` / `selection_store` / `selection_resolver` / `highlight`: the selection coordination engine
//! - `housekeeper`: periodic cleanup and metrics
//! - `queue`: per-whiteboard bounded inbound queues and backpressure
//! - `persistence`: the storage seam the engine calls but never implements
//! - `engine`: the `Whiteboard` façade tying every component together
//! - `error`: the single tagged error type surfaced by every public operation

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod clock;
pub mod config;
pub mod conflict;
pub mod detector;
pub mod engine;
pub mod error;
pub mod highlight;
pub mod housekeeper;
pub mod limits;
pub mod operation;
pub mod persistence;
pub mod queue;
pub mod resolver;
pub mod selection;
pub mod selection_resolver;
pub mod selection_store;
pub mod spatial;
pub mod transaction;
pub mod transform;
pub mod validator;

pub use config::EngineConfig;
pub use engine::{EngineEvent, Whiteboard};
pub use error::{Error, Result};

/// Crate version, re-exported for diagnostics.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name, re-exported for diagnostics.
pub const NAME: &str = env!("CARGO_PKG_NAME");
