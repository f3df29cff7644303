//! `placefuse-resolve`: place entity resolution and conflation engine.
//!
//! Pure engine crate: receives pre-loaded records, returns clusters and
//! golden records. Source adapters take file contents as strings; only
//! [`DirChunkStore`] touches the filesystem.

pub mod blocking;
pub mod checkpoint;
pub mod cluster;
pub mod config;
pub mod decision;
pub mod engine;
pub mod error;
pub mod features;
pub mod geo;
pub mod ingest;
pub mod labeling;
pub mod model;
pub mod output;
pub mod summary;
pub mod survivorship;

pub use checkpoint::{ChunkStore, DirChunkStore, MemoryChunkStore};
pub use config::ResolveConfig;
pub use decision::MatchScorer;
pub use engine::{run, run_training};
pub use error::ResolveError;
pub use labeling::ManualOverrides;
pub use model::{GoldenRecord, Record, ResolveInput, ResolveResult, SourceTag};
