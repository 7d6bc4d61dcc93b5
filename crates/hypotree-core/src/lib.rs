//! hypotree core - node model, synthesis documents, wire envelope, config and errors

pub mod config;
pub mod error;
pub mod protocol;
pub mod types;

pub use config::{AggregationConfig, CacheConfig, HypotreeConfig, StoreBackend, StoreConfig};
pub use error::{Error, Result};
pub use protocol::*;
pub use types::*;
