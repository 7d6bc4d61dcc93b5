//! hypotree-engine - tree manager and bottom-up aggregation

pub mod aggregate;
pub mod manager;

pub use aggregate::{aggregate, AggregationPolicy, Aggregation, Contribution};
pub use manager::TreeManager;
