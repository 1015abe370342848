//! Boundary types shared by the query core: item ids, type providers,
//! identifier validation and rendering configuration.

pub mod config;
pub mod item;

pub use config::{ConfigError, QueryConfig};
pub use item::{IdError, ItemId, TypeMap, TypeProvider, ValidationError};
