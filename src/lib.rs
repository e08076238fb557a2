// Core domain types and loop lifecycle
pub mod core;

// Configuration (toml file + per-symbol overrides)
pub mod config;

// Venue access: trait, return codes, paper venue
pub mod venue;

// Signal sources
pub mod predictor;

// Risk gate and sizing
pub mod risk;

// Order submission and position reconciliation
pub mod execution;

// The polling trading loop
pub mod trading;

// Re-export commonly used types for convenience
pub use self::core::*;
pub use config::Config;
pub use trading::Trader;
