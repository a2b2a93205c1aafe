//! Domain Layer - Core market data types and business logic.
//!
//! This layer contains the core domain types for futures market data
//! with no I/O. All types here are pure Rust with serialization support.

/// Served futures roots and symbol parsing.
pub mod catalog;

/// Daily bars, resolutions, rollups, and the bar cache.
pub mod history;

/// Live trade types and the last-trade cache.
pub mod streaming;

/// Session interest tracking and upstream reference counting.
pub mod subscription;
