//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Port interfaces for the upstream feed and historical vendor.
pub mod ports;

/// Live multiplexing and historical bar services.
pub mod services;
