//! Broker adapters.
//!
//! Every adapter implements the connector seams from [`crate::connector`];
//! none of them contains lifecycle logic of its own.

pub mod memory;

#[cfg(feature = "kafka")]
pub mod kafka;
