//! # Mend Common Library
//!
//! Shared code for the Mend remediation coordinator:
//! - Domain value types (failure events, diagnoses, fixes, runs)
//! - Event types (CoordinatorEvent enum) and the EventBus
//! - Error taxonomy
//! - Configuration loading

pub mod config;
pub mod error;
pub mod events;
pub mod model;

pub use error::{Error, Result};
pub use events::{CoordinatorEvent, EventBus};
