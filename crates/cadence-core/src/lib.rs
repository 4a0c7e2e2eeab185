//! Shared domain types, errors and configuration for the Cadence client.

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::CadenceConfig;
pub use error::{CadenceError, Result};
pub use events::DeliveryEvent;
pub use types::*;
