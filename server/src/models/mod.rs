//! Data models for the FlightSurety oracle server

use serde::{Deserialize, Serialize};

pub mod oracle;

pub use alloy_primitives::{Address, U256};
pub use oracle::*;

/// Acknowledgement body served by the health route
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApiMessage {
    pub message: String,
}
