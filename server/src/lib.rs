//! FlightSurety oracle server library
//!
//! Watches the FlightSuretyApp contract for `OracleRequest` events and
//! answers them through the registered oracle accounts.

pub mod config;
pub mod event_listener;
pub mod handlers;
pub mod ledger;
pub mod models;
pub mod routes;
pub mod services;
pub mod supervisor;
