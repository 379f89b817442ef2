//! Oracle coordination services

pub mod oracle_registry;
pub mod response_dispatcher;
pub mod status_classifier;

pub use oracle_registry::{spawn_registry_refresh, OracleRegistry, RegistryHandle};
pub use response_dispatcher::ResponseDispatcher;
pub use status_classifier::{classify, now_unix};
