//! Registered oracle accounts and their index triples.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::OracleSelection;
use crate::ledger::{Ledger, LedgerError};
use crate::models::{Candidate, OracleIdentity, OracleRequest};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OracleRegistry {
    oracles: Vec<OracleIdentity>,
}

impl OracleRegistry {
    pub fn new(oracles: Vec<OracleIdentity>) -> Self {
        Self { oracles }
    }

    pub fn oracles(&self) -> &[OracleIdentity] {
        &self.oracles
    }

    pub fn len(&self) -> usize {
        self.oracles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.oracles.is_empty()
    }

    /// Every (account, index) pair in registration order, each oracle's
    /// indexes in the order the ledger returned them.
    pub fn candidates_for(&self, _request: &OracleRequest) -> Vec<Candidate> {
        self.oracles
            .iter()
            .flat_map(|oracle| {
                oracle.indices.iter().map(move |index| Candidate {
                    account: oracle.account,
                    index: *index,
                })
            })
            .collect()
    }

    /// Build the registry from the ledger's accounts.
    ///
    /// With `registration_fee_wei` set, each selected account registers as an
    /// oracle first. Accounts whose indexes cannot be read are skipped.
    pub async fn load(
        ledger: &dyn Ledger,
        selection: &OracleSelection,
        registration_fee_wei: Option<u128>,
    ) -> Result<Self, LedgerError> {
        let accounts = ledger.list_registered_accounts().await?;
        let selected = selection.select(&accounts);
        debug!(
            available = accounts.len(),
            selected = selected.len(),
            "loading oracle registry"
        );

        let mut oracles = Vec::with_capacity(selected.len());
        for account in selected {
            if let Some(fee) = registration_fee_wei {
                match ledger.register_oracle(account, fee).await {
                    Ok(()) => info!(%account, "oracle registered"),
                    Err(err) if err.is_rejection() => {
                        info!(%account, error = %err, "oracle registration refused, assuming already registered")
                    }
                    Err(err) => warn!(%account, error = %err, "oracle registration failed"),
                }
            }

            match ledger.oracle_indexes(account).await {
                Ok(indices) => {
                    debug!(%account, ?indices, "oracle indexes loaded");
                    oracles.push(OracleIdentity { account, indices });
                }
                Err(err) => warn!(%account, error = %err, "skipping account without oracle indexes"),
            }
        }

        info!(oracles = oracles.len(), "oracle registry loaded");
        Ok(Self::new(oracles))
    }
}

/// Shared handle to the current registry.
///
/// Readers take an `Arc` snapshot, so a refresh never changes the candidate
/// list of a round that is already running.
#[derive(Clone, Default)]
pub struct RegistryHandle {
    current: Arc<RwLock<Arc<OracleRegistry>>>,
}

impl RegistryHandle {
    pub fn new(registry: OracleRegistry) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(registry))),
        }
    }

    pub async fn snapshot(&self) -> Arc<OracleRegistry> {
        self.current.read().await.clone()
    }

    pub async fn replace(&self, registry: OracleRegistry) {
        *self.current.write().await = Arc::new(registry);
    }
}

/// Periodically reload the registry. A failed reload keeps the previous snapshot.
pub fn spawn_registry_refresh(
    ledger: Arc<dyn Ledger>,
    selection: OracleSelection,
    handle: RegistryHandle,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the startup load already ran.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match OracleRegistry::load(ledger.as_ref(), &selection, None).await {
                Ok(registry) => handle.replace(registry).await,
                Err(err) => error!(error = %err, "oracle registry refresh failed; keeping previous snapshot"),
            }
        }
    })
}
