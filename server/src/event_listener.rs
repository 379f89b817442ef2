//! Event loop wiring ledger `OracleRequest` events into oracle rounds

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::models::{OracleRequest, RequestKey, Round};
use crate::services::{now_unix, RegistryHandle, ResponseDispatcher};

type InFlight = Arc<Mutex<HashSet<RequestKey>>>;

/// Starts an independent round for each delivered request.
///
/// Deliveries are at-least-once, so a request whose round is still running
/// is dropped instead of starting a second round.
#[derive(Clone)]
pub struct OracleEventListener {
    dispatcher: Arc<ResponseDispatcher>,
    registry: RegistryHandle,
    in_flight: InFlight,
}

/// Holds a request key in the in-flight set for as long as its round task
/// lives, including when the task panics or is aborted.
struct InFlightGuard {
    key: RequestKey,
    in_flight: InFlight,
}

impl InFlightGuard {
    /// `None` if the key is already held by another round.
    fn acquire(in_flight: &InFlight, key: RequestKey) -> Option<Self> {
        let inserted = in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.clone());
        inserted.then(|| Self {
            key,
            in_flight: in_flight.clone(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl OracleEventListener {
    pub fn new(dispatcher: Arc<ResponseDispatcher>, registry: RegistryHandle) -> Self {
        Self {
            dispatcher,
            registry,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Consume requests until the channel closes
    pub async fn start(self, mut requests: mpsc::Receiver<OracleRequest>) {
        tracing::info!("Oracle event listener started");

        while let Some(request) = requests.recv().await {
            self.handle_request(request);
        }

        tracing::info!("Request channel closed; oracle event listener stopped");
    }

    /// Spawn a round for `request`, or return `None` if one is already running for it.
    pub fn handle_request(&self, request: OracleRequest) -> Option<JoinHandle<Round>> {
        let Some(guard) = InFlightGuard::acquire(&self.in_flight, request.key()) else {
            tracing::debug!(
                airline = %request.airline,
                flight = %request.flight,
                timestamp = %request.timestamp,
                "round already in flight; dropping duplicate OracleRequest"
            );
            return None;
        };

        let dispatcher = self.dispatcher.clone();
        let registry = self.registry.clone();

        Some(tokio::spawn(async move {
            let _guard = guard;
            let snapshot = registry.snapshot().await;
            dispatcher.run_round(request, &snapshot, now_unix()).await
        }))
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
