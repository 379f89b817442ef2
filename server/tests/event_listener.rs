mod common;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

use common::*;
use flightsurety_oracle_server::event_listener::OracleEventListener;
use flightsurety_oracle_server::models::{RoundState, SubmissionOutcome};
use flightsurety_oracle_server::services::{RegistryHandle, ResponseDispatcher};

fn listener(ledger: Arc<ScriptedLedger>) -> OracleEventListener {
    let dispatcher = Arc::new(ResponseDispatcher::new(ledger));
    OracleEventListener::new(dispatcher, RegistryHandle::new(two_oracle_registry()))
}

#[tokio::test]
async fn duplicate_delivery_is_dropped_while_round_runs() {
    let gate = Arc::new(Semaphore::new(0));
    let ledger = Arc::new(
        ScriptedLedger::new()
            .with_default_outcome(SubmissionOutcome::Accepted)
            .gated(gate.clone()),
    );
    let listener = listener(ledger.clone());

    let first = listener.handle_request(request_at(1_000)).unwrap();
    assert!(listener.handle_request(request_at(1_000)).is_none());
    assert_eq!(listener.in_flight(), 1);

    gate.add_permits(1);
    let round = first.await.unwrap();
    assert_eq!(round.state(), RoundState::Resolved);
    assert_eq!(listener.in_flight(), 0);
    assert_eq!(ledger.submissions().len(), 1);

    // Once finished, the same request may start a new round.
    let again = listener.handle_request(request_at(1_000)).unwrap();
    gate.add_permits(1);
    again.await.unwrap();
    assert_eq!(ledger.submissions().len(), 2);
}

#[tokio::test]
async fn distinct_requests_run_concurrently() {
    let gate = Arc::new(Semaphore::new(0));
    let ledger = Arc::new(
        ScriptedLedger::new()
            .with_default_outcome(SubmissionOutcome::Accepted)
            .gated(gate.clone()),
    );
    let listener = listener(ledger.clone());

    let a = listener.handle_request(request_at(1_000)).unwrap();
    let b = listener.handle_request(request_at(2_000)).unwrap();
    assert_eq!(listener.in_flight(), 2);

    gate.add_permits(2);
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        a.await.unwrap();
        b.await.unwrap();
    })
    .await
    .expect("rounds should finish");

    assert_eq!(ledger.submissions().len(), 2);
}

#[tokio::test]
async fn start_drains_channel_until_closed() {
    let ledger = Arc::new(ScriptedLedger::new().with_default_outcome(SubmissionOutcome::Accepted));
    let listener = listener(ledger.clone());
    let (sender, receiver) = mpsc::channel(8);

    let task = tokio::spawn(listener.clone().start(receiver));
    sender.send(request_at(10)).await.unwrap();
    sender.send(request_at(20)).await.unwrap();
    drop(sender);
    task.await.unwrap();

    // Rounds are spawned; wait for them to drain.
    tokio::time::timeout(Duration::from_secs(5), async {
        while listener.in_flight() > 0 || ledger.submissions().len() < 2 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("both rounds should run");

    assert_eq!(ledger.submissions().len(), 2);
}

#[tokio::test]
async fn panicked_round_releases_its_request() {
    let ledger = Arc::new(ScriptedLedger::new().panicking());
    let listener = listener(ledger.clone());

    let round = listener.handle_request(request_at(1_000)).unwrap();
    assert!(round.await.unwrap_err().is_panic());
    assert_eq!(listener.in_flight(), 0);

    // Redelivery after the crash gets a fresh round instead of being dropped.
    let retry = listener.handle_request(request_at(1_000));
    assert!(retry.is_some());
    let _ = retry.unwrap().await;
}

#[tokio::test]
async fn aborted_round_releases_its_request() {
    let gate = Arc::new(Semaphore::new(0));
    let ledger = Arc::new(
        ScriptedLedger::new()
            .with_default_outcome(SubmissionOutcome::Accepted)
            .gated(gate.clone()),
    );
    let listener = listener(ledger.clone());

    let round = listener.handle_request(request_at(1_000)).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(listener.in_flight(), 1);

    round.abort();
    assert!(round.await.unwrap_err().is_cancelled());
    assert_eq!(listener.in_flight(), 0);

    let retry = listener.handle_request(request_at(1_000)).unwrap();
    gate.add_permits(1);
    assert_eq!(retry.await.unwrap().state(), RoundState::Resolved);
}
