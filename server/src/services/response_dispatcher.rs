//! Drives one oracle round per incoming request.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::oracle_registry::OracleRegistry;
use super::status_classifier::classify;
use crate::ledger::Ledger;
use crate::models::{OracleRequest, Round, SubmissionAttempt, SubmissionOutcome};

/// Submits the classifier's status for a request through the registered
/// oracle accounts until the ledger accepts one.
///
/// Candidates are tried one after another and the round stops at the first
/// acceptance, so no submission is issued after a round resolves.
pub struct ResponseDispatcher {
    ledger: Arc<dyn Ledger>,
}

impl ResponseDispatcher {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }

    pub async fn run_round(
        &self,
        request: OracleRequest,
        registry: &OracleRegistry,
        now: u64,
    ) -> Round {
        let code = classify(request.timestamp, now);
        let candidates = registry.candidates_for(&request);
        let mut round = Round::new(request, code);

        info!(
            round_id = %round.id,
            airline = %round.request.airline,
            flight = %round.request.flight,
            timestamp = %round.request.timestamp,
            code = code.code(),
            status = code.label(),
            candidates = candidates.len(),
            "oracle round started"
        );

        round.begin();
        for candidate in candidates {
            if round.is_terminal() {
                break;
            }

            let outcome = self
                .ledger
                .submit_response(candidate.account, candidate.index, &round.request, code)
                .await;

            match &outcome {
                SubmissionOutcome::Accepted => info!(
                    round_id = %round.id,
                    account = %candidate.account,
                    index = candidate.index,
                    "oracle response accepted"
                ),
                SubmissionOutcome::Rejected { reason } => debug!(
                    round_id = %round.id,
                    account = %candidate.account,
                    index = candidate.index,
                    %reason,
                    "oracle response rejected"
                ),
                SubmissionOutcome::Error { reason } => warn!(
                    round_id = %round.id,
                    account = %candidate.account,
                    index = candidate.index,
                    %reason,
                    "oracle response submission failed"
                ),
            }

            round.record(SubmissionAttempt {
                account: candidate.account,
                index: candidate.index,
                code,
                outcome,
            });
        }
        round.exhaust();

        if round.is_resolved() {
            info!(
                round_id = %round.id,
                attempts = round.attempts().len(),
                "oracle round resolved"
            );
        } else {
            warn!(
                round_id = %round.id,
                flight = %round.request.flight,
                attempts = round.attempts().len(),
                "oracle round exhausted without an accepted response"
            );
        }

        round
    }
}
