#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;

use flightsurety_oracle_server::ledger::{Ledger, LedgerError};
use flightsurety_oracle_server::models::{
    Address, OracleIdentity, OracleRequest, StatusCode, SubmissionOutcome, U256,
};
use flightsurety_oracle_server::services::OracleRegistry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub account: Address,
    pub index: u8,
    pub code: StatusCode,
    pub request: OracleRequest,
}

/// In-memory ledger answering submissions from a script.
#[derive(Default)]
pub struct ScriptedLedger {
    accounts: Vec<Address>,
    indexes: HashMap<Address, [u8; 3]>,
    outcomes: Mutex<VecDeque<SubmissionOutcome>>,
    default_outcome: Option<SubmissionOutcome>,
    submissions: Mutex<Vec<Submission>>,
    registrations: Mutex<Vec<(Address, u128)>>,
    refuse_registration: bool,
    accounts_unavailable: bool,
    panic_on_submit: bool,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_oracle(mut self, account: Address, indices: [u8; 3]) -> Self {
        self.accounts.push(account);
        self.indexes.insert(account, indices);
        self
    }

    /// An account the node knows about that never registered as an oracle
    pub fn with_plain_account(mut self, account: Address) -> Self {
        self.accounts.push(account);
        self
    }

    /// Outcomes returned in order; once drained, `default_outcome` applies.
    pub fn with_outcomes(self, outcomes: Vec<SubmissionOutcome>) -> Self {
        *self.outcomes.lock().unwrap() = outcomes.into();
        self
    }

    pub fn with_default_outcome(mut self, outcome: SubmissionOutcome) -> Self {
        self.default_outcome = Some(outcome);
        self
    }

    pub fn refusing_registration(mut self) -> Self {
        self.refuse_registration = true;
        self
    }

    pub fn with_accounts_unavailable(mut self) -> Self {
        self.accounts_unavailable = true;
        self
    }

    /// Submissions blow up instead of answering, as a buggy ledger backend would.
    pub fn panicking(mut self) -> Self {
        self.panic_on_submit = true;
        self
    }

    /// Every submission consumes a permit from `gate` before answering.
    pub fn gated(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn registrations(&self) -> Vec<(Address, u128)> {
        self.registrations.lock().unwrap().clone()
    }
}

#[async_trait]
impl Ledger for ScriptedLedger {
    async fn submit_response(
        &self,
        account: Address,
        index: u8,
        request: &OracleRequest,
        code: StatusCode,
    ) -> SubmissionOutcome {
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        if self.panic_on_submit {
            panic!("ledger backend crashed mid-submission");
        }

        self.submissions.lock().unwrap().push(Submission {
            account,
            index,
            code,
            request: request.clone(),
        });

        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.default_outcome.clone())
            .unwrap_or_else(|| SubmissionOutcome::Rejected {
                reason: "Index does not match oracle request".to_string(),
            })
    }

    async fn list_registered_accounts(&self) -> Result<Vec<Address>, LedgerError> {
        if self.accounts_unavailable {
            return Err(LedgerError::Timeout(Duration::from_secs(5)));
        }
        Ok(self.accounts.clone())
    }

    async fn oracle_indexes(&self, account: Address) -> Result<[u8; 3], LedgerError> {
        self.indexes
            .get(&account)
            .copied()
            .ok_or_else(|| LedgerError::Rpc {
                code: -32000,
                message: "revert Not registered as an oracle".to_string(),
            })
    }

    async fn register_oracle(&self, account: Address, fee_wei: u128) -> Result<(), LedgerError> {
        self.registrations.lock().unwrap().push((account, fee_wei));
        if self.refuse_registration {
            return Err(LedgerError::Reverted {
                tx_hash: "0xfeed".to_string(),
            });
        }
        Ok(())
    }
}

pub fn oracle_address(n: u8) -> Address {
    Address::left_padding_from(&[0x01, n])
}

/// `[O1(idx:1,2,3), O2(idx:4,5,6)]`
pub fn two_oracle_registry() -> OracleRegistry {
    OracleRegistry::new(vec![
        OracleIdentity {
            account: oracle_address(1),
            indices: [1, 2, 3],
        },
        OracleIdentity {
            account: oracle_address(2),
            indices: [4, 5, 6],
        },
    ])
}

pub fn request_at(timestamp: u64) -> OracleRequest {
    OracleRequest::new(Address::with_last_byte(0x0a), "F1", U256::from(timestamp))
}

pub fn rejected() -> SubmissionOutcome {
    SubmissionOutcome::Rejected {
        reason: "Index does not match oracle request".to_string(),
    }
}

pub fn transport_error() -> SubmissionOutcome {
    SubmissionOutcome::Error {
        reason: "ledger call timed out after 5s".to_string(),
    }
}
