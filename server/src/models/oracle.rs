use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{Address, U256};

/// Flight-status request emitted by the FlightSuretyApp contract.
///
/// `airline + flight + timestamp` identifies one pending consensus round on
/// the ledger side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OracleRequest {
    pub airline: Address,
    pub flight: String,
    /// Scheduled departure, unix seconds, carried as the contract's `uint256`
    pub timestamp: U256,
}

pub type RequestKey = (Address, String, U256);

impl OracleRequest {
    pub fn new(airline: Address, flight: impl Into<String>, timestamp: U256) -> Self {
        Self {
            airline,
            flight: flight.into(),
            timestamp,
        }
    }

    pub fn key(&self) -> RequestKey {
        (self.airline, self.flight.clone(), self.timestamp)
    }
}

/// A registered oracle account and the three indexes the contract assigned it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleIdentity {
    pub account: Address,
    pub indices: [u8; 3],
}

/// One (account, index) pair a round may submit with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub account: Address,
    pub index: u8,
}

/// Flight status codes understood by the contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum StatusCode {
    Unknown = 0,
    OnTime = 10,
    LateAirline = 20,
    LateWeather = 30,
    LateTechnical = 40,
    LateOther = 50,
}

impl StatusCode {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn label(self) -> &'static str {
        match self {
            StatusCode::Unknown => "STATUS_CODE_UNKNOWN",
            StatusCode::OnTime => "STATUS_CODE_ON_TIME",
            StatusCode::LateAirline => "STATUS_CODE_LATE_AIRLINE",
            StatusCode::LateWeather => "STATUS_CODE_LATE_WEATHER",
            StatusCode::LateTechnical => "STATUS_CODE_LATE_TECHNICAL",
            StatusCode::LateOther => "STATUS_CODE_LATE_OTHER",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.label(), self.code())
    }
}

/// Result of a single `submitOracleResponse` transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Accepted,
    /// The ledger refused the response (wrong index, closed request, duplicate)
    Rejected { reason: String },
    /// Transport failure or timeout
    Error { reason: String },
}

impl SubmissionOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmissionOutcome::Accepted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SubmissionOutcome::Accepted => "accepted",
            SubmissionOutcome::Rejected { .. } => "rejected",
            SubmissionOutcome::Error { .. } => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionAttempt {
    pub account: Address,
    pub index: u8,
    pub code: StatusCode,
    pub outcome: SubmissionOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundState {
    Pending,
    Attempting,
    Resolved,
    Exhausted,
}

/// All submission attempts made for one [`OracleRequest`].
///
/// A round moves `Pending -> Attempting -> Resolved | Exhausted`. Once it is
/// terminal, further attempts are ignored, so a late acceptance for an
/// already resolved round is a no-op.
#[derive(Debug, Clone)]
pub struct Round {
    pub id: Uuid,
    pub request: OracleRequest,
    pub code: StatusCode,
    state: RoundState,
    attempts: Vec<SubmissionAttempt>,
}

impl Round {
    pub fn new(request: OracleRequest, code: StatusCode) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            code,
            state: RoundState::Pending,
            attempts: Vec::new(),
        }
    }

    pub fn begin(&mut self) {
        if self.state == RoundState::Pending {
            self.state = RoundState::Attempting;
        }
    }

    /// Record an attempt. Returns `false` if the round was already terminal
    /// and the attempt was dropped.
    pub fn record(&mut self, attempt: SubmissionAttempt) -> bool {
        if self.is_terminal() {
            return false;
        }

        let accepted = attempt.outcome.is_accepted();
        self.state = RoundState::Attempting;
        self.attempts.push(attempt);
        if accepted {
            self.state = RoundState::Resolved;
        }
        true
    }

    /// Mark the round exhausted unless it already resolved.
    pub fn exhaust(&mut self) {
        if !self.is_terminal() {
            self.state = RoundState::Exhausted;
        }
    }

    pub fn state(&self) -> RoundState {
        self.state
    }

    pub fn attempts(&self) -> &[SubmissionAttempt] {
        &self.attempts
    }

    pub fn is_resolved(&self) -> bool {
        self.state == RoundState::Resolved
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, RoundState::Resolved | RoundState::Exhausted)
    }
}
