//! Registration requests.

use chain_id::{Address, ChainRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::objection_window;
use crate::ledger::Amount;

/// Sequential request id; never reused.
pub type RequestId = u64;

/// Lifecycle of a request: `Active -> Executed` or `Active -> Rejected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Waiting out the objection window or for an operator decision
    Active,
    /// Registered in the registry
    Executed,
    /// Refused, fee refunded
    Rejected,
}

/// A pending public registration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRequest {
    /// Request ID
    pub id: RequestId,
    /// Who submitted and paid for it
    pub submitter: Address,
    /// Record to register
    pub record: ChainRecord,
    /// Entry authority for the new metadata store; receives refunds
    pub entry_authority: Address,
    /// Escrowed fee
    pub fee: Amount,
    /// When the request was submitted
    pub requested_at: DateTime<Utc>,
}

impl RegistrationRequest {
    /// Earliest time the request may be executed.
    pub fn executable_at(&self) -> DateTime<Utc> {
        self.requested_at + objection_window()
    }

    /// Whether the objection window has elapsed at `now`.
    pub fn is_executable(&self, now: DateTime<Utc>) -> bool {
        now >= self.executable_at()
    }
}
