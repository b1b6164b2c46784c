//! Append-only audit log of registry and registrar events.

use std::collections::VecDeque;
use std::sync::Arc;

use chain_id::{Address, Identifier, NameNode};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::info;

use crate::metadata::StoreHandle;

/// Maximum records in the log before the oldest are pruned.
pub const DEFAULT_EVENT_CAPACITY: usize = 10_000;

/// Every observable state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RegistryEvent {
    ChainRegistered {
        identifier: Identifier,
        name: String,
    },
    NameLinked {
        node: NameNode,
        identifier: Identifier,
        store: StoreHandle,
    },
    VersionBumped {
        identifier: Identifier,
        old_version: String,
        new_version: String,
    },
    ChainDataUpdated {
        old_identifier: Identifier,
        new_identifier: Identifier,
        name: String,
    },
    OperatorChanged {
        old_operator: Address,
        new_operator: Address,
    },
    RootAuthorityChanged {
        old_root: Address,
        new_root: Address,
    },
    TextChanged {
        store: StoreHandle,
        key: String,
    },
    EntryAuthorityChanged {
        store: StoreHandle,
        new_authority: Address,
    },
    StoreRootAuthorityChanged {
        store: StoreHandle,
        old_root: Address,
        new_root: Address,
    },
    RequestCreated {
        request_id: u64,
        name: String,
        entry_authority: Address,
        fee: u128,
    },
    RequestExecuted {
        request_id: u64,
        identifier: Identifier,
        store: StoreHandle,
    },
    RequestRejected {
        request_id: u64,
        refunded_to: Address,
        amount: u128,
    },
    FeesWithdrawn {
        to: Address,
        amount: u128,
    },
}

impl RegistryEvent {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ChainRegistered { .. } => "chain_registered",
            Self::NameLinked { .. } => "name_linked",
            Self::VersionBumped { .. } => "version_bumped",
            Self::ChainDataUpdated { .. } => "chain_data_updated",
            Self::OperatorChanged { .. } => "operator_changed",
            Self::RootAuthorityChanged { .. } => "root_authority_changed",
            Self::TextChanged { .. } => "text_changed",
            Self::EntryAuthorityChanged { .. } => "entry_authority_changed",
            Self::StoreRootAuthorityChanged { .. } => "store_root_authority_changed",
            Self::RequestCreated { .. } => "request_created",
            Self::RequestExecuted { .. } => "request_executed",
            Self::RequestRejected { .. } => "request_rejected",
            Self::FeesWithdrawn { .. } => "fees_withdrawn",
        }
    }
}

/// A recorded event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Monotonic position in the log, starting at 1
    pub sequence: u64,
    /// Unique record ID
    pub event_id: String,
    /// When the event was recorded
    pub recorded_at: DateTime<Utc>,
    /// The event itself
    pub event: RegistryEvent,
}

struct LogState {
    /// Newest first
    records: VecDeque<EventRecord>,
    next_sequence: u64,
}

/// Bounded, append-only event log shared by the registry and registrar.
pub struct EventLog {
    state: Arc<RwLock<LogState>>,
    max_entries: usize,
}

impl EventLog {
    /// Create a new log with the default capacity.
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_EVENT_CAPACITY)
    }

    /// Create with custom capacity.
    pub fn with_max_entries(max_entries: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(LogState {
                records: VecDeque::new(),
                next_sequence: 1,
            })),
            max_entries,
        }
    }

    /// Append an event and return its sequence number.
    pub async fn record(&self, event: RegistryEvent) -> u64 {
        let mut state = self.state.write().await;
        let sequence = state.next_sequence;
        state.next_sequence += 1;

        info!(sequence, kind = event.kind(), event = ?event, "Registry event");

        state.records.push_front(EventRecord {
            sequence,
            event_id: uuid::Uuid::new_v4().to_string(),
            recorded_at: Utc::now(),
            event,
        });

        while state.records.len() > self.max_entries {
            state.records.pop_back();
        }

        sequence
    }

    /// Most recent records, newest first.
    pub async fn recent(&self, limit: usize) -> Vec<EventRecord> {
        let state = self.state.read().await;
        state.records.iter().take(limit).cloned().collect()
    }

    /// Retained events, oldest first.
    pub async fn events(&self) -> Vec<RegistryEvent> {
        let state = self.state.read().await;
        state.records.iter().rev().map(|r| r.event.clone()).collect()
    }

    /// Number of retained records.
    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    /// Whether nothing has been retained.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn withdrawn(amount: u128) -> RegistryEvent {
        RegistryEvent::FeesWithdrawn {
            to: Address::new([1; 20]),
            amount,
        }
    }

    #[tokio::test]
    async fn test_record_and_order() {
        let log = EventLog::new();
        assert!(log.is_empty().await);

        assert_eq!(log.record(withdrawn(1)).await, 1);
        assert_eq!(log.record(withdrawn(2)).await, 2);

        let recent = log.recent(1).await;
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].sequence, 2);

        assert_eq!(log.events().await, vec![withdrawn(1), withdrawn(2)]);
    }

    #[tokio::test]
    async fn test_prunes_oldest() {
        let log = EventLog::with_max_entries(2);
        for amount in 0..5 {
            log.record(withdrawn(amount)).await;
        }

        assert_eq!(log.len().await, 2);
        assert_eq!(log.events().await, vec![withdrawn(3), withdrawn(4)]);
        assert_eq!(log.recent(10).await[0].sequence, 5);
    }

    #[test]
    fn test_event_serializes_tagged() {
        let json = serde_json::to_value(withdrawn(10)).unwrap();
        assert_eq!(json["type"], "fees_withdrawn");
        assert_eq!(json["amount"], 10);
    }
}
