//! Chain Registry
//!
//! The authoritative, multi-index table of registered chains:
//!
//! - **Registry**: entries keyed by content-derived identifier, with name,
//!   CAIP-2, coin-type and external-name indices kept mutually consistent
//! - **Metadata stores**: one per entry, holding the canonical record and an
//!   entry-authority-controlled text table
//! - **Authority model**: root / operator / entry-authority checks, caller
//!   passed explicitly to every mutation
//! - **Event log**: append-only audit trail of every state change
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  Registry                    │
//! │  entries ◄── by_name / by_cross_hash /       │
//! │              by_coin_type / by_node          │
//! └───────────────┬──────────────────────────────┘
//!                 │ StoreHandle
//!                 ▼
//! ┌──────────────────────────────────────────────┐
//! │            MetadataStores (arena)            │
//! │   canonical record + text records per entry  │
//! └──────────────────────────────────────────────┘
//! ```

pub mod authority;
pub mod events;
pub mod metadata;
pub mod registry;

// Re-export main types
pub use authority::{
    authorize, require_non_null, Authorities, AuthorityError, Role, RoleHolder,
};
pub use events::{EventLog, EventRecord, RegistryEvent};
pub use metadata::{MetadataStore, MetadataStores, StoreError, StoreHandle, CHAIN_DATA_KEY};
pub use registry::{ForwardResolver, Registry, RegistryEntry, RegistryError};
