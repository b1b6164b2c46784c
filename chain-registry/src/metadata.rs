//! Per-entry metadata stores.
//!
//! Each registered chain gets its own [`MetadataStore`]: the canonical record
//! it was registered with (immutable, used to re-derive the identifier) and
//! a free-form text table controlled by the entry authority. Stores live in
//! the [`MetadataStores`] arena and are addressed by opaque [`StoreHandle`]s.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chain_id::{derive_identifier, Address, ChainRecord, ChainSnapshot, Identifier};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::authority::{authorize, require_non_null, AuthorityError, Role, RoleHolder};
use crate::events::{EventLog, RegistryEvent};

/// Text key holding the JSON-encoded canonical record. Cannot be overwritten.
pub const CHAIN_DATA_KEY: &str = "chainData";

/// Opaque address of a metadata store in the arena. Zero is the null handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct StoreHandle(u64);

impl StoreHandle {
    /// The null handle.
    pub const NULL: Self = Self(0);

    /// Whether this is the null handle.
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// Raw handle value.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "store#{}", self.0)
    }
}

/// Error types for metadata store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// `initialize` was already called
    #[error("Metadata store already initialized")]
    AlreadyInitialized,

    /// Attempt to overwrite the canonical record key
    #[error("Text key is protected: {0}")]
    ProtectedKey(String),

    /// No store behind this handle
    #[error("Metadata store not found: {0}")]
    NotFound(StoreHandle),

    /// Only the deployer may initialize
    #[error("Caller {0} is not the store deployer")]
    NotDeployer(Address),

    /// Canonical record could not be encoded
    #[error("Failed to encode canonical record: {0}")]
    Encoding(String),

    /// Caller lacks the required role
    #[error(transparent)]
    Authority(#[from] AuthorityError),
}

/// Metadata for one registered chain.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    /// Who deployed the store and may initialize it
    deployer: Address,
    /// Global authority, fixed at construction until rotated
    root_authority: Address,
    /// Per-entry authority, null until initialized
    entry_authority: Address,
    /// Canonical record, set once
    record: Option<ChainRecord>,
    /// Free-form text records
    texts: HashMap<String, String>,
}

impl RoleHolder for MetadataStore {
    fn holder(&self, role: Role) -> Option<Address> {
        match role {
            Role::Root => Some(self.root_authority),
            Role::EntryAuthority => Some(self.entry_authority),
            Role::Operator => None,
        }
    }
}

impl MetadataStore {
    /// Create an uninitialized store.
    pub fn new(deployer: Address, root_authority: Address) -> Self {
        Self {
            deployer,
            root_authority,
            entry_authority: Address::ZERO,
            record: None,
            texts: HashMap::new(),
        }
    }

    /// Store the canonical record and hand control to `entry_authority`.
    ///
    /// Callable once, by the deployer only.
    pub fn initialize(
        &mut self,
        caller: Address,
        entry_authority: Address,
        record: ChainRecord,
    ) -> Result<(), StoreError> {
        if caller.is_zero() || caller != self.deployer {
            return Err(StoreError::NotDeployer(caller));
        }
        if self.record.is_some() {
            return Err(StoreError::AlreadyInitialized);
        }
        require_non_null(entry_authority, Role::EntryAuthority)?;

        let encoded =
            serde_json::to_string(&record).map_err(|e| StoreError::Encoding(e.to_string()))?;

        self.texts.insert(CHAIN_DATA_KEY.to_string(), encoded);
        self.record = Some(record);
        self.entry_authority = entry_authority;
        Ok(())
    }

    /// Whether `initialize` has run.
    pub fn is_initialized(&self) -> bool {
        self.record.is_some()
    }

    /// Set a text record. Entry authority only.
    pub fn set_text(
        &mut self,
        caller: Address,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), StoreError> {
        authorize(caller, Role::EntryAuthority, &*self)?;

        let key = key.into();
        if key == CHAIN_DATA_KEY {
            return Err(StoreError::ProtectedKey(key));
        }

        self.texts.insert(key, value.into());
        Ok(())
    }

    /// Read a text record; empty when unset.
    pub fn text(&self, key: &str) -> String {
        self.texts.get(key).cloned().unwrap_or_default()
    }

    /// The fields needed to re-derive the identifier (name excluded).
    pub fn snapshot(&self) -> Option<ChainSnapshot> {
        self.record.as_ref().map(ChainRecord::snapshot)
    }

    /// The full canonical record.
    pub fn canonical_record(&self) -> Option<&ChainRecord> {
        self.record.as_ref()
    }

    /// Re-derive the identifier from the stored record.
    pub fn derive_identifier(&self) -> Option<Identifier> {
        self.record.as_ref().map(derive_identifier)
    }

    pub fn entry_authority(&self) -> Address {
        self.entry_authority
    }

    pub fn root_authority(&self) -> Address {
        self.root_authority
    }

    /// Hand entry control to someone else. Current entry authority only.
    pub fn update_entry_authority(
        &mut self,
        caller: Address,
        new_authority: Address,
    ) -> Result<(), StoreError> {
        authorize(caller, Role::EntryAuthority, &*self)?;
        require_non_null(new_authority, Role::EntryAuthority)?;
        self.entry_authority = new_authority;
        Ok(())
    }

    /// Rotate the root authority. Root only.
    pub fn update_root_authority(
        &mut self,
        caller: Address,
        new_root: Address,
    ) -> Result<(), StoreError> {
        authorize(caller, Role::Root, &*self)?;
        require_non_null(new_root, Role::Root)?;
        self.root_authority = new_root;
        Ok(())
    }

    /// Force entry control to `new_owner`. Root only.
    pub fn reclaim(&mut self, caller: Address, new_owner: Address) -> Result<(), StoreError> {
        authorize(caller, Role::Root, &*self)?;
        require_non_null(new_owner, Role::EntryAuthority)?;
        self.entry_authority = new_owner;
        Ok(())
    }
}

/// Arena of metadata stores, one per registered entry.
pub struct MetadataStores {
    stores: DashMap<StoreHandle, MetadataStore>,
    next_handle: AtomicU64,
    events: Arc<EventLog>,
}

impl MetadataStores {
    /// Create an empty arena.
    pub fn new(events: Arc<EventLog>) -> Self {
        Self {
            stores: DashMap::new(),
            next_handle: AtomicU64::new(1),
            events,
        }
    }

    /// Take ownership of a store and return its fresh handle.
    pub fn deploy(&self, store: MetadataStore) -> StoreHandle {
        let handle = StoreHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
        self.stores.insert(handle, store);
        debug!(store = %handle, "Deployed metadata store");
        handle
    }

    /// Drop a store that never got linked into the registry.
    pub fn discard(&self, handle: StoreHandle) -> Option<MetadataStore> {
        let removed = self.stores.remove(&handle).map(|(_, store)| store);
        if removed.is_some() {
            debug!(store = %handle, "Discarded metadata store");
        }
        removed
    }

    /// Number of deployed stores.
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Read from a store.
    pub fn read<R>(
        &self,
        handle: StoreHandle,
        f: impl FnOnce(&MetadataStore) -> R,
    ) -> Result<R, StoreError> {
        self.stores
            .get(&handle)
            .map(|store| f(store.value()))
            .ok_or(StoreError::NotFound(handle))
    }

    /// Mutate a store. `f` either fully applies or leaves it untouched.
    pub fn update<R>(
        &self,
        handle: StoreHandle,
        f: impl FnOnce(&mut MetadataStore) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut store = self
            .stores
            .get_mut(&handle)
            .ok_or(StoreError::NotFound(handle))?;
        f(store.value_mut())
    }

    /// Read a text record.
    pub fn text(&self, handle: StoreHandle, key: &str) -> Result<String, StoreError> {
        self.read(handle, |s| s.text(key))
    }

    /// Snapshot of the derivation fields.
    pub fn snapshot(&self, handle: StoreHandle) -> Result<Option<ChainSnapshot>, StoreError> {
        self.read(handle, MetadataStore::snapshot)
    }

    /// Full canonical record.
    pub fn canonical_record(&self, handle: StoreHandle) -> Result<Option<ChainRecord>, StoreError> {
        self.read(handle, |s| s.canonical_record().cloned())
    }

    /// Set a text record on behalf of `caller`.
    pub async fn set_text(
        &self,
        handle: StoreHandle,
        caller: Address,
        key: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        self.update(handle, |s| s.set_text(caller, key, value))?;
        self.events
            .record(RegistryEvent::TextChanged {
                store: handle,
                key: key.to_string(),
            })
            .await;
        Ok(())
    }

    /// Transfer entry control on behalf of the current entry authority.
    pub async fn update_entry_authority(
        &self,
        handle: StoreHandle,
        caller: Address,
        new_authority: Address,
    ) -> Result<(), StoreError> {
        self.update(handle, |s| s.update_entry_authority(caller, new_authority))?;
        self.events
            .record(RegistryEvent::EntryAuthorityChanged {
                store: handle,
                new_authority,
            })
            .await;
        Ok(())
    }

    /// Rotate a store's root authority.
    pub async fn update_root_authority(
        &self,
        handle: StoreHandle,
        caller: Address,
        new_root: Address,
    ) -> Result<(), StoreError> {
        let old_root = self.update(handle, |s| {
            let old_root = s.root_authority();
            s.update_root_authority(caller, new_root)?;
            Ok(old_root)
        })?;
        info!(store = %handle, new_root = %new_root, "Store root authority rotated");
        self.events
            .record(RegistryEvent::StoreRootAuthorityChanged {
                store: handle,
                old_root,
                new_root,
            })
            .await;
        Ok(())
    }

    /// Reclaim entry control as root.
    pub async fn reclaim(
        &self,
        handle: StoreHandle,
        caller: Address,
        new_owner: Address,
    ) -> Result<(), StoreError> {
        self.update(handle, |s| s.reclaim(caller, new_owner))?;
        self.events
            .record(RegistryEvent::EntryAuthorityChanged {
                store: handle,
                new_authority: new_owner,
            })
            .await;
        Ok(())
    }
}
