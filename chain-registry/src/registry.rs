//! The authoritative table of registered chains and its lookup indices.
//!
//! Four one-directional indices point into the entry table:
//!
//! - human-readable name -> identifier (unique)
//! - CAIP-2 cross-standard hash -> identifier (unique)
//! - coin type -> identifier (first writer wins, zero never indexed)
//! - external name node -> identifier (set by `link_external_name`)
//!
//! Every mutation takes the state write lock once for its whole body, so no
//! caller can observe a half-applied update.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chain_id::{
    derive_cross_standard_hash, derive_identifier, normalized, subname_node, Address, ChainRecord,
    CrossStandardHash, Identifier, NameNode,
};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::authority::{authorize, require_non_null, Authorities, AuthorityError, Role};
use crate::events::{EventLog, RegistryEvent};
use crate::metadata::{MetadataStores, StoreHandle};

/// Error types for registry operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Chain name must not be empty")]
    EmptyName,

    #[error("Version must not be empty")]
    EmptyVersion,

    #[error("Name already registered: {0}")]
    NameAlreadyRegistered(String),

    #[error("Identifier already registered: {0}")]
    AlreadyRegistered(Identifier),

    #[error("Cross-standard hash already registered: {0}")]
    CrossStandardHashAlreadyRegistered(CrossStandardHash),

    #[error("No entry for identifier: {0}")]
    NotFound(Identifier),

    #[error("Metadata store handle must not be null")]
    NullStore,

    #[error("External name already linked: {0}")]
    NodeAlreadyLinked(NameNode),

    #[error("Version bump would change identifier {0}; use update_chain_data")]
    VersionBumpWouldChangeIdentifier(Identifier),

    #[error("New version must differ from the current one")]
    VersionsMustDiffer,

    #[error("New chain data derives the same identifier; use bump_version")]
    MustDiffer,

    #[error(transparent)]
    Authority(#[from] AuthorityError),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

/// A registered chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    /// Stored record, coin type normalized
    pub record: ChainRecord,
    /// Version the identifier was derived from
    pub derivation_version: String,
    /// Linked metadata store, null until linked
    pub store: StoreHandle,
    /// Linked external name node
    pub node: Option<NameNode>,
    /// CAIP-2 lookup key
    pub cross_hash: CrossStandardHash,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<Identifier, RegistryEntry>,
    by_name: HashMap<String, Identifier>,
    by_cross_hash: HashMap<CrossStandardHash, Identifier>,
    by_coin_type: HashMap<u64, Identifier>,
    by_node: HashMap<NameNode, Identifier>,
}

impl RegistryState {
    fn entry(&self, id: &Identifier) -> Result<&RegistryEntry> {
        self.entries.get(id).ok_or(RegistryError::NotFound(*id))
    }

    fn lookup(&self, id: Option<&Identifier>) -> Option<ChainRecord> {
        id.and_then(|id| self.entries.get(id)).map(|e| e.record.clone())
    }

    /// Check collisions for a new record and insert it with every index.
    fn insert_entry(&mut self, record: ChainRecord) -> Result<(Identifier, String)> {
        let identifier = derive_identifier(&record);
        if self.entries.contains_key(&identifier) {
            return Err(RegistryError::AlreadyRegistered(identifier));
        }

        if self.by_name.contains_key(&record.name) {
            return Err(RegistryError::NameAlreadyRegistered(record.name));
        }

        let cross_hash = derive_cross_standard_hash(&record.namespace, &record.reference);
        if self.by_cross_hash.contains_key(&cross_hash) {
            return Err(RegistryError::CrossStandardHashAlreadyRegistered(cross_hash));
        }

        let stored = normalized(&record);
        let name = stored.name.clone();

        self.by_name.insert(name.clone(), identifier);
        self.by_cross_hash.insert(cross_hash, identifier);
        if stored.coin_type != 0 {
            self.by_coin_type.entry(stored.coin_type).or_insert(identifier);
        }
        self.entries.insert(
            identifier,
            RegistryEntry {
                derivation_version: stored.version.clone(),
                record: stored,
                store: StoreHandle::NULL,
                node: None,
                cross_hash,
            },
        );

        Ok((identifier, name))
    }

    /// Point `node` at `identifier` and attach `store` to the entry.
    fn link(&mut self, node: NameNode, identifier: Identifier, store: StoreHandle) -> Result<()> {
        self.entry(&identifier)?;
        if store.is_null() {
            return Err(RegistryError::NullStore);
        }

        if let Some(previous) = self.by_node.insert(node, identifier) {
            if previous != identifier {
                if let Some(entry) = self.entries.get_mut(&previous) {
                    entry.node = None;
                }
            }
        }
        if let Some(entry) = self.entries.get_mut(&identifier) {
            entry.store = store;
            entry.node = Some(node);
        }
        Ok(())
    }
}

/// Forward-resolution contract consumed by name-resolution adapters.
#[async_trait]
pub trait ForwardResolver: Send + Sync {
    /// Identifier linked to an external name node, or [`Identifier::ZERO`].
    async fn resolve(&self, node: &NameNode) -> Identifier;

    /// Resolve `label` registered under `parent`.
    async fn resolve_label(&self, label: &str, parent: &str) -> Identifier {
        self.resolve(&subname_node(label, parent)).await
    }
}

/// Registry of chains keyed by content-derived identifier.
pub struct Registry {
    state: Arc<RwLock<RegistryState>>,
    authorities: Arc<RwLock<Authorities>>,
    events: Arc<EventLog>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new(root: Address, operator: Address, events: Arc<EventLog>) -> Self {
        Self {
            state: Arc::new(RwLock::new(RegistryState::default())),
            authorities: Arc::new(RwLock::new(Authorities { root, operator })),
            events,
        }
    }

    async fn require(&self, caller: Address, role: Role) -> Result<()> {
        let authorities = self.authorities.read().await;
        authorize(caller, role, &*authorities)?;
        Ok(())
    }

    /// Register a new chain and return its identifier.
    ///
    /// An identical record collides on the identifier; a different record
    /// reusing a name or CAIP-2 pair collides on that index.
    pub async fn register(&self, caller: Address, record: ChainRecord) -> Result<Identifier> {
        self.require(caller, Role::Operator).await?;

        if record.name.is_empty() {
            return Err(RegistryError::EmptyName);
        }

        let mut state = self.state.write().await;
        let (identifier, name) = state.insert_entry(record)?;

        info!(identifier = %identifier, name = %name, "Chain registered");
        self.events
            .record(RegistryEvent::ChainRegistered { identifier, name })
            .await;

        Ok(identifier)
    }

    /// Link an external name node and a metadata store to an entry.
    ///
    /// Does not check whether `node` is already linked; callers that need
    /// one-link-per-node must check [`Registry::resolve`] first or use
    /// [`Registry::register_and_link`]. Calling it again for the same node
    /// re-points it.
    pub async fn link_external_name(
        &self,
        caller: Address,
        node: NameNode,
        identifier: Identifier,
        store: StoreHandle,
    ) -> Result<()> {
        self.require(caller, Role::Operator).await?;

        let mut state = self.state.write().await;
        state.link(node, identifier, store)?;

        info!(node = %node, identifier = %identifier, store = %store, "External name linked");
        self.events
            .record(RegistryEvent::NameLinked {
                node,
                identifier,
                store,
            })
            .await;

        Ok(())
    }

    /// Register a chain and link it to a fresh external name in one step.
    ///
    /// Fails with [`RegistryError::NodeAlreadyLinked`] if `node` already
    /// resolves to something. Either both writes land or neither does.
    pub async fn register_and_link(
        &self,
        caller: Address,
        record: ChainRecord,
        node: NameNode,
        store: StoreHandle,
    ) -> Result<Identifier> {
        self.require(caller, Role::Operator).await?;

        if record.name.is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if store.is_null() {
            return Err(RegistryError::NullStore);
        }

        let mut state = self.state.write().await;
        if state.by_node.contains_key(&node) {
            return Err(RegistryError::NodeAlreadyLinked(node));
        }

        let (identifier, name) = state.insert_entry(record)?;
        state.link(node, identifier, store)?;

        info!(
            identifier = %identifier,
            name = %name,
            node = %node,
            store = %store,
            "Chain registered and linked"
        );
        self.events
            .record(RegistryEvent::ChainRegistered { identifier, name })
            .await;
        self.events
            .record(RegistryEvent::NameLinked {
                node,
                identifier,
                store,
            })
            .await;

        Ok(identifier)
    }

    /// Change the version of an entry in place.
    ///
    /// The identifier, every index and the store link stay as they are. The
    /// stored record, with its version reset to the one the identifier was
    /// derived from, must still reproduce the identifier. Only `bump_version`
    /// edits a record in place, so this is a consistency check on the stored
    /// entry: a failure means the table was corrupted, not that the caller
    /// should retry with [`Registry::update_chain_data`].
    pub async fn bump_version(
        &self,
        caller: Address,
        identifier: Identifier,
        new_version: &str,
    ) -> Result<()> {
        self.require(caller, Role::Operator).await?;

        let mut state = self.state.write().await;
        let entry = state.entry(&identifier)?;

        if new_version.is_empty() {
            return Err(RegistryError::EmptyVersion);
        }

        let anchored = entry.record.with_version(entry.derivation_version.clone());
        if derive_identifier(&anchored) != identifier {
            return Err(RegistryError::VersionBumpWouldChangeIdentifier(identifier));
        }

        if entry.record.version == new_version {
            return Err(RegistryError::VersionsMustDiffer);
        }

        let old_version = match state.entries.get_mut(&identifier) {
            Some(entry) => std::mem::replace(&mut entry.record.version, new_version.to_string()),
            None => return Err(RegistryError::NotFound(identifier)),
        };

        info!(
            identifier = %identifier,
            old_version = %old_version,
            new_version = %new_version,
            "Version bumped"
        );
        self.events
            .record(RegistryEvent::VersionBumped {
                identifier,
                old_version,
                new_version: new_version.to_string(),
            })
            .await;

        Ok(())
    }

    /// Replace an entry with one derived from `new_record`.
    ///
    /// The entry moves to the new identifier and keeps its metadata store.
    /// Name, cross-standard and coin-type index entries that still point at
    /// the old identifier are rewritten or dropped. The external name link
    /// is left alone: its node keeps resolving to the old identifier until
    /// it is linked again.
    pub async fn update_chain_data(
        &self,
        caller: Address,
        old_identifier: Identifier,
        new_record: ChainRecord,
    ) -> Result<Identifier> {
        self.require(caller, Role::Operator).await?;

        let mut state = self.state.write().await;
        let old_entry = state.entry(&old_identifier)?.clone();

        if new_record.name.is_empty() {
            return Err(RegistryError::EmptyName);
        }

        let new_identifier = derive_identifier(&new_record);
        if new_identifier == old_identifier
            || new_identifier == derive_identifier(&old_entry.record)
        {
            return Err(RegistryError::MustDiffer);
        }
        if state.entries.contains_key(&new_identifier) {
            return Err(RegistryError::AlreadyRegistered(new_identifier));
        }

        let claimed_by_other =
            |owner: Option<&Identifier>| owner.is_some_and(|o| *o != old_identifier);

        if claimed_by_other(state.by_name.get(&new_record.name)) {
            return Err(RegistryError::NameAlreadyRegistered(new_record.name));
        }

        let new_cross_hash =
            derive_cross_standard_hash(&new_record.namespace, &new_record.reference);
        if claimed_by_other(state.by_cross_hash.get(&new_cross_hash)) {
            return Err(RegistryError::CrossStandardHashAlreadyRegistered(
                new_cross_hash,
            ));
        }

        let stored = normalized(&new_record);
        let old_name = old_entry.record.name.clone();
        let old_coin_type = old_entry.record.coin_type;
        let name = stored.name.clone();

        // Write the new side first, then retire old keys that still point
        // at the old identifier.
        state.by_name.insert(name.clone(), new_identifier);
        state.by_cross_hash.insert(new_cross_hash, new_identifier);
        if stored.coin_type != 0 {
            let slot = state.by_coin_type.entry(stored.coin_type).or_insert(new_identifier);
            if *slot == old_identifier {
                *slot = new_identifier;
            }
        }
        state.entries.insert(
            new_identifier,
            RegistryEntry {
                derivation_version: stored.version.clone(),
                record: stored,
                store: old_entry.store,
                node: None,
                cross_hash: new_cross_hash,
            },
        );

        state.entries.remove(&old_identifier);
        if state.by_name.get(&old_name) == Some(&old_identifier) {
            state.by_name.remove(&old_name);
        }
        if state.by_cross_hash.get(&old_entry.cross_hash) == Some(&old_identifier) {
            state.by_cross_hash.remove(&old_entry.cross_hash);
        }
        if state.by_coin_type.get(&old_coin_type) == Some(&old_identifier) {
            state.by_coin_type.remove(&old_coin_type);
        }

        info!(
            old_identifier = %old_identifier,
            new_identifier = %new_identifier,
            name = %name,
            "Chain data updated"
        );
        self.events
            .record(RegistryEvent::ChainDataUpdated {
                old_identifier,
                new_identifier,
                name,
            })
            .await;

        Ok(new_identifier)
    }

    /// Hand the operator role to `new_operator`. Root only.
    pub async fn set_operator(&self, caller: Address, new_operator: Address) -> Result<()> {
        let mut authorities = self.authorities.write().await;
        authorize(caller, Role::Root, &*authorities)?;
        require_non_null(new_operator, Role::Operator)?;

        let old_operator = std::mem::replace(&mut authorities.operator, new_operator);
        self.events
            .record(RegistryEvent::OperatorChanged {
                old_operator,
                new_operator,
            })
            .await;
        Ok(())
    }

    /// Rotate the root authority. Root only.
    pub async fn set_root_authority(&self, caller: Address, new_root: Address) -> Result<()> {
        let mut authorities = self.authorities.write().await;
        authorize(caller, Role::Root, &*authorities)?;
        require_non_null(new_root, Role::Root)?;

        let old_root = std::mem::replace(&mut authorities.root, new_root);
        self.events
            .record(RegistryEvent::RootAuthorityChanged { old_root, new_root })
            .await;
        Ok(())
    }

    pub async fn operator(&self) -> Address {
        self.authorities.read().await.operator
    }

    pub async fn root_authority(&self) -> Address {
        self.authorities.read().await.root
    }

    /// Record stored under an identifier.
    pub async fn chain_data_from_id(&self, identifier: &Identifier) -> Option<ChainRecord> {
        let state = self.state.read().await;
        state.lookup(Some(identifier))
    }

    /// Record registered for a CAIP-2 `(namespace, reference)` pair.
    pub async fn chain_data_from_caip2(
        &self,
        namespace: &str,
        reference: &str,
    ) -> Option<ChainRecord> {
        let cross_hash = derive_cross_standard_hash(namespace, reference);
        let state = self.state.read().await;
        state.lookup(state.by_cross_hash.get(&cross_hash))
    }

    /// Record registered for a coin type.
    pub async fn chain_data_from_coin_type(&self, coin_type: u64) -> Option<ChainRecord> {
        let state = self.state.read().await;
        state.lookup(state.by_coin_type.get(&coin_type))
    }

    /// Identifier registered under a human-readable name.
    pub async fn resolve_by_name(&self, name: &str) -> Option<Identifier> {
        let state = self.state.read().await;
        state.by_name.get(name).copied()
    }

    /// Metadata store linked to an entry.
    pub async fn resolve_metadata_store(&self, identifier: &Identifier) -> Option<StoreHandle> {
        let state = self.state.read().await;
        state
            .entries
            .get(identifier)
            .map(|e| e.store)
            .filter(|store| !store.is_null())
    }

    /// Full entry, including link state.
    pub async fn entry(&self, identifier: &Identifier) -> Option<RegistryEntry> {
        let state = self.state.read().await;
        state.entries.get(identifier).cloned()
    }

    pub async fn is_registered(&self, identifier: &Identifier) -> bool {
        self.state.read().await.entries.contains_key(identifier)
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        self.state.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Re-derive an entry's identifier from its metadata store's canonical
    /// record and report whether it matches.
    pub async fn verify_entry(&self, identifier: &Identifier, stores: &MetadataStores) -> bool {
        let Some(handle) = self.resolve_metadata_store(identifier).await else {
            debug!(identifier = %identifier, "No metadata store linked");
            return false;
        };

        let derived = stores
            .read(handle, |store| store.derive_identifier())
            .ok()
            .flatten();
        derived.as_ref() == Some(identifier)
    }
}

#[async_trait]
impl ForwardResolver for Registry {
    async fn resolve(&self, node: &NameNode) -> Identifier {
        let state = self.state.read().await;
        state.by_node.get(node).copied().unwrap_or(Identifier::ZERO)
    }
}
