//! RegistrationController - public entry point for new chains.
//!
//! Anyone may request a registration by escrowing the fee. After the
//! objection window the operator either executes the request (deploys a
//! metadata store, registers the chain, links its external name) or rejects
//! it (refunds the fee to the entry authority). Each request is consumed by
//! exactly one of the two.

use std::collections::HashMap;
use std::sync::Arc;

use chain_id::{normalized, subname_node, Address, ChainRecord, Identifier, NameNode};
use chain_registry::{
    authorize, require_non_null, Authorities, AuthorityError, EventLog, MetadataStore,
    MetadataStores, Registry, RegistryError, RegistryEvent, Role, StoreError,
};
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::{ConfigError, RegistrarConfig, REGISTRATION_FEE};
use crate::ledger::{Amount, LedgerError, Payouts};
use crate::request::{RegistrationRequest, RequestId, RequestStatus};

/// Error types for the registration workflow.
#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error("Insufficient fee: required {required}, supplied {supplied}")]
    InsufficientFee { required: Amount, supplied: Amount },

    #[error("Entry authority must not be the null address")]
    InvalidAuthority,

    #[error("Chain name must not be empty")]
    EmptyName,

    #[error("Request {0} is not active")]
    RequestNotActive(RequestId),

    #[error("Objection window has not passed; executable at {executable_at}")]
    ObjectionWindowNotPassed { executable_at: DateTime<Utc> },

    #[error("External name already linked: {0}")]
    NameAlreadyLinked(NameNode),

    #[error("No fees to withdraw")]
    NothingToWithdraw,

    #[error("Fee balance would overflow")]
    FeeOverflow,

    #[error(transparent)]
    Authority(#[from] AuthorityError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Metadata store error: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Payout error: {0}")]
    Ledger(#[from] LedgerError),
}

pub type Result<T> = std::result::Result<T, ControllerError>;

struct ControllerState {
    authorities: Authorities,
    /// Active requests only
    requests: HashMap<RequestId, RegistrationRequest>,
    /// Final status of consumed requests
    outcomes: HashMap<RequestId, RequestStatus>,
    /// Requests ever created; also the next id
    request_count: u64,
    /// Fees held for active requests
    escrowed: Amount,
    /// Fees of executed requests, owed to root
    withdrawable: Amount,
    payouts: Payouts,
}

/// Mediates public registration requests into the registry.
pub struct RegistrationController {
    config: RegistrarConfig,
    registry: Arc<Registry>,
    stores: Arc<MetadataStores>,
    clock: Arc<dyn Clock>,
    events: Arc<EventLog>,
    state: Arc<RwLock<ControllerState>>,
}

impl RegistrationController {
    /// Create a controller over an existing registry and store arena.
    ///
    /// `config.controller_address` must be the registry's operator for
    /// executions to go through.
    pub fn new(
        config: RegistrarConfig,
        registry: Arc<Registry>,
        stores: Arc<MetadataStores>,
        clock: Arc<dyn Clock>,
        events: Arc<EventLog>,
    ) -> Result<Self> {
        config.validate()?;

        let authorities = Authorities {
            root: config.root_authority,
            operator: config.operator,
        };

        Ok(Self {
            config,
            registry,
            stores,
            clock,
            events,
            state: Arc::new(RwLock::new(ControllerState {
                authorities,
                requests: HashMap::new(),
                outcomes: HashMap::new(),
                request_count: 0,
                escrowed: 0,
                withdrawable: 0,
                payouts: Payouts::new(),
            })),
        })
    }

    /// Build a fresh registry, store arena and event log wired to this
    /// controller as registry operator.
    pub fn bootstrap(config: RegistrarConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;

        let events = Arc::new(EventLog::with_max_entries(config.event_log_capacity));
        let registry = Arc::new(Registry::new(
            config.root_authority,
            config.controller_address,
            events.clone(),
        ));
        let stores = Arc::new(MetadataStores::new(events.clone()));

        Self::new(config, registry, stores, clock, events)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn stores(&self) -> &Arc<MetadataStores> {
        &self.stores
    }

    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    pub fn config(&self) -> &RegistrarConfig {
        &self.config
    }

    /// External name node a record will be linked under.
    pub fn name_node(&self, name: &str) -> NameNode {
        subname_node(name, &self.config.parent_domain)
    }

    /// Submit a registration request with `fee` attached.
    pub async fn request_registration(
        &self,
        caller: Address,
        record: ChainRecord,
        entry_authority: Address,
        fee: Amount,
    ) -> Result<RequestId> {
        if fee < REGISTRATION_FEE {
            return Err(ControllerError::InsufficientFee {
                required: REGISTRATION_FEE,
                supplied: fee,
            });
        }
        if entry_authority.is_zero() {
            return Err(ControllerError::InvalidAuthority);
        }
        if record.name.is_empty() {
            return Err(ControllerError::EmptyName);
        }

        let mut state = self.state.write().await;
        let escrowed = state
            .escrowed
            .checked_add(fee)
            .ok_or(ControllerError::FeeOverflow)?;

        let id = state.request_count;
        state.request_count += 1;
        state.escrowed = escrowed;

        let name = record.name.clone();
        state.requests.insert(
            id,
            RegistrationRequest {
                id,
                submitter: caller,
                record,
                entry_authority,
                fee,
                requested_at: self.clock.now(),
            },
        );

        info!(request_id = id, name = %name, submitter = %caller, "Registration requested");
        self.events
            .record(RegistryEvent::RequestCreated {
                request_id: id,
                name,
                entry_authority,
                fee,
            })
            .await;

        Ok(id)
    }

    /// Execute a request whose objection window has passed. Operator only.
    pub async fn execute_registration(
        &self,
        caller: Address,
        request_id: RequestId,
    ) -> Result<Identifier> {
        let mut state = self.state.write().await;
        authorize(caller, Role::Operator, &state.authorities)?;

        let request = state
            .requests
            .get(&request_id)
            .cloned()
            .ok_or(ControllerError::RequestNotActive(request_id))?;

        let now = self.clock.now();
        if !request.is_executable(now) {
            debug!(request_id, executable_at = %request.executable_at(), "Objection window open");
            return Err(ControllerError::ObjectionWindowNotPassed {
                executable_at: request.executable_at(),
            });
        }

        let withdrawable = state
            .withdrawable
            .checked_add(request.fee)
            .ok_or(ControllerError::FeeOverflow)?;

        let record = normalized(&request.record);
        let controller = self.config.controller_address;
        let mut store = MetadataStore::new(controller, state.authorities.root);
        store.initialize(controller, request.entry_authority, record.clone())?;

        // Unreachable until linked; dropped again if the registry refuses.
        let handle = self.stores.deploy(store);
        let node = self.name_node(&request.record.name);
        let identifier = match self
            .registry
            .register_and_link(controller, record, node, handle)
            .await
        {
            Ok(identifier) => identifier,
            Err(e) => {
                self.stores.discard(handle);
                return Err(match e {
                    RegistryError::NodeAlreadyLinked(node) => {
                        ControllerError::NameAlreadyLinked(node)
                    }
                    other => other.into(),
                });
            }
        };

        state.requests.remove(&request_id);
        state.outcomes.insert(request_id, RequestStatus::Executed);
        state.escrowed -= request.fee;
        state.withdrawable = withdrawable;

        info!(
            request_id,
            identifier = %identifier,
            store = %handle,
            "Registration executed"
        );
        self.events
            .record(RegistryEvent::RequestExecuted {
                request_id,
                identifier,
                store: handle,
            })
            .await;

        Ok(identifier)
    }

    /// Reject a request and refund its fee to the entry authority.
    /// Operator only.
    pub async fn reject_registration(
        &self,
        caller: Address,
        request_id: RequestId,
    ) -> Result<Amount> {
        let mut state = self.state.write().await;
        authorize(caller, Role::Operator, &state.authorities)?;

        let request = state
            .requests
            .get(&request_id)
            .cloned()
            .ok_or(ControllerError::RequestNotActive(request_id))?;

        state.payouts.credit(request.entry_authority, request.fee)?;
        state.requests.remove(&request_id);
        state.outcomes.insert(request_id, RequestStatus::Rejected);
        state.escrowed -= request.fee;

        info!(
            request_id,
            refunded_to = %request.entry_authority,
            amount = %request.fee,
            "Registration rejected"
        );
        self.events
            .record(RegistryEvent::RequestRejected {
                request_id,
                refunded_to: request.entry_authority,
                amount: request.fee,
            })
            .await;

        Ok(request.fee)
    }

    /// Pay out fees of executed requests to the root authority. Root only.
    pub async fn withdraw_fees(&self, caller: Address) -> Result<Amount> {
        let mut state = self.state.write().await;
        authorize(caller, Role::Root, &state.authorities)?;

        if state.withdrawable == 0 {
            return Err(ControllerError::NothingToWithdraw);
        }

        let amount = state.withdrawable;
        let to = state.authorities.root;
        state.payouts.credit(to, amount)?;
        state.withdrawable = 0;

        info!(to = %to, amount = %amount, "Fees withdrawn");
        self.events
            .record(RegistryEvent::FeesWithdrawn { to, amount })
            .await;

        Ok(amount)
    }

    /// Hand the operator role to `new_operator`. Root only.
    pub async fn update_controller(&self, caller: Address, new_operator: Address) -> Result<()> {
        let mut state = self.state.write().await;
        authorize(caller, Role::Root, &state.authorities)?;
        require_non_null(new_operator, Role::Operator)?;

        let old_operator = std::mem::replace(&mut state.authorities.operator, new_operator);
        if old_operator == new_operator {
            warn!(operator = %new_operator, "Operator unchanged");
        }

        self.events
            .record(RegistryEvent::OperatorChanged {
                old_operator,
                new_operator,
            })
            .await;
        Ok(())
    }

    /// An active request.
    pub async fn request(&self, request_id: RequestId) -> Option<RegistrationRequest> {
        self.state.read().await.requests.get(&request_id).cloned()
    }

    /// Status of any request ever created.
    pub async fn request_status(&self, request_id: RequestId) -> Option<RequestStatus> {
        let state = self.state.read().await;
        if state.requests.contains_key(&request_id) {
            return Some(RequestStatus::Active);
        }
        state.outcomes.get(&request_id).copied()
    }

    /// Active requests ordered by id.
    pub async fn pending_requests(&self) -> Vec<RegistrationRequest> {
        let state = self.state.read().await;
        let mut pending: Vec<_> = state.requests.values().cloned().collect();
        pending.sort_by_key(|r| r.id);
        pending
    }

    /// Number of requests ever created.
    pub async fn request_count(&self) -> u64 {
        self.state.read().await.request_count
    }

    pub async fn escrowed_balance(&self) -> Amount {
        self.state.read().await.escrowed
    }

    pub async fn withdrawable_balance(&self) -> Amount {
        self.state.read().await.withdrawable
    }

    /// Amount credited to `address` by refunds and withdrawals.
    pub async fn payout_balance(&self, address: &Address) -> Amount {
        self.state.read().await.payouts.balance_of(address)
    }

    pub async fn operator(&self) -> Address {
        self.state.read().await.authorities.operator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chain_id::derive_identifier;
    use chain_registry::ForwardResolver;
    use chrono::Duration;

    const ROOT: Address = Address::new([0x01; 20]);
    const OPERATOR: Address = Address::new([0x02; 20]);
    const CONTROLLER: Address = Address::new([0x03; 20]);
    const SUBMITTER: Address = Address::new([0x04; 20]);
    const ENTRY: Address = Address::new([0x05; 20]);

    fn setup() -> (RegistrationController, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let controller = RegistrationController::bootstrap(
            RegistrarConfig::new(ROOT, OPERATOR, CONTROLLER),
            clock.clone(),
        )
        .unwrap();
        (controller, clock)
    }

    fn record(name: &str, reference: &str) -> ChainRecord {
        ChainRecord {
            name: name.to_string(),
            settlement_id: 1,
            version: "1".to_string(),
            anchor_address: Address::new([0xaa; 20]),
            namespace: "eip155".to_string(),
            reference: reference.to_string(),
            coin_type: 0,
        }
    }

    #[tokio::test]
    async fn test_request_validation() {
        let (controller, _) = setup();

        let ink = record("ink", "57073");

        assert!(matches!(
            controller
                .request_registration(SUBMITTER, ink.clone(), ENTRY, REGISTRATION_FEE - 1)
                .await,
            Err(ControllerError::InsufficientFee { .. })
        ));
        assert!(matches!(
            controller
                .request_registration(SUBMITTER, ink, Address::ZERO, REGISTRATION_FEE)
                .await,
            Err(ControllerError::InvalidAuthority)
        ));
        assert!(matches!(
            controller
                .request_registration(SUBMITTER, record("", "57073"), ENTRY, REGISTRATION_FEE)
                .await,
            Err(ControllerError::EmptyName)
        ));

        assert_eq!(controller.request_count().await, 0);
        assert_eq!(controller.escrowed_balance().await, 0);
    }

    #[tokio::test]
    async fn test_execute_after_window() {
        let (controller, clock) = setup();
        let id = controller
            .request_registration(SUBMITTER, record("ink", "57073"), ENTRY, REGISTRATION_FEE)
            .await
            .unwrap();
        assert_eq!(controller.request_status(id).await, Some(RequestStatus::Active));

        clock.advance(Duration::days(6));
        assert!(matches!(
            controller.execute_registration(OPERATOR, id).await,
            Err(ControllerError::ObjectionWindowNotPassed { .. })
        ));

        clock.advance(Duration::days(1));
        assert!(matches!(
            controller.execute_registration(SUBMITTER, id).await,
            Err(ControllerError::Authority(_))
        ));

        let identifier = controller.execute_registration(OPERATOR, id).await.unwrap();
        assert_eq!(identifier, derive_identifier(&record("ink", "57073")));
        assert_eq!(controller.request_status(id).await, Some(RequestStatus::Executed));
        assert!(controller.request(id).await.is_none());

        let registry = controller.registry();
        let node = controller.name_node("ink");
        assert_eq!(registry.resolve(&node).await, identifier);

        let handle = registry.resolve_metadata_store(&identifier).await.unwrap();
        let stores = controller.stores();
        assert_eq!(stores.read(handle, |s| s.entry_authority()).unwrap(), ENTRY);
        assert_eq!(stores.read(handle, |s| s.root_authority()).unwrap(), ROOT);
        assert!(registry.verify_entry(&identifier, stores).await);

        assert_eq!(controller.escrowed_balance().await, 0);
        assert_eq!(controller.withdrawable_balance().await, REGISTRATION_FEE);

        assert!(matches!(
            controller.execute_registration(OPERATOR, id).await,
            Err(ControllerError::RequestNotActive(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_registration_leaves_request_active() {
        let (controller, clock) = setup();
        let first = controller
            .request_registration(SUBMITTER, record("ink", "57073"), ENTRY, REGISTRATION_FEE)
            .await
            .unwrap();
        let clash = controller
            .request_registration(SUBMITTER, record("ink-two", "57073"), ENTRY, REGISTRATION_FEE)
            .await
            .unwrap();

        clock.advance(Duration::days(7));
        controller.execute_registration(OPERATOR, first).await.unwrap();

        assert!(matches!(
            controller.execute_registration(OPERATOR, clash).await,
            Err(ControllerError::Registry(
                RegistryError::CrossStandardHashAlreadyRegistered(_)
            ))
        ));
        assert_eq!(controller.request_status(clash).await, Some(RequestStatus::Active));
        assert_eq!(controller.stores().len(), 1);
        assert_eq!(controller.escrowed_balance().await, REGISTRATION_FEE);

        // the operator can still turn it down
        assert_eq!(
            controller.reject_registration(OPERATOR, clash).await.unwrap(),
            REGISTRATION_FEE
        );
    }

    #[tokio::test]
    async fn test_reject_refunds_entry_authority() {
        let (controller, _) = setup();
        let fee = REGISTRATION_FEE + 5;
        let id = controller
            .request_registration(SUBMITTER, record("ink", "57073"), ENTRY, fee)
            .await
            .unwrap();

        assert!(matches!(
            controller.reject_registration(SUBMITTER, id).await,
            Err(ControllerError::Authority(_))
        ));

        assert_eq!(controller.reject_registration(OPERATOR, id).await.unwrap(), fee);
        assert_eq!(controller.payout_balance(&ENTRY).await, fee);
        assert_eq!(controller.payout_balance(&SUBMITTER).await, 0);
        assert_eq!(controller.escrowed_balance().await, 0);
        assert_eq!(controller.request_status(id).await, Some(RequestStatus::Rejected));
        assert!(controller.registry().is_empty().await);

        assert!(matches!(
            controller.reject_registration(OPERATOR, id).await,
            Err(ControllerError::RequestNotActive(_))
        ));
    }

    #[tokio::test]
    async fn test_withdraw_fees() {
        let (controller, clock) = setup();
        assert!(matches!(
            controller.withdraw_fees(ROOT).await,
            Err(ControllerError::NothingToWithdraw)
        ));

        let executed = controller
            .request_registration(SUBMITTER, record("ink", "57073"), ENTRY, REGISTRATION_FEE)
            .await
            .unwrap();
        controller
            .request_registration(SUBMITTER, record("mode", "34443"), ENTRY, REGISTRATION_FEE)
            .await
            .unwrap();
        clock.advance(Duration::days(7));
        controller.execute_registration(OPERATOR, executed).await.unwrap();

        assert!(matches!(
            controller.withdraw_fees(OPERATOR).await,
            Err(ControllerError::Authority(_))
        ));
        assert_eq!(controller.withdraw_fees(ROOT).await.unwrap(), REGISTRATION_FEE);
        assert_eq!(controller.payout_balance(&ROOT).await, REGISTRATION_FEE);

        // the pending request's fee stays in escrow
        assert_eq!(controller.escrowed_balance().await, REGISTRATION_FEE);
        assert_eq!(controller.withdrawable_balance().await, 0);
    }

    #[tokio::test]
    async fn test_update_controller() {
        let (controller, _) = setup();
        let next = Address::new([0x09; 20]);

        assert!(controller.update_controller(OPERATOR, next).await.is_err());
        assert!(matches!(
            controller.update_controller(ROOT, Address::ZERO).await,
            Err(ControllerError::Authority(AuthorityError::NullAddress(_)))
        ));

        controller.update_controller(ROOT, next).await.unwrap();
        assert_eq!(controller.operator().await, next);

        let id = controller
            .request_registration(SUBMITTER, record("ink", "57073"), ENTRY, REGISTRATION_FEE)
            .await
            .unwrap();
        assert!(controller.reject_registration(OPERATOR, id).await.is_err());
        assert!(controller.reject_registration(next, id).await.is_ok());
    }

    #[tokio::test]
    async fn test_taken_name_leaves_no_trace() {
        let (controller, clock) = setup();
        let registry = controller.registry();
        let stores = controller.stores();

        // someone linked the node by hand before the request went through
        let squatter = registry.register(ROOT, record("other", "1")).await.unwrap();
        let handle = stores.deploy(MetadataStore::new(ROOT, ROOT));
        let node = controller.name_node("ink");
        registry
            .link_external_name(ROOT, node, squatter, handle)
            .await
            .unwrap();

        let id = controller
            .request_registration(SUBMITTER, record("ink", "57073"), ENTRY, REGISTRATION_FEE)
            .await
            .unwrap();
        clock.advance(Duration::days(7));

        assert!(matches!(
            controller.execute_registration(OPERATOR, id).await,
            Err(ControllerError::NameAlreadyLinked(n)) if n == node
        ));
        assert_eq!(registry.len().await, 1);
        assert!(registry.resolve_by_name("ink").await.is_none());
        assert_eq!(stores.len(), 1);
        assert_eq!(controller.request_status(id).await, Some(RequestStatus::Active));
        assert_eq!(controller.escrowed_balance().await, REGISTRATION_FEE);
    }

    #[tokio::test]
    async fn test_escrow_overflow_is_refused() {
        let (controller, _) = setup();
        controller
            .request_registration(SUBMITTER, record("ink", "57073"), ENTRY, Amount::MAX)
            .await
            .unwrap();

        assert!(matches!(
            controller
                .request_registration(SUBMITTER, record("mode", "34443"), ENTRY, REGISTRATION_FEE)
                .await,
            Err(ControllerError::FeeOverflow)
        ));
        assert_eq!(controller.request_count().await, 1);
        assert_eq!(controller.escrowed_balance().await, Amount::MAX);
        assert_eq!(controller.pending_requests().await.len(), 1);
    }

    #[tokio::test]
    async fn test_withdrawable_overflow_is_refused() {
        let (controller, clock) = setup();
        let big = controller
            .request_registration(SUBMITTER, record("ink", "57073"), ENTRY, Amount::MAX)
            .await
            .unwrap();
        clock.advance(Duration::days(7));
        controller.execute_registration(OPERATOR, big).await.unwrap();

        let next = controller
            .request_registration(SUBMITTER, record("mode", "34443"), ENTRY, REGISTRATION_FEE)
            .await
            .unwrap();
        clock.advance(Duration::days(7));

        assert!(matches!(
            controller.execute_registration(OPERATOR, next).await,
            Err(ControllerError::FeeOverflow)
        ));
        assert_eq!(controller.registry().len().await, 1);
        assert_eq!(controller.stores().len(), 1);
        assert_eq!(controller.request_status(next).await, Some(RequestStatus::Active));

        // once root has withdrawn, the request goes through
        assert_eq!(controller.withdraw_fees(ROOT).await.unwrap(), Amount::MAX);
        controller.execute_registration(OPERATOR, next).await.unwrap();

        // root's payout balance is full, so the next withdrawal is refused
        assert!(matches!(
            controller.withdraw_fees(ROOT).await,
            Err(ControllerError::Ledger(LedgerError::Overflow { .. }))
        ));
        assert_eq!(controller.withdrawable_balance().await, REGISTRATION_FEE);
        assert_eq!(controller.payout_balance(&ROOT).await, Amount::MAX);
    }

    #[tokio::test]
    async fn test_refund_overflow_keeps_request_active() {
        let (controller, _) = setup();
        let big = controller
            .request_registration(SUBMITTER, record("ink", "57073"), ENTRY, Amount::MAX)
            .await
            .unwrap();
        controller.reject_registration(OPERATOR, big).await.unwrap();

        let next = controller
            .request_registration(SUBMITTER, record("mode", "34443"), ENTRY, REGISTRATION_FEE)
            .await
            .unwrap();
        assert!(matches!(
            controller.reject_registration(OPERATOR, next).await,
            Err(ControllerError::Ledger(_))
        ));
        assert_eq!(controller.request_status(next).await, Some(RequestStatus::Active));
        assert_eq!(controller.escrowed_balance().await, REGISTRATION_FEE);
        assert_eq!(controller.payout_balance(&ENTRY).await, Amount::MAX);
    }
}
