//! Chain Registrar
//!
//! Governance-gated registration workflow in front of the chain registry:
//!
//! 1. anyone requests a registration, escrowing [`REGISTRATION_FEE`]
//! 2. the request sits out the [`OBJECTION_WINDOW_SECS`] objection window
//! 3. the operator executes it (store deployed, chain registered, external
//!    name linked) or rejects it (fee refunded to the entry authority)
//!
//! # Example
//!
//! ```ignore
//! use chain_registrar::{RegistrarConfig, RegistrationController, SystemClock};
//!
//! let controller = RegistrationController::bootstrap(config, Arc::new(SystemClock))?;
//! let id = controller.request_registration(me, record, me, REGISTRATION_FEE).await?;
//! // ... seven days later
//! let identifier = controller.execute_registration(operator, id).await?;
//! ```

pub mod clock;
pub mod config;
pub mod controller;
pub mod ledger;
pub mod request;

// Re-export main types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    objection_window, ConfigError, RegistrarConfig, NATIVE_UNIT, OBJECTION_WINDOW_SECS,
    REGISTRATION_FEE,
};
pub use controller::{ControllerError, RegistrationController};
pub use ledger::{Amount, LedgerError, Payouts};
pub use request::{RegistrationRequest, RequestId, RequestStatus};
