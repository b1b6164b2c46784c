//! Caller authorization.
//!
//! Every mutating operation names the role it needs and calls [`authorize`]
//! with the caller's address before touching state. Callers are always
//! passed explicitly; there is no ambient "current sender".

use chain_id::Address;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Roles a caller can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Global authority over the whole system
    Root,
    /// Day-to-day operator (registrar, curator)
    Operator,
    /// Per-entry authority over one metadata store
    EntryAuthority,
}

impl Role {
    /// Get string representation for logs and errors.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Operator => "operator",
            Self::EntryAuthority => "entry-authority",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorityError {
    /// Caller does not hold the required role
    #[error("{caller} is not authorized as {required}")]
    Unauthorized { caller: Address, required: Role },

    /// A role cannot be handed to the null address
    #[error("{0} cannot be assigned to the null address")]
    NullAddress(Role),
}

/// Something that knows who currently holds each role.
pub trait RoleHolder {
    /// Current holder of `role`, if anyone holds it.
    fn holder(&self, role: Role) -> Option<Address>;
}

/// Check that `caller` may act as `role`.
///
/// The root authority also satisfies an operator requirement. Entry
/// authority is never implied.
pub fn authorize(
    caller: Address,
    role: Role,
    holders: &impl RoleHolder,
) -> Result<(), AuthorityError> {
    let holds = |r: Role| holders.holder(r).is_some_and(|h| !h.is_zero() && h == caller);

    let allowed = match role {
        Role::Root => holds(Role::Root),
        Role::Operator => holds(Role::Operator) || holds(Role::Root),
        Role::EntryAuthority => holds(Role::EntryAuthority),
    };

    if allowed {
        Ok(())
    } else {
        warn!(caller = %caller, required = %role, "Unauthorized caller");
        Err(AuthorityError::Unauthorized {
            caller,
            required: role,
        })
    }
}

/// Reject the null address as the new holder of `role`.
pub fn require_non_null(address: Address, role: Role) -> Result<(), AuthorityError> {
    if address.is_zero() {
        Err(AuthorityError::NullAddress(role))
    } else {
        Ok(())
    }
}

/// Root + operator pair held by the registry and the registrar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorities {
    pub root: Address,
    pub operator: Address,
}

impl RoleHolder for Authorities {
    fn holder(&self, role: Role) -> Option<Address> {
        match role {
            Role::Root => Some(self.root),
            Role::Operator => Some(self.operator),
            Role::EntryAuthority => None,
        }
    }
}
