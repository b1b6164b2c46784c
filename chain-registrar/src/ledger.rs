//! Native-currency payouts owed by the registrar.
//!
//! Refunds and fee withdrawals are credited here; settling a credit on an
//! actual chain is up to whoever embeds the registrar.

use std::collections::HashMap;

use chain_id::Address;

/// Amount in base units.
pub type Amount = u128;

/// Error types for payout accounting.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("Crediting {amount} to {to} would overflow")]
    Overflow { to: Address, amount: Amount },
}

/// Credited balances per recipient.
#[derive(Debug, Default, Clone)]
pub struct Payouts {
    balances: HashMap<Address, Amount>,
    total: Amount,
}

impl Payouts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `amount` to `to`. Nothing changes on overflow.
    pub fn credit(&mut self, to: Address, amount: Amount) -> Result<(), LedgerError> {
        let overflow = LedgerError::Overflow { to, amount };
        let balance = self
            .balance_of(&to)
            .checked_add(amount)
            .ok_or(overflow.clone())?;
        let total = self.total.checked_add(amount).ok_or(overflow)?;

        self.balances.insert(to, balance);
        self.total = total;
        Ok(())
    }

    /// Total credited to `address`.
    pub fn balance_of(&self, address: &Address) -> Amount {
        self.balances.get(address).copied().unwrap_or(0)
    }

    /// Total credited to everyone.
    pub fn total(&self) -> Amount {
        self.total
    }
}
