//! Chain identity primitives.
//!
//! Value types and pure derivation functions shared by the registry and the
//! registrar:
//!
//! - [`ChainRecord`]: canonical metadata describing a chain
//! - [`derive_identifier`]: content-addressed identifier of a record
//! - [`derive_cross_standard_hash`]: CAIP-2 `(namespace, reference)` lookup key
//! - [`normalize_coin_type`]: ENSIP-11 coin type for EVM chains
//! - [`namehash`]: node of an external name
//!
//! # Example
//!
//! ```
//! use chain_id::{derive_identifier, Address, ChainRecord};
//!
//! let record = ChainRecord {
//!     name: "base".to_string(),
//!     settlement_id: 1,
//!     version: "1".to_string(),
//!     anchor_address: Address::ZERO,
//!     namespace: "eip155".to_string(),
//!     reference: "8453".to_string(),
//!     coin_type: 0,
//! };
//!
//! assert_eq!(derive_identifier(&record), derive_identifier(&record.clone()));
//! ```

pub mod derive;
pub mod namehash;
pub mod types;

pub use derive::{
    derive_cross_standard_hash, derive_identifier, keccak256, normalize_coin_type, normalized,
    EVM_NAMESPACE,
};
pub use namehash::{namehash, subname_node};
pub use types::*;
