//! Core value types for chain records.
//!
//! Addresses and hashes are fixed-width byte newtypes that display as
//! `0x`-prefixed hex. The all-zero value of each is its "unset" sentinel.
//!
//! With the `typescript` feature enabled, the record types can be exported
//! to TypeScript using ts-rs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Error parsing a hex-encoded address or hash.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// Not valid hex
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    /// Wrong number of bytes
    #[error("Expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

fn decode_fixed<const N: usize>(s: &str) -> Result<[u8; N], ParseError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(digits).map_err(|e| ParseError::InvalidHex(e.to_string()))?;
    if bytes.len() != N {
        return Err(ParseError::InvalidLength {
            expected: N,
            actual: bytes.len(),
        });
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Defines a fixed-width byte newtype with hex display and serde support.
macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Width in bytes.
            pub const LEN: usize = $len;

            /// The all-zero value.
            pub const ZERO: Self = Self([0u8; $len]);

            /// Wrap raw bytes.
            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Borrow the raw bytes.
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Whether this is the all-zero value.
            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; $len]
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                decode_fixed::<$len>(s).map(Self)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

fixed_bytes!(
    /// A 20-byte account address. [`Address::ZERO`] is the null address.
    Address,
    20
);

fixed_bytes!(
    /// Content-addressed identifier of a chain record (Keccak-256 of its
    /// canonical 6-tuple). Primary key of a registry entry.
    Identifier,
    32
);

fixed_bytes!(
    /// Reverse-lookup key over a `(namespace, reference)` pair.
    CrossStandardHash,
    32
);

fixed_bytes!(
    /// Namehash of an external (ENS-style) name.
    NameNode,
    32
);

/// Canonical metadata describing a registered chain.
///
/// Only `(name, settlement_id, version, anchor_address, namespace, reference)`
/// feed the identifier. `coin_type` is excluded, so two records that differ
/// only there derive the same identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct ChainRecord {
    /// Human-readable name, globally unique
    pub name: String,
    /// Numeric id of the settlement network
    pub settlement_id: u64,
    /// Version string
    pub version: String,
    /// Rollup/anchor contract on the settlement network
    #[cfg_attr(feature = "typescript", ts(type = "string"))]
    pub anchor_address: Address,
    /// CAIP-2 namespace, e.g. `eip155`
    pub namespace: String,
    /// CAIP-2 reference, e.g. `8453`
    pub reference: String,
    /// Coin type; zero requests derivation where possible
    pub coin_type: u64,
}

impl ChainRecord {
    /// Copy of this record with only the version replaced.
    pub fn with_version(&self, version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..self.clone()
        }
    }

    /// The CAIP-2 chain id, `namespace:reference`.
    pub fn caip2(&self) -> String {
        format!("{}:{}", self.namespace, self.reference)
    }

    /// The fields needed to re-derive the identifier, minus the name.
    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            settlement_id: self.settlement_id,
            version: self.version.clone(),
            anchor_address: self.anchor_address,
            namespace: self.namespace.clone(),
            reference: self.reference.clone(),
        }
    }
}

/// Derivation fields of a record as exposed by a metadata store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct ChainSnapshot {
    pub settlement_id: u64,
    pub version: String,
    #[cfg_attr(feature = "typescript", ts(type = "string"))]
    pub anchor_address: Address,
    pub namespace: String,
    pub reference: String,
}
