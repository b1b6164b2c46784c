//! Deterministic identifier derivation.
//!
//! Identifiers are Keccak-256 over the Ethereum ABI encoding of a record's
//! ordered 6-tuple `(name, settlementId, version, anchorAddress, namespace,
//! reference)`, so any EVM tool reproduces them from the same fields.

use sha3::{Digest, Keccak256};

use crate::types::{Address, ChainRecord, CrossStandardHash, Identifier};

/// CAIP-2 namespace of EVM networks.
pub const EVM_NAMESPACE: &str = "eip155";

/// High bit set on EVM chain ids to form an ENSIP-11 coin type.
pub const EVM_COIN_TYPE_FLAG: u64 = 0x8000_0000;

/// SLIP-44 coin type of Ethereum mainnet, kept for chain id 1.
pub const ETH_MAINNET_COIN_TYPE: u64 = 60;

/// A single value in an ABI tuple.
#[derive(Debug, Clone, Copy)]
enum Token<'a> {
    Uint(u64),
    Address(&'a Address),
    String(&'a str),
}

fn uint_word(value: u64) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[24..].copy_from_slice(&value.to_be_bytes());
    word
}

/// `abi.encode` of a tuple: one head word per token, dynamic data in the tail.
fn abi_encode(tokens: &[Token<'_>]) -> Vec<u8> {
    let head_len = 32 * tokens.len();
    let mut head = Vec::with_capacity(head_len);
    let mut tail = Vec::new();

    for token in tokens {
        match token {
            Token::Uint(value) => head.extend_from_slice(&uint_word(*value)),
            Token::Address(address) => {
                let mut word = [0u8; 32];
                word[12..].copy_from_slice(address.as_bytes());
                head.extend_from_slice(&word);
            }
            Token::String(s) => {
                head.extend_from_slice(&uint_word((head_len + tail.len()) as u64));
                tail.extend_from_slice(&uint_word(s.len() as u64));
                tail.extend_from_slice(s.as_bytes());
                let rem = s.len() % 32;
                if rem != 0 {
                    tail.resize(tail.len() + 32 - rem, 0);
                }
            }
        }
    }

    head.extend_from_slice(&tail);
    head
}

/// Keccak-256 of arbitrary bytes.
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Derive the identifier of a record. `coin_type` does not participate.
pub fn derive_identifier(record: &ChainRecord) -> Identifier {
    let encoded = abi_encode(&[
        Token::String(&record.name),
        Token::Uint(record.settlement_id),
        Token::String(&record.version),
        Token::Address(&record.anchor_address),
        Token::String(&record.namespace),
        Token::String(&record.reference),
    ]);
    Identifier::new(keccak256(&encoded))
}

/// Reverse-lookup key for a CAIP-2 `(namespace, reference)` pair.
pub fn derive_cross_standard_hash(namespace: &str, reference: &str) -> CrossStandardHash {
    let encoded = abi_encode(&[Token::String(namespace), Token::String(reference)]);
    CrossStandardHash::new(keccak256(&encoded))
}

/// Canonical coin type for a chain.
///
/// EVM chains get `0x80000000 | chainId` (ENSIP-11), with chain id 1 kept at
/// the legacy code 60. Everything else, including an EVM reference that is
/// not a decimal chain id below 2^31, passes `supplied` through.
pub fn normalize_coin_type(namespace: &str, reference: &str, supplied: u64) -> u64 {
    if namespace != EVM_NAMESPACE {
        return supplied;
    }

    match reference.parse::<u64>() {
        Ok(1) => ETH_MAINNET_COIN_TYPE,
        Ok(chain_id) if chain_id < EVM_COIN_TYPE_FLAG => EVM_COIN_TYPE_FLAG | chain_id,
        _ => supplied,
    }
}

/// Copy of `record` with its coin type normalized.
pub fn normalized(record: &ChainRecord) -> ChainRecord {
    ChainRecord {
        coin_type: normalize_coin_type(&record.namespace, &record.reference, record.coin_type),
        ..record.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn base_record() -> ChainRecord {
        ChainRecord {
            name: "base".to_string(),
            settlement_id: 8453,
            version: "1".to_string(),
            anchor_address: Address::new([0xba; 20]),
            namespace: "eip155".to_string(),
            reference: "8453".to_string(),
            coin_type: 0,
        }
    }

    #[test]
    fn test_keccak_empty() {
        assert_eq!(
            hex::encode(keccak256(b"")),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn test_abi_encode_layout() {
        let address = Address::new([0xaa; 20]);
        let encoded = abi_encode(&[Token::Uint(7), Token::String("abc"), Token::Address(&address)]);

        // 3 head words + length word + one padded data word
        assert_eq!(encoded.len(), 5 * 32);
        assert_eq!(encoded[31], 7);
        // offset of the string data = head size
        assert_eq!(encoded[63], 96);
        assert_eq!(&encoded[76..96], address.as_bytes());
        assert_eq!(encoded[127], 3);
        assert_eq!(&encoded[128..131], b"abc");
        assert!(encoded[131..].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_derive_is_deterministic() {
        let record = base_record();
        assert_eq!(derive_identifier(&record), derive_identifier(&record));
        assert!(!derive_identifier(&record).is_zero());
    }

    #[test]
    fn test_coin_type_excluded_from_identifier() {
        let record = base_record();
        let other = ChainRecord {
            coin_type: 12345,
            ..record.clone()
        };
        assert_eq!(derive_identifier(&record), derive_identifier(&other));
    }

    #[test]
    fn test_field_boundaries_matter() {
        // Shifting bytes between adjacent strings must change the hash.
        let a = ChainRecord {
            namespace: "eip1".to_string(),
            reference: "558453".to_string(),
            ..base_record()
        };
        let b = ChainRecord {
            namespace: "eip155".to_string(),
            reference: "8453".to_string(),
            ..base_record()
        };
        assert_ne!(derive_identifier(&a), derive_identifier(&b));
        assert_ne!(
            derive_cross_standard_hash("eip1", "558453"),
            derive_cross_standard_hash("eip155", "8453")
        );
    }

    #[test]
    fn test_normalize_coin_type() {
        assert_eq!(normalize_coin_type("eip155", "8453", 0), 0x8000_2105);
        assert_eq!(normalize_coin_type("eip155", "8453", 999), 0x8000_2105);
        assert_eq!(normalize_coin_type("eip155", "1", 0), 60);
        assert_eq!(normalize_coin_type("eip155", "not-a-number", 42), 42);
        assert_eq!(normalize_coin_type("eip155", "2147483648", 7), 7);
        assert_eq!(normalize_coin_type("solana", "mainnet", 501), 501);
        assert_eq!(normalize_coin_type("cosmos", "cosmoshub-4", 0), 0);
    }

    #[test]
    fn test_normalized_record() {
        let record = normalized(&base_record());
        assert_eq!(record.coin_type, 0x8000_2105);
        assert_eq!(record.name, "base");
    }

    fn arb_record() -> impl Strategy<Value = ChainRecord> {
        (
            "[a-z]{0,6}",
            0u64..4,
            "[0-9]{0,2}",
            prop::array::uniform20(0u8..3),
            "[a-z]{0,4}",
            "[0-9a-z]{0,3}",
            any::<u64>(),
        )
            .prop_map(
                |(name, settlement_id, version, anchor, namespace, reference, coin_type)| {
                    ChainRecord {
                        name,
                        settlement_id,
                        version,
                        anchor_address: Address::new(anchor),
                        namespace,
                        reference,
                        coin_type,
                    }
                },
            )
    }

    fn same_tuple(a: &ChainRecord, b: &ChainRecord) -> bool {
        a.name == b.name
            && a.settlement_id == b.settlement_id
            && a.version == b.version
            && a.anchor_address == b.anchor_address
            && a.namespace == b.namespace
            && a.reference == b.reference
    }

    proptest! {
        #[test]
        fn identifiers_collide_only_on_equal_tuples(a in arb_record(), b in arb_record()) {
            let equal_ids = derive_identifier(&a) == derive_identifier(&b);
            prop_assert_eq!(equal_ids, same_tuple(&a, &b));
        }

        #[test]
        fn cross_standard_hash_tracks_pair(
            ns_a in "[a-z0-9]{0,8}", ref_a in "[a-z0-9]{0,8}",
            ns_b in "[a-z0-9]{0,8}", ref_b in "[a-z0-9]{0,8}",
        ) {
            let equal = derive_cross_standard_hash(&ns_a, &ref_a)
                == derive_cross_standard_hash(&ns_b, &ref_b);
            prop_assert_eq!(equal, ns_a == ns_b && ref_a == ref_b);
        }
    }
}
