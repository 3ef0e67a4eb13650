// SPDX-FileCopyrightText: 2026 Otalink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chunk and artifact checksums.
//!
//! Devices in the field verify chunks with the additive checksum: the sum of
//! all bytes, rendered as lowercase hex and left-padded to eight digits. It
//! only detects accidental corruption. SHA-256 is available for fleets whose
//! firmware can verify it.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use strum::{Display, EnumString};

/// Checksum applied to each transferred chunk.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ChecksumAlgorithm {
    #[default]
    Additive,
    Sha256,
}

impl ChecksumAlgorithm {
    pub fn compute(self, data: &[u8]) -> String {
        match self {
            ChecksumAlgorithm::Additive => additive_checksum(data),
            ChecksumAlgorithm::Sha256 => sha256_hex(data),
        }
    }
}

/// Sum of all bytes as lowercase hex, at least eight digits wide.
pub fn additive_checksum(data: &[u8]) -> String {
    let sum: u64 = data.iter().map(|b| u64::from(*b)).sum();
    format!("{sum:08x}")
}

/// Lowercase hex SHA-256 digest.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn additive_checksum_known_values() {
        assert_eq!(additive_checksum(&[]), "00000000");
        assert_eq!(additive_checksum(&[1, 2, 3]), "00000006");
        assert_eq!(additive_checksum(&[0xff; 16]), "00000ff0");
    }

    #[test]
    fn sha256_known_value() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn algorithm_parses_from_config_spelling() {
        use std::str::FromStr;
        assert_eq!(
            ChecksumAlgorithm::from_str("sha256").unwrap(),
            ChecksumAlgorithm::Sha256
        );
        assert_eq!(ChecksumAlgorithm::default(), ChecksumAlgorithm::Additive);
    }

    proptest! {
        #[test]
        fn additive_checksum_is_order_independent(mut data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let forward = additive_checksum(&data);
            data.reverse();
            prop_assert_eq!(forward, additive_checksum(&data));
        }

        #[test]
        fn additive_checksum_is_at_least_eight_hex_digits(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let sum = additive_checksum(&data);
            prop_assert!(sum.len() >= 8);
            prop_assert!(sum.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        }
    }
}
