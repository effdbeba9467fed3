//! Ethereum address parsing and EIP-55 checksum handling.
//!
//! Validation is a pure function: `0x` prefix, 40 hex characters, and when
//! the input is mixed-case the EIP-55 checksum must hold. The checksummed
//! rendering is the canonical form used as the cooldown-store key, so
//! differently-cased spellings of one address share one record.

use std::fmt;

use crate::error::FaucetError;

pub const ADDRESS_BYTES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EthAddress([u8; ADDRESS_BYTES]);

impl EthAddress {
    pub fn from_bytes(bytes: [u8; ADDRESS_BYTES]) -> Self {
        Self(bytes)
    }

    /// Parses and validates an externally supplied address string.
    pub fn parse(raw: &str) -> Result<Self, FaucetError> {
        let hex_part = raw.strip_prefix("0x").ok_or(FaucetError::InvalidAddress)?;
        if hex_part.len() != ADDRESS_BYTES * 2 {
            return Err(FaucetError::InvalidAddress);
        }
        if !hex_part.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(FaucetError::InvalidAddress);
        }

        let mut bytes = [0u8; ADDRESS_BYTES];
        hex::decode_to_slice(hex_part, &mut bytes).map_err(|_| FaucetError::InvalidAddress)?;
        let address = Self(bytes);

        // All-lowercase and all-uppercase inputs carry no checksum; a
        // mixed-case input must match its EIP-55 rendering exactly.
        let has_lower = hex_part.bytes().any(|b| b.is_ascii_lowercase());
        let has_upper = hex_part.bytes().any(|b| b.is_ascii_uppercase());
        if has_lower && has_upper && raw != address.to_checksummed() {
            return Err(FaucetError::InvalidAddress);
        }

        Ok(address)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_BYTES] {
        &self.0
    }

    /// EIP-55 checksummed rendering, `0x`-prefixed.
    pub fn to_checksummed(&self) -> String {
        let lower = hex::encode(self.0);
        let digest = keccak_hash::keccak(lower.as_bytes());
        let mut out = String::with_capacity(2 + ADDRESS_BYTES * 2);
        out.push_str("0x");
        for (i, ch) in lower.chars().enumerate() {
            let nibble = if i % 2 == 0 {
                digest.as_bytes()[i / 2] >> 4
            } else {
                digest.as_bytes()[i / 2] & 0x0f
            };
            if nibble >= 8 {
                out.push(ch.to_ascii_uppercase());
            } else {
                out.push(ch);
            }
        }
        out
    }
}

impl fmt::Display for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksummed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Checksummed vectors from EIP-55.
    const VECTORS: [&str; 4] = [
        "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
        "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359",
        "0xdbF03B407c01E7cD3CBea99509d93f8DDDC8C6FB",
        "0xD1220A0cf47c7B9Be7A2E6BA89F429762e7b9aDb",
    ];

    #[test]
    fn checksummed_vectors_roundtrip() {
        for vector in VECTORS {
            let parsed = EthAddress::parse(vector).expect("valid checksummed address");
            assert_eq!(parsed.to_checksummed(), vector);
        }
    }

    #[test]
    fn lowercase_and_uppercase_accepted() {
        for vector in VECTORS {
            let lower = vector.to_lowercase();
            let parsed = EthAddress::parse(&lower).expect("lowercase address");
            assert_eq!(parsed.to_checksummed(), vector);

            let upper = format!("0x{}", vector[2..].to_uppercase());
            EthAddress::parse(&upper).expect("uppercase address");
        }
    }

    #[test]
    fn bad_checksum_rejected() {
        // Flip the case of one checksummed letter.
        let damaged = "0x5aaeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
        assert!(matches!(
            EthAddress::parse(damaged),
            Err(FaucetError::InvalidAddress)
        ));
    }

    #[test]
    fn malformed_inputs_rejected() {
        for raw in [
            "",
            "not-an-address",
            "5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed",
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAe",
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed00",
            "0xzzzzb6053F3E94C9b9A09f33669435E7Ef1BeAed",
        ] {
            assert!(
                matches!(EthAddress::parse(raw), Err(FaucetError::InvalidAddress)),
                "should reject {raw:?}"
            );
        }
    }
}
