//! Chain identifiers and event provenance.
//!
//! Identifiers are stored as normalized lowercase `0x` hex strings so that
//! the same on-chain value always maps to the same storage key.

use crate::governance::errors::IndexerError;
use ethnum::U256;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const ADDRESS_BYTES: usize = 20;
const TX_HASH_BYTES: usize = 32;

/// Splits off the `0x` prefix and checks the rest is hex
fn hex_body<'a>(kind: &'static str, value: &'a str) -> Result<&'a str, IndexerError> {
    let body = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .ok_or_else(|| IndexerError::InvalidIdentifier {
            kind,
            value: value.to_string(),
        })?;
    if body.is_empty() || !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(IndexerError::InvalidIdentifier {
            kind,
            value: value.to_string(),
        });
    }
    Ok(body)
}

/// Parses fixed-width hex into its canonical lowercase form
fn fixed_width_hex(kind: &'static str, value: &str, bytes: usize) -> Result<String, IndexerError> {
    let body = hex_body(kind, value)?;
    let decoded = hex::decode(body).map_err(|_| IndexerError::InvalidIdentifier {
        kind,
        value: value.to_string(),
    })?;
    if decoded.len() != bytes {
        return Err(IndexerError::InvalidIdentifier {
            kind,
            value: value.to_string(),
        });
    }
    Ok(format!("0x{}", hex::encode(decoded)))
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = IndexerError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

string_id!(
    /// 20-byte account address
    Address
);

string_id!(
    /// 32-byte transaction hash
    TxHash
);

string_id!(
    /// On-chain proposal id (a uint256), keyed by its minimal hex form
    ProposalId
);

impl FromStr for Address {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        fixed_width_hex("address", s, ADDRESS_BYTES).map(Address)
    }
}

impl FromStr for TxHash {
    type Err = IndexerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        fixed_width_hex("transaction hash", s, TX_HASH_BYTES).map(TxHash)
    }
}

impl FromStr for ProposalId {
    type Err = IndexerError;

    /// Accepts `0x` hex or a decimal string, anything that fits a uint256.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || IndexerError::InvalidIdentifier {
            kind: "proposal id",
            value: s.to_string(),
        };
        let value = if s.starts_with("0x") || s.starts_with("0X") {
            U256::from_str_radix(hex_body("proposal id", s)?, 16).map_err(|_| invalid())?
        } else if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            U256::from_str_radix(s, 10).map_err(|_| invalid())?
        } else {
            return Err(invalid());
        };
        Ok(ProposalId::from(value))
    }
}

impl From<U256> for ProposalId {
    fn from(value: U256) -> Self {
        ProposalId(format!("0x{:x}", value))
    }
}

/// Position of a log in the chain: block first, then log index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventPosition {
    pub block_number: u64,
    pub log_index: u32,
}

impl fmt::Display for EventPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.block_number, self.log_index)
    }
}

/// Where an event came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub block_number: u64,
    pub block_timestamp: u64,
    pub transaction_hash: TxHash,
    pub log_index: u32,
}

impl Provenance {
    pub fn position(&self) -> EventPosition {
        EventPosition {
            block_number: self.block_number,
            log_index: self.log_index,
        }
    }

    /// `<block>-<log index>`, the key of proposal audit records
    pub fn event_id(&self) -> String {
        self.position().to_string()
    }

    /// Transaction hash with the log index appended as 4 little-endian
    /// bytes. Keys vote records and mirrored governor logs.
    pub fn log_id(&self) -> String {
        format!(
            "{}{}",
            self.transaction_hash,
            hex::encode(self.log_index.to_le_bytes())
        )
    }

    /// Block timestamp as UTC, if representable
    pub fn timestamp_utc(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        i64::try_from(self.block_timestamp)
            .ok()
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
    }
}

/// Serde helper for uint256 quantities carried as decimal strings on the wire.
pub mod decimal_u256 {
    use ethnum::U256;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &U256, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<U256, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Quantity {
            Text(String),
            Number(u64),
        }

        match Quantity::deserialize(deserializer)? {
            Quantity::Text(s) => {
                if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(de::Error::custom(format!("invalid quantity '{}'", s)));
                }
                U256::from_str_radix(&s, 10)
                    .map_err(|_| de::Error::custom(format!("quantity '{}' exceeds uint256", s)))
            }
            Quantity::Number(n) => Ok(U256::from(n)),
        }
    }
}
