// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// The ledger's primary fungible unit.
pub type BaseToken = u64;

/// Ancillary consumable resource attached to outputs.
pub type Mana = u64;

/// Index of a slot in the ledger's timeline.
pub type SlotIndex = u32;

/// Errors raised when parsing an identifier from its hex form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdParseError {
    InvalidHex(String),
    InvalidLength(usize),
}

impl fmt::Display for IdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdParseError::InvalidHex(err) => write!(f, "invalid hex: {err}"),
            IdParseError::InvalidLength(len) => write!(f, "invalid length: {len} bytes"),
        }
    }
}

impl std::error::Error for IdParseError {}

macro_rules! digest_id {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
        pub struct $name([u8; 32]);

        impl $name {
            pub const LENGTH: usize = 32;

            pub const fn new(bytes: [u8; Self::LENGTH]) -> Self {
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; Self::LENGTH] {
                &self.0
            }

            pub fn to_hex(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                // only the first four bytes, full ids drown the logs
                write!(f, "{}({}..)", stringify!($name), hex::encode(&self.0[..4]))
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let stripped = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(stripped)
                    .map_err(|e| IdParseError::InvalidHex(e.to_string()))?;
                let array: [u8; Self::LENGTH] = bytes
                    .try_into()
                    .map_err(|b: Vec<u8>| IdParseError::InvalidLength(b.len()))?;
                Ok(Self(array))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_hex())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(de::Error::custom)
            }
        }
    };
}

digest_id!(TransactionId);
digest_id!(BlockId);

/// Identifier of an output: the id of the transaction that created it plus
/// the index of the output inside that transaction.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId {
    transaction_id: TransactionId,
    index: u16,
}

impl OutputId {
    pub const fn new(transaction_id: TransactionId, index: u16) -> Self {
        Self {
            transaction_id,
            index,
        }
    }

    pub fn transaction_id(&self) -> TransactionId {
        self.transaction_id
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn to_hex(&self) -> String {
        format!(
            "0x{}{}",
            hex::encode(self.transaction_id.as_bytes()),
            hex::encode(self.index.to_le_bytes())
        )
    }
}

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "OutputId({}..:{})",
            hex::encode(&self.transaction_id.as_bytes()[..4]),
            self.index
        )
    }
}

impl FromStr for OutputId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let bytes =
            hex::decode(stripped).map_err(|e| IdParseError::InvalidHex(e.to_string()))?;
        if bytes.len() != TransactionId::LENGTH + 2 {
            return Err(IdParseError::InvalidLength(bytes.len()));
        }
        let mut id = [0u8; TransactionId::LENGTH];
        id.copy_from_slice(&bytes[..TransactionId::LENGTH]);
        let index = u16::from_le_bytes([bytes[TransactionId::LENGTH], bytes[TransactionId::LENGTH + 1]]);
        Ok(Self::new(TransactionId::new(id), index))
    }
}

impl Serialize for OutputId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for OutputId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}
