// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use bech32::{FromBase32, ToBase32, Variant};
use ed25519_dalek::VerifyingKey;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Kind byte prepended to the address payload inside the bech32 data part.
const ED25519_ADDRESS_KIND: u8 = 0;

/// An ed25519 address: the blake3 digest of the verifying key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Ed25519Address([u8; 32]);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    Decode(String),
    InvalidVariant,
    InvalidKind(u8),
    InvalidLength(usize),
}

impl fmt::Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressError::Decode(err) => write!(f, "bech32 decoding failed: {err}"),
            AddressError::InvalidVariant => write!(f, "address is not bech32 encoded"),
            AddressError::InvalidKind(kind) => write!(f, "unknown address kind: {kind}"),
            AddressError::InvalidLength(len) => write!(f, "invalid address length: {len} bytes"),
        }
    }
}

impl std::error::Error for AddressError {}

impl Ed25519Address {
    pub const LENGTH: usize = 32;

    pub const fn new(bytes: [u8; Self::LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        Self(*blake3::hash(key.as_bytes()).as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; Self::LENGTH] {
        &self.0
    }

    pub fn to_bech32(&self, hrp: &str) -> String {
        let mut payload = Vec::with_capacity(Self::LENGTH + 1);
        payload.push(ED25519_ADDRESS_KIND);
        payload.extend_from_slice(&self.0);
        // encoding only fails on an invalid hrp, which protocol parameters guarantee
        bech32::encode(hrp, payload.to_base32(), Variant::Bech32)
            .expect("hrp must be valid bech32")
    }

    /// Decodes a bech32 address and returns the human-readable part alongside
    /// it, so callers can validate the network prefix.
    pub fn from_bech32(s: &str) -> Result<(String, Self), AddressError> {
        let (hrp, data, variant) =
            bech32::decode(s).map_err(|e| AddressError::Decode(e.to_string()))?;
        if variant != Variant::Bech32 {
            return Err(AddressError::InvalidVariant);
        }
        let payload =
            Vec::<u8>::from_base32(&data).map_err(|e| AddressError::Decode(e.to_string()))?;
        if payload.len() != Self::LENGTH + 1 {
            return Err(AddressError::InvalidLength(payload.len()));
        }
        if payload[0] != ED25519_ADDRESS_KIND {
            return Err(AddressError::InvalidKind(payload[0]));
        }
        let mut bytes = [0u8; Self::LENGTH];
        bytes.copy_from_slice(&payload[1..]);
        Ok((hrp, Self(bytes)))
    }
}

impl fmt::Display for Ed25519Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Ed25519Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Ed25519Address({}..)", hex::encode(&self.0[..4]))
    }
}

impl Serialize for Ed25519Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("0x{}", hex::encode(self.0)))
    }
}

impl<'de> Deserialize<'de> for Ed25519Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let stripped = s.strip_prefix("0x").unwrap_or(&s);
        let bytes = hex::decode(stripped).map_err(de::Error::custom)?;
        let array: [u8; Self::LENGTH] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| de::Error::custom(AddressError::InvalidLength(b.len())))?;
        Ok(Self(array))
    }
}
