// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use anyhow::{anyhow, Context};
use ed25519_dalek::{Signer, SigningKey};
use faucet_types::{Ed25519Address, SignedTransaction, Transaction};

/// Environment variable holding the faucet's ed25519 private key.
pub const FAUCET_KEY_ENV: &str = "FAUCET_PRV_KEY";

/// Loads ed25519 private keys from the given environment variable, a
/// comma-separated list of hex-encoded keys. Each entry must be either a
/// 32-byte seed or a 64-byte seed-plus-public-key pair.
pub fn load_ed25519_private_keys_from_env(name: &str) -> anyhow::Result<Vec<SigningKey>> {
    let keys = std::env::var(name)
        .map_err(|_| anyhow!("environment variable '{name}' not set"))?;
    if keys.is_empty() {
        return Err(anyhow!("environment variable '{name}' not set"));
    }

    let mut private_keys = Vec::new();
    for key in keys.split(',') {
        private_keys.push(
            parse_ed25519_private_key(key.trim()).with_context(|| {
                format!("environment variable '{name}' contains an invalid private key")
            })?,
        );
    }
    Ok(private_keys)
}

fn parse_ed25519_private_key(hex_key: &str) -> anyhow::Result<SigningKey> {
    let stripped = hex_key.strip_prefix("0x").unwrap_or(hex_key);
    let bytes = hex::decode(stripped).context("key is not valid hex")?;
    match bytes.len() {
        32 => {
            let seed: [u8; 32] = bytes.try_into().expect("length checked");
            Ok(SigningKey::from_bytes(&seed))
        }
        64 => {
            let pair: [u8; 64] = bytes.try_into().expect("length checked");
            SigningKey::from_keypair_bytes(&pair).context("keypair bytes are inconsistent")
        }
        other => Err(anyhow!("wrong private key length: {other} bytes")),
    }
}

/// Signs faucet transactions with the faucet's own key.
pub struct FaucetSigner {
    signing_key: SigningKey,
}

impl FaucetSigner {
    pub fn new(signing_key: SigningKey) -> Self {
        Self { signing_key }
    }

    /// The faucet address, derived from the verifying key.
    pub fn address(&self) -> Ed25519Address {
        Ed25519Address::from_verifying_key(&self.signing_key.verifying_key())
    }

    pub fn sign_transaction(&self, transaction: Transaction) -> SignedTransaction {
        let signature = self.signing_key.sign(&transaction.to_bytes());
        SignedTransaction {
            public_key: self.signing_key.verifying_key(),
            signature,
            transaction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // serializes access to the process environment across key-loading tests
    static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    fn with_env<R>(value: Option<&str>, f: impl FnOnce() -> R) -> R {
        let _guard = ENV_LOCK.lock().unwrap();
        const VAR: &str = "FAUCET_PRV_KEY_TEST";
        match value {
            Some(v) => std::env::set_var(VAR, v),
            None => std::env::remove_var(VAR),
        }
        let result = f();
        std::env::remove_var(VAR);
        result
    }

    #[test]
    fn test_load_single_seed_key() {
        let seed_hex = hex::encode([7u8; 32]);
        let keys = with_env(Some(&seed_hex), || {
            load_ed25519_private_keys_from_env("FAUCET_PRV_KEY_TEST").unwrap()
        });
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].to_bytes(), [7u8; 32]);
    }

    #[test]
    fn test_load_keypair_encoding() {
        let signing_key = SigningKey::from_bytes(&[9u8; 32]);
        let pair_hex = hex::encode(signing_key.to_keypair_bytes());
        let keys = with_env(Some(&pair_hex), || {
            load_ed25519_private_keys_from_env("FAUCET_PRV_KEY_TEST").unwrap()
        });
        assert_eq!(keys[0].to_bytes(), signing_key.to_bytes());
    }

    #[test]
    fn test_missing_variable_fails() {
        let result = with_env(None, || {
            load_ed25519_private_keys_from_env("FAUCET_PRV_KEY_TEST")
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_wrong_length_fails() {
        let result = with_env(Some("abcdef"), || {
            load_ed25519_private_keys_from_env("FAUCET_PRV_KEY_TEST")
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_comma_separated_keys_are_all_loaded() {
        let list = format!("{},{}", hex::encode([1u8; 32]), hex::encode([2u8; 32]));
        let keys = with_env(Some(&list), || {
            load_ed25519_private_keys_from_env("FAUCET_PRV_KEY_TEST").unwrap()
        });
        assert_eq!(keys.len(), 2);
    }

    #[test]
    fn test_signer_produces_verifiable_signatures() {
        let signer = FaucetSigner::new(SigningKey::from_bytes(&[3u8; 32]));
        let transaction = Transaction {
            creation_slot: 1,
            inputs: Vec::new(),
            outputs: Vec::new(),
            payload: None,
        };
        let signed = signer.sign_transaction(transaction);
        assert!(signed.verify_signature());
    }
}
