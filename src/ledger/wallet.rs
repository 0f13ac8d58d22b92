//! Wallet management and transaction signing.
//!
//! # Security
//! - Seeds are loaded ONLY from environment variables
//! - Seeds and private keys are never logged or serialized
//! - Seed entropy is zeroized after key derivation

use ed25519_dalek::Signer as _;
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{ecdsa, SecretKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroizing;

use crate::ledger::address::{decode_check, encode_check, Account};
use crate::ledger::codec::sha512_half;
use crate::ledger::types::{LedgerError, LedgerResult};

/// Default environment variable holding the issuer seed.
pub const ISSUER_SEED_ENV_VAR: &str = "ISSUER_SEED";

const FAMILY_SEED_VERSION: u8 = 0x21;
const ED25519_SEED_PREFIX: [u8; 3] = [0x01, 0xE1, 0x4B];
const ED25519_KEY_PREFIX: u8 = 0xED;
const SEED_LEN: usize = 16;

/// Signature scheme a seed derives keys for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAlgorithm {
    Ed25519,
    Secp256k1,
}

enum KeyPair {
    Ed25519(ed25519_dalek::SigningKey),
    Secp256k1(ecdsa::SigningKey),
}

/// Signing key material plus the address it controls.
pub struct Wallet {
    keys: KeyPair,
    public_key: Vec<u8>,
    account: Account,
}

impl Wallet {
    /// Create a wallet from an encoded seed (`sEd...` or `s...`).
    ///
    /// # Security
    /// The seed is decoded, used for derivation and dropped. It is never logged.
    pub fn from_seed(seed: &str) -> LedgerResult<Self> {
        let decoded = Zeroizing::new(
            decode_check(seed.trim())
                .map_err(|e| LedgerError::Wallet(format!("Invalid seed format: {}", e)))?,
        );

        let (algorithm, body) = if decoded.len() == ED25519_SEED_PREFIX.len() + SEED_LEN
            && decoded.starts_with(&ED25519_SEED_PREFIX)
        {
            (KeyAlgorithm::Ed25519, &decoded[ED25519_SEED_PREFIX.len()..])
        } else if decoded.len() == 1 + SEED_LEN && decoded[0] == FAMILY_SEED_VERSION {
            (KeyAlgorithm::Secp256k1, &decoded[1..])
        } else {
            return Err(LedgerError::Wallet("Invalid seed format: unknown seed type".to_string()));
        };

        let mut entropy = Zeroizing::new([0u8; SEED_LEN]);
        entropy.copy_from_slice(body);

        let wallet = Self::from_entropy(algorithm, &entropy)?;
        tracing::debug!(address = %wallet.account, algorithm = ?algorithm, "Wallet initialized");
        Ok(wallet)
    }

    /// Load a wallet from the seed stored in environment variable `var`.
    pub fn from_env(var: &str) -> LedgerResult<Self> {
        let seed = Zeroizing::new(
            std::env::var(var)
                .map_err(|_| LedgerError::Wallet(format!("Environment variable {} not set", var)))?,
        );
        Self::from_seed(&seed)
    }

    /// Generate a fresh random seed in its encoded form.
    pub fn generate_seed(algorithm: KeyAlgorithm) -> Zeroizing<String> {
        let mut entropy = Zeroizing::new([0u8; SEED_LEN]);
        OsRng.fill_bytes(&mut entropy[..]);
        encode_seed(algorithm, &entropy)
    }

    fn from_entropy(algorithm: KeyAlgorithm, entropy: &[u8; SEED_LEN]) -> LedgerResult<Self> {
        let (keys, public_key) = match algorithm {
            KeyAlgorithm::Ed25519 => {
                let private = Zeroizing::new(sha512_half(&[entropy.as_slice()]));
                let key = ed25519_dalek::SigningKey::from_bytes(&private);
                let mut public_key = Vec::with_capacity(33);
                public_key.push(ED25519_KEY_PREFIX);
                public_key.extend_from_slice(&key.verifying_key().to_bytes());
                (KeyPair::Ed25519(key), public_key)
            }
            KeyAlgorithm::Secp256k1 => {
                let key = derive_secp256k1(entropy)?;
                let public_key = key.verifying_key().to_encoded_point(true).as_bytes().to_vec();
                (KeyPair::Secp256k1(key), public_key)
            }
        };

        let account = Account::from_public_key(&public_key);
        Ok(Self {
            keys,
            public_key,
            account,
        })
    }

    /// Get the wallet's address.
    pub fn account(&self) -> &Account {
        &self.account
    }

    /// 33-byte public key as it appears in `SigningPubKey`.
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        match self.keys {
            KeyPair::Ed25519(_) => KeyAlgorithm::Ed25519,
            KeyPair::Secp256k1(_) => KeyAlgorithm::Secp256k1,
        }
    }

    /// Sign a transaction signing payload (prefix included).
    ///
    /// ed25519 signs the payload itself; secp256k1 signs its SHA-512Half with
    /// a canonical (low-S) DER signature.
    pub fn sign(&self, payload: &[u8]) -> LedgerResult<Vec<u8>> {
        match &self.keys {
            KeyPair::Ed25519(key) => Ok(key.sign(payload).to_bytes().to_vec()),
            KeyPair::Secp256k1(key) => {
                let digest = sha512_half(&[payload]);
                let signature: ecdsa::Signature = key
                    .sign_prehash(&digest)
                    .map_err(|e| LedgerError::Wallet(format!("Signing failed: {}", e)))?;
                let signature = signature.normalize_s().unwrap_or(signature);
                Ok(signature.to_der().as_bytes().to_vec())
            }
        }
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("account", &self.account)
            .field("algorithm", &self.algorithm())
            .finish()
    }
}

fn encode_seed(algorithm: KeyAlgorithm, entropy: &[u8; SEED_LEN]) -> Zeroizing<String> {
    let mut payload = Zeroizing::new(Vec::with_capacity(ED25519_SEED_PREFIX.len() + SEED_LEN));
    match algorithm {
        KeyAlgorithm::Ed25519 => payload.extend_from_slice(&ED25519_SEED_PREFIX),
        KeyAlgorithm::Secp256k1 => payload.push(FAMILY_SEED_VERSION),
    }
    payload.extend_from_slice(entropy);
    Zeroizing::new(encode_check(&payload))
}

/// Root key from the seed, then the account key at index 0 of that family.
fn derive_secp256k1(entropy: &[u8; SEED_LEN]) -> LedgerResult<ecdsa::SigningKey> {
    let root = derive_scalar(&[entropy.as_slice()])?;
    let root_public = root.public_key().to_encoded_point(true);
    let account_index = 0u32.to_be_bytes();
    let tweak = derive_scalar(&[root_public.as_bytes(), account_index.as_slice()])?;

    let scalar = *root.to_nonzero_scalar() + *tweak.to_nonzero_scalar();
    let secret = SecretKey::from_bytes(&scalar.to_bytes())
        .map_err(|_| LedgerError::Wallet("Derived key is out of range".to_string()))?;
    Ok(ecdsa::SigningKey::from(secret))
}

/// First `SHA-512Half(parts || seq)` that is a valid secret key.
fn derive_scalar(parts: &[&[u8]]) -> LedgerResult<SecretKey> {
    for seq in 0..=u32::MAX {
        let seq_bytes = seq.to_be_bytes();
        let mut input: Vec<&[u8]> = parts.to_vec();
        input.push(&seq_bytes);

        let candidate = Zeroizing::new(sha512_half(&input));
        if let Ok(key) = SecretKey::from_slice(candidate.as_slice()) {
            return Ok(key);
        }
    }
    Err(LedgerError::Wallet("Seed does not yield a valid key".to_string()))
}
