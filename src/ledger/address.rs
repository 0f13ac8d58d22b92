//! Account addresses and base58check with the ledger alphabet.

use bs58::Alphabet;
use ripemd::Ripemd160;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::ledger::types::{LedgerError, LedgerResult};

/// Version byte of a classic account address.
const ACCOUNT_ID_VERSION: u8 = 0x00;

/// Length of an account id in bytes.
pub const ACCOUNT_ID_LEN: usize = 20;

/// Encode `payload` (version bytes included) with a 4-byte checksum.
pub(crate) fn encode_check(payload: &[u8]) -> String {
    bs58::encode(payload)
        .with_alphabet(Alphabet::RIPPLE)
        .with_check()
        .into_string()
}

/// Decode base58check text, returning the payload with its version bytes.
pub(crate) fn decode_check(text: &str) -> Result<Vec<u8>, bs58::decode::Error> {
    bs58::decode(text)
        .with_alphabet(Alphabet::RIPPLE)
        .with_check(None)
        .into_vec()
}

/// A ledger account address (`r...`).
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Account {
    id: [u8; ACCOUNT_ID_LEN],
    address: String,
}

impl Account {
    /// Parse and checksum-verify a classic address.
    pub fn parse(text: &str) -> LedgerResult<Self> {
        let text = text.trim();
        if !text.starts_with('r') {
            return Err(LedgerError::parse("account", format!("'{}' does not start with 'r'", text)));
        }

        let decoded = decode_check(text)
            .map_err(|e| LedgerError::parse("account", format!("'{}': {}", text, e)))?;

        match decoded.split_first() {
            Some((&ACCOUNT_ID_VERSION, body)) if body.len() == ACCOUNT_ID_LEN => {
                let mut id = [0u8; ACCOUNT_ID_LEN];
                id.copy_from_slice(body);
                Ok(Self {
                    id,
                    address: text.to_string(),
                })
            }
            _ => Err(LedgerError::parse("account", format!("'{}' is not an account address", text))),
        }
    }

    /// Build the address for a raw 20-byte account id.
    pub fn from_account_id(id: [u8; ACCOUNT_ID_LEN]) -> Self {
        let mut payload = Vec::with_capacity(ACCOUNT_ID_LEN + 1);
        payload.push(ACCOUNT_ID_VERSION);
        payload.extend_from_slice(&id);
        Self {
            id,
            address: encode_check(&payload),
        }
    }

    /// Derive the account controlled by a 33-byte public key.
    ///
    /// The account id is `RIPEMD160(SHA256(public_key))`.
    pub fn from_public_key(public_key: &[u8]) -> Self {
        let sha = Sha256::digest(public_key);
        let ripe = Ripemd160::digest(sha);
        let mut id = [0u8; ACCOUNT_ID_LEN];
        id.copy_from_slice(&ripe);
        Self::from_account_id(id)
    }

    pub fn account_id(&self) -> &[u8; ACCOUNT_ID_LEN] {
        &self.id
    }

    pub fn as_str(&self) -> &str {
        &self.address
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.address)
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Account({})", self.address)
    }
}

impl TryFrom<String> for Account {
    type Error = LedgerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Account> for String {
    fn from(account: Account) -> Self {
        account.address
    }
}

impl std::str::FromStr for Account {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
