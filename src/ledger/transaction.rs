//! Transaction building, local validation and signing.
//!
//! # Responsibilities
//! - Describe the transactions the gateway emits (Payment, TrustSet, AccountSet)
//! - Check required fields before anything reaches the network
//! - Produce the signed blob and its transaction id

use crate::ledger::address::Account;
use crate::ledger::amount::{CurrencyAmount, Drops};
use crate::ledger::codec::{self, FieldId, FieldValue, SIGNING_PREFIX, TRANSACTION_ID_PREFIX};
use crate::ledger::types::{LedgerError, LedgerResult, TxHash};
use crate::ledger::wallet::Wallet;

const PAYMENT_TYPE: u16 = 0;
const ACCOUNT_SET_TYPE: u16 = 3;
const TRUST_SET_TYPE: u16 = 20;

/// `asfDisallowXRP`: the issuing account does not expect XRP deliveries.
pub const ASF_DISALLOW_XRP: u32 = 8;

/// What a transaction does.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionKind {
    /// Deliver an issued currency to `destination`.
    Payment {
        destination: Account,
        amount: CurrencyAmount,
    },
    /// Authorize holding up to `limit` of the issuer's currency.
    TrustSet { limit: CurrencyAmount },
    /// Turn on an account flag, e.g. [`ASF_DISALLOW_XRP`] on the issuer.
    AccountSet { set_flag: u32 },
}

impl TransactionKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Payment { .. } => "Payment",
            Self::TrustSet { .. } => "TrustSet",
            Self::AccountSet { .. } => "AccountSet",
        }
    }

    fn type_code(&self) -> u16 {
        match self {
            Self::Payment { .. } => PAYMENT_TYPE,
            Self::TrustSet { .. } => TRUST_SET_TYPE,
            Self::AccountSet { .. } => ACCOUNT_SET_TYPE,
        }
    }
}

/// A transaction before signing. Autofilled fields start empty.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsignedTransaction {
    pub account: Account,
    pub kind: TransactionKind,
    pub flags: u32,
    pub fee: Option<Drops>,
    pub sequence: Option<u32>,
    pub last_ledger_sequence: Option<u32>,
}

/// Signed blob ready for `submit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// Uppercase hex of the full serialization.
    pub blob: String,
    /// Locally computed transaction id.
    pub hash: TxHash,
}

impl UnsignedTransaction {
    pub fn payment(account: Account, destination: Account, amount: CurrencyAmount) -> Self {
        Self::new(account, TransactionKind::Payment { destination, amount })
    }

    pub fn trust_set(account: Account, limit: CurrencyAmount) -> Self {
        Self::new(account, TransactionKind::TrustSet { limit })
    }

    pub fn account_set(account: Account, set_flag: u32) -> Self {
        Self::new(account, TransactionKind::AccountSet { set_flag })
    }

    fn new(account: Account, kind: TransactionKind) -> Self {
        Self {
            account,
            kind,
            flags: 0,
            fee: None,
            sequence: None,
            last_ledger_sequence: None,
        }
    }

    /// Fill in the network-dependent fields.
    pub fn autofill(mut self, fee: Drops, sequence: u32, last_ledger_sequence: u32) -> Self {
        self.fee = Some(fee);
        self.sequence = Some(sequence);
        self.last_ledger_sequence = Some(last_ledger_sequence);
        self
    }

    /// Check everything the ledger would reject as malformed, including the
    /// autofilled fields.
    pub fn validate(&self) -> LedgerResult<()> {
        let invalid = |msg: String| Err(LedgerError::InvalidTransaction(msg));

        match self.fee {
            None => return invalid("Fee is required".to_string()),
            Some(fee) if fee.0 == 0 || fee.0 > Drops::MAX => {
                return invalid(format!("Fee of {} drops is out of range", fee))
            }
            Some(_) => {}
        }
        if self.sequence.is_none() {
            return invalid("Sequence is required".to_string());
        }
        self.validate_intent()
    }

    /// Checks that need nothing from the network.
    pub fn validate_intent(&self) -> LedgerResult<()> {
        let invalid = |msg: &str| Err(LedgerError::InvalidTransaction(msg.to_string()));

        match &self.kind {
            TransactionKind::Payment { destination, amount } => {
                if destination == &self.account {
                    return invalid("Destination must differ from Account");
                }
                if amount.value.is_zero() {
                    return invalid("Amount must be greater than zero");
                }
            }
            TransactionKind::TrustSet { limit } => {
                if limit.issuer == self.account {
                    return invalid("An account cannot extend a trust line to itself");
                }
            }
            TransactionKind::AccountSet { set_flag } => {
                if *set_flag == 0 {
                    return invalid("SetFlag must name an account flag");
                }
            }
        }
        Ok(())
    }

    fn fields(&self, public_key: &[u8]) -> LedgerResult<Vec<(FieldId, FieldValue)>> {
        let fee = self
            .fee
            .ok_or_else(|| LedgerError::InvalidTransaction("Fee is required".to_string()))?;
        let sequence = self
            .sequence
            .ok_or_else(|| LedgerError::InvalidTransaction("Sequence is required".to_string()))?;

        let mut fields = vec![
            (codec::TRANSACTION_TYPE, FieldValue::UInt16(self.kind.type_code())),
            (codec::FLAGS, FieldValue::UInt32(self.flags)),
            (codec::SEQUENCE, FieldValue::UInt32(sequence)),
            (codec::FEE, FieldValue::Native(fee)),
            (codec::SIGNING_PUB_KEY, FieldValue::Blob(public_key.to_vec())),
            (codec::ACCOUNT, FieldValue::Account(self.account.clone())),
        ];
        if let Some(last) = self.last_ledger_sequence {
            fields.push((codec::LAST_LEDGER_SEQUENCE, FieldValue::UInt32(last)));
        }

        match &self.kind {
            TransactionKind::Payment { destination, amount } => {
                fields.push((codec::AMOUNT, FieldValue::Issued(amount.clone())));
                fields.push((codec::DESTINATION, FieldValue::Account(destination.clone())));
            }
            TransactionKind::TrustSet { limit } => {
                fields.push((codec::LIMIT_AMOUNT, FieldValue::Issued(limit.clone())));
            }
            TransactionKind::AccountSet { set_flag } => {
                fields.push((codec::SET_FLAG, FieldValue::UInt32(*set_flag)));
            }
        }
        Ok(fields)
    }

    /// Validate, sign with `wallet` and serialize.
    pub fn sign(&self, wallet: &Wallet) -> LedgerResult<SignedTransaction> {
        self.validate()?;
        if wallet.account() != &self.account {
            return Err(LedgerError::Wallet(format!(
                "Wallet {} cannot sign for account {}",
                wallet.account(),
                self.account
            )));
        }

        let mut fields = self.fields(wallet.public_key())?;
        let mut payload = SIGNING_PREFIX.to_vec();
        payload.extend_from_slice(&codec::serialize(&fields, true)?);
        let signature = wallet.sign(&payload)?;

        fields.push((codec::TXN_SIGNATURE, FieldValue::Blob(signature)));
        let blob = codec::serialize(&fields, false)?;
        let hash = codec::sha512_half(&[TRANSACTION_ID_PREFIX.as_slice(), blob.as_slice()]);

        Ok(SignedTransaction {
            blob: hex::encode_upper(&blob),
            hash: TxHash::from_digest(&hash),
        })
    }
}
