//! Canonical binary encoding of transaction fields.
//!
//! Only the field types the gateway emits are supported. Fields are written
//! ordered by `(type code, field code)`, which is what the ledger hashes and
//! verifies signatures over.

use sha2::{Digest, Sha512};

use crate::ledger::amount::{CurrencyAmount, Drops, MIN_EXPONENT};
use crate::ledger::address::Account;
use crate::ledger::types::{LedgerError, LedgerResult};

/// Prefix of the payload that gets signed.
pub const SIGNING_PREFIX: [u8; 4] = *b"STX\0";
/// Prefix used when hashing a signed transaction into its id.
pub const TRANSACTION_ID_PREFIX: [u8; 4] = *b"TXN\0";

const TYPE_UINT16: u8 = 1;
const TYPE_UINT32: u8 = 2;
const TYPE_AMOUNT: u8 = 6;
const TYPE_BLOB: u8 = 7;
const TYPE_ACCOUNT: u8 = 8;

const NOT_NATIVE: u64 = 0x8000_0000_0000_0000;
const POSITIVE: u64 = 0x4000_0000_0000_0000;

/// Field identifiers used by Payment and TrustSet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FieldId {
    pub type_code: u8,
    pub field_code: u8,
    pub name: &'static str,
    /// Excluded from the signing payload.
    pub signature_field: bool,
}

const fn field(type_code: u8, field_code: u8, name: &'static str) -> FieldId {
    FieldId {
        type_code,
        field_code,
        name,
        signature_field: false,
    }
}

pub const TRANSACTION_TYPE: FieldId = field(TYPE_UINT16, 2, "TransactionType");
pub const FLAGS: FieldId = field(TYPE_UINT32, 2, "Flags");
pub const SEQUENCE: FieldId = field(TYPE_UINT32, 4, "Sequence");
pub const LAST_LEDGER_SEQUENCE: FieldId = field(TYPE_UINT32, 27, "LastLedgerSequence");
pub const SET_FLAG: FieldId = field(TYPE_UINT32, 33, "SetFlag");
pub const AMOUNT: FieldId = field(TYPE_AMOUNT, 1, "Amount");
pub const LIMIT_AMOUNT: FieldId = field(TYPE_AMOUNT, 3, "LimitAmount");
pub const FEE: FieldId = field(TYPE_AMOUNT, 8, "Fee");
pub const SIGNING_PUB_KEY: FieldId = field(TYPE_BLOB, 3, "SigningPubKey");
pub const TXN_SIGNATURE: FieldId = FieldId {
    signature_field: true,
    ..field(TYPE_BLOB, 4, "TxnSignature")
};
pub const ACCOUNT: FieldId = field(TYPE_ACCOUNT, 1, "Account");
pub const DESTINATION: FieldId = field(TYPE_ACCOUNT, 3, "Destination");

/// A typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    UInt16(u16),
    UInt32(u32),
    Native(Drops),
    Issued(CurrencyAmount),
    Blob(Vec<u8>),
    Account(Account),
}

/// Encode a field header.
pub fn encode_field_id(id: &FieldId, out: &mut Vec<u8>) {
    let (t, f) = (id.type_code, id.field_code);
    match (t < 16, f < 16) {
        (true, true) => out.push((t << 4) | f),
        (true, false) => out.extend_from_slice(&[t << 4, f]),
        (false, true) => out.extend_from_slice(&[f, t]),
        (false, false) => out.extend_from_slice(&[0, t, f]),
    }
}

/// Encode a variable-length prefix.
pub fn encode_length(len: usize, out: &mut Vec<u8>) -> LedgerResult<()> {
    match len {
        0..=192 => out.push(len as u8),
        193..=12_480 => {
            let rest = len - 193;
            out.push(193 + (rest >> 8) as u8);
            out.push((rest & 0xff) as u8);
        }
        12_481..=918_744 => {
            let rest = len - 12_481;
            out.push(241 + (rest >> 16) as u8);
            out.push(((rest >> 8) & 0xff) as u8);
            out.push((rest & 0xff) as u8);
        }
        _ => {
            return Err(LedgerError::InvalidTransaction(format!(
                "variable-length field of {} bytes is too long",
                len
            )))
        }
    }
    Ok(())
}

/// Encode a native amount.
pub fn encode_native(drops: Drops) -> LedgerResult<[u8; 8]> {
    if drops.0 > Drops::MAX {
        return Err(LedgerError::InvalidTransaction(format!("{} drops exceeds the native supply", drops)));
    }
    Ok((POSITIVE | drops.0).to_be_bytes())
}

/// Encode an issued-currency amount: 8 value bytes, currency, issuer.
pub fn encode_issued(amount: &CurrencyAmount) -> [u8; 48] {
    let (mantissa, exponent) = amount.value.mantissa_exponent();
    let value = if mantissa == 0 {
        NOT_NATIVE
    } else {
        // Exponent is range-checked when the value is parsed.
        let biased = (exponent - MIN_EXPONENT + 1) as u64;
        NOT_NATIVE | POSITIVE | (biased << 54) | mantissa
    };

    let mut out = [0u8; 48];
    out[..8].copy_from_slice(&value.to_be_bytes());
    out[8..28].copy_from_slice(&amount.currency.to_bytes());
    out[28..].copy_from_slice(amount.issuer.account_id());
    out
}

fn encode_value(value: &FieldValue, out: &mut Vec<u8>) -> LedgerResult<()> {
    match value {
        FieldValue::UInt16(v) => out.extend_from_slice(&v.to_be_bytes()),
        FieldValue::UInt32(v) => out.extend_from_slice(&v.to_be_bytes()),
        FieldValue::Native(drops) => out.extend_from_slice(&encode_native(*drops)?),
        FieldValue::Issued(amount) => out.extend_from_slice(&encode_issued(amount)),
        FieldValue::Blob(bytes) => {
            encode_length(bytes.len(), out)?;
            out.extend_from_slice(bytes);
        }
        FieldValue::Account(account) => {
            encode_length(account.account_id().len(), out)?;
            out.extend_from_slice(account.account_id());
        }
    }
    Ok(())
}

/// Serialize fields in canonical order.
///
/// With `signing_only`, fields flagged as signature fields are left out.
pub fn serialize(fields: &[(FieldId, FieldValue)], signing_only: bool) -> LedgerResult<Vec<u8>> {
    let mut sorted: Vec<&(FieldId, FieldValue)> = fields
        .iter()
        .filter(|(id, _)| !(signing_only && id.signature_field))
        .collect();
    sorted.sort_by_key(|(id, _)| (id.type_code, id.field_code));

    for pair in sorted.windows(2) {
        if pair[0].0.type_code == pair[1].0.type_code && pair[0].0.field_code == pair[1].0.field_code {
            return Err(LedgerError::InvalidTransaction(format!("duplicate field {}", pair[0].0.name)));
        }
    }

    let mut out = Vec::with_capacity(256);
    for (id, value) in sorted {
        encode_field_id(id, &mut out);
        encode_value(value, &mut out)?;
    }
    Ok(out)
}

/// First half of SHA-512, the ledger's standard hash.
pub fn sha512_half(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..32]);
    out
}
