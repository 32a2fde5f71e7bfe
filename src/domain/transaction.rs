use ethers::types::{Address, Signature, H256};
use ethers::utils::keccak256;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Transaction identifier returned by (or derived for) the network
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(String);

impl TransactionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Custodial signer roles in the quorum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignerRole {
    /// Cloud key-management signer; pays fees
    Kms,
    /// Hardware security module co-signer
    Hsm,
}

impl SignerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignerRole::Kms => "kms",
            SignerRole::Hsm => "hsm",
        }
    }
}

impl std::fmt::Display for SignerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single venue-neutral operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub program: String,
    pub action: String,
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

impl Instruction {
    pub fn new(program: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            action: action.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.params.insert(key.to_string(), value.to_string());
        self
    }
}

/// Venue quote attached to a built transaction (not part of the signed message)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub quoted_output: Decimal,
    pub min_output: Decimal,
}

#[derive(Serialize)]
struct CanonicalMessage<'a> {
    venue: &'a str,
    instructions: &'a [Instruction],
    fee_payer: &'a Address,
    validity_anchor: &'a str,
    required_signers: &'a [Address],
}

/// Ready-to-sign transaction produced by a venue adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    pub venue: String,
    pub instructions: Vec<Instruction>,
    pub fee_payer: Address,
    /// Recent blockhash / sequence token bounding validity
    pub validity_anchor: String,
    /// Signers that must authorize, in order; the fee payer comes first
    pub required_signers: Vec<Address>,
    pub quote: Quote,
}

impl UnsignedTransaction {
    /// Canonical bytes every signer signs over
    pub fn message_bytes(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&CanonicalMessage {
            venue: &self.venue,
            instructions: &self.instructions,
            fee_payer: &self.fee_payer,
            validity_anchor: &self.validity_anchor,
            required_signers: &self.required_signers,
        })
    }

    pub fn digest(&self) -> serde_json::Result<H256> {
        Ok(H256::from(keccak256(self.message_bytes()?)))
    }
}

/// One custodian's signature over a transaction digest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureShare {
    pub role: SignerRole,
    pub signer: Address,
    pub signature: Signature,
    pub digest: H256,
}

impl SignatureShare {
    pub fn raw_bytes(&self) -> Vec<u8> {
        self.signature.to_vec()
    }
}

/// Fully authorized transaction.
///
/// Only the signer quorum constructs these, after both shares verified.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignedTransaction {
    unsigned: UnsignedTransaction,
    digest: H256,
    shares: Vec<SignatureShare>,
}

impl SignedTransaction {
    pub(crate) fn assemble(
        unsigned: UnsignedTransaction,
        digest: H256,
        shares: Vec<SignatureShare>,
    ) -> Self {
        Self {
            unsigned,
            digest,
            shares,
        }
    }

    pub fn unsigned(&self) -> &UnsignedTransaction {
        &self.unsigned
    }

    pub fn digest(&self) -> H256 {
        self.digest
    }

    pub fn shares(&self) -> &[SignatureShare] {
        &self.shares
    }

    /// Locally derived id, stable across resubmissions of the same bytes
    pub fn local_id(&self) -> TransactionId {
        let mut buf = self.digest.as_bytes().to_vec();
        for share in &self.shares {
            buf.extend_from_slice(&share.raw_bytes());
        }
        TransactionId(format!("0x{}", hex::encode(keccak256(buf))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn unsigned(anchor: &str) -> UnsignedTransaction {
        UnsignedTransaction {
            venue: "V1".into(),
            instructions: vec![Instruction::new("amm", "swap").param("amount_in", dec!(100))],
            fee_payer: Address::repeat_byte(1),
            validity_anchor: anchor.into(),
            required_signers: vec![Address::repeat_byte(1), Address::repeat_byte(2)],
            quote: Quote {
                quoted_output: dec!(95),
                min_output: dec!(94),
            },
        }
    }

    #[test]
    fn digest_is_deterministic_and_anchor_sensitive() {
        let a = unsigned("anchor-1").digest().unwrap();
        let b = unsigned("anchor-1").digest().unwrap();
        let c = unsigned("anchor-2").digest().unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn quote_is_not_part_of_signed_message() {
        let mut tx = unsigned("anchor-1");
        let before = tx.digest().unwrap();
        tx.quote.quoted_output = dec!(1);
        assert_eq!(before, tx.digest().unwrap());
    }
}
