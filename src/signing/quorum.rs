//! Dual-custody signer quorum.
//!
//! Both custodians sign the same digest as separate, ordered transaction
//! signers (fee payer first). Shares are never combined into one blob and a
//! single missing or invalid share fails the whole transaction.

use ethers::types::{Address, H256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{error, info};

use super::custodian::CustodySigner;
use crate::domain::{SignatureShare, SignedTransaction, SignerRole, UnsignedTransaction};
use crate::error::SigningError;

pub struct SignerQuorum {
    kms: Arc<dyn CustodySigner>,
    hsm: Arc<dyn CustodySigner>,
    call_timeout: Duration,
}

impl SignerQuorum {
    pub fn new(
        kms: Arc<dyn CustodySigner>,
        hsm: Arc<dyn CustodySigner>,
        call_timeout: Duration,
    ) -> Result<Self, SigningError> {
        if kms.role() != SignerRole::Kms || hsm.role() != SignerRole::Hsm {
            return Err(SigningError::SignerSetMismatch(format!(
                "expected kms+hsm, got {}+{}",
                kms.role(),
                hsm.role()
            )));
        }
        if kms.address() == hsm.address() {
            return Err(SigningError::SignerSetMismatch(
                "custodians share one key".to_string(),
            ));
        }
        Ok(Self {
            kms,
            hsm,
            call_timeout,
        })
    }

    /// Address that pays fees and signs first
    pub fn fee_payer(&self) -> Address {
        self.kms.address()
    }

    /// Signers required after the fee payer
    pub fn co_signers(&self) -> Vec<Address> {
        vec![self.hsm.address()]
    }

    pub fn required_signers(&self) -> Vec<Address> {
        vec![self.kms.address(), self.hsm.address()]
    }

    /// Collect and verify both shares; all-or-nothing.
    pub async fn sign(&self, unsigned: &UnsignedTransaction) -> Result<SignedTransaction, SigningError> {
        if unsigned.fee_payer != self.kms.address() {
            return Err(SigningError::FeePayerMismatch {
                fee_payer: format!("{:?}", unsigned.fee_payer),
            });
        }
        if unsigned.required_signers != self.required_signers() {
            return Err(SigningError::SignerSetMismatch(format!(
                "transaction requires {} signers not matching the quorum",
                unsigned.required_signers.len()
            )));
        }

        let digest = unsigned
            .digest()
            .map_err(|e| SigningError::Encoding(e.to_string()))?;

        // Both custodians are asked concurrently; neither result is used alone.
        let (kms_share, hsm_share) = tokio::join!(
            self.collect(self.kms.as_ref(), digest),
            self.collect(self.hsm.as_ref(), digest),
        );

        let shares = match (kms_share, hsm_share) {
            (Ok(kms), Ok(hsm)) => vec![kms, hsm],
            (Err(e), _) | (_, Err(e)) => {
                error!(%digest, error = %e, "Custody quorum not reached");
                return Err(e);
            }
        };

        info!(%digest, venue = %unsigned.venue, "Transaction authorized by kms+hsm");
        Ok(SignedTransaction::assemble(unsigned.clone(), digest, shares))
    }

    async fn collect(
        &self,
        signer: &dyn CustodySigner,
        digest: H256,
    ) -> Result<SignatureShare, SigningError> {
        let role = signer.role();
        let start = Instant::now();

        let signature = match timeout(self.call_timeout, signer.sign_digest(digest)).await {
            Ok(Ok(signature)) => signature,
            Ok(Err(e)) => {
                return Err(SigningError::SignerUnavailable {
                    role,
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(SigningError::SignerTimeout {
                    role,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                })
            }
        };

        signature
            .verify(digest, signer.address())
            .map_err(|e| SigningError::InvalidShare {
                role,
                reason: e.to_string(),
            })?;

        Ok(SignatureShare {
            role,
            signer: signer.address(),
            signature,
            digest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Instruction, Quote};
    use crate::error::CollaboratorError;
    use crate::signing::wallet::{LocalKey, DEV_HSM_KEY, DEV_KMS_KEY};
    use async_trait::async_trait;
    use ethers::types::Signature;
    use rust_decimal_macros::dec;

    enum Behaviour {
        Honest(LocalKey),
        Fails,
        /// Signs with a key other than the advertised one
        WrongKey { advertised: Address, key: LocalKey },
        Hangs,
    }

    struct TestSigner {
        role: SignerRole,
        behaviour: Behaviour,
    }

    #[async_trait]
    impl CustodySigner for TestSigner {
        fn role(&self) -> SignerRole {
            self.role
        }

        fn address(&self) -> Address {
            match &self.behaviour {
                Behaviour::Honest(key) => key.address(),
                Behaviour::WrongKey { advertised, .. } => *advertised,
                Behaviour::Fails | Behaviour::Hangs => Address::repeat_byte(0xee),
            }
        }

        async fn sign_digest(&self, digest: H256) -> Result<Signature, CollaboratorError> {
            match &self.behaviour {
                Behaviour::Honest(key) | Behaviour::WrongKey { key, .. } => key
                    .sign_hash(digest)
                    .map_err(|e| CollaboratorError::unavailable("test", e)),
                Behaviour::Fails => Err(CollaboratorError::unavailable("test", "down")),
                Behaviour::Hangs => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(CollaboratorError::unavailable("test", "never"))
                }
            }
        }
    }

    fn kms() -> Arc<dyn CustodySigner> {
        Arc::new(TestSigner {
            role: SignerRole::Kms,
            behaviour: Behaviour::Honest(LocalKey::from_private_key(DEV_KMS_KEY).unwrap()),
        })
    }

    fn hsm(behaviour: Behaviour) -> Arc<dyn CustodySigner> {
        Arc::new(TestSigner {
            role: SignerRole::Hsm,
            behaviour,
        })
    }

    fn honest_hsm_key() -> LocalKey {
        LocalKey::from_private_key(DEV_HSM_KEY).unwrap()
    }

    fn unsigned_for(quorum: &SignerQuorum) -> UnsignedTransaction {
        UnsignedTransaction {
            venue: "V1".into(),
            instructions: vec![Instruction::new("cpmm", "swap")],
            fee_payer: quorum.fee_payer(),
            validity_anchor: "slot-1".into(),
            required_signers: quorum.required_signers(),
            quote: Quote {
                quoted_output: dec!(95),
                min_output: dec!(94),
            },
        }
    }

    #[tokio::test]
    async fn both_shares_verify_and_keep_order() {
        let quorum = SignerQuorum::new(kms(), hsm(Behaviour::Honest(honest_hsm_key())), Duration::from_secs(1)).unwrap();
        let unsigned = unsigned_for(&quorum);

        let signed = quorum.sign(&unsigned).await.unwrap();
        let shares = signed.shares();
        assert_eq!(shares.len(), 2);
        assert_eq!(shares[0].role, SignerRole::Kms);
        assert_eq!(shares[1].role, SignerRole::Hsm);
        assert_eq!(shares[0].digest, shares[1].digest);
        assert_eq!(signed.digest(), unsigned.digest().unwrap());
        assert_ne!(shares[0].raw_bytes(), shares[1].raw_bytes());
    }

    #[tokio::test]
    async fn failing_hsm_fails_the_quorum() {
        let quorum = SignerQuorum::new(kms(), hsm(Behaviour::Fails), Duration::from_secs(1)).unwrap();
        let err = quorum.sign(&unsigned_for(&quorum)).await.unwrap_err();
        assert!(matches!(
            err,
            SigningError::SignerUnavailable {
                role: SignerRole::Hsm,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn share_from_unexpected_key_is_invalid() {
        let behaviour = Behaviour::WrongKey {
            advertised: Address::repeat_byte(0x42),
            key: honest_hsm_key(),
        };
        let quorum = SignerQuorum::new(kms(), hsm(behaviour), Duration::from_secs(1)).unwrap();
        let err = quorum.sign(&unsigned_for(&quorum)).await.unwrap_err();
        assert!(matches!(
            err,
            SigningError::InvalidShare {
                role: SignerRole::Hsm,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn hung_signer_times_out() {
        let quorum = SignerQuorum::new(kms(), hsm(Behaviour::Hangs), Duration::from_millis(250)).unwrap();
        let err = quorum.sign(&unsigned_for(&quorum)).await.unwrap_err();
        assert!(matches!(
            err,
            SigningError::SignerTimeout {
                role: SignerRole::Hsm,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn foreign_fee_payer_is_refused_before_signing() {
        let quorum = SignerQuorum::new(kms(), hsm(Behaviour::Fails), Duration::from_secs(1)).unwrap();
        let mut unsigned = unsigned_for(&quorum);
        unsigned.fee_payer = Address::repeat_byte(9);
        assert!(matches!(
            quorum.sign(&unsigned).await,
            Err(SigningError::FeePayerMismatch { .. })
        ));
    }

    #[test]
    fn quorum_requires_one_signer_per_role() {
        let result = SignerQuorum::new(kms(), kms(), Duration::from_secs(1));
        assert!(matches!(result, Err(SigningError::SignerSetMismatch(_))));
    }
}
