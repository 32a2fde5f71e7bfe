use async_trait::async_trait;
use ethers::types::{Address, Signature, H256};
use std::sync::Arc;
use tracing::debug;

use crate::domain::SignerRole;
use crate::error::CollaboratorError;

/// Cloud key-management signer, keyed by key identifier
#[async_trait]
pub trait KmsClient: Send + Sync {
    async fn sign(&self, key_id: &str, digest: H256) -> Result<Signature, CollaboratorError>;
}

/// Hardware security module reachable through per-slot sessions
#[async_trait]
pub trait HsmClient: Send + Sync {
    async fn open_session(&self, slot: u64) -> Result<Box<dyn HsmSession>, CollaboratorError>;
}

#[async_trait]
pub trait HsmSession: Send + Sync {
    async fn sign(&self, digest: H256) -> Result<Signature, CollaboratorError>;
}

/// One member of the custody quorum
#[async_trait]
pub trait CustodySigner: Send + Sync {
    fn role(&self) -> SignerRole;

    /// Known public identity the share must verify against
    fn address(&self) -> Address;

    async fn sign_digest(&self, digest: H256) -> Result<Signature, CollaboratorError>;
}

pub struct KmsCustodian {
    client: Arc<dyn KmsClient>,
    key_id: String,
    address: Address,
}

impl KmsCustodian {
    pub fn new(client: Arc<dyn KmsClient>, key_id: impl Into<String>, address: Address) -> Self {
        Self {
            client,
            key_id: key_id.into(),
            address,
        }
    }
}

#[async_trait]
impl CustodySigner for KmsCustodian {
    fn role(&self) -> SignerRole {
        SignerRole::Kms
    }

    fn address(&self) -> Address {
        self.address
    }

    async fn sign_digest(&self, digest: H256) -> Result<Signature, CollaboratorError> {
        debug!(key_id = %self.key_id, %digest, "Requesting KMS signature");
        self.client.sign(&self.key_id, digest).await
    }
}

pub struct HsmCustodian {
    client: Arc<dyn HsmClient>,
    slot: u64,
    address: Address,
}

impl HsmCustodian {
    pub fn new(client: Arc<dyn HsmClient>, slot: u64, address: Address) -> Self {
        Self {
            client,
            slot,
            address,
        }
    }
}

#[async_trait]
impl CustodySigner for HsmCustodian {
    fn role(&self) -> SignerRole {
        SignerRole::Hsm
    }

    fn address(&self) -> Address {
        self.address
    }

    async fn sign_digest(&self, digest: H256) -> Result<Signature, CollaboratorError> {
        debug!(slot = self.slot, %digest, "Opening HSM session");
        let session = self.client.open_session(self.slot).await?;
        session.sign(digest).await
    }
}
