use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer as EthersSigner};
use ethers::types::{Address, Signature, H256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};
use zeroize::Zeroize;

use super::custodian::{HsmClient, HsmSession, KmsClient};
use crate::error::{CollaboratorError, Result, TradegateError};

/// Well-known development keys; never fund these
pub const DEV_KMS_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
pub const DEV_HSM_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

/// In-process secp256k1 key standing in for a custodial key
///
/// # Security
/// The private key string is zeroized after parsing and never stored.
#[derive(Clone)]
pub struct LocalKey {
    inner: LocalWallet,
}

impl LocalKey {
    pub fn from_private_key(private_key: &str) -> Result<Self> {
        let mut secure_key = private_key.trim_start_matches("0x").to_string();

        let parsed = secure_key
            .parse::<LocalWallet>()
            .map_err(|e| TradegateError::Wallet(format!("Invalid private key: {}", e)));

        secure_key.zeroize();
        let inner = parsed?;

        info!("Local key loaded: {:?}", inner.address());
        Ok(Self { inner })
    }

    /// Read the key from `var`, falling back to `dev_default` with a warning
    pub fn from_env_or(var: &str, dev_default: &str) -> Result<Self> {
        match std::env::var(var) {
            Ok(mut private_key) => {
                let result = Self::from_private_key(&private_key);
                private_key.zeroize();
                result
            }
            Err(_) => {
                warn!("{} not set, using development key (paper mode only)", var);
                Self::from_private_key(dev_default)
            }
        }
    }

    pub fn address(&self) -> Address {
        self.inner.address()
    }

    pub fn sign_hash(&self, hash: H256) -> std::result::Result<Signature, String> {
        self.inner
            .sign_hash(hash)
            .map_err(|e| format!("Failed to sign hash: {}", e))
    }
}

impl std::fmt::Debug for LocalKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKey")
            .field("address", &self.address())
            .finish()
    }
}

/// Key-management service backed by local keys
#[derive(Debug, Default)]
pub struct LocalKms {
    keys: HashMap<String, LocalKey>,
}

impl LocalKms {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, key_id: impl Into<String>, key: LocalKey) -> Self {
        self.keys.insert(key_id.into(), key);
        self
    }

    pub fn address_of(&self, key_id: &str) -> Option<Address> {
        self.keys.get(key_id).map(LocalKey::address)
    }
}

#[async_trait]
impl KmsClient for LocalKms {
    async fn sign(&self, key_id: &str, digest: H256) -> std::result::Result<Signature, CollaboratorError> {
        let key = self
            .keys
            .get(key_id)
            .ok_or_else(|| CollaboratorError::rejected("kms", format!("unknown key {key_id}")))?;
        key.sign_hash(digest)
            .map_err(|e| CollaboratorError::unavailable("kms", e))
    }
}

/// HSM emulator: one local key per slot, switchable offline
#[derive(Debug, Default)]
pub struct LocalHsm {
    slots: HashMap<u64, LocalKey>,
    offline: AtomicBool,
}

impl LocalHsm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_slot(mut self, slot: u64, key: LocalKey) -> Self {
        self.slots.insert(slot, key);
        self
    }

    pub fn address_of(&self, slot: u64) -> Option<Address> {
        self.slots.get(&slot).map(LocalKey::address)
    }

    /// Simulate the device being unreachable
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

struct LocalHsmSession {
    key: LocalKey,
}

#[async_trait]
impl HsmClient for LocalHsm {
    async fn open_session(&self, slot: u64) -> std::result::Result<Box<dyn HsmSession>, CollaboratorError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CollaboratorError::unavailable("hsm", "device offline"));
        }
        let key = self
            .slots
            .get(&slot)
            .cloned()
            .ok_or_else(|| CollaboratorError::rejected("hsm", format!("empty slot {slot}")))?;
        Ok(Box::new(LocalHsmSession { key }))
    }
}

#[async_trait]
impl HsmSession for LocalHsmSession {
    async fn sign(&self, digest: H256) -> std::result::Result<Signature, CollaboratorError> {
        self.key
            .sign_hash(digest)
            .map_err(|e| CollaboratorError::unavailable("hsm", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_key_has_well_known_address() {
        let key = LocalKey::from_private_key(DEV_KMS_KEY).unwrap();
        assert_eq!(
            format!("{:?}", key.address()),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
    }

    #[test]
    fn rejects_garbage_key() {
        assert!(matches!(
            LocalKey::from_private_key("0xnot-hex"),
            Err(TradegateError::Wallet(_))
        ));
    }

    #[tokio::test]
    async fn offline_hsm_refuses_sessions() {
        let hsm = LocalHsm::new().with_slot(0, LocalKey::from_private_key(DEV_HSM_KEY).unwrap());
        assert!(hsm.open_session(0).await.is_ok());
        assert!(hsm.open_session(1).await.is_err());

        hsm.set_offline(true);
        assert!(hsm.open_session(0).await.is_err());
    }

    #[tokio::test]
    async fn kms_signature_recovers_to_key_address() {
        let key = LocalKey::from_private_key(DEV_KMS_KEY).unwrap();
        let address = key.address();
        let kms = LocalKms::new().with_key("fee-payer", key);

        let digest = H256::repeat_byte(7);
        let sig = kms.sign("fee-payer", digest).await.unwrap();
        assert!(sig.verify(digest, address).is_ok());
        assert!(kms.sign("other", digest).await.is_err());
    }
}
