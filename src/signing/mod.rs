pub mod custodian;
pub mod quorum;
pub mod wallet;

pub use custodian::{CustodySigner, HsmClient, HsmCustodian, HsmSession, KmsClient, KmsCustodian};
pub use quorum::SignerQuorum;
pub use wallet::{LocalHsm, LocalKey, LocalKms, DEV_HSM_KEY, DEV_KMS_KEY};
