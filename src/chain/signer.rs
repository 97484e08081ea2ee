//! Provider key management and extrinsic signing.
//!
//! # Security
//! - The private key is loaded ONLY from an environment variable
//! - Keys are never logged or serialized

use alloy::primitives::{keccak256, Address, Bytes, B256};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::Signer;

use crate::chain::types::{ChainError, ChainResult, Extrinsic, SignedExtrinsic};

/// Environment variable name for the provider's private key.
pub const PRIVATE_KEY_ENV_VAR: &str = "RELAY_PROVIDER_PRIVATE_KEY";

/// Signs extrinsics on behalf of the provider account.
#[derive(Debug, Clone)]
pub struct ProviderSigner {
    signer: PrivateKeySigner,
}

impl ProviderSigner {
    /// Create a signer from a hex-encoded private key (with or without 0x).
    pub fn from_private_key(private_key_hex: &str) -> ChainResult<Self> {
        let key_hex = private_key_hex.strip_prefix("0x").unwrap_or(private_key_hex);

        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| ChainError::Signer(format!("Invalid private key format: {}", e)))?;

        tracing::info!(address = %signer.address(), "Provider signer initialized");

        Ok(Self { signer })
    }

    /// Load the signer from `RELAY_PROVIDER_PRIVATE_KEY`.
    pub fn from_env() -> ChainResult<Self> {
        let private_key = std::env::var(PRIVATE_KEY_ENV_VAR).map_err(|_| {
            ChainError::Signer(format!("Environment variable {} not set", PRIVATE_KEY_ENV_VAR))
        })?;

        Self::from_private_key(&private_key)
    }

    /// The provider account's address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Payload hash covered by the signature: `keccak256(call || nonce_le)`.
    pub fn signing_payload(call: &Extrinsic, nonce: u64) -> B256 {
        let mut payload = Vec::with_capacity(call.0.len() + 8);
        payload.extend_from_slice(&call.0);
        payload.extend_from_slice(&nonce.to_le_bytes());
        keccak256(payload)
    }

    /// Sign `call` at `nonce`.
    pub async fn sign(&self, call: Extrinsic, nonce: u64) -> ChainResult<SignedExtrinsic> {
        let hash = Self::signing_payload(&call, nonce);
        let signature = self
            .signer
            .sign_hash(&hash)
            .await
            .map_err(|e| ChainError::Signer(format!("Signing failed: {}", e)))?;

        Ok(SignedExtrinsic {
            call,
            nonce,
            signer: self.address(),
            signature: Bytes::from(signature.as_bytes().to_vec()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key
    const TEST_PRIVATE_KEY: &str =
        "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_signer_from_private_key() {
        let signer = ProviderSigner::from_private_key(TEST_PRIVATE_KEY).unwrap();
        assert_eq!(
            signer.address().to_string().to_lowercase(),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );
        let prefixed = ProviderSigner::from_private_key(&format!("0x{}", TEST_PRIVATE_KEY)).unwrap();
        assert_eq!(prefixed.address(), signer.address());
    }

    #[test]
    fn test_invalid_private_key() {
        let result = ProviderSigner::from_private_key("invalid_key");
        assert!(result.unwrap_err().to_string().contains("Invalid private key"));
    }

    #[test]
    fn test_payload_binds_nonce() {
        let call = Extrinsic(Bytes::from_static(b"claim"));
        assert_ne!(
            ProviderSigner::signing_payload(&call, 1),
            ProviderSigner::signing_payload(&call, 2)
        );
    }

    #[tokio::test]
    async fn test_sign_extrinsic() {
        let signer = ProviderSigner::from_private_key(TEST_PRIVATE_KEY).unwrap();
        let signed = signer
            .sign(Extrinsic(Bytes::from_static(b"claim")), 7)
            .await
            .unwrap();
        assert_eq!(signed.nonce, 7);
        assert_eq!(signed.signer, signer.address());
        // r, s, v
        assert_eq!(signed.signature.len(), 65);
    }
}
