//! Wallet signing capability.
//!
//! The engine never signs anything itself: it hands the nonce to a
//! [`WalletSigner`] and deals with the two ways a wallet prompt can fail
//! (the user declines, or the wallet goes away entirely). Production
//! deployments wrap a browser/hardware wallet; [`LocalSigner`] is the
//! in-process implementation used by the CLI and tests.

use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use secrecy::{ExposeSecret, SecretString};

use crate::error::{SignError, WalletError};
use crate::wallet;

/// Signs an opaque message on behalf of a connected wallet address.
#[async_trait]
pub trait WalletSigner: Send + Sync + 'static {
    /// Produce a signature over `message`.
    ///
    /// Fails with [`SignError::Rejected`] when the user declines the prompt
    /// and [`SignError::Disconnected`] when the wallet is gone.
    async fn sign(&self, message: &str) -> Result<String, SignError>;
}

/// In-process k256 signer for development and tests.
///
/// Produces 65-byte `0x` recoverable signatures over the EIP-191
/// `personal_sign` hash, the same encoding browser wallets emit.
pub struct LocalSigner {
    key: SigningKey,
    address: String,
}

impl LocalSigner {
    /// Build a signer from a `0x`-prefixed 32-byte private key.
    pub fn from_hex(key_hex: &SecretString) -> Result<Self, WalletError> {
        let bytes = wallet::decode_hex_prefixed(key_hex.expose_secret())?;
        let key = SigningKey::from_slice(&bytes).map_err(|e| WalletError::InvalidKey {
            reason: e.to_string(),
        })?;
        Self::from_signing_key(key)
    }

    /// Build a signer from an existing k256 key.
    pub fn from_signing_key(key: SigningKey) -> Result<Self, WalletError> {
        let address = wallet::address_from_verifying_key(key.verifying_key())?;
        Ok(Self { key, address })
    }

    /// The lowercase EVM address this signer controls.
    pub fn address(&self) -> &str {
        &self.address
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl WalletSigner for LocalSigner {
    async fn sign(&self, message: &str) -> Result<String, SignError> {
        let prehash = wallet::eip191_hash(message);
        // k256 signing over a fixed-size prehash cannot fail for a valid key.
        let (sig, recid) = self
            .key
            .sign_prehash_recoverable(&prehash)
            .map_err(|_| SignError::Disconnected)?;
        let mut bytes = sig.to_bytes().to_vec();
        bytes.push(recid.to_byte() + 27);
        Ok(format!("0x{}", wallet::encode_hex_lower(&bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_signer_signature_recovers_to_its_address() {
        let signer = LocalSigner::from_signing_key(SigningKey::random(&mut rand::thread_rng()))
            .expect("signer");

        let signature = signer.sign("nonce-123").await.expect("signature");
        assert!(signature.starts_with("0x"));
        assert_eq!(signature.len(), 2 + 65 * 2);
        assert_eq!(
            wallet::recover_address("nonce-123", &signature).expect("recover"),
            signer.address()
        );
    }

    #[test]
    fn from_hex_rejects_malformed_keys() {
        assert!(LocalSigner::from_hex(&SecretString::from("0x1234")).is_err());
        assert!(LocalSigner::from_hex(&SecretString::from("no-prefix")).is_err());
    }

    #[test]
    fn from_hex_accepts_well_known_dev_key() {
        let key = SecretString::from(
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        );
        let signer = LocalSigner::from_hex(&key).expect("signer");
        assert!(signer.address().starts_with("0x"));
        assert_eq!(signer.address().len(), 42);
        assert_eq!(signer.address(), signer.address().to_ascii_lowercase());
    }
}
