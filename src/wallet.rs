//! Wallet address and EIP-191 signing primitives.
//!
//! The session engine treats addresses as opaque, case-normalized
//! identifiers; the stricter EVM helpers here back the dev signer and the
//! signature tooling around it.

use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};
use sha3::{Digest, Keccak256};

use crate::error::WalletError;

/// Normalize a wallet address for use as a session identifier.
///
/// Addresses are opaque to the protocol: any non-empty string is accepted
/// and lowercased so that `0xABC` and `0xabc` name the same session.
pub fn normalize_address(value: &str) -> Result<String, WalletError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(WalletError::InvalidAddress {
            value: value.to_string(),
        });
    }
    Ok(trimmed.to_ascii_lowercase())
}

/// EIP-191 `personal_sign` prehash of a message.
pub fn eip191_hash(message: &str) -> [u8; 32] {
    let bytes = message.as_bytes();
    let prefix = format!("\x19Ethereum Signed Message:\n{}", bytes.len());
    let mut hasher = Keccak256::new();
    hasher.update(prefix.as_bytes());
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Recover the signing address from a 65-byte `0x` recoverable signature
/// over the EIP-191 hash of `message`.
pub fn recover_address(message: &str, signature_hex: &str) -> Result<String, WalletError> {
    let signature_bytes = decode_hex_prefixed(signature_hex)?;
    if signature_bytes.len() != 65 {
        return Err(WalletError::InvalidSignatureEncoding {
            reason: format!("expected 65 bytes, got {}", signature_bytes.len()),
        });
    }

    let sig = EcdsaSignature::try_from(&signature_bytes[..64]).map_err(|e| {
        WalletError::InvalidSignatureEncoding {
            reason: format!("invalid ECDSA signature bytes: {e}"),
        }
    })?;
    let recovery_id = normalize_recovery_id(signature_bytes[64])?;
    let prehash = eip191_hash(message);
    let verifying_key =
        VerifyingKey::recover_from_prehash(&prehash, &sig, recovery_id).map_err(|e| {
            WalletError::Recovery {
                reason: e.to_string(),
            }
        })?;
    address_from_verifying_key(&verifying_key)
}

/// Derive the lowercase `0x` EVM address of a verifying key.
pub(crate) fn address_from_verifying_key(key: &VerifyingKey) -> Result<String, WalletError> {
    let encoded = key.to_encoded_point(false);
    let pubkey = encoded.as_bytes();
    if pubkey.len() != 65 || pubkey[0] != 0x04 {
        return Err(WalletError::Recovery {
            reason: "unexpected public key encoding".to_string(),
        });
    }

    let mut hasher = Keccak256::new();
    hasher.update(&pubkey[1..]);
    let digest = hasher.finalize();
    Ok(format!("0x{}", encode_hex_lower(&digest[12..])))
}

fn normalize_recovery_id(raw: u8) -> Result<RecoveryId, WalletError> {
    let id = match raw {
        27 | 28 => raw - 27,
        0 | 1 => raw,
        _ => {
            return Err(WalletError::InvalidSignatureEncoding {
                reason: format!("recovery id must be 0/1 or 27/28, got {raw}"),
            });
        }
    };
    RecoveryId::try_from(id).map_err(|_| WalletError::InvalidSignatureEncoding {
        reason: "recovery id is invalid".to_string(),
    })
}

/// Decode a `0x`-prefixed hex string.
pub(crate) fn decode_hex_prefixed(value: &str) -> Result<Vec<u8>, WalletError> {
    let trimmed = value.trim();
    let hex = trimmed
        .strip_prefix("0x")
        .ok_or_else(|| WalletError::InvalidSignatureEncoding {
            reason: "hex string must be 0x-prefixed".to_string(),
        })?;
    if hex.is_empty() || hex.len() % 2 != 0 {
        return Err(WalletError::InvalidSignatureEncoding {
            reason: "hex string must have a non-zero, even number of characters".to_string(),
        });
    }

    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| {
                WalletError::InvalidSignatureEncoding {
                    reason: "invalid hex character".to_string(),
                }
            })
        })
        .collect()
}

/// Encode bytes as lowercase hex, no prefix.
pub(crate) fn encode_hex_lower(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;

    #[test]
    fn addresses_are_case_normalized_and_opaque() {
        assert_eq!(normalize_address("0xABC").expect("valid"), "0xabc");
        assert_eq!(
            normalize_address("  0x9431Cf5DA0CE60664661341db650763B08286B18 ").expect("valid"),
            "0x9431cf5da0ce60664661341db650763b08286b18"
        );
        assert!(normalize_address("   ").is_err());
    }

    #[test]
    fn hex_round_trip() {
        let bytes = decode_hex_prefixed("0xdeadBEEF").expect("decode");
        assert_eq!(bytes, vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(encode_hex_lower(&bytes), "deadbeef");
        assert!(decode_hex_prefixed("deadbeef").is_err());
        assert!(decode_hex_prefixed("0xabc").is_err());
    }

    #[test]
    fn recovers_signer_address_from_eip191_signature() {
        let signing_key = SigningKey::random(&mut rand::thread_rng());
        let wallet = address_from_verifying_key(signing_key.verifying_key()).expect("wallet");

        let message = "walletgate test nonce";
        let prehash = eip191_hash(message);
        let (sig, recid) = signing_key
            .sign_prehash_recoverable(&prehash)
            .expect("sign message");
        let mut sig_bytes = sig.to_bytes().to_vec();
        sig_bytes.push(recid.to_byte() + 27);
        let signature = format!("0x{}", encode_hex_lower(&sig_bytes));

        assert_eq!(recover_address(message, &signature).expect("recover"), wallet);
        assert_ne!(
            recover_address("a different message", &signature).expect("recover"),
            wallet
        );
    }

    #[test]
    fn rejects_malformed_signatures() {
        assert!(recover_address("msg", "0xabcd").is_err());
        let bad_recid = format!("0x{}{:02x}", "11".repeat(64), 9u8);
        assert!(recover_address("msg", &bad_recid).is_err());
    }
}
