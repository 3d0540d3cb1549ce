//! Trading key loading and transaction signing.
//!
//! Transactions are legacy (EIP-155) since the gateway quotes a single gas
//! price. The private key never leaves `PrivateKeySigner` and is never logged.

use std::path::PathBuf;

use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, Bytes, TxKind, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use thiserror::Error;
use zeroize::Zeroizing;

use crate::error::{ExecutorError, ExecutorResult};
use crate::traits::TransactionSigner;

const WEI_PER_GWEI: u128 = 1_000_000_000;

// =============================================================================
// KeySource and KeyManager
// =============================================================================

/// Source of the private key.
#[derive(Debug, Clone)]
pub enum KeySource {
    /// Hex key in an environment variable.
    EnvVar { var_name: String },
    /// Hex key in a file (recommend 0600 permissions).
    File { path: PathBuf },
}

/// Loads the trading key once at startup.
pub struct KeyManager {
    signer: PrivateKeySigner,
}

impl KeyManager {
    /// Load the key and, if given, check it derives `expected_address`.
    pub fn load(source: KeySource, expected_address: Option<Address>) -> Result<Self, KeyError> {
        let secret_bytes: Zeroizing<Vec<u8>> = match source {
            KeySource::EnvVar { ref var_name } => {
                let hex = Zeroizing::new(
                    std::env::var(var_name).map_err(|_| KeyError::EnvVarNotFound(var_name.clone()))?,
                );
                parse_hex_key(&hex)?
            }
            KeySource::File { ref path } => {
                let content = Zeroizing::new(std::fs::read_to_string(path)?);
                parse_hex_key(&content)?
            }
        };
        Self::from_bytes(&secret_bytes, expected_address)
    }

    pub fn from_bytes(secret_bytes: &[u8], expected_address: Option<Address>) -> Result<Self, KeyError> {
        let signer = PrivateKeySigner::from_slice(secret_bytes)
            .map_err(|e| KeyError::InvalidKey(e.to_string()))?;

        if let Some(expected) = expected_address {
            if signer.address() != expected {
                return Err(KeyError::AddressMismatch {
                    expected,
                    actual: signer.address(),
                });
            }
        }

        Ok(Self { signer })
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Consume the manager into a chain-bound signer.
    pub fn into_signer(self, chain_id: u64) -> LocalSigner {
        LocalSigner {
            signer: self.signer,
            chain_id,
        }
    }
}

/// Accepts an optional 0x prefix and surrounding whitespace.
fn parse_hex_key(hex_str: &str) -> Result<Zeroizing<Vec<u8>>, KeyError> {
    let trimmed = hex_str.trim().trim_start_matches("0x");
    Ok(Zeroizing::new(hex::decode(trimmed)?))
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Failed to decode hex: {0}")]
    HexDecode(#[from] hex::FromHexError),

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Address mismatch: expected {expected}, got {actual}")]
    AddressMismatch { expected: Address, actual: Address },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Transactions
// =============================================================================

/// Contract call ready to be signed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub nonce: u64,
    /// Gwei.
    pub gas_price: u64,
    pub gas_limit: u64,
    pub to: Address,
    pub data: Bytes,
}

/// EIP-2718 encoded transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// 0x-prefixed hex of the raw transaction.
    pub raw_hex: String,
    pub hash: B256,
}

/// In-process signer for one chain.
pub struct LocalSigner {
    signer: PrivateKeySigner,
    chain_id: u64,
}

impl LocalSigner {
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

impl TransactionSigner for LocalSigner {
    fn address(&self) -> Address {
        self.signer.address()
    }

    fn sign(&self, tx: UnsignedTransaction) -> ExecutorResult<SignedTransaction> {
        let gas_price = u128::from(tx.gas_price)
            .checked_mul(WEI_PER_GWEI)
            .ok_or_else(|| ExecutorError::Signing(format!("gas price overflow: {}", tx.gas_price)))?;

        let mut legacy = TxLegacy {
            chain_id: Some(self.chain_id),
            nonce: tx.nonce,
            gas_price,
            gas_limit: tx.gas_limit,
            to: TxKind::Call(tx.to),
            value: U256::ZERO,
            input: tx.data,
        };

        let sig = TxSignerSync::sign_transaction_sync(&self.signer, &mut legacy)
            .map_err(|e| ExecutorError::Signing(e.to_string()))?;
        let signed: TxEnvelope = legacy.into_signed(sig).into();
        let raw = signed.encoded_2718();

        Ok(SignedTransaction {
            raw_hex: format!("0x{}", hex::encode(raw)),
            hash: *signed.tx_hash(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Well-known development key (DO NOT use in production)
    const TEST_PRIVATE_KEY: &str =
        "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const TEST_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn test_key_bytes() -> Vec<u8> {
        hex::decode(TEST_PRIVATE_KEY.trim_start_matches("0x")).unwrap()
    }

    fn sample_tx() -> UnsignedTransaction {
        UnsignedTransaction {
            nonce: 7,
            gas_price: 50,
            gas_limit: 60_000,
            to: Address::repeat_byte(0x11),
            data: Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]),
        }
    }

    #[test]
    fn test_key_manager_from_bytes() {
        let expected: Address = TEST_ADDRESS.parse().unwrap();
        let manager = KeyManager::from_bytes(&test_key_bytes(), Some(expected)).unwrap();
        assert_eq!(manager.address(), expected);
    }

    #[test]
    fn test_key_manager_address_mismatch() {
        let result = KeyManager::from_bytes(&test_key_bytes(), Some(Address::ZERO));
        assert!(matches!(result, Err(KeyError::AddressMismatch { .. })));
    }

    #[test]
    fn test_parse_hex_key_trims_prefix_and_whitespace() {
        let key = parse_hex_key(&format!("  {TEST_PRIVATE_KEY}\n")).unwrap();
        assert_eq!(key.as_slice(), test_key_bytes().as_slice());
        assert!(matches!(parse_hex_key("0xzz"), Err(KeyError::HexDecode(_))));
    }

    #[test]
    fn test_load_missing_env_var() {
        let result = KeyManager::load(
            KeySource::EnvVar {
                var_name: "PEG_TEST_KEY_THAT_DOES_NOT_EXIST".to_string(),
            },
            None,
        );
        assert!(matches!(result, Err(KeyError::EnvVarNotFound(_))));
    }

    #[test]
    fn test_sign_produces_raw_legacy_tx() {
        let signer = KeyManager::from_bytes(&test_key_bytes(), None)
            .unwrap()
            .into_signer(137);
        let signed = signer.sign(sample_tx()).unwrap();

        assert!(signed.raw_hex.starts_with("0x"));
        // Legacy envelopes are plain RLP lists.
        let first = u8::from_str_radix(&signed.raw_hex[2..4], 16).unwrap();
        assert!(first >= 0xc0);
        assert_ne!(signed.hash, B256::ZERO);
    }

    #[test]
    fn test_sign_is_deterministic_per_nonce() {
        let signer = KeyManager::from_bytes(&test_key_bytes(), None)
            .unwrap()
            .into_signer(137);
        let a = signer.sign(sample_tx()).unwrap();
        let b = signer.sign(sample_tx()).unwrap();
        assert_eq!(a, b);

        let mut other = sample_tx();
        other.nonce += 1;
        assert_ne!(signer.sign(other).unwrap().hash, a.hash);
    }
}
