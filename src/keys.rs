//! Key pairs and the signer capability
//!
//! A `KeyPair` holds either a private scalar (public point derived lazily and
//! cached) or only a public point. The `Signer`/`AsyncSigner` traits are the
//! capability PSBT signing consumes: an external device or custodian can
//! implement them without exposing key material.

use std::sync::OnceLock;

use secp256k1::{Keypair, Message, PublicKey, Secp256k1, SecretKey};

use crate::error::{Result, TxError};
use crate::network::{NetworkParams, BITCOIN};
use crate::signature::{EcdsaSignature, SchnorrSignature};
use crate::types::Hash;

/// Blocking signer capability: a public key plus `sign` over a 32-byte digest
pub trait Signer {
    fn public_key(&self) -> Vec<u8>;
    fn sign(&self, hash: &Hash) -> Result<EcdsaSignature>;
}

/// Deferred signer capability for externally mediated signers (hardware
/// devices, remote custodians). Completion has the same side effect as the
/// blocking form: exactly one partial signature inserted.
#[allow(async_fn_in_trait)]
pub trait AsyncSigner {
    fn public_key(&self) -> Vec<u8>;
    async fn sign(&self, hash: &Hash) -> Result<EcdsaSignature>;
}

/// secp256k1 key pair with presentation attributes (compression flag,
/// network parameter set)
#[derive(Debug, Clone)]
pub struct KeyPair {
    secret: Option<SecretKey>,
    public: OnceLock<PublicKey>,
    pub compressed: bool,
    pub network: NetworkParams,
}

impl KeyPair {
    /// Construct from a 32-byte private scalar; rejects zero or >= group
    /// order. The public point is derived on first use and cached.
    pub fn from_secret_bytes(
        bytes: &[u8; 32],
        compressed: bool,
        network: NetworkParams,
    ) -> Result<Self> {
        let secret = SecretKey::from_slice(bytes).map_err(|_| {
            TxError::PolicyViolation("Private key out of range [1, n - 1]".to_string())
        })?;
        Ok(KeyPair {
            secret: Some(secret),
            public: OnceLock::new(),
            compressed,
            network,
        })
    }

    /// Watch-only form: public point only, no signing capability
    pub fn from_public_bytes(bytes: &[u8], network: NetworkParams) -> Result<Self> {
        let public = PublicKey::from_slice(bytes)
            .map_err(|e| TxError::MalformedInput(format!("Invalid public key: {}", e)))?;
        let cell = OnceLock::new();
        let _ = cell.set(public);
        Ok(KeyPair {
            secret: None,
            public: cell,
            compressed: bytes.len() == 33,
            network,
        })
    }

    pub fn with_network(mut self, network: NetworkParams) -> Self {
        self.network = network;
        self
    }

    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    /// Cached public point; computed once from the secret, never recomputed
    fn public_point(&self) -> &PublicKey {
        self.public.get_or_init(|| {
            let secp = Secp256k1::new();
            // invariant: a KeyPair without a cached point always has a secret
            PublicKey::from_secret_key(&secp, self.secret.as_ref().unwrap())
        })
    }

    /// Point encoding per the compression flag: 33 or 65 bytes
    pub fn public_key_bytes(&self) -> Vec<u8> {
        if self.compressed {
            self.public_point().serialize().to_vec()
        } else {
            self.public_point().serialize_uncompressed().to_vec()
        }
    }

    /// RFC6979 deterministic ECDSA over a 32-byte digest; low-S by
    /// construction
    pub fn sign_ecdsa(&self, hash: &Hash) -> Result<EcdsaSignature> {
        let secret = self.secret.as_ref().ok_or_else(|| {
            TxError::PolicyViolation("Cannot sign with a public-only key pair".to_string())
        })?;
        let secp = Secp256k1::new();
        let message = Message::from_digest_slice(hash)
            .map_err(|e| TxError::Signing(e.to_string()))?;
        let compact = secp.sign_ecdsa(&message, secret).serialize_compact();
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&compact[..32]);
        s.copy_from_slice(&compact[32..]);
        EcdsaSignature::new(r, s)
    }

    /// BIP340 Schnorr signature over a 32-byte digest
    pub fn sign_schnorr(&self, hash: &Hash) -> Result<SchnorrSignature> {
        let secret = self.secret.as_ref().ok_or_else(|| {
            TxError::PolicyViolation("Cannot sign with a public-only key pair".to_string())
        })?;
        let secp = Secp256k1::new();
        let keypair = Keypair::from_secret_key(&secp, secret);
        let message = Message::from_digest_slice(hash)
            .map_err(|e| TxError::Signing(e.to_string()))?;
        let signature = secp.sign_schnorr_no_aux_rand(&message, &keypair);
        SchnorrSignature::from_slice(signature.as_ref())
    }
}

impl Signer for KeyPair {
    fn public_key(&self) -> Vec<u8> {
        self.public_key_bytes()
    }

    fn sign(&self, hash: &Hash) -> Result<EcdsaSignature> {
        self.sign_ecdsa(hash)
    }
}

impl AsyncSigner for KeyPair {
    fn public_key(&self) -> Vec<u8> {
        self.public_key_bytes()
    }

    async fn sign(&self, hash: &Hash) -> Result<EcdsaSignature> {
        self.sign_ecdsa(hash)
    }
}

impl Default for KeyPair {
    fn default() -> Self {
        KeyPair {
            secret: None,
            public: OnceLock::new(),
            compressed: true,
            network: BITCOIN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::SECP256K1_ORDER;

    fn test_secret() -> [u8; 32] {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        bytes
    }

    #[test]
    fn test_from_secret_rejects_bad_magnitude() {
        assert!(matches!(
            KeyPair::from_secret_bytes(&[0u8; 32], true, BITCOIN),
            Err(TxError::PolicyViolation(_))
        ));
        assert!(KeyPair::from_secret_bytes(&SECP256K1_ORDER, true, BITCOIN).is_err());
    }

    #[test]
    fn test_public_key_derivation_generator() {
        // d = 1 gives the generator point
        let pair = KeyPair::from_secret_bytes(&test_secret(), true, BITCOIN).unwrap();
        assert_eq!(
            hex::encode(pair.public_key_bytes()),
            "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798"
        );
        let uncompressed = KeyPair::from_secret_bytes(&test_secret(), false, BITCOIN).unwrap();
        assert_eq!(uncompressed.public_key_bytes().len(), 65);
        assert_eq!(uncompressed.public_key_bytes()[0], 0x04);
    }

    #[test]
    fn test_public_only_pair_cannot_sign() {
        let pair = KeyPair::from_secret_bytes(&test_secret(), true, BITCOIN).unwrap();
        let watch = KeyPair::from_public_bytes(&pair.public_key_bytes(), BITCOIN).unwrap();
        assert!(!watch.has_secret());
        assert_eq!(watch.public_key_bytes(), pair.public_key_bytes());
        assert!(matches!(
            watch.sign_ecdsa(&[0x42; 32]),
            Err(TxError::PolicyViolation(_))
        ));
    }

    #[test]
    fn test_sign_is_deterministic_and_low_s() {
        let pair = KeyPair::from_secret_bytes(&[0x55; 32], true, BITCOIN).unwrap();
        let first = pair.sign_ecdsa(&[0x42; 32]).unwrap();
        let second = pair.sign_ecdsa(&[0x42; 32]).unwrap();
        assert_eq!(first, second);
        assert!(first.is_low_s());
    }

    #[test]
    fn test_signature_verifies() {
        let secp = Secp256k1::new();
        let pair = KeyPair::from_secret_bytes(&[0x55; 32], true, BITCOIN).unwrap();
        let hash = [0x42u8; 32];
        let sig = pair.sign_ecdsa(&hash).unwrap();

        let mut compact = [0u8; 64];
        compact[..32].copy_from_slice(&sig.r);
        compact[32..].copy_from_slice(&sig.s);
        let secp_sig = secp256k1::ecdsa::Signature::from_compact(&compact).unwrap();
        let message = Message::from_digest_slice(&hash).unwrap();
        let public = PublicKey::from_slice(&pair.public_key_bytes()).unwrap();
        assert!(secp.verify_ecdsa(&message, &secp_sig, &public).is_ok());
    }

    #[test]
    fn test_schnorr_signature_length() {
        let pair = KeyPair::from_secret_bytes(&[0x55; 32], true, BITCOIN).unwrap();
        let sig = pair.sign_schnorr(&[0x42; 32]).unwrap();
        assert_eq!(sig.0.len(), 64);
    }
}
