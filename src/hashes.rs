//! Digest helpers shared by the codec, taproot and PSBT layers

use bitcoin_hashes::{sha256d, Hash as BitcoinHash, HashEngine};
use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

use crate::types::Hash;

/// Single SHA-256
pub fn sha256(data: &[u8]) -> Hash {
    let digest = Sha256::digest(data);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&digest);
    hash
}

/// Double SHA-256
pub fn hash256(data: &[u8]) -> Hash {
    let mut engine = sha256d::Hash::engine();
    engine.input(data);
    let result = sha256d::Hash::from_engine(engine);
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// RIPEMD-160 of SHA-256
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    let ripemd = Ripemd160::digest(sha);
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&ripemd);
    hash
}

/// BIP340 tagged hash: SHA256(SHA256(tag) || SHA256(tag) || data)
pub fn tagged_hash(tag: &str, data: &[u8]) -> Hash {
    let tag_hash = Sha256::digest(tag.as_bytes());
    let mut hasher = Sha256::new();
    hasher.update(tag_hash);
    hasher.update(tag_hash);
    hasher.update(data);
    let digest = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&digest);
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_empty() {
        // SHA-256 of the empty string
        assert_eq!(
            hex::encode(sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_hash256_is_double_sha() {
        let once = sha256(b"abc");
        assert_eq!(hash256(b"abc"), sha256(&once));
    }

    #[test]
    fn test_hash160_known_vector() {
        // hash160 of the compressed generator point
        let pubkey =
            hex::decode("0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798")
                .unwrap();
        assert_eq!(
            hex::encode(hash160(&pubkey)),
            "751e76e8199196d454941c45d1b3a323f1433bd6"
        );
    }

    #[test]
    fn test_tagged_hash_domain_separation() {
        assert_ne!(tagged_hash("TapLeaf", b"x"), tagged_hash("TapBranch", b"x"));
        assert_ne!(tagged_hash("TapLeaf", b"x"), sha256(b"x"));
    }
}
