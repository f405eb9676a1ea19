//! Taproot key tweaking and Merkle-path reconstruction (BIP341)
//!
//! `lift_x` and `tweak_key` return `None` for invalid keys rather than
//! erroring: callers treat an unliftable key as a validation-control-flow
//! case, not an exceptional one.

use secp256k1::{Parity, PublicKey, Scalar, Secp256k1, XOnlyPublicKey};

use crate::encode::write_var_slice;
use crate::error::{Result, TxError};
use crate::hashes::tagged_hash;
use crate::types::{ByteString, Hash};

/// x-only key tweaked for key-path spending, with the parity bit verifiers
/// need to reconstruct the full point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TweakedKey {
    pub output_key: [u8; 32],
    pub parity: u8,
}

/// Parsed taproot control block: leaf version and output-key parity from the
/// header byte, the internal key, and the Merkle path to the leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlBlock {
    pub leaf_version: u8,
    pub parity: u8,
    pub internal_key: [u8; 32],
    pub path: Vec<Hash>,
}

/// A script tree: leaves carry tapscripts, branches combine two subtrees
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TapTree {
    Leaf { script: ByteString, version: u8 },
    Branch(Box<TapTree>, Box<TapTree>),
}

/// Lift a 32-byte x coordinate to the curve point with even Y.
///
/// Returns `None` if no point has that x coordinate.
pub fn lift_x(x: &[u8; 32]) -> Option<PublicKey> {
    let xonly = XOnlyPublicKey::from_slice(x).ok()?;
    Some(PublicKey::from_x_only_public_key(xonly, Parity::Even))
}

/// Tweak an internal key: `lift_x(pubkey) + H_TapTweak(pubkey || aux)·G`,
/// parity-normalized back to x-only form.
///
/// `aux` is the Merkle root for script commitments, or empty for a plain
/// key-path output. Returns `None` if the key does not lift or the result
/// degenerates.
pub fn tweak_key(pubkey: &[u8; 32], aux: &[u8]) -> Option<TweakedKey> {
    let secp = Secp256k1::new();
    let xonly = XOnlyPublicKey::from_slice(pubkey).ok()?;

    let mut tweak_data = Vec::with_capacity(32 + aux.len());
    tweak_data.extend_from_slice(pubkey);
    tweak_data.extend_from_slice(aux);
    let tweak = tagged_hash("TapTweak", &tweak_data);
    let scalar = Scalar::from_be_bytes(tweak).ok()?;

    let (output_key, parity) = xonly.add_tweak(&secp, &scalar).ok()?;
    Some(TweakedKey {
        output_key: output_key.serialize(),
        parity: match parity {
            Parity::Even => 0,
            Parity::Odd => 1,
        },
    })
}

/// Tapleaf hash: H_TapLeaf(version || compact_size(script) || script)
pub fn leaf_hash(script: &[u8], leaf_version: u8) -> Hash {
    let mut data = vec![leaf_version];
    write_var_slice(&mut data, script);
    tagged_hash("TapLeaf", &data)
}

/// Combine two node hashes; the pair is ordered lexicographically before
/// hashing so the commitment is canonical at every level
fn branch_hash(a: &Hash, b: &Hash) -> Hash {
    let mut data = Vec::with_capacity(64);
    if a <= b {
        data.extend_from_slice(a);
        data.extend_from_slice(b);
    } else {
        data.extend_from_slice(b);
        data.extend_from_slice(a);
    }
    tagged_hash("TapBranch", &data)
}

impl ControlBlock {
    /// Parse the raw control block from a witness: 1 header byte, 32-byte
    /// internal key, then whole 32-byte path nodes
    pub fn from_slice(buf: &[u8]) -> Result<ControlBlock> {
        if buf.len() < 33 || (buf.len() - 33) % 32 != 0 {
            return Err(TxError::MalformedInput(format!(
                "Invalid control block length {}",
                buf.len()
            )));
        }
        let mut internal_key = [0u8; 32];
        internal_key.copy_from_slice(&buf[1..33]);
        let path = buf[33..]
            .chunks(32)
            .map(|chunk| {
                let mut node = [0u8; 32];
                node.copy_from_slice(chunk);
                node
            })
            .collect();
        Ok(ControlBlock {
            leaf_version: buf[0] & 0xfe,
            parity: buf[0] & 0x01,
            internal_key,
            path,
        })
    }
}

/// Reconstruct the Merkle root by walking the control-block path up from a
/// leaf hash
pub fn root_hash_from_path(control_block: &[u8], leaf: &Hash) -> Result<Hash> {
    let control = ControlBlock::from_slice(control_block)?;
    let mut node = *leaf;
    for sibling in &control.path {
        node = branch_hash(&node, sibling);
    }
    Ok(node)
}

/// Merkle root of an explicit script tree, combined bottom-up with the same
/// canonical branch rule
pub fn root_hash_from_tree(tree: &TapTree) -> Hash {
    match tree {
        TapTree::Leaf { script, version } => leaf_hash(script, *version),
        TapTree::Branch(left, right) => {
            branch_hash(&root_hash_from_tree(left), &root_hash_from_tree(right))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::LEAF_VERSION_TAPSCRIPT;
    use secp256k1::SecretKey;

    /// x coordinate of the secp256k1 generator
    const GENERATOR_X: &str = "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    fn generator_x() -> [u8; 32] {
        let mut x = [0u8; 32];
        x.copy_from_slice(&hex::decode(GENERATOR_X).unwrap());
        x
    }

    #[test]
    fn test_lift_x_generator() {
        let point = lift_x(&generator_x()).unwrap();
        let serialized = point.serialize();
        // even-Y form of the generator
        assert_eq!(serialized[0], 0x02);
        assert_eq!(hex::encode(&serialized[1..]), GENERATOR_X);
    }

    #[test]
    fn test_lift_x_invalid_coordinate() {
        // x = 0 is not on the curve
        assert!(lift_x(&[0u8; 32]).is_none());
    }

    #[test]
    fn test_tweak_key_matches_scalar_derivation() {
        // re-derive the output key from the tweaked secret scalar; it must
        // match the point-side tweak exactly
        let secp = Secp256k1::new();
        let secret = SecretKey::from_slice(&[0x11u8; 32]).unwrap();
        let keypair = secp256k1::Keypair::from_secret_key(&secp, &secret);
        let (xonly, _) = keypair.x_only_public_key();
        let internal = xonly.serialize();

        let tweaked = tweak_key(&internal, &[0u8; 32]).unwrap();

        let mut tweak_data = Vec::new();
        tweak_data.extend_from_slice(&internal);
        tweak_data.extend_from_slice(&[0u8; 32]);
        let scalar = Scalar::from_be_bytes(tagged_hash("TapTweak", &tweak_data)).unwrap();
        let tweaked_pair = keypair.add_xonly_tweak(&secp, &scalar).unwrap();
        let (expected, parity) = tweaked_pair.x_only_public_key();

        assert_eq!(tweaked.output_key, expected.serialize());
        assert_eq!(
            tweaked.parity,
            match parity {
                Parity::Even => 0,
                Parity::Odd => 1,
            }
        );
    }

    #[test]
    fn test_tweak_key_invalid_internal_key() {
        assert!(tweak_key(&[0u8; 32], &[]).is_none());
    }

    #[test]
    fn test_leaf_hash_depends_on_version_and_script() {
        let script = vec![0x51];
        assert_ne!(
            leaf_hash(&script, LEAF_VERSION_TAPSCRIPT),
            leaf_hash(&script, 0xc2)
        );
        assert_ne!(
            leaf_hash(&script, LEAF_VERSION_TAPSCRIPT),
            leaf_hash(&[0x52], LEAF_VERSION_TAPSCRIPT)
        );
    }

    #[test]
    fn test_branch_hash_is_order_canonical() {
        let a = leaf_hash(&[0x51], LEAF_VERSION_TAPSCRIPT);
        let b = leaf_hash(&[0x52], LEAF_VERSION_TAPSCRIPT);
        assert_eq!(branch_hash(&a, &b), branch_hash(&b, &a));
    }

    #[test]
    fn test_path_and_tree_roots_agree() {
        let left = TapTree::Leaf {
            script: vec![0x51],
            version: LEAF_VERSION_TAPSCRIPT,
        };
        let right = TapTree::Leaf {
            script: vec![0x52],
            version: LEAF_VERSION_TAPSCRIPT,
        };
        let tree = TapTree::Branch(Box::new(left), Box::new(right));
        let root = root_hash_from_tree(&tree);

        // control block proving the left leaf: header + internal key + one
        // sibling (the right leaf hash)
        let mut control = vec![LEAF_VERSION_TAPSCRIPT];
        control.extend_from_slice(&generator_x());
        control.extend_from_slice(&leaf_hash(&[0x52], LEAF_VERSION_TAPSCRIPT));
        let walked =
            root_hash_from_path(&control, &leaf_hash(&[0x51], LEAF_VERSION_TAPSCRIPT)).unwrap();
        assert_eq!(walked, root);
    }

    #[test]
    fn test_control_block_rejects_bad_length() {
        assert!(ControlBlock::from_slice(&[0u8; 32]).is_err());
        assert!(ControlBlock::from_slice(&[0u8; 50]).is_err());
        let control = ControlBlock::from_slice(&[0xc1u8; 97]).unwrap();
        assert_eq!(control.leaf_version, 0xc0);
        assert_eq!(control.parity, 1);
        assert_eq!(control.path.len(), 2);
    }
}
