//! Core transaction data types

use serde::{Deserialize, Serialize};

/// Hash type: 256-bit hash
pub type Hash = [u8; 32];

/// Byte string type
pub type ByteString = Vec<u8>;

/// Witness stack: ordered list of byte strings
pub type Witness = Vec<ByteString>;

/// Reference to an output of a previous transaction.
///
/// `hash` is stored in internal (little-endian) byte order; display form is
/// the byte-reversed hex of this field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutPoint {
    pub hash: Hash,
    pub index: u32,
}

/// Transaction input: prevout reference, unlocking script, sequence, witness
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInput {
    pub prevout: OutPoint,
    pub script_sig: ByteString,
    pub sequence: u32,
    pub witness: Witness,
}

/// Transaction output: value in satoshis plus locking script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionOutput {
    pub value: u64,
    pub script_pubkey: ByteString,
}

/// Transaction: version, ordered inputs/outputs, lock time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TransactionInput>,
    pub outputs: Vec<TransactionOutput>,
    pub lock_time: u32,
}

impl Transaction {
    /// True if any input carries a non-empty witness stack, which forces
    /// the segwit serialization (marker 0x00 + flag 0x01 after version).
    pub fn has_witnesses(&self) -> bool {
        self.inputs.iter().any(|input| !input.witness.is_empty())
    }
}
