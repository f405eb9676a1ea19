//! # txforge
//!
//! Transaction construction and signing primitives for Bitcoin.
//!
//! This crate provides pure, side-effect-free building blocks for assembling,
//! digesting, and signing Bitcoin transactions:
//!
//! - Wire codec for transactions, with and without witness data
//! - Script compile/decompile, template classification, and the standard
//!   payment builders
//! - Legacy and BIP143 signature digests with their historical edge cases
//!   preserved bit-for-bit
//! - Strict-DER and compact signature codecs with low-S normalization
//! - Taproot key tweaking and Merkle commitment reconstruction (BIP340/341)
//! - A PSBT-style per-input signing state machine with pluggable blocking
//!   and deferred signers
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: digests and codecs are deterministic and
//!    side-effect-free; the only stateful surface is the `Psbt` builder
//! 2. **Exact Version Pinning**: cryptographic dependencies are pinned to
//!    exact versions
//! 3. **No Policy Interpretation**: templates and digests follow the
//!    deployed network behavior, including its quirks, not what a cleaner
//!    design would do
//!
//! ## Usage
//!
//! ```rust
//! use txforge::types::*;
//! use txforge::payments;
//!
//! let tx = Transaction {
//!     version: 2,
//!     inputs: vec![TransactionInput {
//!         prevout: OutPoint { hash: [0x22; 32], index: 0 },
//!         script_sig: vec![],
//!         sequence: 0xffffffff,
//!         witness: vec![],
//!     }],
//!     outputs: vec![TransactionOutput {
//!         value: 50_000,
//!         script_pubkey: payments::p2wpkh_output(&[0x11; 20]),
//!     }],
//!     lock_time: 0,
//! };
//! let bytes = tx.to_buffer();
//! let parsed = Transaction::from_buffer(&bytes).unwrap();
//! assert_eq!(parsed, tx);
//! ```

pub mod types;
pub mod constants;
pub mod error;
pub mod encode;
pub mod hashes;
pub mod signature;
pub mod script;
pub mod payments;
pub mod transaction;
pub mod taproot;
pub mod keys;
pub mod network;
pub mod psbt;

// Re-export commonly used types
pub use error::{Result, TxError};
pub use keys::{AsyncSigner, KeyPair, Signer};
pub use psbt::Psbt;
pub use signature::{CompactSignature, EcdsaSignature, SchnorrSignature};
pub use types::{
    ByteString, Hash, OutPoint, Transaction, TransactionInput, TransactionOutput, Witness,
};
