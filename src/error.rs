//! Error types for transaction building and signing

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TxError {
    /// Bad buffer length, invalid varint, truncated script or witness.
    /// Never silently repaired.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Supplied material does not match what the transaction commits to
    /// (redeem/witness script hash mismatch, signer key absent from script).
    #[error("Validation mismatch: {0}")]
    ValidationMismatch(String),

    /// Operation not allowed in the current state (signing a finalized input,
    /// too many signatures, extracting before finalization). Non-retryable.
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// A nonstandard scriptPubKey reached the finalizer.
    #[error("Unsupported script template: {0}")]
    UnsupportedTemplate(String),

    /// secp256k1-level failure (invalid key magnitude, point not on curve).
    #[error("Signing failed: {0}")]
    Signing(String),
}

pub type Result<T> = std::result::Result<T, TxError>;
