//! ECDSA signature codec: raw (r,s), DER, recoverable compact, script form
//!
//! DER decoding is strict (BIP66): every malformation is rejected with a
//! named error, nothing is repaired.

use serde::{Deserialize, Serialize};

use crate::constants::{
    SECP256K1_HALF_ORDER, SECP256K1_ORDER, SIGHASH_ANYONECANPAY, SIGHASH_OUTPUT_MASK, SIGHASH_ALL,
    SIGHASH_SINGLE,
};
use crate::error::{Result, TxError};

/// ECDSA signature as two 256-bit big-endian scalars
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EcdsaSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
}

/// Recoverable compact signature: 65-byte layout `header || r || s`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactSignature {
    pub signature: EcdsaSignature,
    pub recovery_id: u8,
    pub compressed: bool,
}

/// Schnorr signature pass-through for taproot: 64 bytes, or 65 with a
/// trailing sighash byte
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchnorrSignature(pub Vec<u8>);

impl SchnorrSignature {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 64 && bytes.len() != 65 {
            return Err(TxError::MalformedInput(format!(
                "Schnorr signature must be 64 or 65 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(SchnorrSignature(bytes.to_vec()))
    }
}

fn scalar_is_zero(scalar: &[u8; 32]) -> bool {
    scalar.iter().all(|&byte| byte == 0)
}

/// Big-endian fixed-width compare, so slice ordering is numeric ordering
fn scalar_lt(a: &[u8; 32], b: &[u8; 32]) -> bool {
    a < b
}

/// n - s, big-endian subtraction (s is known non-zero and below n)
fn order_minus(s: &[u8; 32]) -> [u8; 32] {
    let mut out = [0u8; 32];
    let mut borrow = 0i16;
    for i in (0..32).rev() {
        let diff = SECP256K1_ORDER[i] as i16 - s[i] as i16 - borrow;
        if diff < 0 {
            out[i] = (diff + 256) as u8;
            borrow = 1;
        } else {
            out[i] = diff as u8;
            borrow = 0;
        }
    }
    out
}

impl EcdsaSignature {
    /// Construct from raw scalars, enforcing `0 < r < n` and `0 < s < n`
    pub fn new(r: [u8; 32], s: [u8; 32]) -> Result<Self> {
        if scalar_is_zero(&r) || !scalar_lt(&r, &SECP256K1_ORDER) {
            return Err(TxError::MalformedInput(
                "Signature r value out of range".to_string(),
            ));
        }
        if scalar_is_zero(&s) || !scalar_lt(&s, &SECP256K1_ORDER) {
            return Err(TxError::MalformedInput(
                "Signature s value out of range".to_string(),
            ));
        }
        Ok(EcdsaSignature { r, s })
    }

    /// True if s is in the canonical lower half of the group order
    pub fn is_low_s(&self) -> bool {
        !scalar_lt(&SECP256K1_HALF_ORDER, &self.s)
    }

    /// Canonical form: a high-S signature is negated (s := n - s)
    pub fn normalize_s(&self) -> EcdsaSignature {
        if self.is_low_s() {
            *self
        } else {
            EcdsaSignature {
                r: self.r,
                s: order_minus(&self.s),
            }
        }
    }

    /// Strict DER encoding of the canonical (low-S) form
    pub fn to_der(&self) -> Vec<u8> {
        let sig = self.normalize_s();
        let r = der_integer(&sig.r);
        let s = der_integer(&sig.s);
        let mut out = Vec::with_capacity(6 + r.len() + s.len());
        out.push(0x30);
        out.push((4 + r.len() + s.len()) as u8);
        out.push(0x02);
        out.push(r.len() as u8);
        out.extend_from_slice(&r);
        out.push(0x02);
        out.push(s.len() as u8);
        out.extend_from_slice(&s);
        out
    }

    /// Strict DER decoding. Each malformation fails with a distinct message:
    /// wrong tag, bad sequence length, zero-length or negative-looking
    /// integers, excessive padding, trailing garbage.
    pub fn from_der(buf: &[u8]) -> Result<Self> {
        if buf.len() < 8 {
            return Err(TxError::MalformedInput(
                "DER sequence length is too short".to_string(),
            ));
        }
        if buf.len() > 72 {
            return Err(TxError::MalformedInput(
                "DER sequence length is too long".to_string(),
            ));
        }
        if buf[0] != 0x30 {
            return Err(TxError::MalformedInput(
                "Expected DER sequence".to_string(),
            ));
        }
        if buf[1] as usize != buf.len() - 2 {
            return Err(TxError::MalformedInput(
                "DER sequence length is invalid".to_string(),
            ));
        }
        if buf[2] != 0x02 {
            return Err(TxError::MalformedInput(
                "Expected DER integer for r".to_string(),
            ));
        }
        let len_r = buf[3] as usize;
        if len_r == 0 {
            return Err(TxError::MalformedInput("R length is zero".to_string()));
        }
        if 5 + len_r >= buf.len() {
            return Err(TxError::MalformedInput("R length is too long".to_string()));
        }
        if buf[4 + len_r] != 0x02 {
            return Err(TxError::MalformedInput(
                "Expected DER integer for s".to_string(),
            ));
        }
        let len_s = buf[5 + len_r] as usize;
        if len_s == 0 {
            return Err(TxError::MalformedInput("S length is zero".to_string()));
        }
        if 6 + len_r + len_s != buf.len() {
            return Err(TxError::MalformedInput("S length is invalid".to_string()));
        }
        let r_bytes = &buf[4..4 + len_r];
        let s_bytes = &buf[6 + len_r..];
        if r_bytes[0] & 0x80 != 0 {
            return Err(TxError::MalformedInput("R value is negative".to_string()));
        }
        if len_r > 1 && r_bytes[0] == 0x00 && r_bytes[1] & 0x80 == 0 {
            return Err(TxError::MalformedInput(
                "R value excessively padded".to_string(),
            ));
        }
        if s_bytes[0] & 0x80 != 0 {
            return Err(TxError::MalformedInput("S value is negative".to_string()));
        }
        if len_s > 1 && s_bytes[0] == 0x00 && s_bytes[1] & 0x80 == 0 {
            return Err(TxError::MalformedInput(
                "S value excessively padded".to_string(),
            ));
        }
        let r = der_integer_to_scalar(r_bytes, "r")?;
        let s = der_integer_to_scalar(s_bytes, "s")?;
        EcdsaSignature::new(r, s)
    }

    /// Fixed 65-byte recoverable form: `27 + recovery_id (+4 if compressed)`
    /// header byte followed by r and s
    pub fn to_compact(&self, recovery_id: u8, compressed: bool) -> Result<[u8; 65]> {
        if recovery_id > 3 {
            return Err(TxError::MalformedInput(format!(
                "Recovery id {} out of range",
                recovery_id
            )));
        }
        let mut out = [0u8; 65];
        out[0] = 27 + recovery_id + if compressed { 4 } else { 0 };
        out[1..33].copy_from_slice(&self.r);
        out[33..].copy_from_slice(&self.s);
        Ok(out)
    }

    pub fn from_compact(buf: &[u8]) -> Result<CompactSignature> {
        if buf.len() != 65 {
            return Err(TxError::MalformedInput(format!(
                "Compact signature must be 65 bytes, got {}",
                buf.len()
            )));
        }
        let header = buf[0];
        if !(27..=34).contains(&header) {
            return Err(TxError::MalformedInput(format!(
                "Invalid compact signature header byte {}",
                header
            )));
        }
        let compressed = header >= 31;
        let recovery_id = (header - 27) & 0x03;
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&buf[1..33]);
        s.copy_from_slice(&buf[33..]);
        Ok(CompactSignature {
            signature: EcdsaSignature::new(r, s)?,
            recovery_id,
            compressed,
        })
    }

    /// DER bytes followed by the sighash type byte, as placed in scripts
    pub fn to_script_signature(&self, hash_type: u32) -> Result<Vec<u8>> {
        if !is_defined_hash_type(hash_type) {
            return Err(TxError::MalformedInput(format!(
                "Invalid sighash type 0x{:02x}",
                hash_type
            )));
        }
        let mut out = self.to_der();
        out.push(hash_type as u8);
        Ok(out)
    }

    pub fn from_script_signature(buf: &[u8]) -> Result<(EcdsaSignature, u32)> {
        if buf.is_empty() {
            return Err(TxError::MalformedInput(
                "Empty script signature".to_string(),
            ));
        }
        let hash_type = buf[buf.len() - 1] as u32;
        if !is_defined_hash_type(hash_type) {
            return Err(TxError::MalformedInput(format!(
                "Invalid sighash type 0x{:02x}",
                hash_type
            )));
        }
        let signature = EcdsaSignature::from_der(&buf[..buf.len() - 1])?;
        Ok((signature, hash_type))
    }
}

/// Recognized combination of ALL/NONE/SINGLE optionally OR'd with
/// ANYONECANPAY
pub fn is_defined_hash_type(hash_type: u32) -> bool {
    if hash_type & !(SIGHASH_OUTPUT_MASK | SIGHASH_ANYONECANPAY) != 0 {
        return false;
    }
    let base = hash_type & SIGHASH_OUTPUT_MASK;
    (SIGHASH_ALL..=SIGHASH_SINGLE).contains(&base)
}

/// Minimal signed big-endian encoding of a 32-byte scalar
fn der_integer(scalar: &[u8; 32]) -> Vec<u8> {
    let mut start = 0;
    while start < 31 && scalar[start] == 0 {
        start += 1;
    }
    let mut out = scalar[start..].to_vec();
    if out[0] & 0x80 != 0 {
        out.insert(0, 0x00);
    }
    out
}

fn der_integer_to_scalar(bytes: &[u8], which: &str) -> Result<[u8; 32]> {
    let significant = if bytes[0] == 0x00 { &bytes[1..] } else { bytes };
    if significant.len() > 32 {
        return Err(TxError::MalformedInput(format!(
            "DER {} value wider than 256 bits",
            which
        )));
    }
    let mut scalar = [0u8; 32];
    scalar[32 - significant.len()..].copy_from_slice(significant);
    Ok(scalar)
}
