//! Transaction wire codec and signature-hash algorithms
//!
//! Serialization order: version(4LE), optional segwit marker/flag, inputs,
//! outputs, optional witness stacks, locktime(4LE). `tx_hash`/`tx_id` always
//! cover the non-witness form.

use crate::constants::{
    SIGHASH_ANYONECANPAY, SIGHASH_NONE, SIGHASH_ONE, SIGHASH_OUTPUT_MASK, SIGHASH_SINGLE,
};
use crate::encode::{
    varint_len, write_i32_le, write_u32_le, write_u64_le, write_var_slice, write_varint,
    write_vector, SliceReader,
};
use crate::error::{Result, TxError};
use crate::hashes::hash256;
use crate::script::without_code_separator;
use crate::types::{
    ByteString, Hash, OutPoint, Transaction, TransactionInput, TransactionOutput, Witness,
};

/// Placeholder output used when blanking outputs below the SIGHASH_SINGLE
/// index: value -1 (all bits set) and an empty script
const BLANK_OUTPUT_VALUE: u64 = u64::MAX;

impl Transaction {
    /// Decode from wire bytes; trailing or superfluous data is an error
    pub fn from_buffer(buf: &[u8]) -> Result<Transaction> {
        let mut reader = SliceReader::new(buf);
        let version = reader.read_i32_le()?;

        let has_marker = reader.peek_u8() == Some(0x00);
        let segwit = if has_marker {
            reader.read_u8()?;
            let flag = reader.read_u8()?;
            if flag != 0x01 {
                return Err(TxError::MalformedInput(format!(
                    "Invalid segwit flag byte 0x{:02x}",
                    flag
                )));
            }
            true
        } else {
            false
        };

        let input_count = reader.read_varint()?;
        let mut inputs = Vec::new();
        for _ in 0..input_count {
            let hash = reader.read_hash()?;
            let index = reader.read_u32_le()?;
            let script_sig = reader.read_var_slice()?;
            let sequence = reader.read_u32_le()?;
            inputs.push(TransactionInput {
                prevout: OutPoint { hash, index },
                script_sig,
                sequence,
                witness: Vec::new(),
            });
        }

        let output_count = reader.read_varint()?;
        let mut outputs = Vec::new();
        for _ in 0..output_count {
            let value = reader.read_u64_le()?;
            let script_pubkey = reader.read_var_slice()?;
            outputs.push(TransactionOutput {
                value,
                script_pubkey,
            });
        }

        if segwit {
            let mut any = false;
            for input in inputs.iter_mut() {
                input.witness = reader.read_vector()?;
                any = any || !input.witness.is_empty();
            }
            if !any {
                return Err(TxError::MalformedInput(
                    "Transaction has superfluous witness data".to_string(),
                ));
            }
        }

        let lock_time = reader.read_u32_le()?;
        if !reader.is_empty() {
            return Err(TxError::MalformedInput(
                "Transaction has unexpected trailing data".to_string(),
            ));
        }

        Ok(Transaction {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    pub fn to_buffer(&self) -> ByteString {
        self.serialize(true)
    }

    /// Legacy serialization regardless of witness presence
    pub fn to_buffer_no_witness(&self) -> ByteString {
        self.serialize(false)
    }

    fn serialize(&self, allow_witness: bool) -> ByteString {
        let segwit = allow_witness && self.has_witnesses();
        let mut out = Vec::with_capacity(self.byte_length(segwit));
        write_i32_le(&mut out, self.version);
        if segwit {
            out.push(0x00);
            out.push(0x01);
        }
        write_varint(&mut out, self.inputs.len() as u64);
        for input in &self.inputs {
            out.extend_from_slice(&input.prevout.hash);
            write_u32_le(&mut out, input.prevout.index);
            write_var_slice(&mut out, &input.script_sig);
            write_u32_le(&mut out, input.sequence);
        }
        write_varint(&mut out, self.outputs.len() as u64);
        for output in &self.outputs {
            write_u64_le(&mut out, output.value);
            write_var_slice(&mut out, &output.script_pubkey);
        }
        if segwit {
            for input in &self.inputs {
                write_vector(&mut out, &input.witness);
            }
        }
        write_u32_le(&mut out, self.lock_time);
        out
    }

    fn byte_length(&self, segwit: bool) -> usize {
        let mut len = 8 + varint_len(self.inputs.len() as u64) + varint_len(self.outputs.len() as u64);
        if segwit {
            len += 2;
        }
        for input in &self.inputs {
            len += 40 + varint_len(input.script_sig.len() as u64) + input.script_sig.len();
            if segwit {
                len += varint_len(input.witness.len() as u64);
                for item in &input.witness {
                    len += varint_len(item.len() as u64) + item.len();
                }
            }
        }
        for output in &self.outputs {
            len += 8 + varint_len(output.script_pubkey.len() as u64) + output.script_pubkey.len();
        }
        len
    }

    /// Weight: 3 x base size + total size (BIP141)
    pub fn weight(&self) -> usize {
        let base = self.byte_length(false);
        let total = self.byte_length(self.has_witnesses());
        base * 3 + total
    }

    pub fn virtual_size(&self) -> usize {
        (self.weight() + 3) / 4
    }

    /// Double SHA-256 of the non-witness serialization
    pub fn tx_hash(&self) -> Hash {
        hash256(&self.to_buffer_no_witness())
    }

    /// Display id: byte-reversed hex of `tx_hash`
    pub fn tx_id(&self) -> String {
        let mut hash = self.tx_hash();
        hash.reverse();
        hex::encode(hash)
    }

    /// Legacy (pre-segwit) signature hash.
    ///
    /// Reproduces the historical quirks bit-exactly: an out-of-range input
    /// index, or SIGHASH_SINGLE with no matching output, yields the
    /// degenerate `SIGHASH_ONE` digest instead of failing.
    pub fn hash_for_signature(
        &self,
        input_index: usize,
        prev_out_script: &[u8],
        hash_type: u32,
    ) -> Result<Hash> {
        if input_index >= self.inputs.len() {
            return Ok(SIGHASH_ONE);
        }
        let our_script = without_code_separator(prev_out_script)?;

        let mut tx = self.clone();
        let base = hash_type & SIGHASH_OUTPUT_MASK;

        if base == SIGHASH_NONE {
            tx.outputs.clear();
            for (i, input) in tx.inputs.iter_mut().enumerate() {
                if i != input_index {
                    input.sequence = 0;
                }
            }
        } else if base == SIGHASH_SINGLE {
            if input_index >= self.outputs.len() {
                return Ok(SIGHASH_ONE);
            }
            tx.outputs.truncate(input_index + 1);
            for output in tx.outputs.iter_mut().take(input_index) {
                output.value = BLANK_OUTPUT_VALUE;
                output.script_pubkey.clear();
            }
            for (i, input) in tx.inputs.iter_mut().enumerate() {
                if i != input_index {
                    input.sequence = 0;
                }
            }
        }

        if hash_type & SIGHASH_ANYONECANPAY != 0 {
            let mut input = tx.inputs.swap_remove(input_index);
            input.script_sig = our_script;
            tx.inputs = vec![input];
        } else {
            for (i, input) in tx.inputs.iter_mut().enumerate() {
                input.script_sig = if i == input_index {
                    our_script.clone()
                } else {
                    Vec::new()
                };
            }
        }

        let mut preimage = tx.to_buffer_no_witness();
        write_u32_le(&mut preimage, hash_type);
        Ok(hash256(&preimage))
    }

    /// Witness v0 signature hash (BIP143)
    pub fn hash_for_witness_v0(
        &self,
        input_index: usize,
        script_code: &[u8],
        value: u64,
        hash_type: u32,
    ) -> Result<Hash> {
        if input_index >= self.inputs.len() {
            return Err(TxError::MalformedInput(format!(
                "Input index {} out of range",
                input_index
            )));
        }
        let base = hash_type & SIGHASH_OUTPUT_MASK;
        let anyone_can_pay = hash_type & SIGHASH_ANYONECANPAY != 0;

        let hash_prevouts = if anyone_can_pay {
            [0u8; 32]
        } else {
            let mut buf = Vec::with_capacity(36 * self.inputs.len());
            for input in &self.inputs {
                buf.extend_from_slice(&input.prevout.hash);
                write_u32_le(&mut buf, input.prevout.index);
            }
            hash256(&buf)
        };

        let hash_sequence = if anyone_can_pay || base == SIGHASH_SINGLE || base == SIGHASH_NONE {
            [0u8; 32]
        } else {
            let mut buf = Vec::with_capacity(4 * self.inputs.len());
            for input in &self.inputs {
                write_u32_le(&mut buf, input.sequence);
            }
            hash256(&buf)
        };

        let hash_outputs = if base != SIGHASH_SINGLE && base != SIGHASH_NONE {
            let mut buf = Vec::new();
            for output in &self.outputs {
                write_u64_le(&mut buf, output.value);
                write_var_slice(&mut buf, &output.script_pubkey);
            }
            hash256(&buf)
        } else if base == SIGHASH_SINGLE && input_index < self.outputs.len() {
            let output = &self.outputs[input_index];
            let mut buf = Vec::new();
            write_u64_le(&mut buf, output.value);
            write_var_slice(&mut buf, &output.script_pubkey);
            hash256(&buf)
        } else {
            [0u8; 32]
        };

        let input = &self.inputs[input_index];
        let mut preimage = Vec::new();
        write_i32_le(&mut preimage, self.version);
        preimage.extend_from_slice(&hash_prevouts);
        preimage.extend_from_slice(&hash_sequence);
        preimage.extend_from_slice(&input.prevout.hash);
        write_u32_le(&mut preimage, input.prevout.index);
        write_var_slice(&mut preimage, script_code);
        write_u64_le(&mut preimage, value);
        write_u32_le(&mut preimage, input.sequence);
        preimage.extend_from_slice(&hash_outputs);
        write_u32_le(&mut preimage, self.lock_time);
        write_u32_le(&mut preimage, hash_type);
        Ok(hash256(&preimage))
    }
}

/// Serialize a witness stack as a varint-prefixed vector of varint-prefixed
/// byte strings (the BIP174 finalScriptWitness encoding)
pub fn witness_stack_to_script_witness(witness: &Witness) -> ByteString {
    let mut out = Vec::new();
    write_vector(&mut out, witness);
    out
}

/// Inverse of `witness_stack_to_script_witness`; truncation is an error
pub fn script_witness_to_witness_stack(buf: &[u8]) -> Result<Witness> {
    let mut reader = SliceReader::new(buf);
    let stack = reader.read_vector()?;
    if !reader.is_empty() {
        return Err(TxError::MalformedInput(
            "Script witness has unexpected trailing data".to_string(),
        ));
    }
    Ok(stack)
}
