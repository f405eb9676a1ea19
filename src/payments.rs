//! Canonical script builders for the standard payment templates
//!
//! Output builders take raw hashes/keys (address decoding is the caller's
//! concern); input builders assemble the spending scriptSig or witness stack
//! used at PSBT finalization.

use crate::error::{Result, TxError};
use crate::script::{
    self, compile, is_canonical_pubkey, op_number, ScriptChunk, OP_CHECKMULTISIG, OP_CHECKSIG,
    OP_DUP, OP_EQUAL, OP_EQUALVERIFY, OP_HASH160,
};
use crate::types::{ByteString, Witness};

/// OP_DUP OP_HASH160 <20B> OP_EQUALVERIFY OP_CHECKSIG
pub fn p2pkh_output(pubkey_hash: &[u8; 20]) -> ByteString {
    let mut out = vec![OP_DUP, OP_HASH160];
    script::push_data(&mut out, pubkey_hash);
    out.push(OP_EQUALVERIFY);
    out.push(OP_CHECKSIG);
    out
}

/// OP_HASH160 <20B> OP_EQUAL
pub fn p2sh_output(script_hash: &[u8; 20]) -> ByteString {
    let mut out = vec![OP_HASH160];
    script::push_data(&mut out, script_hash);
    out.push(OP_EQUAL);
    out
}

/// OP_0 <20B>
pub fn p2wpkh_output(pubkey_hash: &[u8; 20]) -> ByteString {
    let mut out = vec![script::OP_0];
    script::push_data(&mut out, pubkey_hash);
    out
}

/// OP_0 <32B>
pub fn p2wsh_output(script_hash: &[u8; 32]) -> ByteString {
    let mut out = vec![script::OP_0];
    script::push_data(&mut out, script_hash);
    out
}

/// OP_1 <32B>
pub fn p2tr_output(output_key: &[u8; 32]) -> ByteString {
    let mut out = vec![script::OP_1];
    script::push_data(&mut out, output_key);
    out
}

/// <pubkey> OP_CHECKSIG
pub fn p2pk_output(pubkey: &[u8]) -> Result<ByteString> {
    if !is_canonical_pubkey(pubkey) {
        return Err(TxError::MalformedInput(
            "Not a canonical public key".to_string(),
        ));
    }
    let mut out = Vec::new();
    script::push_data(&mut out, pubkey);
    out.push(OP_CHECKSIG);
    Ok(out)
}

/// OP_m <pubkey>+ OP_n OP_CHECKMULTISIG; keys kept in the given order
pub fn p2ms_output(m: usize, pubkeys: &[ByteString]) -> Result<ByteString> {
    let n = pubkeys.len();
    if m == 0 || n == 0 || m > n || n > 16 {
        return Err(TxError::MalformedInput(format!(
            "Invalid multisig threshold {}-of-{}",
            m, n
        )));
    }
    for pubkey in pubkeys {
        if !is_canonical_pubkey(pubkey) {
            return Err(TxError::MalformedInput(
                "Not a canonical public key".to_string(),
            ));
        }
    }
    let mut out = vec![op_number(m as u8)];
    for pubkey in pubkeys {
        script::push_data(&mut out, pubkey);
    }
    out.push(op_number(n as u8));
    out.push(OP_CHECKMULTISIG);
    Ok(out)
}

/// scriptSig `<sig>` spending a p2pk output
pub fn p2pk_input(signature: &[u8]) -> ByteString {
    compile(&[ScriptChunk::Push(signature.to_vec())])
}

/// scriptSig `<sig> <pubkey>` spending a p2pkh output
pub fn p2pkh_input(signature: &[u8], pubkey: &[u8]) -> ByteString {
    compile(&[
        ScriptChunk::Push(signature.to_vec()),
        ScriptChunk::Push(pubkey.to_vec()),
    ])
}

/// scriptSig `OP_0 <sig>+` spending a p2ms output (the leading OP_0 absorbs
/// the CHECKMULTISIG off-by-one)
pub fn p2ms_input(signatures: &[ByteString]) -> ByteString {
    let mut chunks = vec![ScriptChunk::Op(script::OP_0)];
    chunks.extend(signatures.iter().map(|sig| ScriptChunk::Push(sig.clone())));
    compile(&chunks)
}

/// scriptSig wrapping a redeem script: inner unlocking pushes followed by a
/// push of the redeem script itself
pub fn p2sh_input(inner_script_sig: &[u8], redeem_script: &[u8]) -> Result<ByteString> {
    let mut chunks = script::decompile(inner_script_sig)?;
    chunks.push(ScriptChunk::Push(redeem_script.to_vec()));
    Ok(compile(&chunks))
}

/// Witness stack `[sig, pubkey]` spending a p2wpkh output
pub fn p2wpkh_witness(signature: &[u8], pubkey: &[u8]) -> Witness {
    vec![signature.to_vec(), pubkey.to_vec()]
}

/// Witness stack spending a p2wsh output: inner stack items followed by the
/// witness script
pub fn p2wsh_witness(inner_items: Vec<ByteString>, witness_script: &[u8]) -> Witness {
    let mut stack = inner_items;
    stack.push(witness_script.to_vec());
    stack
}
