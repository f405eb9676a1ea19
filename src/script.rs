//! Script model: opcodes, decompilation, ASM/hex converters, template
//! classification
//!
//! Classification is a pure structural match over the script buffer; no
//! script is ever executed here. Malformed buffers classify as
//! `NonStandard`, they never raise.

use crate::constants::MAX_SCRIPT_SIZE;
use crate::error::{Result, TxError};
use crate::signature::EcdsaSignature;
use crate::types::ByteString;

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_RESERVED: u8 = 0x50;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_NOP: u8 = 0x61;
pub const OP_IF: u8 = 0x63;
pub const OP_NOTIF: u8 = 0x64;
pub const OP_ELSE: u8 = 0x67;
pub const OP_ENDIF: u8 = 0x68;
pub const OP_VERIFY: u8 = 0x69;
pub const OP_RETURN: u8 = 0x6a;
pub const OP_DROP: u8 = 0x75;
pub const OP_DUP: u8 = 0x76;
pub const OP_SWAP: u8 = 0x7c;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_ADD: u8 = 0x93;
pub const OP_RIPEMD160: u8 = 0xa6;
pub const OP_SHA256: u8 = 0xa8;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_HASH256: u8 = 0xaa;
pub const OP_CODESEPARATOR: u8 = 0xab;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKSIGVERIFY: u8 = 0xad;
pub const OP_CHECKMULTISIG: u8 = 0xae;
pub const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;
pub const OP_CHECKLOCKTIMEVERIFY: u8 = 0xb1;
pub const OP_CHECKSEQUENCEVERIFY: u8 = 0xb2;

/// One decompiled script element: an opcode or a data push
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptChunk {
    Op(u8),
    Push(ByteString),
}

/// Closed set of recognized output templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptTemplate {
    PubKeyHash,
    ScriptHash,
    WitnessPubKeyHash,
    WitnessScriptHash,
    Taproot,
    Multisig,
    PubKey,
    NonStandard,
}

/// 33-byte compressed (02/03 prefix) or 65-byte uncompressed (04 prefix)
/// point encoding
pub fn is_canonical_pubkey(bytes: &[u8]) -> bool {
    match bytes.first() {
        Some(0x02) | Some(0x03) => bytes.len() == 33,
        Some(0x04) => bytes.len() == 65,
        _ => false,
    }
}

/// DER signature followed by a defined sighash byte
pub fn is_canonical_script_signature(bytes: &[u8]) -> bool {
    EcdsaSignature::from_script_signature(bytes).is_ok()
}

/// Decompile a script buffer into its operation list.
///
/// A push whose declared length exceeds the remaining buffer is a decompile
/// failure, surfaced as `MalformedInput`.
pub fn decompile(script: &[u8]) -> Result<Vec<ScriptChunk>> {
    if script.len() > MAX_SCRIPT_SIZE {
        return Err(TxError::MalformedInput(format!(
            "Script of {} bytes exceeds maximum size",
            script.len()
        )));
    }
    let mut chunks = Vec::new();
    let mut pos = 0usize;
    while pos < script.len() {
        let opcode = script[pos];
        pos += 1;
        let push_len = match opcode {
            0x01..=0x4b => Some(opcode as usize),
            OP_PUSHDATA1 => {
                if pos >= script.len() {
                    return Err(decompile_error());
                }
                let len = script[pos] as usize;
                pos += 1;
                Some(len)
            }
            OP_PUSHDATA2 => {
                if pos + 2 > script.len() {
                    return Err(decompile_error());
                }
                let len = u16::from_le_bytes([script[pos], script[pos + 1]]) as usize;
                pos += 2;
                Some(len)
            }
            OP_PUSHDATA4 => {
                if pos + 4 > script.len() {
                    return Err(decompile_error());
                }
                let len = u32::from_le_bytes([
                    script[pos],
                    script[pos + 1],
                    script[pos + 2],
                    script[pos + 3],
                ]) as usize;
                pos += 4;
                Some(len)
            }
            _ => None,
        };
        match push_len {
            Some(len) => {
                if pos + len > script.len() {
                    return Err(decompile_error());
                }
                chunks.push(ScriptChunk::Push(script[pos..pos + len].to_vec()));
                pos += len;
            }
            None => chunks.push(ScriptChunk::Op(opcode)),
        }
    }
    Ok(chunks)
}

fn decompile_error() -> TxError {
    TxError::MalformedInput("Script decompile failed".to_string())
}

/// Compile an operation list back into a script buffer
pub fn compile(chunks: &[ScriptChunk]) -> ByteString {
    let mut out = Vec::new();
    for chunk in chunks {
        match chunk {
            ScriptChunk::Op(opcode) => out.push(*opcode),
            ScriptChunk::Push(data) => push_data(&mut out, data),
        }
    }
    out
}

/// Append a length-prefixed data push
pub fn push_data(out: &mut Vec<u8>, data: &[u8]) {
    let len = data.len();
    if len <= 0x4b {
        out.push(len as u8);
    } else if len <= 0xff {
        out.push(OP_PUSHDATA1);
        out.push(len as u8);
    } else if len <= 0xffff {
        out.push(OP_PUSHDATA2);
        out.extend_from_slice(&(len as u16).to_le_bytes());
    } else {
        out.push(OP_PUSHDATA4);
        out.extend_from_slice(&(len as u32).to_le_bytes());
    }
    out.extend_from_slice(data);
}

/// Opcode for a small number push, `0 <= n <= 16`
pub fn op_number(n: u8) -> u8 {
    if n == 0 {
        OP_0
    } else {
        OP_1 + n - 1
    }
}

/// Mnemonic for an opcode; unrecognized bytes render as
/// `OP_UNKNOWN_0x..` so ASM stays lossless
pub fn op_name(opcode: u8) -> String {
    let name = match opcode {
        OP_0 => "OP_0",
        OP_PUSHDATA1 => "OP_PUSHDATA1",
        OP_PUSHDATA2 => "OP_PUSHDATA2",
        OP_PUSHDATA4 => "OP_PUSHDATA4",
        OP_1NEGATE => "OP_1NEGATE",
        OP_RESERVED => "OP_RESERVED",
        OP_1 => "OP_1",
        0x52 => "OP_2",
        0x53 => "OP_3",
        0x54 => "OP_4",
        0x55 => "OP_5",
        0x56 => "OP_6",
        0x57 => "OP_7",
        0x58 => "OP_8",
        0x59 => "OP_9",
        0x5a => "OP_10",
        0x5b => "OP_11",
        0x5c => "OP_12",
        0x5d => "OP_13",
        0x5e => "OP_14",
        0x5f => "OP_15",
        OP_16 => "OP_16",
        OP_NOP => "OP_NOP",
        OP_IF => "OP_IF",
        OP_NOTIF => "OP_NOTIF",
        OP_ELSE => "OP_ELSE",
        OP_ENDIF => "OP_ENDIF",
        OP_VERIFY => "OP_VERIFY",
        OP_RETURN => "OP_RETURN",
        OP_DROP => "OP_DROP",
        OP_DUP => "OP_DUP",
        OP_SWAP => "OP_SWAP",
        OP_EQUAL => "OP_EQUAL",
        OP_EQUALVERIFY => "OP_EQUALVERIFY",
        OP_ADD => "OP_ADD",
        OP_RIPEMD160 => "OP_RIPEMD160",
        OP_SHA256 => "OP_SHA256",
        OP_HASH160 => "OP_HASH160",
        OP_HASH256 => "OP_HASH256",
        OP_CODESEPARATOR => "OP_CODESEPARATOR",
        OP_CHECKSIG => "OP_CHECKSIG",
        OP_CHECKSIGVERIFY => "OP_CHECKSIGVERIFY",
        OP_CHECKMULTISIG => "OP_CHECKMULTISIG",
        OP_CHECKMULTISIGVERIFY => "OP_CHECKMULTISIGVERIFY",
        OP_CHECKLOCKTIMEVERIFY => "OP_CHECKLOCKTIMEVERIFY",
        OP_CHECKSEQUENCEVERIFY => "OP_CHECKSEQUENCEVERIFY",
        _ => return format!("OP_UNKNOWN_0x{:02x}", opcode),
    };
    name.to_string()
}

fn op_from_name(name: &str) -> Option<u8> {
    if let Some(hex_part) = name.strip_prefix("OP_UNKNOWN_0x") {
        return u8::from_str_radix(hex_part, 16).ok();
    }
    // scan the closed opcode space for a mnemonic match
    (0x00..=0xff).find(|&opcode| op_name(opcode) == name)
}

/// ASM rendering: opcode mnemonics and hex literals for pushes
pub fn to_asm(script: &[u8]) -> Result<String> {
    let chunks = decompile(script)?;
    let parts: Vec<String> = chunks
        .iter()
        .map(|chunk| match chunk {
            ScriptChunk::Op(opcode) => op_name(*opcode),
            ScriptChunk::Push(data) => hex::encode(data),
        })
        .collect();
    Ok(parts.join(" "))
}

/// Parse the ASM form produced by `to_asm`
pub fn from_asm(asm: &str) -> Result<ByteString> {
    let mut chunks = Vec::new();
    for token in asm.split_whitespace() {
        if token.starts_with("OP_") {
            let opcode = op_from_name(token).ok_or_else(|| {
                TxError::MalformedInput(format!("Unknown opcode mnemonic {}", token))
            })?;
            chunks.push(ScriptChunk::Op(opcode));
        } else {
            let data = hex::decode(token)
                .map_err(|_| TxError::MalformedInput(format!("Invalid hex push {}", token)))?;
            chunks.push(ScriptChunk::Push(data));
        }
    }
    Ok(compile(&chunks))
}

pub fn to_hex(script: &[u8]) -> String {
    hex::encode(script)
}

pub fn from_hex(hex_str: &str) -> Result<ByteString> {
    hex::decode(hex_str).map_err(|_| TxError::MalformedInput("Invalid script hex".to_string()))
}

/// Remove every OP_CODESEPARATOR; the result is a new buffer
pub fn without_code_separator(script: &[u8]) -> Result<ByteString> {
    let chunks = decompile(script)?;
    let filtered: Vec<ScriptChunk> = chunks
        .into_iter()
        .filter(|chunk| *chunk != ScriptChunk::Op(OP_CODESEPARATOR))
        .collect();
    Ok(compile(&filtered))
}

/// Classify a scriptPubKey by exact structural template match
pub fn classify_output(script: &[u8]) -> ScriptTemplate {
    if script.len() == 25
        && script[0] == OP_DUP
        && script[1] == OP_HASH160
        && script[2] == 0x14
        && script[23] == OP_EQUALVERIFY
        && script[24] == OP_CHECKSIG
    {
        return ScriptTemplate::PubKeyHash;
    }
    if script.len() == 23 && script[0] == OP_HASH160 && script[1] == 0x14 && script[22] == OP_EQUAL
    {
        return ScriptTemplate::ScriptHash;
    }
    if script.len() == 22 && script[0] == OP_0 && script[1] == 0x14 {
        return ScriptTemplate::WitnessPubKeyHash;
    }
    if script.len() == 34 && script[0] == OP_0 && script[1] == 0x20 {
        return ScriptTemplate::WitnessScriptHash;
    }
    if script.len() == 34 && script[0] == OP_1 && script[1] == 0x20 {
        return ScriptTemplate::Taproot;
    }
    if is_multisig_output(script) {
        return ScriptTemplate::Multisig;
    }
    if let Ok(chunks) = decompile(script) {
        if chunks.len() == 2 {
            if let (ScriptChunk::Push(pubkey), ScriptChunk::Op(OP_CHECKSIG)) =
                (&chunks[0], &chunks[1])
            {
                if is_canonical_pubkey(pubkey) {
                    return ScriptTemplate::PubKey;
                }
            }
        }
    }
    ScriptTemplate::NonStandard
}

fn is_multisig_output(script: &[u8]) -> bool {
    let chunks = match decompile(script) {
        Ok(chunks) => chunks,
        Err(_) => return false,
    };
    if chunks.len() < 4 {
        return false;
    }
    let m = match chunks[0] {
        ScriptChunk::Op(opcode) if (OP_1..=OP_16).contains(&opcode) => opcode - OP_1 + 1,
        _ => return false,
    };
    if chunks[chunks.len() - 1] != ScriptChunk::Op(OP_CHECKMULTISIG) {
        return false;
    }
    let n = match chunks[chunks.len() - 2] {
        ScriptChunk::Op(opcode) if (OP_1..=OP_16).contains(&opcode) => opcode - OP_1 + 1,
        _ => return false,
    };
    let pubkeys = &chunks[1..chunks.len() - 2];
    if pubkeys.len() != n as usize || m > n {
        return false;
    }
    pubkeys.iter().all(|chunk| match chunk {
        ScriptChunk::Push(pubkey) => is_canonical_pubkey(pubkey),
        _ => false,
    })
}

/// Threshold and public keys of a multisig scriptPubKey, in declared order
pub fn multisig_components(script: &[u8]) -> Result<(usize, Vec<ByteString>)> {
    if !is_multisig_output(script) {
        return Err(TxError::UnsupportedTemplate(
            "Not a multisig output script".to_string(),
        ));
    }
    let chunks = decompile(script)?;
    let m = match chunks[0] {
        ScriptChunk::Op(opcode) => (opcode - OP_1 + 1) as usize,
        _ => unreachable!(),
    };
    let pubkeys = chunks[1..chunks.len() - 2]
        .iter()
        .map(|chunk| match chunk {
            ScriptChunk::Push(pubkey) => pubkey.clone(),
            _ => unreachable!(),
        })
        .collect();
    Ok((m, pubkeys))
}

/// Classify a scriptSig by structural template match
pub fn classify_input(script_sig: &[u8]) -> ScriptTemplate {
    let chunks = match decompile(script_sig) {
        Ok(chunks) => chunks,
        Err(_) => return ScriptTemplate::NonStandard,
    };
    match chunks.as_slice() {
        [ScriptChunk::Push(sig)] if is_canonical_script_signature(sig) => ScriptTemplate::PubKey,
        [ScriptChunk::Push(sig), ScriptChunk::Push(pubkey)]
            if is_canonical_script_signature(sig) && is_canonical_pubkey(pubkey) =>
        {
            ScriptTemplate::PubKeyHash
        }
        [ScriptChunk::Op(OP_0), rest @ ..]
            if !rest.is_empty()
                && rest.iter().all(|chunk| match chunk {
                    ScriptChunk::Push(sig) => is_canonical_script_signature(sig),
                    _ => false,
                }) =>
        {
            ScriptTemplate::Multisig
        }
        [.., ScriptChunk::Push(redeem)] if decompile(redeem).is_ok() && chunks.len() > 1 => {
            ScriptTemplate::ScriptHash
        }
        _ => ScriptTemplate::NonStandard,
    }
}
