//! PSBT engine: per-input signing state machine and finalization
//!
//! Each input moves `unfunded -> funded -> partially signed -> finalized`;
//! the finalized transition is one-way. A `Psbt` owns exactly one unsigned
//! transaction and a metadata record per input. All mutation goes through
//! `&mut self`, so concurrent signers for the same input are serialized by
//! construction; distinct inputs are independent and may be signed or
//! finalized in any order.
//!
//! The BIP174 map container is an external collaborator: this module owns
//! the semantics layered on top of it, not its byte format.

use crate::constants::{SEQUENCE_FINAL, SIGHASH_ALL};
use crate::error::{Result, TxError};
use crate::hashes::{hash160, sha256};
use crate::keys::{AsyncSigner, Signer};
use crate::payments;
use crate::script::{
    self, classify_output, compile, multisig_components, ScriptChunk, ScriptTemplate,
};
use crate::signature::{is_defined_hash_type, EcdsaSignature};
use crate::types::{
    ByteString, Hash, OutPoint, Transaction, TransactionInput, TransactionOutput, Witness,
};

/// Previous output data for witness inputs: just the value and script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WitnessUtxo {
    pub value: u64,
    pub script_pubkey: ByteString,
}

/// One partial signature: script-form signature (DER plus sighash byte)
/// keyed by the signer's public key
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialSig {
    pub pubkey: ByteString,
    pub signature: ByteString,
}

/// Per-input signing metadata
#[derive(Debug, Clone, Default)]
pub struct PsbtInput {
    pub non_witness_utxo: Option<Transaction>,
    pub witness_utxo: Option<WitnessUtxo>,
    pub redeem_script: Option<ByteString>,
    pub witness_script: Option<ByteString>,
    pub sighash_type: Option<u32>,
    pub partial_sigs: Vec<PartialSig>,
    pub final_script_sig: Option<ByteString>,
    pub final_script_witness: Option<Witness>,
}

impl PsbtInput {
    pub fn is_finalized(&self) -> bool {
        self.final_script_sig.is_some() || self.final_script_witness.is_some()
    }
}

/// Partially signed transaction: one owned unsigned transaction plus
/// per-input records
#[derive(Debug, Clone)]
pub struct Psbt {
    tx: Transaction,
    pub inputs: Vec<PsbtInput>,
    unsigned_tx_cache: Option<ByteString>,
}

/// What spends the input, resolved through redeem/witness indirection
struct SpendScript {
    script: ByteString,
    is_segwit: bool,
    is_p2sh: bool,
    is_p2wsh: bool,
}

impl Psbt {
    /// Empty PSBT around a fresh version-2 transaction
    pub fn new() -> Psbt {
        Psbt {
            tx: Transaction {
                version: 2,
                inputs: vec![],
                outputs: vec![],
                lock_time: 0,
            },
            inputs: vec![],
            unsigned_tx_cache: None,
        }
    }

    /// Wrap an existing unsigned transaction. Inputs carrying a scriptSig or
    /// witness are rejected: signing material belongs in the per-input
    /// records until extraction.
    pub fn from_unsigned_tx(tx: Transaction) -> Result<Psbt> {
        for (i, input) in tx.inputs.iter().enumerate() {
            if !input.script_sig.is_empty() || !input.witness.is_empty() {
                return Err(TxError::PolicyViolation(format!(
                    "Unsigned transaction input #{} already carries signing data",
                    i
                )));
            }
        }
        let inputs = tx.inputs.iter().map(|_| PsbtInput::default()).collect();
        Ok(Psbt {
            tx,
            inputs,
            unsigned_tx_cache: None,
        })
    }

    pub fn unsigned_tx(&self) -> &Transaction {
        &self.tx
    }

    /// Serialized unsigned transaction, memoized until the next input/output
    /// mutation
    pub fn unsigned_tx_bytes(&mut self) -> &[u8] {
        if self.unsigned_tx_cache.is_none() {
            self.unsigned_tx_cache = Some(self.tx.to_buffer());
        }
        self.unsigned_tx_cache.as_ref().unwrap()
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Append an input to the owned transaction
    pub fn add_input(&mut self, prevout: OutPoint, sequence: Option<u32>) -> Result<()> {
        self.tx.inputs.push(TransactionInput {
            prevout,
            script_sig: vec![],
            sequence: sequence.unwrap_or(SEQUENCE_FINAL),
            witness: vec![],
        });
        self.inputs.push(PsbtInput::default());
        self.unsigned_tx_cache = None;
        Ok(())
    }

    /// Append an output to the owned transaction
    pub fn add_output(&mut self, script_pubkey: ByteString, value: u64) -> Result<()> {
        self.tx.outputs.push(TransactionOutput {
            value,
            script_pubkey,
        });
        self.unsigned_tx_cache = None;
        Ok(())
    }

    fn input_checked(&self, index: usize) -> Result<&PsbtInput> {
        self.inputs.get(index).ok_or_else(|| {
            TxError::MalformedInput(format!("No input at index {}", index))
        })
    }

    fn fail_if_finalized(&self, index: usize) -> Result<()> {
        if self.input_checked(index)?.is_finalized() {
            return Err(TxError::PolicyViolation(format!(
                "Input #{} is already finalized",
                index
            )));
        }
        Ok(())
    }

    /// Attach the full previous transaction (legacy funding proof). Its hash
    /// must match the prevout recorded in the unsigned transaction.
    pub fn set_non_witness_utxo(&mut self, index: usize, utxo: Transaction) -> Result<()> {
        self.fail_if_finalized(index)?;
        if self.inputs[index].witness_utxo.is_some() {
            return Err(TxError::PolicyViolation(format!(
                "Input #{} already has a witness UTXO attached",
                index
            )));
        }
        let prevout = &self.tx.inputs[index].prevout;
        if utxo.tx_hash() != prevout.hash {
            return Err(TxError::ValidationMismatch(format!(
                "Non-witness UTXO hash for input #{} doesn't match the hash specified in the prevout",
                index
            )));
        }
        let spk = utxo
            .outputs
            .get(prevout.index as usize)
            .map(|output| output.script_pubkey.clone())
            .ok_or_else(|| {
                TxError::MalformedInput(format!(
                    "Non-witness UTXO for input #{} has no output at index {}",
                    index, prevout.index
                ))
            })?;
        if let Some(redeem) = self.inputs[index].redeem_script.clone() {
            check_redeem_script(index, &spk, &redeem)?;
        }
        self.inputs[index].non_witness_utxo = Some(utxo);
        Ok(())
    }

    /// Attach the spent output only (witness funding proof)
    pub fn set_witness_utxo(&mut self, index: usize, utxo: WitnessUtxo) -> Result<()> {
        self.fail_if_finalized(index)?;
        if self.inputs[index].non_witness_utxo.is_some() {
            return Err(TxError::PolicyViolation(format!(
                "Input #{} already has a non-witness UTXO attached",
                index
            )));
        }
        if let Some(redeem) = self.inputs[index].redeem_script.clone() {
            check_redeem_script(index, &utxo.script_pubkey, &redeem)?;
        }
        self.inputs[index].witness_utxo = Some(utxo);
        Ok(())
    }

    /// scriptPubKey of the spent output, if funding data is attached
    fn spent_script_pubkey(&self, index: usize) -> Option<ByteString> {
        let input = &self.inputs[index];
        if let Some(utxo) = &input.witness_utxo {
            return Some(utxo.script_pubkey.clone());
        }
        let utxo = input.non_witness_utxo.as_ref()?;
        let prevout_index = self.tx.inputs[index].prevout.index as usize;
        Some(utxo.outputs.get(prevout_index)?.script_pubkey.clone())
    }

    /// Attach a P2SH redeem script; checked against the spent scriptPubKey
    /// as soon as both are known. A failed check leaves the record untouched.
    pub fn set_redeem_script(&mut self, index: usize, redeem_script: ByteString) -> Result<()> {
        self.fail_if_finalized(index)?;
        if let Some(spk) = self.spent_script_pubkey(index) {
            check_redeem_script(index, &spk, &redeem_script)?;
        }
        self.inputs[index].redeem_script = Some(redeem_script);
        Ok(())
    }

    /// Attach a P2WSH witness script; checked against the redeem script if
    /// present, otherwise the spent scriptPubKey
    pub fn set_witness_script(&mut self, index: usize, witness_script: ByteString) -> Result<()> {
        self.fail_if_finalized(index)?;
        let base = self.inputs[index]
            .redeem_script
            .clone()
            .or_else(|| self.spent_script_pubkey(index));
        if let Some(base) = base {
            check_witness_script(index, &base, &witness_script)?;
        }
        self.inputs[index].witness_script = Some(witness_script);
        Ok(())
    }

    pub fn set_sighash_type(&mut self, index: usize, sighash_type: u32) -> Result<()> {
        self.fail_if_finalized(index)?;
        if !is_defined_hash_type(sighash_type) {
            return Err(TxError::MalformedInput(format!(
                "Invalid sighash type 0x{:02x}",
                sighash_type
            )));
        }
        self.inputs[index].sighash_type = Some(sighash_type);
        Ok(())
    }

    /// Digest the signer must commit to for this input, plus the effective
    /// sighash type. Resolves redeem/witness indirection and substitutes the
    /// implied P2PKH script code for P2WPKH.
    pub fn sighash_for_input(&self, index: usize, pubkey: &[u8]) -> Result<(Hash, u32)> {
        let input = self.input_checked(index)?;
        let sighash_type = input.sighash_type.unwrap_or(SIGHASH_ALL);

        let (hash, script) = if let Some(utxo) = &input.non_witness_utxo {
            let prevout = &self.tx.inputs[index].prevout;
            if utxo.tx_hash() != prevout.hash {
                return Err(TxError::ValidationMismatch(format!(
                    "Non-witness UTXO hash for input #{} doesn't match the hash specified in the prevout",
                    index
                )));
            }
            let prev_output = utxo.outputs.get(prevout.index as usize).ok_or_else(|| {
                TxError::MalformedInput(format!(
                    "Non-witness UTXO for input #{} has no output at index {}",
                    index, prevout.index
                ))
            })?;
            let script = match &input.redeem_script {
                Some(redeem) => {
                    check_redeem_script(index, &prev_output.script_pubkey, redeem)?;
                    redeem.clone()
                }
                None => prev_output.script_pubkey.clone(),
            };
            let hash = self.tx.hash_for_signature(index, &script, sighash_type)?;
            (hash, script)
        } else if let Some(utxo) = &input.witness_utxo {
            let script = match &input.redeem_script {
                Some(redeem) => {
                    check_redeem_script(index, &utxo.script_pubkey, redeem)?;
                    redeem.clone()
                }
                None => utxo.script_pubkey.clone(),
            };
            if classify_output(&script) == ScriptTemplate::WitnessPubKeyHash {
                // P2WPKH signs over the implied P2PKH script code
                let signing_script = p2pkh_script_code(&script)?;
                let hash =
                    self.tx
                        .hash_for_witness_v0(index, &signing_script, utxo.value, sighash_type)?;
                (hash, script)
            } else {
                let witness_script = input.witness_script.as_ref().ok_or_else(|| {
                    TxError::PolicyViolation(format!(
                        "Segwit input #{} needs a witness script if not P2WPKH",
                        index
                    ))
                })?;
                check_witness_script(index, &script, witness_script)?;
                let hash = self.tx.hash_for_witness_v0(
                    index,
                    witness_script,
                    utxo.value,
                    sighash_type,
                )?;
                (hash, witness_script.clone())
            }
        } else {
            return Err(TxError::PolicyViolation(format!(
                "Input #{} needs a UTXO attached before signing",
                index
            )));
        };

        check_script_for_pubkey(index, pubkey, &script)?;
        Ok((hash, sighash_type))
    }

    /// Sign one input with a blocking signer
    pub fn sign_input(&mut self, index: usize, signer: &dyn Signer) -> Result<()> {
        self.fail_if_finalized(index)?;
        let pubkey = signer.public_key();
        let (hash, sighash_type) = self.sighash_for_input(index, &pubkey)?;
        let signature = signer.sign(&hash)?;
        self.insert_partial_sig(index, pubkey, &signature, sighash_type)
    }

    /// Sign one input with a deferred signer; suspends until the external
    /// signer responds, then applies the same state transition as
    /// `sign_input`
    pub async fn sign_input_async<S: AsyncSigner + ?Sized>(
        &mut self,
        index: usize,
        signer: &S,
    ) -> Result<()> {
        self.fail_if_finalized(index)?;
        let pubkey = signer.public_key();
        let (hash, sighash_type) = self.sighash_for_input(index, &pubkey)?;
        let signature = signer.sign(&hash).await?;
        self.insert_partial_sig(index, pubkey, &signature, sighash_type)
    }

    /// Insert a partial signature keyed by pubkey; a duplicate pubkey
    /// overwrites its previous signature
    fn insert_partial_sig(
        &mut self,
        index: usize,
        pubkey: ByteString,
        signature: &EcdsaSignature,
        sighash_type: u32,
    ) -> Result<()> {
        let script_signature = signature.to_script_signature(sighash_type)?;
        let sigs = &mut self.inputs[index].partial_sigs;
        match sigs.iter_mut().find(|ps| ps.pubkey == pubkey) {
            Some(existing) => existing.signature = script_signature,
            None => sigs.push(PartialSig {
                pubkey,
                signature: script_signature,
            }),
        }
        Ok(())
    }

    /// Resolve the script an input spends, tracking the wrapping layers
    fn script_from_input(&self, index: usize) -> Result<SpendScript> {
        let input = &self.inputs[index];
        if input.non_witness_utxo.is_some() {
            let script = match &input.redeem_script {
                Some(redeem) => redeem.clone(),
                None => self.spent_script_pubkey(index).ok_or_else(|| {
                    TxError::MalformedInput(format!(
                        "Non-witness UTXO for input #{} has no matching output",
                        index
                    ))
                })?,
            };
            return Ok(SpendScript {
                script,
                is_segwit: false,
                is_p2sh: input.redeem_script.is_some(),
                is_p2wsh: false,
            });
        }
        if let Some(utxo) = &input.witness_utxo {
            let script = if let Some(witness_script) = &input.witness_script {
                witness_script.clone()
            } else if let Some(redeem) = &input.redeem_script {
                // P2SH-P2WPKH: the redeem script is the witness program
                p2wpkh_program(redeem, index)?
            } else {
                p2wpkh_program(&utxo.script_pubkey, index)?
            };
            return Ok(SpendScript {
                script,
                is_segwit: true,
                is_p2sh: input.redeem_script.is_some(),
                is_p2wsh: input.witness_script.is_some(),
            });
        }
        Err(TxError::PolicyViolation(format!(
            "Input #{} cannot be finalized without a UTXO attached",
            index
        )))
    }

    /// Finalize one input: verify the signature count for the template,
    /// build the final scriptSig/witness, and clear the working records.
    /// The transition is one-way; repeating it is a `PolicyViolation`.
    pub fn finalize_input(&mut self, index: usize) -> Result<()> {
        self.fail_if_finalized(index)?;
        let spend = self.script_from_input(index)?;
        let template = classify_output(&spend.script);

        let needed = match template {
            ScriptTemplate::PubKey
            | ScriptTemplate::PubKeyHash
            | ScriptTemplate::WitnessPubKeyHash => 1,
            ScriptTemplate::Multisig => multisig_components(&spend.script)?.0,
            other => {
                return Err(TxError::UnsupportedTemplate(format!(
                    "Cannot finalize input #{} spending a {:?} script",
                    index, other
                )))
            }
        };

        let sigs = &self.inputs[index].partial_sigs;
        if sigs.len() > needed {
            return Err(TxError::PolicyViolation(format!(
                "Too many signatures for input #{}: have {}, need {}",
                index,
                sigs.len(),
                needed
            )));
        }
        if sigs.len() < needed {
            return Err(TxError::PolicyViolation(format!(
                "Not enough signatures for input #{}: have {}, need {}",
                index,
                sigs.len(),
                needed
            )));
        }

        // signatures ordered by the script's declared pubkey order, gaps
        // compacted; never by arrival time
        let ordered_sigs: Vec<ByteString> = match template {
            ScriptTemplate::Multisig => {
                let (_, pubkeys) = multisig_components(&spend.script)?;
                pubkeys
                    .iter()
                    .filter_map(|pk| {
                        sigs.iter()
                            .find(|ps| &ps.pubkey == pk)
                            .map(|ps| ps.signature.clone())
                    })
                    .collect()
            }
            _ => vec![sigs[0].signature.clone()],
        };
        if ordered_sigs.len() < needed {
            return Err(TxError::ValidationMismatch(format!(
                "Input #{} has signatures from keys absent from the script",
                index
            )));
        }
        let signer_pubkey = sigs[0].pubkey.clone();

        let (final_script_sig, final_script_witness) = if spend.is_segwit {
            let witness = if spend.is_p2wsh {
                // spend.script is the witness script in the p2wsh case
                let inner = match template {
                    ScriptTemplate::Multisig => {
                        // leading empty element absorbs the CHECKMULTISIG
                        // off-by-one, like OP_0 in a scriptSig
                        let mut items = vec![vec![]];
                        items.extend(ordered_sigs);
                        items
                    }
                    ScriptTemplate::PubKey => ordered_sigs,
                    ScriptTemplate::PubKeyHash => {
                        vec![ordered_sigs[0].clone(), signer_pubkey]
                    }
                    other => {
                        return Err(TxError::UnsupportedTemplate(format!(
                            "Cannot finalize input #{} spending a {:?} witness script",
                            index, other
                        )))
                    }
                };
                payments::p2wsh_witness(inner, &spend.script)
            } else {
                payments::p2wpkh_witness(&ordered_sigs[0], &signer_pubkey)
            };
            let script_sig = match &self.inputs[index].redeem_script {
                Some(redeem) => Some(compile(&[ScriptChunk::Push(redeem.clone())])),
                None => None,
            };
            (script_sig, Some(witness))
        } else {
            let inner = match template {
                ScriptTemplate::PubKey => payments::p2pk_input(&ordered_sigs[0]),
                ScriptTemplate::PubKeyHash => {
                    payments::p2pkh_input(&ordered_sigs[0], &signer_pubkey)
                }
                ScriptTemplate::Multisig => payments::p2ms_input(&ordered_sigs),
                other => {
                    return Err(TxError::UnsupportedTemplate(format!(
                        "Cannot finalize input #{} spending a {:?} script",
                        index, other
                    )))
                }
            };
            let script_sig = if spend.is_p2sh {
                // spend.script is the redeem script in the legacy p2sh case
                payments::p2sh_input(&inner, &spend.script)?
            } else {
                inner
            };
            (Some(script_sig), None)
        };

        let input = &mut self.inputs[index];
        input.final_script_sig = final_script_sig;
        input.final_script_witness = final_script_witness;
        input.partial_sigs.clear();
        input.redeem_script = None;
        input.witness_script = None;
        input.sighash_type = None;
        Ok(())
    }

    /// Finalize every input, reporting a per-input result so one
    /// unsupported template doesn't hide the others
    pub fn finalize_all_inputs(&mut self) -> Vec<Result<()>> {
        (0..self.inputs.len())
            .map(|index| self.finalize_input(index))
            .collect()
    }

    /// Copy every final scriptSig/witness into a clone of the owned
    /// transaction. Requires all inputs finalized; does not mutate the PSBT.
    pub fn extract_transaction(&self) -> Result<Transaction> {
        if let Some(pos) = self.inputs.iter().position(|input| !input.is_finalized()) {
            return Err(TxError::PolicyViolation(format!(
                "Cannot extract: input #{} is not finalized",
                pos
            )));
        }
        let mut tx = self.tx.clone();
        for (tx_input, record) in tx.inputs.iter_mut().zip(&self.inputs) {
            if let Some(script_sig) = &record.final_script_sig {
                tx_input.script_sig = script_sig.clone();
            }
            if let Some(witness) = &record.final_script_witness {
                tx_input.witness = witness.clone();
            }
        }
        Ok(tx)
    }
}

impl Default for Psbt {
    fn default() -> Self {
        Psbt::new()
    }
}

/// The redeem/witness program must be P2WPKH-shaped to stand in as the spend
/// script
fn p2wpkh_program(script: &[u8], index: usize) -> Result<ByteString> {
    if classify_output(script) != ScriptTemplate::WitnessPubKeyHash {
        return Err(TxError::UnsupportedTemplate(format!(
            "Input #{} witness program is not P2WPKH and no witness script was provided",
            index
        )));
    }
    Ok(script.to_vec())
}

/// P2WPKH signs with the P2PKH template for its script code
fn p2pkh_script_code(p2wpkh_script: &[u8]) -> Result<ByteString> {
    if p2wpkh_script.len() != 22 {
        return Err(TxError::MalformedInput(
            "Malformed P2WPKH script".to_string(),
        ));
    }
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&p2wpkh_script[2..22]);
    Ok(payments::p2pkh_output(&hash))
}

/// Redeem script must hash to the P2SH scriptPubKey it claims to satisfy
fn check_redeem_script(index: usize, script_pubkey: &[u8], redeem_script: &[u8]) -> Result<()> {
    let expected = payments::p2sh_output(&hash160(redeem_script));
    if expected != script_pubkey {
        return Err(TxError::ValidationMismatch(format!(
            "Redeem script for input #{} doesn't match the scriptPubKey in the prevout",
            index
        )));
    }
    Ok(())
}

/// Witness script must hash to the P2WSH program it claims to satisfy
fn check_witness_script(index: usize, script_pubkey: &[u8], witness_script: &[u8]) -> Result<()> {
    let expected = payments::p2wsh_output(&sha256(witness_script));
    if expected != script_pubkey {
        return Err(TxError::ValidationMismatch(format!(
            "Witness script for input #{} doesn't match the scriptPubKey in the prevout",
            index
        )));
    }
    Ok(())
}

/// The signer's key must appear in the script, directly or by hash160
fn check_script_for_pubkey(index: usize, pubkey: &[u8], spend_script: &[u8]) -> Result<()> {
    let pubkey_hash = hash160(pubkey);
    let chunks = script::decompile(spend_script)?;
    let present = chunks.iter().any(|chunk| match chunk {
        ScriptChunk::Push(data) => data.as_slice() == pubkey || data.as_slice() == pubkey_hash,
        ScriptChunk::Op(_) => false,
    });
    if !present {
        return Err(TxError::ValidationMismatch(format!(
            "Cannot sign input #{} with key {}: key not present in script",
            index,
            hex::encode(pubkey)
        )));
    }
    Ok(())
}
