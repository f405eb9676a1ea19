//! End-to-end signing flows: fund, sign, finalize, extract, and verify the
//! extracted transaction cryptographically against the digest it commits to.

use secp256k1::{Message, PublicKey, Secp256k1};

use txforge::constants::{SEQUENCE_FINAL, SIGHASH_ALL};
use txforge::hashes::hash160;
use txforge::keys::KeyPair;
use txforge::network::BITCOIN;
use txforge::payments;
use txforge::psbt::{Psbt, WitnessUtxo};
use txforge::script::{decompile, ScriptChunk};
use txforge::signature::EcdsaSignature;
use txforge::types::{ByteString, OutPoint, Transaction, TransactionInput, TransactionOutput};
use txforge::TxError;

fn keypair(tag: u8) -> KeyPair {
    KeyPair::from_secret_bytes(&[tag; 32], true, BITCOIN).unwrap()
}

/// Previous transaction paying `script_pubkey` at output 0, plus a PSBT
/// spending that output into a fresh P2WPKH destination
fn funded_psbt(script_pubkey: ByteString, value: u64) -> (Transaction, Psbt) {
    let prev_tx = Transaction {
        version: 1,
        inputs: vec![TransactionInput {
            prevout: OutPoint {
                hash: [0x33; 32],
                index: 1,
            },
            script_sig: vec![0x51],
            sequence: SEQUENCE_FINAL,
            witness: vec![],
        }],
        outputs: vec![TransactionOutput {
            value,
            script_pubkey,
        }],
        lock_time: 0,
    };
    let mut psbt = Psbt::new();
    psbt.add_input(
        OutPoint {
            hash: prev_tx.tx_hash(),
            index: 0,
        },
        None,
    )
    .unwrap();
    psbt.add_output(payments::p2wpkh_output(&[0xaa; 20]), value - 5_000)
        .unwrap();
    (prev_tx, psbt)
}

fn verify_script_signature(
    script_signature: &[u8],
    digest: &[u8; 32],
    pubkey_bytes: &[u8],
) -> u32 {
    let (sig, hash_type) = EcdsaSignature::from_script_signature(script_signature).unwrap();
    let mut compact = [0u8; 64];
    compact[..32].copy_from_slice(&sig.r);
    compact[32..].copy_from_slice(&sig.s);
    let secp = Secp256k1::new();
    let secp_sig = secp256k1::ecdsa::Signature::from_compact(&compact).unwrap();
    let message = Message::from_digest_slice(digest).unwrap();
    let public = PublicKey::from_slice(pubkey_bytes).unwrap();
    assert!(secp.verify_ecdsa(&message, &secp_sig, &public).is_ok());
    hash_type
}

#[test]
fn test_p2wpkh_end_to_end() {
    let pair = keypair(0x51);
    let pubkey = pair.public_key_bytes();
    let spk = payments::p2wpkh_output(&hash160(&pubkey));
    let (_, mut psbt) = funded_psbt(spk.clone(), 250_000);

    psbt.set_witness_utxo(
        0,
        WitnessUtxo {
            value: 250_000,
            script_pubkey: spk,
        },
    )
    .unwrap();
    psbt.sign_input(0, &pair).unwrap();
    psbt.finalize_input(0).unwrap();
    let tx = psbt.extract_transaction().unwrap();

    assert!(tx.has_witnesses());
    assert!(tx.inputs[0].script_sig.is_empty());
    assert_eq!(tx.inputs[0].witness.len(), 2);
    assert_eq!(tx.inputs[0].witness[1], pubkey);

    // P2WPKH commits to the implied P2PKH script code over the spent value
    let script_code = payments::p2pkh_output(&hash160(&pubkey));
    let digest = tx
        .hash_for_witness_v0(0, &script_code, 250_000, SIGHASH_ALL)
        .unwrap();
    let hash_type = verify_script_signature(&tx.inputs[0].witness[0], &digest, &pubkey);
    assert_eq!(hash_type, SIGHASH_ALL);

    // witness data must not perturb the txid
    assert_eq!(tx.tx_id(), psbt.unsigned_tx().tx_id());

    // and the result must survive the wire codec
    let reparsed = Transaction::from_buffer(&tx.to_buffer()).unwrap();
    assert_eq!(reparsed, tx);
}

#[test]
fn test_legacy_p2pkh_end_to_end() {
    let pair = keypair(0x52);
    let pubkey = pair.public_key_bytes();
    let spk = payments::p2pkh_output(&hash160(&pubkey));
    let (prev_tx, mut psbt) = funded_psbt(spk.clone(), 90_000);

    psbt.set_non_witness_utxo(0, prev_tx).unwrap();
    psbt.sign_input(0, &pair).unwrap();
    psbt.finalize_input(0).unwrap();
    let tx = psbt.extract_transaction().unwrap();

    assert!(!tx.has_witnesses());
    let chunks = decompile(&tx.inputs[0].script_sig).unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[1], ScriptChunk::Push(pubkey.clone()));

    let digest = tx.hash_for_signature(0, &spk, SIGHASH_ALL).unwrap();
    let script_signature = match &chunks[0] {
        ScriptChunk::Push(data) => data.clone(),
        other => panic!("expected signature push, got {:?}", other),
    };
    verify_script_signature(&script_signature, &digest, &pubkey);
}

#[test]
fn test_p2sh_p2wpkh_end_to_end() {
    let pair = keypair(0x53);
    let pubkey = pair.public_key_bytes();
    let redeem = payments::p2wpkh_output(&hash160(&pubkey));
    let spk = payments::p2sh_output(&hash160(&redeem));
    let (_, mut psbt) = funded_psbt(spk.clone(), 120_000);

    psbt.set_witness_utxo(
        0,
        WitnessUtxo {
            value: 120_000,
            script_pubkey: spk,
        },
    )
    .unwrap();
    psbt.set_redeem_script(0, redeem.clone()).unwrap();
    psbt.sign_input(0, &pair).unwrap();
    psbt.finalize_input(0).unwrap();
    let tx = psbt.extract_transaction().unwrap();

    // scriptSig carries only the redeem-script push; signatures live in the
    // witness
    let chunks = decompile(&tx.inputs[0].script_sig).unwrap();
    assert_eq!(chunks, vec![ScriptChunk::Push(redeem)]);
    assert_eq!(tx.inputs[0].witness.len(), 2);

    let script_code = payments::p2pkh_output(&hash160(&pubkey));
    let digest = tx
        .hash_for_witness_v0(0, &script_code, 120_000, SIGHASH_ALL)
        .unwrap();
    verify_script_signature(&tx.inputs[0].witness[0], &digest, &pubkey);
}

#[test]
fn test_p2sh_p2wsh_multisig_end_to_end() {
    let pair_a = keypair(0x61);
    let pair_b = keypair(0x62);
    let witness_script = payments::p2ms_output(
        2,
        &[pair_a.public_key_bytes(), pair_b.public_key_bytes()],
    )
    .unwrap();
    let redeem = payments::p2wsh_output(&txforge::hashes::sha256(&witness_script));
    let spk = payments::p2sh_output(&hash160(&redeem));
    let (_, mut psbt) = funded_psbt(spk.clone(), 400_000);

    psbt.set_witness_utxo(
        0,
        WitnessUtxo {
            value: 400_000,
            script_pubkey: spk,
        },
    )
    .unwrap();
    psbt.set_redeem_script(0, redeem.clone()).unwrap();
    psbt.set_witness_script(0, witness_script.clone()).unwrap();

    // sign in reverse key order; finalization reorders by script order
    psbt.sign_input(0, &pair_b).unwrap();
    psbt.sign_input(0, &pair_a).unwrap();
    psbt.finalize_input(0).unwrap();
    let tx = psbt.extract_transaction().unwrap();

    let witness = &tx.inputs[0].witness;
    assert_eq!(witness.len(), 4);
    assert!(witness[0].is_empty());
    assert_eq!(witness[3], witness_script);

    let digest = tx
        .hash_for_witness_v0(0, &witness_script, 400_000, SIGHASH_ALL)
        .unwrap();
    verify_script_signature(&witness[1], &digest, &pair_a.public_key_bytes());
    verify_script_signature(&witness[2], &digest, &pair_b.public_key_bytes());
}

#[test]
fn test_finalize_all_inputs_reports_per_input() {
    let pair = keypair(0x71);
    let pubkey = pair.public_key_bytes();
    let spk = payments::p2wpkh_output(&hash160(&pubkey));

    let mut psbt = Psbt::new();
    psbt.add_input(
        OutPoint {
            hash: [0x01; 32],
            index: 0,
        },
        None,
    )
    .unwrap();
    psbt.add_input(
        OutPoint {
            hash: [0x02; 32],
            index: 0,
        },
        None,
    )
    .unwrap();
    psbt.add_output(payments::p2wpkh_output(&[0xbb; 20]), 10_000)
        .unwrap();

    psbt.set_witness_utxo(
        0,
        WitnessUtxo {
            value: 20_000,
            script_pubkey: spk,
        },
    )
    .unwrap();
    psbt.sign_input(0, &pair).unwrap();
    // input 1 never gets funding data

    let results = psbt.finalize_all_inputs();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(TxError::PolicyViolation(_))));

    // extraction still refuses until every input is final
    assert!(matches!(
        psbt.extract_transaction(),
        Err(TxError::PolicyViolation(_))
    ));
}

#[test]
fn test_sighash_type_is_carried_into_signature() {
    let pair = keypair(0x72);
    let pubkey = pair.public_key_bytes();
    let spk = payments::p2wpkh_output(&hash160(&pubkey));
    let (_, mut psbt) = funded_psbt(spk.clone(), 80_000);

    psbt.set_witness_utxo(
        0,
        WitnessUtxo {
            value: 80_000,
            script_pubkey: spk,
        },
    )
    .unwrap();
    psbt.set_sighash_type(0, txforge::constants::SIGHASH_SINGLE)
        .unwrap();
    psbt.sign_input(0, &pair).unwrap();
    psbt.finalize_input(0).unwrap();
    let tx = psbt.extract_transaction().unwrap();

    let script_code = payments::p2pkh_output(&hash160(&pubkey));
    let digest = tx
        .hash_for_witness_v0(
            0,
            &script_code,
            80_000,
            txforge::constants::SIGHASH_SINGLE,
        )
        .unwrap();
    let hash_type = verify_script_signature(&tx.inputs[0].witness[0], &digest, &pubkey);
    assert_eq!(hash_type, txforge::constants::SIGHASH_SINGLE);
}

#[test]
fn test_extracted_transaction_weight_counts_witness_discount() {
    let pair = keypair(0x73);
    let pubkey = pair.public_key_bytes();
    let spk = payments::p2wpkh_output(&hash160(&pubkey));
    let (_, mut psbt) = funded_psbt(spk.clone(), 60_000);

    psbt.set_witness_utxo(
        0,
        WitnessUtxo {
            value: 60_000,
            script_pubkey: spk,
        },
    )
    .unwrap();
    psbt.sign_input(0, &pair).unwrap();
    psbt.finalize_input(0).unwrap();
    let tx = psbt.extract_transaction().unwrap();

    let total = tx.to_buffer().len();
    let base = tx.to_buffer_no_witness().len();
    assert_eq!(tx.weight(), base * 3 + total);
    assert_eq!(tx.virtual_size(), (tx.weight() + 3) / 4);
    assert!(tx.virtual_size() < total);
}
