//! Cross-module checks over the public API: payment builders feeding the
//! classifier, signature codecs feeding script signatures, and taproot
//! commitments feeding outputs.

use txforge::constants::{LEAF_VERSION_TAPSCRIPT, SIGHASH_ALL};
use txforge::hashes::hash160;
use txforge::keys::KeyPair;
use txforge::network::BITCOIN;
use txforge::payments;
use txforge::script::{classify_output, from_asm, to_asm, ScriptTemplate};
use txforge::signature::EcdsaSignature;
use txforge::taproot::{leaf_hash, root_hash_from_tree, tweak_key, TapTree};

fn keypair(tag: u8) -> KeyPair {
    KeyPair::from_secret_bytes(&[tag; 32], true, BITCOIN).unwrap()
}

#[test]
fn test_payment_builders_classify_as_their_template() {
    let pubkey = keypair(0x11).public_key_bytes();
    assert_eq!(
        classify_output(&payments::p2pkh_output(&[1; 20])),
        ScriptTemplate::PubKeyHash
    );
    assert_eq!(
        classify_output(&payments::p2sh_output(&[1; 20])),
        ScriptTemplate::ScriptHash
    );
    assert_eq!(
        classify_output(&payments::p2wpkh_output(&[1; 20])),
        ScriptTemplate::WitnessPubKeyHash
    );
    assert_eq!(
        classify_output(&payments::p2wsh_output(&[1; 32])),
        ScriptTemplate::WitnessScriptHash
    );
    assert_eq!(
        classify_output(&payments::p2tr_output(&[1; 32])),
        ScriptTemplate::Taproot
    );
    assert_eq!(
        classify_output(&payments::p2pk_output(&pubkey).unwrap()),
        ScriptTemplate::PubKey
    );
    assert_eq!(
        classify_output(&payments::p2ms_output(1, &[pubkey]).unwrap()),
        ScriptTemplate::Multisig
    );
}

#[test]
fn test_asm_round_trips_payment_scripts() {
    for script in [
        payments::p2pkh_output(&[0x42; 20]),
        payments::p2sh_output(&[0x42; 20]),
        payments::p2wpkh_output(&[0x42; 20]),
        payments::p2tr_output(&[0x42; 32]),
    ] {
        let asm = to_asm(&script).unwrap();
        assert_eq!(from_asm(&asm).unwrap(), script);
    }
    let asm = to_asm(&payments::p2pkh_output(&[0x42; 20])).unwrap();
    assert!(asm.starts_with("OP_DUP OP_HASH160 "));
}

#[test]
fn test_signature_survives_script_signature_round_trip() {
    let pair = keypair(0x21);
    let sig = pair.sign_ecdsa(&[0x5a; 32]).unwrap();
    let script_signature = sig.to_script_signature(SIGHASH_ALL).unwrap();
    let (parsed, hash_type) = EcdsaSignature::from_script_signature(&script_signature).unwrap();
    assert_eq!(parsed, sig);
    assert_eq!(hash_type, SIGHASH_ALL);
    // the embedded DER must itself re-parse
    let der = &script_signature[..script_signature.len() - 1];
    assert_eq!(EcdsaSignature::from_der(der).unwrap(), sig);
}

#[test]
fn test_taproot_script_path_commitment() {
    let internal = {
        let pair = keypair(0x31);
        let mut x = [0u8; 32];
        x.copy_from_slice(&pair.public_key_bytes()[1..]);
        x
    };
    let tree = TapTree::Branch(
        Box::new(TapTree::Leaf {
            script: vec![0x51],
            version: LEAF_VERSION_TAPSCRIPT,
        }),
        Box::new(TapTree::Leaf {
            script: vec![0x52],
            version: LEAF_VERSION_TAPSCRIPT,
        }),
    );
    let root = root_hash_from_tree(&tree);
    let tweaked = tweak_key(&internal, &root).unwrap();
    let spk = payments::p2tr_output(&tweaked.output_key);
    assert_eq!(classify_output(&spk), ScriptTemplate::Taproot);

    // a different tree commits to a different output key
    let other_root = leaf_hash(&[0x53], LEAF_VERSION_TAPSCRIPT);
    let other = tweak_key(&internal, &other_root).unwrap();
    assert_ne!(other.output_key, tweaked.output_key);
}

#[test]
fn test_hash160_matches_p2pkh_chain() {
    // the pubkey hash inside a P2PKH script is hash160 of the key
    let pubkey = keypair(0x41).public_key_bytes();
    let spk = payments::p2pkh_output(&hash160(&pubkey));
    assert_eq!(&spk[3..23], &hash160(&pubkey));
}
