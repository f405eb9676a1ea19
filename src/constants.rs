//! Protocol constants used across the signing core

/// Sign all inputs and all outputs
pub const SIGHASH_ALL: u32 = 0x01;

/// Sign all inputs, no outputs
pub const SIGHASH_NONE: u32 = 0x02;

/// Sign all inputs and only the same-index output
pub const SIGHASH_SINGLE: u32 = 0x03;

/// Modifier: sign only the input being signed
pub const SIGHASH_ANYONECANPAY: u32 = 0x80;

/// Mask selecting the output-mode bits of a sighash type
pub const SIGHASH_OUTPUT_MASK: u32 = 0x1f;

/// Default sequence number for new inputs
pub const SEQUENCE_FINAL: u32 = 0xffff_ffff;

/// Maximum script length accepted by the decompiler
pub const MAX_SCRIPT_SIZE: usize = 10_000;

/// Tapscript leaf version (BIP342)
pub const LEAF_VERSION_TAPSCRIPT: u8 = 0xc0;

/// secp256k1 group order n, big-endian
pub const SECP256K1_ORDER: [u8; 32] = [
    0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xfe,
    0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c, 0xd0, 0x36, 0x41, 0x41,
];

/// secp256k1 group order n / 2, big-endian (low-S boundary)
pub const SECP256K1_HALF_ORDER: [u8; 32] = [
    0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0x5d, 0x57, 0x6e, 0x73, 0x57, 0xa4, 0x50, 0x1d, 0xdf, 0xe9, 0x2f, 0x46, 0x68, 0x1b, 0x20, 0xa0,
];

/// Degenerate legacy sighash returned for SIGHASH_SINGLE with no matching
/// output (and for an out-of-range input index). Historical quirk, kept
/// bit-exact for wire compatibility.
pub const SIGHASH_ONE: [u8; 32] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x01,
];
