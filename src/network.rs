//! Network parameter sets
//!
//! Version bytes and bech32 prefixes are presentation attributes consumed by
//! address/WIF codecs outside this crate. They are threaded explicitly
//! through constructors; there is no global network state.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParams {
    /// WIF private-key version byte
    pub wif: u8,
    /// Base58check P2PKH address version byte
    pub p2pkh: u8,
    /// Base58check P2SH address version byte
    pub p2sh: u8,
    /// Bech32/bech32m human-readable prefix for witness addresses
    pub bech32_hrp: &'static str,
}

pub const BITCOIN: NetworkParams = NetworkParams {
    wif: 0x80,
    p2pkh: 0x00,
    p2sh: 0x05,
    bech32_hrp: "bc",
};

pub const TESTNET: NetworkParams = NetworkParams {
    wif: 0xef,
    p2pkh: 0x6f,
    p2sh: 0xc4,
    bech32_hrp: "tb",
};

pub const REGTEST: NetworkParams = NetworkParams {
    wif: 0xef,
    p2pkh: 0x6f,
    p2sh: 0xc4,
    bech32_hrp: "bcrt",
};
