use crate::block::{Block, OpenBlock};
use crate::crypto::{Hash, KeyPair, PublicKey, SecretKey};
use crate::network::Network;
use lazy_static::lazy_static;

/// Raw balance unit, 128 bits.
pub type Amount = u128;

/// One LAT in raw units.
pub const UNIT: Amount = 1_000_000_000_000_000_000_000_000;

/// The entire supply, held by the genesis account at launch.
pub const GENESIS_AMOUNT: Amount = Amount::MAX;

/// Version triple advertised in message headers.
pub const PROTOCOL_VERSION: u8 = 1;
pub const PROTOCOL_VERSION_MIN: u8 = 1;

// Genesis signing keys. The main network key is a placeholder until the
// launch record is frozen; the dev key is deliberately public so test
// lattices can spend from genesis.
const MAINNET_GENESIS_SECRET: [u8; 32] = [
    0x9f, 0x1d, 0x53, 0x78, 0x0b, 0xb4, 0x2a, 0xe0, 0x44, 0x91, 0x6c, 0x2d, 0x83, 0x5e, 0x07,
    0x61, 0xd2, 0xaf, 0x38, 0x96, 0x5a, 0xc3, 0x11, 0x84, 0xfa, 0x20, 0x6b, 0x4d, 0xe9, 0x72,
    0xc5, 0x0e,
];

const DEV_GENESIS_SECRET: [u8; 32] = [
    0x34, 0xf0, 0xa3, 0x7a, 0xad, 0x20, 0xf4, 0xa2, 0x60, 0xf0, 0xa5, 0xb3, 0xcb, 0x3d, 0x7f,
    0xb5, 0x06, 0x73, 0x21, 0x2a, 0x6b, 0x88, 0x66, 0x15, 0x77, 0x2f, 0x35, 0x2a, 0xfb, 0x42,
    0xc7, 0x6e,
];

lazy_static! {
    pub static ref MAINNET_GENESIS_KEY: KeyPair =
        KeyPair::from_secret(SecretKey::from_bytes(MAINNET_GENESIS_SECRET));
    pub static ref DEV_GENESIS_KEY: KeyPair =
        KeyPair::from_secret(SecretKey::from_bytes(DEV_GENESIS_SECRET));
    static ref MAINNET_GENESIS: Block = genesis_open(&MAINNET_GENESIS_KEY);
    static ref DEV_GENESIS: Block = genesis_open(&DEV_GENESIS_KEY);
}

// The genesis open block references its own account as source and
// represents itself. It is written directly at store initialization and
// never goes through block processing, so it carries no work nonce.
fn genesis_open(key: &KeyPair) -> Block {
    OpenBlock::new(Hash::from(*key.public_key()), *key.public_key(), key, 0).into()
}

pub fn genesis_key(network: Network) -> &'static KeyPair {
    match network {
        Network::Mainnet => &MAINNET_GENESIS_KEY,
        Network::Testnet | Network::Devnet => &DEV_GENESIS_KEY,
    }
}

pub fn genesis(network: Network) -> &'static Block {
    match network {
        Network::Mainnet => &MAINNET_GENESIS,
        Network::Testnet | Network::Devnet => &DEV_GENESIS,
    }
}

pub fn genesis_account(network: Network) -> PublicKey {
    *genesis_key(network).public_key()
}
