pub mod hash;
pub mod key;
pub mod random;

pub use hash::{hash, Hash, Hashable, HASH_SIZE};
pub use key::{
    deterministic_key, KeyError, KeyPair, PublicKey, SecretKey, Signature, KEY_SIZE,
    SIGNATURE_SIZE,
};
