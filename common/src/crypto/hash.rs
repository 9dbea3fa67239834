use crate::serializer::{Reader, ReaderError, Serializer, Writer};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::de::Error as SerdeError;
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    convert::TryInto,
    fmt::{Display, Error, Formatter},
    hash::Hasher,
    str::FromStr,
};

pub const HASH_SIZE: usize = 32; // 32 bytes / 256 bits

type Blake2b256 = Blake2b<U32>;

#[derive(Eq, PartialEq, PartialOrd, Ord, Clone, Copy, Debug)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    pub const fn new(bytes: [u8; HASH_SIZE]) -> Self {
        Hash(bytes)
    }

    pub const fn zero() -> Self {
        Hash::new([0; HASH_SIZE])
    }

    pub const fn max() -> Self {
        Hash::new([u8::MAX; HASH_SIZE])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn to_bytes(self) -> [u8; HASH_SIZE] {
        self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl FromStr for Hash {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|_| "Invalid hex string")?;
        let bytes: [u8; HASH_SIZE] = bytes.try_into().map_err(|_| "Invalid hash")?;
        Ok(Hash::new(bytes))
    }
}

impl From<u64> for Hash {
    fn from(value: u64) -> Self {
        let mut bytes = [0u8; HASH_SIZE];
        bytes[HASH_SIZE - 8..].copy_from_slice(&value.to_be_bytes());
        Hash::new(bytes)
    }
}

// Hash a byte array using blake2b-256
#[inline(always)]
pub fn hash(value: &[u8]) -> Hash {
    let mut hasher = Blake2b256::new();
    hasher.update(value);
    let result: [u8; HASH_SIZE] = hasher.finalize().into();
    Hash(result)
}

impl Serializer for Hash {
    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_hash()
    }

    fn write(&self, writer: &mut Writer) {
        writer.write_hash(self);
    }

    fn size(&self) -> usize {
        HASH_SIZE
    }
}

impl std::hash::Hash for Hash {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl AsRef<Hash> for Hash {
    fn as_ref(&self) -> &Hash {
        self
    }
}

impl AsRef<[u8]> for Hash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Display for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        write!(f, "{}", &self.to_hex())
    }
}

impl Serialize for Hash {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'a> Deserialize<'a> for Hash {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'a>,
    {
        let hex = String::deserialize(deserializer)?;
        if hex.len() != HASH_SIZE * 2 {
            return Err(SerdeError::custom("Invalid hex length"));
        }

        let decoded_hex = hex::decode(hex).map_err(SerdeError::custom)?;
        let bytes: [u8; 32] = decoded_hex
            .try_into()
            .map_err(|_| SerdeError::custom("Could not transform hex to bytes array for Hash"))?;
        Ok(Hash::new(bytes))
    }
}

impl<'a> From<Hash> for Cow<'a, Hash> {
    fn from(hash: Hash) -> Self {
        Cow::Owned(hash)
    }
}

impl<'a> From<&'a Hash> for Cow<'a, Hash> {
    fn from(hash: &'a Hash) -> Self {
        Cow::Borrowed(hash)
    }
}

pub trait Hashable: Serializer {
    #[inline(always)]
    fn hash(&self) -> Hash {
        let bytes = self.to_bytes();
        hash(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_deterministic() {
        let a = hash(b"lattice");
        let b = hash(b"lattice");
        assert_eq!(a, b);
        assert_ne!(a, hash(b"lettuce"));
    }

    #[test]
    fn test_hex_round_trip() {
        let original = hash(b"some data");
        let parsed = Hash::from_str(&original.to_hex()).unwrap();
        assert_eq!(original, parsed);
    }

    #[test]
    fn test_serde_hex_representation() {
        let original = hash(b"serde");
        let json = serde_json::to_string(&original).unwrap();
        assert_eq!(json, format!("\"{}\"", original.to_hex()));
        let parsed: Hash = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_from_u64_is_big_endian() {
        let h = Hash::from(1u64);
        assert_eq!(h.as_bytes()[31], 1);
        assert!(h.as_bytes()[..31].iter().all(|b| *b == 0));
    }
}
