use crate::crypto::{hash, Hash};
use crate::serializer::{Reader, ReaderError, Serializer, Writer};
use blake2::digest::consts::U5;
use blake2::{Blake2b, Digest};
use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::de::Error as SerdeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of a public key / account in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of an ed25519 signature in bytes.
pub const SIGNATURE_SIZE: usize = 64;

const ACCOUNT_PREFIX: &str = "lat_";
const ACCOUNT_ALPHABET: &[u8; 32] = b"13456789abcdefghijkmnopqrstuwxyz";
const ACCOUNT_CHECKSUM_SIZE: usize = 5;
// 4 padding bits + 256 key bits + 40 checksum bits, 5 bits per character
const ACCOUNT_ENCODED_LEN: usize = 60;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    #[error("Invalid key length: expected {KEY_SIZE}, got {0}")]
    InvalidKeyLength(usize),
    #[error("Invalid hex string")]
    InvalidHex,
    #[error("Invalid account string")]
    InvalidAccount,
    #[error("Account checksum mismatch")]
    ChecksumMismatch,
}

/// An account on the lattice, identified by its ed25519 public key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey([u8; KEY_SIZE]);

impl PublicKey {
    pub const fn new(bytes: [u8; KEY_SIZE]) -> Self {
        PublicKey(bytes)
    }

    pub const fn zero() -> Self {
        PublicKey([0; KEY_SIZE])
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        if slice.len() != KEY_SIZE {
            return Err(KeyError::InvalidKeyLength(slice.len()));
        }
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(slice);
        Ok(PublicKey(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex).map_err(|_| KeyError::InvalidHex)?;
        Self::from_slice(&bytes)
    }

    /// Verify `signature` over `message` under this key.
    ///
    /// A key that is not a valid curve point never verifies.
    pub fn verify(&self, message: &[u8], signature: &Signature) -> bool {
        let Ok(verifying) = VerifyingKey::from_bytes(&self.0) else {
            return false;
        };
        let signature = DalekSignature::from_bytes(signature.as_bytes());
        verifying.verify_strict(message, &signature).is_ok()
    }

    /// Encode the key in the human account form: `lat_` followed by the
    /// base32 key bits and a 5-byte blake2b checksum.
    pub fn to_address(&self) -> String {
        let checksum = account_checksum(&self.0);

        let mut bits = Vec::with_capacity(ACCOUNT_ENCODED_LEN * 5);
        bits.extend_from_slice(&[0u8; 4]);
        push_bits(&mut bits, &self.0);
        push_bits(&mut bits, &checksum);

        let mut address = String::with_capacity(ACCOUNT_PREFIX.len() + ACCOUNT_ENCODED_LEN);
        address.push_str(ACCOUNT_PREFIX);
        for chunk in bits.chunks(5) {
            let mut index = 0usize;
            for bit in chunk {
                index = (index << 1) | *bit as usize;
            }
            address.push(ACCOUNT_ALPHABET[index] as char);
        }
        address
    }

    pub fn from_address(address: &str) -> Result<Self, KeyError> {
        let encoded = address
            .strip_prefix(ACCOUNT_PREFIX)
            .ok_or(KeyError::InvalidAccount)?;
        if encoded.len() != ACCOUNT_ENCODED_LEN {
            return Err(KeyError::InvalidAccount);
        }

        let mut bits = Vec::with_capacity(ACCOUNT_ENCODED_LEN * 5);
        for c in encoded.bytes() {
            let index = ACCOUNT_ALPHABET
                .iter()
                .position(|a| *a == c)
                .ok_or(KeyError::InvalidAccount)? as u8;
            for shift in (0..5).rev() {
                bits.push((index >> shift) & 1);
            }
        }
        if bits[..4].iter().any(|b| *b != 0) {
            return Err(KeyError::InvalidAccount);
        }

        let mut data = [0u8; KEY_SIZE + ACCOUNT_CHECKSUM_SIZE];
        for (i, chunk) in bits[4..].chunks(8).enumerate() {
            let mut value = 0u8;
            for bit in chunk {
                value = (value << 1) | *bit;
            }
            data[i] = value;
        }

        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&data[..KEY_SIZE]);
        if account_checksum(&key) != data[KEY_SIZE..] {
            return Err(KeyError::ChecksumMismatch);
        }
        Ok(PublicKey(key))
    }
}

fn account_checksum(key: &[u8; KEY_SIZE]) -> [u8; ACCOUNT_CHECKSUM_SIZE] {
    let mut hasher = Blake2b::<U5>::new();
    hasher.update(key);
    let digest = hasher.finalize();
    let mut checksum = [0u8; ACCOUNT_CHECKSUM_SIZE];
    checksum.copy_from_slice(&digest);
    checksum.reverse();
    checksum
}

fn push_bits(bits: &mut Vec<u8>, bytes: &[u8]) {
    for byte in bytes {
        for shift in (0..8).rev() {
            bits.push((byte >> shift) & 1);
        }
    }
}

impl From<Hash> for PublicKey {
    fn from(hash: Hash) -> Self {
        PublicKey(hash.to_bytes())
    }
}

impl From<PublicKey> for Hash {
    fn from(key: PublicKey) -> Self {
        Hash::new(key.0)
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.to_hex())
    }
}

impl FromStr for PublicKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'a> Deserialize<'a> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'a>,
    {
        let hex = String::deserialize(deserializer)?;
        PublicKey::from_hex(&hex).map_err(SerdeError::custom)
    }
}

impl Serializer for PublicKey {
    fn write(&self, writer: &mut Writer) {
        writer.write_key(self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_key()
    }

    fn size(&self) -> usize {
        KEY_SIZE
    }
}

/// An ed25519 secret key, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey([u8; KEY_SIZE]);

impl SecretKey {
    pub const fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        SecretKey(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self, KeyError> {
        if slice.len() != KEY_SIZE {
            return Err(KeyError::InvalidKeyLength(slice.len()));
        }
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(slice);
        Ok(SecretKey(bytes))
    }

    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex).map_err(|_| KeyError::InvalidHex)?;
        Self::from_slice(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn public_key(&self) -> PublicKey {
        let signing = SigningKey::from_bytes(&self.0);
        PublicKey(signing.verifying_key().to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        let signing = SigningKey::from_bytes(&self.0);
        Signature(signing.sign(message).to_bytes())
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive the secret key at `index` from a 32-byte seed.
pub fn deterministic_key(seed: &SecretKey, index: u32) -> SecretKey {
    let mut input = Vec::with_capacity(KEY_SIZE + 4);
    input.extend_from_slice(seed.as_bytes());
    input.extend_from_slice(&index.to_be_bytes());
    SecretKey(hash(&input).to_bytes())
}

/// An ed25519 signature over a block or vote hash.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_SIZE]);

impl Signature {
    pub const fn from_bytes(bytes: [u8; SIGNATURE_SIZE]) -> Self {
        Signature(bytes)
    }

    pub const fn zero() -> Self {
        Signature([0; SIGNATURE_SIZE])
    }

    pub fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(hex: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(hex).map_err(|_| KeyError::InvalidHex)?;
        if bytes.len() != SIGNATURE_SIZE {
            return Err(KeyError::InvalidKeyLength(bytes.len()));
        }
        let mut array = [0u8; SIGNATURE_SIZE];
        array.copy_from_slice(&bytes);
        Ok(Signature(array))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_hex())
    }
}

impl Serialize for Signature {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'a> Deserialize<'a> for Signature {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'a>,
    {
        let hex = String::deserialize(deserializer)?;
        Signature::from_hex(&hex).map_err(SerdeError::custom)
    }
}

impl Serializer for Signature {
    fn write(&self, writer: &mut Writer) {
        writer.write_signature(self);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        reader.read_signature()
    }

    fn size(&self) -> usize {
        SIGNATURE_SIZE
    }
}

/// Signing keypair held by wallets, the node id and tests.
#[derive(Clone)]
pub struct KeyPair {
    secret: SecretKey,
    public: PublicKey,
}

impl KeyPair {
    /// Generate a fresh keypair from the OS CSPRNG.
    pub fn new() -> Self {
        let signing = SigningKey::generate(&mut OsRng);
        let public = PublicKey(signing.verifying_key().to_bytes());
        KeyPair {
            secret: SecretKey(signing.to_bytes()),
            public,
        }
    }

    pub fn from_secret(secret: SecretKey) -> Self {
        let public = secret.public_key();
        KeyPair { secret, public }
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        self.secret.sign(message)
    }
}

impl Default for KeyPair {
    fn default() -> Self {
        KeyPair::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_verify() {
        let key = KeyPair::new();
        let message = b"block hash bytes";
        let signature = key.sign(message);
        assert!(key.public_key().verify(message, &signature));
        assert!(!key.public_key().verify(b"other message", &signature));
    }

    #[test]
    fn test_corrupted_signature_rejected() {
        let key = KeyPair::new();
        let message = b"block hash bytes";
        let signature = key.sign(message);
        let mut bytes = *signature.as_bytes();
        bytes[32] ^= 0x1;
        assert!(!key.public_key().verify(message, &Signature::from_bytes(bytes)));
    }

    #[test]
    fn test_address_round_trip() {
        let key = KeyPair::new();
        let address = key.public_key().to_address();
        assert!(address.starts_with(ACCOUNT_PREFIX));
        let decoded = PublicKey::from_address(&address).unwrap();
        assert_eq!(decoded, *key.public_key());
    }

    #[test]
    fn test_address_checksum_detects_corruption() {
        let key = KeyPair::new();
        let mut address = key.public_key().to_address();
        // swap the last character for a different alphabet member
        let last = address.pop().unwrap();
        let replacement = if last == '1' { '3' } else { '1' };
        address.push(replacement);
        assert!(matches!(
            PublicKey::from_address(&address),
            Err(KeyError::ChecksumMismatch) | Err(KeyError::InvalidAccount)
        ));
    }

    #[test]
    fn test_deterministic_key() {
        let seed = SecretKey::from_bytes([7u8; KEY_SIZE]);
        let first = deterministic_key(&seed, 0);
        let again = deterministic_key(&seed, 0);
        let second = deterministic_key(&seed, 1);
        assert_eq!(first.as_bytes(), again.as_bytes());
        assert_ne!(first.as_bytes(), second.as_bytes());
    }
}
