use crate::crypto::{Hash, PublicKey, Signature, HASH_SIZE, KEY_SIZE, SIGNATURE_SIZE};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderError {
    #[error("Not enough bytes left in the input")]
    InvalidSize,
    #[error("Invalid value encountered while deserializing")]
    InvalidValue,
    #[error("Invalid hex representation")]
    InvalidHex,
}

// Cursor over a borrowed byte slice. All multi-byte integers are
// big-endian except the work nonce, which is little-endian on the wire.
pub struct Reader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], ReaderError> {
        if self.remaining() < count {
            return Err(ReaderError::InvalidSize);
        }
        let slice = &self.bytes[self.position..self.position + count];
        self.position += count;
        Ok(slice)
    }

    pub fn read_bytes_32(&mut self) -> Result<[u8; 32], ReaderError> {
        let slice = self.read_bytes(32)?;
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Ok(bytes)
    }

    pub fn read_u8(&mut self) -> Result<u8, ReaderError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool, ReaderError> {
        match self.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            _ => Err(ReaderError::InvalidValue),
        }
    }

    pub fn read_u16(&mut self) -> Result<u16, ReaderError> {
        let slice = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([slice[0], slice[1]]))
    }

    pub fn read_u16_le(&mut self) -> Result<u16, ReaderError> {
        let slice = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([slice[0], slice[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, ReaderError> {
        let slice = self.read_bytes(4)?;
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(slice);
        Ok(u32::from_be_bytes(bytes))
    }

    pub fn read_u64(&mut self) -> Result<u64, ReaderError> {
        let slice = self.read_bytes(8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(slice);
        Ok(u64::from_be_bytes(bytes))
    }

    // Work nonces travel little-endian
    pub fn read_u64_le(&mut self) -> Result<u64, ReaderError> {
        let slice = self.read_bytes(8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(slice);
        Ok(u64::from_le_bytes(bytes))
    }

    pub fn read_u128(&mut self) -> Result<u128, ReaderError> {
        let slice = self.read_bytes(16)?;
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(slice);
        Ok(u128::from_be_bytes(bytes))
    }

    pub fn read_hash(&mut self) -> Result<Hash, ReaderError> {
        let slice = self.read_bytes(HASH_SIZE)?;
        let mut bytes = [0u8; HASH_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Hash::new(bytes))
    }

    pub fn read_key(&mut self) -> Result<PublicKey, ReaderError> {
        let slice = self.read_bytes(KEY_SIZE)?;
        let mut bytes = [0u8; KEY_SIZE];
        bytes.copy_from_slice(slice);
        Ok(PublicKey::new(bytes))
    }

    pub fn read_signature(&mut self) -> Result<Signature, ReaderError> {
        let slice = self.read_bytes(SIGNATURE_SIZE)?;
        let mut bytes = [0u8; SIGNATURE_SIZE];
        bytes.copy_from_slice(slice);
        Ok(Signature::from_bytes(bytes))
    }
}
