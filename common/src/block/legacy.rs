use crate::config::Amount;
use crate::crypto::{hash, Hash, KeyPair, PublicKey, Signature};
use crate::serializer::{Reader, ReaderError, Serializer, Writer};
use super::BlockType;

// The four original block kinds. Each hashes a type tag followed by its
// own fields; signature and work are excluded from the hash.

/// Debits the signer's chain and parks the amount as a pending entry for
/// the destination.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SendBlock {
    pub previous: Hash,
    pub destination: PublicKey,
    /// Balance remaining on the chain after the send.
    pub balance: Amount,
    pub signature: Signature,
    pub work: u64,
}

impl SendBlock {
    pub fn new(
        previous: Hash,
        destination: PublicKey,
        balance: Amount,
        key: &KeyPair,
        work: u64,
    ) -> Self {
        let mut block = SendBlock {
            previous,
            destination,
            balance,
            signature: Signature::zero(),
            work,
        };
        block.signature = key.sign(block.hash().as_bytes());
        block
    }

    pub fn hash(&self) -> Hash {
        let mut writer = Writer::with_capacity(1 + 32 + 32 + 16);
        writer.write_u8(BlockType::Send as u8);
        writer.write_hash(&self.previous);
        writer.write_key(&self.destination);
        writer.write_u128(self.balance);
        hash(&writer.into_bytes())
    }
}

impl Serializer for SendBlock {
    fn write(&self, writer: &mut Writer) {
        writer.write_hash(&self.previous);
        writer.write_key(&self.destination);
        writer.write_u128(self.balance);
        writer.write_signature(&self.signature);
        writer.write_u64_le(self.work);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(SendBlock {
            previous: reader.read_hash()?,
            destination: reader.read_key()?,
            balance: reader.read_u128()?,
            signature: reader.read_signature()?,
            work: reader.read_u64_le()?,
        })
    }

    fn size(&self) -> usize {
        32 + 32 + 16 + 64 + 8
    }
}

/// Claims a pending entry created by a send.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceiveBlock {
    pub previous: Hash,
    /// Hash of the send block being received.
    pub source: Hash,
    pub signature: Signature,
    pub work: u64,
}

impl ReceiveBlock {
    pub fn new(previous: Hash, source: Hash, key: &KeyPair, work: u64) -> Self {
        let mut block = ReceiveBlock {
            previous,
            source,
            signature: Signature::zero(),
            work,
        };
        block.signature = key.sign(block.hash().as_bytes());
        block
    }

    pub fn hash(&self) -> Hash {
        let mut writer = Writer::with_capacity(1 + 32 + 32);
        writer.write_u8(BlockType::Receive as u8);
        writer.write_hash(&self.previous);
        writer.write_hash(&self.source);
        hash(&writer.into_bytes())
    }
}

impl Serializer for ReceiveBlock {
    fn write(&self, writer: &mut Writer) {
        writer.write_hash(&self.previous);
        writer.write_hash(&self.source);
        writer.write_signature(&self.signature);
        writer.write_u64_le(self.work);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(ReceiveBlock {
            previous: reader.read_hash()?,
            source: reader.read_hash()?,
            signature: reader.read_signature()?,
            work: reader.read_u64_le()?,
        })
    }

    fn size(&self) -> usize {
        32 + 32 + 64 + 8
    }
}

/// First block of an account chain; receives from a send and names the
/// initial representative. Signed by the account it opens.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenBlock {
    pub source: Hash,
    pub representative: PublicKey,
    pub account: PublicKey,
    pub signature: Signature,
    pub work: u64,
}

impl OpenBlock {
    pub fn new(source: Hash, representative: PublicKey, key: &KeyPair, work: u64) -> Self {
        let mut block = OpenBlock {
            source,
            representative,
            account: *key.public_key(),
            signature: Signature::zero(),
            work,
        };
        block.signature = key.sign(block.hash().as_bytes());
        block
    }

    pub fn hash(&self) -> Hash {
        let mut writer = Writer::with_capacity(1 + 32 + 32 + 32);
        writer.write_u8(BlockType::Open as u8);
        writer.write_hash(&self.source);
        writer.write_key(&self.representative);
        writer.write_key(&self.account);
        hash(&writer.into_bytes())
    }
}

impl Serializer for OpenBlock {
    fn write(&self, writer: &mut Writer) {
        writer.write_hash(&self.source);
        writer.write_key(&self.representative);
        writer.write_key(&self.account);
        writer.write_signature(&self.signature);
        writer.write_u64_le(self.work);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(OpenBlock {
            source: reader.read_hash()?,
            representative: reader.read_key()?,
            account: reader.read_key()?,
            signature: reader.read_signature()?,
            work: reader.read_u64_le()?,
        })
    }

    fn size(&self) -> usize {
        32 + 32 + 32 + 64 + 8
    }
}

/// Redelegates the chain's voting weight to a new representative.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeBlock {
    pub previous: Hash,
    pub representative: PublicKey,
    pub signature: Signature,
    pub work: u64,
}

impl ChangeBlock {
    pub fn new(previous: Hash, representative: PublicKey, key: &KeyPair, work: u64) -> Self {
        let mut block = ChangeBlock {
            previous,
            representative,
            signature: Signature::zero(),
            work,
        };
        block.signature = key.sign(block.hash().as_bytes());
        block
    }

    pub fn hash(&self) -> Hash {
        let mut writer = Writer::with_capacity(1 + 32 + 32);
        writer.write_u8(BlockType::Change as u8);
        writer.write_hash(&self.previous);
        writer.write_key(&self.representative);
        hash(&writer.into_bytes())
    }
}

impl Serializer for ChangeBlock {
    fn write(&self, writer: &mut Writer) {
        writer.write_hash(&self.previous);
        writer.write_key(&self.representative);
        writer.write_signature(&self.signature);
        writer.write_u64_le(self.work);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(ChangeBlock {
            previous: reader.read_hash()?,
            representative: reader.read_key()?,
            signature: reader.read_signature()?,
            work: reader.read_u64_le()?,
        })
    }

    fn size(&self) -> usize {
        32 + 32 + 64 + 8
    }
}
