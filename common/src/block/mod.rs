mod legacy;
mod state;

pub use legacy::{ChangeBlock, OpenBlock, ReceiveBlock, SendBlock};
pub use state::StateBlock;

use crate::config::Amount;
use crate::crypto::{Hash, PublicKey, Signature};
use crate::serializer::{Reader, ReaderError, Serializer, Writer};
use std::fmt::{Display, Error as FmtError, Formatter};

/// Conflict key of a block: the previous hash when the block extends a
/// chain, otherwise the account itself.
pub type Root = Hash;

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum BlockType {
    Invalid = 0,
    NotABlock = 1,
    Send = 2,
    Receive = 3,
    Open = 4,
    Change = 5,
    State = 6,
}

impl BlockType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockType::Invalid => "invalid",
            BlockType::NotABlock => "not_a_block",
            BlockType::Send => "send",
            BlockType::Receive => "receive",
            BlockType::Open => "open",
            BlockType::Change => "change",
            BlockType::State => "state",
        }
    }
}

impl TryFrom<u8> for BlockType {
    type Error = ReaderError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => BlockType::Invalid,
            1 => BlockType::NotABlock,
            2 => BlockType::Send,
            3 => BlockType::Receive,
            4 => BlockType::Open,
            5 => BlockType::Change,
            6 => BlockType::State,
            _ => return Err(ReaderError::InvalidValue),
        })
    }
}

impl Display for BlockType {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "{}", self.as_str())
    }
}

/// A block on some account's chain.
///
/// The legacy variants each carry exactly the fields their operation
/// needs; `state` is the unified successor carrying the full account
/// state. Every variant is signed over its hash and paced by a 64-bit
/// work nonce against its root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Block {
    Send(SendBlock),
    Receive(ReceiveBlock),
    Open(OpenBlock),
    Change(ChangeBlock),
    State(StateBlock),
}

impl Block {
    pub fn block_type(&self) -> BlockType {
        match self {
            Block::Send(_) => BlockType::Send,
            Block::Receive(_) => BlockType::Receive,
            Block::Open(_) => BlockType::Open,
            Block::Change(_) => BlockType::Change,
            Block::State(_) => BlockType::State,
        }
    }

    pub fn hash(&self) -> Hash {
        match self {
            Block::Send(b) => b.hash(),
            Block::Receive(b) => b.hash(),
            Block::Open(b) => b.hash(),
            Block::Change(b) => b.hash(),
            Block::State(b) => b.hash(),
        }
    }

    pub fn root(&self) -> Root {
        match self {
            Block::Send(b) => b.previous,
            Block::Receive(b) => b.previous,
            Block::Open(b) => Hash::from(b.account),
            Block::Change(b) => b.previous,
            Block::State(b) => {
                if b.previous.is_zero() {
                    Hash::from(b.account)
                } else {
                    b.previous
                }
            }
        }
    }

    /// Hash of the predecessor, zero for a first block.
    pub fn previous(&self) -> Hash {
        match self {
            Block::Send(b) => b.previous,
            Block::Receive(b) => b.previous,
            Block::Open(_) => Hash::zero(),
            Block::Change(b) => b.previous,
            Block::State(b) => b.previous,
        }
    }

    /// Source send-block hash, for the legacy receiving variants.
    pub fn source(&self) -> Option<Hash> {
        match self {
            Block::Receive(b) => Some(b.source),
            Block::Open(b) => Some(b.source),
            _ => None,
        }
    }

    pub fn destination(&self) -> Option<&PublicKey> {
        match self {
            Block::Send(b) => Some(&b.destination),
            _ => None,
        }
    }

    pub fn representative(&self) -> Option<&PublicKey> {
        match self {
            Block::Open(b) => Some(&b.representative),
            Block::Change(b) => Some(&b.representative),
            Block::State(b) => Some(&b.representative),
            _ => None,
        }
    }

    pub fn balance(&self) -> Option<Amount> {
        match self {
            Block::Send(b) => Some(b.balance),
            Block::State(b) => Some(b.balance),
            _ => None,
        }
    }

    pub fn link(&self) -> Option<&Hash> {
        match self {
            Block::State(b) => Some(&b.link),
            _ => None,
        }
    }

    /// The account field, present only on variants that carry it.
    pub fn account_field(&self) -> Option<&PublicKey> {
        match self {
            Block::Open(b) => Some(&b.account),
            Block::State(b) => Some(&b.account),
            _ => None,
        }
    }

    pub fn work(&self) -> u64 {
        match self {
            Block::Send(b) => b.work,
            Block::Receive(b) => b.work,
            Block::Open(b) => b.work,
            Block::Change(b) => b.work,
            Block::State(b) => b.work,
        }
    }

    pub fn set_work(&mut self, work: u64) {
        match self {
            Block::Send(b) => b.work = work,
            Block::Receive(b) => b.work = work,
            Block::Open(b) => b.work = work,
            Block::Change(b) => b.work = work,
            Block::State(b) => b.work = work,
        }
    }

    pub fn signature(&self) -> &Signature {
        match self {
            Block::Send(b) => &b.signature,
            Block::Receive(b) => &b.signature,
            Block::Open(b) => &b.signature,
            Block::Change(b) => &b.signature,
            Block::State(b) => &b.signature,
        }
    }

    pub fn set_signature(&mut self, signature: Signature) {
        match self {
            Block::Send(b) => b.signature = signature,
            Block::Receive(b) => b.signature = signature,
            Block::Open(b) => b.signature = signature,
            Block::Change(b) => b.signature = signature,
            Block::State(b) => b.signature = signature,
        }
    }

    pub fn verify_signature(&self, key: &PublicKey) -> bool {
        key.verify(self.hash().as_bytes(), self.signature())
    }

    /// Write the body alone, for containers that carry the type
    /// elsewhere (e.g. a message header).
    pub fn write_body(&self, writer: &mut Writer) {
        match self {
            Block::Send(b) => b.write(writer),
            Block::Receive(b) => b.write(writer),
            Block::Open(b) => b.write(writer),
            Block::Change(b) => b.write(writer),
            Block::State(b) => b.write(writer),
        }
    }

    /// Read a block body whose type was already consumed, e.g. from a
    /// message header.
    pub fn read_typed(reader: &mut Reader, block_type: BlockType) -> Result<Self, ReaderError> {
        Ok(match block_type {
            BlockType::Send => Block::Send(SendBlock::read(reader)?),
            BlockType::Receive => Block::Receive(ReceiveBlock::read(reader)?),
            BlockType::Open => Block::Open(OpenBlock::read(reader)?),
            BlockType::Change => Block::Change(ChangeBlock::read(reader)?),
            BlockType::State => Block::State(StateBlock::read(reader)?),
            BlockType::Invalid | BlockType::NotABlock => return Err(ReaderError::InvalidValue),
        })
    }
}

impl Serializer for Block {
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(self.block_type() as u8);
        match self {
            Block::Send(b) => b.write(writer),
            Block::Receive(b) => b.write(writer),
            Block::Open(b) => b.write(writer),
            Block::Change(b) => b.write(writer),
            Block::State(b) => b.write(writer),
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let block_type = BlockType::try_from(reader.read_u8()?)?;
        Block::read_typed(reader, block_type)
    }

    fn size(&self) -> usize {
        1 + match self {
            Block::Send(b) => b.size(),
            Block::Receive(b) => b.size(),
            Block::Open(b) => b.size(),
            Block::Change(b) => b.size(),
            Block::State(b) => b.size(),
        }
    }
}

impl From<SendBlock> for Block {
    fn from(block: SendBlock) -> Self {
        Block::Send(block)
    }
}

impl From<ReceiveBlock> for Block {
    fn from(block: ReceiveBlock) -> Self {
        Block::Receive(block)
    }
}

impl From<OpenBlock> for Block {
    fn from(block: OpenBlock) -> Self {
        Block::Open(block)
    }
}

impl From<ChangeBlock> for Block {
    fn from(block: ChangeBlock) -> Self {
        Block::Change(block)
    }
}

impl From<StateBlock> for Block {
    fn from(block: StateBlock) -> Self {
        Block::State(block)
    }
}

impl Display for Block {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        write!(f, "{}[{}]", self.block_type(), self.hash())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    #[test]
    fn test_block_round_trip() {
        let key = KeyPair::new();
        let send: Block =
            SendBlock::new(Hash::from(1u64), *KeyPair::new().public_key(), 50, &key, 7).into();

        let bytes = send.to_bytes();
        assert_eq!(bytes.len(), send.size());
        let decoded = Block::from_bytes(&bytes).unwrap();
        assert_eq!(send, decoded);
        assert_eq!(send.hash(), decoded.hash());
    }

    #[test]
    fn test_hash_excludes_signature_and_work() {
        let key = KeyPair::new();
        let mut block: Block =
            ChangeBlock::new(Hash::from(1u64), *KeyPair::new().public_key(), &key, 0).into();
        let original = block.hash();
        block.set_work(42);
        block.set_signature(Signature::zero());
        assert_eq!(original, block.hash());
    }

    #[test]
    fn test_hash_depends_on_type() {
        let key = KeyPair::new();
        let previous = Hash::from(9u64);
        let rep = *KeyPair::new().public_key();
        let change: Block = ChangeBlock::new(previous, rep, &key, 0).into();
        let send: Block = SendBlock::new(previous, rep, 0, &key, 0).into();
        assert_ne!(change.hash(), send.hash());
    }

    #[test]
    fn test_root_selection() {
        let key = KeyPair::new();
        let open: Block = OpenBlock::new(Hash::from(3u64), *key.public_key(), &key, 0).into();
        assert_eq!(open.root(), Hash::from(*key.public_key()));

        let send: Block = SendBlock::new(Hash::from(5u64), *key.public_key(), 1, &key, 0).into();
        assert_eq!(send.root(), Hash::from(5u64));

        let state: Block = StateBlock::new(
            *key.public_key(),
            Hash::zero(),
            *key.public_key(),
            0,
            Hash::zero(),
            &key,
            0,
        )
        .into();
        assert_eq!(state.root(), Hash::from(*key.public_key()));
    }

    #[test]
    fn test_signature_verifies_under_signer() {
        let key = KeyPair::new();
        let other = KeyPair::new();
        let block: Block = ReceiveBlock::new(Hash::from(1u64), Hash::from(2u64), &key, 0).into();
        assert!(block.verify_signature(key.public_key()));
        assert!(!block.verify_signature(other.public_key()));
    }
}
