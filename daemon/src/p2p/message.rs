use lattice_common::{
    block::{Block, BlockType},
    config::{PROTOCOL_VERSION, PROTOCOL_VERSION_MIN},
    serializer::{Reader, ReaderError, Serializer, Writer},
    vote::Vote,
};
use std::net::{Ipv6Addr, SocketAddrV6};
use thiserror::Error;

/// Leading bytes of every message on the wire.
pub const MESSAGE_MAGIC: [u8; 2] = [0x4c, 0x41]; // "LA"

/// Endpoint slots carried by a keepalive.
pub const KEEPALIVE_PEERS: usize = 8;

const EXTENSION_IPV4_ONLY: u16 = 0x0002;
const EXTENSION_BLOCK_TYPE_MASK: u16 = 0x0f00;
const EXTENSION_BLOCK_TYPE_SHIFT: u16 = 8;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    #[error("bad magic number")]
    BadMagic,
    #[error("remote protocol version {0} is too old")]
    VersionTooOld(u8),
    #[error("unknown message type {0}")]
    UnknownType(u8),
    #[error("malformed message: {0}")]
    Malformed(#[from] ReaderError),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum MessageType {
    Invalid = 0,
    NotAType = 1,
    Keepalive = 2,
    Publish = 3,
    ConfirmReq = 4,
    ConfirmAck = 5,
    BulkPull = 6,
    BulkPush = 7,
    FrontierReq = 8,
}

impl TryFrom<u8> for MessageType {
    type Error = MessageError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => MessageType::Invalid,
            1 => MessageType::NotAType,
            2 => MessageType::Keepalive,
            3 => MessageType::Publish,
            4 => MessageType::ConfirmReq,
            5 => MessageType::ConfirmAck,
            6 => MessageType::BulkPull,
            7 => MessageType::BulkPush,
            8 => MessageType::FrontierReq,
            other => return Err(MessageError::UnknownType(other)),
        })
    }
}

/// Fixed 8-byte prelude: magic, the version triple, the message type and
/// an extensions bitfield. The block type of the payload rides in
/// extensions bits 8-11.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MessageHeader {
    pub version_max: u8,
    pub version_using: u8,
    pub version_min: u8,
    pub message_type: MessageType,
    pub extensions: u16,
}

impl MessageHeader {
    pub fn new(message_type: MessageType) -> Self {
        MessageHeader {
            version_max: PROTOCOL_VERSION,
            version_using: PROTOCOL_VERSION,
            version_min: PROTOCOL_VERSION_MIN,
            message_type,
            extensions: 0,
        }
    }

    pub fn block_type(&self) -> Result<BlockType, ReaderError> {
        let bits = (self.extensions & EXTENSION_BLOCK_TYPE_MASK) >> EXTENSION_BLOCK_TYPE_SHIFT;
        BlockType::try_from(bits as u8)
    }

    pub fn set_block_type(&mut self, block_type: BlockType) {
        self.extensions &= !EXTENSION_BLOCK_TYPE_MASK;
        self.extensions |= (block_type as u16) << EXTENSION_BLOCK_TYPE_SHIFT;
    }

    pub fn ipv4_only(&self) -> bool {
        self.extensions & EXTENSION_IPV4_ONLY != 0
    }

    pub fn set_ipv4_only(&mut self, value: bool) {
        if value {
            self.extensions |= EXTENSION_IPV4_ONLY;
        } else {
            self.extensions &= !EXTENSION_IPV4_ONLY;
        }
    }

    fn read_checked(reader: &mut Reader) -> Result<Self, MessageError> {
        let magic = reader.read_bytes(2)?;
        if magic != MESSAGE_MAGIC {
            return Err(MessageError::BadMagic);
        }
        let version_max = reader.read_u8()?;
        let version_using = reader.read_u8()?;
        let version_min = reader.read_u8()?;
        if version_using < PROTOCOL_VERSION_MIN {
            return Err(MessageError::VersionTooOld(version_using));
        }
        let message_type = MessageType::try_from(reader.read_u8()?)?;
        let extensions = reader.read_u16_le()?;
        Ok(MessageHeader {
            version_max,
            version_using,
            version_min,
            message_type,
            extensions,
        })
    }
}

impl Serializer for MessageHeader {
    fn write(&self, writer: &mut Writer) {
        writer.write_bytes(&MESSAGE_MAGIC);
        writer.write_u8(self.version_max);
        writer.write_u8(self.version_using);
        writer.write_u8(self.version_min);
        writer.write_u8(self.message_type as u8);
        writer.write_u16_le(self.extensions);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Self::read_checked(reader).map_err(|_| ReaderError::InvalidValue)
    }

    fn size(&self) -> usize {
        8
    }
}

/// Peer gossip; unused slots stay unspecified.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keepalive {
    pub peers: [SocketAddrV6; KEEPALIVE_PEERS],
}

impl Default for Keepalive {
    fn default() -> Self {
        Keepalive {
            peers: [SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, 0, 0, 0); KEEPALIVE_PEERS],
        }
    }
}

impl Serializer for Keepalive {
    fn write(&self, writer: &mut Writer) {
        for peer in &self.peers {
            writer.write_bytes(&peer.ip().octets());
            writer.write_u16_le(peer.port());
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let mut keepalive = Keepalive::default();
        for slot in keepalive.peers.iter_mut() {
            let octets = reader.read_bytes(16)?;
            let mut bytes = [0u8; 16];
            bytes.copy_from_slice(octets);
            let port = reader.read_u16_le()?;
            *slot = SocketAddrV6::new(Ipv6Addr::from(bytes), port, 0, 0);
        }
        Ok(keepalive)
    }

    fn size(&self) -> usize {
        KEEPALIVE_PEERS * (16 + 2)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Publish {
    pub block: Block,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmReq {
    pub block: Block,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConfirmAck {
    pub vote: Vote,
}

/// A parsed wire message, header included.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    Keepalive(Keepalive),
    Publish(Publish),
    ConfirmReq(ConfirmReq),
    ConfirmAck(ConfirmAck),
}

impl Message {
    pub fn message_type(&self) -> MessageType {
        match self {
            Message::Keepalive(_) => MessageType::Keepalive,
            Message::Publish(_) => MessageType::Publish,
            Message::ConfirmReq(_) => MessageType::ConfirmReq,
            Message::ConfirmAck(_) => MessageType::ConfirmAck,
        }
    }

    pub fn header(&self) -> MessageHeader {
        let mut header = MessageHeader::new(self.message_type());
        match self {
            Message::Publish(p) => header.set_block_type(p.block.block_type()),
            Message::ConfirmReq(r) => header.set_block_type(r.block.block_type()),
            Message::ConfirmAck(_) => header.set_block_type(BlockType::NotABlock),
            Message::Keepalive(_) => {}
        }
        header
    }

    pub fn serialize(&self) -> Vec<u8> {
        let header = self.header();
        let mut writer = Writer::with_capacity(header.size() + 256);
        header.write(&mut writer);
        match self {
            Message::Keepalive(k) => k.write(&mut writer),
            Message::Publish(p) => p.block.write_body(&mut writer),
            Message::ConfirmReq(r) => r.block.write_body(&mut writer),
            Message::ConfirmAck(a) => a.vote.write(&mut writer),
        }
        writer.into_bytes()
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, MessageError> {
        let mut reader = Reader::new(bytes);
        let header = MessageHeader::read_checked(&mut reader)?;
        let message = match header.message_type {
            MessageType::Keepalive => Message::Keepalive(Keepalive::read(&mut reader)?),
            MessageType::Publish => {
                let block = Block::read_typed(&mut reader, header.block_type()?)?;
                Message::Publish(Publish { block })
            }
            MessageType::ConfirmReq => {
                let block = Block::read_typed(&mut reader, header.block_type()?)?;
                Message::ConfirmReq(ConfirmReq { block })
            }
            MessageType::ConfirmAck => Message::ConfirmAck(ConfirmAck {
                vote: Vote::read(&mut reader)?,
            }),
            other => return Err(MessageError::UnknownType(other as u8)),
        };
        if reader.remaining() != 0 {
            return Err(MessageError::Malformed(ReaderError::InvalidSize));
        }
        Ok(message)
    }
}
