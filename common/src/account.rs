use crate::config::Amount;
use crate::crypto::{Hash, PublicKey};
use crate::serializer::{Reader, ReaderError, Serializer, Writer};
use crate::time::TimestampSeconds;

/// Protocol upgrade tag carried by accounts and pending entries.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
#[repr(u8)]
pub enum Epoch {
    #[default]
    Epoch0 = 0,
    Epoch1 = 1,
}

impl TryFrom<u8> for Epoch {
    type Error = ReaderError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Epoch::Epoch0,
            1 => Epoch::Epoch1,
            _ => return Err(ReaderError::InvalidValue),
        })
    }
}

impl Serializer for Epoch {
    fn write(&self, writer: &mut Writer) {
        writer.write_u8(*self as u8);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Epoch::try_from(reader.read_u8()?)
    }

    fn size(&self) -> usize {
        1
    }
}

/// Latest information about an account, one row per account.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountInfo {
    /// Hash of the newest block on the chain.
    pub head: Hash,
    /// Hash of the block that set the current representative.
    pub rep_block: Hash,
    pub open_block: Hash,
    pub balance: Amount,
    /// Seconds since epoch of the last local modification.
    pub modified: TimestampSeconds,
    pub block_count: u64,
    pub epoch: Epoch,
}

impl Serializer for AccountInfo {
    fn write(&self, writer: &mut Writer) {
        writer.write_hash(&self.head);
        writer.write_hash(&self.rep_block);
        writer.write_hash(&self.open_block);
        writer.write_u128(self.balance);
        writer.write_u64(self.modified);
        writer.write_u64(self.block_count);
        self.epoch.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(AccountInfo {
            head: reader.read_hash()?,
            rep_block: reader.read_hash()?,
            open_block: reader.read_hash()?,
            balance: reader.read_u128()?,
            modified: reader.read_u64()?,
            block_count: reader.read_u64()?,
            epoch: Epoch::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        32 * 3 + 16 + 8 + 8 + 1
    }
}

/// Key of a receivable amount: the claiming account and the send block
/// that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PendingKey {
    pub destination: PublicKey,
    pub send_hash: Hash,
}

impl PendingKey {
    pub fn new(destination: PublicKey, send_hash: Hash) -> Self {
        PendingKey {
            destination,
            send_hash,
        }
    }
}

impl Serializer for PendingKey {
    fn write(&self, writer: &mut Writer) {
        writer.write_key(&self.destination);
        writer.write_hash(&self.send_hash);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(PendingKey {
            destination: reader.read_key()?,
            send_hash: reader.read_hash()?,
        })
    }

    fn size(&self) -> usize {
        32 + 32
    }
}

/// A receivable amount waiting to be claimed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PendingInfo {
    pub source: PublicKey,
    pub amount: Amount,
    pub epoch: Epoch,
}

impl Serializer for PendingInfo {
    fn write(&self, writer: &mut Writer) {
        writer.write_key(&self.source);
        writer.write_u128(self.amount);
        self.epoch.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(PendingInfo {
            source: reader.read_key()?,
            amount: reader.read_u128()?,
            epoch: Epoch::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        32 + 16 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    #[test]
    fn test_account_info_round_trip() {
        let info = AccountInfo {
            head: Hash::from(1u64),
            rep_block: Hash::from(2u64),
            open_block: Hash::from(3u64),
            balance: 12345,
            modified: 1_700_000_000,
            block_count: 42,
            epoch: Epoch::Epoch1,
        };
        let decoded = AccountInfo::from_bytes(&info.to_bytes()).unwrap();
        assert_eq!(info, decoded);
    }

    #[test]
    fn test_pending_round_trip() {
        let key = PendingKey::new(*KeyPair::new().public_key(), Hash::from(9u64));
        let info = PendingInfo {
            source: *KeyPair::new().public_key(),
            amount: u128::MAX / 7,
            epoch: Epoch::Epoch0,
        };
        assert_eq!(PendingKey::from_bytes(&key.to_bytes()).unwrap(), key);
        assert_eq!(PendingInfo::from_bytes(&info.to_bytes()).unwrap(), info);
    }
}
