use crate::crypto::{hash, Hash, KeyPair, PublicKey, Signature};
use crate::serializer::{Reader, ReaderError, Serializer, Writer};

/// Upper bound on hashes covered by a single vote; also the flush batch
/// size of the vote generator.
pub const MAX_VOTE_HASHES: usize = 12;

/// A representative's signed statement about the blocks it currently
/// supports. A later sequence number from the same voter supersedes any
/// earlier vote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vote {
    pub account: PublicKey,
    pub signature: Signature,
    pub sequence: u64,
    pub hashes: Vec<Hash>,
}

impl Vote {
    pub fn new(key: &KeyPair, sequence: u64, hashes: Vec<Hash>) -> Self {
        let mut vote = Vote {
            account: *key.public_key(),
            signature: Signature::zero(),
            sequence,
            hashes,
        };
        vote.signature = key.sign(vote.hash().as_bytes());
        vote
    }

    /// Digest covered by the signature: the voted hashes and the sequence.
    pub fn hash(&self) -> Hash {
        let mut writer = Writer::with_capacity(self.hashes.len() * 32 + 8);
        for h in &self.hashes {
            writer.write_hash(h);
        }
        writer.write_u64(self.sequence);
        hash(&writer.into_bytes())
    }

    pub fn validate(&self) -> bool {
        !self.hashes.is_empty() && self.account.verify(self.hash().as_bytes(), &self.signature)
    }
}

impl Serializer for Vote {
    fn write(&self, writer: &mut Writer) {
        writer.write_key(&self.account);
        writer.write_signature(&self.signature);
        writer.write_u64(self.sequence);
        writer.write_u8(self.hashes.len() as u8);
        for h in &self.hashes {
            writer.write_hash(h);
        }
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        let account = reader.read_key()?;
        let signature = reader.read_signature()?;
        let sequence = reader.read_u64()?;
        let count = reader.read_u8()? as usize;
        if count == 0 || count > MAX_VOTE_HASHES {
            return Err(ReaderError::InvalidValue);
        }
        let mut hashes = Vec::with_capacity(count);
        for _ in 0..count {
            hashes.push(reader.read_hash()?);
        }
        Ok(Vote {
            account,
            signature,
            sequence,
            hashes,
        })
    }

    fn size(&self) -> usize {
        32 + 64 + 8 + 1 + self.hashes.len() * 32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_round_trip() {
        let key = KeyPair::new();
        let vote = Vote::new(&key, 3, vec![Hash::from(1u64), Hash::from(2u64)]);
        let decoded = Vote::from_bytes(&vote.to_bytes()).unwrap();
        assert_eq!(vote, decoded);
        assert!(decoded.validate());
    }

    #[test]
    fn test_sequence_changes_digest() {
        let key = KeyPair::new();
        let first = Vote::new(&key, 1, vec![Hash::from(1u64)]);
        let second = Vote::new(&key, 2, vec![Hash::from(1u64)]);
        assert_ne!(first.hash(), second.hash());
        assert!(first.validate() && second.validate());
    }

    #[test]
    fn test_tampered_vote_rejected() {
        let key = KeyPair::new();
        let mut vote = Vote::new(&key, 1, vec![Hash::from(1u64)]);
        vote.hashes[0] = Hash::from(2u64);
        assert!(!vote.validate());
    }

    #[test]
    fn test_empty_vote_rejected() {
        let key = KeyPair::new();
        let vote = Vote::new(&key, 1, vec![]);
        assert!(!vote.validate());
        assert!(Vote::from_bytes(&vote.to_bytes()).is_err());
    }
}
