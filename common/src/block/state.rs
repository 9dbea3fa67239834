use crate::config::Amount;
use crate::crypto::{hash, Hash, KeyPair, PublicKey, Signature};
use crate::serializer::{Reader, ReaderError, Serializer, Writer};
use super::BlockType;

/// Unified successor of the legacy kinds: every state block carries the
/// full account state after the operation.
///
/// The link field is context dependent:
/// - send: destination account
/// - receive: hash of the send block being received
/// - representative change: zero
/// - epoch upgrade: the configured epoch link, signed by the epoch signer
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StateBlock {
    pub account: PublicKey,
    /// Zero when this block opens the account.
    pub previous: Hash,
    pub representative: PublicKey,
    /// Balance on the chain after this block.
    pub balance: Amount,
    pub link: Hash,
    pub signature: Signature,
    pub work: u64,
}

impl StateBlock {
    pub fn new(
        account: PublicKey,
        previous: Hash,
        representative: PublicKey,
        balance: Amount,
        link: Hash,
        signer: &KeyPair,
        work: u64,
    ) -> Self {
        let mut block = StateBlock {
            account,
            previous,
            representative,
            balance,
            link,
            signature: Signature::zero(),
            work,
        };
        block.signature = signer.sign(block.hash().as_bytes());
        block
    }

    pub fn hash(&self) -> Hash {
        let mut writer = Writer::with_capacity(1 + 32 * 4 + 16);
        writer.write_u8(BlockType::State as u8);
        writer.write_key(&self.account);
        writer.write_hash(&self.previous);
        writer.write_key(&self.representative);
        writer.write_u128(self.balance);
        writer.write_hash(&self.link);
        hash(&writer.into_bytes())
    }
}

impl Serializer for StateBlock {
    fn write(&self, writer: &mut Writer) {
        writer.write_key(&self.account);
        writer.write_hash(&self.previous);
        writer.write_key(&self.representative);
        writer.write_u128(self.balance);
        writer.write_hash(&self.link);
        writer.write_signature(&self.signature);
        writer.write_u64_le(self.work);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(StateBlock {
            account: reader.read_key()?,
            previous: reader.read_hash()?,
            representative: reader.read_key()?,
            balance: reader.read_u128()?,
            link: reader.read_hash()?,
            signature: reader.read_signature()?,
            work: reader.read_u64_le()?,
        })
    }

    fn size(&self) -> usize {
        32 + 32 + 32 + 16 + 32 + 64 + 8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;
    use crate::serializer::Serializer;

    #[test]
    fn test_state_round_trip() {
        let key = KeyPair::new();
        let block = StateBlock::new(
            *key.public_key(),
            Hash::from(11u64),
            *KeyPair::new().public_key(),
            1_000_000,
            Hash::from(12u64),
            &key,
            99,
        );
        let wrapped: Block = block.clone().into();
        let decoded = Block::from_bytes(&wrapped.to_bytes()).unwrap();
        assert_eq!(wrapped, decoded);
    }

    #[test]
    fn test_epoch_style_signature() {
        // a state block may be signed by a key other than the account
        let account = KeyPair::new();
        let signer = KeyPair::new();
        let block: Block = StateBlock::new(
            *account.public_key(),
            Hash::from(1u64),
            *KeyPair::new().public_key(),
            0,
            Hash::from(2u64),
            &signer,
            0,
        )
        .into();
        assert!(block.verify_signature(signer.public_key()));
        assert!(!block.verify_signature(account.public_key()));
    }
}
