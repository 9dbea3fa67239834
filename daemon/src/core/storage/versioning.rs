//! Read-through upgrade of legacy store records.
//!
//! Schema version 1 stored accounts without `open_block`, `block_count`
//! or an epoch tag. Rows in that layout remain readable: the missing
//! fields are reconstructed on access, so old data directories open
//! without a rewrite pass.

use super::{BlockProvider, LedgerStore, StorageError};
use heed::RoTxn;
use lattice_common::{
    account::{AccountInfo, Epoch},
    config::Amount,
    crypto::Hash,
    serializer::{Reader, ReaderError, Serializer, Writer},
};

/// Account record layout written by schema version 1.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountInfoV1 {
    pub head: Hash,
    pub rep_block: Hash,
    pub balance: Amount,
    pub modified: u64,
}

impl Serializer for AccountInfoV1 {
    fn write(&self, writer: &mut Writer) {
        writer.write_hash(&self.head);
        writer.write_hash(&self.rep_block);
        writer.write_u128(self.balance);
        writer.write_u64(self.modified);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(AccountInfoV1 {
            head: reader.read_hash()?,
            rep_block: reader.read_hash()?,
            balance: reader.read_u128()?,
            modified: reader.read_u64()?,
        })
    }

    fn size(&self) -> usize {
        32 + 32 + 16 + 8
    }
}

const V1_RECORD_SIZE: usize = 32 + 32 + 16 + 8;

/// Decode an account row in whichever layout it was written.
///
/// For a V1 row the open block is recovered by walking the chain back
/// from the head, and the height of that walk restores the block count.
pub fn read_account_info(
    store: &LedgerStore,
    txn: &RoTxn,
    bytes: &[u8],
) -> Result<AccountInfo, StorageError> {
    if bytes.len() != V1_RECORD_SIZE {
        return Ok(AccountInfo::from_bytes(bytes)?);
    }

    let legacy = AccountInfoV1::from_bytes(bytes)?;
    let (open_block, block_count) = walk_to_open(store, txn, &legacy.head)?;
    Ok(AccountInfo {
        head: legacy.head,
        rep_block: legacy.rep_block,
        open_block,
        balance: legacy.balance,
        modified: legacy.modified,
        block_count,
        epoch: Epoch::Epoch0,
    })
}

fn walk_to_open(
    store: &LedgerStore,
    txn: &RoTxn,
    head: &Hash,
) -> Result<(Hash, u64), StorageError> {
    let mut current = *head;
    let mut count = 0u64;
    loop {
        let (block, _) = store
            .block_get(txn, &current)?
            .ok_or(StorageError::MissingRecord(current))?;
        count += 1;
        let previous = block.previous();
        if previous.is_zero() {
            return Ok((current, count));
        }
        current = previous;
    }
}
