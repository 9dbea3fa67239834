mod lmdb;
pub mod versioning;

pub use lmdb::{LedgerStore, WriteTransaction};

use heed::{RoTxn, RwTxn};
use lattice_common::{
    account::{AccountInfo, Epoch, PendingInfo, PendingKey},
    block::Block,
    config::Amount,
    crypto::{Hash, KeyPair, PublicKey},
    serializer::{Reader, ReaderError, Serializer, Writer},
    time::TimestampSeconds,
    vote::Vote,
};
use thiserror::Error;

/// Current on-disk schema version. Version 1 stores the short account
/// record layout; its rows are upgraded transparently on read.
pub const STORE_VERSION: u32 = 2;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] heed::Error),
    #[error("corrupted record: {0}")]
    Corrupted(#[from] ReaderError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported store version {0}")]
    UnknownVersion(u32),
    #[error("missing record for {0}")]
    MissingRecord(Hash),
}

/// Bookkeeping stored alongside each block: the forward link, the owning
/// account and the state of the chain as of this block. Keeping these
/// here makes `balance(hash)` and `account(hash)` point lookups and gives
/// rollback everything it needs to restore the previous state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockSideband {
    pub successor: Hash,
    pub account: PublicKey,
    pub balance: Amount,
    pub height: u64,
    pub timestamp: TimestampSeconds,
    pub epoch: Epoch,
}

impl Serializer for BlockSideband {
    fn write(&self, writer: &mut Writer) {
        writer.write_hash(&self.successor);
        writer.write_key(&self.account);
        writer.write_u128(self.balance);
        writer.write_u64(self.height);
        writer.write_u64(self.timestamp);
        self.epoch.write(writer);
    }

    fn read(reader: &mut Reader) -> Result<Self, ReaderError> {
        Ok(BlockSideband {
            successor: reader.read_hash()?,
            account: reader.read_key()?,
            balance: reader.read_u128()?,
            height: reader.read_u64()?,
            timestamp: reader.read_u64()?,
            epoch: Epoch::read(reader)?,
        })
    }

    fn size(&self) -> usize {
        32 + 32 + 16 + 8 + 8 + 1
    }
}

pub trait AccountProvider {
    fn account_get(
        &self,
        txn: &RoTxn,
        account: &PublicKey,
    ) -> Result<Option<AccountInfo>, StorageError>;

    fn account_put(
        &self,
        txn: &mut RwTxn,
        account: &PublicKey,
        info: &AccountInfo,
    ) -> Result<(), StorageError>;

    fn account_del(&self, txn: &mut RwTxn, account: &PublicKey) -> Result<(), StorageError>;

    fn account_count(&self, txn: &RoTxn) -> Result<u64, StorageError>;
}

pub trait BlockProvider {
    fn block_get(
        &self,
        txn: &RoTxn,
        hash: &Hash,
    ) -> Result<Option<(Block, BlockSideband)>, StorageError>;

    fn block_exists(&self, txn: &RoTxn, hash: &Hash) -> Result<bool, StorageError>;

    /// Store a block and link it as the successor of its predecessor.
    fn block_put(
        &self,
        txn: &mut RwTxn,
        hash: &Hash,
        block: &Block,
        sideband: &BlockSideband,
    ) -> Result<(), StorageError>;

    fn block_del(&self, txn: &mut RwTxn, hash: &Hash) -> Result<(), StorageError>;

    fn block_successor_set(
        &self,
        txn: &mut RwTxn,
        hash: &Hash,
        successor: &Hash,
    ) -> Result<(), StorageError>;

    fn block_count(&self, txn: &RoTxn) -> Result<u64, StorageError>;
}

pub trait PendingProvider {
    fn pending_get(
        &self,
        txn: &RoTxn,
        key: &PendingKey,
    ) -> Result<Option<PendingInfo>, StorageError>;

    fn pending_put(
        &self,
        txn: &mut RwTxn,
        key: &PendingKey,
        info: &PendingInfo,
    ) -> Result<(), StorageError>;

    fn pending_del(&self, txn: &mut RwTxn, key: &PendingKey) -> Result<(), StorageError>;

    fn pending_count(&self, txn: &RoTxn) -> Result<u64, StorageError>;
}

pub trait FrontierProvider {
    fn frontier_get(&self, txn: &RoTxn, hash: &Hash) -> Result<Option<PublicKey>, StorageError>;

    fn frontier_put(
        &self,
        txn: &mut RwTxn,
        hash: &Hash,
        account: &PublicKey,
    ) -> Result<(), StorageError>;

    fn frontier_del(&self, txn: &mut RwTxn, hash: &Hash) -> Result<(), StorageError>;
}

pub trait RepresentationProvider {
    fn rep_weight_get(&self, txn: &RoTxn, rep: &PublicKey) -> Result<Amount, StorageError>;

    /// Store a representative's total delegated weight; a zero weight
    /// removes the row.
    fn rep_weight_put(
        &self,
        txn: &mut RwTxn,
        rep: &PublicKey,
        weight: Amount,
    ) -> Result<(), StorageError>;
}

pub trait VoteProvider {
    fn vote_get(&self, txn: &RoTxn, voter: &PublicKey) -> Result<Option<Vote>, StorageError>;

    fn vote_put(&self, txn: &mut RwTxn, vote: &Vote) -> Result<(), StorageError>;

    /// Sign the next vote for `hashes`, persisting the incremented
    /// sequence number so restarts never reuse one.
    fn vote_generate(
        &self,
        txn: &mut RwTxn,
        key: &KeyPair,
        hashes: Vec<Hash>,
    ) -> Result<Vote, StorageError>;
}

pub trait VersionProvider {
    fn version_get(&self, txn: &RoTxn) -> Result<Option<u32>, StorageError>;

    fn version_put(&self, txn: &mut RwTxn, version: u32) -> Result<(), StorageError>;
}
