use super::versioning::read_account_info;
use super::{
    AccountProvider, BlockProvider, BlockSideband, FrontierProvider, PendingProvider,
    RepresentationProvider, StorageError, VersionProvider, VoteProvider, STORE_VERSION,
};
use heed::types::Bytes;
use heed::{Database, Env, EnvFlags, EnvOpenOptions, RoTxn, RwTxn};
use lattice_common::{
    account::{AccountInfo, Epoch, PendingInfo, PendingKey},
    block::Block,
    config::{self, Amount, GENESIS_AMOUNT},
    crypto::{Hash, KeyPair, PublicKey},
    network::Network,
    serializer::{Reader, Serializer, Writer},
    time::get_current_time_in_seconds,
    vote::Vote,
};
use std::ops::{Deref, DerefMut};
use std::path::Path;

// Virtual address space reserved for the memory map, not disk usage.
const DB_MAP_SIZE: usize = 16 * 1024 * 1024 * 1024;

const VERSION_KEY: &[u8] = b"version";

/// Write transaction handle. Commits on drop; `abort` discards instead.
pub struct WriteTransaction<'env> {
    txn: Option<RwTxn<'env>>,
}

impl<'env> WriteTransaction<'env> {
    pub fn commit(mut self) -> Result<(), StorageError> {
        match self.txn.take() {
            Some(txn) => Ok(txn.commit()?),
            None => Ok(()),
        }
    }

    pub fn abort(mut self) {
        if let Some(txn) = self.txn.take() {
            txn.abort();
        }
    }
}

impl<'env> Deref for WriteTransaction<'env> {
    type Target = RwTxn<'env>;

    fn deref(&self) -> &Self::Target {
        self.txn.as_ref().expect("write transaction already consumed")
    }
}

impl<'env> DerefMut for WriteTransaction<'env> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.txn.as_mut().expect("write transaction already consumed")
    }
}

impl<'env> Drop for WriteTransaction<'env> {
    fn drop(&mut self) {
        if let Some(txn) = self.txn.take() {
            if let Err(e) = txn.commit() {
                error!("Failed to commit write transaction: {}", e);
            }
        }
    }
}

/// The node's single LMDB environment: one `data.ldb` file holding the
/// typed tables. Readers get snapshot isolation, writers are serialized
/// by the environment's writer lock.
pub struct LedgerStore {
    env: Env,
    accounts: Database<Bytes, Bytes>,
    blocks: Database<Bytes, Bytes>,
    pending: Database<Bytes, Bytes>,
    frontiers: Database<Bytes, Bytes>,
    representation: Database<Bytes, Bytes>,
    votes: Database<Bytes, Bytes>,
    meta: Database<Bytes, Bytes>,
}

impl LedgerStore {
    /// Open or create the store file at `path` (e.g. `<datadir>/data.ldb`).
    pub fn open(path: &Path, max_dbs: u32) -> Result<Self, StorageError> {
        let mut options = EnvOpenOptions::new();
        options.max_dbs(max_dbs.max(8)).map_size(DB_MAP_SIZE);
        let env = unsafe {
            options.flags(EnvFlags::NO_SUB_DIR);
            options.open(path)?
        };

        let mut txn = env.write_txn()?;
        let accounts = env.create_database(&mut txn, Some("accounts"))?;
        let blocks = env.create_database(&mut txn, Some("blocks"))?;
        let pending = env.create_database(&mut txn, Some("pending"))?;
        let frontiers = env.create_database(&mut txn, Some("frontiers"))?;
        let representation = env.create_database(&mut txn, Some("representation"))?;
        let votes = env.create_database(&mut txn, Some("votes"))?;
        let meta = env.create_database(&mut txn, Some("meta"))?;
        txn.commit()?;

        let store = LedgerStore {
            env,
            accounts,
            blocks,
            pending,
            frontiers,
            representation,
            votes,
            meta,
        };

        let txn = store.tx_begin_read()?;
        if let Some(version) = store.version_get(&txn)? {
            if version == 0 || version > STORE_VERSION {
                return Err(StorageError::UnknownVersion(version));
            }
        }
        drop(txn);

        Ok(store)
    }

    pub fn tx_begin_read(&self) -> Result<RoTxn<'_>, StorageError> {
        Ok(self.env.read_txn()?)
    }

    pub fn tx_begin_write(&self) -> Result<WriteTransaction<'_>, StorageError> {
        Ok(WriteTransaction {
            txn: Some(self.env.write_txn()?),
        })
    }

    /// Seed an empty store with the genesis record for `network`.
    pub fn initialize(&self, txn: &mut RwTxn, network: Network) -> Result<(), StorageError> {
        let genesis = config::genesis(network);
        let account = config::genesis_account(network);
        let hash = genesis.hash();
        let now = get_current_time_in_seconds();

        let sideband = BlockSideband {
            successor: Hash::zero(),
            account,
            balance: GENESIS_AMOUNT,
            height: 1,
            timestamp: now,
            epoch: Epoch::Epoch0,
        };
        self.block_put(txn, &hash, genesis, &sideband)?;
        self.account_put(
            txn,
            &account,
            &AccountInfo {
                head: hash,
                rep_block: hash,
                open_block: hash,
                balance: GENESIS_AMOUNT,
                modified: now,
                block_count: 1,
                epoch: Epoch::Epoch0,
            },
        )?;
        self.frontier_put(txn, &hash, &account)?;
        self.rep_weight_put(txn, &account, GENESIS_AMOUNT)?;
        self.version_put(txn, STORE_VERSION)?;
        Ok(())
    }

    pub fn is_empty(&self, txn: &RoTxn) -> Result<bool, StorageError> {
        Ok(self.block_count(txn)? == 0)
    }

    pub fn accounts(&self, txn: &RoTxn) -> Result<Vec<(PublicKey, AccountInfo)>, StorageError> {
        let mut result = Vec::new();
        for item in self.accounts.iter(txn)? {
            let (key, value) = item?;
            let account = PublicKey::from_bytes(key)?;
            let info = read_account_info(self, txn, value)?;
            result.push((account, info));
        }
        Ok(result)
    }

    pub fn pending_all(&self, txn: &RoTxn) -> Result<Vec<(PendingKey, PendingInfo)>, StorageError> {
        let mut result = Vec::new();
        for item in self.pending.iter(txn)? {
            let (key, value) = item?;
            result.push((PendingKey::from_bytes(key)?, PendingInfo::from_bytes(value)?));
        }
        Ok(result)
    }

    /// All receivable entries keyed to `account`.
    pub fn pending_for_account(
        &self,
        txn: &RoTxn,
        account: &PublicKey,
    ) -> Result<Vec<(PendingKey, PendingInfo)>, StorageError> {
        let mut result = Vec::new();
        for item in self.pending.prefix_iter(txn, account.as_bytes())? {
            let (key, value) = item?;
            result.push((PendingKey::from_bytes(key)?, PendingInfo::from_bytes(value)?));
        }
        Ok(result)
    }

    pub fn frontiers(&self, txn: &RoTxn) -> Result<Vec<(Hash, PublicKey)>, StorageError> {
        let mut result = Vec::new();
        for item in self.frontiers.iter(txn)? {
            let (key, value) = item?;
            result.push((Hash::from_bytes(key)?, PublicKey::from_bytes(value)?));
        }
        Ok(result)
    }

    pub fn blocks(&self, txn: &RoTxn) -> Result<Vec<(Hash, Block, BlockSideband)>, StorageError> {
        let mut result = Vec::new();
        for item in self.blocks.iter(txn)? {
            let (key, value) = item?;
            let (block, sideband) = Self::decode_block(value)?;
            result.push((Hash::from_bytes(key)?, block, sideband));
        }
        Ok(result)
    }

    pub fn votes(&self, txn: &RoTxn) -> Result<Vec<Vote>, StorageError> {
        let mut result = Vec::new();
        for item in self.votes.iter(txn)? {
            let (_, value) = item?;
            result.push(Vote::from_bytes(value)?);
        }
        Ok(result)
    }

    pub fn rep_weights(&self, txn: &RoTxn) -> Result<Vec<(PublicKey, Amount)>, StorageError> {
        let mut result = Vec::new();
        for item in self.representation.iter(txn)? {
            let (key, value) = item?;
            let rep = PublicKey::from_bytes(key)?;
            let mut reader = Reader::new(value);
            result.push((rep, reader.read_u128()?));
        }
        Ok(result)
    }

    pub fn frontier_count(&self, txn: &RoTxn) -> Result<u64, StorageError> {
        Ok(self.frontiers.len(txn)?)
    }

    /// Test support and diagnostics: store a raw legacy account row, the
    /// layout written by schema version 1.
    pub fn account_put_v1(
        &self,
        txn: &mut RwTxn,
        account: &PublicKey,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        self.accounts.put(txn, account.as_bytes(), bytes)?;
        Ok(())
    }

    fn block_value(block: &Block, sideband: &BlockSideband) -> Vec<u8> {
        let mut writer = Writer::with_capacity(block.size() + sideband.size());
        block.write(&mut writer);
        sideband.write(&mut writer);
        writer.into_bytes()
    }

    fn decode_block(value: &[u8]) -> Result<(Block, BlockSideband), StorageError> {
        let mut reader = Reader::new(value);
        let block = Block::read(&mut reader)?;
        let sideband = BlockSideband::read(&mut reader)?;
        Ok((block, sideband))
    }
}

impl AccountProvider for LedgerStore {
    fn account_get(
        &self,
        txn: &RoTxn,
        account: &PublicKey,
    ) -> Result<Option<AccountInfo>, StorageError> {
        match self.accounts.get(txn, account.as_bytes())? {
            Some(value) => {
                let value = value.to_vec();
                Ok(Some(read_account_info(self, txn, &value)?))
            }
            None => Ok(None),
        }
    }

    fn account_put(
        &self,
        txn: &mut RwTxn,
        account: &PublicKey,
        info: &AccountInfo,
    ) -> Result<(), StorageError> {
        self.accounts
            .put(txn, account.as_bytes(), &info.to_bytes())?;
        Ok(())
    }

    fn account_del(&self, txn: &mut RwTxn, account: &PublicKey) -> Result<(), StorageError> {
        self.accounts.delete(txn, account.as_bytes())?;
        Ok(())
    }

    fn account_count(&self, txn: &RoTxn) -> Result<u64, StorageError> {
        Ok(self.accounts.len(txn)?)
    }
}

impl BlockProvider for LedgerStore {
    fn block_get(
        &self,
        txn: &RoTxn,
        hash: &Hash,
    ) -> Result<Option<(Block, BlockSideband)>, StorageError> {
        match self.blocks.get(txn, hash.as_bytes())? {
            Some(value) => Ok(Some(Self::decode_block(value)?)),
            None => Ok(None),
        }
    }

    fn block_exists(&self, txn: &RoTxn, hash: &Hash) -> Result<bool, StorageError> {
        Ok(self.blocks.get(txn, hash.as_bytes())?.is_some())
    }

    fn block_put(
        &self,
        txn: &mut RwTxn,
        hash: &Hash,
        block: &Block,
        sideband: &BlockSideband,
    ) -> Result<(), StorageError> {
        self.blocks
            .put(txn, hash.as_bytes(), &Self::block_value(block, sideband))?;
        let previous = block.previous();
        if !previous.is_zero() {
            self.block_successor_set(txn, &previous, hash)?;
        }
        Ok(())
    }

    fn block_del(&self, txn: &mut RwTxn, hash: &Hash) -> Result<(), StorageError> {
        self.blocks.delete(txn, hash.as_bytes())?;
        Ok(())
    }

    fn block_successor_set(
        &self,
        txn: &mut RwTxn,
        hash: &Hash,
        successor: &Hash,
    ) -> Result<(), StorageError> {
        let value = self
            .blocks
            .get(txn, hash.as_bytes())?
            .ok_or(StorageError::MissingRecord(*hash))?
            .to_vec();
        let (block, mut sideband) = Self::decode_block(&value)?;
        sideband.successor = *successor;
        self.blocks
            .put(txn, hash.as_bytes(), &Self::block_value(&block, &sideband))?;
        Ok(())
    }

    fn block_count(&self, txn: &RoTxn) -> Result<u64, StorageError> {
        Ok(self.blocks.len(txn)?)
    }
}

impl PendingProvider for LedgerStore {
    fn pending_get(
        &self,
        txn: &RoTxn,
        key: &PendingKey,
    ) -> Result<Option<PendingInfo>, StorageError> {
        match self.pending.get(txn, &key.to_bytes())? {
            Some(value) => Ok(Some(PendingInfo::from_bytes(value)?)),
            None => Ok(None),
        }
    }

    fn pending_put(
        &self,
        txn: &mut RwTxn,
        key: &PendingKey,
        info: &PendingInfo,
    ) -> Result<(), StorageError> {
        self.pending.put(txn, &key.to_bytes(), &info.to_bytes())?;
        Ok(())
    }

    fn pending_del(&self, txn: &mut RwTxn, key: &PendingKey) -> Result<(), StorageError> {
        self.pending.delete(txn, &key.to_bytes())?;
        Ok(())
    }

    fn pending_count(&self, txn: &RoTxn) -> Result<u64, StorageError> {
        Ok(self.pending.len(txn)?)
    }
}

impl FrontierProvider for LedgerStore {
    fn frontier_get(&self, txn: &RoTxn, hash: &Hash) -> Result<Option<PublicKey>, StorageError> {
        match self.frontiers.get(txn, hash.as_bytes())? {
            Some(value) => Ok(Some(PublicKey::from_bytes(value)?)),
            None => Ok(None),
        }
    }

    fn frontier_put(
        &self,
        txn: &mut RwTxn,
        hash: &Hash,
        account: &PublicKey,
    ) -> Result<(), StorageError> {
        self.frontiers
            .put(txn, hash.as_bytes(), account.as_bytes())?;
        Ok(())
    }

    fn frontier_del(&self, txn: &mut RwTxn, hash: &Hash) -> Result<(), StorageError> {
        self.frontiers.delete(txn, hash.as_bytes())?;
        Ok(())
    }
}

impl RepresentationProvider for LedgerStore {
    fn rep_weight_get(&self, txn: &RoTxn, rep: &PublicKey) -> Result<Amount, StorageError> {
        match self.representation.get(txn, rep.as_bytes())? {
            Some(value) => {
                let mut reader = Reader::new(value);
                Ok(reader.read_u128()?)
            }
            None => Ok(0),
        }
    }

    fn rep_weight_put(
        &self,
        txn: &mut RwTxn,
        rep: &PublicKey,
        weight: Amount,
    ) -> Result<(), StorageError> {
        if weight == 0 {
            self.representation.delete(txn, rep.as_bytes())?;
        } else {
            self.representation
                .put(txn, rep.as_bytes(), &weight.to_be_bytes())?;
        }
        Ok(())
    }
}

impl VoteProvider for LedgerStore {
    fn vote_get(&self, txn: &RoTxn, voter: &PublicKey) -> Result<Option<Vote>, StorageError> {
        match self.votes.get(txn, voter.as_bytes())? {
            Some(value) => Ok(Some(Vote::from_bytes(value)?)),
            None => Ok(None),
        }
    }

    fn vote_put(&self, txn: &mut RwTxn, vote: &Vote) -> Result<(), StorageError> {
        self.votes
            .put(txn, vote.account.as_bytes(), &vote.to_bytes())?;
        Ok(())
    }

    fn vote_generate(
        &self,
        txn: &mut RwTxn,
        key: &KeyPair,
        hashes: Vec<Hash>,
    ) -> Result<Vote, StorageError> {
        let sequence = match self.vote_get(txn, key.public_key())? {
            Some(existing) => existing.sequence + 1,
            None => 1,
        };
        let vote = Vote::new(key, sequence, hashes);
        self.vote_put(txn, &vote)?;
        Ok(vote)
    }
}

impl VersionProvider for LedgerStore {
    fn version_get(&self, txn: &RoTxn) -> Result<Option<u32>, StorageError> {
        match self.meta.get(txn, VERSION_KEY)? {
            Some(value) => {
                let mut reader = Reader::new(value);
                Ok(Some(reader.read_u32()?))
            }
            None => Ok(None),
        }
    }

    fn version_put(&self, txn: &mut RwTxn, version: u32) -> Result<(), StorageError> {
        self.meta.put(txn, VERSION_KEY, &version.to_be_bytes())?;
        Ok(())
    }
}
