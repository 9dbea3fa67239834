use crate::core::storage::{
    AccountProvider, BlockProvider, BlockSideband, FrontierProvider, LedgerStore, PendingProvider,
    RepresentationProvider, StorageError,
};
use heed::{RoTxn, RwTxn};
use lattice_common::{
    account::{AccountInfo, Epoch, PendingInfo, PendingKey},
    block::{Block, Root},
    config::Amount,
    crypto::{Hash, PublicKey},
    difficulty::work_valid,
    network::Network,
    time::get_current_time_in_seconds,
};
use metrics::counter;
use std::sync::Arc;

/// Outcome of processing one block. Only `Progress` mutates the store;
/// everything else reports why the block was not applied.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProcessResult {
    Progress,
    Old,
    BadSignature,
    InsufficientWork,
    GapPrevious,
    GapSource,
    Fork,
    Unreceivable,
    BalanceMismatch,
    RepresentativeMismatch,
    BlockPosition,
}

impl ProcessResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessResult::Progress => "progress",
            ProcessResult::Old => "old",
            ProcessResult::BadSignature => "bad_signature",
            ProcessResult::InsufficientWork => "insufficient_work",
            ProcessResult::GapPrevious => "gap_previous",
            ProcessResult::GapSource => "gap_source",
            ProcessResult::Fork => "fork",
            ProcessResult::Unreceivable => "unreceivable",
            ProcessResult::BalanceMismatch => "balance_mismatch",
            ProcessResult::RepresentativeMismatch => "representative_mismatch",
            ProcessResult::BlockPosition => "block_position",
        }
    }
}

impl std::fmt::Display for ProcessResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The block-processing state machine: validates candidate blocks against
/// store state, applies them, and computes rollbacks. All methods operate
/// inside a caller-supplied transaction; a result other than `Progress`
/// leaves the transaction untouched.
pub struct Ledger {
    pub store: Arc<LedgerStore>,
    pub network: Network,
    epoch_link: Hash,
    epoch_signer: PublicKey,
}

impl Ledger {
    pub fn new(
        store: Arc<LedgerStore>,
        network: Network,
        epoch_link: Hash,
        epoch_signer: PublicKey,
    ) -> Self {
        Ledger {
            store,
            network,
            epoch_link,
            epoch_signer,
        }
    }

    pub fn is_epoch_link(&self, link: &Hash) -> bool {
        !self.epoch_link.is_zero() && *link == self.epoch_link
    }

    pub fn process(&self, txn: &mut RwTxn, block: &Block) -> Result<ProcessResult, StorageError> {
        let result = match block {
            Block::Send(_) | Block::Receive(_) | Block::Change(_) => {
                self.process_chained(txn, block)?
            }
            Block::Open(_) => self.process_open(txn, block)?,
            Block::State(_) => self.process_state(txn, block)?,
        };
        counter!("ledger_process_total", "result" => result.as_str()).increment(1);
        if result != ProcessResult::Progress {
            debug!("Block {} not applied: {}", block.hash(), result);
        }
        Ok(result)
    }

    // send / receive / change share their structural prologue: the
    // account is resolved through the predecessor, which must be the
    // current head.
    fn process_chained(
        &self,
        txn: &mut RwTxn,
        block: &Block,
    ) -> Result<ProcessResult, StorageError> {
        let hash = block.hash();
        if self.store.block_exists(txn, &hash)? {
            return Ok(ProcessResult::Old);
        }
        let previous = block.previous();
        if previous.is_zero() {
            return Ok(ProcessResult::BlockPosition);
        }
        let Some((_, prev_side)) = self.store.block_get(txn, &previous)? else {
            return Ok(ProcessResult::GapPrevious);
        };
        let account = prev_side.account;
        if !block.verify_signature(&account) {
            return Ok(ProcessResult::BadSignature);
        }
        if !work_valid(self.network, &block.root(), block.work()) {
            return Ok(ProcessResult::InsufficientWork);
        }
        let info = self
            .store
            .account_get(txn, &account)?
            .ok_or(StorageError::MissingRecord(previous))?;
        if info.head != previous {
            return Ok(ProcessResult::Fork);
        }

        let now = get_current_time_in_seconds();
        match block {
            Block::Send(b) => {
                if b.balance > info.balance {
                    return Ok(ProcessResult::BalanceMismatch);
                }
                let amount = info.balance - b.balance;
                self.store.block_put(
                    txn,
                    &hash,
                    block,
                    &BlockSideband {
                        successor: Hash::zero(),
                        account,
                        balance: b.balance,
                        height: prev_side.height + 1,
                        timestamp: now,
                        epoch: info.epoch,
                    },
                )?;
                self.store.pending_put(
                    txn,
                    &PendingKey::new(b.destination, hash),
                    &PendingInfo {
                        source: account,
                        amount,
                        epoch: info.epoch,
                    },
                )?;
                let new_info = AccountInfo {
                    head: hash,
                    rep_block: info.rep_block,
                    open_block: info.open_block,
                    balance: b.balance,
                    modified: now,
                    block_count: info.block_count + 1,
                    epoch: info.epoch,
                };
                self.change_account(txn, &account, Some(&info), &new_info)?;
                self.move_frontier(txn, &previous, &hash, &account)?;
            }
            Block::Receive(b) => {
                if !self.store.block_exists(txn, &b.source)? {
                    return Ok(ProcessResult::GapSource);
                }
                let key = PendingKey::new(account, b.source);
                let Some(pending) = self.store.pending_get(txn, &key)? else {
                    return Ok(ProcessResult::Unreceivable);
                };
                let balance = info.balance.saturating_add(pending.amount);
                self.store.block_put(
                    txn,
                    &hash,
                    block,
                    &BlockSideband {
                        successor: Hash::zero(),
                        account,
                        balance,
                        height: prev_side.height + 1,
                        timestamp: now,
                        epoch: info.epoch,
                    },
                )?;
                self.store.pending_del(txn, &key)?;
                let new_info = AccountInfo {
                    head: hash,
                    rep_block: info.rep_block,
                    open_block: info.open_block,
                    balance,
                    modified: now,
                    block_count: info.block_count + 1,
                    epoch: info.epoch,
                };
                self.change_account(txn, &account, Some(&info), &new_info)?;
                self.move_frontier(txn, &previous, &hash, &account)?;
            }
            Block::Change(_) => {
                self.store.block_put(
                    txn,
                    &hash,
                    block,
                    &BlockSideband {
                        successor: Hash::zero(),
                        account,
                        balance: info.balance,
                        height: prev_side.height + 1,
                        timestamp: now,
                        epoch: info.epoch,
                    },
                )?;
                let new_info = AccountInfo {
                    head: hash,
                    rep_block: hash,
                    open_block: info.open_block,
                    balance: info.balance,
                    modified: now,
                    block_count: info.block_count + 1,
                    epoch: info.epoch,
                };
                self.change_account(txn, &account, Some(&info), &new_info)?;
                self.move_frontier(txn, &previous, &hash, &account)?;
            }
            _ => unreachable!("process_chained only handles send/receive/change"),
        }
        Ok(ProcessResult::Progress)
    }

    fn process_open(&self, txn: &mut RwTxn, block: &Block) -> Result<ProcessResult, StorageError> {
        let Block::Open(b) = block else {
            unreachable!("process_open only handles open blocks")
        };
        let hash = block.hash();
        if self.store.block_exists(txn, &hash)? {
            return Ok(ProcessResult::Old);
        }
        if !block.verify_signature(&b.account) {
            return Ok(ProcessResult::BadSignature);
        }
        if !work_valid(self.network, &block.root(), block.work()) {
            return Ok(ProcessResult::InsufficientWork);
        }
        if self.store.account_get(txn, &b.account)?.is_some() {
            // a different first block is already committed for this root
            return Ok(ProcessResult::Fork);
        }
        if !self.store.block_exists(txn, &b.source)? {
            return Ok(ProcessResult::GapSource);
        }
        let key = PendingKey::new(b.account, b.source);
        let Some(pending) = self.store.pending_get(txn, &key)? else {
            return Ok(ProcessResult::Unreceivable);
        };

        let now = get_current_time_in_seconds();
        self.store.block_put(
            txn,
            &hash,
            block,
            &BlockSideband {
                successor: Hash::zero(),
                account: b.account,
                balance: pending.amount,
                height: 1,
                timestamp: now,
                epoch: pending.epoch,
            },
        )?;
        self.store.pending_del(txn, &key)?;
        let info = AccountInfo {
            head: hash,
            rep_block: hash,
            open_block: hash,
            balance: pending.amount,
            modified: now,
            block_count: 1,
            epoch: pending.epoch,
        };
        self.change_account(txn, &b.account, None, &info)?;
        self.store.frontier_put(txn, &hash, &b.account)?;
        Ok(ProcessResult::Progress)
    }

    fn process_state(&self, txn: &mut RwTxn, block: &Block) -> Result<ProcessResult, StorageError> {
        let Block::State(b) = block else {
            unreachable!("process_state only handles state blocks")
        };
        let hash = block.hash();
        if self.store.block_exists(txn, &hash)? {
            return Ok(ProcessResult::Old);
        }
        let is_epoch = self.is_epoch_link(&b.link);
        let signer = if is_epoch { self.epoch_signer } else { b.account };
        if !block.verify_signature(&signer) {
            return Ok(ProcessResult::BadSignature);
        }
        if !work_valid(self.network, &block.root(), block.work()) {
            return Ok(ProcessResult::InsufficientWork);
        }

        let info = self.store.account_get(txn, &b.account)?;
        let (prev_balance, prev_height, prev_epoch) = match &info {
            Some(existing) => {
                if b.previous.is_zero() {
                    // a competing first block for an opened account
                    return Ok(ProcessResult::Fork);
                }
                let Some((_, prev_side)) = self.store.block_get(txn, &b.previous)? else {
                    return Ok(ProcessResult::GapPrevious);
                };
                if existing.head != b.previous {
                    return Ok(ProcessResult::Fork);
                }
                (existing.balance, prev_side.height, existing.epoch)
            }
            None => {
                if !b.previous.is_zero() {
                    return Ok(ProcessResult::GapPrevious);
                }
                (0, 0, Epoch::Epoch0)
            }
        };

        let mut epoch = prev_epoch;
        if is_epoch {
            if b.balance != prev_balance {
                return Ok(ProcessResult::BalanceMismatch);
            }
            if let Some(existing) = &info {
                let current_rep = self.block_representative(txn, &existing.rep_block)?;
                if b.representative != current_rep {
                    return Ok(ProcessResult::RepresentativeMismatch);
                }
            }
            if prev_epoch >= Epoch::Epoch1 {
                // nothing left to upgrade to
                return Ok(ProcessResult::BlockPosition);
            }
            epoch = Epoch::Epoch1;
        } else if b.balance < prev_balance {
            // send
        } else if b.balance > prev_balance {
            // receive; the link names the source send
            if b.link.is_zero() {
                return Ok(ProcessResult::GapSource);
            }
            if !self.store.block_exists(txn, &b.link)? {
                return Ok(ProcessResult::GapSource);
            }
            let key = PendingKey::new(b.account, b.link);
            let Some(pending) = self.store.pending_get(txn, &key)? else {
                return Ok(ProcessResult::Unreceivable);
            };
            if pending.amount != b.balance - prev_balance {
                return Ok(ProcessResult::BalanceMismatch);
            }
        } else if !b.link.is_zero() {
            // no amount moved, not an epoch: only a representative
            // change is left, and that carries a zero link
            return Ok(ProcessResult::BalanceMismatch);
        }

        let now = get_current_time_in_seconds();
        self.store.block_put(
            txn,
            &hash,
            block,
            &BlockSideband {
                successor: Hash::zero(),
                account: b.account,
                balance: b.balance,
                height: prev_height + 1,
                timestamp: now,
                epoch,
            },
        )?;
        if !is_epoch {
            if b.balance < prev_balance {
                let amount = prev_balance - b.balance;
                self.store.pending_put(
                    txn,
                    &PendingKey::new(PublicKey::from(b.link), hash),
                    &PendingInfo {
                        source: b.account,
                        amount,
                        epoch,
                    },
                )?;
            } else if b.balance > prev_balance {
                self.store
                    .pending_del(txn, &PendingKey::new(b.account, b.link))?;
            }
        }
        let new_info = AccountInfo {
            head: hash,
            rep_block: hash,
            open_block: info.as_ref().map(|i| i.open_block).unwrap_or(hash),
            balance: b.balance,
            modified: now,
            block_count: info.as_ref().map(|i| i.block_count).unwrap_or(0) + 1,
            epoch,
        };
        self.change_account(txn, &b.account, info.as_ref(), &new_info)?;
        if b.previous.is_zero() {
            self.store.frontier_put(txn, &hash, &b.account)?;
        } else {
            self.move_frontier(txn, &b.previous, &hash, &b.account)?;
        }
        Ok(ProcessResult::Progress)
    }

    /// Undo blocks on the owning account's chain, newest first, until
    /// `hash` itself has been removed. Receives that depend on a rolled
    /// back send are rolled back first, depth first. Idempotent: a hash
    /// that is no longer present is a no-op.
    pub fn rollback(&self, txn: &mut RwTxn, hash: &Hash) -> Result<(), StorageError> {
        let Some((_, side)) = self.store.block_get(txn, hash)? else {
            return Ok(());
        };
        let account = side.account;
        while self.store.block_exists(txn, hash)? {
            let info = self
                .store
                .account_get(txn, &account)?
                .ok_or(StorageError::MissingRecord(*hash))?;
            let (head_block, head_side) = self
                .store
                .block_get(txn, &info.head)?
                .ok_or(StorageError::MissingRecord(info.head))?;
            self.rollback_one(txn, &account, &info, &head_block, &head_side)?;
            counter!("ledger_rollback_total").increment(1);
        }
        Ok(())
    }

    // Undo a single chain head.
    fn rollback_one(
        &self,
        txn: &mut RwTxn,
        account: &PublicKey,
        info: &AccountInfo,
        block: &Block,
        side: &BlockSideband,
    ) -> Result<(), StorageError> {
        let hash = block.hash();
        trace!("Rolling back {}", hash);
        match block {
            Block::Send(b) => {
                self.rollback_outgoing(txn, &b.destination, &hash)?;
                self.restore_predecessor(txn, account, info, block)?;
            }
            Block::Receive(b) => {
                let prev_balance = self
                    .store
                    .block_get(txn, &b.previous)?
                    .ok_or(StorageError::MissingRecord(b.previous))?
                    .1
                    .balance;
                self.refund_pending(txn, account, &b.source, side, prev_balance)?;
                self.restore_predecessor(txn, account, info, block)?;
            }
            Block::Open(b) => {
                self.refund_pending(txn, account, &b.source, side, 0)?;
                self.remove_account(txn, account, info, &hash)?;
            }
            Block::Change(_) => {
                self.restore_predecessor(txn, account, info, block)?;
            }
            Block::State(b) => {
                let prev_balance = if b.previous.is_zero() {
                    0
                } else {
                    self.store
                        .block_get(txn, &b.previous)?
                        .ok_or(StorageError::MissingRecord(b.previous))?
                        .1
                        .balance
                };
                if b.balance < prev_balance {
                    self.rollback_outgoing(txn, &PublicKey::from(b.link), &hash)?;
                } else if b.balance > prev_balance {
                    self.refund_pending(txn, account, &b.link, side, prev_balance)?;
                }
                if b.previous.is_zero() {
                    self.remove_account(txn, account, info, &hash)?;
                } else {
                    self.restore_predecessor(txn, account, info, block)?;
                }
            }
        }
        Ok(())
    }

    // Remove the pending entry created by a send, rolling back the
    // destination chain first if the amount was already received.
    fn rollback_outgoing(
        &self,
        txn: &mut RwTxn,
        destination: &PublicKey,
        send_hash: &Hash,
    ) -> Result<(), StorageError> {
        let key = PendingKey::new(*destination, *send_hash);
        while self.store.pending_get(txn, &key)?.is_none() {
            let head = self
                .latest(txn, destination)?
                .ok_or(StorageError::MissingRecord(*send_hash))?;
            self.rollback(txn, &head)?;
        }
        self.store.pending_del(txn, &key)?;
        Ok(())
    }

    // Re-create the pending entry a receiving block consumed.
    fn refund_pending(
        &self,
        txn: &mut RwTxn,
        account: &PublicKey,
        source: &Hash,
        side: &BlockSideband,
        prev_balance: Amount,
    ) -> Result<(), StorageError> {
        let (_, source_side) = self
            .store
            .block_get(txn, source)?
            .ok_or(StorageError::MissingRecord(*source))?;
        self.store.pending_put(
            txn,
            &PendingKey::new(*account, *source),
            &PendingInfo {
                source: source_side.account,
                amount: side.balance - prev_balance,
                epoch: source_side.epoch,
            },
        )?;
        Ok(())
    }

    fn restore_predecessor(
        &self,
        txn: &mut RwTxn,
        account: &PublicKey,
        info: &AccountInfo,
        block: &Block,
    ) -> Result<(), StorageError> {
        let hash = block.hash();
        let previous = block.previous();
        let (_, prev_side) = self
            .store
            .block_get(txn, &previous)?
            .ok_or(StorageError::MissingRecord(previous))?;
        let rep_block = self.representative_block(txn, &previous)?;
        let new_info = AccountInfo {
            head: previous,
            rep_block,
            open_block: info.open_block,
            balance: prev_side.balance,
            modified: get_current_time_in_seconds(),
            block_count: info.block_count.saturating_sub(1),
            epoch: prev_side.epoch,
        };
        self.change_account(txn, account, Some(info), &new_info)?;
        self.store.frontier_del(txn, &hash)?;
        self.store.frontier_put(txn, &previous, account)?;
        self.store.block_del(txn, &hash)?;
        self.store
            .block_successor_set(txn, &previous, &Hash::zero())?;
        Ok(())
    }

    fn remove_account(
        &self,
        txn: &mut RwTxn,
        account: &PublicKey,
        info: &AccountInfo,
        hash: &Hash,
    ) -> Result<(), StorageError> {
        let rep = self.block_representative(txn, &info.rep_block)?;
        let weight = self.store.rep_weight_get(txn, &rep)?;
        self.store
            .rep_weight_put(txn, &rep, weight.saturating_sub(info.balance))?;
        self.store.account_del(txn, account)?;
        self.store.frontier_del(txn, hash)?;
        self.store.block_del(txn, hash)?;
        Ok(())
    }

    // Apply an account row update together with its weight moves: the
    // old balance leaves the old representative, the new balance joins
    // the new one.
    fn change_account(
        &self,
        txn: &mut RwTxn,
        account: &PublicKey,
        old: Option<&AccountInfo>,
        new: &AccountInfo,
    ) -> Result<(), StorageError> {
        if let Some(old) = old {
            let old_rep = self.block_representative(txn, &old.rep_block)?;
            let weight = self.store.rep_weight_get(txn, &old_rep)?;
            self.store
                .rep_weight_put(txn, &old_rep, weight.saturating_sub(old.balance))?;
        }
        let new_rep = self.block_representative(txn, &new.rep_block)?;
        let weight = self.store.rep_weight_get(txn, &new_rep)?;
        self.store
            .rep_weight_put(txn, &new_rep, weight.saturating_add(new.balance))?;
        self.store.account_put(txn, account, new)?;
        Ok(())
    }

    fn move_frontier(
        &self,
        txn: &mut RwTxn,
        from: &Hash,
        to: &Hash,
        account: &PublicKey,
    ) -> Result<(), StorageError> {
        self.store.frontier_del(txn, from)?;
        self.store.frontier_put(txn, to, account)?;
        Ok(())
    }

    /// Representative named by the block at `hash`.
    pub fn block_representative(
        &self,
        txn: &RoTxn,
        hash: &Hash,
    ) -> Result<PublicKey, StorageError> {
        let (block, _) = self
            .store
            .block_get(txn, hash)?
            .ok_or(StorageError::MissingRecord(*hash))?;
        block
            .representative()
            .copied()
            .ok_or(StorageError::MissingRecord(*hash))
    }

    /// Hash of the newest block at or before `hash` that names a
    /// representative.
    pub fn representative_block(&self, txn: &RoTxn, hash: &Hash) -> Result<Hash, StorageError> {
        let mut current = *hash;
        loop {
            let (block, _) = self
                .store
                .block_get(txn, &current)?
                .ok_or(StorageError::MissingRecord(current))?;
            if block.representative().is_some() {
                return Ok(current);
            }
            current = block.previous();
        }
    }

    pub fn latest(&self, txn: &RoTxn, account: &PublicKey) -> Result<Option<Hash>, StorageError> {
        Ok(self.store.account_get(txn, account)?.map(|info| info.head))
    }

    /// Root the account's next block must use: the head when the account
    /// exists, otherwise the account itself.
    pub fn latest_root(&self, txn: &RoTxn, account: &PublicKey) -> Result<Root, StorageError> {
        Ok(match self.store.account_get(txn, account)? {
            Some(info) => info.head,
            None => Hash::from(*account),
        })
    }

    pub fn account_balance(&self, txn: &RoTxn, account: &PublicKey) -> Result<Amount, StorageError> {
        Ok(self
            .store
            .account_get(txn, account)?
            .map(|info| info.balance)
            .unwrap_or(0))
    }

    /// Sum of receivable amounts destined to `account`.
    pub fn account_pending(&self, txn: &RoTxn, account: &PublicKey) -> Result<Amount, StorageError> {
        let mut total = 0u128;
        for (_, info) in self.store.pending_for_account(txn, account)? {
            total = total.saturating_add(info.amount);
        }
        Ok(total)
    }

    /// Balance of the chain as of `hash`.
    pub fn balance(&self, txn: &RoTxn, hash: &Hash) -> Result<Option<Amount>, StorageError> {
        Ok(self
            .store
            .block_get(txn, hash)?
            .map(|(_, side)| side.balance))
    }

    /// Amount moved by the block at `hash`.
    pub fn amount(&self, txn: &RoTxn, hash: &Hash) -> Result<Option<Amount>, StorageError> {
        let Some((block, side)) = self.store.block_get(txn, hash)? else {
            return Ok(None);
        };
        let previous = block.previous();
        if previous.is_zero() {
            return Ok(Some(side.balance));
        }
        let Some((_, prev_side)) = self.store.block_get(txn, &previous)? else {
            return Ok(None);
        };
        Ok(Some(side.balance.abs_diff(prev_side.balance)))
    }

    /// Account that owns the block at `hash`.
    pub fn account(&self, txn: &RoTxn, hash: &Hash) -> Result<Option<PublicKey>, StorageError> {
        Ok(self
            .store
            .block_get(txn, hash)?
            .map(|(_, side)| side.account))
    }

    /// Voting weight delegated to `rep`.
    pub fn weight(&self, txn: &RoTxn, rep: &PublicKey) -> Result<Amount, StorageError> {
        self.store.rep_weight_get(txn, rep)
    }

    /// The block currently occupying `root`: the committed successor of
    /// a chained root, or the first block of an account root.
    pub fn successor(&self, txn: &RoTxn, root: &Root) -> Result<Option<Hash>, StorageError> {
        if let Some((_, side)) = self.store.block_get(txn, root)? {
            return Ok(if side.successor.is_zero() {
                None
            } else {
                Some(side.successor)
            });
        }
        Ok(self
            .store
            .account_get(txn, &PublicKey::from(*root))?
            .map(|info| info.open_block))
    }

    /// The committed block conflicting with `block`, if any.
    pub fn forked_block(&self, txn: &RoTxn, block: &Block) -> Result<Option<Block>, StorageError> {
        let Some(existing) = self.successor(txn, &block.root())? else {
            return Ok(None);
        };
        if existing == block.hash() {
            return Ok(None);
        }
        Ok(self.store.block_get(txn, &existing)?.map(|(b, _)| b))
    }
}
