use crate::core::ledger::Ledger;
use crate::core::storage::StorageError;
use crate::p2p::NetworkHandle;
use indexmap::IndexMap;
use lattice_common::{
    block::{Block, Root},
    config::Amount,
    crypto::{Hash, PublicKey},
    vote::Vote,
};
use metrics::counter;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// How often unconfirmed elections are re-announced.
pub const ANNOUNCEMENT_INTERVAL: Duration = Duration::from_secs(16);

/// Elections older than this are dropped; the current head stands.
pub const ELECTION_CUTOFF: Duration = Duration::from_secs(5 * 60);

/// Representatives silent for longer than this stop counting as online.
pub const ONLINE_WEIGHT_CUTOFF: Duration = Duration::from_secs(5 * 60);

/// A voter's latest statement within one election.
#[derive(Clone, Copy, Debug)]
pub struct VoteInfo {
    pub sequence: u64,
    pub hash: Hash,
    pub time: Instant,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum VoteResult {
    /// The vote updated at least one election.
    Processed,
    /// Every entry was superseded by an equal or newer sequence.
    Replay,
    /// No election cares about the voted hashes.
    Indeterminate,
}

pub struct ElectionData {
    /// Candidate blocks observed for this root, in arrival order.
    pub blocks: IndexMap<Hash, Arc<Block>>,
    pub last_votes: HashMap<PublicKey, VoteInfo>,
    pub confirmed: bool,
    pub announcements: u32,
}

/// One contest over a conflicted root.
pub struct Election {
    pub root: Root,
    started: Instant,
    data: Mutex<ElectionData>,
}

impl Election {
    fn new(root: Root, block: Arc<Block>, node_id: PublicKey) -> Self {
        let hash = block.hash();
        let mut blocks = IndexMap::new();
        blocks.insert(hash, block);
        let mut last_votes = HashMap::new();
        // tentative local vote, weighted by whatever the node id holds
        // (normally nothing)
        last_votes.insert(
            node_id,
            VoteInfo {
                sequence: 0,
                hash,
                time: Instant::now(),
            },
        );
        Election {
            root,
            started: Instant::now(),
            data: Mutex::new(ElectionData {
                blocks,
                last_votes,
                confirmed: false,
                announcements: 0,
            }),
        }
    }

    pub fn last_votes_len(&self) -> usize {
        self.data.lock().expect("election mutex poisoned").last_votes.len()
    }

    pub fn contains_voter(&self, voter: &PublicKey) -> bool {
        self.data
            .lock()
            .expect("election mutex poisoned")
            .last_votes
            .contains_key(voter)
    }

    pub fn candidates(&self) -> Vec<Hash> {
        self.data
            .lock()
            .expect("election mutex poisoned")
            .blocks
            .keys()
            .copied()
            .collect()
    }

    pub fn confirmed(&self) -> bool {
        self.data.lock().expect("election mutex poisoned").confirmed
    }
}

/// Tracks which representatives have voted recently and the weight floor
/// used as the quorum base.
pub struct OnlineReps {
    minimum: Amount,
    reps: Mutex<HashMap<PublicKey, Instant>>,
}

impl OnlineReps {
    pub fn new(minimum: Amount) -> Self {
        OnlineReps {
            minimum,
            reps: Mutex::new(HashMap::new()),
        }
    }

    pub fn observe(&self, rep: PublicKey) {
        self.reps
            .lock()
            .expect("online reps mutex poisoned")
            .insert(rep, Instant::now());
    }

    /// Weight considered online: the recently-seen representatives'
    /// combined weight, floored at the configured minimum.
    pub fn online_weight(&self, ledger: &Ledger) -> Result<Amount, StorageError> {
        let recent: Vec<PublicKey> = {
            let mut reps = self.reps.lock().expect("online reps mutex poisoned");
            reps.retain(|_, seen| seen.elapsed() < ONLINE_WEIGHT_CUTOFF);
            reps.keys().copied().collect()
        };
        let txn = ledger.store.tx_begin_read()?;
        let mut total: Amount = 0;
        for rep in recent {
            total = total.saturating_add(ledger.weight(&txn, &rep)?);
        }
        Ok(total.max(self.minimum))
    }
}

type VoteHook = Box<dyn Fn(&Hash) + Send + Sync>;

struct ActiveState {
    roots: HashMap<Root, Arc<Election>>,
    // routes a voted hash to the election that owns it
    blocks: HashMap<Hash, Root>,
}

/// The set of ongoing elections. One election per conflicting root; vote
/// application is serialized per root by the election's own lock, roots
/// are independent.
pub struct ActiveElections {
    ledger: Arc<Ledger>,
    network: Arc<dyn NetworkHandle>,
    node_id: PublicKey,
    pub online: OnlineReps,
    quorum_percent: u64,
    state: Mutex<ActiveState>,
    vote_hook: Mutex<Option<VoteHook>>,
}

impl ActiveElections {
    pub fn new(
        ledger: Arc<Ledger>,
        network: Arc<dyn NetworkHandle>,
        node_id: PublicKey,
        online_weight_minimum: Amount,
        quorum_percent: u64,
    ) -> Self {
        ActiveElections {
            ledger,
            network,
            node_id,
            online: OnlineReps::new(online_weight_minimum),
            quorum_percent,
            state: Mutex::new(ActiveState {
                roots: HashMap::new(),
                blocks: HashMap::new(),
            }),
            vote_hook: Mutex::new(None),
        }
    }

    /// Install the handle used to ask the vote generator for local votes.
    pub fn set_vote_hook(&self, hook: VoteHook) {
        *self.vote_hook.lock().expect("vote hook mutex poisoned") = Some(hook);
    }

    fn request_local_vote(&self, hash: &Hash) {
        if let Some(hook) = self
            .vote_hook
            .lock()
            .expect("vote hook mutex poisoned")
            .as_ref()
        {
            hook(hash);
        }
    }

    /// Open an election for the block's root, or add the block as another
    /// candidate to the existing one. Returns true when a new election
    /// was created.
    pub fn start(&self, block: Arc<Block>) -> bool {
        let root = block.root();
        let hash = block.hash();
        let mut state = self.state.lock().expect("elections mutex poisoned");
        if let Some(election) = state.roots.get(&root).cloned() {
            let mut data = election.data.lock().expect("election mutex poisoned");
            data.blocks.entry(hash).or_insert(block);
            drop(data);
            state.blocks.insert(hash, root);
            return false;
        }
        let election = Arc::new(Election::new(root, block, self.node_id));
        state.roots.insert(root, election);
        state.blocks.insert(hash, root);
        counter!("elections_started_total").increment(1);
        true
    }

    /// Apply a verified vote to every election containing one of its
    /// hashes.
    pub fn vote(&self, vote: &Vote) -> VoteResult {
        self.online.observe(vote.account);
        let mut result = VoteResult::Indeterminate;
        for hash in &vote.hashes {
            let election = {
                let state = self.state.lock().expect("elections mutex poisoned");
                state
                    .blocks
                    .get(hash)
                    .and_then(|root| state.roots.get(root))
                    .cloned()
            };
            let Some(election) = election else { continue };
            match self.vote_one(&election, vote.account, vote.sequence, *hash) {
                VoteResult::Processed => result = VoteResult::Processed,
                VoteResult::Replay if result == VoteResult::Indeterminate => {
                    result = VoteResult::Replay
                }
                _ => {}
            }
        }
        result
    }

    fn vote_one(
        &self,
        election: &Arc<Election>,
        voter: PublicKey,
        sequence: u64,
        hash: Hash,
    ) -> VoteResult {
        let winner = {
            let mut data = election.data.lock().expect("election mutex poisoned");
            if data.confirmed {
                return VoteResult::Indeterminate;
            }
            if let Some(existing) = data.last_votes.get(&voter) {
                if existing.sequence >= sequence {
                    counter!("elections_vote_replay_total").increment(1);
                    return VoteResult::Replay;
                }
            }
            data.last_votes.insert(
                voter,
                VoteInfo {
                    sequence,
                    hash,
                    time: Instant::now(),
                },
            );
            counter!("elections_vote_total").increment(1);
            match self.quorum_winner(&data) {
                Ok(Some(winner)) => {
                    data.confirmed = true;
                    data.blocks.get(&winner).cloned()
                }
                Ok(None) => None,
                Err(e) => {
                    error!("Tally failed: {}", e);
                    None
                }
            }
        };
        if let Some(winner) = winner {
            self.confirm(election, winner);
        }
        VoteResult::Processed
    }

    /// Weighted support per candidate, heaviest first, from the current
    /// `last_votes` snapshot.
    fn tally(&self, data: &ElectionData) -> Result<Vec<(Amount, Hash)>, StorageError> {
        let txn = self.ledger.store.tx_begin_read()?;
        let mut totals: HashMap<Hash, Amount> = HashMap::new();
        for (voter, info) in &data.last_votes {
            // ignore votes for candidates this election never saw
            if !data.blocks.contains_key(&info.hash) {
                continue;
            }
            let weight = self.ledger.weight(&txn, voter)?;
            let entry = totals.entry(info.hash).or_default();
            *entry = entry.saturating_add(weight);
        }
        let mut sorted: Vec<(Amount, Hash)> =
            totals.into_iter().map(|(hash, weight)| (weight, hash)).collect();
        sorted.sort_by(|a, b| b.cmp(a));
        Ok(sorted)
    }

    // The leading candidate if its support meets quorum.
    fn quorum_winner(&self, data: &ElectionData) -> Result<Option<Hash>, StorageError> {
        let tally = self.tally(data)?;
        let Some((weight, hash)) = tally.first() else {
            return Ok(None);
        };
        let online = self.online.online_weight(&self.ledger)?;
        let threshold = online / 100 * self.quorum_percent as Amount;
        if *weight >= threshold && *weight > 0 {
            Ok(Some(*hash))
        } else {
            Ok(None)
        }
    }

    fn confirm(&self, election: &Arc<Election>, winner: Arc<Block>) {
        counter!("elections_confirmed_total").increment(1);
        info!(
            "Election for root {} confirmed winner {}",
            election.root,
            winner.hash()
        );
        self.apply_confirmed(&winner);
        self.erase(&election.root);
    }

    // Make the ledger agree with the voted outcome: roll the losing chain
    // back to the fork point and process the winner.
    fn apply_confirmed(&self, winner: &Block) {
        let result = (|| -> Result<(), StorageError> {
            let mut txn = self.ledger.store.tx_begin_write()?;
            if self.ledger.store.block_exists(&txn, &winner.hash())? {
                return Ok(());
            }
            if let Some(existing) = self.ledger.successor(&txn, &winner.root())? {
                self.ledger.rollback(&mut txn, &existing)?;
            }
            let outcome = self.ledger.process(&mut txn, winner)?;
            info!("Confirmed block {} applied: {}", winner.hash(), outcome);
            Ok(())
        })();
        if let Err(e) = result {
            error!("Failed to apply confirmed block {}: {}", winner.hash(), e);
        }
    }

    pub fn erase(&self, root: &Root) {
        let mut state = self.state.lock().expect("elections mutex poisoned");
        state.roots.remove(root);
        state.blocks.retain(|_, r| r != root);
    }

    /// Periodic maintenance: drop finished and aged elections, then
    /// re-broadcast a confirm_req for each leader and ask the local
    /// representatives to vote for it.
    pub fn announce_votes(&self) {
        let elections: Vec<Arc<Election>> = {
            let state = self.state.lock().expect("elections mutex poisoned");
            state.roots.values().cloned().collect()
        };
        let mut expired = Vec::new();
        for election in elections {
            if election.confirmed() || election.started.elapsed() >= ELECTION_CUTOFF {
                expired.push(election.root);
                continue;
            }
            let leader = {
                let mut data = election.data.lock().expect("election mutex poisoned");
                data.announcements += 1;
                let leader_hash = match self.tally(&data) {
                    Ok(tally) => tally.first().map(|(_, hash)| *hash),
                    Err(e) => {
                        error!("Tally failed during announcement: {}", e);
                        None
                    }
                }
                .or_else(|| data.blocks.keys().next().copied());
                leader_hash.and_then(|hash| data.blocks.get(&hash).cloned())
            };
            if let Some(leader) = leader {
                self.network.confirm_req(&leader);
                self.request_local_vote(&leader.hash());
                counter!("elections_announcements_total").increment(1);
            }
        }
        for root in expired {
            debug!("Dropping election for root {}", root);
            self.erase(&root);
        }
    }

    pub fn roots_len(&self) -> usize {
        self.state.lock().expect("elections mutex poisoned").roots.len()
    }

    pub fn election(&self, root: &Root) -> Option<Arc<Election>> {
        self.state
            .lock()
            .expect("elections mutex poisoned")
            .roots
            .get(root)
            .cloned()
    }
}
