use crate::core::storage::{LedgerStore, VoteProvider};
use crate::p2p::NetworkHandle;
use lattice_common::{
    crypto::{Hash, KeyPair},
    vote::{Vote, MAX_VOTE_HASHES},
};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

/// Default time a lone hash waits before being flushed into a vote.
pub const DEFAULT_VOTE_WAIT: Duration = Duration::from_millis(500);

const MAILBOX_SIZE: usize = 1024;

/// Where the vote generator finds the representative keys this node is
/// allowed to sign with. The wallet implements this; tests hand in keys
/// directly.
pub trait RepresentativeKeys: Send + Sync {
    fn representatives(&self) -> Vec<KeyPair>;
}

/// In-memory key set, used by tests and by nodes configured with
/// standalone representative keys.
#[derive(Default)]
pub struct LocalRepresentatives {
    keys: Vec<KeyPair>,
}

impl LocalRepresentatives {
    pub fn new(keys: Vec<KeyPair>) -> Self {
        LocalRepresentatives { keys }
    }
}

impl RepresentativeKeys for LocalRepresentatives {
    fn representatives(&self) -> Vec<KeyPair> {
        self.keys.clone()
    }
}

/// Receives locally generated votes so they count in our own elections.
pub type VoteSink = Box<dyn Fn(Vote) + Send + Sync>;

/// Batches hashes wanting a local vote and signs one vote per held
/// representative key, either when a full batch accumulates or when the
/// wait deadline passes.
pub struct VoteGenerator {
    sender: mpsc::Sender<Hash>,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl VoteGenerator {
    /// Spawn the generator actor. Returns only after the actor is
    /// running, so a following `add` can never race the startup.
    pub async fn start(
        store: Arc<LedgerStore>,
        wallet: Arc<dyn RepresentativeKeys>,
        network: Arc<dyn NetworkHandle>,
        sink: VoteSink,
        wait: Duration,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(MAILBOX_SIZE);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let handle = tokio::spawn(Self::run(
            receiver, stop_rx, ready_tx, store, wallet, network, sink, wait,
        ));
        let _ = ready_rx.await;
        VoteGenerator {
            sender,
            stop: Mutex::new(Some(stop_tx)),
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Queue a hash for the next local vote.
    pub fn add(&self, hash: Hash) {
        if self.sender.try_send(hash).is_err() {
            debug!("Vote generator mailbox full, dropping {}", hash);
            counter!("vote_generator_dropped_total").increment(1);
        }
    }

    pub async fn stop(&self) {
        if let Some(stop) = self.stop.lock().await.take() {
            let _ = stop.send(());
        }
        if let Some(handle) = self.handle.lock().await.take() {
            if handle.await.is_err() {
                error!("Vote generator task panicked");
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run(
        mut receiver: mpsc::Receiver<Hash>,
        mut stop: oneshot::Receiver<()>,
        ready: oneshot::Sender<()>,
        store: Arc<LedgerStore>,
        wallet: Arc<dyn RepresentativeKeys>,
        network: Arc<dyn NetworkHandle>,
        sink: VoteSink,
        wait: Duration,
    ) {
        let _ = ready.send(());
        let mut hashes: Vec<Hash> = Vec::with_capacity(MAX_VOTE_HASHES);
        let mut deadline: Option<Instant> = None;
        loop {
            let sleep_target = deadline.unwrap_or_else(|| Instant::now() + wait);
            tokio::select! {
                _ = &mut stop => {
                    if !hashes.is_empty() {
                        Self::flush(&store, wallet.as_ref(), network.as_ref(), &sink, &mut hashes);
                    }
                    break;
                }
                received = receiver.recv() => match received {
                    Some(hash) => {
                        hashes.push(hash);
                        if hashes.len() >= MAX_VOTE_HASHES {
                            Self::flush(&store, wallet.as_ref(), network.as_ref(), &sink, &mut hashes);
                            deadline = None;
                        } else if deadline.is_none() {
                            deadline = Some(Instant::now() + wait);
                        }
                    }
                    None => break,
                },
                _ = sleep_until(sleep_target), if deadline.is_some() => {
                    if !hashes.is_empty() {
                        Self::flush(&store, wallet.as_ref(), network.as_ref(), &sink, &mut hashes);
                    }
                    deadline = None;
                }
            }
        }
    }

    fn flush(
        store: &LedgerStore,
        wallet: &dyn RepresentativeKeys,
        network: &dyn NetworkHandle,
        sink: &VoteSink,
        hashes: &mut Vec<Hash>,
    ) {
        let batch: Vec<Hash> = hashes.drain(..).collect();
        let keys = wallet.representatives();
        if keys.is_empty() {
            return;
        }
        let mut txn = match store.tx_begin_write() {
            Ok(txn) => txn,
            Err(e) => {
                error!("Vote generator could not open a transaction: {}", e);
                return;
            }
        };
        for key in &keys {
            match store.vote_generate(&mut txn, key, batch.clone()) {
                Ok(vote) => {
                    counter!("vote_generator_broadcast_total").increment(1);
                    network.confirm_ack(&vote);
                    sink(vote);
                }
                Err(e) => error!("Failed to generate vote: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::p2p::NetworkHandle;
    use lattice_common::block::Block;
    use lattice_common::network::Network;
    use std::sync::Mutex as StdMutex;
    use tempdir::TempDir;

    #[derive(Default)]
    struct AckCollector {
        acks: StdMutex<Vec<Vote>>,
    }

    impl NetworkHandle for AckCollector {
        fn publish(&self, _block: &Block) {}
        fn confirm_req(&self, _block: &Block) {}
        fn confirm_ack(&self, vote: &Vote) {
            self.acks.lock().unwrap().push(vote.clone());
        }
    }

    fn open_store(dir: &TempDir) -> Arc<LedgerStore> {
        let store = Arc::new(LedgerStore::open(&dir.path().join("data.ldb"), 128).unwrap());
        let mut txn = store.tx_begin_write().unwrap();
        store.initialize(&mut txn, Network::Devnet).unwrap();
        txn.commit().unwrap();
        store
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_flush_on_deadline() {
        let dir = TempDir::new("voting").unwrap();
        let store = open_store(&dir);
        let network = Arc::new(AckCollector::default());
        let key = KeyPair::new();
        let generator = VoteGenerator::start(
            store,
            Arc::new(LocalRepresentatives::new(vec![key.clone()])),
            network.clone(),
            Box::new(|_| {}),
            Duration::from_millis(50),
        )
        .await;

        generator.add(Hash::from(1u64));
        tokio::time::sleep(Duration::from_millis(500)).await;

        let acks = network.acks.lock().unwrap();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].account, *key.public_key());
        assert_eq!(acks[0].hashes, vec![Hash::from(1u64)]);
        assert!(acks[0].validate());
        drop(acks);
        generator.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_flush_on_full_batch() {
        let dir = TempDir::new("voting").unwrap();
        let store = open_store(&dir);
        let network = Arc::new(AckCollector::default());
        let generator = VoteGenerator::start(
            store,
            Arc::new(LocalRepresentatives::new(vec![KeyPair::new()])),
            network.clone(),
            Box::new(|_| {}),
            // deadline far away: only a full batch can trigger the flush
            Duration::from_secs(3600),
        )
        .await;

        for index in 0..MAX_VOTE_HASHES {
            generator.add(Hash::from(index as u64 + 1));
        }
        tokio::time::sleep(Duration::from_millis(500)).await;

        let acks = network.acks.lock().unwrap();
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].hashes.len(), MAX_VOTE_HASHES);
        drop(acks);
        generator.stop().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sequences_increase_across_votes() {
        let dir = TempDir::new("voting").unwrap();
        let store = open_store(&dir);
        let network = Arc::new(AckCollector::default());
        let generator = VoteGenerator::start(
            store,
            Arc::new(LocalRepresentatives::new(vec![KeyPair::new()])),
            network.clone(),
            Box::new(|_| {}),
            Duration::from_millis(20),
        )
        .await;

        generator.add(Hash::from(1u64));
        tokio::time::sleep(Duration::from_millis(300)).await;
        generator.add(Hash::from(2u64));
        tokio::time::sleep(Duration::from_millis(300)).await;

        let acks = network.acks.lock().unwrap();
        assert_eq!(acks.len(), 2);
        assert!(acks[0].sequence < acks[1].sequence);
        drop(acks);
        generator.stop().await;
    }
}
