use crate::config::DaemonConfig;
use crate::core::alarm::Alarm;
use crate::core::block_processor::BlockProcessor;
use crate::core::elections::{ActiveElections, ANNOUNCEMENT_INTERVAL};
use crate::core::ledger::Ledger;
use crate::core::storage::LedgerStore;
use crate::core::vote_processor::VoteProcessor;
use crate::core::voting::{RepresentativeKeys, VoteGenerator, DEFAULT_VOTE_WAIT};
use crate::core::work::WorkPool;
use crate::p2p::{Message, NetworkHandle};
use lattice_common::{block::Block, crypto::KeyPair, network::Network};
use metrics::counter;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// The assembled node: the store, the single-writer ledger pipeline, the
/// election machinery and the services feeding them. Components talk to
/// each other through the narrow handles wired up here, never through a
/// back-pointer to the node.
pub struct Node {
    pub network_kind: Network,
    pub config: DaemonConfig,
    pub store: Arc<LedgerStore>,
    pub ledger: Arc<Ledger>,
    pub active: Arc<ActiveElections>,
    pub work: WorkPool,
    pub block_processor: Arc<BlockProcessor>,
    pub vote_processor: Arc<VoteProcessor>,
    pub vote_generator: Arc<VoteGenerator>,
    pub alarm: Alarm,
    pub node_id: KeyPair,
    stopped: AtomicBool,
}

impl Node {
    pub async fn new(
        data_path: &Path,
        config: DaemonConfig,
        network_kind: Network,
        network: Arc<dyn NetworkHandle>,
        wallet: Arc<dyn RepresentativeKeys>,
    ) -> anyhow::Result<Arc<Self>> {
        let store = Arc::new(LedgerStore::open(
            &data_path.join("data.ldb"),
            config.node.lmdb_max_dbs,
        )?);
        {
            let mut txn = store.tx_begin_write()?;
            if store.is_empty(&txn)? {
                info!("Initializing {} genesis record", network_kind);
                store.initialize(&mut txn, network_kind)?;
            }
            txn.commit()?;
        }

        let node_id = KeyPair::new();
        let ledger = Arc::new(Ledger::new(
            store.clone(),
            network_kind,
            config.node.epoch_block_link,
            config.node.epoch_block_signer,
        ));
        let active = Arc::new(ActiveElections::new(
            ledger.clone(),
            network.clone(),
            *node_id.public_key(),
            config.node.online_weight_minimum,
            config.node.online_weight_quorum,
        ));

        let vote_processor = Arc::new(VoteProcessor::new(active.clone()));
        let sink = {
            let processor = Arc::downgrade(&vote_processor);
            Box::new(move |vote| {
                if let Some(processor) = processor.upgrade() {
                    processor.vote(vote);
                }
            })
        };
        let vote_generator = Arc::new(
            VoteGenerator::start(store.clone(), wallet, network.clone(), sink, DEFAULT_VOTE_WAIT)
                .await,
        );
        {
            let generator = Arc::downgrade(&vote_generator);
            active.set_vote_hook(Box::new(move |hash| {
                if let Some(generator) = generator.upgrade() {
                    generator.add(*hash);
                }
            }));
        }

        let block_processor = Arc::new(BlockProcessor::new(
            ledger.clone(),
            active.clone(),
            network.clone(),
            Duration::from_millis(config.node.block_processor_batch_max_time),
        ));
        let work = WorkPool::new(network_kind, config.node.work_threads as usize, None);
        let alarm = Alarm::new();

        Ok(Arc::new(Node {
            network_kind,
            config,
            store,
            ledger,
            active,
            work,
            block_processor,
            vote_processor,
            vote_generator,
            alarm,
            node_id,
            stopped: AtomicBool::new(false),
        }))
    }

    pub fn start(self: &Arc<Self>) {
        info!(
            "Node id {} starting on {}",
            self.node_id.public_key().to_address(),
            self.network_kind
        );
        self.schedule_announcement();
    }

    fn schedule_announcement(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.alarm
            .add(Instant::now() + ANNOUNCEMENT_INTERVAL, move || {
                if let Some(node) = weak.upgrade() {
                    if !node.stopped.load(Ordering::SeqCst) {
                        node.active.announce_votes();
                        node.schedule_announcement();
                    }
                }
            });
    }

    /// Queue a block for the single-writer processing pipeline.
    pub fn process_active(&self, block: Block) {
        self.block_processor.add(Arc::new(block));
    }

    /// Entry point for messages the wire layer parsed.
    pub fn receive_message(&self, message: Message) {
        match message {
            Message::Keepalive(_) => {
                // peer table maintenance happens in the transport
                counter!("message_keepalive_total").increment(1);
            }
            Message::Publish(publish) => {
                counter!("message_publish_total").increment(1);
                self.block_processor.add(Arc::new(publish.block));
            }
            Message::ConfirmReq(request) => {
                counter!("message_confirm_req_total").increment(1);
                if self.config.node.enable_voting {
                    self.vote_generator.add(request.block.hash());
                }
                self.block_processor.add(Arc::new(request.block));
            }
            Message::ConfirmAck(ack) => {
                counter!("message_confirm_ack_total").increment(1);
                self.vote_processor.vote(ack.vote);
            }
        }
    }

    /// Entry point for raw datagrams; parse failures are dropped and
    /// counted, the peer is kept.
    pub fn receive_bytes(&self, bytes: &[u8]) {
        match Message::deserialize(bytes) {
            Ok(message) => self.receive_message(message),
            Err(e) => {
                counter!("message_parse_errors_total").increment(1);
                debug!("Dropping unparseable message: {}", e);
            }
        }
    }

    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("Node stopping");
        self.block_processor.stop();
        self.vote_processor.stop();
        self.vote_generator.stop().await;
        self.alarm.stop().await;
        self.work.stop();
    }
}
