use crate::core::elections::ActiveElections;
use crate::core::ledger::{Ledger, ProcessResult};
use crate::p2p::NetworkHandle;
use lattice_common::block::Block;
use lattice_common::utils::{spawn_thread, ThreadRole};
use metrics::counter;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

struct BlockQueue {
    blocks: VecDeque<Arc<Block>>,
    stopped: bool,
}

/// The single writer: drains its queue in batches, each batch under one
/// store write transaction bounded by the configured batch time.
pub struct BlockProcessor {
    shared: Arc<(Mutex<BlockQueue>, Condvar)>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl BlockProcessor {
    pub fn new(
        ledger: Arc<Ledger>,
        active: Arc<ActiveElections>,
        network: Arc<dyn NetworkHandle>,
        batch_max_time: Duration,
    ) -> Self {
        let shared = Arc::new((
            Mutex::new(BlockQueue {
                blocks: VecDeque::new(),
                stopped: false,
            }),
            Condvar::new(),
        ));
        let thread = {
            let shared = shared.clone();
            match spawn_thread(ThreadRole::BlockProcessing, move || {
                Self::run(&shared, &ledger, &active, network.as_ref(), batch_max_time)
            }) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    error!("Failed to spawn block processing thread: {}", e);
                    None
                }
            }
        };
        BlockProcessor {
            shared,
            thread: Mutex::new(thread),
        }
    }

    pub fn add(&self, block: Arc<Block>) {
        {
            let (queue, _) = &*self.shared;
            let mut queue = queue.lock().expect("block queue mutex poisoned");
            if queue.stopped {
                return;
            }
            queue.blocks.push_back(block);
        }
        self.shared.1.notify_one();
    }

    pub fn queue_len(&self) -> usize {
        self.shared
            .0
            .lock()
            .expect("block queue mutex poisoned")
            .blocks
            .len()
    }

    pub fn stop(&self) {
        {
            let (queue, _) = &*self.shared;
            queue.lock().expect("block queue mutex poisoned").stopped = true;
        }
        self.shared.1.notify_all();
        let handle = self
            .thread
            .lock()
            .expect("block processor mutex poisoned")
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Block processing thread panicked");
            }
        }
    }

    fn run(
        shared: &(Mutex<BlockQueue>, Condvar),
        ledger: &Ledger,
        active: &ActiveElections,
        network: &dyn NetworkHandle,
        batch_max_time: Duration,
    ) {
        let (queue, condition) = shared;
        loop {
            let mut guard = queue.lock().expect("block queue mutex poisoned");
            while guard.blocks.is_empty() && !guard.stopped {
                guard = condition.wait(guard).expect("block queue mutex poisoned");
            }
            if guard.stopped {
                break;
            }
            drop(guard);
            Self::process_batch(shared, ledger, active, network, batch_max_time);
        }
    }

    fn process_batch(
        shared: &(Mutex<BlockQueue>, Condvar),
        ledger: &Ledger,
        active: &ActiveElections,
        network: &dyn NetworkHandle,
        batch_max_time: Duration,
    ) {
        let mut txn = match ledger.store.tx_begin_write() {
            Ok(txn) => txn,
            Err(e) => {
                error!("Block processor could not open a transaction: {}", e);
                return;
            }
        };
        let started = Instant::now();
        let deadline = started + batch_max_time;
        let mut processed = 0usize;
        loop {
            let block = {
                let (queue, _) = shared;
                queue
                    .lock()
                    .expect("block queue mutex poisoned")
                    .blocks
                    .pop_front()
            };
            let Some(block) = block else { break };
            match ledger.process(&mut txn, &block) {
                Ok(result) => Self::handle_result(&txn, ledger, active, network, result, block),
                Err(e) => error!("Store failure while processing {}: {}", block.hash(), e),
            }
            processed += 1;
            if Instant::now() >= deadline {
                break;
            }
        }
        if let Err(e) = txn.commit() {
            error!("Failed to commit block batch: {}", e);
            return;
        }
        if processed > 1 {
            debug!(
                "Processed {} blocks in {}ms",
                processed,
                started.elapsed().as_millis()
            );
        }
    }

    fn handle_result(
        txn: &heed::RwTxn,
        ledger: &Ledger,
        active: &ActiveElections,
        network: &dyn NetworkHandle,
        result: ProcessResult,
        block: Arc<Block>,
    ) {
        match result {
            ProcessResult::Progress => {
                network.publish(&block);
            }
            ProcessResult::Fork => {
                counter!("block_processor_fork_total").increment(1);
                warn!("Fork detected for root {}", block.root());
                match ledger.forked_block(txn, &block) {
                    Ok(Some(existing)) => {
                        active.start(Arc::new(existing));
                    }
                    Ok(None) => {}
                    Err(e) => error!("Failed to load forked block: {}", e),
                }
                active.start(block);
            }
            ProcessResult::GapPrevious | ProcessResult::GapSource => {
                // the bootstrap machinery outside the core retries gaps
                counter!("block_processor_gap_total").increment(1);
            }
            _ => {}
        }
    }
}
