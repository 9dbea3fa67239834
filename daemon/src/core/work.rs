use lattice_common::{
    block::Root,
    crypto::random::secure_random_u64,
    difficulty::work_value,
    network::Network,
    utils::{spawn_thread, ThreadRole},
};
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

pub type WorkCallback = Box<dyn FnOnce(Option<u64>) + Send + 'static>;

/// Optional accelerator backend, tried before the CPU search.
pub type AcceleratorHook = Box<dyn Fn(&Root) -> Option<u64> + Send + Sync + 'static>;

// Nonce candidates evaluated between retirement checks.
const CANDIDATES_PER_ROUND: usize = 256;

struct PoolState {
    pending: VecDeque<(Root, WorkCallback)>,
    // Bumped whenever the head request retires; workers holding an older
    // ticket abandon their search.
    ticket: usize,
    done: bool,
}

struct PoolShared {
    state: Mutex<PoolState>,
    producer_condition: Condvar,
    network: Network,
    accelerator: Option<AcceleratorHook>,
}

/// Cancellable proof-of-work producer. Worker threads cooperate on the
/// head of a FIFO of requests, drawing random 64-bit candidates until one
/// clears the active network's threshold.
pub struct WorkPool {
    shared: Arc<PoolShared>,
    threads: Vec<JoinHandle<()>>,
}

impl WorkPool {
    /// `max_threads` caps the worker count at the hardware concurrency;
    /// pass `usize::MAX` to use every core.
    pub fn new(network: Network, max_threads: usize, accelerator: Option<AcceleratorHook>) -> Self {
        let shared = Arc::new(PoolShared {
            state: Mutex::new(PoolState {
                pending: VecDeque::new(),
                ticket: 0,
                done: false,
            }),
            producer_condition: Condvar::new(),
            network,
            accelerator,
        });

        let count = max_threads.clamp(1, num_cpus::get().max(1));
        let mut threads = Vec::with_capacity(count);
        for index in 0..count {
            let shared = shared.clone();
            match spawn_thread(ThreadRole::WorkPool, move || Self::run(&shared, index)) {
                Ok(handle) => threads.push(handle),
                Err(e) => error!("Failed to spawn work thread: {}", e),
            }
        }

        WorkPool { shared, threads }
    }

    fn run(shared: &PoolShared, thread_index: usize) {
        let threshold = shared.network.work_threshold();
        let mut guard = shared.state.lock().expect("work pool mutex poisoned");
        loop {
            if guard.done {
                break;
            }
            let Some((root, _)) = guard.pending.front() else {
                guard = shared
                    .producer_condition
                    .wait(guard)
                    .expect("work pool mutex poisoned");
                continue;
            };
            let root = *root;
            let ticket = guard.ticket;
            drop(guard);

            let mut result = None;
            if thread_index == 0 {
                if let Some(hook) = &shared.accelerator {
                    result = hook(&root);
                }
            }
            while result.is_none() {
                for _ in 0..CANDIDATES_PER_ROUND {
                    let candidate = secure_random_u64();
                    if work_value(&root, candidate) >= threshold {
                        result = Some(candidate);
                        break;
                    }
                }
                let state = shared.state.lock().expect("work pool mutex poisoned");
                if state.ticket != ticket || state.done {
                    break;
                }
            }

            guard = shared.state.lock().expect("work pool mutex poisoned");
            if let Some(work) = result {
                if guard.ticket == ticket {
                    guard.ticket += 1;
                    if let Some((_, callback)) = guard.pending.pop_front() {
                        drop(guard);
                        callback(Some(work));
                        guard = shared.state.lock().expect("work pool mutex poisoned");
                    }
                }
            }
        }
    }

    /// Queue a request; the callback receives the nonce, or `None` when
    /// the request is cancelled or the pool stops.
    pub fn generate_async(&self, root: Root, callback: WorkCallback) {
        {
            let mut state = self.shared.state.lock().expect("work pool mutex poisoned");
            if state.done {
                drop(state);
                callback(None);
                return;
            }
            state.pending.push_back((root, callback));
        }
        self.shared.producer_condition.notify_all();
    }

    /// Block until work for `root` is found.
    pub fn generate(&self, root: &Root) -> Option<u64> {
        let (tx, rx) = std::sync::mpsc::channel();
        self.generate_async(
            *root,
            Box::new(move |work| {
                let _ = tx.send(work);
            }),
        );
        rx.recv().ok().flatten()
    }

    /// Drop every queued request for `root`. An in-flight search observes
    /// its ticket retired and tries no further candidate for this root.
    pub fn cancel(&self, root: &Root) {
        let mut cancelled = Vec::new();
        {
            let mut state = self.shared.state.lock().expect("work pool mutex poisoned");
            let items = std::mem::take(&mut state.pending);
            let mut head_cancelled = false;
            for (index, (item_root, callback)) in items.into_iter().enumerate() {
                if item_root == *root {
                    if index == 0 {
                        head_cancelled = true;
                    }
                    cancelled.push(callback);
                } else {
                    state.pending.push_back((item_root, callback));
                }
            }
            if head_cancelled {
                state.ticket += 1;
            }
        }
        for callback in cancelled {
            callback(None);
        }
    }

    pub fn stop(&self) {
        let drained = {
            let mut state = self.shared.state.lock().expect("work pool mutex poisoned");
            state.done = true;
            state.ticket += 1;
            std::mem::take(&mut state.pending)
        };
        self.shared.producer_condition.notify_all();
        for (_, callback) in drained {
            callback(None);
        }
    }
}

impl Drop for WorkPool {
    fn drop(&mut self) {
        self.stop();
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                error!("Work thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_common::block::{Block, ChangeBlock, SendBlock};
    use lattice_common::crypto::{Hash, KeyPair};
    use lattice_common::difficulty::work_valid;

    #[test]
    fn test_one() {
        let pool = WorkPool::new(Network::Devnet, usize::MAX, None);
        let key = KeyPair::new();
        let mut block: Block =
            ChangeBlock::new(Hash::from(1u64), *KeyPair::new().public_key(), &key, 4).into();
        let work = pool.generate(&block.root()).unwrap();
        block.set_work(work);
        assert!(work_valid(Network::Devnet, &block.root(), block.work()));
    }

    #[test]
    fn test_validate() {
        let pool = WorkPool::new(Network::Devnet, usize::MAX, None);
        let key = KeyPair::new();
        let mut block: Block =
            SendBlock::new(Hash::from(1u64), *KeyPair::new().public_key(), 2, &key, 6).into();
        assert!(!work_valid(Network::Devnet, &block.root(), block.work()));
        let work = pool.generate(&block.root()).unwrap();
        block.set_work(work);
        assert!(work_valid(Network::Devnet, &block.root(), block.work()));
    }

    #[test]
    fn test_cancel() {
        let pool = WorkPool::new(Network::Devnet, usize::MAX, None);
        let key = Hash::from(1u64);
        let mut iterations = 0;
        loop {
            let (tx, rx) = std::sync::mpsc::channel();
            pool.generate_async(
                key,
                Box::new(move |work| {
                    let _ = tx.send(work);
                }),
            );
            pool.cancel(&key);
            iterations += 1;
            assert!(iterations < 200);
            if rx.recv().unwrap().is_none() {
                break;
            }
        }
    }

    #[test]
    fn test_cancel_many() {
        let pool = WorkPool::new(Network::Devnet, usize::MAX, None);
        let roots = [
            Hash::from(1u64),
            Hash::from(2u64),
            Hash::from(1u64),
            Hash::from(1u64),
            Hash::from(3u64),
            Hash::from(1u64),
        ];
        for root in &roots {
            pool.generate_async(*root, Box::new(|_| {}));
        }
        pool.cancel(&Hash::from(1u64));
    }

    #[test]
    fn test_accelerator_first() {
        let pool = WorkPool::new(
            Network::Devnet,
            1,
            Some(Box::new(|_root| Some(0xdead_beef))),
        );
        let work = pool.generate(&Hash::from(9u64)).unwrap();
        assert_eq!(work, 0xdead_beef);
    }
}
