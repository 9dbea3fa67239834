use crate::core::elections::ActiveElections;
use lattice_common::utils::{spawn_thread, ThreadRole};
use lattice_common::vote::Vote;
use metrics::counter;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

struct VoteQueue {
    votes: VecDeque<Vote>,
    stopped: bool,
}

/// Single ingestion thread for inbound votes: verifies signatures off
/// the network path and feeds the elections serially.
pub struct VoteProcessor {
    shared: Arc<(Mutex<VoteQueue>, Condvar)>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl VoteProcessor {
    pub fn new(active: Arc<ActiveElections>) -> Self {
        let shared = Arc::new((
            Mutex::new(VoteQueue {
                votes: VecDeque::new(),
                stopped: false,
            }),
            Condvar::new(),
        ));
        let thread = {
            let shared = shared.clone();
            match spawn_thread(ThreadRole::VoteProcessing, move || {
                Self::run(&shared, &active)
            }) {
                Ok(handle) => Some(handle),
                Err(e) => {
                    error!("Failed to spawn vote processing thread: {}", e);
                    None
                }
            }
        };
        VoteProcessor {
            shared,
            thread: Mutex::new(thread),
        }
    }

    pub fn vote(&self, vote: Vote) {
        {
            let (queue, _) = &*self.shared;
            let mut queue = queue.lock().expect("vote queue mutex poisoned");
            if queue.stopped {
                return;
            }
            queue.votes.push_back(vote);
        }
        self.shared.1.notify_one();
    }

    pub fn stop(&self) {
        {
            let (queue, _) = &*self.shared;
            queue.lock().expect("vote queue mutex poisoned").stopped = true;
        }
        self.shared.1.notify_all();
        let handle = self
            .thread
            .lock()
            .expect("vote processor mutex poisoned")
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Vote processing thread panicked");
            }
        }
    }

    fn run(shared: &(Mutex<VoteQueue>, Condvar), active: &ActiveElections) {
        let (queue, condition) = shared;
        let mut guard = queue.lock().expect("vote queue mutex poisoned");
        loop {
            if guard.stopped {
                break;
            }
            let Some(vote) = guard.votes.pop_front() else {
                guard = condition.wait(guard).expect("vote queue mutex poisoned");
                continue;
            };
            drop(guard);
            if vote.validate() {
                counter!("vote_processor_valid_total").increment(1);
                active.vote(&vote);
            } else {
                counter!("vote_processor_invalid_total").increment(1);
                debug!("Dropping vote with bad signature from {}", vote.account);
            }
            guard = queue.lock().expect("vote queue mutex poisoned");
        }
    }
}
