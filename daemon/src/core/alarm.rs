use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};

pub type AlarmCallback = Box<dyn FnOnce() + Send + 'static>;

struct Entry {
    deadline: Instant,
    // Preserves insertion order among equal deadlines.
    sequence: u64,
    callback: AlarmCallback,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.sequence == other.sequence
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed: BinaryHeap is a max-heap, we want the nearest deadline
        (other.deadline, other.sequence).cmp(&(self.deadline, self.sequence))
    }
}

struct AlarmState {
    queue: BinaryHeap<Entry>,
    next_sequence: u64,
    stopped: bool,
}

enum Step {
    Run(AlarmCallback),
    Wait(Instant),
    Idle,
    Stop,
}

/// Time-ordered callback dispatcher. Callbacks run on the dispatch task
/// in deadline order and are expected to be brief and idempotent.
pub struct Alarm {
    state: Arc<Mutex<AlarmState>>,
    notify: Arc<Notify>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Alarm {
    /// Must be created inside a tokio runtime.
    pub fn new() -> Self {
        let state = Arc::new(Mutex::new(AlarmState {
            queue: BinaryHeap::new(),
            next_sequence: 0,
            stopped: false,
        }));
        let notify = Arc::new(Notify::new());
        let handle = tokio::spawn(Self::run(state.clone(), notify.clone()));
        Alarm {
            state,
            notify,
            handle: Mutex::new(Some(handle)),
        }
    }

    pub fn add(&self, deadline: Instant, callback: impl FnOnce() + Send + 'static) {
        {
            let mut state = self.state.lock().expect("alarm mutex poisoned");
            if state.stopped {
                return;
            }
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            state.queue.push(Entry {
                deadline,
                sequence,
                callback: Box::new(callback),
            });
        }
        self.notify.notify_one();
    }

    pub async fn stop(&self) {
        {
            let mut state = self.state.lock().expect("alarm mutex poisoned");
            state.stopped = true;
            state.queue.clear();
        }
        self.notify.notify_one();
        let handle = self.handle.lock().expect("alarm mutex poisoned").take();
        if let Some(handle) = handle {
            if handle.await.is_err() {
                error!("Alarm dispatch task panicked");
            }
        }
    }

    async fn run(state: Arc<Mutex<AlarmState>>, notify: Arc<Notify>) {
        loop {
            let step = {
                let mut state = state.lock().expect("alarm mutex poisoned");
                if state.stopped {
                    Step::Stop
                } else {
                    match state.queue.peek() {
                        Some(entry) if entry.deadline <= Instant::now() => {
                            let entry = state.queue.pop().expect("peeked entry missing");
                            Step::Run(entry.callback)
                        }
                        Some(entry) => Step::Wait(entry.deadline),
                        None => Step::Idle,
                    }
                }
            };
            match step {
                Step::Run(callback) => callback(),
                Step::Wait(deadline) => {
                    tokio::select! {
                        _ = sleep_until(deadline) => {}
                        _ = notify.notified() => {}
                    }
                }
                Step::Idle => notify.notified().await,
                Step::Stop => break,
            }
        }
    }
}
