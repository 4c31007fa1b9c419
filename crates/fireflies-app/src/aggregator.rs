//! Fan-in of firefly state updates into a single authoritative map.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use fireflies_core::{FireflyId, FireflyState};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::agent::StateEmitter;
use crate::shutdown::{Shutdown, ShutdownTrigger};

type StateMap = Arc<RwLock<HashMap<FireflyId, FireflyState>>>;

/// Single-writer map of the latest state for every live firefly.
///
/// Only the writer task mutates the map; readers always receive an
/// independent copy. State updates travel over a bounded, lossy buffer while
/// retirements use an unbounded channel, so a finished firefly is always
/// evicted even when its final update was dropped.
pub struct StateAggregator {
    states: StateMap,
    sender: Mutex<Option<mpsc::Sender<FireflyState>>>,
    receiver: Mutex<Option<mpsc::Receiver<FireflyState>>>,
    retire_tx: Mutex<Option<mpsc::UnboundedSender<FireflyId>>>,
    retire_rx: Mutex<Option<mpsc::UnboundedReceiver<FireflyId>>>,
    trigger: ShutdownTrigger,
    writer: Mutex<Option<JoinHandle<()>>>,
    dropped: Arc<AtomicU64>,
}

impl StateAggregator {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let (retire_tx, retire_rx) = mpsc::unbounded_channel();
        Self {
            states: StateMap::default(),
            sender: Mutex::new(Some(sender)),
            receiver: Mutex::new(Some(receiver)),
            retire_tx: Mutex::new(Some(retire_tx)),
            retire_rx: Mutex::new(Some(retire_rx)),
            trigger: ShutdownTrigger::new(),
            writer: Mutex::new(None),
            dropped: Arc::default(),
        }
    }

    /// Producer handle for a firefly task; `None` once the aggregator has stopped.
    pub fn emitter(&self) -> Option<StateEmitter> {
        let sender = self.sender.lock().clone()?;
        let retire = self.retire_tx.lock().clone()?;
        Some(StateEmitter::new(sender, retire, Arc::clone(&self.dropped)))
    }

    /// Spawn the writer task on the current runtime. Returns `false` if it
    /// was already started.
    pub fn start(&self) -> bool {
        let Some(receiver) = self.receiver.lock().take() else {
            return false;
        };
        let Some(retired) = self.retire_rx.lock().take() else {
            return false;
        };
        let handle = tokio::spawn(run_writer(
            receiver,
            retired,
            Arc::clone(&self.states),
            self.trigger.subscribe(),
        ));
        *self.writer.lock() = Some(handle);
        true
    }

    /// Independent copy of every current state.
    pub fn snapshot(&self) -> Vec<FireflyState> {
        self.states.read().values().copied().collect()
    }

    pub fn count(&self) -> usize {
        self.states.read().len()
    }

    pub fn get(&self, id: FireflyId) -> Option<FireflyState> {
        self.states.read().get(&id).copied()
    }

    /// Updates discarded because the buffer was full or closed.
    pub fn dropped_states(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Stop the writer and close the channel. Safe to call more than once.
    pub async fn stop(&self) {
        self.trigger.trigger();
        let writer = self.writer.lock().take();
        if let Some(writer) = writer {
            if let Err(err) = writer.await {
                warn!(error = %err, "state writer task failed");
            }
        }
        self.sender.lock().take();
        self.receiver.lock().take();
        self.retire_tx.lock().take();
        self.retire_rx.lock().take();
    }
}

/// Writer-side view of the map plus the ids that have finished for good.
struct Ledger {
    states: StateMap,
    retired: HashSet<FireflyId>,
}

impl Ledger {
    fn apply(&self, state: FireflyState) {
        let mut map = self.states.write();
        if state.alive && !self.retired.contains(&state.id) {
            map.insert(state.id, state);
        } else {
            map.remove(&state.id);
        }
    }

    /// Ids are never reused, so an update buffered behind a retirement must
    /// not resurrect the entry.
    fn retire(&mut self, id: FireflyId) {
        self.retired.insert(id);
        self.states.write().remove(&id);
    }
}

async fn run_writer(
    mut receiver: mpsc::Receiver<FireflyState>,
    mut retired: mpsc::UnboundedReceiver<FireflyId>,
    states: StateMap,
    mut shutdown: Shutdown,
) {
    let mut ledger = Ledger {
        states,
        retired: HashSet::new(),
    };
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => {
                // Apply whatever is already buffered so final removals land.
                while let Ok(id) = retired.try_recv() {
                    ledger.retire(id);
                }
                while let Ok(state) = receiver.try_recv() {
                    ledger.apply(state);
                }
                break;
            }
            Some(id) = retired.recv() => ledger.retire(id),
            received = receiver.recv() => match received {
                Some(state) => ledger.apply(state),
                None => break,
            },
        }
    }
    debug!(
        remaining = ledger.states.read().len(),
        retired = ledger.retired.len(),
        "state writer stopped"
    );
}
