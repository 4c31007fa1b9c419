//! One asynchronous task per firefly: tick, emit, repeat until expiry or shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use fireflies_core::{Firefly, FireflyId, FireflyState, Forces, Lantern, Vec2, Vitality};
use parking_lot::RwLock;
use rand::rngs::SmallRng;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::trace;

use crate::shutdown::Shutdown;
use crate::wind::SharedWind;

/// Garden-wide attraction point, read by every firefly on each tick.
pub type AttractionCell = Arc<RwLock<Option<Vec2>>>;

/// Non-blocking producer handle into the state aggregator.
///
/// Emission never waits: when the buffer is full (or the aggregator is gone)
/// the update is discarded and counted. Retirement is never discarded while
/// the aggregator runs.
#[derive(Debug, Clone)]
pub struct StateEmitter {
    tx: mpsc::Sender<FireflyState>,
    retire: mpsc::UnboundedSender<FireflyId>,
    dropped: Arc<AtomicU64>,
}

impl StateEmitter {
    pub(crate) fn new(
        tx: mpsc::Sender<FireflyState>,
        retire: mpsc::UnboundedSender<FireflyId>,
        dropped: Arc<AtomicU64>,
    ) -> Self {
        Self {
            tx,
            retire,
            dropped,
        }
    }

    /// Returns `false` when the update was dropped.
    pub fn emit(&self, state: FireflyState) -> bool {
        match self.tx.try_send(state) {
            Ok(()) => true,
            Err(_) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Tell the aggregator `id` has finished for good. Returns `false` once
    /// the aggregator has stopped.
    pub fn retire(&self, id: FireflyId) -> bool {
        self.retire.send(id).is_ok()
    }

    /// Updates discarded so far by every emitter sharing this counter.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Everything a firefly task owns for its lifetime.
pub struct FireflyTask {
    pub firefly: Firefly,
    pub emitter: StateEmitter,
    /// Snapshot taken at spawn time; lanterns added later do not affect this firefly.
    pub lanterns: Vec<Lantern>,
    pub wind: Option<SharedWind>,
    pub attraction: AttractionCell,
    pub tick: Duration,
    pub dt: f32,
    pub rng: SmallRng,
}

impl FireflyTask {
    /// Drive the firefly until its lifespan runs out or `shutdown` fires.
    ///
    /// The final emission always carries `alive == false` and is followed by
    /// a retirement, so the entry is evicted even if that emission is dropped.
    pub async fn run(mut self, mut shutdown: Shutdown) {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.tick, self.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    self.finish();
                    trace!(id = %self.firefly.id(), "firefly cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let attraction = *self.attraction.read();
                    let wind = self.wind.as_ref().map(SharedWind::force);
                    let forces = Forces {
                        lanterns: &self.lanterns,
                        attraction,
                        wind,
                    };
                    match self.firefly.tick(self.dt, &forces, &mut self.rng) {
                        Vitality::Alive => {
                            self.emitter.emit(self.firefly.state(true));
                        }
                        Vitality::Expired => {
                            self.finish();
                            let age = self.firefly.age();
                            trace!(id = %self.firefly.id(), age, "firefly expired");
                            break;
                        }
                    }
                }
            }
        }
    }

    fn finish(&self) {
        self.emitter.emit(self.firefly.state(false));
        self.emitter.retire(self.firefly.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shutdown::ShutdownTrigger;
    use fireflies_core::FireflySettings;
    use rand::SeedableRng;

    fn emitter(
        tx: mpsc::Sender<FireflyState>,
        dropped: Arc<AtomicU64>,
    ) -> (StateEmitter, mpsc::UnboundedReceiver<FireflyId>) {
        let (retire_tx, retire_rx) = mpsc::unbounded_channel();
        (StateEmitter::new(tx, retire_tx, dropped), retire_rx)
    }

    fn task_with(settings: FireflySettings, emitter: StateEmitter) -> FireflyTask {
        let mut rng = SmallRng::seed_from_u64(3);
        let firefly = Firefly::spawn(
            FireflyId(1),
            Vec2::new(50.0, 50.0),
            &settings,
            Vec2::new(200.0, 200.0),
            &mut rng,
        );
        FireflyTask {
            firefly,
            emitter,
            lanterns: Vec::new(),
            wind: None,
            attraction: AttractionCell::default(),
            tick: Duration::from_millis(2),
            dt: 0.1,
            rng,
        }
    }

    fn task(lifespan: f32, emitter: StateEmitter) -> FireflyTask {
        let settings = FireflySettings {
            lifespan_min: lifespan,
            lifespan_max: lifespan,
            ..FireflySettings::default()
        };
        task_with(settings, emitter)
    }

    /// Per-tick displacement between consecutive states, undoing the wrap.
    fn steps(states: &[FireflyState]) -> Vec<Vec2> {
        let unwrap = |d: f32| {
            if d > 100.0 {
                d - 200.0
            } else if d < -100.0 {
                d + 200.0
            } else {
                d
            }
        };
        states
            .windows(2)
            .map(|pair| {
                let d = pair[1].position - pair[0].position;
                Vec2::new(unwrap(d.x), unwrap(d.y))
            })
            .collect()
    }

    async fn next_states(rx: &mut mpsc::Receiver<FireflyState>, n: usize) -> Vec<FireflyState> {
        let mut states = Vec::with_capacity(n);
        while states.len() < n {
            let state = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("firefly keeps emitting")
                .expect("channel open");
            states.push(state);
        }
        states
    }

    fn assert_straight_line(states: &[FireflyState]) {
        let steps = steps(states);
        for step in &steps[1..] {
            assert!(
                step.distance(steps[0]) < 1e-3,
                "velocity changed without any force: {step:?} vs {:?}",
                steps[0]
            );
        }
    }

    #[test]
    fn emit_never_blocks_on_a_full_buffer() {
        let (tx, _rx) = mpsc::channel(2);
        let (emitter, _retired) = emitter(tx, Arc::default());
        let state = FireflyState {
            id: FireflyId(9),
            position: Vec2::ZERO,
            brightness: 1.0,
            alive: true,
        };
        assert!(emitter.emit(state));
        assert!(emitter.emit(state));
        let mut last = emitter.dropped();
        for _ in 0..5 {
            assert!(!emitter.emit(state));
            let now = emitter.dropped();
            assert!(now > last);
            last = now;
        }
        assert_eq!(emitter.dropped(), 5);
        assert!(emitter.retire(FireflyId(9)));
    }

    #[tokio::test]
    async fn task_emits_final_dead_state_on_expiry() {
        let (tx, mut rx) = mpsc::channel(64);
        let (emitter, mut retired) = emitter(tx, Arc::default());
        let trigger = ShutdownTrigger::new();
        // 0.3s of life at dt 0.1 expires within a handful of ticks.
        let handle = tokio::spawn(task(0.3, emitter).run(trigger.subscribe()));
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("task finishes on its own")
            .expect("task does not panic");

        let mut last = None;
        while let Ok(state) = rx.try_recv() {
            last = Some(state);
        }
        let last = last.expect("at least one emission");
        assert!(!last.alive);
        assert_eq!(last.id, FireflyId(1));
        assert_eq!(retired.try_recv().ok(), Some(FireflyId(1)));
    }

    #[tokio::test]
    async fn shutdown_stops_a_long_lived_task() {
        let (tx, mut rx) = mpsc::channel(4096);
        let (emitter, mut retired) = emitter(tx, Arc::default());
        let trigger = ShutdownTrigger::new();
        let handle = tokio::spawn(task(1_000.0, emitter).run(trigger.subscribe()));
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("task observes shutdown")
            .expect("task does not panic");

        let mut last = None;
        while let Ok(state) = rx.try_recv() {
            last = Some(state);
        }
        assert!(!last.expect("final state emitted").alive);
        assert_eq!(retired.try_recv().ok(), Some(FireflyId(1)));
    }

    #[tokio::test]
    async fn running_firefly_follows_attraction_changes() {
        let settings = FireflySettings {
            // Pull far above the speed cap keeps the path radial.
            speed: 5.0,
            attraction_force: 50.0,
            wander_probability: 0.0,
            lifespan_min: 1_000.0,
            lifespan_max: 1_000.0,
            ..FireflySettings::default()
        };
        let (tx, mut rx) = mpsc::channel(4096);
        let (emitter, _retired) = emitter(tx, Arc::default());
        let task = task_with(settings, emitter);
        let attraction = Arc::clone(&task.attraction);
        let trigger = ShutdownTrigger::new();
        let handle = tokio::spawn(task.run(trigger.subscribe()));

        // No attraction yet: nothing bends the initial heading.
        assert_straight_line(&next_states(&mut rx, 8).await);

        let target = Vec2::new(130.0, 130.0);
        *attraction.write() = Some(target);
        let reached = tokio::time::timeout(Duration::from_secs(2), async {
            while let Some(state) = rx.recv().await {
                if state.position.distance(target) < 15.0 {
                    return true;
                }
            }
            false
        })
        .await;
        assert_eq!(reached, Ok(true), "firefly never approached the new point");

        *attraction.write() = None;
        while rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(20)).await;
        while rx.try_recv().is_ok() {}
        assert_straight_line(&next_states(&mut rx, 8).await);

        trigger.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("task observes shutdown")
            .expect("task does not panic");
    }

    #[tokio::test]
    async fn stalled_consumer_does_not_stall_the_task() {
        let (tx, _rx) = mpsc::channel(1);
        let dropped = Arc::new(AtomicU64::new(0));
        let (emitter, mut retired) = emitter(tx, Arc::clone(&dropped));
        let trigger = ShutdownTrigger::new();
        // Roughly 200 ticks at 2ms, all but the first emission dropped.
        let handle = tokio::spawn(task(20.0, emitter).run(trigger.subscribe()));

        let mut samples = Vec::new();
        let sampling = tokio::time::timeout(Duration::from_secs(3), async {
            while !handle.is_finished() {
                samples.push(dropped.load(Ordering::Relaxed));
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await;
        assert!(sampling.is_ok(), "task expires even though nobody reads");
        handle.await.expect("task does not panic");
        samples.push(dropped.load(Ordering::Relaxed));

        assert!(samples.len() >= 3, "too few samples: {samples:?}");
        assert!(samples.windows(2).all(|w| w[0] <= w[1]), "{samples:?}");
        assert!(samples.last() > samples.first(), "{samples:?}");
        assert!(dropped.load(Ordering::Relaxed) >= 150);
        assert_eq!(retired.try_recv().ok(), Some(FireflyId(1)));
    }
}
