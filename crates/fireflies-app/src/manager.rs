//! Orchestrator owning every task, lock and channel of a running garden.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use fireflies_core::{
    ConfigError, Firefly, FireflyId, FireflyState, GardenConfig, Lantern, SwarmSummary, Vec2,
    WindDirection, wrap_toroidal,
};
use parking_lot::{Mutex, RwLock};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::agent::{AttractionCell, FireflyTask};
use crate::aggregator::StateAggregator;
use crate::command::{
    CommandReceiver, CommandSender, CommandSubmit, GardenCommand, create_command_bus,
    make_command_submit, submit_command,
};
use crate::pool::{Job, PoolError, ResultReceiver, WorkerPool};
use crate::shutdown::{Shutdown, ShutdownTrigger};
use crate::wind::{SharedWind, run_wind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ManagerState {
    Created,
    Running,
    Stopped,
}

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("garden is already running")]
    AlreadyRunning,
    #[error("garden has been stopped and cannot be restarted")]
    AlreadyStopped,
    #[error("no tokio runtime is available on this thread")]
    NoRuntime,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Id allocation plus the join handle of every firefly task still tracked.
struct Registry {
    next_id: FireflyId,
    fireflies: HashMap<FireflyId, JoinHandle<()>>,
    accepting: bool,
    spawned_total: u64,
}

impl Registry {
    fn allocate(&mut self) -> FireflyId {
        let id = self.next_id;
        self.next_id = id.next();
        id
    }

    /// Forget tasks that have already exited so the cap counts live fireflies.
    fn prune(&mut self) {
        self.fireflies.retain(|_, handle| !handle.is_finished());
    }

    fn live(&self) -> usize {
        self.fireflies
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }
}

struct ManagerInner {
    config: GardenConfig,
    bounds: Vec2,
    lifecycle: Mutex<ManagerState>,
    stop_gate: tokio::sync::Mutex<()>,
    registry: RwLock<Registry>,
    lanterns: RwLock<Vec<Lantern>>,
    attraction: AttractionCell,
    wind: SharedWind,
    aggregator: StateAggregator,
    pool: WorkerPool<SwarmSummary>,
    commands_tx: Mutex<Option<CommandSender>>,
    commands_rx: Mutex<Option<CommandReceiver>>,
    trigger: ShutdownTrigger,
    services: Mutex<Vec<JoinHandle<()>>>,
    runtime: OnceLock<Handle>,
    rng: Mutex<SmallRng>,
    next_job: AtomicU64,
}

/// Cloneable handle on a firefly garden.
///
/// Lifecycle is `Created → Running → Stopped`. The registry, the lantern list
/// and the attraction cell each have their own lock and no operation holds
/// two of them at once.
#[derive(Clone)]
pub struct GardenManager {
    inner: Arc<ManagerInner>,
}

impl GardenManager {
    pub fn new(config: GardenConfig) -> Result<Self, ManagerError> {
        config.validate()?;
        let (commands_tx, commands_rx) = create_command_bus(config.channels.command_buffer);
        let inner = ManagerInner {
            bounds: Vec2::new(config.world.width, config.world.height),
            lifecycle: Mutex::new(ManagerState::Created),
            stop_gate: tokio::sync::Mutex::new(()),
            registry: RwLock::new(Registry {
                next_id: FireflyId(1),
                fireflies: HashMap::new(),
                accepting: false,
                spawned_total: 0,
            }),
            lanterns: RwLock::new(Vec::with_capacity(config.lantern.max)),
            attraction: AttractionCell::default(),
            wind: SharedWind::new(config.wind.strength),
            aggregator: StateAggregator::new(config.channels.state_buffer),
            pool: WorkerPool::new(
                config.pool.workers,
                config.pool.job_buffer,
                config.pool.result_buffer,
            ),
            commands_tx: Mutex::new(Some(commands_tx)),
            commands_rx: Mutex::new(Some(commands_rx)),
            trigger: ShutdownTrigger::new(),
            services: Mutex::new(Vec::new()),
            runtime: OnceLock::new(),
            rng: Mutex::new(config.seeded_rng()),
            next_job: AtomicU64::new(1),
            config,
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    pub fn config(&self) -> &GardenConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ManagerState {
        *self.inner.lifecycle.lock()
    }

    /// Launch the aggregator, wind, worker pool, command loop, optional
    /// auto-spawner and the initial population on the current runtime.
    pub fn start(&self) -> Result<(), ManagerError> {
        let runtime = Handle::try_current().map_err(|_| ManagerError::NoRuntime)?;
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            match *lifecycle {
                ManagerState::Running => return Err(ManagerError::AlreadyRunning),
                ManagerState::Stopped => return Err(ManagerError::AlreadyStopped),
                ManagerState::Created => *lifecycle = ManagerState::Running,
            }
        }
        let inner = &self.inner;
        let _ = inner.runtime.set(runtime.clone());

        inner.aggregator.start();
        inner.pool.start();
        inner.registry.write().accepting = true;

        let wind_rng = inner.fork_rng();
        let mut services = inner.services.lock();
        services.push(runtime.spawn(run_wind(
            inner.wind.clone(),
            inner.config.wind_interval(),
            inner.trigger.subscribe(),
            wind_rng,
        )));
        if let Some(commands) = inner.commands_rx.lock().take() {
            services.push(runtime.spawn(run_commands(
                Arc::downgrade(inner),
                commands,
                inner.trigger.subscribe(),
            )));
        }
        if inner.config.population.auto_spawn {
            let spawner_rng = inner.fork_rng();
            services.push(runtime.spawn(run_auto_spawner(
                Arc::downgrade(inner),
                inner.trigger.subscribe(),
                spawner_rng,
            )));
        }
        drop(services);

        let initial = inner.random_positions(inner.config.population.initial);
        let spawned = inner.spawn_batch(initial).len();
        info!(
            initial = spawned,
            max = inner.config.population.max,
            target = inner.config.population.target,
            "garden started"
        );
        Ok(())
    }

    /// Cancel every task, wait for all of them, then close the aggregator,
    /// the worker pool and the command queue. Idempotent.
    pub async fn stop(&self) {
        let inner = &self.inner;
        let _gate = inner.stop_gate.lock().await;
        {
            let mut lifecycle = inner.lifecycle.lock();
            if *lifecycle == ManagerState::Stopped {
                return;
            }
            *lifecycle = ManagerState::Stopped;
        }

        inner.trigger.trigger();
        let fireflies: Vec<JoinHandle<()>> = {
            let mut registry = inner.registry.write();
            registry.accepting = false;
            registry.fireflies.drain().map(|(_, handle)| handle).collect()
        };
        // Lantern bursts may still be registering while older services drain.
        loop {
            let batch: Vec<JoinHandle<()>> = inner.services.lock().drain(..).collect();
            if batch.is_empty() {
                break;
            }
            for handle in batch {
                if let Err(err) = handle.await {
                    warn!(error = %err, "garden service task failed");
                }
            }
        }
        let firefly_count = fireflies.len();
        for handle in fireflies {
            if let Err(err) = handle.await {
                warn!(error = %err, "firefly task failed");
            }
        }

        inner.aggregator.stop().await;
        inner.pool.shutdown().await;
        inner.commands_tx.lock().take();
        inner.commands_rx.lock().take();
        info!(
            joined = firefly_count,
            spawned_total = self.spawned_total(),
            dropped_states = self.dropped_states(),
            "garden stopped"
        );
    }

    /// Spawn one firefly at `point`. `None` when not running or at the cap.
    pub fn spawn_at(&self, point: Vec2) -> Option<FireflyId> {
        self.inner.spawn_batch(vec![point]).first().copied()
    }

    /// Spawn up to `count` fireflies jittered around `point`; returns how many
    /// were actually spawned.
    pub fn spawn_burst(&self, point: Vec2, count: usize) -> usize {
        self.inner.spawn_burst(point, count)
    }

    /// Non-blocking; `false` when the queue is full or closed.
    pub fn enqueue(&self, command: GardenCommand) -> bool {
        match self.inner.commands_tx.lock().as_ref() {
            Some(sender) => submit_command(sender, command),
            None => false,
        }
    }

    /// Detached submit callback for callers that should not hold the manager.
    pub fn command_submitter(&self) -> Option<CommandSubmit> {
        self.inner
            .commands_tx
            .lock()
            .clone()
            .map(make_command_submit)
    }

    pub fn set_attraction(&self, point: Vec2) {
        self.inner.set_attraction(Some(point));
    }

    pub fn clear_attraction(&self) {
        self.inner.set_attraction(None);
    }

    pub fn attraction_point(&self) -> Option<Vec2> {
        *self.inner.attraction.read()
    }

    /// Place a lantern; on success a burst is spawned around it in the
    /// background. `false` at the lantern cap.
    pub fn add_lantern(&self, point: Vec2) -> bool {
        let inner = &self.inner;
        {
            let mut lanterns = inner.lanterns.write();
            if lanterns.len() >= inner.config.lantern.max {
                return false;
            }
            lanterns.push(Lantern::new(point, inner.config.lantern.radius));
        }

        let Some(runtime) = inner.runtime.get() else {
            return true;
        };
        let mut services = inner.services.lock();
        if inner.trigger.is_triggered() {
            return true;
        }
        services.retain(|handle| !handle.is_finished());
        let weak = Arc::downgrade(inner);
        let count = inner.config.population.burst_size;
        services.push(runtime.spawn(async move {
            if let Some(inner) = weak.upgrade() {
                let spawned = inner.spawn_burst(point, count);
                debug!(spawned, x = point.x, y = point.y, "lantern burst");
            }
        }));
        true
    }

    /// Remove the most recently placed lantern.
    pub fn remove_last_lantern(&self) -> bool {
        self.inner.lanterns.write().pop().is_some()
    }

    /// Advance every lantern's pulse.
    pub fn update_lanterns(&self, dt: f32) {
        for lantern in self.inner.lanterns.write().iter_mut() {
            lantern.update(dt);
        }
    }

    pub fn lanterns(&self) -> Vec<Lantern> {
        self.inner.lanterns.read().clone()
    }

    pub fn snapshot(&self) -> Vec<FireflyState> {
        self.inner.aggregator.snapshot()
    }

    /// Fireflies present in the aggregated state map.
    pub fn count(&self) -> usize {
        self.inner.aggregator.count()
    }

    /// Firefly tasks currently alive in the registry.
    pub fn population(&self) -> usize {
        self.inner.registry.read().live()
    }

    pub fn spawned_total(&self) -> u64 {
        self.inner.registry.read().spawned_total
    }

    pub fn wind_direction(&self) -> WindDirection {
        self.inner.wind.direction()
    }

    pub fn wind_direction_name(&self) -> &'static str {
        self.inner.wind.direction_name()
    }

    pub fn wind_force(&self) -> Vec2 {
        self.inner.wind.force()
    }

    pub fn dropped_states(&self) -> u64 {
        self.inner.aggregator.dropped_states()
    }

    /// Queue a swarm summary of the current snapshot on the worker pool.
    pub fn submit_analysis(&self) -> bool {
        let states = self.snapshot();
        let id = self.inner.next_job.fetch_add(1, Ordering::Relaxed);
        self.inner
            .pool
            .submit(Job::new(id, move || SwarmSummary::from_states(&states)))
    }

    pub fn analysis_results(&self) -> ResultReceiver<SwarmSummary> {
        self.inner.pool.results()
    }

    pub async fn wait_for_analysis(&self) -> Result<(), PoolError> {
        self.inner.pool.wait_for_completion().await
    }

    pub fn dropped_results(&self) -> u64 {
        self.inner.pool.dropped_results()
    }
}

impl ManagerInner {
    fn fork_rng(&self) -> SmallRng {
        SmallRng::seed_from_u64(self.rng.lock().random())
    }

    fn random_positions(&self, count: usize) -> Vec<Vec2> {
        let mut rng = self.rng.lock();
        (0..count)
            .map(|_| Vec2::random_in(&mut *rng, self.bounds.x, self.bounds.y))
            .collect()
    }

    fn spawn_burst(&self, point: Vec2, count: usize) -> usize {
        let jitter = self.config.population.burst_jitter;
        let positions: Vec<Vec2> = {
            let mut rng = self.rng.lock();
            (0..count).map(|_| point.jitter(&mut *rng, jitter)).collect()
        };
        self.spawn_batch(positions).len()
    }

    /// Register and launch one firefly per position, stopping at the cap.
    ///
    /// Cap check, id allocation and task launch share one registry write
    /// lock, so concurrent batches cannot overshoot the population cap.
    fn spawn_batch(&self, positions: Vec<Vec2>) -> Vec<FireflyId> {
        if positions.is_empty() {
            return Vec::new();
        }
        let Some(runtime) = self.runtime.get() else {
            return Vec::new();
        };
        let Some(emitter) = self.aggregator.emitter() else {
            return Vec::new();
        };
        let lanterns = self.lanterns.read().clone();
        let seeds: Vec<u64> = {
            let mut rng = self.rng.lock();
            positions.iter().map(|_| rng.random()).collect()
        };

        let mut registry = self.registry.write();
        if !registry.accepting {
            return Vec::new();
        }
        registry.prune();
        let room = self
            .config
            .population
            .max
            .saturating_sub(registry.fireflies.len());

        let mut spawned = Vec::with_capacity(room.min(positions.len()));
        for (position, seed) in positions.into_iter().zip(seeds).take(room) {
            let id = registry.allocate();
            let mut rng = SmallRng::seed_from_u64(seed);
            let position = wrap_toroidal(position, self.bounds.x, self.bounds.y);
            let firefly = Firefly::spawn(id, position, &self.config.firefly, self.bounds, &mut rng);
            let task = FireflyTask {
                firefly,
                emitter: emitter.clone(),
                lanterns: lanterns.clone(),
                wind: Some(self.wind.clone()),
                attraction: Arc::clone(&self.attraction),
                tick: self.config.tick_interval(),
                dt: self.config.dt(),
                rng,
            };
            let handle = runtime.spawn(task.run(self.trigger.subscribe()));
            registry.fireflies.insert(id, handle);
            registry.spawned_total += 1;
            spawned.push(id);
        }
        spawned
    }

    fn set_attraction(&self, point: Option<Vec2>) {
        *self.attraction.write() = point;
    }

    fn apply(&self, command: GardenCommand) {
        debug!(?command, "applying garden command");
        match command {
            GardenCommand::SpawnAt(point) => {
                self.spawn_batch(vec![point]);
            }
            GardenCommand::SetAttraction(point) => self.set_attraction(Some(point)),
            GardenCommand::ClearAttraction => self.set_attraction(None),
            GardenCommand::CycleWind => {
                let direction = self.wind.cycle();
                debug!(direction = direction.name(), "wind cycled");
            }
        }
    }

    /// Deficit-driven spawn decision for one auto-spawner tick.
    fn auto_spawn(&self, rng: &mut SmallRng) -> usize {
        let population = &self.config.population;
        let live = self.registry.read().live();
        let count = if live < population.target {
            let deficit = population.target - live;
            let mut count = population.burst_size.min(deficit);
            if deficit > population.burst_size * 2 {
                count += 1;
            }
            count
        } else if rng.random_bool(population.idle_spawn_probability) {
            1
        } else {
            0
        };
        if count == 0 {
            return 0;
        }
        let positions = (0..count)
            .map(|_| Vec2::random_in(&mut *rng, self.bounds.x, self.bounds.y))
            .collect();
        self.spawn_batch(positions).len()
    }
}

async fn run_commands(
    inner: Weak<ManagerInner>,
    commands: CommandReceiver,
    mut shutdown: Shutdown,
) {
    loop {
        let command = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            received = commands.recv() => match received {
                Ok(command) => command,
                Err(_) => break,
            },
        };
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.apply(command);
    }
}

async fn run_auto_spawner(inner: Weak<ManagerInner>, mut shutdown: Shutdown, mut rng: SmallRng) {
    let Some(period) = inner.upgrade().map(|inner| inner.config.auto_spawn_interval()) else {
        return;
    };
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let Some(inner) = inner.upgrade() else {
                    break;
                };
                let spawned = inner.auto_spawn(&mut rng);
                if spawned > 0 {
                    let population = inner.registry.read().live();
                    debug!(spawned, population, "auto-spawned fireflies");
                }
            }
        }
    }
}
