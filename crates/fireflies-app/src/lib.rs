//! Concurrent runtime for the firefly garden.
//!
//! Every firefly runs as its own tokio task and reports into a single
//! aggregator; a worker pool handles offline analysis and a command bus
//! carries requests from whatever drives the garden.

pub mod agent;
pub mod aggregator;
pub mod command;
pub mod manager;
pub mod pool;
pub mod shutdown;
pub mod wind;

pub use agent::{AttractionCell, FireflyTask, StateEmitter};
pub use aggregator::StateAggregator;
pub use command::{
    CommandReceiver, CommandSender, CommandSubmit, GardenCommand, create_command_bus,
    make_command_submit,
};
pub use manager::{GardenManager, ManagerError, ManagerState};
pub use pool::{Job, JobOutcome, JobResult, PoolError, ResultReceiver, WorkerPool};
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use wind::{SharedWind, run_wind};
