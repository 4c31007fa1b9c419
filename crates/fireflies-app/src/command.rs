use crossfire::mpmc;
use crossfire::{MAsyncRx, MAsyncTx, TrySendError, detect_backoff_cfg};
use fireflies_core::Vec2;
use std::sync::Arc;
use tracing::warn;

/// Requests an external controller may make of a running garden.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GardenCommand {
    SpawnAt(Vec2),
    SetAttraction(Vec2),
    ClearAttraction,
    CycleWind,
}

pub type CommandSender = MAsyncTx<GardenCommand>;
pub type CommandReceiver = MAsyncRx<GardenCommand>;
pub type CommandSubmit = Arc<dyn Fn(GardenCommand) -> bool + Send + Sync>;

pub fn create_command_bus(capacity: usize) -> (CommandSender, CommandReceiver) {
    detect_backoff_cfg();
    mpmc::bounded_async(capacity.max(1))
}

/// Non-blocking enqueue; full or closed queues drop the command with a warning.
pub fn submit_command(sender: &CommandSender, command: GardenCommand) -> bool {
    match sender.try_send(command) {
        Ok(()) => true,
        Err(TrySendError::Full(cmd)) => {
            warn!(?cmd, "garden command queue full; dropping command");
            false
        }
        Err(TrySendError::Disconnected(cmd)) => {
            warn!(?cmd, "garden command queue disconnected");
            false
        }
    }
}

pub fn make_command_submit(sender: CommandSender) -> CommandSubmit {
    let sender = Arc::new(sender);
    Arc::new(move |command: GardenCommand| submit_command(&sender, command))
}
