use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::StreamError;

pub mod events;
pub mod rtm;

pub use events::Event;

/// Lazy, infinite sequence of message events fed by a background task.
/// The task's outcome tells the consumer why the sequence ended.
pub struct EventStream {
    pub events: mpsc::Receiver<Event>,
    pub task: JoinHandle<Result<(), StreamError>>,
}
