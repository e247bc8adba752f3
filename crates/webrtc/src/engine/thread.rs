//! Engine-owned threads
//!
//! Some native registrations may only be touched from the thread that owns
//! them. Work for those threads is expressed as a posted task, never as a
//! direct call from another thread's callback.

use super::EngineError;
use crossbeam::channel::{self, Sender};
use std::fmt;
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, warn};

/// Unit of work posted to an engine thread
pub type EngineTask = Box<dyn FnOnce() + Send>;

/// A thread owned by the engine that accepts posted tasks
pub trait EngineThread: Send + Sync {
    /// Thread name for logging
    fn name(&self) -> &str;

    /// Queue `task`; tasks run in posting order
    fn post(&self, task: EngineTask) -> Result<(), EngineError>;

    /// Whether the caller is running on this thread
    fn is_current(&self) -> bool;
}

/// Run `f` on `thread` and wait for its result
///
/// Runs inline when already on `thread`.
pub fn invoke<F, R>(thread: &dyn EngineThread, f: F) -> Result<R, EngineError>
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if thread.is_current() {
        return Ok(f());
    }

    let (reply_tx, reply_rx) = channel::bounded(1);
    thread.post(Box::new(move || {
        let _ = reply_tx.send(f());
    }))?;
    reply_rx
        .recv()
        .map_err(|_| EngineError::ThreadStopped(thread.name().to_string()))
}

enum WorkerMessage {
    Run(EngineTask),
    Shutdown,
}

/// A dedicated thread running posted tasks in order
///
/// Dropping the worker runs the tasks already posted, then joins.
pub struct WorkerThread {
    name: String,
    sender: Sender<WorkerMessage>,
    thread_id: ThreadId,
    join: Option<JoinHandle<()>>,
}

impl WorkerThread {
    /// Start a worker thread called `name`
    pub fn spawn(name: impl Into<String>) -> std::io::Result<Self> {
        let name = name.into();
        let (sender, receiver) = channel::unbounded::<WorkerMessage>();

        let join = thread::Builder::new().name(name.clone()).spawn(move || {
            for message in receiver.iter() {
                match message {
                    WorkerMessage::Run(task) => task(),
                    WorkerMessage::Shutdown => break,
                }
            }
        })?;
        debug!(thread = %name, "engine worker started");

        Ok(Self {
            name,
            sender,
            thread_id: join.thread().id(),
            join: Some(join),
        })
    }
}

impl EngineThread for WorkerThread {
    fn name(&self) -> &str {
        &self.name
    }

    fn post(&self, task: EngineTask) -> Result<(), EngineError> {
        self.sender
            .send(WorkerMessage::Run(task))
            .map_err(|_| EngineError::ThreadStopped(self.name.clone()))
    }

    fn is_current(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

impl Drop for WorkerThread {
    fn drop(&mut self) {
        let _ = self.sender.send(WorkerMessage::Shutdown);
        if self.is_current() {
            return;
        }
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!(thread = %self.name, "engine worker panicked");
            }
        }
    }
}

impl fmt::Debug for WorkerThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerThread")
            .field("name", &self.name)
            .field("thread_id", &self.thread_id)
            .finish()
    }
}
