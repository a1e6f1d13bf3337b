//! Background flushing. The worker owns the backend; the event thread only
//! asks for flushes and never waits on disk.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use worldkeep_persist::{Backend, FlushReport, StoreError, WorldStore};

use crate::error::SessionError;

enum Command {
    Flush,
    Shutdown,
}

type WorkerResult = Result<(FlushReport, Box<dyn Backend>), StoreError>;

/// A thread that writes dirty units of a shared store to its backend.
pub struct FlushWorker {
    sender: Option<Sender<Command>>,
    handle: Option<JoinHandle<WorkerResult>>,
}

impl FlushWorker {
    pub fn spawn(store: Arc<WorldStore>, backend: Box<dyn Backend>) -> Self {
        let (sender, receiver) = mpsc::channel();
        let handle = thread::spawn(move || Self::run(store, backend, receiver));
        Self {
            sender: Some(sender),
            handle: Some(handle),
        }
    }

    fn run(
        store: Arc<WorldStore>,
        mut backend: Box<dyn Backend>,
        receiver: Receiver<Command>,
    ) -> WorkerResult {
        let mut total = FlushReport::default();
        loop {
            // A closed channel means the owner went away; flush and stop.
            let command = receiver.recv().unwrap_or(Command::Shutdown);
            // Collapse a backlog of requests into one pass.
            let mut shutdown = matches!(command, Command::Shutdown);
            while let Ok(next) = receiver.try_recv() {
                shutdown |= matches!(next, Command::Shutdown);
            }
            total.absorb(store.flush(backend.as_mut())?);
            if shutdown {
                return Ok((total, backend));
            }
        }
    }

    /// Queue a flush. Returns without waiting for it.
    pub fn request(&self) -> Result<(), SessionError> {
        self.sender
            .as_ref()
            .ok_or(SessionError::WorkerGone)?
            .send(Command::Flush)
            .map_err(|_| SessionError::WorkerGone)
    }

    /// Run a final flush, stop the thread and hand back the backend.
    pub fn shutdown(mut self) -> Result<(FlushReport, Box<dyn Backend>), SessionError> {
        self.stop()
    }

    fn stop(&mut self) -> Result<(FlushReport, Box<dyn Backend>), SessionError> {
        if let Some(sender) = self.sender.take() {
            // The worker may already have exited on an error; join reports it.
            let _ = sender.send(Command::Shutdown);
        }
        let handle = self.handle.take().ok_or(SessionError::WorkerGone)?;
        let result = handle.join().map_err(|_| SessionError::WorkerGone)?;
        Ok(result?)
    }
}

impl Drop for FlushWorker {
    fn drop(&mut self) {
        if self.handle.is_none() {
            return;
        }
        if let Err(e) = self.stop() {
            tracing::warn!(error = %e, "flush worker stopped with an error");
        }
    }
}
