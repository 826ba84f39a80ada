//! Background task plumbing for long operations.
//!
//! Installs and scans can take minutes on large archives. A task runs on its
//! own thread, reports completion over a channel, and observes a shared
//! cancellation flag at its own safe points.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Cooperative cancellation flag handed into the task body.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct TaskHandle<T> {
    token: CancelToken,
    receiver: Receiver<T>,
    thread: Option<JoinHandle<()>>,
}

/// Run `body` on a worker thread. The body receives the cancel token and
/// should check it between units of work.
pub fn submit<T, F>(body: F) -> TaskHandle<T>
where
    T: Send + 'static,
    F: FnOnce(CancelToken) -> T + Send + 'static,
{
    let token = CancelToken::default();
    let worker_token = token.clone();
    let (sender, receiver) = mpsc::channel();
    let thread = std::thread::spawn(move || {
        let result = body(worker_token);
        // The handle may have been dropped without waiting.
        let _ = sender.send(result);
    });
    TaskHandle { token, receiver, thread: Some(thread) }
}

impl<T> TaskHandle<T> {
    /// Request cancellation. The task decides when to honor it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Block until the task finishes and return its result. `None` when the
    /// worker panicked.
    pub fn wait(mut self) -> Option<T> {
        let result = self.receiver.recv().ok();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        result
    }

    /// Non-blocking poll for completion.
    pub fn try_recv(&self) -> Option<T> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }
}
