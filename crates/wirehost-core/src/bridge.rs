//! Execution bridge to the surface-owner thread.
//!
//! The rendering surface may only be touched from the thread that created
//! it. [`OwnerBridge::spawn`] starts that thread, builds the surface on it
//! through a factory, and then serves a queue of work items. Handlers call
//! [`OwnerBridge::run`] from async context: the work is queued, the owner
//! runs it against the surface, and the result comes back over a oneshot
//! channel.
//!
//! The owner always answers. A panicking work item is caught on the owner
//! thread and reported as [`BridgeError::WorkPanicked`]; the thread keeps
//! serving the queue. If the owner thread has exited, callers get
//! [`BridgeError::OwnerGone`] instead of waiting forever.
//!
//! Work items are processed strictly in order, one at a time. A work item
//! must not call back into the bridge.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::driver::Surface;

const OWNER_THREAD_NAME: &str = "surface-owner";

/// A unit of work executed on the owner thread.
type Work = Box<dyn FnOnce(&mut dyn Surface) + Send>;

/// Errors from a bridged call.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The owner thread has exited and can no longer run work.
    #[error("surface owner thread is gone")]
    OwnerGone,

    /// The work item panicked on the owner thread.
    #[error("work panicked on the surface owner thread: {0}")]
    WorkPanicked(String),

    /// The owner thread could not be started.
    #[error("failed to start surface owner thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Handle for scheduling work on the owner thread. Cheap to clone.
#[derive(Clone)]
pub struct OwnerBridge {
    tx: mpsc::UnboundedSender<Work>,
}

/// Join handle for the owner thread.
///
/// The thread exits once every [`OwnerBridge`] clone has been dropped.
pub struct OwnerHandle {
    thread: JoinHandle<()>,
}

impl OwnerHandle {
    /// Waits for the owner thread to exit.
    pub fn join(self) -> Result<(), BridgeError> {
        self.thread
            .join()
            .map_err(|payload| BridgeError::WorkPanicked(panic_message(payload.as_ref())))
    }
}

impl OwnerBridge {
    /// Starts the owner thread and builds the surface on it.
    ///
    /// `factory` runs on the new thread, so the surface it returns never
    /// crosses threads.
    pub fn spawn<F, S>(factory: F) -> Result<(OwnerBridge, OwnerHandle), BridgeError>
    where
        F: FnOnce() -> S + Send + 'static,
        S: Surface + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Work>();
        let thread = thread::Builder::new()
            .name(OWNER_THREAD_NAME.to_string())
            .spawn(move || {
                let mut surface = factory();
                debug!("Surface owner thread started");
                while let Some(work) = rx.blocking_recv() {
                    work(&mut surface);
                }
                debug!("Surface owner thread exiting");
            })?;
        Ok((OwnerBridge { tx }, OwnerHandle { thread }))
    }

    /// Runs `work` on the owner thread and waits for its result.
    pub async fn run<R, F>(&self, work: F) -> Result<R, BridgeError>
    where
        F: FnOnce(&mut dyn Surface) -> R + Send + 'static,
        R: Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        let job: Work = Box::new(move |surface| {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(surface)))
                .map_err(|payload| panic_message(payload.as_ref()));
            // The caller may have stopped waiting; nothing to do then.
            let _ = done_tx.send(outcome);
        });

        self.tx.send(job).map_err(|_| BridgeError::OwnerGone)?;

        match done_rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => {
                warn!(panic = %message, "Bridged work panicked");
                Err(BridgeError::WorkPanicked(message))
            }
            Err(_) => Err(BridgeError::OwnerGone),
        }
    }

    /// Whether the owner thread is still accepting work.
    pub fn is_alive(&self) -> bool {
        !self.tx.is_closed()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
