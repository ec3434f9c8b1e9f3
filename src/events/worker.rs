// Event worker -- applies launcher events from a single channel.
//
// One thread owns the receiving end and applies events in arrival order.
// When the channel stays quiet for the idle interval the worker runs a
// reconciliation pass. Handler panics are caught so the thread never dies.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::error::{LauncherError, Result};
use crate::Launcher;
use super::{dispatch, EventOutcome, LauncherEvent};

struct Request {
    event: LauncherEvent,
    reply: Option<Sender<Result<EventOutcome>>>,
}

enum Message {
    Event(Request),
    Shutdown,
}

/// Cloneable handle for posting events to a running worker.
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<Message>,
}

impl EventSender {
    /// Post an event without waiting for it to be applied.
    pub fn send(&self, event: LauncherEvent) -> Result<()> {
        self.tx
            .send(Message::Event(Request { event, reply: None }))
            .map_err(|_| LauncherError::StoreUnavailable("event worker stopped".to_string()))
    }

    /// Post an event and block until the worker has applied it.
    pub fn call(&self, event: LauncherEvent) -> Result<EventOutcome> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(Message::Event(Request { event, reply: Some(reply_tx) }))
            .map_err(|_| LauncherError::StoreUnavailable("event worker stopped".to_string()))?;
        reply_rx
            .recv()
            .map_err(|_| LauncherError::StoreUnavailable("event worker dropped the request".to_string()))?
    }
}

pub struct EventWorker {
    sender: EventSender,
    cancel: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl EventWorker {
    /// Spawn the worker thread. With `idle_interval` set, a reconciliation
    /// runs whenever no event arrived for that long.
    pub fn spawn(launcher: Arc<Launcher>, idle_interval: Option<Duration>) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let cancel = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancel);

        let handle = std::thread::Builder::new()
            .name("launcher-events".into())
            .spawn(move || worker_loop(launcher, rx, flag, idle_interval))?;

        Ok(Self {
            sender: EventSender { tx },
            cancel,
            handle: Some(handle),
        })
    }

    pub fn sender(&self) -> EventSender {
        self.sender.clone()
    }

    pub fn send(&self, event: LauncherEvent) -> Result<()> {
        self.sender.send(event)
    }

    pub fn call(&self, event: LauncherEvent) -> Result<EventOutcome> {
        self.sender.call(event)
    }

    /// Stop the worker. Events already queued are applied first; an
    /// in-flight reconciliation is cancelled.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.cancel.store(true, Ordering::SeqCst);
        // Send fails only if the thread is already gone
        let _ = self.sender.tx.send(Message::Shutdown);
        if handle.join().is_err() {
            log::error!("Event worker: thread panicked during shutdown");
        }
    }
}

impl Drop for EventWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn worker_loop(
    launcher: Arc<Launcher>,
    rx: Receiver<Message>,
    cancel: Arc<AtomicBool>,
    idle_interval: Option<Duration>,
) {
    log::debug!("Event worker started");
    loop {
        let message = match idle_interval {
            Some(interval) => match rx.recv_timeout(interval) {
                Ok(m) => m,
                Err(RecvTimeoutError::Timeout) => Message::Event(Request {
                    event: LauncherEvent::Reconcile,
                    reply: None,
                }),
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match rx.recv() {
                Ok(m) => m,
                Err(_) => break,
            },
        };

        let request = match message {
            Message::Event(request) => request,
            Message::Shutdown => break,
        };

        let name = request.event.name();
        let result = catch_unwind(AssertUnwindSafe(|| dispatch(&launcher, request.event, &cancel)));
        let result = match result {
            Ok(r) => r,
            Err(_) => {
                log::error!("Event worker: {} panicked (recovered)", name);
                Err(LauncherError::Other(format!("{} handler panicked", name)))
            }
        };

        match &result {
            Ok(_) => {}
            Err(LauncherError::Cancelled) => log::debug!("Event worker: {} cancelled", name),
            Err(e) => log::error!("Event worker: {} failed: {}", name, e),
        }

        if let Some(reply) = request.reply {
            // Caller may have given up waiting
            let _ = reply.send(result);
        }
    }
    log::debug!("Event worker stopped");
}
