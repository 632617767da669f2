//! Serialized access for multi-threaded hosts
//!
//! The engine assumes one logical thread of control. A host whose hooks can
//! fire on several threads wraps the tracer in a [`SharedTracer`], which
//! routes every entry point through one `parking_lot` mutex.
//!
//! Drain requests can be delivered over a single-slot channel instead of a
//! host job queue: [`ChannelHost`] turns `schedule_drain` into a
//! non-blocking send on a `bounded(1)` channel, so at most one request is
//! ever outstanding and further requests coalesce into it.

use std::sync::{Arc, Weak};
use std::thread;

use crossbeam::channel::{self, Receiver, RecvError, Sender, TrySendError};
use parking_lot::{Mutex, MutexGuard};

use crate::error::Result;
use crate::host::{Host, HookKind, LiveRefresh};
use crate::object::{AllocationEvent, FreeEvent, ObjectId};
use crate::snapshot::Snapshot;
use crate::tracer::Tracer;

/// Single-slot drain request channel
pub fn drain_channel() -> (DrainSender, DrainReceiver) {
    let (tx, rx) = channel::bounded(1);
    (DrainSender { tx }, DrainReceiver { rx })
}

#[derive(Clone, Debug)]
pub struct DrainSender {
    tx: Sender<()>,
}

impl DrainSender {
    /// Post a drain request without blocking
    ///
    /// Returns false when a request is already waiting (the new one is
    /// coalesced into it) or nobody is listening.
    pub fn request(&self) -> bool {
        match self.tx.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) | Err(TrySendError::Disconnected(())) => false,
        }
    }

    /// Requests currently waiting (0 or 1)
    pub fn pending(&self) -> usize {
        self.tx.len()
    }
}

#[derive(Clone, Debug)]
pub struct DrainReceiver {
    rx: Receiver<()>,
}

impl DrainReceiver {
    /// Block until a request arrives or every sender is gone
    pub fn recv(&self) -> std::result::Result<(), RecvError> {
        self.rx.recv()
    }

    /// Consume a waiting request, if any
    pub fn try_recv(&self) -> bool {
        self.rx.try_recv().is_ok()
    }
}

/// Host adapter that posts drain requests to a [`drain_channel`]
#[derive(Debug)]
pub struct ChannelHost<H> {
    inner: H,
    drains: DrainSender,
}

impl<H: Host> ChannelHost<H> {
    pub fn new(inner: H, drains: DrainSender) -> Self {
        Self { inner, drains }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut H {
        &mut self.inner
    }
}

impl<H: Host> Host for ChannelHost<H> {
    fn current_epoch(&self) -> u64 {
        self.inner.current_epoch()
    }

    fn schedule_drain(&mut self) {
        if !self.drains.request() {
            log::trace!("drain request coalesced");
        }
    }

    fn set_hook(&mut self, hook: HookKind, enabled: bool) {
        self.inner.set_hook(hook, enabled)
    }

    fn survived_collection(&self, object: ObjectId) -> bool {
        self.inner.survived_collection(object)
    }

    fn refresh_live(&self, object: ObjectId) -> Option<LiveRefresh> {
        self.inner.refresh_live(object)
    }
}

/// A tracer behind a mutex, cloneable across threads
pub struct SharedTracer<H: Host> {
    inner: Arc<Mutex<Tracer<H>>>,
}

impl<H: Host> Clone for SharedTracer<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<H: Host> SharedTracer<H> {
    pub fn new(tracer: Tracer<H>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(tracer)),
        }
    }

    /// Exclusive access for anything not covered by the shortcuts below
    pub fn lock(&self) -> MutexGuard<'_, Tracer<H>> {
        self.inner.lock()
    }

    /// Run `f` with exclusive access
    pub fn with<R>(&self, f: impl FnOnce(&mut Tracer<H>) -> R) -> R {
        f(&mut self.inner.lock())
    }

    pub fn on_allocate(&self, event: AllocationEvent<'_>) {
        self.inner.lock().on_allocate(event)
    }

    pub fn on_free(&self, event: FreeEvent) {
        self.inner.lock().on_free(event)
    }

    pub fn run_deferred_drain(&self) -> usize {
        self.inner.lock().run_deferred_drain()
    }

    pub fn result(&self) -> Result<Snapshot> {
        self.inner.lock().result()
    }
}

impl<H: Host + Send + 'static> SharedTracer<H> {
    /// Serve drain requests on a background thread
    ///
    /// The thread only holds a weak reference: once every `SharedTracer`
    /// clone is dropped the tracer (and the sender its host owns) goes away,
    /// the channel disconnects and the thread returns the number of records
    /// it folded.
    pub fn spawn_drainer(&self, requests: DrainReceiver) -> thread::JoinHandle<usize> {
        let weak: Weak<Mutex<Tracer<H>>> = Arc::downgrade(&self.inner);
        thread::spawn(move || {
            let mut folded = 0;
            while requests.recv().is_ok() {
                let Some(tracer) = weak.upgrade() else {
                    break;
                };
                folded += tracer.lock().run_deferred_drain();
            }
            folded
        })
    }
}
