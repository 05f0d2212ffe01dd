//! Connection manager and routine base traits (§3, §4.3).
//!
//! The original system modeled this as a pair of intrusive linked lists
//! (`live`/`zombies`) walked by a listener coroutine between accepts, with
//! a documented bug in its destructor loop (`it = it++`, skipping every
//! second zombie - see §9). This crate keeps the two-list shape and the
//! "only the listener calls `destroy()`" invariant, but backs both lists
//! with a plain `Vec` under a `Mutex` and drains zombies completely on
//! `destroy()` - the documented semantics, not the buggy ones.
use crate::errors::ErrorKind;
use std::{
    future::Future,
    sync::{Arc, Mutex},
};

/// Identity of one registered connection routine.
///
/// Dedup in [`ConnManager::push`] is by `Arc` pointer equality, so the
/// same `ConnHandle` must be shared (via `clone()` of the `Arc`) between
/// the manager's `live` list and the task that will eventually call
/// [`ConnManager::remove`] on itself.
pub struct ConnHandle {
    context_id: u32,
}

impl ConnHandle {
    #[inline]
    pub(crate) fn new(context_id: u32) -> Arc<Self> {
        Arc::new(Self { context_id })
    }

    /// The coroutine context id this handle was registered under.
    #[inline(always)]
    pub fn context_id(&self) -> u32 {
        self.context_id
    }
}

/// Tracks every live connection routine and a deferred "zombies" list
/// (§3, §4.3).
///
/// `destroy()` is only ever safe to call from a coroutine that is not
/// itself one of the zombies being dropped - in practice, the listener's
/// accept-loop tick (§4.3, §4.11).
#[derive(Default)]
pub struct ConnManager {
    live: Mutex<Vec<Arc<ConnHandle>>>,
    zombies: Mutex<Vec<Arc<ConnHandle>>>,
}

impl ConnManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            live: Mutex::new(Vec::new()),
            zombies: Mutex::new(Vec::new()),
        })
    }

    /// Registers `handle` as live. A no-op if it (by pointer identity) is
    /// already registered.
    pub fn push(&self, handle: Arc<ConnHandle>) {
        let mut live = self.live.lock().unwrap();
        if !live.iter().any(|existing| Arc::ptr_eq(existing, &handle)) {
            live.push(handle);
        }
    }

    /// Moves `handle` from `live` to `zombies`. Called by a routine's own
    /// task at cycle exit - never deletes anything inline, just marks it
    /// for the next [`destroy`](Self::destroy).
    pub fn remove(&self, handle: &Arc<ConnHandle>) {
        let mut live = self.live.lock().unwrap();
        if let Some(pos) = live.iter().position(|existing| Arc::ptr_eq(existing, handle)) {
            let zombie = live.remove(pos);
            drop(live);
            self.zombies.lock().unwrap().push(zombie);
        }
    }

    /// Drops every zombie currently queued. `live` is left untouched
    /// (§8 property 9).
    pub fn destroy(&self) {
        let mut zombies = self.zombies.lock().unwrap();
        if !zombies.is_empty() {
            tracing::trace!(count = zombies.len(), "reaping zombie connection routines");
        }
        zombies.clear();
    }

    /// Number of routines currently tracked as live.
    pub fn live_count(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    /// Number of routines currently queued for destruction.
    pub fn zombie_count(&self) -> usize {
        self.zombies.lock().unwrap().len()
    }
}

/// A coroutine whose body is a single `do_cycle()` call, registered in a
/// [`ConnManager`] for its whole lifetime (§3, §4.3).
///
/// Implementors provide `do_cycle` (the full per-connection request-serving
/// loop, e.g. `HttpServerConn::do_cycle` in §4.11); [`run_conn_routine`]
/// supplies the standard pre/post handling: graceful-close remapping and
/// handing the routine off to its manager as a zombie.
pub trait ConnRoutine: Send + 'static {
    /// Runs the routine's whole connection lifetime to completion.
    fn do_cycle(&mut self) -> impl Future<Output = Result<(), ErrorKind>> + Send;
}

/// Drives one [`ConnRoutine`] to completion and reports it to `manager`
/// (§4.3 item 2).
///
/// "Gracefully closed" errors (`SocketRead`, `SocketReadFully`,
/// `SocketWrite`, `SocketTimeout`) are logged at `warn` and folded into
/// `SocketClosed`; anything else is logged at `error`. Either way the
/// routine always terminates after one `do_cycle` - it never loops inside
/// [`Coroutine`](crate::runtime::Coroutine) the way a listener does.
pub async fn run_conn_routine<R: ConnRoutine>(
    mut routine: R,
    handle: Arc<ConnHandle>,
    manager: Arc<ConnManager>,
) {
    match routine.do_cycle().await {
        Ok(()) => {}
        Err(error) if error.is_graceful_close() => {
            tracing::warn!(
                context_id = handle.context_id(),
                ?error,
                "connection closed"
            );
        }
        Err(error) => {
            tracing::error!(
                context_id = handle.context_id(),
                ?error,
                "connection routine failed"
            );
        }
    }

    manager.remove(&handle);
}

/// A coroutine whose cycle accepts connections and spawns [`ConnRoutine`]s
/// (§3, §4.3).
///
/// The required `cycle()` method must call `manager().destroy()` at the
/// top of every iteration, strictly before the next `accept()`, so no
/// zombie is ever reaped while another coroutine holds a reference to it
/// obtained during the same tick (§5).
pub trait ListenRoutine: Send + 'static {
    fn manager(&self) -> &Arc<ConnManager>;

    fn cycle(&mut self) -> impl Future<Output = bool> + Send;
}
