//! Coroutine bookkeeping layer on top of tokio's own reactor (§4.1).
//!
//! The original library drove a user-space coroutine scheduler over a
//! hand-rolled epoll/kqueue loop: every connection got a stack and a
//! context id, and a suspend point resumed the coroutine when its
//! descriptor became ready again. Tokio's task scheduler already *is*
//! that reactor - a [`tokio::task`] suspends on `.await` exactly where
//! the original coroutine suspended on a blocking call, and is resumed
//! by the same epoll/kqueue/IOCP driver tokio runs internally.
//!
//! [`Coroutine`] is therefore a thin wrapper around [`tokio::task::spawn`]
//! that preserves the three pieces of the original API callers actually
//! relied on: a stable per-coroutine context id, cooperative interruption
//! that a running cycle can observe and act on instead of being killed
//! outright, and a join handle to wait for actual termination.
use std::{
    future::Future,
    sync::atomic::{AtomicU32, Ordering},
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

tokio::task_local! {
    static CONTEXT_ID: u32;
    static CANCEL: CancellationToken;
}

/// Context ids start at 100, matching the original scheduler's reserved
/// range for system/listener coroutines below that value.
static NEXT_CONTEXT_ID: AtomicU32 = AtomicU32::new(100);

/// Allocates the next context id without spawning a [`Coroutine`] around
/// it - used by the listener to tag a [`ConnHandle`](crate::net::manager::ConnHandle)
/// for a connection routine that runs as a bare task rather than a
/// cooperative cycle loop (§4.3, §4.11).
#[inline]
pub(crate) fn next_context_id() -> u32 {
    NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Returns the context id of the currently running coroutine, or `None`
/// when called from outside one (e.g. directly on a bare tokio task).
#[inline]
pub fn current_context_id() -> Option<u32> {
    CONTEXT_ID.try_with(|id| *id).ok()
}

/// Cooperative cancellation check, analogous to the original scheduler's
/// per-cycle "should this coroutine terminate" flag. A [`CoroutineHandler`]
/// should call this at a safe suspend point inside `cycle` and return
/// `false` (stop) once it observes `true`.
#[inline]
pub fn should_term_cycle() -> bool {
    CANCEL.try_with(|c| c.is_cancelled()).unwrap_or(false)
}

/// One iteration of a coroutine's body.
///
/// `cycle` returns `true` to keep running and `false` to terminate
/// voluntarily. A coroutine that never checks [`should_term_cycle`] inside
/// a long `cycle` call will still be interrupted the next time it suspends
/// on I/O, since [`Coroutine::start`] races every `cycle` against the
/// cancellation signal.
pub trait CoroutineHandler: Send + 'static {
    /// Runs one cycle of the coroutine's loop body.
    fn cycle(&mut self) -> impl Future<Output = bool> + Send;
}

/// A spawned coroutine: a context id, a cooperative interrupt switch, and
/// a join handle.
///
/// Dropping a `Coroutine` without calling [`interrupt`](Self::interrupt) or
/// [`stop`](Self::stop) leaves the underlying task detached and running to
/// completion on its own - the same "fire and forget" semantics
/// `tokio::spawn` already has. Callers that need to track liveness should
/// register the `Coroutine` with a [`ConnManager`](crate::net::manager::ConnManager)
/// instead of holding onto it directly.
pub struct Coroutine {
    context_id: u32,
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl Coroutine {
    /// Spawns `handler` as a new coroutine and begins running its cycle
    /// loop immediately.
    pub fn start<H: CoroutineHandler>(mut handler: H) -> Self {
        let context_id = next_context_id();
        let cancel = CancellationToken::new();
        let cancel_for_task = cancel.clone();

        let join = tokio::spawn(CONTEXT_ID.scope(context_id, async move {
            CANCEL
                .scope(cancel_for_task.clone(), async move {
                    loop {
                        if cancel_for_task.is_cancelled() {
                            break;
                        }

                        tokio::select! {
                            biased;

                            _ = cancel_for_task.cancelled() => break,
                            keep_going = handler.cycle() => {
                                if !keep_going {
                                    break;
                                }
                            }
                        }
                    }
                })
                .await
        }));

        Self {
            context_id,
            cancel,
            join: Some(join),
        }
    }

    /// This coroutine's stable context id, assigned once at [`start`](Self::start)
    /// time and never reused while the process runs.
    #[inline(always)]
    pub fn context_id(&self) -> u32 {
        self.context_id
    }

    /// True once the task behind this handle has run to completion.
    #[inline]
    pub fn is_finished(&self) -> bool {
        match &self.join {
            Some(join) => join.is_finished(),
            None => true,
        }
    }

    /// Cooperatively asks the coroutine to stop at its next suspend point
    /// or the top of its next cycle. Does not wait for it to actually
    /// terminate - see [`join`](Self::join).
    #[inline]
    pub fn interrupt(&self) {
        self.cancel.cancel();
    }

    /// Interrupts the coroutine and waits for it to finish.
    pub async fn join(mut self) {
        self.interrupt();
        if let Some(join) = self.join.take() {
            let _ = join.await;
        }
    }

    /// Interrupts the coroutine and detaches it without waiting - used
    /// when the caller is itself about to be torn down and cannot afford
    /// to suspend on [`join`](Self::join).
    #[inline]
    pub fn stop(mut self) {
        self.interrupt();
        self.join.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    struct CountingHandler {
        remaining: usize,
        counter: Arc<AtomicUsize>,
    }

    impl CoroutineHandler for CountingHandler {
        async fn cycle(&mut self) -> bool {
            if self.remaining == 0 || should_term_cycle() {
                return false;
            }
            self.remaining -= 1;
            self.counter.fetch_add(1, Ordering::SeqCst);
            true
        }
    }

    #[tokio::test]
    async fn runs_until_cycle_returns_false() {
        let counter = Arc::new(AtomicUsize::new(0));
        let coroutine = Coroutine::start(CountingHandler {
            remaining: 5,
            counter: counter.clone(),
        });

        coroutine.join().await;
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    struct ForeverHandler;

    impl CoroutineHandler for ForeverHandler {
        async fn cycle(&mut self) -> bool {
            tokio::task::yield_now().await;
            !should_term_cycle()
        }
    }

    #[tokio::test]
    async fn interrupt_stops_a_forever_loop() {
        let coroutine = Coroutine::start(ForeverHandler);
        coroutine.interrupt();
        coroutine.join().await;
    }

    #[tokio::test]
    async fn context_ids_are_unique_and_monotonic() {
        let a = Coroutine::start(ForeverHandler);
        let b = Coroutine::start(ForeverHandler);
        assert!(b.context_id() > a.context_id());
        a.stop();
        b.stop();
    }
}
