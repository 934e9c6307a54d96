//! The most recently authenticated token of the current unit of work
//!
//! A request handled on a tokio task should run inside
//! [`ValidationContext::scope`]; the task then has its own slot, which goes
//! away with the task. Synchronous thread-per-request callers use
//! [`ValidationContext::enter`] instead, which clears the calling thread's
//! slot when the returned guard drops.
//!
//! Outside of any task scope, the slot belongs to the calling OS thread, but
//! only while no tokio runtime is driving that thread or while a guard from
//! [`ValidationContext::enter`] is alive. Runtime worker threads are shared by
//! unrelated tasks, so on them a token set without a task scope is not stored
//! at all and a warning is logged instead.

use std::{
    cell::{Cell, RefCell},
    future::Future,
    marker::PhantomData,
    sync::Arc,
};

use cloudauth::Token;

tokio::task_local! {
    static TASK_TOKEN: RefCell<Option<Arc<Token>>>;
}

thread_local! {
    static THREAD_TOKEN: RefCell<Option<Arc<Token>>> = const { RefCell::new(None) };
    static ENTERED: Cell<usize> = const { Cell::new(0) };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    Task,
    Thread,
    Unscoped,
}

impl Slot {
    fn current() -> Self {
        if TASK_TOKEN.try_with(|_| ()).is_ok() {
            Self::Task
        } else if ENTERED.with(Cell::get) > 0 || tokio::runtime::Handle::try_current().is_err() {
            Self::Thread
        } else {
            Self::Unscoped
        }
    }
}

/// Access to the token authenticated for the current unit of work
#[derive(Clone, Copy, Debug)]
pub struct ValidationContext {
    _priv: (),
}

impl ValidationContext {
    /// Runs `fut` with a fresh, empty token slot of its own
    pub async fn scope<F: Future>(fut: F) -> F::Output {
        TASK_TOKEN.scope(RefCell::new(None), fut).await
    }

    /// Starts a unit of work on the calling thread
    ///
    /// The thread's slot is cleared now and again when the guard drops.
    #[must_use = "the context is cleared as soon as the guard is dropped"]
    pub fn enter() -> ContextGuard {
        THREAD_TOKEN.with(|slot| slot.borrow_mut().take());
        ENTERED.with(|depth| depth.set(depth.get() + 1));
        ContextGuard {
            _not_send: PhantomData,
        }
    }

    /// Stores `token` as the authenticated token of the current unit of work
    ///
    /// On a tokio runtime thread outside of [`scope`][Self::scope] and
    /// [`enter`][Self::enter], the token is not stored.
    pub fn set(token: Arc<Token>) {
        match Slot::current() {
            Slot::Task => TASK_TOKEN.with(|slot| *slot.borrow_mut() = Some(token)),
            Slot::Thread => THREAD_TOKEN.with(|slot| *slot.borrow_mut() = Some(token)),
            Slot::Unscoped => tracing::warn!(
                "no validation scope on this task; authenticated token not stored"
            ),
        }
    }

    /// The authenticated token of the current unit of work, if any
    #[must_use]
    pub fn get() -> Option<Arc<Token>> {
        match Slot::current() {
            Slot::Task => TASK_TOKEN.with(|slot| slot.borrow().clone()),
            Slot::Thread => THREAD_TOKEN.with(|slot| slot.borrow().clone()),
            Slot::Unscoped => None,
        }
    }

    /// Forgets the authenticated token of the current unit of work
    pub fn clear() {
        if Slot::current() == Slot::Task {
            TASK_TOKEN.with(|slot| slot.borrow_mut().take());
        } else {
            THREAD_TOKEN.with(|slot| slot.borrow_mut().take());
        }
    }
}

/// Clears the calling thread's token slot when dropped
///
/// Returned by [`ValidationContext::enter`]. The guard is tied to the thread
/// that created it.
#[derive(Debug)]
pub struct ContextGuard {
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        ENTERED.with(|depth| depth.set(depth.get().saturating_sub(1)));
        THREAD_TOKEN.with(|slot| slot.borrow_mut().take());
    }
}
