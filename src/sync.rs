// SPDX-License-Identifier: MPL-2.0
//! Single-use completion signal.
//!
//! The waiting side is a future; the completing side is consumed when it fires, so a
//! completion is delivered at most once. The waker is stored under the same lock as the
//! value, so a completion racing with the first poll is never lost. Once the waiting side
//! is closed or dropped, a completion is handed back to the completer instead.
use alloc::sync::Arc;
use core::future::Future;
use core::pin::Pin;
use core::task::{Context, Poll, Waker};
use spin::Mutex;

struct Slot<T> {
    value: Option<T>,
    waker: Option<Waker>,
    closed: bool,
}

/// Waiting half. Resolves to the value passed to [`Completer::complete`].
pub struct Completion<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

/// Completing half.
pub struct Completer<T> {
    slot: Arc<Mutex<Slot<T>>>,
}

/// Creates a linked completer/completion pair.
pub fn completion<T>() -> (Completer<T>, Completion<T>) {
    let slot = Arc::new(Mutex::new(Slot {
        value: None,
        waker: None,
        closed: false,
    }));
    (
        Completer { slot: slot.clone() },
        Completion { slot },
    )
}

impl<T> Completer<T> {
    /// Stores `value` and wakes the waiter, if it has been polled. Returns `value` back if
    /// nobody is waiting any more.
    pub fn complete(self, value: T) -> Result<(), T> {
        let waker = {
            let mut slot = self.slot.lock();
            if slot.closed {
                return Err(value);
            }
            slot.value = Some(value);
            slot.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
        Ok(())
    }
}

impl<T> Completion<T> {
    /// True once the completer has fired and the value has not been taken yet.
    pub fn is_complete(&self) -> bool {
        self.slot.lock().value.is_some()
    }

    /// Stops waiting. Returns a value that was delivered but not yet taken; anything
    /// completed after this goes back to the completer.
    pub fn close(&mut self) -> Option<T> {
        let mut slot = self.slot.lock();
        slot.closed = true;
        slot.waker = None;
        slot.value.take()
    }
}

impl<T> Drop for Completion<T> {
    fn drop(&mut self) {
        self.slot.lock().closed = true;
    }
}

impl<T> Future for Completion<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let mut slot = self.slot.lock();
        match slot.value.take() {
            Some(value) => Poll::Ready(value),
            None => {
                slot.waker = Some(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}
