#![forbid(unsafe_code)]

//! Queue of in-flight asynchronous validations.
//!
//! Deferred validator results are not spawned anywhere: they wait in this
//! queue until the host drives it, either synchronously with
//! [`PendingQueue::run_until_stalled`] or from any executor by awaiting
//! [`PendingQueue::settle`]. Each entry remembers the run that produced it so
//! the engine can discard superseded results.

use std::cell::RefCell;
use std::future::Future;
use std::rc::{Rc, Weak};
use std::task::{Context, Poll};

use formflow_path::Path;
use futures_util::future::poll_fn;
use futures_util::task::noop_waker_ref;
use tracing::debug;

use crate::error::ValidationError;
use crate::validation::FieldValidation;
use crate::validator::{DeferredVerdict, Verdict};

struct PendingValidation {
    path: Path,
    run_id: u64,
    target: Weak<FieldValidation>,
    future: DeferredVerdict,
}

/// Shared handle to the queue. Clones point at the same queue.
#[derive(Clone, Default)]
pub(crate) struct PendingQueue {
    tasks: Rc<RefCell<Vec<PendingValidation>>>,
}

impl PendingQueue {
    /// Queue `future` as the result of run `run_id` of `target`.
    ///
    /// Any older entry for the same field is dropped: its result could
    /// only ever be discarded.
    pub(crate) fn enqueue(
        &self,
        path: Path,
        run_id: u64,
        target: Weak<FieldValidation>,
        future: DeferredVerdict,
    ) {
        let superseded: Vec<PendingValidation> = {
            let mut tasks = self.tasks.borrow_mut();
            let (old, keep): (Vec<_>, Vec<_>) = tasks
                .drain(..)
                .partition(|task| Weak::ptr_eq(&task.target, &target));
            *tasks = keep;
            tasks.push(PendingValidation {
                path,
                run_id,
                target,
                future,
            });
            old
        };
        for task in superseded {
            debug!(path = %task.path, run_id = task.run_id, "dropping superseded asynchronous validation");
        }
    }

    /// Number of validations still in flight.
    pub(crate) fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    /// Drop every queued validation.
    pub(crate) fn clear(&self) {
        let tasks = std::mem::take(&mut *self.tasks.borrow_mut());
        drop(tasks);
    }

    /// Poll every queued validation once with `cx`, delivering finished
    /// results. Returns how many finished.
    fn poll_round(&self, cx: &mut Context<'_>) -> usize {
        let mut round = std::mem::take(&mut *self.tasks.borrow_mut());
        let mut finished: Vec<(PendingValidation, Result<Verdict, ValidationError>)> = Vec::new();
        let mut waiting = Vec::with_capacity(round.len());
        for mut task in round.drain(..) {
            if task.target.strong_count() == 0 {
                continue;
            }
            match task.future.as_mut().poll(cx) {
                Poll::Ready(result) => finished.push((task, result)),
                Poll::Pending => waiting.push(task),
            }
        }
        {
            // Entries queued while polling are newer than anything we kept.
            let mut tasks = self.tasks.borrow_mut();
            let newer = std::mem::take(&mut *tasks);
            *tasks = waiting;
            for task in newer {
                tasks.retain(|old| !Weak::ptr_eq(&old.target, &task.target));
                tasks.push(task);
            }
        }
        let count = finished.len();
        for (task, result) in finished {
            if let Some(target) = task.target.upgrade() {
                target.resolve(task.run_id, result);
            }
        }
        count
    }

    /// Poll queued validations until a full round makes no progress.
    ///
    /// Returns the number of validations that finished.
    pub(crate) fn run_until_stalled(&self) -> usize {
        let mut cx = Context::from_waker(noop_waker_ref());
        let mut total = 0;
        loop {
            if self.len() == 0 {
                return total;
            }
            let finished = self.poll_round(&mut cx);
            if finished == 0 {
                return total;
            }
            total += finished;
        }
    }

    /// Future that completes once the queue is empty.
    pub(crate) fn settle(&self) -> impl Future<Output = ()> + 'static {
        let queue = self.clone();
        poll_fn(move |cx| {
            loop {
                if queue.len() == 0 {
                    return Poll::Ready(());
                }
                if queue.poll_round(cx) == 0 {
                    return Poll::Pending;
                }
            }
        })
    }
}
