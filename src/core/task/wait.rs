//! The generic suspend protocol shared by every blocking primitive.
//!
//! A primitive describes how to register and unregister a waiter through
//! [`WaitStrategy`]; [`Wait`] drives that strategy together with the
//! deadline timer and the task's cancellation flag and reports what ended the
//! wait as a [`WakeupSource`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use super::context;
use super::WakeupSource;
use crate::core::deadline::Deadline;
use crate::core::scheduler::timer::{Timer, TimerId};

/// Registration hooks a blocking primitive provides to park a task.
pub trait WaitStrategy {
    /// Registers `waker` with the primitive. Called once, before the task
    /// sleeps. Returns `false` when the awaited condition already holds and
    /// the task must not sleep at all.
    fn setup_wakeups(&mut self, waker: &Waker) -> bool;

    /// Returns `true` once the primitive has woken this waiter.
    fn is_notified(&self) -> bool;

    /// Unregisters the waiter if it is still registered. Returns `true` when
    /// the primitive had already woken it, i.e. the wakeup was consumed.
    fn disable_wakeups(&mut self) -> bool;

    /// Replaces the registered waker after the task moved to a new one.
    fn refresh_waker(&mut self, _waker: &Waker) {}

    /// Hands a consumed wakeup to another waiter. Called when the wait is
    /// abandoned after the primitive already woke this waiter.
    fn forward_wakeup(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Init,
    Waiting,
    Done,
}

/// Future returned by [`wait_with`].
#[must_use = "waits do nothing unless awaited"]
pub struct Wait<S: WaitStrategy> {
    strategy: S,
    deadline: Deadline,
    cancellable: bool,
    phase: Phase,
    waker: Option<Waker>,
    timer: Option<(Arc<Timer>, TimerId)>,
}

/// Parks the current task using `strategy` until the primitive wakes it, the
/// deadline passes, or (when `cancellable`) cancellation is requested.
///
/// # Panics
///
/// Polling a wait with a reachable deadline outside of an engine task panics,
/// because there is no timer to arm.
pub fn wait_with<S: WaitStrategy + Unpin>(
    strategy: S,
    deadline: Deadline,
    cancellable: bool,
) -> Wait<S> {
    Wait {
        strategy,
        deadline,
        cancellable,
        phase: Phase::Init,
        waker: None,
        timer: None,
    }
}

fn should_cancel() -> bool {
    context::with_current_task(|task| task.is_some_and(|task| task.should_cancel()))
}

impl<S: WaitStrategy> Wait<S> {
    fn interrupted(&self) -> Option<WakeupSource> {
        if self.cancellable && should_cancel() {
            return Some(WakeupSource::CancelRequest);
        }
        if self.deadline.is_reached() {
            return Some(WakeupSource::DeadlineTimer);
        }
        None
    }

    fn arm_timer(&mut self, waker: &Waker) {
        let Some(at) = self.deadline.instant() else {
            return;
        };
        let Some(runtime) = context::current_runtime() else {
            panic!("timed waits must run inside an engine task");
        };
        let timer = Arc::clone(runtime.timer());
        let id = timer.register(at, waker.clone());
        self.timer = Some((timer, id));
    }

    fn disarm_timer(&mut self) {
        if let Some((timer, id)) = self.timer.take() {
            timer.cancel(id);
        }
    }

    fn finish(&mut self, source: WakeupSource) -> WakeupSource {
        self.phase = Phase::Done;
        self.disarm_timer();
        if self.strategy.disable_wakeups() {
            WakeupSource::WaitList
        } else {
            source
        }
    }
}

impl<S: WaitStrategy + Unpin> Future for Wait<S> {
    type Output = WakeupSource;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<WakeupSource> {
        let this = &mut *self;
        match this.phase {
            Phase::Init => {
                if !this.strategy.setup_wakeups(cx.waker()) {
                    this.phase = Phase::Done;
                    return Poll::Ready(WakeupSource::WaitList);
                }
                this.phase = Phase::Waiting;
                if let Some(source) = this.interrupted() {
                    return Poll::Ready(this.finish(source));
                }
                this.arm_timer(cx.waker());
                this.waker = Some(cx.waker().clone());
                Poll::Pending
            }
            Phase::Waiting => {
                if this.strategy.is_notified() {
                    return Poll::Ready(this.finish(WakeupSource::WaitList));
                }
                if let Some(source) = this.interrupted() {
                    return Poll::Ready(this.finish(source));
                }
                let stale = this
                    .waker
                    .as_ref()
                    .is_none_or(|waker| !waker.will_wake(cx.waker()));
                if stale {
                    this.strategy.refresh_waker(cx.waker());
                    if let Some((timer, id)) = &this.timer {
                        timer.update(*id, cx.waker().clone());
                    }
                    this.waker = Some(cx.waker().clone());
                }
                Poll::Pending
            }
            Phase::Done => panic!("`Wait` polled after completion"),
        }
    }
}

impl<S: WaitStrategy> Drop for Wait<S> {
    fn drop(&mut self) {
        if self.phase == Phase::Waiting {
            self.disarm_timer();
            if self.strategy.disable_wakeups() {
                self.strategy.forward_wakeup();
            }
        }
    }
}

/// Strategy that is never notified: the wait ends only through the deadline
/// or cancellation. Used for sleeps.
#[derive(Debug, Default)]
pub(crate) struct NoWakeups;

impl WaitStrategy for NoWakeups {
    fn setup_wakeups(&mut self, _waker: &Waker) -> bool {
        true
    }

    fn is_notified(&self) -> bool {
        false
    }

    fn disable_wakeups(&mut self) -> bool {
        false
    }
}
