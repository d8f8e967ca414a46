//! # Counting semaphore
//!
//! A signed count plus a priority-ordered waiter list. `wait` decrements
//! when available or blocks; `post` increments and wakes the
//! highest-priority waiter.
//!
//! Blocked tasks are tracked in `list::WaiterList` rather than a raw
//! array, so the highest-priority waiter is always at the front.

use crate::config::MAX_BLOCKED_PER_SEMA;
use crate::error::Error;
use crate::list::WaiterList;
use crate::scheduler::Scheduler;
use crate::task::{TaskId, WakeReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Taken,
    Success,
}

#[derive(Clone, Copy)]
pub struct Semaphore {
    value: i32,
    waiters: WaiterList<MAX_BLOCKED_PER_SEMA>,
}

impl Semaphore {
    pub const fn new(initial: i32) -> Self {
        Self { value: initial, waiters: WaiterList::new() }
    }

    /// Non-blocking check; does not modify state.
    pub fn check(&self) -> WaitStatus {
        if self.value > 0 {
            WaitStatus::Success
        } else {
            WaitStatus::Taken
        }
    }

    /// Claims the count if available. Returns `Taken` when the caller
    /// must enqueue and sleep.
    pub fn try_take(&mut self) -> WaitStatus {
        if self.value > 0 {
            self.value -= 1;
            WaitStatus::Success
        } else {
            WaitStatus::Taken
        }
    }

    pub fn enqueue_waiter(&mut self, task: TaskId, scheduler: &Scheduler) -> Result<(), Error> {
        self.waiters.push_by_priority(task, |t| scheduler.priority_of(t))
    }

    /// Retry after waking from a blocked wait: exactly one more attempt,
    /// whether the wake was a real post or a timeout.
    pub fn retry_after_wake(&mut self) -> WaitStatus {
        self.try_take()
    }

    pub fn post(&mut self, scheduler: &mut Scheduler) {
        self.value += 1;
        if let Some(task) = self.waiters.pop_front() {
            scheduler.set_reason_for_wakeup(WakeReason::SemaReady, task);
            scheduler.wake(task);
        }
    }

    pub fn blocked_timeout(&mut self, task: TaskId) {
        self.waiters.remove_by_task(task);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::NoTimeouts;

    extern "C" fn dummy() -> ! {
        loop {}
    }

    fn boot(n: usize) -> Scheduler {
        let mut sched = Scheduler::new();
        for _ in 0..n {
            sched.create_task(dummy, core::ptr::null_mut(), 64).unwrap();
        }
        sched.start(dummy, core::ptr::null_mut(), 64);
        sched
    }

    #[test]
    fn round_trip_to_zero_then_taken() {
        let mut sema = Semaphore::new(2);
        assert_eq!(sema.try_take(), WaitStatus::Success);
        assert_eq!(sema.try_take(), WaitStatus::Success);
        assert_eq!(sema.try_take(), WaitStatus::Taken);
        assert_eq!(sema.check(), WaitStatus::Taken);
    }

    #[test]
    fn post_wakes_highest_priority_waiter_first() {
        let mut sched = boot(2);
        let mut sema = Semaphore::new(0);
        // task 1 (lower prio) then task 0 (higher prio) both enqueue.
        sema.enqueue_waiter(1, &sched).unwrap();
        sema.enqueue_waiter(0, &sched).unwrap();
        let mut nt = NoTimeouts;
        let _ = &mut nt;

        sema.post(&mut sched);
        assert_eq!(sched.get_wake_reason(), WakeReason::SemaReady);

        sema.post(&mut sched);
        // second waiter (task 1) now woken too; value consumed by neither
        // automatically, matching "only the unblocked task is guaranteed
        // to observe the increment".
        assert_eq!(sema.check(), WaitStatus::Success);
    }

    #[test]
    fn blocked_timeout_evicts_waiter() {
        let sched = boot(1);
        let mut sema = Semaphore::new(0);
        sema.enqueue_waiter(0, &sched).unwrap();
        sema.blocked_timeout(0);
        assert_eq!(sema.retry_after_wake(), WaitStatus::Taken);
    }

    #[quickcheck_macros::quickcheck]
    fn round_trip_law(k: u8) -> bool {
        let k = (k % 32) as i32;
        let mut sema = Semaphore::new(k);
        for _ in 0..k {
            if sema.try_take() != WaitStatus::Success {
                return false;
            }
        }
        sema.try_take() == WaitStatus::Taken
    }
}
