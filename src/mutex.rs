//! # Mutex with priority inheritance
//!
//! Binary lock whose holder temporarily inherits the priority of the
//! highest-priority task blocked on it, restoring its own priority on
//! unlock (or on an inheriting waiter's timeout).
//!
//! Inheritance is applied once per hold (the first waiter that outranks
//! the holder raises it; later, lower-priority waiters don't re-raise
//! it further) and recomputed from the remaining waiter list whenever
//! the inheriting waiter itself times out.

use crate::error::Error;
use crate::list::WaiterList;
use crate::scheduler::Scheduler;
use crate::task::{TaskId, WakeReason};
use crate::config::MAX_BLOCKED_PER_MUTEX;

/// Sentinel marking "priority not currently inherited", matching the
/// source's `MUTEX_DEFAULT_PRIO`.
const NO_PRIORITY: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStatus {
    Taken,
    Success,
}

#[derive(Clone, Copy)]
pub struct Mutex {
    /// `1` == available, `0` == held; mirrors the source's binary lock.
    lock: u8,
    waiters: WaiterList<MAX_BLOCKED_PER_MUTEX>,
    holder: Option<TaskId>,
    real_priority: u8,
    inherited_priority: u8,
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

impl Mutex {
    pub const fn new() -> Self {
        Self {
            lock: 1,
            waiters: WaiterList::new(),
            holder: None,
            real_priority: NO_PRIORITY,
            inherited_priority: NO_PRIORITY,
        }
    }

    /// Non-blocking check; does not modify state. A `lock` byte outside
    /// `{0, 1}` means the object pool was corrupted and is not a
    /// recoverable condition, so it routes to the fault hook instead of
    /// returning a `LockStatus`.
    pub fn check(&self) -> LockStatus {
        match self.lock {
            1 => LockStatus::Success,
            0 => LockStatus::Taken,
            _ => crate::error::fault("mutex lock byte out of range"),
        }
    }

    /// Fast-path acquire attempt.
    pub fn try_lock(&mut self, task: TaskId) -> LockStatus {
        if self.lock == 1 {
            self.lock = 0;
            self.holder = Some(task);
            LockStatus::Success
        } else {
            LockStatus::Taken
        }
    }

    pub fn retry_after_wake(&mut self, task: TaskId) -> LockStatus {
        self.try_lock(task)
    }

    /// Enqueues the caller priority-ordered and, if it now outranks the
    /// holder's effective priority, raises the holder to match —
    /// stashing the holder's real priority the first time only.
    pub fn enqueue_waiter(&mut self, task: TaskId, scheduler: &mut Scheduler) -> Result<(), Error> {
        self.waiters.push_by_priority(task, |t| scheduler.priority_of(t))?;

        let Some(holder) = self.holder else { return Ok(()) };
        let waiter_priority = scheduler.priority_of(task);
        let holder_priority = scheduler.priority_of(holder);
        if waiter_priority < holder_priority {
            let prior = scheduler.set_new_priority(holder, waiter_priority);
            self.inherited_priority = waiter_priority;
            if self.real_priority == NO_PRIORITY {
                self.real_priority = prior;
            }
        }
        Ok(())
    }

    /// Only the holder may unlock. Restores any inherited priority
    /// before waking the next waiter.
    pub fn unlock(&mut self, task: TaskId, scheduler: &mut Scheduler) -> Result<(), Error> {
        if self.holder != Some(task) {
            return Err(Error::AlreadyReleased);
        }

        self.lock = 1;
        if self.inherited_priority != NO_PRIORITY {
            scheduler.set_new_priority(task, self.real_priority);
            self.inherited_priority = NO_PRIORITY;
            self.real_priority = NO_PRIORITY;
        }
        self.holder = None;

        if let Some(next) = self.waiters.pop_front() {
            scheduler.set_reason_for_wakeup(WakeReason::MutexReady, next);
            scheduler.wake(next);
        }
        Ok(())
    }

    /// Evicts a timed-out waiter and, if it was the one the holder's
    /// priority was inherited from, recomputes inheritance from the
    /// new waiter-list head (or restores `real_priority` if none
    /// remains higher).
    pub fn blocked_timeout(&mut self, task: TaskId, scheduler: &mut Scheduler) {
        let evicted_priority = scheduler.priority_of(task);
        self.waiters.remove_by_task(task);

        if evicted_priority != self.inherited_priority {
            return;
        }
        let Some(holder) = self.holder else { return };

        match self.waiters.front() {
            Some(next) if scheduler.priority_of(next) < self.real_priority => {
                let next_priority = scheduler.priority_of(next);
                scheduler.set_new_priority(holder, next_priority);
                self.inherited_priority = next_priority;
            }
            _ => {
                scheduler.set_new_priority(holder, self.real_priority);
                self.inherited_priority = NO_PRIORITY;
                self.real_priority = NO_PRIORITY;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
    #[should_panic(expected = "mutex lock byte out of range")]
    fn check_faults_on_impossible_lock_value() {
        let mut m = Mutex::new();
        m.lock = 2;
        m.check();
    }

    #[test]
    fn only_holder_may_unlock() {
        let mut sched = boot(2);
        let mut m = Mutex::new();
        assert_eq!(m.try_lock(1), LockStatus::Success);
        assert_eq!(m.unlock(0, &mut sched), Err(Error::AlreadyReleased));
        assert_eq!(m.unlock(1, &mut sched), Ok(()));
    }

    #[test]
    fn priority_inheritance_three_task_scenario() {
        // H=0, M=1, L=2.
        let mut sched = boot(3);
        let mut m = Mutex::new();

        assert_eq!(m.try_lock(2), LockStatus::Success); // L locks
        assert_eq!(sched.priority_of(2), 2);

        // H blocks, inherits L up to priority 0.
        m.enqueue_waiter(0, &mut sched).unwrap();
        assert_eq!(sched.priority_of(2), 0);

        // M does not preempt L: L now runs at priority 0 < M's 1.
        assert_ne!(sched.priority_of(2), sched.priority_of(1));
        assert!(sched.priority_of(2) < sched.priority_of(1));

        // L unlocks: priority restored, H acquires.
        m.unlock(2, &mut sched).unwrap();
        assert_eq!(sched.priority_of(2), 2);
        assert_eq!(m.retry_after_wake(0), LockStatus::Success);
    }

    #[test]
    fn timeout_of_inheriting_waiter_restores_real_priority() {
        let mut sched = boot(2);
        let mut m = Mutex::new();
        assert_eq!(m.try_lock(1), LockStatus::Success); // task 1 holds

        m.enqueue_waiter(0, &mut sched).unwrap();
        assert_eq!(sched.priority_of(1), 0); // inherited from task 0

        m.blocked_timeout(0, &mut sched);
        assert_eq!(sched.priority_of(1), 1); // restored, no other waiters
    }
}
