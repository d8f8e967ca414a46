//! # Mailbox
//!
//! Single-slot value exchange between exactly one sender and one
//! receiver, guarded by an internal binary semaphore and backed by a
//! single recorded-waiter slot (there is only ever one side to wake).
//!
//! `0` is a reserved empty-mailbox sentinel: a legitimate `0` payload is
//! indistinguishable from an empty mailbox. This is a known, accepted
//! limitation rather than something worth a richer encoding for a
//! single `u32` slot.

use crate::scheduler::Scheduler;
use crate::semaphore::{Semaphore, WaitStatus};
use crate::task::{TaskId, WakeReason};

#[derive(Clone, Copy)]
pub struct Mailbox {
    mail: u32,
    blocked_task: Option<TaskId>,
    guard: Semaphore,
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Mailbox {
    pub const fn new() -> Self {
        Self { mail: 0, blocked_task: None, guard: Semaphore::new(1) }
    }

    /// Returns the current value without modifying it. `0` means empty.
    pub fn peek(&self) -> u32 {
        self.mail
    }

    /// Non-blocking claim of the guarding semaphore.
    pub fn try_acquire_guard(&mut self) -> bool {
        matches!(self.guard.try_take(), WaitStatus::Success)
    }

    pub fn release_guard(&mut self, scheduler: &mut Scheduler) {
        self.guard.post(scheduler);
    }

    /// Called with the guard held. Takes and clears the mail if
    /// present, waking the recorded waiter (a blocked sender) if any.
    pub fn take_value(&mut self, scheduler: &mut Scheduler) -> Option<u32> {
        if self.mail == 0 {
            return None;
        }
        let value = self.mail;
        self.mail = 0;
        self.wake_blocked(scheduler);
        Some(value)
    }

    /// Called with the guard held. Stores `value` if the mailbox is
    /// currently empty, waking the recorded waiter (a blocked receiver)
    /// if any.
    pub fn store_value(&mut self, value: u32, scheduler: &mut Scheduler) -> bool {
        if self.mail != 0 {
            return false;
        }
        self.mail = value;
        self.wake_blocked(scheduler);
        true
    }

    pub fn clear(&mut self, scheduler: &mut Scheduler) {
        self.mail = 0;
        self.wake_blocked(scheduler);
    }

    /// Records the caller as the single blocked waiter. A mailbox has
    /// exactly one producer and one consumer, so a second recording
    /// before the first is cleared is dropped rather than overwriting
    /// it.
    pub fn record_waiter(&mut self, task: TaskId) {
        if self.blocked_task.is_none() {
            self.blocked_task = Some(task);
        }
    }

    pub fn blocked_timeout(&mut self) {
        self.blocked_task = None;
    }

    fn wake_blocked(&mut self, scheduler: &mut Scheduler) {
        if let Some(task) = self.blocked_task.take() {
            scheduler.set_reason_for_wakeup(WakeReason::MboxReady, task);
            scheduler.wake(task);
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
    fn store_then_take_round_trips() {
        let mut sched = boot(1);
        let mut mbox = Mailbox::new();
        assert!(mbox.store_value(7, &mut sched));
        assert_eq!(mbox.peek(), 7);
        assert_eq!(mbox.take_value(&mut sched), Some(7));
        assert_eq!(mbox.peek(), 0);
    }

    #[test]
    fn store_fails_while_full() {
        let mut sched = boot(1);
        let mut mbox = Mailbox::new();
        assert!(mbox.store_value(1, &mut sched));
        assert!(!mbox.store_value(2, &mut sched));
    }

    #[test]
    fn take_wakes_recorded_waiter() {
        let mut sched = boot(1);
        let mut mbox = Mailbox::new();
        mbox.record_waiter(0);
        mbox.store_value(5, &mut sched);
        assert_eq!(sched.get_wake_reason(), WakeReason::MboxReady);
    }

    #[test]
    fn blocked_timeout_clears_recorded_waiter() {
        let mut mbox = Mailbox::new();
        mbox.record_waiter(0);
        mbox.blocked_timeout();
        let mut sched = boot(1);
        assert!(mbox.store_value(1, &mut sched));
        assert_eq!(sched.get_wake_reason(), WakeReason::NoWakeupSinceLastCheck);
    }
}
