//! # Event flags
//!
//! An 8-bit event group with a fixed table of pending waiters, each
//! carrying its own wake mask and match mode.
//!
//! `post`'s wake reason carries the observed flags byte itself
//! (`WakeReason::FlagsEvent(u8)`) rather than a symbolic code, so a
//! waiter woken by a post can read exactly which bits satisfied it
//! without a second lookup.

use crate::config::MAX_BLOCKED_PER_FLAGS;
use crate::error::Error;
use crate::scheduler::Scheduler;
use crate::task::{TaskId, WakeReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    Any,
    Exact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostCommand {
    Set,
    Clear,
}

#[derive(Clone, Copy)]
struct PendEntry {
    task: Option<TaskId>,
    mask: u8,
    mode: MatchMode,
}

impl PendEntry {
    const EMPTY: Self = Self { task: None, mask: 0, mode: MatchMode::Any };
}

#[derive(Clone, Copy)]
pub struct Flags {
    bits: u8,
    pending: [PendEntry; MAX_BLOCKED_PER_FLAGS],
}

impl Flags {
    pub const fn new(initial: u8) -> Self {
        Self { bits: initial, pending: [PendEntry::EMPTY; MAX_BLOCKED_PER_FLAGS] }
    }

    pub fn check(&self) -> u8 {
        self.bits
    }

    /// Clears the flags byte without waking anyone, distinct from
    /// `reset` below.
    pub fn clear_all(&mut self) {
        self.bits = 0;
    }

    /// Clears the flags byte and wakes every pending waiter with reason
    /// FLAGS_CLEARED, regardless of whether their predicate matched.
    pub fn reset(&mut self, scheduler: &mut Scheduler) {
        self.bits = 0;
        for entry in self.pending.iter_mut() {
            if let Some(task) = entry.task.take() {
                scheduler.set_reason_for_wakeup(WakeReason::FlagsCleared, task);
                scheduler.wake(task);
            }
        }
        self.pending = [PendEntry::EMPTY; MAX_BLOCKED_PER_FLAGS];
    }

    pub fn post(&mut self, mask: u8, cmd: PostCommand, scheduler: &mut Scheduler) {
        match cmd {
            PostCommand::Set => self.bits |= mask,
            PostCommand::Clear => self.bits &= !mask,
        }

        for entry in self.pending.iter_mut() {
            let Some(task) = entry.task else { continue };
            let satisfied = match entry.mode {
                MatchMode::Any => (entry.mask & self.bits) != 0,
                MatchMode::Exact => (entry.mask & self.bits) == entry.mask,
            };
            if satisfied {
                scheduler.set_reason_for_wakeup(WakeReason::FlagsEvent(self.bits), task);
                scheduler.wake(task);
                *entry = PendEntry::EMPTY;
            }
        }
    }

    /// Records the caller as a pending waiter. Fails with
    /// `PendListFull` if every slot is occupied.
    pub fn pend(&mut self, mask: u8, mode: MatchMode, task: TaskId) -> Result<(), Error> {
        match self.pending.iter_mut().find(|e| e.task.is_none()) {
            Some(slot) => {
                *slot = PendEntry { task: Some(task), mask, mode };
                Ok(())
            }
            None => Err(Error::PendListFull),
        }
    }

    pub fn blocked_timeout(&mut self, task: TaskId) {
        for entry in self.pending.iter_mut() {
            if entry.task == Some(task) {
                *entry = PendEntry::EMPTY;
                break;
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
    fn exact_match_requires_all_bits() {
        let mut sched = boot(1);
        let mut flags = Flags::new(0x00);
        flags.pend(0x05, MatchMode::Exact, 0).unwrap();

        flags.post(0x04, PostCommand::Set, &mut sched);
        assert_eq!(sched.get_wake_reason(), WakeReason::NoWakeupSinceLastCheck);

        flags.post(0x01, PostCommand::Set, &mut sched);
        assert_eq!(sched.get_wake_reason(), WakeReason::FlagsEvent(0x05));
    }

    #[test]
    fn any_match_wakes_on_first_overlapping_bit() {
        let mut sched = boot(1);
        let mut flags = Flags::new(0x00);
        flags.pend(0x05, MatchMode::Any, 0).unwrap();

        flags.post(0x04, PostCommand::Set, &mut sched);
        assert_eq!(sched.get_wake_reason(), WakeReason::FlagsEvent(0x04));
    }

    #[test]
    fn set_then_set_is_idempotent() {
        let mut sched = boot(1);
        let mut flags = Flags::new(0x00);
        flags.post(0x01, PostCommand::Set, &mut sched);
        flags.post(0x01, PostCommand::Set, &mut sched);
        assert_eq!(flags.check(), 0x01);
    }

    #[test]
    fn pend_list_full_rejects_extra_waiter() {
        let mut flags = Flags::new(0x00);
        for i in 0..MAX_BLOCKED_PER_FLAGS {
            flags.pend(0x01, MatchMode::Any, i).unwrap();
        }
        assert_eq!(flags.pend(0x01, MatchMode::Any, 99), Err(Error::PendListFull));
    }

    #[test]
    fn reset_wakes_unconditionally() {
        let mut sched = boot(1);
        let mut flags = Flags::new(0xFF);
        flags.pend(0x05, MatchMode::Exact, 0).unwrap();
        flags.reset(&mut sched);
        assert_eq!(flags.check(), 0);
        assert_eq!(sched.get_wake_reason(), WakeReason::FlagsCleared);
    }

    #[quickcheck_macros::quickcheck]
    fn idempotence_law(initial: u8, mask: u8) -> bool {
        let mut sched_a = boot(1);
        let mut a = Flags::new(initial);
        a.post(mask, PostCommand::Set, &mut sched_a);

        let mut sched_b = boot(1);
        let mut b = Flags::new(initial);
        b.post(mask, PostCommand::Set, &mut sched_b);
        b.post(mask, PostCommand::Set, &mut sched_b);

        a.check() == b.check()
    }
}
