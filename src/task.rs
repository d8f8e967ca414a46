//! # Task Control Block
//!
//! Per-task kernel state. TCBs are stored in a static table inside the
//! scheduler — no heap allocation, no task creation after `start`.
//!
//! `stack_pointer` is deliberately the first field: the context-switch
//! trap treats `offsetof(tcb.stack_pointer) == 0` as part of its ABI
//! (see `arch::cortex_m4`), so this layout is load-bearing, not
//! cosmetic.

use bitflags::bitflags;

bitflags! {
    /// Task state bitset. An empty bitset means the task is runnable.
    /// At most one `BLOCKED_ON_*` bit is ever set at a time.
    pub struct TaskFlags: u8 {
        const SLEEP            = 0b0000_0001;
        const SUSPENDED         = 0b0000_0010;
        const YIELD             = 0b0000_0100;
        const BLOCKED_ON_MBOX   = 0b0000_1000;
        const BLOCKED_ON_QUEUE  = 0b0001_0000;
        const BLOCKED_ON_SEMA   = 0b0010_0000;
        const BLOCKED_ON_FLAGS  = 0b0100_0000;
        const BLOCKED_ON_MUTEX  = 0b1000_0000;
    }
}

impl TaskFlags {
    pub const BLOCKED_MASK: TaskFlags = TaskFlags::from_bits_truncate(
        TaskFlags::BLOCKED_ON_MBOX.bits()
            | TaskFlags::BLOCKED_ON_QUEUE.bits()
            | TaskFlags::BLOCKED_ON_SEMA.bits()
            | TaskFlags::BLOCKED_ON_FLAGS.bits()
            | TaskFlags::BLOCKED_ON_MUTEX.bits(),
    );
}

/// Which primitive pool a blocked task's `resource` handle refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Mailbox,
    Queue,
    Semaphore,
    Flags,
    Mutex,
}

/// Opaque handle to the primitive instance a task is blocked on. Used
/// on sleep-timeout to dispatch back into that primitive's
/// `blocked_timeout` to evict the stale waiter entry.
///
/// A tagged `{kind, index}` pair rather than a raw pointer, per the
/// "raw pointers between primitives and scheduler" redesign: the
/// scheduler never needs to know a primitive's concrete type, only how
/// to route `(kind, index)` to the right cleanup function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceHandle {
    pub kind: ResourceKind,
    pub index: usize,
}

/// Last reason a task transitioned to runnable. Read via
/// `Scheduler::get_wake_reason`, which atomically resets it to
/// `NoWakeupSinceLastCheck`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeReason {
    NoWakeupSinceLastCheck,
    SleepTimeout,
    MboxReady,
    QueueReady,
    SemaReady,
    MutexReady,
    /// Event-flags post: carries the flags byte observed at wake time,
    /// not a symbolic code, so the waker can report what fired.
    FlagsEvent(u8),
    FlagsCleared,
}

pub type TaskId = usize;

/// Task Control Block.
pub struct Tcb {
    /// Saved stack pointer. Must remain the first field (port ABI).
    pub stack_pointer: *mut u32,
    /// Base of the task's externally-allocated stack (lowest address),
    /// for optional overflow detection.
    pub stack_base: *mut u32,
    pub stack_size: usize,

    /// Index into the TCB table; equals priority at creation time.
    pub task_id: TaskId,
    /// Current effective priority (diverges from `task_id` only under
    /// mutex priority inheritance).
    pub priority: u8,
    pub flags: TaskFlags,
    /// Ticks remaining until wake; 0 when not sleeping.
    pub sleep_counter: u32,
    /// Set iff exactly one `BLOCKED_ON_*` bit is set.
    pub resource: Option<ResourceHandle>,
    pub wake_reason: WakeReason,

    /// Whether this table slot holds a live task.
    pub active: bool,
}

// Safety: `stack_pointer`/`stack_base` always reference either null (an
// unallocated slot) or memory the owning task exclusively uses; all
// kernel access to a `Tcb` happens inside a critical section.
unsafe impl Send for Tcb {}
unsafe impl Sync for Tcb {}

impl Tcb {
    pub const EMPTY: Tcb = Tcb {
        stack_pointer: core::ptr::null_mut(),
        stack_base: core::ptr::null_mut(),
        stack_size: 0,
        task_id: 0,
        priority: 0,
        flags: TaskFlags::SUSPENDED,
        sleep_counter: 0,
        resource: None,
        wake_reason: WakeReason::NoWakeupSinceLastCheck,
        active: false,
    };

    /// Initialize a freshly reserved slot. The stack frame itself is
    /// fabricated separately by `scheduler::init_task_stack`.
    pub fn init(&mut self, task_id: TaskId, priority: u8, stack_base: *mut u32, stack_size: usize) {
        self.stack_pointer = core::ptr::null_mut();
        self.stack_base = stack_base;
        self.stack_size = stack_size;
        self.task_id = task_id;
        self.priority = priority;
        self.flags = TaskFlags::empty();
        self.sleep_counter = 0;
        self.resource = None;
        self.wake_reason = WakeReason::NoWakeupSinceLastCheck;
        self.active = true;
    }

    /// A task is runnable iff it is allocated and its flags are empty.
    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.active && self.flags.is_empty()
    }

    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.flags.intersects(TaskFlags::BLOCKED_MASK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tcb_is_not_runnable() {
        let tcb = Tcb::EMPTY;
        assert!(!tcb.active);
        assert!(!tcb.is_runnable());
    }

    #[test]
    fn init_sets_runnable_state() {
        let mut tcb = Tcb::EMPTY;
        tcb.init(2, 2, core::ptr::null_mut(), 256);
        assert!(tcb.active);
        assert!(tcb.is_runnable());
        assert_eq!(tcb.priority, 2);
        assert_eq!(tcb.task_id, 2);
    }

    #[test]
    fn blocked_flag_detection() {
        let mut tcb = Tcb::EMPTY;
        tcb.init(0, 0, core::ptr::null_mut(), 256);
        assert!(!tcb.is_blocked());
        tcb.flags |= TaskFlags::BLOCKED_ON_SEMA;
        assert!(tcb.is_blocked());
        assert!(!tcb.is_runnable());
    }

    #[test]
    fn wake_reason_carries_flags_snapshot() {
        let reason = WakeReason::FlagsEvent(0x05);
        assert_eq!(reason, WakeReason::FlagsEvent(0x05));
        assert_ne!(reason, WakeReason::FlagsEvent(0x04));
    }
}
