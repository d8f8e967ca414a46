//! # Kernel
//!
//! Top-level kernel state and the public API applications call. Owns the
//! global `Scheduler` plus one static pool per synchronization primitive,
//! and is the only place that holds `&mut Scheduler` and `&mut <pool>`
//! simultaneously — every blocking primitive call's register-then-sleep
//! protocol is orchestrated here; the primitive
//! modules themselves only ever touch their own state plus a borrowed
//! `Scheduler` for priority lookups and wake notifications.
//!
//! ## Startup sequence
//!
//! ```text
//! reset_handler (cortex-m-rt)
//!   └─► main()
//!         ├─► kernel::init()        ← construct the global Kernel
//!         ├─► kernel::create_task() ← register tasks (×N)
//!         └─► kernel::start()       ← launch scheduler (no return)
//!               ├─► program the tick source
//!               ├─► create the idle task
//!               └─► start_first_task() via arch::start_first_task()
//! ```

use crate::config::{NUM_FLAG_GROUPS, NUM_MAILBOXES, NUM_MUTEXES, NUM_QUEUES, NUM_SEMAPHORES};
#[cfg(feature = "cortex-m4")]
use crate::config::TICK_HZ;
use crate::error::Error;
use crate::flags::Flags;
#[cfg(feature = "flags")]
use crate::flags::{MatchMode, PostCommand};
use crate::mailbox::Mailbox;
use crate::mutex::Mutex;
#[cfg(feature = "mutex")]
use crate::mutex::LockStatus;
use crate::queue::Queue;
#[cfg(feature = "queue")]
use crate::queue::QueueStatus;
use crate::scheduler::{Scheduler, TimeoutDispatch};
use crate::semaphore::Semaphore;
#[cfg(feature = "semaphore")]
use crate::semaphore::WaitStatus as SemaStatus;
use crate::sync;
use crate::task::{ResourceHandle, ResourceKind, TaskId, WakeReason};

// ---------------------------------------------------------------------------
// Global kernel instance
// ---------------------------------------------------------------------------

static mut KERNEL: Kernel = Kernel::new();

/// Raw pointer to the global scheduler, set by `init()`. Read from ISR
/// context (`arch::cortex_m4`'s PendSV/SysTick handlers) which cannot
/// easily thread a reference through the trap's asm entry.
#[no_mangle]
pub static mut SCHEDULER_PTR: *mut Scheduler = core::ptr::null_mut();

/// Single point of `&raw mut` access to the global kernel. Every other
/// function below goes through this instead of naming `KERNEL` directly,
/// so there is exactly one place the 2024-edition "mutable reference to
/// mutable static" pattern is spelled out.
#[allow(clippy::deref_addrof)] // the `&raw mut` dance is the fix for static-mut-ref, not a mistake
fn kernel() -> &'static mut Kernel {
    unsafe { &mut *&raw mut KERNEL }
}

/// Aggregate kernel state: the scheduler plus one static pool per
/// primitive family. All pools are present regardless of which
/// `semaphore`/`mailbox`/`queue`/`flags`/`mutex` Cargo features are
/// enabled — only the application-facing wrapper methods below are
/// feature-gated, so disabling a family compiles out its call surface
/// without complicating the cross-pool borrow split every blocking call
/// needs (see `split`).
pub struct Kernel {
    scheduler: Scheduler,
    semaphores: [Semaphore; NUM_SEMAPHORES],
    mailboxes: [Mailbox; NUM_MAILBOXES],
    queues: [Queue; NUM_QUEUES],
    flag_groups: [Flags; NUM_FLAG_GROUPS],
    mutexes: [Mutex; NUM_MUTEXES],
}

/// Borrows every primitive pool, never the scheduler itself, so it can
/// be handed to `Scheduler::sleep`/`on_tick` as a `&mut dyn TimeoutDispatch`
/// argument from inside a call that already holds `&mut Scheduler` as a
/// disjoint field of the same `Kernel`.
struct PoolsTimeout<'a> {
    semaphores: &'a mut [Semaphore; NUM_SEMAPHORES],
    mailboxes: &'a mut [Mailbox; NUM_MAILBOXES],
    queues: &'a mut [Queue; NUM_QUEUES],
    flag_groups: &'a mut [Flags; NUM_FLAG_GROUPS],
    mutexes: &'a mut [Mutex; NUM_MUTEXES],
}

impl<'a> TimeoutDispatch for PoolsTimeout<'a> {
    fn blocked_timeout(&mut self, handle: ResourceHandle, task: TaskId, scheduler: &mut Scheduler) {
        match handle.kind {
            ResourceKind::Semaphore => self.semaphores[handle.index].blocked_timeout(task),
            ResourceKind::Mailbox => self.mailboxes[handle.index].blocked_timeout(),
            ResourceKind::Queue => self.queues[handle.index].blocked_timeout(task),
            ResourceKind::Flags => self.flag_groups[handle.index].blocked_timeout(task),
            ResourceKind::Mutex => self.mutexes[handle.index].blocked_timeout(task, scheduler),
        }
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel {
    pub const fn new() -> Self {
        Self {
            scheduler: Scheduler::new(),
            semaphores: [Semaphore::new(0); NUM_SEMAPHORES],
            mailboxes: [Mailbox::new(); NUM_MAILBOXES],
            queues: [Queue::new(); NUM_QUEUES],
            flag_groups: [Flags::new(0); NUM_FLAG_GROUPS],
            mutexes: [Mutex::new(); NUM_MUTEXES],
        }
    }

    /// Splits `self` into the scheduler and a `TimeoutDispatch` over every
    /// pool, as two independent `&mut` borrows of disjoint fields. Used by
    /// every entry point that doesn't also need a specific pool slot
    /// (`tick_isr`, `yield_task`, `sleep`, `suspend`); the primitive
    /// wrapper methods below do the same field-split by hand so they can
    /// also index their own pool before and after the blocking call.
    fn split(&mut self) -> (&mut Scheduler, PoolsTimeout<'_>) {
        let Kernel { scheduler, semaphores, mailboxes, queues, flag_groups, mutexes } = self;
        (scheduler, PoolsTimeout { semaphores, mailboxes, queues, flag_groups, mutexes })
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Resets the global kernel and publishes `SCHEDULER_PTR` for ISR access.
/// Must be called exactly once, before any other kernel function.
pub fn init() {
    unsafe {
        KERNEL = Kernel::new();
        SCHEDULER_PTR = &raw mut kernel().scheduler;
    }
    log::info!("kernel initialized");
}

/// Entry point for data-corruption/impossible-state errors detected
/// anywhere in the kernel or a primitive (an out-of-range enum
/// discriminant, a lock byte outside `{0, 1}`). Never returns. An
/// application may shadow this behavior by installing its own
/// `#[panic_handler]`; by default `error::fault` panics and, on
/// `cortex-m4` builds, `panic-halt` turns that into an infinite loop.
#[cold]
pub fn fault_hook(reason: &str) -> ! {
    crate::error::fault(reason)
}

/// Reserves a TCB slot and fabricates its initial saved context. Not
/// callable after `start`.
pub fn create_task(
    entry: extern "C" fn() -> !,
    stack_base: *mut u32,
    stack_size: usize,
) -> Result<TaskId, Error> {
    sync::critical_section(|| kernel().scheduler.create_task(entry, stack_base, stack_size))
}

#[cfg(feature = "cortex-m4")]
extern "C" fn idle_task() -> ! {
    crate::arch::idle_loop()
}

/// Programs the tick source, creates the idle task, and launches the
/// first task. Never returns.
#[cfg(feature = "cortex-m4")]
pub fn start() -> ! {
    let idle_sp = sync::critical_section(|| {
        crate::arch::init_tick(TICK_HZ);
        kernel().scheduler.start(idle_task, core::ptr::null_mut(), 0)
    });
    log::info!("kernel started");
    unsafe { crate::arch::start_first_task(idle_sp) }
}

/// SysTick entry point: advances the tick counter and runs the dispatch
/// algorithm over every pool's timeout eviction.
pub fn tick_isr() {
    sync::critical_section(|| {
        let (scheduler, mut timeout) = kernel().split();
        scheduler.on_tick(&mut timeout);
    });
}

// ---------------------------------------------------------------------------
// Scheduler-facing API
// ---------------------------------------------------------------------------

/// `ticks == 0` is a pure yield, per `Scheduler::sleep`.
pub fn sleep(ticks: u32) {
    sync::critical_section(|| {
        let (scheduler, mut timeout) = kernel().split();
        scheduler.sleep(ticks, &mut timeout);
    });
}

pub fn yield_task() {
    sync::critical_section(|| {
        let (scheduler, mut timeout) = kernel().split();
        scheduler.yield_current(&mut timeout);
    });
}

pub fn suspend(task_id: TaskId) {
    sync::critical_section(|| {
        let (scheduler, mut timeout) = kernel().split();
        scheduler.suspend(task_id, &mut timeout);
    });
}

pub fn wake(task_id: TaskId) {
    sync::critical_section(|| kernel().scheduler.wake(task_id));
}

pub fn get_ticks() -> u64 {
    sync::critical_section(|| kernel().scheduler.get_ticks())
}

pub fn get_current_task() -> TaskId {
    sync::critical_section(|| kernel().scheduler.get_current_task())
}

pub fn get_wake_reason() -> WakeReason {
    sync::critical_section(|| kernel().scheduler.get_wake_reason())
}

// ---------------------------------------------------------------------------
// Semaphore
// ---------------------------------------------------------------------------

#[cfg(feature = "semaphore")]
impl Kernel {
    fn semaphore_wait(&mut self, id: usize, block_ticks: u32) -> SemaStatus {
        let Kernel { scheduler, semaphores, mailboxes, queues, flag_groups, mutexes } = self;
        let status = semaphores[id].try_take();
        if status == SemaStatus::Success || block_ticks == 0 {
            return status;
        }

        let cur = scheduler.get_current_task();
        if semaphores[id].enqueue_waiter(cur, scheduler).is_err() {
            log::warn!("semaphore {} pend list full", id);
            return SemaStatus::Taken;
        }
        scheduler.set_reason_for_sleep(ResourceHandle { kind: ResourceKind::Semaphore, index: id });
        let mut timeout = PoolsTimeout { semaphores, mailboxes, queues, flag_groups, mutexes };
        scheduler.sleep(block_ticks, &mut timeout);
        timeout.semaphores[id].retry_after_wake()
    }

    fn semaphore_post(&mut self, id: usize) {
        let Kernel { scheduler, semaphores, .. } = self;
        semaphores[id].post(scheduler);
    }
}

#[cfg(feature = "semaphore")]
pub fn semaphore_wait(id: usize, block_ticks: u32) -> SemaStatus {
    sync::critical_section(|| kernel().semaphore_wait(id, block_ticks))
}

#[cfg(feature = "semaphore")]
pub fn semaphore_post(id: usize) {
    sync::critical_section(|| kernel().semaphore_post(id));
}

#[cfg(feature = "semaphore")]
pub fn semaphore_check(id: usize) -> SemaStatus {
    sync::critical_section(|| kernel().semaphores[id].check())
}

// ---------------------------------------------------------------------------
// Mailbox
// ---------------------------------------------------------------------------

#[cfg(feature = "mailbox")]
impl Kernel {
    fn mailbox_get(&mut self, id: usize, block_ticks: u32, err: &mut Option<Error>) -> Option<u32> {
        *err = None;
        let Kernel { scheduler, semaphores, mailboxes, queues, flag_groups, mutexes } = self;

        if !mailboxes[id].try_acquire_guard() {
            *err = Some(Error::InUse);
        } else if let Some(value) = mailboxes[id].take_value(scheduler) {
            mailboxes[id].release_guard(scheduler);
            return Some(value);
        } else {
            *err = Some(Error::Empty);
            mailboxes[id].release_guard(scheduler);
        }

        if block_ticks == 0 {
            return None;
        }

        let cur = scheduler.get_current_task();
        mailboxes[id].record_waiter(cur);
        scheduler.set_reason_for_sleep(ResourceHandle { kind: ResourceKind::Mailbox, index: id });
        let mut timeout = PoolsTimeout { semaphores, mailboxes, queues, flag_groups, mutexes };
        scheduler.sleep(block_ticks, &mut timeout);

        if !timeout.mailboxes[id].try_acquire_guard() {
            *err = Some(Error::InUse);
            return None;
        }
        let value = timeout.mailboxes[id].take_value(scheduler);
        timeout.mailboxes[id].release_guard(scheduler);
        if value.is_none() {
            *err = Some(Error::Empty);
        }
        value
    }

    fn mailbox_send(&mut self, id: usize, value: u32, block_ticks: u32, err: &mut Option<Error>) -> bool {
        *err = None;
        let Kernel { scheduler, semaphores, mailboxes, queues, flag_groups, mutexes } = self;

        if !mailboxes[id].try_acquire_guard() {
            *err = Some(Error::InUse);
        } else if mailboxes[id].peek() != 0 {
            *err = Some(Error::Full);
            mailboxes[id].release_guard(scheduler);
        } else {
            let ok = mailboxes[id].store_value(value, scheduler);
            mailboxes[id].release_guard(scheduler);
            return ok;
        }

        if block_ticks == 0 {
            return false;
        }

        let cur = scheduler.get_current_task();
        mailboxes[id].record_waiter(cur);
        scheduler.set_reason_for_sleep(ResourceHandle { kind: ResourceKind::Mailbox, index: id });
        let mut timeout = PoolsTimeout { semaphores, mailboxes, queues, flag_groups, mutexes };
        scheduler.sleep(block_ticks, &mut timeout);

        if !timeout.mailboxes[id].try_acquire_guard() {
            *err = Some(Error::InUse);
            return false;
        }
        if timeout.mailboxes[id].peek() != 0 {
            *err = Some(Error::Full);
            timeout.mailboxes[id].release_guard(scheduler);
            return false;
        }
        let ok = timeout.mailboxes[id].store_value(value, scheduler);
        timeout.mailboxes[id].release_guard(scheduler);
        ok
    }
}

#[cfg(feature = "mailbox")]
pub fn mailbox_get(id: usize, block_ticks: u32, err: &mut Option<Error>) -> Option<u32> {
    sync::critical_section(|| kernel().mailbox_get(id, block_ticks, err))
}

#[cfg(feature = "mailbox")]
pub fn mailbox_send(id: usize, value: u32, block_ticks: u32, err: &mut Option<Error>) -> bool {
    sync::critical_section(|| kernel().mailbox_send(id, value, block_ticks, err))
}

#[cfg(feature = "mailbox")]
pub fn mailbox_peek(id: usize) -> u32 {
    sync::critical_section(|| kernel().mailboxes[id].peek())
}

#[cfg(feature = "mailbox")]
pub fn mailbox_clear(id: usize) {
    sync::critical_section(|| {
        let Kernel { scheduler, mailboxes, .. } = kernel();
        mailboxes[id].clear(scheduler);
    });
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

#[cfg(feature = "queue")]
impl Kernel {
    fn queue_put(&mut self, id: usize, value: u32, block_ticks: u32, err: &mut Option<Error>) -> bool {
        *err = None;
        let Kernel { scheduler, semaphores, mailboxes, queues, flag_groups, mutexes } = self;

        if !queues[id].try_acquire_guard() {
            *err = Some(Error::InUse);
        } else if queues[id].status() == QueueStatus::Full {
            *err = Some(Error::Full);
            queues[id].release_guard(scheduler);
        } else {
            let ok = queues[id].try_put(value, scheduler);
            queues[id].release_guard(scheduler);
            return ok;
        }

        if block_ticks == 0 {
            return false;
        }

        let cur = scheduler.get_current_task();
        queues[id].record_waiter(cur);
        scheduler.set_reason_for_sleep(ResourceHandle { kind: ResourceKind::Queue, index: id });
        let mut timeout = PoolsTimeout { semaphores, mailboxes, queues, flag_groups, mutexes };
        scheduler.sleep(block_ticks, &mut timeout);

        if !timeout.queues[id].try_acquire_guard() {
            *err = Some(Error::InUse);
            return false;
        }
        if timeout.queues[id].status() == QueueStatus::Full {
            *err = Some(Error::Full);
            timeout.queues[id].release_guard(scheduler);
            return false;
        }
        let ok = timeout.queues[id].try_put(value, scheduler);
        timeout.queues[id].release_guard(scheduler);
        ok
    }

    fn queue_get(&mut self, id: usize, block_ticks: u32, err: &mut Option<Error>) -> Option<u32> {
        *err = None;
        let Kernel { scheduler, semaphores, mailboxes, queues, flag_groups, mutexes } = self;

        if !queues[id].try_acquire_guard() {
            *err = Some(Error::InUse);
        } else if queues[id].status() == QueueStatus::Empty {
            *err = Some(Error::Empty);
            queues[id].release_guard(scheduler);
        } else {
            let value = queues[id].try_get(scheduler);
            queues[id].release_guard(scheduler);
            return value;
        }

        if block_ticks == 0 {
            return None;
        }

        let cur = scheduler.get_current_task();
        queues[id].record_waiter(cur);
        scheduler.set_reason_for_sleep(ResourceHandle { kind: ResourceKind::Queue, index: id });
        let mut timeout = PoolsTimeout { semaphores, mailboxes, queues, flag_groups, mutexes };
        scheduler.sleep(block_ticks, &mut timeout);

        if !timeout.queues[id].try_acquire_guard() {
            *err = Some(Error::InUse);
            return None;
        }
        if timeout.queues[id].status() == QueueStatus::Empty {
            *err = Some(Error::Empty);
            timeout.queues[id].release_guard(scheduler);
            return None;
        }
        let value = timeout.queues[id].try_get(scheduler);
        timeout.queues[id].release_guard(scheduler);
        value
    }
}

#[cfg(feature = "queue")]
pub fn queue_put(id: usize, value: u32, block_ticks: u32, err: &mut Option<Error>) -> bool {
    sync::critical_section(|| kernel().queue_put(id, value, block_ticks, err))
}

#[cfg(feature = "queue")]
pub fn queue_get(id: usize, block_ticks: u32, err: &mut Option<Error>) -> Option<u32> {
    sync::critical_section(|| kernel().queue_get(id, block_ticks, err))
}

#[cfg(feature = "queue")]
pub fn queue_flush(id: usize) {
    sync::critical_section(|| {
        let Kernel { scheduler, queues, .. } = kernel();
        queues[id].flush(scheduler);
    });
}

#[cfg(feature = "queue")]
pub fn queue_status(id: usize) -> QueueStatus {
    sync::critical_section(|| kernel().queues[id].status())
}

#[cfg(feature = "queue")]
pub fn queue_count(id: usize) -> usize {
    sync::critical_section(|| kernel().queues[id].count())
}

// ---------------------------------------------------------------------------
// Event flags
// ---------------------------------------------------------------------------

#[cfg(feature = "flags")]
impl Kernel {
    fn flags_pend(&mut self, id: usize, mask: u8, mode: MatchMode, block_ticks: u32) -> Result<(), Error> {
        let Kernel { scheduler, semaphores, mailboxes, queues, flag_groups, mutexes } = self;
        let cur = scheduler.get_current_task();
        flag_groups[id].pend(mask, mode, cur)?;
        scheduler.set_reason_for_sleep(ResourceHandle { kind: ResourceKind::Flags, index: id });
        let mut timeout = PoolsTimeout { semaphores, mailboxes, queues, flag_groups, mutexes };
        if block_ticks == 0 {
            scheduler.suspend(cur, &mut timeout);
        } else {
            scheduler.sleep(block_ticks, &mut timeout);
        }
        Ok(())
    }
}

#[cfg(feature = "flags")]
pub fn flags_post(id: usize, mask: u8, cmd: PostCommand) {
    sync::critical_section(|| {
        let Kernel { scheduler, flag_groups, .. } = kernel();
        flag_groups[id].post(mask, cmd, scheduler);
    });
}

/// `block_ticks == 0` means indefinite suspend for flags, unlike the
/// other primitives where it means non-blocking — the caller must
/// `flags_check` first if a non-blocking attempt is wanted.
#[cfg(feature = "flags")]
pub fn flags_pend(id: usize, mask: u8, mode: MatchMode, block_ticks: u32) -> Result<(), Error> {
    sync::critical_section(|| kernel().flags_pend(id, mask, mode, block_ticks))
}

#[cfg(feature = "flags")]
pub fn flags_clear_all(id: usize) {
    sync::critical_section(|| kernel().flag_groups[id].clear_all());
}

#[cfg(feature = "flags")]
pub fn flags_reset(id: usize) {
    sync::critical_section(|| {
        let Kernel { scheduler, flag_groups, .. } = kernel();
        flag_groups[id].reset(scheduler);
    });
}

#[cfg(feature = "flags")]
pub fn flags_check(id: usize) -> u8 {
    sync::critical_section(|| kernel().flag_groups[id].check())
}

// ---------------------------------------------------------------------------
// Mutex
// ---------------------------------------------------------------------------

#[cfg(feature = "mutex")]
impl Kernel {
    fn mutex_lock(&mut self, id: usize, block_ticks: u32) -> LockStatus {
        let Kernel { scheduler, semaphores, mailboxes, queues, flag_groups, mutexes } = self;
        let cur = scheduler.get_current_task();
        let status = mutexes[id].try_lock(cur);
        if status == LockStatus::Success || block_ticks == 0 {
            return status;
        }

        if mutexes[id].enqueue_waiter(cur, scheduler).is_err() {
            log::warn!("mutex {} pend list full", id);
            return LockStatus::Taken;
        }
        scheduler.set_reason_for_sleep(ResourceHandle { kind: ResourceKind::Mutex, index: id });
        let mut timeout = PoolsTimeout { semaphores, mailboxes, queues, flag_groups, mutexes };
        scheduler.sleep(block_ticks, &mut timeout);
        timeout.mutexes[id].retry_after_wake(cur)
    }
}

#[cfg(feature = "mutex")]
pub fn mutex_lock(id: usize, block_ticks: u32) -> LockStatus {
    sync::critical_section(|| kernel().mutex_lock(id, block_ticks))
}

#[cfg(feature = "mutex")]
pub fn mutex_unlock(id: usize) -> Result<(), Error> {
    sync::critical_section(|| {
        let Kernel { scheduler, mutexes, .. } = kernel();
        let cur = scheduler.get_current_task();
        mutexes[id].unlock(cur, scheduler)
    })
}

#[cfg(feature = "mutex")]
pub fn mutex_check(id: usize) -> LockStatus {
    sync::critical_section(|| kernel().mutexes[id].check())
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn dummy() -> ! {
        loop {}
    }

    fn boot(n: usize) {
        init();
        for _ in 0..n {
            create_task(dummy, core::ptr::null_mut(), 64).unwrap();
        }
        kernel().scheduler.start(dummy, core::ptr::null_mut(), 64);
    }

    #[test]
    fn semaphore_round_trips_through_the_kernel() {
        boot(1);
        assert_eq!(semaphore_check(0), SemaStatus::Taken);
        semaphore_post(0);
        assert_eq!(semaphore_wait(0, 0), SemaStatus::Success);
    }

    #[test]
    fn mailbox_blocks_then_wakes_through_the_kernel() {
        boot(2);
        let mut err = None;
        assert_eq!(mailbox_get(0, 0, &mut err), None);
        assert_eq!(err, Some(Error::Empty));

        assert!(mailbox_send(0, 7, 0, &mut err));
        assert_eq!(mailbox_get(0, 0, &mut err), Some(7));
    }

    #[test]
    fn queue_put_get_round_trip_through_the_kernel() {
        boot(1);
        let mut err = None;
        assert!(queue_put(0, 42, 0, &mut err));
        assert_eq!(queue_get(0, 0, &mut err), Some(42));
        assert_eq!(queue_status(0), QueueStatus::Empty);
    }

    #[test]
    fn flags_pend_blocks_until_post_satisfies_it() {
        boot(2);
        flags_pend(0, 0x01, MatchMode::Any, 5).unwrap();
        flags_post(0, 0x01, PostCommand::Set);
        assert_eq!(flags_check(0), 0x01);
    }

    #[test]
    fn mutex_lock_unlock_round_trip_through_the_kernel() {
        boot(1);
        assert_eq!(mutex_lock(0, 0), LockStatus::Success);
        assert_eq!(mutex_unlock(0), Ok(()));
        assert_eq!(mutex_unlock(0), Err(Error::AlreadyReleased));
    }
}
