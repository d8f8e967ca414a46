//! # Scheduler
//!
//! Core preemptive, priority-based dispatch. Every scheduler entry point
//! (tick, sleep, yield, suspend, wake) runs the same dispatch algorithm
//! under a critical section (see `sync::critical_section`, applied by
//! the `kernel` module's public wrappers) and, when the winning task
//! differs from the one currently recorded as running, stages
//! `current_tcb_ptr`/`next_tcb_ptr` and raises the context-switch trap.
//! The trap itself only moves registers; it never re-decides who runs.
//!
use crate::config::MAX_TASKS;
use crate::task::{ResourceHandle, ResourceKind, TaskFlags, TaskId, Tcb, WakeReason};

/// Routes a sleep-timeout eviction back to the primitive a task was
/// blocked on. Implemented once, by the top-level `Kernel` struct in
/// `kernel.rs`, which owns every primitive's object pool — a per-kind
/// dispatch table expressed as a trait rather than raw function
/// pointers.
pub trait TimeoutDispatch {
    fn blocked_timeout(&mut self, handle: ResourceHandle, task: TaskId, scheduler: &mut Scheduler);
}

/// A `TimeoutDispatch` that does nothing; used in host tests that only
/// exercise bookkeeping unrelated to any primitive's waiter list.
pub struct NoTimeouts;
impl TimeoutDispatch for NoTimeouts {
    fn blocked_timeout(&mut self, _handle: ResourceHandle, _task: TaskId, _scheduler: &mut Scheduler) {}
}

pub struct Scheduler {
    pub tasks: [Tcb; MAX_TASKS],
    pub num_tasks: usize,
    pub current_task_idx: TaskId,
    pub tick_counter: u64,
    tick_flag: bool,
    started: bool,

    /// Read by the context-switch trap: outgoing task's TCB (save SP
    /// into it) and incoming task's TCB (load SP from it). Layout is
    /// fixed by the port ABI, not by Rust struct order, so these are
    /// plain raw pointers rather than references.
    pub current_tcb_ptr: *mut Tcb,
    pub next_tcb_ptr: *mut Tcb,
}

// Safety: all access happens inside a critical section (see `sync`), or
// from the context-switch trap with interrupts already serialized.
unsafe impl Send for Scheduler {}
unsafe impl Sync for Scheduler {}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub const fn new() -> Self {
        Self {
            tasks: [Tcb::EMPTY; MAX_TASKS],
            num_tasks: 0,
            current_task_idx: 0,
            tick_counter: 0,
            tick_flag: false,
            started: false,
            current_tcb_ptr: core::ptr::null_mut(),
            next_tcb_ptr: core::ptr::null_mut(),
        }
    }

    /// Index one past the last application task; the idle task always
    /// occupies this slot once `start` has run.
    fn idle_idx(&self) -> TaskId {
        self.num_tasks.saturating_sub(1)
    }

    /// Reserve TCB slot `self.num_tasks`, fabricating the initial saved
    /// context so the dispatcher's first switch to it begins executing
    /// `entry`. Fails with `CreateDenied` once the table is full or
    /// after `start`.
    pub fn create_task(
        &mut self,
        entry: extern "C" fn() -> !,
        stack_base: *mut u32,
        stack_size: usize,
    ) -> Result<TaskId, crate::error::Error> {
        if self.started || self.num_tasks >= MAX_TASKS {
            log::warn!("create_task denied: started={} num_tasks={}", self.started, self.num_tasks);
            return Err(crate::error::Error::CreateDenied);
        }

        let id = self.num_tasks;
        let priority = id as u8;
        self.tasks[id].init(id, priority, stack_base, stack_size);
        self.tasks[id].stack_pointer = crate::arch::init_stack(entry, stack_base, stack_size);
        self.num_tasks += 1;
        log::debug!("task {} created at priority {}", id, priority);
        Ok(id)
    }

    /// Creates the idle task in the last slot, marks the scheduler
    /// started (closing `create_task`), and selects the first task to
    /// run. Returns its stack pointer for the port to jump to; never
    /// returns control to the caller on real hardware.
    pub fn start(&mut self, idle_entry: extern "C" fn() -> !, idle_stack_base: *mut u32, idle_stack_size: usize) -> *const u32 {
        let idle_id = self.num_tasks;
        let idle_priority = idle_id as u8;
        self.tasks[idle_id].init(idle_id, idle_priority, idle_stack_base, idle_stack_size);
        self.tasks[idle_id].stack_pointer = crate::arch::init_stack(idle_entry, idle_stack_base, idle_stack_size);
        self.num_tasks += 1;
        self.started = true;

        self.current_task_idx = self.choose_winner().unwrap_or(idle_id);
        self.tasks[self.current_task_idx].stack_pointer
    }

    /// Scheduler tick entry point. Sets the tick flag, advances the
    /// tick counter, and runs the dispatch algorithm. The caller
    /// (`kernel`'s SysTick handler) wraps this in a tick-masking
    /// critical section.
    pub fn on_tick(&mut self, timeout: &mut dyn TimeoutDispatch) {
        self.tick_flag = true;
        self.tick_counter = self.tick_counter.wrapping_add(1);
        self.dispatch(timeout);
    }

    /// `sleep(0)` is a pure yield per spec; both paths run the dispatch
    /// algorithm.
    pub fn sleep(&mut self, ticks: u32, timeout: &mut dyn TimeoutDispatch) {
        if ticks == 0 {
            self.yield_current(timeout);
            return;
        }
        let cur = self.current_task_idx;
        self.tasks[cur].flags.insert(TaskFlags::SLEEP);
        self.tasks[cur].sleep_counter = ticks;
        self.dispatch(timeout);
    }

    pub fn yield_current(&mut self, timeout: &mut dyn TimeoutDispatch) {
        let cur = self.current_task_idx;
        self.tasks[cur].flags.insert(TaskFlags::YIELD);
        self.dispatch(timeout);
    }

    pub fn suspend(&mut self, task_id: TaskId, timeout: &mut dyn TimeoutDispatch) {
        self.tasks[task_id].flags.insert(TaskFlags::SUSPENDED);
        if task_id == self.current_task_idx {
            self.dispatch(timeout);
        }
    }

    /// Clears SLEEP/SUSPENDED and wakes `task_id`. If its priority is
    /// higher (numerically lower) than the currently running task's,
    /// switches to it directly without re-running the full scan.
    pub fn wake(&mut self, task_id: TaskId) {
        self.tasks[task_id].flags.remove(TaskFlags::SLEEP | TaskFlags::SUSPENDED);
        self.tasks[task_id].sleep_counter = 0;

        let cur = self.current_task_idx;
        if self.tasks[task_id].priority < self.tasks[cur].priority {
            self.switch_to(task_id);
        }
    }

    pub fn set_reason_for_sleep(&mut self, handle: ResourceHandle) {
        let cur = self.current_task_idx;
        self.tasks[cur].resource = Some(handle);
        self.tasks[cur].flags.insert(blocked_flag(handle.kind));
    }

    pub fn set_reason_for_wakeup(&mut self, reason: WakeReason, task_id: TaskId) {
        self.tasks[task_id].flags.remove(TaskFlags::BLOCKED_MASK);
        self.tasks[task_id].resource = None;
        self.tasks[task_id].wake_reason = reason;
    }

    /// Kernel-internal: used by mutex priority inheritance. Returns the
    /// prior priority.
    pub fn set_new_priority(&mut self, task_id: TaskId, new_priority: u8) -> u8 {
        let old = self.tasks[task_id].priority;
        self.tasks[task_id].priority = new_priority;
        old
    }

    pub fn get_ticks(&self) -> u64 {
        self.tick_counter
    }

    pub fn get_current_task(&self) -> TaskId {
        self.current_task_idx
    }

    /// Reads and atomically resets the current task's wake reason.
    pub fn get_wake_reason(&mut self) -> WakeReason {
        let cur = self.current_task_idx;
        let reason = self.tasks[cur].wake_reason;
        self.tasks[cur].wake_reason = WakeReason::NoWakeupSinceLastCheck;
        reason
    }

    pub fn priority_of(&self, task_id: TaskId) -> u8 {
        self.tasks[task_id].priority
    }

    /// The dispatch algorithm: decrement sleepers on a tick, evict
    /// timed-out waiters via `timeout`, scan for the
    /// highest-priority runnable task (lowest-index wins), prefer a
    /// yielder over idle but never over another truly-ready task, then
    /// switch if the winner changed.
    fn dispatch(&mut self, timeout: &mut dyn TimeoutDispatch) {
        if self.tick_flag {
            for i in 0..self.num_tasks {
                if !self.tasks[i].flags.contains(TaskFlags::SLEEP) {
                    continue;
                }
                self.tasks[i].sleep_counter = self.tasks[i].sleep_counter.saturating_sub(1);
                if self.tasks[i].sleep_counter == 0 {
                    if let Some(res) = self.tasks[i].resource.take() {
                        timeout.blocked_timeout(res, i, self);
                    }
                    self.tasks[i].flags.remove(TaskFlags::SLEEP | TaskFlags::BLOCKED_MASK);
                    self.tasks[i].wake_reason = WakeReason::SleepTimeout;
                }
            }
        }

        let winner = self.choose_winner().unwrap_or_else(|| self.idle_idx());
        self.tick_flag = false;

        if winner != self.current_task_idx {
            self.switch_to(winner);
        }
    }

    /// One pass over the TCB table: the first runnable (empty-flags)
    /// task in priority order, with a yield fallback recorded and every
    /// YIELD flag cleared along the way.
    fn choose_winner(&mut self) -> Option<TaskId> {
        let mut winner = None;
        let mut yield_fallback = None;

        for i in 0..self.num_tasks {
            // A YIELD-flagged task's flags are non-empty, so it cannot
            // win via the empty-flags test below; check that first,
            // then clear the one-shot YIELD bit for the next pass.
            let had_yield = self.tasks[i].flags.contains(TaskFlags::YIELD);
            if winner.is_none() && self.tasks[i].is_runnable() {
                winner = Some(i);
            }
            if had_yield {
                if yield_fallback.is_none() {
                    yield_fallback = Some(i);
                }
                self.tasks[i].flags.remove(TaskFlags::YIELD);
            }
        }

        match (winner, yield_fallback) {
            (Some(w), Some(y)) if w == self.idle_idx() => Some(y),
            (Some(w), _) => Some(w),
            (None, Some(y)) => Some(y),
            (None, None) => None,
        }
    }

    fn switch_to(&mut self, winner: TaskId) {
        let cur = self.current_task_idx;
        self.current_tcb_ptr = &mut self.tasks[cur] as *mut Tcb;
        self.next_tcb_ptr = &mut self.tasks[winner] as *mut Tcb;
        self.current_task_idx = winner;
        log::trace!("switch {} -> {}", cur, winner);
        crate::arch::trigger_dispatcher();
    }
}

fn blocked_flag(kind: ResourceKind) -> TaskFlags {
    match kind {
        ResourceKind::Mailbox => TaskFlags::BLOCKED_ON_MBOX,
        ResourceKind::Queue => TaskFlags::BLOCKED_ON_QUEUE,
        ResourceKind::Semaphore => TaskFlags::BLOCKED_ON_SEMA,
        ResourceKind::Flags => TaskFlags::BLOCKED_ON_FLAGS,
        ResourceKind::Mutex => TaskFlags::BLOCKED_ON_MUTEX,
    }
}

/// Fallback for tasks that return; entry functions are `fn() -> !` so
/// this should be unreachable in practice.
pub extern "C" fn task_exit() -> ! {
    crate::arch::idle_loop()
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn dummy_task() -> ! {
        loop {}
    }

    fn boot_scheduler(n: usize) -> Scheduler {
        let mut sched = Scheduler::new();
        for _ in 0..n {
            sched.create_task(dummy_task, core::ptr::null_mut(), 256).unwrap();
        }
        sched.start(dummy_task, core::ptr::null_mut(), 256);
        sched
    }

    #[test]
    fn first_task_created_is_highest_priority_and_runs() {
        let sched = boot_scheduler(3);
        assert_eq!(sched.current_task_idx, 0);
        assert_eq!(sched.idle_idx(), 3);
    }

    #[test]
    fn create_task_denied_after_start() {
        let mut sched = boot_scheduler(1);
        assert_eq!(
            sched.create_task(dummy_task, core::ptr::null_mut(), 256),
            Err(crate::error::Error::CreateDenied)
        );
    }

    #[test]
    fn sleep_then_tick_wakes_on_timeout() {
        let mut sched = boot_scheduler(2);
        let mut nt = NoTimeouts;
        // task 0 sleeps for 2 ticks; task 1 becomes current.
        sched.sleep(2, &mut nt);
        assert_eq!(sched.current_task_idx, 1);

        sched.on_tick(&mut nt); // counter: 1
        assert_eq!(sched.current_task_idx, 1);
        sched.on_tick(&mut nt); // counter: 0 -> task 0 wakes, higher prio, preempts
        assert_eq!(sched.current_task_idx, 0);
    }

    #[test]
    fn yield_prefers_other_ready_task_over_idle() {
        let mut sched = boot_scheduler(1);
        let mut nt = NoTimeouts;
        // only task 0 and idle exist; task 0 yields -> no other ready task -> stays on task 0
        sched.yield_current(&mut nt);
        assert_eq!(sched.current_task_idx, 0);
    }

    #[test]
    fn yield_gives_way_to_other_ready_task() {
        let mut sched = boot_scheduler(2);
        let mut nt = NoTimeouts;
        // suspend task 1 so only task 0 and idle are runnable, then unsuspend via wake path
        sched.suspend(1, &mut nt);
        assert_eq!(sched.current_task_idx, 0);
        sched.wake(1);
        // task1 has lower priority than task0 so no preemption; task0 still current
        assert_eq!(sched.current_task_idx, 0);
        sched.yield_current(&mut nt);
        assert_eq!(sched.current_task_idx, 1);
    }

    #[test]
    fn wake_reason_round_trips_and_resets() {
        let mut sched = boot_scheduler(1);
        sched.set_reason_for_wakeup(WakeReason::SemaReady, 0);
        assert_eq!(sched.get_wake_reason(), WakeReason::SemaReady);
        assert_eq!(sched.get_wake_reason(), WakeReason::NoWakeupSinceLastCheck);
    }

    #[test]
    fn priority_inheritance_primitive_hook() {
        let mut sched = boot_scheduler(2);
        let old = sched.set_new_priority(1, 0);
        assert_eq!(old, 1);
        assert_eq!(sched.priority_of(1), 0);
    }
}
