//! # Kernel configuration
//!
//! Compile-time constants governing kernel and primitive sizing. All
//! limits are fixed at compile time — no dynamic allocation.

/// Maximum number of tasks the system can manage, including the idle
/// task. Bounds the static TCB table.
pub const MAX_TASKS: usize = 8;

/// SysTick frequency in Hz. Determines scheduler tick granularity.
pub const TICK_HZ: u32 = 1000;

/// Per-task stack size in bytes, for stacks allocated by the demo
/// application. The kernel itself does not own task stack memory (the
/// linker-provided stack is an external collaborator per the kernel's
/// scope) — this constant sizes the `demos/` example's static arrays.
pub const STACK_SIZE: usize = 1024;

/// System clock frequency in Hz (default for STM32F4-class parts at
/// 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

/// Number of semaphore objects in the static semaphore pool.
pub const NUM_SEMAPHORES: usize = 4;

/// Maximum tasks that may simultaneously block on one semaphore.
pub const MAX_BLOCKED_PER_SEMA: usize = 4;

/// Number of mailbox objects in the static mailbox pool.
pub const NUM_MAILBOXES: usize = 3;

/// Number of queue objects in the static queue pool.
pub const NUM_QUEUES: usize = 2;

/// Ring length of each queue, including the one always-sacrificed slot
/// that disambiguates full from empty. Usable capacity is
/// `QUEUE_LENGTH - 1`.
pub const QUEUE_LENGTH: usize = 10;

/// Maximum tasks that may simultaneously block on one queue.
pub const MAX_BLOCKED_PER_QUEUE: usize = 4;

/// Number of event-flag group objects in the static flags pool.
pub const NUM_FLAG_GROUPS: usize = 2;

/// Maximum tasks that may simultaneously pend on one flag group.
pub const MAX_BLOCKED_PER_FLAGS: usize = 4;

/// Number of mutex objects in the static mutex pool.
pub const NUM_MUTEXES: usize = 2;

/// Maximum tasks that may simultaneously block on one mutex.
pub const MAX_BLOCKED_PER_MUTEX: usize = 4;
