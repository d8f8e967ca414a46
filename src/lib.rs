//! # eqos — a small preemptive, priority-based real-time kernel
//!
//! Targets ARM Cortex-M microcontrollers. Single-CPU, static priorities,
//! no dynamic task creation after `start`, no allocation on any blocking
//! path.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    Application Tasks                    │
//! ├────────────────────────────────────────────────────────┤
//! │                 Kernel API (kernel.rs)                  │
//! │      init() · create_task() · start() · yield_task()   │
//! ├──────────────┬──────────┬──────────┬──────────┬────────┤
//! │  Scheduler   │ semaphore│  mutex   │  mailbox │ queue  │
//! │  scheduler.rs│ flags    │ (priority│          │        │
//! │  ─ on_tick() │          │ inherit.)│          │        │
//! ├──────────────┴──────────┴──────────┴──────────┴────────┤
//! │        Intrusive waiter list (list.rs) · sync.rs        │
//! ├────────────────────────────────────────────────────────┤
//! │            Arch port (arch::cortex_m4 / arch::host)      │
//! │    PendSV · SysTick · Context switch · Stack init        │
//! ├────────────────────────────────────────────────────────┤
//! │         ARM Cortex-M hardware (Thumb-2), or host          │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory model
//!
//! - No heap, no `alloc` — pure `core`.
//! - Fixed-size TCB table (`[Tcb; MAX_TASKS]`) and one static pool per
//!   primitive kind, sized by `config.rs` constants.
//! - All waiter lists are intrusive and array-indexed — no dynamic
//!   allocation on the blocking path.
//! - Mutual exclusion is nested-IRQ critical sections (`sync.rs`).

#![no_std]

pub mod arch;
pub mod config;
pub mod error;
pub mod flags;
pub mod kernel;
pub mod list;
pub mod mailbox;
pub mod mutex;
pub mod queue;
pub mod scheduler;
pub mod semaphore;
pub mod sync;
pub mod task;
