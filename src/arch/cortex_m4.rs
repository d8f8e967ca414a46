//! # Cortex-M4 port
//!
//! Hardware-specific implementation of the CPU port contract: SysTick
//! programming, nested-IRQ primitives, PendSV as the context-switch
//! trap, and initial stack-frame fabrication.
//!
//! ## Context switch mechanism
//!
//! The Cortex-M4 uses a split-stack model: MSP for the kernel/interrupt
//! handlers, PSP for tasks in Thread mode. On exception entry the
//! hardware automatically stacks R0-R3, R12, LR, PC, xPSR; `PendSV`
//! manually saves/restores R4-R11, completing the full context.
//!
//! `PendSV` only moves registers here: the scheduler's dispatch
//! algorithm has already decided the winner (synchronously, at the call
//! site that triggered the trap) and staged it in
//! `current_tcb_ptr`/`next_tcb_ptr`.

use cortex_m::peripheral::syst::SystClkSource;
use core::arch::{asm, naked_asm};

use crate::config::SYSTEM_CLOCK_HZ;

// ---------------------------------------------------------------------------
// Tick source + interrupt priorities
// ---------------------------------------------------------------------------

/// Programs SysTick for the scheduler tick and sets SysTick/PendSV to
/// the lowest interrupt priority, so the context switch never preempts
/// other device ISRs and SysTick cannot be preempted by PendSV.
pub fn init_tick(tick_hz: u32) {
    let mut core_peripherals = unsafe { cortex_m::Peripherals::steal() };
    let reload = SYSTEM_CLOCK_HZ / tick_hz.max(1) - 1;
    core_peripherals.SYST.set_reload(reload);
    core_peripherals.SYST.clear_current();
    core_peripherals.SYST.set_clock_source(SystClkSource::Core);
    core_peripherals.SYST.enable_counter();
    core_peripherals.SYST.enable_interrupt();

    unsafe {
        // SHPR3: bits [23:16] = PendSV priority, [31:24] = SysTick priority.
        let shpr3: *mut u32 = 0xE000_ED20 as *mut u32;
        let val = core::ptr::read_volatile(shpr3);
        core::ptr::write_volatile(shpr3, val | (0xFF << 16) | (0xC0 << 24));
    }
}

// ---------------------------------------------------------------------------
// Nested critical sections
// ---------------------------------------------------------------------------

pub fn raw_disable_irq() {
    cortex_m::interrupt::disable();
}

pub fn raw_enable_irq() {
    unsafe {
        cortex_m::interrupt::enable();
    }
}

/// Raises BASEPRI to the tick priority so other (higher-priority) ISRs
/// keep firing while the scheduler tick/dispatch cannot re-enter.
/// Returns the previous BASEPRI value to restore.
pub fn mask_tick() -> u8 {
    let prev = cortex_m::register::basepri::read();
    unsafe {
        cortex_m::register::basepri::write(0xC0);
    }
    prev
}

pub fn unmask_tick(prev: u8) {
    unsafe {
        cortex_m::register::basepri::write(prev);
    }
}

// ---------------------------------------------------------------------------
// Context-switch trap
// ---------------------------------------------------------------------------

/// Raise PendSV (PENDSVSET in ICSR) to request a context switch.
#[inline]
pub fn trigger_dispatcher() {
    const ICSR: *mut u32 = 0xE000_ED04 as *mut u32;
    unsafe {
        core::ptr::write_volatile(ICSR, 1 << 28);
    }
}

/// PendSV exception handler. Saves R4-R11 onto the outgoing task's
/// stack (`current_tcb_ptr`), loads them from the incoming task's stack
/// (`next_tcb_ptr`), and returns into it. Does not decide who runs —
/// the scheduler already staged both pointers before raising this trap.
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn PendSV() -> ! {
    naked_asm!(
        "mrs r0, psp",
        "stmdb r0!, {{r4-r11}}",
        "bl {save_outgoing}",
        "bl {load_incoming}",
        "ldmia r0!, {{r4-r11}}",
        "msr psp, r0",
        "ldr r0, =0xFFFFFFFD",
        "bx r0",
        save_outgoing = sym save_outgoing_sp,
        load_incoming = sym load_incoming_sp,
    );
}

#[no_mangle]
unsafe extern "C" fn save_outgoing_sp(psp: *mut u32) {
    let scheduler = &mut *crate::kernel::SCHEDULER_PTR;
    if !scheduler.current_tcb_ptr.is_null() {
        (*scheduler.current_tcb_ptr).stack_pointer = psp;
    }
}

#[no_mangle]
unsafe extern "C" fn load_incoming_sp() -> *mut u32 {
    let scheduler = &mut *crate::kernel::SCHEDULER_PTR;
    (*scheduler.next_tcb_ptr).stack_pointer
}

// ---------------------------------------------------------------------------
// SysTick handler
// ---------------------------------------------------------------------------

#[no_mangle]
pub unsafe extern "C" fn SysTick() {
    crate::kernel::tick_isr();
}

// ---------------------------------------------------------------------------
// First task launch
// ---------------------------------------------------------------------------

/// Switches to PSP and branches into the first task's entry point via a
/// fabricated exception return. Called once from `kernel::start`.
///
/// # Safety
/// Must be called exactly once, with the stack pointer `Scheduler::start`
/// returned.
pub unsafe fn start_first_task(psp: *const u32) -> ! {
    asm!(
        "adds r0, #32",
        "msr psp, r0",
        "movs r0, #2",
        "msr control, r0",
        "isb",
        "pop {{r0-r3, r12}}",
        "pop {{r4}}",
        "pop {{r5}}",
        "pop {{r6}}",
        "cpsie i",
        "bx r5",
        in("r0") psp,
        options(noreturn)
    );
}

// ---------------------------------------------------------------------------
// Stack frame fabrication
// ---------------------------------------------------------------------------

/// Fabricates the initial saved-context frame on `[stack_base,
/// stack_base + stack_size)` so the first switch to this task resumes
/// execution at `entry`. Layout: 8 software-saved registers (R4-R11)
/// below the hardware-stacked exception frame (R0-R3, R12, LR, PC,
/// xPSR).
pub fn init_stack(entry: extern "C" fn() -> !, stack_base: *mut u32, stack_size: usize) -> *mut u32 {
    let stack_top = stack_base as usize + stack_size;
    let aligned_top = stack_top & !0x07;
    let frame_ptr = (aligned_top - 16 * 4) as *mut u32;

    unsafe {
        for i in 0..8 {
            *frame_ptr.add(i) = 0; // R4..R11
        }
        *frame_ptr.add(8) = 0; // R0
        *frame_ptr.add(9) = 0; // R1
        *frame_ptr.add(10) = 0; // R2
        *frame_ptr.add(11) = 0; // R3
        *frame_ptr.add(12) = 0; // R12
        *frame_ptr.add(13) = crate::scheduler::task_exit as u32; // LR
        *frame_ptr.add(14) = entry as u32; // PC
        *frame_ptr.add(15) = 0x0100_0000; // xPSR, Thumb bit set
    }

    frame_ptr
}

pub fn idle_loop() -> ! {
    loop {
        cortex_m::asm::wfi();
    }
}
