//! # Critical sections
//!
//! Two forms of mutual exclusion used throughout the kernel:
//!
//! - `critical_section` — full IRQ disable, reentrant via a nesting
//!   counter; interrupts are only actually re-enabled when the
//!   outermost section exits.
//! - `mask_tick` — raises the interrupt-priority mask to the tick
//!   priority so the scheduler cannot re-enter itself while other,
//!   higher-priority device ISRs keep firing; returns the previous mask
//!   for the caller to restore.
//!
//! `TickMaskGuard` is an RAII scope rather than a raw mask/restore pair
//! so a forgotten restore can't leave the tick permanently masked.

use core::sync::atomic::{AtomicU32, Ordering};

static NEST_COUNT: AtomicU32 = AtomicU32::new(0);

/// Execute `f` with interrupts disabled. Reentrant: nested calls only
/// increment/decrement a counter, and interrupts are re-enabled only
/// when the outermost call returns.
#[inline]
pub fn critical_section<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    // IRQs are masked unconditionally, before the counter is touched —
    // disabling an already-disabled IRQ is a no-op, so this is safe to do
    // on every nesting level. The alternative order (bump the counter,
    // then disable) leaves a window where a real interrupt landing
    // between the two steps observes a nonzero depth and wrongly
    // concludes IRQs are already masked.
    crate::arch::raw_disable_irq();
    NEST_COUNT.fetch_add(1, Ordering::Acquire);

    let result = f();

    let depth_after = NEST_COUNT.fetch_sub(1, Ordering::Release);
    if depth_after == 1 {
        crate::arch::raw_enable_irq();
    }

    result
}

/// RAII guard for `mask_tick`/`unmask_tick`: raises the tick-priority
/// interrupt mask on construction, restores the previous mask on drop.
pub struct TickMaskGuard {
    prev: u8,
}

impl TickMaskGuard {
    pub fn acquire() -> Self {
        Self { prev: crate::arch::mask_tick() }
    }
}

impl Drop for TickMaskGuard {
    fn drop(&mut self) {
        crate::arch::unmask_tick(self.prev);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn nested_critical_sections_compose() {
        static DEPTH: AtomicU32 = AtomicU32::new(0);
        critical_section(|| {
            DEPTH.fetch_add(1, Ordering::SeqCst);
            critical_section(|| {
                DEPTH.fetch_add(1, Ordering::SeqCst);
            });
        });
        assert_eq!(DEPTH.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn tick_mask_guard_restores_on_drop() {
        let guard = TickMaskGuard::acquire();
        drop(guard);
    }
}
