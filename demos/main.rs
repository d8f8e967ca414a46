//! # eqos demo firmware
//!
//! Three periodic tasks at priorities 0, 1, 2 sleeping for 1, 5, and 10
//! ticks respectively — the end-to-end scenario the kernel's testable
//! properties are built around: over 100 ticks, T0 runs 100 times, T1
//! runs 20 times, T2 runs 10 times.

#![no_std]
#![no_main]

use cortex_m_rt::entry;
use panic_halt as _;

use eqos::kernel;

extern "C" fn t0_fast() -> ! {
    loop {
        kernel::sleep(1);
    }
}

extern "C" fn t1_medium() -> ! {
    loop {
        kernel::sleep(5);
    }
}

extern "C" fn t2_slow() -> ! {
    loop {
        kernel::sleep(10);
    }
}

#[entry]
fn main() -> ! {
    kernel::init();

    kernel::create_task(t0_fast, core::ptr::null_mut(), 256).expect("create t0_fast");
    kernel::create_task(t1_medium, core::ptr::null_mut(), 256).expect("create t1_medium");
    kernel::create_task(t2_slow, core::ptr::null_mut(), 256).expect("create t2_slow");

    kernel::start()
}
