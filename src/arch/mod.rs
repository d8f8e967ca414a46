//! # CPU port layer
//!
//! Hardware abstraction boundary consumed by the scheduler core: tick
//! source programming, nested critical sections, the context-switch
//! trap, and initial stack-frame fabrication. `cortex_m4` is the
//! concrete port for real hardware, and `host` is a second, non-hardware
//! implementation of the same surface so the kernel core can run under
//! `cargo test` on the build host.
//!
//! Both backends expose the same free functions; `kernel`/`scheduler`
//! call them unconditionally without knowing which is compiled in.

#[cfg(feature = "cortex-m4")]
mod cortex_m4;
#[cfg(feature = "cortex-m4")]
pub use cortex_m4::*;

#[cfg(not(feature = "cortex-m4"))]
mod host;
#[cfg(not(feature = "cortex-m4"))]
pub use host::*;
