//! Interrupt masking for 32-bit x86.
//!
//! On other targets the guard degrades to a no-op so that code holding it can
//! be built and exercised on the host.

/// Interrupt Enable flag, bit 9 of `EFLAGS`.
const EFLAGS_IF: u32 = 1 << 9;

/// Disables hardware interrupts (`cli`).
///
/// # Safety & Privilege
///
/// Must only be called in contexts where `cli` is permitted (ring 0).
#[inline]
pub fn cli_stop_interrupts() {
    #[cfg(target_arch = "x86")]
    unsafe {
        core::arch::asm!("cli", options(nomem, nostack));
    };
}

/// Enables hardware interrupts (`sti`).
///
/// # Safety & Privilege
///
/// Must only be called in contexts where `sti` is permitted (ring 0).
#[inline]
pub fn sti_enable_interrupts() {
    #[cfg(target_arch = "x86")]
    unsafe {
        core::arch::asm!("sti", options(nomem, nostack));
    };
}

/// Returns the current `EFLAGS` value (via `pushfd/pop`).
///
/// Reports interrupts as disabled on targets other than 32-bit x86.
#[cfg(target_arch = "x86")]
#[inline]
#[must_use]
pub fn eflags() -> u32 {
    let r: u32;
    unsafe { core::arch::asm!("pushfd; pop {}", out(reg) r, options(preserves_flags)) }
    r
}

/// Host stand-in for [`eflags`]: interrupts are never enabled.
#[cfg(not(target_arch = "x86"))]
#[inline]
#[must_use]
pub const fn eflags() -> u32 {
    0
}

/// Whether `EFLAGS.IF` is currently set.
#[inline]
#[must_use]
pub fn interrupts_enabled() -> bool {
    eflags() & EFLAGS_IF != 0
}

/// RAII guard that disables interrupts on creation and restores them on drop.
///
/// `IrqGuard::new()` snapshots the `IF` bit. If interrupts were enabled, it
/// executes `cli`. On drop, it executes `sti` **only** if they were previously
/// enabled, preserving the original state.
///
/// # Examples
///
/// ```no_run
/// use kernel_sync::irq::{IrqGuard, interrupts_enabled};
///
/// {
///     let _g = IrqGuard::new();
///     assert!(!interrupts_enabled());
/// }
/// // IF restored to its prior state
/// ```
pub struct IrqGuard {
    /// Whether interrupts were enabled (IF=1) when the guard was created.
    were_enabled: bool,
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqGuard {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let enabled = interrupts_enabled();
        if enabled {
            cli_stop_interrupts();
        }
        Self {
            were_enabled: enabled,
        }
    }

    /// Whether dropping this guard will re-arm interrupts.
    #[inline]
    #[must_use]
    pub const fn restores_interrupts(&self) -> bool {
        self.were_enabled
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        if self.were_enabled {
            sti_enable_interrupts();
        }
    }
}
