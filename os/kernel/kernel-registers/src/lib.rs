//! # Typed x86 (32-bit) Control Registers
//!
//! Only the registers the paging code touches are modeled:
//!
//! - [`cr2::Cr2`]: the faulting linear address latched by a page fault.
//! - [`cr3::Cr3`]: physical base of the active page directory.
//!
//! Register access is implemented with inline assembly behind the `asm`
//! feature and only on `target_arch = "x86"`; the value types themselves are
//! portable so they can be built and tested on the host.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(feature = "cr2")]
pub mod cr2;

#[cfg(feature = "cr3")]
pub mod cr3;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require kernel mode (Ring 0).
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// The caller must uphold the implementation-specific safety requirements.
    /// For example, the register access might be privileged and require kernel mode (Ring 0).
    unsafe fn store_unsafe(self);
}
