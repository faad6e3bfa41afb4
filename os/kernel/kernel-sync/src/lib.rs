//! # Kernel synchronization primitives
//!
//! The address-space manager runs on a single core with no kernel threads, so
//! the only exclusion it needs is against interrupts: the page-fault handler
//! runs with interrupts suspended and re-arms them when it completes.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;

pub use irq::IrqGuard;
