//! # Kernel Address-Space Management
//!
//! Physical frames, virtual regions, and demand paging for the single
//! 32-bit address space, on top of the page tables from `kernel-vmem`.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  fault: vector 0x0E → CR2 → Vmm              │
//! └──────────────────────┬───────────────────────┘
//!                        │
//! ┌──────────────────────▼───────────────────────┐
//! │  vmm::Vmm                                    │
//! │    • region lookup, frame allocation         │
//! │    • map writable, zero, fill from file      │
//! │    • downgrade to the region's permissions   │
//! └─────┬──────────────────┬──────────────────┬──┘
//!       │                  │                  │
//! ┌─────▼──────┐   ┌───────▼───────┐   ┌──────▼──────┐
//! │ region     │   │ frame_alloc   │   │ backing     │
//! │ directory  │   │ bitmap        │   │ FileSystem  │
//! └────────────┘   └───────────────┘   └─────────────┘
//! ```
//!
//! ## Components
//!
//! - [`frame_alloc`]: one bit per 4 KiB frame, seeded from the boot memory
//!   map. Frame 0 is never free.
//! - [`region`]: the sorted, sentinel-bounded region table with hinted
//!   best-fit placement.
//! - [`backing`]: the filesystem calls file-backed regions are filled with.
//! - [`vmm`]: the owned address-space context and the demand-paging fault
//!   handler, plus pointer validation for system calls and the kernel heap
//!   hooks.
//! - [`fault`]: registration with the interrupt subsystem and the x86 trap
//!   trampoline.
//!
//! ## Virtual layout
//!
//! ```text
//! 0x0000_0000 ┌───────────────────────────┐ null page (reserved)
//! 0x0000_1000 ├───────────────────────────┤
//!             │ user regions              │
//! 0xC000_0000 ├───────────────────────────┤ kernel image
//! 0xC020_0000 ├───────────────────────────┤
//!             │ kernel regions (heap, …)  │
//! 0xFFC0_0000 ├───────────────────────────┤ page-table window (reserved)
//! 0xFFFF_FFFF └───────────────────────────┘
//! ```
//!
//! Everything runs in one execution context; the fault path masks interrupts
//! for its duration and needs no locks.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod backing;
pub mod fault;
pub mod frame_alloc;
pub mod region;
pub mod vmm;

pub use crate::backing::{Backing, FileHandle, FileSystem};
pub use crate::frame_alloc::{BitmapFrameAlloc, FrameStatus};
pub use crate::region::{InsertError, Region, RegionDirectory, RegionFlags, RemoveError};
pub use crate::vmm::{AccessError, FaultError, Vmm};
