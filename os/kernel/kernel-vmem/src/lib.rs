//! # Virtual Memory Support
//!
//! 32-bit x86 (non-PAE) paging for the kernel's single address space.
//!
//! ## What you get
//! - Typed [page directory and page table](page_table) entries over a shared
//!   [`PageEntryBits`] layout.
//! - A [`TableAccess`] capability that reaches every page table through a
//!   self-mapped window, with a real-hardware and a hosted implementation.
//! - An [`AddressSpace`] that maps, unmaps, re-permissions, and translates
//!   4 KiB pages, allocating page tables on demand through [`FrameAlloc`].
//!
//! ## x86 Virtual Address → Physical Address Walk
//!
//! ```text
//! | 31‒22 | 21‒12 | 11‒0   |
//! |  PD   |  PT   | Offset |
//!
//!  CR3 ─► PD ─► PT ─► 4 KiB frame
//! ```
//!
//! Each level holds 1024 (2¹⁰) entries of 4 bytes. A directory entry links a
//! page table covering 4 MiB; a table entry maps one 4 KiB frame.
//!
//! ## The page-table window
//!
//! Directory slot 1023 links a *window table* whose entry `i` maps the frame
//! of page table `i`, and whose entry 1023 maps itself. Every page table is
//! thus visible as ordinary memory in the top 4 MiB:
//!
//! ```text
//! 0xFFC0_0000 + i * 4 KiB   page table for slot i
//! 0xFFFF_F000               the window table
//! ```
//!
//! No identity map or direct physical map is needed to edit paging
//! structures.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(any(test, feature = "hosted"))]
extern crate alloc;

pub mod access;
pub mod address_space;
mod page_entry_bits;
pub mod page_table;

pub use crate::access::{BootstrapError, TableAccess, window_page};
pub use crate::address_space::{AddressSpace, MapError, PermissionError, UnmapError};
pub use crate::page_entry_bits::PageEntryBits;
pub use crate::page_table::pd::{PageDirectory, PdEntry, PdIndex};
pub use crate::page_table::pt::{PageTable, PtEntry, PtIndex};
pub use crate::page_table::{PageFlags, split_indices};
pub use kernel_info::memory as info;

use kernel_memory_addresses::{PhysicalPage, Size4K};

/// Source of physical 4 KiB frames for page tables and page contents.
///
/// Returned frames **must** be 4 KiB aligned and already accounted as used.
pub trait FrameAlloc {
    /// Allocate one frame, or `None` on out-of-memory.
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>>;

    /// Give a frame back.
    fn free_4k(&mut self, frame: PhysicalPage<Size4K>);
}
