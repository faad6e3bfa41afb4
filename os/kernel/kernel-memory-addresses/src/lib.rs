//! # Virtual and Physical Memory Address Types (32-bit)
//!
//! Strongly typed wrappers for raw memory addresses and page bases used by the
//! two-level x86 paging code.
//!
//! ## Overview
//!
//! These types prevent mixing virtual and physical addresses at compile time
//! while remaining zero-cost wrappers around `u32` values.
//!
//! | Concept | Generic | Description |
//! |----------|----------|-------------|
//! | [`MemoryAddress`] | – | A raw 32-bit address, either physical or virtual. |
//! | [`MemoryPage<S>`] | [`S: PageSize`](PageSize) | A page-aligned base address of a page of size `S`. |
//!
//! These are then wrapped to distinguish between virtual and physical spaces:
//!
//! | Wrapper | Meaning |
//! |----------|----------|
//! | [`VirtualAddress`] / [`VirtualPage<S>`] | Refer to virtual (page-table translated) memory. |
//! | [`PhysicalAddress`] / [`PhysicalPage<S>`] | Refer to physical memory (frames, page tables). |
//!
//! ## Page Sizes
//!
//! - [`Size4K`] — 4 KiB pages, the only leaf granularity used.
//! - [`Size4M`] — the 4 MiB span covered by one page-directory entry.
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0xC020_1234);
//! let (page, off) = va.split::<Size4K>();
//! assert_eq!(page.base().as_u32(), 0xC020_1000);
//! assert_eq!(page.join(off), va);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod memory_address;
mod memory_page;
mod page_size;
mod physical_address;
mod physical_page;
mod virtual_address;
mod virtual_page;

pub use memory_address::MemoryAddress;
pub use memory_page::MemoryPage;
pub use page_size::{PageSize, Size4K, Size4M};
pub use physical_address::PhysicalAddress;
pub use physical_page::PhysicalPage;
pub use virtual_address::VirtualAddress;
pub use virtual_page::VirtualPage;
