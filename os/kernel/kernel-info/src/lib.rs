//! # Kernel Configuration and Boot Interface
//!
//! Memory layout constants and the boot memory-map contract shared by the
//! loader, the frame allocator, and the virtual memory manager of the 32-bit
//! kernel.
//!
//! ## Architecture
//!
//! ### Boot Information ([`boot`])
//! * **Memory Map**: the loader's enumeration of physical ranges, tagged with
//!   their availability. Only [`Available`](boot::MemoryKind::Available) ranges
//!   seed the frame allocator.
//!
//! ### Memory Layout ([`memory`])
//! * **User/Kernel Split**: user regions live strictly below [`USER_SPACE_END`](memory::USER_SPACE_END).
//! * **Kernel Dynamic Window**: where kernel regions (heap, device queues, stacks) are placed.
//! * **Page-Table Window**: the last directory slot maps every page table.
//!
//! ## Virtual Memory Architecture
//!
//! ```text
//! Virtual Address Space Layout (32-bit):
//!
//! 0x0000_0000           ┌─────────────────────────────────┐
//!                       │    Null guard (one page)        │
//! 0x0000_1000           ├─────────────────────────────────┤
//!                       │         User Space              │
//!                       │  (program segments, stacks)     │
//! USER_SPACE_END        ├─────────────────────────────────┤ 0xC000_0000 = KERNEL_BASE
//!                       │   Kernel image (loader mapped)  │
//! KERNEL_DYNAMIC_START  ├─────────────────────────────────┤ 0xC020_0000
//!                       │   Kernel dynamic regions        │
//!                       │   (heap, DMA queues, stacks)    │
//! SELF_MAP_BASE         ├─────────────────────────────────┤ 0xFFC0_0000 = KERNEL_DYNAMIC_END
//!                       │   Page-table window (4 MiB)     │
//! 0xFFFF_FFFF           └─────────────────────────────────┘
//! ```
//!
//! All layout constants are `const` values validated by compile-time
//! assertions, so an inconsistent layout fails the build.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
