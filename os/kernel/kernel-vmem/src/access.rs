//! # Page-Table Access
//!
//! The [`AddressSpace`](crate::AddressSpace) never dereferences a physical
//! address. It reaches the page directory and every page table through a
//! [`TableAccess`] capability, which resolves them the way the CPU would:
//!
//! ```text
//!  PD[SELF_MAP_SLOT] ──► window table ──► window[i] ──► page table i
//!                        (maps itself at SELF_MAP_SLOT)
//! ```
//!
//! Page table `i` is therefore visible at `SELF_MAP_BASE | (i << 12)`, and
//! the window table itself at `0xFFFF_F000`.
//!
//! Two implementations exist:
//! - [`SelfMapAccess`](self_map::SelfMapAccess): the real window on 32-bit x86.
//! - [`HostedAccess`](hosted::HostedAccess): simulated physical memory, for
//!   host-side tests (feature `hosted`).

#[cfg(any(test, feature = "hosted"))]
pub mod hosted;
#[cfg(target_arch = "x86")]
pub mod self_map;

use crate::page_table::pd::{PageDirectory, PdIndex};
use crate::page_table::pt::PageTable;
use kernel_info::memory::SELF_MAP_BASE;
use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress, VirtualPage};

/// Failure to install the page-table window.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum BootstrapError {
    #[error("no free frame for the page-table window")]
    OutOfFrames,
}

/// Access to the active paging structures as ordinary memory.
pub trait TableAccess {
    /// The active page directory.
    fn directory(&mut self) -> &mut PageDirectory;

    /// The page table linked for `slot`, seen through the window.
    ///
    /// Returns `None` if the window has no entry for `slot`. For
    /// [`PdIndex::SELF_MAP`] this is the window table itself.
    fn table(&mut self, slot: PdIndex) -> Option<&mut PageTable>;

    /// Drop any cached translation for `va`.
    fn invalidate(&mut self, va: VirtualAddress);

    /// The 4 KiB of memory behind `page`.
    ///
    /// # Safety
    /// `page` must currently be mapped, writable, to `frame`, and the returned
    /// slice must not outlive that mapping.
    unsafe fn page_mut(
        &mut self,
        page: VirtualPage<Size4K>,
        frame: PhysicalPage<Size4K>,
    ) -> &mut [u8; 4096];
}

/// The window page through which the page table of `slot` is visible.
#[inline]
#[must_use]
pub const fn window_page(slot: PdIndex) -> VirtualPage<Size4K> {
    VirtualPage::from_number((SELF_MAP_BASE >> 12) | slot.as_u32())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_pages() {
        assert_eq!(window_page(PdIndex::new(0)).base().as_u32(), 0xFFC0_0000);
        assert_eq!(window_page(PdIndex::new(2)).base().as_u32(), 0xFFC0_2000);
        assert_eq!(window_page(PdIndex::SELF_MAP).base().as_u32(), 0xFFFF_F000);
    }
}
