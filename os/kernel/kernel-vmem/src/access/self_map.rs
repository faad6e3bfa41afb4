//! The page-table window on real hardware.
//!
//! After [`SelfMapAccess::bootstrap`], the directory slot
//! [`SELF_MAP_SLOT`](kernel_info::memory::SELF_MAP_SLOT) links a *window
//! table* whose entry `i` maps the frame of page table `i`. The window table
//! maps itself at its own slot, so it is reachable at `0xFFFF_F000` and can
//! be edited like any other table.

use crate::access::{BootstrapError, TableAccess, window_page};
use crate::page_table::PageFlags;
use crate::page_table::pd::{PageDirectory, PdEntry, PdIndex};
use crate::page_table::pt::{PageTable, PtEntry, PtIndex};
use crate::FrameAlloc;
use core::ptr::{NonNull, with_exposed_provenance_mut};
use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress, VirtualPage};
use kernel_registers::LoadRegisterUnsafe;
use kernel_registers::cr3::Cr3;

/// [`TableAccess`] through the self-mapped page-table window.
pub struct SelfMapAccess {
    directory: NonNull<PageDirectory>,
}

/// Invalidate the TLB entry for `va` on this core.
#[inline]
pub fn invlpg(va: VirtualAddress) {
    unsafe {
        core::arch::asm!("invlpg [{}]", in(reg) va.as_u32(), options(nostack, preserves_flags));
    }
}

impl SelfMapAccess {
    /// Install the page-table window into the active directory.
    ///
    /// The window table cannot be reached through itself before it exists, so
    /// it is first mapped through the last entry of the loader's `scratch`
    /// table, which covers the 4 MiB starting at `scratch_base`. Every link
    /// already present in the directory is mirrored into the window, then the
    /// scratch entry is dropped again.
    ///
    /// # Errors
    /// [`BootstrapError::OutOfFrames`] if no frame is left for the window table.
    ///
    /// # Safety
    /// - `directory` must be the virtual address of the active page directory.
    /// - `scratch` must be the virtual address of a present page table linked
    ///   for `scratch_base`, whose last entry is unused.
    /// - Must run once, at CPL 0, before any other use of the window.
    pub unsafe fn bootstrap<A: FrameAlloc>(
        directory: NonNull<PageDirectory>,
        mut scratch: NonNull<PageTable>,
        scratch_base: VirtualAddress,
        alloc: &mut A,
    ) -> Result<Self, BootstrapError> {
        let root = unsafe { Cr3::load_unsafe() }.directory_phys();
        let window = alloc.alloc_4k().ok_or(BootstrapError::OutOfFrames)?;
        log::info!("installing page-table window in {window:?} (directory at {root:?})");

        let last = PtIndex::new(1023);
        let scratch_page = VirtualPage::<Size4K>::from_number(
            scratch_base.page::<Size4K>().number() + 1023,
        );
        let scratch = unsafe { scratch.as_mut() };
        scratch.set(last, PtEntry::leaf(window, PageFlags::KERNEL_RW));
        invlpg(scratch_page.base());

        let dir = unsafe { &mut *directory.as_ptr() };
        let table = unsafe { &mut *window_at::<PageTable>(scratch_page.base()) };
        table.zero();
        for (slot, entry) in dir.present() {
            if let Some(frame) = entry.next_table() {
                table.set(slot.window_index(), PtEntry::leaf(frame, PageFlags::KERNEL_RW));
            }
        }
        table.set(
            PdIndex::SELF_MAP.window_index(),
            PtEntry::leaf(window, PageFlags::KERNEL_RW),
        );
        dir.set(PdIndex::SELF_MAP, PdEntry::table(window, false));

        scratch.clear(last);
        invlpg(scratch_page.base());
        Ok(Self { directory })
    }

    /// Use a window installed earlier.
    ///
    /// # Safety
    /// [`bootstrap`](Self::bootstrap) must have completed for `directory`.
    #[must_use]
    pub const unsafe fn assume_installed(directory: NonNull<PageDirectory>) -> Self {
        Self { directory }
    }

    fn window_table(&mut self) -> &mut PageTable {
        unsafe { &mut *window_at::<PageTable>(window_page(PdIndex::SELF_MAP).base()) }
    }
}

impl TableAccess for SelfMapAccess {
    fn directory(&mut self) -> &mut PageDirectory {
        unsafe { self.directory.as_mut() }
    }

    fn table(&mut self, slot: PdIndex) -> Option<&mut PageTable> {
        if !self.window_table().get(slot.window_index()).is_present() {
            return None;
        }
        Some(unsafe { &mut *window_at::<PageTable>(window_page(slot).base()) })
    }

    fn invalidate(&mut self, va: VirtualAddress) {
        invlpg(va);
    }

    unsafe fn page_mut(
        &mut self,
        page: VirtualPage<Size4K>,
        _frame: PhysicalPage<Size4K>,
    ) -> &mut [u8; 4096] {
        unsafe { &mut *window_at::<[u8; 4096]>(page.base()) }
    }
}

/// Pointer to whatever the active mapping shows at `va`.
fn window_at<T>(va: VirtualAddress) -> *mut T {
    with_exposed_provenance_mut(va.as_u32() as usize)
}
