//! Simulated physical memory.
//!
//! Frames are materialized (zeroed) on first touch, so a test can hand out
//! physical addresses anywhere in the 4 GiB space without reserving host
//! memory for all of it. `CR3` is modeled by a [`Cr3`] value and the window is
//! walked exactly like the CPU would.

use crate::access::{BootstrapError, TableAccess};
use crate::page_table::PageFlags;
use crate::page_table::pd::{PageDirectory, PdEntry, PdIndex};
use crate::page_table::pt::{PageTable, PtEntry};
use crate::{FrameAlloc, split_indices};
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use core::ptr;
use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress, VirtualPage};
use kernel_registers::cr3::Cr3;

/// One 4 KiB frame of simulated RAM.
#[repr(C, align(4096))]
struct RawFrame([u8; 4096]);

/// [`TableAccess`] over simulated physical memory.
pub struct HostedAccess {
    cr3: Cr3,
    ram: BTreeMap<u32, Box<RawFrame>>,
    invalidations: usize,
}

impl HostedAccess {
    /// Create an empty address space with the page-table window installed.
    ///
    /// Takes two frames from `alloc`: the page directory and the window table.
    ///
    /// # Errors
    /// [`BootstrapError::OutOfFrames`] if `alloc` cannot supply both frames.
    pub fn new<A: FrameAlloc>(alloc: &mut A) -> Result<Self, BootstrapError> {
        let directory = alloc.alloc_4k().ok_or(BootstrapError::OutOfFrames)?;
        let window = alloc.alloc_4k().ok_or(BootstrapError::OutOfFrames)?;

        let mut this = Self {
            cr3: Cr3::from_directory_phys(directory.base()),
            ram: BTreeMap::new(),
            invalidations: 0,
        };

        this.frame_bytes(directory).fill(0);
        let table = this.frame_table(window);
        table.zero();
        table.set(
            PdIndex::SELF_MAP.window_index(),
            PtEntry::leaf(window, PageFlags::KERNEL_RW),
        );
        this.directory()
            .set(PdIndex::SELF_MAP, PdEntry::table(window, false));

        log::debug!("hosted address space: directory {directory:?}, window {window:?}");
        Ok(this)
    }

    /// The simulated `CR3` value.
    #[must_use]
    pub const fn cr3(&self) -> Cr3 {
        self.cr3
    }

    /// Raw contents of a simulated frame (materialized on first touch).
    pub fn frame_bytes(&mut self, frame: PhysicalPage<Size4K>) -> &mut [u8; 4096] {
        &mut self
            .ram
            .entry(frame.number())
            .or_insert_with(|| Box::new(RawFrame([0; 4096])))
            .0
    }

    /// Number of TLB invalidations requested so far.
    #[must_use]
    pub const fn invalidations(&self) -> usize {
        self.invalidations
    }

    /// Translate `page` by walking the simulated tables.
    pub fn resolve(&mut self, page: VirtualPage<Size4K>) -> Option<PhysicalPage<Size4K>> {
        let (slot, idx) = split_indices(page.base());
        self.directory().get(slot).next_table()?;
        let (frame, _) = self.table(slot)?.get(idx).page_4k()?;
        Some(frame)
    }

    fn frame_table(&mut self, frame: PhysicalPage<Size4K>) -> &mut PageTable {
        let raw = self.frame_bytes(frame);
        // SAFETY: a frame is 4 KiB and 4 KiB-aligned; every bit pattern is a valid entry.
        unsafe { &mut *ptr::from_mut(raw).cast::<PageTable>() }
    }
}

impl TableAccess for HostedAccess {
    fn directory(&mut self) -> &mut PageDirectory {
        let frame = self.cr3.directory_phys().page();
        let raw = self.frame_bytes(frame);
        // SAFETY: as for `frame_table`.
        unsafe { &mut *ptr::from_mut(raw).cast::<PageDirectory>() }
    }

    fn table(&mut self, slot: PdIndex) -> Option<&mut PageTable> {
        let window = self.directory().get(PdIndex::SELF_MAP).next_table()?;
        let (frame, _) = self.frame_table(window).get(slot.window_index()).page_4k()?;
        Some(self.frame_table(frame))
    }

    fn invalidate(&mut self, _va: VirtualAddress) {
        self.invalidations += 1;
    }

    unsafe fn page_mut(
        &mut self,
        page: VirtualPage<Size4K>,
        frame: PhysicalPage<Size4K>,
    ) -> &mut [u8; 4096] {
        debug_assert_eq!(self.resolve(page), Some(frame), "page not mapped to frame");
        self.frame_bytes(frame)
    }
}
