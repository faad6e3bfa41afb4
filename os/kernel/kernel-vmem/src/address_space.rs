//! # Address Space Mapping
//!
//! [`AddressSpace`] installs, removes, and queries 4 KiB translations in the
//! active page directory. Page tables are allocated on demand and reached
//! through the page-table window of a [`TableAccess`].
//!
//! ## Linking a new table
//!
//! ```text
//! 1. frame ← alloc
//! 2. window[slot] = frame | RW | P      (table now visible at window_page(slot))
//! 3. zero the table through the window
//! 4. PD[slot]     = frame | RW | P | (US if the leaf is user)
//! ```
//!
//! ## Tearing a table down
//!
//! When [`unmap`](AddressSpace::unmap) leaves a table with no entries, the
//! directory link is cleared and the table's own window page is unmapped the
//! same way. The window table always keeps its self entry, so this recursion
//! stops after one level. The table's frame is then handed back to the
//! allocator, only after no entry references it any more.

use crate::access::{TableAccess, window_page};
use crate::page_table::pd::{PdEntry, PdIndex};
use crate::page_table::pt::PtEntry;
use crate::page_table::{PageFlags, split_indices};
use crate::FrameAlloc;
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K, VirtualAddress, VirtualPage};

/// Errors from [`AddressSpace::map`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MapError {
    #[error("out of physical frames for a page table")]
    OutOfFrames,
    #[error("{0:?} is already mapped")]
    AlreadyMapped(VirtualPage<Size4K>),
    #[error("{0:?} lies in the page-table window")]
    ReservedWindow(VirtualPage<Size4K>),
    #[error("page table for slot {0:?} is not reachable through the window")]
    LinkFailed(PdIndex),
}

/// Errors from [`AddressSpace::unmap`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum UnmapError {
    #[error("{0:?} is not mapped")]
    NotMapped(VirtualPage<Size4K>),
    #[error("{0:?} lies in the page-table window")]
    ReservedWindow(VirtualPage<Size4K>),
}

/// Errors from [`AddressSpace::change_permission`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum PermissionError {
    #[error("{0:?} is not mapped")]
    NotMapped(VirtualPage<Size4K>),
}

/// The mapping layer of the single active address space.
pub struct AddressSpace<A: TableAccess> {
    access: A,
}

impl<A: TableAccess> AddressSpace<A> {
    #[inline]
    pub const fn new(access: A) -> Self {
        Self { access }
    }

    /// The underlying table accessor.
    #[inline]
    pub const fn access(&mut self) -> &mut A {
        &mut self.access
    }

    /// Map `page → frame` with `flags`, creating the page table if needed.
    ///
    /// A user mapping makes the covering directory link user-accessible too;
    /// the CPU would otherwise refuse user access at the directory level.
    ///
    /// # Errors
    /// - [`MapError::ReservedWindow`] for pages inside the page-table window.
    /// - [`MapError::AlreadyMapped`] if a translation for `page` is present.
    /// - [`MapError::OutOfFrames`] if a table is needed and `alloc` is empty.
    pub fn map<F: FrameAlloc>(
        &mut self,
        alloc: &mut F,
        frame: PhysicalPage<Size4K>,
        page: VirtualPage<Size4K>,
        flags: PageFlags,
    ) -> Result<(), MapError> {
        log::trace!("map {page:?} -> {frame:?} ({flags})");
        let (slot, idx) = split_indices(page.base());
        if slot.is_self_map() {
            return Err(MapError::ReservedWindow(page));
        }

        let link = self.access.directory().get(slot);
        if !link.is_present() {
            let table = alloc.alloc_4k().ok_or(MapError::OutOfFrames)?;
            if let Err(e) = self.link_table(slot, table, flags.user) {
                alloc.free_4k(table);
                return Err(e);
            }
        } else if flags.user && !link.is_user() {
            self.access.directory().set(slot, link.with_user(true));
        }

        let table = self.access.table(slot).ok_or(MapError::LinkFailed(slot))?;
        if table.get(idx).is_present() {
            return Err(MapError::AlreadyMapped(page));
        }
        table.set(idx, PtEntry::leaf(frame, flags));
        self.access.invalidate(page.base());
        Ok(())
    }

    /// Remove the translation for `page` and return the frame it mapped.
    ///
    /// The leaf frame is *not* freed; that is the caller's decision. A page
    /// table emptied by this call is unlinked and its frame returned to `alloc`.
    ///
    /// # Errors
    /// - [`UnmapError::ReservedWindow`] for pages inside the page-table window.
    /// - [`UnmapError::NotMapped`] if no translation is present.
    pub fn unmap<F: FrameAlloc>(
        &mut self,
        alloc: &mut F,
        page: VirtualPage<Size4K>,
    ) -> Result<PhysicalPage<Size4K>, UnmapError> {
        log::trace!("unmap {page:?}");
        if PdIndex::from(page.base()).is_self_map() {
            return Err(UnmapError::ReservedWindow(page));
        }
        self.clear_leaf(alloc, page)
    }

    /// Rewrite the permissions of a present mapping, keeping its frame.
    ///
    /// # Errors
    /// [`PermissionError::NotMapped`] if no translation is present.
    pub fn change_permission(
        &mut self,
        page: VirtualPage<Size4K>,
        flags: PageFlags,
    ) -> Result<(), PermissionError> {
        log::trace!("change_permission {page:?} ({flags})");
        let (slot, idx) = split_indices(page.base());
        let link = self.access.directory().get(slot);
        if link.next_table().is_none() {
            return Err(PermissionError::NotMapped(page));
        }
        if flags.user && !link.is_user() {
            self.access.directory().set(slot, link.with_user(true));
        }

        let Some(table) = self.access.table(slot) else {
            return Err(PermissionError::NotMapped(page));
        };
        let entry = table.get(idx);
        if !entry.is_present() {
            return Err(PermissionError::NotMapped(page));
        }
        table.set(idx, entry.with_permissions(flags));
        self.access.invalidate(page.base());
        Ok(())
    }

    /// Translate `va`, or `None` if unmapped.
    #[must_use]
    pub fn translate(&mut self, va: VirtualAddress) -> Option<PhysicalAddress> {
        let frame = self.frame_of(va.page())?;
        Some(frame.join(va.offset::<Size4K>()))
    }

    /// The frame `page` maps to, or `None` if unmapped.
    #[must_use]
    pub fn frame_of(&mut self, page: VirtualPage<Size4K>) -> Option<PhysicalPage<Size4K>> {
        self.leaf(page.base()).map(|(frame, _)| frame)
    }

    /// The permissions of the page containing `va`, or `None` if unmapped.
    #[must_use]
    pub fn flags_of(&mut self, va: VirtualAddress) -> Option<PageFlags> {
        self.leaf(va).map(|(_, flags)| flags)
    }

    /// Memory behind a mapped page.
    ///
    /// # Safety
    /// `page` must be mapped writable to `frame`, and the slice must be dropped
    /// before the mapping changes.
    pub unsafe fn page_mut(
        &mut self,
        page: VirtualPage<Size4K>,
        frame: PhysicalPage<Size4K>,
    ) -> &mut [u8; 4096] {
        unsafe { self.access.page_mut(page, frame) }
    }

    fn leaf(&mut self, va: VirtualAddress) -> Option<(PhysicalPage<Size4K>, PageFlags)> {
        let (slot, idx) = split_indices(va);
        self.access.directory().get(slot).next_table()?;
        self.access.table(slot)?.get(idx).page_4k()
    }

    fn link_table(
        &mut self,
        slot: PdIndex,
        table: PhysicalPage<Size4K>,
        user: bool,
    ) -> Result<(), MapError> {
        log::trace!("link page table {table:?} for slot {slot:?}");
        let window = self
            .access
            .table(PdIndex::SELF_MAP)
            .ok_or(MapError::LinkFailed(PdIndex::SELF_MAP))?;
        window.set(slot.window_index(), PtEntry::leaf(table, PageFlags::KERNEL_RW));
        self.access.invalidate(window_page(slot).base());

        self.access
            .table(slot)
            .ok_or(MapError::LinkFailed(slot))?
            .zero();
        self.access.directory().set(slot, PdEntry::table(table, user));
        Ok(())
    }

    fn clear_leaf<F: FrameAlloc>(
        &mut self,
        alloc: &mut F,
        page: VirtualPage<Size4K>,
    ) -> Result<PhysicalPage<Size4K>, UnmapError> {
        let (slot, idx) = split_indices(page.base());
        if self.access.directory().get(slot).next_table().is_none() {
            return Err(UnmapError::NotMapped(page));
        }
        let Some(table) = self.access.table(slot) else {
            return Err(UnmapError::NotMapped(page));
        };
        let Some((frame, _)) = table.get(idx).page_4k() else {
            return Err(UnmapError::NotMapped(page));
        };
        table.clear(idx);
        let emptied = table.is_empty();
        self.access.invalidate(page.base());

        if emptied && !slot.is_self_map() {
            self.release_table(alloc, slot);
        }
        Ok(frame)
    }

    fn release_table<F: FrameAlloc>(&mut self, alloc: &mut F, slot: PdIndex) {
        self.access.directory().clear(slot);
        match self.clear_leaf(alloc, window_page(slot)) {
            Ok(table) => {
                log::trace!("released page table {table:?} of slot {slot:?}");
                alloc.free_4k(table);
            }
            Err(e) => log::warn!("page table of slot {slot:?} had no window entry: {e}"),
        }
    }
}
