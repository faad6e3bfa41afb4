//! # x86 Page Directory (PD)
//!
//! The top paging level of 32-bit non-PAE paging, referenced by `CR3`.
//!
//! - [`PdIndex`]: index type for VA bits `[31:22]`.
//! - [`PdEntry`]: a PD entry (PDE); here always a link to a [`PageTable`](super::pt::PageTable).
//! - [`PageDirectory`]: a 4 KiB-aligned array of 1024 PDEs.
//!
//! ## Invariants & Notes
//!
//! - 4 MiB pages (`PS=1`) are never created.
//! - A link inherits the *union* of its leaves' permissions: the CPU denies
//!   user access through a supervisor-only PDE even if the PTE allows it.

use crate::PageEntryBits;
use crate::page_table::pt::PtIndex;
use kernel_info::memory::{SELF_MAP_SLOT, TABLE_ENTRIES};
use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress};

/// Index into the Page Directory (derived from VA bits `[31:22]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PdIndex(u16);

/// A single Page Directory entry (PDE).
#[doc(alias = "PDE")]
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PdEntry(PageEntryBits);

/// The Page Directory: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PD")]
#[repr(C, align(4096))]
pub struct PageDirectory {
    entries: [PdEntry; TABLE_ENTRIES],
}

impl PdIndex {
    /// The slot that holds the page-table window.
    #[allow(clippy::cast_possible_truncation)]
    pub const SELF_MAP: Self = Self(SELF_MAP_SLOT as u16);

    /// Build an index from a virtual address (extracts bits `[31:22]`).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from(va: VirtualAddress) -> Self {
        Self((va.as_u32() >> 22) as u16)
    }

    /// ### Debug assertions
    /// - Asserts `v < 1024` in debug builds.
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!((v as usize) < TABLE_ENTRIES);
        Self(v)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0 as u32
    }

    #[inline]
    #[must_use]
    pub const fn is_self_map(self) -> bool {
        self.0 == Self::SELF_MAP.0
    }

    /// Index of this slot's entry in the page-table window.
    #[inline]
    #[must_use]
    pub const fn window_index(self) -> PtIndex {
        PtIndex::new(self.0)
    }

    /// First virtual address covered by this slot.
    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress::new(self.as_u32() << 22)
    }

    /// All 1024 slots in ascending order.
    #[allow(clippy::cast_possible_truncation)]
    pub fn all() -> impl Iterator<Item = Self> {
        (0..TABLE_ENTRIES).map(|i| Self(i as u16))
    }
}

impl PdEntry {
    /// Create a zero (non-present) entry.
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(PageEntryBits::new())
    }

    #[inline]
    #[must_use]
    pub const fn is_present(self) -> bool {
        self.0.present()
    }

    /// Link to a page table in `table`.
    ///
    /// Always writable (the leaf decides); user-accessible iff `user`.
    #[inline]
    #[must_use]
    pub const fn table(table: PhysicalPage<Size4K>, user: bool) -> Self {
        let mut bits = PageEntryBits::new()
            .with_present(true)
            .with_writable(true)
            .with_user_access(user);
        bits.set_frame(table);
        Self(bits)
    }

    /// If present, the frame of the linked page table.
    #[inline]
    #[must_use]
    pub const fn next_table(self) -> Option<PhysicalPage<Size4K>> {
        if !self.is_present() {
            return None;
        }
        debug_assert!(!self.0.large_page(), "4 MiB pages are not used");
        Some(self.0.frame())
    }

    #[inline]
    #[must_use]
    pub const fn is_user(self) -> bool {
        self.0.user_access()
    }

    #[inline]
    #[must_use]
    pub const fn with_user(self, user: bool) -> Self {
        Self(self.0.with_user_access(user))
    }

    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0.into_bits()
    }
}

impl PageDirectory {
    /// A fully zeroed (all entries non-present) directory.
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PdEntry::zero(); TABLE_ENTRIES],
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: PdIndex) -> PdEntry {
        self.entries[i.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, i: PdIndex, e: PdEntry) {
        self.entries[i.as_usize()] = e;
    }

    #[inline]
    pub const fn clear(&mut self, i: PdIndex) {
        self.set(i, PdEntry::zero());
    }

    /// Present links with their slots.
    pub fn present(&self) -> impl Iterator<Item = (PdIndex, PdEntry)> + '_ {
        PdIndex::all()
            .map(|i| (i, self.get(i)))
            .filter(|(_, e)| e.is_present())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_from_top_bits() {
        assert_eq!(PdIndex::from(VirtualAddress::new(0xC000_0000)).as_usize(), 768);
        assert!(PdIndex::from(VirtualAddress::new(0xFFC0_1000)).is_self_map());
        assert_eq!(PdIndex::new(2).base(), VirtualAddress::new(0x0080_0000));
    }

    #[test]
    fn table_link_is_writable_and_optionally_user() {
        let frame = PhysicalPage::<Size4K>::from_number(0x200);
        let kernel = PdEntry::table(frame, false);
        assert_eq!(kernel.raw(), 0x0020_0003);
        assert_eq!(kernel.next_table(), Some(frame));
        assert!(kernel.with_user(true).is_user());
        assert_eq!(PdEntry::zero().next_table(), None);
    }
}
