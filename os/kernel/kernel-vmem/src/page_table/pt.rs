//! # x86 Page Table (PT)
//!
//! The second (last) paging level of 32-bit non-PAE paging.
//!
//! - [`PtIndex`]: index type for VA bits `[21:12]`.
//! - [`PtEntry`]: a PT entry (PTE), always a 4 KiB leaf.
//! - [`PageTable`]: a 4 KiB-aligned array of 1024 PTEs.
//!
//! The same layout is used for the page-table window: its entries are leaves
//! that map page-table frames into [`SELF_MAP_BASE`](kernel_info::memory::SELF_MAP_BASE).

use crate::PageEntryBits;
use crate::page_table::PageFlags;
use kernel_info::memory::TABLE_ENTRIES;
use kernel_memory_addresses::{PhysicalPage, Size4K, VirtualAddress};

/// Index into a Page Table (derived from VA bits `[21:12]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PtIndex(u16);

/// A single Page Table entry (PTE).
#[doc(alias = "PTE")]
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PtEntry(PageEntryBits);

/// The Page Table: 1024 entries, 4 KiB-aligned.
#[doc(alias = "PT")]
#[repr(C, align(4096))]
pub struct PageTable {
    entries: [PtEntry; TABLE_ENTRIES],
}

impl PtIndex {
    /// Build an index from a virtual address (extracts bits `[21:12]`).
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from(va: VirtualAddress) -> Self {
        Self(((va.as_u32() >> 12) & 0x3FF) as u16)
    }

    /// Construct from a raw `u16`.
    ///
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
}

impl PtEntry {
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

    /// Create a present 4 KiB leaf mapping `frame` with `flags`.
    #[inline]
    #[must_use]
    pub const fn leaf(frame: PhysicalPage<Size4K>, flags: PageFlags) -> Self {
        let mut bits = PageEntryBits::new()
            .with_present(true)
            .with_writable(flags.writable)
            .with_user_access(flags.user);
        bits.set_frame(frame);
        Self(bits)
    }

    /// If present, return the mapped frame and its permission flags.
    #[inline]
    #[must_use]
    pub const fn page_4k(self) -> Option<(PhysicalPage<Size4K>, PageFlags)> {
        if !self.is_present() {
            return None;
        }
        Some((self.0.frame(), self.permissions()))
    }

    /// The writable/user bits of this entry.
    #[inline]
    #[must_use]
    pub const fn permissions(self) -> PageFlags {
        PageFlags {
            writable: self.0.writable(),
            user: self.0.user_access(),
        }
    }

    /// Same frame, new permissions; stays present.
    #[inline]
    #[must_use]
    pub const fn with_permissions(self, flags: PageFlags) -> Self {
        Self(
            self.0
                .with_present(true)
                .with_writable(flags.writable)
                .with_user_access(flags.user),
        )
    }

    /// Expose the underlying bitfield.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> PageEntryBits {
        self.0
    }

    /// Return the raw 32-bit value (flags + frame).
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0.into_bits()
    }
}

impl PageTable {
    /// A fully zeroed (all entries non-present) table.
    #[inline]
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            entries: [PtEntry::zero(); TABLE_ENTRIES],
        }
    }

    #[inline]
    #[must_use]
    pub const fn get(&self, i: PtIndex) -> PtEntry {
        self.entries[i.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, i: PtIndex, e: PtEntry) {
        self.entries[i.as_usize()] = e;
    }

    #[inline]
    pub const fn clear(&mut self, i: PtIndex) {
        self.set(i, PtEntry::zero());
    }

    /// Set every entry to non-present.
    #[inline]
    pub fn zero(&mut self) {
        self.entries.fill(PtEntry::zero());
    }

    /// `true` if no entry has any bit set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.iter().all(|e| e.raw() == 0)
    }

    /// Present entries with their indices.
    #[allow(clippy::cast_possible_truncation)]
    pub fn present(&self) -> impl Iterator<Item = (PtIndex, PtEntry)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_present())
            .map(|(i, e)| (PtIndex(i as u16), *e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pte_4k_leaf() {
        let frame = PhysicalPage::<Size4K>::from_number(0x00AB_C);
        let e = PtEntry::leaf(frame, PageFlags::USER_RW);
        let (f, flags) = e.page_4k().unwrap();
        assert_eq!(f, frame);
        assert!(flags.writable && flags.user);
        assert_eq!(e.raw(), 0x00AB_C007);
    }

    #[test]
    fn permission_rewrite_keeps_frame() {
        let frame = PhysicalPage::<Size4K>::from_number(0x42);
        let e = PtEntry::leaf(frame, PageFlags::KERNEL_RW).with_permissions(PageFlags::USER_RO);
        assert_eq!(e.page_4k(), Some((frame, PageFlags::USER_RO)));
    }

    #[test]
    fn index_extracts_middle_bits() {
        assert_eq!(PtIndex::from(VirtualAddress::new(0x0040_2ABC)).as_usize(), 2);
        assert_eq!(PtIndex::from(VirtualAddress::new(0xFFFF_F000)).as_usize(), 1023);
    }

    #[test]
    fn empty_tracks_any_bit() {
        let mut t = PageTable::zeroed();
        assert!(t.is_empty());
        t.set(PtIndex::new(7), PtEntry::leaf(PhysicalPage::from_number(1), PageFlags::KERNEL_RO));
        assert!(!t.is_empty());
        assert_eq!(t.present().count(), 1);
        t.clear(PtIndex::new(7));
        assert!(t.is_empty());
    }
}
