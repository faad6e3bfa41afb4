//! # Virtual Memory Regions
//!
//! The [`RegionDirectory`] records which virtual ranges are *promised* to
//! someone, independently of whether any page in them is mapped yet. The
//! page-fault handler turns a promise into a mapping one page at a time.
//!
//! Entries are kept sorted by base and never overlap. Two reserved sentinel
//! entries bracket the array:
//!
//! ```text
//! [0x0000_0000, 0x0000_1000)   null page
//! [0xFFC0_0000, 0x1_0000_0000) page-table window
//! ```
//!
//! so every real region has a left and a right neighbor and the gap search is
//! a plain walk over adjacent pairs.
//!
//! ## Placement
//! [`insert`](RegionDirectory::insert) first tries the caller's hint. A hint
//! outside the legal range for the region's class (user or kernel) is replaced
//! by a pseudo-random legal candidate. If the hint does not fit in any gap,
//! the search is repeated once with the start of the best-fitting gap (least
//! space left over, earliest on ties).

use crate::backing::Backing;
use arrayvec::ArrayVec;
use bitfield_struct::bitfield;
use core::cmp::Ordering;
use core::fmt;
use core::ops::BitOr;
use kernel_info::memory::{
    KERNEL_DYNAMIC_END, KERNEL_DYNAMIC_START, PAGE_SIZE, REGION_CAPACITY, SELF_MAP_BASE,
    USER_SPACE_END, USER_SPACE_START,
};
use kernel_memory_addresses::{Size4K, VirtualAddress, VirtualPage};
use kernel_vmem::PageFlags;

/// Seed of the placement generator when none is given.
pub const DEFAULT_PLACEMENT_SEED: u32 = 0x1234_5678;

const SENTINEL_LOW_END: u32 = PAGE_SIZE;
const SENTINEL_HIGH_SIZE: u32 = 0u32.wrapping_sub(SELF_MAP_BASE);

/// Region flags, bit-compatible with the kernel's mapping request ABI.
///
/// | Bit | Flag |
/// |-----|------|
/// | 0   | `ANONYMOUS` |
/// | 1   | `FILE` |
/// | 8   | `PRIVATE` |
/// | 9   | `SHARED` |
/// | 16  | `WRITE` |
/// | 28  | `KERNEL` |
/// | 29  | `USER` |
///
/// A region without `USER` belongs to the kernel. A region without `FILE` is
/// anonymous.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct RegionFlags {
    /// Zero-filled on first touch.
    pub anonymous: bool,
    /// Filled from a backing file on first touch.
    pub file: bool,
    #[bits(6)]
    __res2_7: u8,
    pub private: bool,
    pub shared: bool,
    #[bits(6)]
    __res10_15: u8,
    pub write: bool,
    #[bits(11)]
    __res17_27: u16,
    pub kernel: bool,
    pub user: bool,
    __res30: bool,
    /// Marks the directory's own bracket entries.
    sentinel: bool,
}

impl RegionFlags {
    pub const ANONYMOUS: Self = Self::new().with_anonymous(true);
    pub const FILE: Self = Self::new().with_file(true);
    pub const PRIVATE: Self = Self::new().with_private(true);
    pub const SHARED: Self = Self::new().with_shared(true);
    pub const WRITE: Self = Self::new().with_write(true);
    pub const KERNEL: Self = Self::new().with_kernel(true);
    pub const USER: Self = Self::new().with_user(true);

    const RESERVED: Self = Self::new().with_sentinel(true);

    /// Whether pages of this region are user accessible.
    #[must_use]
    pub const fn is_user(self) -> bool {
        self.user()
    }

    /// Whether pages of this region are filled from a backing file.
    #[must_use]
    pub const fn is_file_backed(self) -> bool {
        self.file()
    }

    /// Leaf permissions a faulted-in page of this region ends up with.
    #[must_use]
    pub const fn page_flags(self) -> PageFlags {
        PageFlags::new(self.write(), self.user())
    }

    const fn is_sentinel(self) -> bool {
        self.sentinel()
    }
}

impl BitOr for RegionFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self::from_bits(self.into_bits() | rhs.into_bits())
    }
}

impl fmt::Display for RegionFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_sentinel() {
            return f.write_str("reserved");
        }
        let kind = if self.file() { "file" } else { "anon" };
        let write = if self.write() { "rw" } else { "ro" };
        let class = if self.user() { "user" } else { "kernel" };
        let sharing = if self.shared() { "shared" } else { "private" };
        write!(f, "{kind}|{write}|{class}|{sharing}")
    }
}

/// A contiguous, page-aligned range of virtual memory.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Region {
    base: VirtualAddress,
    size: u32,
    flags: RegionFlags,
    backing: Option<Backing>,
}

impl Region {
    const fn sentinel(base: u32, size: u32) -> Self {
        Self {
            base: VirtualAddress::new(base),
            size,
            flags: RegionFlags::RESERVED,
            backing: None,
        }
    }

    #[must_use]
    pub const fn base(&self) -> VirtualAddress {
        self.base
    }

    /// Size in bytes; always a multiple of the page size.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Exclusive end. Widened, since the top sentinel ends at 4 GiB.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.base.as_u64() + self.size as u64
    }

    #[must_use]
    pub const fn flags(&self) -> RegionFlags {
        self.flags
    }

    #[must_use]
    pub const fn backing(&self) -> Option<&Backing> {
        self.backing.as_ref()
    }

    #[must_use]
    pub const fn contains(&self, va: VirtualAddress) -> bool {
        self.base.as_u64() <= va.as_u64() && va.as_u64() < self.end()
    }

    /// Every page of the region, ascending.
    pub fn pages(&self) -> impl Iterator<Item = VirtualPage<Size4K>> + use<> {
        let first = self.base.page::<Size4K>().number();
        let count = self.size / PAGE_SIZE;
        (first..first + count).map(VirtualPage::from_number)
    }

    const fn is_sentinel(&self) -> bool {
        self.flags.is_sentinel()
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum InsertError {
    #[error("region flags {0:#010x} are contradictory")]
    ConflictingFlags(u32),
    #[error("file-backed region without a backing file")]
    MissingBacking,
    #[error("zero-sized region")]
    ZeroSize,
    #[error("region directory is full")]
    DirectoryFull,
    #[error("no free gap of {size:#x} bytes")]
    NoSpace { size: u64 },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum RemoveError {
    #[error("no region contains {0}")]
    NotFound(VirtualAddress),
    #[error("{address} is inside the region at {base}, not its base")]
    NotRegionBase {
        address: VirtualAddress,
        base: VirtualAddress,
    },
    #[error("region at {0} is reserved")]
    Reserved(VirtualAddress),
}

/// Sorted, sentinel-bounded table of regions with fixed capacity.
pub struct RegionDirectory {
    entries: ArrayVec<Region, REGION_CAPACITY>,
    rng: u32,
}

impl Default for RegionDirectory {
    fn default() -> Self {
        Self::new(DEFAULT_PLACEMENT_SEED)
    }
}

impl RegionDirectory {
    /// An empty directory holding only the two sentinels.
    #[must_use]
    pub fn new(seed: u32) -> Self {
        let mut entries = ArrayVec::new();
        entries.push(Region::sentinel(0, SENTINEL_LOW_END));
        entries.push(Region::sentinel(SELF_MAP_BASE, SENTINEL_HIGH_SIZE));
        Self { entries, rng: seed }
    }

    /// Number of regions, not counting the sentinels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len() - 2
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Regions in ascending address order, sentinels excluded.
    pub fn iter(&self) -> impl Iterator<Item = &Region> {
        self.entries.iter().filter(|r| !r.is_sentinel())
    }

    /// Reserve `size` bytes (rounded up to whole pages) and return the base.
    ///
    /// # Errors
    /// Contradictory flags, a file-backed request without `backing`, a zero
    /// size, a full directory, or no gap large enough in the region's class.
    pub fn insert(
        &mut self,
        hint: VirtualAddress,
        size: u32,
        flags: RegionFlags,
        backing: Option<Backing>,
    ) -> Result<VirtualAddress, InsertError> {
        let flags = flags.with_sentinel(false);
        if (flags.user() && flags.kernel())
            || (flags.shared() && flags.private())
            || (flags.anonymous() && flags.file())
        {
            return Err(InsertError::ConflictingFlags(flags.into_bits()));
        }
        let backing = if flags.is_file_backed() {
            Some(backing.ok_or(InsertError::MissingBacking)?)
        } else {
            None
        };
        if size == 0 {
            return Err(InsertError::ZeroSize);
        }
        let size = u64::from(size).next_multiple_of(u64::from(PAGE_SIZE));
        if self.entries.is_full() {
            return Err(InsertError::DirectoryFull);
        }

        let (lo, hi) = class_range(flags);
        if size > hi - lo {
            return Err(InsertError::NoSpace { size });
        }

        let mut hint = hint.align_down::<Size4K>().as_u64();
        if hint < lo || hint + size > hi {
            let relocated = self.random_candidate(lo, hi, size);
            log::debug!("region hint {hint:#x} outside {lo:#x}..{hi:#x}, trying {relocated:#x}");
            hint = relocated;
        }

        let mut retried = false;
        loop {
            let mut fit = None;
            let mut best: Option<(u64, u64)> = None;
            for (i, pair) in self.entries.windows(2).enumerate() {
                let (prev_end, next_base) = (pair[0].end(), pair[1].base.as_u64());
                if prev_end <= hint && hint + size <= next_base {
                    fit = Some(i + 1);
                    break;
                }

                let start = prev_end.max(lo);
                let end = next_base.min(hi);
                if end >= start + size {
                    let leftover = end - start - size;
                    if best.is_none_or(|(least, _)| leftover < least) {
                        best = Some((leftover, start));
                    }
                }
            }

            if let Some(index) = fit {
                return self.splice(index, hint, size, flags, backing);
            }
            match best {
                Some((_, start)) if !retried => {
                    log::debug!("no gap at {hint:#x}, best fit starts at {start:#x}");
                    hint = start;
                    retried = true;
                }
                _ => return Err(InsertError::NoSpace { size }),
            }
        }
    }

    /// Remove the region starting at exactly `base` and return it.
    ///
    /// Pages are not touched; see [`Vmm::remove`](crate::vmm::Vmm::remove).
    ///
    /// # Errors
    /// No region contains `base`, `base` is not a region start, or the
    /// region is a sentinel.
    pub fn take(&mut self, base: VirtualAddress) -> Result<Region, RemoveError> {
        let index = self.position(base).ok_or(RemoveError::NotFound(base))?;
        let region = self.entries[index];
        if region.is_sentinel() {
            return Err(RemoveError::Reserved(region.base));
        }
        if region.base != base {
            return Err(RemoveError::NotRegionBase {
                address: base,
                base: region.base,
            });
        }
        self.entries.remove(index);
        log::debug!("removed region {}..{:#x}", region.base, region.end());
        Ok(region)
    }

    /// The region containing `va`, if any. Sentinels are never returned.
    #[must_use]
    pub fn lookup(&self, va: VirtualAddress) -> Option<&Region> {
        let region = &self.entries[self.position(va)?];
        (!region.is_sentinel()).then_some(region)
    }

    /// Log every entry, sentinels included.
    pub fn dump(&self) {
        log::info!("=== VM REGIONS ({} of {REGION_CAPACITY}) ===", self.len());
        for (i, region) in self.entries.iter().enumerate() {
            match region.backing {
                Some(b) => log::info!(
                    "#{i:<4} 0x{:08X}..0x{:010X} {} file={} off={:#x} disk={:#x}",
                    region.base.as_u32(),
                    region.end(),
                    region.flags,
                    b.file,
                    b.offset,
                    b.disk_len
                ),
                None => log::info!(
                    "#{i:<4} 0x{:08X}..0x{:010X} {}",
                    region.base.as_u32(),
                    region.end(),
                    region.flags
                ),
            }
        }
    }

    fn position(&self, va: VirtualAddress) -> Option<usize> {
        let va = va.as_u64();
        self.entries
            .binary_search_by(|r| {
                if r.end() <= va {
                    Ordering::Less
                } else if r.base.as_u64() > va {
                    Ordering::Greater
                } else {
                    Ordering::Equal
                }
            })
            .ok()
    }

    fn splice(
        &mut self,
        index: usize,
        base: u64,
        size: u64,
        flags: RegionFlags,
        backing: Option<Backing>,
    ) -> Result<VirtualAddress, InsertError> {
        // Both fit in 32 bits: the gap lies inside a class range below 4 GiB.
        #[allow(clippy::cast_possible_truncation)]
        let region = Region {
            base: VirtualAddress::new(base as u32),
            size: size as u32,
            flags,
            backing,
        };
        self.entries
            .try_insert(index, region)
            .map_err(|_| InsertError::DirectoryFull)?;
        log::debug!("inserted region {}..{:#x} {flags}", region.base, region.end());
        Ok(region.base)
    }

    /// A page-aligned base in `[lo, hi - size]` from a linear-congruential step.
    fn random_candidate(&mut self, lo: u64, hi: u64, size: u64) -> u64 {
        self.rng = self.rng.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        let page = u64::from(PAGE_SIZE);
        let slots = (hi - lo - size) / page + 1;
        lo + (u64::from(self.rng) % slots) * page
    }
}

/// Legal `[lo, hi)` for regions with these flags.
fn class_range(flags: RegionFlags) -> (u64, u64) {
    if flags.user() {
        (u64::from(USER_SPACE_START), u64::from(USER_SPACE_END))
    } else {
        (u64::from(KERNEL_DYNAMIC_START), u64::from(KERNEL_DYNAMIC_END))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::FileHandle;

    const USER_ANON: RegionFlags = RegionFlags::ANONYMOUS
        .with_write(true)
        .with_user(true);
    const KERNEL_ANON: RegionFlags = RegionFlags::ANONYMOUS
        .with_write(true)
        .with_kernel(true);

    fn va(v: u32) -> VirtualAddress {
        VirtualAddress::new(v)
    }

    fn assert_sorted(dir: &RegionDirectory) {
        for pair in dir.entries.windows(2) {
            assert!(pair[0].end() <= pair[1].base.as_u64(), "{pair:?}");
        }
    }

    #[test]
    fn starts_with_sentinels_only() {
        let dir = RegionDirectory::default();
        assert!(dir.is_empty());
        assert_eq!(dir.entries.len(), 2);
        assert_eq!(dir.entries[1].end(), 1 << 32);
        assert!(dir.lookup(va(0)).is_none());
        assert!(dir.lookup(va(0xFFFF_F000)).is_none());
    }

    #[test]
    fn hinted_insert_returns_hint() {
        let mut dir = RegionDirectory::default();
        let base = dir.insert(va(0x0800_0000), 0x1000, USER_ANON, None);
        assert_eq!(base, Ok(va(0x0800_0000)));
        assert_eq!(dir.lookup(va(0x0800_0FFF)).map(Region::base), Some(va(0x0800_0000)));
        assert!(dir.lookup(va(0x0800_1000)).is_none());
    }

    #[test]
    fn hint_is_aligned_and_size_rounded() {
        let mut dir = RegionDirectory::default();
        let base = dir.insert(va(0x0800_0123), 0x1001, USER_ANON, None).unwrap();
        assert_eq!(base, va(0x0800_0000));
        assert_eq!(dir.lookup(base).unwrap().size(), 0x2000);
    }

    #[test]
    fn contradictory_flags_are_rejected() {
        let mut dir = RegionDirectory::default();
        for flags in [
            USER_ANON | RegionFlags::KERNEL,
            USER_ANON | RegionFlags::SHARED | RegionFlags::PRIVATE,
            USER_ANON | RegionFlags::FILE,
        ] {
            assert_eq!(
                dir.insert(va(0x0800_0000), 0x1000, flags, None),
                Err(InsertError::ConflictingFlags(flags.into_bits()))
            );
        }
        assert!(dir.is_empty());
    }

    #[test]
    fn file_region_needs_backing() {
        let mut dir = RegionDirectory::default();
        let flags = RegionFlags::FILE | RegionFlags::USER;
        assert_eq!(
            dir.insert(va(0x0040_0000), 0x1000, flags, None),
            Err(InsertError::MissingBacking)
        );
        let backing = Backing::new(FileHandle::new(3), 0, 0x10);
        assert!(dir.insert(va(0x0040_0000), 0x1000, flags, Some(backing)).is_ok());
        assert_eq!(dir.lookup(va(0x0040_0000)).unwrap().backing(), Some(&backing));
    }

    #[test]
    fn zero_size_is_rejected() {
        let mut dir = RegionDirectory::default();
        assert_eq!(
            dir.insert(va(0x0800_0000), 0, USER_ANON, None),
            Err(InsertError::ZeroSize)
        );
    }

    #[test]
    fn illegal_hint_is_relocated_into_class() {
        let mut dir = RegionDirectory::default();
        let user = dir.insert(va(0xD000_0000), 0x4000, USER_ANON, None).unwrap();
        assert!(user.as_u32() >= USER_SPACE_START && user.as_u32() + 0x4000 <= USER_SPACE_END);

        let kernel = dir.insert(va(0), 0x4000, KERNEL_ANON, None).unwrap();
        assert!(kernel.as_u32() >= KERNEL_DYNAMIC_START);
        assert!(u64::from(kernel.as_u32()) + 0x4000 <= u64::from(KERNEL_DYNAMIC_END));
        assert_sorted(&dir);
    }

    #[test]
    fn occupied_hint_falls_back_to_best_fit() {
        let mut dir = RegionDirectory::default();
        let flags = KERNEL_ANON;
        let a = KERNEL_DYNAMIC_START;
        dir.insert(va(a), 0x1000, flags, None).unwrap();
        // Leaves a two-page hole at a+0x1000.
        dir.insert(va(a + 0x3000), 0x1000, flags, None).unwrap();

        let base = dir.insert(va(a), 0x2000, flags, None).unwrap();
        assert_eq!(base, va(a + 0x1000));
        assert_sorted(&dir);
    }

    #[test]
    fn best_fit_prefers_smallest_leftover() {
        let mut dir = RegionDirectory::default();
        let flags = KERNEL_ANON;
        let a = KERNEL_DYNAMIC_START;
        dir.insert(va(a), 0x1000, flags, None).unwrap();
        // Four-page hole.
        dir.insert(va(a + 0x5000), 0x1000, flags, None).unwrap();
        // One-page hole.
        dir.insert(va(a + 0x7000), 0x1000, flags, None).unwrap();

        let base = dir.insert(va(a), 0x1000, flags, None).unwrap();
        assert_eq!(base, va(a + 0x6000));
    }

    #[test]
    fn best_fit_tie_goes_to_lowest_gap() {
        let mut dir = RegionDirectory::default();
        let flags = KERNEL_ANON;
        let a = KERNEL_DYNAMIC_START;
        dir.insert(va(a), 0x1000, flags, None).unwrap();
        // Two-page holes at a+0x1000 and a+0x4000.
        dir.insert(va(a + 0x3000), 0x1000, flags, None).unwrap();
        dir.insert(va(a + 0x6000), 0x1000, flags, None).unwrap();

        let base = dir.insert(va(a), 0x2000, flags, None).unwrap();
        assert_eq!(base, va(a + 0x1000));

        let base = dir.insert(va(a), 0x2000, flags, None).unwrap();
        assert_eq!(base, va(a + 0x4000));
        assert_sorted(&dir);
    }

    #[test]
    fn oversized_request_fails_cleanly() {
        let mut dir = RegionDirectory::default();
        dir.insert(va(0x0800_0000), 0x1000, USER_ANON, None).unwrap();
        let before: Vec<_> = dir.iter().copied().collect();

        assert!(matches!(
            dir.insert(va(0x0800_0000), 0xBFFF_F000, USER_ANON, None),
            Err(InsertError::NoSpace { .. })
        ));
        assert_eq!(dir.iter().copied().collect::<Vec<_>>(), before);
    }

    #[test]
    fn whole_user_space_fits_when_empty() {
        let mut dir = RegionDirectory::default();
        let base = dir.insert(va(0x1234_5000), USER_SPACE_END - USER_SPACE_START, USER_ANON, None);
        assert_eq!(base, Ok(va(USER_SPACE_START)));
    }

    #[test]
    fn take_requires_exact_base() {
        let mut dir = RegionDirectory::default();
        let base = dir.insert(va(0x0800_0000), 0x2000, USER_ANON, None).unwrap();
        assert_eq!(
            dir.take(va(0x0800_1000)),
            Err(RemoveError::NotRegionBase { address: va(0x0800_1000), base })
        );
        assert_eq!(dir.take(va(0x0900_0000)), Err(RemoveError::NotFound(va(0x0900_0000))));
        assert_eq!(dir.take(va(0)), Err(RemoveError::Reserved(va(0))));

        let region = dir.take(base).unwrap();
        assert_eq!(region.size(), 0x2000);
        assert!(dir.is_empty());
    }

    #[test]
    fn directory_full() {
        let mut dir = RegionDirectory::default();
        for i in 0..REGION_CAPACITY as u32 - 2 {
            dir.insert(va(0x0100_0000 + i * 0x2000), 0x1000, USER_ANON, None).unwrap();
        }
        assert_eq!(
            dir.insert(va(0x0900_0000), 0x1000, USER_ANON, None),
            Err(InsertError::DirectoryFull)
        );
        assert_eq!(dir.len(), REGION_CAPACITY - 2);
        assert_sorted(&dir);
    }

    #[test]
    fn pages_cover_region() {
        let mut dir = RegionDirectory::default();
        let base = dir.insert(va(0x0800_0000), 0x3000, USER_ANON, None).unwrap();
        let pages: Vec<_> = dir.lookup(base).unwrap().pages().map(|p| p.base()).collect();
        assert_eq!(pages, [va(0x0800_0000), va(0x0800_1000), va(0x0800_2000)]);
    }

    #[test]
    fn flags_display() {
        assert_eq!(USER_ANON.to_string(), "anon|rw|user|private");
        assert_eq!(RegionFlags::RESERVED.to_string(), "reserved");
        assert_eq!(USER_ANON.page_flags(), PageFlags::USER_RW);
        assert_eq!(RegionFlags::KERNEL.page_flags(), PageFlags::KERNEL_RO);
    }
}
