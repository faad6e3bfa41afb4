use crate::{MemoryPage, PageSize, VirtualAddress};
use core::fmt;

/// Virtual memory page base for size `S`.
///
/// A `VirtualPage<S>` represents the **page-aligned base** of a virtual page of
/// size `S` (`S::SIZE` bytes). It is a thin wrapper over [`MemoryPage<S>`] with
/// virtual-address intent.
///
/// ### Semantics
/// - `base()` returns the page base as a [`VirtualAddress`].
/// - `join(off)` combines this base with an in-page offset.
/// - `next()` steps to the following page and stops at the 4 GiB boundary.
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let va = VirtualAddress::new(0x0040_2050);
/// let vp = va.page::<Size4K>();
/// assert_eq!(vp.base().as_u32(), 0x0040_2000);
/// assert_eq!(vp.next().map(VirtualPage::base), Some(VirtualAddress::new(0x0040_3000)));
/// assert_eq!(VirtualAddress::new(0xFFFF_F000).page::<Size4K>().next(), None);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct VirtualPage<S: PageSize>(MemoryPage<S>);

impl<S: PageSize> VirtualPage<S> {
    /// Page that contains `addr` (aligns down to page boundary).
    #[inline]
    #[must_use]
    pub const fn containing_address(addr: VirtualAddress) -> Self {
        Self(MemoryPage::containing(addr.0))
    }

    /// Page starting exactly at `addr`, or `None` if `addr` is unaligned.
    #[inline]
    #[must_use]
    pub const fn from_aligned(addr: VirtualAddress) -> Option<Self> {
        match MemoryPage::from_aligned(addr.0) {
            Some(p) => Some(Self(p)),
            None => None,
        }
    }

    /// Page with the given page number.
    #[inline]
    #[must_use]
    pub const fn from_number(number: u32) -> Self {
        Self(MemoryPage::from_number(number))
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> VirtualAddress {
        VirtualAddress(self.0.base())
    }

    #[inline]
    #[must_use]
    pub const fn number(self) -> u32 {
        self.0.number()
    }

    #[inline]
    #[must_use]
    pub const fn join(self, offset: u32) -> VirtualAddress {
        VirtualAddress(self.0.join(offset))
    }

    #[inline]
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self.0.next() {
            Some(p) => Some(Self(p)),
            None => None,
        }
    }
}

impl<S> fmt::Display for VirtualPage<S>
where
    S: PageSize,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl<S: PageSize> fmt::Debug for VirtualPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "VirtualPage<{}>(0x{:08X})",
            S::as_str(),
            self.0.base().as_u32()
        )
    }
}

impl<S: PageSize> TryFrom<VirtualAddress> for VirtualPage<S> {
    type Error = ();

    #[inline]
    fn try_from(va: VirtualAddress) -> Result<Self, ()> {
        Self::from_aligned(va).ok_or(())
    }
}
