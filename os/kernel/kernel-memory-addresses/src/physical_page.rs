use crate::{MemoryPage, PageSize, PhysicalAddress};
use core::fmt;

/// Physical memory page base for size `S`.
///
/// For [`Size4K`](crate::Size4K) this is a *frame*: the unit the frame
/// allocator hands out and the target of every leaf mapping.
///
/// ### Invariants
/// - The low `S::SHIFT` bits of the base are always zero (page aligned).
///
/// ### Examples
/// ```rust
/// # use kernel_memory_addresses::*;
/// let frame = PhysicalPage::<Size4K>::from_number(0x100);
/// assert_eq!(frame.base(), PhysicalAddress::new(0x0010_0000));
/// assert_eq!(PhysicalPage::<Size4K>::from_aligned(PhysicalAddress::new(0x0010_0001)), None);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PhysicalPage<S: PageSize>(MemoryPage<S>);

impl<S: PageSize> PhysicalPage<S> {
    /// Page that contains `addr` (aligns down to page boundary).
    #[inline]
    #[must_use]
    pub const fn containing_address(addr: PhysicalAddress) -> Self {
        Self(MemoryPage::containing(addr.0))
    }

    /// Page starting exactly at `addr`, or `None` if `addr` is unaligned.
    #[inline]
    #[must_use]
    pub const fn from_aligned(addr: PhysicalAddress) -> Option<Self> {
        match MemoryPage::from_aligned(addr.0) {
            Some(p) => Some(Self(p)),
            None => None,
        }
    }

    /// Page with the given frame number.
    #[inline]
    #[must_use]
    pub const fn from_number(number: u32) -> Self {
        Self(MemoryPage::from_number(number))
    }

    #[inline]
    #[must_use]
    pub const fn base(self) -> PhysicalAddress {
        PhysicalAddress(self.0.base())
    }

    #[inline]
    #[must_use]
    pub const fn number(self) -> u32 {
        self.0.number()
    }

    #[inline]
    #[must_use]
    pub const fn join(self, offset: u32) -> PhysicalAddress {
        PhysicalAddress(self.0.join(offset))
    }
}

impl<S: PageSize> fmt::Display for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl<S: PageSize> fmt::Debug for PhysicalPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PhysicalPage<{}>(0x{:08X})",
            S::as_str(),
            self.0.base().as_u32()
        )
    }
}

impl<S: PageSize> TryFrom<PhysicalAddress> for PhysicalPage<S> {
    type Error = ();

    #[inline]
    fn try_from(pa: PhysicalAddress) -> Result<Self, ()> {
        Self::from_aligned(pa).ok_or(())
    }
}
