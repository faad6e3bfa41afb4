use crate::{MemoryAddress, PageSize};
use core::fmt;
use core::marker::PhantomData;

/// A page base address (lower `S::SHIFT` bits are zero).
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct MemoryPage<S: PageSize> {
    value: u32,
    _phantom: PhantomData<S>,
}

impl<S: PageSize> MemoryPage<S> {
    /// Page that contains `addr` (aligns down).
    #[inline]
    #[must_use]
    pub const fn containing(addr: MemoryAddress) -> Self {
        Self {
            value: addr.as_u32() & !S::OFFSET_MASK,
            _phantom: PhantomData,
        }
    }

    /// Page starting exactly at `addr`, or `None` if `addr` is unaligned.
    #[inline]
    #[must_use]
    pub const fn from_aligned(addr: MemoryAddress) -> Option<Self> {
        if addr.is_aligned::<S>() {
            Some(Self::containing(addr))
        } else {
            None
        }
    }

    /// Page with the given page number (`addr >> S::SHIFT`).
    #[inline]
    #[must_use]
    pub const fn from_number(number: u32) -> Self {
        Self {
            value: number << S::SHIFT,
            _phantom: PhantomData,
        }
    }

    /// Return the base as `MemoryAddress`.
    #[inline]
    #[must_use]
    pub const fn base(self) -> MemoryAddress {
        MemoryAddress::new(self.value)
    }

    /// The page number, i.e. the base shifted right by `S::SHIFT`.
    #[inline]
    #[must_use]
    pub const fn number(self) -> u32 {
        self.value >> S::SHIFT
    }

    /// Combine with an in-page offset to form a full address.
    #[inline]
    #[must_use]
    pub const fn join(self, offset: u32) -> MemoryAddress {
        debug_assert!(offset < S::SIZE, "offset must be < page size");
        MemoryAddress::new(self.value | (offset & S::OFFSET_MASK))
    }

    /// The following page, or `None` at the top of the address space.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self.value.checked_add(S::SIZE) {
            Some(value) => Some(Self {
                value,
                _phantom: PhantomData,
            }),
            None => None,
        }
    }
}

impl<S> fmt::Display for MemoryPage<S>
where
    S: PageSize,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}/{}", self.value, S::as_str())
    }
}

impl<S: PageSize> fmt::Debug for MemoryPage<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryPage<{}>(0x{:08X})", S::as_str(), self.value)
    }
}

impl<S: PageSize> From<MemoryAddress> for MemoryPage<S> {
    #[inline]
    fn from(addr: MemoryAddress) -> Self {
        Self::containing(addr)
    }
}
