//! # Memory Page Table
//!
//! Two-level 32-bit paging: a [`PageDirectory`](pd::PageDirectory) of 1024
//! links, each to a [`PageTable`](pt::PageTable) of 1024 4 KiB leaves.
//!
//! ```text
//! | 31‒22 | 21‒12 | 11‒0   |
//! |  PD   |  PT   | Offset |
//! ```

pub mod pd;
pub mod pt;

use crate::page_table::pd::PdIndex;
use crate::page_table::pt::PtIndex;
use core::fmt;
use kernel_memory_addresses::VirtualAddress;

/// Permission bits of a leaf mapping. Presence is implied.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct PageFlags {
    /// Writes are allowed.
    pub writable: bool,
    /// CPL 3 may access the page.
    pub user: bool,
}

impl PageFlags {
    pub const KERNEL_RO: Self = Self::new(false, false);
    pub const KERNEL_RW: Self = Self::new(true, false);
    pub const USER_RO: Self = Self::new(false, true);
    pub const USER_RW: Self = Self::new(true, true);

    #[inline]
    #[must_use]
    pub const fn new(writable: bool, user: bool) -> Self {
        Self { writable, user }
    }

    /// `true` if every permission in `required` is granted by `self`.
    #[inline]
    #[must_use]
    pub const fn grants(self, required: Self) -> bool {
        (self.writable || !required.writable) && (self.user || !required.user)
    }
}

impl fmt::Display for PageFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.writable { "rw" } else { "r-" })?;
        f.write_str(if self.user { "u" } else { "k" })
    }
}

#[inline]
#[must_use]
pub const fn split_indices(va: VirtualAddress) -> (PdIndex, PtIndex) {
    (PdIndex::from(va), PtIndex::from(va))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_ok() {
        let (pd, pt) = split_indices(VirtualAddress::new(0x0840_3123));
        assert_eq!(pd.as_usize(), 0x21);
        assert_eq!(pt.as_usize(), 3);
    }

    #[test]
    fn grants_is_a_superset_check() {
        assert!(PageFlags::USER_RW.grants(PageFlags::USER_RO));
        assert!(!PageFlags::KERNEL_RW.grants(PageFlags::USER_RO));
        assert!(!PageFlags::USER_RO.grants(PageFlags::new(true, false)));
        assert_eq!(PageFlags::USER_RO.to_string(), "r-u");
    }
}
