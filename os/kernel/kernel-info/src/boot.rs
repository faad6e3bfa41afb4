//! # Boot Memory Map
//!
//! The loader hands the kernel a list of physical ranges in the multiboot
//! layout. Only ranges tagged [`MemoryKind::Available`] may seed the frame
//! allocator; everything else stays used.

/// Classification of a physical range, using the multiboot type codes.
#[repr(u32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum MemoryKind {
    /// Usable RAM.
    Available = 1,
    /// Firmware or device memory.
    Reserved = 2,
    /// ACPI tables; reclaimable once parsed.
    AcpiReclaimable = 3,
    /// ACPI non-volatile storage.
    AcpiNvs = 4,
    /// Defective RAM.
    Defective = 5,
}

impl MemoryKind {
    /// Decode a raw multiboot type. Unknown codes are treated as reserved.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Available,
            3 => Self::AcpiReclaimable,
            4 => Self::AcpiNvs,
            5 => Self::Defective,
            _ => Self::Reserved,
        }
    }
}

/// One physical range `[base, base + len)` of the boot memory map.
///
/// Base and length are 64-bit because firmware may report ranges above 4 GiB;
/// consumers clip them to what they can address.
#[repr(C)]
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct MemoryMapEntry {
    pub base: u64,
    pub len: u64,
    pub kind: MemoryKind,
}

impl MemoryMapEntry {
    #[must_use]
    pub const fn available(base: u64, len: u64) -> Self {
        Self {
            base,
            len,
            kind: MemoryKind::Available,
        }
    }

    #[must_use]
    pub const fn reserved(base: u64, len: u64) -> Self {
        Self {
            base,
            len,
            kind: MemoryKind::Reserved,
        }
    }

    /// Exclusive end of the range, saturating at `u64::MAX`.
    #[must_use]
    pub const fn end(&self) -> u64 {
        self.base.saturating_add(self.len)
    }

    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self.kind, MemoryKind::Available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_kinds_are_reserved() {
        assert_eq!(MemoryKind::from_raw(1), MemoryKind::Available);
        assert_eq!(MemoryKind::from_raw(42), MemoryKind::Reserved);
    }

    #[test]
    fn end_saturates() {
        let e = MemoryMapEntry::available(u64::MAX - 1, 16);
        assert_eq!(e.end(), u64::MAX);
        assert!(e.is_available());
        assert!(!MemoryMapEntry::reserved(0, 0x1000).is_available());
    }
}
