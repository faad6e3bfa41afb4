use bitfield_struct::bitfield;
use kernel_memory_addresses::{PhysicalPage, Size4K};

/// A single 32-bit x86 paging entry in its raw bitfield form.
///
/// Without PAE, page-directory entries (PDE) and page-table entries (PTE)
/// share one 32-bit layout; only bit 7 differs in meaning. This type models
/// that common superset; [`PdEntry`](crate::page_table::pd::PdEntry) and
/// [`PtEntry`](crate::page_table::pt::PtEntry) wrap it with level-specific
/// helpers.
///
/// ### Bit layout
///
/// | Bits      | Name / Mnemonic   | Meaning |
/// |-----------|-------------------|----------|
/// | 0         | `P` (present)     | Valid entry if set |
/// | 1         | `RW`              | Writable if set |
/// | 2         | `US`              | User-mode accessible if set |
/// | 3         | `PWT`             | Write-through caching |
/// | 4         | `PCD`             | Disable caching |
/// | 5         | `A`               | Accessed |
/// | 6         | `D`               | Dirty (PTE only) |
/// | 7         | `PS` / `PAT`      | 4 MiB page (PDE) / PAT index (PTE) |
/// | 8         | `G`               | Global (PTE only) |
/// | 9–11      | OS avail          | Reserved for OS use |
/// | 12–31     | `frame`           | Physical frame number |
///
/// ### Notes
/// - The paging code never sets `PS`: every directory entry points at a page
///   table and every leaf is 4 KiB.
/// - For a directory entry, `RW` and `US` gate the whole 4 MiB span; the CPU
///   takes the most restrictive combination of PDE and PTE.
///
/// ### Example
/// ```rust
/// # use kernel_vmem::PageEntryBits;
/// # use kernel_memory_addresses::{PhysicalPage, Size4K};
/// let mut e = PageEntryBits::new().with_present(true).with_writable(true);
/// e.set_frame(PhysicalPage::<Size4K>::from_number(0x123));
/// assert_eq!(e.into_bits(), 0x0012_3003);
/// ```
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    /// Present (P, bit 0).
    ///
    /// Clear implies a not-present entry; any access through it faults.
    pub present: bool,

    /// Writable (RW, bit 1).
    ///
    /// Clear makes the mapping read-only for user mode, and for supervisor
    /// mode when `CR0.WP` is set.
    pub writable: bool,

    /// User/Supervisor (US, bit 2).
    ///
    /// When set, the mapping is accessible from CPL 3.
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5). Set by the CPU on first access.
    pub accessed: bool,

    /// Dirty (D, bit 6). Set by the CPU on first write to a 4 KiB page.
    pub dirty: bool,

    /// Page Size (PDE) / PAT (PTE), bit 7.
    pub large_page: bool,

    /// Global (G, bit 8). Survives CR3 reloads when `CR4.PGE` is set.
    pub global_translation: bool,

    /// Bits 9–11, available to the OS.
    #[bits(3)]
    pub os_available: u8,

    /// Bits 12–31, physical frame number.
    #[bits(20)]
    frame_number: u32,
}

impl PageEntryBits {
    #[inline]
    pub const fn set_frame(&mut self, frame: PhysicalPage<Size4K>) {
        self.set_frame_number(frame.number());
    }

    #[inline]
    #[must_use]
    pub const fn frame(&self) -> PhysicalPage<Size4K> {
        PhysicalPage::from_number(self.frame_number())
    }
}
