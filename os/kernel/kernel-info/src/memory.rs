//! # Memory Layout

/// Size of a page and of a physical frame.
pub const PAGE_SIZE: u32 = 4096;

/// Number of entries in a page directory and in a page table.
pub const TABLE_ENTRIES: usize = 1024;

/// End (exclusive) of the userspace VA range. User regions lie entirely below.
pub const USER_SPACE_END: u32 = 0xC000_0000;

/// Lowest address a user region may start at; page 0 stays unmapped.
pub const USER_SPACE_START: u32 = PAGE_SIZE;

/// Where the kernel executes (VMA), matches the loader's linker script.
pub const KERNEL_BASE: u32 = 0xC000_0000;

/// Start of the window in which kernel regions are placed.
///
/// The first 2 MiB above [`KERNEL_BASE`] hold the kernel image, mapped by the
/// loader's scratch page table.
pub const KERNEL_DYNAMIC_START: u32 = 0xC020_0000;

/// End (exclusive) of the kernel dynamic window.
pub const KERNEL_DYNAMIC_END: u32 = SELF_MAP_BASE;

/// Preferred base for kernel heap growth.
pub const KERNEL_HEAP_HINT: u32 = KERNEL_DYNAMIC_START;

/// Page-directory slot whose table maps every page table.
pub const SELF_MAP_SLOT: usize = 1023;

/// Base of the page-table window: table `i` is visible at `SELF_MAP_BASE | (i << 12)`.
pub const SELF_MAP_BASE: u32 = 0xFFC0_0000;

/// Maximum number of entries in the region directory, sentinels included.
pub const REGION_CAPACITY: usize = 1024;

/// Number of physical frames tracked by the frame bitmap (128 MiB of RAM).
pub const FRAME_BITMAP_FRAMES: usize = 32 * 1024;

/// Interrupt vector of the page-fault exception.
pub const PAGE_FAULT_VECTOR: u8 = 0x0E;

const _: () = {
    assert!(PAGE_SIZE.is_power_of_two());
    assert!(TABLE_ENTRIES * 4 == PAGE_SIZE as usize);
    assert!(USER_SPACE_END <= KERNEL_BASE);
    assert!(KERNEL_DYNAMIC_START >= KERNEL_BASE);
    assert!(KERNEL_DYNAMIC_START.is_multiple_of(PAGE_SIZE));
    assert!(KERNEL_DYNAMIC_END > KERNEL_DYNAMIC_START);
    assert!((SELF_MAP_BASE >> 22) as usize == SELF_MAP_SLOT);
    assert!(SELF_MAP_SLOT == TABLE_ENTRIES - 1);
    assert!(FRAME_BITMAP_FRAMES.is_multiple_of(32));
    assert!(REGION_CAPACITY > 2);
};
