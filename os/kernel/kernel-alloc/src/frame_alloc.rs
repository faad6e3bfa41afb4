//! Bitmap physical frame allocator.
//!
//! One bit per 4 KiB frame, set = used. The bitmap starts fully used
//! ([`clear`](BitmapFrameAlloc::clear)); the boot memory map then frees what
//! is actually RAM. Frame 0 is never handed out, so a frame address is never
//! ambiguous with "nothing".

use core::fmt;
use kernel_info::boot::MemoryMapEntry;
use kernel_info::memory::{FRAME_BITMAP_FRAMES, PAGE_SIZE};
use kernel_memory_addresses::{PhysicalAddress, PhysicalPage, Size4K};
use kernel_vmem::{FrameAlloc, PageTable};

const WORDS: usize = FRAME_BITMAP_FRAMES / 32;

/// Allocation state of one frame.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameStatus {
    Free,
    Used,
}

/// Fixed-size bitmap over the first [`FRAME_BITMAP_FRAMES`] frames of RAM.
pub struct BitmapFrameAlloc {
    words: [u32; WORDS],
}

impl Default for BitmapFrameAlloc {
    fn default() -> Self {
        Self::new()
    }
}

impl BitmapFrameAlloc {
    /// A bitmap with every frame used.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            words: [u32::MAX; WORDS],
        }
    }

    /// Seed from the boot memory map.
    ///
    /// Every frame lying entirely inside an available range becomes free;
    /// frame 0 and everything beyond the bitmap stay used.
    #[must_use]
    pub fn from_memory_map(entries: &[MemoryMapEntry]) -> Self {
        let mut this = Self::new();
        let covered = FRAME_BITMAP_FRAMES as u64 * u64::from(PAGE_SIZE);
        let page = u64::from(PAGE_SIZE);

        for entry in entries.iter().filter(|e| e.is_available()) {
            let start = entry.base.div_ceil(page);
            let end = entry.end().min(covered) / page;
            log::debug!(
                "available RAM {:#x}..{:#x}: frames {start:#x}..{end:#x}",
                entry.base,
                entry.end()
            );
            for number in start..end {
                #[allow(clippy::cast_possible_truncation)]
                this.set(number as usize, false);
            }
        }

        this.reserve_frame_zero();
        this
    }

    /// Mark every frame used.
    pub fn clear(&mut self) {
        self.words.fill(u32::MAX);
    }

    /// Mark the frame containing `addr` used. Out-of-range frames are ignored.
    pub fn mark_used(&mut self, addr: PhysicalAddress) {
        if let Some(index) = Self::index(addr) {
            self.set(index, true);
        }
    }

    /// Mark the frame containing `addr` free.
    ///
    /// Out-of-range frames and frame 0 are ignored.
    pub fn mark_free(&mut self, addr: PhysicalAddress) {
        match Self::index(addr) {
            Some(0) => log::warn!("refusing to free reserved frame 0"),
            Some(index) => self.set(index, false),
            None => {}
        }
    }

    /// Status of the frame containing `addr`; frames beyond the bitmap are used.
    #[must_use]
    pub fn status(&self, addr: PhysicalAddress) -> FrameStatus {
        match Self::index(addr) {
            Some(index) if !self.is_set(index) => FrameStatus::Free,
            _ => FrameStatus::Used,
        }
    }

    /// First free frame in ascending address order. Does not mark it.
    #[must_use]
    pub fn find_free(&self) -> Option<PhysicalPage<Size4K>> {
        let (w, word) = self
            .words
            .iter()
            .enumerate()
            .find(|(_, word)| **word != u32::MAX)?;
        let index = w * 32 + word.trailing_ones() as usize;
        #[allow(clippy::cast_possible_truncation)]
        Some(PhysicalPage::from_number(index as u32))
    }

    /// Frame 0 is permanently used.
    pub fn reserve_frame_zero(&mut self) {
        self.set(0, true);
    }

    /// Mark used every frame a loader page table maps.
    pub fn reserve_loader_table(&mut self, table: &PageTable) {
        for (_, entry) in table.present() {
            if let Some((frame, _)) = entry.page_4k() {
                self.mark_used(frame.base());
            }
        }
    }

    /// Number of free frames.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.words.iter().map(|w| w.count_zeros() as usize).sum()
    }

    /// Log the bitmap as runs of used and free frames.
    pub fn dump(&self) {
        log::info!("=== FRAME BITMAP ({} free) ===", self.free_count());
        for run in self.runs() {
            log::info!("{run}");
        }
    }

    /// Maximal runs of frames with equal status, in address order.
    pub fn runs(&self) -> impl Iterator<Item = FrameRun> + '_ {
        let mut next = 0usize;
        core::iter::from_fn(move || {
            if next >= FRAME_BITMAP_FRAMES {
                return None;
            }
            let used = self.is_set(next);
            let start = next;
            while next < FRAME_BITMAP_FRAMES && self.is_set(next) == used {
                next += 1;
            }
            Some(FrameRun {
                start,
                frames: next - start,
                status: if used { FrameStatus::Used } else { FrameStatus::Free },
            })
        })
    }

    fn index(addr: PhysicalAddress) -> Option<usize> {
        let index = addr.page::<Size4K>().number() as usize;
        (index < FRAME_BITMAP_FRAMES).then_some(index)
    }

    const fn is_set(&self, index: usize) -> bool {
        self.words[index / 32] & (1 << (index % 32)) != 0
    }

    const fn set(&mut self, index: usize, used: bool) {
        let mask = 1 << (index % 32);
        if used {
            self.words[index / 32] |= mask;
        } else {
            self.words[index / 32] &= !mask;
        }
    }
}

impl FrameAlloc for BitmapFrameAlloc {
    fn alloc_4k(&mut self) -> Option<PhysicalPage<Size4K>> {
        let frame = self.find_free()?;
        self.mark_used(frame.base());
        Some(frame)
    }

    fn free_4k(&mut self, frame: PhysicalPage<Size4K>) {
        self.mark_free(frame.base());
    }
}

/// A run of consecutive frames sharing one status.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FrameRun {
    /// First frame number.
    pub start: usize,
    pub frames: usize,
    pub status: FrameStatus,
}

impl fmt::Display for FrameRun {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let page = PAGE_SIZE as usize;
        write!(
            f,
            "0x{:08X}..0x{:08X} {:?} ({} frames)",
            self.start * page,
            (self.start + self.frames) * page,
            self.status,
            self.frames
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kernel_vmem::PageFlags;

    fn pa(v: u32) -> PhysicalAddress {
        PhysicalAddress::new(v)
    }

    #[test]
    fn starts_fully_used() {
        let alloc = BitmapFrameAlloc::new();
        assert_eq!(alloc.find_free(), None);
        assert_eq!(alloc.free_count(), 0);
    }

    #[test]
    fn single_free_frame() {
        let mut alloc = BitmapFrameAlloc::new();
        alloc.mark_free(pa(0x0010_0000));
        assert_eq!(alloc.status(pa(0x0010_0000)), FrameStatus::Free);
        assert_eq!(alloc.find_free().map(PhysicalPage::base), Some(pa(0x0010_0000)));

        alloc.mark_used(pa(0x0010_0000));
        assert_eq!(alloc.find_free(), None);
    }

    #[test]
    fn frame_zero_stays_reserved() {
        let mut alloc = BitmapFrameAlloc::from_memory_map(&[MemoryMapEntry::available(0, 0x4000)]);
        assert_eq!(alloc.status(pa(0)), FrameStatus::Used);
        alloc.mark_free(pa(0));
        assert_eq!(alloc.status(pa(0)), FrameStatus::Used);
        assert_eq!(alloc.find_free().map(PhysicalPage::base), Some(pa(0x1000)));
    }

    #[test]
    fn memory_map_partial_frames_stay_used() {
        let alloc = BitmapFrameAlloc::from_memory_map(&[
            MemoryMapEntry::available(0x0010_0800, 0x2000),
            MemoryMapEntry::reserved(0x0020_0000, 0x1000),
        ]);
        assert_eq!(alloc.status(pa(0x0010_0000)), FrameStatus::Used);
        assert_eq!(alloc.status(pa(0x0010_1000)), FrameStatus::Free);
        assert_eq!(alloc.status(pa(0x0010_2000)), FrameStatus::Used);
        assert_eq!(alloc.status(pa(0x0020_0000)), FrameStatus::Used);
        assert_eq!(alloc.free_count(), 1);
    }

    #[test]
    fn memory_map_is_clipped_to_bitmap() {
        let alloc = BitmapFrameAlloc::from_memory_map(&[MemoryMapEntry::available(
            0x0010_0000,
            0x1_0000_0000,
        )]);
        assert_eq!(alloc.free_count(), FRAME_BITMAP_FRAMES - 0x100);
        assert_eq!(alloc.status(pa(0x0800_0000)), FrameStatus::Used);
    }

    #[test]
    fn allocations_are_distinct() {
        let mut alloc =
            BitmapFrameAlloc::from_memory_map(&[MemoryMapEntry::available(0x0010_0000, 0x8000)]);
        let frames: Vec<_> = core::iter::from_fn(|| alloc.alloc_4k()).collect();
        assert_eq!(frames.len(), 8);
        let mut dedup = frames.clone();
        dedup.dedup();
        assert_eq!(dedup, frames);
        assert_eq!(alloc.free_count(), 0);

        alloc.free_4k(frames[3]);
        assert_eq!(alloc.alloc_4k(), Some(frames[3]));
    }

    #[test]
    fn loader_table_frames_are_reserved() {
        let mut alloc =
            BitmapFrameAlloc::from_memory_map(&[MemoryMapEntry::available(0x0010_0000, 0x4000)]);
        let mut table = PageTable::zeroed();
        table.set(
            kernel_vmem::PtIndex::new(0),
            kernel_vmem::PtEntry::leaf(PhysicalPage::from_number(0x101), PageFlags::KERNEL_RW),
        );
        alloc.reserve_loader_table(&table);
        assert_eq!(alloc.status(pa(0x0010_1000)), FrameStatus::Used);
        assert_eq!(alloc.free_count(), 3);
    }

    #[test]
    fn runs_describe_bitmap() {
        let alloc =
            BitmapFrameAlloc::from_memory_map(&[MemoryMapEntry::available(0x2000, 0x2000)]);
        let runs: Vec<_> = alloc.runs().take(3).collect();
        assert_eq!(runs[0], FrameRun { start: 0, frames: 2, status: FrameStatus::Used });
        assert_eq!(runs[1], FrameRun { start: 2, frames: 2, status: FrameStatus::Free });
        assert_eq!(runs[2].start, 4);
        assert_eq!(runs[1].to_string(), "0x00002000..0x00004000 Free (2 frames)");
    }
}
