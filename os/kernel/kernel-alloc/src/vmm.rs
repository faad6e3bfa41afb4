//! Virtual Memory Manager (VMM) for the kernel's single address space.
//!
//! [`Vmm`] owns every piece of memory-management state: the frame bitmap, the
//! region directory, the page tables (through their [`TableAccess`]), and the
//! filesystem used to fill file-backed pages. Regions are *reserved* with
//! [`insert`](Vmm::insert) and only become backed by frames page by page, when
//! [`handle_page_fault`](Vmm::handle_page_fault) sees the first touch.
//!
//! # Example
//! ```
//! use kernel_alloc::backing::NoFiles;
//! use kernel_alloc::frame_alloc::BitmapFrameAlloc;
//! use kernel_alloc::region::{RegionDirectory, RegionFlags};
//! use kernel_alloc::vmm::Vmm;
//! use kernel_info::boot::MemoryMapEntry;
//! use kernel_memory_addresses::VirtualAddress;
//! use kernel_vmem::AddressSpace;
//! use kernel_vmem::access::hosted::HostedAccess;
//!
//! let mut frames = BitmapFrameAlloc::from_memory_map(&[MemoryMapEntry::available(0x10_0000, 0x10_0000)]);
//! let access = HostedAccess::new(&mut frames).unwrap();
//! let mut vmm = Vmm::new(frames, RegionDirectory::default(), AddressSpace::new(access), NoFiles);
//!
//! let flags = RegionFlags::ANONYMOUS | RegionFlags::WRITE | RegionFlags::USER;
//! let base = vmm.insert(VirtualAddress::new(0x0800_0000), 0x1000, flags, None).unwrap();
//! vmm.handle_page_fault(base).unwrap();
//! assert!(vmm.translate(base).is_some());
//! ```

use crate::backing::{Backing, BackingError, FileSystem, Whence};
use crate::frame_alloc::BitmapFrameAlloc;
use crate::region::{InsertError, Region, RegionDirectory, RegionFlags, RemoveError};
use kernel_info::memory::{KERNEL_HEAP_HINT, PAGE_SIZE};
use kernel_memory_addresses::{PhysicalAddress, Size4K, VirtualAddress, VirtualPage};
use kernel_vmem::{AddressSpace, FrameAlloc, MapError, PageFlags, PermissionError, TableAccess};

/// Why a page fault could not be resolved. Every variant is fatal.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FaultError {
    #[error("protection violation at {0}: page is already mapped")]
    PermissionViolation(VirtualAddress),
    #[error("no region covers {0}")]
    NoRegion(VirtualAddress),
    #[error("out of physical frames while faulting in {0}")]
    OutOfFrames(VirtualAddress),
    #[error("cannot map {address}: {source}")]
    Map {
        address: VirtualAddress,
        source: MapError,
    },
    #[error("cannot finalize permissions: {0}")]
    Permission(#[from] PermissionError),
    #[error("cannot fill page from backing file: {0}")]
    Backing(#[from] BackingError),
}

/// A user-supplied range failed validation.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum AccessError {
    #[error("{address} does not grant {required} access")]
    Denied {
        address: VirtualAddress,
        required: PageFlags,
    },
    #[error("range of {len:#x} bytes at {ptr} wraps the address space")]
    Wraps { ptr: VirtualAddress, len: u32 },
}

/// The address-space context.
pub struct Vmm<A: TableAccess, F: FileSystem> {
    frames: BitmapFrameAlloc,
    regions: RegionDirectory,
    space: AddressSpace<A>,
    fs: F,
}

impl<A: TableAccess, F: FileSystem> Vmm<A, F> {
    pub const fn new(
        frames: BitmapFrameAlloc,
        regions: RegionDirectory,
        space: AddressSpace<A>,
        fs: F,
    ) -> Self {
        Self {
            frames,
            regions,
            space,
            fs,
        }
    }

    #[must_use]
    pub const fn frames(&self) -> &BitmapFrameAlloc {
        &self.frames
    }

    #[must_use]
    pub const fn regions(&self) -> &RegionDirectory {
        &self.regions
    }

    pub const fn space(&mut self) -> &mut AddressSpace<A> {
        &mut self.space
    }

    /// Reserve a region. See [`RegionDirectory::insert`].
    ///
    /// # Errors
    /// Propagates [`InsertError`].
    pub fn insert(
        &mut self,
        hint: VirtualAddress,
        size: u32,
        flags: RegionFlags,
        backing: Option<Backing>,
    ) -> Result<VirtualAddress, InsertError> {
        self.regions.insert(hint, size, flags, backing)
    }

    /// Remove the region starting at `base`, unmapping its faulted-in pages
    /// and freeing their frames.
    ///
    /// # Errors
    /// Propagates [`RemoveError`]; nothing is unmapped on error.
    pub fn remove(&mut self, base: VirtualAddress) -> Result<Region, RemoveError> {
        let region = self.regions.take(base)?;
        let mut released = 0usize;
        for page in region.pages() {
            if let Ok(frame) = self.space.unmap(&mut self.frames, page) {
                self.frames.free_4k(frame);
                released += 1;
            }
        }
        log::debug!("region {base} released {released} frames");
        Ok(region)
    }

    #[must_use]
    pub fn lookup(&self, va: VirtualAddress) -> Option<&Region> {
        self.regions.lookup(va)
    }

    #[must_use]
    pub fn translate(&mut self, va: VirtualAddress) -> Option<PhysicalAddress> {
        self.space.translate(va)
    }

    /// Resolve a not-present fault at `address` by backing its page.
    ///
    /// The page is installed writable, zeroed, filled from the region's backing
    /// file if it lies within the on-disk extent, and then downgraded to the
    /// region's real permissions.
    ///
    /// # Errors
    /// Any [`FaultError`]. The caller must treat every one as fatal.
    pub fn handle_page_fault(&mut self, address: VirtualAddress) -> Result<(), FaultError> {
        let page = address.page::<Size4K>();
        if self.space.translate(address).is_some() {
            return Err(FaultError::PermissionViolation(address));
        }

        let region = *self
            .regions
            .lookup(address)
            .ok_or(FaultError::NoRegion(address))?;
        let frame = self
            .frames
            .alloc_4k()
            .ok_or(FaultError::OutOfFrames(address))?;

        let staging = PageFlags::new(true, region.flags().is_user());
        if let Err(source) = self.space.map(&mut self.frames, frame, page, staging) {
            self.frames.free_4k(frame);
            return Err(FaultError::Map { address, source });
        }

        // SAFETY: `page` was mapped writable to `frame` just above.
        let bytes = unsafe { self.space.page_mut(page, frame) };
        bytes.fill(0);

        if let Some(backing) = region.backing() {
            let page_offset = page.base().as_u32() - region.base().as_u32();
            if page_offset < backing.disk_len {
                let len = (backing.disk_len - page_offset).min(PAGE_SIZE) as usize;
                let offset = backing.offset.checked_add(page_offset).ok_or(BackingError::Seek {
                    file: backing.file,
                    offset: backing.offset,
                })?;
                self.fs.seek(backing.file, offset, Whence::Set)?;
                let read = self.fs.read(backing.file, &mut bytes[..len])?;
                if read < len {
                    log::debug!("short read for {page:?}: {read} of {len} bytes");
                }
            }
        }

        self.space
            .change_permission(page, region.flags().page_flags())?;
        log::trace!("faulted in {page:?} -> {frame:?}");
        Ok(())
    }

    /// Every page of `[ptr, ptr + len)` is mapped or will be on first touch.
    ///
    /// # Errors
    /// [`AccessError`] naming the first offending page.
    pub fn check_present(&mut self, ptr: VirtualAddress, len: u32) -> Result<(), AccessError> {
        self.check_range(ptr, len, PageFlags::KERNEL_RO)
    }

    /// Like [`check_present`](Self::check_present), and user accessible.
    ///
    /// # Errors
    /// [`AccessError`] naming the first offending page.
    pub fn check_user(&mut self, ptr: VirtualAddress, len: u32) -> Result<(), AccessError> {
        self.check_range(ptr, len, PageFlags::USER_RO)
    }

    /// Like [`check_present`](Self::check_present), and writable.
    ///
    /// # Errors
    /// [`AccessError`] naming the first offending page.
    pub fn check_writable(&mut self, ptr: VirtualAddress, len: u32) -> Result<(), AccessError> {
        self.check_range(ptr, len, PageFlags::KERNEL_RW)
    }

    fn check_range(
        &mut self,
        ptr: VirtualAddress,
        len: u32,
        required: PageFlags,
    ) -> Result<(), AccessError> {
        if len == 0 {
            return Ok(());
        }
        let last = ptr
            .checked_add(len - 1)
            .ok_or(AccessError::Wraps { ptr, len })?;

        let first = ptr.page::<Size4K>().number();
        for page in (first..=last.page::<Size4K>().number()).map(VirtualPage::<Size4K>::from_number) {
            let granted = match self.space.flags_of(page.base()) {
                Some(flags) => flags.grants(required),
                None => self
                    .regions
                    .lookup(page.base())
                    .is_some_and(|r| r.flags().page_flags().grants(required)),
            };
            if !granted {
                return Err(AccessError::Denied {
                    address: page.base(),
                    required,
                });
            }
        }
        Ok(())
    }

    /// Reserve `pages` pages of kernel heap near [`KERNEL_HEAP_HINT`].
    ///
    /// # Errors
    /// Propagates [`InsertError`].
    pub fn grow_kernel_heap(&mut self, pages: u32) -> Result<VirtualAddress, InsertError> {
        let size = pages
            .checked_mul(PAGE_SIZE)
            .ok_or(InsertError::NoSpace {
                size: u64::from(pages) * u64::from(PAGE_SIZE),
            })?;
        let flags = RegionFlags::ANONYMOUS | RegionFlags::WRITE | RegionFlags::KERNEL;
        self.insert(VirtualAddress::new(KERNEL_HEAP_HINT), size, flags, None)
    }

    /// Give back a block obtained from [`grow_kernel_heap`](Self::grow_kernel_heap).
    ///
    /// # Errors
    /// Propagates [`RemoveError`].
    pub fn release_kernel_heap(&mut self, base: VirtualAddress) -> Result<(), RemoveError> {
        self.remove(base).map(|_| ())
    }

    /// Log the region directory and a frame usage summary.
    pub fn dump(&self) {
        self.regions.dump();
        log::info!("{} frames free", self.frames.free_count());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::NoFiles;
    use kernel_info::boot::MemoryMapEntry;
    use kernel_vmem::access::hosted::HostedAccess;

    fn va(v: u32) -> VirtualAddress {
        VirtualAddress::new(v)
    }

    fn vmm() -> Vmm<HostedAccess, NoFiles> {
        let mut frames =
            BitmapFrameAlloc::from_memory_map(&[MemoryMapEntry::available(0x10_0000, 0x4_0000)]);
        let access = HostedAccess::new(&mut frames).unwrap();
        Vmm::new(frames, RegionDirectory::default(), AddressSpace::new(access), NoFiles)
    }

    const USER_RW: RegionFlags = RegionFlags::ANONYMOUS
        .with_write(true)
        .with_user(true);

    #[test]
    fn fault_maps_zeroed_user_page() {
        let mut vmm = vmm();
        let base = vmm.insert(va(0x0800_0000), 0x1000, USER_RW, None).unwrap();
        vmm.handle_page_fault(base + 0x123).unwrap();

        assert_eq!(vmm.space().flags_of(base), Some(PageFlags::USER_RW));
        let frame = vmm.space().frame_of(base.page()).unwrap();
        assert!(vmm.space().access().frame_bytes(frame).iter().all(|&b| b == 0));
    }

    #[test]
    fn read_only_region_is_downgraded() {
        let mut vmm = vmm();
        let flags = RegionFlags::ANONYMOUS | RegionFlags::USER;
        let base = vmm.insert(va(0x0800_0000), 0x1000, flags, None).unwrap();
        vmm.handle_page_fault(base).unwrap();
        assert_eq!(vmm.space().flags_of(base), Some(PageFlags::USER_RO));
    }

    #[test]
    fn second_fault_is_permission_violation() {
        let mut vmm = vmm();
        let base = vmm.insert(va(0x0800_0000), 0x1000, USER_RW, None).unwrap();
        vmm.handle_page_fault(base).unwrap();
        assert_eq!(
            vmm.handle_page_fault(base + 8),
            Err(FaultError::PermissionViolation(base + 8))
        );
    }

    #[test]
    fn fault_outside_regions_is_fatal() {
        let mut vmm = vmm();
        let free = vmm.frames().free_count();
        assert_eq!(vmm.handle_page_fault(va(0x10)), Err(FaultError::NoRegion(va(0x10))));
        assert_eq!(
            vmm.handle_page_fault(va(0x0900_0000)),
            Err(FaultError::NoRegion(va(0x0900_0000)))
        );
        assert_eq!(vmm.frames().free_count(), free);
    }

    #[test]
    fn fault_without_frames_is_fatal() {
        let mut vmm = vmm();
        let base = vmm.insert(va(0x0800_0000), 0x1000, USER_RW, None).unwrap();
        while vmm.frames.alloc_4k().is_some() {}
        assert_eq!(vmm.handle_page_fault(base), Err(FaultError::OutOfFrames(base)));
    }

    #[test]
    fn file_offset_past_4g_is_a_seek_error() {
        let mut vmm = vmm();
        let file = crate::backing::FileHandle::new(0);
        let base = vmm
            .insert(
                va(0x0040_0000),
                0x2000,
                RegionFlags::FILE | RegionFlags::USER,
                Some(Backing::new(file, 0xFFFF_F800, 0x2000)),
            )
            .unwrap();
        assert_eq!(
            vmm.handle_page_fault(base + 0x1000),
            Err(FaultError::Backing(BackingError::Seek {
                file,
                offset: 0xFFFF_F800
            }))
        );
    }

    #[test]
    fn remove_frees_faulted_frames() {
        let mut vmm = vmm();
        let free = vmm.frames().free_count();
        let base = vmm.insert(va(0x0800_0000), 0x3000, USER_RW, None).unwrap();
        vmm.handle_page_fault(base).unwrap();
        vmm.handle_page_fault(base + 0x2000).unwrap();
        // Two pages plus their page table.
        assert_eq!(vmm.frames().free_count(), free - 3);

        vmm.remove(base).unwrap();
        assert_eq!(vmm.frames().free_count(), free);
        assert_eq!(vmm.translate(base), None);
        assert!(vmm.lookup(base).is_none());
    }

    #[test]
    fn pointer_checks_follow_regions_and_mappings() {
        let mut vmm = vmm();
        let ro = vmm
            .insert(va(0x0800_0000), 0x2000, RegionFlags::ANONYMOUS | RegionFlags::USER, None)
            .unwrap();
        let rw = vmm.insert(va(0x0800_2000), 0x1000, USER_RW, None).unwrap();
        vmm.handle_page_fault(ro).unwrap();

        assert_eq!(vmm.check_user(ro, 0x3000), Ok(()));
        assert_eq!(vmm.check_writable(rw, 0x1000), Ok(()));
        assert_eq!(
            vmm.check_writable(ro + 0xFFF, 2),
            Err(AccessError::Denied { address: ro, required: PageFlags::KERNEL_RW })
        );
        assert_eq!(
            vmm.check_present(rw, 0x1001),
            Err(AccessError::Denied { address: va(0x0800_3000), required: PageFlags::KERNEL_RO })
        );
        assert_eq!(vmm.check_present(va(0), 0), Ok(()));
        assert_eq!(
            vmm.check_present(va(0xFFFF_FFF0), 0x20),
            Err(AccessError::Wraps { ptr: va(0xFFFF_FFF0), len: 0x20 })
        );
    }

    #[test]
    fn kernel_pages_fail_user_check() {
        let mut vmm = vmm();
        let heap = vmm.grow_kernel_heap(2).unwrap();
        assert!(vmm.check_writable(heap, 0x2000).is_ok());
        assert!(matches!(vmm.check_user(heap, 1), Err(AccessError::Denied { .. })));
    }

    #[test]
    fn kernel_heap_round_trip() {
        let mut vmm = vmm();
        let heap = vmm.grow_kernel_heap(4).unwrap();
        assert_eq!(heap, va(KERNEL_HEAP_HINT));
        vmm.handle_page_fault(heap + 0x1000).unwrap();
        assert_eq!(vmm.space().flags_of(heap + 0x1000), Some(PageFlags::KERNEL_RW));

        let next = vmm.grow_kernel_heap(1).unwrap();
        assert_eq!(next, heap + 0x4000);

        vmm.release_kernel_heap(heap).unwrap();
        assert_eq!(vmm.translate(heap + 0x1000), None);
        assert_eq!(
            vmm.release_kernel_heap(heap),
            Err(RemoveError::NotFound(heap))
        );
    }
}
