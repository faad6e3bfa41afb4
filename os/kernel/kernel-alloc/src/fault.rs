//! Page-fault entry glue.
//!
//! The interrupt subsystem owns the vector table; this module only hands it a
//! handler for vector `0x0E` through [`FaultVectorRegistry`]. On 32-bit x86
//! the registered trampoline reads CR2, resolves the fault through the
//! [`Vmm`], and halts the machine when that is impossible.

use crate::backing::FileSystem;
use crate::vmm::{FaultError, Vmm};
use bitfield_struct::bitfield;
use kernel_memory_addresses::VirtualAddress;
use kernel_sync::IrqGuard;
use kernel_vmem::TableAccess;

pub use kernel_info::memory::PAGE_FAULT_VECTOR;

/// Entry point the interrupt subsystem calls: vector, CPU error code, and the
/// context pointer given at registration.
pub type FaultHandlerFn = fn(vector: u8, error_code: u32, context: *mut ());

/// Where fault handlers get registered.
pub trait FaultVectorRegistry {
    fn register(&mut self, vector: u8, handler: FaultHandlerFn, context: *mut ());
}

/// Page-fault error code pushed by the CPU.
///
/// Reference: Intel SDM Vol. 3A, §4.7 "Page-Fault Exceptions".
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PageFaultError {
    /// 0 = non-present page.
    /// 1 = protection violation (page present but access disallowed).
    pub present: bool, // bit 0

    /// 0 = read.
    /// 1 = write access.
    pub write: bool, // bit 1

    /// 0 = supervisor (CPL 0–2).
    /// 1 = user mode (CPL 3).
    pub user: bool, // bit 2

    /// 1 = caused by reserved bit set in a paging structure.
    pub reserved_bit: bool, // bit 3

    #[bits(28)]
    __: u32, // ignored without PAE/NX
}

impl PageFaultError {
    #[must_use]
    pub const fn explain(&self) -> &'static str {
        if self.reserved_bit() {
            "Reserved bit set in a paging entry"
        } else if !self.present() {
            "Non-present page"
        } else if self.write() {
            "Write access to protected page"
        } else {
            "Read access to protected page"
        }
    }
}

/// Resolve one page fault with interrupts masked.
///
/// On failure the error and the region directory are logged before the error
/// is returned; the caller must not resume the faulting context.
///
/// # Errors
/// Whatever [`Vmm::handle_page_fault`] reports.
pub fn dispatch_page_fault<A: TableAccess, F: FileSystem>(
    vmm: &mut Vmm<A, F>,
    address: VirtualAddress,
    error: PageFaultError,
) -> Result<(), FaultError> {
    let _irq = IrqGuard::new();
    log::trace!("page fault at {address}: {}", error.explain());
    vmm.handle_page_fault(address).inspect_err(|e| {
        log::error!("PAGE FAULT at {address} err={:#x}: {e}", error.into_bits());
        log::error!("{}", error.explain());
        vmm.dump();
    })
}

/// Register the page-fault handler with `vmm` as its context.
#[cfg(target_arch = "x86")]
pub fn install_page_fault_handler<R, A, F>(registry: &mut R, vmm: &'static mut Vmm<A, F>)
where
    R: FaultVectorRegistry + ?Sized,
    A: TableAccess + 'static,
    F: FileSystem + 'static,
{
    log::info!("installing page-fault handler on vector {PAGE_FAULT_VECTOR:#04x}");
    registry.register(
        PAGE_FAULT_VECTOR,
        trampoline::page_fault::<A, F>,
        core::ptr::from_mut(vmm).cast(),
    );
}

#[cfg(target_arch = "x86")]
mod trampoline {
    use super::{PageFaultError, dispatch_page_fault};
    use crate::backing::FileSystem;
    use crate::vmm::Vmm;
    use kernel_registers::LoadRegisterUnsafe;
    use kernel_registers::cr2::Cr2;
    use kernel_vmem::TableAccess;

    pub fn page_fault<A: TableAccess, F: FileSystem>(_: u8, error_code: u32, context: *mut ()) {
        // SAFETY: ring 0, inside the fault handler; nothing has faulted since.
        let address = unsafe { Cr2::load_unsafe() }.fault_address();
        // SAFETY: `context` is the `&'static mut Vmm<A, F>` handed to
        // `install_page_fault_handler`, and faults do not nest.
        let vmm = unsafe { &mut *context.cast::<Vmm<A, F>>() };

        if dispatch_page_fault(vmm, address, PageFaultError::from_bits(error_code)).is_err() {
            halt();
        }
    }

    fn halt() -> ! {
        loop {
            // SAFETY: ring 0.
            unsafe { core::arch::asm!("cli", "hlt", options(nomem, nostack)) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backing::NoFiles;
    use crate::frame_alloc::BitmapFrameAlloc;
    use crate::region::{RegionDirectory, RegionFlags};
    use kernel_info::boot::MemoryMapEntry;
    use kernel_vmem::AddressSpace;
    use kernel_vmem::access::hosted::HostedAccess;

    fn vmm() -> Vmm<HostedAccess, NoFiles> {
        let mut frames =
            BitmapFrameAlloc::from_memory_map(&[MemoryMapEntry::available(0x10_0000, 0x1_0000)]);
        let access = HostedAccess::new(&mut frames).unwrap();
        Vmm::new(frames, RegionDirectory::default(), AddressSpace::new(access), NoFiles)
    }

    #[test]
    fn error_code_decodes() {
        let err = PageFaultError::from_bits(0b110);
        assert!(!err.present());
        assert!(err.write());
        assert!(err.user());
        assert_eq!(err.explain(), "Non-present page");
        assert_eq!(
            PageFaultError::from_bits(0b011).explain(),
            "Write access to protected page"
        );
    }

    #[test]
    fn dispatch_resolves_region_fault() {
        let mut vmm = vmm();
        let flags = RegionFlags::ANONYMOUS | RegionFlags::WRITE | RegionFlags::USER;
        let base = vmm
            .insert(VirtualAddress::new(0x0800_0000), 0x1000, flags, None)
            .unwrap();
        assert_eq!(
            dispatch_page_fault(&mut vmm, base, PageFaultError::from_bits(0b110)),
            Ok(())
        );
        assert!(vmm.translate(base).is_some());
    }

    #[test]
    fn dispatch_reports_unresolvable_fault() {
        let mut vmm = vmm();
        let address = VirtualAddress::new(0x0000_0004);
        assert_eq!(
            dispatch_page_fault(&mut vmm, address, PageFaultError::from_bits(0)),
            Err(FaultError::NoRegion(address))
        );
    }
}
