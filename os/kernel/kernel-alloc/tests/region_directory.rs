use kernel_alloc::region::{InsertError, RegionDirectory, RegionFlags};
use kernel_info::memory::{KERNEL_DYNAMIC_START, USER_SPACE_END};
use kernel_memory_addresses::VirtualAddress;

const USER: RegionFlags = RegionFlags::ANONYMOUS.with_write(true).with_user(true);
const KERNEL: RegionFlags = RegionFlags::ANONYMOUS.with_write(true).with_kernel(true);

fn assert_ordered(dir: &RegionDirectory) {
    let regions: Vec<_> = dir.iter().collect();
    for pair in regions.windows(2) {
        assert!(
            pair[0].end() <= pair[1].base().as_u64(),
            "{:?} overlaps {:?}",
            pair[0],
            pair[1]
        );
    }
}

/// Deterministic pseudo-random numbers for operation sequences.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        (self.0 >> 33) as u32
    }
}

#[test]
fn random_insert_remove_keeps_order() {
    let mut dir = RegionDirectory::new(42);
    let mut rng = Lcg(7);
    let mut live = Vec::new();

    for _ in 0..2000 {
        if live.is_empty() || rng.next() % 3 != 0 {
            let flags = if rng.next() % 2 == 0 { USER } else { KERNEL };
            let hint = VirtualAddress::new(rng.next() & !0xFFF);
            let size = (rng.next() % 64 + 1) * 0x1000;
            match dir.insert(hint, size, flags, None) {
                Ok(base) => live.push(base),
                Err(InsertError::DirectoryFull | InsertError::NoSpace { .. }) => {}
                Err(e) => panic!("unexpected {e}"),
            }
        } else {
            let base = live.swap_remove(rng.next() as usize % live.len());
            dir.take(base).unwrap();
        }
        assert_ordered(&dir);
        assert_eq!(dir.len(), live.len());
    }
}

#[test]
fn hint_is_honored_when_gap_exists() {
    let mut dir = RegionDirectory::default();
    for hint in [0x0800_0000, 0x0040_0000, 0x0900_0000, 0x0800_1000] {
        let base = dir
            .insert(VirtualAddress::new(hint), 0x1000, USER, None)
            .unwrap();
        assert_eq!(base.as_u32(), hint);
    }
    assert_ordered(&dir);
}

#[test]
fn displaced_hint_lands_in_a_fresh_gap() {
    let mut dir = RegionDirectory::default();
    let first = dir
        .insert(VirtualAddress::new(0x0800_0000), 0x4000, USER, None)
        .unwrap();
    let before: Vec<_> = dir.iter().copied().collect();

    let base = dir
        .insert(VirtualAddress::new(0x0800_2000), 0x4000, USER, None)
        .unwrap();
    assert_ne!(base, first);

    let region = *dir.lookup(base).expect("new region is findable");
    assert_eq!(region.base(), base);
    assert!(before.iter().all(|r| r.end() <= region.base().as_u64() || region.end() <= r.base().as_u64()));
    assert!(region.end() <= u64::from(USER_SPACE_END));
    assert_ordered(&dir);
}

#[test]
fn exhausting_kernel_window_fails_without_damage() {
    let mut dir = RegionDirectory::default();
    let heap = dir
        .insert(VirtualAddress::new(KERNEL_DYNAMIC_START), 0x1000_0000, KERNEL, None)
        .unwrap();
    assert_eq!(heap.as_u32(), KERNEL_DYNAMIC_START);
    let before: Vec<_> = dir.iter().copied().collect();

    let result = dir.insert(VirtualAddress::new(KERNEL_DYNAMIC_START), 0x3000_0000, KERNEL, None);
    assert!(matches!(result, Err(InsertError::NoSpace { .. })));
    assert_eq!(dir.iter().copied().collect::<Vec<_>>(), before);
}

#[test]
fn user_and_kernel_classes_stay_apart() {
    let mut dir = RegionDirectory::default();
    let kernel = dir
        .insert(VirtualAddress::new(0x0800_0000), 0x1000, KERNEL, None)
        .unwrap();
    assert!(kernel.as_u32() >= KERNEL_DYNAMIC_START);

    let user = dir
        .insert(VirtualAddress::new(0xC100_0000), 0x1000, USER, None)
        .unwrap();
    assert!(user.as_u32() < USER_SPACE_END);
}
