use adahost_client::{Client, Configuration};
use adahost_hal::{DmaRegion, Hal};
use adahost_sim::vbios_image::{build_rom, RomOptions};
use adahost_sim::SimGpu;
use pretty_assertions::assert_eq;

mod util;

fn ready_client() -> Client<SimGpu> {
    let mut client = Client::new(SimGpu::new(), Configuration::default());
    client.connect().unwrap();
    let (image, _) = build_rom(&RomOptions::default());
    client.load_vbios(&image).unwrap();
    client.load_firmware(&util::tiny_elf(&[0u8; 0x2000])).unwrap();
    client.boot().unwrap();
    client.wait_ready(1000).unwrap();
    client
}

/// A descriptor for address-range bookkeeping only.
struct Span(usize);

impl DmaRegion for Span {
    fn region_len(&self) -> usize {
        self.0
    }

    fn phys_at(&self, offset: usize) -> Option<u64> {
        (offset < self.0).then(|| 0x77_0000_0000 + offset as u64)
    }
}

#[test]
fn vaspace_registration_allocates_a_page_directory() {
    let mut client = ready_client();
    client.create_vaspace().unwrap();

    let vaspace = client.vaspace().unwrap();
    assert_ne!(vaspace.handle(), 0);
    assert_ne!(vaspace.pde_phys(), 0);
    assert_eq!(vaspace.va_start(), 0x10_0000_0000);
}

#[test]
fn map_bump_allocates_from_the_virtual_range() {
    let mut client = ready_client();
    client.create_vaspace().unwrap();
    let vaspace = client.vaspace_mut().unwrap();

    let a = vaspace.map(&Span(0x3000), 4096);
    assert_eq!(a, 0x10_0000_0000);

    let b = vaspace.map(&Span(0x100), 4096);
    assert_eq!(b, 0x10_0000_3000);

    // A 64 KiB alignment request rounds the next base up.
    let c = vaspace.map(&Span(0x1000), 0x10000);
    assert_eq!(c, 0x10_0001_0000);
}

#[test]
fn exhausted_virtual_range_maps_to_zero() {
    let mut client = ready_client();
    client.create_vaspace().unwrap();
    let vaspace = client.vaspace_mut().unwrap();

    // Larger than the whole configured window.
    let va = vaspace.map(&Span(usize::MAX / 2), 4096);
    assert_eq!(va, 0);
}

#[test]
fn vaspace_registration_goes_out_as_a_fermi_vaspace_alloc() {
    let mut client = ready_client();
    client.create_vaspace().unwrap();

    // The alloc frame follows the system-info frame in the command ring:
    // frame header at 0x100, RPC header behind it, then the alloc header
    // whose class id sits 12 bytes in.
    let cmdq = client.gsp().unwrap().cmdq_base_phys();
    let mem = client.hal_mut().sysmem();
    let mut word = [0u8; 4];
    mem.read_phys(cmdq + 0x100 + 16 + 24 + 12, &mut word).unwrap();
    assert_eq!(u32::from_le_bytes(word), 0x90f1);

    // The big-page size rides at the end of the 48-byte parameter block.
    mem.read_phys(cmdq + 0x100 + 16 + 24 + 20 + 40, &mut word)
        .unwrap();
    assert_eq!(u32::from_le_bytes(word), 0x10000);
}
