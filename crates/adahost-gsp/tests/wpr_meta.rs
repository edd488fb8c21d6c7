use adahost_gsp::{Gsp, FRTS_SIZE, GSP_HEAP_SIZE, WPR_META_MAGIC};
use adahost_sim::SimGpu;
use pretty_assertions::assert_eq;

mod util;

#[test]
fn wpr_meta_round_trips_the_supplied_addresses() {
    let mut sim = SimGpu::new();
    let mut gsp = Gsp::new(&mut sim).unwrap();

    gsp.load_bootloader(&mut sim, &[0xb0u8; 0x2000]).unwrap();
    gsp.load_firmware(&mut sim, &util::tiny_elf(&[0x11u8; 0x3000]))
        .unwrap();
    gsp.setup_wpr_meta().unwrap();

    let (magic, meta) = gsp.read_wpr_meta().unwrap();
    assert_eq!(magic, WPR_META_MAGIC);
    assert_eq!(magic, 0x5750_5232);
    assert_eq!(meta.bootloader_addr, gsp.bootloader_phys().unwrap());
    assert_eq!(meta.bootloader_size, 0x2000);
    assert_eq!(meta.radix3_addr, gsp.radix3().unwrap().root_phys());
    assert_eq!(meta.radix3_size, gsp.radix3().unwrap().len_bytes() as u64);
    assert_eq!(meta.gsp_fw_heap_size, GSP_HEAP_SIZE);
    assert_eq!(meta.frts_size, FRTS_SIZE);
    assert_eq!(meta.frts_size, 1 << 20);
    assert_eq!(meta.fw_heap_enabled, 1);
    assert_eq!(meta.partition_rpc, 1);
}

#[test]
fn wpr_meta_without_staged_firmware_writes_zero_addresses() {
    let mut sim = SimGpu::new();
    let mut gsp = Gsp::new(&mut sim).unwrap();

    gsp.setup_wpr_meta().unwrap();
    let (magic, meta) = gsp.read_wpr_meta().unwrap();
    assert_eq!(magic, WPR_META_MAGIC);
    assert_eq!(meta.bootloader_addr, 0);
    assert_eq!(meta.radix3_addr, 0);
}
