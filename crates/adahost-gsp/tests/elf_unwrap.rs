use adahost_gsp::{Gsp, GspError};
use adahost_sim::SimGpu;
use pretty_assertions::assert_eq;

mod util;

#[test]
fn fwimage_section_is_staged_and_mapped() {
    let mut sim = SimGpu::new();
    let mut gsp = Gsp::new(&mut sim).unwrap();

    let payload: Vec<u8> = (0..0x2800u32).map(|i| (i * 5) as u8).collect();
    gsp.load_firmware(&mut sim, &util::tiny_elf(&payload)).unwrap();

    let radix3 = gsp.radix3().unwrap();
    // 0x2800 bytes round up to three GSP pages.
    assert_eq!(radix3.num_pages(), 3);
    assert_eq!(radix3.l1_pages(), 1);
    assert_eq!(radix3.l2_pages(), 1);
}

#[test]
fn non_elf_input_is_rejected() {
    let mut sim = SimGpu::new();
    let mut gsp = Gsp::new(&mut sim).unwrap();

    let err = gsp.load_firmware(&mut sim, b"not an elf at all").unwrap_err();
    assert!(matches!(err, GspError::BadFirmware("not an ELF image")));
}

#[test]
fn elf_without_fwimage_is_rejected() {
    let mut sim = SimGpu::new();
    let mut gsp = Gsp::new(&mut sim).unwrap();

    let mut elf = util::tiny_elf(&[0u8; 64]);
    // Rename the section so the walk cannot find `.fwimage`.
    let pos = elf.windows(8).position(|w| w == b".fwimage").unwrap();
    elf[pos..pos + 8].copy_from_slice(b".other__");

    let err = gsp.load_firmware(&mut sim, &elf).unwrap_err();
    assert!(matches!(err, GspError::BadFirmware("no .fwimage section")));
}

#[test]
fn thirty_two_bit_elf_is_rejected() {
    let mut sim = SimGpu::new();
    let mut gsp = Gsp::new(&mut sim).unwrap();

    let mut elf = util::tiny_elf(&[0u8; 64]);
    elf[4] = 1;
    let err = gsp.load_firmware(&mut sim, &elf).unwrap_err();
    assert!(matches!(err, GspError::BadFirmware("not a 64-bit ELF")));
}
