use adahost_sim::vbios_image::{build_rom, layout, RomOptions};
use adahost_vbios::extract_fwsec;
use pretty_assertions::assert_eq;

#[test]
fn ada_token_path_extracts_the_descriptor() {
    let (image, rom) = build_rom(&RomOptions::default());
    let info = extract_fwsec(&image).unwrap();

    assert_eq!(info.fw_offset, layout::UCODE_OFFSET);
    assert_eq!(info.stored_size, layout::STORED_SIZE);

    // The descriptor sits behind the 24-byte binary header; its segment
    // offsets are relative to the descriptor.
    assert_eq!(rom.desc_offset, layout::UCODE_OFFSET + 0x18);
    assert_eq!(info.imem_offset, rom.desc_offset + layout::IMEM_REL);
    assert_eq!(info.imem_size, layout::IMEM_SIZE);
    assert_eq!(info.imem_sec_size, layout::IMEM_SEC_SIZE);
    assert_eq!(info.dmem_offset, rom.desc_offset + layout::DMEM_REL);
    assert_eq!(info.dmem_size, layout::DMEM_SIZE);
    assert_eq!(info.sig_offset, rom.desc_offset + layout::SIG_REL);
    assert_eq!(info.sig_size, layout::SIG_SIZE);
    assert_eq!(info.boot_vec, layout::BOOT_VEC);

    // The extracted ranges stay inside the image.
    assert!(info.imem_offset + info.imem_size <= image.len());
    assert!(info.dmem_offset + info.dmem_size <= image.len());
}

#[test]
fn dmem_mapper_offset_points_at_the_dmap_magic() {
    let (image, _) = build_rom(&RomOptions::default());
    let info = extract_fwsec(&image).unwrap();

    let mapper = info.dmem_mapper_offset.expect("DMAP block present");
    assert_eq!(mapper, layout::DMEM_MAPPER_OFFSET);

    let abs = info.dmem_offset + mapper;
    let magic = u32::from_le_bytes(image[abs..abs + 4].try_into().unwrap());
    assert_eq!(magic, 0x5041_4d44);
}

#[test]
fn nvgi_container_shifts_the_rom_base() {
    let (image, rom) = build_rom(&RomOptions {
        nvgi: true,
        ..RomOptions::default()
    });
    assert_eq!(rom.base, 0x1000);

    let info = extract_fwsec(&image).unwrap();
    assert_eq!(info.fw_offset, rom.base + layout::UCODE_OFFSET);
    assert_eq!(info.dmem_mapper_offset, Some(layout::DMEM_MAPPER_OFFSET));
}

#[test]
fn descriptor_without_binary_header_is_read_in_place() {
    let (image, rom) = build_rom(&RomOptions {
        bin_hdr_version: None,
        ..RomOptions::default()
    });
    let info = extract_fwsec(&image).unwrap();

    assert_eq!(rom.desc_offset, layout::UCODE_OFFSET);
    assert_eq!(info.fw_offset, layout::UCODE_OFFSET);
    assert_eq!(info.stored_size, layout::STORED_SIZE);
    assert_eq!(info.imem_offset, rom.desc_offset + layout::IMEM_REL);
}

#[test]
fn binary_header_version_outside_range_skips_the_unwrap() {
    // Version 17 is out of [1, 16]: the bytes must be treated as a bare
    // descriptor, not unwrapped.
    let (image, _) = build_rom(&RomOptions {
        bin_hdr_version: Some(17),
        ..RomOptions::default()
    });
    let info = extract_fwsec(&image).unwrap();
    assert_eq!(info.fw_offset, layout::UCODE_OFFSET);
    // The first descriptor field read in place is the vendor/version pair,
    // which is not a meaningful stored size; it must simply not be the
    // binary-header interpretation.
    assert_ne!(info.imem_offset, layout::UCODE_OFFSET + 0x18 + layout::IMEM_REL);
}
