use adahost_sim::vbios_image::{build_rom, layout, RomOptions, TokenMode};
use adahost_vbios::extract_fwsec;
use pretty_assertions::assert_eq;

#[test]
fn pre_ada_token_0x70_reaches_the_table() {
    let (image, _) = build_rom(&RomOptions {
        token_mode: TokenMode::Falcon70,
        ..RomOptions::default()
    });
    let info = extract_fwsec(&image).unwrap();
    assert_eq!(info.fw_offset, layout::UCODE_OFFSET);
}

#[test]
fn legacy_entry_layout_is_decoded_by_header_shape() {
    // Header size 10 disqualifies the Ada 6/6 signature, so entries decode
    // as 1-byte appId + 1-byte targetId.
    let (image, _) = build_rom(&RomOptions {
        token_mode: TokenMode::Falcon70,
        legacy_entries: true,
        ..RomOptions::default()
    });
    let info = extract_fwsec(&image).unwrap();
    assert_eq!(info.fw_offset, layout::UCODE_OFFSET);
    assert_eq!(info.boot_vec, layout::BOOT_VEC);
}

#[test]
fn brute_force_scan_finds_the_table_without_tokens() {
    let (image, _) = build_rom(&RomOptions {
        token_mode: TokenMode::Missing,
        ..RomOptions::default()
    });
    let info = extract_fwsec(&image).unwrap();
    assert_eq!(info.fw_offset, layout::UCODE_OFFSET);
    assert_eq!(info.dmem_mapper_offset, Some(layout::DMEM_MAPPER_OFFSET));
}

#[test]
fn entry_offsets_inside_a_dedicated_fwsec_image_are_rebased() {
    // The PMU entry's data offset is relative to the code-type-0xE0 image;
    // the parser has to add the image's start.
    let (image, rom) = build_rom(&RomOptions {
        fwsec_rom_image: true,
        ..RomOptions::default()
    });
    let info = extract_fwsec(&image).unwrap();
    assert_eq!(rom.fw_offset, layout::UCODE_OFFSET);
    assert_eq!(info.fw_offset, layout::UCODE_OFFSET);
}
