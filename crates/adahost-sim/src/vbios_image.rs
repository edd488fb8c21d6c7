//! Synthetic VBIOS images for parser and FWSEC tests.
//!
//! The builder assembles a ROM with the structures the parser walks: the
//! 0x55AA/PCIR image chain, the BIT header and token list, a PMU lookup
//! table, an optional NVFW binary header and a Falcon ucode descriptor V3
//! whose DMEM segment carries a "DMAP" mapper block.

/// How the PMU lookup table is reachable from the BIT token list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenMode {
    /// Token 0x50 carries raw 32-bit candidate offsets (Ada path).
    Ada,
    /// Token 0x70 carries a table offset relative to the image base
    /// (pre-Ada path).
    Falcon70,
    /// Neither token is present; only the brute-force scan can find the
    /// table.
    Missing,
}

#[derive(Debug, Clone)]
pub struct RomOptions {
    /// Prepend an NVGI container header, shifting the ROM images to 0x1000.
    pub nvgi: bool,
    pub token_mode: TokenMode,
    /// NVFW binary header version; `None` omits the header so the descriptor
    /// sits directly at the PMU entry's data offset. Versions outside
    /// `[1, 16]` must be ignored by the parser.
    pub bin_hdr_version: Option<u16>,
    /// Emit the FWSEC ucode inside a dedicated code-type-0xE0 ROM image and
    /// make the PMU entry's data offset relative to it.
    pub fwsec_rom_image: bool,
    /// Use the legacy 1-byte-appId entry layout (header size 10).
    pub legacy_entries: bool,
    pub pmu_app_id: u16,
}

impl Default for RomOptions {
    fn default() -> Self {
        Self {
            nvgi: false,
            token_mode: TokenMode::Ada,
            bin_hdr_version: Some(3),
            fwsec_rom_image: false,
            legacy_entries: false,
            pmu_app_id: 0x0085,
        }
    }
}

/// Fixed layout facts about the built image, shared with the tests.
pub mod layout {
    pub const ROM_SIZE: usize = 0x10000;
    pub const BIT_OFFSET: usize = 0x90;
    pub const PMU_TABLE_OFFSET: usize = 0x9400;
    /// Start of the FWSEC blob (`fwOffset`), relative to the ROM base.
    pub const UCODE_OFFSET: usize = 0xa000;
    pub const STORED_SIZE: u32 = 0x1800;
    pub const IMEM_REL: usize = 0x100;
    pub const IMEM_SIZE: usize = 0x800;
    pub const IMEM_SEC_SIZE: u32 = 0x100;
    pub const DMEM_REL: usize = 0x900;
    pub const DMEM_SIZE: usize = 0x400;
    pub const SIG_REL: usize = 0xd00;
    pub const SIG_SIZE: u32 = 0x180;
    pub const BOOT_VEC: u32 = 0x100;
    /// Offset of the "DMAP" magic within the DMEM segment.
    pub const DMEM_MAPPER_OFFSET: usize = 0x40;
    /// Start of the code-type-0xE0 image when `fwsec_rom_image` is set.
    pub const FWSEC_IMAGE_OFFSET: usize = 0x8000;
}

/// Exported so callers can re-derive absolute layout facts.
pub struct RomLayout {
    /// ROM base after an optional NVGI shift.
    pub base: usize,
    /// Absolute `fwOffset` the parser is expected to report.
    pub fw_offset: usize,
    /// Absolute offset of the ucode descriptor.
    pub desc_offset: usize,
}

fn put16(image: &mut [u8], off: usize, v: u16) {
    image[off..off + 2].copy_from_slice(&v.to_le_bytes());
}

fn put32(image: &mut [u8], off: usize, v: u32) {
    image[off..off + 4].copy_from_slice(&v.to_le_bytes());
}

fn put_pcir(image: &mut [u8], img_off: usize, code_type: u8, len_units: u16, last: bool) {
    let pcir = img_off + 0x40;
    image[img_off] = 0x55;
    image[img_off + 1] = 0xaa;
    put16(image, img_off + 0x18, 0x40);
    image[pcir..pcir + 4].copy_from_slice(b"PCIR");
    put16(image, pcir + 4, 0x10de);
    put16(image, pcir + 16, len_units);
    image[pcir + 20] = code_type;
    image[pcir + 21] = if last { 0x80 } else { 0 };
}

/// Builds a synthetic VBIOS image and returns it together with the layout
/// facts a test needs to assert the parse result.
pub fn build_rom(opts: &RomOptions) -> (Vec<u8>, RomLayout) {
    let base = if opts.nvgi { 0x1000 } else { 0 };
    let mut image = vec![0u8; base + layout::ROM_SIZE];

    if opts.nvgi {
        image[0..4].copy_from_slice(b"NVGI");
        put16(&mut image, 4, 1); // version
        put16(&mut image, 6, 0x20); // header size
    }

    // Image chain.
    if opts.fwsec_rom_image {
        put_pcir(&mut image, base, 0x00, 0x40, false);
        put_pcir(&mut image, base + layout::FWSEC_IMAGE_OFFSET, 0xe0, 0x40, true);
    } else {
        put_pcir(&mut image, base, 0x00, 0x80, true);
    }

    // BIT header: prefix 0xFF 0xB8, "BIT\0", version, header size 12,
    // token size 6, token count 2.
    let bit = base + layout::BIT_OFFSET;
    image[bit] = 0xff;
    image[bit + 1] = 0xb8;
    image[bit + 2..bit + 6].copy_from_slice(b"BIT\0");
    put16(&mut image, bit + 6, 0x0100);
    image[bit + 8] = 12;
    image[bit + 9] = 6;
    image[bit + 10] = 2;

    // Token list: a NOP-ish token followed by the PMU pointer token.
    let tokens = bit + 12;
    image[tokens] = 0x32; // init pointers, ignored by the parser
    put16(&mut image, tokens + 2, 4);
    put16(&mut image, tokens + 4, 0x60);
    let t1 = tokens + 6;
    match opts.token_mode {
        TokenMode::Ada => {
            image[t1] = 0x50;
            put16(&mut image, t1 + 2, 16);
            put16(&mut image, t1 + 4, 0xe0);
            // Raw candidate array: one live pointer, three dead ones.
            put32(&mut image, base + 0xe0, (base + layout::PMU_TABLE_OFFSET) as u32);
        }
        TokenMode::Falcon70 => {
            image[t1] = 0x70;
            put16(&mut image, t1 + 2, 8);
            put16(&mut image, t1 + 4, 0xe0);
            // Table offset relative to the image base.
            put32(&mut image, base + 0xe0, layout::PMU_TABLE_OFFSET as u32);
        }
        TokenMode::Missing => {
            image[t1] = 0x4e; // NOP token
        }
    }

    // PMU lookup table.
    let table = base + layout::PMU_TABLE_OFFSET;
    let ucode_rel_base = if opts.fwsec_rom_image {
        // Entry offsets are relative to the FWSEC image start; the parser
        // has to rebase them.
        layout::UCODE_OFFSET - layout::FWSEC_IMAGE_OFFSET
    } else {
        base + layout::UCODE_OFFSET
    };
    if opts.legacy_entries {
        image[table] = 1; // version
        image[table + 1] = 10; // header size
        image[table + 2] = 6; // entry size
        image[table + 3] = 2; // entry count
        let e0 = table + 10;
        image[e0] = 0x01;
        image[e0 + 1] = 0x01;
        put32(&mut image, e0 + 2, 0);
        let e1 = e0 + 6;
        image[e1] = opts.pmu_app_id as u8;
        image[e1 + 1] = 0x07; // target: GSP
        put32(&mut image, e1 + 2, ucode_rel_base as u32);
    } else {
        image[table] = 1;
        image[table + 1] = 6;
        image[table + 2] = 6;
        image[table + 3] = 2;
        let e0 = table + 6;
        put16(&mut image, e0, 0x0007); // scrubber, skipped
        put32(&mut image, e0 + 2, 0);
        let e1 = e0 + 6;
        put16(&mut image, e1, opts.pmu_app_id);
        put32(&mut image, e1 + 2, ucode_rel_base as u32);
    }

    // Ucode blob: optional NVFW binary header, then the descriptor.
    let ucode = base + layout::UCODE_OFFSET;
    let desc = match opts.bin_hdr_version {
        Some(version) => {
            put16(&mut image, ucode, 0x10de);
            put16(&mut image, ucode + 2, version);
            put32(&mut image, ucode + 8, layout::STORED_SIZE + 0x18);
            put32(&mut image, ucode + 12, 0x18); // header offset
            ucode + 0x18
        }
        None => ucode,
    };

    put32(&mut image, desc, layout::STORED_SIZE);
    put32(&mut image, desc + 4, layout::IMEM_REL as u32);
    put32(&mut image, desc + 8, layout::IMEM_SIZE as u32);
    put32(&mut image, desc + 12, layout::IMEM_SEC_SIZE);
    put32(&mut image, desc + 16, layout::DMEM_REL as u32);
    put32(&mut image, desc + 20, layout::DMEM_SIZE as u32);
    put32(&mut image, desc + 24, layout::SIG_REL as u32);
    put32(&mut image, desc + 28, layout::SIG_SIZE);
    put32(&mut image, desc + 32, layout::BOOT_VEC);
    put32(&mut image, desc + 36, layout::STORED_SIZE);

    // IMEM: recognisable pattern for load tests.
    let imem = desc + layout::IMEM_REL;
    for i in 0..layout::IMEM_SIZE {
        image[imem + i] = (i & 0xff) as u8;
    }

    // DMEM with the "DMAP" mapper block; the command word sits 0x20 past the
    // magic and starts out as a non-FRTS value.
    let dmem = desc + layout::DMEM_REL;
    put32(&mut image, dmem + layout::DMEM_MAPPER_OFFSET, 0x5041_4d44);
    put32(&mut image, dmem + layout::DMEM_MAPPER_OFFSET + 4, 0x0003);
    put32(&mut image, dmem + layout::DMEM_MAPPER_OFFSET + 0x20, 0xaa);

    for i in 0..layout::SIG_SIZE as usize {
        image[desc + layout::SIG_REL + i] = 0x5a;
    }

    let rom_layout = RomLayout {
        base,
        fw_offset: ucode,
        desc_offset: desc,
    };
    (image, rom_layout)
}
