use adahost_client::{Client, ClientError, Configuration, ConnectionState};
use adahost_hal::Hal;
use adahost_regs as regs;
use adahost_sim::vbios_image::{build_rom, RomOptions};
use adahost_sim::SimGpu;
use pretty_assertions::assert_eq;

mod util;

#[test]
fn disabled_configuration_refuses_to_connect() {
    let config = Configuration {
        disabled: true,
        ..Configuration::default()
    };
    let mut client = Client::new(SimGpu::new(), config);
    assert!(matches!(client.connect(), Err(ClientError::Disabled)));
    assert!(!client.is_connected());
}

#[test]
fn connect_disconnect_drives_the_state_machine() {
    let mut client = Client::new(SimGpu::new(), Configuration::default());
    assert_eq!(client.state(), ConnectionState::Disconnected);

    client.connect().unwrap();
    assert_eq!(client.state(), ConnectionState::Connected);
    assert!(client.is_connected());

    assert!(matches!(
        client.connect(),
        Err(ClientError::AlreadyConnected)
    ));

    client.disconnect();
    assert_eq!(client.state(), ConnectionState::Disconnected);

    // A fresh connect after disconnect works.
    client.connect().unwrap();
    assert!(client.is_connected());
}

#[test]
fn operations_require_a_connection() {
    let mut client = Client::new(SimGpu::new(), Configuration::default());
    assert!(matches!(
        client.load_vbios(&[0u8; 64]),
        Err(ClientError::NotConnected)
    ));
    assert!(matches!(client.boot(), Err(ClientError::NotConnected)));
    assert!(matches!(
        client.execute_fwsec(),
        Err(ClientError::NotConnected)
    ));
}

#[test]
fn status_snapshot_reflects_the_registers() {
    let mut client = Client::new(SimGpu::new(), Configuration::default());
    let status = client.status();
    assert_eq!(
        regs::pmc_boot0_arch(status.pmc_boot0),
        regs::ARCH_ADA
    );
    assert!(!status.wpr2_enabled);

    client
        .hal_mut()
        .write32(regs::NV_PFB_PRI_MMU_WPR2_ADDR_HI, 0x8000_0001);
    let status = client.status();
    assert!(status.wpr2_enabled);
    assert_eq!(status.wpr2_hi, 0x8000_0001);
}

#[test]
fn execute_fwsec_reports_wpr2_through_the_client() {
    let mut client = Client::new(SimGpu::new(), Configuration::default());
    client.connect().unwrap();

    let (image, _) = build_rom(&RomOptions::default());
    client.load_vbios(&image).unwrap();
    assert!(client.execute_fwsec().unwrap());
    assert!(client.status().wpr2_enabled);
}

#[test]
fn boot_then_wait_ready_reaches_gsp_ready() {
    let mut client = Client::new(SimGpu::new(), Configuration::default());
    client.connect().unwrap();

    let (image, _) = build_rom(&RomOptions::default());
    client.load_vbios(&image).unwrap();
    client.load_bootloader(&[0x11u8; 0x1000]).unwrap();
    client.load_firmware(&util::tiny_elf(&[0x22u8; 0x4000])).unwrap();

    client.boot().unwrap();
    assert_eq!(client.state(), ConnectionState::GspBooted);

    client.wait_ready(1000).unwrap();
    assert_eq!(client.state(), ConnectionState::GspReady);
}

#[test]
fn alloc_vram_hands_out_distinct_aligned_offsets() {
    let mut client = Client::new(SimGpu::new(), Configuration::default());
    client.connect().unwrap();

    // Gated until ready.
    assert!(matches!(
        client.alloc_vram(0x1000),
        Err(ClientError::NotReady)
    ));

    let (image, _) = build_rom(&RomOptions::default());
    client.load_vbios(&image).unwrap();
    client.load_firmware(&util::tiny_elf(&[0u8; 0x2000])).unwrap();
    client.boot().unwrap();
    client.wait_ready(1000).unwrap();

    let a = client.alloc_vram(0x1000).unwrap();
    let b = client.alloc_vram(0x2_0000).unwrap();
    assert_ne!(a, 0);
    assert_eq!(a % 0x10000, 0);
    assert!(b > a);

    assert!(matches!(
        client.alloc_vram(0),
        Err(ClientError::InvalidArgument(_))
    ));
}
