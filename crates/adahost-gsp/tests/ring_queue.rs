use adahost_gsp::{crc32, GspError, RingQueue, FRAME_HEADER_SIZE, QUEUE_SIZE};
use adahost_hal::Hal;
use adahost_regs::{pgsp_queue_head, pgsp_queue_tail, GSP_CMDQ_INDEX, GSP_MSGQ_INDEX};
use adahost_sim::SimGpu;
use pretty_assertions::assert_eq;

fn frame_header(sim: &SimGpu, phys: u64) -> (u32, u32, u32) {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    sim.sysmem().read_phys(phys, &mut header).unwrap();
    let word = |i: usize| u32::from_le_bytes(header[i..i + 4].try_into().unwrap());
    (word(0), word(4), word(8))
}

#[test]
fn tail_advances_by_the_aligned_frame_size() {
    let mut sim = SimGpu::new();
    let mut q = RingQueue::new(&sim.sysmem(), GSP_CMDQ_INDEX).unwrap();

    let a = vec![0x11u8; 1024];
    let b = vec![0x22u8; 3200];
    q.enqueue(&mut sim, &a).unwrap();
    // align256(16 + 1024) = 0x500
    assert_eq!(q.tail(), 0x500);
    q.enqueue(&mut sim, &b).unwrap();
    // align256(16 + 3200) = 0xd00
    assert_eq!(q.tail(), 0x500 + 0xd00);

    // Each enqueue published its tail to the hardware register, after the
    // frame stores.
    let tail_reg = pgsp_queue_tail(GSP_CMDQ_INDEX);
    let tails: Vec<u32> = sim
        .write_log()
        .iter()
        .filter(|(r, _)| *r == tail_reg)
        .map(|(_, v)| *v)
        .collect();
    assert_eq!(tails, vec![0x500, 0x1200]);
}

#[test]
fn frames_carry_sequence_page_count_and_payload_crc() {
    let mut sim = SimGpu::new();
    let mut q = RingQueue::new(&sim.sysmem(), GSP_CMDQ_INDEX).unwrap();

    let a: Vec<u8> = (0..1024u32).map(|i| i as u8).collect();
    let b: Vec<u8> = (0..3200u32).map(|i| (i * 3) as u8).collect();
    q.enqueue(&mut sim, &a).unwrap();
    q.enqueue(&mut sim, &b).unwrap();

    let (seq0, count0, crc0) = frame_header(&sim, q.base_phys());
    assert_eq!(seq0, 0);
    assert_eq!(count0, 1); // 0x500 bytes spans one 4 KiB page
    assert_eq!(crc0, crc32(&a));

    let (seq1, count1, crc1) = frame_header(&sim, q.base_phys() + 0x500);
    assert_eq!(seq1, 1);
    assert_eq!(count1, 1);
    assert_eq!(crc1, crc32(&b));

    // Payload bytes follow the 16-byte header verbatim.
    let mut payload = vec![0u8; a.len()];
    sim.sysmem()
        .read_phys(q.base_phys() + FRAME_HEADER_SIZE as u64, &mut payload)
        .unwrap();
    assert_eq!(payload, a);
}

#[test]
fn queue_full_is_reported_not_retried() {
    let mut sim = SimGpu::new();
    let mut q = RingQueue::new(&sim.sysmem(), GSP_CMDQ_INDEX).unwrap();

    // Page-sized frames: 63 fit, the 64th would catch the head.
    let payload = vec![0u8; 4096 - FRAME_HEADER_SIZE];
    for _ in 0..63 {
        q.enqueue(&mut sim, &payload).unwrap();
    }
    let err = q.enqueue(&mut sim, &payload).unwrap_err();
    assert!(matches!(err, GspError::QueueFull { .. }));

    // Consuming two frames frees room again.
    sim.write32(pgsp_queue_head(GSP_CMDQ_INDEX), 0x2000);
    q.enqueue(&mut sim, &payload).unwrap();
}

#[test]
fn dequeue_returns_the_producer_payload_byte_for_byte() {
    let mut sim = SimGpu::new();
    let mut q = RingQueue::new(&sim.sysmem(), GSP_MSGQ_INDEX).unwrap();
    let mem = sim.sysmem();

    // Play the GSP: craft a one-page frame at the ring base.
    let payload: Vec<u8> = (0..4080u32).map(|i| (i ^ 0xa5) as u8).collect();
    let mut frame = Vec::new();
    frame.extend_from_slice(&7u32.to_le_bytes());
    frame.extend_from_slice(&1u32.to_le_bytes());
    frame.extend_from_slice(&crc32(&payload).to_le_bytes());
    frame.extend_from_slice(&0u32.to_le_bytes());
    frame.extend_from_slice(&payload);
    mem.write_phys(q.base_phys(), &frame).unwrap();
    sim.write32(pgsp_queue_head(GSP_MSGQ_INDEX), 0x1000);

    let mut out = vec![0u8; 4080];
    let got = q.dequeue(&mut sim, &mut out).unwrap().unwrap();
    assert_eq!(got.seq, 7);
    assert_eq!(got.len, 4080);
    assert_eq!(out, payload);

    // The frame was acknowledged by advancing the hardware tail one page.
    assert_eq!(q.tail(), 0x1000);
    assert_eq!(
        sim.write_log().last(),
        Some(&(pgsp_queue_tail(GSP_MSGQ_INDEX), 0x1000))
    );

    // Nothing further to read.
    assert!(q.dequeue(&mut sim, &mut out).unwrap().is_none());
}

#[test]
fn dequeue_truncates_to_the_caller_buffer() {
    let mut sim = SimGpu::new();
    let mut q = RingQueue::new(&sim.sysmem(), GSP_MSGQ_INDEX).unwrap();
    let mem = sim.sysmem();

    let payload = vec![0x77u8; 512];
    let mut frame = Vec::new();
    frame.extend_from_slice(&0u32.to_le_bytes());
    frame.extend_from_slice(&1u32.to_le_bytes());
    frame.extend_from_slice(&crc32(&payload).to_le_bytes());
    frame.extend_from_slice(&0u32.to_le_bytes());
    frame.extend_from_slice(&payload);
    mem.write_phys(q.base_phys(), &frame).unwrap();
    sim.write32(pgsp_queue_head(GSP_MSGQ_INDEX), 0x1000);

    let mut out = vec![0u8; 64];
    let got = q.dequeue(&mut sim, &mut out).unwrap().unwrap();
    assert_eq!(got.len, 64);
    assert_eq!(out, vec![0x77u8; 64]);
}

#[test]
fn frames_wrap_across_the_ring_boundary() {
    let mut sim = SimGpu::new();
    let mut q = RingQueue::new(&sim.sysmem(), GSP_CMDQ_INDEX).unwrap();

    // Fill right up to the last page, let the consumer catch up, then
    // enqueue a two-page frame that must wrap.
    let page = vec![0u8; 4096 - FRAME_HEADER_SIZE];
    for _ in 0..63 {
        q.enqueue(&mut sim, &page).unwrap();
    }
    sim.write32(pgsp_queue_head(GSP_CMDQ_INDEX), 0x3f000);

    let big: Vec<u8> = (0..8000u32).map(|i| (i % 255) as u8).collect();
    q.enqueue(&mut sim, &big).unwrap();
    assert_eq!(q.tail() as usize, (0x3f000 + 0x2000) % QUEUE_SIZE);

    // The payload tail landed at the ring start.
    let first_span = QUEUE_SIZE - 0x3f000 - FRAME_HEADER_SIZE;
    let mut wrapped = vec![0u8; big.len() - first_span];
    sim.sysmem()
        .read_phys(q.base_phys(), &mut wrapped)
        .unwrap();
    assert_eq!(wrapped, big[first_span..]);
}
