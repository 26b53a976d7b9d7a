//! `fixed_policy_contract` 集成测试：固定容量策略的背压行为。
//!
//! # 测试目标（Why）
//! - 音频链路内存预算固定，放不下时只能驱逐最旧报文；驱逐必须保持剩余报文的顺序与内容；
//! - 被驱逐的报文永远不会再被读到，新报文一定能被读到。
//!
//! # 结构安排（How）
//! - 256 字节竞技场，40 字节负载（帧长 48）恰好写满 5 个；
//! - 分别覆盖“驱逐一个后回绕”“连续驱逐多个”“容量恒定”三种场景；
//! - 另用 64 字节竞技场覆盖尾部空隙不足一个帧头时的整帧回绕。

use std::sync::Arc;

use spark_packet_ring::{CapacityPolicy, PacketRing, RecordingSink, RingError, RingEvent};

fn fixed_ring() -> (PacketRing, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::new());
    let ring = PacketRing::builder()
        .initial_capacity(256)
        .policy(CapacityPolicy::fixed())
        .sink(sink.clone())
        .build()
        .expect("固定策略");
    (ring, sink)
}

fn fill_five(ring: &PacketRing) {
    for seq in 0..5u8 {
        ring.write_packet(&[seq; 40]).expect("写入");
    }
}

/// 写满后再写一个：最旧报文被驱逐，新报文回绕到起点。
#[test]
fn full_ring_evicts_oldest_for_new_packet() {
    let (ring, sink) = fixed_ring();
    fill_five(&ring);

    ring.write_packet(&[0xff; 40]).expect("驱逐后写入");
    assert_eq!(ring.queued_packet_count(), 5);
    assert_eq!(
        sink.events(),
        vec![RingEvent::Evicted {
            length: 40,
            queued: 4,
            capacity: 256,
        }]
    );

    let mut seen = Vec::new();
    while let Some(packet) = ring.read_packet() {
        seen.push(packet[0]);
    }
    assert_eq!(seen, vec![1, 2, 3, 4, 0xff]);

    let counters = ring.metrics().snapshot();
    assert_eq!(counters.packets_evicted, 1);
    assert_eq!(counters.bytes_evicted, 40);
}

/// 大报文需要连续驱逐多个旧报文才能放下。
#[test]
fn large_packet_evicts_until_it_fits() {
    let (ring, sink) = fixed_ring();
    fill_five(&ring);

    ring.write_packet(&[0xaa; 150]).expect("驱逐后写入");
    assert_eq!(sink.count("ring.evicted"), 4);
    assert_eq!(sink.count("ring.large_packet"), 1);
    assert_eq!(ring.queued_packet_count(), 2);
    assert_eq!(ring.read_packet().as_deref(), Some(&[4u8; 40][..]));
    assert_eq!(ring.read_packet().as_deref(), Some(&[0xaau8; 150][..]));
    assert!(ring.is_empty());
}

/// 尾部只剩 4 字节、起点空闲充足时，新报文整帧写到起点，不驱逐任何报文。
///
/// # 步骤说明（How）
/// 1. 64 字节竞技场写入 20 与 24 字节两个报文，写游标停在 60；
/// 2. 读走第一个报文，起点空出 28 字节；
/// 3. 写入 10 字节报文（帧长 18）：尾部连帧头都放不下，起点放得下。
#[test]
fn narrow_tail_gap_wraps_whole_frame_without_eviction() {
    let sink = Arc::new(RecordingSink::new());
    let ring = PacketRing::builder()
        .initial_capacity(64)
        .policy(CapacityPolicy::fixed())
        .sink(sink.clone())
        .build()
        .expect("固定策略");

    ring.write_packet(&[1; 20]).expect("写入");
    ring.write_packet(&[2; 24]).expect("写入");
    assert_eq!(ring.read_packet().as_deref(), Some(&[1u8; 20][..]));

    ring.write_packet(&[3; 10]).expect("整帧回绕写入");
    assert_eq!(sink.count("ring.evicted"), 0);
    assert_eq!(ring.metrics().snapshot().packets_evicted, 0);
    assert_eq!(ring.queued_packet_count(), 2);
    assert_eq!(ring.used_bytes(), 32 + 18);

    assert_eq!(ring.read_packet().as_deref(), Some(&[2u8; 24][..]));
    assert_eq!(ring.read_packet().as_deref(), Some(&[3u8; 10][..]));
    assert!(ring.is_empty());
    assert_eq!(ring.metrics().snapshot().bounds_violations, 0);
}

/// 固定策略从不扩容，超过竞技场的报文直接拒绝。
#[test]
fn capacity_never_changes() {
    let (ring, sink) = fixed_ring();
    for round in 0..50u8 {
        ring.write_packet(&[round; 40]).expect("写入");
    }
    assert_eq!(ring.capacity(), 256);
    assert_eq!(sink.count("ring.resized"), 0);
    assert_eq!(sink.count("ring.reorganized"), 0);
    assert!(ring.queued_packet_count() <= 5);

    let err = ring.write_packet(&[0; 248]).unwrap_err();
    assert_eq!(
        err,
        RingError::OversizedPacket {
            needed: 256,
            limit: 256
        }
    );

    let mut last = None;
    while let Some(packet) = ring.read_packet() {
        last = Some(packet[0]);
    }
    assert_eq!(last, Some(49));
}
