//! `concurrency_contract` 集成测试：多生产者、单消费者并发读写。
//!
//! # 测试目标（Why）
//! - 传输线程与解码线程同时访问缓冲，单锁模型必须保证计数不出现负值、报文不被撕裂；
//! - 每个生产者自己的报文顺序在消费端必须保持不变。
//!
//! # 步骤说明（How）
//! 1. 4 个生产者各写入 2000 个报文，负载携带生产者编号与序号；
//! 2. 1 个消费者持续读取，直到所有生产者结束且缓冲为空；
//! 3. 阈值足够宽，整个过程不应丢弃任何报文。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use spark_packet_ring::{CapacityPolicy, NoopSink, PacketRing};

const PRODUCERS: u8 = 4;
const PACKETS_PER_PRODUCER: u32 = 2000;

fn encode(producer: u8, seq: u32) -> Vec<u8> {
    let len = 8 + (seq as usize % 56);
    let mut packet = vec![producer; len];
    packet[..4].copy_from_slice(&seq.to_be_bytes());
    packet
}

#[test]
fn producers_and_consumer_never_lose_or_tear_packets() {
    let ring = PacketRing::builder()
        .initial_capacity(1 << 20)
        .policy(CapacityPolicy::growable())
        .sink(Arc::new(NoopSink))
        .build()
        .expect("默认策略合法");
    let written = AtomicUsize::new(0);
    let producers_done = AtomicBool::new(false);

    let read = thread::scope(|scope| {
        let consumer = scope.spawn(|| {
            let mut next_seq = [0u32; PRODUCERS as usize];
            let mut read = 0usize;
            loop {
                if let Some(packet) = ring.read_packet() {
                    let producer = packet[packet.len() - 1];
                    let seq = u32::from_be_bytes([packet[0], packet[1], packet[2], packet[3]]);
                    assert_eq!(packet.as_ref(), encode(producer, seq).as_slice());
                    assert_eq!(seq, next_seq[producer as usize], "生产者 {producer} 的报文乱序");
                    next_seq[producer as usize] += 1;
                    read += 1;
                } else if producers_done.load(Ordering::Acquire) && ring.is_empty() {
                    return read;
                } else {
                    thread::yield_now();
                }
            }
        });

        let handles: Vec<_> = (0..PRODUCERS)
            .map(|producer| {
                let ring = &ring;
                let written = &written;
                scope.spawn(move || {
                    for seq in 0..PACKETS_PER_PRODUCER {
                        ring.write_packet(&encode(producer, seq)).expect("阈值足够宽");
                        written.fetch_add(1, Ordering::Relaxed);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("生产者线程异常退出");
        }
        producers_done.store(true, Ordering::Release);
        consumer.join().expect("消费者线程异常退出")
    });

    let written = written.load(Ordering::Relaxed);
    assert!(read <= written);
    assert_eq!(read, written);
    assert_eq!(written, PRODUCERS as usize * PACKETS_PER_PRODUCER as usize);

    let counters = ring.metrics().snapshot();
    assert_eq!(counters.packets_dropped, 0);
    assert_eq!(counters.bounds_violations, 0);
    assert_eq!(counters.packets_read, read as u64);
    assert!(ring.is_empty());
}
