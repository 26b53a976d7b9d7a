//! 每个缓冲实例独享的运行计数。
//!
//! # 设计要点（How）
//! - 与 `spark-buffer` 的 `PoolMetrics` 相同，使用 `Relaxed` 原子计数：计数只用于观测，
//!   不参与同步，读取快照时允许各字段之间存在瞬时不一致；
//! - 计数器随 [`crate::PacketRing`] 创建、随其销毁，不存在进程级全局状态，
//!   多个缓冲实例之间互不干扰。

use core::sync::atomic::{AtomicU64, Ordering};

/// 缓冲实例的原子计数集合。
///
/// 外部观察者通过 [`crate::PacketRing::metrics`] 以共享引用读取，
/// 写入只发生在引擎内部。
#[derive(Debug, Default)]
pub struct RingMetrics {
    packets_written: AtomicU64,
    bytes_written: AtomicU64,
    packets_read: AtomicU64,
    bytes_read: AtomicU64,
    packets_dropped: AtomicU64,
    packets_evicted: AtomicU64,
    bytes_evicted: AtomicU64,
    rejected_writes: AtomicU64,
    resizes: AtomicU64,
    reorganizations: AtomicU64,
    emergency_resets: AtomicU64,
    bounds_violations: AtomicU64,
    read_underflows: AtomicU64,
    undersized_targets: AtomicU64,
}

/// [`RingMetrics`] 的只读快照。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub packets_written: u64,
    pub bytes_written: u64,
    pub packets_read: u64,
    pub bytes_read: u64,
    /// 被丢弃的报文：拒绝写入的、紧急重置或越界重置时清掉的都计入。
    pub packets_dropped: u64,
    pub packets_evicted: u64,
    pub bytes_evicted: u64,
    /// 参数非法而被拒绝的写入次数。
    pub rejected_writes: u64,
    pub resizes: u64,
    pub reorganizations: u64,
    pub emergency_resets: u64,
    pub bounds_violations: u64,
    /// 在空缓冲上读取的次数。
    pub read_underflows: u64,
    /// 因目标缓冲不足而保留报文的次数。
    pub undersized_targets: u64,
}

impl RingMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            packets_written: load(&self.packets_written),
            bytes_written: load(&self.bytes_written),
            packets_read: load(&self.packets_read),
            bytes_read: load(&self.bytes_read),
            packets_dropped: load(&self.packets_dropped),
            packets_evicted: load(&self.packets_evicted),
            bytes_evicted: load(&self.bytes_evicted),
            rejected_writes: load(&self.rejected_writes),
            resizes: load(&self.resizes),
            reorganizations: load(&self.reorganizations),
            emergency_resets: load(&self.emergency_resets),
            bounds_violations: load(&self.bounds_violations),
            read_underflows: load(&self.read_underflows),
            undersized_targets: load(&self.undersized_targets),
        }
    }

    pub(crate) fn on_write(&self, bytes: usize) {
        add(&self.packets_written, 1);
        add(&self.bytes_written, bytes as u64);
    }

    pub(crate) fn on_read(&self, bytes: usize) {
        add(&self.packets_read, 1);
        add(&self.bytes_read, bytes as u64);
    }

    pub(crate) fn on_dropped(&self, packets: usize) {
        add(&self.packets_dropped, packets as u64);
    }

    pub(crate) fn on_evicted(&self, bytes: usize) {
        add(&self.packets_evicted, 1);
        add(&self.bytes_evicted, bytes as u64);
    }

    pub(crate) fn on_rejected(&self) {
        add(&self.rejected_writes, 1);
    }

    pub(crate) fn on_resize(&self) {
        add(&self.resizes, 1);
    }

    pub(crate) fn on_reorganize(&self) {
        add(&self.reorganizations, 1);
    }

    pub(crate) fn on_emergency_reset(&self, dropped: usize) {
        add(&self.emergency_resets, 1);
        self.on_dropped(dropped);
    }

    pub(crate) fn on_bounds_violation(&self, dropped: usize) {
        add(&self.bounds_violations, 1);
        self.on_dropped(dropped);
    }

    pub(crate) fn on_underflow(&self) {
        add(&self.read_underflows, 1);
    }

    pub(crate) fn on_undersized_target(&self) {
        add(&self.undersized_targets, 1);
    }
}

/// 缓冲的整体状态快照：结构信息加计数。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingStats {
    pub capacity: usize,
    pub queued_packets: usize,
    pub used_bytes: usize,
    pub counters: MetricsSnapshot,
}

impl RingStats {
    /// 已用字节占容量的比例，范围 `[0.0, 1.0)`。
    ///
    /// 引擎产出的快照中 `capacity` 不小于 [`crate::MIN_ARENA_CAPACITY`]。
    pub fn fill_ratio(&self) -> f64 {
        self.used_bytes as f64 / self.capacity as f64
    }
}

fn load(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

fn add(counter: &AtomicU64, value: u64) {
    counter.fetch_add(value, Ordering::Relaxed);
}
