//! 诊断事件与事件接收端。
//!
//! # 模块定位（Why）
//! - 缓冲引擎只负责“产生事件”，格式化、限流与落盘交给外部日志 / 指标层；
//! - 与 `spark-core::observability::Logger` 的做法一致：以对象安全的 trait 作为边界，
//!   默认实现桥接到 `tracing`，测试时替换为内存记录器。
//!
//! # 契约说明（What）
//! - [`DiagnosticsSink::record`] 在引擎临界区内被同步调用，实现必须非阻塞；
//! - [`RingEvent::BoundsViolation`] 的严重级别恒为 [`DiagnosticSeverity::Fatal`]，
//!   且 [`RingEvent::bypasses_throttle`] 为真：下游即便做了限流也必须输出。

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::BoundsViolation;

/// 事件严重级别，与 `LogSeverity` 的六级划分保持一致。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticSeverity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

/// 紧急重置的触发原因。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResetReason {
    /// 当前容量已达紧急阈值，继续翻倍会越过上限。
    CapacityExhausted,
    /// 单次写入内的扩容 / 重组次数超过上限。
    ResizeAttemptsExceeded,
}

/// 写入被丢弃的原因。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// 报文比策略允许的最大竞技场还大，写入前即被拒绝。
    Oversized,
    /// 紧急重置之后仍然放不下。
    NoRoomAfterReset,
}

/// 缓冲引擎产生的离散诊断事件。
///
/// 每个变体都携带足够的上下文（容量、游标、计数），
/// 使外部日志层无需回查引擎状态即可渲染。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RingEvent {
    /// 构造时请求的容量被夹到策略边界内。
    CapacityClamped { requested: usize, granted: usize },
    /// 写入参数非法，未修改任何状态。
    InvalidParameter { length: usize, skip: usize },
    /// 单个报文超过当前容量的一半，写入仍会继续。
    LargePacket { length: usize, capacity: usize },
    /// 竞技场扩容并完成线性化。
    Resized {
        old_capacity: usize,
        new_capacity: usize,
        read: usize,
        write: usize,
        queued: usize,
    },
    /// 原容量重组（仅线性化，不扩容）。
    Reorganized {
        capacity: usize,
        moved_bytes: usize,
        queued: usize,
    },
    /// 丢弃全部数据并收缩到下限。
    EmergencyReset {
        previous_capacity: usize,
        new_capacity: usize,
        dropped_packets: usize,
        reason: ResetReason,
    },
    /// 帧头或游标越界，缓冲已被强制清空。
    BoundsViolation {
        violation: BoundsViolation,
        dropped_packets: usize,
    },
    /// 写入的报文被丢弃。
    PacketDropped {
        length: usize,
        capacity: usize,
        reason: DropReason,
    },
    /// 固定容量策略驱逐了最旧的报文。
    Evicted {
        length: usize,
        queued: usize,
        capacity: usize,
    },
    /// 读取目标容量不足，报文保留在队首等待重试。
    TargetTooSmall { needed: usize, available: usize },
}

impl RingEvent {
    /// 事件的严重级别。
    pub fn severity(&self) -> DiagnosticSeverity {
        match self {
            RingEvent::Reorganized { .. } | RingEvent::Evicted { .. } => DiagnosticSeverity::Debug,
            RingEvent::CapacityClamped { .. } | RingEvent::Resized { .. } => {
                DiagnosticSeverity::Info
            }
            RingEvent::LargePacket { .. }
            | RingEvent::PacketDropped { .. }
            | RingEvent::TargetTooSmall { .. } => DiagnosticSeverity::Warn,
            RingEvent::InvalidParameter { .. } | RingEvent::EmergencyReset { .. } => {
                DiagnosticSeverity::Error
            }
            RingEvent::BoundsViolation { .. } => DiagnosticSeverity::Fatal,
        }
    }

    /// 低基数的事件类别名，可直接用作指标维度或日志键。
    pub fn kind(&self) -> &'static str {
        match self {
            RingEvent::CapacityClamped { .. } => "ring.capacity_clamped",
            RingEvent::InvalidParameter { .. } => "ring.invalid_parameter",
            RingEvent::LargePacket { .. } => "ring.large_packet",
            RingEvent::Resized { .. } => "ring.resized",
            RingEvent::Reorganized { .. } => "ring.reorganized",
            RingEvent::EmergencyReset { .. } => "ring.emergency_reset",
            RingEvent::BoundsViolation { .. } => "ring.bounds_violation",
            RingEvent::PacketDropped { .. } => "ring.packet_dropped",
            RingEvent::Evicted { .. } => "ring.evicted",
            RingEvent::TargetTooSmall { .. } => "ring.target_too_small",
        }
    }

    /// 是否必须绕过下游的日志限流。
    pub fn bypasses_throttle(&self) -> bool {
        matches!(self, RingEvent::BoundsViolation { .. })
    }
}

/// 诊断事件接收端。
///
/// # 教案式说明
/// - **意图 (Why)**：隔离引擎与具体日志后端，避免在热路径上依赖进程级全局状态；
/// - **契约 (What)**：`record` 在持锁状态下被调用，实现不得阻塞，也不得回调同一个缓冲，
///   否则会自锁；
/// - **注意事项 (Trade-offs)**：事件按引用传递，若需要异步处理请自行克隆。
pub trait DiagnosticsSink: Send + Sync + 'static {
    fn record(&self, event: &RingEvent);
}

/// 丢弃一切事件的接收端。
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl DiagnosticsSink for NoopSink {
    fn record(&self, _event: &RingEvent) {}
}

/// 把事件桥接为 `tracing` 结构化日志的默认接收端。
///
/// 级别映射：`Fatal`/`Error` 走 `error!`，其余按同名宏输出；越界事件总是 `error!`。
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn record(&self, event: &RingEvent) {
        let kind = event.kind();
        match *event {
            RingEvent::CapacityClamped { requested, granted } => {
                info!(kind, requested, granted, "ring capacity clamped into policy bounds");
            }
            RingEvent::InvalidParameter { length, skip } => {
                error!(kind, length, skip, "invalid packet parameters, write aborted");
            }
            RingEvent::LargePacket { length, capacity } => {
                warn!(kind, length, capacity, "packet exceeds half of ring capacity");
            }
            RingEvent::Resized {
                old_capacity,
                new_capacity,
                read,
                write,
                queued,
            } => {
                info!(
                    kind,
                    old_capacity, new_capacity, read, write, queued, "ring resized"
                );
            }
            RingEvent::Reorganized {
                capacity,
                moved_bytes,
                queued,
            } => {
                debug!(kind, capacity, moved_bytes, queued, "ring reorganized in place");
            }
            RingEvent::EmergencyReset {
                previous_capacity,
                new_capacity,
                dropped_packets,
                reason,
            } => {
                error!(
                    kind,
                    previous_capacity,
                    new_capacity,
                    dropped_packets,
                    ?reason,
                    "ring emergency reset"
                );
            }
            RingEvent::BoundsViolation {
                violation,
                dropped_packets,
            } => {
                error!(
                    kind,
                    site = violation.site,
                    offset = violation.offset,
                    len = violation.len,
                    capacity = violation.capacity,
                    dropped_packets,
                    "ring bounds violation, buffer reset to empty"
                );
            }
            RingEvent::PacketDropped {
                length,
                capacity,
                reason,
            } => {
                warn!(kind, length, capacity, ?reason, "packet dropped");
            }
            RingEvent::Evicted {
                length,
                queued,
                capacity,
            } => {
                debug!(kind, length, queued, capacity, "oldest packet evicted");
            }
            RingEvent::TargetTooSmall { needed, available } => {
                warn!(kind, needed, available, "read target too small, packet kept");
            }
        }
    }
}

/// 在内存中保存全部事件的接收端，供测试与嵌入方断言使用。
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RingEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前已记录事件的快照。
    pub fn events(&self) -> Vec<RingEvent> {
        self.events.lock().clone()
    }

    /// 取出并清空已记录事件。
    pub fn take(&self) -> Vec<RingEvent> {
        core::mem::take(&mut *self.events.lock())
    }

    /// 统计指定类别的事件数量。
    pub fn count(&self, kind: &str) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.kind() == kind)
            .count()
    }
}

impl DiagnosticsSink for RecordingSink {
    fn record(&self, event: &RingEvent) {
        self.events.lock().push(event.clone());
    }
}
