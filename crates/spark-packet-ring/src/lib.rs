//! `spark-packet-ring` 提供实时音视频数据面使用的变长报文环形缓冲。
//!
//! # 模块定位（Why）
//! - USB 传输线程以突发速率推入带帧头的二进制报文，解码 / 渲染线程按媒体节奏取出；
//! - 缓冲建立在单块连续竞技场之上，支持回绕、动态扩容、零拷贝写入与安全拷贝读取，
//!   并在过载时有界地丢弃数据而不是阻塞任何一方。
//!
//! # 设计概要（How）
//! - `arena`：游标与空间运算，不含任何策略；
//! - `framer`：8 字节大端帧头 `(length, skip)` 的编解码与越界校验；
//! - `policy`：可增长 / 固定两种容量策略；
//! - `ring`：在一把互斥锁之后组合以上模块，对外暴露 [`PacketRing`]；
//! - `diagnostics` / `metrics`：事件接收端与实例级计数，二者都不依赖全局状态。
//!
//! # 快速上手（What）
//! ```
//! use spark_packet_ring::PacketRing;
//!
//! let ring = PacketRing::new(1 << 20);
//! ring.write_packet(&[1, 2, 3]).expect("空缓冲一定放得下");
//! let mut target = [0u8; 8];
//! assert_eq!(ring.read_packet_into(&mut target), 3);
//! assert_eq!(&target[..3], &[1, 2, 3]);
//! ```

mod arena;
mod config;
mod diagnostics;
mod error;
mod framer;
mod metrics;
mod policy;
mod ring;

pub use config::RingConfig;
pub use diagnostics::{
    DiagnosticSeverity, DiagnosticsSink, DropReason, NoopSink, RecordingSink, ResetReason,
    RingEvent, TracingSink,
};
pub use error::{BoundsViolation, ConfigError, RingError};
pub use framer::{HEADER_LEN, MAX_PACKET_LEN, PacketHeader};
pub use metrics::{MetricsSnapshot, RingMetrics, RingStats};
pub use policy::{
    CapacityPolicy, DEFAULT_EMERGENCY_THRESHOLD, DEFAULT_MAX_CAPACITY,
    DEFAULT_MAX_RESIZE_ATTEMPTS, DEFAULT_MIN_CAPACITY, GrowableLimits, MIN_ARENA_CAPACITY,
};
pub use ring::{PacketRing, PacketRingBuilder};
