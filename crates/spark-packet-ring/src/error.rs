//! # error 模块说明
//!
//! ## 角色定位（Why）
//! - 汇总环形缓冲在写入、解码、重组过程中可能出现的异常语义；
//! - 所有错误都是“本地可恢复”的：调用方只会观察到一次失败的写入或一次空读取，
//!   不会收到需要终止进程的致命故障。
//!
//! ## 设计要求（What）
//! - [`RingError`] 是写路径的返回类型，变体与数据面约定的三类错误一一对应；
//! - [`BoundsViolation`] 由帧解码器与游标校验以显式 `Result` 形式返回，
//!   是否将缓冲重置为空由引擎决定，而不是由底层校验函数决定。

use thiserror::Error;

/// 写入路径可观察到的错误。
///
/// # 教案式说明
/// - **意图 (Why)**：把“参数非法”“报文过大”“游标越界”三类失败统一成一个可 `?` 传播的枚举，
///   让上游传输线程可以按需统计或忽略；
/// - **契约 (What)**：
///   - `InvalidParameter`：未修改任何状态；
///   - `OversizedPacket`：报文被丢弃，缓冲保持原状（或已完成一次紧急重置）；
///   - `BoundsViolation`：缓冲已被强制回到空状态；
/// - **设计权衡 (Trade-offs)**：读路径不返回该错误，而是沿用“0 / 空”哨兵值，
///   与解码线程“取不到就下次再取”的节奏保持一致。
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
pub enum RingError {
    /// 声明的长度或跳过字节数不满足 `skip <= length <= u32::MAX`。
    #[error("invalid packet parameters: length={length}, skip={skip}")]
    InvalidParameter { length: usize, skip: usize },

    /// 报文（含 8 字节帧头）即使在空缓冲中也放不下。
    #[error("packet of {needed} bytes cannot fit into a ring limited to {limit} bytes")]
    OversizedPacket { needed: usize, limit: usize },

    /// 写入期间检测到游标或帧头越界，缓冲已重置。
    #[error(transparent)]
    BoundsViolation(#[from] BoundsViolation),
}

/// 帧头或游标越界的详细上下文。
///
/// # 契约说明（What）
/// - `site`：触发检查的位置标识，例如 `"decode_header"`、`"payload"`；
/// - `offset` / `len`：被检查区间的起点与长度；
/// - `capacity`：检查发生时的竞技场容量；
/// - 该结构为 `Copy`，可以直接嵌入诊断事件而无需分配。
#[derive(Clone, Copy, Debug, Error, PartialEq, Eq)]
#[error("bounds violation at `{site}`: offset={offset}, len={len}, capacity={capacity}")]
pub struct BoundsViolation {
    pub site: &'static str,
    pub offset: usize,
    pub len: usize,
    pub capacity: usize,
}

impl BoundsViolation {
    pub(crate) const fn new(site: &'static str, offset: usize, len: usize, capacity: usize) -> Self {
        Self {
            site,
            offset,
            len,
            capacity,
        }
    }
}

/// 配置装配阶段的错误。
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 增长策略的阈值关系不成立。
    #[error(
        "invalid growable limits: min={min_capacity}, emergency={emergency_threshold}, max={max_capacity} ({reason})"
    )]
    InvalidLimits {
        min_capacity: usize,
        emergency_threshold: usize,
        max_capacity: usize,
        reason: &'static str,
    },

    /// 单次写入允许的扩容尝试次数必须大于 0。
    #[error("max_resize_attempts must be at least 1")]
    ZeroResizeAttempts,

    /// TOML 文本无法解析为 [`crate::RingConfig`]。
    #[cfg(feature = "config-toml")]
    #[error("failed to parse ring configuration: {0}")]
    Toml(#[from] toml::de::Error),
}
