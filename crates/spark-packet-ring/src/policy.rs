//! 容量策略：可增长（扩容 / 重组 / 紧急重置）与固定（驱逐最旧报文）。
//!
//! # 模块定位（Why）
//! - 两种缓冲形态共享同一个引擎，差异只体现在“放不下时怎么办”；
//! - 策略在构造时选定，以带标签的枚举表达，避免维护两套并行的读写路径。
//!
//! # 契约说明（What）
//! - [`CapacityPolicy::clamp_initial`] 把调用方请求的初始容量收敛到策略边界内；
//! - [`GrowableLimits::plan_growth`] 是纯函数，只给出下一步动作，实际执行由
//!   [`crate::ring`] 在临界区内完成。

use serde::Deserialize;

use crate::error::ConfigError;

const MIB: usize = 1024 * 1024;

/// 可增长策略的默认下限（1 MiB）。
pub const DEFAULT_MIN_CAPACITY: usize = MIB;
/// 可增长策略的默认上限（64 MiB），同时是固定策略允许的最大容量。
pub const DEFAULT_MAX_CAPACITY: usize = 64 * MIB;
/// 达到该容量后若仍需翻倍，则执行紧急重置而不是继续增长（32 MiB）。
pub const DEFAULT_EMERGENCY_THRESHOLD: usize = 32 * MIB;
/// 单次写入内允许的扩容 / 重组次数。
pub const DEFAULT_MAX_RESIZE_ATTEMPTS: u32 = 5;
/// 任意策略下竞技场的最小容量。
pub const MIN_ARENA_CAPACITY: usize = 64;

/// 可增长策略的阈值组合。
///
/// # 教案式说明
/// - **意图 (Why)**：嵌入式车机内存有限，无限增长会导致内存耗尽；越过紧急阈值后，
///   “丢弃并继续”比“保留数据”更重要；
/// - **契约 (What)**：`MIN_ARENA_CAPACITY <= min_capacity <= emergency_threshold <= max_capacity`，
///   `max_resize_attempts >= 1`，由 [`GrowableLimits::validate`] 保证；
/// - **注意事项 (Trade-offs)**：默认值面向视频流；测试或音频场景可以缩小阈值以降低常驻内存。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GrowableLimits {
    pub min_capacity: usize,
    pub max_capacity: usize,
    pub emergency_threshold: usize,
    pub max_resize_attempts: u32,
}

impl Default for GrowableLimits {
    fn default() -> Self {
        Self {
            min_capacity: DEFAULT_MIN_CAPACITY,
            max_capacity: DEFAULT_MAX_CAPACITY,
            emergency_threshold: DEFAULT_EMERGENCY_THRESHOLD,
            max_resize_attempts: DEFAULT_MAX_RESIZE_ATTEMPTS,
        }
    }
}

/// 可增长策略在一次“放不下”之后给出的动作。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum GrowthPlan {
    /// 以给定容量重建竞技场并线性化数据（容量可能不变）。
    Rebuild { capacity: usize },
    /// 丢弃全部数据并收缩到下限。
    EmergencyReset,
}

impl GrowableLimits {
    /// 校验阈值之间的大小关系。
    pub fn validate(&self) -> Result<(), ConfigError> {
        let reason = if self.min_capacity < MIN_ARENA_CAPACITY {
            Some("min_capacity is below the arena floor")
        } else if self.min_capacity > self.emergency_threshold {
            Some("min_capacity exceeds emergency_threshold")
        } else if self.emergency_threshold > self.max_capacity {
            Some("emergency_threshold exceeds max_capacity")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(ConfigError::InvalidLimits {
                min_capacity: self.min_capacity,
                emergency_threshold: self.emergency_threshold,
                max_capacity: self.max_capacity,
                reason,
            });
        }
        if self.max_resize_attempts == 0 {
            return Err(ConfigError::ZeroResizeAttempts);
        }
        Ok(())
    }

    /// 根据当前容量、已用字节与待写入帧长决定下一步动作。
    ///
    /// # 执行逻辑（How）
    /// 1. 空闲字节不少于容量一半、且线性化后足以容纳 `needed`：原容量重组；
    /// 2. 否则尝试翻倍，上限为 `max_capacity`；
    /// 3. 翻倍会越过上限且当前容量已达紧急阈值：紧急重置。
    ///
    /// 线性化后写游标前的空间恰好等于空闲字节，因此第 1 步就是
    /// “头部空间不足一半时增长”在重组后的等价判断。
    pub(crate) fn plan_growth(&self, capacity: usize, used: usize, needed: usize) -> GrowthPlan {
        let free = capacity.saturating_sub(used);
        if free >= capacity / 2 && free > needed {
            return GrowthPlan::Rebuild { capacity };
        }
        let doubled = capacity.saturating_mul(2);
        if doubled > self.max_capacity && capacity >= self.emergency_threshold {
            return GrowthPlan::EmergencyReset;
        }
        GrowthPlan::Rebuild {
            capacity: doubled.min(self.max_capacity),
        }
    }
}

/// 缓冲的容量策略。
///
/// - `Growable`：放不下时重组或扩容，受 [`GrowableLimits`] 约束；
/// - `Fixed`：容量恒定，放不下时驱逐最旧报文，适合内存预算严格的音频链路。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CapacityPolicy {
    Growable(GrowableLimits),
    Fixed,
}

impl Default for CapacityPolicy {
    fn default() -> Self {
        Self::Growable(GrowableLimits::default())
    }
}

impl CapacityPolicy {
    /// 默认阈值的可增长策略。
    pub fn growable() -> Self {
        Self::default()
    }

    /// 固定容量策略。
    pub fn fixed() -> Self {
        Self::Fixed
    }

    /// 策略允许的最小容量。
    pub fn min_capacity(&self) -> usize {
        match self {
            Self::Growable(limits) => limits.min_capacity,
            Self::Fixed => MIN_ARENA_CAPACITY,
        }
    }

    /// 策略允许的最大容量。
    pub fn max_capacity(&self) -> usize {
        match self {
            Self::Growable(limits) => limits.max_capacity,
            Self::Fixed => DEFAULT_MAX_CAPACITY,
        }
    }

    /// 把请求的初始容量夹到策略边界内。
    pub fn clamp_initial(&self, requested: usize) -> usize {
        requested.clamp(self.min_capacity(), self.max_capacity())
    }

    /// 校验策略参数；固定策略没有可配置项。
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Growable(limits) => limits.validate(),
            Self::Fixed => Ok(()),
        }
    }
}
