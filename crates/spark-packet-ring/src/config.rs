//! 缓冲装配参数。
//!
//! # 设计要点（How）
//! - 参数以 `serde::Deserialize` 描述，缺省字段回落到 [`crate::policy`] 中的默认常量；
//! - 开启 `config-toml` 特性后可直接从 TOML 文本装配，文档形如：
//!
//! ```toml
//! initial_capacity = 4194304
//!
//! [policy]
//! kind = "growable"
//! min_capacity = 1048576
//! max_capacity = 67108864
//! emergency_threshold = 33554432
//! max_resize_attempts = 5
//! ```
//!
//! 固定容量写作 `policy = { kind = "fixed" }`。

use std::sync::Arc;

use serde::Deserialize;

use crate::{
    diagnostics::DiagnosticsSink,
    error::ConfigError,
    policy::{CapacityPolicy, DEFAULT_MIN_CAPACITY},
    ring::{PacketRing, PacketRingBuilder},
};

/// 构造一个 [`PacketRing`] 所需的全部参数。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    pub initial_capacity: usize,
    pub policy: CapacityPolicy,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_MIN_CAPACITY,
            policy: CapacityPolicy::default(),
        }
    }
}

impl RingConfig {
    /// 解析 TOML 文本并校验策略阈值。
    #[cfg(feature = "config-toml")]
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.policy.validate()?;
        Ok(config)
    }

    /// 转换为装配器，便于继续替换接收端等运行期依赖。
    pub fn builder(&self) -> PacketRingBuilder {
        PacketRing::builder()
            .initial_capacity(self.initial_capacity)
            .policy(self.policy)
    }

    pub fn build_with_sink(&self, sink: Arc<dyn DiagnosticsSink>) -> Result<PacketRing, ConfigError> {
        self.builder().sink(sink).build()
    }
}

#[cfg(all(test, feature = "config-toml"))]
mod tests {
    use super::*;
    use crate::policy::GrowableLimits;

    #[test]
    fn empty_document_yields_defaults() {
        assert_eq!(RingConfig::from_toml_str("").expect("解析"), RingConfig::default());
    }

    #[test]
    fn partial_growable_limits_fill_from_defaults() {
        let config = RingConfig::from_toml_str(
            r#"
            initial_capacity = 2048
            policy = { kind = "growable", min_capacity = 1024, emergency_threshold = 4096, max_capacity = 8192 }
            "#,
        )
        .expect("解析");
        assert_eq!(
            config.policy,
            CapacityPolicy::Growable(GrowableLimits {
                min_capacity: 1024,
                max_capacity: 8192,
                emergency_threshold: 4096,
                max_resize_attempts: 5,
            })
        );
    }

    #[test]
    fn invalid_limits_are_rejected_after_parsing() {
        let err = RingConfig::from_toml_str(
            r#"
            [policy]
            kind = "growable"
            min_capacity = 8192
            emergency_threshold = 4096
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidLimits { .. }));

        let err = RingConfig::from_toml_str("policy = { kind = \"elastic\" }").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }
}
