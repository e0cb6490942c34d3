// crates/tm_residency/src/config.rs

//! 驻留管理配置
//!
//! 提供可序列化的配置结构和预设，风格与求解器配置保持一致。

use serde::{Deserialize, Serialize};

use crate::backend::DeviceMode;
use tm_foundation::error::{TmError, TmResult};

/// 设备分配默认对齐（CUDA 合并访问友好）
pub const DEFAULT_ALIGNMENT: usize = 256;

/// 驻留管理配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidencyConfig {
    /// 初始内存模式
    pub mode: DeviceMode,
    /// 设备分配对齐（字节，2的幂）
    pub alignment: usize,
    /// memcpy 默认使用异步拷贝
    pub enable_async: bool,
    /// 仿真设备容量上限（字节），None 表示不限制
    pub capacity_bytes: Option<usize>,
}

impl Default for ResidencyConfig {
    fn default() -> Self {
        Self {
            mode: DeviceMode::HostOnly,
            alignment: DEFAULT_ALIGNMENT,
            enable_async: false,
            capacity_bytes: None,
        }
    }
}

impl ResidencyConfig {
    /// 加速配置：设备激活，异步拷贝
    pub fn accelerated() -> Self {
        Self {
            mode: DeviceMode::Active,
            alignment: DEFAULT_ALIGNMENT,
            enable_async: true,
            capacity_bytes: None,
        }
    }

    /// 待命配置：设备可用但不主动使用
    pub fn standby() -> Self {
        Self {
            mode: DeviceMode::Standby,
            ..Self::default()
        }
    }

    /// 校验配置
    pub fn validate(&self) -> TmResult<()> {
        if self.alignment == 0 || !self.alignment.is_power_of_two() {
            return Err(TmError::invalid_config(
                "alignment",
                self.alignment.to_string(),
                "必须为2的幂",
            ));
        }
        if let Some(cap) = self.capacity_bytes {
            if cap < self.alignment {
                return Err(TmError::invalid_config(
                    "capacity_bytes",
                    cap.to_string(),
                    "不得小于对齐粒度",
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ResidencyConfig::default();
        assert_eq!(config.mode, DeviceMode::HostOnly);
        assert_eq!(config.alignment, DEFAULT_ALIGNMENT);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets() {
        assert_eq!(ResidencyConfig::accelerated().mode, DeviceMode::Active);
        assert!(ResidencyConfig::accelerated().enable_async);
        assert_eq!(ResidencyConfig::standby().mode, DeviceMode::Standby);
    }

    #[test]
    fn test_validate_alignment() {
        let mut config = ResidencyConfig::default();
        config.alignment = 7;
        assert!(config.validate().is_err());
        config.alignment = 0;
        assert!(config.validate().is_err());
        config.alignment = 64;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_capacity() {
        let mut config = ResidencyConfig::default();
        config.capacity_bytes = Some(16);
        assert!(config.validate().is_err());
        config.capacity_bytes = Some(1 << 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = ResidencyConfig::accelerated();
        let json = serde_json::to_string(&config).unwrap();
        let back: ResidencyConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
