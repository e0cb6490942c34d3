// crates/tm_foundation/src/error.rs

//! 错误处理模块，定义统一错误类型
//!
//! 提供 `TmError` 枚举和 `TmResult` 类型别名。
//!
//! # 设计原则
//!
//! 1. **层次化**: 基础层只定义通用错误，驻留管理相关错误在 tm_residency 中定义
//! 2. **易用性**: 提供便捷的构造方法
//! 3. **不中止进程**: 契约违规以错误值形式返回给调用方
//!
//! # 示例
//!
//! ```
//! use tm_foundation::error::{TmError, TmResult};
//!
//! fn check_alignment(align: usize) -> TmResult<()> {
//!     if !align.is_power_of_two() {
//!         return Err(TmError::invalid_config(
//!             "alignment",
//!             align.to_string(),
//!             "必须为2的幂",
//!         ));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// 统一结果类型
pub type TmResult<T> = Result<T, TmError>;

/// TideMem 基础错误类型
///
/// 通用错误类型。驻留引擎的契约违规错误在 `tm_residency` 中扩展。
#[derive(Error, Debug)]
pub enum TmError {
    /// 无效输入
    #[error("无效的输入数据: {message}")]
    InvalidInput {
        /// 说明无效原因
        message: String,
    },

    /// 数据超出范围
    #[error("数据超出范围: {field}={value}, 期望范围=[{min}, {max}]")]
    OutOfRange {
        /// 字段名
        field: &'static str,
        /// 实际值
        value: usize,
        /// 最小允许值
        min: usize,
        /// 最大允许值
        max: usize,
    },

    /// 大小不匹配
    #[error("大小不匹配: {name} 期望{expected}, 实际{actual}")]
    SizeMismatch {
        /// 数据名称
        name: &'static str,
        /// 期望大小
        expected: usize,
        /// 实际大小
        actual: usize,
    },

    /// 配置错误
    #[error("配置错误: {message}")]
    Config {
        /// 具体错误信息
        message: String,
    },

    /// 配置值无效
    #[error("配置值无效: {key}={value}, 原因: {reason}")]
    InvalidConfig {
        /// 配置键名
        key: String,
        /// 配置值
        value: String,
        /// 无效原因说明
        reason: String,
    },

    /// 验证失败
    #[error("验证失败: {0}")]
    Validation(String),

    /// 内部错误
    #[error("内部错误: {message}")]
    Internal {
        /// 内部错误描述
        message: String,
    },

    /// 运行时错误
    #[error("运行时错误: {0}")]
    Runtime(String),
}

// ========================================================================
// 便捷构造方法
// ========================================================================

impl TmError {
    /// 无效输入
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// 数据超出范围
    pub fn out_of_range(field: &'static str, value: usize, min: usize, max: usize) -> Self {
        Self::OutOfRange {
            field,
            value,
            min,
            max,
        }
    }

    /// 大小不匹配
    pub fn size_mismatch(name: &'static str, expected: usize, actual: usize) -> Self {
        Self::SizeMismatch {
            name,
            expected,
            actual,
        }
    }

    /// 配置错误
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// 配置值无效
    pub fn invalid_config(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// 验证失败
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// 内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// 运行时错误
    pub fn runtime(message: impl Into<String>) -> Self {
        Self::Runtime(message.into())
    }
}

// ========================================================================
// 验证辅助方法
// ========================================================================

impl TmError {
    /// 检查大小是否匹配
    #[inline]
    pub fn check_size(name: &'static str, expected: usize, actual: usize) -> TmResult<()> {
        if expected != actual {
            Err(Self::size_mismatch(name, expected, actual))
        } else {
            Ok(())
        }
    }

    /// 检查值是否在范围内
    #[inline]
    pub fn check_range(field: &'static str, value: usize, min: usize, max: usize) -> TmResult<()> {
        if value < min || value > max {
            Err(Self::out_of_range(field, value, min, max))
        } else {
            Ok(())
        }
    }
}

// ========================================================================
// 测试
// ========================================================================
