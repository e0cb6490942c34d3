// crates/tm_foundation/src/lib.rs

//! TideMem Foundation Layer
//!
//! 基础层，提供整个项目的底层抽象。
//!
//! # 模块概览
//!
//! - [`ptr`]: 不透明指针句柄（主机/设备两个地址空间）
//! - [`error`]: 统一错误类型
//!
//! # 设计原则
//!
//! 1. **最小依赖**: 仅依赖 serde、thiserror 和 bytemuck
//! 2. **类型安全**: 编译期区分主机地址与设备地址，防止误用
//! 3. **零开销抽象**: 句柄在 release 模式下与裸整数性能相同
//!
//! # 示例
//!
//! ```
//! use tm_foundation::ptr::{HostPtr, PtrRange};
//!
//! let data = vec![0.0f64; 16];
//! let base = HostPtr::of_slice(&data);
//! let range = PtrRange::new(base, 128);
//! assert!(range.contains_interior(base.offset(64)));
//! assert!(!range.contains_interior(base));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod ptr;

pub use error::{TmError, TmResult};
pub use ptr::{DevicePtr, HostPtr, PtrRange};

/// 契约检查宏：条件不满足时返回错误
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            return Err($err.into());
        }
    };
}

/// 契约检查宏：Option 为 None 时返回错误
#[macro_export]
macro_rules! require {
    ($opt:expr, $err:expr) => {
        match $opt {
            Some(v) => v,
            None => return Err($err.into()),
        }
    };
}

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::error::{TmError, TmResult};
    pub use crate::ptr::{DevicePtr, HostPtr, PtrRange};
    pub use crate::{ensure, require};
}
