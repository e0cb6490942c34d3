// crates/tm_residency/src/lib.rs

//! tm_residency - 双地址空间驻留管理
//!
//! 为带加速器的数值程序维护主机/设备两个地址空间之间的缓冲区
//! 一致性：注册的主机缓冲区在任一时刻恰有一侧持有权威数据，
//! 设备镜像惰性分配，拷贝只在指针被解析到非权威一侧时发生。
//!
//! # 架构
//!
//! ```text
//! +--------------------------------------------------+
//! |              ResidencyManager<B>                  |
//! |   resolve / push / pull / memcpy / insert / erase |
//! +-------------------+------------------------------+
//!                     |
//!          +----------+-----------+
//!          |                      |
//!     +----v-----+      +--------v---------+
//!     |  Ledger  |      | B: DeviceBackend |
//!     | 记录+别名 |      +--------+---------+
//!     +----------+               |
//!                   +------------+------------+
//!                   |            |            |
//!              HostBackend  EmulatedBackend  WgpuBackend
//!                                             (feature "gpu")
//! ```
//!
//! # 快速上手
//!
//! ```
//! use tm_residency::prelude::*;
//!
//! let mut backend = EmulatedBackend::new();
//! backend.set_mode(DeviceMode::Active);
//! let mut mgr = ResidencyManager::new(backend);
//!
//! let data = vec![0.0f64; 1024];
//! let p = mgr.insert_slice(&data)?;
//!
//! // 加速模式下解析到设备指针，首次解析分配镜像并推送
//! let resolved = mgr.resolve(p)?;
//! assert!(resolved.is_device());
//!
//! mgr.erase_slice(&data)?;
//! # Ok::<(), tm_residency::ResidencyError>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod config;
pub mod emulated;
pub mod error;
pub mod ledger;
pub mod manager;

#[cfg(feature = "gpu")]
pub mod wgpu_backend;

pub use backend::{CopyKind, DeviceBackend, DeviceMode, HostBackend};
pub use config::{ResidencyConfig, DEFAULT_ALIGNMENT};
pub use emulated::EmulatedBackend;
pub use error::{ResidencyError, ResidencyResult};
pub use ledger::{AliasRecord, Ledger, Residency, ResidencyRecord};
pub use manager::{ResidencyManager, ResolvedPtr, TransferStats};

#[cfg(feature = "gpu")]
pub use wgpu_backend::WgpuBackend;

/// 常用类型一次性导入
pub mod prelude {
    pub use crate::backend::{CopyKind, DeviceBackend, DeviceMode, HostBackend};
    pub use crate::config::ResidencyConfig;
    pub use crate::emulated::EmulatedBackend;
    pub use crate::error::{ResidencyError, ResidencyResult};
    pub use crate::ledger::{Ledger, Residency};
    pub use crate::manager::{ResidencyManager, ResolvedPtr, TransferStats};
    pub use tm_foundation::ptr::{DevicePtr, HostPtr};

    #[cfg(feature = "gpu")]
    pub use crate::wgpu_backend::WgpuBackend;
}
