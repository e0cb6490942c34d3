// crates/tm_residency/src/backend.rs

//! 设备后端抽象 trait
//!
//! 定义驻留引擎消费的加速器能力接口：设备内存分配、
//! 主机↔设备拷贝、设备内拷贝，以及当前内存模式查询。
//! 引擎不关心后端如何实现这些原语（真实 GPU、进程内仿真等）。

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ResidencyResult;
use tm_foundation::ptr::{DevicePtr, HostPtr};

/// 内存模式
///
/// 由后端报告的全局状态，决定驻留引擎把指针解析到哪个地址空间。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceMode {
    /// 仅主机：加速器不参与，引擎完全透传
    HostOnly,
    /// 待命：加速器可用但当前不执行内核，指针解析到主机侧
    Standby,
    /// 激活：内核在加速器上执行，指针必须解析到设备侧
    Active,
}

impl DeviceMode {
    /// 加速器是否参与（待命或激活）
    #[inline]
    pub fn device_enabled(self) -> bool {
        matches!(self, DeviceMode::Standby | DeviceMode::Active)
    }

    /// 当前是否要求设备侧驻留
    #[inline]
    pub fn is_active(self) -> bool {
        matches!(self, DeviceMode::Active)
    }
}

impl fmt::Display for DeviceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceMode::HostOnly => write!(f, "host-only"),
            DeviceMode::Standby => write!(f, "standby"),
            DeviceMode::Active => write!(f, "active"),
        }
    }
}

/// 拷贝方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CopyKind {
    /// 同步拷贝，返回时已完成
    Sync,
    /// 异步拷贝，排入设备执行流；同一流内保证顺序
    Async,
}

impl CopyKind {
    /// 是否为异步拷贝
    #[inline]
    pub fn is_async(self) -> bool {
        matches!(self, CopyKind::Async)
    }
}

/// 设备后端 trait
///
/// 驻留引擎通过此接口驱动一个具体的加速器。所有方法都在单一控制
/// 线程上被顺序调用（单写者模型），因此统一使用 `&mut self`，
/// 后端内部无需任何同步。
///
/// # 实现要求
///
/// - 拷贝原语对主机地址做裸内存访问，调用方（引擎）保证注册区间
///   在记录生命期内有效
/// - 方法不应 panic，契约违规返回相应错误
pub trait DeviceBackend {
    /// 后端名称
    ///
    /// 人类可读的标识，如 "emulated" 或 "wgpu"
    fn name(&self) -> &'static str;

    /// 当前内存模式
    fn mode(&self) -> DeviceMode;

    /// 分配设备缓冲区，返回设备地址
    fn alloc(&mut self, bytes: usize) -> ResidencyResult<DevicePtr>;

    /// 释放设备缓冲区
    ///
    /// `ptr` 必须是此前 [`alloc`](Self::alloc) 返回的基址。
    fn release(&mut self, ptr: DevicePtr) -> ResidencyResult<()>;

    /// 主机→设备拷贝
    ///
    /// `dst` 可以是分配区间的内部地址（别名推送）。
    fn copy_to_device(&mut self, dst: DevicePtr, src: HostPtr, bytes: usize)
        -> ResidencyResult<()>;

    /// 设备→主机拷贝
    ///
    /// `src` 可以是分配区间的内部地址。
    fn copy_to_host(&mut self, dst: HostPtr, src: DevicePtr, bytes: usize) -> ResidencyResult<()>;

    /// 设备内拷贝
    fn copy_on_device(
        &mut self,
        dst: DevicePtr,
        src: DevicePtr,
        bytes: usize,
        kind: CopyKind,
    ) -> ResidencyResult<()>;

    /// 等待所有已提交的设备操作完成
    fn synchronize(&mut self) -> ResidencyResult<()> {
        Ok(())
    }
}

// =============================================================================
// 主机后端（无加速器）
// =============================================================================

/// 纯主机后端
///
/// 模式恒为 [`DeviceMode::HostOnly`]，引擎在该模式下完全透传，
/// 设备原语不可达；若被直接调用则返回 `DeviceUnavailable`。
#[derive(Debug, Clone, Copy, Default)]
pub struct HostBackend;

impl HostBackend {
    /// 创建主机后端
    pub fn new() -> Self {
        Self
    }
}

impl DeviceBackend for HostBackend {
    fn name(&self) -> &'static str {
        "host"
    }

    fn mode(&self) -> DeviceMode {
        DeviceMode::HostOnly
    }

    fn alloc(&mut self, _bytes: usize) -> ResidencyResult<DevicePtr> {
        Err(crate::error::ResidencyError::DeviceUnavailable("host backend"))
    }

    fn release(&mut self, _ptr: DevicePtr) -> ResidencyResult<()> {
        Err(crate::error::ResidencyError::DeviceUnavailable("host backend"))
    }

    fn copy_to_device(
        &mut self,
        _dst: DevicePtr,
        _src: HostPtr,
        _bytes: usize,
    ) -> ResidencyResult<()> {
        Err(crate::error::ResidencyError::DeviceUnavailable("host backend"))
    }

    fn copy_to_host(
        &mut self,
        _dst: HostPtr,
        _src: DevicePtr,
        _bytes: usize,
    ) -> ResidencyResult<()> {
        Err(crate::error::ResidencyError::DeviceUnavailable("host backend"))
    }

    fn copy_on_device(
        &mut self,
        _dst: DevicePtr,
        _src: DevicePtr,
        _bytes: usize,
        _kind: CopyKind,
    ) -> ResidencyResult<()> {
        Err(crate::error::ResidencyError::DeviceUnavailable("host backend"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResidencyError;

    #[test]
    fn test_device_mode_enabled() {
        assert!(!DeviceMode::HostOnly.device_enabled());
        assert!(DeviceMode::Standby.device_enabled());
        assert!(DeviceMode::Active.device_enabled());
    }

    #[test]
    fn test_device_mode_active() {
        assert!(!DeviceMode::HostOnly.is_active());
        assert!(!DeviceMode::Standby.is_active());
        assert!(DeviceMode::Active.is_active());
    }

    #[test]
    fn test_device_mode_display() {
        assert_eq!(DeviceMode::HostOnly.to_string(), "host-only");
        assert_eq!(DeviceMode::Active.to_string(), "active");
    }

    #[test]
    fn test_copy_kind() {
        assert!(!CopyKind::Sync.is_async());
        assert!(CopyKind::Async.is_async());
    }

    #[test]
    fn test_host_backend_mode() {
        let backend = HostBackend::new();
        assert_eq!(backend.mode(), DeviceMode::HostOnly);
        assert_eq!(backend.name(), "host");
    }

    #[test]
    fn test_host_backend_rejects_device_ops() {
        let mut backend = HostBackend::new();
        assert!(matches!(
            backend.alloc(64),
            Err(ResidencyError::DeviceUnavailable(_))
        ));
        assert!(matches!(
            backend.release(DevicePtr::from_addr(0x100)),
            Err(ResidencyError::DeviceUnavailable(_))
        ));
    }
}
