// crates/tm_residency/src/error.rs

//! 驻留管理错误类型
//!
//! 所有列出的失败模式都是调用方的契约违规（编程错误），不是可恢复的
//! 运行时状况。它们以可区分的错误值返回给调用方，失败的调用不会在
//! 账本中留下部分修改。没有重试策略，也没有备用分配策略。

use thiserror::Error;
use tm_foundation::error::TmError;
use tm_foundation::ptr::{DevicePtr, HostPtr};

/// 驻留管理结果类型
pub type ResidencyResult<T> = Result<T, ResidencyError>;

/// 驻留管理错误
#[derive(Error, Debug)]
pub enum ResidencyError {
    /// 重复注册同一基址
    #[error("duplicate registration of {ptr} ({bytes} bytes already registered)")]
    DuplicateRegistration {
        /// 已注册的基址
        ptr: HostPtr,
        /// 已注册的字节数
        bytes: usize,
    },

    /// 注销未注册的指针
    #[error("erase of unregistered pointer {ptr}")]
    UnknownPointerErase {
        /// 未注册的指针
        ptr: HostPtr,
    },

    /// 零字节注册
    #[error("zero-byte registration at {ptr}")]
    ZeroByteRegistration {
        /// 注册的基址
        ptr: HostPtr,
    },

    /// 零字节传输
    #[error("zero-byte transfer requested for {ptr}")]
    ZeroByteTransfer {
        /// 传输的指针
        ptr: HostPtr,
    },

    /// 加速器模式下使用未注册的存储
    #[error("pointer {ptr} used on the accelerator but never registered")]
    UnregisteredAcceleratorAccess {
        /// 违规的指针
        ptr: HostPtr,
    },

    /// 记录声称设备侧有效但镜像缺失（内部不变量被破坏）
    #[error("record {ptr} is device-resident but has no device mirror")]
    DeviceMirrorMissing {
        /// 记录的基址
        ptr: HostPtr,
    },

    /// 设备分配失败
    #[error("device allocation failed: requested {requested} bytes, available {available}")]
    AllocationFailed {
        /// 请求的字节数
        requested: usize,
        /// 剩余可用字节数
        available: usize,
    },

    /// 无效设备指针
    #[error("invalid device pointer {ptr}")]
    InvalidDevicePointer {
        /// 无效的设备指针
        ptr: DevicePtr,
    },

    /// 设备侧访问越界
    #[error("device access out of bounds: {ptr} + {bytes} bytes exceeds its allocation")]
    DeviceRangeOutOfBounds {
        /// 访问起点
        ptr: DevicePtr,
        /// 访问字节数
        bytes: usize,
    },

    /// 后端没有可用设备
    #[error("no device available: {0}")]
    DeviceUnavailable(&'static str),

    /// 设备创建失败
    #[error("device creation failed: {0}")]
    DeviceCreation(String),

    /// 基础层错误
    #[error(transparent)]
    Foundation(#[from] TmError),
}
