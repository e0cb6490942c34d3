// crates/tm_foundation/src/ptr.rs

//! 强类型指针句柄系统
//!
//! 为主机和设备两个物理内存空间提供不透明的地址句柄，
//! 防止在编译期混用两个地址空间的指针。
//!
//! # 设计目标
//!
//! 1. **类型安全**: 编译期区分 `HostPtr` 与 `DevicePtr`
//! 2. **零开销**: release 模式下与裸整数完全相同
//! 3. **显式偏移运算**: 别名解析依赖的地址算术集中在少数方法中
//! 4. **身份语义**: 句柄只是地址，不携带所有权，不保证可解引用
//!
//! # 示例
//!
//! ```
//! use tm_foundation::ptr::HostPtr;
//!
//! let data = vec![1.0f64; 8];
//! let base = HostPtr::of_slice(&data);
//! let q = base.offset(24);
//! assert_eq!(q.offset_from(base), 24);
//! ```

use bytemuck::Pod;
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// 主机指针
// ============================================================================

/// 主机地址空间的指针句柄
///
/// 作为注册表键使用的稳定身份。句柄本身不保证指向有效内存；
/// 通过它执行数据拷贝时，由注册方保证地址区间在记录生命期内有效。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HostPtr(usize);

impl HostPtr {
    /// 从裸地址创建
    #[inline]
    pub const fn from_addr(addr: usize) -> Self {
        Self(addr)
    }

    /// 取切片首元素地址作为句柄
    #[inline]
    pub fn of_slice<T: Pod>(slice: &[T]) -> Self {
        Self(slice.as_ptr() as usize)
    }

    /// 取单个值的地址作为句柄
    #[inline]
    pub fn of_ref<T: Pod>(value: &T) -> Self {
        Self(value as *const T as usize)
    }

    /// 裸地址值
    #[inline]
    pub const fn addr(self) -> usize {
        self.0
    }

    /// 只读字节指针
    #[inline]
    pub const fn as_raw(self) -> *const u8 {
        self.0 as *const u8
    }

    /// 可写字节指针
    #[inline]
    pub const fn as_raw_mut(self) -> *mut u8 {
        self.0 as *mut u8
    }

    /// 向后偏移 `bytes` 字节
    #[inline]
    pub const fn offset(self, bytes: usize) -> Self {
        Self(self.0 + bytes)
    }

    /// 相对 `base` 的字节偏移
    ///
    /// 调用方保证 `self >= base`。
    #[inline]
    pub fn offset_from(self, base: Self) -> usize {
        debug_assert!(self.0 >= base.0, "offset_from: self before base");
        self.0 - base.0
    }
}

impl fmt::Display for HostPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h:0x{:x}", self.0)
    }
}

// ============================================================================
// 设备指针
// ============================================================================

/// 设备地址空间的指针句柄
///
/// 设备地址由后端分配，对上层完全不透明；唯一允许的运算是
/// 字节偏移（别名解析需要 `base + offset`）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DevicePtr(u64);

impl DevicePtr {
    /// 从裸地址创建
    #[inline]
    pub const fn from_addr(addr: u64) -> Self {
        Self(addr)
    }

    /// 裸地址值
    #[inline]
    pub const fn addr(self) -> u64 {
        self.0
    }

    /// 向后偏移 `bytes` 字节
    #[inline]
    pub const fn offset(self, bytes: usize) -> Self {
        Self(self.0 + bytes as u64)
    }

    /// 相对 `base` 的字节偏移
    #[inline]
    pub fn offset_from(self, base: Self) -> usize {
        debug_assert!(self.0 >= base.0, "offset_from: self before base");
        (self.0 - base.0) as usize
    }
}

impl fmt::Display for DevicePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "d:0x{:x}", self.0)
    }
}

// ============================================================================
// 地址区间
// ============================================================================

/// 主机地址空间中的半开字节区间 `[base, base + bytes)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtrRange {
    /// 区间起始地址
    pub base: HostPtr,
    /// 区间字节数
    pub bytes: usize,
}

impl PtrRange {
    /// 创建区间
    #[inline]
    pub const fn new(base: HostPtr, bytes: usize) -> Self {
        Self { base, bytes }
    }

    /// 区间结束地址（不含）
    #[inline]
    pub const fn end(self) -> HostPtr {
        self.base.offset(self.bytes)
    }

    /// 是否包含该地址（含起点，不含终点）
    #[inline]
    pub fn contains(self, ptr: HostPtr) -> bool {
        self.base <= ptr && ptr < self.end()
    }

    /// 是否严格包含该地址（不含起点与终点）
    ///
    /// 别名定义：严格位于区间内部的指针才是别名。
    #[inline]
    pub fn contains_interior(self, ptr: HostPtr) -> bool {
        self.base < ptr && ptr < self.end()
    }

    /// 是否与另一区间有重叠
    #[inline]
    pub fn overlaps(self, other: Self) -> bool {
        self.base < other.end() && other.base < self.end()
    }
}

impl fmt::Display for PtrRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, +{}B)", self.base, self.bytes)
    }
}
