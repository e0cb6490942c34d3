// crates/tm_residency/src/emulated.rs

//! 进程内仿真设备后端
//!
//! 用主机内存模拟一个独立的 64 位设备地址空间：对齐的碰撞分配器
//! 在 `BTreeMap` 上维护分配区间，每个区间由一个 `Vec<u8>` 承载。
//! 拷贝原语支持区间内部地址（别名推送、子区间 d2d 拷贝需要）。
//!
//! 异步拷贝立即执行：单一按序执行流下，立即完成与排队执行在
//! 语义上等价。此后端是确定性的，驱动全部驻留引擎测试。

use std::collections::BTreeMap;

use log::trace;

use crate::backend::{CopyKind, DeviceBackend, DeviceMode};
use crate::config::{ResidencyConfig, DEFAULT_ALIGNMENT};
use crate::error::{ResidencyError, ResidencyResult};
use tm_foundation::ptr::{DevicePtr, HostPtr};

/// 仿真设备后端
#[derive(Debug)]
pub struct EmulatedBackend {
    /// 当前内存模式（运行时可切换）
    mode: DeviceMode,
    /// 分配对齐（字节）
    alignment: usize,
    /// 容量上限，None 表示不限制
    capacity: Option<usize>,
    /// 当前已分配字节数
    allocated: usize,
    /// 下一个分配的虚拟设备地址
    next_addr: u64,
    /// 设备基址 → 承载存储
    regions: BTreeMap<u64, Vec<u8>>,
}

impl EmulatedBackend {
    /// 创建仿真后端（默认待命模式，不限容量）
    pub fn new() -> Self {
        Self {
            mode: DeviceMode::Standby,
            alignment: DEFAULT_ALIGNMENT,
            capacity: None,
            allocated: 0,
            // 地址 0 不分配，保留作无效地址
            next_addr: DEFAULT_ALIGNMENT as u64,
            regions: BTreeMap::new(),
        }
    }

    /// 按配置创建仿真后端
    pub fn from_config(config: &ResidencyConfig) -> ResidencyResult<Self> {
        config.validate()?;
        Ok(Self {
            mode: config.mode,
            alignment: config.alignment,
            capacity: config.capacity_bytes,
            allocated: 0,
            next_addr: config.alignment as u64,
            regions: BTreeMap::new(),
        })
    }

    /// 切换内存模式
    pub fn set_mode(&mut self, mode: DeviceMode) {
        if mode != self.mode {
            trace!("emulated backend mode: {} -> {}", self.mode, mode);
            self.mode = mode;
        }
    }

    /// 当前已分配字节数
    pub fn allocated_bytes(&self) -> usize {
        self.allocated
    }

    /// 当前分配区间数
    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    /// 读取设备内存内容（测试与诊断用）
    pub fn device_bytes(&self, ptr: DevicePtr, bytes: usize) -> ResidencyResult<Vec<u8>> {
        let (base, offset) = self.region_for(ptr, bytes)?;
        let data = &self.regions[&base];
        Ok(data[offset..offset + bytes].to_vec())
    }

    /// 把设备地址解析为（区间基址，区间内偏移）
    ///
    /// 地址可以位于区间内部；越过区间末尾的访问是错误。
    fn region_for(&self, ptr: DevicePtr, bytes: usize) -> ResidencyResult<(u64, usize)> {
        let addr = ptr.addr();
        let (base, data) = self
            .regions
            .range(..=addr)
            .next_back()
            .ok_or(ResidencyError::InvalidDevicePointer { ptr })?;
        let offset = (addr - base) as usize;
        if offset >= data.len() {
            return Err(ResidencyError::InvalidDevicePointer { ptr });
        }
        if offset + bytes > data.len() {
            return Err(ResidencyError::DeviceRangeOutOfBounds { ptr, bytes });
        }
        Ok((*base, offset))
    }
}

impl Default for EmulatedBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceBackend for EmulatedBackend {
    fn name(&self) -> &'static str {
        "emulated"
    }

    fn mode(&self) -> DeviceMode {
        self.mode
    }

    fn alloc(&mut self, bytes: usize) -> ResidencyResult<DevicePtr> {
        debug_assert!(bytes > 0, "alloc of zero bytes");
        if let Some(cap) = self.capacity {
            if self.allocated + bytes > cap {
                return Err(ResidencyError::AllocationFailed {
                    requested: bytes,
                    available: cap - self.allocated,
                });
            }
        }
        let addr = self.next_addr;
        let span = bytes.div_ceil(self.alignment) * self.alignment;
        self.next_addr += span as u64;
        self.allocated += bytes;
        self.regions.insert(addr, vec![0u8; bytes]);
        trace!("emulated alloc: {} bytes at d:0x{:x}", bytes, addr);
        Ok(DevicePtr::from_addr(addr))
    }

    fn release(&mut self, ptr: DevicePtr) -> ResidencyResult<()> {
        let data = self
            .regions
            .remove(&ptr.addr())
            .ok_or(ResidencyError::InvalidDevicePointer { ptr })?;
        self.allocated -= data.len();
        trace!("emulated release: {} bytes at {}", data.len(), ptr);
        Ok(())
    }

    fn copy_to_device(
        &mut self,
        dst: DevicePtr,
        src: HostPtr,
        bytes: usize,
    ) -> ResidencyResult<()> {
        let (base, offset) = self.region_for(dst, bytes)?;
        // 安全性：注册契约保证 src 起 bytes 字节在记录生命期内有效可读
        let host = unsafe { std::slice::from_raw_parts(src.as_raw(), bytes) };
        let data = self
            .regions
            .get_mut(&base)
            .ok_or(ResidencyError::InvalidDevicePointer { ptr: dst })?;
        data[offset..offset + bytes].copy_from_slice(host);
        Ok(())
    }

    fn copy_to_host(&mut self, dst: HostPtr, src: DevicePtr, bytes: usize) -> ResidencyResult<()> {
        let (base, offset) = self.region_for(src, bytes)?;
        let data = &self.regions[&base];
        // 安全性：注册契约保证 dst 起 bytes 字节有效可写，且与设备
        // 承载存储不重叠（两个地址空间物理独立）
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr().add(offset), dst.as_raw_mut(), bytes);
        }
        Ok(())
    }

    fn copy_on_device(
        &mut self,
        dst: DevicePtr,
        src: DevicePtr,
        bytes: usize,
        kind: CopyKind,
    ) -> ResidencyResult<()> {
        let (src_base, src_offset) = self.region_for(src, bytes)?;
        let (dst_base, dst_offset) = self.region_for(dst, bytes)?;
        // 经由临时缓冲，统一处理同区间重叠与跨区间两种情况
        let staged: Vec<u8> = self.regions[&src_base][src_offset..src_offset + bytes].to_vec();
        let data = self
            .regions
            .get_mut(&dst_base)
            .ok_or(ResidencyError::InvalidDevicePointer { ptr: dst })?;
        data[dst_offset..dst_offset + bytes].copy_from_slice(&staged);
        if kind.is_async() {
            trace!("emulated d2d async copy ({} bytes) completed eagerly", bytes);
        }
        Ok(())
    }

    fn synchronize(&mut self) -> ResidencyResult<()> {
        // 所有操作立即完成，无待同步状态
        Ok(())
    }
}
