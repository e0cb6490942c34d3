// crates/tm_residency/src/wgpu_backend.rs

//! wgpu 设备后端实现
//!
//! 基于 wgpu 提供跨平台的真实设备内存（Vulkan/Metal/DX12/WebGPU）。
//! 每次分配对应一个独立的 `wgpu::Buffer`，后端用一个碰撞分配的
//! 64 位虚拟地址空间为它们编址，使引擎看到的设备指针支持区间
//! 内部偏移（别名推送需要）。
//!
//! wgpu 的拷贝原语要求偏移与长度按 [`wgpu::COPY_BUFFER_ALIGNMENT`]
//! 对齐。长度不足时经填充的暂存数据补齐（缓冲区按对齐尺寸分配，
//! 补齐不会越界）；偏移不对齐则报错。

use std::collections::BTreeMap;

use log::{info, trace};
use wgpu::{
    Adapter, Device, DeviceDescriptor, Features, Instance, InstanceDescriptor, Limits,
    PowerPreference, Queue, RequestAdapterOptions,
};

use crate::backend::{CopyKind, DeviceBackend, DeviceMode};
use crate::error::{ResidencyError, ResidencyResult};
use tm_foundation::error::TmError;
use tm_foundation::ptr::{DevicePtr, HostPtr};

/// 拷贝对齐（字节）
const COPY_ALIGN: u64 = wgpu::COPY_BUFFER_ALIGNMENT;

/// wgpu 设备后端
pub struct WgpuBackend {
    /// wgpu 实例
    instance: Instance,
    /// GPU 适配器
    adapter: Adapter,
    /// GPU 设备
    device: Device,
    /// 命令队列
    queue: Queue,
    /// 当前内存模式（运行时可切换）
    mode: DeviceMode,
    /// 下一个分配的虚拟设备地址
    next_addr: u64,
    /// 虚拟基址 → GPU 缓冲区
    buffers: BTreeMap<u64, wgpu::Buffer>,
    /// 当前已分配字节数（含对齐补齐）
    allocated: usize,
}

impl WgpuBackend {
    /// 异步创建 wgpu 后端
    ///
    /// 返回 `Ok(None)` 表示没有可用的 GPU。初始为待命模式。
    pub async fn new_async() -> Result<Option<Self>, ResidencyError> {
        Self::new_with_preference_async(PowerPreference::HighPerformance).await
    }

    /// 使用指定的电源偏好异步创建
    pub async fn new_with_preference_async(
        power_preference: PowerPreference,
    ) -> Result<Option<Self>, ResidencyError> {
        let instance = Instance::new(InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = match instance
            .request_adapter(&RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
        {
            Some(adapter) => adapter,
            None => return Ok(None),
        };

        let adapter_info = adapter.get_info();
        info!(
            "Found GPU adapter: {} ({:?})",
            adapter_info.name, adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("TideMem Device"),
                    required_features: Features::empty(),
                    required_limits: Limits::downlevel_defaults(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| ResidencyError::DeviceCreation(e.to_string()))?;

        Ok(Some(Self {
            instance,
            adapter,
            device,
            queue,
            mode: DeviceMode::Standby,
            // 地址 0 不分配，保留作无效地址
            next_addr: COPY_ALIGN,
            buffers: BTreeMap::new(),
            allocated: 0,
        }))
    }

    /// 同步创建 wgpu 后端（阻塞调用）
    pub fn new() -> Result<Option<Self>, ResidencyError> {
        pollster::block_on(Self::new_async())
    }

    /// 切换内存模式
    pub fn set_mode(&mut self, mode: DeviceMode) {
        if mode != self.mode {
            trace!("wgpu backend mode: {} -> {}", self.mode, mode);
            self.mode = mode;
        }
    }

    /// 获取 wgpu 实例引用
    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    /// 获取 wgpu 适配器引用
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// 获取 wgpu 设备引用
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// 获取 wgpu 队列引用
    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// 当前已分配字节数
    pub fn allocated_bytes(&self) -> usize {
        self.allocated
    }

    /// 当前分配的缓冲区数
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// 长度按拷贝对齐向上取整
    fn padded(bytes: usize) -> u64 {
        (bytes as u64).div_ceil(COPY_ALIGN) * COPY_ALIGN
    }

    /// 把设备地址解析为（虚拟基址，缓冲区内偏移）
    fn buffer_for(&self, ptr: DevicePtr, bytes: usize) -> ResidencyResult<(u64, u64)> {
        let addr = ptr.addr();
        let (base, buffer) = self
            .buffers
            .range(..=addr)
            .next_back()
            .ok_or(ResidencyError::InvalidDevicePointer { ptr })?;
        let offset = addr - base;
        if offset >= buffer.size() {
            return Err(ResidencyError::InvalidDevicePointer { ptr });
        }
        if offset + Self::padded(bytes) > buffer.size() {
            return Err(ResidencyError::DeviceRangeOutOfBounds { ptr, bytes });
        }
        if offset % COPY_ALIGN != 0 {
            return Err(TmError::invalid_input(format!(
                "device offset 0x{:x} not aligned to {} bytes",
                offset, COPY_ALIGN
            ))
            .into());
        }
        Ok((*base, offset))
    }

    /// 创建暂存缓冲区用于数据读回
    fn create_staging_buffer(&self, size: u64) -> wgpu::Buffer {
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("staging_buffer"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }
}

impl DeviceBackend for WgpuBackend {
    fn name(&self) -> &'static str {
        "wgpu"
    }

    fn mode(&self) -> DeviceMode {
        self.mode
    }

    fn alloc(&mut self, bytes: usize) -> ResidencyResult<DevicePtr> {
        debug_assert!(bytes > 0, "alloc of zero bytes");
        let size = Self::padded(bytes);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("residency_mirror"),
            size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let addr = self.next_addr;
        self.next_addr += size;
        self.allocated += size as usize;
        self.buffers.insert(addr, buffer);
        trace!("wgpu alloc: {} bytes at d:0x{:x}", bytes, addr);
        Ok(DevicePtr::from_addr(addr))
    }

    fn release(&mut self, ptr: DevicePtr) -> ResidencyResult<()> {
        let buffer = self
            .buffers
            .remove(&ptr.addr())
            .ok_or(ResidencyError::InvalidDevicePointer { ptr })?;
        self.allocated = self.allocated.saturating_sub(buffer.size() as usize);
        buffer.destroy();
        trace!("wgpu release: {} bytes at {}", buffer.size(), ptr);
        Ok(())
    }

    fn copy_to_device(
        &mut self,
        dst: DevicePtr,
        src: HostPtr,
        bytes: usize,
    ) -> ResidencyResult<()> {
        let (base, offset) = self.buffer_for(dst, bytes)?;
        let buffer = &self.buffers[&base];
        // 安全性：注册契约保证 src 起 bytes 字节在记录生命期内有效可读
        let host = unsafe { std::slice::from_raw_parts(src.as_raw(), bytes) };
        if bytes as u64 % COPY_ALIGN == 0 {
            self.queue.write_buffer(buffer, offset, host);
        } else {
            // 尾部补零到对齐长度；缓冲区按对齐尺寸分配，不会越界
            let mut staged = vec![0u8; Self::padded(bytes) as usize];
            staged[..bytes].copy_from_slice(host);
            self.queue.write_buffer(buffer, offset, &staged);
        }
        Ok(())
    }

    fn copy_to_host(&mut self, dst: HostPtr, src: DevicePtr, bytes: usize) -> ResidencyResult<()> {
        let (base, offset) = self.buffer_for(src, bytes)?;
        let buffer = &self.buffers[&base];
        let size = Self::padded(bytes);
        let staging = self.create_staging_buffer(size);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("copy_to_host"),
            });
        encoder.copy_buffer_to_buffer(buffer, offset, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv()
            .map_err(|_| TmError::internal("staging buffer map callback dropped"))?
            .map_err(|e| TmError::runtime(format!("buffer map failed: {e}")))?;

        let data = slice.get_mapped_range();
        // 安全性：注册契约保证 dst 起 bytes 字节有效可写
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst.as_raw_mut(), bytes);
        }
        drop(data);
        staging.unmap();
        Ok(())
    }

    fn copy_on_device(
        &mut self,
        dst: DevicePtr,
        src: DevicePtr,
        bytes: usize,
        kind: CopyKind,
    ) -> ResidencyResult<()> {
        let (src_base, src_offset) = self.buffer_for(src, bytes)?;
        let (dst_base, dst_offset) = self.buffer_for(dst, bytes)?;
        let size = Self::padded(bytes);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("copy_on_device"),
            });
        encoder.copy_buffer_to_buffer(
            &self.buffers[&src_base],
            src_offset,
            &self.buffers[&dst_base],
            dst_offset,
            size,
        );
        self.queue.submit(std::iter::once(encoder.finish()));
        if !kind.is_async() {
            self.device.poll(wgpu::Maintain::Wait);
        }
        Ok(())
    }

    fn synchronize(&mut self) -> ResidencyResult<()> {
        self.device.poll(wgpu::Maintain::Wait);
        Ok(())
    }
}
