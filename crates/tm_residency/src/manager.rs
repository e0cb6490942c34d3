// crates/tm_residency/src/manager.rs

//! 驻留引擎
//!
//! 组合账本与设备后端，实现指针解析、定向同步（push/pull）和
//! 双空间 memcpy。所有状态迁移只发生在这三类操作内部，且总是由
//! "请求对侧空间的指针"触发，从不自发发生。
//!
//! # 迁移矩阵（resolve，基址路径）
//!
//! ```text
//! (权威侧,   模式)      动作                        返回
//! (Host,   非激活)     无                          主机指针
//! (Device, 激活)       无                          设备指针
//! (Device, 非激活)     pull 整缓冲区，翻转为 Host    主机指针
//! (Host,   激活)       惰性分配 + push，翻转为 Device 设备指针
//! ```
//!
//! 别名走同一矩阵，作用于所属记录：一致性按整缓冲区粒度维护，
//! 拷贝从不只同步别名覆盖的子区间。

use log::{debug, trace};

use crate::backend::{CopyKind, DeviceBackend, DeviceMode};
use crate::config::ResidencyConfig;
use crate::error::{ResidencyError, ResidencyResult};
use crate::ledger::{AliasRecord, Ledger, Residency};
use tm_foundation::error::TmError;
use tm_foundation::ptr::{DevicePtr, HostPtr};
use tm_foundation::{ensure, require};

/// 解析结果：当前请求空间中有效的指针
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedPtr {
    /// 主机空间指针
    Host(HostPtr),
    /// 设备空间指针
    Device(DevicePtr),
}

impl ResolvedPtr {
    /// 是否解析到设备侧
    #[inline]
    pub fn is_device(self) -> bool {
        matches!(self, ResolvedPtr::Device(_))
    }

    /// 主机指针（设备侧时为 None）
    #[inline]
    pub fn host(self) -> Option<HostPtr> {
        match self {
            ResolvedPtr::Host(p) => Some(p),
            ResolvedPtr::Device(_) => None,
        }
    }

    /// 设备指针（主机侧时为 None）
    #[inline]
    pub fn device(self) -> Option<DevicePtr> {
        match self {
            ResolvedPtr::Host(_) => None,
            ResolvedPtr::Device(d) => Some(d),
        }
    }
}

/// 传输统计
///
/// 幂等性与惰性行为的可观测依据：两次相同的 resolve 最多引发一次拷贝。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferStats {
    /// 主机→设备拷贝次数
    pub h2d_copies: usize,
    /// 设备→主机拷贝次数
    pub d2h_copies: usize,
    /// 设备内拷贝次数
    pub d2d_copies: usize,
    /// 主机内拷贝次数（memcpy 主机路径）
    pub h2h_copies: usize,
    /// 主机→设备累计字节数
    pub bytes_to_device: usize,
    /// 设备→主机累计字节数
    pub bytes_to_host: usize,
    /// 设备镜像分配次数
    pub device_allocs: usize,
    /// 设备镜像释放次数
    pub device_releases: usize,
    /// 别名缓存命中次数
    pub alias_hits: usize,
    /// 别名首次解析（线性扫描）次数
    pub alias_misses: usize,
}

impl TransferStats {
    /// 全部拷贝次数
    pub fn total_copies(&self) -> usize {
        self.h2d_copies + self.d2h_copies + self.d2d_copies + self.h2h_copies
    }
}

/// 驻留引擎
///
/// 显式对象，后端注入而非环境全局量；构造一次，所有缓冲区注销后
/// 再拆毁。单写者：所有调用都在同一控制线程上顺序发生。
pub struct ResidencyManager<B: DeviceBackend> {
    /// 注册表
    ledger: Ledger,
    /// 设备后端
    backend: B,
    /// 配置（memcpy 默认拷贝方式等）
    config: ResidencyConfig,
    /// 传输统计
    stats: TransferStats,
}

impl<B: DeviceBackend> ResidencyManager<B> {
    /// 用默认配置创建引擎
    pub fn new(backend: B) -> Self {
        Self {
            ledger: Ledger::new(),
            backend,
            config: ResidencyConfig::default(),
            stats: TransferStats::default(),
        }
    }

    /// 用指定配置创建引擎
    pub fn with_config(backend: B, config: ResidencyConfig) -> ResidencyResult<Self> {
        config.validate()?;
        Ok(Self {
            ledger: Ledger::new(),
            backend,
            config,
            stats: TransferStats::default(),
        })
    }

    /// 账本只读访问
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// 后端只读访问
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// 后端可变访问（模式切换等）
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// 配置
    pub fn config(&self) -> &ResidencyConfig {
        &self.config
    }

    /// 传输统计
    pub fn stats(&self) -> TransferStats {
        self.stats
    }

    /// 清零传输统计
    pub fn reset_stats(&mut self) {
        self.stats = TransferStats::default();
    }

    // =========================================================================
    // 注册 / 注销
    // =========================================================================

    /// 注册主机缓冲区
    ///
    /// 无论当前模式如何都会登记（晚些切换到加速模式时仍可见）。
    pub fn insert(&mut self, ptr: HostPtr, bytes: usize) -> ResidencyResult<HostPtr> {
        let ptr = self.ledger.insert(ptr, bytes)?;
        debug!("insert {} ({} bytes)", ptr, bytes);
        Ok(ptr)
    }

    /// 注册一个 Pod 切片的存储
    pub fn insert_slice<T: bytemuck::Pod>(&mut self, slice: &[T]) -> ResidencyResult<HostPtr> {
        self.insert(HostPtr::of_slice(slice), std::mem::size_of_val(slice))
    }

    /// 注销缓冲区，释放设备镜像（若存在）
    pub fn erase(&mut self, ptr: HostPtr) -> ResidencyResult<HostPtr> {
        let record = self.ledger.erase(ptr)?;
        if let Some(device_ptr) = record.device_ptr() {
            self.backend.release(device_ptr)?;
            self.stats.device_releases += 1;
        }
        debug!("erase {} ({} bytes)", ptr, record.bytes());
        Ok(ptr)
    }

    /// 注销一个 Pod 切片的存储
    pub fn erase_slice<T: bytemuck::Pod>(&mut self, slice: &[T]) -> ResidencyResult<HostPtr> {
        self.erase(HostPtr::of_slice(slice))
    }

    /// O(1) 基址成员测试
    pub fn known(&self, ptr: HostPtr) -> bool {
        self.ledger.known(ptr)
    }

    // =========================================================================
    // 指针解析
    // =========================================================================

    /// 解析指针到当前模式要求的地址空间
    ///
    /// 仅主机模式下完全透传。加速器激活时，既不是基址也无法解析为
    /// 别名的指针是致命契约违规（使用了从未注册的存储）。
    pub fn resolve(&mut self, ptr: HostPtr) -> ResidencyResult<ResolvedPtr> {
        let mode = self.backend.mode();
        if mode == DeviceMode::HostOnly {
            return Ok(ResolvedPtr::Host(ptr));
        }
        let active = mode.is_active();
        if self.ledger.known(ptr) {
            return self.resolve_base(ptr, active);
        }
        if let Some(alias) = self.lookup_alias(ptr) {
            return match self.resolve_base(alias.owner, active)? {
                ResolvedPtr::Host(_) => Ok(ResolvedPtr::Host(ptr)),
                ResolvedPtr::Device(device_base) => {
                    Ok(ResolvedPtr::Device(device_base.offset(alias.offset)))
                }
            };
        }
        if active {
            return Err(ResidencyError::UnregisteredAcceleratorAccess { ptr });
        }
        Ok(ResolvedPtr::Host(ptr))
    }

    // =========================================================================
    // 定向同步
    // =========================================================================

    /// 强制主机→设备同步 `bytes` 字节（可小于注册大小，部分更新）
    ///
    /// 无视当前权威侧，必要时先分配镜像；完成后设备侧权威。
    pub fn push(&mut self, ptr: HostPtr, bytes: usize) -> ResidencyResult<()> {
        ensure!(bytes > 0, ResidencyError::ZeroByteTransfer { ptr });
        if self.backend.mode() == DeviceMode::HostOnly {
            return Ok(());
        }
        if self.ledger.known(ptr) {
            let total = self.record_bytes(ptr)?;
            ensure!(bytes <= total, TmError::out_of_range("bytes", bytes, 1, total));
            let device_ptr = self.ensure_mirror(ptr)?;
            self.backend.copy_to_device(device_ptr, ptr, bytes)?;
            self.stats.h2d_copies += 1;
            self.stats.bytes_to_device += bytes;
            self.set_resident(ptr, Residency::DeviceValid);
            trace!("push {} ({} of {} bytes)", ptr, bytes, total);
            return Ok(());
        }
        if let Some(alias) = self.lookup_alias(ptr) {
            let total = self.record_bytes(alias.owner)?;
            ensure!(
                alias.offset + bytes <= total,
                TmError::out_of_range("bytes", bytes, 1, total - alias.offset)
            );
            let device_base = self.ensure_mirror(alias.owner)?;
            self.backend
                .copy_to_device(device_base.offset(alias.offset), ptr, bytes)?;
            self.stats.h2d_copies += 1;
            self.stats.bytes_to_device += bytes;
            self.set_resident(alias.owner, Residency::DeviceValid);
            trace!("push alias {} (+{}, {} bytes)", alias.owner, alias.offset, bytes);
            return Ok(());
        }
        if self.backend.mode().is_active() {
            return Err(ResidencyError::UnregisteredAcceleratorAccess { ptr });
        }
        Ok(())
    }

    /// 强制设备→主机同步 `bytes` 字节
    ///
    /// 记录已是主机侧权威时为空操作；完成拷贝后主机侧权威。
    pub fn pull(&mut self, ptr: HostPtr, bytes: usize) -> ResidencyResult<()> {
        ensure!(bytes > 0, ResidencyError::ZeroByteTransfer { ptr });
        if self.backend.mode() == DeviceMode::HostOnly {
            return Ok(());
        }
        if self.ledger.known(ptr) {
            let (total, resident, device_ptr) = self.record_state(ptr)?;
            if resident.is_host() {
                return Ok(());
            }
            ensure!(bytes <= total, TmError::out_of_range("bytes", bytes, 1, total));
            let device_ptr = require!(device_ptr, ResidencyError::DeviceMirrorMissing { ptr });
            self.backend.copy_to_host(ptr, device_ptr, bytes)?;
            self.stats.d2h_copies += 1;
            self.stats.bytes_to_host += bytes;
            self.set_resident(ptr, Residency::HostValid);
            trace!("pull {} ({} of {} bytes)", ptr, bytes, total);
            return Ok(());
        }
        if let Some(alias) = self.lookup_alias(ptr) {
            let (total, resident, device_ptr) = self.record_state(alias.owner)?;
            if resident.is_host() {
                return Ok(());
            }
            ensure!(
                alias.offset + bytes <= total,
                TmError::out_of_range("bytes", bytes, 1, total - alias.offset)
            );
            let device_base = require!(
                device_ptr,
                ResidencyError::DeviceMirrorMissing { ptr: alias.owner }
            );
            self.backend
                .copy_to_host(ptr, device_base.offset(alias.offset), bytes)?;
            self.stats.d2h_copies += 1;
            self.stats.bytes_to_host += bytes;
            self.set_resident(alias.owner, Residency::HostValid);
            trace!("pull alias {} (+{}, {} bytes)", alias.owner, alias.offset, bytes);
            return Ok(());
        }
        if self.backend.mode().is_active() {
            return Err(ResidencyError::UnregisteredAcceleratorAccess { ptr });
        }
        Ok(())
    }

    // =========================================================================
    // 双空间 memcpy
    // =========================================================================

    /// 在当前模式对应的空间中拷贝 `bytes` 字节
    ///
    /// 两端先经 [`resolve`](Self::resolve)：加速器激活时执行设备内
    /// 拷贝（按 `kind` 同步或异步），否则执行主机内拷贝。零字节请求
    /// 是空操作，原样返回 `dst`。
    pub fn memcpy(
        &mut self,
        dst: HostPtr,
        src: HostPtr,
        bytes: usize,
        kind: CopyKind,
    ) -> ResidencyResult<ResolvedPtr> {
        if bytes == 0 {
            return Ok(ResolvedPtr::Host(dst));
        }
        let resolved_dst = self.resolve(dst)?;
        let resolved_src = self.resolve(src)?;
        if self.backend.mode().is_active() {
            let device_dst = require!(
                resolved_dst.device(),
                TmError::internal("active-mode resolve returned a host pointer")
            );
            let device_src = require!(
                resolved_src.device(),
                TmError::internal("active-mode resolve returned a host pointer")
            );
            self.backend
                .copy_on_device(device_dst, device_src, bytes, kind)?;
            self.stats.d2d_copies += 1;
        } else {
            // 主机路径。注册区间互不重叠（账本不变量），可用非重叠拷贝
            unsafe {
                std::ptr::copy_nonoverlapping(src.as_raw(), dst.as_raw_mut(), bytes);
            }
            self.stats.h2h_copies += 1;
        }
        Ok(resolved_dst)
    }

    /// 按配置的默认拷贝方式执行 [`memcpy`](Self::memcpy)
    pub fn copy(&mut self, dst: HostPtr, src: HostPtr, bytes: usize) -> ResidencyResult<ResolvedPtr> {
        let kind = if self.config.enable_async {
            CopyKind::Async
        } else {
            CopyKind::Sync
        };
        self.memcpy(dst, src, bytes, kind)
    }

    /// 等待后端完成所有已提交操作
    pub fn synchronize(&mut self) -> ResidencyResult<()> {
        self.backend.synchronize()
    }

    // =========================================================================
    // 内部辅助
    // =========================================================================

    /// 基址路径的四态迁移
    fn resolve_base(&mut self, base: HostPtr, active: bool) -> ResidencyResult<ResolvedPtr> {
        let (bytes, resident, device_ptr) = self.record_state(base)?;
        match (resident, active) {
            (Residency::HostValid, false) => Ok(ResolvedPtr::Host(base)),
            (Residency::DeviceValid, true) => {
                let device_ptr =
                    require!(device_ptr, ResidencyError::DeviceMirrorMissing { ptr: base });
                Ok(ResolvedPtr::Device(device_ptr))
            }
            (Residency::DeviceValid, false) => {
                let device_ptr =
                    require!(device_ptr, ResidencyError::DeviceMirrorMissing { ptr: base });
                self.backend.copy_to_host(base, device_ptr, bytes)?;
                self.stats.d2h_copies += 1;
                self.stats.bytes_to_host += bytes;
                self.set_resident(base, Residency::HostValid);
                trace!("resolve: pull {} ({} bytes), host-valid", base, bytes);
                Ok(ResolvedPtr::Host(base))
            }
            (Residency::HostValid, true) => {
                let device_ptr = self.ensure_mirror(base)?;
                self.backend.copy_to_device(device_ptr, base, bytes)?;
                self.stats.h2d_copies += 1;
                self.stats.bytes_to_device += bytes;
                self.set_resident(base, Residency::DeviceValid);
                trace!("resolve: push {} ({} bytes), device-valid", base, bytes);
                Ok(ResolvedPtr::Device(device_ptr))
            }
        }
    }

    /// 别名查找：缓存命中 O(1)，否则首次线性扫描并缓存
    fn lookup_alias(&mut self, ptr: HostPtr) -> Option<AliasRecord> {
        if let Some(alias) = self.ledger.cached_alias(ptr) {
            self.stats.alias_hits += 1;
            return Some(alias);
        }
        let alias = self.ledger.resolve_alias(ptr)?;
        self.stats.alias_misses += 1;
        Some(alias)
    }

    /// 取记录大小
    fn record_bytes(&self, base: HostPtr) -> ResidencyResult<usize> {
        let record = require!(
            self.ledger.record(base),
            TmError::internal("record disappeared under single-writer assumption")
        );
        Ok(record.bytes())
    }

    /// 取记录的（大小，权威侧，设备镜像）快照
    fn record_state(
        &self,
        base: HostPtr,
    ) -> ResidencyResult<(usize, Residency, Option<DevicePtr>)> {
        let record = require!(
            self.ledger.record(base),
            TmError::internal("record disappeared under single-writer assumption")
        );
        Ok((record.bytes(), record.resident(), record.device_ptr()))
    }

    /// 惰性分配设备镜像
    fn ensure_mirror(&mut self, base: HostPtr) -> ResidencyResult<DevicePtr> {
        let (bytes, _, device_ptr) = self.record_state(base)?;
        if let Some(device_ptr) = device_ptr {
            return Ok(device_ptr);
        }
        let device_ptr = self.backend.alloc(bytes)?;
        self.stats.device_allocs += 1;
        if let Some(record) = self.ledger.record_mut(base) {
            record.device_ptr = Some(device_ptr);
        }
        trace!("lazy mirror for {}: {} ({} bytes)", base, device_ptr, bytes);
        Ok(device_ptr)
    }

    /// 翻转权威侧
    fn set_resident(&mut self, base: HostPtr, state: Residency) {
        if let Some(record) = self.ledger.record_mut(base) {
            record.resident = state;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulated::EmulatedBackend;
    use crate::ledger::Residency;

    fn manager(mode: DeviceMode) -> ResidencyManager<EmulatedBackend> {
        let mut backend = EmulatedBackend::new();
        backend.set_mode(mode);
        ResidencyManager::new(backend)
    }

    fn resident_of(mgr: &ResidencyManager<EmulatedBackend>, ptr: HostPtr) -> Residency {
        mgr.ledger().record(ptr).unwrap().resident()
    }

    #[test]
    fn test_host_only_pass_through() {
        let mut mgr = manager(DeviceMode::HostOnly);
        let data = vec![0u8; 64];
        let p = mgr.insert_slice(&data).unwrap();

        let resolved = mgr.resolve(p).unwrap();
        assert_eq!(resolved, ResolvedPtr::Host(p));
        // 无任何设备活动
        assert_eq!(mgr.stats().total_copies(), 0);
        assert_eq!(mgr.backend().region_count(), 0);
    }

    #[test]
    fn test_scenario_host_only_then_active() {
        // Insert(p, 64) 在仅主机模式下
        let mut mgr = manager(DeviceMode::HostOnly);
        let data: Vec<u8> = (0..64).collect();
        let p = mgr.insert_slice(&data).unwrap();
        assert_eq!(mgr.resolve(p).unwrap(), ResolvedPtr::Host(p));
        assert_eq!(mgr.backend().region_count(), 0);

        // 切换到加速模式：分配镜像、推送 64 字节、设备侧权威
        mgr.backend_mut().set_mode(DeviceMode::Active);
        let resolved = mgr.resolve(p).unwrap();
        assert!(resolved.is_device());
        assert_eq!(mgr.stats().h2d_copies, 1);
        assert_eq!(mgr.stats().bytes_to_device, 64);
        assert_eq!(resident_of(&mgr, p), Residency::DeviceValid);

        let device_ptr = resolved.device().unwrap();
        assert_eq!(mgr.backend().device_bytes(device_ptr, 64).unwrap(), data);

        // Pull(p, 64) 拷回，主机侧权威
        mgr.pull(p, 64).unwrap();
        assert_eq!(mgr.stats().d2h_copies, 1);
        assert_eq!(resident_of(&mgr, p), Residency::HostValid);
    }

    #[test]
    fn test_push_pull_roundtrip_bit_for_bit() {
        let mut mgr = manager(DeviceMode::Standby);
        let mut data: Vec<u8> = (0..128).map(|i| (i * 7 % 251) as u8).collect();
        let original = data.clone();
        let p = mgr.insert_slice(&data).unwrap();

        mgr.push(p, 128).unwrap();
        assert_eq!(resident_of(&mgr, p), Residency::DeviceValid);

        // 破坏主机侧内容后拉回
        data.iter_mut().for_each(|b| *b = 0);
        mgr.pull(p, 128).unwrap();
        assert_eq!(data, original);
        assert_eq!(resident_of(&mgr, p), Residency::HostValid);
    }

    #[test]
    fn test_resolve_idempotent_at_most_one_copy() {
        let mut mgr = manager(DeviceMode::Active);
        let data = vec![1u8; 64];
        let p = mgr.insert_slice(&data).unwrap();

        let first = mgr.resolve(p).unwrap();
        let second = mgr.resolve(p).unwrap();
        assert_eq!(first, second);
        assert_eq!(mgr.stats().h2d_copies, 1);
        assert_eq!(mgr.stats().device_allocs, 1);
    }

    #[test]
    fn test_scenario_alias_resolution_and_cache() {
        let mut mgr = manager(DeviceMode::Standby);
        let data = vec![0u8; 100];
        let p = mgr.insert_slice(&data).unwrap();
        let q = p.offset(40);

        assert!(!mgr.known(q));
        assert_eq!(mgr.resolve(q).unwrap(), ResolvedPtr::Host(q));
        assert_eq!(mgr.stats().alias_misses, 1);
        assert_eq!(mgr.stats().alias_hits, 0);
        let alias = mgr.ledger().cached_alias(q).unwrap();
        assert_eq!(alias.owner, p);
        assert_eq!(alias.offset, 40);

        // 第二次解析走 O(1) 缓存路径，不再扫描
        mgr.resolve(q).unwrap();
        assert_eq!(mgr.stats().alias_misses, 1);
        assert_eq!(mgr.stats().alias_hits, 1);
    }

    #[test]
    fn test_base_pointer_never_becomes_alias() {
        let mut mgr = manager(DeviceMode::Standby);
        let data = vec![0u8; 100];
        let p = mgr.insert_slice(&data).unwrap();

        mgr.resolve(p).unwrap();
        assert!(mgr.ledger().cached_alias(p).is_none());
        assert_eq!(mgr.ledger().alias_count(), 0);
    }

    #[test]
    fn test_alias_device_pointer_carries_offset() {
        let mut mgr = manager(DeviceMode::Active);
        let data: Vec<u8> = (0..100).collect();
        let p = mgr.insert_slice(&data).unwrap();
        let q = p.offset(40);

        let resolved = mgr.resolve(q).unwrap();
        let device_base = mgr.ledger().record(p).unwrap().device_ptr().unwrap();
        assert_eq!(resolved, ResolvedPtr::Device(device_base.offset(40)));
        // 拷贝作用于整个所属缓冲区
        assert_eq!(mgr.stats().bytes_to_device, 100);
        assert_eq!(
            mgr.backend().device_bytes(device_base, 100).unwrap(),
            data
        );
    }

    #[test]
    fn test_alias_resolution_via_alias_then_base_no_extra_copy() {
        let mut mgr = manager(DeviceMode::Active);
        let data = vec![3u8; 100];
        let p = mgr.insert_slice(&data).unwrap();
        let q = p.offset(8);

        mgr.resolve(q).unwrap(); // 推送整缓冲区
        mgr.resolve(p).unwrap(); // 已设备侧权威，无新拷贝
        assert_eq!(mgr.stats().h2d_copies, 1);
    }

    #[test]
    fn test_standby_pulls_device_valid_record() {
        let mut mgr = manager(DeviceMode::Active);
        let data = vec![9u8; 64];
        let p = mgr.insert_slice(&data).unwrap();
        mgr.resolve(p).unwrap();
        assert_eq!(resident_of(&mgr, p), Residency::DeviceValid);

        // 回到待命模式：请求主机指针触发 pull
        mgr.backend_mut().set_mode(DeviceMode::Standby);
        let resolved = mgr.resolve(p).unwrap();
        assert_eq!(resolved, ResolvedPtr::Host(p));
        assert_eq!(mgr.stats().d2h_copies, 1);
        assert_eq!(resident_of(&mgr, p), Residency::HostValid);
    }

    #[test]
    fn test_erase_cleans_aliases_and_releases_mirror() {
        let mut mgr = manager(DeviceMode::Active);
        let data = vec![0u8; 100];
        let p = mgr.insert_slice(&data).unwrap();
        let q = p.offset(40);
        mgr.resolve(q).unwrap();
        assert_eq!(mgr.ledger().alias_count(), 1);
        assert_eq!(mgr.backend().region_count(), 1);

        mgr.erase(p).unwrap();
        assert!(!mgr.known(p));
        assert!(mgr.ledger().cached_alias(q).is_none());
        assert_eq!(mgr.ledger().alias_count(), 0);
        assert_eq!(mgr.backend().region_count(), 0);
        assert_eq!(mgr.stats().device_releases, 1);

        // 同一区间的新注册看不到陈旧别名
        mgr.insert(p, 100).unwrap();
        assert!(mgr.ledger().cached_alias(q).is_none());
        mgr.erase(p).unwrap();
        assert!(mgr.ledger().is_empty());
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut mgr = manager(DeviceMode::Standby);
        let data = vec![0u8; 64];
        let p = mgr.insert_slice(&data).unwrap();
        assert!(matches!(
            mgr.insert(p, 32),
            Err(ResidencyError::DuplicateRegistration { .. })
        ));
        // 原记录不受影响
        assert_eq!(mgr.ledger().record(p).unwrap().bytes(), 64);
    }

    #[test]
    fn test_erase_unknown_fails() {
        let mut mgr = manager(DeviceMode::Standby);
        assert!(matches!(
            mgr.erase(HostPtr::from_addr(0x1234)),
            Err(ResidencyError::UnknownPointerErase { .. })
        ));
    }

    #[test]
    fn test_zero_byte_transfers_fail() {
        let mut mgr = manager(DeviceMode::Active);
        let data = vec![0u8; 64];
        let p = mgr.insert_slice(&data).unwrap();
        assert!(matches!(
            mgr.push(p, 0),
            Err(ResidencyError::ZeroByteTransfer { .. })
        ));
        assert!(matches!(
            mgr.pull(p, 0),
            Err(ResidencyError::ZeroByteTransfer { .. })
        ));
    }

    #[test]
    fn test_unregistered_accelerator_access_fails() {
        let mut mgr = manager(DeviceMode::Active);
        let stray = HostPtr::from_addr(0xdead_0000);
        assert!(matches!(
            mgr.resolve(stray),
            Err(ResidencyError::UnregisteredAcceleratorAccess { .. })
        ));
        assert!(matches!(
            mgr.push(stray, 8),
            Err(ResidencyError::UnregisteredAcceleratorAccess { .. })
        ));
        assert!(matches!(
            mgr.pull(stray, 8),
            Err(ResidencyError::UnregisteredAcceleratorAccess { .. })
        ));
    }

    #[test]
    fn test_unregistered_pointer_tolerated_when_inactive() {
        let mut mgr = manager(DeviceMode::Standby);
        let stray = HostPtr::from_addr(0xdead_0000);
        assert_eq!(mgr.resolve(stray).unwrap(), ResolvedPtr::Host(stray));
        assert!(mgr.push(stray, 8).is_ok());
        assert!(mgr.pull(stray, 8).is_ok());
        assert_eq!(mgr.stats().total_copies(), 0);
    }

    #[test]
    fn test_pull_noop_when_host_valid() {
        let mut mgr = manager(DeviceMode::Standby);
        let data = vec![0u8; 64];
        let p = mgr.insert_slice(&data).unwrap();
        mgr.pull(p, 64).unwrap();
        assert_eq!(mgr.stats().d2h_copies, 0);
    }

    #[test]
    fn test_partial_push() {
        let mut mgr = manager(DeviceMode::Standby);
        let mut data: Vec<u8> = vec![0u8; 64];
        let p = mgr.insert_slice(&data).unwrap();
        mgr.push(p, 64).unwrap();

        // 只更新前 16 字节
        data[..16].iter_mut().for_each(|b| *b = 0xab);
        mgr.push(p, 16).unwrap();
        let device_ptr = mgr.ledger().record(p).unwrap().device_ptr().unwrap();
        let contents = mgr.backend().device_bytes(device_ptr, 64).unwrap();
        assert!(contents[..16].iter().all(|&b| b == 0xab));
        assert!(contents[16..].iter().all(|&b| b == 0));
        assert_eq!(mgr.stats().bytes_to_device, 64 + 16);
    }

    #[test]
    fn test_push_beyond_registered_size_fails() {
        let mut mgr = manager(DeviceMode::Standby);
        let data = vec![0u8; 64];
        let p = mgr.insert_slice(&data).unwrap();
        assert!(mgr.push(p, 65).is_err());
    }

    #[test]
    fn test_alias_push_partial_update() {
        let mut mgr = manager(DeviceMode::Standby);
        let mut data: Vec<u8> = vec![0u8; 100];
        let p = mgr.insert_slice(&data).unwrap();
        mgr.push(p, 100).unwrap();

        data[40..48].iter_mut().for_each(|b| *b = 0xcd);
        let q = p.offset(40);
        mgr.push(q, 8).unwrap();

        let device_ptr = mgr.ledger().record(p).unwrap().device_ptr().unwrap();
        let contents = mgr.backend().device_bytes(device_ptr, 100).unwrap();
        assert!(contents[40..48].iter().all(|&b| b == 0xcd));
        assert!(contents[..40].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_alias_pull_partial() {
        let mut mgr = manager(DeviceMode::Standby);
        let mut data: Vec<u8> = (0..100).collect();
        let original = data.clone();
        let p = mgr.insert_slice(&data).unwrap();
        mgr.push(p, 100).unwrap();

        // 破坏主机侧子区间，仅拉回该区间
        data[40..48].iter_mut().for_each(|b| *b = 0);
        let q = p.offset(40);
        mgr.pull(q, 8).unwrap();
        assert_eq!(data, original);
        assert_eq!(resident_of(&mgr, p), Residency::HostValid);
    }

    #[test]
    fn test_memcpy_host_path() {
        let mut mgr = manager(DeviceMode::HostOnly);
        let src: Vec<u8> = (0..32).collect();
        let dst = vec![0u8; 32];
        let ps = mgr.insert_slice(&src).unwrap();
        let pd = mgr.insert_slice(&dst).unwrap();

        let resolved = mgr.memcpy(pd, ps, 32, CopyKind::Sync).unwrap();
        assert_eq!(resolved, ResolvedPtr::Host(pd));
        assert_eq!(dst, src);
        assert_eq!(mgr.stats().h2h_copies, 1);
        assert_eq!(mgr.stats().d2d_copies, 0);
    }

    #[test]
    fn test_memcpy_device_path() {
        let mut mgr = manager(DeviceMode::Active);
        let src: Vec<u8> = (100..164).map(|i| i as u8).collect();
        let dst = vec![0u8; 64];
        let ps = mgr.insert_slice(&src).unwrap();
        let pd = mgr.insert_slice(&dst).unwrap();

        let resolved = mgr.memcpy(pd, ps, 64, CopyKind::Sync).unwrap();
        assert!(resolved.is_device());
        assert_eq!(mgr.stats().d2d_copies, 1);

        // 两端都被推送到设备，目标设备内容等于源
        mgr.pull(pd, 64).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn test_memcpy_async_device_path() {
        let mut mgr = manager(DeviceMode::Active);
        let src = vec![5u8; 16];
        let dst = vec![0u8; 16];
        let ps = mgr.insert_slice(&src).unwrap();
        let pd = mgr.insert_slice(&dst).unwrap();

        mgr.memcpy(pd, ps, 16, CopyKind::Async).unwrap();
        mgr.synchronize().unwrap();
        mgr.pull(pd, 16).unwrap();
        assert_eq!(dst, src);
    }

    #[test]
    fn test_memcpy_zero_bytes_noop() {
        let mut mgr = manager(DeviceMode::Active);
        let dst = HostPtr::from_addr(0x9000);
        let src = HostPtr::from_addr(0xa000);
        // 未注册也不报错：零字节请求在解析之前短路
        let resolved = mgr.memcpy(dst, src, 0, CopyKind::Sync).unwrap();
        assert_eq!(resolved, ResolvedPtr::Host(dst));
        assert_eq!(mgr.stats().total_copies(), 0);
    }

    #[test]
    fn test_copy_uses_configured_kind() {
        let backend = {
            let mut b = EmulatedBackend::new();
            b.set_mode(DeviceMode::Active);
            b
        };
        let mut mgr =
            ResidencyManager::with_config(backend, ResidencyConfig::accelerated()).unwrap();
        assert!(mgr.config().enable_async);

        let src = vec![1u8; 8];
        let dst = vec![0u8; 8];
        let ps = mgr.insert_slice(&src).unwrap();
        let pd = mgr.insert_slice(&dst).unwrap();
        mgr.copy(pd, ps, 8).unwrap();
        assert_eq!(mgr.stats().d2d_copies, 1);
    }

    #[test]
    fn test_with_config_validates() {
        let mut config = ResidencyConfig::default();
        config.alignment = 3;
        assert!(ResidencyManager::with_config(EmulatedBackend::new(), config).is_err());
    }

    #[test]
    fn test_reset_stats() {
        let mut mgr = manager(DeviceMode::Active);
        let data = vec![0u8; 64];
        let p = mgr.insert_slice(&data).unwrap();
        mgr.resolve(p).unwrap();
        assert_ne!(mgr.stats(), TransferStats::default());
        mgr.reset_stats();
        assert_eq!(mgr.stats(), TransferStats::default());
    }

    #[test]
    fn test_drained_ledger_after_teardown() {
        let mut mgr = manager(DeviceMode::Active);
        let a = vec![0u8; 64];
        let b = vec![0u8; 128];
        let pa = mgr.insert_slice(&a).unwrap();
        let pb = mgr.insert_slice(&b).unwrap();
        mgr.resolve(pa).unwrap();
        mgr.resolve(pb).unwrap();

        mgr.erase_slice(&a).unwrap();
        mgr.erase_slice(&b).unwrap();
        assert!(mgr.ledger().is_empty());
        assert_eq!(mgr.backend().region_count(), 0);
        assert_eq!(mgr.backend().allocated_bytes(), 0);
    }
}
