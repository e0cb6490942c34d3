// crates/tm_residency/src/ledger.rs

//! 账本：进程级缓冲区注册表
//!
//! 维护两个映射：基址→驻留记录、内部地址→别名记录。账本只拥有
//! 元数据，不拥有用户数据；设备镜像的释放由引擎委托后端完成。
//!
//! # 不变量
//!
//! - 每条记录恰好一侧权威（[`Residency`] 二态，无"两侧都有效"状态）
//! - 已注册区间互不重叠（每个字节只有一个所有者）
//! - 别名地址严格位于所属记录内部，永不等于任何基址
//!
//! # 别名解析成本
//!
//! 任意内部指针首次解析需要对全部记录做一次线性扫描（哈希无法
//! 定位内部地址），随后缓存为别名记录，后续解析 O(1)。缓存层是
//! 热路径性能的前提，不是可选优化。

use std::collections::HashMap;

use crate::error::{ResidencyError, ResidencyResult};
use tm_foundation::ptr::{DevicePtr, HostPtr, PtrRange};

/// 缓冲区驻留状态
///
/// 只跟踪哪一侧对后续写入权威；拷贝完成后另一侧即视为过期，
/// 即使两侧数据暂时相同。这避免了写来源跟踪，代价是偶尔的冗余拷贝。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Residency {
    /// 主机侧数据权威
    HostValid,
    /// 设备侧数据权威
    DeviceValid,
}

impl Residency {
    /// 主机侧是否权威
    #[inline]
    pub fn is_host(self) -> bool {
        matches!(self, Residency::HostValid)
    }

    /// 设备侧是否权威
    #[inline]
    pub fn is_device(self) -> bool {
        matches!(self, Residency::DeviceValid)
    }
}

/// 驻留记录：一个已注册缓冲区的全部元数据
#[derive(Debug, Clone)]
pub struct ResidencyRecord {
    /// 注册基址，记录生命期内稳定
    pub(crate) host_ptr: HostPtr,
    /// 区间字节数，注册时固定，非零
    pub(crate) bytes: usize,
    /// 设备镜像地址，首次设备访问时惰性分配
    pub(crate) device_ptr: Option<DevicePtr>,
    /// 当前权威侧
    pub(crate) resident: Residency,
    /// 指向此记录的全部别名（注销时反向清理）
    pub(crate) aliases: Vec<HostPtr>,
}

impl ResidencyRecord {
    fn new(host_ptr: HostPtr, bytes: usize) -> Self {
        Self {
            host_ptr,
            bytes,
            device_ptr: None,
            resident: Residency::HostValid,
            aliases: Vec::new(),
        }
    }

    /// 注册基址
    #[inline]
    pub fn host_ptr(&self) -> HostPtr {
        self.host_ptr
    }

    /// 区间字节数
    #[inline]
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// 设备镜像地址（未分配时为 None）
    #[inline]
    pub fn device_ptr(&self) -> Option<DevicePtr> {
        self.device_ptr
    }

    /// 当前权威侧
    #[inline]
    pub fn resident(&self) -> Residency {
        self.resident
    }

    /// 主机地址区间
    #[inline]
    pub fn range(&self) -> PtrRange {
        PtrRange::new(self.host_ptr, self.bytes)
    }
}

/// 别名记录：一个严格位于某记录内部的指针
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AliasRecord {
    /// 所属记录的基址
    pub owner: HostPtr,
    /// 相对基址的字节偏移，`0 < offset < owner.bytes`
    pub offset: usize,
}

/// 账本
///
/// 进程级单写者状态：注册、注销、解析都在同一控制线程上顺序发生，
/// 内部不做任何同步。干净关闭要求账本被完全排空（由上层保证）。
#[derive(Debug, Default)]
pub struct Ledger {
    /// 基址 → 驻留记录
    records: HashMap<HostPtr, ResidencyRecord>,
    /// 内部地址 → 别名记录
    aliases: HashMap<HostPtr, AliasRecord>,
}

impl Ledger {
    /// 创建空账本
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册新缓冲区
    ///
    /// 初始状态为主机侧权威、无设备镜像。重复注册与零字节注册是
    /// 契约违规，直接返回错误且账本不变。
    pub fn insert(&mut self, ptr: HostPtr, bytes: usize) -> ResidencyResult<HostPtr> {
        if bytes == 0 {
            return Err(ResidencyError::ZeroByteRegistration { ptr });
        }
        if let Some(existing) = self.records.get(&ptr) {
            return Err(ResidencyError::DuplicateRegistration {
                ptr,
                bytes: existing.bytes,
            });
        }
        self.records.insert(ptr, ResidencyRecord::new(ptr, bytes));
        Ok(ptr)
    }

    /// 注销缓冲区，返回被移除的记录
    ///
    /// 先移除指向该记录的所有别名（防止悬垂查找），再移除记录本身。
    /// 设备镜像的释放由调用方（引擎）完成。
    pub fn erase(&mut self, ptr: HostPtr) -> ResidencyResult<ResidencyRecord> {
        let record = self
            .records
            .remove(&ptr)
            .ok_or(ResidencyError::UnknownPointerErase { ptr })?;
        for alias_ptr in &record.aliases {
            self.aliases.remove(alias_ptr);
        }
        Ok(record)
    }

    /// O(1) 基址成员测试
    #[inline]
    pub fn known(&self, ptr: HostPtr) -> bool {
        self.records.contains_key(&ptr)
    }

    /// 只读访问记录
    #[inline]
    pub fn record(&self, ptr: HostPtr) -> Option<&ResidencyRecord> {
        self.records.get(&ptr)
    }

    /// 可变访问记录（仅引擎内部使用）
    #[inline]
    pub(crate) fn record_mut(&mut self, ptr: HostPtr) -> Option<&mut ResidencyRecord> {
        self.records.get_mut(&ptr)
    }

    /// 判断 `ptr` 是否落在某条记录内部，返回所属基址
    ///
    /// 对全部记录做线性扫描。前置条件：`ptr` 不是已知基址
    /// （调用方应先查 [`known`](Self::known)）。
    pub fn is_alias_of(&self, ptr: HostPtr) -> Option<HostPtr> {
        debug_assert!(!self.known(ptr), "is_alias_of called on a known base");
        self.records
            .values()
            .find(|record| record.range().contains_interior(ptr))
            .map(|record| record.host_ptr)
    }

    /// 查询已缓存的别名记录（不触发扫描）
    #[inline]
    pub fn cached_alias(&self, ptr: HostPtr) -> Option<AliasRecord> {
        self.aliases.get(&ptr).copied()
    }

    /// 解析别名，必要时扫描并缓存
    ///
    /// 已缓存则 O(1) 返回；否则扫描全部记录，命中时构造别名记录、
    /// 登记反向引用并缓存。首次解析摊销掉线性扫描成本。
    pub fn resolve_alias(&mut self, ptr: HostPtr) -> Option<AliasRecord> {
        if let Some(alias) = self.aliases.get(&ptr) {
            return Some(*alias);
        }
        let owner = self.is_alias_of(ptr)?;
        let offset = ptr.offset_from(owner);
        let alias = AliasRecord { owner, offset };
        if let Some(record) = self.records.get_mut(&owner) {
            debug_assert!(
                !record.aliases.contains(&ptr),
                "alias back-reference already present"
            );
            record.aliases.push(ptr);
        }
        self.aliases.insert(ptr, alias);
        Some(alias)
    }

    /// 记录条数
    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 账本是否为空（干净关闭检查）
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 已缓存的别名条数
    #[inline]
    pub fn alias_count(&self) -> usize {
        self.aliases.len()
    }

    /// 已注册的总字节数
    pub fn total_bytes(&self) -> usize {
        self.records.values().map(|r| r.bytes).sum()
    }

    /// 遍历全部记录
    pub fn iter(&self) -> impl Iterator<Item = &ResidencyRecord> {
        self.records.values()
    }
}
