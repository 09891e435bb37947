//! # CachedTargets：路由表快照仓储
//!
//! ## 核心意图（Why）
//! - 控制面（单一逻辑写者）整表推送路由表，入口层的大量并发请求只读；
//! - 读路径必须零锁：借助 [`ArcSwapOption`] 一次 `load` 即拿到完整快照，写者 `store` 后
//!   新快照立即对后续读者可见，旧快照在最后一个持有者释放后回收。
//!
//! ## 行为契约（What）
//! - 从未写入时，[`CachedTargets::load`] 返回共享的空快照哨兵，绝不 panic；
//!   [`CachedTargets::is_initialized`] 可区分“空表”与“从未收到配置”；
//! - 并发写者之间不做串行化，最后一次 `store` 生效；
//! - `range_*` 系列在调用时刻的快照上遍历，访问者返回 `false` 即提前停止。
//!
//! ## 风险提示（Trade-offs）
//! - 遍历期间持有快照 `Arc`，即便期间发生替换也不会看到新表；这正是“一致视图”的代价，
//!   长时间遍历会推迟旧快照的回收。

use std::fmt;
use std::sync::{Arc, OnceLock};

use arc_swap::ArcSwapOption;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;

use crate::error::ConfigError;
use crate::key::{BrokerKey, SEPARATOR, TargetKey};
use crate::model::{Broker, Target, TargetsConfig};

/// 只读路由表视图，是入口路由器依赖的全部配置接口。
///
/// # 教案式说明
/// - **意图 (Why)**：路由器与句柄注册表只需要“按键查 Broker”和“遍历全部 Target”两种能力，
///   以 trait 暴露便于测试替身与未来的其他快照来源；
/// - **契约 (What)**：返回值均为 `Arc`，调用方不得也无法修改快照内容；
///   访问者签名使用 `&mut dyn FnMut`，保证 trait 可以作为 `dyn ReadonlyTargets` 使用。
pub trait ReadonlyTargets: Send + Sync {
    /// 按键查找 Broker。
    fn get_broker_by_key(&self, key: &BrokerKey) -> Option<Arc<Broker>>;

    /// 先定位所属 Broker，再在其中查找 Target。
    fn get_target_by_key(&self, key: &TargetKey) -> Option<Arc<Target>> {
        let broker = self.get_broker_by_key(key.parent_key())?;
        broker.targets.get(key.name()).cloned()
    }

    /// 遍历全部 Target，访问者返回 `false` 时停止。
    fn range_all_targets(&self, visit: &mut dyn FnMut(&Target) -> bool);

    /// 遍历全部 Broker，访问者返回 `false` 时停止。
    fn range_brokers(&self, visit: &mut dyn FnMut(&Broker) -> bool);
}

/// 内存中缓存的路由表快照。
#[derive(Default)]
pub struct CachedTargets {
    value: ArcSwapOption<TargetsConfig>,
}

impl CachedTargets {
    /// 构造尚未收到任何配置的仓储。
    pub fn new() -> Self {
        Self::default()
    }

    /// 以初始快照构造仓储。
    pub fn with_snapshot(snapshot: TargetsConfig) -> Self {
        let cache = Self::new();
        cache.store(snapshot);
        cache
    }

    /// 原子发布新快照。
    ///
    /// # 教案式说明
    /// - **前置条件**：快照必须自洽，即 `brokers` 的键等于 Broker 的持久化字符串、`targets` 的键等于
    ///   Target 名称；经由 [`TargetsConfig::upsert_broker`] 与 [`Broker::with_target`] 构造的快照天然满足；
    /// - **契约 (What)**：发布构建不再复核，自行改写公开映射的调用方需自己保证；
    ///   调试构建会复核并在不自洽时 panic，来自外部的字节请走 [`Self::store_bytes`]。
    pub fn store(&self, snapshot: TargetsConfig) {
        self.store_arc(Arc::new(snapshot));
    }

    /// 原子发布已经共享的快照，前置条件同 [`Self::store`]。
    pub fn store_arc(&self, snapshot: Arc<TargetsConfig>) {
        #[cfg(debug_assertions)]
        if let Err(err) = ensure_consistent(&snapshot) {
            panic!("refusing to store {err}");
        }
        self.value.store(Some(snapshot));
    }

    /// 解码 [`Self::serialize`] 产出的字节并发布。
    ///
    /// # 教案式说明
    /// - **意图 (Why)**：控制面以序列化形式把配置送入入口进程，这里是落地点；
    /// - **契约 (What)**：解码失败或内容不自洽时返回错误，当前快照保持不变，读者不会看到任何中间态；
    /// - **执行 (How)**：先完整解码与校验出新的 [`TargetsConfig`]，成功后才执行一次 `store`。
    pub fn store_bytes(&self, bytes: &[u8]) -> Result<(), ConfigError> {
        let snapshot: TargetsConfig = serde_json::from_slice(bytes).map_err(ConfigError::Decode)?;
        ensure_consistent(&snapshot)?;
        self.store(snapshot);
        Ok(())
    }

    /// 读取最近一次发布的快照；从未发布时返回空快照哨兵。
    pub fn load(&self) -> Arc<TargetsConfig> {
        self.value.load_full().unwrap_or_else(empty_snapshot)
    }

    /// 是否已经收到过至少一份快照。
    pub fn is_initialized(&self) -> bool {
        self.value.load().is_some()
    }

    /// 当前快照的确定性字节编码。
    ///
    /// 所有映射均为 `BTreeMap`，因此内容相同的快照总是得到相同的字节。
    pub fn serialize(&self) -> Result<Vec<u8>, ConfigError> {
        serde_json::to_vec(self.load().as_ref()).map_err(ConfigError::Encode)
    }

    /// 面向排障的多行文本渲染，格式不保证跨版本稳定。
    pub fn debug_string(&self) -> String {
        let snapshot = self.load();
        let mut buffer = Vec::new();
        let formatter = PrettyFormatter::with_indent(b"\t");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, formatter);
        match snapshot.serialize(&mut serializer) {
            Ok(()) => String::from_utf8_lossy(&buffer).into_owned(),
            Err(err) => format!("<unrenderable targets snapshot: {err}>"),
        }
    }
}

impl ReadonlyTargets for CachedTargets {
    fn get_broker_by_key(&self, key: &BrokerKey) -> Option<Arc<Broker>> {
        self.load().broker(key).cloned()
    }

    fn range_all_targets(&self, visit: &mut dyn FnMut(&Target) -> bool) {
        let snapshot = self.load();
        for target in snapshot.targets() {
            if !visit(target) {
                return;
            }
        }
    }

    fn range_brokers(&self, visit: &mut dyn FnMut(&Broker) -> bool) {
        let snapshot = self.load();
        for broker in snapshot.brokers() {
            if !visit(broker) {
                return;
            }
        }
    }
}

impl fmt::Debug for CachedTargets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let snapshot = self.load();
        f.debug_struct("CachedTargets")
            .field("initialized", &self.is_initialized())
            .field("brokers", &snapshot.brokers.len())
            .finish()
    }
}

fn empty_snapshot() -> Arc<TargetsConfig> {
    static EMPTY: OnceLock<Arc<TargetsConfig>> = OnceLock::new();
    Arc::clone(EMPTY.get_or_init(|| Arc::new(TargetsConfig::default())))
}

// 解码得到的映射键必须与条目自身的命名一致，否则按键查询会得到错误的 Broker。
fn ensure_consistent(snapshot: &TargetsConfig) -> Result<(), ConfigError> {
    for (entry, broker) in &snapshot.brokers {
        let mut names = [&broker.namespace, &broker.name]
            .into_iter()
            .chain(broker.targets.values().map(|target| &target.name));
        if names.any(|segment| segment.contains(SEPARATOR)) {
            return Err(ConfigError::SeparatorInName {
                entry: entry.clone(),
            });
        }
        let expected = broker.key().persistence_string();
        if *entry != expected {
            return Err(ConfigError::Inconsistent {
                entry: entry.clone(),
                expected,
            });
        }
        for (name, target) in &broker.targets {
            if *name != target.name {
                return Err(ConfigError::Inconsistent {
                    entry: format!("{entry}/{name}"),
                    expected: format!("{entry}/{}", target.name),
                });
            }
        }
    }
    Ok(())
}
