//! # spark-broker-config
//!
//! ## 定位与职责（Why）
//! - 承载控制面推送给 Broker 入口进程的完整路由表（Broker → 解耦队列 + Target 集合）；
//! - 提供单写者、多读者的快照仓储 [`CachedTargets`]：读路径零锁，写路径整表替换。
//!
//! ## 架构嵌入（Where）
//! - `key` 模块定义 [`BrokerKey`]/[`TargetKey`] 及其持久化字符串；
//! - `model` 模块定义快照数据结构，全部映射使用 `BTreeMap` 以保证序列化字节稳定；
//! - `cache` 模块实现快照仓储与只读视图 [`ReadonlyTargets`]，供 `spark-broker-ingress` 消费。
//!
//! ## 契约摘要（What）
//! - 快照要么从未出现（读取得到空哨兵），要么完整且自洽，读者不会观察到撕裂状态；
//! - [`CachedTargets::serialize`] 输出确定性字节，[`CachedTargets::debug_string`] 仅用于排障。

pub mod cache;
pub mod error;
pub mod key;
pub mod model;

pub use cache::{CachedTargets, ReadonlyTargets};
pub use error::ConfigError;
pub use key::{BrokerKey, KeyParseError, TargetKey};
pub use model::{Broker, Queue, State, Target, TargetsConfig};
