//! # key 模块说明
//!
//! ## 角色定位（Why）
//! - 为 Broker 与 Target 提供稳定、可比较、可哈希的标识，作为快照查询与句柄缓存的索引；
//! - 统一“持久化字符串”格式，路由表快照内的 `brokers` 映射即以该字符串为键。
//!
//! ## 格式约定（What）
//! - `BrokerKey` 持久化为 `namespace/name`；
//! - `TargetKey` 持久化为 `namespace/broker/target`；
//! - 任一段不得为空，也不得包含 `/`，否则 `FromStr` 返回 [`KeyParseError`]。

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

pub(crate) const SEPARATOR: char = '/';

/// 解析持久化字符串失败时返回的错误。
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum KeyParseError {
    /// 段数与期望不符。
    #[error("key `{input}` must have {expected} `/`-separated segments")]
    SegmentCount { input: String, expected: usize },
    /// 存在空段。
    #[error("key `{input}` contains an empty segment")]
    EmptySegment { input: String },
}

/// 逻辑 Broker 的稳定标识（命名空间 + 名称）。
///
/// # 教案式说明
/// - **意图 (Why)**：入口层按 Broker 维度缓存队列句柄，需要一个廉价克隆、可哈希的键；
/// - **契约 (What)**：`persistence_string` 与快照 `brokers` 映射的键一一对应；
/// - **前置条件**：任一段都不得包含 `/`，否则持久化字符串无法唯一解析回原键；
///   调试构建中以 `debug_assert!` 拦截，外部输入请走 `FromStr`；
/// - **风险 (Trade-offs)**：发布构建不做校验，以便在热路径上直接由请求路径拼装。
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct BrokerKey {
    namespace: String,
    name: String,
}

impl BrokerKey {
    /// 以命名空间与名称构造键，两段均不得包含 `/`。
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        let (namespace, name) = (namespace.into(), name.into());
        debug_assert!(
            !namespace.contains(SEPARATOR) && !name.contains(SEPARATOR),
            "broker key segments must not contain `{SEPARATOR}`: {namespace:?}, {name:?}"
        );
        Self { namespace, name }
    }

    /// Broker 所在命名空间。
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Broker 名称。
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 返回 `namespace/name` 形式的持久化字符串。
    pub fn persistence_string(&self) -> String {
        format!("{}{SEPARATOR}{}", self.namespace, self.name)
    }

    /// 基于当前 Broker 派生某个 Target 的键。
    pub fn target(&self, name: impl Into<String>) -> TargetKey {
        TargetKey::new(self.clone(), name)
    }
}

impl fmt::Display for BrokerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.namespace, self.name)
    }
}

impl FromStr for BrokerKey {
    type Err = KeyParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let [namespace, name] = split_segments::<2>(input)?;
        Ok(Self::new(namespace, name))
    }
}

/// Target（Trigger）的标识：所属 Broker 加上 Target 名称。
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TargetKey {
    broker: BrokerKey,
    name: String,
}

impl TargetKey {
    /// 以 Broker 键与 Target 名称构造，名称同样不得包含 `/`。
    pub fn new(broker: BrokerKey, name: impl Into<String>) -> Self {
        let name = name.into();
        debug_assert!(
            !name.contains(SEPARATOR),
            "target name must not contain `{SEPARATOR}`: {name:?}"
        );
        Self { broker, name }
    }

    /// 返回所属 Broker 的键。
    pub fn parent_key(&self) -> &BrokerKey {
        &self.broker
    }

    /// Target 名称，即 Broker 快照内 `targets` 映射的键。
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 返回 `namespace/broker/target` 形式的持久化字符串。
    pub fn persistence_string(&self) -> String {
        format!("{}{SEPARATOR}{}", self.broker, self.name)
    }
}

impl fmt::Display for TargetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.broker, self.name)
    }
}

impl FromStr for TargetKey {
    type Err = KeyParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let [namespace, broker, name] = split_segments::<3>(input)?;
        Ok(Self::new(BrokerKey::new(namespace, broker), name))
    }
}

fn split_segments<const N: usize>(input: &str) -> Result<[&str; N], KeyParseError> {
    let mut segments = [""; N];
    let mut parts = input.split(SEPARATOR);
    for slot in segments.iter_mut() {
        *slot = parts.next().ok_or_else(|| KeyParseError::SegmentCount {
            input: input.to_owned(),
            expected: N,
        })?;
    }
    if parts.next().is_some() {
        return Err(KeyParseError::SegmentCount {
            input: input.to_owned(),
            expected: N,
        });
    }
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(KeyParseError::EmptySegment {
            input: input.to_owned(),
        });
    }
    Ok(segments)
}
